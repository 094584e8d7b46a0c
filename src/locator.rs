use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::ResolveError;
use crate::types::{SelectorStrategy, SelectorWithScore};

/// What a locator asks the page for.
///
/// Serialized as-is into the in-page resolver script, so variant and field
/// names are part of that contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Query {
    /// CSS, optionally chained with ` >> ` (each part scoped to the previous matches)
    Css { selector: String },
    XPath { expression: String },
    /// Accessible role plus optional accessible name
    Role {
        role: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(default)]
        exact: bool,
    },
    /// Smallest elements whose own text matches
    Text { text: String, exact: bool },
    TestId { id: String },
    Placeholder { text: String },
    /// Form controls associated with a label carrying this text
    Label { text: String },
    /// CSS matches whose text content contains (or equals) `text`
    HasText {
        selector: String,
        text: String,
        exact: bool,
    },
}

/// Re-evaluatable reference to zero or more live elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    pub query: Query,
    /// Pick the n-th match (document order) instead of requiring uniqueness
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nth: Option<usize>,
}

/// Wrap `value` in double quotes, escaping backslashes and quotes
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push(' '),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Inverse of [`quote`]; accepts single or double quotes and bare words
fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    let inner = if raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')))
    {
        &raw[1..raw.len() - 1]
    } else {
        raw
    };
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn is_quoted(raw: &str) -> bool {
    let raw = raw.trim();
    raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')))
}

/// Brackets, parentheses and quotes must balance outside of quoted strings
fn check_balanced(selector: &str) -> Result<(), ResolveError> {
    let syntax = |reason: &str| ResolveError::SelectorSyntax {
        selector: selector.to_string(),
        reason: reason.to_string(),
    };

    let mut stack = Vec::new();
    let mut quote_char: Option<char> = None;
    let mut escaped = false;
    for c in selector.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
            continue;
        }
        if let Some(q) = quote_char {
            if c == q {
                quote_char = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote_char = Some(c),
            '[' | '(' => stack.push(c),
            ']' => {
                if stack.pop() != Some('[') {
                    return Err(syntax("unbalanced ']'"));
                }
            }
            ')' => {
                if stack.pop() != Some('(') {
                    return Err(syntax("unbalanced ')'"));
                }
            }
            _ => {}
        }
    }
    if quote_char.is_some() {
        return Err(syntax("unterminated string"));
    }
    if !stack.is_empty() {
        return Err(syntax("unclosed bracket"));
    }
    Ok(())
}

/// Split `base:has-text("x")` / `base:text("x")` when the pseudo-class is trailing
fn split_text_pseudo(selector: &str) -> Option<(String, String, bool)> {
    let trimmed = selector.trim_end();
    if !trimmed.ends_with(')') {
        return None;
    }
    for (pseudo, exact) in [(":has-text(", false), (":text(", true)] {
        if let Some(pos) = trimmed.rfind(pseudo) {
            let arg = &trimmed[pos + pseudo.len()..trimmed.len() - 1];
            if !is_quoted(arg) {
                continue;
            }
            let base = trimmed[..pos].trim();
            let base = if base.is_empty() { "*" } else { base };
            return Some((base.to_string(), unquote(arg), exact));
        }
    }
    None
}

impl Locator {
    pub fn new(query: Query) -> Self {
        Locator { query, nth: None }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Locator::new(Query::Css {
            selector: selector.into(),
        })
    }

    pub fn role(role: impl Into<String>, name: Option<String>) -> Self {
        Locator::new(Query::Role {
            role: role.into(),
            name,
            exact: true,
        })
    }

    pub fn has_text(selector: impl Into<String>, text: impl Into<String>) -> Self {
        Locator::new(Query::HasText {
            selector: selector.into(),
            text: text.into(),
            exact: false,
        })
    }

    /// The same query narrowed to one match
    pub fn nth(&self, index: usize) -> Self {
        Locator {
            query: self.query.clone(),
            nth: Some(index),
        }
    }

    /// Base query without any `nth` narrowing
    pub fn all(&self) -> Self {
        Locator {
            query: self.query.clone(),
            nth: None,
        }
    }

    /// Queries that match on visible or associated text
    pub fn is_textual(&self) -> bool {
        matches!(
            self.query,
            Query::Text { .. } | Query::Label { .. } | Query::HasText { .. } | Query::Role { .. }
        )
    }

    /// Parse a persisted candidate
    pub fn from_candidate(candidate: &SelectorWithScore) -> Result<Self, ResolveError> {
        Locator::parse(Some(candidate.strategy), &candidate.value)
    }

    /// Parse a selector string, using `strategy` as a hint when the string
    /// carries no engine prefix.
    pub fn parse(strategy: Option<SelectorStrategy>, value: &str) -> Result<Self, ResolveError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(ResolveError::SelectorSyntax {
                selector: String::new(),
                reason: "empty selector".into(),
            });
        }
        check_balanced(value)?;

        if let Some((base, n)) = value.rsplit_once(" >> nth=")
            && let Ok(n) = n.trim().parse::<usize>()
        {
            let mut locator = Locator::parse(strategy, base)?;
            locator.nth = Some(n);
            return Ok(locator);
        }

        if let Some(rest) = value.strip_prefix("xpath=") {
            return Ok(Locator::new(Query::XPath {
                expression: rest.trim().to_string(),
            }));
        }
        if value.starts_with("//") || value.starts_with("(//") || value.starts_with("/html") {
            return Ok(Locator::new(Query::XPath {
                expression: value.to_string(),
            }));
        }
        if let Some(rest) = value.strip_prefix("text=") {
            return Ok(Locator::new(Query::Text {
                exact: is_quoted(rest),
                text: unquote(rest),
            }));
        }
        if let Some(rest) = value.strip_prefix("role=") {
            return Ok(parse_role(rest));
        }
        if let Some(rest) = value.strip_prefix("placeholder=") {
            return Ok(Locator::new(Query::Placeholder {
                text: unquote(rest),
            }));
        }
        if let Some(rest) = value.strip_prefix("label=") {
            return Ok(Locator::new(Query::Label {
                text: unquote(rest),
            }));
        }
        if let Some(rest) = value.strip_prefix("testid=") {
            return Ok(Locator::new(Query::TestId { id: unquote(rest) }));
        }
        if let Some(rest) = value.strip_prefix("css=") {
            return Ok(parse_css(rest.trim()));
        }

        let is_attribute_selector = value.contains('[');
        let locator = match strategy {
            Some(SelectorStrategy::Xpath) => Locator::new(Query::XPath {
                expression: value.to_string(),
            }),
            Some(SelectorStrategy::Text) if split_text_pseudo(value).is_none() => {
                Locator::new(Query::Text {
                    exact: is_quoted(value),
                    text: unquote(value),
                })
            }
            Some(SelectorStrategy::TestId) if !is_attribute_selector => {
                Locator::new(Query::TestId {
                    id: unquote(value),
                })
            }
            Some(SelectorStrategy::Placeholder) if !is_attribute_selector => {
                Locator::new(Query::Placeholder {
                    text: unquote(value),
                })
            }
            Some(SelectorStrategy::Label) if !is_attribute_selector => {
                Locator::new(Query::Label {
                    text: unquote(value),
                })
            }
            _ => parse_css(value),
        };
        Ok(locator)
    }
}

fn parse_css(selector: &str) -> Locator {
    match split_text_pseudo(selector) {
        Some((base, text, exact)) => Locator::new(Query::HasText {
            selector: base,
            text,
            exact,
        }),
        None => Locator::css(selector),
    }
}

/// `button[name="Save"]`, `button[name="Save" exact]` or a bare role
fn parse_role(rest: &str) -> Locator {
    let rest = rest.trim();
    let Some(open) = rest.find('[') else {
        return Locator::new(Query::Role {
            role: rest.to_string(),
            name: None,
            exact: false,
        });
    };
    let role = rest[..open].trim().to_string();
    let inner = rest[open + 1..].trim_end_matches(']').trim();
    let (inner, exact) = match inner.strip_suffix(" exact") {
        Some(stripped) => (stripped.trim(), true),
        None => (inner, false),
    };
    let name = inner
        .strip_prefix("name=")
        .map(unquote)
        .filter(|n| !n.is_empty());
    Locator::new(Query::Role { role, name, exact })
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Css { selector } => f.write_str(selector),
            Query::XPath { expression } => write!(f, "xpath={}", expression),
            Query::Role { role, name, exact } => match name {
                Some(name) if *exact => write!(f, "role={}[name={} exact]", role, quote(name)),
                Some(name) => write!(f, "role={}[name={}]", role, quote(name)),
                None => write!(f, "role={}", role),
            },
            Query::Text { text, exact } => {
                if *exact {
                    write!(f, "text={}", quote(text))
                } else {
                    write!(f, "text={}", text)
                }
            }
            Query::TestId { id } => write!(f, "testid={}", quote(id)),
            Query::Placeholder { text } => write!(f, "placeholder={}", quote(text)),
            Query::Label { text } => write!(f, "label={}", quote(text)),
            Query::HasText {
                selector,
                text,
                exact,
            } => {
                let pseudo = if *exact { "text" } else { "has-text" };
                write!(f, "{}:{}({})", selector, pseudo, quote(text))
            }
        }
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.query)?;
        if let Some(n) = self.nth {
            write!(f, " >> nth={}", n)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "locator_test.rs"]
mod locator_test;
