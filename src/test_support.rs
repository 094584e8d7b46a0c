//! In-memory page implementing both browser capabilities for unit tests.
//!
//! Elements form a tree (parent index per element, document order = DFS over
//! insertion order). The CSS engine understands compound selectors, descendant
//! and child combinators, comma lists, ` >> ` chains, attribute operators,
//! `:not()`, `:nth-of-type()` and `:nth-child()`; XPath is limited to
//! `//tag[@attr="v"]` and absolute `/a/b[2]` paths.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::capture::DESCRIBE_FN;
use crate::driver::{
    AxNode, DevTools, DomNode, DriverResult, MatchedElement, PageDriver, PointElement,
    SignatureEntry, TextCandidate,
};
use crate::errors::DriverError;
use crate::locator::{Locator, Query};
use crate::stability::normalize_whitespace;
use crate::types::{
    BoundingBox, LabelAssociation, LabelRelationship, ParentInfo, SiblingInfo, StructuralPosition,
};

#[derive(Debug, Clone)]
pub struct FakeElement {
    pub tag: String,
    pub attrs: BTreeMap<String, String>,
    pub text: String,
    pub parent: Option<usize>,
    pub bbox: BoundingBox,
    pub visible: bool,
    pub ax_role: Option<String>,
    pub has_ax: bool,
}

pub fn el(tag: &str) -> FakeElement {
    FakeElement {
        tag: tag.to_lowercase(),
        attrs: BTreeMap::new(),
        text: String::new(),
        parent: None,
        bbox: BoundingBox::default(),
        visible: true,
        ax_role: None,
        has_ax: true,
    }
}

impl FakeElement {
    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn id(self, id: &str) -> Self {
        self.attr("id", id)
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn bbox(mut self, x: f64, y: f64, width: f64, height: f64) -> Self {
        self.bbox = BoundingBox::new(x, y, width, height);
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Accessibility role overriding the implicit one
    pub fn ax_role(mut self, role: &str) -> Self {
        self.ax_role = Some(role.to_string());
        self
    }

    /// Leave the element out of the accessibility tree
    pub fn no_ax(mut self) -> Self {
        self.has_ax = false;
        self
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

struct State {
    elements: Vec<FakeElement>,
    url: String,
    actions: Vec<String>,
    stale_calls: usize,
    refreshes: usize,
    delay: Option<Duration>,
}

pub struct FakePage {
    state: Mutex<State>,
}

impl FakePage {
    pub fn new(url: &str) -> Self {
        FakePage {
            state: Mutex::new(State {
                elements: Vec::new(),
                url: url.to_string(),
                actions: Vec::new(),
                stale_calls: 0,
                refreshes: 0,
                delay: None,
            }),
        }
    }

    pub fn add(&self, element: FakeElement) -> usize {
        let mut state = self.state.lock().unwrap();
        state.elements.push(element);
        state.elements.len() - 1
    }

    pub fn add_child(&self, parent: usize, mut element: FakeElement) -> usize {
        element.parent = Some(parent);
        self.add(element)
    }

    /// Drop every element, as after navigating to a fresh document
    pub fn clear(&self) {
        self.state.lock().unwrap().elements.clear();
    }

    pub fn actions(&self) -> Vec<String> {
        self.state.lock().unwrap().actions.clone()
    }

    /// The next `n` capability calls fail with a destroyed execution context
    pub fn fail_next_with_stale(&self, n: usize) {
        self.state.lock().unwrap().stale_calls = n;
    }

    pub fn refreshes(&self) -> usize {
        self.state.lock().unwrap().refreshes
    }

    /// Delay every count/inspect call
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn value_of(&self, index: usize) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .elements
            .get(index)
            .and_then(|e| e.attrs.get("value").cloned())
    }

    fn tick(&self) -> DriverResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.stale_calls > 0 {
            state.stale_calls -= 1;
            return Err(DriverError::StaleContext(
                "Execution context was destroyed".into(),
            ));
        }
        Ok(())
    }

    async fn pause(&self) {
        let delay = self.state.lock().unwrap().delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn log(&self, entry: String) {
        self.state.lock().unwrap().actions.push(entry);
    }

    fn with_dom<T>(&self, f: impl FnOnce(&Dom<'_>) -> T) -> T {
        let state = self.state.lock().unwrap();
        let dom = Dom {
            elements: &state.elements,
        };
        f(&dom)
    }

    fn resolve(&self, locator: &Locator) -> DriverResult<Vec<usize>> {
        self.with_dom(|dom| {
            let all = dom.query(&locator.query)?;
            Ok(match locator.nth {
                Some(n) => all.get(n).copied().into_iter().collect(),
                None => all,
            })
        })
    }

    /// Exactly one element, mirroring a strict-mode driver
    fn resolve_one(&self, locator: &Locator) -> DriverResult<usize> {
        let found = self.resolve(locator)?;
        match found.as_slice() {
            [] => Err(DriverError::NotFound(locator.to_string())),
            [one] => Ok(*one),
            _ => Err(DriverError::Protocol(format!(
                "strict mode violation: {} resolved to {} elements",
                locator,
                found.len()
            ))),
        }
    }
}

struct Dom<'a> {
    elements: &'a [FakeElement],
}

const NAME_FROM_CONTENT: &[&str] = &[
    "button", "link", "tab", "menuitem", "menuitemcheckbox", "menuitemradio", "option",
    "checkbox", "radio", "switch", "treeitem", "row", "gridcell", "cell", "heading",
];

const LANDMARKS: &[&str] = &["nav", "main", "header", "footer", "aside", "section", "form"];

impl Dom<'_> {
    fn children(&self, index: usize) -> Vec<usize> {
        (0..self.elements.len())
            .filter(|i| self.elements[*i].parent == Some(index))
            .collect()
    }

    fn roots(&self) -> Vec<usize> {
        (0..self.elements.len())
            .filter(|i| self.elements[*i].parent.is_none())
            .collect()
    }

    fn order(&self) -> Vec<usize> {
        fn walk(dom: &Dom<'_>, index: usize, out: &mut Vec<usize>) {
            out.push(index);
            for child in dom.children(index) {
                walk(dom, child, out);
            }
        }
        let mut out = Vec::with_capacity(self.elements.len());
        for root in self.roots() {
            walk(self, root, &mut out);
        }
        out
    }

    fn ancestors(&self, index: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut current = self.elements[index].parent;
        while let Some(p) = current {
            out.push(p);
            current = self.elements[p].parent;
        }
        out
    }

    fn is_descendant_of(&self, index: usize, ancestor: usize) -> bool {
        self.ancestors(index).contains(&ancestor)
    }

    fn text_content(&self, index: usize) -> String {
        let mut out = self.elements[index].text.clone();
        for child in self.children(index) {
            out.push_str(&self.text_content(child));
        }
        out
    }

    fn visible(&self, index: usize) -> bool {
        self.elements[index].visible
            && self
                .ancestors(index)
                .iter()
                .all(|a| self.elements[*a].visible)
    }

    fn editable(&self, index: usize) -> bool {
        let e = &self.elements[index];
        matches!(e.tag.as_str(), "input" | "textarea" | "select")
            || e.get("contenteditable") == Some("true")
    }

    fn role(&self, index: usize) -> Option<String> {
        let e = &self.elements[index];
        if let Some(role) = &e.ax_role {
            return Some(role.clone());
        }
        if let Some(role) = e.get("role") {
            return Some(role.to_string());
        }
        let role = match e.tag.as_str() {
            "button" => "button",
            "a" => "link",
            "select" => "combobox",
            "textarea" => "textbox",
            "input" => match e.get("type").unwrap_or("text") {
                "checkbox" => "checkbox",
                "radio" => "radio",
                "submit" | "button" => "button",
                "search" => "searchbox",
                _ => "textbox",
            },
            "li" => "listitem",
            "form" => "form",
            "nav" => "navigation",
            "main" => "main",
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => "heading",
            _ => return None,
        };
        Some(role.to_string())
    }

    fn by_id(&self, id: &str) -> Option<usize> {
        self.order()
            .into_iter()
            .find(|i| self.elements[*i].get("id") == Some(id))
    }

    fn accessible_name(&self, index: usize) -> String {
        let e = &self.elements[index];
        if let Some(label) = e.get("aria-label") {
            return normalize_whitespace(label);
        }
        if let Some(by) = e.get("aria-labelledby")
            && let Some(target) = self.by_id(by)
        {
            return normalize_whitespace(&self.text_content(target));
        }
        if matches!(e.tag.as_str(), "input" | "select" | "textarea") {
            if let Some(id) = e.get("id")
                && let Some(label) = self.order().into_iter().find(|i| {
                    self.elements[*i].tag == "label" && self.elements[*i].get("for") == Some(id)
                })
            {
                return normalize_whitespace(&self.text_content(label));
            }
            if let Some(label) = self
                .ancestors(index)
                .into_iter()
                .find(|a| self.elements[*a].tag == "label")
            {
                return normalize_whitespace(&self.text_content(label));
            }
            if let Some(placeholder) = e.get("placeholder") {
                return placeholder.to_string();
            }
        }
        if let Some(role) = self.role(index)
            && NAME_FROM_CONTENT.contains(&role.as_str())
        {
            return normalize_whitespace(&self.text_content(index));
        }
        e.get("title").unwrap_or_default().to_string()
    }

    fn query(&self, query: &Query) -> DriverResult<Vec<usize>> {
        let order = self.order();
        let found = match query {
            Query::Css { selector } => self.css(selector)?,
            Query::XPath { expression } => self.xpath(expression)?,
            Query::Role { role, name, exact } => order
                .into_iter()
                .filter(|i| self.elements[*i].has_ax && self.visible(*i))
                .filter(|i| self.role(*i).as_deref() == Some(role.as_str()))
                .filter(|i| match name {
                    None => true,
                    Some(name) => text_matches(&self.accessible_name(*i), name, *exact),
                })
                .collect(),
            Query::Text { text, exact } => {
                let matching: Vec<usize> = order
                    .into_iter()
                    .filter(|i| text_matches(&self.text_content(*i), text, *exact))
                    .collect();
                // smallest elements only
                matching
                    .iter()
                    .copied()
                    .filter(|i| {
                        !matching
                            .iter()
                            .any(|j| j != i && self.is_descendant_of(*j, *i))
                    })
                    .collect()
            }
            Query::TestId { id } => order
                .into_iter()
                .filter(|i| self.elements[*i].get("data-testid") == Some(id.as_str()))
                .collect(),
            Query::Placeholder { text } => order
                .into_iter()
                .filter(|i| {
                    self.elements[*i]
                        .get("placeholder")
                        .is_some_and(|p| text_matches(p, text, false))
                })
                .collect(),
            Query::Label { text } => {
                let mut out = Vec::new();
                for i in order.iter().copied() {
                    let e = &self.elements[i];
                    if e.tag == "label" && text_matches(&self.text_content(i), text, false) {
                        let control = match e.get("for") {
                            Some(id) => self.by_id(id),
                            None => order.iter().copied().find(|c| {
                                self.is_descendant_of(*c, i)
                                    && matches!(
                                        self.elements[*c].tag.as_str(),
                                        "input" | "select" | "textarea"
                                    )
                            }),
                        };
                        out.extend(control);
                    } else if e.tag != "label"
                        && e.get("aria-label").is_some_and(|l| text_matches(l, text, false))
                    {
                        out.push(i);
                    }
                }
                let mut seen = std::collections::HashSet::new();
                out.retain(|i| seen.insert(*i));
                out.sort_by_key(|i| order.iter().position(|o| o == i));
                out
            }
            Query::HasText {
                selector,
                text,
                exact,
            } => self
                .css(selector)?
                .into_iter()
                .filter(|i| text_matches(&self.text_content(*i), text, *exact))
                .collect(),
        };
        Ok(found)
    }

    fn css(&self, selector: &str) -> DriverResult<Vec<usize>> {
        let invalid = |reason: &str| DriverError::InvalidSelector {
            selector: selector.to_string(),
            reason: reason.to_string(),
        };
        let mut scope: Option<Vec<usize>> = None;
        for part in selector.split(" >> ") {
            let list = parse_selector_list(part).map_err(|r| invalid(&r))?;
            let found: Vec<usize> = self
                .order()
                .into_iter()
                .filter(|i| match &scope {
                    None => true,
                    Some(roots) => roots.iter().any(|r| self.is_descendant_of(*i, *r)),
                })
                .filter(|i| list.iter().any(|c| self.matches_complex(*i, c, c.len() - 1)))
                .collect();
            scope = Some(found);
        }
        Ok(scope.unwrap_or_default())
    }

    fn matches_complex(&self, index: usize, complex: &[(Combinator, Compound)], k: usize) -> bool {
        if !self.matches_compound(index, &complex[k].1) {
            return false;
        }
        if k == 0 {
            return true;
        }
        match complex[k].0 {
            Combinator::Child => self.elements[index]
                .parent
                .is_some_and(|p| self.matches_complex(p, complex, k - 1)),
            Combinator::Descendant => self
                .ancestors(index)
                .into_iter()
                .any(|a| self.matches_complex(a, complex, k - 1)),
        }
    }

    fn siblings(&self, index: usize) -> Vec<usize> {
        match self.elements[index].parent {
            Some(p) => self.children(p),
            None => self.roots(),
        }
    }

    fn nth_of_type(&self, index: usize) -> usize {
        let tag = &self.elements[index].tag;
        self.siblings(index)
            .into_iter()
            .filter(|s| &self.elements[*s].tag == tag)
            .position(|s| s == index)
            .map_or(0, |p| p + 1)
    }

    fn nth_child(&self, index: usize) -> usize {
        self.siblings(index)
            .into_iter()
            .position(|s| s == index)
            .map_or(0, |p| p + 1)
    }

    fn matches_compound(&self, index: usize, compound: &Compound) -> bool {
        compound.iter().all(|simple| self.matches_simple(index, simple))
    }

    fn matches_simple(&self, index: usize, simple: &Simple) -> bool {
        let e = &self.elements[index];
        match simple {
            Simple::Tag(tag) => tag == "*" || &e.tag == tag,
            Simple::Id(id) => e.get("id") == Some(id.as_str()),
            Simple::Class(class) => e
                .get("class")
                .is_some_and(|c| c.split_whitespace().any(|c| c == class)),
            Simple::Attr { name, op, value } => {
                let Some(actual) = e.get(name) else {
                    return false;
                };
                match op {
                    AttrOp::Exists => true,
                    AttrOp::Equals => actual == value,
                    AttrOp::Prefix => actual.starts_with(value.as_str()),
                    AttrOp::Suffix => actual.ends_with(value.as_str()),
                    AttrOp::Contains => actual.contains(value.as_str()),
                    AttrOp::Word => actual.split_whitespace().any(|w| w == value),
                }
            }
            Simple::Not(inner) => !self.matches_compound(index, inner),
            Simple::NthOfType(n) => self.nth_of_type(index) == *n,
            Simple::NthChild(n) => self.nth_child(index) == *n,
        }
    }

    fn xpath(&self, expression: &str) -> DriverResult<Vec<usize>> {
        let invalid = |reason: &str| DriverError::InvalidSelector {
            selector: expression.to_string(),
            reason: reason.to_string(),
        };
        if let Some(step) = expression.strip_prefix("//") {
            let (tag, predicate) = parse_xpath_step(step).map_err(|r| invalid(&r))?;
            return Ok(self
                .order()
                .into_iter()
                .filter(|i| tag == "*" || self.elements[*i].tag == tag)
                .filter(|i| match &predicate {
                    XPathPredicate::None => true,
                    XPathPredicate::Attr(name, value) => {
                        self.elements[*i].get(name) == Some(value.as_str())
                    }
                    XPathPredicate::Index(n) => self.nth_of_type(*i) == *n,
                })
                .collect());
        }
        let Some(path) = expression.strip_prefix('/') else {
            return Err(invalid("unsupported expression"));
        };
        let mut current: Vec<usize> = self.roots();
        let mut first = true;
        for step in path.split('/') {
            let (tag, predicate) = parse_xpath_step(step).map_err(|r| invalid(&r))?;
            let pool: Vec<usize> = if first {
                current.clone()
            } else {
                current.iter().flat_map(|c| self.children(*c)).collect()
            };
            first = false;
            current = pool
                .into_iter()
                .filter(|i| tag == "*" || self.elements[*i].tag == tag)
                .filter(|i| match &predicate {
                    XPathPredicate::None => true,
                    XPathPredicate::Attr(name, value) => {
                        self.elements[*i].get(name) == Some(value.as_str())
                    }
                    XPathPredicate::Index(n) => self.nth_of_type(*i) == *n,
                })
                .collect();
        }
        Ok(current)
    }

    fn xpath_of(&self, index: usize) -> String {
        let mut chain = self.ancestors(index);
        chain.reverse();
        chain.push(index);
        chain
            .iter()
            .map(|i| format!("/{}[{}]", self.elements[*i].tag, self.nth_of_type(*i)))
            .collect()
    }

    fn css_path_of(&self, index: usize) -> String {
        let mut chain = self.ancestors(index);
        chain.reverse();
        chain.push(index);
        chain
            .iter()
            .map(|i| {
                format!(
                    "{}:nth-of-type({})",
                    self.elements[*i].tag,
                    self.nth_of_type(*i)
                )
            })
            .collect::<Vec<_>>()
            .join(" > ")
    }

    fn structure_of(&self, index: usize) -> StructuralPosition {
        let parent_chain = self
            .ancestors(index)
            .into_iter()
            .take(5)
            .map(|a| {
                let e = &self.elements[a];
                ParentInfo {
                    tag_name: e.tag.clone(),
                    id: e.get("id").map(str::to_string),
                    role: e.get("role").map(str::to_string),
                    aria_label: e.get("aria-label").map(str::to_string),
                    class_name: e.get("class").map(str::to_string),
                    selector: match e.get("id") {
                        Some(id) => format!("#{}", id),
                        None => e.tag.clone(),
                    },
                    is_landmark: LANDMARKS.contains(&e.tag.as_str()),
                    is_form: e.tag == "form",
                }
            })
            .collect();

        let siblings = self.siblings(index);
        let position = siblings.iter().position(|s| *s == index).unwrap_or(0);
        let prev = position.checked_sub(1).map(|p| siblings[p]);
        let next = siblings.get(position + 1).copied();
        let text_of = |i: Option<usize>| {
            i.map(|i| normalize_whitespace(&self.text_content(i)))
                .filter(|t| !t.is_empty())
        };

        let form_element_index = if self.editable(index) {
            self.ancestors(index)
                .into_iter()
                .find(|a| self.elements[*a].tag == "form")
                .and_then(|form| {
                    self.order()
                        .into_iter()
                        .filter(|i| {
                            self.is_descendant_of(*i, form)
                                && matches!(
                                    self.elements[*i].tag.as_str(),
                                    "input" | "textarea" | "select"
                                )
                        })
                        .position(|i| i == index)
                        .map(|p| p as u32 + 1)
                })
        } else {
            None
        };

        StructuralPosition {
            parent_chain,
            sibling_info: SiblingInfo {
                prev_sibling_text: text_of(prev),
                next_sibling_text: text_of(next),
                prev_sibling_tag: prev.map(|p| self.elements[p].tag.clone()),
                next_sibling_tag: next.map(|n| self.elements[n].tag.clone()),
                total_siblings: siblings.len() as u32,
                position: position as u32,
            },
            nth_child: self.nth_child(index) as u32,
            nth_of_type: self.nth_of_type(index) as u32,
            form_element_index,
        }
    }

    fn label_of(&self, index: usize) -> Option<LabelAssociation> {
        let e = &self.elements[index];
        if !matches!(e.tag.as_str(), "input" | "select" | "textarea") {
            return None;
        }
        let found = |i: usize, relationship| {
            let text = normalize_whitespace(&self.text_content(i));
            (!text.is_empty()).then_some(LabelAssociation {
                label_text: text,
                relationship,
            })
        };
        if let Some(id) = e.get("id")
            && let Some(label) = self.order().into_iter().find(|i| {
                self.elements[*i].tag == "label" && self.elements[*i].get("for") == Some(id)
            })
        {
            return found(label, LabelRelationship::For);
        }
        let siblings = self.siblings(index);
        let position = siblings.iter().position(|s| *s == index)?;
        if position > 0 && self.elements[siblings[position - 1]].tag == "label" {
            return found(siblings[position - 1], LabelRelationship::Sibling);
        }
        let parent = self
            .ancestors(index)
            .into_iter()
            .find(|a| self.elements[*a].tag == "label")?;
        found(parent, LabelRelationship::Parent)
    }

    fn ax_node(&self, index: usize) -> AxNode {
        let role = self.role(index).unwrap_or_else(|| "generic".to_string());
        let name = self.accessible_name(index);
        AxNode {
            node_id: format!("ax-{}", index + 1),
            ignored: false,
            role: Some(role),
            name: (!name.is_empty()).then_some(name),
            description: None,
            child_ids: self
                .children(index)
                .into_iter()
                .filter(|c| self.elements[*c].has_ax)
                .map(|c| format!("ax-{}", c + 1))
                .collect(),
            backend_dom_node_id: Some(index as i64 + 1),
        }
    }

    fn at_point(&self, x: f64, y: f64) -> Option<usize> {
        self.order().into_iter().rev().find(|i| {
            let b = self.elements[*i].bbox;
            self.visible(*i)
                && !b.is_zero()
                && x >= b.x
                && x <= b.x + b.width
                && y >= b.y
                && y <= b.y + b.height
        })
    }

    fn matched(&self, position: usize, index: usize) -> MatchedElement {
        let e = &self.elements[index];
        MatchedElement {
            index: position,
            tag_name: e.tag.to_uppercase(),
            attributes: e.attrs.clone(),
            text: normalize_whitespace(&self.text_content(index)),
            visible: self.visible(index),
            editable: self.editable(index),
            bounding_box: e.bbox,
        }
    }
}

fn text_matches(actual: &str, expected: &str, exact: bool) -> bool {
    let actual = normalize_whitespace(actual);
    let expected = normalize_whitespace(expected);
    if expected.is_empty() {
        return false;
    }
    if exact {
        actual == expected
    } else {
        actual.to_lowercase().contains(&expected.to_lowercase())
    }
}

#[derive(Debug, Clone, Copy)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone)]
enum AttrOp {
    Exists,
    Equals,
    Prefix,
    Suffix,
    Contains,
    Word,
}

#[derive(Debug, Clone)]
enum Simple {
    Tag(String),
    Id(String),
    Class(String),
    Attr {
        name: String,
        op: AttrOp,
        value: String,
    },
    Not(Compound),
    NthOfType(usize),
    NthChild(usize),
}

type Compound = Vec<Simple>;
type Complex = Vec<(Combinator, Compound)>;

/// Split on `sep` outside of brackets, parentheses and quotes
fn split_top_level(input: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    for c in input.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' => quote = Some(c),
            '[' | '(' => depth += 1,
            ']' | ')' => depth -= 1,
            _ => {}
        }
        if c == sep && depth == 0 {
            out.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    out.push(current);
    out
}

fn parse_selector_list(input: &str) -> Result<Vec<Complex>, String> {
    split_top_level(input, ',')
        .iter()
        .map(|s| parse_complex(s.trim()))
        .collect()
}

fn parse_complex(input: &str) -> Result<Complex, String> {
    if input.is_empty() {
        return Err("empty selector".into());
    }
    let mut out: Complex = Vec::new();
    let mut pending = Combinator::Descendant;
    for token in split_top_level(input, ' ') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if token == ">" {
            pending = Combinator::Child;
            continue;
        }
        out.push((pending, parse_compound(token)?));
        pending = Combinator::Descendant;
    }
    if out.is_empty() {
        return Err("empty selector".into());
    }
    Ok(out)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

fn parse_compound(input: &str) -> Result<Compound, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;
    let mut out = Vec::new();

    let ident = |i: &mut usize| -> String {
        let start = *i;
        while *i < chars.len() && is_ident_char(chars[*i]) {
            *i += 1;
        }
        chars[start..*i].iter().collect()
    };

    if i < chars.len() && chars[i] == '*' {
        out.push(Simple::Tag("*".into()));
        i += 1;
    } else if i < chars.len() && chars[i].is_alphabetic() {
        out.push(Simple::Tag(ident(&mut i).to_lowercase()));
    }

    while i < chars.len() {
        match chars[i] {
            '#' => {
                i += 1;
                out.push(Simple::Id(ident(&mut i)));
            }
            '.' => {
                i += 1;
                out.push(Simple::Class(ident(&mut i)));
            }
            '[' => {
                let close = find_close(&chars, i, '[', ']')?;
                let inner: String = chars[i + 1..close].iter().collect();
                out.push(parse_attr(&inner)?);
                i = close + 1;
            }
            ':' => {
                i += 1;
                let name = ident(&mut i);
                if i >= chars.len() || chars[i] != '(' {
                    return Err(format!("unsupported pseudo-class :{}", name));
                }
                let close = find_close(&chars, i, '(', ')')?;
                let arg: String = chars[i + 1..close].iter().collect();
                i = close + 1;
                match name.as_str() {
                    "not" => out.push(Simple::Not(parse_compound(arg.trim())?)),
                    "nth-of-type" => out.push(Simple::NthOfType(
                        arg.trim().parse().map_err(|_| "bad nth-of-type")?,
                    )),
                    "nth-child" => out.push(Simple::NthChild(
                        arg.trim().parse().map_err(|_| "bad nth-child")?,
                    )),
                    other => return Err(format!("unsupported pseudo-class :{}", other)),
                }
            }
            c => return Err(format!("unexpected '{}'", c)),
        }
    }
    if out.is_empty() {
        return Err("empty compound".into());
    }
    Ok(out)
}

fn find_close(chars: &[char], open_at: usize, open: char, close: char) -> Result<usize, String> {
    let mut depth = 0;
    let mut quote: Option<char> = None;
    for (offset, c) in chars[open_at..].iter().enumerate() {
        if let Some(q) = quote {
            if *c == q {
                quote = None;
            }
            continue;
        }
        if *c == '"' || *c == '\'' {
            quote = Some(*c);
        } else if *c == open {
            depth += 1;
        } else if *c == close {
            depth -= 1;
            if depth == 0 {
                return Ok(open_at + offset);
            }
        }
    }
    Err(format!("unclosed '{}'", open))
}

fn strip_quotes(raw: &str) -> String {
    let raw = raw.trim();
    let inner = if raw.len() >= 2
        && ((raw.starts_with('"') && raw.ends_with('"'))
            || (raw.starts_with('\'') && raw.ends_with('\'')))
    {
        &raw[1..raw.len() - 1]
    } else {
        raw
    };
    inner.replace("\\\"", "\"").replace("\\\\", "\\")
}

fn parse_attr(inner: &str) -> Result<Simple, String> {
    for (token, op) in [
        ("^=", AttrOp::Prefix),
        ("$=", AttrOp::Suffix),
        ("*=", AttrOp::Contains),
        ("~=", AttrOp::Word),
        ("=", AttrOp::Equals),
    ] {
        if let Some(pos) = inner.find(token) {
            let name = inner[..pos].trim().to_string();
            if name.is_empty() {
                return Err("attribute name missing".into());
            }
            return Ok(Simple::Attr {
                name,
                op,
                value: strip_quotes(&inner[pos + token.len()..]),
            });
        }
    }
    Ok(Simple::Attr {
        name: inner.trim().to_string(),
        op: AttrOp::Exists,
        value: String::new(),
    })
}

enum XPathPredicate {
    None,
    Attr(String, String),
    Index(usize),
}

fn parse_xpath_step(step: &str) -> Result<(String, XPathPredicate), String> {
    let Some(open) = step.find('[') else {
        return Ok((step.to_lowercase(), XPathPredicate::None));
    };
    let tag = step[..open].to_lowercase();
    let inner = step[open + 1..]
        .strip_suffix(']')
        .ok_or("unclosed predicate")?;
    if let Some(attr) = inner.strip_prefix('@') {
        let (name, value) = attr.split_once('=').ok_or("unsupported predicate")?;
        return Ok((tag, XPathPredicate::Attr(name.to_string(), strip_quotes(value))));
    }
    let n = inner.parse().map_err(|_| "unsupported predicate")?;
    Ok((tag, XPathPredicate::Index(n)))
}

#[async_trait]
impl PageDriver for FakePage {
    async fn count(&self, locator: &Locator) -> DriverResult<usize> {
        self.pause().await;
        self.tick()?;
        Ok(self.resolve(&locator.all())?.len())
    }

    async fn inspect(&self, locator: &Locator, limit: usize) -> DriverResult<Vec<MatchedElement>> {
        self.pause().await;
        self.tick()?;
        let found = self.resolve(locator)?;
        Ok(self.with_dom(|dom| {
            found
                .iter()
                .take(limit)
                .enumerate()
                .map(|(position, index)| dom.matched(position, *index))
                .collect()
        }))
    }

    async fn element_at_point(&self, x: f64, y: f64) -> DriverResult<Option<PointElement>> {
        self.tick()?;
        Ok(self.with_dom(|dom| {
            dom.at_point(x, y).map(|i| PointElement {
                tag_name: dom.elements[i].tag.to_uppercase(),
                id: dom.elements[i].get("id").map(str::to_string),
                visible: dom.visible(i),
            })
        }))
    }

    async fn text_candidates(
        &self,
        tags: &[&str],
        max_len: usize,
    ) -> DriverResult<Vec<TextCandidate>> {
        self.tick()?;
        Ok(self.with_dom(|dom| {
            dom.order()
                .into_iter()
                .filter(|i| {
                    tags.iter()
                        .any(|t| t.eq_ignore_ascii_case(&dom.elements[*i].tag))
                })
                .filter_map(|i| {
                    let text = dom.text_content(i).trim().to_string();
                    let len = text.chars().count();
                    (len > 0 && len < max_len).then(|| TextCandidate {
                        tag_name: dom.elements[i].tag.to_uppercase(),
                        id: dom.elements[i].get("id").map(str::to_string),
                        class_name: dom.elements[i].get("class").map(str::to_string),
                        text,
                    })
                })
                .collect()
        }))
    }

    async fn page_signature(&self, limit: usize) -> DriverResult<Vec<SignatureEntry>> {
        self.tick()?;
        Ok(self.with_dom(|dom| {
            dom.order()
                .into_iter()
                .filter(|i| {
                    let e = &dom.elements[*i];
                    matches!(
                        e.tag.as_str(),
                        "button" | "a" | "input" | "select" | "textarea"
                    ) || e.get("role").is_some()
                })
                .take(limit)
                .map(|i| {
                    let e = &dom.elements[i];
                    let attr = |n: &str| e.get(n).unwrap_or_default().to_string();
                    SignatureEntry {
                        tag: e.tag.clone(),
                        aria_label: attr("aria-label"),
                        role: attr("role"),
                        name: attr("name"),
                        input_type: attr("type"),
                        placeholder: attr("placeholder"),
                    }
                })
                .collect()
        }))
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.state.lock().unwrap().url.clone())
    }

    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.state.lock().unwrap().url = url.to_string();
        self.log(format!("goto {}", url));
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> DriverResult<()> {
        self.tick()?;
        let index = self.resolve_one(locator)?;
        self.log(format!("click #{} {}", index, locator));
        Ok(())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> DriverResult<()> {
        self.tick()?;
        let index = self.resolve_one(locator)?;
        if !self.with_dom(|dom| dom.editable(index)) {
            return Err(DriverError::Protocol("element is not editable".into()));
        }
        self.state.lock().unwrap().elements[index]
            .attrs
            .insert("value".into(), value.to_string());
        self.log(format!("fill #{} {}", index, value));
        Ok(())
    }

    async fn hover(&self, locator: &Locator) -> DriverResult<()> {
        let index = self.resolve_one(locator)?;
        self.log(format!("hover #{}", index));
        Ok(())
    }

    async fn select_option(&self, locator: &Locator, value: &str) -> DriverResult<()> {
        let index = self.resolve_one(locator)?;
        self.state.lock().unwrap().elements[index]
            .attrs
            .insert("value".into(), value.to_string());
        self.log(format!("select #{} {}", index, value));
        Ok(())
    }

    async fn scroll_into_view(&self, locator: &Locator) -> DriverResult<()> {
        let index = self.resolve_one(locator)?;
        self.log(format!("scroll #{}", index));
        Ok(())
    }

    async fn scroll_by(&self, dx: f64, dy: f64) -> DriverResult<()> {
        self.log(format!("scrollBy {} {}", dx, dy));
        Ok(())
    }

    async fn click_at(&self, x: f64, y: f64) -> DriverResult<()> {
        self.log(format!("clickAt {} {}", x, y));
        Ok(())
    }

    async fn type_focused(&self, value: &str) -> DriverResult<()> {
        self.log(format!("type {}", value));
        Ok(())
    }

    async fn screenshot_base64(&self) -> DriverResult<String> {
        Ok("ZmFrZQ==".to_string())
    }
}

impl FakePage {
    fn index_of(&self, backend_node_id: i64) -> DriverResult<usize> {
        let len = self.state.lock().unwrap().elements.len();
        let index = backend_node_id - 1;
        if index < 0 || index as usize >= len {
            return Err(DriverError::StaleContext(format!(
                "No node with given id found: {}",
                backend_node_id
            )));
        }
        Ok(index as usize)
    }
}

#[async_trait]
impl DevTools for FakePage {
    async fn node_for_location(&self, x: f64, y: f64) -> DriverResult<Option<i64>> {
        self.tick()?;
        Ok(self.with_dom(|dom| dom.at_point(x, y).map(|i| i as i64 + 1)))
    }

    async fn describe_node(&self, backend_node_id: i64) -> DriverResult<DomNode> {
        self.tick()?;
        let index = self.index_of(backend_node_id)?;
        Ok(self.with_dom(|dom| DomNode {
            backend_node_id,
            node_name: dom.elements[index].tag.to_uppercase(),
            node_type: 1,
            node_value: String::new(),
            attributes: dom.elements[index].attrs.clone(),
        }))
    }

    async fn parent_of(&self, backend_node_id: i64) -> DriverResult<Option<i64>> {
        let index = self.index_of(backend_node_id)?;
        Ok(self.with_dom(|dom| dom.elements[index].parent.map(|p| p as i64 + 1)))
    }

    async fn box_model(&self, backend_node_id: i64) -> DriverResult<Option<BoundingBox>> {
        let index = self.index_of(backend_node_id)?;
        Ok(self.with_dom(|dom| dom.visible(index).then_some(dom.elements[index].bbox)))
    }

    async fn partial_ax_tree(&self, backend_node_id: i64) -> DriverResult<Vec<AxNode>> {
        self.tick()?;
        let index = self.index_of(backend_node_id)?;
        Ok(self.with_dom(|dom| {
            std::iter::once(index)
                .chain(dom.ancestors(index))
                .filter(|i| dom.elements[*i].has_ax)
                .map(|i| dom.ax_node(i))
                .collect()
        }))
    }

    async fn query_ax_tree(&self, role: &str, name: &str) -> DriverResult<Vec<AxNode>> {
        self.tick()?;
        Ok(self.with_dom(|dom| {
            dom.order()
                .into_iter()
                .filter(|i| dom.elements[*i].has_ax)
                .map(|i| dom.ax_node(i))
                .filter(|n| n.role() == Some(role) && n.name() == Some(name))
                .collect()
        }))
    }

    async fn full_ax_tree(&self) -> DriverResult<Vec<AxNode>> {
        self.tick()?;
        Ok(self.with_dom(|dom| {
            dom.order()
                .into_iter()
                .filter(|i| dom.elements[*i].has_ax)
                .map(|i| dom.ax_node(i))
                .collect()
        }))
    }

    async fn call_function_on(
        &self,
        backend_node_id: i64,
        declaration: &str,
    ) -> DriverResult<serde_json::Value> {
        let index = self.index_of(backend_node_id)?;
        if declaration != DESCRIBE_FN {
            return Err(DriverError::Unsupported(
                "fake page only evaluates the describe function".into(),
            ));
        }
        Ok(self.with_dom(|dom| {
            serde_json::json!({
                "text": dom.text_content(index),
                "xpath": dom.xpath_of(index),
                "cssPath": dom.css_path_of(index),
                "inViewport": dom.visible(index),
                "structure": dom.structure_of(index),
                "label": dom.label_of(index),
            })
        }))
    }

    async fn refresh(&self) -> DriverResult<()> {
        self.state.lock().unwrap().refreshes += 1;
        Ok(())
    }
}
