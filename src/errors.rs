use std::fmt;

use thiserror::Error;

/// Failure reported by one of the browser capabilities (`PageDriver` / `DevTools`)
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DriverError {
    /// Nothing exists at the requested point or handle
    #[error("node not found: {0}")]
    NotFound(String),
    /// The page navigated and invalidated node handles or execution contexts
    #[error("execution context was destroyed: {0}")]
    StaleContext(String),
    /// The browser rejected a CSS/XPath expression
    #[error("invalid selector '{selector}': {reason}")]
    InvalidSelector { selector: String, reason: String },
    /// The call did not complete in time
    #[error("driver call timed out: {0}")]
    Timeout(String),
    /// The capability is not available for this browser
    #[error("unsupported: {0}")]
    Unsupported(String),
    /// Any other protocol or transport failure
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl DriverError {
    /// Classify a raw error message coming back from WebDriver or CDP
    pub fn from_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let lower = msg.to_lowercase();
        if lower.contains("context was destroyed")
            || lower.contains("cannot find context")
            || lower.contains("navigation")
            || lower.contains("no node with given id")
            || lower.contains("stale element")
        {
            DriverError::StaleContext(msg)
        } else if lower.contains("not a valid selector")
            || lower.contains("syntaxerror")
            || lower.contains("invalid selector")
        {
            DriverError::InvalidSelector {
                selector: String::new(),
                reason: msg,
            }
        } else if lower.contains("could not find node") || lower.contains("no such element") {
            DriverError::NotFound(msg)
        } else if lower.contains("timed out") || lower.contains("timeout") {
            DriverError::Timeout(msg)
        } else {
            DriverError::Protocol(msg)
        }
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, DriverError::StaleContext(_))
    }
}

/// Why a single strategy did not produce a usable match.
///
/// None of these escape the strategy that produced them: the cascade turns each
/// one into an "advance to the next strategy" decision.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolveError {
    #[error("no element matched {0}")]
    NodeNotFound(String),
    #[error("{count} elements matched {selector} and no tie-break winner was found")]
    AmbiguousMatch { selector: String, count: usize },
    #[error("page context went stale: {0}")]
    StaleContext(String),
    #[error("malformed selector '{selector}': {reason}")]
    SelectorSyntax { selector: String, reason: String },
    #[error("{0} matched but none of the matches accepts input")]
    EditableMismatch(String),
    #[error("strategy timed out after {0} ms")]
    Timeout(u64),
    #[error("strategy not applicable: {0}")]
    NotApplicable(String),
    #[error(transparent)]
    Driver(DriverError),
}

impl From<DriverError> for ResolveError {
    fn from(err: DriverError) -> Self {
        match err {
            DriverError::StaleContext(msg) => ResolveError::StaleContext(msg),
            DriverError::NotFound(msg) => ResolveError::NodeNotFound(msg),
            DriverError::InvalidSelector { selector, reason } => {
                ResolveError::SelectorSyntax { selector, reason }
            }
            other => ResolveError::Driver(other),
        }
    }
}

impl ResolveError {
    pub fn is_stale(&self) -> bool {
        matches!(self, ResolveError::StaleContext(_))
    }
}

/// Top-level error type that carries a process exit code
#[derive(Debug)]
pub enum SelfhealError {
    /// The cascade and both rescue heuristics were exhausted (exit code 2)
    NotResolved(String),
    /// A non-optional playbook step failed (exit code 3)
    StepFailed { step_id: String, message: String },
    /// WebDriver or DevTools connection failed (exit code 4)
    DriverUnavailable(String),
    /// Operation timeout (exit code 5)
    Timeout(String),
    /// Unreadable step, playbook, snapshot or config file (exit code 6)
    InvalidInput(String),
    /// Generic error (exit code 1)
    Other(anyhow::Error),
}

impl SelfhealError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            SelfhealError::NotResolved(_) => 2,
            SelfhealError::StepFailed { .. } => 3,
            SelfhealError::DriverUnavailable(_) => 4,
            SelfhealError::Timeout(_) => 5,
            SelfhealError::InvalidInput(_) => 6,
            SelfhealError::Other(_) => 1,
        }
    }

    /// Short machine-readable kind used in JSON error output
    pub fn kind(&self) -> &'static str {
        match self {
            SelfhealError::NotResolved(_) => "not_resolved",
            SelfhealError::StepFailed { .. } => "step_failed",
            SelfhealError::DriverUnavailable(_) => "driver_unavailable",
            SelfhealError::Timeout(_) => "timeout",
            SelfhealError::InvalidInput(_) => "invalid_input",
            SelfhealError::Other(_) => "error",
        }
    }
}

impl fmt::Display for SelfhealError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelfhealError::NotResolved(msg) => write!(f, "Element could not be resolved: {}", msg),
            SelfhealError::StepFailed { step_id, message } => {
                write!(f, "Step '{}' failed: {}", step_id, message)
            }
            SelfhealError::DriverUnavailable(msg) => {
                write!(f, "Browser driver unavailable: {}", msg)
            }
            SelfhealError::Timeout(msg) => write!(f, "Operation timed out: {}", msg),
            SelfhealError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            SelfhealError::Other(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for SelfhealError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SelfhealError::Other(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<anyhow::Error> for SelfhealError {
    fn from(err: anyhow::Error) -> Self {
        let err = match err.downcast::<SelfhealError>() {
            Ok(selfheal) => return selfheal,
            Err(err) => err,
        };

        let msg = err.to_string();
        if msg.contains("Failed to connect to WebDriver")
            || msg.contains("chromedriver")
            || msg.contains("geckodriver")
            || msg.contains("DevTools endpoint")
        {
            SelfhealError::DriverUnavailable(msg)
        } else if msg.contains("timed out") {
            SelfhealError::Timeout(msg)
        } else {
            SelfhealError::Other(err)
        }
    }
}

#[cfg(test)]
#[path = "errors_test.rs"]
mod errors_test;
