//! Browser capabilities the resolver is built on.
//!
//! `PageDriver` is the high-level driver (locate, count, act); `DevTools` is the
//! low-level CDP-style capability (nodes at points, box models, accessibility
//! tree). Production implementations live in `webdriver` and `devtools`; tests
//! use an in-memory page.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::errors::DriverError;
use crate::locator::Locator;
use crate::types::BoundingBox;

pub type DriverResult<T> = Result<T, DriverError>;

/// Live facts about one element matched by a locator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedElement {
    /// Position among the locator's matches, document order
    pub index: usize,
    /// Uppercase tag name, as reported by the DOM
    pub tag_name: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub visible: bool,
    #[serde(default)]
    pub editable: bool,
    #[serde(default)]
    pub bounding_box: BoundingBox,
}

impl MatchedElement {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn role(&self) -> Option<&str> {
        self.attr("role")
    }
}

/// Element currently rendered at a viewport point
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointElement {
    pub tag_name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub visible: bool,
}

/// Text-bearing element found by the fuzzy rescue tree walk
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextCandidate {
    pub tag_name: String,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    pub text: String,
}

/// One interactive element's contribution to the page structure hash
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureEntry {
    pub tag: String,
    #[serde(default)]
    pub aria_label: String,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub input_type: String,
    #[serde(default)]
    pub placeholder: String,
}

/// High-level browser driver
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Number of elements the locator currently matches (ignores `nth`)
    async fn count(&self, locator: &Locator) -> DriverResult<usize>;

    /// Descriptors for the first `limit` matches
    async fn inspect(&self, locator: &Locator, limit: usize) -> DriverResult<Vec<MatchedElement>>;

    async fn element_at_point(&self, x: f64, y: f64) -> DriverResult<Option<PointElement>>;

    /// Elements with one of `tags` whose trimmed text is non-empty and shorter than `max_len`
    async fn text_candidates(
        &self,
        tags: &[&str],
        max_len: usize,
    ) -> DriverResult<Vec<TextCandidate>>;

    /// Interactive elements in document order, capped at `limit`
    async fn page_signature(&self, limit: usize) -> DriverResult<Vec<SignatureEntry>>;

    async fn current_url(&self) -> DriverResult<String>;

    async fn goto(&self, url: &str) -> DriverResult<()>;

    async fn click(&self, locator: &Locator) -> DriverResult<()>;

    /// Replace the value of an editable element
    async fn fill(&self, locator: &Locator, value: &str) -> DriverResult<()>;

    async fn hover(&self, locator: &Locator) -> DriverResult<()>;

    /// Select an `<option>` by value, falling back to its label
    async fn select_option(&self, locator: &Locator, value: &str) -> DriverResult<()>;

    async fn scroll_into_view(&self, locator: &Locator) -> DriverResult<()>;

    async fn scroll_by(&self, dx: f64, dy: f64) -> DriverResult<()>;

    async fn click_at(&self, x: f64, y: f64) -> DriverResult<()>;

    /// Type into whatever element currently has focus
    async fn type_focused(&self, value: &str) -> DriverResult<()>;

    async fn screenshot_base64(&self) -> DriverResult<String>;
}

/// DOM node as returned by a describe-node call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomNode {
    pub backend_node_id: i64,
    /// Uppercase for elements, `#text` for text nodes
    pub node_name: String,
    #[serde(default)]
    pub node_type: i64,
    #[serde(default)]
    pub node_value: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl DomNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn tag(&self) -> String {
        self.node_name.to_lowercase()
    }
}

/// Accessibility tree node
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AxNode {
    pub node_id: String,
    #[serde(default)]
    pub ignored: bool,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub child_ids: Vec<String>,
    #[serde(default)]
    pub backend_dom_node_id: Option<i64>,
}

impl AxNode {
    pub fn role(&self) -> Option<&str> {
        self.role.as_deref().filter(|r| !r.is_empty())
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
    }
}

/// Low-level CDP-style capability
#[async_trait]
pub trait DevTools: Send + Sync {
    /// Backend node id of the topmost element at the point
    async fn node_for_location(&self, x: f64, y: f64) -> DriverResult<Option<i64>>;

    async fn describe_node(&self, backend_node_id: i64) -> DriverResult<DomNode>;

    /// Parent element, `None` at the document root
    async fn parent_of(&self, backend_node_id: i64) -> DriverResult<Option<i64>>;

    /// Content box; `None` when the node has no layout
    async fn box_model(&self, backend_node_id: i64) -> DriverResult<Option<BoundingBox>>;

    /// Node plus its ancestors and siblings; the node itself comes first
    async fn partial_ax_tree(&self, backend_node_id: i64) -> DriverResult<Vec<AxNode>>;

    /// Accessibility nodes matching role and name across the document
    async fn query_ax_tree(&self, role: &str, name: &str) -> DriverResult<Vec<AxNode>>;

    async fn full_ax_tree(&self) -> DriverResult<Vec<AxNode>>;

    /// Run `declaration` (a JS function) with `this` bound to the node
    async fn call_function_on(
        &self,
        backend_node_id: i64,
        declaration: &str,
    ) -> DriverResult<serde_json::Value>;

    /// Detach and reattach after navigation invalidated node handles
    async fn refresh(&self) -> DriverResult<()>;
}
