//! Snapshot and accessibility capture at a viewport point.
//!
//! The node under the point is resolved through the DevTools capability. Generic
//! wrappers (a `<span>` inside a tab, a styled `<div>` acting as a button) are
//! escalated to the nearest clickable ancestor: first along the accessibility
//! tree, then along raw DOM ancestors with tag, role-attribute and class hints,
//! synthesizing an accessibility node when the matched ancestor has none.
//!
//! Stale contexts and vanished nodes are soft failures: every public method
//! returns `None` (or an empty list) and logs at debug level.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::driver::{AxNode, DevTools, DriverResult};
use crate::generator::identity_from_snapshot;
use crate::stability::strip_dynamic_state;
use crate::types::{
    BoundingBox, ElementIdentity, ElementSnapshot, LabelAssociation, StructuralPosition,
};

/// Roles a user can act on directly
pub const CLICKABLE_ROLES: &[&str] = &[
    "button",
    "link",
    "tab",
    "menuitem",
    "menuitemcheckbox",
    "menuitemradio",
    "option",
    "radio",
    "checkbox",
    "switch",
    "treeitem",
    "row",
    "gridcell",
    "textbox",
    "searchbox",
    "combobox",
    "listbox",
    "slider",
    "spinbutton",
];

/// Roles included in an interactive-element scan
pub const INTERACTIVE_ROLES: &[&str] = &[
    "button",
    "link",
    "textbox",
    "checkbox",
    "radio",
    "tab",
    "menuitem",
    "option",
    "combobox",
    "listbox",
    "searchbox",
    "slider",
    "spinbutton",
    "switch",
    "treeitem",
    "gridcell",
    "row",
];

const CLICKABLE_TAGS: &[&str] = &["BUTTON", "A", "INPUT", "SELECT", "TEXTAREA"];

/// Class fragments used by the target site family's non-semantic tab widgets
const TAB_CLASS_HINTS: &[&str] = &["cl-tabfolder-item", "tab-item", "tab-button", "cl-button"];

const BUTTON_CLASS_HINTS: &[&str] = &["cl-button", "btn-login", "btn-"];

/// Evaluated with `this` bound to the captured element. Returns its text,
/// absolute paths, viewport flag, structural position and label association.
pub const DESCRIBE_FN: &str = r#"function() {
  const el = this;
  const dynamicId = /^[a-f0-9]{8}-|^\d{10,}|_\d+$|-\d+$|^react-|^ember|^ng-|^:r[0-9a-z]+:/i;
  const unstableClass = /^(css-|sc-|_[a-z0-9]{5,}|emotion-)/i;

  const xpathOf = (node) => {
    const parts = [];
    for (let n = node; n && n.nodeType === 1; n = n.parentElement) {
      let index = 1;
      for (let s = n.previousElementSibling; s; s = s.previousElementSibling) {
        if (s.tagName === n.tagName) index++;
      }
      parts.unshift(n.tagName.toLowerCase() + '[' + index + ']');
    }
    return '/' + parts.join('/');
  };

  const cssPathOf = (node) => {
    const parts = [];
    for (let n = node; n && n.nodeType === 1; n = n.parentElement) {
      if (n.id && !dynamicId.test(n.id) && /^[A-Za-z][\w-]*$/.test(n.id)) {
        parts.unshift('#' + n.id);
        break;
      }
      let index = 1;
      for (let s = n.previousElementSibling; s; s = s.previousElementSibling) {
        if (s.tagName === n.tagName) index++;
      }
      parts.unshift(n.tagName.toLowerCase() + ':nth-of-type(' + index + ')');
    }
    return parts.join(' > ');
  };

  const parentChain = [];
  let current = el.parentElement;
  while (current && current !== document.body && parentChain.length < 5) {
    const tagName = current.tagName.toLowerCase();
    const id = current.id && !dynamicId.test(current.id) ? current.id : undefined;
    const classes = (current.getAttribute('class') || '')
      .split(/\s+/)
      .filter((c) => c && !unstableClass.test(c))
      .slice(0, 2);
    const role = current.getAttribute('role') || undefined;
    let selector = tagName;
    if (id) selector = '#' + id;
    else if (role) selector = '[role="' + role + '"]';
    else if (classes.length) selector = tagName + '.' + classes.join('.');
    parentChain.push({
      tagName,
      id,
      role,
      ariaLabel: current.getAttribute('aria-label') || undefined,
      className: classes.length ? classes.join(' ') : undefined,
      selector,
      isLandmark: ['header', 'nav', 'main', 'aside', 'footer'].includes(tagName),
      isForm: tagName === 'form',
    });
    current = current.parentElement;
  }

  const siblings = el.parentElement ? Array.from(el.parentElement.children) : [];
  const position = siblings.indexOf(el);
  const prev = el.previousElementSibling;
  const next = el.nextElementSibling;
  const sameTag = siblings.filter((s) => s.tagName === el.tagName);
  const isField = ['INPUT', 'TEXTAREA', 'SELECT'].includes(el.tagName);
  let formElementIndex;
  const form = el.closest('form');
  if (form && isField) {
    formElementIndex = Array.from(form.querySelectorAll('input, textarea, select')).indexOf(el) + 1;
  }

  let label;
  if (isField) {
    const textOf = (n) => (n.textContent || '').trim();
    const byFor = el.id ? document.querySelector('label[for="' + CSS.escape(el.id) + '"]') : null;
    if (byFor && textOf(byFor)) {
      label = { labelText: textOf(byFor), relationship: 'for' };
    } else if (prev && prev.tagName === 'LABEL' && textOf(prev)) {
      label = { labelText: textOf(prev), relationship: 'sibling' };
    } else {
      const wrapping = el.closest('label');
      if (wrapping && textOf(wrapping)) {
        label = { labelText: textOf(wrapping), relationship: 'parent' };
      }
    }
  }

  const rect = el.getBoundingClientRect();
  return {
    text: (el.textContent || '').trim().slice(0, 200),
    xpath: xpathOf(el),
    cssPath: cssPathOf(el),
    inViewport: rect.bottom > 0 && rect.right > 0 &&
      rect.top < window.innerHeight && rect.left < window.innerWidth,
    structure: {
      parentChain,
      siblingInfo: {
        prevSiblingText: prev ? (prev.textContent || '').trim().slice(0, 50) || undefined : undefined,
        nextSiblingText: next ? (next.textContent || '').trim().slice(0, 50) || undefined : undefined,
        prevSiblingTag: prev ? prev.tagName.toLowerCase() : undefined,
        nextSiblingTag: next ? next.tagName.toLowerCase() : undefined,
        totalSiblings: siblings.length,
        position: Math.max(position, 0),
      },
      nthChild: position + 1,
      nthOfType: sameTag.indexOf(el) + 1,
      formElementIndex,
    },
    label,
  };
}"#;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Described {
    text: Option<String>,
    xpath: String,
    css_path: String,
    in_viewport: bool,
    structure: Option<StructuralPosition>,
    label: Option<LabelAssociation>,
}

/// Accessibility facts about one node, after escalation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityInfo {
    pub backend_node_id: i64,
    pub role: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
    pub bounding_box: BoundingBox,
    /// Built from DOM hints because the matched ancestor had no accessibility node
    #[serde(default)]
    pub synthesized: bool,
}

fn is_generic(node: &AxNode) -> bool {
    match node.role() {
        None => true,
        Some("generic" | "none" | "StaticText") => true,
        Some(role) => node.name().is_none() && !CLICKABLE_ROLES.contains(&role),
    }
}

/// Parent by `childIds` lookup within a partial tree
fn ax_parent<'a>(nodes: &'a [AxNode], node: &AxNode) -> Option<&'a AxNode> {
    nodes
        .iter()
        .find(|n| n.child_ids.iter().any(|c| *c == node.node_id))
}

fn clickable_ax_parent(nodes: &[AxNode], start: &AxNode) -> Option<AxNode> {
    let mut visited = std::collections::HashSet::new();
    let mut current = start;
    visited.insert(current.node_id.clone());
    while let Some(parent) = ax_parent(nodes, current) {
        if !visited.insert(parent.node_id.clone()) {
            break;
        }
        if parent
            .role()
            .is_some_and(|role| CLICKABLE_ROLES.contains(&role))
        {
            return Some(parent.clone());
        }
        current = parent;
    }
    None
}

fn first_meaningful_parent(nodes: &[AxNode], start: &AxNode) -> Option<AxNode> {
    let mut current = start;
    while let Some(parent) = ax_parent(nodes, current) {
        if !parent.ignored && !matches!(parent.role(), None | Some("none" | "generic")) {
            return Some(parent.clone());
        }
        current = parent;
    }
    None
}

/// Captures snapshots and identities through the DevTools capability
pub struct Capturer {
    devtools: Arc<dyn DevTools>,
    config: ResolverConfig,
}

impl Capturer {
    pub fn new(devtools: Arc<dyn DevTools>, config: ResolverConfig) -> Self {
        Capturer { devtools, config }
    }

    /// Snapshot of the (escalated) element at a viewport point
    pub async fn capture_at(&self, x: f64, y: f64) -> Option<ElementSnapshot> {
        self.capture_full(x, y).await.map(|(snapshot, _)| snapshot)
    }

    /// Durable identity of the (escalated) element at a viewport point
    pub async fn capture_identity(&self, x: f64, y: f64) -> Option<ElementIdentity> {
        let (snapshot, info) = self.capture_full(x, y).await?;
        Some(identity_with_parent(&snapshot, &info))
    }

    /// Snapshot plus the accessibility facts it was built from
    pub async fn capture_full(&self, x: f64, y: f64) -> Option<(ElementSnapshot, AccessibilityInfo)> {
        match self.try_capture(x, y).await {
            Ok(found) => found,
            Err(e) => {
                debug!("Capture at ({}, {}) failed softly: {}", x, y, e);
                None
            }
        }
    }

    async fn try_capture(
        &self,
        x: f64,
        y: f64,
    ) -> DriverResult<Option<(ElementSnapshot, AccessibilityInfo)>> {
        let Some(backend_node_id) = self.devtools.node_for_location(x, y).await? else {
            debug!("No node at ({}, {})", x, y);
            return Ok(None);
        };

        let info = match self.accessibility_info(backend_node_id).await {
            Some(info) => info,
            None => AccessibilityInfo {
                backend_node_id,
                role: "generic".into(),
                bounding_box: self
                    .devtools
                    .box_model(backend_node_id)
                    .await
                    .ok()
                    .flatten()
                    .unwrap_or_default(),
                ..Default::default()
            },
        };

        let target = info.backend_node_id;
        let node = self.devtools.describe_node(target).await?;
        let described: Described = match self.devtools.call_function_on(target, DESCRIBE_FN).await
        {
            Ok(value) => serde_json::from_value(value).unwrap_or_else(|e| {
                warn!("Unexpected describe result: {}", e);
                Described::default()
            }),
            Err(e) if e.is_stale() => return Err(e),
            Err(e) => {
                debug!("Describe failed for node {}: {}", target, e);
                Described::default()
            }
        };

        let bbox = info.bounding_box;
        let snapshot = ElementSnapshot {
            node_id: 0,
            backend_node_id: target,
            tag_name: node.tag(),
            attributes: node.attributes.clone(),
            text_content: described.text.filter(|t| !t.trim().is_empty()),
            bounding_box: bbox,
            is_visible: !bbox.is_zero(),
            is_in_viewport: described.in_viewport,
            xpath: described.xpath,
            css_path: described.css_path,
            role: Some(info.role.clone()).filter(|r| !r.is_empty()),
            name: Some(info.name.clone()).filter(|n| !n.is_empty()),
            label: described.label,
            structure: described.structure,
        };
        debug!(
            "Captured <{}> role={:?} name={:?} at ({}, {})",
            snapshot.tag_name, snapshot.role, snapshot.name, x, y
        );
        Ok(Some((snapshot, info)))
    }

    /// Role, name, box and parent facts for a node, escalating generic wrappers
    pub async fn accessibility_info(&self, backend_node_id: i64) -> Option<AccessibilityInfo> {
        match self.try_accessibility_info(backend_node_id).await {
            Ok(info) => info,
            Err(e) => {
                debug!("Accessibility info for {} failed softly: {}", backend_node_id, e);
                None
            }
        }
    }

    async fn try_accessibility_info(
        &self,
        backend_node_id: i64,
    ) -> DriverResult<Option<AccessibilityInfo>> {
        let nodes = self.devtools.partial_ax_tree(backend_node_id).await?;
        if nodes.is_empty() {
            return Ok(None);
        }

        let mut target_backend = backend_node_id;
        let mut synthesized = false;
        let mut target = nodes
            .iter()
            .find(|n| n.backend_dom_node_id == Some(backend_node_id))
            .or_else(|| {
                nodes
                    .iter()
                    .find(|n| !n.ignored && !matches!(n.role(), None | Some("none")))
            })
            .cloned();

        if let Some(node) = &target
            && is_generic(node)
        {
            let escalated = match clickable_ax_parent(&nodes, node) {
                Some(parent) => Some(parent),
                None => {
                    debug!("No clickable parent in accessibility tree, walking DOM");
                    self.clickable_dom_ancestor(backend_node_id).await?
                }
            };
            if let Some(parent) = escalated {
                debug!(
                    "Escalated to role={:?} name={:?}",
                    parent.role(),
                    parent.name()
                );
                synthesized = parent.node_id.starts_with("dom-");
                if let Some(id) = parent.backend_dom_node_id {
                    target_backend = id;
                }
                target = Some(parent);
            }
        }

        let target = match target {
            Some(node) if !node.ignored => node,
            other => match other.and_then(|node| first_meaningful_parent(&nodes, &node)) {
                Some(parent) => parent,
                None => return Ok(None),
            },
        };

        let bounding_box = match self.devtools.box_model(target_backend).await {
            Ok(bbox) => bbox.unwrap_or_default(),
            Err(e) if e.is_stale() => return Err(e),
            Err(_) => BoundingBox::default(),
        };

        let parent = ax_parent(&nodes, &target);
        Ok(Some(AccessibilityInfo {
            backend_node_id: target_backend,
            role: target.role().unwrap_or("generic").to_string(),
            name: target.name().unwrap_or_default().to_string(),
            description: target.description.clone(),
            parent_role: parent.and_then(|p| p.role()).map(str::to_string),
            parent_name: parent.and_then(|p| p.name()).map(str::to_string),
            bounding_box,
            synthesized,
        }))
    }

    /// Walk the element and its DOM ancestors for something clickable
    async fn clickable_dom_ancestor(&self, backend_node_id: i64) -> DriverResult<Option<AxNode>> {
        let mut current = backend_node_id;
        for depth in 0..self.config.dom_walk_depth {
            let node = self.devtools.describe_node(current).await?;
            let role = node.attr("role");
            let class = node.attr("class").unwrap_or_default();
            let tab_like = TAB_CLASS_HINTS.iter().any(|hint| class.contains(hint));
            let button_like = BUTTON_CLASS_HINTS.iter().any(|hint| class.contains(hint));
            debug!("DOM walk [{}]: {} role={:?}", depth, node.node_name, role);

            let clickable = role.is_some_and(|r| CLICKABLE_ROLES.contains(&r))
                || CLICKABLE_TAGS.contains(&node.node_name.to_uppercase().as_str())
                || tab_like
                || button_like;
            if clickable {
                let ax = self.devtools.partial_ax_tree(current).await?;
                if let Some(found) = ax
                    .into_iter()
                    .find(|n| n.backend_dom_node_id == Some(current) && !n.ignored)
                {
                    return Ok(Some(found));
                }
                let inferred = if tab_like {
                    "tab".to_string()
                } else if button_like {
                    "button".to_string()
                } else {
                    role.map(str::to_string).unwrap_or_else(|| node.tag())
                };
                return Ok(Some(AxNode {
                    node_id: format!("dom-{}", current),
                    role: Some(inferred),
                    name: node.attr("aria-label").map(strip_dynamic_state),
                    backend_dom_node_id: Some(current),
                    ..Default::default()
                }));
            }

            match self.devtools.parent_of(current).await? {
                Some(parent) => current = parent,
                None => break,
            }
        }
        Ok(None)
    }

    /// Interactive accessibility nodes with a rendered box, in document order
    pub async fn scan_interactive_elements(&self) -> Vec<AccessibilityInfo> {
        let nodes = match self.devtools.full_ax_tree().await {
            Ok(nodes) => nodes,
            Err(e) => {
                debug!("Accessibility scan failed softly: {}", e);
                return Vec::new();
            }
        };

        let mut out = Vec::new();
        for node in &nodes {
            if node.ignored {
                continue;
            }
            let Some(role) = node.role().filter(|r| INTERACTIVE_ROLES.contains(r)) else {
                continue;
            };
            let Some(backend) = node.backend_dom_node_id else {
                continue;
            };
            let Ok(Some(bbox)) = self.devtools.box_model(backend).await else {
                continue;
            };
            if bbox.is_zero() {
                continue;
            }
            let parent = ax_parent(&nodes, node);
            out.push(AccessibilityInfo {
                backend_node_id: backend,
                role: role.to_string(),
                name: node.name().unwrap_or_default().to_string(),
                description: node.description.clone(),
                parent_role: parent.and_then(|p| p.role()).map(str::to_string),
                parent_name: parent.and_then(|p| p.name()).map(str::to_string),
                bounding_box: bbox,
                synthesized: false,
            });
        }
        debug!("Scanned {} interactive elements", out.len());
        out
    }

    /// Accessibility nodes with exactly this role and name
    pub async fn query_by_role_name(&self, role: &str, name: &str) -> Vec<AccessibilityInfo> {
        let nodes = match self.devtools.query_ax_tree(role, name).await {
            Ok(nodes) => nodes,
            Err(e) => {
                debug!("Accessibility query failed softly: {}", e);
                return Vec::new();
            }
        };
        let mut out = Vec::new();
        for node in nodes {
            if !node.ignored && matches!(node.role(), Some("none" | "generic")) {
                continue;
            }
            let Some(backend) = node.backend_dom_node_id else {
                continue;
            };
            let bounding_box = self
                .devtools
                .box_model(backend)
                .await
                .ok()
                .flatten()
                .unwrap_or_default();
            out.push(AccessibilityInfo {
                backend_node_id: backend,
                role: node.role().unwrap_or(role).to_string(),
                name: node.name().unwrap_or(name).to_string(),
                description: node.description.clone(),
                bounding_box,
                ..Default::default()
            });
        }
        out
    }

    /// Reattach after a navigation invalidated node handles
    pub async fn refresh_session(&self) -> bool {
        match self.devtools.refresh().await {
            Ok(()) => {
                debug!("DevTools session refreshed");
                true
            }
            Err(e) => {
                warn!("DevTools session refresh failed: {}", e);
                false
            }
        }
    }
}

/// Identity from a snapshot, with the accessibility parent filled in
pub fn identity_with_parent(snapshot: &ElementSnapshot, info: &AccessibilityInfo) -> ElementIdentity {
    let mut identity = identity_from_snapshot(snapshot);
    identity.parent_role = info.parent_role.clone();
    identity.parent_name = info.parent_name.clone();
    identity
}

#[cfg(test)]
#[path = "capture_test.rs"]
mod capture_test;
