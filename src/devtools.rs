//! CDP access to the browser WebDriver launched, over its remote-debugging port.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::accessibility::{
    AxNode as CdpAxNode, GetFullAxTreeParams, GetPartialAxTreeParams, QueryAxTreeParams,
};
use chromiumoxide::cdp::browser_protocol::dom::{
    BackendNodeId, DescribeNodeParams, GetBoxModelParams, GetDocumentParams,
    GetNodeForLocationParams, ResolveNodeParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{CallFunctionOnParams, RemoteObjectId};
use chromiumoxide::error::CdpError;
use chromiumoxide::{Browser as CdpBrowser, Handler, Page};
use futures::StreamExt;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::driver::{AxNode, DevTools, DomNode, DriverResult};
use crate::errors::DriverError;
use crate::types::BoundingBox;

#[derive(Deserialize)]
struct JsonVersion {
    #[serde(rename = "webSocketDebuggerUrl")]
    web_socket_debugger_url: String,
}

/// Chrome DevTools session attached to the first page target
pub struct CdpSession {
    browser: Mutex<CdpBrowser>,
    page: RwLock<Page>,
    handler_task: JoinHandle<()>,
}

fn cdp_error(err: CdpError) -> DriverError {
    DriverError::from_message(err.to_string())
}

async fn discover_ws_url(port: u16) -> Result<String> {
    let url = format!("http://127.0.0.1:{}/json/version", port);
    debug!("Requesting Chrome version info from: {}", url);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let resp = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("Failed to reach DevTools endpoint on port {}", port))?;
    if !resp.status().is_success() {
        anyhow::bail!("Chrome /json/version returned {}", resp.status());
    }
    let body: JsonVersion = resp
        .json()
        .await
        .context("Failed to parse Chrome debug response")?;
    Ok(body.web_socket_debugger_url)
}

async fn handler_loop(mut handler: Handler) {
    while let Some(event) = handler.next().await {
        if let Err(e) = event {
            debug!("CDP handler stopped: {}", e);
            break;
        }
    }
}

async fn first_page(browser: &mut CdpBrowser) -> Result<Page> {
    if let Err(e) = browser.fetch_targets().await {
        debug!("fetch_targets failed: {}", e);
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    let pages = browser.pages().await?;
    pages
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("Chrome has no open page to attach to"))
}

fn ax_value(value: &Option<chromiumoxide::cdp::browser_protocol::accessibility::AxValue>) -> Option<String> {
    value
        .as_ref()
        .and_then(|v| v.value.as_ref())
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

fn to_ax_node(node: &CdpAxNode) -> AxNode {
    AxNode {
        node_id: node.node_id.inner().clone(),
        ignored: node.ignored,
        role: ax_value(&node.role),
        name: ax_value(&node.name),
        description: ax_value(&node.description),
        child_ids: node
            .child_ids
            .as_ref()
            .map(|ids| ids.iter().map(|id| id.inner().clone()).collect())
            .unwrap_or_default(),
        backend_dom_node_id: node.backend_dom_node_id.as_ref().map(|id| *id.inner()),
    }
}

/// Box from a content quad `[x1, y1, ..., x4, y4]` and the model size
fn quad_box(quad: &[f64], width: i64, height: i64) -> Option<BoundingBox> {
    if quad.len() < 8 {
        return None;
    }
    let xs = [quad[0], quad[2], quad[4], quad[6]];
    let ys = [quad[1], quad[3], quad[5], quad[7]];
    let left = xs.iter().cloned().fold(f64::INFINITY, f64::min);
    let top = ys.iter().cloned().fold(f64::INFINITY, f64::min);
    Some(BoundingBox::new(left, top, width as f64, height as f64))
}

impl CdpSession {
    pub async fn connect(port: u16) -> Result<Self> {
        let ws_url = discover_ws_url(port).await?;
        info!("Attaching DevTools at {}", ws_url);
        let (mut browser, handler) = CdpBrowser::connect(ws_url)
            .await
            .context("CDP WebSocket connect failed")?;
        let handler_task = tokio::spawn(handler_loop(handler));
        let page = first_page(&mut browser).await?;
        Ok(CdpSession {
            browser: Mutex::new(browser),
            page: RwLock::new(page),
            handler_task,
        })
    }

    async fn page(&self) -> Page {
        self.page.read().await.clone()
    }

    async fn object_for(&self, backend_node_id: i64) -> DriverResult<RemoteObjectId> {
        let resp = self
            .page()
            .await
            .execute(
                ResolveNodeParams::builder()
                    .backend_node_id(BackendNodeId::new(backend_node_id))
                    .build(),
            )
            .await
            .map_err(cdp_error)?;
        resp.result
            .object
            .object_id
            .clone()
            .ok_or_else(|| DriverError::StaleContext(format!("node {} has no object", backend_node_id)))
    }

    async fn call_on_object(
        &self,
        object_id: RemoteObjectId,
        declaration: &str,
        by_value: bool,
    ) -> DriverResult<chromiumoxide::cdp::js_protocol::runtime::RemoteObject> {
        let params = CallFunctionOnParams::builder()
            .function_declaration(declaration)
            .object_id(object_id)
            .return_by_value(by_value)
            .build()
            .map_err(DriverError::Protocol)?;
        let resp = self.page().await.execute(params).await.map_err(cdp_error)?;
        if let Some(details) = &resp.result.exception_details {
            return Err(DriverError::Protocol(details.text.clone()));
        }
        Ok(resp.result.result.clone())
    }

    pub async fn close(self) {
        self.handler_task.abort();
    }
}

#[async_trait]
impl DevTools for CdpSession {
    async fn node_for_location(&self, x: f64, y: f64) -> DriverResult<Option<i64>> {
        let params = GetNodeForLocationParams::new(x.round() as i64, y.round() as i64);
        match self.page().await.execute(params).await {
            Ok(resp) => Ok(Some(*resp.result.backend_node_id.inner())),
            Err(e) if e.to_string().contains("No node found") => Ok(None),
            Err(e) => Err(cdp_error(e)),
        }
    }

    async fn describe_node(&self, backend_node_id: i64) -> DriverResult<DomNode> {
        let resp = self
            .page()
            .await
            .execute(
                DescribeNodeParams::builder()
                    .backend_node_id(BackendNodeId::new(backend_node_id))
                    .build(),
            )
            .await
            .map_err(cdp_error)?;
        let node = &resp.result.node;
        let attributes: BTreeMap<String, String> = node
            .attributes
            .as_deref()
            .unwrap_or_default()
            .chunks(2)
            .filter_map(|pair| match pair {
                [name, value] => Some((name.clone(), value.clone())),
                _ => None,
            })
            .collect();
        Ok(DomNode {
            backend_node_id: *node.backend_node_id.inner(),
            node_name: node.node_name.clone(),
            node_type: node.node_type,
            node_value: node.node_value.clone(),
            attributes,
        })
    }

    async fn parent_of(&self, backend_node_id: i64) -> DriverResult<Option<i64>> {
        let object_id = self.object_for(backend_node_id).await?;
        let parent = self
            .call_on_object(object_id, "function() { return this.parentElement; }", false)
            .await?;
        let Some(parent_id) = parent.object_id else {
            return Ok(None);
        };
        let resp = self
            .page()
            .await
            .execute(DescribeNodeParams::builder().object_id(parent_id).build())
            .await
            .map_err(cdp_error)?;
        Ok(Some(*resp.result.node.backend_node_id.inner()))
    }

    async fn box_model(&self, backend_node_id: i64) -> DriverResult<Option<BoundingBox>> {
        let resp = self
            .page()
            .await
            .execute(
                GetBoxModelParams::builder()
                    .backend_node_id(BackendNodeId::new(backend_node_id))
                    .build(),
            )
            .await;
        match resp {
            Ok(resp) => {
                let model = &resp.result.model;
                Ok(quad_box(model.content.inner(), model.width, model.height))
            }
            Err(e) if e.to_string().contains("Could not compute box model") => Ok(None),
            Err(e) => Err(cdp_error(e)),
        }
    }

    async fn partial_ax_tree(&self, backend_node_id: i64) -> DriverResult<Vec<AxNode>> {
        let resp = self
            .page()
            .await
            .execute(
                GetPartialAxTreeParams::builder()
                    .backend_node_id(BackendNodeId::new(backend_node_id))
                    .fetch_relatives(true)
                    .build(),
            )
            .await
            .map_err(cdp_error)?;
        let mut nodes: Vec<AxNode> = resp.result.nodes.iter().map(to_ax_node).collect();
        if let Some(pos) = nodes
            .iter()
            .position(|n| n.backend_dom_node_id == Some(backend_node_id))
        {
            let own = nodes.remove(pos);
            nodes.insert(0, own);
        }
        Ok(nodes)
    }

    async fn query_ax_tree(&self, role: &str, name: &str) -> DriverResult<Vec<AxNode>> {
        let page = self.page().await;
        let doc = page
            .execute(GetDocumentParams::builder().depth(0).build())
            .await
            .map_err(cdp_error)?;
        let root = doc.result.root.backend_node_id.clone();
        let resp = page
            .execute(
                QueryAxTreeParams::builder()
                    .backend_node_id(root)
                    .role(role)
                    .accessible_name(name)
                    .build(),
            )
            .await
            .map_err(cdp_error)?;
        Ok(resp.result.nodes.iter().map(to_ax_node).collect())
    }

    async fn full_ax_tree(&self) -> DriverResult<Vec<AxNode>> {
        let resp = self
            .page()
            .await
            .execute(GetFullAxTreeParams::builder().build())
            .await
            .map_err(cdp_error)?;
        Ok(resp.result.nodes.iter().map(to_ax_node).collect())
    }

    async fn call_function_on(
        &self,
        backend_node_id: i64,
        declaration: &str,
    ) -> DriverResult<serde_json::Value> {
        let object_id = self.object_for(backend_node_id).await?;
        let result = self.call_on_object(object_id, declaration, true).await?;
        Ok(result.value.unwrap_or(serde_json::Value::Null))
    }

    async fn refresh(&self) -> DriverResult<()> {
        let mut browser = self.browser.lock().await;
        match first_page(&mut browser).await {
            Ok(page) => {
                *self.page.write().await = page;
                debug!("DevTools session re-attached");
                Ok(())
            }
            Err(e) => {
                warn!("DevTools re-attach failed: {:#}", e);
                Err(DriverError::StaleContext(e.to_string()))
            }
        }
    }
}
