use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::BrowserConfig;
use crate::driver::{
    DriverResult, MatchedElement, PageDriver, PointElement, SignatureEntry, TextCandidate,
};
use crate::errors::DriverError;
use crate::locator::Locator;

/// Attribute used to hand a resolved match over to WebDriver
pub const MARKER_ATTR: &str = "data-selfheal-target";

/// Browser instance for WebDriver automation
pub struct Browser {
    pub(crate) client: Client,
    browser_type: BrowserType,
    /// Chrome profile, removed when the session is dropped
    _profile_dir: Option<tempfile::TempDir>,
}

/// Supported browser types
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserType {
    /// Mozilla Firefox
    Firefox,
    /// Google Chrome/Chromium
    Chrome,
}

impl std::str::FromStr for BrowserType {
    type Err = anyhow::Error;

    /// Parse browser type from string (case-insensitive)
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "firefox" => Ok(BrowserType::Firefox),
            "chrome" | "chromium" => Ok(BrowserType::Chrome),
            _ => anyhow::bail!("Unsupported browser: {}", s),
        }
    }
}

impl BrowserType {
    /// Default WebDriver URL for this browser type
    pub fn default_webdriver_url(&self) -> &'static str {
        match self {
            BrowserType::Firefox => "http://localhost:4444",
            BrowserType::Chrome => "http://localhost:9515",
        }
    }

    /// Only Chrome exposes the DevTools capability
    pub fn has_devtools(&self) -> bool {
        matches!(self, BrowserType::Chrome)
    }
}

/// In-page resolver. `arguments[0]` is the operation, `arguments[1]` its payload;
/// locators arrive in their serde form (`{query: {kind, ...}, nth}`).
const RESOLVER_JS: &str = r#"
const op = arguments[0];
const args = arguments[1] || {};
const norm = s => (s || '').replace(/\s+/g, ' ').trim();
const textMatches = (actual, expected, exact) => {
    actual = norm(actual);
    expected = norm(expected);
    if (!expected) return false;
    return exact ? actual === expected : actual.toLowerCase().includes(expected.toLowerCase());
};
const visible = el => {
    const r = el.getBoundingClientRect();
    const s = window.getComputedStyle(el);
    return r.width > 0 && r.height > 0 && s.visibility !== 'hidden' && s.display !== 'none';
};
const editable = el =>
    ['INPUT', 'TEXTAREA', 'SELECT'].includes(el.tagName) || el.isContentEditable === true;
const IMPLICIT = {
    BUTTON: 'button', A: 'link', SELECT: 'combobox', TEXTAREA: 'textbox', LI: 'listitem',
    FORM: 'form', NAV: 'navigation', MAIN: 'main', H1: 'heading', H2: 'heading',
    H3: 'heading', H4: 'heading', H5: 'heading', H6: 'heading', IMG: 'img'
};
const INPUT_ROLES = {
    checkbox: 'checkbox', radio: 'radio', submit: 'button', button: 'button', reset: 'button',
    search: 'searchbox', range: 'slider', number: 'spinbutton'
};
const NAME_FROM_CONTENT = [
    'button', 'link', 'tab', 'menuitem', 'menuitemcheckbox', 'menuitemradio', 'option',
    'checkbox', 'radio', 'switch', 'treeitem', 'row', 'gridcell', 'cell', 'heading'
];
const roleOf = el => {
    const explicit = el.getAttribute('role');
    if (explicit) return explicit.trim().split(/\s+/)[0];
    if (el.tagName === 'INPUT') {
        return INPUT_ROLES[(el.getAttribute('type') || 'text').toLowerCase()] || 'textbox';
    }
    return IMPLICIT[el.tagName] || null;
};
const nameOf = el => {
    const aria = el.getAttribute('aria-label');
    if (aria && aria.trim()) return norm(aria);
    const by = el.getAttribute('aria-labelledby');
    if (by) {
        const text = by.split(/\s+/).map(id => document.getElementById(id))
            .filter(Boolean).map(n => n.textContent).join(' ');
        if (norm(text)) return norm(text);
    }
    if (['INPUT', 'SELECT', 'TEXTAREA'].includes(el.tagName)) {
        if (el.labels && el.labels.length) return norm(el.labels[0].textContent);
        if (el.placeholder) return norm(el.placeholder);
    }
    const role = roleOf(el);
    if (role && NAME_FROM_CONTENT.includes(role)) return norm(el.textContent);
    return norm(el.getAttribute('title') || el.getAttribute('alt') || '');
};
const all = () => Array.from(document.querySelectorAll('body *'))
    .filter(el => !['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE'].includes(el.tagName));
const inOrder = els => {
    const unique = Array.from(new Set(els));
    return unique.sort((a, b) =>
        a === b ? 0 : (a.compareDocumentPosition(b) & Node.DOCUMENT_POSITION_FOLLOWING ? -1 : 1));
};
const css = selector => {
    let scope = null;
    for (const part of selector.split(' >> ')) {
        const found = scope === null
            ? Array.from(document.querySelectorAll(part))
            : scope.flatMap(root => Array.from(root.querySelectorAll(part)));
        scope = inOrder(found);
    }
    return scope || [];
};
const xpath = expression => {
    const out = [];
    const result = document.evaluate(expression, document, null,
        XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
    for (let i = 0; i < result.snapshotLength; i++) {
        const node = result.snapshotItem(i);
        if (node.nodeType === 1) out.push(node);
    }
    return out;
};
const query = q => {
    switch (q.kind) {
        case 'css': return css(q.selector);
        case 'xPath': return xpath(q.expression);
        case 'role': return all().filter(el => visible(el) && roleOf(el) === q.role &&
            (q.name == null || textMatches(nameOf(el), q.name, q.exact)));
        case 'text': {
            const matching = all().filter(el => textMatches(el.textContent, q.text, q.exact));
            return matching.filter(el => !matching.some(o => o !== el && el.contains(o)));
        }
        case 'testId': return all().filter(el => el.getAttribute('data-testid') === q.id);
        case 'placeholder': return all().filter(el =>
            el.hasAttribute('placeholder') && textMatches(el.getAttribute('placeholder'), q.text, false));
        case 'label': {
            const out = [];
            for (const el of all()) {
                if (el.tagName === 'LABEL') {
                    if (textMatches(el.textContent, q.text, false) && el.control) out.push(el.control);
                } else if (textMatches(el.getAttribute('aria-label'), q.text, false)) {
                    out.push(el);
                }
            }
            return inOrder(out);
        }
        case 'hasText': return css(q.selector).filter(el => textMatches(el.textContent, q.text, q.exact));
        default: throw new Error('unsupported query kind ' + q.kind);
    }
};
const resolve = locator => {
    const found = query(locator.query);
    if (locator.nth == null) return found;
    return found[locator.nth] ? [found[locator.nth]] : [];
};
const attrs = el => {
    const out = {};
    for (const a of el.attributes) out[a.name] = a.value;
    return out;
};
const box = el => {
    const r = el.getBoundingClientRect();
    return { x: r.x, y: r.y, width: r.width, height: r.height };
};
const strict = (locator, act) => {
    const found = resolve(locator);
    if (found.length === 1) act(found[0]);
    return found.length;
};
switch (op) {
    case 'count':
        return query(args.locator.query).length;
    case 'inspect':
        return resolve(args.locator).slice(0, args.limit).map((el, index) => ({
            index, tagName: el.tagName, attributes: attrs(el), text: norm(el.textContent),
            visible: visible(el), editable: editable(el), boundingBox: box(el)
        }));
    case 'mark':
        for (const old of document.querySelectorAll('[' + args.attr + ']')) old.removeAttribute(args.attr);
        return strict(args.locator, el => el.setAttribute(args.attr, args.token));
    case 'hover':
        return strict(args.locator, el => {
            for (const type of ['mouseover', 'mouseenter', 'mousemove']) {
                el.dispatchEvent(new MouseEvent(type, { bubbles: true, view: window }));
            }
        });
    case 'scrollIntoView':
        return strict(args.locator, el => el.scrollIntoView({ block: 'center', inline: 'center' }));
    case 'scrollBy':
        window.scrollBy(args.dx, args.dy);
        return true;
    case 'atPoint': {
        const el = document.elementFromPoint(args.x, args.y);
        return el ? { tagName: el.tagName, id: el.id || null, visible: visible(el) } : null;
    }
    case 'clickAt': {
        const el = document.elementFromPoint(args.x, args.y);
        if (!el) return false;
        if (typeof el.focus === 'function') el.focus();
        for (const type of ['mousedown', 'mouseup', 'click']) {
            el.dispatchEvent(new MouseEvent(type, {
                bubbles: true, cancelable: true, view: window, clientX: args.x, clientY: args.y
            }));
        }
        return true;
    }
    case 'textCandidates': {
        const tags = args.tags.map(t => t.toUpperCase());
        const out = [];
        for (const el of all()) {
            if (!tags.includes(el.tagName)) continue;
            const text = (el.textContent || '').trim();
            if (text.length > 0 && text.length < args.maxLen) {
                out.push({ tagName: el.tagName, id: el.id || null,
                    className: typeof el.className === 'string' ? el.className : null, text });
            }
        }
        return out;
    }
    case 'signature':
        return all()
            .filter(el => ['BUTTON', 'A', 'INPUT', 'SELECT', 'TEXTAREA'].includes(el.tagName) ||
                el.hasAttribute('role'))
            .slice(0, args.limit)
            .map(el => ({
                tag: el.tagName.toLowerCase(),
                ariaLabel: el.getAttribute('aria-label') || '',
                role: el.getAttribute('role') || '',
                name: el.getAttribute('name') || '',
                type: el.getAttribute('type') || '',
                placeholder: el.getAttribute('placeholder') || ''
            }));
    default:
        throw new Error('unknown resolver operation ' + op);
}
"#;

fn driver_error(err: CmdError) -> DriverError {
    if err.is_miss() {
        return DriverError::NotFound(err.to_string());
    }
    DriverError::from_message(err.to_string())
}

fn decode<T: serde::de::DeserializeOwned>(op: &str, value: Value) -> DriverResult<T> {
    serde_json::from_value(value)
        .map_err(|e| DriverError::Protocol(format!("unexpected {} result: {}", op, e)))
}

fn chrome_args(config: &BrowserConfig, profile_dir: &std::path::Path) -> Vec<String> {
    let mut args = vec![
        "--no-sandbox".to_string(),
        format!("--remote-debugging-port={}", config.devtools_port),
        format!("--user-data-dir={}", profile_dir.display()),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
        args.push("--disable-gpu".to_string());
        args.push("--disable-dev-shm-usage".to_string());
    }
    if let Some(vp) = &config.viewport {
        args.push(format!("--window-size={},{}", vp.width, vp.height));
    }
    args
}

impl Browser {
    /// Connect to the configured WebDriver and open a session.
    ///
    /// Chrome is started with a remote-debugging port so the DevTools
    /// capability can attach to the same browser.
    pub async fn connect(config: &BrowserConfig) -> Result<Self> {
        let browser_type = config.browser;
        let webdriver_url = config
            .webdriver_url
            .clone()
            .unwrap_or_else(|| browser_type.default_webdriver_url().to_string());
        info!("Connecting to {:?} WebDriver at {}", browser_type, webdriver_url);

        if !Self::is_webdriver_running(&webdriver_url).await {
            let driver_name = match browser_type {
                BrowserType::Firefox => "geckodriver",
                BrowserType::Chrome => "chromedriver",
            };
            anyhow::bail!(
                "Cannot connect to {} WebDriver at {}.\n\
                Please ensure {} is running:\n\
                  For Firefox: geckodriver --port 4444\n\
                  For Chrome: chromedriver --port 9515",
                driver_name,
                webdriver_url,
                driver_name
            );
        }

        let mut caps = serde_json::Map::new();
        let mut profile_dir = None;
        match browser_type {
            BrowserType::Firefox => {
                let mut args = Vec::new();
                if config.headless {
                    args.push("--headless".to_string());
                }
                if let Some(vp) = &config.viewport {
                    args.push(format!("--width={}", vp.width));
                    args.push(format!("--height={}", vp.height));
                }
                caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
            }
            BrowserType::Chrome => {
                let dir = tempfile::Builder::new()
                    .prefix("selfheal-chrome-")
                    .tempdir()?;
                let args = chrome_args(config, dir.path());
                caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
                profile_dir = Some(dir);
            }
        }

        let client = ClientBuilder::rustls()
            .capabilities(caps)
            .connect(&webdriver_url)
            .await
            .context("Failed to connect to WebDriver")?;

        if let Some(vp) = &config.viewport {
            debug!("Setting viewport to {}x{}", vp.width, vp.height);
            if let Err(e) = client.set_window_size(vp.width, vp.height).await {
                debug!("Note: Could not set window size: {}", e);
            }
        }

        Ok(Browser {
            client,
            browser_type,
            _profile_dir: profile_dir,
        })
    }

    async fn is_webdriver_running(url: &str) -> bool {
        let status_url = format!("{}/status", url.trim_end_matches('/'));
        match reqwest::get(&status_url).await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    pub fn browser_type(&self) -> BrowserType {
        self.browser_type
    }

    async fn call(&self, op: &str, payload: Value) -> DriverResult<Value> {
        self.client
            .execute(RESOLVER_JS, vec![json!(op), payload])
            .await
            .map_err(driver_error)
    }

    /// Turn a strict-mode match count into an error when it is not exactly one
    fn expect_one(locator: &Locator, found: Value) -> DriverResult<()> {
        match found.as_u64() {
            Some(1) => Ok(()),
            Some(0) => Err(DriverError::NotFound(locator.to_string())),
            Some(n) => Err(DriverError::Protocol(format!(
                "strict mode violation: {} resolved to {} elements",
                locator, n
            ))),
            None => Err(DriverError::Protocol(format!(
                "unexpected resolver result for {}: {}",
                locator, found
            ))),
        }
    }

    /// Tag the single match of `locator` and fetch it as a WebDriver element
    async fn element(&self, locator: &Locator) -> DriverResult<fantoccini::elements::Element> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let found = self
            .call(
                "mark",
                json!({ "locator": locator, "attr": MARKER_ATTR, "token": token }),
            )
            .await?;
        Self::expect_one(locator, found)?;
        let css = format!("[{}=\"{}\"]", MARKER_ATTR, token);
        self.client
            .find(fantoccini::Locator::Css(&css))
            .await
            .map_err(driver_error)
    }

    pub async fn close(self) -> Result<()> {
        self.client.close().await?;
        Ok(())
    }
}

#[async_trait]
impl PageDriver for Browser {
    async fn count(&self, locator: &Locator) -> DriverResult<usize> {
        let value = self.call("count", json!({ "locator": locator })).await?;
        decode("count", value)
    }

    async fn inspect(&self, locator: &Locator, limit: usize) -> DriverResult<Vec<MatchedElement>> {
        let value = self
            .call("inspect", json!({ "locator": locator, "limit": limit }))
            .await?;
        decode("inspect", value)
    }

    async fn element_at_point(&self, x: f64, y: f64) -> DriverResult<Option<PointElement>> {
        let value = self.call("atPoint", json!({ "x": x, "y": y })).await?;
        decode("atPoint", value)
    }

    async fn text_candidates(
        &self,
        tags: &[&str],
        max_len: usize,
    ) -> DriverResult<Vec<TextCandidate>> {
        let value = self
            .call("textCandidates", json!({ "tags": tags, "maxLen": max_len }))
            .await?;
        decode("textCandidates", value)
    }

    async fn page_signature(&self, limit: usize) -> DriverResult<Vec<SignatureEntry>> {
        let value = self.call("signature", json!({ "limit": limit })).await?;
        decode("signature", value)
    }

    async fn current_url(&self) -> DriverResult<String> {
        self.client
            .current_url()
            .await
            .map(|u| u.to_string())
            .map_err(driver_error)
    }

    async fn goto(&self, url: &str) -> DriverResult<()> {
        info!("Navigating to {}", url);
        self.client.goto(url).await.map_err(driver_error)?;

        // Wait for the page to be ready (max 2 seconds)
        for _ in 0..20 {
            match self
                .client
                .execute("return document.readyState === 'complete';", vec![])
                .await
            {
                Ok(ready) if ready.as_bool().unwrap_or(false) => break,
                _ => tokio::time::sleep(tokio::time::Duration::from_millis(100)).await,
            }
        }
        Ok(())
    }

    async fn click(&self, locator: &Locator) -> DriverResult<()> {
        debug!("Clicking {}", locator);
        self.element(locator)
            .await?
            .click()
            .await
            .map_err(driver_error)
    }

    async fn fill(&self, locator: &Locator, value: &str) -> DriverResult<()> {
        debug!("Filling {}", locator);
        let element = self.element(locator).await?;
        element.clear().await.map_err(driver_error)?;
        element.send_keys(value).await.map_err(driver_error)
    }

    async fn hover(&self, locator: &Locator) -> DriverResult<()> {
        let found = self.call("hover", json!({ "locator": locator })).await?;
        Self::expect_one(locator, found)
    }

    async fn select_option(&self, locator: &Locator, value: &str) -> DriverResult<()> {
        let element = self.element(locator).await?;
        if element.select_by_value(value).await.is_ok() {
            return Ok(());
        }
        debug!("No option with value {:?}; trying label", value);
        element.select_by_label(value).await.map_err(driver_error)
    }

    async fn scroll_into_view(&self, locator: &Locator) -> DriverResult<()> {
        let found = self
            .call("scrollIntoView", json!({ "locator": locator }))
            .await?;
        Self::expect_one(locator, found)
    }

    async fn scroll_by(&self, dx: f64, dy: f64) -> DriverResult<()> {
        self.call("scrollBy", json!({ "dx": dx, "dy": dy })).await?;
        Ok(())
    }

    async fn click_at(&self, x: f64, y: f64) -> DriverResult<()> {
        let clicked = self.call("clickAt", json!({ "x": x, "y": y })).await?;
        if clicked.as_bool() == Some(true) {
            Ok(())
        } else {
            Err(DriverError::NotFound(format!("nothing at ({}, {})", x, y)))
        }
    }

    async fn type_focused(&self, value: &str) -> DriverResult<()> {
        self.client
            .active_element()
            .await
            .map_err(driver_error)?
            .send_keys(value)
            .await
            .map_err(driver_error)
    }

    async fn screenshot_base64(&self) -> DriverResult<String> {
        let png = self.client.screenshot().await.map_err(driver_error)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(png))
    }
}

#[cfg(test)]
#[path = "webdriver_test.rs"]
mod webdriver_test;
