// Common test utilities and fixtures

use anyhow::Result;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Run the selfheal binary and parse its stdout as JSON
pub fn run_command(args: &[&str]) -> Result<(Value, i32)> {
    let output = Command::new(env!("CARGO_BIN_EXE_selfheal"))
        .args(args)
        .env("RUST_LOG", "selfheal=warn")
        .output()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let exit_code = output.status.code().unwrap_or(-1);

    let json = match serde_json::from_str(&stdout) {
        Ok(json) => json,
        Err(_) => json!({
            "error": exit_code != 0,
            "message": if stdout.is_empty() { stderr.to_string() } else { stdout.to_string() },
            "exit_code": exit_code
        }),
    };
    Ok((json, exit_code))
}

/// Scratch directory with a config file whose cache lives inside it
pub struct Workspace {
    pub dir: TempDir,
}

#[allow(dead_code)]
impl Workspace {
    pub fn new() -> Result<Self> {
        let dir = TempDir::new()?;
        let config = json!({
            "cache": { "dir": dir.path().join("cache") }
        });
        std::fs::write(dir.path().join("config.json"), config.to_string())?;
        Ok(Workspace { dir })
    }

    pub fn config(&self) -> String {
        self.dir.path().join("config.json").display().to_string()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    pub fn write(&self, name: &str, value: &Value) -> Result<String> {
        let path = self.dir.path().join(name);
        std::fs::write(&path, serde_json::to_string_pretty(value)?)?;
        Ok(path.display().to_string())
    }

    pub fn read(&self, path: &str) -> Result<Value> {
        Ok(serde_json::from_str(&std::fs::read_to_string(Path::new(path))?)?)
    }
}

/// JSON fixtures shared by the CLI tests
pub mod fixtures {
    use serde_json::{Value, json};

    /// A labelled submit button inside a login form
    pub fn button_snapshot() -> Value {
        json!({
            "tagName": "button",
            "attributes": {
                "type": "submit",
                "class": "btn btn-primary css-1x2y3z",
                "aria-label": "로그인",
                "data-testid": "login-submit"
            },
            "textContent": "로그인",
            "boundingBox": {"x": 10.0, "y": 100.0, "width": 80.0, "height": 30.0},
            "isVisible": true,
            "isInViewport": true,
            "xpath": "/html/body/form/button",
            "cssPath": "form#loginForm > button",
            "role": "button",
            "name": "로그인"
        })
    }

    /// One step per schema generation
    pub fn mixed_playbook() -> Value {
        json!({
            "metadata": {"id": "pb-1", "name": "login", "startUrl": "https://example.com/login"},
            "variables": {"user": "admin"},
            "steps": [
                {"id": "legacy", "action": "click", "selector": "#login-btn"},
                {
                    "id": "ranked",
                    "action": "type",
                    "value": "{{user}}",
                    "selectors": [
                        {"strategy": "css", "value": "#userId", "priority": 1},
                        {"strategy": "css", "value": "input[name=\"userId\"]", "priority": 2}
                    ]
                },
                {
                    "id": "identity",
                    "action": "click",
                    "identity": {"axRole": "button", "axName": "로그인", "tagName": "button"}
                }
            ]
        })
    }

    pub fn healed_playbook() -> Value {
        json!({
            "metadata": {"id": "pb-2", "name": "healed"},
            "steps": [
                {"id": "open", "action": "navigate", "value": "https://example.com"},
                {
                    "id": "submit",
                    "action": "click",
                    "selector": "#login-btn",
                    "healingHistory": [
                        {
                            "timestamp": 1760000000000i64,
                            "originalSelector": "#login-btn",
                            "healedSelector": "button.login",
                            "strategy": "fallback",
                            "success": true,
                            "confidence": 60
                        },
                        {
                            "timestamp": 1760000500000i64,
                            "originalSelector": "button.login",
                            "healedSelector": "role=button[name=\"로그인\" exact]",
                            "strategy": "accessibility",
                            "success": true,
                            "confidence": 95
                        }
                    ]
                }
            ]
        })
    }

    /// Shared-tier cache file for one domain
    pub fn cache_record(domain: &str) -> Value {
        let entry = |path: &str, hash: &str, selector: &str| {
            json!({
                "domain": domain,
                "path": path,
                "elementHash": hash,
                "pageHash": "0123456789abcdef",
                "selector": selector,
                "strategy": "css",
                "confidence": 90,
                "hitCount": 3,
                "successRate": 80.0,
                "updatedAt": 1760000000000i64
            })
        };
        json!({
            "entries": [
                entry("/admin/users", "aaaa1111", "#save"),
                entry("/admin/roles", "bbbb2222", "button.save"),
                entry("/login", "cccc3333", "#login-btn")
            ],
            "pages": {
                "/admin/users": "0123456789abcdef",
                "/login": "fedcba9876543210"
            }
        })
    }
}
