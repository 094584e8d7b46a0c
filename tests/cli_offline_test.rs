// CLI tests for the commands that need no browser
use anyhow::Result;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

mod common;
use common::{Workspace, fixtures, run_command};

fn all_selector_values(smart: &Value) -> Vec<String> {
    std::iter::once(&smart["primary"])
        .chain(smart["fallbacks"].as_array().into_iter().flatten())
        .filter_map(|s| s["value"].as_str().map(str::to_string))
        .collect()
}

#[test]
fn test_generate_ranks_stable_signals() -> Result<()> {
    let ws = Workspace::new()?;
    let snapshot = ws.write("snapshot.json", &fixtures::button_snapshot())?;

    let (result, code) = run_command(&["generate", &snapshot])?;
    assert_eq!(code, 0, "unexpected output: {}", result);

    let values = all_selector_values(&result["smartSelector"]);
    assert!(values.iter().any(|v| v.contains("login-submit")));
    // css-in-js hash classes never become selectors
    assert!(values.iter().all(|v| !v.contains("css-1x2y3z")));

    assert_eq!(result["identity"]["axRole"], json!("button"));
    assert_eq!(result["identity"]["axName"], json!("로그인"));
    assert_eq!(result["identity"]["dataTestId"], json!("login-submit"));
    assert_eq!(result["elementHash"].as_str().map(str::len), Some(8));
    assert!(result["textPatterns"]["variations"].is_array());
    Ok(())
}

#[test]
fn test_generate_rejects_unreadable_snapshot() -> Result<()> {
    let ws = Workspace::new()?;
    let missing = ws.dir.path().join("missing.json");

    let (result, code) = run_command(&["generate", &missing.display().to_string()])?;
    assert_eq!(code, 6);
    assert_eq!(result["error"], json!(true));
    assert_eq!(result["kind"], json!("invalid_input"));

    let untagged = ws.write("untagged.json", &json!({"attributes": {"id": "x"}}))?;
    let (_, code) = run_command(&["generate", &untagged])?;
    assert_eq!(code, 6);
    Ok(())
}

#[test]
fn test_step_inspect_reports_schema_generations() -> Result<()> {
    let ws = Workspace::new()?;
    let playbook = ws.write("playbook.json", &fixtures::mixed_playbook())?;

    let (result, code) = run_command(&["step", "inspect", &playbook])?;
    assert_eq!(code, 0, "unexpected output: {}", result);

    let steps = result.as_array().expect("array of step summaries");
    assert_eq!(steps.len(), 3);

    assert_eq!(steps[0]["schemaVersion"], json!("v1"));
    assert_eq!(steps[0]["primary"], json!("#login-btn"));

    assert_eq!(steps[1]["schemaVersion"], json!("v2"));
    assert_eq!(steps[1]["primary"], json!("#userId"));
    assert_eq!(steps[1]["plan"]["legacy"][0]["value"], json!("input[name=\"userId\"]"));

    assert_eq!(steps[2]["schemaVersion"], json!("v3"));
    assert_eq!(steps[2]["primary"], json!("(none)"));
    assert_eq!(steps[2]["hasIdentity"], json!(true));
    assert_eq!(steps[2]["isFormField"], json!(false));
    Ok(())
}

#[test]
fn test_step_inspect_accepts_single_step() -> Result<()> {
    let ws = Workspace::new()?;
    let step = ws.write(
        "step.json",
        &json!({"id": "user", "action": "type", "identity": {"tagName": "input", "name": "userId"}}),
    )?;

    let (result, code) = run_command(&["step", "inspect", &step])?;
    assert_eq!(code, 0);
    assert_eq!(result[0]["isFormField"], json!(true));
    Ok(())
}

#[test]
fn test_cache_stats_and_invalidate_by_prefix() -> Result<()> {
    let ws = Workspace::new()?;
    std::fs::create_dir_all(ws.cache_dir())?;
    std::fs::write(
        ws.cache_dir().join("app.example.com.json"),
        fixtures::cache_record("app.example.com").to_string(),
    )?;
    let config = ws.config();

    let (stats, code) = run_command(&["--config", &config, "cache", "stats"])?;
    assert_eq!(code, 0, "unexpected output: {}", stats);
    assert_eq!(stats["entries"], json!(3));
    assert_eq!(stats["domains"], json!(1));
    assert_eq!(stats["totalHits"], json!(9));

    let (removed, code) = run_command(&[
        "--config",
        &config,
        "cache",
        "invalidate",
        "app.example.com",
        "--path",
        "/admin",
    ])?;
    assert_eq!(code, 0);
    assert_eq!(removed["removed"], json!(2));

    let (stats, _) = run_command(&[
        "--config",
        &config,
        "cache",
        "stats",
        "--domain",
        "app.example.com",
    ])?;
    assert_eq!(stats["entries"], json!(1));

    let (stats, _) = run_command(&["--config", &config, "cache", "stats", "--domain", "other.org"])?;
    assert_eq!(stats["entries"], json!(0));
    Ok(())
}

#[test]
fn test_cache_commands_fail_when_disabled() -> Result<()> {
    let ws = Workspace::new()?;
    let config = ws.write("disabled.json", &json!({"cache": {"enabled": false}}))?;

    let (result, code) = run_command(&["--config", &config, "cache", "stats"])?;
    assert_eq!(code, 6);
    assert_eq!(result["kind"], json!("invalid_input"));
    Ok(())
}

#[test]
fn test_history_lists_healing_records() -> Result<()> {
    let ws = Workspace::new()?;
    let playbook = ws.write("healed.json", &fixtures::healed_playbook())?;

    let (result, code) = run_command(&["history", &playbook])?;
    assert_eq!(code, 0, "unexpected output: {}", result);
    assert_eq!(result["playbook"], json!("healed"));
    assert_eq!(result["total"], json!(2));
    assert_eq!(result["steps"].as_array().map(Vec::len), Some(1));
    assert_eq!(result["steps"][0]["stepId"], json!("submit"));
    assert_eq!(result["steps"][0]["stepIndex"], json!(1));
    assert_eq!(
        result["steps"][0]["records"][1]["strategy"],
        json!("accessibility")
    );

    let (result, _) = run_command(&["history", &playbook, "--step", "open"])?;
    assert_eq!(result["total"], json!(0));
    Ok(())
}

#[test]
fn test_bad_config_file_exits_with_invalid_input() -> Result<()> {
    let ws = Workspace::new()?;
    let broken = ws.dir.path().join("broken.json");
    std::fs::write(&broken, "{ nope")?;

    let (result, code) = run_command(&["--config", &broken.display().to_string(), "cache", "stats"])?;
    assert_eq!(code, 6);
    assert!(result["message"].as_str().unwrap_or_default().contains("Invalid config file"));
    Ok(())
}

#[test]
fn test_unreachable_webdriver_is_driver_unavailable() -> Result<()> {
    let ws = Workspace::new()?;
    let playbook = ws.write("playbook.json", &fixtures::mixed_playbook())?;

    let (result, code) = run_command(&[
        "--config",
        &ws.config(),
        "--webdriver-url",
        "http://127.0.0.1:9",
        "run",
        &playbook,
    ])?;
    assert_eq!(code, 4);
    assert_eq!(result["kind"], json!("driver_unavailable"));
    Ok(())
}

#[test]
fn test_resolve_rejects_steps_without_a_target() -> Result<()> {
    let ws = Workspace::new()?;
    let playbook = ws.write("healed.json", &fixtures::healed_playbook())?;

    // rejected before any browser is contacted
    let (result, code) = run_command(&[
        "--config",
        &ws.config(),
        "--webdriver-url",
        "http://127.0.0.1:9",
        "resolve",
        "https://example.com",
        &playbook,
        "--id",
        "open",
    ])?;
    assert_eq!(code, 6);
    assert!(result["message"].as_str().unwrap_or_default().contains("no element to resolve"));
    Ok(())
}
