use serde_json::json;
use smartops::core::config::Config;
use smartops::core::server::Dispatcher;
use smartops::plugins::api_changes::{ApiAnalyzer, ApiSurface, ApiSymbol, SymbolKind};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const OLD_API: &str = r#"
export function foo(a, b) {
  return a + b;
}

export class Client {
  connect(host) {
    return host;
  }
}

export { foo, Client };
"#;

fn write(dir: &Path, name: &str, content: &str) -> String {
    let p = dir.join(name);
    fs::write(&p, content).unwrap();
    p.to_string_lossy().to_string()
}

fn detect(d: &Dispatcher, old: &str, new: &str) -> smartops::core::rpc::ToolResult {
    d.dispatch("detect_api_changes", &json!({"oldFile": old, "newFile": new}))
        .expect("known tool")
}

#[test]
fn identical_sources_are_safe_and_write_no_report() {
    let tmp = tempdir().expect("tempdir");
    let ws = tmp.path();
    let old = write(ws, "old.js", OLD_API);
    let d = Dispatcher::new(Config::for_workspace(ws));

    let result = detect(&d, &old, &old);
    assert!(result.success);
    assert_eq!(result.get("hasBreakingChanges").unwrap(), false);
    assert_eq!(
        result.get("recommendation").unwrap(),
        "Safe to proceed - no breaking changes detected"
    );
    assert!(result.get("reportPath").is_none());
    assert!(!d.config().report_path.exists());
}

#[test]
fn removed_function_stops_and_writes_report() {
    let tmp = tempdir().expect("tempdir");
    let ws = tmp.path();
    let old = write(ws, "old.js", OLD_API);
    let new = write(
        ws,
        "new.js",
        &OLD_API
            .replace("export function foo(a, b) {\n  return a + b;\n}\n", "")
            .replace("export { foo, Client };", "export { Client };"),
    );
    let d = Dispatcher::new(Config::for_workspace(ws));

    let result = detect(&d, &old, &new);
    assert!(result.success);
    assert_eq!(result.get("hasBreakingChanges").unwrap(), true);
    assert_eq!(
        result.get("recommendation").unwrap(),
        "STOP: Breaking changes detected. Review BREAKING_CHANGES.md"
    );

    let removed = result.get("details").unwrap()["removed"].as_array().unwrap().clone();
    assert!(removed.contains(&json!({"type": "function", "name": "foo", "params": "a, b"})));
    assert!(removed.contains(&json!({"type": "exportList", "name": "foo"})));

    let report = fs::read_to_string(&d.config().report_path).expect("report written");
    assert!(report.starts_with("# Breaking Changes Detected"));
    assert!(report.contains("- function: foo"));
    assert!(report.contains("1. Create migration guide"));
}

#[test]
fn changed_parameters_are_modifications() {
    let tmp = tempdir().expect("tempdir");
    let ws = tmp.path();
    let old = write(ws, "old.js", "export function foo(a,b) {}\n");
    let new = write(ws, "new.js", "export function foo(a,b,c) {}\n");
    let d = Dispatcher::new(Config::for_workspace(ws));

    let result = detect(&d, &old, &new);
    let details = result.get("details").unwrap();
    assert!(details["removed"].as_array().unwrap().is_empty());
    assert!(details["modified"].as_array().unwrap().contains(&json!({
        "type": "function",
        "name": "foo",
        "oldParams": "a,b",
        "newParams": "a,b,c",
    })));

    let report = fs::read_to_string(&d.config().report_path).unwrap();
    assert!(report.contains("  - Old: a,b\n  - New: a,b,c"));
}

#[test]
fn deprecations_are_counted_without_breaking() {
    let tmp = tempdir().expect("tempdir");
    let ws = tmp.path();
    let old = write(ws, "old.js", "export function foo(a) {}\n");
    let new = write(
        ws,
        "new.js",
        "/** @deprecated use bar */\nexport function foo(a) {}\n/* @DEPRECATED */\n",
    );
    let d = Dispatcher::new(Config::for_workspace(ws));

    let result = detect(&d, &old, &new);
    assert_eq!(result.get("hasBreakingChanges").unwrap(), false);
    assert_eq!(result.get("details").unwrap()["deprecatedCount"], 2);
}

#[test]
fn report_is_overwritten_on_each_breaking_run() {
    let tmp = tempdir().expect("tempdir");
    let ws = tmp.path();
    let d = Dispatcher::new(Config::for_workspace(ws));

    let a = write(ws, "a.js", "function alpha() {}\nfunction beta() {}\n");
    let b = write(ws, "b.js", "function beta() {}\n");
    let c = write(ws, "c.js", "function alpha() {}\n");

    detect(&d, &a, &b);
    let first = fs::read_to_string(&d.config().report_path).unwrap();
    assert!(first.contains("- function: alpha"));

    detect(&d, &a, &c);
    let second = fs::read_to_string(&d.config().report_path).unwrap();
    assert!(second.contains("- function: beta"));
    assert!(!second.contains("- function: alpha"));
}

#[test]
fn missing_snapshot_is_a_failure() {
    let tmp = tempdir().expect("tempdir");
    let ws = tmp.path();
    let old = write(ws, "old.js", OLD_API);
    let d = Dispatcher::new(Config::for_workspace(ws));

    let result = detect(&d, &old, &ws.join("gone.js").to_string_lossy());
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("gone.js"));
    assert!(!d.config().report_path.exists());
}

/// Treats every non-empty line as an exported symbol.
struct LineAnalyzer;

impl ApiAnalyzer for LineAnalyzer {
    fn name(&self) -> &'static str {
        "lines"
    }

    fn extract(&self, source: &str) -> ApiSurface {
        let mut surface = ApiSurface::default();
        for line in source.lines().map(str::trim).filter(|l| !l.is_empty()) {
            surface.insert(ApiSymbol {
                kind: SymbolKind::ExportList,
                name: line.to_string(),
                params: None,
            });
        }
        surface
    }

    fn deprecation_count(&self, _source: &str) -> usize {
        0
    }
}

#[test]
fn analyzer_is_injectable() {
    let tmp = tempdir().expect("tempdir");
    let ws = tmp.path();
    let old = write(ws, "old.txt", "alpha\nbeta\n");
    let new = write(ws, "new.txt", "alpha\n");
    let d = Dispatcher::new(Config::for_workspace(ws)).with_analyzer(Box::new(LineAnalyzer));

    let result = detect(&d, &old, &new);
    assert_eq!(result.get("analyzer").unwrap(), "lines");
    assert_eq!(result.get("hasBreakingChanges").unwrap(), true);
    assert_eq!(
        result.get("details").unwrap()["removed"],
        json!([{"type": "exportList", "name": "beta"}])
    );
}
