use regex::Regex;
use serde_json::json;
use smartops::core::config::Config;
use smartops::core::server::Dispatcher;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn dispatcher(ws: &Path) -> Dispatcher {
    Dispatcher::new(Config::for_workspace(ws))
}

#[test]
fn safe_delete_moves_file_into_trash_unchanged() {
    let tmp = tempdir().expect("tempdir");
    let ws = tmp.path();
    let target = ws.join("notes.txt");
    fs::write(&target, "keep me").unwrap();

    let d = dispatcher(ws);
    let result = d
        .dispatch("safe_delete", &json!({"filepath": target.to_string_lossy()}))
        .expect("known tool");

    assert!(result.success, "{:?}", result.error);
    assert!(!target.exists());

    let recovery = result.get("recoveryPath").and_then(|v| v.as_str()).unwrap();
    assert_eq!(fs::read_to_string(recovery).unwrap(), "keep me");
    assert_eq!(
        result.message.as_deref().unwrap(),
        format!("Moved to trash: {}", recovery)
    );

    let recovery = Path::new(recovery);
    assert_eq!(recovery.parent().unwrap(), d.config().trash_dir);
    let name = recovery.file_name().unwrap().to_string_lossy();
    let re = Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}-\d{2}-\d{2}-\d{3}Z_notes\.txt$").unwrap();
    assert!(re.is_match(&name), "unexpected trash name {}", name);
}

#[test]
fn safe_delete_is_recorded_in_operation_log() {
    let tmp = tempdir().expect("tempdir");
    let ws = tmp.path();
    let target = ws.join("old.js");
    fs::write(&target, "x").unwrap();

    let d = dispatcher(ws);
    let result = d
        .dispatch("safe_delete", &json!({"filepath": target.to_string_lossy()}))
        .unwrap();
    assert!(result.success);

    let entries = d.operation_log().entries().expect("log readable");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].operation, "safe_delete");
    assert_eq!(entries[0].details["filepath"], &*target.to_string_lossy());
    assert_eq!(entries[0].details["trashPath"], *result.get("recoveryPath").unwrap());
}

#[test]
fn missing_file_fails_without_side_effects() {
    let tmp = tempdir().expect("tempdir");
    let ws = tmp.path();
    let d = dispatcher(ws);

    let result = d
        .dispatch(
            "safe_delete",
            &json!({"filepath": ws.join("ghost.txt").to_string_lossy()}),
        )
        .unwrap();
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("does not exist"));
    assert!(d.operation_log().entries().unwrap().is_empty());
    assert!(!d.config().trash_dir.exists());
}

#[test]
fn directories_are_quarantined_whole() {
    let tmp = tempdir().expect("tempdir");
    let ws = tmp.path();
    let dir = ws.join("build");
    fs::create_dir_all(dir.join("nested")).unwrap();
    fs::write(dir.join("nested/out.o"), "obj").unwrap();

    let result = dispatcher(ws)
        .dispatch("safe_delete", &json!({"filepath": dir.to_string_lossy()}))
        .unwrap();
    assert!(result.success);
    assert!(!dir.exists());

    let recovery = Path::new(result.get("recoveryPath").unwrap().as_str().unwrap());
    assert_eq!(
        fs::read_to_string(recovery.join("nested/out.o")).unwrap(),
        "obj"
    );
}
