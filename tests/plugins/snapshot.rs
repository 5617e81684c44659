use serde_json::json;
use smartops::core::config::Config;
use smartops::core::external_action::{ProcessRunner, SystemRunner};
use smartops::core::server::Dispatcher;
use smartops::plugins::snapshot::{self, SnapshotManifest};
use std::cell::RefCell;
use std::fs;
use std::io;
use std::os::unix::process::ExitStatusExt;
use std::process::{Command, ExitStatus, Output};
use std::rc::Rc;
use tempfile::tempdir;

type Calls = Rc<RefCell<Vec<(String, Vec<String>)>>>;

/// Stands in for `tar`: writes fixed bytes to the `-czf` target.
struct FakeTar {
    calls: Calls,
    exit_code: i32,
}

impl ProcessRunner for FakeTar {
    fn run(&self, program: &str, args: &[String]) -> io::Result<Output> {
        self.calls
            .borrow_mut()
            .push((program.to_string(), args.to_vec()));
        // a failing tar still leaves whatever it wrote so far
        fs::write(&args[1], b"fake archive bytes")?;
        Ok(Output {
            status: ExitStatus::from_raw(self.exit_code << 8),
            stdout: Vec::new(),
            stderr: b"tar: simulated failure".to_vec(),
        })
    }
}

fn fake_tar(exit_code: i32) -> (Box<FakeTar>, Calls) {
    let calls: Calls = Rc::new(RefCell::new(Vec::new()));
    (
        Box::new(FakeTar {
            calls: Rc::clone(&calls),
            exit_code,
        }),
        calls,
    )
}

fn tar_available() -> bool {
    Command::new("tar")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[test]
fn snapshot_records_manifest_next_to_archive() {
    let tmp = tempdir().expect("tempdir");
    let ws = tmp.path();
    let project = ws.join("app");
    fs::create_dir_all(&project).unwrap();
    fs::write(project.join("index.js"), "1").unwrap();

    let (runner, calls) = fake_tar(0);
    let d = Dispatcher::new(Config::for_workspace(ws)).with_runner(runner);
    let result = d
        .dispatch(
            "create_snapshot",
            &json!({"projectPath": project.to_string_lossy(), "message": "before upgrade"}),
        )
        .unwrap();
    assert!(result.success, "{:?}", result.error);

    let calls = calls.borrow();
    assert_eq!(calls.len(), 1);
    let (program, args) = &calls[0];
    assert_eq!(program, "tar");
    assert_eq!(args[0], "-czf");
    assert!(args[1].ends_with("_before-upgrade.tar.gz"));
    assert_eq!(args[2], "-C");
    assert_eq!(args[4], "app");

    let manifest: SnapshotManifest =
        serde_json::from_value(result.get("manifest").unwrap().clone()).unwrap();
    assert_eq!(manifest.message, "before upgrade");
    assert_eq!(manifest.project_path, project.to_string_lossy());
    assert_eq!(manifest.snapshot_file, args[1]);
    assert_eq!(manifest.size, b"fake archive bytes".len() as u64);
    assert_eq!(
        manifest.sha256.as_deref(),
        Some(snapshot::hash_file(std::path::Path::new(&args[1])).unwrap().as_str())
    );
    assert_eq!(
        result.message.as_deref().unwrap(),
        format!("Snapshot created: {}", args[1])
    );

    let manifest_path = result.get("manifestPath").unwrap().as_str().unwrap();
    let on_disk: SnapshotManifest =
        serde_json::from_str(&fs::read_to_string(manifest_path).unwrap()).unwrap();
    assert_eq!(on_disk, manifest);

    let listed = snapshot::list_snapshots(&d.config().snapshot_dir()).unwrap();
    assert_eq!(listed, vec![manifest]);
}

#[test]
fn missing_project_fails_before_spawning() {
    let tmp = tempdir().expect("tempdir");
    let (runner, calls) = fake_tar(0);
    let d = Dispatcher::new(Config::for_workspace(tmp.path())).with_runner(runner);

    let result = d
        .dispatch(
            "create_snapshot",
            &json!({"projectPath": tmp.path().join("absent").to_string_lossy()}),
        )
        .unwrap();
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("does not exist"));
    assert!(calls.borrow().is_empty());
}

#[test]
fn archiver_failure_is_reported_and_no_manifest_written() {
    let tmp = tempdir().expect("tempdir");
    let ws = tmp.path();
    let project = ws.join("proj");
    fs::create_dir_all(&project).unwrap();

    let (runner, _calls) = fake_tar(2);
    let d = Dispatcher::new(Config::for_workspace(ws)).with_runner(runner);
    let result = d
        .dispatch(
            "create_snapshot",
            &json!({"projectPath": project.to_string_lossy()}),
        )
        .unwrap();
    assert!(!result.success);
    let error = result.error.unwrap();
    assert!(error.starts_with("Command failed: tar -czf"));
    assert!(error.contains("simulated failure"));
    let snapshot_dir = d.config().snapshot_dir();
    assert!(snapshot::list_snapshots(&snapshot_dir).unwrap().is_empty());
    let leftovers: Vec<_> = fs::read_dir(&snapshot_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert!(leftovers.is_empty(), "partial archive left: {:?}", leftovers);
}

#[test]
fn workspace_snapshot_excludes_state_directories() {
    let tmp = tempdir().expect("tempdir");
    let ws = fs::canonicalize(tmp.path()).unwrap();
    fs::write(ws.join("main.js"), "1").unwrap();
    fs::create_dir_all(ws.join(".smartops/trash")).unwrap();

    let (runner, calls) = fake_tar(0);
    let d = Dispatcher::new(Config::for_workspace(&ws)).with_runner(runner);
    let result = d
        .dispatch(
            "create_snapshot",
            &json!({"projectPath": ws.to_string_lossy()}),
        )
        .unwrap();
    assert!(result.success, "{:?}", result.error);

    let calls = calls.borrow();
    let args = &calls[0].1;
    let base = ws.file_name().unwrap().to_string_lossy().to_string();
    assert!(args.contains(&format!("--exclude={}/.smartops/backups/snapshots", base)));
    assert!(args.contains(&format!("--exclude={}/.smartops/trash", base)));
    assert!(args.contains(&format!("--exclude={}/.smartops/backups", base)));
    let first_exclude = args.iter().position(|a| a.starts_with("--exclude=")).unwrap();
    let dash_c = args.iter().position(|a| a == "-C").unwrap();
    assert!(first_exclude < dash_c, "excludes must precede the operands");
    assert_eq!(args.last().unwrap(), &base);
}

#[test]
fn real_tar_workspace_snapshot_twice_stays_self_contained() {
    if !tar_available() {
        eprintln!("tar not available, skipping");
        return;
    }
    let tmp = tempdir().expect("tempdir");
    let ws = tmp.path();
    fs::create_dir_all(ws.join("src")).unwrap();
    fs::write(ws.join("src/app.js"), "export function main() {}\n").unwrap();
    // large enough that tar would notice its own output growing
    let noise: Vec<u8> = (0..4 * 1024 * 1024u32)
        .map(|i| (i.wrapping_mul(2654435761) >> 13) as u8)
        .collect();
    fs::write(ws.join("blob.bin"), &noise).unwrap();

    let d = Dispatcher::new(Config::for_workspace(ws)).with_runner(Box::new(SystemRunner));
    let args = json!({"projectPath": ws.to_string_lossy()});
    let first = d.dispatch("create_snapshot", &args).unwrap();
    assert!(first.success, "{:?}", first.error);
    let second = d.dispatch("create_snapshot", &args).unwrap();
    assert!(second.success, "{:?}", second.error);

    let archive = second.get("manifest").unwrap()["snapshotFile"]
        .as_str()
        .unwrap()
        .to_string();
    let listing = Command::new("tar")
        .args(["-tzf", archive.as_str()])
        .output()
        .expect("list archive");
    assert!(listing.status.success());
    let members = String::from_utf8_lossy(&listing.stdout);
    assert!(members.lines().any(|m| m.ends_with("src/app.js")));
    assert!(
        !members
            .lines()
            .any(|m| m.contains(".smartops/backups") || m.contains(".smartops/trash")),
        "state directories leaked into the archive:\n{}",
        members
    );
    assert!(
        snapshot::verify_snapshots(&d.config().snapshot_dir())
            .unwrap()
            .is_empty()
    );
}

#[test]
fn real_tar_snapshot_verifies_until_tampered() {
    if !tar_available() {
        eprintln!("tar not available, skipping");
        return;
    }
    let tmp = tempdir().expect("tempdir");
    let ws = tmp.path();
    let project = ws.join("site");
    fs::create_dir_all(project.join("src")).unwrap();
    fs::write(project.join("src/main.js"), "console.log('hi');").unwrap();

    let d = Dispatcher::new(Config::for_workspace(ws)).with_runner(Box::new(SystemRunner));
    let result = d
        .dispatch(
            "create_snapshot",
            &json!({"projectPath": project.to_string_lossy()}),
        )
        .unwrap();
    assert!(result.success, "{:?}", result.error);

    let snapshot_dir = d.config().snapshot_dir();
    assert!(snapshot::verify_snapshots(&snapshot_dir).unwrap().is_empty());

    let archive = result.get("manifest").unwrap()["snapshotFile"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(archive.ends_with("_snapshot.tar.gz"));
    fs::write(&archive, b"tampered").unwrap();

    let failures = snapshot::verify_snapshots(&snapshot_dir).unwrap();
    assert_eq!(failures.len(), 1);
    assert!(failures[0].starts_with(&archive));
}
