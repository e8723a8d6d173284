use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

const MANUAL: &str = "\
# 1 Organisation

The accountable manager is responsible for the organisation.

# 2 Certifying staff

Certifying staff are authorised as described in section 1 and 145.A.30.
";

const REGULATION: &str = "\
145.A.30 Personnel requirements

The organisation shall appoint an accountable manager.
";

#[allow(deprecated)]
fn cli(data_dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("manual-audit").expect("binary");
    cmd.current_dir(data_dir)
        .env_remove("AUDIT_API_KEY")
        .env_remove("AUDIT_CLASSIFIER")
        .env("AUDIT_DATA_DIR", data_dir.join("state"))
        .arg("--quiet");
    cmd
}

fn json_stdout(cmd: &mut Command) -> Value {
    let output = cmd.output().expect("command run");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid json")
}

#[test]
fn ingest_audit_and_report_with_fixture() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::write(root.join("moe.md"), MANUAL).unwrap();
    fs::write(root.join("part145.txt"), REGULATION).unwrap();
    fs::write(
        root.join("fixture.json"),
        r#"{"moe#1": [{
            "flag": "YELLOW",
            "severity_score": 4,
            "regulation_references": ["145.A.30"],
            "findings": "Authorisation procedure is only referenced.",
            "gaps": ["No authorisation procedure"],
            "citations": {"manual_section": "2", "regulation_sections": ["145.A.30"]},
            "recommendations": [],
            "needs_additional_context": false,
            "context_query": null
        }]}"#,
    )
    .unwrap();

    let regulation =
        json_stdout(cli(root).args(["ingest", "--corpus", "regulation", "part145.txt"]));
    assert_eq!(regulation["corpus"], "regulation");

    let manual = json_stdout(cli(root).args([
        "ingest", "--corpus", "manual", "--id", "moe", "moe.md",
    ]));
    assert_eq!(manual["id"], "moe");
    assert_eq!(manual["chunks"], 2);

    let audit = json_stdout(cli(root).args(["audit", "moe", "--fixture", "fixture.json"]));
    assert_eq!(audit["run"]["status"], "completed");
    assert_eq!(audit["run"]["compliance_score"], 97);
    let run_id = audit["run"]["id"].as_str().unwrap().to_string();

    let report = json_stdout(cli(root).args(["report", &run_id]));
    assert_eq!(report["flag_summary"]["yellow"], 1);
    assert_eq!(report["flag_summary"]["green"], 1);
    assert_eq!(report["warnings"][0]["title"], "2");
    assert_eq!(
        report["recommendations"][0],
        "Address the identified gap: No authorisation procedure"
    );
}

#[test]
fn chunk_prints_chunks_without_storing() {
    let temp = tempdir().unwrap();
    let root = temp.path();
    fs::write(root.join("moe.md"), MANUAL).unwrap();

    let chunks = json_stdout(cli(root).args(["chunk", "moe.md"]));
    assert_eq!(chunks.as_array().unwrap().len(), 2);
    assert_eq!(chunks[1]["label"], "2");
    assert!(!root.join("state").join("store.json").exists());
}

#[test]
fn unknown_run_and_bad_corpus_fail() {
    let temp = tempdir().unwrap();
    let root = temp.path();

    cli(root)
        .args(["report", "run-missing"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("run-missing"));

    fs::write(root.join("x.txt"), "text").unwrap();
    cli(root)
        .args(["ingest", "--corpus", "memo", "x.txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown corpus"));
}
