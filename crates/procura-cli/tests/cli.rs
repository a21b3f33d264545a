use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;

const FIELDS: &str = r#"
fields:
  project_name:
    label: 项目名称
    data_type: text
    source:
      pdf_type: procurement_notice
      extraction: {method: horizontal_keyvalue, key: 项目名称}
  control_price:
    label: 最高限价
    data_type: amount
    source:
      pdf_type: procurement_notice
      extraction: {method: amount, key: 最高限价}
    fallback_source:
      pdf_type: control_price_approval
      extraction: {method: amount, key: 审定控制价}
  archive_number:
    label: 档案号
    data_type: text
    source: {manual: true}
"#;

const PATTERNS: &str = r#"
document_types:
  procurement_notice:
    filename_patterns: [采购公告]
    content_markers: [采购公告]
  control_price_approval:
    filename_patterns: [控制价]
    content_markers: [审定控制价]
"#;

fn write_config(dir: &Path, fields: &str) -> std::path::PathBuf {
    fs::write(dir.join("field_mapping.yaml"), fields).unwrap();
    fs::write(dir.join("document_patterns.yaml"), PATTERNS).unwrap();
    let engine = dir.join("engine.json");
    fs::write(
        &engine,
        r#"{"paths": {"field_mapping": "field_mapping.yaml", "document_patterns": "document_patterns.yaml"}}"#,
    )
    .unwrap();
    engine
}

fn procura() -> Command {
    Command::cargo_bin("procura").unwrap()
}

#[test]
fn test_config_validate() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_config(dir.path(), FIELDS);

    procura()
        .arg("--config")
        .arg(&engine)
        .args(["config", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 fields (1 manual)"))
        .stdout(predicate::str::contains("procurement_notice, control_price_approval"));
}

#[test]
fn test_invalid_field_mapping_fails_and_names_the_field() {
    let dir = tempfile::tempdir().unwrap();
    let broken = FIELDS.replace("    label: 最高限价\n", "");
    let engine = write_config(dir.path(), &broken);

    procura()
        .arg("--config")
        .arg(&engine)
        .args(["config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("control_price"))
        .stderr(predicate::str::contains("label"));
}

#[test]
fn test_missing_engine_config_fails() {
    procura()
        .args(["--config", "/nonexistent/engine.json", "config", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn test_detect_by_filename_without_reading() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_config(dir.path(), FIELDS);

    procura()
        .arg("--config")
        .arg(&engine)
        .args(["detect", "--json", "2025-017 采购公告.pdf", "最高限价控制价审定.pdf"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""document_type": "procurement_notice""#))
        .stdout(predicate::str::contains(r#""document_type": "control_price_approval""#))
        .stdout(predicate::str::contains(r#""method": "filename""#));
}

#[test]
fn test_merge_reports_unreadable_documents_and_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_config(dir.path(), FIELDS);
    let notice = dir.path().join("notice.pdf");
    fs::write(&notice, b"not a pdf").unwrap();

    procura()
        .arg("--config")
        .arg(&engine)
        .arg("merge")
        .arg("--doc")
        .arg(format!("procurement_notice={}", notice.display()))
        .assert()
        .success()
        .stdout(predicate::str::contains("failed_documents"))
        .stdout(predicate::str::contains(r#""project_name": null"#))
        .stdout(predicate::str::contains("archive_number").not());
}

#[test]
fn test_merge_rejects_malformed_tag() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_config(dir.path(), FIELDS);

    procura()
        .arg("--config")
        .arg(&engine)
        .args(["merge", "--doc", "notice.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("TYPE=PATH"));
}

#[test]
fn test_merge_csv_lists_every_field() {
    let dir = tempfile::tempdir().unwrap();
    let engine = write_config(dir.path(), FIELDS);

    procura()
        .arg("--config")
        .arg(&engine)
        .args(["merge", "--format", "csv", "--doc", "procurement_notice=/nonexistent/a.pdf"])
        .assert()
        .success()
        .stdout(predicate::str::contains("field,value,source,requires_confirmation"))
        .stdout(predicate::str::contains("control_price,,,no"))
        .stdout(predicate::str::contains("project_name,,,no"));
}

#[test]
fn test_config_init_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("engine.json");

    procura()
        .args(["config", "init", "--output"])
        .arg(&output)
        .assert()
        .success();
    let written = fs::read_to_string(&output).unwrap();
    assert!(written.contains("procurement_notice"));

    procura()
        .args(["config", "init", "--output"])
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}
