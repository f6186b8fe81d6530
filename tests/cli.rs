//! Drives the `chq` binary end to end against a temporary corpus.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn chq(config: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_chq"))
        .arg("--config")
        .arg(config)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("failed to run chq")
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_path = root.join("chq.toml");
    fs::write(
        &config_path,
        format!(
            r#"[db]
path = "{}/data/corpus.sqlite"

[retrieval]
vector_weight = 0.6
keyword_weight = 0.2
source_bias_weight = 0.2

[families]
NZMRM = ["NZ Metal Roofing"]

[embedding]
provider = "disabled"
"#,
            root.display()
        ),
    )
    .unwrap();

    let chunks = [
        r#"{"source": "E2/AS1", "page": 90, "content": "Clause 9.1.3 apron flashing cover shall be a minimum of 150 mm", "doc_type": "acceptable_solution_current", "priority": 90}"#,
        r#"{"source": "NZ Metal Roofing", "page": 40, "content": "apron flashing cover recommendations", "doc_type": "industry_code_of_practice", "priority": 75}"#,
        r#"{"source": "Consent Guide", "page": 2, "content": "lodging a building consent application with council"}"#,
    ];
    fs::write(root.join("chunks.jsonl"), chunks.join("\n")).unwrap();

    (tmp, config_path)
}

#[test]
fn test_init_import_retrieve() {
    let (tmp, config) = setup_test_env();

    let out = chq(&config, &["init"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let file = tmp.path().join("chunks.jsonl");
    let out = chq(&config, &["import", file.to_str().unwrap()]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).contains("imported: 3"));

    let out = chq(&config, &["retrieve", "minimum apron flashing cover", "--json"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["results"][0]["source"], "E2/AS1");
    assert_eq!(json["intent"]["category"], "compliance_strict");
    assert_eq!(json["degraded"][0]["kind"], "keyword_only");
    assert_eq!(json["citations"][0]["display_text"], "E2/AS1 clause 9.1.3 (p.90)");

    let out = chq(&config, &["retrieve", "minimum apron flashing cover", "--explain"]);
    assert!(out.status.success());
    let text = String::from_utf8_lossy(&out.stdout);
    assert!(text.contains("1. ["), "{}", text);
    assert!(text.contains("Citations:"), "{}", text);
}

#[test]
fn test_classify_prints_intent() {
    let (_tmp, config) = setup_test_env();
    let out = chq(&config, &["classify", "how do I lodge a building consent with council"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert!(json["category"].is_string());
    assert!(json["top_k"].as_u64().unwrap() > 0);
}

#[test]
fn test_unknown_intent_rejected() {
    let (_tmp, config) = setup_test_env();
    let out = chq(&config, &["retrieve", "apron", "--intent", "urgent"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown intent"));
}

#[test]
fn test_invalid_weights_fail_fast() {
    let tmp = TempDir::new().unwrap();
    let config = tmp.path().join("bad.toml");
    fs::write(
        &config,
        "[db]\npath = \"./x.sqlite\"\n\n[retrieval]\nvector_weight = 0.5\nkeyword_weight = 0.5\nsource_bias_weight = 0.5\n",
    )
    .unwrap();
    let out = chq(&config, &["classify", "apron"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("sum to 1.0"));
}
