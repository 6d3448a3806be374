use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn corefviz() -> Command {
    Command::cargo_bin("corefviz").unwrap()
}

fn write_json(path: &Path, value: Value) {
    fs::write(path, serde_json::to_string(&value).unwrap()).unwrap();
}

#[test]
fn names_joins_surface_forms() {
    let dir = tempdir().unwrap();
    let clusters = dir.path().join("clusters.json");
    let surface = dir.path().join("surface.json");
    write_json(&clusters, json!([["e1", "e2"], ["e3"]]));
    write_json(&surface, json!({"e1": "John", "e2": "he", "e3": "Mary"}));

    corefviz()
        .arg("names")
        .arg("--clusters")
        .arg(&clusters)
        .arg("--surface")
        .arg(&surface)
        .assert()
        .success()
        .stdout("John=>he\nMary\n");
}

#[test]
fn names_reports_missing_surface_form() {
    let dir = tempdir().unwrap();
    let clusters = dir.path().join("clusters.json");
    let surface = dir.path().join("surface.json");
    write_json(&clusters, json!([["e1", "e9"]]));
    write_json(&surface, json!({"e1": "John"}));

    corefviz()
        .arg("names")
        .arg("--clusters")
        .arg(&clusters)
        .arg("--surface")
        .arg(&surface)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing surface form for event e9"));
}

#[test]
fn filter_keeps_selected_cluster_events() {
    let dir = tempdir().unwrap();
    let payload = dir.path().join("doc_gold.json");
    let clusters = dir.path().join("clusters.json");
    let out = dir.path().join("out/filtered.json");
    write_json(
        &payload,
        json!({"text": "t", "events": [["e1", "T1", []], ["e2", "T2", []], ["e3", "T3", []]]}),
    );
    write_json(&clusters, json!([["e1", "e2"], ["e3"]]));

    corefviz()
        .arg("filter")
        .arg("--payload")
        .arg(&payload)
        .arg("--clusters")
        .arg(&clusters)
        .arg("--select")
        .arg("0")
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    let filtered: Value = serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
    assert_eq!(filtered["text"], "t");
    assert_eq!(filtered["events"], json!([["e1", "T1", []], ["e2", "T2", []]]));
}

#[test]
fn filter_rejects_out_of_range_selection() {
    let dir = tempdir().unwrap();
    let payload = dir.path().join("doc_gold.json");
    let clusters = dir.path().join("clusters.json");
    write_json(&payload, json!({"events": []}));
    write_json(&clusters, json!([["e1"], ["e2"]]));

    corefviz()
        .arg("filter")
        .arg("--payload")
        .arg(&payload)
        .arg("--clusters")
        .arg(&clusters)
        .arg("--select")
        .arg("5")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid cluster index 5"));
}

#[test]
fn filter_rejects_payload_without_events() {
    let dir = tempdir().unwrap();
    let payload = dir.path().join("doc_gold.json");
    let clusters = dir.path().join("clusters.json");
    write_json(&payload, json!({"text": "no events"}));
    write_json(&clusters, json!([["e1"]]));

    corefviz()
        .arg("filter")
        .arg("--payload")
        .arg(&payload)
        .arg("--clusters")
        .arg(&clusters)
        .arg("--select")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Malformed payload"));
}

#[test]
fn prepare_coref_then_names() {
    let dir = tempdir().unwrap();
    let gold = dir.path().join("gold");
    let sys = dir.path().join("sys");
    let vis = dir.path().join("vis");
    fs::create_dir_all(&gold).unwrap();
    fs::create_dir_all(&sys).unwrap();
    fs::write(
        gold.join("doc1.tkn.ann"),
        "T1\tAttack 0 7\tstabbed\nT2\tAttack 20 26\tattack\nE1\tAttack:T1\nE2\tAttack:T2\nR1\tCoreference Arg1:E1 Arg2:E2\n",
    )
    .unwrap();
    fs::write(sys.join("doc1.tkn.ann"), "T1\tAttack 0 7\tstabbed\nE1\tAttack:T1\n").unwrap();

    corefviz()
        .arg("prepare-coref")
        .arg("-g")
        .arg(&gold)
        .arg("-s")
        .arg(&sys)
        .arg("-v")
        .arg(&vis)
        .assert()
        .success();

    corefviz()
        .arg("names")
        .arg("--clusters")
        .arg(vis.join("json/coref/doc1_coref_gold.json"))
        .arg("--surface")
        .arg(vis.join("json/surface/doc1_surface_gold.json"))
        .assert()
        .success()
        .stdout("stabbed=>attack\n");
}

#[test]
fn prepare_diff_requires_text_dir() {
    let dir = tempdir().unwrap();
    let comparison = dir.path().join("cmp.txt");
    fs::write(&comparison, "#BeginOfDocument doc1\n#EndOfDocument\n").unwrap();

    corefviz()
        .arg("prepare-diff")
        .arg("-d")
        .arg(&comparison)
        .arg("-t")
        .arg(dir.path())
        .arg("-x")
        .arg(dir.path().join("missing"))
        .arg("-v")
        .arg(dir.path().join("vis"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Cannot find text directory"));
}

#[test]
fn invalid_config_is_reported() {
    let dir = tempdir().unwrap();
    let config = dir.path().join("corefviz.yaml");
    fs::write(&config, "port: 0\n").unwrap();
    let clusters = dir.path().join("clusters.json");
    let surface = dir.path().join("surface.json");
    write_json(&clusters, json!([]));
    write_json(&surface, json!({}));

    corefviz()
        .arg("names")
        .arg("--clusters")
        .arg(&clusters)
        .arg("--surface")
        .arg(&surface)
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("port must be non-zero"));
}
