mod common;

use assert_json_diff::assert_json_eq;
use common::TestProject;
use serde_json::{json, Value};
use std::process::Command;

fn run(project: &TestProject, extra: &[&str]) -> Value {
    let output = Command::new(env!("CARGO_BIN_EXE_tsx-extract"))
        .arg("--root")
        .arg(project.dir.path())
        .args(extra)
        .arg(project.path("src"))
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "cli failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn project() -> TestProject {
    TestProject::new(&[
        ("extractor.toml", "[matchers]\nfunctions = [\"css\"]\n"),
        (
            "src/a.ts",
            "import { brand } from './colors'\nexport const a = css({ color: brand, gap: wide ? 8 : 4 })",
        ),
        ("src/colors.ts", "export const brand = 'navy'"),
        ("src/notes.md", "css({ ignored: true })"),
    ])
}

#[test]
fn test_cli_reports_unboxed_instances() {
    let project = project();
    let report = run(&project, &[]);

    let files = report["files"].as_array().unwrap();
    assert_eq!(files.len(), 1);
    assert!(files[0]["path"].as_str().unwrap().ends_with("a.ts"));
    assert_json_eq!(
        files[0]["results"],
        json!({
            "css": {
                "kind": "function",
                "instances": [{
                    "raw": { "color": "navy" },
                    "conditions": [{ "gap": 8 }, { "gap": 4 }],
                    "spreadConditions": []
                }]
            }
        })
    );
}

#[test]
fn test_cli_flags_are_applied() {
    let project = project();
    let report = run(&project, &["--flag", "skip-cross-file-traversal"]);
    let instance = &report["files"][0]["results"]["css"]["instances"][0];
    assert_json_eq!(instance["raw"], json!({}));
}
