mod common;

use assert_json_diff::assert_json_eq;
use common::TestProject;
use serde_json::json;
use tsx_extract::{EvalContext, EvalFlags};

fn tokens_project(app: &str) -> TestProject {
    TestProject::new(&[
        ("src/app.tsx", app),
        (
            "src/tokens.ts",
            "export const color = 'red'\n\
             const spacing = { sm: 4, lg: 16 }\n\
             export { spacing }\n\
             export default { radius: 8 }",
        ),
    ])
}

#[test]
fn test_named_import() {
    let project = tokens_project("import { color } from './tokens'\nconst value = color");
    let value = project.value_of("src/app.tsx", "value").unwrap();
    assert_eq!(value.literal_value().and_then(|v| v.as_str()), Some("red"));
}

#[test]
fn test_aliased_import_member_access() {
    let project = tokens_project("import { spacing as space } from './tokens'\nconst value = space.lg");
    let value = project.value_of("src/app.tsx", "value").unwrap();
    assert_eq!(value.literal_value().and_then(|v| v.as_number()), Some(16.0));
}

#[test]
fn test_default_import() {
    let project = tokens_project("import theme from './tokens'\nconst value = theme");
    assert_json_eq!(
        project.unbox_var("src/app.tsx", "value"),
        json!({ "raw": { "radius": 8 }, "conditions": [], "spreadConditions": [] })
    );
}

#[test]
fn test_namespace_import_member() {
    let project = tokens_project("import * as tokens from './tokens'\nconst value = tokens.color");
    let value = project.value_of("src/app.tsx", "value").unwrap();
    assert_eq!(value.literal_value().and_then(|v| v.as_str()), Some("red"));
}

#[test]
fn test_reexport_through_barrel() {
    let project = TestProject::new(&[
        ("app.ts", "import { color } from './index'\nconst value = color"),
        ("index.ts", "export * from './tokens'"),
        ("tokens.ts", "export const color = 'teal'"),
    ]);
    let value = project.value_of("app.ts", "value").unwrap();
    assert_eq!(value.literal_value().and_then(|v| v.as_str()), Some("teal"));
}

#[test]
fn test_barrel_without_symbol_is_unresolvable() {
    let project = TestProject::new(&[
        ("app.ts", "import { color } from './index'\nconst value = color"),
        ("index.ts", "export { size } from './tokens'"),
        ("tokens.ts", "export const color = 'teal'\nexport const size = 'lg'"),
    ]);
    let value = project.value_of("app.ts", "value").unwrap();
    assert!(value.is_unresolvable());
}

#[test]
fn test_missing_module_is_unresolvable() {
    let project = TestProject::new(&[("app.ts", "import { color } from './nowhere'\nconst value = color")]);
    let value = project.value_of("app.ts", "value").unwrap();
    assert!(value.is_unresolvable());
}

#[test]
fn test_skip_cross_file_traversal() {
    let project = tokens_project("import { color } from './tokens'\nconst value = color");
    let ctx = EvalContext::default().with_flags(EvalFlags {
        skip_cross_file_traversal: true,
        ..EvalFlags::default()
    });
    let value = project.value_with("src/app.tsx", "value", &ctx).unwrap();
    assert!(value.is_unresolvable());
}
