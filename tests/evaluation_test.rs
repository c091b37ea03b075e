mod common;

use assert_json_diff::assert_json_eq;
use common::{initializer, single, TestProject};
use serde_json::json;
use std::sync::Arc;
use tsx_extract::{EvalContext, EvalFlags, Provenance};

#[test]
fn test_evaluation_is_idempotent() {
    let (engine, file) = single("const theme = { color: 'red', size: cond ? 'sm' : 'lg' }");
    let init = initializer(&file, "theme").unwrap();
    let ctx = EvalContext::default();

    let first = engine.evaluate(&file, init, &Provenance::new(), &ctx).unwrap();
    let second = engine.evaluate(&file, init, &Provenance::new(), &ctx).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(engine.unbox(&first), engine.unbox(&second));
}

#[test]
fn test_plain_literals_round_trip() {
    let project = TestProject::new(&[(
        "tokens.ts",
        "const tokens = { n: 1.5, s: 'x', b: false, list: [1, 'two'], nested: { deep: true } }",
    )]);
    assert_json_eq!(
        project.unbox_var("tokens.ts", "tokens"),
        json!({
            "raw": { "n": 1.5, "s": "x", "b": false, "list": [1, "two"], "nested": { "deep": true } },
            "conditions": [],
            "spreadConditions": []
        })
    );
}

#[test]
fn test_unknown_condition_bifurcates() {
    let project = TestProject::new(&[(
        "a.ts",
        "const style = { padding: 4, color: isDark ? 'white' : 'black' }",
    )]);
    assert_json_eq!(
        project.unbox_var("a.ts", "style"),
        json!({
            "raw": { "padding": 4 },
            "conditions": [{ "color": "white" }, { "color": "black" }],
            "spreadConditions": []
        })
    );
}

#[test]
fn test_known_condition_picks_branch() {
    let project = TestProject::new(&[(
        "a.ts",
        "const dark = true\nconst color = dark ? 'white' : 'black'",
    )]);
    let value = project.value_of("a.ts", "color").unwrap();
    assert_eq!(value.literal_value().and_then(|v| v.as_str()), Some("white"));
}

#[test]
fn test_short_circuit_operators() {
    let project = TestProject::new(&[(
        "a.ts",
        "const zero = 0\n\
         const a = zero || 'fallback'\n\
         const b = zero ?? 'fallback'\n\
         const c = null ?? 'fallback'\n\
         const d = false && 'never'",
    )]);
    let literal = |name: &str| {
        project
            .value_of("a.ts", name)
            .and_then(|v| v.literal_value().cloned())
            .map(|v| v.to_json())
    };
    assert_eq!(literal("a"), Some(json!(0)));
    assert_eq!(literal("b"), Some(json!(0)));
    assert_eq!(literal("c"), Some(json!(null)));
    assert_eq!(literal("d"), Some(json!(false)));
}

#[test]
fn test_spread_under_condition() {
    let project = TestProject::new(&[(
        "a.ts",
        "const base = { radius: 2 }\nconst props = { ...base, ...(active && { outline: 'blue' }) }",
    )]);
    assert_json_eq!(
        project.unbox_var("a.ts", "props"),
        json!({
            "raw": { "radius": 2 },
            "conditions": [],
            "spreadConditions": [{ "outline": "blue" }]
        })
    );
}

#[test]
fn test_array_element_condition_is_sparse_overlay() {
    let project = TestProject::new(&[(
        "a.ts",
        "const sizes = { list: ['xs', flag ? 'md' : 'lg'] }",
    )]);
    assert_json_eq!(
        project.unbox_var("a.ts", "sizes"),
        json!({
            "raw": { "list": ["xs"] },
            "conditions": [{ "list": [null, "md"] }, { "list": [null, "lg"] }],
            "spreadConditions": []
        })
    );
}

#[test]
fn test_bare_parameter_stops_after_one_scope() {
    let (engine, file) = single("function pick(size) { const chosen = size; return chosen }");
    let init = initializer(&file, "chosen").unwrap();
    let value = engine
        .evaluate(&file, init, &Provenance::new(), &EvalContext::default())
        .unwrap();
    assert!(value.is_unresolvable());
    assert_eq!(engine.stats().scope_walks(), 1);
}

#[test]
fn test_skip_conditional_resolution_flag() {
    let project = TestProject::new(&[("a.ts", "const c = flag ? 'a' : 'b'")]);
    let ctx = EvalContext::default().with_flags(EvalFlags {
        skip_conditional_resolution: true,
        ..EvalFlags::default()
    });
    let value = project.value_with("a.ts", "c", &ctx);
    assert!(value.map_or(true, |v| !v.is_conditional()));
}

#[test]
fn test_template_and_concatenation() {
    let project = TestProject::new(&[(
        "a.ts",
        "const unit = 'px'\nconst gap = 4\nconst width = `${gap * 2}${unit}`\nconst label = 'w-' + width",
    )]);
    let label = project.value_of("a.ts", "label").unwrap();
    assert_eq!(label.literal_value().and_then(|v| v.as_str()), Some("w-8px"));
}
