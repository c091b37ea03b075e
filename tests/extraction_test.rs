mod common;

use assert_json_diff::assert_json_eq;
use common::{nth_of_kind, TestProject};
use serde_json::json;
use tsx_extract::analysis::{QueryKind, ResultKind, ValueKind};
use tsx_extract::{ConfigManager, EvalContext};

const BUTTON: &str = r#"
import { palette } from './palette'

const size = 'lg'

export const Button = ({ active }) => (
  <Box
    color={palette.primary}
    size={size}
    {...(active ? { outline: 'solid' } : { outline: 'none' })}
  >
    {css({ padding: active ? 2 : 4 })}
  </Box>
)
"#;

fn project() -> TestProject {
    TestProject::new(&[
        ("src/Button.tsx", BUTTON),
        ("src/palette.ts", "export const palette = { primary: 'tomato' }"),
        (
            "extractor.toml",
            "[matchers]\nfunctions = [\"css\"]\ncomponents = [\"Box\"]\n",
        ),
    ])
}

#[test]
fn test_extracts_components_and_calls_from_disk() {
    let project = project();
    let config = ConfigManager::new().load_from_workspace(project.dir.path()).unwrap();
    let request = config.request().unwrap();
    let file = project.file("src/Button.tsx");

    let result = project.engine.extract(&file, &request);
    assert_eq!(result.keys().cloned().collect::<Vec<_>>(), vec!["Box", "css"]);

    let component = &result["Box"];
    assert_eq!(component.kind, ResultKind::Component);
    assert_eq!(component.query_list[0].kind, QueryKind::Component);
    assert_json_eq!(
        project.engine.unbox(&component.query_list[0].value).to_json(),
        json!({
            "raw": { "color": "tomato", "size": "lg" },
            "conditions": [],
            "spreadConditions": [{ "outline": "solid" }, { "outline": "none" }]
        })
    );

    let call = &result["css"].query_list[0];
    let ValueKind::Array(args) = &call.value.kind else {
        panic!("call value should be an argument array");
    };
    assert_json_eq!(
        project.engine.unbox_list(args).to_json(),
        json!({
            "raw": {},
            "conditions": [{ "padding": 2 }, { "padding": 4 }],
            "spreadConditions": []
        })
    );
}

#[test]
fn test_prop_globs_filter_component_props() {
    let project = TestProject::new(&[
        ("src/Button.tsx", BUTTON),
        ("src/palette.ts", "export const palette = { primary: 'tomato' }"),
        (
            "extractor.toml",
            "[matchers]\ncomponents = [\"Box\"]\nprops = [\"col*\"]\n",
        ),
    ]);
    let config = ConfigManager::new().load_from_workspace(project.dir.path()).unwrap();
    let file = project.file("src/Button.tsx");
    let result = project.engine.extract(&file, &config.request().unwrap());

    let item = &result["Box"];
    assert_eq!(item.nodes_by_prop.keys().cloned().collect::<Vec<_>>(), vec!["color"]);
}

#[test]
fn test_jsx_element_props_on_disk() {
    let project = project();
    let file = project.file("src/Button.tsx");
    let element = nth_of_kind(&file, "jsx_opening_element", 0);

    let props = project
        .engine
        .jsx_element_props(&file, element, &EvalContext::default())
        .unwrap();
    assert_eq!(props.name, "Box");
    assert_eq!(
        props.props.keys().cloned().collect::<Vec<_>>(),
        vec!["color", "size"]
    );
}
