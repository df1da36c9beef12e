use apihub_builder::{DiffEngine, StructuralDiffEngine};
use insta::glob;
use serde_json::{json, Value};

#[test]
fn test_from_fixtures() {
    let test = |path: &std::path::Path| {
        let contents = std::fs::read_to_string(path).unwrap();
        let value: Value = serde_json::from_str(&contents).unwrap();
        let diffs = StructuralDiffEngine
            .diff(&value["before"], &value["after"])
            .unwrap();
        let actual: Vec<Value> = diffs
            .iter()
            .map(|d| json!([d.path.join("/"), d.action, d.change_type]))
            .collect();
        assert_eq!(
            Value::Array(actual),
            value["expected"],
            "{}",
            path.display()
        );
    };
    glob!("../tests/fixtures/diff", "*.json", test);
}
