//! JSON rendering for scripts that consume the branch tree.

use serde::Serialize;

use crate::tree::{Forest, Node};

#[derive(Debug, Serialize)]
pub struct JsonBranch<'a> {
    pub name: &'a str,
    pub tip: Option<String>,
    pub current: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub children: Vec<JsonBranch<'a>>,
}

fn to_json<'a>(forest: &'a Forest, node: &'a Node) -> JsonBranch<'a> {
    JsonBranch {
        name: &node.branch.name,
        tip: node.branch.tip.map(|tip| tip.to_string()),
        current: forest.is_current(&node.branch.name),
        error: node.error.as_ref().map(ToString::to_string),
        children: forest
            .children(node)
            .map(|child| to_json(forest, child))
            .collect(),
    }
}

/// The forest as an array of root branches, each nesting its children.
pub fn forest_to_json(forest: &Forest) -> Vec<JsonBranch<'_>> {
    forest.roots().map(|root| to_json(forest, root)).collect()
}

pub fn render_json(forest: &Forest) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&forest_to_json(forest))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::tree::{
        Branch, build_forest,
        tests::{FakeGraph, oid, readme_repo},
    };

    #[test]
    fn test_readme_forest_as_json() {
        let (graph, branches) = readme_repo();
        let forest = build_forest(&graph, &branches).with_current(Some("test_zoo".to_string()));
        let value: serde_json::Value = serde_json::from_str(&render_json(&forest).unwrap()).unwrap();

        let roots = value.as_array().unwrap();
        assert_eq!(roots.len(), 2);
        assert_eq!(roots[0]["name"], "branch_no_upstream");
        assert_eq!(roots[0]["children"], json!([]));
        assert_eq!(roots[1]["name"], "master");
        assert_eq!(roots[1]["tip"], oid(1).to_string());

        let master_children: Vec<&str> = roots[1]["children"]
            .as_array()
            .unwrap()
            .iter()
            .map(|child| child["name"].as_str().unwrap())
            .collect();
        assert_eq!(master_children, ["test_branch", "test_zoo"]);
        assert_eq!(roots[1]["children"][1]["current"], true);
        assert_eq!(roots[1]["children"][0]["current"], false);
        assert_eq!(roots[1]["children"][0]["children"][1]["name"], "test_two");
    }

    #[test]
    fn test_unplaced_branch_carries_error() {
        let graph = FakeGraph::default();
        let forest = build_forest(&graph, &[Branch::without_tip("broken")]);
        assert_eq!(
            serde_json::to_value(forest_to_json(&forest)).unwrap(),
            json!([{
                "name": "broken",
                "tip": null,
                "current": false,
                "error": "tip of 'broken' does not resolve to a commit",
                "children": [],
            }])
        );
    }

    #[test]
    fn test_empty_forest_is_empty_array() {
        let forest = build_forest(&FakeGraph::default(), &[]);
        assert_eq!(render_json(&forest).unwrap(), "[]");
    }
}
