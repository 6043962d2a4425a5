//! Serializable tree of registered routes.
//!
//! The tree mirrors how a client walks a server: one node per path segment,
//! the root path stored under the `index` node, and `:name` segments stored
//! as parameter nodes that match any concrete segment.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Node name used for a route with no further nested path.
pub const INDEX: &str = "index";

/// One node of the route tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTree {
    /// Lower-case methods served at this node
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub methods: BTreeSet<String>,
    /// Child nodes keyed by segment
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, RouteTree>,
}

impl RouteTree {
    /// An empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `method` is served at `path`.
    pub fn insert(&mut self, method: &str, path: &str) {
        let mut node = self;
        for segment in segments(path) {
            node = node.children.entry(segment.to_string()).or_default();
        }
        node.methods.insert(method.to_ascii_lowercase());
    }

    /// Whether `method` is served at the concrete segment list `path`.
    ///
    /// Literal children are preferred; a parameter child matches any
    /// segment. An empty list means the `index` node.
    #[must_use]
    pub fn matches<S: AsRef<str>>(&self, method: &str, path: &[S]) -> bool {
        let method = method.to_ascii_lowercase();
        if path.is_empty() {
            return self
                .children
                .get(INDEX)
                .is_some_and(|n| n.methods.contains(&method));
        }
        self.walk(&method, path)
    }

    fn walk<S: AsRef<str>>(&self, method: &str, path: &[S]) -> bool {
        let Some((head, rest)) = path.split_first() else {
            return self.methods.contains(method)
                || self
                    .children
                    .get(INDEX)
                    .is_some_and(|n| n.methods.contains(method));
        };
        if let Some(child) = self.children.get(head.as_ref()) {
            if child.walk(method, rest) {
                return true;
            }
        }
        self.children
            .iter()
            .filter(|(segment, _)| segment.starts_with(':') || segment.as_str() == "*")
            .any(|(_, child)| child.walk(method, rest))
    }
}

fn segments(path: &str) -> Vec<&str> {
    let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if parts.is_empty() { vec![INDEX] } else { parts }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn tree() -> RouteTree {
        let mut tree = RouteTree::new();
        tree.insert("GET", "/");
        tree.insert("GET", "/users");
        tree.insert("POST", "/users");
        tree.insert("GET", "/users/:id");
        tree.insert("DELETE", "/users/:id");
        tree.insert("GET", "/users/me");
        tree
    }

    #[test]
    fn test_root_lives_under_index() {
        let tree = tree();
        assert!(tree.matches::<&str>("get", &[]));
        assert!(tree.matches("get", &["index"]));
        assert!(!tree.matches::<&str>("post", &[]));
    }

    #[test]
    fn test_param_nodes_match_any_segment() {
        let tree = tree();
        assert!(tree.matches("get", &["users", "42"]));
        assert!(tree.matches("delete", &["users", "42"]));
        assert!(tree.matches("get", &["users", "me"]));
        assert!(!tree.matches("delete", &["users", "42", "posts"]));
        assert!(!tree.matches("put", &["users"]));
    }

    #[test]
    fn test_serialized_shape() {
        let mut tree = RouteTree::new();
        tree.insert("get", "/users/:id");
        assert_eq!(
            serde_json::to_value(&tree).unwrap_or_default(),
            json!({"children": {"users": {"children": {":id": {"methods": ["get"]}}}}})
        );
    }

    proptest! {
        #[test]
        fn prop_inserted_route_matches_concrete_path(
            literals in proptest::collection::vec("[a-z]{1,8}", 1..5),
            value in "[0-9]{1,6}",
        ) {
            let mut template: Vec<String> = literals.clone();
            template.push(":id".to_string());
            let mut tree = RouteTree::new();
            tree.insert("GET", &format!("/{}", template.join("/")));

            let mut concrete = literals;
            concrete.push(value);
            prop_assert!(tree.matches("get", &concrete));
            prop_assert!(!tree.matches("post", &concrete));
        }
    }
}
