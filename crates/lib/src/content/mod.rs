//! Content trees: the structured value every document revision holds.
//!
//! A [`Node`] is a closed tagged union of leaf values (null, booleans,
//! numbers, text), ordered lists and key-ordered maps. It is the shape of a
//! rich-text document body (blocks, marks, attributes), and it is the value
//! the patch engine diffs and the history log stores.
//!
//! # Canonical encoding
//!
//! Nodes serialize as plain JSON. Maps use a `BTreeMap`, so the same tree
//! always encodes to the same bytes; [`Node::encoded_len`] is therefore a
//! reproducible size measure, and the snapshot policy compares sizes of
//! patches and trees using it.
//!
//! ```
//! use folio::content::Node;
//!
//! let doc = Node::map([
//!     ("title", Node::from("Photosynthesis")),
//!     ("blocks", Node::list(vec![Node::from("Plants make sugar from light.")])),
//! ]);
//! assert_eq!(doc.word_count(), 6);
//! assert_eq!(
//!     doc.to_canonical_json(),
//!     r#"{"blocks":["Plants make sugar from light."],"title":"Photosynthesis"}"#
//! );
//! ```

pub mod path;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use path::{Path, PathError, Segment};

/// A node of a content tree.
///
/// Equality follows the canonical encoding: `0.0` and `-0.0` differ, and
/// non-finite floats (which encode as `null`) equal each other.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    // Leaf values
    /// Null/empty value
    #[default]
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Text string value
    Text(String),

    // Branch values
    /// Ordered list of nodes
    List(Vec<Node>),
    /// Keyed attributes
    Map(BTreeMap<String, Node>),
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Null, Node::Null) => true,
            (Node::Bool(a), Node::Bool(b)) => a == b,
            (Node::Int(a), Node::Int(b)) => a == b,
            (Node::Float(a), Node::Float(b)) => float_eq(*a, *b),
            (Node::Text(a), Node::Text(b)) => a == b,
            (Node::List(a), Node::List(b)) => a == b,
            (Node::Map(a), Node::Map(b)) => a == b,
            _ => false,
        }
    }
}

fn float_eq(a: f64, b: f64) -> bool {
    match (a.is_finite(), b.is_finite()) {
        (true, true) => a.to_bits() == b.to_bits(),
        (false, false) => true,
        _ => false,
    }
}

/// The kind of a node, used in error messages and kind comparisons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Null,
    Bool,
    Int,
    Float,
    Text,
    List,
    Map,
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            NodeKind::Null => "null",
            NodeKind::Bool => "bool",
            NodeKind::Int => "int",
            NodeKind::Float => "float",
            NodeKind::Text => "text",
            NodeKind::List => "list",
            NodeKind::Map => "map",
        };
        f.write_str(name)
    }
}

impl Node {
    /// An empty map, the usual seed for a new document.
    pub fn empty_map() -> Self {
        Node::Map(BTreeMap::new())
    }

    /// Build a list node.
    pub fn list(items: Vec<Node>) -> Self {
        Node::List(items)
    }

    /// Build a map node from key/value pairs.
    pub fn map<K: Into<String>>(entries: impl IntoIterator<Item = (K, Node)>) -> Self {
        Node::Map(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Returns the kind of this node.
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Null => NodeKind::Null,
            Node::Bool(_) => NodeKind::Bool,
            Node::Int(_) => NodeKind::Int,
            Node::Float(_) => NodeKind::Float,
            Node::Text(_) => NodeKind::Text,
            Node::List(_) => NodeKind::List,
            Node::Map(_) => NodeKind::Map,
        }
    }

    /// Returns true if this is a leaf value
    pub fn is_leaf(&self) -> bool {
        !self.is_container()
    }

    /// Returns true if this node holds other nodes
    pub fn is_container(&self) -> bool {
        matches!(self, Node::List(_) | Node::Map(_))
    }

    /// Attempts to view as text
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Node::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Attempts to view as a list
    pub fn as_list(&self) -> Option<&[Node]> {
        match self {
            Node::List(items) => Some(items),
            _ => None,
        }
    }

    /// Attempts to view as a map
    pub fn as_map(&self) -> Option<&BTreeMap<String, Node>> {
        match self {
            Node::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Look up the node at `path`, if it exists.
    pub fn get(&self, path: &Path) -> Option<&Node> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| match node {
                Node::Map(map) => map.get(segment.as_key().as_ref()),
                Node::List(items) => segment.as_index().and_then(|i| items.get(i)),
                _ => None,
            })
    }

    /// Canonical JSON encoding of this tree.
    pub fn to_canonical_json(&self) -> String {
        // Serializing a Node cannot fail: keys are strings and every variant is plain data.
        // Non-finite floats encode as null, which serde_json handles without error.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Byte length of the canonical encoding.
    pub fn encoded_len(&self) -> usize {
        self.to_canonical_json().len()
    }

    /// Visit every text leaf in document order.
    pub fn texts(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_texts(self, &mut out);
        out
    }

    /// Number of whitespace-separated words across all text leaves.
    pub fn word_count(&self) -> u64 {
        self.texts()
            .iter()
            .map(|t| t.split_whitespace().count() as u64)
            .sum()
    }

    /// Number of characters (Unicode scalar values) across all text leaves.
    pub fn char_count(&self) -> u64 {
        self.texts().iter().map(|t| t.chars().count() as u64).sum()
    }
}

fn collect_texts<'a>(node: &'a Node, out: &mut Vec<&'a str>) {
    match node {
        Node::Text(s) => out.push(s),
        Node::List(items) => items.iter().for_each(|n| collect_texts(n, out)),
        Node::Map(map) => map.values().for_each(|n| collect_texts(n, out)),
        _ => {}
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Text(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::Text(s)
    }
}

impl From<bool> for Node {
    fn from(b: bool) -> Self {
        Node::Bool(b)
    }
}

impl From<i64> for Node {
    fn from(n: i64) -> Self {
        Node::Int(n)
    }
}

impl From<f64> for Node {
    fn from(n: f64) -> Self {
        Node::Float(n)
    }
}

impl From<Vec<Node>> for Node {
    fn from(items: Vec<Node>) -> Self {
        Node::List(items)
    }
}

/// Integers outside the `i64` range become `Float` and lose precision.
impl From<serde_json::Value> for Node {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Node::Null,
            Value::Bool(b) => Node::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Node::Int(i),
                None => Node::Float(n.as_f64().unwrap_or(0.0)),
            },
            Value::String(s) => Node::Text(s),
            Value::Array(items) => Node::List(items.into_iter().map(Node::from).collect()),
            Value::Object(map) => Node::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}

impl From<Node> for serde_json::Value {
    fn from(node: Node) -> Self {
        use serde_json::Value;
        match node {
            Node::Null => Value::Null,
            Node::Bool(b) => Value::Bool(b),
            Node::Int(i) => Value::from(i),
            Node::Float(f) => serde_json::Number::from_f64(f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Node::Text(s) => Value::String(s),
            Node::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            Node::Map(map) => Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect()),
        }
    }
}
