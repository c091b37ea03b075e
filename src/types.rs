use crate::error::ExtractError;
use compact_str::CompactString;
use indexmap::IndexMap;
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;

/// Identity of a loaded source file.
/// Assigned monotonically by the file table; 0 is reserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(NonZeroU32);

impl FileId {
    #[inline]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(Self)
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self.0.get()
    }
}

/// Identity of a syntax node across every loaded file.
///
/// Tree-sitter node ids are only unique within one tree, so the owning file
/// is part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey {
    pub file: FileId,
    pub id: usize,
}

/// An owned, non-borrowing handle to a syntax node.
///
/// Carries enough to print provenance and to locate the node again inside
/// its [`SourceFile`](crate::analysis::SourceFile).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeRef {
    /// Cache identity
    pub key: NodeKey,
    /// Tree-sitter node kind (e.g. `object`, `ternary_expression`)
    pub kind: &'static str,
    pub start_byte: usize,
    pub end_byte: usize,
    /// 1-based line of the node start
    pub line: u32,
    /// 1-based column of the node start
    pub column: u32,
}

impl NodeRef {
    #[inline]
    pub fn file(&self) -> FileId {
        self.key.file
    }
}

struct ProvenanceCell {
    node: NodeRef,
    prev: Option<Arc<ProvenanceCell>>,
    len: usize,
}

/// Ordered list of the syntax nodes visited while resolving a value.
///
/// Persistent: `push` returns a new list sharing its tail with the old one,
/// so recursion that fans out (both ternary branches, every array element)
/// never aliases a sibling's stack.
#[derive(Clone, Default)]
pub struct Provenance(Option<Arc<ProvenanceCell>>);

impl Provenance {
    pub fn new() -> Self {
        Self(None)
    }

    pub fn push(&self, node: NodeRef) -> Self {
        let len = self.len() + 1;
        Self(Some(Arc::new(ProvenanceCell {
            node,
            prev: self.0.clone(),
            len,
        })))
    }

    pub fn extend<I: IntoIterator<Item = NodeRef>>(&self, nodes: I) -> Self {
        nodes.into_iter().fold(self.clone(), |acc, node| acc.push(node))
    }

    /// Most recently pushed node.
    pub fn last(&self) -> Option<&NodeRef> {
        self.0.as_ref().map(|cell| &cell.node)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.as_ref().map_or(0, |cell| cell.len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    /// Iterates newest to oldest.
    pub fn iter(&self) -> ProvenanceIter<'_> {
        ProvenanceIter {
            cursor: self.0.as_deref(),
        }
    }

    /// Oldest first, matching push order.
    pub fn to_vec(&self) -> Vec<NodeRef> {
        let mut nodes: Vec<NodeRef> = self.iter().copied().collect();
        nodes.reverse();
        nodes
    }

    pub fn any(&self, mut pred: impl FnMut(&NodeRef) -> bool) -> bool {
        self.iter().any(|node| pred(node))
    }
}

pub struct ProvenanceIter<'a> {
    cursor: Option<&'a ProvenanceCell>,
}

impl<'a> Iterator for ProvenanceIter<'a> {
    type Item = &'a NodeRef;

    fn next(&mut self) -> Option<Self::Item> {
        let cell = self.cursor?;
        self.cursor = cell.prev.as_deref();
        Some(&cell.node)
    }
}

impl fmt::Debug for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.to_vec().iter().map(|n| (n.kind, n.line, n.column)))
            .finish()
    }
}

/// A plain, fully-resolved value. `Undefined` is distinct from `Null`.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PlainValue {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(CompactString),
    Array(Vec<PlainValue>),
    Object(IndexMap<CompactString, PlainValue>),
}

impl PlainValue {
    pub fn string(value: impl Into<CompactString>) -> Self {
        PlainValue::String(value.into())
    }

    #[inline]
    pub fn is_nullish(&self) -> bool {
        matches!(self, PlainValue::Undefined | PlainValue::Null)
    }

    /// JS `ToBoolean`.
    pub fn is_truthy(&self) -> bool {
        match self {
            PlainValue::Undefined | PlainValue::Null => false,
            PlainValue::Bool(b) => *b,
            PlainValue::Number(n) => *n != 0.0 && !n.is_nan(),
            PlainValue::String(s) => !s.is_empty(),
            PlainValue::Array(_) | PlainValue::Object(_) => true,
        }
    }

    /// Truthy, or exactly the number zero.
    pub fn is_truthy_or_zero(&self) -> bool {
        self.is_truthy() || matches!(self, PlainValue::Number(n) if *n == 0.0)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PlainValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            PlainValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// JS `typeof`.
    pub fn type_of(&self) -> &'static str {
        match self {
            PlainValue::Undefined => "undefined",
            PlainValue::Null | PlainValue::Array(_) | PlainValue::Object(_) => "object",
            PlainValue::Bool(_) => "boolean",
            PlainValue::Number(_) => "number",
            PlainValue::String(_) => "string",
        }
    }

    /// The property key this value produces when used as `obj[value]`.
    /// Only strings and numbers qualify.
    pub fn to_property_key(&self) -> Option<CompactString> {
        match self {
            PlainValue::String(s) => Some(s.clone()),
            PlainValue::Number(n) => Some(format_number(*n).into()),
            _ => None,
        }
    }

    /// Property lookup by key, including array indices and `length`.
    pub fn get(&self, key: &str) -> Option<&PlainValue> {
        match self {
            PlainValue::Object(map) => map.get(key),
            PlainValue::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

impl From<&str> for PlainValue {
    fn from(value: &str) -> Self {
        PlainValue::String(value.into())
    }
}

impl From<f64> for PlainValue {
    fn from(value: f64) -> Self {
        PlainValue::Number(value)
    }
}

impl From<bool> for PlainValue {
    fn from(value: bool) -> Self {
        PlainValue::Bool(value)
    }
}

impl Serialize for PlainValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            PlainValue::Undefined | PlainValue::Null => serializer.serialize_unit(),
            PlainValue::Bool(b) => serializer.serialize_bool(*b),
            PlainValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    serializer.serialize_i64(*n as i64)
                } else if n.is_finite() {
                    serializer.serialize_f64(*n)
                } else {
                    serializer.serialize_unit()
                }
            }
            PlainValue::String(s) => serializer.serialize_str(s),
            PlainValue::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            PlainValue::Object(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key.as_str(), value)?;
                }
                map.end()
            }
        }
    }
}

/// Format a number the way JS `String(n)` does for the common cases.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{:.0}", n)
    } else {
        n.to_string()
    }
}

/// Kind tag carried by a literal value node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LiteralKind {
    String,
    Number,
    Boolean,
    Null,
    Undefined,
    Array,
}

impl LiteralKind {
    /// Classify a literal value. Objects are not literals; reaching this with
    /// one means the model and the evaluator disagree.
    pub fn of(value: &PlainValue) -> Result<Self, ExtractError> {
        match value {
            PlainValue::Array(_) => Ok(LiteralKind::Array),
            PlainValue::String(_) => Ok(LiteralKind::String),
            PlainValue::Number(_) => Ok(LiteralKind::Number),
            PlainValue::Bool(_) => Ok(LiteralKind::Boolean),
            PlainValue::Null => Ok(LiteralKind::Null),
            PlainValue::Undefined => Ok(LiteralKind::Undefined),
            PlainValue::Object(_) => Err(ExtractError::MalformedLiteral(format!(
                "Unexpected literal type: {}",
                value.to_json()
            ))),
        }
    }
}
