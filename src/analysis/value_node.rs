//! The value-node model.
//!
//! A [`ValueNode`] is what the evaluator knows about an expression: a literal,
//! an aggregate, a branch it could not decide, or nothing at all. Every node
//! remembers the syntax node it came from and the [`Provenance`] that led to
//! it. Nodes are immutable and shared as [`BoxNode`].

use crate::constants::RECIPE_KEYS;
use crate::error::ExtractError;
use crate::types::{LiteralKind, NodeRef, PlainValue, Provenance};
use compact_str::CompactString;
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

pub type BoxNode = Arc<ValueNode>;

/// Entries of a key-by-key resolved object.
pub type MapEntries = IndexMap<CompactString, BoxNode>;

#[derive(Debug, Clone)]
pub struct ValueNode {
    pub origin: NodeRef,
    pub stack: Provenance,
    pub kind: ValueKind,
}

#[derive(Debug, Clone)]
pub enum ValueKind {
    Literal {
        kind: LiteralKind,
        value: PlainValue,
    },
    /// Aggregate object known only as a whole (sandbox output).
    Object {
        value: IndexMap<CompactString, PlainValue>,
        is_empty: bool,
    },
    /// Object built key by key; each entry keeps its own node.
    Map {
        entries: MapEntries,
        /// Spread sources that were themselves undecided
        spread_conditions: Vec<BoxNode>,
    },
    Array(Vec<BoxNode>),
    Conditional {
        when_true: BoxNode,
        when_false: BoxNode,
    },
    Unresolvable,
    /// Attribute written without a value (`<Box disabled />`).
    EmptyInitializer,
}

impl ValueNode {
    fn boxed(kind: ValueKind, origin: NodeRef, stack: Provenance) -> BoxNode {
        Arc::new(ValueNode {
            origin,
            stack,
            kind,
        })
    }

    /// Build a literal, failing on object values.
    pub fn try_literal(
        value: PlainValue,
        origin: NodeRef,
        stack: Provenance,
    ) -> Result<BoxNode, ExtractError> {
        let kind = LiteralKind::of(&value)?;
        Ok(Self::boxed(ValueKind::Literal { kind, value }, origin, stack))
    }

    /// Build a literal.
    ///
    /// # Panics
    ///
    /// Panics when `value` is an object: objects are never literals, and
    /// reaching this means the evaluator produced something the model does
    /// not describe.
    pub fn literal(value: PlainValue, origin: NodeRef, stack: Provenance) -> BoxNode {
        match Self::try_literal(value, origin, stack) {
            Ok(node) => node,
            Err(e) => panic!("{}", e),
        }
    }

    pub fn object(
        value: IndexMap<CompactString, PlainValue>,
        origin: NodeRef,
        stack: Provenance,
    ) -> BoxNode {
        Self::boxed(
            ValueKind::Object {
                value,
                is_empty: false,
            },
            origin,
            stack,
        )
    }

    pub fn empty_object(origin: NodeRef, stack: Provenance) -> BoxNode {
        Self::boxed(
            ValueKind::Object {
                value: IndexMap::new(),
                is_empty: true,
            },
            origin,
            stack,
        )
    }

    pub fn map(entries: MapEntries, origin: NodeRef, stack: Provenance) -> BoxNode {
        Self::map_with_spreads(entries, Vec::new(), origin, stack)
    }

    pub fn map_with_spreads(
        entries: MapEntries,
        spread_conditions: Vec<BoxNode>,
        origin: NodeRef,
        stack: Provenance,
    ) -> BoxNode {
        Self::boxed(
            ValueKind::Map {
                entries,
                spread_conditions,
            },
            origin,
            stack,
        )
    }

    pub fn array(elements: Vec<BoxNode>, origin: NodeRef, stack: Provenance) -> BoxNode {
        Self::boxed(ValueKind::Array(elements), origin, stack)
    }

    /// Build a two-way branch. Two unresolvable branches carry no
    /// information, so the first one is returned instead.
    pub fn conditional(
        when_true: BoxNode,
        when_false: BoxNode,
        origin: NodeRef,
        stack: Provenance,
    ) -> BoxNode {
        if when_true.is_unresolvable() && when_false.is_unresolvable() {
            return when_true;
        }
        Self::boxed(
            ValueKind::Conditional {
                when_true,
                when_false,
            },
            origin,
            stack,
        )
    }

    pub fn unresolvable(origin: NodeRef, stack: Provenance) -> BoxNode {
        Self::boxed(ValueKind::Unresolvable, origin, stack)
    }

    pub fn empty_initializer(origin: NodeRef, stack: Provenance) -> BoxNode {
        Self::boxed(ValueKind::EmptyInitializer, origin, stack)
    }

    /// Valueless stand-in carrying only `node`'s provenance.
    pub fn fallback(node: &ValueNode) -> BoxNode {
        Self::unresolvable(node.origin, node.stack.clone())
    }

    /// Lift a plain value.
    ///
    /// Nullish values lift to nothing and a one-element array lifts to its
    /// element. Objects become [`ValueKind::Object`]; other arrays are lifted
    /// element-wise, with unliftable slots kept as unresolvable.
    pub fn from_plain(value: PlainValue, origin: NodeRef, stack: Provenance) -> Option<BoxNode> {
        match value {
            PlainValue::Undefined | PlainValue::Null => None,
            PlainValue::Object(map) => Some(Self::object(map, origin, stack)),
            PlainValue::Array(mut items) => {
                if items.len() == 1 {
                    let single = items.pop().unwrap_or_default();
                    return Self::from_plain(single, origin, stack);
                }
                let elements = items
                    .into_iter()
                    .map(|item| {
                        Self::from_plain(item, origin, stack.clone())
                            .unwrap_or_else(|| Self::unresolvable(origin, stack.clone()))
                    })
                    .collect();
                Some(Self::array(elements, origin, stack))
            }
            primitive => Some(Self::literal(primitive, origin, stack)),
        }
    }

    /// Copy of this node with a different provenance.
    pub fn with_stack(&self, stack: Provenance) -> BoxNode {
        Arc::new(ValueNode {
            origin: self.origin,
            stack,
            kind: self.kind.clone(),
        })
    }

    // =========================================================================
    // Predicates
    // =========================================================================

    #[inline]
    pub fn is_literal(&self) -> bool {
        matches!(self.kind, ValueKind::Literal { .. })
    }

    #[inline]
    pub fn is_object(&self) -> bool {
        matches!(self.kind, ValueKind::Object { .. })
    }

    #[inline]
    pub fn is_map(&self) -> bool {
        matches!(self.kind, ValueKind::Map { .. })
    }

    #[inline]
    pub fn is_array(&self) -> bool {
        matches!(self.kind, ValueKind::Array(_))
    }

    #[inline]
    pub fn is_conditional(&self) -> bool {
        matches!(self.kind, ValueKind::Conditional { .. })
    }

    #[inline]
    pub fn is_unresolvable(&self) -> bool {
        matches!(self.kind, ValueKind::Unresolvable)
    }

    #[inline]
    pub fn is_empty_initializer(&self) -> bool {
        matches!(self.kind, ValueKind::EmptyInitializer)
    }

    pub fn is_number_literal(&self) -> bool {
        matches!(
            self.kind,
            ValueKind::Literal {
                kind: LiteralKind::Number,
                ..
            }
        )
    }

    /// True for a map carrying any reserved recipe key.
    pub fn is_recipe(&self) -> bool {
        match &self.kind {
            ValueKind::Map { entries, .. } => {
                RECIPE_KEYS.iter().any(|key| entries.contains_key(*key))
            }
            _ => false,
        }
    }

    /// Object, literal, map or array.
    pub fn has_value(&self) -> bool {
        self.is_object() || self.is_literal() || self.is_map() || self.is_array()
    }

    pub fn literal_value(&self) -> Option<&PlainValue> {
        match &self.kind {
            ValueKind::Literal { value, .. } => Some(value),
            _ => None,
        }
    }

    pub fn map_entries(&self) -> Option<&MapEntries> {
        match &self.kind {
            ValueKind::Map { entries, .. } => Some(entries),
            _ => None,
        }
    }

    pub fn origin(&self) -> &NodeRef {
        &self.origin
    }

    pub fn stack(&self) -> &Provenance {
        &self.stack
    }

    pub fn type_name(&self) -> &'static str {
        match self.kind {
            ValueKind::Literal { .. } => "literal",
            ValueKind::Object { .. } => "object",
            ValueKind::Map { .. } => "map",
            ValueKind::Array(_) => "array",
            ValueKind::Conditional { .. } => "conditional",
            ValueKind::Unresolvable => "unresolvable",
            ValueKind::EmptyInitializer => "empty-initializer",
        }
    }

    /// Serializable debug view.
    pub fn debug_view(&self) -> DebugView {
        DebugView {
            kind: self.type_name(),
            value: self.debug_value(),
            source_kind: self.origin.kind,
            line: self.origin.line,
            column: self.origin.column,
        }
    }

    fn debug_value(&self) -> serde_json::Value {
        use serde_json::Value;
        match &self.kind {
            ValueKind::Literal { value, .. } => value.to_json(),
            ValueKind::Object { value, .. } => {
                PlainValue::Object(value.clone()).to_json()
            }
            ValueKind::Map { entries, .. } => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.to_string(), serde_json::to_value(v.debug_view()).unwrap_or(Value::Null)))
                    .collect(),
            ),
            ValueKind::Array(elements) => Value::Array(
                elements
                    .iter()
                    .map(|v| serde_json::to_value(v.debug_view()).unwrap_or(Value::Null))
                    .collect(),
            ),
            ValueKind::Conditional {
                when_true,
                when_false,
            } => serde_json::json!({
                "whenTrue": when_true.debug_view(),
                "whenFalse": when_false.debug_view(),
            }),
            ValueKind::Unresolvable => Value::Null,
            ValueKind::EmptyInitializer => Value::Bool(true),
        }
    }
}

/// `{ type, value, sourceKind, line, column }`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugView {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub value: serde_json::Value,
    pub source_kind: &'static str,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for ValueNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(&self.debug_view()).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}
