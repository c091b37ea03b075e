//! Reduce a value-node tree to plain data.
//!
//! The reduction produces the best-effort value (`raw`) plus one overlay per
//! undecided branch. An overlay is a sparse object rooted at the path where
//! the branch occurred, so a consumer can merge it over `raw`.

use super::evaluator::Engine;
use super::value_node::{BoxNode, ValueKind, ValueNode};
use crate::types::PlainValue;
use compact_str::{CompactString, ToCompactString};
use indexmap::IndexMap;
use serde::Serialize;
use smallvec::SmallVec;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Unboxed {
    pub raw: PlainValue,
    /// Alternatives from undecided conditionals
    pub conditions: Vec<PlainValue>,
    /// Alternatives from undecided spreads
    pub spread_conditions: Vec<PlainValue>,
}

impl Unboxed {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Key(CompactString),
    Index(usize),
}

impl Segment {
    fn key(&self) -> CompactString {
        match self {
            Segment::Key(k) => k.clone(),
            Segment::Index(i) => i.to_compact_string(),
        }
    }
}

type Path = SmallVec<[Segment; 8]>;

#[derive(Default)]
struct Reducer {
    conditions: Vec<PlainValue>,
    spread_conditions: Vec<PlainValue>,
}

impl Reducer {
    fn reduce(&mut self, node: &ValueNode, path: &mut Path) -> PlainValue {
        match &node.kind {
            ValueKind::Literal { value, .. } => value.clone(),
            ValueKind::Object { value, .. } => PlainValue::Object(value.clone()),
            ValueKind::EmptyInitializer => PlainValue::Bool(true),
            ValueKind::Unresolvable => PlainValue::Undefined,
            ValueKind::Map {
                entries,
                spread_conditions,
            } => {
                for spread in spread_conditions {
                    let ValueKind::Conditional {
                        when_true,
                        when_false,
                    } = &spread.kind
                    else {
                        continue;
                    };
                    for branch in [when_true, when_false] {
                        let value = self.reduce(branch, path);
                        if value.is_truthy_or_zero() {
                            self.spread_conditions.push(make_obj_at(path, value));
                        }
                    }
                }

                let mut out = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    path.push(Segment::Key(key.clone()));
                    let reduced = self.reduce(value, path);
                    path.pop();
                    if !reduced.is_nullish() {
                        out.insert(key.clone(), reduced);
                    }
                }
                PlainValue::Object(out)
            }
            ValueKind::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    path.push(Segment::Index(index));
                    let reduced = self.reduce(item, path);
                    path.pop();
                    match reduced {
                        PlainValue::Array(inner) => {
                            out.extend(inner.into_iter().filter(|v| !v.is_nullish()))
                        }
                        value if value.is_nullish() => {}
                        value => out.push(value),
                    }
                }
                PlainValue::Array(out)
            }
            ValueKind::Conditional {
                when_true,
                when_false,
            } => {
                let element_index = match (node.stack.last(), path.last()) {
                    (Some(parent), Some(Segment::Index(i))) if parent.kind == "array" => Some(*i),
                    _ => None,
                };

                for branch in [when_true, when_false] {
                    let value = self.reduce(branch, path);
                    if !value.is_truthy_or_zero() {
                        continue;
                    }
                    let overlay = match element_index {
                        Some(index) => {
                            let mut sparse = vec![PlainValue::Undefined; index];
                            sparse.push(value);
                            make_obj_at(&path[..path.len() - 1], PlainValue::Array(sparse))
                        }
                        None => make_obj_at(path, value),
                    };
                    self.conditions.push(overlay);
                }
                PlainValue::Undefined
            }
        }
    }

    fn finish(self, raw: PlainValue) -> Unboxed {
        Unboxed {
            raw: if raw.is_nullish() {
                PlainValue::Object(IndexMap::new())
            } else {
                raw
            },
            conditions: self.conditions,
            spread_conditions: self.spread_conditions,
        }
    }
}

/// Nest `value` under `path`: `make_obj_at([a, b], v)` is `{ a: { b: v } }`.
fn make_obj_at(path: &[Segment], value: PlainValue) -> PlainValue {
    path.iter().rev().fold(value, |inner, segment| {
        let mut map = IndexMap::with_capacity(1);
        map.insert(segment.key(), inner);
        PlainValue::Object(map)
    })
}

impl Engine {
    /// Reduce one value node. Results with a value are cached per node.
    pub fn unbox(&self, node: &BoxNode) -> Unboxed {
        let key = Arc::as_ptr(node) as usize;
        if let Some(hit) = self.unboxed.get(&key) {
            return hit.value().1.clone();
        }

        let mut reducer = Reducer::default();
        let raw = reducer.reduce(node, &mut Path::new());
        let cacheable = !raw.is_nullish();
        let result = reducer.finish(raw);

        if cacheable {
            self.unboxed
                .entry(key)
                .or_insert_with(|| (Arc::clone(node), result.clone()));
        }
        result
    }

    /// Reduce several nodes sharing one set of alternatives. `raw` is the
    /// first node's value that is not nullish.
    pub fn unbox_list(&self, nodes: &[BoxNode]) -> Unboxed {
        let mut reducer = Reducer::default();
        let mut raw = PlainValue::Undefined;
        for node in nodes {
            let value = reducer.reduce(node, &mut Path::new());
            if raw.is_nullish() {
                raw = value;
            }
        }
        reducer.finish(raw)
    }
}
