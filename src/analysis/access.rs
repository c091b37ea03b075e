//! Property access and definition values.
//!
//! `a.b[c].d` is resolved by collecting the access path back to its root,
//! finding the root's declaration, and descending into the declared value
//! key by key. A ternary key (`a[cond ? "x" : "y"]`) forks the path and the
//! two results are folded into a conditional.

use super::declaration::{Declaration, DeclarationKind, Lookup};
use super::evaluator::{fold_branches, Evaluation};
use super::files::SourceFile;
use super::syntax::{named_children, parse_number, static_property_key, unwrap_expression};
use super::value_node::{BoxNode, MapEntries, ValueKind, ValueNode};
use crate::types::{NodeRef, PlainValue, Provenance};
use compact_str::CompactString;
use indexmap::IndexMap;
use smallvec::SmallVec;
use std::sync::Arc;
use tracing::trace;
use tree_sitter::Node;

/// Access path from a root value, outermost key last.
pub(crate) type AccessPath = SmallVec<[CompactString; 4]>;

enum AccessKey {
    Known(CompactString),
    Fork(Option<CompactString>, Option<CompactString>),
    Unknown,
}

impl<'e> Evaluation<'e> {
    pub(crate) fn access_value(
        &mut self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
    ) -> BoxNode {
        let origin = file.node_ref(&node);
        let unresolvable = || ValueNode::unresolvable(origin, stack.clone());

        let mut keys = Vec::new();
        let mut current = node;
        loop {
            match current.kind() {
                "member_expression" => {
                    let (Some(object), Some(property)) = (
                        current.child_by_field_name("object"),
                        current.child_by_field_name("property"),
                    ) else {
                        return unresolvable();
                    };
                    keys.push(AccessKey::Known(file.text_of(&property).into()));
                    current = unwrap_expression(object);
                }
                "subscript_expression" => {
                    let (Some(object), Some(index)) = (
                        current.child_by_field_name("object"),
                        current.child_by_field_name("index"),
                    ) else {
                        return unresolvable();
                    };
                    keys.push(self.access_key(file, unwrap_expression(index), stack));
                    current = unwrap_expression(object);
                }
                _ => break,
            }
        }
        keys.reverse();

        if keys.iter().any(|k| matches!(k, AccessKey::Unknown)) {
            return unresolvable();
        }

        let root = current;
        let root_stack = stack.push(file.node_ref(&root));

        if matches!(root.kind(), "identifier" | "this") {
            if root.kind() == "this" || file.text_of(&root) == "undefined" {
                return unresolvable();
            }
            match self.find_declaration(file, root, &root_stack) {
                Lookup::Found(decl) => {
                    let resolved = self.resolve_forks(&keys, &mut AccessPath::new(), &mut |this, path| {
                        this.definition_value(&decl, path)
                    });
                    return resolved.unwrap_or_else(unresolvable);
                }
                Lookup::Unresolvable => return unresolvable(),
                // Globals such as `Math.PI` can still be known to the sandbox
                Lookup::NotFound => {
                    return self
                        .safe_evaluate(file, node, stack)
                        .and_then(|value| ValueNode::from_plain(value, origin, stack.clone()))
                        .unwrap_or_else(unresolvable);
                }
            }
        }

        let Some(base) = self.maybe_box(file, root, &root_stack) else {
            return unresolvable();
        };
        self.resolve_forks(&keys, &mut AccessPath::new(), &mut |_, path| index_path(&base, path))
            .unwrap_or_else(unresolvable)
    }

    /// Expand forked keys into concrete paths and fold the results.
    fn resolve_forks(
        &mut self,
        keys: &[AccessKey],
        prefix: &mut AccessPath,
        resolve: &mut dyn FnMut(&mut Self, &[CompactString]) -> Option<BoxNode>,
    ) -> Option<BoxNode> {
        let Some((first, rest)) = keys.split_first() else {
            return resolve(self, prefix.as_slice());
        };

        match first {
            AccessKey::Known(key) => {
                prefix.push(key.clone());
                let out = self.resolve_forks(rest, prefix, &mut *resolve);
                prefix.pop();
                out
            }
            AccessKey::Fork(when_true, when_false) => {
                let mut branch = |this: &mut Self, key: &Option<CompactString>, prefix: &mut AccessPath| {
                    let key = key.as_ref()?;
                    prefix.push(key.clone());
                    let out = this.resolve_forks(rest, prefix, &mut *resolve);
                    prefix.pop();
                    out
                };
                let t = branch(self, when_true, prefix);
                let f = branch(self, when_false, prefix);
                let (origin, stack) = match (&t, &f) {
                    (Some(node), _) | (None, Some(node)) => (node.origin, node.stack.clone()),
                    (None, None) => return None,
                };
                fold_branches(t, f, origin, &stack)
            }
            AccessKey::Unknown => None,
        }
    }

    fn access_key(&mut self, file: &Arc<SourceFile>, index: Node<'_>, stack: &Provenance) -> AccessKey {
        if let Some(name) = self.maybe_prop_name(file, index, stack) {
            return AccessKey::Known(name.into());
        }
        if index.kind() != "ternary_expression" || self.ctx.flags.skip_conditional_resolution {
            return AccessKey::Unknown;
        }

        let branch = |this: &mut Self, field: &str| {
            let node = index.child_by_field_name(field)?;
            this.maybe_prop_name(file, node, stack).map(CompactString::from)
        };
        let when_true = branch(self, "consequence");
        let when_false = branch(self, "alternative");
        if when_true.is_none() && when_false.is_none() {
            return AccessKey::Unknown;
        }
        AccessKey::Fork(when_true, when_false)
    }

    // =========================================================================
    // Definition values
    // =========================================================================

    pub(crate) fn identifier_value(
        &mut self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
    ) -> BoxNode {
        let origin = file.node_ref(&node);
        match self.find_declaration(file, node, stack) {
            Lookup::Found(decl) => self
                .definition_value(&decl, &[])
                .unwrap_or_else(|| ValueNode::unresolvable(origin, decl.stack.clone())),
            Lookup::Unresolvable | Lookup::NotFound => ValueNode::unresolvable(origin, stack.clone()),
        }
    }

    /// Value of `decl` at `path`.
    pub(crate) fn definition_value(
        &mut self,
        decl: &Declaration,
        path: &[CompactString],
    ) -> Option<BoxNode> {
        let file = Arc::clone(&decl.file);
        let node = file.locate(&decl.node)?;
        let stack = &decl.stack;

        match decl.kind {
            DeclarationKind::Variable => {
                if let Some(init) = node.child_by_field_name("value") {
                    let value = self.maybe_box(&file, init, stack)?;
                    return index_path(&value, path);
                }
                let ty = annotated_object_type(&node)?;
                let value = self.type_literal_value(&file, ty)?;
                let value = value_at(&value, path)?;
                ValueNode::from_plain(value.clone(), file.node_ref(&ty), stack.clone())
            }
            DeclarationKind::Parameter => {
                let default = node
                    .child_by_field_name("value")
                    .or_else(|| node.child_by_field_name("right"));
                if let Some(default) = default {
                    let value = self.maybe_box(&file, default, stack)?;
                    return index_path(&value, path);
                }
                let ty = annotated_object_type(&node)?;
                let value = self.type_literal_value(&file, ty)?;
                let value = value_at(&value, path)?;
                ValueNode::from_plain(value.clone(), file.node_ref(&ty), stack.clone())
            }
            DeclarationKind::Binding => self.binding_value(&file, node, path, stack),
            DeclarationKind::Enum => {
                let value = self.enum_value(&file, node, stack)?;
                index_path(&value, path)
            }
            DeclarationKind::DefaultExport => {
                let value = self.maybe_box(&file, node, stack)?;
                index_path(&value, path)
            }
            DeclarationKind::Namespace => {
                let (export, rest) = path.split_first()?;
                let mut visited = Default::default();
                let inner = self.find_export(&file, export, stack, 0, &mut visited)?;
                self.definition_value(&inner, rest)
            }
            DeclarationKind::Function => None,
        }
    }

    /// Value bound by a destructuring pattern element.
    ///
    /// Climbs from the bound name to the pattern's source, collecting the
    /// keys along the way, then reads the source value at that path. The
    /// element's own default applies when the source has nothing there.
    fn binding_value(
        &mut self,
        file: &Arc<SourceFile>,
        name: Node<'_>,
        path: &[CompactString],
        stack: &Provenance,
    ) -> Option<BoxNode> {
        let own_default = name.parent().and_then(|parent| match parent.kind() {
            "object_assignment_pattern" | "assignment_pattern" => parent.child_by_field_name("right"),
            _ => None,
        });

        let mut keys: Vec<CompactString> = Vec::new();
        let mut child = name;
        let source = loop {
            let parent = child.parent()?;
            match parent.kind() {
                "object_pattern" => {
                    let key = match child.kind() {
                        "shorthand_property_identifier_pattern" => file.text_of(&child).into(),
                        "object_assignment_pattern" => {
                            let left = child.child_by_field_name("left")?;
                            file.text_of(&left).into()
                        }
                        "pair_pattern" => {
                            let key = child.child_by_field_name("key")?;
                            if key.kind() == "computed_property_name" {
                                let expr = named_children(&key).into_iter().next()?;
                                self.maybe_prop_name(file, expr, stack)?.into()
                            } else {
                                static_property_key(&key, &file.text)?.into()
                            }
                        }
                        _ => return None,
                    };
                    keys.push(key);
                }
                "array_pattern" => {
                    let index = named_children(&parent).iter().position(|n| n.id() == child.id())?;
                    keys.push(CompactString::from(index.to_string()));
                }
                "pair_pattern" | "object_assignment_pattern" | "assignment_pattern" => {}
                "variable_declarator" => break SourceKind::Expression(parent.child_by_field_name("value")),
                "required_parameter" | "optional_parameter" => {
                    break match parent.child_by_field_name("value") {
                        Some(default) => SourceKind::Expression(Some(default)),
                        None => SourceKind::Type(annotated_object_type(&parent)),
                    };
                }
                _ => return None,
            }
            child = parent;
        };
        keys.reverse();
        keys.extend(path.iter().cloned());

        let from_source = match source {
            SourceKind::Expression(Some(init)) => {
                let value = self.maybe_box(file, init, stack);
                value.and_then(|v| index_path(&v, &keys))
            }
            SourceKind::Type(Some(ty)) => self
                .type_literal_value(file, ty)
                .and_then(|v| value_at(&v, &keys).cloned())
                .and_then(|v| ValueNode::from_plain(v, file.node_ref(&ty), stack.clone())),
            _ => None,
        };

        let missing = from_source
            .as_ref()
            .map_or(true, |v| matches!(v.literal_value(), Some(PlainValue::Undefined)));
        if !missing {
            return from_source;
        }

        let default = own_default.and_then(|d| self.maybe_box(file, d, stack));
        match default {
            Some(default) if path.is_empty() => Some(default),
            Some(default) => index_path(&default, path),
            None => from_source,
        }
    }

    /// An enum as a map of member values. Members without an initializer
    /// continue numbering from the previous numeric member.
    fn enum_value(
        &mut self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
    ) -> Option<BoxNode> {
        let body = node.child_by_field_name("body")?;
        let mut entries = MapEntries::new();
        let mut next = 0.0;

        for member in named_children(&body) {
            let (name_node, init) = match member.kind() {
                "enum_assignment" => (member.child_by_field_name("name")?, member.child_by_field_name("value")),
                _ => (member, None),
            };
            let Some(name) = static_property_key(&name_node, &file.text) else {
                continue;
            };
            let member_stack = stack.push(file.node_ref(&member));

            let value = match init {
                Some(init) => self.maybe_box(file, init, &member_stack),
                None => Some(ValueNode::literal(
                    PlainValue::Number(next),
                    file.node_ref(&member),
                    member_stack,
                )),
            };
            if let Some(n) = value.as_ref().and_then(|v| v.literal_value()).and_then(PlainValue::as_number) {
                next = n + 1.0;
            }
            if let Some(value) = value {
                entries.insert(name.into(), value);
            }
        }

        Some(ValueNode::map(entries, file.node_ref(&node), stack.clone()))
    }

    /// Literal value described by an object type, e.g.
    /// `{ readonly size: "sm"; readonly tones: readonly ["a", "b"] }`.
    ///
    /// Only `readonly` members are read; anything not expressible as a
    /// literal type is skipped.
    fn type_literal_value(&mut self, file: &Arc<SourceFile>, ty: Node<'_>) -> Option<PlainValue> {
        let key = file.key_of(&ty);
        if let Some(hit) = self.engine.type_values.get(&key) {
            return hit.value().clone();
        }
        let value = type_value(file, ty);
        let stored = self.engine.type_values.entry(key).or_insert(value);
        stored.value().clone()
    }
}

enum SourceKind<'t> {
    Expression(Option<Node<'t>>),
    Type(Option<Node<'t>>),
}

/// `object_type` from a declaration's type annotation.
fn annotated_object_type<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    let annotation = node.child_by_field_name("type")?;
    named_children(&annotation)
        .into_iter()
        .find(|ty| ty.kind() == "object_type")
}

fn type_value(file: &SourceFile, ty: Node<'_>) -> Option<PlainValue> {
    match ty.kind() {
        "object_type" => {
            let mut map = IndexMap::new();
            for member in named_children(&ty) {
                if member.kind() != "property_signature" || !is_readonly(&member) {
                    continue;
                }
                let (Some(name), Some(annotation)) = (
                    member.child_by_field_name("name"),
                    member.child_by_field_name("type"),
                ) else {
                    continue;
                };
                let Some(key) = static_property_key(&name, &file.text) else {
                    continue;
                };
                let Some(inner) = named_children(&annotation).into_iter().next() else {
                    continue;
                };
                if let Some(value) = type_value(file, inner) {
                    map.insert(CompactString::from(key), value);
                }
            }
            Some(PlainValue::Object(map))
        }
        "literal_type" => {
            let inner = named_children(&ty).into_iter().next()?;
            match inner.kind() {
                "string" => Some(PlainValue::string(super::syntax::decode_string_literal(
                    file.text_of(&inner),
                ))),
                "number" => parse_number(file.text_of(&inner)).map(PlainValue::Number),
                "true" => Some(PlainValue::Bool(true)),
                "false" => Some(PlainValue::Bool(false)),
                "null" => Some(PlainValue::Null),
                "undefined" => Some(PlainValue::Undefined),
                "unary_expression" => {
                    let text = file.text_of(&inner).replace(char::is_whitespace, "");
                    parse_number(text.trim_start_matches('-'))
                        .map(|n| PlainValue::Number(if text.starts_with('-') { -n } else { n }))
                }
                _ => None,
            }
        }
        "readonly_type" => {
            let inner = named_children(&ty).into_iter().next()?;
            type_value(file, inner)
        }
        "tuple_type" => named_children(&ty)
            .into_iter()
            .map(|element| type_value(file, element))
            .collect::<Option<Vec<_>>>()
            .map(PlainValue::Array),
        "parenthesized_type" => {
            let inner = named_children(&ty).into_iter().next()?;
            type_value(file, inner)
        }
        _ => None,
    }
}

fn is_readonly(member: &Node<'_>) -> bool {
    let mut cursor = member.walk();
    let readonly = member
        .children(&mut cursor)
        .any(|child| child.kind() == "readonly");
    readonly
}

fn value_at<'v>(value: &'v PlainValue, path: &[CompactString]) -> Option<&'v PlainValue> {
    path.iter().try_fold(value, |current, key| current.get(key))
}

/// Descend into a value along `path`.
pub(crate) fn index_path(value: &BoxNode, path: &[CompactString]) -> Option<BoxNode> {
    path.iter()
        .try_fold(Arc::clone(value), |current, key| index_value(&current, key))
}

/// One step of property access on a value node.
pub(crate) fn index_value(value: &BoxNode, key: &str) -> Option<BoxNode> {
    let origin: NodeRef = value.origin;
    let stack = &value.stack;
    let length = |n: usize| Some(ValueNode::literal(PlainValue::Number(n as f64), origin, stack.clone()));

    match &value.kind {
        ValueKind::Map { entries, .. } => entries.get(key).cloned(),
        ValueKind::Object { value: map, .. } => map
            .get(key)
            .cloned()
            .and_then(|v| ValueNode::from_plain(v, origin, stack.clone())),
        ValueKind::Array(items) => {
            if key == "length" {
                return length(items.len());
            }
            key.parse::<usize>().ok().and_then(|i| items.get(i).cloned())
        }
        ValueKind::Literal { value: plain, .. } => match plain {
            PlainValue::String(s) => {
                if key == "length" {
                    return length(s.chars().count());
                }
                let index = key.parse::<usize>().ok()?;
                let ch = s.chars().nth(index)?;
                Some(ValueNode::literal(PlainValue::string(ch.to_string()), origin, stack.clone()))
            }
            PlainValue::Array(items) => {
                if key == "length" {
                    return length(items.len());
                }
                let item = key.parse::<usize>().ok().and_then(|i| items.get(i))?;
                ValueNode::from_plain(item.clone(), origin, stack.clone())
            }
            _ => None,
        },
        ValueKind::Conditional {
            when_true,
            when_false,
        } => fold_branches(
            index_value(when_true, key),
            index_value(when_false, key),
            origin,
            stack,
        ),
        ValueKind::Unresolvable | ValueKind::EmptyInitializer => {
            trace!(key, "Property access on an opaque value");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::evaluator::{to_plain, EvalContext, Engine};
    use crate::analysis::files::FileTable;
    use serde_json::json;

    fn eval_last(source: &str) -> Option<BoxNode> {
        let files = Arc::new(FileTable::default());
        let file = files.add_source("/mem/a.tsx", source).unwrap();
        let engine = Engine::new(files);
        let root = file.root();
        let last = named_children(&root)
            .into_iter()
            .filter(|n| n.kind() == "lexical_declaration")
            .last()
            .unwrap();
        let declarator = named_children(&last).into_iter().next().unwrap();
        let value = declarator.child_by_field_name("value").unwrap();
        engine.evaluate(&file, value, &Provenance::new(), &EvalContext::default())
    }

    fn plain(source: &str) -> serde_json::Value {
        eval_last(source)
            .and_then(|v| to_plain(&v))
            .map(|v| v.to_json())
            .unwrap_or(serde_json::Value::Null)
    }

    #[test]
    fn test_member_chain() {
        assert_eq!(
            plain("const theme = { colors: { primary: { base: 'blue' } } }\nconst a = theme.colors.primary.base"),
            json!("blue")
        );
        assert_eq!(plain("const t = { 'x-y': 1 }\nconst a = t['x-y']"), json!(1));
    }

    #[test]
    fn test_computed_key_from_identifier() {
        assert_eq!(
            plain("const k = 'lg'\nconst sizes = { sm: 1, lg: 2 }\nconst a = sizes[k]"),
            json!(2)
        );
    }

    #[test]
    fn test_ternary_key_forks() {
        let value = eval_last("const sizes = { sm: 1, lg: 2 }\nconst a = sizes[cond ? 'sm' : 'lg']").unwrap();
        let ValueKind::Conditional { when_true, when_false } = &value.kind else {
            panic!("expected conditional, got {}", value.type_name());
        };
        assert_eq!(when_true.literal_value(), Some(&PlainValue::Number(1.0)));
        assert_eq!(when_false.literal_value(), Some(&PlainValue::Number(2.0)));
    }

    #[test]
    fn test_array_and_string_indexing() {
        assert_eq!(plain("const xs = ['a', 'b']\nconst a = xs[1]"), json!("b"));
        assert_eq!(plain("const xs = ['a', 'b']\nconst a = xs.length"), json!(2));
        assert_eq!(plain("const s = 'abc'\nconst a = s.length"), json!(3));
        assert_eq!(plain("const s = 'abc'\nconst a = s[2]"), json!("c"));
    }

    #[test]
    fn test_string_length_and_index_count_characters() {
        assert_eq!(plain("const s = 'a\u{1F600}b'\nconst a = s.length"), json!(3));
        assert_eq!(plain("const s = 'a\u{1F600}b'\nconst a = s[1]"), json!("\u{1F600}"));
        assert_eq!(plain("const s = 'a\u{1F600}b'\nconst a = s[2]"), json!("b"));
    }

    #[test]
    fn test_missing_property_is_unresolvable() {
        let value = eval_last("const t = { a: 1 }\nconst a = t.b").unwrap();
        assert!(value.is_unresolvable());
    }

    #[test]
    fn test_global_member_falls_back_to_sandbox() {
        assert_eq!(plain("const a = Math.PI > 3"), json!(true));
        let value = eval_last("const a = Math.PI").unwrap();
        assert!(value.is_literal());
    }

    #[test]
    fn test_enum_members() {
        assert_eq!(
            plain("enum Size { Sm, Md = 5, Lg, Xl = 'xl' }\nconst a = [Size.Sm, Size.Lg, Size.Xl]"),
            json!([0, 6, "xl"])
        );
    }

    #[test]
    fn test_destructured_binding_with_default() {
        assert_eq!(
            plain("const { color = 'red', size = 'sm' } = { size: 'lg' }\nconst a = [color, size]"),
            json!(["red", "lg"])
        );
        assert_eq!(
            plain("const { tone: { base } } = { tone: { base: 'blue' } }\nconst a = base"),
            json!("blue")
        );
        assert_eq!(plain("const [first, second] = ['x', 'y']\nconst a = second"), json!("y"));
    }

    #[test]
    fn test_readonly_type_literal() {
        assert_eq!(
            plain("declare const t: { readonly size: 'sm'; readonly n: 2; mutable: 'x' }\nconst a = t.size"),
            json!("sm")
        );
        let value = eval_last("declare const t: { readonly size: 'sm'; mutable: 'x' }\nconst a = t.mutable").unwrap();
        assert!(value.is_unresolvable());
    }

    #[test]
    fn test_parameter_default_and_type() {
        let source = "function f(p = { size: 'sm' }) { const a = p.size; return a }";
        let files = Arc::new(FileTable::default());
        let file = files.add_source("/mem/a.tsx", source).unwrap();
        let engine = Engine::new(files);

        let mut pending = vec![file.root()];
        let mut member = None;
        while let Some(node) = pending.pop() {
            if node.kind() == "member_expression" {
                member = Some(node);
                break;
            }
            pending.extend(named_children(&node));
        }
        let value = engine
            .evaluate(&file, member.unwrap(), &Provenance::new(), &EvalContext::default())
            .unwrap();
        assert_eq!(value.literal_value(), Some(&PlainValue::string("sm")));
    }

    #[test]
    fn test_index_conditional_folds() {
        let value = eval_last(
            "const a1 = { x: 1 }\nconst b1 = { x: 2 }\nconst c = cond ? a1 : b1\nconst a = c.x",
        )
        .unwrap();
        assert!(value.is_conditional());
    }
}
