//! Symbolic evaluation of expressions into [`ValueNode`]s.
//!
//! ## Architecture
//!
//! ```text
//! Engine (shared, long-lived)
//!   ├── FileTable          path → parsed file, loaded on demand
//!   ├── Sandbox            full evaluation of pure expressions
//!   └── identity caches    NodeKey → result, write-once
//!
//! Evaluation (one request)
//!   ├── maybe_box          dispatch on node kind
//!   ├── find_declaration   identifier → declaration (declaration.rs)
//!   └── definition_value   declaration + access path → value (access.rs)
//! ```
//!
//! Results are memoized per syntax node. A node that is re-entered while it
//! is still being evaluated resolves to `Unresolvable` instead of recursing.

use super::files::{FileTable, SourceFile};
use super::sandbox::{ConstInterpreter, EvalOutcome, EvaluationOptions, Sandbox};
use super::syntax::{
    collapse_whitespace, decode_string_literal, named_children, operator,
    parse_number, static_property_key, template_parts, unwrap_expression, TemplatePart,
    BINDING_PATTERN_KINDS,
};
use super::unbox::Unboxed;
use super::value_node::{BoxNode, MapEntries, ValueKind, ValueNode};
use crate::types::{format_number, NodeKey, NodeRef, PlainValue, Provenance};
use compact_str::CompactString;
use dashmap::DashMap;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;
use tree_sitter::Node;

/// Switches that trade completeness for bounded work.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvalFlags {
    /// Never call the sandbox
    pub skip_full_evaluation: bool,
    /// Never follow imports into other files
    pub skip_cross_file_traversal: bool,
    /// Treat every ternary and logical expression as unresolvable
    pub skip_conditional_resolution: bool,
}

/// Gate deciding whether a node may be handed to the sandbox.
pub type CanEvaluate = Arc<dyn Fn(&NodeRef, &Provenance) -> bool + Send + Sync>;

/// Per-node sandbox policy override, given the context's base options.
pub type EvaluationOverrides =
    Arc<dyn Fn(&NodeRef, &Provenance, &EvaluationOptions) -> EvaluationOptions + Send + Sync>;

/// Caller-supplied configuration for one evaluation request.
#[derive(Clone, Default)]
pub struct EvalContext {
    pub flags: EvalFlags,
    /// Base sandbox policy
    pub sandbox: EvaluationOptions,
    pub can_evaluate: Option<CanEvaluate>,
    pub evaluation_options: Option<EvaluationOverrides>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flags(mut self, flags: EvalFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_sandbox_options(mut self, options: EvaluationOptions) -> Self {
        self.sandbox = options;
        self
    }

    pub fn with_can_evaluate(
        mut self,
        f: impl Fn(&NodeRef, &Provenance) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.can_evaluate = Some(Arc::new(f));
        self
    }

    pub fn with_evaluation_options(
        mut self,
        f: impl Fn(&NodeRef, &Provenance, &EvaluationOptions) -> EvaluationOptions
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.evaluation_options = Some(Arc::new(f));
        self
    }
}

impl fmt::Debug for EvalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvalContext")
            .field("flags", &self.flags)
            .field("sandbox", &self.sandbox)
            .field("can_evaluate", &self.can_evaluate.is_some())
            .field("evaluation_options", &self.evaluation_options.is_some())
            .finish()
    }
}

/// Work counters, mostly useful in tests.
#[derive(Debug, Default)]
pub struct EngineStats {
    scope_walks: AtomicUsize,
    sandbox_runs: AtomicUsize,
}

impl EngineStats {
    /// Number of lexical scopes searched for a declaration.
    pub fn scope_walks(&self) -> usize {
        self.scope_walks.load(Ordering::Relaxed)
    }

    /// Number of sandbox evaluations actually run (cache misses).
    pub fn sandbox_runs(&self) -> usize {
        self.sandbox_runs.load(Ordering::Relaxed)
    }

    pub(crate) fn record_scope_walk(&self) {
        self.scope_walks.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.scope_walks.store(0, Ordering::Relaxed);
        self.sandbox_runs.store(0, Ordering::Relaxed);
    }
}

/// Value-resolution engine.
///
/// Owns the identity caches. They are write-once per key and never
/// invalidated, so an engine is valid for one snapshot of the files in its
/// table; call [`Engine::clear_caches`] after editing sources.
pub struct Engine {
    files: Arc<FileTable>,
    sandbox: Box<dyn Sandbox>,
    pub(crate) values: DashMap<NodeKey, Option<BoxNode>>,
    pub(crate) evaluations: DashMap<NodeKey, EvalOutcome>,
    pub(crate) type_values: DashMap<NodeKey, Option<PlainValue>>,
    /// Keyed by `Arc` address; the stored node keeps that address alive.
    pub(crate) unboxed: DashMap<usize, (BoxNode, Unboxed)>,
    stats: EngineStats,
}

impl Engine {
    pub fn new(files: Arc<FileTable>) -> Self {
        Self::with_sandbox(files, ConstInterpreter)
    }

    pub fn with_sandbox(files: Arc<FileTable>, sandbox: impl Sandbox + 'static) -> Self {
        Self {
            files,
            sandbox: Box::new(sandbox),
            values: DashMap::new(),
            evaluations: DashMap::new(),
            type_values: DashMap::new(),
            unboxed: DashMap::new(),
            stats: EngineStats::default(),
        }
    }

    pub fn files(&self) -> &Arc<FileTable> {
        &self.files
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    pub fn clear_caches(&self) {
        self.values.clear();
        self.evaluations.clear();
        self.type_values.clear();
        self.unboxed.clear();
        self.stats.reset();
    }

    /// Resolve `node` (an expression in `file`) to a value node.
    ///
    /// `None` means the expression is not a shape the engine understands;
    /// callers treat it like `Unresolvable`.
    pub fn evaluate(
        &self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
        ctx: &EvalContext,
    ) -> Option<BoxNode> {
        Evaluation::new(self, ctx).maybe_box(file, node, stack)
    }

    /// [`Engine::evaluate`] for an owned node handle.
    pub fn evaluate_ref(
        &self,
        node: &NodeRef,
        stack: &Provenance,
        ctx: &EvalContext,
    ) -> Option<BoxNode> {
        let file = self.files.get(node.file())?;
        let live = file.locate(node)?;
        self.evaluate(&file, live, stack, ctx)
    }

    /// Find the declaration an identifier refers to.
    pub fn find_declaration(
        &self,
        file: &Arc<SourceFile>,
        identifier: Node<'_>,
        ctx: &EvalContext,
    ) -> super::declaration::Lookup {
        Evaluation::new(self, ctx).find_declaration(file, identifier, &Provenance::new())
    }
}

/// State for one evaluation request.
pub(crate) struct Evaluation<'e> {
    pub(crate) engine: &'e Engine,
    pub(crate) ctx: &'e EvalContext,
    in_flight: FxHashSet<NodeKey>,
}

/// Predicate over object-literal keys.
pub(crate) type PropFilter<'f> = &'f dyn Fn(&str) -> bool;

impl<'e> Evaluation<'e> {
    pub(crate) fn new(engine: &'e Engine, ctx: &'e EvalContext) -> Self {
        Self {
            engine,
            ctx,
            in_flight: FxHashSet::default(),
        }
    }

    /// Memoized entry point.
    pub(crate) fn maybe_box(
        &mut self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
    ) -> Option<BoxNode> {
        let node = unwrap_expression(node);
        let key = file.key_of(&node);

        if let Some(hit) = self.engine.values.get(&key) {
            return hit.value().clone();
        }

        if !self.in_flight.insert(key) {
            debug!(
                kind = node.kind(),
                line = node.start_position().row + 1,
                "Cyclic reference, treating as unresolvable"
            );
            return Some(ValueNode::unresolvable(file.node_ref(&node), stack.clone()));
        }

        let result = self.dispatch(file, node, stack);
        self.in_flight.remove(&key);

        let stored = self.engine.values.entry(key).or_insert(result);
        stored.value().clone()
    }

    /// Evaluate with an object-key filter. Filtered object literals bypass
    /// the identity cache since the filter changes the result.
    pub(crate) fn maybe_box_filtered(
        &mut self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
        filter: Option<PropFilter<'_>>,
    ) -> Option<BoxNode> {
        let node = unwrap_expression(node);
        match filter {
            Some(filter) if node.kind() == "object" => {
                Some(self.object_literal(file, node, stack, Some(filter)))
            }
            _ => self.maybe_box(file, node, stack),
        }
    }

    fn dispatch(
        &mut self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
    ) -> Option<BoxNode> {
        let origin = file.node_ref(&node);
        let literal = |value: PlainValue| Some(ValueNode::literal(value, origin, stack.clone()));

        match node.kind() {
            "string" => {
                let text = decode_string_literal(file.text_of(&node));
                literal(PlainValue::string(collapse_whitespace(&text)))
            }
            "template_string" => Some(self.template_value(file, node, stack)),
            "object" => Some(self.object_literal(file, node, stack, None)),
            "true" => literal(PlainValue::Bool(true)),
            "false" => literal(PlainValue::Bool(false)),
            "number" => parse_number(file.text_of(&node)).and_then(|n| literal(PlainValue::Number(n))),
            "null" => literal(PlainValue::Null),
            "undefined" => literal(PlainValue::Undefined),
            "unary_expression" => self.unary_value(file, node, stack),
            "array" => Some(self.array_literal(file, node, stack)),
            "identifier" | "shorthand_property_identifier" => {
                if file.text_of(&node) == "undefined" {
                    return literal(PlainValue::Undefined);
                }
                Some(self.identifier_value(file, node, stack))
            }
            "member_expression" | "subscript_expression" => {
                Some(self.access_value(file, node, stack))
            }
            "ternary_expression" => self.ternary_value(file, node, stack),
            "call_expression" => match node.child_by_field_name("arguments") {
                Some(template) if template.kind() == "template_string" => {
                    self.maybe_box(file, template, stack)
                }
                _ => {
                    let value = self.safe_evaluate(file, node, stack)?;
                    ValueNode::from_plain(value, origin, stack.clone())
                }
            },
            "binary_expression" => self.binary_value(file, node, stack),
            "jsx_attribute" => self.jsx_attribute_value(file, node, stack),
            _ => None,
        }
    }

    // =========================================================================
    // Sandbox bridge
    // =========================================================================

    /// Run the sandbox on `node`, honoring the context policy. Outcomes are
    /// memoized per node, failures included.
    pub(crate) fn safe_evaluate(
        &mut self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
    ) -> Option<PlainValue> {
        if self.ctx.flags.skip_full_evaluation {
            return None;
        }

        let node_ref = file.node_ref(&node);
        if let Some(can_evaluate) = &self.ctx.can_evaluate {
            if !can_evaluate(&node_ref, stack) {
                return None;
            }
        }

        if let Some(hit) = self.engine.evaluations.get(&node_ref.key) {
            return hit.value().clone().value();
        }

        let options = match &self.ctx.evaluation_options {
            Some(overrides) => overrides(&node_ref, stack, &self.ctx.sandbox),
            None => self.ctx.sandbox.clone(),
        };

        let engine = self.engine;
        engine.stats.sandbox_runs.fetch_add(1, Ordering::Relaxed);
        let outcome = {
            let mut resolve_identifier =
                |identifier: Node<'_>| self.identifier_plain_value(file, identifier);
            engine
                .sandbox
                .try_fully_evaluate(file, node, &mut resolve_identifier, &options)
        };

        let stored = engine.evaluations.entry(node_ref.key).or_insert(outcome);
        stored.value().clone().value()
    }

    /// Identifier hook handed to the sandbox. Values that only exist as a
    /// destructuring default are withheld so conditions on them stay open.
    fn identifier_plain_value(
        &mut self,
        file: &Arc<SourceFile>,
        identifier: Node<'_>,
    ) -> Option<PlainValue> {
        let value = self.maybe_box(file, identifier, &Provenance::new())?;
        if from_binding(&value) {
            return None;
        }
        to_plain(&value)
    }

    // =========================================================================
    // Literals
    // =========================================================================

    fn template_value(
        &mut self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
    ) -> BoxNode {
        let origin = file.node_ref(&node);
        let parts = template_parts(&node, &file.text);

        if parts.iter().all(|p| matches!(p, TemplatePart::Text(_))) {
            let text: String = parts
                .into_iter()
                .map(|p| match p {
                    TemplatePart::Text(text) => text,
                    TemplatePart::Substitution(_) => String::new(),
                })
                .collect();
            return ValueNode::literal(
                PlainValue::string(collapse_whitespace(&text)),
                origin,
                stack.clone(),
            );
        }

        let mut out = String::new();
        for part in parts {
            match part {
                TemplatePart::Text(text) => out.push_str(&text),
                TemplatePart::Substitution(expr) => match self.maybe_prop_name(file, expr, stack) {
                    Some(name) => out.push_str(&name),
                    None => return ValueNode::unresolvable(origin, stack.clone()),
                },
            }
        }
        ValueNode::literal(PlainValue::string(out), origin, stack.clone())
    }

    /// Resolve to something usable as a property name: a string literal or a
    /// number literal (formatted the way JS would).
    pub(crate) fn maybe_prop_name(
        &mut self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
    ) -> Option<String> {
        let value = self.maybe_box(file, node, stack)?;
        match value.literal_value()? {
            PlainValue::String(s) => Some(s.to_string()),
            PlainValue::Number(n) => Some(format_number(*n)),
            _ => None,
        }
    }

    /// Property name of an object-literal member (`pair` key node).
    fn property_name(
        &mut self,
        file: &Arc<SourceFile>,
        key: Node<'_>,
        stack: &Provenance,
    ) -> Option<String> {
        if key.kind() == "computed_property_name" {
            let expr = named_children(&key).into_iter().next()?;
            return self.maybe_prop_name(file, expr, &stack.push(file.node_ref(&expr)));
        }
        static_property_key(&key, &file.text)
    }

    pub(crate) fn object_literal(
        &mut self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
        filter: Option<PropFilter<'_>>,
    ) -> BoxNode {
        let origin = file.node_ref(&node);
        let properties = named_children(&node);
        if properties.is_empty() {
            return ValueNode::empty_object(origin, stack.clone());
        }

        let mut entries = MapEntries::new();
        let mut spread_conditions = Vec::new();
        // A later binding of the same key moves it to the end.
        fn bind(entries: &mut MapEntries, key: CompactString, value: BoxNode) {
            entries.shift_remove(&key);
            entries.insert(key, value);
        }

        for property in properties {
            let prop_stack = stack.push(file.node_ref(&property));
            match property.kind() {
                "pair" => {
                    let (Some(key_node), Some(value_node)) = (
                        property.child_by_field_name("key"),
                        property.child_by_field_name("value"),
                    ) else {
                        continue;
                    };
                    let Some(key) = self.property_name(file, key_node, &prop_stack) else {
                        continue;
                    };
                    if filter.is_some_and(|f| !f(&key)) {
                        continue;
                    }
                    let value_node = unwrap_expression(value_node);
                    let value_stack = prop_stack.push(file.node_ref(&value_node));
                    if let Some(value) = self.maybe_box(file, value_node, &value_stack) {
                        bind(&mut entries, key.into(), value);
                    }
                }
                "shorthand_property_identifier" => {
                    let key = file.text_of(&property).to_string();
                    if filter.is_some_and(|f| !f(&key)) {
                        continue;
                    }
                    if let Some(value) = self.maybe_box(file, property, &prop_stack) {
                        bind(&mut entries, key.into(), value);
                    }
                }
                "spread_element" => {
                    let Some(source) = named_children(&property).into_iter().next() else {
                        continue;
                    };
                    let source = unwrap_expression(source);
                    let source_ref = file.node_ref(&source);
                    let source_stack = prop_stack.push(source_ref);
                    let Some(spread) = self.maybe_box_filtered(file, source, &source_stack, filter)
                    else {
                        continue;
                    };
                    match &spread.kind {
                        ValueKind::Object { value, .. } => {
                            for (key, value) in value {
                                if let Some(boxed) = ValueNode::from_plain(
                                    value.clone(),
                                    source_ref,
                                    source_stack.clone(),
                                ) {
                                    bind(&mut entries, key.clone(), boxed);
                                }
                            }
                        }
                        ValueKind::Map { entries: spread_entries, .. } => {
                            for (key, value) in spread_entries {
                                bind(&mut entries, key.clone(), Arc::clone(value));
                            }
                        }
                        ValueKind::Conditional { .. } => spread_conditions.push(Arc::clone(&spread)),
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        ValueNode::map_with_spreads(entries, spread_conditions, origin, stack.clone())
    }

    fn array_literal(
        &mut self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
    ) -> BoxNode {
        let origin = file.node_ref(&node);
        let element_stack = stack.push(origin);
        let mut elements = Vec::new();

        for element in named_children(&node) {
            let element_ref = file.node_ref(&element);
            if element.kind() == "spread_element" {
                let spread = named_children(&element)
                    .into_iter()
                    .next()
                    .and_then(|source| self.maybe_box(file, source, &element_stack));
                match spread.as_deref().map(|s| &s.kind) {
                    Some(ValueKind::Array(items)) => elements.extend(items.iter().cloned()),
                    _ => elements.push(ValueNode::unresolvable(element_ref, element_stack.clone())),
                }
                continue;
            }

            let value = self
                .maybe_box(file, element, &element_stack)
                .unwrap_or_else(|| ValueNode::unresolvable(element_ref, element_stack.clone()));
            elements.push(value);
        }

        ValueNode::array(elements, origin, stack.clone())
    }

    fn unary_value(
        &mut self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
    ) -> Option<BoxNode> {
        let origin = file.node_ref(&node);
        match operator(&node) {
            Some(op @ ("-" | "+")) => {
                let operand = self.maybe_box(file, node.child_by_field_name("argument")?, stack)?;
                let n = operand.literal_value()?.as_number().filter(|_| operand.is_number_literal())?;
                let n = if op == "-" { -n } else { n };
                Some(ValueNode::literal(PlainValue::Number(n), origin, stack.clone()))
            }
            _ => {
                let value = self.safe_evaluate(file, node, stack)?;
                Some(literal_or_object(value, origin, stack))
            }
        }
    }

    fn jsx_attribute_value(
        &mut self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
    ) -> Option<BoxNode> {
        let children = named_children(&node);
        let name = children.first()?;
        let stack = stack.push(file.node_ref(&node));

        let Some(initializer) = children.get(1) else {
            return Some(ValueNode::empty_initializer(file.node_ref(name), stack));
        };
        let stack = stack.push(file.node_ref(initializer));

        match initializer.kind() {
            "string" => {
                let text = decode_string_literal(file.text_of(initializer));
                Some(ValueNode::literal(
                    PlainValue::string(collapse_whitespace(&text)),
                    file.node_ref(initializer),
                    stack,
                ))
            }
            "jsx_expression" => {
                let expr = named_children(initializer).into_iter().next()?;
                let expr = unwrap_expression(expr);
                self.maybe_box(file, expr, &stack.push(file.node_ref(&expr)))
            }
            _ => self.maybe_box(file, *initializer, &stack),
        }
    }

    // =========================================================================
    // Operators
    // =========================================================================

    fn binary_value(
        &mut self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
    ) -> Option<BoxNode> {
        let origin = file.node_ref(&node);
        match operator(&node)? {
            "&&" | "||" | "??" => self.logical_value(file, node, stack),
            "+" => {
                if let Some(joined) = self.concat_strings(file, node, stack) {
                    return Some(ValueNode::literal(PlainValue::string(joined), origin, stack.clone()));
                }
                let value = self.safe_evaluate(file, node, stack)?;
                ValueNode::from_plain(value, origin, stack.clone())
            }
            _ => {
                let value = self.safe_evaluate(file, node, stack)?;
                Some(literal_or_object(value, origin, stack))
            }
        }
    }

    /// `a + b` where both sides are property-name shaped and at least one is
    /// a string.
    fn concat_strings(
        &mut self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
    ) -> Option<String> {
        let left = self.maybe_box(file, node.child_by_field_name("left")?, stack)?;
        let right = self.maybe_box(file, node.child_by_field_name("right")?, stack)?;

        let piece = |value: &PlainValue| match value {
            PlainValue::String(s) => Some(s.to_string()),
            PlainValue::Number(n) => Some(format_number(*n)),
            _ => None,
        };
        let (l, r) = (left.literal_value()?, right.literal_value()?);
        if !matches!(l, PlainValue::String(_)) && !matches!(r, PlainValue::String(_)) {
            return None;
        }
        Some(format!("{}{}", piece(l)?, piece(r)?))
    }

    fn logical_value(
        &mut self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
    ) -> Option<BoxNode> {
        let origin = file.node_ref(&node);
        if self.ctx.flags.skip_conditional_resolution {
            return Some(ValueNode::unresolvable(origin, stack.clone()));
        }

        let op = operator(&node)?;
        let left_node = node.child_by_field_name("left")?;
        let right_node = node.child_by_field_name("right")?;
        let left = self.maybe_box(file, left_node, stack);

        if let Some(left) = &left {
            match op {
                "||" | "??" if !left.is_unresolvable() => return Some(Arc::clone(left)),
                "&&" if !from_binding(left) => match truthiness(left) {
                    Some(true) => return self.maybe_box(file, right_node, stack),
                    Some(false) => return Some(Arc::clone(left)),
                    None => {}
                },
                _ => {}
            }
        }

        let right = self.maybe_box(file, right_node, stack);
        fold_branches(left, right, origin, stack)
    }

    fn ternary_value(
        &mut self,
        file: &Arc<SourceFile>,
        node: Node<'_>,
        stack: &Provenance,
    ) -> Option<BoxNode> {
        let origin = file.node_ref(&node);
        if self.ctx.flags.skip_conditional_resolution {
            return Some(ValueNode::unresolvable(origin, stack.clone()));
        }

        let condition = unwrap_expression(node.child_by_field_name("condition")?);
        let consequence = unwrap_expression(node.child_by_field_name("consequence")?);
        let alternative = unwrap_expression(node.child_by_field_name("alternative")?);

        let decision = if condition.kind() == "identifier" {
            match self.maybe_box(file, condition, &Provenance::new()) {
                Some(value) if value.is_empty_initializer() => return None,
                Some(value) if from_binding(&value) => None,
                Some(value) => truthiness(&value),
                None => None,
            }
        } else {
            self.safe_evaluate(file, condition, stack)
                .map(|value| value.is_truthy())
        };

        match decision {
            Some(true) => Some(
                self.maybe_box(file, consequence, stack)
                    .unwrap_or_else(|| ValueNode::unresolvable(file.node_ref(&consequence), stack.clone())),
            ),
            Some(false) => Some(
                self.maybe_box(file, alternative, stack)
                    .unwrap_or_else(|| ValueNode::unresolvable(origin, stack.clone())),
            ),
            None => {
                debug!(line = origin.line, "Undecidable condition, keeping both branches");
                let when_true = self.maybe_box(file, consequence, stack);
                let when_false = self.maybe_box(file, alternative, stack);
                fold_branches(when_true, when_false, origin, stack)
            }
        }
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Combine the two sides of an undecided branch.
pub(crate) fn fold_branches(
    when_true: Option<BoxNode>,
    when_false: Option<BoxNode>,
    origin: NodeRef,
    stack: &Provenance,
) -> Option<BoxNode> {
    match (when_true, when_false) {
        (None, None) => None,
        (Some(one), None) | (None, Some(one)) => Some(one),
        (Some(t), Some(f)) => {
            if let (Some(a), Some(b)) = (t.literal_value(), f.literal_value()) {
                if a == b {
                    return Some(t);
                }
            }
            Some(ValueNode::conditional(t, f, origin, stack.clone()))
        }
    }
}

/// Statically known truthiness of a value node.
pub(crate) fn truthiness(value: &ValueNode) -> Option<bool> {
    match &value.kind {
        ValueKind::Literal { value, .. } => Some(value.is_truthy()),
        ValueKind::Object { .. } | ValueKind::Map { .. } | ValueKind::Array(_) => Some(true),
        ValueKind::EmptyInitializer => Some(true),
        ValueKind::Conditional { .. } | ValueKind::Unresolvable => None,
    }
}

/// True when the value was reached through a destructuring binding.
pub(crate) fn from_binding(value: &ValueNode) -> bool {
    value.stack.any(|node| BINDING_PATTERN_KINDS.contains(&node.kind))
}

fn literal_or_object(value: PlainValue, origin: NodeRef, stack: &Provenance) -> BoxNode {
    match value {
        PlainValue::Object(map) => ValueNode::object(map, origin, stack.clone()),
        other => ValueNode::literal(other, origin, stack.clone()),
    }
}

/// Fully known plain value of a node, if every part of it is known.
pub fn to_plain(value: &ValueNode) -> Option<PlainValue> {
    match &value.kind {
        ValueKind::Literal { value, .. } => Some(value.clone()),
        ValueKind::Object { value, .. } => Some(PlainValue::Object(value.clone())),
        ValueKind::Map {
            entries,
            spread_conditions,
        } => {
            if !spread_conditions.is_empty() {
                return None;
            }
            entries
                .iter()
                .map(|(k, v)| to_plain(v).map(|v| (k.clone(), v)))
                .collect::<Option<_>>()
                .map(PlainValue::Object)
        }
        ValueKind::Array(items) => items
            .iter()
            .map(|item| to_plain(item))
            .collect::<Option<Vec<_>>>()
            .map(PlainValue::Array),
        ValueKind::EmptyInitializer => Some(PlainValue::Bool(true)),
        ValueKind::Conditional { .. } | ValueKind::Unresolvable => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::files::FileTable;

    struct Fixture {
        engine: Engine,
        file: Arc<SourceFile>,
    }

    impl Fixture {
        fn new(source: &str) -> Self {
            let files = Arc::new(FileTable::default());
            let file = files.add_source("/mem/test.tsx", source).unwrap();
            Self {
                engine: Engine::new(files),
                file,
            }
        }

        /// Evaluate the initializer of the last top-level `const`.
        fn eval_last(&self, ctx: &EvalContext) -> Option<BoxNode> {
            let root = self.file.root();
            let decl = named_children(&root)
                .into_iter()
                .filter(|n| n.kind() == "lexical_declaration")
                .last()
                .unwrap();
            let declarator = named_children(&decl).into_iter().next().unwrap();
            let value = declarator.child_by_field_name("value").unwrap();
            self.engine.evaluate(&self.file, value, &Provenance::new(), ctx)
        }

        fn plain(&self) -> Option<PlainValue> {
            self.eval_last(&EvalContext::default()).and_then(|v| to_plain(&v))
        }
    }

    fn json(value: Option<PlainValue>) -> serde_json::Value {
        value.map(|v| v.to_json()).unwrap_or(serde_json::Value::Null)
    }

    #[test]
    fn test_string_literals_collapse_whitespace() {
        let fx = Fixture::new("const a = 'px-2   \\n  py-4'");
        assert_eq!(fx.plain(), Some(PlainValue::string("px-2 py-4")));
    }

    #[test]
    fn test_object_literal_rebinding_moves_key_to_end() {
        let fx = Fixture::new("const a = { color: 'red', size: 1, color: 'blue' }");
        let value = fx.eval_last(&EvalContext::default()).unwrap();
        let keys: Vec<_> = value.map_entries().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["size", "color"]);
        assert_eq!(json(to_plain(&value)), serde_json::json!({ "size": 1, "color": "blue" }));
    }

    #[test]
    fn test_empty_object() {
        let fx = Fixture::new("const a = {}");
        let value = fx.eval_last(&EvalContext::default()).unwrap();
        assert!(matches!(value.kind, ValueKind::Object { is_empty: true, .. }));
    }

    #[test]
    fn test_identifier_and_spread_resolution() {
        let fx = Fixture::new(
            "const base = { color: 'red', size: 'sm' }\n\
             const a = { ...base, size: 'lg', extra: base.color }",
        );
        assert_eq!(
            json(fx.plain()),
            serde_json::json!({ "color": "red", "size": "lg", "extra": "red" })
        );
    }

    #[test]
    fn test_negative_numbers() {
        let fx = Fixture::new("const n = 4\nconst a = [-n, +2, -'x']");
        let value = fx.eval_last(&EvalContext::default()).unwrap();
        let ValueKind::Array(items) = &value.kind else {
            panic!("expected array");
        };
        assert_eq!(items[0].literal_value(), Some(&PlainValue::Number(-4.0)));
        assert_eq!(items[1].literal_value(), Some(&PlainValue::Number(2.0)));
        assert!(items[2].is_unresolvable());
    }

    #[test]
    fn test_template_with_substitutions() {
        let fx = Fixture::new("const size = 2\nconst unit = 'px'\nconst a = `${size}${unit} solid`");
        assert_eq!(fx.plain(), Some(PlainValue::string("2px solid")));

        let fx = Fixture::new("const a = `${unknown}px`");
        assert!(fx.eval_last(&EvalContext::default()).unwrap().is_unresolvable());
    }

    #[test]
    fn test_string_concatenation_and_arithmetic() {
        let fx = Fixture::new("const p = 'pre'\nconst a = p + '-' + 1");
        assert_eq!(fx.plain(), Some(PlainValue::string("pre-1")));

        let fx = Fixture::new("const a = 1 + 2");
        assert_eq!(fx.plain(), Some(PlainValue::Number(3.0)));

        let fx = Fixture::new("const a = 6 * 7");
        assert_eq!(fx.plain(), Some(PlainValue::Number(42.0)));
    }

    #[test]
    fn test_skip_full_evaluation() {
        let fx = Fixture::new("const a = 6 * 7");
        let ctx = EvalContext::default().with_flags(EvalFlags {
            skip_full_evaluation: true,
            ..EvalFlags::default()
        });
        assert!(fx.eval_last(&ctx).is_none());
    }

    #[test]
    fn test_can_evaluate_gate() {
        let fx = Fixture::new("const a = Math.max(1, 2)");
        let ctx = EvalContext::default().with_can_evaluate(|_, _| false);
        assert!(fx.eval_last(&ctx).is_none());
        assert_eq!(fx.engine.stats().sandbox_runs(), 0);
    }

    #[test]
    fn test_true_and_short_circuit() {
        let fx = Fixture::new("const a = true && { x: 1 }");
        let value = fx.eval_last(&EvalContext::default()).unwrap();
        assert!(value.is_map());
        assert_eq!(json(to_plain(&value)), serde_json::json!({ "x": 1 }));
    }

    #[test]
    fn test_nullish_keeps_defined_zero() {
        let fx = Fixture::new("const a = 0\nconst b = a ?? { x: 1 }");
        assert_eq!(fx.plain(), Some(PlainValue::Number(0.0)));
    }

    #[test]
    fn test_or_and_nullish_return_any_resolved_left_side() {
        let fx = Fixture::new("const a = false || { x: 1 }");
        assert_eq!(fx.plain(), Some(PlainValue::Bool(false)));

        let fx = Fixture::new("const a = null ?? 'x'");
        assert_eq!(fx.plain(), Some(PlainValue::Null));

        let fx = Fixture::new("const a = missing || 'x'");
        assert!(fx.eval_last(&EvalContext::default()).unwrap().is_conditional());
    }

    #[test]
    fn test_undecidable_ternary_folds() {
        let fx = Fixture::new("const a = cond ? 'sm' : 'lg'");
        let value = fx.eval_last(&EvalContext::default()).unwrap();
        assert!(value.is_conditional());

        let fx = Fixture::new("const a = cond ? 'sm' : 'sm'");
        let value = fx.eval_last(&EvalContext::default()).unwrap();
        assert!(value.is_literal());
    }

    #[test]
    fn test_decidable_ternary() {
        let fx = Fixture::new("const flag = true\nconst a = flag ? 'sm' : 'lg'");
        assert_eq!(fx.plain(), Some(PlainValue::string("sm")));

        let fx = Fixture::new("const a = 1 > 2 ? 'sm' : 'lg'");
        assert_eq!(fx.plain(), Some(PlainValue::string("lg")));
    }

    #[test]
    fn test_skip_conditional_resolution() {
        let fx = Fixture::new("const a = 1 > 2 ? 'sm' : 'lg'");
        let ctx = EvalContext::default().with_flags(EvalFlags {
            skip_conditional_resolution: true,
            ..EvalFlags::default()
        });
        assert!(fx.eval_last(&ctx).unwrap().is_unresolvable());
    }

    #[test]
    fn test_cycle_is_unresolvable() {
        let fx = Fixture::new("const a = { x: b.x }\nconst b = { x: a.x }\nconst c = a");
        let value = fx.eval_last(&EvalContext::default()).unwrap();
        assert!(value.is_map());
        let x = &value.map_entries().unwrap()["x"];
        assert!(x.is_unresolvable());
    }

    #[test]
    fn test_tagged_template_uses_template_only() {
        let fx = Fixture::new("const a = css`\n  color: red;\n`");
        assert_eq!(fx.plain(), Some(PlainValue::string(" color: red; ")));
    }

    #[test]
    fn test_call_expression_through_sandbox() {
        let fx = Fixture::new("const a = ['x', 'y'].join('-')");
        assert_eq!(fx.plain(), Some(PlainValue::string("x-y")));

        let fx = Fixture::new("const a = doSomething()");
        assert!(fx.eval_last(&EvalContext::default()).is_none());
    }

    #[test]
    fn test_idempotent_identity_cache() {
        let fx = Fixture::new("const a = { color: 'red' }");
        let first = fx.eval_last(&EvalContext::default()).unwrap();
        let second = fx.eval_last(&EvalContext::default()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        fx.engine.clear_caches();
        let third = fx.eval_last(&EvalContext::default()).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(to_plain(&first), to_plain(&third));
    }
}
