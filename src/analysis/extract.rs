//! Whole-file extraction.
//!
//! Walks a file, picks out the call sites, JSX elements and tagged templates
//! the request's matchers accept, and evaluates their arguments, props and
//! templates. Results are grouped by matched name in first-seen order.

use super::evaluator::{Engine, EvalContext, Evaluation};
use super::files::SourceFile;
use super::syntax::{named_children, unwrap_expression};
use super::value_node::{BoxNode, MapEntries, ValueKind, ValueNode};
use crate::types::{NodeRef, Provenance};
use compact_str::CompactString;
use indexmap::IndexMap;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use tree_sitter::Node;

pub type TagMatcher = Arc<dyn Fn(&str, bool) -> bool + Send + Sync>;
pub type PropMatcher = Arc<dyn Fn(&str, &str) -> bool + Send + Sync>;
pub type NameMatcher = Arc<dyn Fn(&str) -> bool + Send + Sync>;
pub type ArgMatcher = Arc<dyn Fn(&str, usize) -> bool + Send + Sync>;

/// JSX element matchers.
#[derive(Clone)]
pub struct ComponentMatchers {
    /// `(tag, is_factory)`; a factory tag is a member expression such as
    /// `styled.div`.
    pub match_tag: TagMatcher,
    /// `(tag, prop)`
    pub match_prop: PropMatcher,
}

impl ComponentMatchers {
    pub fn new(
        match_tag: impl Fn(&str, bool) -> bool + Send + Sync + 'static,
        match_prop: impl Fn(&str, &str) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            match_tag: Arc::new(match_tag),
            match_prop: Arc::new(match_prop),
        }
    }
}

/// Call expression matchers.
#[derive(Clone)]
pub struct FunctionMatchers {
    pub match_fn: NameMatcher,
    /// `(function, prop)`, applied to object-literal arguments
    pub match_prop: PropMatcher,
    /// `(function, argument index)`
    pub match_arg: ArgMatcher,
}

impl FunctionMatchers {
    pub fn new(
        match_fn: impl Fn(&str) -> bool + Send + Sync + 'static,
        match_prop: impl Fn(&str, &str) -> bool + Send + Sync + 'static,
        match_arg: impl Fn(&str, usize) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            match_fn: Arc::new(match_fn),
            match_prop: Arc::new(match_prop),
            match_arg: Arc::new(match_arg),
        }
    }
}

#[derive(Clone)]
pub struct TaggedTemplateMatchers {
    pub match_tagged_template: NameMatcher,
}

impl TaggedTemplateMatchers {
    pub fn new(match_tagged_template: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
        Self {
            match_tagged_template: Arc::new(match_tagged_template),
        }
    }
}

/// What to extract from a file.
#[derive(Clone, Default)]
pub struct ExtractRequest {
    pub components: Option<ComponentMatchers>,
    pub functions: Option<FunctionMatchers>,
    pub tagged_templates: Option<TaggedTemplateMatchers>,
    pub context: EvalContext,
}

impl fmt::Debug for ExtractRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractRequest")
            .field("components", &self.components.is_some())
            .field("functions", &self.functions.is_some())
            .field("tagged_templates", &self.tagged_templates.is_some())
            .field("context", &self.context)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultKind {
    Component,
    Function,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum QueryKind {
    CallExpression,
    TaggedTemplate,
    Component,
}

/// One matched site.
#[derive(Debug, Clone)]
pub struct ExtractedQuery {
    pub name: CompactString,
    pub kind: QueryKind,
    pub node: NodeRef,
    /// Props map for components, argument array for calls, template value
    /// for tagged templates.
    pub value: BoxNode,
}

#[derive(Debug, Clone)]
pub struct ExtractResultItem {
    pub kind: ResultKind,
    pub nodes_by_prop: IndexMap<CompactString, Vec<BoxNode>>,
    pub query_list: Vec<ExtractedQuery>,
}

impl ExtractResultItem {
    fn new(kind: ResultKind) -> Self {
        Self {
            kind,
            nodes_by_prop: IndexMap::new(),
            query_list: Vec::new(),
        }
    }

    fn record_prop(&mut self, prop: &CompactString, value: &BoxNode) {
        self.nodes_by_prop
            .entry(prop.clone())
            .or_default()
            .push(Arc::clone(value));
    }
}

pub type ExtractResultByName = IndexMap<CompactString, ExtractResultItem>;

/// Name and evaluated props of one JSX element.
#[derive(Debug, Clone)]
pub struct JsxElementProps {
    pub name: CompactString,
    pub props: MapEntries,
}

impl Engine {
    /// Extract every matched site in `file`.
    pub fn extract(&self, file: &Arc<SourceFile>, request: &ExtractRequest) -> ExtractResultByName {
        let mut driver = Driver {
            eval: Evaluation::new(self, &request.context),
            request,
            file,
            out: ExtractResultByName::new(),
        };

        let mut pending = vec![file.root()];
        while let Some(node) = pending.pop() {
            match node.kind() {
                "import_statement" => continue,
                "export_statement"
                    if node.child_by_field_name("declaration").is_none()
                        && node.child_by_field_name("value").is_none() =>
                {
                    continue
                }
                "jsx_opening_element" | "jsx_self_closing_element" => driver.component(node),
                "call_expression" => driver.call(node),
                _ => {}
            }
            let mut children = named_children(&node);
            children.reverse();
            pending.extend(children);
        }

        debug!(
            path = %file.path.display(),
            matched = driver.out.len(),
            "Extraction finished"
        );
        driver.out
    }

    /// Evaluate the props of a single JSX element (`jsx_element`,
    /// `jsx_opening_element` or `jsx_self_closing_element`).
    pub fn jsx_element_props(
        &self,
        file: &Arc<SourceFile>,
        element: Node<'_>,
        ctx: &EvalContext,
    ) -> Option<JsxElementProps> {
        let element = match element.kind() {
            "jsx_element" => element.child_by_field_name("open_tag")?,
            "jsx_opening_element" | "jsx_self_closing_element" => element,
            _ => return None,
        };
        let name = element.child_by_field_name("name")?;
        let mut eval = Evaluation::new(self, ctx);
        let stack = Provenance::new().push(file.node_ref(&element));
        let mut props = MapEntries::new();

        for attribute in named_children(&element) {
            match attribute.kind() {
                "jsx_attribute" => {
                    let Some(prop) = attribute_name(file, &attribute) else {
                        continue;
                    };
                    if let Some(value) = eval.maybe_box(file, attribute, &stack) {
                        props.shift_remove(&prop);
                        props.insert(prop, value);
                    }
                }
                "jsx_expression" => {
                    let Some(spread) = spread_source(&attribute) else {
                        continue;
                    };
                    let Some(value) = eval.maybe_box(file, spread, &stack) else {
                        continue;
                    };
                    for (key, entry) in object_like_to_map(&value) {
                        props.shift_remove(&key);
                        props.insert(key, entry);
                    }
                }
                _ => {}
            }
        }

        Some(JsxElementProps {
            name: file.text_of(&name).into(),
            props,
        })
    }
}

struct Driver<'e, 'r> {
    eval: Evaluation<'e>,
    request: &'r ExtractRequest,
    file: &'r Arc<SourceFile>,
    out: ExtractResultByName,
}

impl Driver<'_, '_> {
    fn component(&mut self, element: Node<'_>) {
        let Some(matchers) = &self.request.components else {
            return;
        };
        let Some(name_node) = element.child_by_field_name("name") else {
            return;
        };
        let file = self.file;
        let tag: CompactString = file.text_of(&name_node).into();
        let is_factory = tag.contains('.');
        if !(matchers.match_tag)(&tag, is_factory) {
            return;
        }

        let element_ref = file.node_ref(&element);
        let stack = Provenance::new().push(element_ref);
        let match_prop = |prop: &str| (matchers.match_prop)(&tag, prop);

        let mut props = MapEntries::new();
        let mut conditionals = Vec::new();
        let item = self
            .out
            .entry(tag.clone())
            .or_insert_with(|| ExtractResultItem::new(ResultKind::Component));

        for attribute in named_children(&element) {
            match attribute.kind() {
                "jsx_attribute" => {
                    let Some(prop) = attribute_name(file, &attribute) else {
                        continue;
                    };
                    if !match_prop(prop.as_str()) {
                        continue;
                    }
                    let Some(value) = self.eval.maybe_box(file, attribute, &stack) else {
                        continue;
                    };
                    item.record_prop(&prop, &value);
                    props.shift_remove(&prop);
                    props.insert(prop, value);
                }
                "jsx_expression" => {
                    let Some(source) = spread_source(&attribute) else {
                        continue;
                    };
                    let spread_stack = stack.push(file.node_ref(&attribute));
                    let Some(value) =
                        self.eval
                            .maybe_box_filtered(file, source, &spread_stack, Some(&match_prop))
                    else {
                        continue;
                    };
                    if value.is_conditional() {
                        conditionals.push(value);
                        continue;
                    }
                    for (key, entry) in object_like_to_map(&value) {
                        if !match_prop(key.as_str()) {
                            continue;
                        }
                        item.record_prop(&key, &entry);
                        props.shift_remove(&key);
                        props.insert(key, entry);
                    }
                }
                _ => {}
            }
        }

        item.query_list.push(ExtractedQuery {
            name: tag.clone(),
            kind: QueryKind::Component,
            node: element_ref,
            value: ValueNode::map_with_spreads(props, conditionals, element_ref, stack),
        });
    }

    fn call(&mut self, call: Node<'_>) {
        let Some(callee) = call.child_by_field_name("function") else {
            return;
        };
        let Some(arguments) = call.child_by_field_name("arguments") else {
            return;
        };
        let file = self.file;
        // `cva({...})()` is named after the inner callee
        let name_node = match callee.kind() {
            "call_expression" => callee.child_by_field_name("function").unwrap_or(callee),
            _ => callee,
        };
        let name: CompactString = file.text_of(&name_node).into();
        let call_ref = file.node_ref(&call);

        if arguments.kind() == "template_string" {
            self.tagged_template(call, name);
            return;
        }

        let Some(matchers) = &self.request.functions else {
            return;
        };
        if !(matchers.match_fn)(&name) {
            return;
        }

        let stack = Provenance::new().push(call_ref);
        let match_prop = |prop: &str| (matchers.match_prop)(&name, prop);
        let item = self
            .out
            .entry(name.clone())
            .or_insert_with(|| ExtractResultItem::new(ResultKind::Function));

        let mut values = Vec::new();
        for (index, argument) in named_children(&arguments).into_iter().enumerate() {
            let argument = unwrap_expression(argument);
            let arg_ref = file.node_ref(&argument);
            let arg_stack = stack.push(arg_ref);

            let value = if (matchers.match_arg)(&name, index) {
                self.eval
                    .maybe_box_filtered(file, argument, &arg_stack, Some(&match_prop))
            } else {
                None
            };
            let value = value.unwrap_or_else(|| ValueNode::unresolvable(arg_ref, arg_stack.clone()));

            // Object-like arguments are normalized to maps
            let normalized = match &value.kind {
                ValueKind::Map {
                    entries,
                    spread_conditions,
                } => {
                    for (key, entry) in entries {
                        item.record_prop(key, entry);
                    }
                    Some(ValueNode::map_with_spreads(
                        entries.clone(),
                        spread_conditions.clone(),
                        arg_ref,
                        arg_stack,
                    ))
                }
                ValueKind::Object { .. } => {
                    let entries: MapEntries = object_like_to_map(&value)
                        .into_iter()
                        .filter(|(key, _)| match_prop(key.as_str()))
                        .collect();
                    for (key, entry) in &entries {
                        item.record_prop(key, entry);
                    }
                    Some(ValueNode::map(entries, arg_ref, arg_stack))
                }
                _ => None,
            };
            let value = normalized.unwrap_or(value);
            values.push(value);
        }

        item.query_list.push(ExtractedQuery {
            name,
            kind: QueryKind::CallExpression,
            node: call_ref,
            value: ValueNode::array(values, call_ref, stack),
        });
    }

    fn tagged_template(&mut self, call: Node<'_>, name: CompactString) {
        let Some(matchers) = &self.request.tagged_templates else {
            return;
        };
        if !(matchers.match_tagged_template)(&name) {
            return;
        }

        let file = self.file;
        let call_ref = file.node_ref(&call);
        let stack = Provenance::new();
        let value = self
            .eval
            .maybe_box(file, call, &stack)
            .unwrap_or_else(|| ValueNode::unresolvable(call_ref, stack.clone()));

        self.out
            .entry(name.clone())
            .or_insert_with(|| ExtractResultItem::new(ResultKind::Function))
            .query_list
            .push(ExtractedQuery {
                name,
                kind: QueryKind::TaggedTemplate,
                node: call_ref,
                value,
            });
    }
}

fn attribute_name(file: &SourceFile, attribute: &Node<'_>) -> Option<CompactString> {
    named_children(attribute)
        .into_iter()
        .next()
        .map(|name| file.text_of(&name).into())
}

/// Source expression of a `{...spread}` attribute.
fn spread_source<'t>(attribute: &Node<'t>) -> Option<Node<'t>> {
    let spread = named_children(attribute)
        .into_iter()
        .find(|child| child.kind() == "spread_element")?;
    named_children(&spread).into_iter().next()
}

/// Entries of an object-like value; anything else has none.
pub fn object_like_to_map(value: &BoxNode) -> MapEntries {
    match &value.kind {
        ValueKind::Map { entries, .. } => entries.clone(),
        ValueKind::Object { value: map, .. } => map
            .iter()
            .filter_map(|(key, plain)| {
                ValueNode::from_plain(plain.clone(), value.origin, value.stack.clone())
                    .map(|node| (key.clone(), node))
            })
            .collect(),
        _ => MapEntries::new(),
    }
}
