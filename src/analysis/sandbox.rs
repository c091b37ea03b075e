//! Side-effect-free full evaluation of expressions.
//!
//! The symbolic evaluator only understands a handful of shapes on its own.
//! Anything that needs real arithmetic, coercion or a pure built-in call is
//! handed to a [`Sandbox`], which either produces a concrete value or fails.
//!
//! ## Policy
//!
//! - No I/O: `console`, `process`, `require`, `fetch`, `globalThis`,
//!   `window` and `document` fail the evaluation on sight.
//! - No user code: only whitelisted built-ins are called.
//! - Determinism (default on) rejects `Math.random` and `Date.now`.
//! - A wall-clock deadline and an optional operation budget bound runaway
//!   expressions.

use super::files::SourceFile;
use super::syntax::{
    decode_string_literal, named_children, operator, parse_number, static_property_key,
    template_parts, unwrap_expression, TemplatePart,
};
use crate::constants::DEFAULT_MAX_OP_DURATION_MS;
use crate::types::{format_number, PlainValue};
use compact_str::CompactString;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::trace;
use tree_sitter::Node;

/// Longest string a builtin may produce, in characters.
const MAX_STRING_LENGTH: usize = 1 << 29;

/// Upper bound accepted by `Number.prototype.toFixed`.
const MAX_FRACTION_DIGITS: f64 = 100.0;

/// Globals whose mere mention fails evaluation.
const FORBIDDEN_GLOBALS: &[&str] = &[
    "console",
    "process",
    "require",
    "fetch",
    "globalThis",
    "window",
    "document",
    "eval",
    "Function",
    "setTimeout",
    "setInterval",
    "XMLHttpRequest",
];

/// Policy applied to one sandbox evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationOptions {
    /// Reject non-deterministic built-ins
    pub deterministic: bool,
    /// Upper bound on evaluated operations; unbounded when `None`
    pub max_ops: Option<usize>,
    /// Wall-clock budget for the whole evaluation
    #[serde(with = "duration_ms", rename = "max_op_duration_ms")]
    pub max_op_duration: Duration,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            deterministic: true,
            max_ops: None,
            max_op_duration: Duration::from_millis(DEFAULT_MAX_OP_DURATION_MS),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// Result of a sandbox evaluation. `Value(Undefined)` is a success.
#[derive(Debug, Clone, PartialEq)]
pub enum EvalOutcome {
    Value(PlainValue),
    Failed,
}

impl EvalOutcome {
    pub fn value(self) -> Option<PlainValue> {
        match self {
            EvalOutcome::Value(v) => Some(v),
            EvalOutcome::Failed => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, EvalOutcome::Failed)
    }
}

/// Callback used to give identifiers a value. Returns `None` when the
/// identifier cannot be resolved statically.
pub type IdentifierHook<'h> = dyn FnMut(Node<'_>) -> Option<PlainValue> + 'h;

/// Pluggable full evaluator.
pub trait Sandbox: Send + Sync {
    fn try_fully_evaluate<'t>(
        &self,
        file: &'t SourceFile,
        node: Node<'t>,
        resolve_identifier: &mut IdentifierHook<'_>,
        options: &EvaluationOptions,
    ) -> EvalOutcome;
}

#[derive(Debug, Error)]
enum SandboxError {
    #[error("access to `{0}` is not allowed")]
    Forbidden(String),
    #[error("unsupported syntax: {0}")]
    Unsupported(String),
    #[error("identifier `{0}` could not be resolved")]
    Unresolved(String),
    #[error("{0}")]
    Type(String),
    #[error("{0}")]
    Range(String),
    #[error("operation budget exhausted")]
    Budget,
    #[error("evaluation timed out")]
    Timeout,
}

type EvalResult = Result<PlainValue, SandboxError>;

/// Default sandbox: a small interpreter for pure expressions.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConstInterpreter;

impl Sandbox for ConstInterpreter {
    fn try_fully_evaluate<'t>(
        &self,
        file: &'t SourceFile,
        node: Node<'t>,
        resolve_identifier: &mut IdentifierHook<'_>,
        options: &EvaluationOptions,
    ) -> EvalOutcome {
        let mut interp = Interp {
            file,
            resolve_identifier,
            options,
            ops: 0,
            deadline: Instant::now() + options.max_op_duration,
        };

        match interp.eval(node) {
            Ok(value) => EvalOutcome::Value(value),
            Err(e) => {
                trace!(
                    kind = node.kind(),
                    line = node.start_position().row + 1,
                    error = %e,
                    "Sandbox evaluation failed"
                );
                EvalOutcome::Failed
            }
        }
    }
}

struct Interp<'t, 'h, 'x, 'o> {
    file: &'t SourceFile,
    resolve_identifier: &'h mut IdentifierHook<'x>,
    options: &'o EvaluationOptions,
    ops: usize,
    deadline: Instant,
}

impl<'t, 'h, 'x, 'o> Interp<'t, 'h, 'x, 'o> {
    fn tick(&mut self) -> Result<(), SandboxError> {
        self.ops += 1;
        if self.options.max_ops.is_some_and(|max| self.ops > max) {
            return Err(SandboxError::Budget);
        }
        if Instant::now() >= self.deadline {
            return Err(SandboxError::Timeout);
        }
        Ok(())
    }

    fn text(&self, node: &Node<'t>) -> &'t str {
        self.file.text_of(node)
    }

    fn eval(&mut self, node: Node<'t>) -> EvalResult {
        self.tick()?;
        let node = unwrap_expression(node);

        match node.kind() {
            "string" => Ok(PlainValue::string(decode_string_literal(self.text(&node)))),
            "template_string" => self.eval_template(node),
            "number" => parse_number(self.text(&node))
                .map(PlainValue::Number)
                .ok_or_else(|| SandboxError::Unsupported("bigint literal".into())),
            "true" => Ok(PlainValue::Bool(true)),
            "false" => Ok(PlainValue::Bool(false)),
            "null" => Ok(PlainValue::Null),
            "undefined" => Ok(PlainValue::Undefined),
            "identifier" | "shorthand_property_identifier" => self.eval_identifier(node),
            "object" => self.eval_object(node),
            "array" => self.eval_array(node),
            "unary_expression" => self.eval_unary(node),
            "binary_expression" => self.eval_binary(node),
            "ternary_expression" => {
                let condition = field(&node, "condition")?;
                let branch = if self.eval(condition)?.is_truthy() {
                    field(&node, "consequence")?
                } else {
                    field(&node, "alternative")?
                };
                self.eval(branch)
            }
            "member_expression" => self.eval_member(node),
            "subscript_expression" => {
                let object = self.eval(field(&node, "object")?)?;
                if object.is_nullish() && has_optional_chain(&node) {
                    return Ok(PlainValue::Undefined);
                }
                let index = self.eval(field(&node, "index")?)?;
                get_property(&object, &to_js_string(&index))
            }
            "call_expression" => self.eval_call(node),
            "sequence_expression" => {
                let mut last = PlainValue::Undefined;
                for child in named_children(&node) {
                    last = self.eval(child)?;
                }
                Ok(last)
            }
            "assignment_expression" | "augmented_assignment_expression" | "update_expression" => {
                Err(SandboxError::Forbidden("mutation".into()))
            }
            other => Err(SandboxError::Unsupported(other.to_string())),
        }
    }

    fn eval_template(&mut self, node: Node<'t>) -> EvalResult {
        let mut out = String::new();
        for part in template_parts(&node, &self.file.text) {
            match part {
                TemplatePart::Text(text) => out.push_str(&text),
                TemplatePart::Substitution(expr) => {
                    let value = self.eval(expr)?;
                    out.push_str(&to_js_string(&value));
                }
            }
        }
        Ok(PlainValue::string(out))
    }

    fn eval_identifier(&mut self, node: Node<'t>) -> EvalResult {
        let name = self.text(&node);
        match name {
            "undefined" => return Ok(PlainValue::Undefined),
            "NaN" => return Ok(PlainValue::Number(f64::NAN)),
            "Infinity" => return Ok(PlainValue::Number(f64::INFINITY)),
            _ => {}
        }
        if FORBIDDEN_GLOBALS.contains(&name) {
            return Err(SandboxError::Forbidden(name.to_string()));
        }
        (self.resolve_identifier)(node).ok_or_else(|| SandboxError::Unresolved(name.to_string()))
    }

    fn eval_object(&mut self, node: Node<'t>) -> EvalResult {
        let mut map = IndexMap::new();
        for child in named_children(&node) {
            match child.kind() {
                "pair" => {
                    let key_node = field(&child, "key")?;
                    let key = self.property_key(key_node)?;
                    let value = self.eval(field(&child, "value")?)?;
                    map.shift_remove(&key);
                    map.insert(key, value);
                }
                "shorthand_property_identifier" => {
                    let key = CompactString::from(self.text(&child));
                    let value = self.eval_identifier(child)?;
                    map.shift_remove(&key);
                    map.insert(key, value);
                }
                "spread_element" => {
                    let source = self.eval(first_child(&child)?)?;
                    match source {
                        PlainValue::Object(entries) => {
                            for (k, v) in entries {
                                map.shift_remove(&k);
                                map.insert(k, v);
                            }
                        }
                        PlainValue::Array(items) => {
                            for (i, v) in items.into_iter().enumerate() {
                                map.insert(CompactString::from(i.to_string()), v);
                            }
                        }
                        PlainValue::String(s) => {
                            for (i, c) in s.chars().enumerate() {
                                map.insert(CompactString::from(i.to_string()), PlainValue::string(c.to_string()));
                            }
                        }
                        _ => {}
                    }
                }
                other => return Err(SandboxError::Unsupported(other.to_string())),
            }
        }
        Ok(PlainValue::Object(map))
    }

    fn property_key(&mut self, key: Node<'t>) -> Result<CompactString, SandboxError> {
        if key.kind() == "computed_property_name" {
            let value = self.eval(first_child(&key)?)?;
            return Ok(to_js_string(&value).into());
        }
        static_property_key(&key, &self.file.text)
            .map(CompactString::from)
            .ok_or_else(|| SandboxError::Unsupported(key.kind().to_string()))
    }

    fn eval_array(&mut self, node: Node<'t>) -> EvalResult {
        let mut items = Vec::new();
        for child in named_children(&node) {
            if child.kind() == "spread_element" {
                match self.eval(first_child(&child)?)? {
                    PlainValue::Array(inner) => items.extend(inner),
                    PlainValue::String(s) => {
                        items.extend(s.chars().map(|c| PlainValue::string(c.to_string())))
                    }
                    other => {
                        return Err(SandboxError::Type(format!(
                            "{} is not iterable",
                            to_js_string(&other)
                        )))
                    }
                }
            } else {
                items.push(self.eval(child)?);
            }
        }
        Ok(PlainValue::Array(items))
    }

    fn eval_unary(&mut self, node: Node<'t>) -> EvalResult {
        let op = operator(&node).unwrap_or("");
        let argument = field(&node, "argument")?;
        if op == "delete" {
            return Err(SandboxError::Forbidden("delete".into()));
        }
        if op == "typeof" {
            return Ok(PlainValue::string(self.eval(argument)?.type_of()));
        }

        let value = self.eval(argument)?;
        match op {
            "!" => Ok(PlainValue::Bool(!value.is_truthy())),
            "-" => Ok(PlainValue::Number(-to_number(&value))),
            "+" => Ok(PlainValue::Number(to_number(&value))),
            "~" => Ok(PlainValue::Number(!to_int32(to_number(&value)) as f64)),
            "void" => Ok(PlainValue::Undefined),
            other => Err(SandboxError::Unsupported(format!("unary {}", other))),
        }
    }

    fn eval_binary(&mut self, node: Node<'t>) -> EvalResult {
        let op = operator(&node).unwrap_or("");
        let left_node = field(&node, "left")?;
        let right_node = field(&node, "right")?;

        match op {
            "&&" => {
                let left = self.eval(left_node)?;
                return if left.is_truthy() { self.eval(right_node) } else { Ok(left) };
            }
            "||" => {
                let left = self.eval(left_node)?;
                return if left.is_truthy() { Ok(left) } else { self.eval(right_node) };
            }
            "??" => {
                let left = self.eval(left_node)?;
                return if left.is_nullish() { self.eval(right_node) } else { Ok(left) };
            }
            _ => {}
        }

        let left = self.eval(left_node)?;
        let right = self.eval(right_node)?;
        binary_op(op, &left, &right)
    }

    fn eval_member(&mut self, node: Node<'t>) -> EvalResult {
        let object_node = field(&node, "object")?;
        let property = self.text(&field(&node, "property")?).to_string();

        if object_node.kind() == "identifier" {
            if let Some(value) = static_constant(self.text(&object_node), &property) {
                return Ok(value);
            }
        }

        let object = self.eval(object_node)?;
        if object.is_nullish() && has_optional_chain(&node) {
            return Ok(PlainValue::Undefined);
        }
        get_property(&object, &property)
    }

    fn eval_args(&mut self, node: Node<'t>) -> Result<Vec<PlainValue>, SandboxError> {
        let arguments = field(&node, "arguments")?;
        if arguments.kind() != "arguments" {
            return Err(SandboxError::Unsupported("tagged template".into()));
        }
        let mut args = Vec::new();
        for child in named_children(&arguments) {
            if child.kind() == "spread_element" {
                match self.eval(first_child(&child)?)? {
                    PlainValue::Array(items) => args.extend(items),
                    _ => return Err(SandboxError::Type("spread argument is not an array".into())),
                }
            } else {
                args.push(self.eval(child)?);
            }
        }
        Ok(args)
    }

    fn eval_call(&mut self, node: Node<'t>) -> EvalResult {
        let callee = unwrap_expression(field(&node, "function")?);

        match callee.kind() {
            "identifier" => {
                let name = self.text(&callee);
                if FORBIDDEN_GLOBALS.contains(&name) {
                    return Err(SandboxError::Forbidden(name.to_string()));
                }
                let name = name.to_string();
                let args = self.eval_args(node)?;
                call_global(&name, &args)
            }
            "member_expression" => {
                let object_node = field(&callee, "object")?;
                let method = self.text(&field(&callee, "property")?).to_string();

                if object_node.kind() == "identifier" {
                    let namespace = self.text(&object_node);
                    if FORBIDDEN_GLOBALS.contains(&namespace) {
                        return Err(SandboxError::Forbidden(namespace.to_string()));
                    }
                    if is_builtin_namespace(namespace) {
                        let namespace = namespace.to_string();
                        self.check_determinism(&namespace, &method)?;
                        let args = self.eval_args(node)?;
                        return call_static(&namespace, &method, &args);
                    }
                }

                let receiver = self.eval(object_node)?;
                if receiver.is_nullish() && has_optional_chain(&callee) {
                    return Ok(PlainValue::Undefined);
                }
                let args = self.eval_args(node)?;
                call_method(&receiver, &method, &args)
            }
            other => Err(SandboxError::Unsupported(format!("call of {}", other))),
        }
    }

    fn check_determinism(&self, namespace: &str, method: &str) -> Result<(), SandboxError> {
        let non_deterministic = matches!((namespace, method), ("Math", "random") | ("Date", "now"));
        if non_deterministic && self.options.deterministic {
            return Err(SandboxError::Forbidden(format!("{}.{}", namespace, method)));
        }
        Ok(())
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn field<'t>(node: &Node<'t>, name: &str) -> Result<Node<'t>, SandboxError> {
    node.child_by_field_name(name)
        .ok_or_else(|| SandboxError::Unsupported(format!("{} without {}", node.kind(), name)))
}

fn first_child<'t>(node: &Node<'t>) -> Result<Node<'t>, SandboxError> {
    named_children(node)
        .into_iter()
        .next()
        .ok_or_else(|| SandboxError::Unsupported(format!("empty {}", node.kind())))
}

fn has_optional_chain(node: &Node<'_>) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|child| child.kind() == "optional_chain" || child.kind() == "?.");
    found
}

fn is_builtin_namespace(name: &str) -> bool {
    matches!(name, "Math" | "Object" | "JSON" | "Array" | "Number" | "String" | "Date")
}

fn static_constant(namespace: &str, property: &str) -> Option<PlainValue> {
    use std::f64::consts;
    let n = match (namespace, property) {
        ("Math", "PI") => consts::PI,
        ("Math", "E") => consts::E,
        ("Math", "LN2") => consts::LN_2,
        ("Math", "LN10") => consts::LN_10,
        ("Math", "LOG2E") => consts::LOG2_E,
        ("Math", "LOG10E") => consts::LOG10_E,
        ("Math", "SQRT2") => consts::SQRT_2,
        ("Math", "SQRT1_2") => consts::FRAC_1_SQRT_2,
        ("Number", "MAX_SAFE_INTEGER") => 9007199254740991.0,
        ("Number", "MIN_SAFE_INTEGER") => -9007199254740991.0,
        ("Number", "EPSILON") => f64::EPSILON,
        ("Number", "MAX_VALUE") => f64::MAX,
        ("Number", "MIN_VALUE") => 5e-324,
        ("Number", "POSITIVE_INFINITY") => f64::INFINITY,
        ("Number", "NEGATIVE_INFINITY") => f64::NEG_INFINITY,
        ("Number", "NaN") => f64::NAN,
        _ => return None,
    };
    Some(PlainValue::Number(n))
}

/// JS `ToString`.
pub(crate) fn to_js_string(value: &PlainValue) -> String {
    match value {
        PlainValue::Undefined => "undefined".to_string(),
        PlainValue::Null => "null".to_string(),
        PlainValue::Bool(b) => b.to_string(),
        PlainValue::Number(n) => format_number(*n),
        PlainValue::String(s) => s.to_string(),
        PlainValue::Array(items) => items
            .iter()
            .map(|item| if item.is_nullish() { String::new() } else { to_js_string(item) })
            .collect::<Vec<_>>()
            .join(","),
        PlainValue::Object(_) => "[object Object]".to_string(),
    }
}

/// JS `ToNumber`.
pub(crate) fn to_number(value: &PlainValue) -> f64 {
    match value {
        PlainValue::Undefined => f64::NAN,
        PlainValue::Null => 0.0,
        PlainValue::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        PlainValue::Number(n) => *n,
        PlainValue::String(s) => string_to_number(s),
        PlainValue::Array(_) => string_to_number(&to_js_string(value)),
        PlainValue::Object(_) => f64::NAN,
    }
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        _ => {}
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("0x") || lower.starts_with("0o") || lower.starts_with("0b") {
        return parse_number(trimmed).unwrap_or(f64::NAN);
    }
    if lower.contains("inf") || lower.contains("nan") || trimmed.contains('_') {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

fn to_int32(n: f64) -> i32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let modulo = n.trunc().rem_euclid(4294967296.0);
    (if modulo >= 2147483648.0 { modulo - 4294967296.0 } else { modulo }) as i32
}

fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    n.trunc().rem_euclid(4294967296.0) as u32
}

fn is_primitive(value: &PlainValue) -> bool {
    !matches!(value, PlainValue::Array(_) | PlainValue::Object(_))
}

fn strict_equals(left: &PlainValue, right: &PlainValue) -> Result<bool, SandboxError> {
    if !is_primitive(left) || !is_primitive(right) {
        if std::mem::discriminant(left) != std::mem::discriminant(right) {
            return Ok(false);
        }
        return Err(SandboxError::Unsupported("reference equality".into()));
    }
    Ok(match (left, right) {
        (PlainValue::Number(a), PlainValue::Number(b)) => a == b,
        _ => left == right,
    })
}

fn loose_equals(left: &PlainValue, right: &PlainValue) -> Result<bool, SandboxError> {
    use PlainValue::*;
    match (left, right) {
        (Undefined | Null, Undefined | Null) => Ok(true),
        (Undefined | Null, _) | (_, Undefined | Null) => Ok(false),
        (Number(_), String(_)) | (String(_), Number(_)) | (Bool(_), _) | (_, Bool(_)) => {
            if !is_primitive(left) || !is_primitive(right) {
                return Err(SandboxError::Unsupported("object coercion".into()));
            }
            Ok(to_number(left) == to_number(right))
        }
        _ => strict_equals(left, right),
    }
}

fn compare(
    left: &PlainValue,
    right: &PlainValue,
    pred: impl Fn(std::cmp::Ordering) -> bool,
) -> PlainValue {
    if let (PlainValue::String(a), PlainValue::String(b)) = (left, right) {
        return PlainValue::Bool(pred(a.as_str().cmp(b.as_str())));
    }
    let (a, b) = (to_number(left), to_number(right));
    PlainValue::Bool(a.partial_cmp(&b).is_some_and(pred))
}

fn binary_op(op: &str, left: &PlainValue, right: &PlainValue) -> EvalResult {
    let num = |f: fn(f64, f64) -> f64| -> EvalResult {
        Ok(PlainValue::Number(f(to_number(left), to_number(right))))
    };
    match op {
        "+" => {
            let concat = matches!(left, PlainValue::String(_) | PlainValue::Array(_) | PlainValue::Object(_))
                || matches!(right, PlainValue::String(_) | PlainValue::Array(_) | PlainValue::Object(_));
            if concat {
                Ok(PlainValue::string(format!("{}{}", to_js_string(left), to_js_string(right))))
            } else {
                num(|a, b| a + b)
            }
        }
        "-" => num(|a, b| a - b),
        "*" => num(|a, b| a * b),
        "/" => num(|a, b| a / b),
        "%" => num(|a, b| a % b),
        "**" => num(f64::powf),
        "&" => Ok(PlainValue::Number((to_int32(to_number(left)) & to_int32(to_number(right))) as f64)),
        "|" => Ok(PlainValue::Number((to_int32(to_number(left)) | to_int32(to_number(right))) as f64)),
        "^" => Ok(PlainValue::Number((to_int32(to_number(left)) ^ to_int32(to_number(right))) as f64)),
        "<<" => Ok(PlainValue::Number(
            to_int32(to_number(left)).wrapping_shl(to_uint32(to_number(right)) & 31) as f64,
        )),
        ">>" => Ok(PlainValue::Number(
            to_int32(to_number(left)).wrapping_shr(to_uint32(to_number(right)) & 31) as f64,
        )),
        ">>>" => Ok(PlainValue::Number(
            to_uint32(to_number(left)).wrapping_shr(to_uint32(to_number(right)) & 31) as f64,
        )),
        "===" => strict_equals(left, right).map(PlainValue::Bool),
        "!==" => strict_equals(left, right).map(|eq| PlainValue::Bool(!eq)),
        "==" => loose_equals(left, right).map(PlainValue::Bool),
        "!=" => loose_equals(left, right).map(|eq| PlainValue::Bool(!eq)),
        "<" => Ok(compare(left, right, |o| o.is_lt())),
        ">" => Ok(compare(left, right, |o| o.is_gt())),
        "<=" => Ok(compare(left, right, |o| o.is_le())),
        ">=" => Ok(compare(left, right, |o| o.is_ge())),
        "in" => match right {
            PlainValue::Object(map) => Ok(PlainValue::Bool(map.contains_key(to_js_string(left).as_str()))),
            PlainValue::Array(items) => {
                let key = to_js_string(left);
                Ok(PlainValue::Bool(
                    key == "length" || key.parse::<usize>().is_ok_and(|i| i < items.len()),
                ))
            }
            _ => Err(SandboxError::Type("`in` on a primitive".into())),
        },
        other => Err(SandboxError::Unsupported(format!("operator {}", other))),
    }
}

fn get_property(object: &PlainValue, key: &str) -> EvalResult {
    match object {
        PlainValue::Undefined | PlainValue::Null => Err(SandboxError::Type(format!(
            "cannot read `{}` of {}",
            key,
            to_js_string(object)
        ))),
        PlainValue::String(s) if key == "length" => Ok(PlainValue::Number(s.chars().count() as f64)),
        PlainValue::String(s) => Ok(key
            .parse::<usize>()
            .ok()
            .and_then(|i| s.chars().nth(i))
            .map(|c| PlainValue::string(c.to_string()))
            .unwrap_or_default()),
        PlainValue::Array(items) if key == "length" => Ok(PlainValue::Number(items.len() as f64)),
        other => Ok(other.get(key).cloned().unwrap_or_default()),
    }
}

fn arg(args: &[PlainValue], index: usize) -> PlainValue {
    args.get(index).cloned().unwrap_or_default()
}

fn num_arg(args: &[PlainValue], index: usize) -> f64 {
    to_number(&arg(args, index))
}

fn str_arg(args: &[PlainValue], index: usize) -> String {
    to_js_string(&arg(args, index))
}

/// Resolve a possibly negative relative index against `len`.
fn relative_index(n: f64, len: usize) -> usize {
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    if n < 0.0 {
        (len as f64 + n).max(0.0) as usize
    } else {
        n.min(len as f64) as usize
    }
}

fn call_global(name: &str, args: &[PlainValue]) -> EvalResult {
    match name {
        "String" => Ok(PlainValue::string(if args.is_empty() { String::new() } else { str_arg(args, 0) })),
        "Number" => Ok(PlainValue::Number(if args.is_empty() { 0.0 } else { num_arg(args, 0) })),
        "Boolean" => Ok(PlainValue::Bool(arg(args, 0).is_truthy())),
        "parseInt" => Ok(PlainValue::Number(parse_int(&str_arg(args, 0), args.get(1).map(to_number)))),
        "parseFloat" => Ok(PlainValue::Number(parse_float(&str_arg(args, 0)))),
        "isNaN" => Ok(PlainValue::Bool(num_arg(args, 0).is_nan())),
        "isFinite" => Ok(PlainValue::Bool(num_arg(args, 0).is_finite())),
        other => Err(SandboxError::Unsupported(format!("call to `{}`", other))),
    }
}

fn parse_int(text: &str, radix: Option<f64>) -> f64 {
    let trimmed = text.trim();
    let (negative, body) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let mut radix = radix.map(|r| r as u32).filter(|r| *r != 0).unwrap_or(10);
    let mut body = body;
    if (radix == 16 || radix == 10) && (body.starts_with("0x") || body.starts_with("0X")) {
        radix = 16;
        body = &body[2..];
    }
    if !(2..=36).contains(&radix) {
        return f64::NAN;
    }
    let digits: String = body.chars().take_while(|c| c.is_digit(radix)).collect();
    if digits.is_empty() {
        return f64::NAN;
    }
    let value = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0, |acc, d| acc * radix as f64 + d as f64);
    if negative {
        -value
    } else {
        value
    }
}

fn parse_float(text: &str) -> f64 {
    let trimmed = text.trim_start();
    let mut end = 0;
    let mut seen_dot = false;
    let mut seen_exp = false;
    let bytes = trimmed.as_bytes();
    while end < bytes.len() {
        let c = bytes[end] as char;
        let ok = c.is_ascii_digit()
            || ((c == '+' || c == '-') && (end == 0 || matches!(bytes[end - 1], b'e' | b'E')))
            || (c == '.' && !seen_dot && !seen_exp)
            || ((c == 'e' || c == 'E') && !seen_exp && end > 0);
        if !ok {
            break;
        }
        seen_dot |= c == '.';
        seen_exp |= c == 'e' || c == 'E';
        end += 1;
    }
    let mut candidate = &trimmed[..end];
    while !candidate.is_empty() {
        if let Ok(n) = candidate.parse::<f64>() {
            return n;
        }
        candidate = &candidate[..candidate.len() - 1];
    }
    if trimmed.starts_with("Infinity") {
        return f64::INFINITY;
    }
    f64::NAN
}

fn call_static(namespace: &str, method: &str, args: &[PlainValue]) -> EvalResult {
    let math1 = |f: fn(f64) -> f64| -> EvalResult { Ok(PlainValue::Number(f(num_arg(args, 0)))) };
    match (namespace, method) {
        ("Math", "abs") => math1(f64::abs),
        ("Math", "floor") => math1(f64::floor),
        ("Math", "ceil") => math1(f64::ceil),
        ("Math", "round") => math1(|n| (n + 0.5).floor()),
        ("Math", "trunc") => math1(f64::trunc),
        ("Math", "sign") => math1(|n| if n == 0.0 || n.is_nan() { n } else { n.signum() }),
        ("Math", "sqrt") => math1(f64::sqrt),
        ("Math", "cbrt") => math1(f64::cbrt),
        ("Math", "log") => math1(f64::ln),
        ("Math", "log2") => math1(f64::log2),
        ("Math", "log10") => math1(f64::log10),
        ("Math", "exp") => math1(f64::exp),
        ("Math", "sin") => math1(f64::sin),
        ("Math", "cos") => math1(f64::cos),
        ("Math", "tan") => math1(f64::tan),
        ("Math", "atan") => math1(f64::atan),
        ("Math", "atan2") => Ok(PlainValue::Number(num_arg(args, 0).atan2(num_arg(args, 1)))),
        ("Math", "pow") => Ok(PlainValue::Number(num_arg(args, 0).powf(num_arg(args, 1)))),
        ("Math", "min") => Ok(PlainValue::Number(args.iter().map(to_number).fold(f64::INFINITY, |acc, n| {
            if acc.is_nan() || n.is_nan() { f64::NAN } else { acc.min(n) }
        }))),
        ("Math", "max") => Ok(PlainValue::Number(args.iter().map(to_number).fold(f64::NEG_INFINITY, |acc, n| {
            if acc.is_nan() || n.is_nan() { f64::NAN } else { acc.max(n) }
        }))),
        ("Math", "hypot") => Ok(PlainValue::Number(
            args.iter().map(to_number).map(|n| n * n).sum::<f64>().sqrt(),
        )),
        ("Date", "now") => {
            let millis = std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_millis() as f64)
                .unwrap_or(0.0);
            Ok(PlainValue::Number(millis))
        }
        ("Number", "isInteger") => Ok(PlainValue::Bool(
            matches!(arg(args, 0), PlainValue::Number(n) if n.is_finite() && n.fract() == 0.0),
        )),
        ("Number", "isFinite") => Ok(PlainValue::Bool(
            matches!(arg(args, 0), PlainValue::Number(n) if n.is_finite()),
        )),
        ("Number", "isNaN") => Ok(PlainValue::Bool(
            matches!(arg(args, 0), PlainValue::Number(n) if n.is_nan()),
        )),
        ("Number", "parseFloat") => call_global("parseFloat", args),
        ("Number", "parseInt") => call_global("parseInt", args),
        ("String", "fromCharCode") => Ok(PlainValue::string(
            args.iter()
                .filter_map(|a| char::from_u32(to_number(a) as u32))
                .collect::<String>(),
        )),
        ("Array", "isArray") => Ok(PlainValue::Bool(matches!(arg(args, 0), PlainValue::Array(_)))),
        ("Array", "of") => Ok(PlainValue::Array(args.to_vec())),
        ("Object", "keys") => Ok(PlainValue::Array(
            own_entries(&arg(args, 0))?.into_iter().map(|(k, _)| PlainValue::String(k)).collect(),
        )),
        ("Object", "values") => Ok(PlainValue::Array(
            own_entries(&arg(args, 0))?.into_iter().map(|(_, v)| v).collect(),
        )),
        ("Object", "entries") => Ok(PlainValue::Array(
            own_entries(&arg(args, 0))?
                .into_iter()
                .map(|(k, v)| PlainValue::Array(vec![PlainValue::String(k), v]))
                .collect(),
        )),
        ("Object", "fromEntries") => match arg(args, 0) {
            PlainValue::Array(pairs) => {
                let mut map = IndexMap::new();
                for pair in pairs {
                    let key = to_js_string(pair.get("0").unwrap_or(&PlainValue::Undefined));
                    let value = pair.get("1").cloned().unwrap_or_default();
                    map.insert(CompactString::from(key), value);
                }
                Ok(PlainValue::Object(map))
            }
            _ => Err(SandboxError::Type("Object.fromEntries expects an array".into())),
        },
        ("JSON", "stringify") => {
            let value = arg(args, 0);
            if value == PlainValue::Undefined {
                return Ok(PlainValue::Undefined);
            }
            serde_json::to_string(&value.to_json())
                .map(PlainValue::string)
                .map_err(|e| SandboxError::Type(e.to_string()))
        }
        (namespace, method) => Err(SandboxError::Unsupported(format!("{}.{}", namespace, method))),
    }
}

fn own_entries(value: &PlainValue) -> Result<Vec<(CompactString, PlainValue)>, SandboxError> {
    match value {
        PlainValue::Object(map) => Ok(map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        PlainValue::Array(items) => Ok(items
            .iter()
            .enumerate()
            .map(|(i, v)| (CompactString::from(i.to_string()), v.clone()))
            .collect()),
        PlainValue::String(s) => Ok(s
            .chars()
            .enumerate()
            .map(|(i, c)| (CompactString::from(i.to_string()), PlainValue::string(c.to_string())))
            .collect()),
        PlainValue::Undefined | PlainValue::Null => {
            Err(SandboxError::Type("cannot convert undefined or null to object".into()))
        }
        _ => Ok(Vec::new()),
    }
}

fn call_method(receiver: &PlainValue, method: &str, args: &[PlainValue]) -> EvalResult {
    match receiver {
        PlainValue::String(s) => string_method(s, method, args),
        PlainValue::Array(items) => array_method(items, method, args),
        PlainValue::Number(n) => match method {
            "toString" => Ok(PlainValue::string(format_number(*n))),
            "toFixed" => {
                let digits = num_arg(args, 0);
                let digits = if digits.is_nan() { 0.0 } else { digits.trunc() };
                if !(0.0..=MAX_FRACTION_DIGITS).contains(&digits) {
                    return Err(SandboxError::Range("toFixed() digits out of range".into()));
                }
                Ok(PlainValue::string(format!("{:.*}", digits as usize, n)))
            }
            other => Err(SandboxError::Unsupported(format!("Number.prototype.{}", other))),
        },
        PlainValue::Bool(b) if method == "toString" => Ok(PlainValue::string(b.to_string())),
        other => Err(SandboxError::Type(format!(
            "{}.{} is not a function",
            to_js_string(other),
            method
        ))),
    }
}

fn string_method(s: &str, method: &str, args: &[PlainValue]) -> EvalResult {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let slice = |start: usize, end: usize| -> String {
        if start >= end {
            String::new()
        } else {
            chars[start..end].iter().collect()
        }
    };
    let index_of = |needle: &str, from: usize| -> f64 {
        let byte_from = chars[..from.min(len)].iter().map(|c| c.len_utf8()).sum::<usize>();
        s[byte_from..]
            .find(needle)
            .map(|b| (from + s[byte_from..byte_from + b].chars().count()) as f64)
            .unwrap_or(-1.0)
    };

    let value = match method {
        "toUpperCase" | "toLocaleUpperCase" => PlainValue::string(s.to_uppercase()),
        "toLowerCase" | "toLocaleLowerCase" => PlainValue::string(s.to_lowercase()),
        "trim" => PlainValue::string(s.trim()),
        "trimStart" => PlainValue::string(s.trim_start()),
        "trimEnd" => PlainValue::string(s.trim_end()),
        "toString" | "valueOf" => PlainValue::string(s),
        "includes" => PlainValue::Bool(s.contains(str_arg(args, 0).as_str())),
        "startsWith" => PlainValue::Bool(s.starts_with(str_arg(args, 0).as_str())),
        "endsWith" => PlainValue::Bool(s.ends_with(str_arg(args, 0).as_str())),
        "indexOf" => PlainValue::Number(index_of(&str_arg(args, 0), relative_index(num_arg(args, 1), len))),
        "charAt" => {
            let i = num_arg(args, 0);
            let i = if i.is_nan() { 0.0 } else { i };
            PlainValue::string(
                (i >= 0.0).then(|| chars.get(i as usize)).flatten().map(|c| c.to_string()).unwrap_or_default(),
            )
        }
        "at" => {
            let i = num_arg(args, 0).trunc();
            let i = if i < 0.0 { len as f64 + i } else { i };
            (i >= 0.0)
                .then(|| chars.get(i as usize))
                .flatten()
                .map(|c| PlainValue::string(c.to_string()))
                .unwrap_or_default()
        }
        "slice" => {
            let start = relative_index(num_arg(args, 0), len);
            let end = match args.get(1) {
                Some(PlainValue::Undefined) | None => len,
                Some(v) => relative_index(to_number(v), len),
            };
            PlainValue::string(slice(start, end))
        }
        "substring" => {
            let clamp = |n: f64| if n.is_nan() { 0 } else { n.max(0.0).min(len as f64) as usize };
            let a = clamp(num_arg(args, 0));
            let b = match args.get(1) {
                Some(PlainValue::Undefined) | None => len,
                Some(v) => clamp(to_number(v)),
            };
            PlainValue::string(slice(a.min(b), a.max(b)))
        }
        "split" => match args.first() {
            None | Some(PlainValue::Undefined) => PlainValue::Array(vec![PlainValue::string(s)]),
            Some(sep) => {
                let sep = to_js_string(sep);
                let parts: Vec<PlainValue> = if sep.is_empty() {
                    chars.iter().map(|c| PlainValue::string(c.to_string())).collect()
                } else {
                    s.split(sep.as_str()).map(PlainValue::from).collect()
                };
                PlainValue::Array(parts)
            }
        },
        "replace" => PlainValue::string(s.replacen(str_arg(args, 0).as_str(), &str_arg(args, 1), 1)),
        "replaceAll" => PlainValue::string(s.replace(str_arg(args, 0).as_str(), &str_arg(args, 1))),
        "repeat" => {
            let count = num_arg(args, 0);
            let count = if count.is_nan() { 0.0 } else { count.trunc() };
            if count < 0.0 || !count.is_finite() {
                return Err(SandboxError::Range("invalid repeat count".into()));
            }
            if len == 0 {
                return Ok(PlainValue::string(""));
            }
            if len as f64 * count > MAX_STRING_LENGTH as f64 {
                return Err(SandboxError::Range("invalid string length".into()));
            }
            PlainValue::string(s.repeat(count as usize))
        }
        "padStart" | "padEnd" => {
            let target = num_arg(args, 0);
            if target > MAX_STRING_LENGTH as f64 {
                return Err(SandboxError::Range("invalid string length".into()));
            }
            let target = target.max(0.0) as usize;
            let filler = match args.get(1) {
                Some(PlainValue::Undefined) | None => " ".to_string(),
                Some(v) => to_js_string(v),
            };
            if target <= len || filler.is_empty() {
                PlainValue::string(s)
            } else {
                let pad: String = filler.chars().cycle().take(target - len).collect();
                if method == "padStart" {
                    PlainValue::string(format!("{}{}", pad, s))
                } else {
                    PlainValue::string(format!("{}{}", s, pad))
                }
            }
        }
        "concat" => {
            let mut out = s.to_string();
            for a in args {
                out.push_str(&to_js_string(a));
            }
            PlainValue::string(out)
        }
        other => return Err(SandboxError::Unsupported(format!("String.prototype.{}", other))),
    };
    Ok(value)
}

fn array_method(items: &[PlainValue], method: &str, args: &[PlainValue]) -> EvalResult {
    let len = items.len();
    let value = match method {
        "join" => {
            let sep = match args.first() {
                None | Some(PlainValue::Undefined) => ",".to_string(),
                Some(v) => to_js_string(v),
            };
            PlainValue::string(
                items
                    .iter()
                    .map(|item| if item.is_nullish() { String::new() } else { to_js_string(item) })
                    .collect::<Vec<_>>()
                    .join(&sep),
            )
        }
        "includes" => {
            let needle = arg(args, 0);
            PlainValue::Bool(items.iter().any(|item| match (item, &needle) {
                (PlainValue::Number(a), PlainValue::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
                _ => is_primitive(item) && item == &needle,
            }))
        }
        "indexOf" => {
            let needle = arg(args, 0);
            PlainValue::Number(
                items
                    .iter()
                    .position(|item| strict_equals(item, &needle).unwrap_or(false))
                    .map_or(-1.0, |i| i as f64),
            )
        }
        "slice" => {
            let start = relative_index(num_arg(args, 0), len);
            let end = match args.get(1) {
                Some(PlainValue::Undefined) | None => len,
                Some(v) => relative_index(to_number(v), len),
            };
            PlainValue::Array(if start < end { items[start..end].to_vec() } else { Vec::new() })
        }
        "concat" => {
            let mut out = items.to_vec();
            for a in args {
                match a {
                    PlainValue::Array(more) => out.extend(more.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            PlainValue::Array(out)
        }
        "flat" => {
            let mut out = Vec::new();
            for item in items {
                match item {
                    PlainValue::Array(inner) => out.extend(inner.iter().cloned()),
                    other => out.push(other.clone()),
                }
            }
            PlainValue::Array(out)
        }
        "at" => {
            let i = num_arg(args, 0).trunc();
            let i = if i < 0.0 { len as f64 + i } else { i };
            (i >= 0.0).then(|| items.get(i as usize)).flatten().cloned().unwrap_or_default()
        }
        "toString" => PlainValue::string(to_js_string(&PlainValue::Array(items.to_vec()))),
        other => return Err(SandboxError::Unsupported(format!("Array.prototype.{}", other))),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::files::FileTable;

    fn eval_with(source: &str, options: &EvaluationOptions) -> EvalOutcome {
        let table = FileTable::default();
        let file = table.add_source("/mem/sandbox.ts", format!("const __x = {};", source)).unwrap();
        let root = file.root();
        let declarator = root.named_child(0).and_then(|d| d.named_child(0)).unwrap();
        let value = declarator.child_by_field_name("value").unwrap();

        let text = file.text.clone();
        let mut hook = |node: Node<'_>| match node.utf8_text(text.as_bytes()).ok()? {
            "known" => Some(PlainValue::Number(4.0)),
            "theme" => {
                let mut map = IndexMap::new();
                map.insert(CompactString::from("color"), PlainValue::string("red"));
                Some(PlainValue::Object(map))
            }
            _ => None,
        };
        ConstInterpreter.try_fully_evaluate(&file, value, &mut hook, options)
    }

    fn eval(source: &str) -> Option<PlainValue> {
        eval_with(source, &EvaluationOptions::default()).value()
    }

    #[test]
    fn test_arithmetic_and_coercion() {
        assert_eq!(eval("1 + 2 * 3"), Some(PlainValue::Number(7.0)));
        assert_eq!(eval("'a' + 1"), Some(PlainValue::string("a1")));
        assert_eq!(eval("2 ** 10"), Some(PlainValue::Number(1024.0)));
        assert_eq!(eval("'3' * '4'"), Some(PlainValue::Number(12.0)));
        assert_eq!(eval("-known"), Some(PlainValue::Number(-4.0)));
        assert_eq!(eval("~5"), Some(PlainValue::Number(-6.0)));
        assert_eq!(eval("typeof 'x'"), Some(PlainValue::string("string")));
        assert_eq!(eval("void 0"), Some(PlainValue::Undefined));
    }

    #[test]
    fn test_equality_and_relational() {
        assert_eq!(eval("1 === 1"), Some(PlainValue::Bool(true)));
        assert_eq!(eval("'1' == 1"), Some(PlainValue::Bool(true)));
        assert_eq!(eval("null == undefined"), Some(PlainValue::Bool(true)));
        assert_eq!(eval("null === undefined"), Some(PlainValue::Bool(false)));
        assert_eq!(eval("'a' < 'b'"), Some(PlainValue::Bool(true)));
        assert_eq!(eval("NaN >= 1"), Some(PlainValue::Bool(false)));
    }

    #[test]
    fn test_logical_short_circuit() {
        assert_eq!(eval("0 ?? 5"), Some(PlainValue::Number(0.0)));
        assert_eq!(eval("0 || 5"), Some(PlainValue::Number(5.0)));
        assert_eq!(eval("false && unknown"), Some(PlainValue::Bool(false)));
    }

    #[test]
    fn test_builtins() {
        assert_eq!(eval("Math.max(1, 3, 2)"), Some(PlainValue::Number(3.0)));
        assert_eq!(eval("Math.round(2.5)"), Some(PlainValue::Number(3.0)));
        assert_eq!(eval("'Red'.toLowerCase()"), Some(PlainValue::string("red")));
        assert_eq!(eval("['a', 'b'].join('-')"), Some(PlainValue::string("a-b")));
        assert_eq!(eval("'abc'.length"), Some(PlainValue::Number(3.0)));
        assert_eq!(eval("JSON.stringify({ a: 1 })"), Some(PlainValue::string("{\"a\":1}")));
        assert_eq!(
            eval("Object.keys(theme)"),
            Some(PlainValue::Array(vec![PlainValue::string("color")]))
        );
        assert_eq!(eval("String(12)"), Some(PlainValue::string("12")));
    }

    #[test]
    fn test_oversized_string_builtins_fail() {
        assert!(eval_with("'ab'.repeat(1e19)", &EvaluationOptions::default()).is_failed());
        assert!(eval_with("'ab'.repeat(Infinity)", &EvaluationOptions::default()).is_failed());
        assert!(eval_with("'x'.padStart(1e12)", &EvaluationOptions::default()).is_failed());
        assert!(eval_with("'x'.padEnd(1e12, '-')", &EvaluationOptions::default()).is_failed());
        assert!(eval_with("(1.5).toFixed(1e19)", &EvaluationOptions::default()).is_failed());
        assert!(eval_with("(1.5).toFixed(-1)", &EvaluationOptions::default()).is_failed());
    }

    #[test]
    fn test_bounded_string_builtins() {
        assert_eq!(eval("'ab'.repeat(3)"), Some(PlainValue::string("ababab")));
        assert_eq!(eval("''.repeat(1e19)"), Some(PlainValue::string("")));
        assert_eq!(eval("'7'.padStart(3, '0')"), Some(PlainValue::string("007")));
        assert_eq!(eval("(1.005).toFixed(1)"), Some(PlainValue::string("1.0")));
        assert_eq!(eval("(2).toFixed(100)").and_then(|v| v.as_str().map(str::len)), Some(102));
    }

    #[test]
    fn test_string_length_counts_characters() {
        assert_eq!(eval("'a\u{1F600}b'.length"), Some(PlainValue::Number(3.0)));
        assert_eq!(eval("'a\u{1F600}b'[1]"), Some(PlainValue::string("\u{1F600}")));
        assert_eq!(eval("'a\u{1F600}b'.padStart(4, '-')"), Some(PlainValue::string("-a\u{1F600}b")));
    }

    #[test]
    fn test_member_access_through_hook() {
        assert_eq!(eval("theme.color"), Some(PlainValue::string("red")));
        assert_eq!(eval("theme['color']"), Some(PlainValue::string("red")));
        assert_eq!(eval("theme.missing"), Some(PlainValue::Undefined));
    }

    #[test]
    fn test_objects_and_templates() {
        let value = eval("{ a: 1, ...{ b: `x${known}` }, ['c' + 1]: true }").unwrap();
        assert_eq!(
            value.to_json(),
            serde_json::json!({ "a": 1, "b": "x4", "c1": true })
        );
    }

    #[test]
    fn test_policy_failures() {
        assert_eq!(eval("console.log('x')"), None);
        assert_eq!(eval("process.env.NODE_ENV"), None);
        assert_eq!(eval("require('fs')"), None);
        assert_eq!(eval("unknown"), None);
        assert_eq!(eval("userFunction()"), None);
        assert_eq!(eval("Math.random()"), None);
        assert_eq!(eval("Date.now()"), None);
    }

    #[test]
    fn test_undefined_is_a_success() {
        assert_eq!(
            eval_with("undefined", &EvaluationOptions::default()),
            EvalOutcome::Value(PlainValue::Undefined)
        );
    }

    #[test]
    fn test_op_budget() {
        let options = EvaluationOptions {
            max_ops: Some(3),
            ..EvaluationOptions::default()
        };
        assert!(eval_with("1 + 2 + 3 + 4 + 5", &options).is_failed());
    }

    #[test]
    fn test_deadline() {
        let options = EvaluationOptions {
            max_op_duration: Duration::ZERO,
            ..EvaluationOptions::default()
        };
        assert!(eval_with("1 + 2", &options).is_failed());
    }
}
