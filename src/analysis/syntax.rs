//! Node classification and small readers over the tree-sitter grammar.
//!
//! The evaluator never looks at raw node kinds for wrappers or literals
//! directly; it goes through these helpers so that TypeScript-only syntax
//! (`as`, `satisfies`, `!`) is transparent.

use crate::types::format_number;
use tree_sitter::Node;

/// Kinds that open a new lexical scope for identifier lookup.
pub const SCOPE_KINDS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "function_expression",
    "function",
    "generator_function",
    "arrow_function",
    "method_definition",
    "program",
];

/// Kinds that make up a destructuring pattern.
pub const BINDING_PATTERN_KINDS: &[&str] = &[
    "object_pattern",
    "array_pattern",
    "pair_pattern",
    "object_assignment_pattern",
    "assignment_pattern",
    "shorthand_property_identifier_pattern",
    "rest_pattern",
];

#[inline]
pub fn is_scope(node: &Node<'_>) -> bool {
    SCOPE_KINDS.contains(&node.kind())
}

#[inline]
pub fn is_binding_pattern(node: &Node<'_>) -> bool {
    BINDING_PATTERN_KINDS.contains(&node.kind())
}

/// Smallest enclosing scope, or `None` at the program root.
pub fn enclosing_scope<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    let mut current = node.parent();
    while let Some(candidate) = current {
        if is_scope(&candidate) {
            return Some(candidate);
        }
        current = candidate.parent();
    }
    None
}

/// Strip parentheses, type assertions and non-null assertions.
pub fn unwrap_expression<'t>(node: Node<'t>) -> Node<'t> {
    let mut node = node;
    loop {
        let inner = match node.kind() {
            "parenthesized_expression"
            | "as_expression"
            | "satisfies_expression"
            | "non_null_expression"
            | "jsx_expression" => first_named_child(&node),
            "type_assertion" => last_named_child(&node),
            _ => None,
        };
        match inner {
            Some(inner) => node = inner,
            None => return node,
        }
    }
}

/// Named children, skipping comments.
pub fn named_children<'t>(node: &Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| !child.is_extra())
        .collect()
}

pub fn first_named_child<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    named_children(node).into_iter().next()
}

pub fn last_named_child<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    named_children(node).into_iter().last()
}

/// Operator token of a binary/unary/assignment node.
pub fn operator<'t>(node: &Node<'t>) -> Option<&'static str> {
    node.child_by_field_name("operator").map(|op| op.kind())
}

/// Replace every whitespace run with a single space.
pub fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

/// Decode a quoted string literal (`"..."` or `'...'`).
pub fn decode_string_literal(raw: &str) -> String {
    let inner = raw
        .strip_prefix(['"', '\''])
        .and_then(|s| s.strip_suffix(['"', '\'']))
        .unwrap_or(raw);
    decode_escapes(inner)
}

/// Decode JS escape sequences.
pub fn decode_escapes(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        let Some(esc) = chars.next() else {
            out.push('\\');
            break;
        };
        match esc {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            'b' => out.push('\u{8}'),
            'f' => out.push('\u{c}'),
            'v' => out.push('\u{b}'),
            '0' if !chars.peek().is_some_and(|c| c.is_ascii_digit()) => out.push('\0'),
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(c) => out.push(c),
                    None => {
                        out.push('x');
                        out.push_str(&hex);
                    }
                }
            }
            'u' => {
                let hex: String = if chars.peek() == Some(&'{') {
                    chars.next();
                    chars.by_ref().take_while(|c| *c != '}').collect()
                } else {
                    chars.by_ref().take(4).collect()
                };
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(c) => out.push(c),
                    None => {
                        out.push('u');
                        out.push_str(&hex);
                    }
                }
            }
            // line continuation
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            '\u{2028}' | '\u{2029}' => {}
            other => out.push(other),
        }
    }
    out
}

/// Parse a numeric literal. Bigints are not representable and yield `None`.
pub fn parse_number(raw: &str) -> Option<f64> {
    let text: String = raw.chars().filter(|c| *c != '_').collect();
    if text.ends_with('n') {
        return None;
    }

    let lower = text.to_ascii_lowercase();
    let radix = |digits: &str, radix: u32| u64::from_str_radix(digits, radix).ok().map(|v| v as f64);
    if let Some(hex) = lower.strip_prefix("0x") {
        return radix(hex, 16);
    }
    if let Some(oct) = lower.strip_prefix("0o") {
        return radix(oct, 8);
    }
    if let Some(bin) = lower.strip_prefix("0b") {
        return radix(bin, 2);
    }

    lower.parse::<f64>().ok()
}

/// Static text of a property key (`a`, `"a"`, `1`), or `None` when the key
/// is computed.
pub fn static_property_key(node: &Node<'_>, source: &str) -> Option<String> {
    let text = node.utf8_text(source.as_bytes()).ok()?;
    match node.kind() {
        "property_identifier"
        | "identifier"
        | "private_property_identifier"
        | "shorthand_property_identifier"
        | "shorthand_property_identifier_pattern" => Some(text.to_string()),
        "string" => Some(decode_string_literal(text)),
        "number" => parse_number(text).map(format_number),
        _ => None,
    }
}

/// A piece of a template string.
#[derive(Debug)]
pub enum TemplatePart<'t> {
    Text(String),
    Substitution(Node<'t>),
}

/// Split a `template_string` into decoded text runs and substitutions.
pub fn template_parts<'t>(node: &Node<'t>, source: &str) -> Vec<TemplatePart<'t>> {
    let mut parts = Vec::new();
    let start = node.start_byte() + 1;
    let end = node.end_byte().saturating_sub(1).max(start);
    let mut cursor = start;

    for child in named_children(node) {
        if child.kind() != "template_substitution" {
            continue;
        }
        if child.start_byte() > cursor {
            parts.push(TemplatePart::Text(decode_escapes(&source[cursor..child.start_byte()])));
        }
        if let Some(expr) = first_named_child(&child) {
            parts.push(TemplatePart::Substitution(expr));
        }
        cursor = child.end_byte();
    }

    if end > cursor {
        parts.push(TemplatePart::Text(decode_escapes(&source[cursor..end])));
    }
    parts
}
