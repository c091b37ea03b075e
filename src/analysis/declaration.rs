//! Identifier → declaration lookup.
//!
//! Lookup walks lexical scopes outward from the reference. Each scope is
//! searched in preorder for a binding with the same name; nested scopes that
//! do not contain the reference only contribute their own name. Imports are
//! followed into the target module's exports, through re-export chains.

use super::evaluator::Evaluation;
use super::files::{ModuleLookup, SourceFile};
use super::syntax::{decode_string_literal, enclosing_scope, is_scope, named_children};
use crate::constants::{MAX_REEXPORT_DEPTH, MAX_SCOPE_HOPS};
use crate::error_ext::ResultExt;
use crate::types::{FileId, NodeRef, Provenance};
use compact_str::CompactString;
use rustc_hash::FxHashSet;
use std::sync::Arc;
use tracing::{debug, trace};
use tree_sitter::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    /// `const x = ...`; the declaration node is the declarator.
    Variable,
    /// A parameter with a default value or an inline object type.
    Parameter,
    Function,
    Enum,
    /// Name inside a destructuring pattern; the declaration node is the name.
    Binding,
    /// `import * as ns` or `export * as ns`; the declaration node is the
    /// target module's root.
    Namespace,
    /// `export default <expr>`; the declaration node is the expression.
    DefaultExport,
}

#[derive(Debug, Clone)]
pub struct Declaration {
    pub file: Arc<SourceFile>,
    pub node: NodeRef,
    pub kind: DeclarationKind,
    pub stack: Provenance,
}

#[derive(Debug, Clone)]
pub enum Lookup {
    Found(Declaration),
    /// The name is bound, but to something without a static value (a bare
    /// parameter). The search stops here.
    Unresolvable,
    NotFound,
}

impl Lookup {
    pub fn declaration(&self) -> Option<&Declaration> {
        match self {
            Lookup::Found(decl) => Some(decl),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }
}

/// Result of examining one identifier occurrence.
enum Binding {
    None,
    Found(Declaration),
    Unresolvable,
    NotFound,
}

impl<'e> Evaluation<'e> {
    /// Find the declaration `identifier` refers to.
    pub(crate) fn find_declaration(
        &mut self,
        file: &Arc<SourceFile>,
        identifier: Node<'_>,
        stack: &Provenance,
    ) -> Lookup {
        let name = file.text_of(&identifier).to_string();
        let mut visited = FxHashSet::default();
        let mut current = identifier;

        for _ in 0..MAX_SCOPE_HOPS {
            let Some(scope) = enclosing_scope(&current) else {
                return Lookup::NotFound;
            };
            self.engine.stats().record_scope_walk();

            match self.walk_scope(file, scope, &name, Some(identifier.id()), &mut visited, stack) {
                Binding::Found(decl) => return Lookup::Found(decl),
                Binding::Unresolvable => return Lookup::Unresolvable,
                Binding::NotFound => return Lookup::NotFound,
                Binding::None => {}
            }

            if scope.kind() == "program" {
                break;
            }
            current = scope;
        }

        trace!(name = %name, "No declaration in scope");
        Lookup::NotFound
    }

    /// Preorder search of `scope` for a binding named `name`.
    fn walk_scope(
        &mut self,
        file: &Arc<SourceFile>,
        scope: Node<'_>,
        name: &str,
        exclude: Option<usize>,
        visited: &mut FxHashSet<usize>,
        stack: &Provenance,
    ) -> Binding {
        let mut pending = vec![scope];

        while let Some(node) = pending.pop() {
            if !visited.insert(node.id()) {
                continue;
            }

            if node.id() != scope.id() && is_scope(&node) {
                if let Some(own_name) = node.child_by_field_name("name") {
                    if file.text_of(&own_name) == name {
                        let found = self.classify(file, own_name, stack);
                        if !matches!(found, Binding::None) {
                            return found;
                        }
                    }
                }
                continue;
            }

            let is_candidate = matches!(
                node.kind(),
                "identifier" | "shorthand_property_identifier_pattern" | "type_identifier"
            ) && Some(node.id()) != exclude
                && file.text_of(&node) == name;

            if is_candidate {
                let found = self.classify(file, node, stack);
                if !matches!(found, Binding::None) {
                    return found;
                }
            }

            let mut children = named_children(&node);
            children.reverse();
            pending.extend(children);
        }

        Binding::None
    }

    /// Decide whether an identifier occurrence is a binding, and of what.
    fn classify(&mut self, file: &Arc<SourceFile>, node: Node<'_>, stack: &Provenance) -> Binding {
        let Some(parent) = node.parent() else {
            return Binding::None;
        };
        let is_field = |field: &str| parent.child_by_field_name(field).map(|n| n.id()) == Some(node.id());
        let found = |decl: Node<'_>, kind: DeclarationKind| {
            Binding::Found(Declaration {
                file: Arc::clone(file),
                node: file.node_ref(&decl),
                kind,
                stack: stack.push(file.node_ref(&node)).push(file.node_ref(&parent)),
            })
        };

        match parent.kind() {
            "variable_declarator" if is_field("name") => found(parent, DeclarationKind::Variable),
            "required_parameter" | "optional_parameter" if is_field("pattern") => {
                if parameter_is_resolvable(&parent) {
                    found(parent, DeclarationKind::Parameter)
                } else {
                    Binding::Unresolvable
                }
            }
            "formal_parameters" => Binding::Unresolvable,
            "arrow_function" if is_field("parameter") => Binding::Unresolvable,
            "assignment_pattern" if is_field("left") => {
                let in_parameters = parent
                    .parent()
                    .is_some_and(|grand| grand.kind() == "formal_parameters");
                if in_parameters {
                    found(parent, DeclarationKind::Parameter)
                } else {
                    found(node, DeclarationKind::Binding)
                }
            }
            "function_declaration"
            | "generator_function_declaration"
            | "function_expression"
            | "function"
            | "class_declaration"
            | "class"
                if is_field("name") =>
            {
                found(parent, DeclarationKind::Function)
            }
            "enum_declaration" if is_field("name") => found(parent, DeclarationKind::Enum),
            "object_pattern" | "array_pattern" | "rest_pattern" => found(node, DeclarationKind::Binding),
            "pair_pattern" if is_field("value") => found(node, DeclarationKind::Binding),
            "object_assignment_pattern" if is_field("left") => found(node, DeclarationKind::Binding),
            "import_specifier" => {
                let local = parent.child_by_field_name("alias").or_else(|| parent.child_by_field_name("name"));
                if local.map(|n| n.id()) != Some(node.id()) {
                    return Binding::None;
                }
                let Some(remote) = parent.child_by_field_name("name") else {
                    return Binding::None;
                };
                let remote = decode_string_literal(file.text_of(&remote));
                self.resolve_import(file, parent, ImportTarget::Named(&remote), stack)
            }
            "import_clause" => self.resolve_import(file, parent, ImportTarget::Named("default"), stack),
            "namespace_import" => self.resolve_import(file, parent, ImportTarget::Namespace, stack),
            _ => Binding::None,
        }
    }

    // =========================================================================
    // Imports & exports
    // =========================================================================

    fn resolve_import(
        &mut self,
        file: &Arc<SourceFile>,
        binding: Node<'_>,
        target: ImportTarget<'_>,
        stack: &Provenance,
    ) -> Binding {
        if self.ctx.flags.skip_cross_file_traversal {
            return Binding::NotFound;
        }

        let mut statement = binding;
        while statement.kind() != "import_statement" {
            match statement.parent() {
                Some(parent) => statement = parent,
                None => return Binding::NotFound,
            }
        }
        let Some(source) = statement.child_by_field_name("source") else {
            return Binding::NotFound;
        };
        let specifier = decode_string_literal(file.text_of(&source));
        let stack = stack.push(file.node_ref(&binding)).push(file.node_ref(&statement));

        let Some(module) = self.load_module(file, &specifier) else {
            return Binding::NotFound;
        };

        match target {
            ImportTarget::Namespace => Binding::Found(namespace_declaration(&module, &stack)),
            ImportTarget::Named(name) => {
                let mut visited = FxHashSet::default();
                match self.find_export(&module, name, &stack, 0, &mut visited) {
                    Some(decl) => Binding::Found(decl),
                    None => {
                        debug!(name, specifier = %specifier, "Export not found in module");
                        Binding::NotFound
                    }
                }
            }
        }
    }

    fn load_module(&self, from: &SourceFile, specifier: &str) -> Option<Arc<SourceFile>> {
        match self.engine.files().resolve_module(from, specifier) {
            ModuleLookup::Loaded(module) => Some(module),
            ModuleLookup::NotFound => {
                trace!(specifier, "Module not resolvable");
                None
            }
            ModuleLookup::LoadFailed(e) => Err::<Arc<SourceFile>, _>(e).ok_warn("load imported module"),
        }
    }

    /// Find the declaration behind export `name` of `module`.
    pub(crate) fn find_export(
        &mut self,
        module: &Arc<SourceFile>,
        name: &str,
        stack: &Provenance,
        depth: usize,
        visited: &mut FxHashSet<(FileId, CompactString)>,
    ) -> Option<Declaration> {
        if depth > MAX_REEXPORT_DEPTH {
            debug!(name, path = %module.path.display(), "Re-export chain too deep");
            return None;
        }
        if !visited.insert((module.id, CompactString::from(name))) {
            return None;
        }

        let root = module.root();
        let statements = named_children(&root);

        // export const / export function / export enum
        for statement in statements.iter().filter(|s| s.kind() == "export_statement") {
            let declaration = statement
                .child_by_field_name("declaration")
                .and_then(|d| top_level_binding(module, d, name, stack));
            if declaration.is_some() {
                return declaration;
            }
        }

        for statement in statements.iter().filter(|s| s.kind() == "export_statement") {
            let stack = stack.push(module.node_ref(statement));
            let source = statement.child_by_field_name("source");

            if name == "default" && source.is_none() && has_default_keyword(statement) {
                if let Some(value) = statement.child_by_field_name("value") {
                    return Some(Declaration {
                        file: Arc::clone(module),
                        node: module.node_ref(&value),
                        kind: DeclarationKind::DefaultExport,
                        stack,
                    });
                }
                if let Some(decl) = statement.child_by_field_name("declaration") {
                    return Some(Declaration {
                        file: Arc::clone(module),
                        node: module.node_ref(&decl),
                        kind: DeclarationKind::Function,
                        stack,
                    });
                }
            }

            let clause = named_children(statement)
                .into_iter()
                .find(|c| c.kind() == "export_clause");

            match (source, clause) {
                // export { local as name }
                (None, Some(clause)) => {
                    let Some(local) = exported_local_name(module, &clause, name) else {
                        continue;
                    };
                    let mut scope_visited = FxHashSet::default();
                    match self.walk_scope(module, root, &local, None, &mut scope_visited, &stack) {
                        Binding::Found(decl) => return Some(decl),
                        _ => continue,
                    }
                }
                // export { remote as name } from './x'
                (Some(source), Some(clause)) => {
                    let Some(remote) = exported_local_name(module, &clause, name) else {
                        continue;
                    };
                    let specifier = decode_string_literal(module.text_of(&source));
                    let target = self.load_module(module, &specifier)?;
                    // The list claims the name, so no other statement may provide it
                    return self.find_export(&target, &remote, &stack, depth + 1, visited);
                }
                // export * from './x' / export * as ns from './x'
                (Some(source), None) => {
                    let namespace = named_children(statement)
                        .into_iter()
                        .find(|c| c.kind() == "namespace_export");
                    let specifier = decode_string_literal(module.text_of(&source));

                    if let Some(namespace) = namespace {
                        let alias = named_children(&namespace).into_iter().last();
                        if alias.is_some_and(|a| decode_string_literal(module.text_of(&a)) == name) {
                            let target = self.load_module(module, &specifier)?;
                            return Some(namespace_declaration(&target, &stack));
                        }
                        continue;
                    }

                    let Some(target) = self.load_module(module, &specifier) else {
                        continue;
                    };
                    if let Some(decl) = self.find_export(&target, name, &stack, depth + 1, visited) {
                        return Some(decl);
                    }
                }
                (None, None) => {}
            }
        }

        None
    }
}

enum ImportTarget<'n> {
    Named(&'n str),
    Namespace,
}

fn namespace_declaration(module: &Arc<SourceFile>, stack: &Provenance) -> Declaration {
    let root = module.root();
    Declaration {
        file: Arc::clone(module),
        node: module.node_ref(&root),
        kind: DeclarationKind::Namespace,
        stack: stack.push(module.node_ref(&root)),
    }
}

/// Declarations with a default value or an inline object type can be given
/// a value; anything else is a runtime input.
fn parameter_is_resolvable(parameter: &Node<'_>) -> bool {
    if parameter.child_by_field_name("value").is_some() {
        return true;
    }
    parameter
        .child_by_field_name("type")
        .and_then(|annotation| named_children(&annotation).into_iter().next())
        .is_some_and(|ty| ty.kind() == "object_type")
}

/// A top-level declaration statement binding `name`.
fn top_level_binding(
    module: &Arc<SourceFile>,
    statement: Node<'_>,
    name: &str,
    stack: &Provenance,
) -> Option<Declaration> {
    let declaration = |node: Node<'_>, kind: DeclarationKind| Declaration {
        file: Arc::clone(module),
        node: module.node_ref(&node),
        kind,
        stack: stack.push(module.node_ref(&statement)).push(module.node_ref(&node)),
    };
    let named = |node: &Node<'_>| {
        node.child_by_field_name("name")
            .is_some_and(|n| module.text_of(&n) == name)
    };

    match statement.kind() {
        "lexical_declaration" | "variable_declaration" => {
            for declarator in named_children(&statement) {
                if declarator.kind() != "variable_declarator" {
                    continue;
                }
                let Some(target) = declarator.child_by_field_name("name") else {
                    continue;
                };
                if target.kind() == "identifier" {
                    if module.text_of(&target) == name {
                        return Some(declaration(declarator, DeclarationKind::Variable));
                    }
                } else if let Some(binding) = find_pattern_binding(module, target, name) {
                    return Some(declaration(binding, DeclarationKind::Binding));
                }
            }
            None
        }
        "enum_declaration" if named(&statement) => Some(declaration(statement, DeclarationKind::Enum)),
        "function_declaration" | "generator_function_declaration" | "class_declaration"
            if named(&statement) =>
        {
            Some(declaration(statement, DeclarationKind::Function))
        }
        _ => None,
    }
}

/// Binding identifier named `name` inside a destructuring pattern.
fn find_pattern_binding<'t>(module: &SourceFile, pattern: Node<'t>, name: &str) -> Option<Node<'t>> {
    let mut pending = vec![pattern];
    while let Some(node) = pending.pop() {
        let is_binding = match node.kind() {
            "shorthand_property_identifier_pattern" => true,
            "identifier" => node.parent().is_some_and(|p| {
                let value_side = p
                    .child_by_field_name("value")
                    .or_else(|| p.child_by_field_name("left"))
                    .map(|n| n.id());
                match p.kind() {
                    "pair_pattern" | "object_assignment_pattern" | "assignment_pattern" => {
                        value_side == Some(node.id())
                    }
                    _ => true,
                }
            }),
            _ => false,
        };
        if is_binding && module.text_of(&node) == name {
            return Some(node);
        }
        pending.extend(named_children(&node));
    }
    None
}

/// For `export { a as b }` clauses: the local name exported as `name`.
fn exported_local_name(module: &SourceFile, clause: &Node<'_>, name: &str) -> Option<String> {
    named_children(clause)
        .into_iter()
        .filter(|s| s.kind() == "export_specifier")
        .find_map(|specifier| {
            let local = specifier.child_by_field_name("name")?;
            let exported = specifier.child_by_field_name("alias").unwrap_or(local);
            (decode_string_literal(module.text_of(&exported)) == name)
                .then(|| decode_string_literal(module.text_of(&local)))
        })
}

fn has_default_keyword(statement: &Node<'_>) -> bool {
    let mut cursor = statement.walk();
    let found = statement
        .children(&mut cursor)
        .any(|child| child.kind() == "default");
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::evaluator::{EvalContext, EvalFlags, Engine};
    use crate::analysis::files::FileTable;
    use tempfile::TempDir;

    /// Find the `nth` identifier with text `name` in `file`.
    fn identifier<'t>(file: &'t SourceFile, name: &str, nth: usize) -> Node<'t> {
        let mut found = Vec::new();
        let mut pending = vec![file.root()];
        while let Some(node) = pending.pop() {
            if matches!(node.kind(), "identifier" | "shorthand_property_identifier")
                && file.text_of(&node) == name
            {
                found.push(node);
            }
            let mut children = named_children(&node);
            children.reverse();
            pending.extend(children);
        }
        found.sort_by_key(|n| n.start_byte());
        found[nth]
    }

    fn lookup(engine: &Engine, file: &Arc<SourceFile>, name: &str, nth: usize) -> Lookup {
        engine.find_declaration(file, identifier(file, name, nth), &EvalContext::default())
    }

    fn single(source: &str) -> (Engine, Arc<SourceFile>) {
        let files = Arc::new(FileTable::default());
        let file = files.add_source("/mem/a.tsx", source).unwrap();
        (Engine::new(files), file)
    }

    #[test]
    fn test_finds_variable_in_enclosing_scope() {
        let (engine, file) = single("const color = 'red'\nfunction f() { return color }");
        let lookup = lookup(&engine, &file, "color", 1);
        let decl = lookup.declaration().unwrap();
        assert_eq!(decl.kind, DeclarationKind::Variable);
        assert_eq!(decl.node.kind, "variable_declarator");
        assert_eq!(engine.stats().scope_walks(), 2);
    }

    #[test]
    fn test_inner_shadowing_wins() {
        let (engine, file) = single("const c = 'outer'\nfunction f() { const c = 'inner'; return c }");
        let lookup = lookup(&engine, &file, "c", 2);
        let decl = lookup.declaration().unwrap();
        assert_eq!(decl.node.line, 2);
    }

    #[test]
    fn test_unrelated_nested_scope_is_not_searched() {
        let (engine, file) = single("const g = (size) => size\nconst size = 'lg'\nconst use = size");
        let lookup = lookup(&engine, &file, "size", 3);
        assert_eq!(lookup.declaration().unwrap().node.line, 2);
    }

    #[test]
    fn test_bare_parameter_is_unresolvable_after_one_walk() {
        let (engine, file) = single("function f(p) { return p }");
        let lookup = lookup(&engine, &file, "p", 1);
        assert!(matches!(lookup, Lookup::Unresolvable));
        assert_eq!(engine.stats().scope_walks(), 1);
    }

    #[test]
    fn test_parameter_with_default_or_object_type() {
        let (engine, file) = single("function f(p = 'sm') { return p }");
        assert_eq!(
            lookup(&engine, &file, "p", 1).declaration().unwrap().kind,
            DeclarationKind::Parameter
        );

        let (engine, file) = single("function f(p: { readonly size: 'sm' }) { return p }");
        assert_eq!(
            lookup(&engine, &file, "p", 1).declaration().unwrap().kind,
            DeclarationKind::Parameter
        );

        let (engine, file) = single("function f(p: string) { return p }");
        assert!(matches!(lookup(&engine, &file, "p", 1), Lookup::Unresolvable));
    }

    #[test]
    fn test_destructured_binding() {
        let (engine, file) = single("function f({ size = 'sm', tone: t }) { return [size, t] }");
        let size = lookup(&engine, &file, "size", 0);
        assert_eq!(size.declaration().unwrap().kind, DeclarationKind::Binding);
        let t = lookup(&engine, &file, "t", 1);
        assert_eq!(t.declaration().unwrap().kind, DeclarationKind::Binding);
    }

    #[test]
    fn test_enum_and_function() {
        let (engine, file) = single("enum Size { Sm, Lg }\nfunction make() {}\nconst a = [Size, make]");
        assert_eq!(lookup(&engine, &file, "Size", 1).declaration().unwrap().kind, DeclarationKind::Enum);
        assert_eq!(
            lookup(&engine, &file, "make", 1).declaration().unwrap().kind,
            DeclarationKind::Function
        );
    }

    #[test]
    fn test_global_is_not_found() {
        let (engine, file) = single("const a = window");
        assert!(matches!(lookup(&engine, &file, "window", 0), Lookup::NotFound));
    }

    fn project(files: &[(&str, &str)]) -> (TempDir, Engine, Arc<SourceFile>) {
        let dir = TempDir::new().unwrap();
        for (name, text) in files {
            std::fs::write(dir.path().join(name), text).unwrap();
        }
        let table = Arc::new(FileTable::new(Some(dir.path().to_path_buf())));
        let entry = table.load(dir.path().join(files[0].0)).unwrap();
        (dir, Engine::new(table), entry)
    }

    #[test]
    fn test_named_and_aliased_imports() {
        let (_dir, engine, entry) = project(&[
            ("app.ts", "import { color, size as s } from './tokens'\nconst a = [color, s]"),
            ("tokens.ts", "export const color = 'red'\nconst size = 'lg'\nexport { size }"),
        ]);

        let color = lookup(&engine, &entry, "color", 1);
        let decl = color.declaration().unwrap();
        assert_eq!(decl.kind, DeclarationKind::Variable);
        assert!(decl.file.path.ends_with("tokens.ts"));

        let size = lookup(&engine, &entry, "s", 1);
        assert_eq!(size.declaration().unwrap().kind, DeclarationKind::Variable);
    }

    #[test]
    fn test_default_and_namespace_imports() {
        let (_dir, engine, entry) = project(&[
            ("app.ts", "import theme from './theme'\nimport * as all from './theme'\nconst a = [theme, all]"),
            ("theme.ts", "export default { color: 'red' }"),
        ]);

        let theme = lookup(&engine, &entry, "theme", 1);
        assert_eq!(theme.declaration().unwrap().kind, DeclarationKind::DefaultExport);

        let all = lookup(&engine, &entry, "all", 1);
        assert_eq!(all.declaration().unwrap().kind, DeclarationKind::Namespace);
    }

    #[test]
    fn test_reexport_chains() {
        let (_dir, engine, entry) = project(&[
            ("app.ts", "import { color, other } from './index'\nconst a = [color, other]"),
            ("index.ts", "export * from './tokens'\nexport { missing as other } from './tokens'"),
            ("tokens.ts", "export const color = 'red'"),
        ]);

        assert!(lookup(&engine, &entry, "color", 1).is_found());
        assert!(matches!(lookup(&engine, &entry, "other", 1), Lookup::NotFound));
    }

    #[test]
    fn test_barrel_that_omits_symbol() {
        let (_dir, engine, entry) = project(&[
            ("app.ts", "import { color } from './index'\nconst a = color"),
            ("index.ts", "export { size } from './tokens'"),
            ("tokens.ts", "export const color = 'red'\nexport const size = 'lg'"),
        ]);

        assert!(matches!(lookup(&engine, &entry, "color", 1), Lookup::NotFound));
    }

    #[test]
    fn test_cyclic_reexports_terminate() {
        let (_dir, engine, entry) = project(&[
            ("app.ts", "import { color } from './a'\nconst x = color"),
            ("a.ts", "export * from './b'"),
            ("b.ts", "export * from './a'"),
        ]);

        assert!(matches!(lookup(&engine, &entry, "color", 1), Lookup::NotFound));
    }

    #[test]
    fn test_skip_cross_file_traversal() {
        let (_dir, engine, entry) = project(&[
            ("app.ts", "import { color } from './tokens'\nconst a = color"),
            ("tokens.ts", "export const color = 'red'"),
        ]);
        let ctx = EvalContext::default().with_flags(EvalFlags {
            skip_cross_file_traversal: true,
            ..EvalFlags::default()
        });
        let found = engine.find_declaration(&entry, identifier(&entry, "color", 1), &ctx);
        assert!(matches!(found, Lookup::NotFound));
    }
}
