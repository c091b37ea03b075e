#![allow(dead_code)]

use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tree_sitter::Node;
use tsx_extract::analysis::{BoxNode, SourceFile};
use tsx_extract::{Engine, EvalContext, FileTable, Provenance};

/// A throwaway project on disk with an engine rooted at it.
pub struct TestProject {
    pub dir: TempDir,
    pub engine: Engine,
}

impl TestProject {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let dir = TempDir::new().unwrap();
        for (name, text) in files {
            let path = dir.path().join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(path, text).unwrap();
        }
        let table = Arc::new(FileTable::new(Some(dir.path().to_path_buf())));
        Self {
            dir,
            engine: Engine::new(table),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn file(&self, name: &str) -> Arc<SourceFile> {
        self.engine.files().load(self.path(name)).unwrap()
    }

    /// Evaluate the initializer of `const <var> = ...` in `file`.
    pub fn value_of(&self, file: &str, var: &str) -> Option<BoxNode> {
        self.value_with(file, var, &EvalContext::default())
    }

    pub fn value_with(&self, file: &str, var: &str, ctx: &EvalContext) -> Option<BoxNode> {
        let source = self.file(file);
        let init = initializer(&source, var)?;
        self.engine.evaluate(&source, init, &Provenance::new(), ctx)
    }

    pub fn unbox_var(&self, file: &str, var: &str) -> Value {
        let value = self.value_of(file, var).unwrap();
        self.engine.unbox(&value).to_json()
    }
}

/// Engine over a single in-memory file.
pub fn single(source: &str) -> (Engine, Arc<SourceFile>) {
    let files = Arc::new(FileTable::default());
    let file = files.add_source("/mem/app.tsx", source).unwrap();
    (Engine::new(files), file)
}

pub fn initializer<'t>(file: &'t SourceFile, var: &str) -> Option<Node<'t>> {
    let mut pending = vec![file.root()];
    while let Some(node) = pending.pop() {
        if node.kind() == "variable_declarator" {
            let name = node.child_by_field_name("name")?;
            if file.text_of(&name) == var {
                return node.child_by_field_name("value");
            }
        }
        let mut cursor = node.walk();
        pending.extend(node.named_children(&mut cursor));
    }
    None
}

/// The `nth` node of `kind` in document order.
pub fn nth_of_kind<'t>(file: &'t SourceFile, kind: &str, nth: usize) -> Node<'t> {
    let mut found = Vec::new();
    let mut pending = vec![file.root()];
    while let Some(node) = pending.pop() {
        if node.kind() == kind {
            found.push(node);
        }
        let mut cursor = node.walk();
        pending.extend(node.named_children(&mut cursor));
    }
    found.sort_by_key(|n| n.start_byte());
    found[nth]
}
