//! Loaded source files and the table that owns them.
//!
//! Every file gets a [`FileId`] when it is first parsed. Together with the
//! tree-sitter node id this forms the [`NodeKey`] identity that all engine
//! caches are keyed by, so a file is parsed at most once per table.

use super::dialect::Dialect;
use super::module_resolver::{normalize_path, ModuleResolver};
use crate::error::{ExtractError, Result};
use crate::types::{FileId, NodeKey, NodeRef};
use compact_str::CompactString;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, error};
use tree_sitter::{Node, Parser, Tree};

/// Reusable parsers, one free list per dialect.
#[derive(Default)]
pub struct ParserPool {
    parsers: FxHashMap<Dialect, Vec<Parser>>,
}

impl ParserPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&mut self, dialect: Dialect) -> Option<Parser> {
        if let Some(parser) = self.parsers.get_mut(&dialect).and_then(Vec::pop) {
            return Some(parser);
        }

        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&dialect.grammar()) {
            error!(dialect = dialect.id(), error = %e, "Failed to set parser language");
            return None;
        }
        Some(parser)
    }

    pub fn release(&mut self, dialect: Dialect, mut parser: Parser) {
        parser.reset();
        self.parsers.entry(dialect).or_default().push(parser);
    }
}

/// A parsed source file.
pub struct SourceFile {
    pub id: FileId,
    pub path: PathBuf,
    pub dialect: Dialect,
    pub text: String,
    pub tree: Tree,
}

impl SourceFile {
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    pub fn text_of(&self, node: &Node<'_>) -> &str {
        node.utf8_text(self.text.as_bytes()).unwrap_or("")
    }

    pub fn node_ref(&self, node: &Node<'_>) -> NodeRef {
        let start = node.start_position();
        NodeRef {
            key: self.key_of(node),
            kind: node.kind(),
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            line: start.row as u32 + 1,
            column: start.column as u32 + 1,
        }
    }

    #[inline]
    pub fn key_of(&self, node: &Node<'_>) -> NodeKey {
        NodeKey {
            file: self.id,
            id: node.id(),
        }
    }

    /// Find the live node a [`NodeRef`] was taken from.
    pub fn locate(&self, node_ref: &NodeRef) -> Option<Node<'_>> {
        if node_ref.key.file != self.id {
            return None;
        }

        let mut node = self
            .root()
            .descendant_for_byte_range(node_ref.start_byte, node_ref.end_byte)?;
        loop {
            if node.id() == node_ref.key.id {
                return Some(node);
            }
            if node.start_byte() < node_ref.start_byte || node.end_byte() > node_ref.end_byte {
                return None;
            }
            node = node.parent()?;
        }
    }
}

impl std::fmt::Debug for SourceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceFile")
            .field("id", &self.id)
            .field("path", &self.path)
            .field("dialect", &self.dialect)
            .finish()
    }
}

/// Outcome of following an import specifier to another file.
#[derive(Debug)]
pub enum ModuleLookup {
    Loaded(Arc<SourceFile>),
    /// The specifier does not resolve to a file (package import, missing file).
    NotFound,
    /// The file exists but could not be read or parsed.
    LoadFailed(ExtractError),
}

/// Path → parsed file table, loaded on demand.
pub struct FileTable {
    by_path: DashMap<PathBuf, Arc<SourceFile>>,
    by_id: DashMap<FileId, Arc<SourceFile>>,
    next_id: AtomicU32,
    parsers: Mutex<ParserPool>,
    resolver: ModuleResolver,
    /// Memoized (importing file, specifier) → resolved path
    resolutions: DashMap<(FileId, CompactString), Option<PathBuf>>,
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new(None)
    }
}

impl FileTable {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            by_path: DashMap::new(),
            by_id: DashMap::new(),
            next_id: AtomicU32::new(1),
            parsers: Mutex::new(ParserPool::new()),
            resolver: ModuleResolver::new(root),
            resolutions: DashMap::new(),
        }
    }

    pub fn resolver(&self) -> &ModuleResolver {
        &self.resolver
    }

    /// Register a file from an in-memory source, replacing any previous
    /// entry for the same path.
    pub fn add_source(&self, path: impl AsRef<Path>, text: impl Into<String>) -> Result<Arc<SourceFile>> {
        let path = absolute(path.as_ref());
        let file = self.parse(&path, text.into())?;
        self.by_path.insert(path, Arc::clone(&file));
        Ok(file)
    }

    /// Return the already-loaded file for `path`, reading and parsing it
    /// from disk on first use.
    ///
    /// The first load of a path runs under its map entry, so concurrent
    /// callers all observe the same `FileId`.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<Arc<SourceFile>> {
        let path = absolute(path.as_ref());
        if let Some(file) = self.by_path.get(&path) {
            return Ok(Arc::clone(file.value()));
        }

        match self.by_path.entry(path) {
            Entry::Occupied(hit) => Ok(Arc::clone(hit.get())),
            Entry::Vacant(slot) => {
                let text = std::fs::read_to_string(slot.key()).map_err(|e| ExtractError::io(slot.key(), e))?;
                let file = self.parse(slot.key(), text)?;
                slot.insert(Arc::clone(&file));
                Ok(file)
            }
        }
    }

    /// Parse `text` under a fresh id and index it by id.
    fn parse(&self, path: &Path, text: String) -> Result<Arc<SourceFile>> {
        let dialect = Dialect::from_path(path)
            .ok_or_else(|| ExtractError::UnsupportedFile { path: path.to_path_buf() })?;

        let tree = {
            let mut pool = self.parsers.lock();
            let mut parser = pool
                .acquire(dialect)
                .ok_or_else(|| ExtractError::Parse { path: path.to_path_buf() })?;
            let tree = parser.parse(&text, None);
            pool.release(dialect, parser);
            tree
        }
        .ok_or_else(|| ExtractError::Parse { path: path.to_path_buf() })?;

        let raw_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = FileId::new(raw_id).ok_or_else(|| ExtractError::Parse { path: path.to_path_buf() })?;

        let file = Arc::new(SourceFile {
            id,
            path: path.to_path_buf(),
            dialect,
            text,
            tree,
        });

        debug!(path = %path.display(), file_id = raw_id, dialect = dialect.id(), "Parsed source file");
        self.by_id.insert(id, Arc::clone(&file));
        Ok(file)
    }

    pub fn get(&self, id: FileId) -> Option<Arc<SourceFile>> {
        self.by_id.get(&id).map(|f| Arc::clone(f.value()))
    }

    pub fn get_by_path(&self, path: impl AsRef<Path>) -> Option<Arc<SourceFile>> {
        self.by_path
            .get(&absolute(path.as_ref()))
            .map(|f| Arc::clone(f.value()))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Follow `specifier` as imported from `from`.
    pub fn resolve_module(&self, from: &SourceFile, specifier: &str) -> ModuleLookup {
        let key = (from.id, CompactString::from(specifier));
        let cached = self.resolutions.get(&key).map(|hit| hit.value().clone());
        let resolved = match cached {
            Some(hit) => hit,
            None => {
                let resolved = self.resolver.resolve(specifier, &from.path, |candidate| {
                    self.by_path.contains_key(candidate) || candidate.is_file()
                });
                self.resolutions.insert(key, resolved.clone());
                resolved
            }
        };

        match resolved {
            None => ModuleLookup::NotFound,
            Some(path) => match self.load(&path) {
                Ok(file) => ModuleLookup::Loaded(file),
                Err(e) => ModuleLookup::LoadFailed(e),
            },
        }
    }
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return normalize_path(path);
    }
    match std::env::current_dir() {
        Ok(cwd) => normalize_path(&cwd.join(path)),
        Err(_) => normalize_path(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_add_source_assigns_distinct_ids() {
        let table = FileTable::default();
        let a = table.add_source("/mem/a.ts", "const a = 1").unwrap();
        let b = table.add_source("/mem/b.tsx", "const b = <div />").unwrap();

        assert_ne!(a.id, b.id);
        assert_eq!(b.dialect, Dialect::Tsx);
        assert_eq!(table.len(), 2);
        assert!(table.get(a.id).is_some());
    }

    #[test]
    fn test_unsupported_extension() {
        let table = FileTable::default();
        let err = table.add_source("/mem/a.py", "x = 1").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFile { .. }));
    }

    #[test]
    fn test_locate_round_trips_node_ref() {
        let table = FileTable::default();
        let file = table.add_source("/mem/a.ts", "const a = (1 + 2)").unwrap();
        let root = file.root();
        let declarator = root
            .named_child(0)
            .and_then(|decl| decl.named_child(0))
            .unwrap();
        let value = declarator.child_by_field_name("value").unwrap();
        let inner = value.named_child(0).unwrap();

        for node in [declarator, value, inner] {
            let node_ref = file.node_ref(&node);
            let located = file.locate(&node_ref).unwrap();
            assert_eq!(located.id(), node.id());
            assert_eq!(located.kind(), node.kind());
        }
    }

    #[test]
    fn test_node_ref_positions_are_one_based() {
        let table = FileTable::default();
        let file = table.add_source("/mem/a.ts", "\n  foo").unwrap();
        let ident = file.root().descendant_for_byte_range(3, 6).unwrap();
        let node_ref = file.node_ref(&ident);
        assert_eq!((node_ref.line, node_ref.column), (2, 3));
    }

    #[test]
    fn test_load_is_memoized() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tokens.ts");
        fs::write(&path, "export const a = 1").unwrap();

        let table = FileTable::default();
        let first = table.load(&path).unwrap();
        let second = table.load(&path).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_concurrent_loads_share_one_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("shared.ts");
        fs::write(&path, "export const a = 1").unwrap();

        for _ in 0..20 {
            let table = FileTable::default();
            let ids: Vec<FileId> = std::thread::scope(|scope| {
                let handles: Vec<_> = (0..8)
                    .map(|_| scope.spawn(|| table.load(&path).unwrap().id))
                    .collect();
                handles.into_iter().map(|h| h.join().unwrap()).collect()
            });
            assert!(ids.iter().all(|id| *id == ids[0]));
            assert_eq!(table.len(), 1);
        }
    }

    #[test]
    fn test_resolve_module_lookup_kinds() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("ok.ts"), "export const a = 1").unwrap();

        let table = FileTable::new(Some(temp.path().to_path_buf()));
        let main = table
            .add_source(temp.path().join("main.ts"), "import { a } from './ok'")
            .unwrap();

        assert!(matches!(table.resolve_module(&main, "./ok"), ModuleLookup::Loaded(_)));
        assert!(matches!(table.resolve_module(&main, "./missing"), ModuleLookup::NotFound));
        assert!(matches!(table.resolve_module(&main, "react"), ModuleLookup::NotFound));
    }

    #[test]
    fn test_resolve_module_sees_in_memory_files() {
        let table = FileTable::default();
        table.add_source("/mem/theme.ts", "export const t = 1").unwrap();
        let main = table.add_source("/mem/main.ts", "").unwrap();

        match table.resolve_module(&main, "./theme") {
            ModuleLookup::Loaded(file) => assert_eq!(file.path, PathBuf::from("/mem/theme.ts")),
            other => panic!("expected loaded module, got {:?}", other),
        }
    }
}
