//! Module Resolution for Cross-File Value Lookup
//!
//! Resolves import specifiers (e.g. `"./tokens"`) to source file paths so the
//! declaration resolver can follow an identifier into the module it was
//! imported from.
//!
//! ## Supported Import Patterns
//!
//! - `./relative/path` - Relative to current file
//! - `../parent/path` - Parent directory traversal
//!
//! ## NOT Supported (returns None)
//!
//! - Absolute paths (`/absolute/path`)
//! - Package imports (`lodash`, `@scope/pkg`)
//! - tsconfig `paths` mappings

use crate::constants::SOURCE_EXTENSIONS;
use std::path::{Component, Path, PathBuf};

/// Resolves relative module specifiers to file paths.
///
/// Existence is checked through a caller-supplied predicate so files that
/// were registered in memory resolve the same way as files on disk.
#[derive(Debug, Clone, Default)]
pub struct ModuleResolver {
    /// Resolution never leaves this directory when set.
    root: Option<PathBuf>,
}

impl ModuleResolver {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self {
            root: root.map(|r| normalize_path(&r)),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Resolve `specifier` as imported from `from_path`.
    ///
    /// Resolution order:
    /// 1. Path as-is
    /// 2. Path + each source extension (appended, so `a.config` -> `a.config.ts`)
    /// 3. `<path>/index.<ext>`
    pub fn resolve(
        &self,
        specifier: &str,
        from_path: &Path,
        exists: impl Fn(&Path) -> bool,
    ) -> Option<PathBuf> {
        if !Self::is_relative_import(specifier) {
            return None;
        }

        let from_dir = from_path.parent()?;
        let normalized = normalize_path(&from_dir.join(specifier));

        if let Some(root) = &self.root {
            if !normalized.starts_with(root) {
                return None;
            }
        }

        if exists(&normalized) {
            return Some(normalized);
        }

        let base = normalized.to_string_lossy();
        for ext in SOURCE_EXTENSIONS {
            let with_ext = PathBuf::from(format!("{}.{}", base, ext));
            if exists(&with_ext) {
                return Some(with_ext);
            }
        }

        SOURCE_EXTENSIONS
            .iter()
            .map(|ext| normalized.join(format!("index.{}", ext)))
            .find(|index| exists(index))
    }

    /// Returns `true` for specifiers starting with "./" or "../".
    #[inline]
    pub fn is_relative_import(specifier: &str) -> bool {
        specifier.starts_with("./") || specifier.starts_with("../")
    }
}

/// Normalize a path by resolving `.` and `..` components.
///
/// Unlike `canonicalize()`, this doesn't require the path to exist
/// and doesn't resolve symlinks.
pub(crate) fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();

    for component in path.components() {
        match component {
            Component::ParentDir => {
                components.pop();
            }
            Component::CurDir => {}
            _ => components.push(component),
        }
    }

    components.iter().collect()
}
