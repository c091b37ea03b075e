//! Constants used throughout the codebase.
//!
//! Centralizing magic numbers improves maintainability and discoverability.

/// Maximum number of enclosing scopes searched for a declaration before
/// giving up.
pub const MAX_SCOPE_HOPS: usize = 100;

/// Maximum depth for following `export ... from` chains across modules.
pub const MAX_REEXPORT_DEPTH: usize = 10;

/// Default wall-clock budget for a single sandbox evaluation (milliseconds).
pub const DEFAULT_MAX_OP_DURATION_MS: u64 = 1000;

/// Object keys whose presence marks a map as a variant recipe.
pub const RECIPE_KEYS: [&str; 4] = ["compoundVariants", "defaultVariants", "variants", "base"];

/// Config file looked up at the workspace root.
pub const CONFIG_FILE_NAME: &str = "extractor.toml";

/// Extensions tried, in order, when resolving a module specifier without one.
pub const SOURCE_EXTENSIONS: [&str; 6] = ["ts", "tsx", "js", "jsx", "mjs", "cjs"];
