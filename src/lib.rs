pub mod analysis;
pub mod config;
pub mod constants;
pub mod error;
pub mod error_ext;
pub mod types;

pub use analysis::{Engine, EvalContext, EvalFlags, ExtractRequest, FileTable, Unboxed};
pub use config::{ConfigManager, ExtractorConfig};
pub use error::{ExtractError, Result};
pub use types::{FileId, NodeRef, PlainValue, Provenance};
