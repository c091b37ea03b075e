//! Cross-file resolution treats most failures as "value not found"; this
//! makes sure the reason still lands in the log.

use tracing::warn;

pub trait ResultExt<T, E: std::fmt::Display> {
    /// Convert to Option, logging the error at warn level if Err.
    ///
    /// For failures that downgrade to an unresolved value, e.g. an import
    /// pointing at a file that fails to parse.
    fn ok_warn(self, context: &str) -> Option<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T, E> for Result<T, E> {
    fn ok_warn(self, context: &str) -> Option<T> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(context = %context, error = %e, "Treating as unresolved");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExtractError;
    use std::path::PathBuf;

    #[test]
    fn test_ok_warn_passes_values_through() {
        let result: Result<i32, ExtractError> = Ok(42);
        assert_eq!(result.ok_warn("load module"), Some(42));
    }

    #[test]
    fn test_ok_warn_swallows_parse_errors() {
        let result: Result<i32, ExtractError> = Err(ExtractError::Parse {
            path: PathBuf::from("broken.ts"),
        });
        assert_eq!(result.ok_warn("load module"), None);
    }
}
