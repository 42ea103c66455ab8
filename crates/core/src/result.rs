//! Result alias and a logging fallback combinator.

use crate::error::Error;

/// The standard Result type for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait for results whose failure is recoverable by falling back.
///
/// The controller degrades many failures to a default instead of surfacing
/// them; this makes the fallback visible in the logs.
pub trait ResultExt<T> {
    /// Get the value or a default, logging the error at `warn` if present.
    fn or_default_logged(self, default: T, context: &str) -> T;
}

impl<T, E: std::fmt::Display> ResultExt<T> for std::result::Result<T, E> {
    fn or_default_logged(self, default: T, context: &str) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(context, error = %e, "Operation failed, using default");
                default
            }
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;

    #[test]
    fn should_return_value_when_ok() {
        let result: std::result::Result<u32, String> = Ok(7);
        assert_eq!(result.or_default_logged(0, "test"), 7);
    }

    #[test]
    fn should_return_default_when_err() {
        let result: std::result::Result<u32, String> = Err("boom".to_string());
        assert_eq!(result.or_default_logged(3, "test"), 3);
    }

    #[test]
    fn should_default_on_core_error() {
        let result: Result<u32> = Err(Error::invalid_config("bad"));
        assert_eq!(result.or_default_logged(1, "test"), 1);
    }
}
