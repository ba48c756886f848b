//! Settings loading errors.

use thiserror::Error;

/// Error loading or parsing settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file contains invalid JSON or invalid values.
    #[error("invalid settings JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Result alias for settings operations.
pub type Result<T> = std::result::Result<T, SettingsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_wraps() {
        let err = SettingsError::from(std::io::Error::other("denied"));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn parse_error_wraps() {
        let json_err = serde_json::from_str::<serde_json::Value>("{bad").unwrap_err();
        let err = SettingsError::from(json_err);
        assert!(err.to_string().starts_with("invalid settings JSON"));
    }
}
