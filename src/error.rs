//! Error types for the MangaDex client.

use std::io;

/// Errors produced while talking to the catalog or moving between screens.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("missing selection: {0}")]
    PrerequisiteMissing(&'static str),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let e = Error::NotFound("chapter abc".into());
        assert_eq!(format!("{e}"), "not found: chapter abc");
    }

    #[test]
    fn prerequisite_display() {
        let e = Error::PrerequisiteMissing("manga");
        assert_eq!(format!("{e}"), "missing selection: manga");
    }

    #[test]
    fn config_display() {
        let e = Error::Config("chapter_page_size must be positive".into());
        assert_eq!(
            format!("{e}"),
            "config error: chapter_page_size must be positive"
        );
    }

    #[test]
    fn json_error_from_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let e: Error = json_err.into();
        assert!(matches!(e, Error::Decode(_)));
        assert!(format!("{e}").contains("decode error"));
    }

    #[test]
    fn io_error_from_conversion() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let e: Error = io_err.into();
        let msg = format!("{e}");
        assert!(msg.contains("I/O error"));
        assert!(msg.contains("gone"));
    }
}
