//! Error types for the kubemon-rules crate.

use thiserror::Error;

/// Errors raised while loading rules, applying overrides or rendering templates.
#[derive(Debug, Error)]
pub enum RuleError {
    /// A rule source could not be read from disk.
    #[error("failed to read rule source {source_name}: {reason}")]
    Io {
        /// The path that failed.
        source_name: String,
        /// The underlying I/O failure.
        reason: String,
    },

    /// A remote rule source could not be fetched.
    #[error("failed to fetch rule source {source_name}: {reason}")]
    Http {
        /// The URL that failed.
        source_name: String,
        /// The reason the request failed.
        reason: String,
    },

    /// A rule source is neither an existing path nor a URL.
    #[error("invalid rule source: {source_name}")]
    InvalidSource {
        /// The offending source string.
        source_name: String,
    },

    /// A rule document did not parse.
    #[error("failed to parse rule source {source_name}: {reason}")]
    Parse {
        /// The source the document came from.
        source_name: String,
        /// The parser message.
        reason: String,
    },

    /// No rule sources were configured.
    #[error("no rule sources configured")]
    NoSources,

    /// An override addressed a field that does not exist.
    #[error("unknown monitor field: {path}")]
    UnknownField {
        /// The requested field path.
        path: String,
    },

    /// An override value could not be coerced to the field type.
    #[error("invalid value {value:?} for field {path}: expected {expected}")]
    InvalidFieldValue {
        /// The canonical field path.
        path: String,
        /// The expected value kind.
        expected: &'static str,
        /// The raw annotation value.
        value: String,
    },

    /// A template expression failed to parse or evaluate.
    #[error("template error in {field}: {reason}")]
    Template {
        /// The monitor field being rendered.
        field: String,
        /// The reason rendering failed.
        reason: String,
    },
}

/// Result type for rule operations.
pub type Result<T> = std::result::Result<T, RuleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_io() {
        let err = RuleError::Io {
            source_name: "conf.yml".to_string(),
            reason: "No such file or directory".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "failed to read rule source conf.yml: No such file or directory"
        );
    }

    #[test]
    fn error_display_unknown_field() {
        let err = RuleError::UnknownField {
            path: "options.bogus".to_string(),
        };
        assert_eq!(err.to_string(), "unknown monitor field: options.bogus");
    }

    #[test]
    fn error_display_invalid_value() {
        let err = RuleError::InvalidFieldValue {
            path: "options.thresholds.critical".to_string(),
            expected: "number",
            value: "high".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value \"high\" for field options.thresholds.critical: expected number"
        );
    }

    #[test]
    fn error_display_template() {
        let err = RuleError::Template {
            field: "name".to_string(),
            reason: "unclosed action".to_string(),
        };
        assert_eq!(err.to_string(), "template error in name: unclosed action");
    }
}
