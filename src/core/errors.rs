//! ASRH-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, AsrhError>;

/// Top-level error type for the latency harness.
#[derive(Debug, Error)]
pub enum AsrhError {
    #[error("[ASRH-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[ASRH-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[ASRH-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[ASRH-2001] target unreachable at {target}: {details}")]
    Connection { target: String, details: String },

    #[error("[ASRH-2002] call to {target} exceeded {timeout_ms}ms")]
    Timeout { target: String, timeout_ms: u64 },

    #[error("[ASRH-2003] {target} answered with HTTP {status}")]
    HttpStatus { target: String, status: u16 },

    #[error("[ASRH-2004] undecodable response from {target}: {details}")]
    ResponseDecode { target: String, details: String },

    #[error("[ASRH-2101] no successful samples for {scenario}")]
    EmptySampleSet { scenario: String },

    #[error("[ASRH-2102] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[ASRH-2103] malformed report field {field}: {details}")]
    ReportShape { field: String, details: String },

    #[error("[ASRH-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[ASRH-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl AsrhError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "ASRH-1001",
            Self::MissingConfig { .. } => "ASRH-1002",
            Self::ConfigParse { .. } => "ASRH-1003",
            Self::Connection { .. } => "ASRH-2001",
            Self::Timeout { .. } => "ASRH-2002",
            Self::HttpStatus { .. } => "ASRH-2003",
            Self::ResponseDecode { .. } => "ASRH-2004",
            Self::EmptySampleSet { .. } => "ASRH-2101",
            Self::Serialization { .. } => "ASRH-2102",
            Self::ReportShape { .. } => "ASRH-2103",
            Self::Io { .. } => "ASRH-3002",
            Self::Runtime { .. } => "ASRH-3900",
        }
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

impl From<serde_json::Error> for AsrhError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for AsrhError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

impl From<toml::ser::Error> for AsrhError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Serialization {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_variant() -> Vec<AsrhError> {
        vec![
            AsrhError::InvalidConfig {
                details: String::new(),
            },
            AsrhError::MissingConfig {
                path: PathBuf::new(),
            },
            AsrhError::ConfigParse {
                context: "",
                details: String::new(),
            },
            AsrhError::Connection {
                target: String::new(),
                details: String::new(),
            },
            AsrhError::Timeout {
                target: String::new(),
                timeout_ms: 0,
            },
            AsrhError::HttpStatus {
                target: String::new(),
                status: 500,
            },
            AsrhError::ResponseDecode {
                target: String::new(),
                details: String::new(),
            },
            AsrhError::EmptySampleSet {
                scenario: String::new(),
            },
            AsrhError::Serialization {
                context: "",
                details: String::new(),
            },
            AsrhError::ReportShape {
                field: String::new(),
                details: String::new(),
            },
            AsrhError::Io {
                path: PathBuf::new(),
                source: std::io::Error::other("test"),
            },
            AsrhError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = every_variant();
        let codes: Vec<&str> = errors.iter().map(AsrhError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn error_codes_have_asrh_prefix() {
        for err in &every_variant() {
            assert!(
                err.code().starts_with("ASRH-"),
                "code {} must start with ASRH-",
                err.code()
            );
        }
    }

    #[test]
    fn error_display_includes_code() {
        let err = AsrhError::EmptySampleSet {
            scenario: "patient_detail_latency".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("ASRH-2101"), "display should contain code: {msg}");
        assert!(
            msg.contains("patient_detail_latency"),
            "display should contain scenario: {msg}"
        );
    }

    #[test]
    fn io_convenience_constructor() {
        let err = AsrhError::io(
            "/tmp/report.json",
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(err.code(), "ASRH-3002");
        assert!(err.to_string().contains("/tmp/report.json"));
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: AsrhError = json_err.into();
        assert_eq!(err.code(), "ASRH-2102");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: AsrhError = toml_err.into();
        assert_eq!(err.code(), "ASRH-1003");
    }
}
