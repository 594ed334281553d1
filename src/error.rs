use thiserror::Error;

use crate::namespec::Kind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad flag value. Always raised before any remote call.
    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Namespec {
        spec: String,
        kind: Option<Kind>,
        message: String,
    },

    #[error("{0}")]
    NotFound(String),

    #[error("remote call `{method}` failed: {message}")]
    Remote { method: String, message: String },

    #[error("remote call `{method}` failed for {}", describe_failures(.failures))]
    PartialBulk {
        method: String,
        failures: Vec<(String, String)>,
    },
}

impl Error {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn remote(method: &str, message: impl std::fmt::Display) -> Self {
        Self::Remote {
            method: method.to_owned(),
            message: message.to_string(),
        }
    }
}

fn describe_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(target, message)| format!("`{target}`: {message}"))
        .collect::<Vec<_>>()
        .join("; ")
}
