//! Structured-text codec: plain-text forms of the preprocess record and the
//! requirement set that a human can edit and that parse back losslessly.
//!
//! Both formats share the same line model (see [`lines`]): `=== HEADER ===`
//! lines open sections, and each section is scanned on its own so a failure
//! names the section that caused it.

pub mod lines;
pub mod preprocess;
pub mod requirements;

pub use preprocess::{parse_preprocess, serialize_preprocess};
pub use requirements::{parse_requirements, serialize_requirements};

use thiserror::Error;

/// Which record family a parse was attempting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Preprocess,
    Requirements,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preprocess => write!(f, "Preprocess"),
            Self::Requirements => write!(f, "Requirements"),
        }
    }
}

/// Malformed or missing text during a parse. Always local to one call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{record} text is empty")]
    EmptyInput { record: RecordKind },

    #[error("Section '{section}' is missing")]
    MissingSection { section: &'static str },

    #[error("Section '{section}' is empty")]
    EmptySection { section: &'static str },
}
