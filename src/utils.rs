use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Custom error types for the generator
#[derive(Error, Debug)]
pub enum MayhapError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Line editor error: {0}")]
    Editor(#[from] rustyline::error::ReadlineError),

    #[error("Parse error: {0}")]
    Parse(String),

    /// A structural problem in a grammar source
    #[error("{0}")]
    Structure(String),

    /// Any failure while loading a grammar source, pinned to the offending line
    #[error("line {line}: {cause}")]
    Grammar {
        line: usize,
        text: String,
        #[source]
        cause: Box<MayhapError>,
    },

    #[error("Error while importing grammar from {}: {source}", path.display())]
    Import {
        path: PathBuf,
        #[source]
        source: Box<MayhapError>,
    },

    #[error("Symbol \"{0}\" not found")]
    UnknownSymbol(String),

    #[error("Symbol \"{0}\" has no production rules")]
    EmptySymbol(String),

    #[error("Variable \"{0}\" not found")]
    UnboundVariable(String),

    #[error("Unknown modifier \"{0}\"")]
    UnknownModifier(String),
}

/// Broad classification of a [`MayhapError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed rule syntax
    Parse,
    /// Malformed grammar source
    Grammar,
    /// Failure while evaluating a pattern
    Generation,
    /// Failure reading or decoding input
    Io,
}

impl MayhapError {
    /// The broad class of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            MayhapError::Io(_) | MayhapError::Json(_) | MayhapError::Editor(_) => ErrorKind::Io,
            MayhapError::Parse(_) => ErrorKind::Parse,
            MayhapError::Structure(_)
            | MayhapError::Grammar { .. }
            | MayhapError::Import { .. } => ErrorKind::Grammar,
            MayhapError::UnknownSymbol(_)
            | MayhapError::EmptySymbol(_)
            | MayhapError::UnboundVariable(_)
            | MayhapError::UnknownModifier(_) => ErrorKind::Generation,
        }
    }

    /// Pin this error to a line of a grammar source
    pub(crate) fn at_line(self, line: usize, text: &str) -> Self {
        MayhapError::Grammar {
            line,
            text: text.to_string(),
            cause: Box::new(self),
        }
    }
}

/// Result type for all operations in this crate
pub type Result<T> = std::result::Result<T, MayhapError>;

pub(crate) fn is_identifier_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

pub(crate) fn is_identifier_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Check whether a string is a valid symbol, variable or modifier name
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if is_identifier_start(first) => chars.all(is_identifier_char),
        _ => false,
    }
}
