use thiserror::Error;

/// Result type for jatoc operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the jatoc code generator
///
/// Input-contract violations and table invariant mismatches are fatal: they
/// indicate a frontend or analysis bug upstream and are never worked around.
/// Optimizer eligibility failures are not errors; ineligible sites are skipped.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Internal generator error: {message}")]
    Internal { message: String },

    #[error("Unknown class: {name}")]
    UnknownClass { name: String },

    #[error("Unknown method: {class}.{name}{descriptor}")]
    UnknownMethod {
        class: String,
        name: String,
        descriptor: String,
    },

    #[error("Unknown field: {class}.{name}")]
    UnknownField { class: String, name: String },

    #[error("Duplicate switch case value: {value}")]
    DuplicateCase { value: i32 },

    #[error("Trap handler is not reachable in method {method}")]
    UnreachableHandler { method: String },

    #[error("Table size mismatch for {table}: configured {configured}, runtime expects {expected}")]
    TableSize {
        table: &'static str,
        configured: usize,
        expected: usize,
    },

    #[error("Instanceof table overflow for class {class}: {entries} supertypes, table holds {capacity}")]
    TableOverflow {
        class: String,
        entries: usize,
        capacity: usize,
    },
}

impl Error {
    /// Create an internal generator error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an unknown-class error
    pub fn unknown_class(name: impl Into<String>) -> Self {
        Self::UnknownClass { name: name.into() }
    }

    /// Create an unknown-field error
    pub fn unknown_field(class: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UnknownField {
            class: class.into(),
            name: name.into(),
        }
    }
}
