//! Error types for the observation core.

use std::fmt;

/// Errors raised by observable objects and collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObservationError {
    /// An index-addressed access was outside the collection.
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The collection length at the time of the access.
        len: usize,
    },
    /// A property defined as read-only was written.
    ReadOnlyProperty(String),
    /// A reorder did not describe a permutation of the collection.
    InvalidPermutation {
        /// The collection length.
        len: usize,
    },
}

impl fmt::Display for ObservationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IndexOutOfBounds { index, len } => {
                write!(f, "Index {index} is out of bounds for a collection of length {len}")
            }
            Self::ReadOnlyProperty(key) => {
                write!(f, "Property '{key}' is read-only")
            }
            Self::InvalidPermutation { len } => {
                write!(f, "Reorder is not a permutation of {len} items")
            }
        }
    }
}

impl std::error::Error for ObservationError {}

/// Result type for observation operations.
pub type ObservationResult<T> = std::result::Result<T, ObservationError>;
