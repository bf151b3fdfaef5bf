use std::{borrow::Cow, fmt};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::resource::ResourceError;

/// Result type alias for operations that can fail at the marshaling boundary.
pub type MarshalResult<T> = Result<T, MarshalError>;

/// Exception kinds surfaced to managed code.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>` implementations.
/// The string representation matches the variant name exactly (e.g., `TypeError` -> "TypeError").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ExcType {
    /// A value of an unexpected kind crossed the boundary.
    TypeError,
    /// A declared field could not be read from the managed object.
    AttributeError,
    /// The operation is not defined for the operand kinds.
    NotImplementedError,
    /// Claim bookkeeping or a managed allocation could not be made.
    MemoryError,
    /// Sequence index out of range.
    IndexError,
    /// Missing dict key.
    KeyError,
}

/// A typed marshaling failure.
///
/// Every failure carries the operation that was attempted and a message naming
/// the operand kinds involved, e.g. `eq(PassThruContainer, int)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarshalError {
    exc_type: ExcType,
    operation: &'static str,
    message: Cow<'static, str>,
}

impl MarshalError {
    #[must_use]
    pub fn new(exc_type: ExcType, operation: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            exc_type,
            operation,
            message: message.into(),
        }
    }

    /// Entry or exit marshal received a value of the wrong kind.
    #[must_use]
    pub(crate) fn type_mismatch(operation: &'static str, expected: &str, found: &str) -> Self {
        Self::new(
            ExcType::TypeError,
            operation,
            format!("{operation}: expected {expected}, got {found}"),
        )
    }

    /// A declared attribute is missing on the managed object.
    #[must_use]
    pub(crate) fn attribute(type_name: &str, attr: &str) -> Self {
        Self::new(
            ExcType::AttributeError,
            "getattr",
            format!("'{type_name}' object has no attribute '{attr}'"),
        )
    }

    /// A comparison between operand kinds that have no implementation.
    #[must_use]
    pub(crate) fn unsupported_comparison(operation: &'static str, lhs: &str, rhs: &str) -> Self {
        Self::new(
            ExcType::NotImplementedError,
            operation,
            format!("no implementation of {operation}({lhs}, {rhs})"),
        )
    }

    /// The native signature and the supplied managed arguments disagree in length.
    #[must_use]
    pub(crate) fn arg_count(expected: usize, found: usize) -> Self {
        Self::new(
            ExcType::TypeError,
            "call",
            format!("native function takes {expected} positional arguments but {found} were given"),
        )
    }

    /// A handle claimed by one runtime was handed to another.
    #[must_use]
    pub(crate) fn foreign_claim(operation: &'static str, kind: &str) -> Self {
        Self::new(
            ExcType::TypeError,
            operation,
            format!("{operation}: {kind} handle belongs to a different runtime"),
        )
    }

    #[must_use]
    pub(crate) fn unhashable(type_name: &str) -> Self {
        Self::new(ExcType::TypeError, "hash", format!("unhashable type: '{type_name}'"))
    }

    #[must_use]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    /// Name of the operation that failed (`unbox`, `box`, `eq`, `hash`, ...).
    #[must_use]
    pub fn operation(&self) -> &'static str {
        self.operation
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for MarshalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.exc_type, self.message)
    }
}

impl std::error::Error for MarshalError {}

impl From<ResourceError> for MarshalError {
    fn from(err: ResourceError) -> Self {
        Self::new(ExcType::MemoryError, "allocate", err.to_string())
    }
}
