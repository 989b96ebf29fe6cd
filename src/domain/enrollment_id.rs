//! Type-safe enrollment identifier.
//!
//! [`EnrollmentId`] wraps a [`uuid::Uuid`] (v4) so that enrollment
//! identifiers cannot be confused with user or purchase identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a guarantee enrollment.
///
/// Generated once when the enrollment is opened and immutable thereafter.
/// Used as the key for daily records, audit entries and store lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnrollmentId(uuid::Uuid);

impl EnrollmentId {
    /// Creates a new random `EnrollmentId` (UUID v4).
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Creates an `EnrollmentId` from an existing [`uuid::Uuid`].
    #[must_use]
    pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner [`uuid::Uuid`].
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for EnrollmentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EnrollmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<uuid::Uuid> for EnrollmentId {
    fn from(uuid: uuid::Uuid) -> Self {
        Self(uuid)
    }
}

impl From<EnrollmentId> for uuid::Uuid {
    fn from(id: EnrollmentId) -> Self {
        id.0
    }
}
