//! Domain layer: enrollment model, daily tallies, rules and the pure
//! guarantee evaluator.
//!
//! Nothing in this module performs I/O. Services load data through the
//! [`crate::persistence`] ports and hand it to these types and functions.

pub mod audit;
pub mod daily;
pub mod enrollment;
pub mod enrollment_id;
pub mod evaluator;
pub mod rules;
pub mod status;

pub use audit::{AuditAction, AuditEntry};
pub use daily::GuaranteeDaily;
pub use enrollment::{Decision, EnrollmentStatus, GuaranteeEnrollment};
pub use enrollment_id::EnrollmentId;
pub use evaluator::{CalendarDay, ComputedState, Evaluation};
pub use rules::GuaranteeRules;
pub use status::{GuaranteeStatus, StatusDetail, StatusFilter};
