//! Service layer: business logic orchestration.
//!
//! Each service holds `Arc`-shared ports ([`crate::persistence::GuaranteeStore`],
//! [`crate::persistence::PlaySource`], [`crate::clock::Clock`]) and the
//! configured [`crate::domain::GuaranteeRules`]. Verdicts themselves come
//! from the pure evaluator in [`crate::domain::evaluator`].

pub mod aggregation_service;
pub mod decision_service;
pub mod enrollment_service;
pub mod scheduler;
pub mod status_service;

pub use aggregation_service::{AggregationFailure, AggregationReport, DailyAggregator};
pub use decision_service::{DecisionService, ExpirySweep, SYSTEM_ACTOR};
pub use enrollment_service::EnrollmentService;
pub use scheduler::{ScheduleSettings, ScheduledRun, Scheduler};
pub use status_service::StatusService;
