//! # guarantee-service
//!
//! Money-back guarantee tracking for a music-learning product.
//!
//! A purchase opens a guarantee enrollment. A nightly batch counts each
//! enrolled user's valid plays per calendar day; the evaluator turns those
//! daily tallies into a state (`unconditional_window`, `conditional_running`,
//! `conditional_met`, `expired`) on every read, and admins record refund
//! decisions against it.
//!
//! ## Architecture
//!
//! ```text
//! Admin UI / billing (HTTP)
//!     │
//!     ├── REST Handlers (api/)
//!     │
//!     ├── EnrollmentService, StatusService, DecisionService,
//!     │   DailyAggregator, Scheduler (service/)
//!     │
//!     ├── Evaluator and domain types (domain/)
//!     │
//!     └── GuaranteeStore / PlaySource (persistence/)
//!             ├── MemoryStore
//!             └── PostgreSQL
//! ```

pub mod api;
pub mod app_state;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod persistence;
pub mod service;
