//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::clock::Clock;
use crate::domain::GuaranteeRules;
use crate::persistence::{GuaranteeStore, PlaySource};
use crate::service::{DailyAggregator, DecisionService, EnrollmentService, StatusService};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Enrollment intake.
    pub enrollments: Arc<EnrollmentService>,
    /// Status projection.
    pub status: Arc<StatusService>,
    /// Decision recorder.
    pub decisions: Arc<DecisionService>,
    /// Daily aggregator.
    pub aggregator: Arc<DailyAggregator>,
    /// Store, for direct reads such as the audit trail.
    pub store: Arc<dyn GuaranteeStore>,
    /// Active guarantee rules.
    pub rules: GuaranteeRules,
}

impl AppState {
    /// Wires every service over the same ports.
    #[must_use]
    pub fn new(
        store: Arc<dyn GuaranteeStore>,
        plays: Arc<dyn PlaySource>,
        clock: Arc<dyn Clock>,
        rules: GuaranteeRules,
        concurrency: usize,
    ) -> Self {
        let enrollments = Arc::new(EnrollmentService::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            rules,
        ));
        let status = Arc::new(StatusService::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            rules,
        ));
        let decisions = Arc::new(DecisionService::new(
            Arc::clone(&store),
            Arc::clone(&clock),
            rules,
        ));
        let aggregator = Arc::new(DailyAggregator::new(
            Arc::clone(&store),
            plays,
            clock,
            rules,
            concurrency,
        ));

        Self {
            enrollments,
            status,
            decisions,
            aggregator,
            store,
            rules,
        }
    }
}
