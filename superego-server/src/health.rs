//! Liveness and per-component health reporting.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use superego_advisor::{BreakerState, ResilientAdvisor};
use superego_policy::RuleStore;

/// Overall service health.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    /// All components nominal.
    Healthy,
    /// Serving, but the advisor breaker is open.
    Degraded,
    /// Rule store empty or uninitialized; everything fails closed.
    Unhealthy,
}

/// Rule-store component status.
#[derive(Clone, Debug, Serialize)]
pub struct RuleStoreHealth {
    status: HealthState,
    rules: usize,
    loaded_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
}

/// Advisor component status.
#[derive(Clone, Debug, Serialize)]
pub struct AdvisorHealth {
    status: HealthState,
    provider: String,
    model: String,
    breaker: &'static str,
    error_rate: f64,
    cached_verdicts: usize,
}

/// Transport component status.
#[derive(Clone, Debug, Serialize)]
pub struct TransportHealth {
    status: HealthState,
    enabled: Vec<&'static str>,
}

/// Per-component breakdown.
#[derive(Clone, Debug, Serialize)]
pub struct HealthComponents {
    rule_store: RuleStoreHealth,
    advisor: AdvisorHealth,
    transports: TransportHealth,
}

/// Full health record returned by every health surface.
#[derive(Clone, Debug, Serialize)]
pub struct HealthReport {
    status: HealthState,
    timestamp: DateTime<Utc>,
    components: HealthComponents,
}

impl HealthReport {
    /// Returns the overall status.
    #[must_use]
    pub const fn status(&self) -> HealthState {
        self.status
    }

    /// Returns `true` unless the service is unhealthy.
    #[must_use]
    pub fn is_serving(&self) -> bool {
        self.status != HealthState::Unhealthy
    }
}

/// Reads component state on demand and aggregates an overall status.
pub struct HealthMonitor {
    store: Arc<RuleStore>,
    advisor: Arc<ResilientAdvisor>,
    transports: Vec<&'static str>,
}

impl HealthMonitor {
    /// Wires the monitor to the components it reports on.
    #[must_use]
    pub fn new(
        store: Arc<RuleStore>,
        advisor: Arc<ResilientAdvisor>,
        transports: Vec<&'static str>,
    ) -> Self {
        Self {
            store,
            advisor,
            transports,
        }
    }

    /// Produces a point-in-time health record.
    #[must_use]
    pub fn check(&self) -> HealthReport {
        let snapshot = self.store.current();
        let rule_store = RuleStoreHealth {
            status: if snapshot.is_empty() {
                HealthState::Unhealthy
            } else {
                HealthState::Healthy
            },
            rules: snapshot.len(),
            loaded_at: snapshot.loaded_at(),
            last_error: self.store.last_load_error(),
        };

        let breaker = self.advisor.breaker_snapshot();
        let advisor = AdvisorHealth {
            status: if breaker.state == BreakerState::Closed {
                HealthState::Healthy
            } else {
                HealthState::Degraded
            },
            provider: self.advisor.metadata().provider().to_owned(),
            model: self.advisor.metadata().model().to_owned(),
            breaker: breaker.state.as_str(),
            error_rate: breaker.error_rate(),
            cached_verdicts: self.advisor.cached_verdicts(),
        };

        let transports = TransportHealth {
            status: HealthState::Healthy,
            enabled: self.transports.clone(),
        };

        let status = if rule_store.status == HealthState::Unhealthy {
            HealthState::Unhealthy
        } else if advisor.status == HealthState::Degraded {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        HealthReport {
            status,
            timestamp: Utc::now(),
            components: HealthComponents {
                rule_store,
                advisor,
                transports,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use superego_advisor::{MockAdvisor, ResilienceConfig};
    use superego_policy::parse_rules;

    fn advisor() -> Arc<ResilientAdvisor> {
        Arc::new(ResilientAdvisor::new(
            Arc::new(MockAdvisor::allowing()),
            ResilienceConfig::default(),
        ))
    }

    #[test]
    fn empty_rule_store_is_unhealthy() {
        let monitor = HealthMonitor::new(Arc::new(RuleStore::empty()), advisor(), vec!["http"]);
        let report = monitor.check();
        assert_eq!(report.status(), HealthState::Unhealthy);
        assert!(!report.is_serving());
    }

    #[test]
    fn loaded_rules_and_closed_breaker_are_healthy() {
        let rules = parse_rules(
            r#"
rules:
  - id: "r1"
    priority: 1
    action: allow
    conditions: { field: "tool_name", op: "equals", value: "Read" }
"#,
        )
        .expect("valid rules");
        let monitor = HealthMonitor::new(Arc::new(RuleStore::new(rules)), advisor(), vec!["http"]);

        let report = monitor.check();
        assert_eq!(report.status(), HealthState::Healthy);

        let wire = serde_json::to_value(&report).expect("serialize");
        assert_eq!(wire["status"], "healthy");
        assert_eq!(wire["components"]["rule_store"]["rules"], 1);
        assert_eq!(wire["components"]["advisor"]["breaker"], "closed");
    }
}
