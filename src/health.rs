use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use utoipa::ToSchema;

use crate::ports::{BillingRepository, PaymentProvider};

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub dependencies: HashMap<String, DependencyStatus>,
}

impl HealthResponse {
    /// Degraded still serves traffic; only unhealthy answers 503.
    pub fn is_serving(&self) -> bool {
        self.status != "unhealthy"
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

impl DependencyStatus {
    fn healthy(start: Instant) -> Self {
        DependencyStatus::Healthy {
            status: "healthy".to_string(),
            latency_ms: start.elapsed().as_millis() as u64,
        }
    }

    fn unhealthy(error: impl ToString) -> Self {
        DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: error.to_string(),
        }
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    async fn check(&self) -> DependencyStatus;
}

pub struct DatabaseChecker {
    repository: Arc<dyn BillingRepository>,
}

impl DatabaseChecker {
    pub fn new(repository: Arc<dyn BillingRepository>) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl DependencyChecker for DatabaseChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.repository.ping().await {
            Ok(_) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e),
        }
    }
}

pub struct PaymentProviderChecker {
    provider: Arc<dyn PaymentProvider>,
}

impl PaymentProviderChecker {
    pub fn new(provider: Arc<dyn PaymentProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl DependencyChecker for PaymentProviderChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.provider.ping().await {
            Ok(_) => DependencyStatus::healthy(start),
            Err(e) => DependencyStatus::unhealthy(e),
        }
    }
}

struct RegisteredChecker {
    name: String,
    critical: bool,
    checker: Arc<dyn DependencyChecker>,
}

/// Runs the registered dependency checks concurrently, each under a timeout.
pub struct HealthMonitor {
    checkers: Vec<RegisteredChecker>,
    start_time: Instant,
    check_timeout: Duration,
}

impl HealthMonitor {
    pub fn new() -> Self {
        Self {
            checkers: Vec::new(),
            start_time: Instant::now(),
            check_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_timeout(mut self, check_timeout: Duration) -> Self {
        self.check_timeout = check_timeout;
        self
    }

    /// A failing critical dependency makes the service unhealthy; any other
    /// failure only degrades it.
    pub fn register(
        mut self,
        name: impl Into<String>,
        critical: bool,
        checker: Arc<dyn DependencyChecker>,
    ) -> Self {
        self.checkers.push(RegisteredChecker {
            name: name.into(),
            critical,
            checker,
        });
        self
    }

    pub async fn check_health(&self) -> HealthResponse {
        let checks = self.checkers.iter().map(|registered| async move {
            let status = timeout(self.check_timeout, registered.checker.check())
                .await
                .unwrap_or_else(|_| DependencyStatus::unhealthy("timeout"));
            (registered.name.clone(), status)
        });
        let results = futures::future::join_all(checks).await;

        let critical: Vec<&str> = self
            .checkers
            .iter()
            .filter(|c| c.critical)
            .map(|c| c.name.as_str())
            .collect();
        let dependencies: HashMap<String, DependencyStatus> = results.into_iter().collect();
        let overall_status = determine_overall_status(&dependencies, &critical);

        HealthResponse {
            status: overall_status,
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            dependencies,
        }
    }
}

impl Default for HealthMonitor {
    fn default() -> Self {
        Self::new()
    }
}

fn determine_overall_status(
    dependencies: &HashMap<String, DependencyStatus>,
    critical_deps: &[&str],
) -> String {
    let mut has_critical_failure = false;
    let mut has_non_critical_failure = false;

    for (name, status) in dependencies {
        if matches!(status, DependencyStatus::Unhealthy { .. }) {
            if critical_deps.contains(&name.as_str()) {
                has_critical_failure = true;
            } else {
                has_non_critical_failure = true;
            }
        }
    }

    if has_critical_failure {
        "unhealthy".to_string()
    } else if has_non_critical_failure {
        "degraded".to_string()
    } else {
        "healthy".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(bool);

    #[async_trait]
    impl DependencyChecker for Fixed {
        async fn check(&self) -> DependencyStatus {
            if self.0 {
                DependencyStatus::healthy(Instant::now())
            } else {
                DependencyStatus::unhealthy("down")
            }
        }
    }

    struct Hanging;

    #[async_trait]
    impl DependencyChecker for Hanging {
        async fn check(&self) -> DependencyStatus {
            tokio::time::sleep(Duration::from_secs(60)).await;
            DependencyStatus::healthy(Instant::now())
        }
    }

    #[tokio::test]
    async fn all_healthy() {
        let monitor = HealthMonitor::new()
            .register("database", true, Arc::new(Fixed(true)))
            .register("stripe", false, Arc::new(Fixed(true)));
        let health = monitor.check_health().await;
        assert_eq!(health.status, "healthy");
        assert_eq!(health.dependencies.len(), 2);
    }

    #[tokio::test]
    async fn non_critical_failure_degrades() {
        let monitor = HealthMonitor::new()
            .register("database", true, Arc::new(Fixed(true)))
            .register("stripe", false, Arc::new(Fixed(false)));
        let health = monitor.check_health().await;
        assert_eq!(health.status, "degraded");
        assert!(health.is_serving());
    }

    #[tokio::test]
    async fn critical_failure_is_unhealthy() {
        let monitor = HealthMonitor::new()
            .register("database", true, Arc::new(Fixed(false)))
            .register("stripe", false, Arc::new(Fixed(true)));
        let health = monitor.check_health().await;
        assert_eq!(health.status, "unhealthy");
        assert!(!health.is_serving());
    }

    #[tokio::test]
    async fn slow_checks_time_out() {
        let monitor = HealthMonitor::new()
            .with_timeout(Duration::from_millis(20))
            .register("database", true, Arc::new(Hanging));
        let health = monitor.check_health().await;
        assert_eq!(health.status, "unhealthy");
        assert!(matches!(
            health.dependencies.get("database"),
            Some(DependencyStatus::Unhealthy { error, .. }) if error == "timeout"
        ));
    }
}
