//! Checks run by the `health` command.
//!
//! Each dependency is checked directly: the backend through a bare client so a
//! warm plan cache cannot hide an outage, and the cache store with a real read
//! bounded by the configured operation timeout.

use billing_gateway::{
    GatewayConfig,
    backend::BackendServiceClient,
    cache::{CacheStore, ConfiguredStore},
    models::Plan,
    operations::LIST_PLANS,
};
use tracing::warn;

use crate::observability::{HealthCheck, HealthReport};

const CACHE_CHECK_KEY: &str = "health:check";

/// Runs every check for `config`.
///
/// A disabled configuration performs no I/O.
pub async fn run_checks(config: &GatewayConfig) -> HealthReport {
    let mut checks = vec![HealthCheck::pass("config", "configuration is valid")];

    if !config.enabled {
        checks.push(HealthCheck::warn("backend", "billing is disabled"));
        return HealthReport::new(checks);
    }

    let (cache, backend) = tokio::join!(check_cache(config), check_backend(config));
    checks.push(cache);
    checks.push(backend);
    HealthReport::new(checks)
}

/// The cache is advisory, so an unreachable store only degrades health.
async fn check_cache(config: &GatewayConfig) -> HealthCheck {
    let store = match ConfiguredStore::from_config(&config.cache) {
        Ok(Some(store)) => store,
        Ok(None) => return HealthCheck::warn("cache", "plan caching is disabled"),
        Err(err) => return HealthCheck::warn("cache", err.to_string()),
    };

    let timeout = config.cache.operation_timeout();
    let check = match tokio::time::timeout(timeout, store.get(CACHE_CHECK_KEY)).await {
        Ok(Ok(_)) => {
            HealthCheck::pass("cache", format!("{:?} store reachable", config.cache.backend))
        }
        Ok(Err(err)) => HealthCheck::warn("cache", err.to_string()),
        Err(_) => HealthCheck::warn(
            "cache",
            format!("store did not answer within {}ms", timeout.as_millis()),
        ),
    };

    if let Err(err) = store.close().await {
        warn!(error = %err, "cache close failed");
    }
    check
}

async fn check_backend(config: &GatewayConfig) -> HealthCheck {
    let client = match BackendServiceClient::from_config(config) {
        Ok(client) => client,
        Err(err) => return HealthCheck::fail("backend", err.to_string()),
    };

    let result: billing_gateway::Result<Vec<Plan>> =
        client.call(&LIST_PLANS.endpoint, &[], None::<&()>).await;
    client.close();

    match result {
        Ok(plans) => HealthCheck::pass("backend", format!("{} plans available", plans.len())),
        Err(err) => HealthCheck::fail("backend", err.to_string()),
    }
}
