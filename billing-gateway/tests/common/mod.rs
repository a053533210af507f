//! Shared fixtures for gateway integration tests.
//!
//! Builds gateways pointed at a wiremock billing backend and provides
//! in-process cache stores and event sinks.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use billing_gateway::{
    BillingGateway,
    backend::BackendServiceClient,
    cache::{CacheError, CacheStore, MemoryStore, ResponseCache},
    metrics::{EmitError, EventSink, FlowEvent, MetricsRecorder, TracingSink},
    models::Plan,
};
use serde_json::{Value, json};
use url::Url;
use wiremock::MockServer;

pub const TEST_API_KEY: &str = "test-api-key";

/// Backend client for `server` with the given request timeout.
pub fn client_for(server: &MockServer, timeout: Duration) -> BackendServiceClient {
    let base_url = Url::parse(&server.uri()).expect("mock server URI should parse");
    BackendServiceClient::new(base_url, TEST_API_KEY.to_owned(), timeout)
        .expect("client should build")
}

/// Gateway without caching.
pub fn gateway_for(server: &MockServer) -> BillingGateway<MemoryStore, TracingSink> {
    BillingGateway::new(
        client_for(server, Duration::from_secs(5)),
        ResponseCache::disabled(),
        MetricsRecorder::default(),
    )
}

/// Gateway caching plan listings in memory for `ttl`.
pub fn caching_gateway_for(
    server: &MockServer,
    ttl: Duration,
) -> BillingGateway<MemoryStore, TracingSink> {
    BillingGateway::new(
        client_for(server, Duration::from_secs(5)),
        ResponseCache::new(Some(MemoryStore::new(100)), Some(ttl)),
        MetricsRecorder::default(),
    )
}

/// Gateway reporting flow events to a [`CollectingSink`].
pub fn metered_gateway_for(server: &MockServer) -> BillingGateway<MemoryStore, CollectingSink> {
    BillingGateway::new(
        client_for(server, Duration::from_secs(5)),
        ResponseCache::disabled(),
        MetricsRecorder::new(CollectingSink::default()),
    )
}

/// Waits until the background write of a plan listing has landed.
pub async fn wait_for_cached_plans<S: CacheStore, E: EventSink>(gateway: &BillingGateway<S, E>) {
    for _ in 0..100 {
        if gateway.cache().get::<Vec<Plan>>("listPlans").await.is_some() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("plan listing was never cached");
}

/// Records every emitted flow event.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub events: Mutex<Vec<FlowEvent>>,
}

impl EventSink for CollectingSink {
    fn emit(&self, event: &FlowEvent) -> Result<(), EmitError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Store whose every call fails.
#[derive(Debug, Default, Clone)]
pub struct BrokenStore {
    pub calls: Arc<AtomicUsize>,
}

impl CacheStore for BrokenStore {
    async fn get<'a>(&'a self, _key: &'a str) -> Result<Option<String>, CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Store("connection refused".to_owned()))
    }

    async fn set<'a>(
        &'a self,
        _key: &'a str,
        _value: String,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Store("connection refused".to_owned()))
    }

    async fn close(self) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Store that always misses and whose writes never complete.
#[derive(Debug, Default, Clone)]
pub struct StalledStore {
    pub writes: Arc<AtomicUsize>,
}

impl CacheStore for StalledStore {
    async fn get<'a>(&'a self, _key: &'a str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set<'a>(
        &'a self,
        _key: &'a str,
        _value: String,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        std::future::pending().await
    }

    async fn close(self) -> Result<(), CacheError> {
        Ok(())
    }
}

pub fn plans_body() -> Value {
    json!([
        {
            "plan_id": "plan_123",
            "product_id": "prod_123",
            "product_name": "Example Product",
            "interval": "month",
            "amount": 500,
            "currency": "usd"
        },
        {
            "plan_id": "plan_456",
            "product_id": "prod_456",
            "interval": "year",
            "amount": 5000,
            "currency": "usd"
        }
    ])
}

pub fn customer_body() -> Value {
    json!({
        "payment_provider": "stripe",
        "payment_type": "card",
        "last4": "4242",
        "brand": "Visa",
        "exp_month": 8,
        "exp_year": 2030,
        "subscriptions": [subscription_body()]
    })
}

pub fn subscription_body() -> Value {
    json!({
        "subscription_id": "sub_1",
        "plan_id": "plan_123",
        "plan_name": "Example Monthly",
        "status": "active",
        "current_period_start": 1_565_816_388,
        "current_period_end": 1_568_408_388,
        "cancel_at_period_end": false,
        "end_at": null
    })
}

pub fn message_body(message: &str) -> Value {
    json!({ "message": message })
}
