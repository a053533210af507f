//! Billing Gateway: typed client for the subscription billing backend
//!
//! A Rust library that lets an account service manage plans, customers and
//! subscriptions held by a remote billing backend, and drive a payment form
//! submission through card tokenization and decline recovery.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                    BillingGateway                    │
//! │  disabled check · metrics · cache · error translation │
//! └────────┬──────────────────┬──────────────────┬───────┘
//!          │                  │                  │
//! ┌────────▼────────┐ ┌───────▼───────┐ ┌────────▼────────┐
//! │ BackendService  │ │ ResponseCache │ │ MetricsRecorder │
//! │ Client (HTTPS,  │ │ (Redis or     │ │ (flow events)   │
//! │ bearer auth)    │ │  in-memory)   │ │                 │
//! └────────┬────────┘ └───────────────┘ └─────────────────┘
//!          │ JSON
//! ┌────────▼────────┐
//! │ Billing backend │
//! └─────────────────┘
//! ```
//!
//! The [`payment`] module is independent of the gateway: it coordinates a
//! client-side payment submission against a payment processor and the
//! subscription server.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use billing_gateway::{BillingGateway, GatewayConfig, metrics::MetricsContext};
//!
//! # async fn example() -> billing_gateway::Result<()> {
//! let config = GatewayConfig::from_toml(
//!     r#"
//!     enabled = true
//!     url = "https://billing.example.com"
//!     api_key_env = "BILLING_API_KEY"
//!
//!     [cache]
//!     plans_ttl_seconds = 600
//!     backend = "memory"
//! "#,
//! )?;
//! let gateway = BillingGateway::from_config(&config)?;
//!
//! let context = MetricsContext::new().with("flow_id", "abc123");
//! let plans = gateway.list_plans(Some(&context)).await?;
//! println!("{} plans", plans.len());
//!
//! gateway.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Module Organization
//!
//! - [`gateway`]: domain-facing API, one method per billing operation
//! - [`operations`]: operation table (endpoints, payload fields, status translations)
//! - [`backend`]: HTTP client for the billing backend
//! - [`cache`]: advisory response cache (Redis, in-memory)
//! - [`metrics`]: per-call flow events
//! - [`models`]: wire types
//! - [`payment`]: payment submission coordinator
//! - [`config`]: TOML configuration
//! - [`error`]: error types with recovery guidance
//!
//! # Error Handling
//!
//! All gateway operations return [`Result<T, GatewayError>`](error::Result).
//! Backend statuses with a caller-facing meaning are translated into domain
//! variants; everything else passes through with the status and body:
//!
//! ```rust,no_run
//! use billing_gateway::{BillingGateway, GatewayError};
//!
//! # async fn example(gateway: &BillingGateway) {
//! match gateway.cancel_subscription("uid-1", "sub-1", None).await {
//!     Ok(response) => println!("{}", response.message),
//!     Err(GatewayError::UnknownCustomer { uid }) => eprintln!("no customer {uid}"),
//!     Err(GatewayError::UnknownSubscription { subscription_id }) => {
//!         eprintln!("no subscription {subscription_id}");
//!     }
//!     Err(GatewayError::FeatureNotEnabled) => eprintln!("billing is disabled"),
//!     Err(e) => eprintln!("billing request failed: {e}"),
//! }
//! # }
//! ```

#![warn(missing_docs)]
#![warn(missing_debug_implementations)]
#![allow(
    clippy::multiple_crate_versions,
    reason = "transitive dependencies from redis and reqwest"
)]

pub mod backend;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod metrics;
pub mod models;
pub mod operations;
pub mod payment;

pub use config::GatewayConfig;
pub use error::{GatewayError, Result};
pub use gateway::BillingGateway;
