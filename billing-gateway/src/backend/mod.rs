//! HTTP client for the billing backend.
//!
//! [`BackendServiceClient`] turns an [`Endpoint`] plus call-time arguments
//! into an authenticated JSON request. It never interprets status codes:
//! every non-2xx answer becomes a [`BackendError`] carrying the status and
//! body, and the caller decides what it means.

use std::time::Duration;

use reqwest::Client;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, instrument};
use url::Url;

use crate::{
    config::GatewayConfig,
    error::{BackendError, GatewayError, Result},
};

mod endpoint;

pub use endpoint::{Endpoint, HttpMethod};

/// Authenticated JSON client for the billing backend.
///
/// Holds a pooled [`reqwest::Client`]; cheap to share behind an `Arc` and safe
/// for concurrent use.
///
/// # Examples
///
/// ```rust,no_run
/// use billing_gateway::{backend::BackendServiceClient, models::Plan, operations};
/// use url::Url;
///
/// # async fn example() -> billing_gateway::Result<()> {
/// let base = Url::parse("https://subhub.example.com").unwrap();
/// let timeout = std::time::Duration::from_secs(15);
/// let client = BackendServiceClient::new(base, "secret".to_owned(), timeout)?;
///
/// let plans: Vec<Plan> = client.call(&operations::LIST_PLANS.endpoint, &[], None::<&()>).await?;
/// println!("{} plans", plans.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BackendServiceClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl BackendServiceClient {
    /// Creates a client with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built.
    pub fn new(base_url: Url, api_key: String, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, api_key))
    }

    /// Creates a client from gateway configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the URL or credential is invalid, or the HTTP client
    /// cannot be built.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .timeout(config.timeout())
            .connect_timeout(config.connect_timeout())
            .build()?;
        Ok(Self::with_client(client, config.base_url()?, config.resolve_api_key()?))
    }

    /// Wraps an existing HTTP client.
    #[must_use]
    pub fn with_client(client: Client, base_url: Url, api_key: String) -> Self {
        Self { client, base_url, api_key }
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Executes one backend operation.
    ///
    /// Validates `params` and `body` against the endpoint, sends the request
    /// with bearer authentication and decodes a 2xx body as `T`.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::InvalidRequest`] if a path parameter or payload field
    ///   is missing; no request is sent
    /// - [`GatewayError::Transport`] on network failure or timeout
    /// - [`GatewayError::Backend`] on any non-2xx status
    /// - [`GatewayError::InvalidResponse`] if a 2xx body does not decode as `T`
    #[instrument(
        skip(self, endpoint, params, body),
        fields(operation = endpoint.name, method = %endpoint.method, status = tracing::field::Empty)
    )]
    pub async fn call<T, B>(
        &self,
        endpoint: &Endpoint,
        params: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = endpoint.resolve(&self.base_url, params)?;
        let payload = body
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| GatewayError::InvalidRequest(format!("{}: {e}", endpoint.name)))?;
        endpoint.check_payload(payload.as_ref())?;

        let mut request =
            self.client.request(endpoint.method.into(), url).bearer_auth(&self.api_key);
        if let Some(ref payload) = payload {
            request = request.json(payload);
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::Span::current().record("status", status.as_u16());
        let text = response.text().await?;

        if !status.is_success() {
            debug!(status = status.as_u16(), "backend returned error status");
            return Err(GatewayError::Backend(BackendError {
                operation: endpoint.name,
                status: status.as_u16(),
                message: error_message(&text),
                body: text,
            }));
        }

        serde_json::from_str(&text)
            .map_err(|e| GatewayError::InvalidResponse(format!("{}: {e}", endpoint.name)))
    }

    /// Releases the connection pool.
    pub fn close(self) {
        drop(self.client);
        debug!("backend client closed");
    }
}

/// Extracts `message` from a `{message}` error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: String,
    }

    serde_json::from_str::<ErrorBody>(body).map_or_else(|_| body.trim().to_owned(), |b| b.message)
}
