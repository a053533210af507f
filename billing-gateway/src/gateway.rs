//! Domain-facing billing API.
//!
//! [`BillingGateway`] exposes one method per billing operation. Each call is
//! timed by the [`MetricsRecorder`], sent through the [`BackendServiceClient`]
//! and, on failure, translated through the [`operations`](crate::operations)
//! table into a stable [`GatewayError`]. Plan listings are read through the
//! [`ResponseCache`].

#[allow(
    redundant_imports,
    reason = "Future needed for RPITIT despite being in Edition 2024 prelude"
)]
use std::future::Future;

use tracing::{error, info, instrument};

use crate::{
    backend::BackendServiceClient,
    cache::{CacheStore, ConfiguredStore, ResponseCache},
    config::GatewayConfig,
    error::{GatewayError, Result},
    metrics::{EventSink, MetricsContext, MetricsRecorder, TracingSink},
    models::{
        CreateSubscriptionRequest, Customer, MessageResponse, NewSubscription, Plan,
        SubscriptionList, UpdateCustomerRequest,
    },
    operations::{
        CANCEL_SUBSCRIPTION, CREATE_SUBSCRIPTION, CallIds, DELETE_CUSTOMER, GET_CUSTOMER,
        LIST_PLANS, LIST_SUBSCRIPTIONS, Operation, REACTIVATE_SUBSCRIPTION, Recovery, Resolution,
        UPDATE_CUSTOMER,
    },
};

/// Response types that a status rule may synthesize from a failure.
trait Recoverable: Sized {
    fn recover(_recovery: Recovery) -> Option<Self> {
        None
    }
}

impl Recoverable for Vec<Plan> {}

impl Recoverable for Customer {}

impl Recoverable for SubscriptionList {
    fn recover(recovery: Recovery) -> Option<Self> {
        (recovery == Recovery::EmptySubscriptionList).then(Self::default)
    }
}

impl Recoverable for MessageResponse {
    fn recover(recovery: Recovery) -> Option<Self> {
        (recovery == Recovery::AlreadyAbsent).then(Self::unknown_customer)
    }
}

/// Billing gateway.
///
/// Built disabled (every call fails with [`GatewayError::FeatureNotEnabled`]
/// and performs no I/O) or enabled with a backend client. Safe to share
/// across tasks behind an `Arc`.
///
/// # Examples
///
/// ```rust,no_run
/// use billing_gateway::{BillingGateway, GatewayConfig, GatewayError};
///
/// # async fn example() -> billing_gateway::Result<()> {
/// let config = GatewayConfig::from_file("billing.toml")?;
/// let gateway = BillingGateway::from_config(&config)?;
///
/// match gateway.get_customer("uid-123", None).await {
///     Ok(customer) => println!("{} subscriptions", customer.subscriptions.len()),
///     Err(GatewayError::UnknownCustomer { uid }) => println!("no billing record for {uid}"),
///     Err(e) => return Err(e),
/// }
///
/// gateway.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct BillingGateway<S = ConfiguredStore, E = TracingSink> {
    client: Option<BackendServiceClient>,
    cache: ResponseCache<S>,
    metrics: MetricsRecorder<E>,
    origin_system: String,
}

impl BillingGateway {
    /// Builds a gateway from configuration.
    ///
    /// A configuration with `enabled = false` yields a disabled gateway
    /// without resolving the URL, the credential or the cache store.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::ConfigError`] if the enabled configuration is
    /// invalid, or [`GatewayError::Transport`] if the HTTP client cannot be built.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        if !config.enabled {
            return Ok(Self::disabled());
        }
        config.validate()?;

        let client = BackendServiceClient::from_config(config)?;
        let store = ConfiguredStore::from_config(&config.cache)
            .map_err(|e| GatewayError::ConfigError(format!("cache: {e}")))?;
        let cache = ResponseCache::new(store, config.cache.plans_ttl())
            .with_key_prefix(config.cache.key_prefix.clone())
            .with_operation_timeout(config.cache.operation_timeout());
        let metrics =
            MetricsRecorder::new(TracingSink).with_prefix(config.metrics_event_prefix.clone());

        Ok(Self::new(client, cache, metrics).with_origin_system(config.origin_system.clone()))
    }

    /// Builds a gateway whose every call fails with [`GatewayError::FeatureNotEnabled`].
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            client: None,
            cache: ResponseCache::disabled(),
            metrics: MetricsRecorder::default(),
            origin_system: String::new(),
        }
    }
}

impl<S: CacheStore, E: EventSink> BillingGateway<S, E> {
    /// Builds an enabled gateway from its parts.
    #[must_use]
    pub fn new(
        client: BackendServiceClient,
        cache: ResponseCache<S>,
        metrics: MetricsRecorder<E>,
    ) -> Self {
        Self { client: Some(client), cache, metrics, origin_system: "fxa".to_owned() }
    }

    /// Sets the `origin_system` sent when creating subscriptions.
    #[must_use]
    pub fn with_origin_system(mut self, origin_system: impl Into<String>) -> Self {
        self.origin_system = origin_system.into();
        self
    }

    /// Whether the gateway talks to the backend.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.client.is_some()
    }

    /// Response cache.
    #[must_use]
    pub fn cache(&self) -> &ResponseCache<S> {
        &self.cache
    }

    /// Metrics recorder.
    #[must_use]
    pub fn metrics(&self) -> &MetricsRecorder<E> {
        &self.metrics
    }

    fn client(&self) -> Result<&BackendServiceClient> {
        self.client.as_ref().ok_or(GatewayError::FeatureNotEnabled)
    }

    /// Lists available plans, served from cache within the configured TTL.
    ///
    /// The cache write after a backend fetch runs in the background and never
    /// delays the response.
    ///
    /// # Errors
    ///
    /// Backend failures pass through unchanged.
    #[instrument(skip(self, metrics))]
    pub async fn list_plans(&self, metrics: Option<&MetricsContext>) -> Result<Vec<Plan>>
    where
        S: Clone + 'static,
    {
        let client = self.client()?;
        let key = LIST_PLANS.name();

        if let Some(plans) = self.cache.get::<Vec<Plan>>(key).await {
            return Ok(plans);
        }

        let call = client.call(&LIST_PLANS.endpoint, &[], None::<&()>);
        let plans: Vec<Plan> =
            self.execute(&LIST_PLANS, CallIds::default(), metrics, call).await?;
        self.cache.spawn_set(key, &plans);
        Ok(plans)
    }

    /// Lists a customer's subscriptions.
    ///
    /// A 403 from the backend means the customer has no billing record yet and
    /// yields an empty list.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::UnknownCustomer`] on 404
    #[instrument(skip(self, metrics))]
    pub async fn list_subscriptions(
        &self,
        uid: &str,
        metrics: Option<&MetricsContext>,
    ) -> Result<SubscriptionList> {
        let client = self.client()?;
        let ids = CallIds { uid: Some(uid), ..Default::default() };
        let params = [("uid", uid)];
        let call = client.call(&LIST_SUBSCRIPTIONS.endpoint, &params, None::<&()>);
        self.execute(&LIST_SUBSCRIPTIONS, ids, metrics, call).await
    }

    /// Subscribes a customer to a plan and returns their subscriptions.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::UnknownSubscriptionPlan`] on 404
    /// - [`GatewayError::RejectedPaymentToken`] on 400 or 402
    #[instrument(skip(self, subscription, metrics), fields(plan_id = subscription.plan_id))]
    pub async fn create_subscription(
        &self,
        uid: &str,
        subscription: &NewSubscription<'_>,
        metrics: Option<&MetricsContext>,
    ) -> Result<SubscriptionList> {
        let client = self.client()?;
        let ids =
            CallIds { uid: Some(uid), plan_id: Some(subscription.plan_id), ..Default::default() };
        let body = CreateSubscriptionRequest::new(subscription, &self.origin_system);
        let params = [("uid", uid)];
        let call = client.call(&CREATE_SUBSCRIPTION.endpoint, &params, Some(&body));
        self.execute(&CREATE_SUBSCRIPTION, ids, metrics, call).await
    }

    /// Cancels a subscription at the end of its period.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::UnknownCustomer`] on 404 `invalid uid`
    /// - [`GatewayError::UnknownSubscription`] on 404 `invalid subscription id`
    #[instrument(skip(self, metrics))]
    pub async fn cancel_subscription(
        &self,
        uid: &str,
        sub_id: &str,
        metrics: Option<&MetricsContext>,
    ) -> Result<MessageResponse> {
        let client = self.client()?;
        let ids = CallIds { uid: Some(uid), sub_id: Some(sub_id), ..Default::default() };
        let params = [("uid", uid), ("sub_id", sub_id)];
        let call = client.call(&CANCEL_SUBSCRIPTION.endpoint, &params, None::<&()>);
        self.execute(&CANCEL_SUBSCRIPTION, ids, metrics, call).await
    }

    /// Reverses a pending cancellation.
    ///
    /// # Errors
    ///
    /// Same translations as [`cancel_subscription`](Self::cancel_subscription).
    #[instrument(skip(self, metrics))]
    pub async fn reactivate_subscription(
        &self,
        uid: &str,
        sub_id: &str,
        metrics: Option<&MetricsContext>,
    ) -> Result<MessageResponse> {
        let client = self.client()?;
        let ids = CallIds { uid: Some(uid), sub_id: Some(sub_id), ..Default::default() };
        let params = [("uid", uid), ("sub_id", sub_id)];
        let call = client.call(&REACTIVATE_SUBSCRIPTION.endpoint, &params, None::<&()>);
        self.execute(&REACTIVATE_SUBSCRIPTION, ids, metrics, call).await
    }

    /// Reads a customer's billing record.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::UnknownCustomer`] on 404
    #[instrument(skip(self, metrics))]
    pub async fn get_customer(
        &self,
        uid: &str,
        metrics: Option<&MetricsContext>,
    ) -> Result<Customer> {
        let client = self.client()?;
        let ids = CallIds { uid: Some(uid), ..Default::default() };
        let params = [("uid", uid)];
        let call = client.call(&GET_CUSTOMER.endpoint, &params, None::<&()>);
        self.execute(&GET_CUSTOMER, ids, metrics, call).await
    }

    /// Replaces a customer's payment method.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::UnknownCustomer`] on 404
    /// - [`GatewayError::RejectedCustomerUpdate`] on 400 or 402
    #[instrument(skip(self, pmt_token, metrics))]
    pub async fn update_customer(
        &self,
        uid: &str,
        pmt_token: &str,
        metrics: Option<&MetricsContext>,
    ) -> Result<Customer> {
        let client = self.client()?;
        let ids = CallIds { uid: Some(uid), ..Default::default() };
        let body = UpdateCustomerRequest { pmt_token };
        let params = [("uid", uid)];
        let call = client.call(&UPDATE_CUSTOMER.endpoint, &params, Some(&body));
        self.execute(&UPDATE_CUSTOMER, ids, metrics, call).await
    }

    /// Deletes a customer's billing record.
    ///
    /// Deleting an unknown customer succeeds with the `unknown customer` message.
    ///
    /// # Errors
    ///
    /// Backend failures other than 404 pass through unchanged.
    #[instrument(skip(self, metrics))]
    pub async fn delete_customer(
        &self,
        uid: &str,
        metrics: Option<&MetricsContext>,
    ) -> Result<MessageResponse> {
        let client = self.client()?;
        let ids = CallIds { uid: Some(uid), ..Default::default() };
        let params = [("uid", uid)];
        let call = client.call(&DELETE_CUSTOMER.endpoint, &params, None::<&()>);
        self.execute(&DELETE_CUSTOMER, ids, metrics, call).await
    }

    /// Releases the HTTP client and the cache store concurrently.
    pub async fn close(self) {
        let Self { client, cache, .. } = self;
        let release_client = async move {
            if let Some(client) = client {
                client.close();
            }
        };
        tokio::join!(release_client, cache.close());
    }

    /// Times `call` and translates its failure for `op`.
    async fn execute<T, F>(
        &self,
        op: &Operation,
        ids: CallIds<'_>,
        metrics: Option<&MetricsContext>,
        call: F,
    ) -> Result<T>
    where
        T: Recoverable,
        F: Future<Output = Result<T>>,
    {
        let err = match self.metrics.wrap(op.name(), metrics, call).await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let backend = match err {
            GatewayError::Backend(backend) => backend,
            err => {
                error!(
                    operation = op.name(),
                    uid = ?ids.uid,
                    sub_id = ?ids.sub_id,
                    plan_id = ?ids.plan_id,
                    error = %err,
                    "billing request failed"
                );
                return Err(err);
            }
        };

        let translated = match op.translate(&backend, &ids) {
            Resolution::Fail(domain) => domain,
            Resolution::Recover(recovery) => {
                if let Some(value) = T::recover(recovery) {
                    info!(
                        operation = op.name(),
                        uid = ?ids.uid,
                        status = backend.status,
                        ?recovery,
                        "backend status mapped to success"
                    );
                    return Ok(value);
                }
                GatewayError::Backend(backend.clone())
            }
            Resolution::Passthrough => GatewayError::Backend(backend.clone()),
        };

        error!(
            operation = op.name(),
            uid = ?ids.uid,
            sub_id = ?ids.sub_id,
            plan_id = ?ids.plan_id,
            status = backend.status,
            message = %backend.message,
            error = %translated,
            "billing request failed"
        );
        Err(translated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_gateway_rejects_every_call() {
        let gateway = BillingGateway::disabled();
        assert!(!gateway.is_enabled());

        let subscription = NewSubscription {
            pmt_token: "tok",
            plan_id: "plan",
            display_name: "Jane",
            email: "jane@example.com",
        };

        assert!(matches!(gateway.list_plans(None).await, Err(GatewayError::FeatureNotEnabled)));
        assert!(matches!(
            gateway.list_subscriptions("u1", None).await,
            Err(GatewayError::FeatureNotEnabled)
        ));
        assert!(matches!(
            gateway.create_subscription("u1", &subscription, None).await,
            Err(GatewayError::FeatureNotEnabled)
        ));
        assert!(matches!(
            gateway.cancel_subscription("u1", "s1", None).await,
            Err(GatewayError::FeatureNotEnabled)
        ));
        assert!(matches!(
            gateway.reactivate_subscription("u1", "s1", None).await,
            Err(GatewayError::FeatureNotEnabled)
        ));
        assert!(matches!(
            gateway.get_customer("u1", None).await,
            Err(GatewayError::FeatureNotEnabled)
        ));
        assert!(matches!(
            gateway.update_customer("u1", "tok", None).await,
            Err(GatewayError::FeatureNotEnabled)
        ));
        assert!(matches!(
            gateway.delete_customer("u1", None).await,
            Err(GatewayError::FeatureNotEnabled)
        ));

        gateway.close().await;
    }

    #[test]
    fn test_from_disabled_config() {
        let gateway = BillingGateway::from_config(&GatewayConfig::default()).unwrap();
        assert!(!gateway.is_enabled());
    }

    #[test]
    fn test_from_enabled_config() {
        let config = GatewayConfig::from_toml(
            r#"
            enabled = true
            url = "https://subhub.example.com"
            api_key = "secret"
        "#,
        )
        .unwrap();
        let gateway = BillingGateway::from_config(&config).unwrap();
        assert!(gateway.is_enabled());
        assert_eq!(gateway.origin_system, "fxa");
    }

    #[test]
    fn test_recoverable_types() {
        assert_eq!(
            SubscriptionList::recover(Recovery::EmptySubscriptionList),
            Some(SubscriptionList::default())
        );
        assert!(SubscriptionList::recover(Recovery::AlreadyAbsent).is_none());
        assert_eq!(
            MessageResponse::recover(Recovery::AlreadyAbsent),
            Some(MessageResponse::unknown_customer())
        );
        assert!(Customer::recover(Recovery::AlreadyAbsent).is_none());
        assert!(<Vec<Plan>>::recover(Recovery::EmptySubscriptionList).is_none());
    }
}
