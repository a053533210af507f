//! Billing data models.
//!
//! Wire types exchanged with the billing backend. Field names follow the
//! backend's JSON contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel returned by `delete_customer` when the backend no longer knows the customer.
pub const UNKNOWN_CUSTOMER_MESSAGE: &str = "unknown customer";

/// Backend-defined subscription offering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier.
    pub plan_id: String,
    /// Product the plan belongs to.
    pub product_id: String,
    /// Display name of the plan.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_name: Option<String>,
    /// Display name of the product.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    /// Billing interval (`day`, `week`, `month`, `year`).
    pub interval: String,
    /// Number of intervals between billings.
    #[serde(default = "default_interval_count")]
    pub interval_count: u32,
    /// Price in minor currency units.
    pub amount: i64,
    /// ISO 4217 currency code.
    pub currency: String,
    /// Free-form product metadata.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn default_interval_count() -> u32 {
    1
}

/// Payment provider a customer is affiliated with.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentProvider {
    /// No payment method on file.
    #[default]
    None,
    /// Card payments through the card processor.
    #[serde(alias = "stripe")]
    Card,
    /// Wallet payments with a saved billing agreement.
    #[serde(alias = "paypal")]
    Wallet,
}

/// Billing state of a single subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription identifier.
    pub subscription_id: String,
    /// Plan subscribed to.
    pub plan_id: String,
    /// Plan display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_name: Option<String>,
    /// Processor status (`active`, `past_due`, `canceled`, ...).
    pub status: String,
    /// Start of the current period, unix seconds.
    pub current_period_start: i64,
    /// End of the current period, unix seconds.
    pub current_period_end: i64,
    /// Whether the subscription ends with the current period.
    #[serde(default)]
    pub cancel_at_period_end: bool,
    /// Unix time at which the subscription ended, if it has.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_at: Option<i64>,
}

impl Subscription {
    /// End of the current period as a timestamp.
    #[must_use]
    pub fn current_period_end_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.current_period_end, 0)
    }

    /// Whether the subscription is currently active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

/// `{ subscriptions: [...] }` envelope.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionList {
    /// Subscriptions, in backend order.
    pub subscriptions: Vec<Subscription>,
}

/// Account billing identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Account identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Provider the customer pays through.
    #[serde(default, deserialize_with = "nullable_provider")]
    pub payment_provider: PaymentProvider,
    /// Payment method type reported by the processor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_type: Option<String>,
    /// Last four digits of the card on file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last4: Option<String>,
    /// Card brand.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    /// Card expiry month.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_month: Option<u8>,
    /// Card expiry year.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp_year: Option<u16>,
    /// Subscriptions, in backend order.
    #[serde(default)]
    pub subscriptions: Vec<Subscription>,
}

impl Customer {
    /// Whether the customer has any subscription.
    #[must_use]
    pub fn has_subscriptions(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Whether a card is on file for an existing subscriber.
    #[must_use]
    pub fn has_existing_card(&self) -> bool {
        self.last4.is_some() && self.has_subscriptions()
    }

    /// Whether the customer is affiliated with a payment provider.
    #[must_use]
    pub fn has_payment_provider(&self) -> bool {
        self.payment_provider != PaymentProvider::None
    }
}

fn nullable_provider<'de, D>(deserializer: D) -> Result<PaymentProvider, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<PaymentProvider>::deserialize(deserializer)?.unwrap_or_default())
}

/// `{ message }` body returned by delete, cancel and reactivate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Backend status message.
    pub message: String,
}

impl MessageResponse {
    /// Response used when deleting a customer the backend does not know.
    #[must_use]
    pub fn unknown_customer() -> Self {
        Self { message: UNKNOWN_CUSTOMER_MESSAGE.to_owned() }
    }
}

/// Body of `update_customer`.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateCustomerRequest<'a> {
    /// Payment token from the processor.
    pub pmt_token: &'a str,
}

/// Caller-supplied details of a new subscription.
#[derive(Clone, Copy)]
pub struct NewSubscription<'a> {
    /// Payment token from the processor.
    pub pmt_token: &'a str,
    /// Plan to subscribe to.
    pub plan_id: &'a str,
    /// Customer display name.
    pub display_name: &'a str,
    /// Customer email address.
    pub email: &'a str,
}

impl std::fmt::Debug for NewSubscription<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewSubscription")
            .field("pmt_token", &"<redacted>")
            .field("plan_id", &self.plan_id)
            .field("display_name", &self.display_name)
            .field("email", &"<redacted>")
            .finish()
    }
}

/// Body of `create_subscription`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateSubscriptionRequest<'a> {
    /// Payment token from the processor.
    pub pmt_token: &'a str,
    /// Plan to subscribe to.
    pub plan_id: &'a str,
    /// Customer display name.
    pub display_name: &'a str,
    /// Customer email address.
    pub email: &'a str,
    /// System originating the request.
    pub origin_system: &'a str,
}

impl<'a> CreateSubscriptionRequest<'a> {
    /// Builds the wire body for `subscription`.
    #[must_use]
    pub fn new(subscription: &NewSubscription<'a>, origin_system: &'a str) -> Self {
        Self {
            pmt_token: subscription.pmt_token,
            plan_id: subscription.plan_id,
            display_name: subscription.display_name,
            email: subscription.email,
            origin_system,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_plan_defaults() {
        let plan: Plan = serde_json::from_value(json!({
            "plan_id": "plan_123",
            "product_id": "prod_123",
            "interval": "month",
            "amount": 500,
            "currency": "usd"
        }))
        .unwrap();

        assert_eq!(plan.interval_count, 1);
        assert!(plan.metadata.is_empty());
        assert!(plan.plan_name.is_none());
    }

    #[test]
    fn test_payment_provider_aliases() {
        let provider: PaymentProvider = serde_json::from_value(json!("stripe")).unwrap();
        assert_eq!(provider, PaymentProvider::Card);

        let provider: PaymentProvider = serde_json::from_value(json!("paypal")).unwrap();
        assert_eq!(provider, PaymentProvider::Wallet);

        let provider: PaymentProvider = serde_json::from_value(json!("none")).unwrap();
        assert_eq!(provider, PaymentProvider::None);
    }

    #[test]
    fn test_customer_without_provider() {
        let customer: Customer = serde_json::from_value(json!({
            "payment_provider": null,
            "subscriptions": []
        }))
        .unwrap();

        assert_eq!(customer.payment_provider, PaymentProvider::None);
        assert!(!customer.has_payment_provider());
        assert!(!customer.has_existing_card());
    }

    #[test]
    fn test_customer_existing_card() {
        let customer: Customer = serde_json::from_value(json!({
            "payment_provider": "stripe",
            "last4": "4242",
            "subscriptions": [{
                "subscription_id": "sub_1",
                "plan_id": "plan_1",
                "status": "active",
                "current_period_start": 1_565_816_388,
                "current_period_end": 1_568_408_388
            }]
        }))
        .unwrap();

        assert!(customer.has_payment_provider());
        assert!(customer.has_existing_card());
        let sub = &customer.subscriptions[0];
        assert!(sub.is_active());
        assert!(!sub.cancel_at_period_end);
        assert_eq!(sub.current_period_end_at().map(|t| t.timestamp()), Some(1_568_408_388));
    }

    #[test]
    fn test_card_without_subscriptions_is_not_existing() {
        let customer = Customer { last4: Some("4242".to_owned()), ..Default::default() };
        assert!(!customer.has_existing_card());
    }

    #[test]
    fn test_new_subscription_debug_redacts_secrets() {
        let subscription = NewSubscription {
            pmt_token: "tok_secret",
            plan_id: "plan_1",
            display_name: "Jane",
            email: "jane@example.com",
        };
        let debug = format!("{subscription:?}");
        assert!(!debug.contains("tok_secret"));
        assert!(!debug.contains("jane@example.com"));
        assert!(debug.contains("plan_1"));
    }

    #[test]
    fn test_create_subscription_request_shape() {
        let subscription = NewSubscription {
            pmt_token: "tok_1",
            plan_id: "plan_1",
            display_name: "Jane",
            email: "jane@example.com",
        };
        let body = CreateSubscriptionRequest::new(&subscription, "fxa");
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(
            value,
            json!({
                "pmt_token": "tok_1",
                "plan_id": "plan_1",
                "display_name": "Jane",
                "email": "jane@example.com",
                "origin_system": "fxa"
            })
        );
    }
}
