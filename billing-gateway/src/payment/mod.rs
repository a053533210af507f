//! Client-side payment submission.
//!
//! A payment form submission either tokenizes a card with the payment
//! processor and hands the resulting payment method to the subscription
//! server, or, for wallet customers, asks the server to charge the method it
//! already has on file. [`PaymentSubmissionCoordinator`] drives one
//! submission cycle, including the card-declined challenge that lets the
//! customer retry the same invoice with a new card.
//!
//! The processor and the server are reached through the [`PaymentProcessor`]
//! and [`SubscriptionApi`] traits so callers can plug in their own clients.

#[allow(
    redundant_imports,
    reason = "Future needed for RPITIT despite being in Edition 2024 prelude"
)]
use std::future::Future;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Customer, PaymentProvider};

mod coordinator;

pub use self::coordinator::{
    IgnoreReason, NoopObserver, PaymentSubmissionCoordinator, SubmissionObserver, SubmissionState,
    SubmitOutcome,
};

/// Idempotency key attached to every server submission of a cycle.
///
/// A challenge retry reuses the key so the server resumes the same payment
/// intent; every new cycle gets a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(Uuid);

impl IdempotencyKey {
    /// Generates a random key.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Category of a [`PaymentError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentErrorKind {
    /// The card was declined or is unusable.
    CardError,
    /// The card details failed processor-side validation.
    ValidationError,
    /// The processor or subscription server failed.
    ApiError,
    /// The request was malformed.
    InvalidRequestError,
    /// Credentials were rejected.
    AuthenticationError,
    /// Too many requests.
    RateLimitError,
}

impl PaymentErrorKind {
    /// Wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CardError => "card_error",
            Self::ValidationError => "validation_error",
            Self::ApiError => "api_error",
            Self::InvalidRequestError => "invalid_request_error",
            Self::AuthenticationError => "authentication_error",
            Self::RateLimitError => "rate_limit_error",
        }
    }
}

impl fmt::Display for PaymentErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-side payment failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentError {
    /// Error category.
    #[serde(rename = "type")]
    pub kind: PaymentErrorKind,
    /// Processor error code, e.g. `card_declined`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PaymentError {
    /// Creates an error of `kind` with no code or message.
    #[must_use]
    pub const fn new(kind: PaymentErrorKind) -> Self {
        Self { kind, code: None, message: None }
    }

    /// Sets the error code.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Sets the message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// `card_error/card_declined`, surfaced when the payment method needs
    /// replacing.
    #[must_use]
    pub fn card_declined() -> Self {
        Self::new(PaymentErrorKind::CardError).with_code("card_declined")
    }

    /// Whether this is a card decline.
    #[must_use]
    pub fn is_card_declined(&self) -> bool {
        self.kind == PaymentErrorKind::CardError && self.code.as_deref() == Some("card_declined")
    }
}

impl fmt::Display for PaymentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(code) = &self.code {
            write!(f, "/{code}")?;
        }
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        Ok(())
    }
}

impl std::error::Error for PaymentError {}

/// Invoice and payment method of a declined attempt, kept for the retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryStatus {
    /// Open invoice to retry.
    pub invoice_id: String,
    /// Payment method that was declined.
    pub payment_method_id: String,
}

/// Payment method created by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethod {
    /// Processor identifier of the method.
    pub id: String,
}

/// Opaque handle to card details collected by the processor's UI element.
///
/// The card number never passes through this crate.
#[derive(Clone, PartialEq, Eq)]
pub struct CardInput {
    /// Processor-side element reference.
    pub element: String,
    /// Whether the processor element reports complete, valid input.
    pub complete: bool,
}

impl fmt::Debug for CardInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardInput")
            .field("element", &"<redacted>")
            .field("complete", &self.complete)
            .finish()
    }
}

/// Why a submission form was rejected before reaching the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FormError {
    /// No price was selected.
    #[error("price is required")]
    MissingPrice,
    /// The billing name is blank.
    #[error("name is required")]
    MissingName,
    /// Card details are missing or incomplete.
    #[error("card details are incomplete")]
    IncompleteCard,
    /// The payment terms were not accepted.
    #[error("payment terms must be accepted")]
    TermsNotAccepted,
}

/// Payment form contents for one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionForm {
    /// Price (plan) being purchased.
    pub price_id: String,
    /// Name on the card.
    pub display_name: String,
    /// Card details; ignored on the saved-method path.
    pub card: Option<CardInput>,
    /// Whether the customer accepted the payment terms.
    pub accepted_terms: bool,
}

impl SubmissionForm {
    /// Checks the fields `strategy` needs.
    ///
    /// # Errors
    ///
    /// Returns the first failing check.
    pub fn validate(&self, strategy: SubmissionStrategy) -> Result<(), FormError> {
        if self.price_id.trim().is_empty() {
            return Err(FormError::MissingPrice);
        }
        if !self.accepted_terms {
            return Err(FormError::TermsNotAccepted);
        }
        if strategy == SubmissionStrategy::CardTokenization {
            if self.display_name.trim().is_empty() {
                return Err(FormError::MissingName);
            }
            if !self.card.as_ref().is_some_and(|card| card.complete) {
                return Err(FormError::IncompleteCard);
            }
        }
        Ok(())
    }
}

/// How a submission reaches a payment method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionStrategy {
    /// Tokenize the entered card, then submit the new payment method.
    CardTokenization,
    /// Charge the method the server already holds (wallet billing agreement).
    SavedMethod,
}

impl SubmissionStrategy {
    /// Strategy for `customer`'s payment provider.
    #[must_use]
    pub const fn for_customer(customer: &Customer) -> Self {
        match customer.payment_provider {
            PaymentProvider::Wallet => Self::SavedMethod,
            PaymentProvider::None | PaymentProvider::Card => Self::CardTokenization,
        }
    }
}

/// Status of a server-side payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    /// Paid.
    Succeeded,
    /// Customer authentication (e.g. 3-D Secure) is needed.
    RequiresAction,
    /// The payment method was declined and must be replaced.
    RequiresPaymentMethod,
    /// Awaiting confirmation.
    RequiresConfirmation,
    /// Still processing.
    Processing,
    /// Canceled.
    Canceled,
    /// Any status this crate does not know.
    #[serde(other)]
    Unknown,
}

/// Payment intent attached to an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Intent status.
    pub status: PaymentIntentStatus,
    /// Secret used to confirm the intent client-side.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// Invoice returned with a subscription result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Invoice identifier.
    pub id: String,
    /// Intent collecting the invoice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_intent: Option<PaymentIntent>,
}

/// Subscription server answer to a create or retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionResult {
    /// Subscription identifier.
    pub id: String,
    /// Subscription status (`active`, `incomplete`, ...).
    pub status: String,
    /// Latest invoice, absent for free plans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_invoice: Option<Invoice>,
}

impl SubscriptionResult {
    /// Whether the subscription is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }

    /// Payment intent of the latest invoice.
    #[must_use]
    pub fn payment_intent(&self) -> Option<&PaymentIntent> {
        self.latest_invoice.as_ref().and_then(|invoice| invoice.payment_intent.as_ref())
    }
}

/// Body of a card-path subscription create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentMethodSubscription {
    /// Price being purchased.
    pub price_id: String,
    /// Tokenized payment method.
    pub payment_method_id: String,
    /// Cycle idempotency key.
    pub idempotency_key: IdempotencyKey,
}

/// Body of a saved-method subscription create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SavedMethodSubscription {
    /// Price being purchased.
    pub price_id: String,
    /// Cycle idempotency key.
    pub idempotency_key: IdempotencyKey,
}

/// Body of an invoice retry after a decline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvoiceRetry {
    /// Invoice to retry.
    pub invoice_id: String,
    /// Replacement payment method.
    pub payment_method_id: String,
    /// Cycle idempotency key, the same as the declined attempt's.
    pub idempotency_key: IdempotencyKey,
}

/// Client of the payment processor.
pub trait PaymentProcessor: Send + Sync {
    /// Turns collected card details into a payment method.
    fn tokenize_card<'a>(
        &'a self,
        card: &'a CardInput,
        billing_name: &'a str,
    ) -> impl Future<Output = Result<PaymentMethod, PaymentError>> + Send + 'a;

    /// Completes customer authentication for an intent.
    fn confirm_payment<'a>(
        &'a self,
        client_secret: &'a str,
        payment_method_id: &'a str,
    ) -> impl Future<Output = Result<(), PaymentError>> + Send + 'a;
}

/// Client of the subscription server.
pub trait SubscriptionApi: Send + Sync {
    /// Creates a subscription paid by a freshly tokenized method.
    fn create_subscription_with_payment_method<'a>(
        &'a self,
        request: &'a PaymentMethodSubscription,
    ) -> impl Future<Output = Result<SubscriptionResult, PaymentError>> + Send + 'a;

    /// Creates a subscription paid by the customer's saved method.
    fn create_subscription_with_saved_method<'a>(
        &'a self,
        request: &'a SavedMethodSubscription,
    ) -> impl Future<Output = Result<SubscriptionResult, PaymentError>> + Send + 'a;

    /// Retries an open invoice with a replacement method.
    fn retry_invoice<'a>(
        &'a self,
        request: &'a InvoiceRetry,
    ) -> impl Future<Output = Result<SubscriptionResult, PaymentError>> + Send + 'a;

    /// Detaches a declined method from the customer.
    fn detach_failed_payment_method<'a>(
        &'a self,
        payment_method_id: &'a str,
    ) -> impl Future<Output = Result<(), PaymentError>> + Send + 'a;
}
