//! Single-flight payment submission state machine.
//!
//! ```text
//!            submit                      active / confirmed
//! Idle ─────────────► Submitting ─────────────────────────► Succeeded
//!  ▲                   │    ▲   │ error / unexpected / 2nd decline
//!  │                   │    │   └──────────────────────────► Failed
//!  │     first decline │    │ submit (same key, retry_invoice)
//!  │                   ▼    │
//!  │            ChallengePending
//!  └──── reset() from any state
//! ```
//!
//! State lives behind a mutex that is only held for bookkeeping, never across
//! a processor or server call. A submission dropped mid-flight returns the
//! cycle to where it started.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, instrument, warn};

use super::{
    FormError, IdempotencyKey, InvoiceRetry, PaymentError, PaymentErrorKind, PaymentIntentStatus,
    PaymentMethodSubscription, PaymentProcessor, RetryStatus, SavedMethodSubscription,
    SubmissionForm, SubmissionStrategy, SubscriptionApi, SubscriptionResult,
};
use crate::models::Customer;

/// Where the current submission cycle stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionState {
    /// Nothing submitted in this cycle.
    Idle,
    /// A submission is in flight.
    Submitting,
    /// The card was declined; the next submit retries this invoice.
    ChallengePending(RetryStatus),
    /// The subscription is active.
    Succeeded,
    /// The cycle ended in failure.
    Failed(PaymentError),
}

/// Why a submit call did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A submission with the current key is still in flight.
    AlreadyInFlight,
    /// The form did not validate.
    InvalidForm(FormError),
}

/// Result of one [`PaymentSubmissionCoordinator::submit`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The subscription is active.
    Succeeded(SubscriptionResult),
    /// The card was declined; the customer may retry with another card.
    ChallengeRequired {
        /// Invoice to retry.
        retry: RetryStatus,
        /// Error to show the customer.
        error: PaymentError,
    },
    /// The cycle failed.
    Failed(PaymentError),
    /// Nothing was submitted.
    Ignored(IgnoreReason),
}

/// Callbacks fired as a cycle progresses.
///
/// All methods default to no-ops.
pub trait SubmissionObserver: Send + Sync {
    /// The subscription became active.
    fn on_success(&self, _result: &SubscriptionResult) {}

    /// The cycle failed, or a decline needs the customer's attention.
    fn on_failure(&self, _error: &PaymentError) {}

    /// A decline can be retried against `status`.
    fn on_retry(&self, _status: &RetryStatus) {}
}

/// Observer that ignores every callback.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl SubmissionObserver for NoopObserver {}

#[derive(Debug)]
struct Cycle {
    state: SubmissionState,
    key: IdempotencyKey,
    in_flight: Option<IdempotencyKey>,
    generation: u64,
}

impl Cycle {
    fn fresh(generation: u64) -> Self {
        Self {
            state: SubmissionState::Idle,
            key: IdempotencyKey::generate(),
            in_flight: None,
            generation,
        }
    }
}

enum Attempt {
    Succeeded(SubscriptionResult),
    Challenged(RetryStatus),
    Failed(PaymentError),
}

/// Rolls the cycle back if a submission future is dropped before it settles.
///
/// The cycle returns to where the submission started: `ChallengePending` for
/// an invoice retry, `Idle` otherwise. The key is kept, so a resubmission is
/// deduplicated by the server.
struct InFlightGuard<'a> {
    cycle: &'a Mutex<Cycle>,
    generation: u64,
    retry: Option<RetryStatus>,
    armed: bool,
}

impl InFlightGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut cycle = self.cycle.lock().unwrap_or_else(PoisonError::into_inner);
        if cycle.generation != self.generation {
            return;
        }
        cycle.in_flight = None;
        cycle.state =
            self.retry.take().map_or(SubmissionState::Idle, SubmissionState::ChallengePending);
        debug!("submission dropped before it settled");
    }
}

/// Drives one payment form through tokenization, submission and the
/// card-declined challenge.
///
/// # Examples
///
/// ```no_run
/// use billing_gateway::models::Customer;
/// use billing_gateway::payment::{
///     PaymentProcessor, PaymentSubmissionCoordinator, SubmissionForm, SubmitOutcome,
///     SubscriptionApi,
/// };
///
/// # async fn example(
/// #     processor: impl PaymentProcessor,
/// #     api: impl SubscriptionApi,
/// #     customer: Customer,
/// #     form: SubmissionForm,
/// # ) {
/// let coordinator = PaymentSubmissionCoordinator::new(processor, api);
///
/// match coordinator.submit(&customer, &form).await {
///     SubmitOutcome::Succeeded(result) => println!("subscribed: {}", result.id),
///     SubmitOutcome::ChallengeRequired { error, .. } => println!("try another card: {error}"),
///     SubmitOutcome::Failed(error) => println!("payment failed: {error}"),
///     SubmitOutcome::Ignored(reason) => println!("not submitted: {reason:?}"),
/// }
/// # }
/// ```
#[derive(Debug)]
pub struct PaymentSubmissionCoordinator<P, A, O = NoopObserver> {
    processor: P,
    api: A,
    observer: O,
    cycle: Mutex<Cycle>,
}

impl<P, A> PaymentSubmissionCoordinator<P, A>
where
    P: PaymentProcessor,
    A: SubscriptionApi,
{
    /// Creates a coordinator with no observer.
    #[must_use]
    pub fn new(processor: P, api: A) -> Self {
        Self::with_observer(processor, api, NoopObserver)
    }
}

impl<P, A, O> PaymentSubmissionCoordinator<P, A, O>
where
    P: PaymentProcessor,
    A: SubscriptionApi,
    O: SubmissionObserver,
{
    /// Creates a coordinator that reports progress to `observer`.
    #[must_use]
    pub fn with_observer(processor: P, api: A, observer: O) -> Self {
        Self { processor, api, observer, cycle: Mutex::new(Cycle::fresh(0)) }
    }

    /// Current state of the cycle.
    #[must_use]
    pub fn state(&self) -> SubmissionState {
        self.lock().state.clone()
    }

    /// Idempotency key the next submission will carry.
    #[must_use]
    pub fn idempotency_key(&self) -> IdempotencyKey {
        self.lock().key
    }

    /// Whether a submission is in flight.
    #[must_use]
    pub fn is_in_flight(&self) -> bool {
        self.lock().in_flight.is_some()
    }

    /// Abandons the current cycle and starts a new one with a fresh key.
    ///
    /// An in-flight submission still completes, but its result no longer
    /// changes the coordinator's state.
    pub fn reset(&self) {
        let mut cycle = self.lock();
        let generation = cycle.generation.wrapping_add(1);
        *cycle = Cycle::fresh(generation);
        debug!("payment submission cycle reset");
    }

    /// Submits `form` for `customer`.
    ///
    /// Dropped without any call when a submission with the current key is in
    /// flight or when the form does not validate. A pending challenge turns
    /// the submission into an invoice retry under the same idempotency key.
    ///
    /// Dropping the returned future before it completes releases the
    /// in-flight slot and restores the state the submission started from.
    #[instrument(skip_all, fields(strategy = tracing::field::Empty, retry = tracing::field::Empty))]
    pub async fn submit(&self, customer: &Customer, form: &SubmissionForm) -> SubmitOutcome {
        let strategy = SubmissionStrategy::for_customer(customer);
        let span = tracing::Span::current();
        span.record("strategy", tracing::field::debug(strategy));

        let (key, retry, generation) = {
            let mut cycle = self.lock();
            if cycle.in_flight == Some(cycle.key) {
                debug!("submission already in flight");
                return SubmitOutcome::Ignored(IgnoreReason::AlreadyInFlight);
            }
            if let Err(err) = form.validate(strategy) {
                debug!(error = %err, "submission form rejected");
                return SubmitOutcome::Ignored(IgnoreReason::InvalidForm(err));
            }
            let retry = match &cycle.state {
                SubmissionState::ChallengePending(status) => Some(status.clone()),
                _ => None,
            };
            cycle.in_flight = Some(cycle.key);
            cycle.state = SubmissionState::Submitting;
            (cycle.key, retry, cycle.generation)
        };
        span.record("retry", retry.is_some());
        let guard =
            InFlightGuard { cycle: &self.cycle, generation, retry: retry.clone(), armed: true };

        let attempt = match strategy {
            SubmissionStrategy::CardTokenization => self.submit_card(form, key, retry).await,
            SubmissionStrategy::SavedMethod => self.submit_saved(form, key).await,
        };

        guard.disarm();
        self.finish(generation, attempt)
    }

    async fn submit_card(
        &self,
        form: &SubmissionForm,
        key: IdempotencyKey,
        retry: Option<RetryStatus>,
    ) -> Attempt {
        let Some(card) = form.card.as_ref() else {
            return Attempt::Failed(
                PaymentError::new(PaymentErrorKind::ValidationError)
                    .with_message("card details are required"),
            );
        };

        let method = match self.processor.tokenize_card(card, &form.display_name).await {
            Ok(method) => method,
            Err(err) => return Attempt::Failed(err),
        };

        let is_retry = retry.is_some();
        let result = match retry {
            Some(status) => {
                let request = InvoiceRetry {
                    invoice_id: status.invoice_id,
                    payment_method_id: method.id.clone(),
                    idempotency_key: key,
                };
                self.api.retry_invoice(&request).await
            }
            None => {
                let request = PaymentMethodSubscription {
                    price_id: form.price_id.clone(),
                    payment_method_id: method.id.clone(),
                    idempotency_key: key,
                };
                self.api.create_subscription_with_payment_method(&request).await
            }
        };

        match result {
            Ok(result) => self.settle(result, Some(&method.id), is_retry).await,
            Err(err) => Attempt::Failed(err),
        }
    }

    async fn submit_saved(&self, form: &SubmissionForm, key: IdempotencyKey) -> Attempt {
        let request =
            SavedMethodSubscription { price_id: form.price_id.clone(), idempotency_key: key };
        match self.api.create_subscription_with_saved_method(&request).await {
            Ok(result) => self.settle(result, None, false).await,
            Err(err) => Attempt::Failed(err),
        }
    }

    async fn settle(
        &self,
        result: SubscriptionResult,
        payment_method_id: Option<&str>,
        is_retry: bool,
    ) -> Attempt {
        if result.is_active() {
            return Attempt::Succeeded(result);
        }

        let Some(intent) = result.payment_intent() else {
            return Attempt::Failed(unexpected_status(&result));
        };

        match (intent.status, payment_method_id) {
            (PaymentIntentStatus::RequiresAction, Some(method_id)) => {
                let Some(secret) = intent.client_secret.as_deref() else {
                    return Attempt::Failed(unexpected_status(&result));
                };
                match self.processor.confirm_payment(secret, method_id).await {
                    Ok(()) => Attempt::Succeeded(result),
                    Err(err) => Attempt::Failed(err),
                }
            }
            (PaymentIntentStatus::RequiresPaymentMethod, Some(method_id)) if !is_retry => {
                let Some(invoice) = result.latest_invoice.as_ref() else {
                    return Attempt::Failed(unexpected_status(&result));
                };
                if let Err(err) = self.api.detach_failed_payment_method(method_id).await {
                    warn!(
                        payment_method_id = method_id,
                        error = %err,
                        "failed to detach declined payment method"
                    );
                }
                Attempt::Challenged(RetryStatus {
                    invoice_id: invoice.id.clone(),
                    payment_method_id: method_id.to_owned(),
                })
            }
            (PaymentIntentStatus::RequiresPaymentMethod, _) => {
                Attempt::Failed(PaymentError::card_declined())
            }
            _ => Attempt::Failed(unexpected_status(&result)),
        }
    }

    fn finish(&self, generation: u64, attempt: Attempt) -> SubmitOutcome {
        {
            let mut cycle = self.lock();
            if cycle.generation == generation {
                match &attempt {
                    Attempt::Succeeded(_) => {
                        *cycle = Cycle {
                            state: SubmissionState::Succeeded,
                            ..Cycle::fresh(generation)
                        };
                    }
                    Attempt::Challenged(status) => {
                        cycle.state = SubmissionState::ChallengePending(status.clone());
                        cycle.in_flight = None;
                    }
                    Attempt::Failed(err) => {
                        *cycle = Cycle {
                            state: SubmissionState::Failed(err.clone()),
                            ..Cycle::fresh(generation)
                        };
                    }
                }
            } else {
                debug!("discarding result of an abandoned submission");
            }
        }

        match attempt {
            Attempt::Succeeded(result) => {
                info!(subscription_id = %result.id, "payment submission succeeded");
                self.observer.on_success(&result);
                SubmitOutcome::Succeeded(result)
            }
            Attempt::Challenged(retry) => {
                let error = PaymentError::card_declined();
                info!(invoice_id = %retry.invoice_id, "payment declined, awaiting a new card");
                self.observer.on_retry(&retry);
                self.observer.on_failure(&error);
                SubmitOutcome::ChallengeRequired { retry, error }
            }
            Attempt::Failed(error) => {
                warn!(error = %error, "payment submission failed");
                self.observer.on_failure(&error);
                SubmitOutcome::Failed(error)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Cycle> {
        self.cycle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn unexpected_status(result: &SubscriptionResult) -> PaymentError {
    PaymentError::new(PaymentErrorKind::ApiError)
        .with_message(format!("unexpected subscription status: {}", result.status))
}
