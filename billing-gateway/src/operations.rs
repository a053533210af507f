//! Billing operation table.
//!
//! Each [`Operation`] pairs a backend [`Endpoint`] with the status rules that
//! turn backend failures into domain outcomes. Combinations not listed here
//! pass the backend error through unchanged.
//!
//! | Operation | 400/402 | 403 | 404 |
//! |---|---|---|---|
//! | `listSubscriptions` | | empty list | unknown customer |
//! | `getCustomer` | | | unknown customer |
//! | `updateCustomer` | rejected update | | unknown customer |
//! | `deleteCustomer` | | | `unknown customer` message |
//! | `createSubscription` | rejected token | | unknown plan |
//! | `cancelSubscription` | | | by message |
//! | `reactivateSubscription` | | | by message |

use crate::{
    backend::{Endpoint, HttpMethod},
    error::{BackendError, GatewayError},
};

/// Backend message naming an unknown customer.
pub const INVALID_UID_MESSAGE: &str = "invalid uid";

/// Backend message naming an unknown subscription.
pub const INVALID_SUBSCRIPTION_MESSAGE: &str = "invalid subscription id";

/// Identifiers of the call being translated.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallIds<'a> {
    /// Account identifier.
    pub uid: Option<&'a str>,
    /// Subscription identifier.
    pub sub_id: Option<&'a str>,
    /// Plan identifier.
    pub plan_id: Option<&'a str>,
}

/// Which identifier a matched backend message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageTarget {
    /// The customer is unknown.
    Customer,
    /// The subscription is unknown.
    Subscription,
}

/// What a matching status rule does with the failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Translation {
    /// Fail with [`GatewayError::UnknownCustomer`].
    UnknownCustomer,
    /// Fail with [`GatewayError::UnknownSubscriptionPlan`].
    UnknownSubscriptionPlan,
    /// Fail with [`GatewayError::RejectedPaymentToken`] carrying the backend message.
    RejectedPaymentToken,
    /// Fail with [`GatewayError::RejectedCustomerUpdate`] carrying the backend message.
    RejectedCustomerUpdate,
    /// Succeed with an empty subscription list.
    EmptySubscriptionList,
    /// Succeed with the `unknown customer` message.
    AlreadyAbsent,
    /// Pick a domain error by exact backend message; unmatched messages pass through.
    ByMessage(&'static [(&'static str, MessageTarget)]),
}

/// A status rule: any listed status triggers the translation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusRule {
    /// Statuses the rule applies to.
    pub statuses: &'static [u16],
    /// Outcome when the rule matches.
    pub translation: Translation,
}

/// Successful value synthesized from a backend failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recovery {
    /// `{ subscriptions: [] }`
    EmptySubscriptionList,
    /// `{ message: "unknown customer" }`
    AlreadyAbsent,
}

/// Outcome of translating a backend failure.
#[derive(Debug)]
pub enum Resolution {
    /// No rule applies; surface the backend error unchanged.
    Passthrough,
    /// Fail with a domain error.
    Fail(GatewayError),
    /// Succeed with a synthesized value.
    Recover(Recovery),
}

/// A billing operation: endpoint plus status rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    /// Backend endpoint.
    pub endpoint: Endpoint,
    /// Status rules, checked in order.
    pub rules: &'static [StatusRule],
}

impl Operation {
    /// Operation name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.endpoint.name
    }

    /// Translates a backend failure for this operation.
    ///
    /// # Examples
    ///
    /// ```
    /// use billing_gateway::{
    ///     GatewayError,
    ///     error::BackendError,
    ///     operations::{CallIds, GET_CUSTOMER, Resolution},
    /// };
    ///
    /// let err = BackendError {
    ///     operation: "getCustomer",
    ///     status: 404,
    ///     message: "not found".to_owned(),
    ///     body: String::new(),
    /// };
    /// let ids = CallIds { uid: Some("u1"), ..Default::default() };
    /// let resolution = GET_CUSTOMER.translate(&err, &ids);
    /// assert!(matches!(
    ///     resolution,
    ///     Resolution::Fail(GatewayError::UnknownCustomer { ref uid }) if uid == "u1"
    /// ));
    /// ```
    #[must_use]
    pub fn translate(&self, err: &BackendError, ids: &CallIds<'_>) -> Resolution {
        let Some(rule) = self.rules.iter().find(|rule| rule.statuses.contains(&err.status)) else {
            return Resolution::Passthrough;
        };
        let owned = |id: Option<&str>| id.unwrap_or_default().to_owned();

        match rule.translation {
            Translation::UnknownCustomer => {
                Resolution::Fail(GatewayError::UnknownCustomer { uid: owned(ids.uid) })
            }
            Translation::UnknownSubscriptionPlan => {
                Resolution::Fail(GatewayError::UnknownSubscriptionPlan {
                    plan_id: owned(ids.plan_id),
                })
            }
            Translation::RejectedPaymentToken => {
                Resolution::Fail(GatewayError::RejectedPaymentToken {
                    message: err.message.clone(),
                })
            }
            Translation::RejectedCustomerUpdate => {
                Resolution::Fail(GatewayError::RejectedCustomerUpdate {
                    message: err.message.clone(),
                })
            }
            Translation::EmptySubscriptionList => {
                Resolution::Recover(Recovery::EmptySubscriptionList)
            }
            Translation::AlreadyAbsent => Resolution::Recover(Recovery::AlreadyAbsent),
            Translation::ByMessage(table) => {
                match table.iter().find(|(message, _)| *message == err.message) {
                    Some((_, MessageTarget::Customer)) => {
                        Resolution::Fail(GatewayError::UnknownCustomer { uid: owned(ids.uid) })
                    }
                    Some((_, MessageTarget::Subscription)) => {
                        Resolution::Fail(GatewayError::UnknownSubscription {
                            subscription_id: owned(ids.sub_id),
                        })
                    }
                    None => Resolution::Passthrough,
                }
            }
        }
    }
}

// The backend distinguishes unknown customer from unknown subscription only by
// message text. Exact matches only; anything else passes through.
const SUBSCRIPTION_MESSAGES: &[(&str, MessageTarget)] = &[
    (INVALID_UID_MESSAGE, MessageTarget::Customer),
    (INVALID_SUBSCRIPTION_MESSAGE, MessageTarget::Subscription),
];

/// `GET /v1/plans`
pub const LIST_PLANS: Operation = Operation {
    endpoint: Endpoint {
        name: "listPlans",
        method: HttpMethod::Get,
        path: "/v1/plans",
        payload_fields: &[],
    },
    rules: &[],
};

/// `GET /v1/customer/:uid/subscriptions`
pub const LIST_SUBSCRIPTIONS: Operation = Operation {
    endpoint: Endpoint {
        name: "listSubscriptions",
        method: HttpMethod::Get,
        path: "/v1/customer/:uid/subscriptions",
        payload_fields: &[],
    },
    rules: &[
        StatusRule { statuses: &[404], translation: Translation::UnknownCustomer },
        StatusRule { statuses: &[403], translation: Translation::EmptySubscriptionList },
    ],
};

/// `POST /v1/customer/:uid/subscriptions`
pub const CREATE_SUBSCRIPTION: Operation = Operation {
    endpoint: Endpoint {
        name: "createSubscription",
        method: HttpMethod::Post,
        path: "/v1/customer/:uid/subscriptions",
        payload_fields: &["pmt_token", "plan_id", "display_name", "email", "origin_system"],
    },
    rules: &[
        StatusRule { statuses: &[404], translation: Translation::UnknownSubscriptionPlan },
        StatusRule { statuses: &[400, 402], translation: Translation::RejectedPaymentToken },
    ],
};

/// `DELETE /v1/customer/:uid/subscriptions/:sub_id`
pub const CANCEL_SUBSCRIPTION: Operation = Operation {
    endpoint: Endpoint {
        name: "cancelSubscription",
        method: HttpMethod::Delete,
        path: "/v1/customer/:uid/subscriptions/:sub_id",
        payload_fields: &[],
    },
    rules: &[StatusRule {
        statuses: &[404],
        translation: Translation::ByMessage(SUBSCRIPTION_MESSAGES),
    }],
};

/// `POST /v1/customer/:uid/subscriptions/:sub_id`
pub const REACTIVATE_SUBSCRIPTION: Operation = Operation {
    endpoint: Endpoint {
        name: "reactivateSubscription",
        method: HttpMethod::Post,
        path: "/v1/customer/:uid/subscriptions/:sub_id",
        payload_fields: &[],
    },
    rules: &[StatusRule {
        statuses: &[404],
        translation: Translation::ByMessage(SUBSCRIPTION_MESSAGES),
    }],
};

/// `GET /v1/customer/:uid`
pub const GET_CUSTOMER: Operation = Operation {
    endpoint: Endpoint {
        name: "getCustomer",
        method: HttpMethod::Get,
        path: "/v1/customer/:uid",
        payload_fields: &[],
    },
    rules: &[StatusRule { statuses: &[404], translation: Translation::UnknownCustomer }],
};

/// `POST /v1/customer/:uid`
pub const UPDATE_CUSTOMER: Operation = Operation {
    endpoint: Endpoint {
        name: "updateCustomer",
        method: HttpMethod::Post,
        path: "/v1/customer/:uid",
        payload_fields: &["pmt_token"],
    },
    rules: &[
        StatusRule { statuses: &[404], translation: Translation::UnknownCustomer },
        StatusRule { statuses: &[400, 402], translation: Translation::RejectedCustomerUpdate },
    ],
};

/// `DELETE /v1/customer/:uid`
pub const DELETE_CUSTOMER: Operation = Operation {
    endpoint: Endpoint {
        name: "deleteCustomer",
        method: HttpMethod::Delete,
        path: "/v1/customer/:uid",
        payload_fields: &[],
    },
    rules: &[StatusRule { statuses: &[404], translation: Translation::AlreadyAbsent }],
};

/// Every operation, in table order.
pub const ALL: [Operation; 8] = [
    LIST_PLANS,
    LIST_SUBSCRIPTIONS,
    CREATE_SUBSCRIPTION,
    CANCEL_SUBSCRIPTION,
    REACTIVATE_SUBSCRIPTION,
    GET_CUSTOMER,
    UPDATE_CUSTOMER,
    DELETE_CUSTOMER,
];
