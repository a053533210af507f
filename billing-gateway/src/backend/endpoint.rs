//! Backend endpoint descriptors.
//!
//! An [`Endpoint`] declares an HTTP method, a path template with `:name`
//! parameters and the payload fields the backend requires. The client checks
//! call-time arguments against the descriptor before any network I/O.

use std::fmt;

use serde_json::Value;
use url::Url;

use crate::error::{GatewayError, Result};

/// HTTP methods used by the billing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `DELETE`
    Delete,
}

impl HttpMethod {
    /// Method name as sent on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Self::GET,
            HttpMethod::Post => Self::POST,
            HttpMethod::Delete => Self::DELETE,
        }
    }
}

/// Declarative description of one backend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    /// Operation name used in logs, metrics and errors.
    pub name: &'static str,
    /// HTTP method.
    pub method: HttpMethod,
    /// Path template, e.g. `/v1/customer/:uid/subscriptions/:sub_id`.
    pub path: &'static str,
    /// Fields that must be present and non-null in the request body.
    pub payload_fields: &'static [&'static str],
}

impl Endpoint {
    /// Names of the path parameters, in template order.
    pub fn path_params(&self) -> impl Iterator<Item = &'static str> {
        self.path.split('/').filter_map(|segment| segment.strip_prefix(':'))
    }

    /// Resolves the template against `base`, percent-encoding each parameter value.
    ///
    /// Every declared parameter must be supplied with a non-empty value.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] for a missing or empty parameter.
    ///
    /// # Examples
    ///
    /// ```
    /// use billing_gateway::backend::{Endpoint, HttpMethod};
    /// use url::Url;
    ///
    /// let endpoint = Endpoint {
    ///     name: "getCustomer",
    ///     method: HttpMethod::Get,
    ///     path: "/v1/customer/:uid",
    ///     payload_fields: &[],
    /// };
    /// let base = Url::parse("https://subhub.example.com").unwrap();
    /// let url = endpoint.resolve(&base, &[("uid", "a b")]).unwrap();
    /// assert_eq!(url.as_str(), "https://subhub.example.com/v1/customer/a%20b");
    /// ```
    pub fn resolve(&self, base: &Url, params: &[(&str, &str)]) -> Result<Url> {
        let mut url = base.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                GatewayError::InvalidRequest(format!("base url cannot carry a path: {base}"))
            })?;
            segments.pop_if_empty();

            for segment in self.path.split('/').filter(|s| !s.is_empty()) {
                let Some(name) = segment.strip_prefix(':') else {
                    segments.push(segment);
                    continue;
                };
                let value = params
                    .iter()
                    .find_map(|(key, value)| (*key == name).then_some(*value))
                    .filter(|value| !value.is_empty())
                    .ok_or_else(|| {
                        GatewayError::InvalidRequest(format!(
                            "{}: missing path parameter '{name}'",
                            self.name
                        ))
                    })?;
                if matches!(value, "." | "..") {
                    return Err(GatewayError::InvalidRequest(format!(
                        "{}: path parameter '{name}' cannot be a dot segment",
                        self.name
                    )));
                }
                segments.push(value);
            }
        }
        Ok(url)
    }

    /// Checks that the body carries every declared payload field.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] when the body is absent, not an
    /// object, or lacks a required field.
    pub fn check_payload(&self, body: Option<&Value>) -> Result<()> {
        if self.payload_fields.is_empty() {
            return Ok(());
        }
        let Some(Value::Object(fields)) = body else {
            return Err(GatewayError::InvalidRequest(format!(
                "{}: request body must be a JSON object",
                self.name
            )));
        };
        if let Some(missing) = self
            .payload_fields
            .iter()
            .find(|field| fields.get(**field).is_none_or(Value::is_null))
        {
            return Err(GatewayError::InvalidRequest(format!(
                "{}: missing payload field '{missing}'",
                self.name
            )));
        }
        Ok(())
    }
}
