// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Display;

use http::{Response, StatusCode};

/// The result of a single attempt against a destination.
///
/// An attempt either fails before a response arrives (a transport error such as a refused
/// connection or a reset stream) or produces a response with a status code.
///
/// # Classification
///
/// Transport errors and server errors (`5xx`) are failures and advance the backoff delay. Every
/// other status means the destination is reachable and able to answer, so the delay is reset.
///
/// ```rust
/// use http::StatusCode;
/// use url_backoff::Outcome;
///
/// assert!(Outcome::transport_error().is_failure());
/// assert!(Outcome::status(StatusCode::BAD_GATEWAY).is_failure());
/// assert!(!Outcome::status(StatusCode::NOT_FOUND).is_failure());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Outcome {
    /// The attempt did not produce a response.
    TransportError,

    /// The attempt produced a response with the given status.
    Status(StatusCode),
}

impl Outcome {
    /// Creates an outcome for an attempt that failed without a response.
    #[must_use]
    pub const fn transport_error() -> Self {
        Self::TransportError
    }

    /// Creates an outcome for an attempt that produced a response with `status`.
    #[must_use]
    pub const fn status(status: StatusCode) -> Self {
        Self::Status(status)
    }

    /// Classifies the result of sending a request.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use http::{Response, StatusCode};
    /// use url_backoff::Outcome;
    ///
    /// let result: Result<Response<()>, std::io::Error> = Ok(Response::builder()
    ///     .status(StatusCode::SERVICE_UNAVAILABLE)
    ///     .body(())?);
    /// assert_eq!(
    ///     Outcome::from_response_result(&result),
    ///     Outcome::status(StatusCode::SERVICE_UNAVAILABLE)
    /// );
    /// # Ok::<(), http::Error>(())
    /// ```
    #[must_use]
    pub fn from_response_result<B, E>(result: &Result<Response<B>, E>) -> Self {
        match result {
            Ok(response) => Self::Status(response.status()),
            Err(_) => Self::TransportError,
        }
    }

    /// Returns `true` if this outcome should advance the backoff delay.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        match self {
            Self::TransportError => true,
            Self::Status(status) => status.is_server_error(),
        }
    }

    /// Returns the status code, if the attempt produced a response.
    #[must_use]
    pub const fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::TransportError => None,
            Self::Status(status) => Some(*status),
        }
    }

    /// Returns `true` for a response that is neither a success nor a failure, such as a redirect
    /// or a client error.
    pub(crate) fn is_unexpected_status(&self) -> bool {
        match self {
            Self::TransportError => false,
            Self::Status(status) => !status.is_success() && !status.is_server_error(),
        }
    }
}

impl From<StatusCode> for Outcome {
    fn from(status: StatusCode) -> Self {
        Self::Status(status)
    }
}

impl Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TransportError => f.write_str("transport error"),
            Self::Status(status) => write!(f, "{}", status.as_u16()),
        }
    }
}
