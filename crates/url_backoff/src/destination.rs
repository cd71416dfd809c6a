// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::borrow::Cow;
use std::fmt::Display;
use std::str::FromStr;

use http::Uri;

/// Identifies the remote endpoint whose backoff state is tracked.
///
/// Each unique `Destination` maintains its own independent backoff delay. Requests that share a
/// destination share a delay, regardless of the path they target.
///
/// Destinations should be **long-lived and low-cardinality**, such as backend hosts. Avoid values
/// like request IDs; they cause unbounded growth of the tracked state and hide systemic failures.
///
/// # Examples
///
/// ## Creation from an opaque key
///
/// ```rust
/// use url_backoff::Destination;
///
/// let destination = Destination::new("api.example.com:443");
/// assert_eq!(destination.to_string(), "api.example.com:443");
/// ```
///
/// ## Creation from a URI
///
/// Deriving a destination from a URI keeps only the scheme, the host and a non-default port:
///
/// ```rust
/// use http::Uri;
/// use url_backoff::Destination;
///
/// let uri: Uri = "HTTPS://API.example.com/api/v1/pods?watch=true".parse()?;
/// let destination = Destination::try_from(&uri)?;
///
/// assert_eq!(destination.as_str(), "https://api.example.com");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// # Telemetry
///
/// Destinations are included in logs and metrics. Make sure they do not carry credentials such as
/// user information embedded in a URI authority.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Destination(Cow<'static, str>);

impl Destination {
    /// Creates a destination from an opaque key.
    ///
    /// The key is used as-is; no normalization is applied.
    #[must_use]
    pub fn new(key: impl Into<Cow<'static, str>>) -> Self {
        Self(key.into())
    }

    /// Returns the key of this destination.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&'static str> for Destination {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Destination {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl TryFrom<&Uri> for Destination {
    type Error = DestinationError;

    fn try_from(uri: &Uri) -> Result<Self, Self::Error> {
        let scheme = uri.scheme_str().ok_or(DestinationError::MissingScheme)?;
        let authority = uri.authority().ok_or(DestinationError::MissingAuthority)?;

        // Hosts are case-insensitive. An explicit default port names the same endpoint as no port.
        let scheme = scheme.to_ascii_lowercase();
        let host = authority.host().to_ascii_lowercase();
        let key = match authority.port_u16() {
            Some(port) if Some(port) != default_port(&scheme) => format!("{scheme}://{host}:{port}"),
            _ => format!("{scheme}://{host}"),
        };

        Ok(Self::new(key))
    }
}

fn default_port(scheme: &str) -> Option<u16> {
    match scheme {
        "http" => Some(80),
        "https" => Some(443),
        _ => None,
    }
}

impl TryFrom<Uri> for Destination {
    type Error = DestinationError;

    fn try_from(uri: Uri) -> Result<Self, Self::Error> {
        Self::try_from(&uri)
    }
}

impl FromStr for Destination {
    type Err = DestinationError;

    /// Parses a URI and derives its destination.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uri = s.parse::<Uri>().map_err(|e| DestinationError::InvalidUri(e.to_string()))?;
        Self::try_from(&uri)
    }
}

/// The reason a destination could not be derived from a URI.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum DestinationError {
    /// The URI could not be parsed.
    #[error("invalid URI: {0}")]
    InvalidUri(String),

    /// The URI has no scheme, for example a bare path.
    #[error("the URI has no scheme")]
    MissingScheme,

    /// The URI has no authority, so no host to back off from.
    #[error("the URI has no authority")]
    MissingAuthority,
}
