// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::constants::{ENV_BACKOFF_BASE, ENV_BACKOFF_DURATION};

/// The two knobs that configure backoff: the base delay and the maximum delay.
///
/// Both values must be present, and the maximum delay must be non-zero, for backoff to be enabled.
/// Anything else makes [`ManagerFactory::build`][crate::ManagerFactory::build] return a
/// [`NullBackoffManager`][crate::NullBackoffManager].
///
/// # Sources
///
/// - Code: [`BackoffConfig::new`] with the [`base_delay`][Self::base_delay] and
///   [`max_delay`][Self::max_delay] setters.
/// - Text, such as command-line flags: [`BackoffConfig::parse`].
/// - The process environment: [`BackoffConfig::from_env`], which reads
///   [`ENV_BACKOFF_BASE`] and [`ENV_BACKOFF_DURATION`].
/// - Configuration files: with the `serde` feature, delays are numbers of seconds.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use url_backoff::BackoffConfig;
///
/// let config = BackoffConfig::parse(Some("0.5"), Some("30"));
///
/// assert_eq!(config.get_base_delay(), Some(Duration::from_millis(500)));
/// assert_eq!(config.get_max_delay(), Some(Duration::from_secs(30)));
///
/// // Unparsable values are treated as missing.
/// let config = BackoffConfig::parse(Some("soon"), Some("30"));
/// assert_eq!(config.get_base_delay(), None);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BackoffConfig {
    #[cfg_attr(feature = "serde", serde(default, with = "seconds", skip_serializing_if = "Option::is_none"))]
    base_delay: Option<Duration>,
    #[cfg_attr(feature = "serde", serde(default, with = "seconds", skip_serializing_if = "Option::is_none"))]
    max_delay: Option<Duration>,
}

impl BackoffConfig {
    /// Creates a configuration with both delays unset.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            base_delay: None,
            max_delay: None,
        }
    }

    /// Sets the delay applied on the first failure of a destination.
    #[must_use]
    pub const fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = Some(delay);
        self
    }

    /// Sets the ceiling of every delay. Zero disables backoff.
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Returns the base delay, if set.
    #[must_use]
    pub const fn get_base_delay(&self) -> Option<Duration> {
        self.base_delay
    }

    /// Returns the maximum delay, if set.
    #[must_use]
    pub const fn get_max_delay(&self) -> Option<Duration> {
        self.max_delay
    }

    /// Builds a configuration from textual values expressed in seconds.
    ///
    /// Missing, blank and unparsable values are all treated as unset. Use [`parse_seconds`] to
    /// inspect why a single value was rejected.
    #[must_use]
    pub fn parse(base_delay: Option<&str>, max_delay: Option<&str>) -> Self {
        Self {
            base_delay: base_delay.and_then(parse_optional_seconds),
            max_delay: max_delay.and_then(parse_optional_seconds),
        }
    }

    /// Builds a configuration from named values provided by `lookup`.
    ///
    /// `lookup` receives [`ENV_BACKOFF_BASE`] and [`ENV_BACKOFF_DURATION`].
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::time::Duration;
    ///
    /// use url_backoff::{BackoffConfig, ENV_BACKOFF_BASE, ENV_BACKOFF_DURATION};
    ///
    /// let config = BackoffConfig::from_lookup(|name| match name {
    ///     ENV_BACKOFF_BASE => Some("1".to_string()),
    ///     ENV_BACKOFF_DURATION => Some("2".to_string()),
    ///     _ => None,
    /// });
    ///
    /// assert_eq!(config.get_max_delay(), Some(Duration::from_secs(2)));
    /// ```
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self::parse(lookup(ENV_BACKOFF_BASE).as_deref(), lookup(ENV_BACKOFF_DURATION).as_deref())
    }

    /// Builds a configuration from the process environment.
    ///
    /// Reads [`ENV_BACKOFF_BASE`] and [`ENV_BACKOFF_DURATION`]. Variables that are missing or not
    /// valid Unicode are treated as unset.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Returns the base and maximum delays if backoff is enabled, or the reason it is not.
    pub(crate) fn enabled_delays(&self) -> Result<(Duration, Duration), &'static str> {
        match (self.base_delay, self.max_delay) {
            (None, _) => Err("the base delay is not set"),
            (_, None) => Err("the maximum delay is not set"),
            (Some(_), Some(max)) if max.is_zero() => Err("the maximum delay is zero"),
            (Some(base), Some(_)) if base.is_zero() => Err("the base delay is zero"),
            (Some(base), Some(max)) => Ok((base, max)),
        }
    }
}

/// Parses a number of seconds, such as `"2"` or `"0.25"`.
///
/// Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidNumber`] if `value` is not a number and
/// [`ConfigError::OutOfRange`] if it is negative, not finite or too large for a [`Duration`].
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
///
/// use url_backoff::{ConfigError, parse_seconds};
///
/// assert_eq!(parse_seconds("2"), Ok(Duration::from_secs(2)));
/// assert_eq!(parse_seconds(" 0.25 "), Ok(Duration::from_millis(250)));
/// assert!(matches!(parse_seconds("-1"), Err(ConfigError::OutOfRange(_))));
/// ```
pub fn parse_seconds(value: &str) -> Result<Duration, ConfigError> {
    let trimmed = value.trim();

    if let Ok(secs) = trimmed.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let Ok(secs) = trimmed.parse::<f64>() else {
        return Err(ConfigError::InvalidNumber(trimmed.to_string()));
    };

    match Duration::try_from_secs_f64(secs) {
        Ok(delay) if !secs.is_sign_negative() => Ok(delay),
        _ => Err(ConfigError::OutOfRange(trimmed.to_string())),
    }
}

fn parse_optional_seconds(value: &str) -> Option<Duration> {
    if value.trim().is_empty() {
        return None;
    }

    parse_seconds(value).ok()
}

/// The reason a configuration value was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The value is not a number.
    #[error("'{0}' is not a number of seconds")]
    InvalidNumber(String),

    /// The value is a number but not a usable delay.
    #[error("'{0}' seconds is not a valid delay")]
    OutOfRange(String),
}

/// Serializes optional delays as numbers of seconds.
#[cfg(feature = "serde")]
mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    #[expect(clippy::ref_option, reason = "signature required by serde's `with` attribute")]
    pub(super) fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            None => serializer.serialize_none(),
            Some(delay) if delay.subsec_nanos() == 0 => serializer.serialize_some(&delay.as_secs()),
            Some(delay) => serializer.serialize_some(&delay.as_secs_f64()),
        }
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Option::<f64>::deserialize(deserializer)?
            .map(|secs| Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom))
            .transpose()
    }
}
