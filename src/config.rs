//! Provider configuration.
//!
//! The host sends the provider block as JSON in `Configure`. Any field left
//! unset falls back to an environment variable:
//!
//! | Field               | Environment variable          |
//! |---------------------|-------------------------------|
//! | `api_key`           | `NEW_RELIC_API_KEY`           |
//! | `account_id`        | `NEW_RELIC_ACCOUNT_ID`        |
//! | `region`            | `NEW_RELIC_REGION`            |
//! | `nerdgraph_api_url` | `NEW_RELIC_NERDGRAPH_API_URL` |

use std::fmt;

use serde::Deserialize;

use crate::error::ProviderError;

/// NerdGraph endpoint for US accounts.
pub const US_NERDGRAPH_URL: &str = "https://api.newrelic.com/graphql";

/// NerdGraph endpoint for EU accounts.
pub const EU_NERDGRAPH_URL: &str = "https://api.eu.newrelic.com/graphql";

/// Accepted values for `region`.
pub const REGIONS: [&str; 2] = ["US", "EU"];

/// The New Relic data center region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Region {
    /// United States.
    #[default]
    Us,
    /// European Union.
    Eu,
}

impl Region {
    /// Parse a region name, ignoring case.
    pub fn parse(name: &str) -> Result<Self, ProviderError> {
        if name.eq_ignore_ascii_case("US") {
            Ok(Self::Us)
        } else if name.eq_ignore_ascii_case("EU") {
            Ok(Self::Eu)
        } else {
            Err(ProviderError::Configuration(format!(
                "unknown region {:?}, expected one of {}",
                name,
                REGIONS.join(", ")
            )))
        }
    }

    /// The NerdGraph endpoint for this region.
    pub fn nerdgraph_url(self) -> &'static str {
        match self {
            Self::Us => US_NERDGRAPH_URL,
            Self::Eu => EU_NERDGRAPH_URL,
        }
    }
}

/// Configuration of the `newrelic` provider block.
#[derive(Clone, Default, Deserialize)]
pub struct ProviderConfig {
    /// User API key used for NerdGraph calls.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Default account for resources that don't set `account_id`.
    #[serde(default)]
    pub account_id: Option<i64>,
    /// Data center region.
    #[serde(default)]
    pub region: Option<String>,
    /// Explicit NerdGraph URL, overriding the region default.
    #[serde(default)]
    pub nerdgraph_api_url: Option<String>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("account_id", &self.account_id)
            .field("region", &self.region)
            .field("nerdgraph_api_url", &self.nerdgraph_api_url)
            .finish()
    }
}

impl ProviderConfig {
    /// Build the configuration from the provider block, falling back to the
    /// process environment.
    pub fn from_value(config: serde_json::Value) -> Result<Self, ProviderError> {
        Self::from_value_with_env(config, |name| std::env::var(name).ok())
    }

    /// Like [`ProviderConfig::from_value`] with an explicit environment lookup.
    pub fn from_value_with_env<F>(config: serde_json::Value, env: F) -> Result<Self, ProviderError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut parsed: Self = if config.is_null() {
            Self::default()
        } else {
            serde_json::from_value(config)?
        };

        let lookup = |name: &str| env(name).filter(|v| !v.is_empty());

        if parsed.api_key.is_none() {
            parsed.api_key = lookup("NEW_RELIC_API_KEY");
        }
        if parsed.account_id.is_none() {
            parsed.account_id = match lookup("NEW_RELIC_ACCOUNT_ID") {
                Some(raw) => Some(raw.trim().parse().map_err(|_| {
                    ProviderError::Configuration(format!(
                        "NEW_RELIC_ACCOUNT_ID must be an integer, got {:?}",
                        raw
                    ))
                })?),
                None => None,
            };
        }
        if parsed.region.is_none() {
            parsed.region = lookup("NEW_RELIC_REGION");
        }
        if parsed.nerdgraph_api_url.is_none() {
            parsed.nerdgraph_api_url = lookup("NEW_RELIC_NERDGRAPH_API_URL");
        }

        Ok(parsed)
    }

    /// The API key, which must be set.
    pub fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or_else(|| {
            ProviderError::Configuration(
                "api_key must be set in the provider block or NEW_RELIC_API_KEY".to_string(),
            )
        })
    }

    /// The configured region, US when unset.
    pub fn region(&self) -> Result<Region, ProviderError> {
        self.region
            .as_deref()
            .map(Region::parse)
            .transpose()
            .map(Option::unwrap_or_default)
    }

    /// The NerdGraph URL requests are sent to.
    pub fn endpoint(&self) -> Result<String, ProviderError> {
        match &self.nerdgraph_api_url {
            Some(url) => Ok(url.clone()),
            None => Ok(self.region()?.nerdgraph_url().to_string()),
        }
    }

    /// Pick the account a resource operates on: its own `account_id` if set,
    /// otherwise the provider default.
    pub fn select_account_id(
        &self,
        resource_account_id: Option<i64>,
    ) -> Result<i64, ProviderError> {
        resource_account_id.or(self.account_id).ok_or_else(|| {
            ProviderError::Configuration(
                "account_id must be set on the resource, the provider block or NEW_RELIC_ACCOUNT_ID"
                    .to_string(),
            )
        })
    }
}
