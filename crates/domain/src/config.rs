//! Domain configuration loaded from environment variables.

use std::str::FromStr;

use thiserror::Error;

/// What `remove_item` does when asked for more than the line holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverRemovalPolicy {
    /// Refuse the command with `CartError::InsufficientQuantity`.
    #[default]
    Reject,
    /// Remove whatever is left; the event records the clamped quantity.
    Clamp,
}

/// Unrecognized over-removal policy name.
#[derive(Debug, Error)]
#[error("unknown over-removal policy {0:?} (expected \"reject\" or \"clamp\")")]
pub struct UnknownPolicy(String);

impl FromStr for OverRemovalPolicy {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(OverRemovalPolicy::Reject),
            "clamp" => Ok(OverRemovalPolicy::Clamp),
            _ => Err(UnknownPolicy(s.to_string())),
        }
    }
}

/// Cart configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `CART_OVER_REMOVAL`: `reject` or `clamp` (default: `reject`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
#[derive(Debug, Clone)]
pub struct CartConfig {
    pub over_removal: OverRemovalPolicy,
    pub log_level: String,
}

impl CartConfig {
    /// Loads configuration from environment variables, falling back to defaults.
    ///
    /// An unparseable policy falls back to the default and is logged.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let over_removal = match lookup("CART_OVER_REMOVAL") {
            Some(raw) => raw.parse().unwrap_or_else(|err: UnknownPolicy| {
                tracing::warn!(error = %err, "ignoring CART_OVER_REMOVAL");
                defaults.over_removal
            }),
            None => defaults.over_removal,
        };

        Self {
            over_removal,
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
        }
    }
}

impl Default for CartConfig {
    fn default() -> Self {
        Self {
            over_removal: OverRemovalPolicy::Reject,
            log_level: "info".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = CartConfig::default();
        assert_eq!(config.over_removal, OverRemovalPolicy::Reject);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_reads_variables() {
        let config = CartConfig::from_lookup(lookup(&[
            ("CART_OVER_REMOVAL", "Clamp"),
            ("RUST_LOG", "domain=debug"),
        ]));
        assert_eq!(config.over_removal, OverRemovalPolicy::Clamp);
        assert_eq!(config.log_level, "domain=debug");
    }

    #[test]
    fn test_bad_policy_falls_back_to_default() {
        let config = CartConfig::from_lookup(lookup(&[("CART_OVER_REMOVAL", "backorder")]));
        assert_eq!(config.over_removal, OverRemovalPolicy::Reject);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(" reject ".parse::<OverRemovalPolicy>().unwrap(), OverRemovalPolicy::Reject);
        assert!("".parse::<OverRemovalPolicy>().is_err());
    }
}
