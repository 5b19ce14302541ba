//! Console configuration loaded from environment variables.

use std::time::Duration;

use common::ReplicaId;
use replica::DEFAULT_MAILBOX_CAPACITY;

/// Console configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `REPLICAS`: comma-separated replica ids (default: `"A,B"`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `STRICT_ITEM_REMOVAL`: reject removing absent items (default: `false`)
/// - `MAILBOX_CAPACITY`: messages buffered per aggregate actor (default: `64`)
/// - `ACTOR_IDLE_SECS`: seconds before an unused aggregate actor is
///   released, `0` keeps actors forever (default: `300`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub replicas: Vec<ReplicaId>,
    pub log_level: String,
    pub strict_item_removal: bool,
    pub mailbox_capacity: usize,
    pub actor_idle_timeout: Option<Duration>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from `lookup`, falling back to defaults for
    /// missing or unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        let replicas = lookup("REPLICAS")
            .map(|value| parse_replicas(&value))
            .filter(|replicas| !replicas.is_empty())
            .unwrap_or(defaults.replicas);

        Self {
            replicas,
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            strict_item_removal: lookup("STRICT_ITEM_REMOVAL")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(defaults.strict_item_removal),
            mailbox_capacity: lookup("MAILBOX_CAPACITY")
                .and_then(|v| v.trim().parse().ok())
                .filter(|capacity| *capacity > 0)
                .unwrap_or(defaults.mailbox_capacity),
            actor_idle_timeout: lookup("ACTOR_IDLE_SECS")
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(|secs| (secs > 0).then(|| Duration::from_secs(secs)))
                .unwrap_or(defaults.actor_idle_timeout),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            replicas: vec![ReplicaId::new("A"), ReplicaId::new("B")],
            log_level: "info".to_string(),
            strict_item_removal: false,
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            actor_idle_timeout: Some(Duration::from_secs(300)),
        }
    }
}

fn parse_replicas(value: &str) -> Vec<ReplicaId> {
    let mut replicas: Vec<ReplicaId> = value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(ReplicaId::new)
        .collect();
    replicas.sort();
    replicas.dedup();
    replicas
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
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
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.replicas, vec![ReplicaId::new("A"), ReplicaId::new("B")]);
        assert_eq!(config.log_level, "info");
        assert!(!config.strict_item_removal);
        assert_eq!(config.mailbox_capacity, 64);
        assert_eq!(config.actor_idle_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        assert_eq!(Config::from_lookup(lookup(&[])), Config::default());
    }

    #[test]
    fn test_reads_all_variables() {
        let config = Config::from_lookup(lookup(&[
            ("REPLICAS", "C, A,B,A"),
            ("RUST_LOG", "debug"),
            ("STRICT_ITEM_REMOVAL", "true"),
            ("MAILBOX_CAPACITY", "8"),
            ("ACTOR_IDLE_SECS", "30"),
        ]));

        assert_eq!(
            config.replicas,
            vec![ReplicaId::new("A"), ReplicaId::new("B"), ReplicaId::new("C")]
        );
        assert_eq!(config.log_level, "debug");
        assert!(config.strict_item_removal);
        assert_eq!(config.mailbox_capacity, 8);
        assert_eq!(config.actor_idle_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_zero_idle_seconds_keeps_actors() {
        let config = Config::from_lookup(lookup(&[("ACTOR_IDLE_SECS", "0")]));
        assert_eq!(config.actor_idle_timeout, None);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::from_lookup(lookup(&[
            ("REPLICAS", " , "),
            ("STRICT_ITEM_REMOVAL", "maybe"),
            ("MAILBOX_CAPACITY", "0"),
            ("ACTOR_IDLE_SECS", "soon"),
        ]));

        assert_eq!(config, Config::default());
    }
}
