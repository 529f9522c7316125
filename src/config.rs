use std::net::SocketAddr;

use chrono::Duration;

const DEFAULT_ACL_MODEL: &str = "acl/model.conf";
const DEFAULT_ACL_POLICY: &str = "acl/policy.csv";
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name} has an invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
}

/// Process configuration, read from the environment after `.env` is loaded.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub session_key: String,
    pub acl_model: String,
    pub acl_policy: String,
    pub listen_addr: SocketAddr,
    pub session_ttl: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let listen_addr = lookup("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen_addr.parse().map_err(|_| ConfigError::Invalid {
            name: "LISTEN_ADDR",
            value: listen_addr.clone(),
        })?;

        let session_ttl = match lookup("SESSION_TTL_HOURS") {
            Some(raw) => match raw.parse::<i64>() {
                Ok(hours) if hours > 0 => Duration::hours(hours),
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "SESSION_TTL_HOURS",
                        value: raw,
                    })
                }
            },
            None => Duration::hours(DEFAULT_SESSION_TTL_HOURS),
        };

        Ok(Config {
            database_url: required("DATABASE_URL")?,
            session_key: required("SESSION_KEY")?,
            acl_model: lookup("ACL_MODEL").unwrap_or_else(|| DEFAULT_ACL_MODEL.to_string()),
            acl_policy: lookup("ACL_POLICY").unwrap_or_else(|| DEFAULT_ACL_POLICY.to_string()),
            listen_addr,
            session_ttl,
        })
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
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/hostel"),
            ("SESSION_KEY", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.acl_model, "acl/model.conf");
        assert_eq!(config.acl_policy, "acl/policy.csv");
        assert_eq!(config.listen_addr, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.session_ttl, Duration::hours(24));
    }

    #[test]
    fn missing_and_invalid_values() {
        let err = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/hostel")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("SESSION_KEY")));

        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/hostel"),
            ("SESSION_KEY", "secret"),
            ("SESSION_TTL_HOURS", "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { name: "SESSION_TTL_HOURS", .. }));
    }
}
