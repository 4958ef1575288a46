// src/config.rs
use rust_decimal::Decimal;
use std::net::IpAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Scylla,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scylla" => Ok(StoreBackend::Scylla),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub http_host: IpAddr,
    pub http_port: u16,
    pub alpha_vantage_api_key: String,
    pub alpha_vantage_url: String,
    pub quote_timeout: Duration,
    pub store_backend: StoreBackend,
    pub scylla_node: String,
    pub jwt_secret: String,
    pub token_ttl: chrono::Duration,
    pub bcrypt_cost: u32,
    pub default_balance: Decimal,
}

impl Config {
    /// Reads the process environment, after loading `.env` if one exists.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|value| !value.is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let text = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let default_balance: Decimal = parse(&lookup, "DEFAULT_BALANCE", "100000.0")?;
        if default_balance < Decimal::ZERO {
            return Err(ConfigError::Invalid {
                name: "DEFAULT_BALANCE",
                value: default_balance.to_string(),
            });
        }

        Ok(Config {
            http_host: parse(&lookup, "HTTP_HOST", "0.0.0.0")?,
            http_port: parse(&lookup, "HTTP_PORT", "5000")?,
            alpha_vantage_api_key: required("ALPHA_VANTAGE_API_KEY")?,
            alpha_vantage_url: text("ALPHA_VANTAGE_URL", "https://www.alphavantage.co"),
            quote_timeout: Duration::from_secs(parse(&lookup, "QUOTE_TIMEOUT_SECS", "5")?),
            store_backend: parse(&lookup, "STORE_BACKEND", "scylla")?,
            scylla_node: text("SCYLLA_NODE", "127.0.0.1:9042"),
            jwt_secret: required("JWT_SECRET")?,
            token_ttl: chrono::Duration::hours(parse(&lookup, "TOKEN_TTL_HOURS", "24")?),
            bcrypt_cost: parse(&lookup, "BCRYPT_COST", &bcrypt::DEFAULT_COST.to_string())?,
            default_balance,
        })
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: &str,
) -> Result<T, ConfigError> {
    let value = lookup(name).unwrap_or_else(|| default.to_string());
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { name, value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    const REQUIRED: [(&str, &str); 2] =
        [("ALPHA_VANTAGE_API_KEY", "key"), ("JWT_SECRET", "secret")];

    #[test]
    fn defaults_apply() {
        let config = config(&REQUIRED).unwrap();
        assert_eq!(config.http_host.to_string(), "0.0.0.0");
        assert_eq!(config.http_port, 5000);
        assert_eq!(config.quote_timeout, Duration::from_secs(5));
        assert_eq!(config.store_backend, StoreBackend::Scylla);
        assert_eq!(config.default_balance, Decimal::new(100000, 0));
        assert_eq!(config.bcrypt_cost, bcrypt::DEFAULT_COST);
    }

    #[test]
    fn overrides_are_parsed() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("HTTP_HOST", "127.0.0.1"),
            ("HTTP_PORT", "8080"),
            ("STORE_BACKEND", "Memory"),
            ("TOKEN_TTL_HOURS", "2"),
        ]);
        let config = config(&vars).unwrap();
        assert_eq!(config.http_port, 8080);
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.token_ttl, chrono::Duration::hours(2));
    }

    #[test]
    fn missing_api_key_is_reported() {
        let err = config(&[("JWT_SECRET", "secret")]).unwrap_err();
        assert_eq!(err, ConfigError::Missing("ALPHA_VANTAGE_API_KEY"));
    }

    #[test]
    fn bad_port_is_reported() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("HTTP_PORT", "eighty"));
        assert_eq!(
            config(&vars).unwrap_err(),
            ConfigError::Invalid {
                name: "HTTP_PORT",
                value: "eighty".to_string()
            }
        );
    }

    #[test]
    fn negative_default_balance_is_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("DEFAULT_BALANCE", "-50.25"));
        assert_eq!(
            config(&vars).unwrap_err(),
            ConfigError::Invalid {
                name: "DEFAULT_BALANCE",
                value: "-50.25".to_string()
            }
        );

        let mut vars = REQUIRED.to_vec();
        vars.push(("DEFAULT_BALANCE", "0"));
        assert_eq!(config(&vars).unwrap().default_balance, Decimal::ZERO);
    }
}
