use std::{env, fmt::Display, str::FromStr};

use anyhow::{anyhow, bail, Result};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Postgres { database_url: String },
    Postgrest { base_url: String, api_key: String },
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store: StoreConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            port: try_load("PORT", "8081")?,
            store: store_from(|k| env::var(k).ok())?,
        })
    }
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse().map_err(|e| {
        warn!("Invalid {key} value: {e}");
        anyhow!("invalid {key}: {e}")
    })
}

fn store_from(var: impl Fn(&str) -> Option<String>) -> Result<StoreConfig> {
    let kind = var("STORE").unwrap_or_else(|| "postgres".into());
    let required = |key: &str| var(key).ok_or_else(|| anyhow!("{key} not set"));
    match kind.to_ascii_lowercase().as_str() {
        "postgres" => Ok(StoreConfig::Postgres {
            database_url: required("DATABASE_URL")?,
        }),
        "postgrest" | "supabase" => Ok(StoreConfig::Postgrest {
            base_url: required("SUPABASE_URL")?,
            api_key: required("SUPABASE_ANON_KEY")?,
        }),
        "memory" => Ok(StoreConfig::Memory),
        other => bail!("unknown STORE {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn defaults_to_postgres() {
        let cfg = store_from(vars(&[("DATABASE_URL", "postgres://localhost/tutor")])).unwrap();
        assert_eq!(
            cfg,
            StoreConfig::Postgres {
                database_url: "postgres://localhost/tutor".into()
            }
        );
        assert!(store_from(vars(&[])).is_err());
    }

    #[test]
    fn supabase_needs_url_and_key() {
        let cfg = store_from(vars(&[
            ("STORE", "supabase"),
            ("SUPABASE_URL", "https://x.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
        ]))
        .unwrap();
        assert!(matches!(cfg, StoreConfig::Postgrest { .. }));
        assert!(store_from(vars(&[("STORE", "postgrest")])).is_err());
        assert!(store_from(vars(&[("STORE", "mongo")])).is_err());
        assert_eq!(store_from(vars(&[("STORE", "Memory")])).unwrap(), StoreConfig::Memory);
    }
}
