use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value for {var}: {value}")]
    Invalid { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreSettings {
    Postgres { database_url: String, table: String },
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanbooruCredentials {
    pub login: String,
    pub api_key: String,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub discord_token: String,
    pub accord_env: String,
    pub store: StoreSettings,
    pub danbooru_url: String,
    pub danbooru_credentials: Option<DanbooruCredentials>,
    pub refresh_interval: Duration,
    pub delivery_delay: Duration,
    pub store_backoff_unit: Duration,
    pub store_max_retries: usize,
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let discord_token = lookup("DISCORD_TOKEN")
            .or_else(|| lookup("ACCORD_DISCORD_TOKEN"))
            .ok_or(ConfigError::Missing("DISCORD_TOKEN"))?;
        let accord_env = lookup("ACCORD_ENV").unwrap_or_else(|| "dev".to_string());

        let store_kind = lookup("ACCORD_STORE").unwrap_or_else(|| "postgres".to_string());
        let store = match store_kind.as_str() {
            "postgres" => {
                let database_url = lookup("DATABASE_URL")
                    .or_else(|| lookup("ACCORD_DATABASE_URL"))
                    .ok_or(ConfigError::Missing("DATABASE_URL"))?;
                let table = lookup("ACCORD_TABLE").unwrap_or_else(|| "accord".to_string());
                if !is_identifier(&table) {
                    return Err(ConfigError::Invalid {
                        var: "ACCORD_TABLE",
                        value: table,
                    });
                }
                StoreSettings::Postgres {
                    database_url,
                    table,
                }
            }
            "memory" => StoreSettings::Memory,
            _ => {
                return Err(ConfigError::Invalid {
                    var: "ACCORD_STORE",
                    value: store_kind,
                })
            }
        };

        let danbooru_url = lookup("DANBOORU_URL")
            .unwrap_or_else(|| "https://danbooru.donmai.us".to_string())
            .trim_end_matches('/')
            .to_string();
        let danbooru_credentials = match (lookup("DANBOORU_USERNAME"), lookup("DANBOORU_API_KEY")) {
            (Some(login), Some(api_key)) => Some(DanbooruCredentials { login, api_key }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("DANBOORU_API_KEY")),
            (None, Some(_)) => return Err(ConfigError::Missing("DANBOORU_USERNAME")),
        };

        let refresh_interval = Duration::from_secs(
            lookup("ACCORD_REFRESH_INTERVAL_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(3600),
        );
        let delivery_delay = Duration::from_millis(
            lookup("ACCORD_DELIVERY_DELAY_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(1000),
        );
        let store_backoff_unit = Duration::from_millis(
            lookup("ACCORD_STORE_BACKOFF_MS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(50),
        );
        let store_max_retries = lookup("ACCORD_STORE_MAX_RETRIES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Ok(Self {
            discord_token,
            accord_env,
            store,
            danbooru_url,
            danbooru_credentials,
            refresh_interval,
            delivery_delay,
            store_backoff_unit,
            store_max_retries,
        })
    }
}

/// Table names end up inside SQL text, so only plain identifiers are allowed.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn test_defaults() {
        let settings = settings(&[
            ("DISCORD_TOKEN", "token"),
            ("DATABASE_URL", "postgres://localhost/accord"),
        ])
        .unwrap();

        assert_eq!(settings.discord_token, "token");
        assert_eq!(settings.accord_env, "dev");
        assert_eq!(
            settings.store,
            StoreSettings::Postgres {
                database_url: "postgres://localhost/accord".to_string(),
                table: "accord".to_string(),
            }
        );
        assert_eq!(settings.danbooru_url, "https://danbooru.donmai.us");
        assert!(settings.danbooru_credentials.is_none());
        assert_eq!(settings.refresh_interval, Duration::from_secs(3600));
        assert_eq!(settings.delivery_delay, Duration::from_millis(1000));
        assert_eq!(settings.store_backoff_unit, Duration::from_millis(50));
        assert_eq!(settings.store_max_retries, 10);
    }

    #[test]
    fn test_token_is_required() {
        let err = settings(&[("ACCORD_STORE", "memory")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DISCORD_TOKEN")));
    }

    #[test]
    fn test_alternate_token_variable() {
        let settings = settings(&[
            ("ACCORD_DISCORD_TOKEN", "alt"),
            ("ACCORD_STORE", "memory"),
        ])
        .unwrap();
        assert_eq!(settings.discord_token, "alt");
        assert_eq!(settings.store, StoreSettings::Memory);
    }

    #[test]
    fn test_postgres_requires_database_url() {
        let err = settings(&[("DISCORD_TOKEN", "token")]).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn test_unknown_store_kind() {
        let err = settings(&[("DISCORD_TOKEN", "token"), ("ACCORD_STORE", "dynamo")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "ACCORD_STORE", .. }));
    }

    #[test]
    fn test_table_name_must_be_identifier() {
        let err = settings(&[
            ("DISCORD_TOKEN", "token"),
            ("DATABASE_URL", "postgres://localhost/accord"),
            ("ACCORD_TABLE", "accord; drop table x"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "ACCORD_TABLE", .. }));
    }

    #[test]
    fn test_credentials_need_both_parts() {
        let err = settings(&[
            ("DISCORD_TOKEN", "token"),
            ("ACCORD_STORE", "memory"),
            ("DANBOORU_USERNAME", "someone"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DANBOORU_API_KEY")));

        let settings = settings(&[
            ("DISCORD_TOKEN", "token"),
            ("ACCORD_STORE", "memory"),
            ("DANBOORU_USERNAME", "someone"),
            ("DANBOORU_API_KEY", "secret"),
            ("DANBOORU_URL", "https://testbooru.donmai.us/"),
        ])
        .unwrap();
        assert_eq!(
            settings.danbooru_credentials,
            Some(DanbooruCredentials {
                login: "someone".to_string(),
                api_key: "secret".to_string(),
            })
        );
        assert_eq!(settings.danbooru_url, "https://testbooru.donmai.us");
    }

    #[test]
    fn test_numeric_overrides_and_fallbacks() {
        let settings = settings(&[
            ("DISCORD_TOKEN", "token"),
            ("ACCORD_STORE", "memory"),
            ("ACCORD_REFRESH_INTERVAL_SECS", "60"),
            ("ACCORD_DELIVERY_DELAY_MS", "not-a-number"),
            ("ACCORD_STORE_BACKOFF_MS", "10"),
            ("ACCORD_STORE_MAX_RETRIES", "3"),
        ])
        .unwrap();

        assert_eq!(settings.refresh_interval, Duration::from_secs(60));
        assert_eq!(settings.delivery_delay, Duration::from_millis(1000));
        assert_eq!(settings.store_backoff_unit, Duration::from_millis(10));
        assert_eq!(settings.store_max_retries, 3);
    }

    #[test]
    fn test_is_identifier() {
        assert!(is_identifier("accord"));
        assert!(is_identifier("_accord_2"));
        assert!(!is_identifier("2accord"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("acc-ord"));
    }
}
