use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default keep-alive schedule: top of every hour 09:00-17:00, Monday to Friday.
pub const DEFAULT_KEEPALIVE_SCHEDULE: &str = "0 0 9-17 * * Mon-Fri";

/// Origins allowed to read responses cross-origin.
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "https://portal.azure.com",
    "http://localhost:4200",
    "https://wonderful-dune-0e4733c03.5.azurestaticapps.net",
];

/// Root configuration for appointbot.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub chat: ChatServiceConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub keepalive: KeepAliveConfig,
    pub relay: RelayConfig,
}

/// Hosted chat-completion deployment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct ChatServiceConfig {
    pub api_key: String,
    pub endpoint: String,
    pub deployment: String,
    pub api_version: String,
}

impl ChatServiceConfig {
    /// Every field is required; report the first one that is missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("AZURE_OPENAI_API_KEY", &self.api_key),
            ("AZURE_OPENAI_ENDPOINT", &self.endpoint),
            ("AZURE_OPENAI_DEPLOYMENT", &self.deployment),
            ("AZURE_OPENAI_API_VERSION", &self.api_version),
        ];
        require_all(&fields)
    }
}

/// Engine behind the keep-alive probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseEngine {
    #[default]
    SqlServer,
    Postgres,
}

impl DatabaseEngine {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "sqlserver" | "mssql" => Some(DatabaseEngine::SqlServer),
            "postgres" | "postgresql" => Some(DatabaseEngine::Postgres),
            _ => None,
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            DatabaseEngine::SqlServer => 1433,
            DatabaseEngine::Postgres => 5432,
        }
    }
}

/// Relational database used by the keep-alive probe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DatabaseConfig {
    pub engine: DatabaseEngine,
    pub user: String,
    pub password: String,
    pub server: String,
    pub database: String,
    /// Falls back to the engine's standard port.
    pub port: Option<u16>,
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("DB_USER", &self.user),
            ("DB_PASSWORD", &self.password),
            ("DB_SERVER", &self.server),
            ("DB_DATABASE", &self.database),
        ];
        require_all(&fields)
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(self.engine.default_port())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: DEFAULT_ALLOWED_ORIGINS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeepAliveConfig {
    pub enabled: bool,
    pub schedule: String,
    pub timezone: String,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: DEFAULT_KEEPALIVE_SCHEDULE.to_string(),
            timezone: "UTC".to_string(),
        }
    }
}

impl KeepAliveConfig {
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        parse_timezone(&self.timezone)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayConfig {
    /// Zone used for the "today is" line of the system prompt.
    pub timezone: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            timezone: "Europe/Helsinki".to_string(),
        }
    }
}

impl RelayConfig {
    pub fn timezone(&self) -> Result<Tz, ConfigError> {
        parse_timezone(&self.timezone)
    }
}

fn require_all(fields: &[(&'static str, &String)]) -> Result<(), ConfigError> {
    for &(name, value) in fields {
        if value.trim().is_empty() {
            return Err(ConfigError::Missing(name));
        }
    }
    Ok(())
}

fn parse_timezone(name: &str) -> Result<Tz, ConfigError> {
    name.parse::<Tz>()
        .map_err(|_| ConfigError::Invalid(format!("unknown time zone '{}'", name)))
}

/// Load config from the process environment.
pub fn load_config_from_env() -> Config {
    load_config_with(|name| std::env::var(name).ok())
}

/// Load config through an arbitrary variable lookup.
///
/// `APPOINTBOT_CONFIG` may carry the whole config as JSON; otherwise individual
/// variables are overlaid on the defaults. Required credentials are not checked
/// here: a missing value surfaces when an invocation needs it.
pub fn load_config_with<F>(lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(json) = get("APPOINTBOT_CONFIG") {
        match serde_json::from_str::<Config>(&json) {
            Ok(config) => return config,
            Err(e) => {
                tracing::warn!("Failed to parse APPOINTBOT_CONFIG: {}", e);
            }
        }
    }

    let mut cfg = Config::default();

    // Chat service
    if let Some(v) = get("AZURE_OPENAI_API_KEY") {
        cfg.chat.api_key = v;
    }
    if let Some(v) = get("AZURE_OPENAI_ENDPOINT") {
        cfg.chat.endpoint = v;
    }
    if let Some(v) = get("AZURE_OPENAI_DEPLOYMENT") {
        cfg.chat.deployment = v;
    }
    if let Some(v) = get("AZURE_OPENAI_API_VERSION") {
        cfg.chat.api_version = v;
    }

    // Database
    if let Some(v) = get("DB_ENGINE") {
        match DatabaseEngine::from_name(&v) {
            Some(engine) => cfg.database.engine = engine,
            None => tracing::warn!("Ignoring unknown DB_ENGINE '{}'", v),
        }
    }
    if let Some(v) = get("DB_USER") {
        cfg.database.user = v;
    }
    if let Some(v) = get("DB_PASSWORD") {
        cfg.database.password = v;
    }
    if let Some(v) = get("DB_SERVER") {
        cfg.database.server = v;
    }
    if let Some(v) = get("DB_DATABASE") {
        cfg.database.database = v;
    }
    if let Some(v) = get("DB_PORT") {
        match v.parse() {
            Ok(port) => cfg.database.port = Some(port),
            Err(_) => tracing::warn!("Ignoring invalid DB_PORT '{}'", v),
        }
    }

    // CORS
    if let Some(v) = get("ALLOWED_ORIGINS") {
        cfg.cors.allowed_origins = v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    // Keep-alive timer
    if let Some(v) = get("KEEPALIVE_SCHEDULE") {
        cfg.keepalive.schedule = v;
    }
    if let Some(v) = get("KEEPALIVE_TIMEZONE") {
        cfg.keepalive.timezone = v;
    }
    if let Some(v) = get("KEEPALIVE_ENABLED") {
        cfg.keepalive.enabled = !matches!(v.to_lowercase().as_str(), "0" | "false" | "no");
    }

    if let Some(v) = get("APPOINTMENT_TIMEZONE") {
        cfg.relay.timezone = v;
    }

    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.cors.allowed_origins.len(), 3);
        assert_eq!(cfg.keepalive.schedule, DEFAULT_KEEPALIVE_SCHEDULE);
        assert_eq!(cfg.relay.timezone, "Europe/Helsinki");
        assert_eq!(cfg.database.engine, DatabaseEngine::SqlServer);
        assert_eq!(cfg.database.port(), 1433);
        assert!(cfg.keepalive.enabled);
    }

    #[test]
    fn test_individual_vars() {
        let cfg = load_config_with(lookup(&[
            ("AZURE_OPENAI_API_KEY", "key-123"),
            ("AZURE_OPENAI_ENDPOINT", "https://clinic.openai.azure.com"),
            ("AZURE_OPENAI_DEPLOYMENT", "gpt-4o"),
            ("AZURE_OPENAI_API_VERSION", "2024-08-01-preview"),
            ("DB_USER", "keeper"),
            ("DB_PASSWORD", "secret"),
            ("DB_SERVER", "db.internal"),
            ("DB_DATABASE", "clinic"),
            ("DB_PORT", "6543"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example,"),
        ]));
        assert!(cfg.chat.validate().is_ok());
        assert!(cfg.database.validate().is_ok());
        assert_eq!(cfg.database.port(), 6543);
        assert_eq!(
            cfg.cors.allowed_origins,
            vec!["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_missing_credentials_reported_by_name() {
        let cfg = load_config_with(lookup(&[
            ("AZURE_OPENAI_API_KEY", "key-123"),
            ("AZURE_OPENAI_ENDPOINT", "https://clinic.openai.azure.com"),
        ]));
        match cfg.chat.validate() {
            Err(ConfigError::Missing(name)) => assert_eq!(name, "AZURE_OPENAI_DEPLOYMENT"),
            other => panic!("expected missing deployment, got {:?}", other),
        }
        match cfg.database.validate() {
            Err(ConfigError::Missing(name)) => assert_eq!(name, "DB_USER"),
            other => panic!("expected missing user, got {:?}", other),
        }
    }

    #[test]
    fn test_database_engine_selection() {
        let cfg = load_config_with(lookup(&[("DB_ENGINE", "Postgres")]));
        assert_eq!(cfg.database.engine, DatabaseEngine::Postgres);
        assert_eq!(cfg.database.port(), 5432);

        let cfg = load_config_with(lookup(&[("DB_ENGINE", "oracle")]));
        assert_eq!(cfg.database.engine, DatabaseEngine::SqlServer);

        let json = r#"{ "database": { "engine": "postgres", "port": 6000 } }"#;
        let cfg = load_config_with(lookup(&[("APPOINTBOT_CONFIG", json)]));
        assert_eq!(cfg.database.engine, DatabaseEngine::Postgres);
        assert_eq!(cfg.database.port(), 6000);
    }

    #[test]
    fn test_blank_values_count_as_missing() {
        let cfg = load_config_with(lookup(&[("DB_USER", "   ")]));
        assert!(matches!(
            cfg.database.validate(),
            Err(ConfigError::Missing("DB_USER"))
        ));
    }

    #[test]
    fn test_full_json_config() {
        let json = r#"{
            "chat": { "apiKey": "k", "endpoint": "https://e", "deployment": "d", "apiVersion": "v" },
            "keepalive": { "enabled": false }
        }"#;
        let cfg = load_config_with(lookup(&[("APPOINTBOT_CONFIG", json)]));
        assert_eq!(cfg.chat.api_key, "k");
        assert!(!cfg.keepalive.enabled);
        assert_eq!(cfg.keepalive.schedule, DEFAULT_KEEPALIVE_SCHEDULE);
    }

    #[test]
    fn test_invalid_json_falls_back_to_vars() {
        let cfg = load_config_with(lookup(&[
            ("APPOINTBOT_CONFIG", "{not json"),
            ("DB_SERVER", "db.internal"),
        ]));
        assert_eq!(cfg.database.server, "db.internal");
    }

    #[test]
    fn test_timezones() {
        let cfg = Config::default();
        assert_eq!(cfg.relay.timezone().unwrap(), chrono_tz::Europe::Helsinki);
        assert_eq!(cfg.keepalive.timezone().unwrap(), chrono_tz::UTC);

        let bad = RelayConfig {
            timezone: "Mars/Olympus".into(),
        };
        assert!(matches!(bad.timezone(), Err(ConfigError::Invalid(_))));
    }
}
