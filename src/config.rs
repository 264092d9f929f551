// ============================================================================
// CONFIGURATION
// ============================================================================
//
// Description:
//   Configuration chargée une seule fois au démarrage depuis les variables
//   d'environnement (.env en local via dotenv).
//
// Variables:
//   - DATABASE_URL (obligatoire)
//   - JWT_SECRET (obligatoire, 32 caractères minimum)
//   - AI_API_KEY (obligatoire)
//   - IDENTITY_URL / IDENTITY_ANON_KEY / IDENTITY_SERVICE_KEY (optionnelles,
//     le mode fédéré est désactivé si IDENTITY_URL est absente)
//   - le reste a une valeur par défaut (voir Config::default)
//
// ============================================================================

use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Paramètres du modèle de crédits
#[derive(Debug, Clone)]
pub struct CreditSettings {
    pub cost_per_summary: i32,
    pub free_monthly: i32,
    pub premium_monthly: i32,
}

/// Paramètres du client LLM
#[derive(Debug, Clone)]
pub struct AiSettings {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub chunk_threshold: usize,
    pub chunk_delay: Duration,
}

/// Fournisseur d'identité hébergé (GoTrue)
#[derive(Debug, Clone)]
pub struct IdentitySettings {
    pub url: String,
    pub anon_key: String,
    pub service_key: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,

    pub jwt_secret: String,
    pub access_token_ttl: chrono::Duration,
    pub refresh_token_ttl: chrono::Duration,

    /// Expose le texte brut des erreurs internes (dev uniquement)
    pub expose_error_details: bool,
    pub json_logs: bool,
    pub request_timeout: Duration,

    pub credits: CreditSettings,
    /// Nombre maximum de résumés conservés par utilisateur
    pub history_cap: u64,

    pub ai: AiSettings,
    pub identity: Option<IdentitySettings>,

    pub maintenance_interval: Duration,
    pub stale_generation_after: chrono::Duration,
}

impl Default for Config {
    /// Config de test uniquement.
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_url: "sqlite::memory:".to_string(),
            jwt_secret: "test-jwt-secret-with-32-bytes-min!".to_string(),
            access_token_ttl: chrono::Duration::minutes(15),
            refresh_token_ttl: chrono::Duration::days(7),
            expose_error_details: false,
            json_logs: false,
            request_timeout: Duration::from_secs(120),
            credits: CreditSettings {
                cost_per_summary: 1,
                free_monthly: 5,
                premium_monthly: 100,
            },
            history_cap: 100,
            ai: AiSettings {
                api_key: "test-key".to_string(),
                base_url: "https://api.openai.com/v1".to_string(),
                model: "gpt-4o-mini".to_string(),
                timeout: Duration::from_secs(60),
                chunk_threshold: 50_000,
                chunk_delay: Duration::from_millis(1000),
            },
            identity: None,
            maintenance_interval: Duration::from_secs(3600),
            stale_generation_after: chrono::Duration::minutes(15),
        }
    }
}

impl Config {
    /// Charge la configuration depuis l'environnement.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let defaults = Config::default();

        let jwt_secret = required("JWT_SECRET")?;
        if jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                name: "JWT_SECRET",
                reason: "must be at least 32 characters".to_string(),
            });
        }

        let credits = CreditSettings {
            cost_per_summary: parse_or("CREDITS_PER_SUMMARY", defaults.credits.cost_per_summary)?,
            free_monthly: parse_or("FREE_MONTHLY_CREDITS", defaults.credits.free_monthly)?,
            premium_monthly: parse_or("PREMIUM_MONTHLY_CREDITS", defaults.credits.premium_monthly)?,
        };
        if credits.cost_per_summary <= 0 {
            return Err(ConfigError::Invalid {
                name: "CREDITS_PER_SUMMARY",
                reason: "must be greater than 0".to_string(),
            });
        }

        let ai = AiSettings {
            api_key: required("AI_API_KEY")?,
            base_url: env::var("AI_BASE_URL").unwrap_or(defaults.ai.base_url),
            model: env::var("AI_MODEL").unwrap_or(defaults.ai.model),
            timeout: Duration::from_secs(parse_or("AI_TIMEOUT_SECS", 60u64)?),
            chunk_threshold: parse_or("AI_CHUNK_THRESHOLD", defaults.ai.chunk_threshold)?,
            chunk_delay: Duration::from_millis(parse_or("AI_CHUNK_DELAY_MS", 1000u64)?),
        };

        let identity = match env::var("IDENTITY_URL") {
            Ok(url) if !url.trim().is_empty() => Some(IdentitySettings {
                url: url.trim_end_matches('/').to_string(),
                anon_key: required("IDENTITY_ANON_KEY")?,
                service_key: env::var("IDENTITY_SERVICE_KEY").ok(),
            }),
            _ => None,
        };

        Ok(Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_or("PORT", defaults.port)?,
            database_url: required("DATABASE_URL")?,
            jwt_secret,
            access_token_ttl: chrono::Duration::minutes(parse_or("ACCESS_TOKEN_TTL_MINUTES", 15i64)?),
            refresh_token_ttl: chrono::Duration::days(parse_or("REFRESH_TOKEN_TTL_DAYS", 7i64)?),
            expose_error_details: parse_or("EXPOSE_ERROR_DETAILS", false)?,
            json_logs: env::var("LOG_FORMAT").map(|v| v == "json").unwrap_or(false),
            request_timeout: Duration::from_secs(parse_or("REQUEST_TIMEOUT_SECS", 120u64)?),
            credits,
            history_cap: parse_or("HISTORY_CAP", defaults.history_cap)?,
            ai,
            identity,
            maintenance_interval: Duration::from_secs(parse_or("MAINTENANCE_INTERVAL_SECS", 3600u64)?),
            stale_generation_after: chrono::Duration::minutes(parse_or("STALE_GENERATION_MINUTES", 15i64)?),
        })
    }
}

impl CreditSettings {
    /// Allotement mensuel d'un plan
    pub fn allotment(&self, plan: crate::models::users::Plan) -> i32 {
        match plan {
            crate::models::users::Plan::Free => self.free_monthly,
            crate::models::users::Plan::Premium => self.premium_monthly,
        }
    }
}

fn required(name: &'static str) -> Result<String, ConfigError> {
    env::var(name)
        .map(|v| v.trim().to_string())
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(name))
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            name,
            reason: format!("cannot parse {:?}", raw),
        }),
        Err(_) => Ok(default),
    }
}

/// Erreurs de configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::users::Plan;

    #[test]
    fn test_default_allotments() {
        let config = Config::default();
        assert_eq!(config.credits.allotment(Plan::Free), 5);
        assert_eq!(config.credits.allotment(Plan::Premium), 100);
        assert_eq!(config.credits.cost_per_summary, 1);
    }

    #[test]
    fn test_parse_or_falls_back_when_unset() {
        let value: u32 = parse_or("RECAP_API_TEST_UNSET_VARIABLE", 42).unwrap();
        assert_eq!(value, 42);
    }
}
