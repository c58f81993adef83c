use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

const DEFAULT_APPOINTMENT_MINUTES: i64 = 30;
const MAX_APPOINTMENT_MINUTES: i64 = 8 * 60;

/// Which step classifies free-form queries before dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierMode {
    Keyword,
    Model,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_key: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub openai_model: String,
    pub extraction_timeout_seconds: u64,
    pub extraction_max_attempts: u32,
    pub extraction_retry_delay_ms: u64,
    pub auto_commit_min_confidence: f32,
    pub default_appointment_minutes: i64,
    pub intent_classifier: ClassifierMode,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_key: String::new(),
            openai_api_key: String::new(),
            openai_base_url: "https://api.openai.com/v1".to_string(),
            openai_model: "gpt-4o-mini".to_string(),
            extraction_timeout_seconds: 20,
            extraction_max_attempts: 2,
            extraction_retry_delay_ms: 250,
            auto_commit_min_confidence: 0.5,
            default_appointment_minutes: DEFAULT_APPOINTMENT_MINUTES,
            intent_classifier: ClassifierMode::Keyword,
            port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_service_key: env::var("SUPABASE_SERVICE_ROLE_KEY").unwrap_or_default(),
            openai_api_key: env::var("OPENAI_API_KEY")
                .unwrap_or_else(|_| {
                    warn!("OPENAI_API_KEY not set, extraction will be unavailable");
                    String::new()
                }),
            openai_base_url: env::var("OPENAI_BASE_URL")
                .unwrap_or(defaults.openai_base_url),
            openai_model: env::var("OPENAI_MODEL")
                .unwrap_or(defaults.openai_model),
            extraction_timeout_seconds: parse_or("EXTRACTION_TIMEOUT_SECONDS", defaults.extraction_timeout_seconds),
            extraction_max_attempts: parse_or("EXTRACTION_MAX_ATTEMPTS", defaults.extraction_max_attempts).max(1),
            extraction_retry_delay_ms: parse_or("EXTRACTION_RETRY_DELAY_MS", defaults.extraction_retry_delay_ms),
            auto_commit_min_confidence: parse_or("AUTO_COMMIT_MIN_CONFIDENCE", defaults.auto_commit_min_confidence)
                .clamp(0.0, 1.0),
            default_appointment_minutes: bounded_minutes(parse_or(
                "DEFAULT_APPOINTMENT_MINUTES",
                defaults.default_appointment_minutes,
            )),
            intent_classifier: match env::var("INTENT_CLASSIFIER").as_deref() {
                Ok("model") => ClassifierMode::Model,
                Ok("keyword") | Err(_) => ClassifierMode::Keyword,
                Ok(other) => {
                    warn!("Unknown INTENT_CLASSIFIER '{}', using keyword", other);
                    ClassifierMode::Keyword
                }
            },
            port: parse_or("PORT", defaults.port),
        };

        if !config.is_configured() {
            warn!("Store not configured - falling back to the in-memory clinic store");
        }

        config
    }

    /// True when the PostgREST store can be reached.
    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn is_model_configured(&self) -> bool {
        !self.openai_api_key.is_empty() && !self.openai_base_url.is_empty()
    }

    pub fn extraction_timeout(&self) -> Duration {
        Duration::from_secs(self.extraction_timeout_seconds)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.extraction_retry_delay_ms)
    }

    /// Length given to appointments that don't state one; always within 1..=480.
    pub fn appointment_minutes(&self) -> i64 {
        bounded_minutes(self.default_appointment_minutes)
    }
}

fn bounded_minutes(minutes: i64) -> i64 {
    if (1..=MAX_APPOINTMENT_MINUTES).contains(&minutes) {
        minutes
    } else {
        warn!(
            "DEFAULT_APPOINTMENT_MINUTES {} is outside 1..={}, using {}",
            minutes, MAX_APPOINTMENT_MINUTES, DEFAULT_APPOINTMENT_MINUTES
        );
        DEFAULT_APPOINTMENT_MINUTES
    }
}

fn parse_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value '{}', using default", key, raw);
            default
        }),
        Err(_) => default,
    }
}
