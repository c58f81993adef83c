use chrono::{DateTime, TimeZone, Utc};

use shared_config::AppConfig;

pub struct TestConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub openai_base_url: String,
    pub openai_api_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
            openai_base_url: "http://localhost:11434/v1".to_string(),
            openai_api_key: "test-openai-key".to_string(),
        }
    }
}

impl TestConfig {
    /// Points both outbound capabilities at the same mock server.
    pub fn with_mock_server(uri: &str) -> Self {
        Self {
            supabase_url: uri.to_string(),
            openai_base_url: format!("{}/v1", uri),
            ..Self::default()
        }
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            openai_base_url: self.openai_base_url.clone(),
            openai_api_key: self.openai_api_key.clone(),
            extraction_timeout_seconds: 2,
            extraction_max_attempts: 2,
            extraction_retry_delay_ms: 10,
            ..AppConfig::default()
        }
    }
}

pub fn utc(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0)
        .single()
        .unwrap_or_else(|| panic!("invalid test instant {year}-{month}-{day} {hour}:{minute}"))
}

/// Monday 2024-06-03 09:00 UTC, the reference instant used across intake tests.
pub fn reference_monday() -> DateTime<Utc> {
    utc(2024, 6, 3, 9, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Weekday};

    #[test]
    fn test_reference_is_monday_morning() {
        let reference = reference_monday();
        assert_eq!(reference.weekday(), Weekday::Mon);
        assert_eq!(reference.format("%H:%M").to_string(), "09:00");
    }

    #[test]
    fn test_mock_server_config() {
        let config = TestConfig::with_mock_server("http://127.0.0.1:9999").to_app_config();
        assert_eq!(config.supabase_url, "http://127.0.0.1:9999");
        assert_eq!(config.openai_base_url, "http://127.0.0.1:9999/v1");
        assert!(config.is_configured());
        assert!(config.is_model_configured());
    }
}
