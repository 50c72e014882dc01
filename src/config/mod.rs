use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:5000").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Redis connection string for the product cache
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// UPCitemdb API key. Without one the rate-limited trial endpoint is used.
    pub upcitemdb_api_key: Option<String>,

    /// UPCitemdb API root
    #[serde(default = "default_upcitemdb_url")]
    pub upcitemdb_url: String,

    /// Lifetime of cached product records, in days
    #[serde(default = "default_cache_expiry_days")]
    pub cache_expiry_days: u64,

    /// Gemini API key. Best-image selection is disabled when unset.
    pub gemini_api_key: Option<String>,

    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,

    /// Public base URL that stored images are served under
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Directory holding downloaded product images, one subdirectory per UPC
    #[serde(default = "default_image_dir")]
    pub image_dir: PathBuf,

    /// Timeout applied to every outbound HTTP call
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

fn default_upcitemdb_url() -> String {
    "https://api.upcitemdb.com/prod".to_string()
}

fn default_cache_expiry_days() -> u64 {
    30
}

fn default_gemini_model() -> String {
    "gemini-2.5-flash".to_string()
}

fn default_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_image_dir() -> PathBuf {
    PathBuf::from("static/upc_images")
}

fn default_http_timeout_secs() -> u64 {
    10
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_expiry_days * 24 * 60 * 60)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_to_empty_environment() {
        let config: AppConfig = envy::from_iter(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.cache_expiry_days, 30);
        assert_eq!(config.cache_ttl(), Duration::from_secs(30 * 86_400));
        assert_eq!(config.http_timeout(), Duration::from_secs(10));
        assert!(config.gemini_api_key.is_none());
        assert_eq!(config.image_dir, PathBuf::from("static/upc_images"));
    }

    #[test]
    fn test_overrides_from_environment() {
        let vars = vec![
            ("CACHE_EXPIRY_DAYS".to_string(), "7".to_string()),
            ("GEMINI_API_KEY".to_string(), "secret".to_string()),
            ("BASE_URL".to_string(), "https://img.example.com".to_string()),
        ];
        let config: AppConfig = envy::from_iter(vars).unwrap();
        assert_eq!(config.cache_expiry_days, 7);
        assert_eq!(config.gemini_api_key.as_deref(), Some("secret"));
        assert_eq!(config.base_url, "https://img.example.com");
    }
}
