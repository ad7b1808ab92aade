//! API configuration.

use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
    /// Allowed origins; `*` allows any origin without credentials
    pub cors_origins: Vec<String>,
    /// Per-client request rate on `/api`
    pub rate_limit_rps: u32,
    /// Largest accepted request body, video uploads included
    pub max_body_size: usize,
    /// `production` hides internal error details and marks cookies secure
    pub environment: String,
    /// Artifact directory, served under `/static/uploads`
    pub upload_dir: PathBuf,
    pub session_cookie: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: vec!["*".to_string()],
            rate_limit_rps: 10,
            max_body_size: 500 * 1024 * 1024,
            environment: "development".to_string(),
            upload_dir: PathBuf::from("static/uploads"),
            session_cookie: "vdub_session".to_string(),
        }
    }
}

impl ApiConfig {
    /// Read `API_HOST`, `API_PORT`, `CORS_ORIGINS`, `RATE_LIMIT_RPS`,
    /// `MAX_BODY_SIZE`, `ENVIRONMENT`, `UPLOAD_DIR` and `SESSION_COOKIE`.
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            host: env_or("API_HOST", d.host),
            port: env_or("API_PORT", d.port),
            cors_origins: std::env::var("CORS_ORIGINS")
                .map(|s| {
                    s.split(',')
                        .map(|o| o.trim().to_string())
                        .filter(|o| !o.is_empty())
                        .collect()
                })
                .unwrap_or(d.cors_origins),
            rate_limit_rps: env_or("RATE_LIMIT_RPS", d.rate_limit_rps),
            max_body_size: env_or("MAX_BODY_SIZE", d.max_body_size),
            environment: env_or("ENVIRONMENT", d.environment),
            upload_dir: env_or("UPLOAD_DIR", d.upload_dir),
            session_cookie: env_or("SESSION_COOKIE", d.session_cookie),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_flag() {
        let mut config = ApiConfig::default();
        assert!(!config.is_production());
        config.environment = "Production".to_string();
        assert!(config.is_production());
    }
}
