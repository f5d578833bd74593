use axum::http::{HeaderValue, Method};
use thiserror::Error;
use tower_http::cors::{AllowOrigin, CorsLayer};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origin. Any origin when unset.
    pub client_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 3000,
            client_url: None,
        }
    }
}

impl Config {
    /// Reads `HOST`, `PORT` and `CLIENT_URL`, with `.env` taken into account.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| dotenv::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(host) = lookup("HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("PORT") {
            config.port = port
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PORT", port))?;
        }
        if let Some(client_url) = lookup("CLIENT_URL").filter(|url| url != "*") {
            HeaderValue::from_str(&client_url)
                .map_err(|_| ConfigError::InvalidValue("CLIENT_URL", client_url.clone()))?;
            config.client_url = Some(client_url);
        }

        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cors_layer(&self) -> CorsLayer {
        let origin = match self
            .client_url
            .as_deref()
            .and_then(|url| HeaderValue::from_str(url).ok())
        {
            Some(origin) => AllowOrigin::exact(origin),
            None => AllowOrigin::any(),
        };

        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_origin(origin)
    }
}
