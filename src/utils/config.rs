use serde::{Deserialize, Serialize};
use std::{env, fmt, str::FromStr};

/// Application configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// JWT configuration
    pub jwt: JwtConfig,
    /// File upload configuration
    pub upload: UploadConfig,
    /// Third-party integrations
    pub services: ServicesConfig,
    /// Google sign-in
    pub oauth: OAuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub base_url: String,
    pub frontend_url: String,
    pub environment: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Base URL of the PostgREST service (without `/rest/v1`)
    pub url: String,
    pub service_key: String,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_minutes: i64,
    pub refresh_token_days: i64,
    pub issuer: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    pub max_file_size: u64,
    pub max_image_size: u64,
    pub local_dir: String,
    /// Container SAS URL; when set, uploads go to Azure Blob Storage
    pub azure_container_sas_url: Option<String>,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ServicesConfig {
    pub sendgrid_api_key: Option<String>,
    pub from_email: String,
    pub infobip_base_url: Option<String>,
    pub infobip_api_key: Option<String>,
    pub sms_sender: String,
    pub azure_vision_endpoint: Option<String>,
    pub azure_vision_key: Option<String>,
    pub azure_openai_endpoint: Option<String>,
    pub azure_openai_key: Option<String>,
    pub azure_openai_deployment: String,
    pub iot_hub_host: Option<String>,
    pub iot_hub_sas_token: Option<String>,
    pub iot_webhook_secret: Option<String>,
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct OAuthConfig {
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub google_redirect_url: String,
}

impl OAuthConfig {
    pub fn google_enabled(&self) -> bool {
        self.google_client_id.is_some() && self.google_client_secret.is_some()
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());
        let base_url = env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8000".to_string());

        let secret = match env::var("SECRET_KEY").or_else(|_| env::var("JWT_SECRET")) {
            Ok(secret) => secret,
            Err(_) if environment == "production" => {
                anyhow::bail!("SECRET_KEY is required in production")
            }
            Err(_) => {
                tracing::warn!("SECRET_KEY not set, generating an ephemeral signing key");
                use rand::Rng;
                let mut rng = rand::thread_rng();
                (0..32).map(|_| rng.gen::<u8>()).map(|b| format!("{:02x}", b)).collect()
            }
        };

        let config = Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .map_err(|_| anyhow::anyhow!("Invalid PORT value"))?,
                cors_origins: env::var("CORS_ORIGINS")
                    .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
                base_url: base_url.clone(),
                environment,
            },
            database: DatabaseConfig {
                url: env::var("POSTGREST_URL")
                    .map_err(|_| anyhow::anyhow!("POSTGREST_URL is required"))?,
                service_key: env::var("POSTGREST_SERVICE_KEY")
                    .map_err(|_| anyhow::anyhow!("POSTGREST_SERVICE_KEY is required"))?,
            },
            jwt: JwtConfig {
                secret,
                access_token_minutes: parse_or("ACCESS_TOKEN_EXPIRE_MINUTES", 30),
                refresh_token_days: parse_or("REFRESH_TOKEN_EXPIRE_DAYS", 7),
                issuer: "hewal-api".to_string(),
            },
            upload: UploadConfig {
                max_file_size: parse_or("MAX_FILE_SIZE", 10 * 1024 * 1024),
                max_image_size: parse_or("MAX_IMAGE_SIZE", 5 * 1024 * 1024),
                local_dir: env::var("UPLOAD_DIR").unwrap_or_else(|_| "uploads".to_string()),
                azure_container_sas_url: optional("AZURE_STORAGE_CONTAINER_SAS_URL"),
            },
            services: ServicesConfig {
                sendgrid_api_key: optional("SENDGRID_API_KEY"),
                from_email: env::var("FROM_EMAIL")
                    .unwrap_or_else(|_| "noreply@hewal3.com".to_string()),
                infobip_base_url: optional("INFOBIP_BASE_URL"),
                infobip_api_key: optional("INFOBIP_API_KEY"),
                sms_sender: env::var("INFOBIP_SENDER").unwrap_or_else(|_| "HEWAL3".to_string()),
                azure_vision_endpoint: optional("AZURE_AI_VISION_ENDPOINT"),
                azure_vision_key: optional("AZURE_AI_VISION_KEY"),
                azure_openai_endpoint: optional("AZURE_OPENAI_ENDPOINT"),
                azure_openai_key: optional("AZURE_OPENAI_KEY"),
                azure_openai_deployment: env::var("AZURE_OPENAI_DEPLOYMENT")
                    .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
                iot_hub_host: optional("IOT_HUB_HOST"),
                iot_hub_sas_token: optional("IOT_HUB_SAS_TOKEN"),
                iot_webhook_secret: optional("IOT_WEBHOOK_SECRET"),
            },
            oauth: OAuthConfig {
                google_client_id: optional("GOOGLE_CLIENT_ID"),
                google_client_secret: optional("GOOGLE_CLIENT_SECRET"),
                google_redirect_url: env::var("GOOGLE_REDIRECT_URI")
                    .unwrap_or_else(|_| format!("{}/auth/google/callback", base_url)),
            },
        };

        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.server.environment == "production"
    }
}

impl Default for Config {
    /// Local development settings with every integration disabled
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                cors_origins: vec!["http://localhost:3000".to_string()],
                base_url: "http://localhost:8000".to_string(),
                frontend_url: "http://localhost:3000".to_string(),
                environment: "development".to_string(),
            },
            database: DatabaseConfig {
                url: "http://localhost:3001".to_string(),
                service_key: "local-service-key".to_string(),
            },
            jwt: JwtConfig {
                secret: "local-development-secret".to_string(),
                access_token_minutes: 30,
                refresh_token_days: 7,
                issuer: "hewal-api".to_string(),
            },
            upload: UploadConfig {
                max_file_size: 10 * 1024 * 1024,
                max_image_size: 5 * 1024 * 1024,
                local_dir: "uploads".to_string(),
                azure_container_sas_url: None,
            },
            services: ServicesConfig {
                from_email: "noreply@hewal3.com".to_string(),
                sms_sender: "HEWAL3".to_string(),
                azure_openai_deployment: "gpt-4o-mini".to_string(),
                ..ServicesConfig::default()
            },
            oauth: OAuthConfig {
                google_redirect_url: "http://localhost:8000/auth/google/callback".to_string(),
                ..OAuthConfig::default()
            },
        }
    }
}

// Secrets stay out of the startup log line.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("database_url", &self.database.url)
            .field("access_token_minutes", &self.jwt.access_token_minutes)
            .field("upload", &self.upload.local_dir)
            .field("azure_storage", &self.upload.azure_container_sas_url.is_some())
            .field("sendgrid", &self.services.sendgrid_api_key.is_some())
            .field("infobip", &self.services.infobip_api_key.is_some())
            .field("azure_vision", &self.services.azure_vision_key.is_some())
            .field("azure_openai", &self.services.azure_openai_key.is_some())
            .field("iot_hub", &self.services.iot_hub_host.is_some())
            .field("google_oauth", &self.oauth.google_enabled())
            .finish()
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_disables_integrations() {
        let config = Config::default();
        assert!(!config.oauth.google_enabled());
        assert!(config.services.sendgrid_api_key.is_none());
        assert!(config.upload.azure_container_sas_url.is_none());
        assert!(!config.is_production());
    }

    #[test]
    fn debug_output_hides_secrets() {
        let mut config = Config::default();
        config.jwt.secret = "super-secret-value".to_string();
        config.services.sendgrid_api_key = Some("SG.key".to_string());
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret-value"));
        assert!(!rendered.contains("SG.key"));
        assert!(rendered.contains("sendgrid: true"));
    }
}
