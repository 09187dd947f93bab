use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Secret used when none is configured. Rejected in production.
pub const DEV_JWT_SECRET: &str = "webreader-development-secret";

/// Digital library server with PDF reading progress.
#[derive(Parser, Debug, Clone)]
#[command(name = "webreader")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file.
    #[arg(short, long, env = "WEBREADER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the server (default if no command given).
    Serve {
        /// Address to bind the server to.
        #[arg(short, long)]
        bind: Option<SocketAddr>,

        /// Secret used to sign bearer tokens.
        #[arg(long, env = "WEBREADER_JWT_SECRET", hide_env_values = true)]
        jwt_secret: Option<String>,
    },

    /// User management commands.
    User {
        /// User subcommand action.
        #[command(subcommand)]
        action: UserCommand,
    },

    /// Initialize database and create default config.
    Init {
        /// Force overwrite existing config.
        #[arg(short, long)]
        force: bool,
    },
}

/// User management subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum UserCommand {
    /// List all users.
    List,

    /// Re-enable a deactivated account.
    Activate {
        /// Account email.
        email: String,
    },

    /// Deactivate an account (it is kept, but can no longer log in).
    Deactivate {
        /// Account email.
        email: String,
    },
}

/// Main configuration from TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Authentication configuration.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Upload storage configuration.
    #[serde(default)]
    pub uploads: UploadsConfig,

    /// Catalog listing configuration.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_bind")]
    pub bind: SocketAddr,

    /// "development" or "production".
    #[serde(default = "default_environment")]
    pub environment: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            environment: default_environment(),
        }
    }
}

impl ServerConfig {
    /// Development mode exposes internal error details.
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::new(
        std::net::IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0)),
        5000,
    )
}

fn default_environment() -> String {
    "production".to_string()
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/webreader.db")
}

/// Authentication configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret for bearer tokens.
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    /// Token lifetime in days.
    #[serde(default = "default_token_days")]
    pub token_days: u32,

    /// Registration mode: "open", "disabled".
    #[serde(default = "default_registration")]
    pub registration: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            token_days: default_token_days(),
            registration: default_registration(),
        }
    }
}

fn default_jwt_secret() -> String {
    DEV_JWT_SECRET.to_string()
}

fn default_token_days() -> u32 {
    7
}

fn default_registration() -> String {
    "open".to_string()
}

impl AuthConfig {
    /// Check if registration is enabled.
    pub fn registration_enabled(&self) -> bool {
        self.registration == "open"
    }
}

/// Upload storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadsConfig {
    /// Root directory; `covers/` and `pdfs/` live under it.
    #[serde(default = "default_uploads_dir")]
    pub dir: PathBuf,

    /// Maximum PDF size in bytes.
    #[serde(default = "default_max_pdf_bytes")]
    pub max_pdf_bytes: u64,

    /// Maximum cover image size in bytes.
    #[serde(default = "default_max_cover_bytes")]
    pub max_cover_bytes: u64,
}

impl Default for UploadsConfig {
    fn default() -> Self {
        Self {
            dir: default_uploads_dir(),
            max_pdf_bytes: default_max_pdf_bytes(),
            max_cover_bytes: default_max_cover_bytes(),
        }
    }
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_pdf_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_max_cover_bytes() -> u64 {
    5 * 1024 * 1024
}

impl UploadsConfig {
    /// Upper bound for a whole multipart book upload.
    pub fn max_request_bytes(&self) -> usize {
        // Room for the text fields and multipart framing.
        let total = self.max_pdf_bytes + self.max_cover_bytes + 1024 * 1024;
        usize::try_from(total).unwrap_or(usize::MAX)
    }
}

/// Catalog listing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Page size when the request gives none (or a malformed one).
    #[serde(default = "default_limit")]
    pub default_limit: u32,

    /// Largest page size a client may ask for.
    #[serde(default = "default_max_limit")]
    pub max_limit: u32,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            default_limit: default_limit(),
            max_limit: default_max_limit(),
        }
    }
}

fn default_limit() -> u32 {
    12
}

fn default_max_limit() -> u32 {
    100
}

impl Config {
    /// Load configuration from file.
    pub fn load(path: &PathBuf) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        toml::from_str(&content).map_err(|e| {
            crate::error::AppError::Config(format!("Failed to parse config file: {}", e))
        })
    }

    /// Find config file in default locations.
    pub fn find_config_file() -> Option<PathBuf> {
        let candidates = [
            PathBuf::from("config.toml"),
            PathBuf::from("webreader.toml"),
            dirs::config_dir()
                .map(|p| p.join("webreader").join("config.toml"))
                .unwrap_or_default(),
            PathBuf::from("/etc/webreader/config.toml"),
        ];

        candidates.into_iter().find(|p| p.exists())
    }

    /// Reject settings that must not reach a production server.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.auth.jwt_secret.is_empty() {
            return Err(crate::error::AppError::Config(
                "auth.jwt_secret must not be empty".to_string(),
            ));
        }

        if !self.server.is_development() && self.auth.jwt_secret == DEV_JWT_SECRET {
            return Err(crate::error::AppError::Config(
                "auth.jwt_secret must be set in production (or use --jwt-secret)".to_string(),
            ));
        }

        if self.catalog.default_limit == 0 || self.catalog.max_limit < self.catalog.default_limit
        {
            return Err(crate::error::AppError::Config(
                "catalog.default_limit must be between 1 and catalog.max_limit".to_string(),
            ));
        }

        Ok(())
    }

    /// Generate default config file content.
    pub fn generate_default() -> String {
        r#"# webreader configuration

[server]
bind = "0.0.0.0:5000"
# "development" shows internal error details in responses
environment = "production"

[database]
# path = "/var/lib/webreader/webreader.db"

[auth]
# Required in production (or pass --jwt-secret / WEBREADER_JWT_SECRET)
# jwt_secret = "change-me"
# Token lifetime in days
token_days = 7
# Registration mode: "open" or "disabled"
registration = "open"

[uploads]
# dir = "/var/lib/webreader/uploads"
max_pdf_bytes = 52428800
max_cover_bytes = 5242880

[catalog]
default_limit = 12
max_limit = 100
"#
        .to_string()
    }
}
