//! webreader server entry point.

use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use webreader::{
    auth::{AuthService, TokenKeys},
    config::{Cli, Command, Config, UserCommand},
    db::{self, Database},
    error, server,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Find or load config
    let config_path = cli.config.clone().or_else(Config::find_config_file);

    let config = if let Some(ref path) = config_path {
        Config::load(path)?
    } else {
        Config::default()
    };

    match cli.command {
        Some(Command::Init { force }) => cmd_init(force),
        Some(Command::User { action }) => cmd_user(action, &config),
        Some(Command::Serve { bind, jwt_secret }) => cmd_serve(config, bind, jwt_secret).await,
        None => cmd_serve(config, None, None).await,
    }
}

/// Write a default config and create the database and upload tree.
fn cmd_init(force: bool) -> anyhow::Result<()> {
    let config_path = PathBuf::from("config.toml");

    if config_path.exists() && !force {
        anyhow::bail!(
            "Config file already exists: {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    std::fs::write(&config_path, Config::generate_default())?;
    println!("Created config file: {}", config_path.display());

    let config = Config::default();
    let _db = Database::open(&config.database.path)?;
    println!("Initialized database: {}", config.database.path.display());

    webreader::uploads::UploadStore::new(&config.uploads).ensure_dirs()?;
    println!("Created upload directory: {}", config.uploads.dir.display());

    println!("\nSet auth.jwt_secret in config.toml before running in production.");
    println!("Then run: webreader serve");

    Ok(())
}

/// Account administration.
fn cmd_user(action: UserCommand, config: &Config) -> anyhow::Result<()> {
    let db = Database::open(&config.database.path)?;
    let auth = AuthService::new(
        db,
        TokenKeys::new(&config.auth.jwt_secret, config.auth.token_days),
        config.auth.registration_enabled(),
    );

    match action {
        UserCommand::List => {
            let users = auth.list_users()?;
            if users.is_empty() {
                println!("No users found.");
            } else {
                println!("{:<8} {:<40} {:<8} LAST LOGIN", "ID", "EMAIL", "ACTIVE");
                println!("{}", "-".repeat(80));
                for user in users {
                    let last_login = user
                        .last_login
                        .map(|ts| {
                            db::timestamp_to_datetime(ts)
                                .format("%Y-%m-%d %H:%M")
                                .to_string()
                        })
                        .unwrap_or_else(|| "never".to_string());
                    println!(
                        "{:<8} {:<40} {:<8} {}",
                        user.id,
                        user.email,
                        if user.is_active { "yes" } else { "no" },
                        last_login
                    );
                }
            }
        }

        UserCommand::Activate { email } => {
            if auth.set_active(&email, true)? {
                println!("Activated user: {}", email);
            } else {
                println!("User not found: {}", email);
            }
        }

        UserCommand::Deactivate { email } => {
            if auth.set_active(&email, false)? {
                println!("Deactivated user: {}", email);
            } else {
                println!("User not found: {}", email);
            }
        }
    }

    Ok(())
}

/// Start the server.
async fn cmd_serve(
    mut config: Config,
    bind: Option<std::net::SocketAddr>,
    jwt_secret: Option<String>,
) -> anyhow::Result<()> {
    if let Some(addr) = bind {
        config.server.bind = addr;
    }
    if let Some(secret) = jwt_secret {
        config.auth.jwt_secret = secret;
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webreader=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    config.validate()?;
    error::expose_internal_details(config.server.is_development());

    let db = Database::open(&config.database.path)?;

    tracing::info!(
        bind = %config.server.bind,
        database = %config.database.path.display(),
        uploads = %config.uploads.dir.display(),
        environment = %config.server.environment,
        "Starting webreader server"
    );

    let bind = config.server.bind;
    let state = server::AppState::new(config, db)?;
    let app = server::create_router(state);

    let listener = TcpListener::bind(bind).await?;
    tracing::info!(address = %bind, "Server listening");

    axum::serve(listener, app).await?;

    Ok(())
}
