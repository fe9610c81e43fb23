use clap::{Parser, Subcommand};

use crate::config::Config;

#[derive(Parser)]
#[command(name = "treasury-core")]
#[command(about = "Treasury Core - payment and wallet transaction safety service", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Serve the payment and wallet API (the default)
    Serve,

    /// Schema maintenance
    #[command(subcommand)]
    Db(DbCommands),

    /// Print the validated configuration
    Config,
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Apply pending migrations to DATABASE_URL
    Migrate,
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL must be set to run migrations"))?;

    let pool = crate::db::create_pool(database_url).await?;
    tracing::info!("Applying treasury schema migrations");
    crate::db::run_migrations(&pool).await?;

    println!("Migrations applied");
    Ok(())
}

pub fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!(
        "  Database URL: {}",
        config
            .database_url
            .as_deref()
            .map(mask_password)
            .unwrap_or_else(|| "(in-memory)".to_string())
    );
    println!(
        "  Redis URL: {}",
        config
            .redis_url
            .as_deref()
            .map(mask_password)
            .unwrap_or_else(|| "(in-memory)".to_string())
    );
    println!(
        "  Idempotency: ttl {}s, {:?}",
        config.idempotency_ttl.as_secs(),
        config.idempotency_failure_policy
    );
    println!(
        "  Rate Limit: {} per {}ms, {:?}",
        config.rate_limit.max_requests,
        config.rate_limit.window.as_millis(),
        config.rate_limit_failure_policy
    );
    println!(
        "  Allowed Assets: {} (refresh {})",
        config.allowed_assets.join(", "),
        config
            .assets_refresh
            .map(|every| format!("every {}s", every.as_secs()))
            .unwrap_or_else(|| "off".to_string())
    );
    println!("  Trusted Proxy Depth: {}", config.trusted_proxy_depth);
    println!(
        "  Processor: {} (timeout {}ms, api key {})",
        config
            .processor
            .base_url
            .as_ref()
            .map(|url| url.to_string())
            .unwrap_or_else(|| "(disabled)".to_string()),
        config.processor.timeout.as_millis(),
        if config.processor.api_key.is_some() { "set" } else { "unset" }
    );

    println!("Configuration OK");
    Ok(())
}

/// Hides the password component of a connection URL. Unparseable values are
/// not echoed back, since they may still contain credentials.
fn mask_password(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            if parsed.password().is_some() && parsed.set_password(Some("****")).is_err() {
                return "(redacted)".to_string();
            }
            parsed.to_string()
        }
        Err(_) => "(redacted)".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_password_in_url() {
        assert_eq!(
            mask_password("postgres://treasury:hunter2@db:5432/treasury"),
            "postgres://treasury:****@db:5432/treasury"
        );
        assert_eq!(mask_password("redis://localhost:6379"), "redis://localhost:6379");
        assert_eq!(mask_password("not a url"), "(redacted)");
    }
}
