use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub amqp: AmqpConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct AmqpConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Load the service configuration from the environment.
pub fn load() -> Result<Config> {
    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    let amqp_url = std::env::var("AMQP_URL").context("AMQP_URL is not set")?;
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "8090".to_string())
        .parse::<u16>()
        .context("PORT must be a valid port number")?;

    Ok(Config {
        database: DatabaseConfig { url: database_url },
        amqp: AmqpConfig { url: amqp_url },
        server: ServerConfig { host, port },
    })
}
