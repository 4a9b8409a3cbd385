use logvault_core::{
    ArchiverConfig, ChainedSecretProvider, DirectorySecretProvider, EnvSecretProvider, Telemetry,
};

use logvault_archiver::pipeline;

const DEFAULT_CONFIG_PATH: &str = "logvault.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (dev convenience — production uses real env vars)
    dotenvy::dotenv().ok();

    // Mounted secrets take precedence over the environment
    let mut secrets = ChainedSecretProvider::new();
    if let Ok(dir) = std::env::var("LOGVAULT_SECRETS_DIR") {
        secrets = secrets.push(DirectorySecretProvider::new(dir));
    }
    let secrets = secrets.push(EnvSecretProvider);

    let config_path =
        std::env::var("LOGVAULT_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    // Load config
    let config = match ArchiverConfig::load(Some(&config_path), &secrets).await {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    // Init logging
    let telemetry = match Telemetry::from_config(&config.service) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Failed to initialize logging: {}", e);
            std::process::exit(1);
        }
    };

    match telemetry.scope(pipeline::run(&config, &telemetry)).await {
        Ok(_) => Ok(()),
        Err(e) => {
            telemetry.in_scope(|| tracing::error!(error = %e, "Archive run failed"));
            std::process::exit(1);
        }
    }
}
