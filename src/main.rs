use std::sync::Arc;

use tracing::{error, info};

use filebin::{
    serve, start_retention_sweeper, Authenticator, Config, CredentialTable, FileServer, FileStore,
    ServerContext, SessionRegistry,
};

#[tokio::main]
async fn main() {
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    if let Err(e) = filebin::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        filebin::logging::init_console_only(&config.logging.level);
    }

    if let Err(e) = run(config).await {
        error!(error = %e, "Server stopped");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> filebin::Result<()> {
    config.validate()?;

    let credentials = CredentialTable::from_entries(&config.users)?;
    info!(users = credentials.len(), "Credentials loaded");

    let store = Arc::new(
        FileStore::new(&config.storage.active_dir, &config.storage.recycle_dir)
            .await?
            .with_transfer_timeout(config.server.transfer_timeout()),
    );

    let authenticator = Authenticator::new(credentials, SessionRegistry::new(), &config.auth);
    let ctx = Arc::new(ServerContext::new(&config, authenticator, Arc::clone(&store)));

    let server = FileServer::bind(&config.server).await?;
    let _sweeper = start_retention_sweeper(store, &config.storage);

    serve(server, ctx).await
}
