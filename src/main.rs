use shardis::cluster::ClusterServer;
use shardis::config::Config;
use shardis::persistence::aof::{self, AofWriter};
use shardis::server;
use shardis::store::DataStore;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Parse command line args
    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = Config::from_args(&args)?;

    let default_level = config
        .loglevel
        .parse::<tracing::Level>()
        .unwrap_or(tracing::Level::INFO);
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .init();

    let store = Arc::new(DataStore::new(config.databases));

    // Replay must finish before the listener starts accepting.
    if config.appendonly {
        info!("replaying AOF from {}", config.appendfilename);
        match aof::replay(&config.appendfilename, &store).await {
            Ok(count) => info!("AOF replayed {count} commands"),
            Err(e) => warn!("failed to replay AOF: {e}"),
        }
        match AofWriter::open(&config.appendfilename).await {
            Ok(writer) => store.attach_aof(writer),
            Err(e) => warn!("failed to open AOF: {e}"),
        }
    }

    let result = match &config.self_addr {
        Some(self_addr) if config.is_cluster() => {
            let cluster = Arc::new(ClusterServer::new(
                self_addr.clone(),
                &config.peers,
                store.clone(),
            ));
            server::run_server(&config, cluster).await
        }
        _ => server::run_server(&config, store.clone()).await,
    };

    if let Some(writer) = store.aof() {
        writer.wait_closed().await;
    }
    result
}
