use distmem::config::server::ServerConfig;
use distmem::memory::store::BlockStore;
use distmem::server::listener::Listener;

use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let config = match ServerConfig::from_args(&args)
        .and_then(|config| config.with_env(|key| std::env::var(key).ok()))
    {
        Ok(config) => config,
        Err(e) => {
            let program = args.first().map(String::as_str).unwrap_or("distmem-server");
            eprintln!("{}", e);
            eprintln!("Usage: {} <port> <first_block_id> <last_block_id>", program);
            eprintln!("Example: {} 5000 0 255", program);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    // 1. Block store:
    let store = Arc::new(BlockStore::new(
        config.first_id,
        config.last_id,
        config.block_size,
    )?);

    // 2. Listener:
    let listener = match Listener::bind(config.bind_addr(), store).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("{}", e);
            return Err(e);
        }
    };
    tracing::info!("Block server listening on {}", listener.local_addr()?);

    // 3. Spawn stats reporter:
    if let Some(period) = config.stats_interval {
        let stats = listener.stats();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // The first tick completes immediately.
            interval.tick().await;

            loop {
                interval.tick().await;
                match serde_json::to_string(&stats.snapshot()) {
                    Ok(json) => tracing::info!("Server stats: {}", json),
                    Err(e) => tracing::warn!("Failed to serialise server stats: {}", e),
                }
            }
        });
    }

    tracing::info!("Press Ctrl+C to shutdown");

    // 4. Serve until the accept loop fails or we are interrupted:
    tokio::select! {
        result = listener.run() => {
            if let Err(e) = result {
                tracing::error!("{}", e);
                return Err(e);
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            tracing::info!("Shutting down");
        }
    }

    Ok(())
}
