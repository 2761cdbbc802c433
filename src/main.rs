mod cli;

use vitrine::{
    carousel::CarouselAllocator,
    config,
    photos::{start_sweep_task, CommitCoordinator, IngestPipeline, OrphanSweeper, RenditionStore},
    server,
};
use vitrine_db::pool::init_pool;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Commands};
use std::sync::Arc;

async fn serve(host: String, port: u16, config_path: Option<&std::path::Path>) -> Result<()> {
    let mut config = config::load_config_or_default(config_path)?;

    // Override host/port from CLI if specified
    config.server.host = host;
    config.server.port = port;

    tracing::info!("Starting vitrine server");
    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    std::fs::create_dir_all(&config.storage.data_dir)?;
    std::fs::create_dir_all(&config.storage.images_dir)?;

    let db_path = config.storage.data_dir.join("vitrine.db");
    let db_path_str = db_path.to_string_lossy();
    tracing::info!("Initializing database at {}", db_path_str);
    let db_pool = init_pool(&db_path_str)?;

    let store = Arc::new(RenditionStore::new(config.storage.images_dir.clone()));
    let ingest = Arc::new(IngestPipeline::new(
        store.clone(),
        db_pool.clone(),
        config.uploads.max_upload_bytes,
    ));
    let commits = Arc::new(CommitCoordinator::new(db_pool.clone()));
    let carousel = Arc::new(CarouselAllocator::new(db_pool.clone()));

    let sweeper = Arc::new(OrphanSweeper::new(
        db_pool.clone(),
        store.clone(),
        config.sweep.orphan_ttl_secs as i64,
    ));
    let sweep_handle = start_sweep_task(sweeper, config.sweep.interval_secs);

    let ctx = server::AppContext {
        config: Arc::new(config),
        db_pool,
        store,
        ingest,
        commits,
        carousel,
    };

    let server_result = server::start_server(ctx).await;

    tracing::info!("Shutting down...");
    sweep_handle.abort();

    server_result
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "vitrine=trace,vitrine_db=debug,vitrine_common=debug,tower_http=debug".to_string()
        } else {
            "vitrine=debug,vitrine_db=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .init();

    match cli.command {
        Commands::Serve { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(serve(host, port, cli.config.as_deref()))
        }
        Commands::Sweep { ttl_secs } => sweep_once(cli.config.as_deref(), ttl_secs),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("vitrine {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

fn sweep_once(config_path: Option<&std::path::Path>, ttl_secs: Option<u64>) -> Result<()> {
    let config = config::load_config_or_default(config_path)?;

    let db_path = config.storage.data_dir.join("vitrine.db");
    if !db_path.exists() {
        anyhow::bail!("Database does not exist: {:?}", db_path);
    }
    let db_pool = init_pool(&db_path.to_string_lossy())?;

    let store = Arc::new(RenditionStore::new(config.storage.images_dir.clone()));
    let ttl = ttl_secs.unwrap_or(config.sweep.orphan_ttl_secs);
    let sweeper = OrphanSweeper::new(db_pool, store, ttl as i64);

    let removed = sweeper.sweep_once()?;
    println!("Swept {} orphaned upload(s)", removed);

    Ok(())
}

fn validate_config(path: Option<&std::path::Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Data dir: {:?}", config.storage.data_dir);
            println!("  Images dir: {:?}", config.storage.images_dir);
            println!("  Max upload: {} bytes", config.uploads.max_upload_bytes);
            println!(
                "  Sweep: TTL {}s, every {}s",
                config.sweep.orphan_ttl_secs, config.sweep.interval_secs
            );
        }
        None => {
            println!("No config file specified, using defaults");
            let config = config::Config::default();
            println!("Default config:");
            println!("  Server: {}:{}", config.server.host, config.server.port);
            println!("  Data dir: {:?}", config.storage.data_dir);
        }
    }

    Ok(())
}
