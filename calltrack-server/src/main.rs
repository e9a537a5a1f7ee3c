use calltrack_core::CallTrackConfig;
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[arg(short, long, default_value = "calltrack.toml")]
    config: String,

    /// Check database connectivity and exit
    #[arg(long)]
    health: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Load config
    let config = match CallTrackConfig::load(&args.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {}", args.config, e);
            std::process::exit(1);
        }
    };

    // Init logging; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.service.log_level));
    fmt().with_env_filter(filter).init();

    // Connect to DB
    let pool = match calltrack_core::db::create_pool(&config.database).await {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    };

    if args.health {
        match calltrack_core::db::health_check(&pool).await {
            Ok(v) => println!("✅ PostgreSQL connected: {}", v),
            Err(e) => {
                println!("❌ PostgreSQL connection failed: {}", e);
                std::process::exit(1);
            }
        }
        println!("✅ calltrack DB health check passed");
        return Ok(());
    }

    if config.database.run_migrations {
        calltrack_core::db::migrate(&pool).await?;
        tracing::info!("Schema migrations applied");
    }

    let (tx, _rx) = broadcast::channel(1);
    let shutdown_tx = tx.clone();

    tokio::spawn(async move {
        match shutdown_signal().await {
            Ok(name) => tracing::info!("Received {}, shutting down", name),
            Err(e) => {
                tracing::error!("Failed to listen for shutdown signals: {}", e);
                return;
            }
        }
        let _ = shutdown_tx.send(());
    });

    calltrack_server::http::start_http_server(pool.clone(), config, tx.subscribe()).await?;

    pool.close().await;
    tracing::info!("Server exiting");
    Ok(())
}

/// Resolves on SIGINT or, on unix, SIGTERM; yields the signal's name.
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    let terminate = async {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        sigterm.recv().await;
        Ok::<_, std::io::Error>("SIGTERM")
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<std::io::Result<&'static str>>();

    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|_| "SIGINT"),
        res = terminate => res,
    }
}
