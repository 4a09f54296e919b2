use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use burrow::config::Config;
use burrow::db::Database;
use burrow::digest::{run_daily, run_once, Digest};
use burrow::mailer::Mailer;
use burrow::routes::{self, AppState, Preview};
use burrow::sources::http_client;

#[derive(Parser)]
#[command(name = "burrow")]
#[command(about = "Daily digest of weather, highlights, news and posts, delivered by email")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "burrow.toml")]
    config: PathBuf,

    /// Run once immediately and exit
    #[arg(long)]
    once: bool,

    /// Render the digest and serve a browser preview instead of sending email
    #[arg(long, conflicts_with = "once")]
    test: bool,

    /// Port for the preview server
    #[arg(short, long, default_value = "3000")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "burrow=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    // Load configuration
    let config = Config::load(&args.config)?;
    config.validate()?;
    info!(
        "Loaded {} sources from {}",
        config.sources.len(),
        args.config.display()
    );

    // Initialize database
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| config.database_url.clone());
    let db = Database::new(&database_url)
        .await
        .with_context(|| format!("opening ledger at {}", database_url))?;
    db.initialize().await?;
    let db = Arc::new(db);
    info!("Database initialized");

    let client = http_client()?;
    let digest = Arc::new(Digest::from_config(&config, &client));
    info!(sources = ?digest.source_names(), "Sources registered");

    if args.test {
        let edition = db.next_edition().await?;
        info!(edition, "Test mode: rendering digest for preview");
        let (_, email) = digest.compose(edition).await?;

        let state = Arc::new(AppState {
            db: db.clone(),
            preview: Preview { edition, email },
        });
        let app = routes::router(state);

        let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
        info!("Preview available on http://localhost:{}", args.port);
        axum::serve(listener, app).await?;
        return Ok(());
    }

    let mailer = Arc::new(Mailer::new(client, &config.email));

    if args.once {
        let edition = run_once(&digest, &mailer, &db).await?;
        info!(edition, "Digest sent, exiting");
        return Ok(());
    }

    let send_at = config.send_time()?;
    info!("Scheduling daily digest at {}", send_at.format("%H:%M"));
    tokio::select! {
        _ = run_daily(digest, mailer, db, send_at) => {}
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down");
        }
    }

    Ok(())
}
