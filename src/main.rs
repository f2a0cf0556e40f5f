use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use contentbot::cms::CmsClient;
use contentbot::genai::{GeminiClient, HttpPageFetcher};
use contentbot::http::{create_router, AppState};
use contentbot::store::SqliteBatchStore;
use contentbot::{config, db, outbox};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/contentbot.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    // Spawn the publish worker (single-threaded)
    let cms = CmsClient::new(
        &cfg.cms.base_url,
        cfg.cms.token.clone(),
        cfg.cms.dataset.clone(),
    )?;
    let worker_pool = pool.clone();
    let site_base_url = cfg.site.base_url.clone();
    let poll_sleep = Duration::from_millis(cfg.app.poll_interval_ms);
    let max_backoff = cfg.app.max_backoff_seconds as i64;
    tokio::spawn(async move {
        loop {
            match outbox::process_next_task(&worker_pool, &cms, &site_base_url, max_backoff).await
            {
                Ok(processed) => {
                    if !processed {
                        tokio::time::sleep(poll_sleep).await;
                    }
                }
                Err(err) => {
                    error!(?err, "outbox worker error");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    let state = AppState {
        pool: pool.clone(),
        store: Arc::new(SqliteBatchStore::new(pool.clone())),
        generator: Arc::new(GeminiClient::new(
            cfg.gemini.api_key.clone(),
            cfg.gemini.model.clone(),
            cfg.gemini.temperature,
        )),
        fetcher: Arc::new(HttpPageFetcher::default()),
        blog: cfg.blog.clone(),
    };

    let listener = tokio::net::TcpListener::bind(&cfg.app.bind_addr).await?;
    info!(addr = %cfg.app.bind_addr, "starting admin API server");
    axum::serve(listener, create_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
