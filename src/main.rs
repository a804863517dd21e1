use std::sync::Arc;

use efactura_sync::config::{SyncConfig, validate_schedule};
use efactura_sync::connector::AnafClient;
use efactura_sync::efactura::InvoiceMaterializer;
use efactura_sync::efactura::ticker::{run_sync, spawn_sync_ticker};
use efactura_sync::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let run_once = std::env::args().skip(1).any(|a| a == "--once");

    let config = SyncConfig::from_env()?;

    eprintln!("e-Factura sync v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   ANAF: {} ({:?})", config.base_url, config.environment);
    eprintln!("   Database: {}", config.db_path);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> =
        Arc::new(LibSqlBackend::new_local(std::path::Path::new(&config.db_path)).await?);

    // ── Connector ────────────────────────────────────────────────────────
    let connector = Arc::new(AnafClient::from_config(&config)?);
    let materializer = Arc::new(InvoiceMaterializer::new(db, connector));

    if run_once {
        eprintln!("   Mode: single pass\n");
        let created = run_sync(&materializer).await;
        tracing::info!(created = created, "Single e-Factura sync pass complete");
        return Ok(());
    }

    let schedule = validate_schedule(&config.schedule)?;
    eprintln!("   Schedule: {}\n", config.schedule);

    let (handle, shutdown) = spawn_sync_ticker(materializer, schedule);
    let abort = handle.abort_handle();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupt received, stopping");
            shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
            abort.abort();
        }
        res = handle => {
            res?;
        }
    }

    Ok(())
}
