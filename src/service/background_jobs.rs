// service/background_jobs.rs
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Duration};

use crate::{db::Store, service::error::ServiceError, AppState};

/// Flags every live ticket whose response or resolution deadline has passed.
pub async fn run_sla_breach_scan(store: &Arc<dyn Store>) -> Result<u64, ServiceError> {
    Ok(store.mark_sla_breaches(Utc::now()).await?)
}

/// Periodic SLA breach sweep. Does nothing when SLA tracking is switched off.
pub async fn start_sla_breach_job(app_state: Arc<AppState>) {
    let settings = &app_state.env.sla;
    if !settings.enabled {
        tracing::info!("SLA tracking disabled, breach sweep not started");
        return;
    }

    let mut interval = interval(Duration::from_secs(settings.breach_scan_secs.max(1)));

    loop {
        interval.tick().await;

        tracing::debug!("Running SLA breach sweep at {}", Utc::now());

        match run_sla_breach_scan(&app_state.store).await {
            Ok(0) => {}
            Ok(flagged) => tracing::info!("SLA breach sweep flagged {} tickets", flagged),
            Err(e) => tracing::error!("SLA breach sweep failed: {}", e),
        }
    }
}
