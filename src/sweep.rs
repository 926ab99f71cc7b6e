use std::{sync::Arc, time::Duration};

use time::OffsetDateTime;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::db::{PurgeStats, Store};

/// One cleanup pass over expired reset codes and sessions.
pub async fn sweep_once(store: &dyn Store) -> anyhow::Result<PurgeStats> {
    let stats = store.purge_expired(OffsetDateTime::now_utc()).await?;
    if stats == PurgeStats::default() {
        debug!("sweep found nothing to purge");
    } else {
        info!(codes = stats.codes, sessions = stats.sessions, "sweep purged expired rows");
    }
    Ok(stats)
}

/// Spawns the periodic sweep. The first pass runs immediately.
pub fn spawn_cleanup(store: Arc<dyn Store>, every: Duration) -> tokio::task::JoinHandle<()> {
    let every = if every.is_zero() { Duration::from_secs(1) } else { every };
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_once(store.as_ref()).await {
                error!(error = %e, "cleanup sweep failed");
            }
        }
    })
}
