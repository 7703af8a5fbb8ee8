use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::AppState;

/// Фоновая уборка истёкших блокировок.
///
/// На корректность не влияет: истёкшая блокировка и так считается
/// отсутствующей. Уборка держит таблицу маленькой и сообщает зрителям,
/// что место снова свободно.
pub struct CleanupService {
    state: Arc<AppState>,
}

impl CleanupService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Один проход. Возвращает число освобождённых мест.
    pub async fn run_full_cleanup(&self) -> usize {
        debug!("🧹 Sweeping expired seat locks");

        match self.state.locks.sweep_expired().await {
            Ok(0) => {
                debug!("🧹 No expired seat locks");
                0
            }
            Ok(count) => {
                info!(count, "🧹 Expired seat locks released");
                count
            }
            Err(e) => {
                error!(error = %e, "🧹 Seat lock sweep failed");
                0
            }
        }
    }

    /// Крутится до отмены задачи.
    pub async fn run_forever(self, every: Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_full_cleanup().await;
        }
    }
}
