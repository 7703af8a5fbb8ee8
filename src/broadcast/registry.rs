use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Broadcaster, SeatStateEvent};
use crate::models::{SeatChange, SeatId, ShowingId, UserId};

pub type ViewerId = Uuid;

/// То, что получает транспорт при подключении зрителя.
/// Канал закрывается, когда зрителя сняли с учёта (в том числе за медлительность).
#[derive(Debug)]
pub struct ViewerSubscription {
    pub viewer_id: ViewerId,
    pub showing_id: ShowingId,
    pub receiver: mpsc::Receiver<SeatStateEvent>,
}

struct Viewer {
    user_id: Option<UserId>,
    sender: mpsc::Sender<SeatStateEvent>,
    /// Последняя доставленная версия по каждому месту.
    delivered: HashMap<SeatId, u64>,
    connected_at: DateTime<Utc>,
}

impl Viewer {
    /// `false`, если зрителя надо отключить.
    fn offer(&mut self, change: &SeatChange) -> bool {
        if let Some(&last) = self.delivered.get(&change.seat_id) {
            if change.version <= last {
                return true;
            }
        }

        let event = SeatStateEvent {
            showing_id: change.showing_id,
            seat_id: change.seat_id,
            state: change.claim.state_for(self.user_id),
        };
        match self.sender.try_send(event) {
            Ok(()) => {
                self.delivered.insert(change.seat_id, change.version);
                true
            }
            Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Реестр зрителей по сеансам внутри одного процесса.
///
/// Каждому зрителю положена ограниченная очередь. Фильтр версий и постановка
/// в очередь выполняются под одной блокировкой реестра, поэтому более старое
/// событие по месту никогда не обгонит более новое.
pub struct ViewerRegistry {
    showings: RwLock<HashMap<ShowingId, HashMap<ViewerId, Viewer>>>,
    buffer: usize,
}

impl ViewerRegistry {
    pub fn new(buffer: usize) -> Self {
        Self {
            showings: RwLock::new(HashMap::new()),
            buffer: buffer.max(1),
        }
    }

    pub fn register(&self, showing_id: ShowingId, user_id: Option<UserId>) -> ViewerSubscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let viewer_id = Uuid::new_v4();
        let viewer = Viewer {
            user_id,
            sender,
            delivered: HashMap::new(),
            connected_at: Utc::now(),
        };

        self.showings
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(showing_id)
            .or_default()
            .insert(viewer_id, viewer);

        debug!(%showing_id, %viewer_id, "viewer registered");
        ViewerSubscription { viewer_id, showing_id, receiver }
    }

    pub fn unregister(&self, showing_id: ShowingId, viewer_id: ViewerId) {
        let mut showings = self.showings.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(viewers) = showings.get_mut(&showing_id) {
            if let Some(viewer) = viewers.remove(&viewer_id) {
                let watched = Utc::now() - viewer.connected_at;
                debug!(%showing_id, %viewer_id, seconds = watched.num_seconds(), "viewer unregistered");
            }
            if viewers.is_empty() {
                showings.remove(&showing_id);
            }
        }
    }

    pub fn viewer_count(&self, showing_id: ShowingId) -> usize {
        self.showings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&showing_id)
            .map_or(0, HashMap::len)
    }

    pub fn showing_count(&self) -> usize {
        self.showings.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Раздаёт изменения локальным зрителям. Зрители с переполненной или
    /// закрытой очередью снимаются с учёта.
    pub fn deliver(&self, changes: &[SeatChange]) {
        if changes.is_empty() {
            return;
        }

        let mut showings = self.showings.write().unwrap_or_else(PoisonError::into_inner);
        for change in changes {
            let Some(viewers) = showings.get_mut(&change.showing_id) else {
                continue;
            };

            let mut evicted = Vec::new();
            for (viewer_id, viewer) in viewers.iter_mut() {
                if !viewer.offer(change) {
                    evicted.push(*viewer_id);
                }
            }
            for viewer_id in evicted {
                viewers.remove(&viewer_id);
                warn!(showing_id = %change.showing_id, %viewer_id, "viewer dropped: queue full or closed");
            }
            if viewers.is_empty() {
                showings.remove(&change.showing_id);
            }
        }
    }

    /// Закрывает все подписки, транспорт увидит конец канала.
    pub fn shutdown_all(&self) {
        let mut showings = self.showings.write().unwrap_or_else(PoisonError::into_inner);
        let count: usize = showings.values().map(HashMap::len).sum();
        showings.clear();
        info!(count, "all viewers disconnected");
    }
}

impl Broadcaster for ViewerRegistry {
    fn publish(&self, changes: &[SeatChange]) {
        self.deliver(changes);
    }
}
