use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{Broadcaster, ViewerRegistry};
use crate::models::SeatChange;
use crate::redis_client::RedisClient;

pub const SEAT_CHANGES_CHANNEL: &str = "showtime:seat_changes";
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Рассылка между инстансами через Redis pub/sub.
///
/// `publish` только кладёт изменения в очередь, отправкой занимается фоновая
/// задача. Каждый инстанс (включая отправителя) получает изменения из канала
/// и раздаёт своим зрителям. Если Redis недоступен, изменения доставляются
/// хотя бы локальным зрителям.
pub struct RedisBroadcaster {
    local: Arc<ViewerRegistry>,
    outbound: mpsc::UnboundedSender<Vec<SeatChange>>,
    tasks: Vec<JoinHandle<()>>,
}

impl RedisBroadcaster {
    /// Должен вызываться внутри tokio runtime.
    pub fn spawn(redis: RedisClient, local: Arc<ViewerRegistry>) -> Self {
        let (outbound, inbound) = mpsc::unbounded_channel();

        let publisher = tokio::spawn(run_publisher(redis.conn.clone(), local.clone(), inbound));
        let listener = tokio::spawn(run_listener(redis.client.clone(), local.clone()));

        Self { local, outbound, tasks: vec![publisher, listener] }
    }
}

impl Broadcaster for RedisBroadcaster {
    fn publish(&self, changes: &[SeatChange]) {
        if changes.is_empty() {
            return;
        }
        if self.outbound.send(changes.to_vec()).is_err() {
            warn!("relay publisher is gone, delivering locally");
            self.local.deliver(changes);
        }
    }
}

impl Drop for RedisBroadcaster {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn run_publisher(
    mut conn: MultiplexedConnection,
    local: Arc<ViewerRegistry>,
    mut inbound: mpsc::UnboundedReceiver<Vec<SeatChange>>,
) {
    while let Some(changes) = inbound.recv().await {
        let payload = match serde_json::to_string(&changes) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode seat changes");
                local.deliver(&changes);
                continue;
            }
        };

        let published: redis::RedisResult<i64> = conn.publish(SEAT_CHANGES_CHANNEL, payload).await;
        if let Err(e) = published {
            warn!(error = %e, count = changes.len(), "redis publish failed, delivering locally");
            local.deliver(&changes);
        }
    }
}

async fn run_listener(client: Client, local: Arc<ViewerRegistry>) {
    loop {
        match listen(&client, &local).await {
            Ok(()) => warn!("seat change subscription closed"),
            Err(e) => warn!(error = %e, "seat change subscription failed"),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn listen(client: &Client, local: &ViewerRegistry) -> redis::RedisResult<()> {
    let mut pubsub = client.get_async_pubsub().await?;
    pubsub.subscribe(SEAT_CHANGES_CHANNEL).await?;
    info!(channel = SEAT_CHANGES_CHANNEL, "subscribed to seat changes");

    let mut messages = pubsub.into_on_message();
    while let Some(msg) = messages.next().await {
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "unreadable seat change message");
                continue;
            }
        };
        match serde_json::from_str::<Vec<SeatChange>>(&payload) {
            Ok(changes) => local.deliver(&changes),
            Err(e) => warn!(error = %e, "malformed seat change message"),
        }
    }
    Ok(())
}
