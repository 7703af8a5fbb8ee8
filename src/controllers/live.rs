use axum::{
    body::Bytes,
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::broadcast::ViewerSubscription;
use crate::error::{ApiResult, BookingError};
use crate::middleware::AuthUser;
use crate::models::{ShowingId, UserId};
use crate::AppState;

const PING_INTERVAL: Duration = Duration::from_secs(30);

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/showings/{showing_id}/live", get(live_seat_updates))
}

// GET /api/showings/{showing_id}/live
// После подключения клиент должен перечитать схему зала: пропущенные события не повторяются.
async fn live_seat_updates(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Path(showing_id): Path<ShowingId>,
    user: Option<AuthUser>,
) -> ApiResult<impl IntoResponse> {
    if state.catalog.showing(showing_id).await.map_err(BookingError::from)?.is_none() {
        return Err(BookingError::NotFound { entity: "showing", id: showing_id }.into());
    }

    let user_id = user.map(|u| u.user_id);
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, showing_id, user_id)))
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    showing_id: ShowingId,
    user_id: Option<UserId>,
) {
    let ViewerSubscription { viewer_id, mut receiver, .. } =
        state.viewers.register(showing_id, user_id);
    info!(%showing_id, %viewer_id, "live viewer connected");

    let (mut sink, mut stream) = socket.split();

    // Отправка: события зрителя и пинги. Закрытый канал значит, что зрителя сняли с учёта.
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(PING_INTERVAL);
        heartbeat.tick().await;
        loop {
            tokio::select! {
                event = receiver.recv() => {
                    let Some(event) = event else {
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    };
                    let payload = match serde_json::to_string(&event) {
                        Ok(payload) => payload,
                        Err(e) => {
                            warn!(error = %e, "failed to encode seat event");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Приём: клиенту нечего присылать, ждём только закрытия.
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "websocket receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    state.viewers.unregister(showing_id, viewer_id);
    info!(%showing_id, %viewer_id, "live viewer disconnected");
}
