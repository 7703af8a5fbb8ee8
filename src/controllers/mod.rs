pub mod bookings;
pub mod live;
pub mod seats;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(seats::routes())
        .merge(bookings::routes())
        .merge(live::routes())
}

/// Полное приложение: служебные маршруты, `/api` и трассировка запросов.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Showtime booking API" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
