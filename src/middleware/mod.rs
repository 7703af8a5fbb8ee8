use axum::extract::{FromRequest, FromRequestParts, OptionalFromRequestParts};
use axum::http::request::Parts;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::ApiError;
use crate::models::UserId;

/// Тело запроса в JSON. Ошибки разбора отдаются в общем формате ошибок API.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct JsonBody<T>(pub T);

/// Пользователь, проверенный внешним identity-провайдером.
/// Провайдер кладёт UUID в заголовок (по умолчанию `x-user-id`), мы ему доверяем.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: UserId,
}

/// `None` если заголовка нет, ошибка если он есть, но это не UUID.
fn identity(parts: &Parts, state: &crate::AppState) -> Result<Option<AuthUser>, ApiError> {
    let Some(value) = parts.headers.get(state.config.booking.identity_header.as_str()) else {
        return Ok(None);
    };

    let user_id = value
        .to_str()
        .ok()
        .and_then(|raw| Uuid::parse_str(raw.trim()).ok())
        .ok_or(ApiError::Unauthorized)?;

    Ok(Some(AuthUser { user_id }))
}

impl FromRequestParts<Arc<crate::AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Self, Self::Rejection> {
        identity(parts, state)?.ok_or(ApiError::Unauthorized)
    }
}

// Для маршрутов только на чтение: аноним видит все чужие блокировки как locked_by_other
impl OptionalFromRequestParts<Arc<crate::AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<crate::AppState>,
    ) -> Result<Option<Self>, Self::Rejection> {
        identity(parts, state)
    }
}
