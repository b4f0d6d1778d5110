use anyhow::Context;
use axum::{
    Extension, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use uuid::Uuid;

use crate::core::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware,
};
use crate::models::NotificationEntity;
use crate::schema::notifications;

/// Notification feed routes, open to any authenticated user.
pub fn routes() -> Router<AppState> {
    Router::new().nest(
        "/notifications",
        Router::new()
            .route("/", routing::get(get_notifications))
            .route("/{id}/read", routing::patch(mark_as_read))
            .route_layer(axum::middleware::from_fn(middleware::users_authorization)),
    )
}

/// Fetch the authenticated user's notifications, newest first.
async fn get_notifications(
    State(state): State<AppState>,
    Extension(user_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let feed: Vec<NotificationEntity> = notifications::table
        .filter(notifications::user_id.eq(user_id))
        .order_by(notifications::created_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get notifications")?;

    Ok(StdResponse {
        data: Some(feed),
        message: Some("Get notifications successfully"),
    })
}

/// Mark one of the user's own notifications as read.
async fn mark_as_read(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
    Extension(user_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let notification: NotificationEntity = notifications::table
        .find(id)
        .get_result(conn)
        .await
        .map_err(AppError::from)?;

    if notification.user_id != user_id {
        return Err(AppError::Forbidden(
            "Cannot mark another user's notification as read".into(),
        ));
    }

    let updated: NotificationEntity = diesel::update(notifications::table.find(id))
        .set(notifications::is_read.eq(true))
        .returning(NotificationEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to mark notification as read")?;

    Ok(StdResponse {
        data: Some(updated),
        message: Some("Notification marked as read"),
    })
}
