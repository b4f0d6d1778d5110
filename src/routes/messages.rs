use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing,
};
use diesel::{BoolExpressionMethods, ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::Deserialize;

use crate::core::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware,
};
use crate::models::{CreateMessageEntity, MessageEntity};
use crate::notifier;
use crate::schema::{messages, users};

/// Direct-messaging routes, open to any authenticated user.
pub fn routes() -> Router<AppState> {
    Router::new().nest(
        "/messages",
        Router::new()
            .route("/", routing::post(send_message))
            .route("/{user_id}", routing::get(get_conversation))
            .route_layer(axum::middleware::from_fn(middleware::users_authorization)),
    )
}

#[derive(Deserialize)]
struct SendMessageReq {
    recipient_id: i32,
    content: String,
}

/// Send a message, then notify the recipient and push it to their room.
async fn send_message(
    State(state): State<AppState>,
    Extension(sender_id): Extension<i32>,
    Json(body): Json<SendMessageReq>,
) -> Result<impl IntoResponse, AppError> {
    if body.content.trim().is_empty() {
        return Err(AppError::Validation("Message content is required".into()));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let recipient_exists: i64 = users::table
        .find(body.recipient_id)
        .count()
        .get_result(conn)
        .await
        .context("Failed to look up recipient")?;
    if recipient_exists == 0 {
        return Err(AppError::NotFound);
    }

    let message: MessageEntity = diesel::insert_into(messages::table)
        .values(CreateMessageEntity {
            sender_id,
            recipient_id: body.recipient_id,
            content: body.content,
        })
        .returning(MessageEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create message")?;

    notifier::message_received(conn, &state.realtime, &message).await;

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(message),
            message: Some("Message sent successfully"),
        },
    ))
}

/// Fetch the conversation between the authenticated user and another user,
/// oldest first.
async fn get_conversation(
    Path(other_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let conversation: Vec<MessageEntity> = messages::table
        .filter(
            messages::sender_id
                .eq(user_id)
                .and(messages::recipient_id.eq(other_id))
                .or(messages::sender_id
                    .eq(other_id)
                    .and(messages::recipient_id.eq(user_id))),
        )
        .order_by(messages::created_at.asc())
        .get_results(conn)
        .await
        .context("Failed to get messages")?;

    Ok(StdResponse {
        data: Some(conversation),
        message: Some("Messages retrieved successfully"),
    })
}
