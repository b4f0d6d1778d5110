//! Post-commit notification dispatch. Every function here is best-effort:
//! failures are logged and swallowed, never surfaced to the request that
//! triggered them.
//!
//! Dispatch runs in two phases: the `record_*` functions persist the
//! notification rows sequentially on the request's connection and return the
//! real-time pushes still owed, and the `push_all` phase delivers those
//! concurrently. Persisted records are written before their push so they
//! survive a push failure.

use diesel::{OptionalExtension, QueryDsl};
use diesel_async::RunQueryDsl;
use futures::future::join_all;
use tracing::warn;

use crate::core::aliases::DbConn;
use crate::models::{CreateNotificationEntity, MessageEntity, OrderEntity, SubOrderEntity};
use crate::orders::checkout::PlacedSubOrder;
use crate::realtime::{RealtimeEvent, RealtimePublisher};
use crate::schema::{notifications, users};

pub const ORDER_PLACEMENT: &str = "order_placement";
pub const ORDER_STATUS_UPDATE: &str = "order_status_update";
pub const ORDER_CANCELLATION: &str = "order_cancellation";
pub const MESSAGE: &str = "message";

/// Resolve a recipient, returning `None` (and logging) when the user is
/// missing or the lookup fails. A dangling reference must never fail the
/// operation that triggered the notification.
async fn resolve_user(conn: &mut DbConn<'_>, user_id: i32) -> Option<i32> {
    match users::table
        .find(user_id)
        .select(users::id)
        .get_result::<i32>(conn)
        .await
        .optional()
    {
        Ok(Some(id)) => Some(id),
        Ok(None) => {
            warn!(user_id, "Skipping notification for unknown user");
            None
        }
        Err(err) => {
            warn!(user_id, "Failed to resolve notification recipient: {}", err);
            None
        }
    }
}

async fn persist(conn: &mut DbConn<'_>, user_id: i32, notification_type: &str, message: &str) {
    let result = diesel::insert_into(notifications::table)
        .values(CreateNotificationEntity {
            user_id,
            notification_type: notification_type.into(),
            message: message.into(),
        })
        .execute(conn)
        .await;

    if let Err(err) = result {
        warn!(user_id, "Failed to persist notification: {}", err);
    }
}

async fn push_all(realtime: &RealtimePublisher, pushes: Vec<(i32, RealtimeEvent)>) {
    let results = join_all(
        pushes
            .iter()
            .map(|(user_id, event)| realtime.publish(*user_id, event)),
    )
    .await;

    for ((user_id, _), result) in pushes.iter().zip(results) {
        if let Err(err) = result {
            warn!(user_id, "Realtime push failed: {}", err);
        }
    }
}

/// Persist one notification per farmer with a sub-order in a freshly
/// committed checkout and return the pushes owed to them. Sub-orders whose
/// farmer cannot be resolved are skipped.
pub async fn record_order_placed(
    conn: &mut DbConn<'_>,
    order: &OrderEntity,
    sub_orders: &[PlacedSubOrder],
) -> Vec<(i32, RealtimeEvent)> {
    let mut pushes = Vec::with_capacity(sub_orders.len());

    for placed in sub_orders {
        let sub_order = &placed.sub_order;
        let Some(farmer_id) = resolve_user(conn, sub_order.farmer_id).await else {
            continue;
        };

        let message = format!(
            "A new order has been placed by customer {}",
            order.customer_id
        );
        persist(conn, farmer_id, ORDER_PLACEMENT, &message).await;
        pushes.push((
            farmer_id,
            RealtimeEvent::OrderPlaced {
                order_id: order.id,
                sub_order_id: sub_order.id,
                farmer_id,
                message,
            },
        ));
    }

    pushes
}

/// Notify every farmer with a sub-order in a freshly committed checkout.
pub async fn order_placed(
    conn: &mut DbConn<'_>,
    realtime: &RealtimePublisher,
    order: &OrderEntity,
    sub_orders: &[PlacedSubOrder],
) {
    let pushes = record_order_placed(conn, order, sub_orders).await;
    push_all(realtime, pushes).await;
}

/// Persist the status-change notification for the parent order's customer
/// and return the push owed to them.
pub async fn record_status_update(
    conn: &mut DbConn<'_>,
    customer_id: i32,
    sub_order: &SubOrderEntity,
) -> Vec<(i32, RealtimeEvent)> {
    let Some(customer_id) = resolve_user(conn, customer_id).await else {
        return Vec::new();
    };

    let message = format!(
        "Your order status has been updated to {}",
        sub_order.status
    );
    persist(conn, customer_id, ORDER_STATUS_UPDATE, &message).await;
    vec![(
        customer_id,
        RealtimeEvent::OrderStatusUpdated {
            order_id: sub_order.order_id,
            sub_order_id: sub_order.id,
            status: sub_order.status.clone(),
            message,
        },
    )]
}

/// Notify the parent order's customer that a farmer moved a sub-order.
pub async fn status_updated(
    conn: &mut DbConn<'_>,
    realtime: &RealtimePublisher,
    customer_id: i32,
    sub_order: &SubOrderEntity,
) {
    let pushes = record_status_update(conn, customer_id, sub_order).await;
    push_all(realtime, pushes).await;
}

/// Persist one cancellation notification per affected farmer and return the
/// pushes owed to them.
pub async fn record_order_canceled(
    conn: &mut DbConn<'_>,
    order: &OrderEntity,
    canceled: &[SubOrderEntity],
) -> Vec<(i32, RealtimeEvent)> {
    let mut pushes = Vec::with_capacity(canceled.len());

    for sub_order in canceled {
        let Some(farmer_id) = resolve_user(conn, sub_order.farmer_id).await else {
            continue;
        };

        let message = format!("Order #{} has been canceled by the customer", order.id);
        persist(conn, farmer_id, ORDER_CANCELLATION, &message).await;
        pushes.push((
            farmer_id,
            RealtimeEvent::OrderCanceled {
                order_id: order.id,
                sub_order_id: sub_order.id,
                farmer_id,
                message,
            },
        ));
    }

    pushes
}

/// Notify every affected farmer that the customer canceled the whole order.
pub async fn order_canceled(
    conn: &mut DbConn<'_>,
    realtime: &RealtimePublisher,
    order: &OrderEntity,
    canceled: &[SubOrderEntity],
) {
    let pushes = record_order_canceled(conn, order, canceled).await;
    push_all(realtime, pushes).await;
}

/// Persist the new-message notification for the recipient and return the
/// push owed to them.
pub async fn record_message_received(
    conn: &mut DbConn<'_>,
    message: &MessageEntity,
) -> Vec<(i32, RealtimeEvent)> {
    let Some(recipient_id) = resolve_user(conn, message.recipient_id).await else {
        return Vec::new();
    };

    let text = format!(
        "New message from {}: {}",
        message.sender_id, message.content
    );
    persist(conn, recipient_id, MESSAGE, &text).await;
    vec![(
        recipient_id,
        RealtimeEvent::ReceiveMessage {
            message_id: message.id,
            sender_id: message.sender_id,
            content: message.content.clone(),
        },
    )]
}

/// Notify a message recipient and push the message to their room.
pub async fn message_received(
    conn: &mut DbConn<'_>,
    realtime: &RealtimePublisher,
    message: &MessageEntity,
) {
    let pushes = record_message_received(conn, message).await;
    push_all(realtime, pushes).await;
}
