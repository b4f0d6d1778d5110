use std::collections::HashMap;

use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing,
};
use diesel::{ExpressionMethods, QueryDsl};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};

use crate::core::{
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware,
};
use crate::models::{OrderEntity, OrderItemEntity, SubOrderEntity};
use crate::notifier;
use crate::orders::lifecycle::{self, SubOrderStatus};
use crate::schema::{order_items, orders, sub_orders};

/// Farmer-facing sub-order routes, mounted under `/orders` by
/// `routes::orders`.
pub fn farmer_routes() -> Router<AppState> {
    Router::new()
        .route("/farmer", routing::get(get_farmer_sub_orders))
        .route("/{id}/status", routing::patch(update_sub_order_status))
        .route_layer(axum::middleware::from_fn(
            middleware::farmers_authorization,
        ))
}

#[derive(Serialize)]
struct FarmerSubOrderRes {
    sub_order: SubOrderEntity,
    items: Vec<OrderItemEntity>,
    order: OrderEntity,
}

/// Fetch the authenticated farmer's sub-orders, newest first, each with its
/// line items and parent order.
async fn get_farmer_sub_orders(
    State(state): State<AppState>,
    Extension(farmer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let subs: Vec<SubOrderEntity> = sub_orders::table
        .filter(sub_orders::farmer_id.eq(farmer_id))
        .order_by(sub_orders::created_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get sub-orders")?;

    let sub_ids: Vec<i32> = subs.iter().map(|sub| sub.id).collect();
    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::sub_order_id.eq_any(&sub_ids))
        .order_by(order_items::id)
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let order_ids: Vec<i32> = subs.iter().map(|sub| sub.order_id).collect();
    let parent_orders: Vec<OrderEntity> = orders::table
        .filter(orders::id.eq_any(&order_ids))
        .get_results(conn)
        .await
        .context("Failed to get parent orders")?;

    let mut items_by_sub: HashMap<i32, Vec<OrderItemEntity>> = HashMap::new();
    for item in items {
        items_by_sub.entry(item.sub_order_id).or_default().push(item);
    }
    let orders_by_id: HashMap<i32, OrderEntity> = parent_orders
        .into_iter()
        .map(|order| (order.id, order))
        .collect();

    let mut results = Vec::with_capacity(subs.len());
    for sub_order in subs {
        let order = orders_by_id
            .get(&sub_order.order_id)
            .cloned()
            .context("Sub-order has no parent order")?;
        results.push(FarmerSubOrderRes {
            items: items_by_sub.remove(&sub_order.id).unwrap_or_default(),
            order,
            sub_order,
        });
    }

    Ok(StdResponse {
        data: Some(results),
        message: Some("Get farmer orders successfully"),
    })
}

#[derive(Deserialize)]
struct UpdateSubOrderStatusReq {
    order_status: SubOrderStatus,
}

/// Advance one sub-order through shipped/delivered, then notify the parent
/// order's customer. The path id is the sub-order id.
async fn update_sub_order_status(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(farmer_id): Extension<i32>,
    Json(body): Json<UpdateSubOrderStatusReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let (updated, customer_id) =
        lifecycle::advance_sub_order(conn, farmer_id, id, body.order_status).await?;

    notifier::status_updated(conn, &state.realtime, customer_id, &updated).await;

    Ok(StdResponse {
        data: Some(updated),
        message: Some("Order status updated"),
    })
}
