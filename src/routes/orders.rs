use std::collections::HashMap;

use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    http::StatusCode,
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
use crate::models::{DeliveryAddress, OrderEntity, OrderItemEntity, SubOrderEntity, UserEntity};
use crate::notifier;
use crate::orders::checkout::{self, PlacedSubOrder};
use crate::orders::lifecycle;
use crate::routes::sub_orders;
use crate::schema::{order_items, orders, sub_orders as sub_orders_table, users};

/// Order routes. Checkout, history and cancellation are customer-facing;
/// tracking is open to any authenticated user; the farmer-facing sub-order
/// routes live in `routes::sub_orders` and share the `/orders` prefix.
pub fn routes() -> Router<AppState> {
    let customer_routes = Router::new()
        .route("/", routing::post(create_order))
        .route("/", routing::get(get_my_orders))
        .route("/{id}/cancel", routing::patch(cancel_order))
        .route_layer(axum::middleware::from_fn(
            middleware::customers_authorization,
        ));

    let tracking_routes = Router::new()
        .route("/{id}", routing::get(track_order))
        .route_layer(axum::middleware::from_fn(middleware::users_authorization));

    Router::new().nest(
        "/orders",
        customer_routes
            .merge(tracking_routes)
            .merge(sub_orders::farmer_routes()),
    )
}

#[derive(Deserialize)]
struct CreateOrderReq {
    delivery_address: DeliveryAddress,
}

/// Checkout: split the cart into per-farmer sub-orders, persist them
/// atomically, clear the cart and notify every affected farmer. Notification
/// dispatch runs after the commit and never fails the request.
async fn create_order(
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
    Json(body): Json<CreateOrderReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let placed = checkout::place_order(conn, customer_id, body.delivery_address).await?;

    notifier::order_placed(conn, &state.realtime, &placed.order, &placed.sub_orders).await;

    Ok((
        StatusCode::CREATED,
        StdResponse {
            data: Some(placed),
            message: Some("Order placed successfully"),
        },
    ))
}

#[derive(Serialize)]
struct OrderRes {
    order: OrderEntity,
    sub_orders: Vec<PlacedSubOrder>,
}

/// Fetch the authenticated customer's order history, newest first, with
/// sub-orders and line items nested.
async fn get_my_orders(
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let my_orders: Vec<OrderEntity> = orders::table
        .filter(orders::customer_id.eq(customer_id))
        .order_by(orders::created_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get orders")?;

    let order_ids: Vec<i32> = my_orders.iter().map(|order| order.id).collect();
    let subs: Vec<SubOrderEntity> = sub_orders_table::table
        .filter(sub_orders_table::order_id.eq_any(&order_ids))
        .order_by(sub_orders_table::id)
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

    let mut items_by_sub: HashMap<i32, Vec<OrderItemEntity>> = HashMap::new();
    for item in items {
        items_by_sub.entry(item.sub_order_id).or_default().push(item);
    }

    let mut subs_by_order: HashMap<i32, Vec<PlacedSubOrder>> = HashMap::new();
    for sub_order in subs {
        let items = items_by_sub.remove(&sub_order.id).unwrap_or_default();
        subs_by_order
            .entry(sub_order.order_id)
            .or_default()
            .push(PlacedSubOrder { sub_order, items });
    }

    let history: Vec<OrderRes> = my_orders
        .into_iter()
        .map(|order| OrderRes {
            sub_orders: subs_by_order.remove(&order.id).unwrap_or_default(),
            order,
        })
        .collect();

    Ok(StdResponse {
        data: Some(history),
        message: Some("Get my orders successfully"),
    })
}

#[derive(Serialize)]
struct TrackSubOrderRes {
    sub_order: SubOrderEntity,
    farmer_name: Option<String>,
    items: Vec<OrderItemEntity>,
}

#[derive(Serialize)]
struct TrackOrderRes {
    order: OrderEntity,
    customer_name: Option<String>,
    sub_orders: Vec<TrackSubOrderRes>,
}

/// Track one order, populated with the display names of the customer and of
/// each sub-order's farmer.
async fn track_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(_user_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let order: OrderEntity = orders::table
        .find(id)
        .get_result(conn)
        .await
        .map_err(AppError::from)?;

    let subs: Vec<SubOrderEntity> = sub_orders_table::table
        .filter(sub_orders_table::order_id.eq(order.id))
        .order_by(sub_orders_table::id)
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

    let mut user_ids: Vec<i32> = subs.iter().map(|sub| sub.farmer_id).collect();
    user_ids.push(order.customer_id);
    let user_rows: Vec<UserEntity> = users::table
        .filter(users::id.eq_any(&user_ids))
        .get_results(conn)
        .await
        .context("Failed to get users")?;
    let names: HashMap<i32, String> = user_rows
        .iter()
        .map(|user| (user.id, user.display_name()))
        .collect();

    let mut items_by_sub: HashMap<i32, Vec<OrderItemEntity>> = HashMap::new();
    for item in items {
        items_by_sub.entry(item.sub_order_id).or_default().push(item);
    }

    let sub_orders = subs
        .into_iter()
        .map(|sub_order| TrackSubOrderRes {
            farmer_name: names.get(&sub_order.farmer_id).cloned(),
            items: items_by_sub.remove(&sub_order.id).unwrap_or_default(),
            sub_order,
        })
        .collect();

    Ok(StdResponse {
        data: Some(TrackOrderRes {
            customer_name: names.get(&order.customer_id).cloned(),
            order,
            sub_orders,
        }),
        message: Some("Get order successfully"),
    })
}

#[derive(Serialize)]
struct CancelOrderRes {
    order: OrderEntity,
    canceled_sub_orders: Vec<SubOrderEntity>,
}

/// Cancel a whole order while every sub-order is still pending, then notify
/// each affected farmer.
async fn cancel_order(
    Path(id): Path<i32>,
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let (order, canceled) = lifecycle::cancel_order(conn, customer_id, id).await?;

    notifier::order_canceled(conn, &state.realtime, &order, &canceled).await;

    Ok(StdResponse {
        data: Some(CancelOrderRes {
            order,
            canceled_sub_orders: canceled,
        }),
        message: Some("Order has been canceled"),
    })
}
