use anyhow::Context;
use axum::{
    Extension, Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing,
};
use diesel::result::DatabaseErrorKind;
use diesel::{ExpressionMethods, OptionalExtension, QueryDsl, SelectableHelper};
use diesel_async::RunQueryDsl;
use serde::{Deserialize, Serialize};

use crate::core::{
    aliases::{DbConn, DieselError},
    app_error::{AppError, StdResponse},
    app_state::AppState,
    middleware,
};
use crate::models::{CartItemEntity, CreateCartItemEntity};
use crate::schema::{cart_items, products};

/// Customer-facing cart routes.
pub fn routes() -> Router<AppState> {
    Router::new().nest(
        "/cart",
        Router::new()
            .route("/", routing::post(add_item))
            .route("/", routing::get(get_cart))
            .route("/{product_id}", routing::delete(remove_item))
            .route_layer(axum::middleware::from_fn(
                middleware::customers_authorization,
            )),
    )
}

#[derive(Deserialize)]
struct AddItemReq {
    product_id: i32,
    quantity: i32,
}

#[derive(Debug)]
pub enum CartMutation {
    Added(CartItemEntity),
    Updated(CartItemEntity),
    Removed,
}

/// Apply a signed quantity change to one cart line. The delta accumulates
/// onto any existing line; a line whose quantity drops to zero or below is
/// removed. Referencing an unknown product is a 404, and deltas that would
/// overflow the stored quantity are rejected.
pub async fn apply_cart_delta(
    conn: &mut DbConn<'_>,
    customer_id: i32,
    product_id: i32,
    delta: i32,
) -> Result<CartMutation, AppError> {
    let existing: Option<CartItemEntity> = cart_items::table
        .find((customer_id, product_id))
        .get_result(conn)
        .await
        .optional()
        .context("Failed to look up cart item")?;

    match existing {
        Some(item) => {
            let Some(quantity) = item.quantity.checked_add(delta) else {
                return Err(AppError::Validation("Quantity is out of range".into()));
            };

            if quantity <= 0 {
                diesel::delete(cart_items::table.find((customer_id, product_id)))
                    .execute(conn)
                    .await
                    .context("Failed to remove cart item")?;

                return Ok(CartMutation::Removed);
            }

            let updated: CartItemEntity =
                diesel::update(cart_items::table.find((customer_id, product_id)))
                    .set(cart_items::quantity.eq(quantity))
                    .returning(CartItemEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to update cart item")?;

            Ok(CartMutation::Updated(updated))
        }
        None => {
            if delta <= 0 {
                return Err(AppError::Validation(
                    "Cannot add an item with zero or negative quantity".into(),
                ));
            }

            let created: CartItemEntity = diesel::insert_into(cart_items::table)
                .values(CreateCartItemEntity {
                    customer_id,
                    product_id,
                    quantity: delta,
                })
                .returning(CartItemEntity::as_returning())
                .get_result(conn)
                .await
                .map_err(|err| match err {
                    DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, _) => {
                        AppError::NotFound
                    }
                    _ => AppError::Other(err.into()),
                })?;

            Ok(CartMutation::Added(created))
        }
    }
}

/// Add a product to the cart. The signed quantity accumulates onto any
/// existing line; a line whose quantity drops to zero or below is removed.
async fn add_item(
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
    Json(body): Json<AddItemReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    match apply_cart_delta(conn, customer_id, body.product_id, body.quantity).await? {
        CartMutation::Added(item) => Ok(StdResponse {
            data: Some(item),
            message: Some("Item added to cart"),
        }),
        CartMutation::Updated(item) => Ok(StdResponse {
            data: Some(item),
            message: Some("Cart updated successfully"),
        }),
        CartMutation::Removed => Ok(StdResponse::<CartItemEntity, &str> {
            data: None,
            message: Some("Item removed from cart"),
        }),
    }
}

#[derive(Serialize)]
struct CartLineRes {
    item: CartItemEntity,
    product_name: String,
    unit_price: f32,
    line_total: f32,
}

#[derive(Serialize)]
struct GetCartRes {
    lines: Vec<CartLineRes>,
    total: f32,
}

/// Fetch the customer's cart with product names, prices and the running total.
async fn get_cart(
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let rows: Vec<(CartItemEntity, String, f32)> = cart_items::table
        .inner_join(products::table)
        .filter(cart_items::customer_id.eq(customer_id))
        .order_by((cart_items::created_at, cart_items::product_id))
        .select((
            CartItemEntity::as_select(),
            products::name,
            products::price,
        ))
        .get_results(conn)
        .await
        .context("Failed to get cart items")?;

    let lines: Vec<CartLineRes> = rows
        .into_iter()
        .map(|(item, product_name, unit_price)| {
            let line_total = unit_price * item.quantity as f32;
            CartLineRes {
                item,
                product_name,
                unit_price,
                line_total,
            }
        })
        .collect();
    let total = lines.iter().map(|line| line.line_total).sum();

    Ok(StdResponse {
        data: Some(GetCartRes { lines, total }),
        message: Some("Get cart successfully"),
    })
}

/// Remove one product from the cart.
async fn remove_item(
    Path(product_id): Path<i32>,
    State(state): State<AppState>,
    Extension(customer_id): Extension<i32>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let deleted: CartItemEntity =
        diesel::delete(cart_items::table.find((customer_id, product_id)))
            .returning(CartItemEntity::as_returning())
            .get_result(conn)
            .await
            .map_err(AppError::from)?;

    Ok(StdResponse {
        data: Some(deleted),
        message: Some("Item removed from cart"),
    })
}
