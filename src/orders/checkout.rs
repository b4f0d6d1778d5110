use std::collections::HashMap;

use anyhow::anyhow;
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::Serialize;

use crate::core::aliases::{DbConn, DieselError};
use crate::core::app_error::AppError;
use crate::models::{
    CartItemEntity, CreateOrderEntity, CreateOrderItemEntity, CreateSubOrderEntity,
    DeliveryAddress, OrderEntity, OrderItemEntity, ProductEntity, SubOrderEntity, UserRole,
};
use crate::orders::lifecycle::SubOrderStatus;
use crate::schema::{cart_items, order_items, orders, products, sub_orders, users};

/// Checkout failure taxonomy. Only `Persistence` is retryable; every variant
/// aborts before or with the transaction, so the cart is intact afterwards.
#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("Customer {0} does not exist")]
    MissingCustomer(i32),
    #[error("{0}")]
    InvalidAddress(String),
    #[error("Cart is empty")]
    EmptyCart,
    #[error(transparent)]
    Persistence(#[from] anyhow::Error),
}

impl From<DieselError> for CheckoutError {
    fn from(err: DieselError) -> Self {
        CheckoutError::Persistence(err.into())
    }
}

impl From<CheckoutError> for AppError {
    fn from(err: CheckoutError) -> Self {
        match err {
            CheckoutError::MissingCustomer(_) => AppError::NotFound,
            CheckoutError::InvalidAddress(message) => AppError::Validation(message),
            CheckoutError::EmptyCart => AppError::Validation("Cart is empty".into()),
            CheckoutError::Persistence(err) => AppError::Other(err),
        }
    }
}

/// One cart line joined with its product, the aggregator's input.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutLine {
    pub product_id: i32,
    pub farmer_id: i32,
    pub unit_price: f32,
    pub quantity: i32,
}

#[derive(Debug, PartialEq)]
pub struct SubOrderPlan {
    pub farmer_id: i32,
    pub sub_total: f32,
    pub items: Vec<CheckoutLine>,
}

#[derive(Debug, PartialEq)]
pub struct CheckoutPlan {
    pub total_amount: f32,
    pub sub_orders: Vec<SubOrderPlan>,
}

/// Partition the cart by farmer and freeze prices. Farmers appear in the
/// order their first product appears in the cart; line order is preserved
/// within each sub-order.
pub fn plan_checkout(lines: &[CheckoutLine]) -> Result<CheckoutPlan, CheckoutError> {
    if lines.is_empty() {
        return Err(CheckoutError::EmptyCart);
    }

    let mut slots: HashMap<i32, usize> = HashMap::new();
    let mut sub_orders: Vec<SubOrderPlan> = Vec::new();

    for line in lines {
        let slot = *slots.entry(line.farmer_id).or_insert_with(|| {
            sub_orders.push(SubOrderPlan {
                farmer_id: line.farmer_id,
                sub_total: 0.0,
                items: Vec::new(),
            });
            sub_orders.len() - 1
        });
        let sub_order = &mut sub_orders[slot];
        sub_order.sub_total += line.unit_price * line.quantity as f32;
        sub_order.items.push(line.clone());
    }

    let total_amount = sub_orders.iter().map(|sub| sub.sub_total).sum();

    Ok(CheckoutPlan {
        total_amount,
        sub_orders,
    })
}

#[derive(Serialize, Debug, Clone)]
pub struct PlacedSubOrder {
    pub sub_order: SubOrderEntity,
    pub items: Vec<OrderItemEntity>,
}

#[derive(Serialize, Debug)]
pub struct PlacedOrder {
    pub order: OrderEntity,
    pub sub_orders: Vec<PlacedSubOrder>,
}

/// Convert the customer's cart into one order with per-farmer sub-orders.
///
/// Everything that mutates state happens inside a single transaction. The
/// cart delete runs first and returns the spent rows; under concurrent
/// checkouts from the same customer the delete is the serialization point, so
/// a losing transaction sees an empty cart instead of double-spending lines.
/// Notification dispatch is the caller's job, after this returns.
pub async fn place_order(
    conn: &mut DbConn<'_>,
    customer_id: i32,
    delivery_address: DeliveryAddress,
) -> Result<PlacedOrder, CheckoutError> {
    delivery_address
        .validate()
        .map_err(CheckoutError::InvalidAddress)?;

    let known: i64 = users::table
        .find(customer_id)
        .filter(users::role.eq(UserRole::Customer.as_str()))
        .count()
        .get_result(conn)
        .await
        .map_err(|err| CheckoutError::Persistence(err.into()))?;
    if known == 0 {
        return Err(CheckoutError::MissingCustomer(customer_id));
    }

    let address = serde_json::to_value(&delivery_address)
        .map_err(|err| CheckoutError::Persistence(err.into()))?;

    conn.transaction(move |conn| {
        Box::pin(async move {
            let mut cart: Vec<CartItemEntity> = diesel::delete(
                cart_items::table.filter(cart_items::customer_id.eq(customer_id)),
            )
            .returning(CartItemEntity::as_returning())
            .get_results(conn)
            .await?;

            if cart.is_empty() {
                return Err(CheckoutError::EmptyCart);
            }

            // RETURNING has no defined order; restore cart order.
            cart.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then(a.product_id.cmp(&b.product_id))
            });

            let product_ids: Vec<i32> = cart.iter().map(|line| line.product_id).collect();
            let product_rows: Vec<ProductEntity> = products::table
                .filter(products::id.eq_any(&product_ids))
                .get_results(conn)
                .await?;
            let product_by_id: HashMap<i32, &ProductEntity> =
                product_rows.iter().map(|p| (p.id, p)).collect();

            let mut lines = Vec::with_capacity(cart.len());
            for item in &cart {
                let product = product_by_id.get(&item.product_id).ok_or_else(|| {
                    CheckoutError::Persistence(anyhow!(
                        "Product {} in cart no longer exists",
                        item.product_id
                    ))
                })?;
                lines.push(CheckoutLine {
                    product_id: product.id,
                    farmer_id: product.farmer_id,
                    unit_price: product.price,
                    quantity: item.quantity,
                });
            }

            let plan = plan_checkout(&lines)?;

            let order: OrderEntity = diesel::insert_into(orders::table)
                .values(CreateOrderEntity {
                    customer_id,
                    total_amount: plan.total_amount,
                    delivery_address: address,
                })
                .returning(OrderEntity::as_returning())
                .get_result(conn)
                .await?;

            let mut placed = Vec::with_capacity(plan.sub_orders.len());
            for sub in plan.sub_orders {
                let sub_order: SubOrderEntity = diesel::insert_into(sub_orders::table)
                    .values(CreateSubOrderEntity {
                        order_id: order.id,
                        farmer_id: sub.farmer_id,
                        total_amount: sub.sub_total,
                        status: SubOrderStatus::Pending.as_str().into(),
                    })
                    .returning(SubOrderEntity::as_returning())
                    .get_result(conn)
                    .await?;

                let rows: Vec<CreateOrderItemEntity> = sub
                    .items
                    .iter()
                    .map(|line| CreateOrderItemEntity {
                        sub_order_id: sub_order.id,
                        product_id: line.product_id,
                        quantity: line.quantity,
                        price: line.unit_price,
                    })
                    .collect();

                let items: Vec<OrderItemEntity> = diesel::insert_into(order_items::table)
                    .values(rows)
                    .returning(OrderItemEntity::as_returning())
                    .get_results(conn)
                    .await?;

                placed.push(PlacedSubOrder { sub_order, items });
            }

            Ok::<PlacedOrder, CheckoutError>(PlacedOrder {
                order,
                sub_orders: placed,
            })
        })
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(product_id: i32, farmer_id: i32, unit_price: f32, quantity: i32) -> CheckoutLine {
        CheckoutLine {
            product_id,
            farmer_id,
            unit_price,
            quantity,
        }
    }

    #[test]
    fn empty_cart_is_rejected() {
        assert!(matches!(plan_checkout(&[]), Err(CheckoutError::EmptyCart)));
    }

    #[test]
    fn cart_spanning_two_farmers_yields_two_sub_orders() {
        // product A from F1 at 10 x2, product B from F2 at 5 x1
        let plan = plan_checkout(&[line(1, 100, 10.0, 2), line(2, 200, 5.0, 1)]).unwrap();

        assert_eq!(plan.sub_orders.len(), 2);
        assert_eq!(plan.sub_orders[0].farmer_id, 100);
        assert_eq!(plan.sub_orders[0].sub_total, 20.0);
        assert_eq!(plan.sub_orders[1].farmer_id, 200);
        assert_eq!(plan.sub_orders[1].sub_total, 5.0);
        assert_eq!(plan.total_amount, 25.0);
    }

    #[test]
    fn farmers_are_visited_in_first_appearance_order() {
        let plan = plan_checkout(&[
            line(1, 300, 1.0, 1),
            line(2, 100, 1.0, 1),
            line(3, 300, 1.0, 1),
            line(4, 200, 1.0, 1),
        ])
        .unwrap();

        let farmer_ids: Vec<i32> = plan.sub_orders.iter().map(|s| s.farmer_id).collect();
        assert_eq!(farmer_ids, vec![300, 100, 200]);
    }

    #[test]
    fn line_order_is_preserved_within_a_sub_order() {
        let plan = plan_checkout(&[
            line(5, 100, 2.0, 1),
            line(9, 200, 3.0, 1),
            line(7, 100, 4.0, 2),
        ])
        .unwrap();

        let first = &plan.sub_orders[0];
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.items[0].product_id, 5);
        assert_eq!(first.items[1].product_id, 7);
        assert_eq!(first.sub_total, 2.0 + 8.0);
    }

    #[test]
    fn total_is_the_sum_of_sub_totals() {
        let lines = vec![
            line(1, 1, 1.5, 4),
            line(2, 2, 2.25, 2),
            line(3, 1, 10.0, 1),
            line(4, 3, 0.5, 6),
        ];
        let plan = plan_checkout(&lines).unwrap();

        let from_subs: f32 = plan.sub_orders.iter().map(|s| s.sub_total).sum();
        let from_lines: f32 = lines
            .iter()
            .map(|l| l.unit_price * l.quantity as f32)
            .sum();
        assert_eq!(plan.total_amount, from_subs);
        assert_eq!(plan.total_amount, from_lines);
    }

    #[test]
    fn single_farmer_cart_yields_one_sub_order() {
        let plan = plan_checkout(&[line(1, 100, 3.0, 2), line(2, 100, 1.0, 1)]).unwrap();
        assert_eq!(plan.sub_orders.len(), 1);
        assert_eq!(plan.total_amount, 7.0);
    }

    #[test]
    fn checkout_errors_map_to_app_errors() {
        assert!(matches!(
            AppError::from(CheckoutError::EmptyCart),
            AppError::Validation(_)
        ));
        assert!(matches!(
            AppError::from(CheckoutError::MissingCustomer(1)),
            AppError::NotFound
        ));
        assert!(matches!(
            AppError::from(CheckoutError::InvalidAddress("City is required".into())),
            AppError::Validation(_)
        ));
        assert!(matches!(
            AppError::from(CheckoutError::Persistence(anyhow!("db down"))),
            AppError::Other(_)
        ));
    }
}
