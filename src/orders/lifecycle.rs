use anyhow::anyhow;
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};

use crate::core::aliases::{DbConn, DieselError};
use crate::core::app_error::AppError;
use crate::models::{OrderEntity, SubOrderEntity};
use crate::schema::{orders, sub_orders};

/// Per-sub-order lifecycle. Forward only, with cancellation reachable from
/// `pending` alone; `delivered` and `canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubOrderStatus {
    Pending,
    Shipped,
    Delivered,
    Canceled,
}

impl SubOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubOrderStatus::Pending => "pending",
            SubOrderStatus::Shipped => "shipped",
            SubOrderStatus::Delivered => "delivered",
            SubOrderStatus::Canceled => "canceled",
        }
    }

    pub fn can_transition_to(self, next: SubOrderStatus) -> bool {
        matches!(
            (self, next),
            (SubOrderStatus::Pending, SubOrderStatus::Shipped)
                | (SubOrderStatus::Shipped, SubOrderStatus::Delivered)
                | (SubOrderStatus::Pending, SubOrderStatus::Canceled)
        )
    }
}

impl std::str::FromStr for SubOrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SubOrderStatus::Pending),
            "shipped" => Ok(SubOrderStatus::Shipped),
            "delivered" => Ok(SubOrderStatus::Delivered),
            "canceled" => Ok(SubOrderStatus::Canceled),
            other => Err(format!("{other} is not a valid order status")),
        }
    }
}

impl std::fmt::Display for SubOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Advance a sub-order through shipped/delivered on behalf of its farmer.
///
/// The sub-order is looked up filtered by owner, so a farmer probing someone
/// else's sub-order gets a 404 and no state change. The update itself is a
/// compare-and-set on the previously read status; losing that race is a
/// conflict, not a silent overwrite. Returns the updated sub-order together
/// with the parent order's customer for notification dispatch.
pub async fn advance_sub_order(
    conn: &mut DbConn<'_>,
    farmer_id: i32,
    sub_order_id: i32,
    target: SubOrderStatus,
) -> Result<(SubOrderEntity, i32), AppError> {
    if !matches!(target, SubOrderStatus::Shipped | SubOrderStatus::Delivered) {
        return Err(AppError::Validation(format!(
            "Farmers may only move orders to shipped or delivered, not {target}"
        )));
    }

    let sub_order: SubOrderEntity = sub_orders::table
        .find(sub_order_id)
        .filter(sub_orders::farmer_id.eq(farmer_id))
        .get_result(conn)
        .await
        .map_err(AppError::from)?;

    let current: SubOrderStatus = sub_order
        .status
        .parse()
        .map_err(|err: String| AppError::Other(anyhow!(err)))?;

    if !current.can_transition_to(target) {
        return Err(AppError::Conflict(format!(
            "Cannot move a {current} order to {target}"
        )));
    }

    let updated: SubOrderEntity = diesel::update(
        sub_orders::table
            .find(sub_order_id)
            .filter(sub_orders::farmer_id.eq(farmer_id))
            .filter(sub_orders::status.eq(current.as_str())),
    )
    .set(sub_orders::status.eq(target.as_str()))
    .returning(SubOrderEntity::as_returning())
    .get_result(conn)
    .await
    .map_err(|err| match err {
        DieselError::NotFound => {
            AppError::Conflict("Order status was changed concurrently".into())
        }
        _ => AppError::Other(err.into()),
    })?;

    let customer_id: i32 = orders::table
        .find(updated.order_id)
        .select(orders::customer_id)
        .get_result(conn)
        .await
        .map_err(AppError::from)?;

    Ok((updated, customer_id))
}

/// Cancel a whole order on behalf of its customer.
///
/// Allowed only while every sub-order is still pending. The pending-only
/// update and the count run in one transaction; when they disagree some
/// sub-order has already progressed and the transaction aborts, leaving every
/// status untouched. Returns the canceled sub-orders for farmer notification.
pub async fn cancel_order(
    conn: &mut DbConn<'_>,
    customer_id: i32,
    order_id: i32,
) -> Result<(OrderEntity, Vec<SubOrderEntity>), AppError> {
    let order: OrderEntity = orders::table
        .find(order_id)
        .get_result(conn)
        .await
        .map_err(AppError::from)?;

    if order.customer_id != customer_id {
        return Err(AppError::Forbidden(
            "Only the order's customer may cancel it".into(),
        ));
    }

    let canceled = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let total: i64 = sub_orders::table
                    .filter(sub_orders::order_id.eq(order_id))
                    .count()
                    .get_result(conn)
                    .await?;

                let canceled: Vec<SubOrderEntity> = diesel::update(
                    sub_orders::table
                        .filter(sub_orders::order_id.eq(order_id))
                        .filter(sub_orders::status.eq(SubOrderStatus::Pending.as_str())),
                )
                .set(sub_orders::status.eq(SubOrderStatus::Canceled.as_str()))
                .returning(SubOrderEntity::as_returning())
                .get_results(conn)
                .await?;

                if canceled.len() as i64 != total {
                    return Err(AppError::Conflict(
                        "Cannot cancel: part of the order has already shipped".into(),
                    ));
                }

                Ok::<Vec<SubOrderEntity>, AppError>(canceled)
            })
        })
        .await?;

    Ok((order, canceled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_transitions() {
        use SubOrderStatus::*;
        assert!(Pending.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));
        assert!(Pending.can_transition_to(Canceled));
    }

    #[test]
    fn forbidden_transitions() {
        use SubOrderStatus::*;
        // forward only
        assert!(!Shipped.can_transition_to(Pending));
        assert!(!Delivered.can_transition_to(Shipped));
        assert!(!Pending.can_transition_to(Delivered));
        // terminal states
        assert!(!Delivered.can_transition_to(Canceled));
        assert!(!Canceled.can_transition_to(Pending));
        assert!(!Canceled.can_transition_to(Shipped));
        // cancellation only from pending
        assert!(!Shipped.can_transition_to(Canceled));
        // self loops
        assert!(!Pending.can_transition_to(Pending));
        assert!(!Shipped.can_transition_to(Shipped));
    }

    #[test]
    fn status_round_trips_through_text() {
        for status in [
            SubOrderStatus::Pending,
            SubOrderStatus::Shipped,
            SubOrderStatus::Delivered,
            SubOrderStatus::Canceled,
        ] {
            assert_eq!(status.as_str().parse::<SubOrderStatus>().unwrap(), status);
        }
        assert!("returned".parse::<SubOrderStatus>().is_err());
    }

    #[test]
    fn status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SubOrderStatus::Shipped).unwrap(),
            "\"shipped\""
        );
        let parsed: SubOrderStatus = serde_json::from_str("\"canceled\"").unwrap();
        assert_eq!(parsed, SubOrderStatus::Canceled);
    }
}
