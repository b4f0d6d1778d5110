use axum::{extract::Request, middleware::Next, response::Response};

use crate::core::app_error::AppError;
use crate::models::UserRole;

/// Requests arrive through the authenticating gateway, which forwards the
/// caller's identity as `x-user-id` / `x-user-role` headers. The gateway is
/// the trust boundary; missing or malformed headers mean the request never
/// went through it.
fn identity(req: &Request) -> Result<(i32, UserRole), AppError> {
    let user_id = req
        .headers()
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<i32>().ok())
        .ok_or(AppError::Unauthorized)?;

    let role = req
        .headers()
        .get("x-user-role")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<UserRole>().ok())
        .ok_or(AppError::Unauthorized)?;

    Ok((user_id, role))
}

/// Allow only customers; injects the customer id as an `Extension<i32>`.
pub async fn customers_authorization(mut req: Request, next: Next) -> Result<Response, AppError> {
    let (user_id, role) = identity(&req)?;
    if role != UserRole::Customer {
        return Err(AppError::Forbidden("Customer role required".into()));
    }
    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}

/// Allow only farmers; injects the farmer id as an `Extension<i32>`.
pub async fn farmers_authorization(mut req: Request, next: Next) -> Result<Response, AppError> {
    let (user_id, role) = identity(&req)?;
    if role != UserRole::Farmer {
        return Err(AppError::Forbidden("Farmer role required".into()));
    }
    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}

/// Allow any authenticated user.
pub async fn users_authorization(mut req: Request, next: Next) -> Result<Response, AppError> {
    let (user_id, _) = identity(&req)?;
    req.extensions_mut().insert(user_id);
    Ok(next.run(req).await)
}
