pub mod carts;
pub mod health;
pub mod messages;
pub mod notifications;
pub mod orders;
pub mod sub_orders;
