pub mod core;
pub mod models;
pub mod notifier;
pub mod orders;
pub mod realtime;
pub mod routes;
pub mod schema;
