pub mod checkout;
pub mod lifecycle;
