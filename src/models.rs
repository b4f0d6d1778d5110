use chrono::{DateTime, Utc};
use diesel::{
    Selectable,
    prelude::{Identifiable, Insertable, Queryable},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// Users

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Farmer,
    Customer,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Farmer => "farmer",
            UserRole::Customer => "customer",
        }
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "farmer" => Ok(UserRole::Farmer),
            "customer" => Ok(UserRole::Customer),
            other => Err(format!("{other} is not a valid user role")),
        }
    }
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug)]
#[diesel(table_name = crate::schema::users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserEntity {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserEntity {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

// Products

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug)]
#[diesel(table_name = crate::schema::products)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ProductEntity {
    pub id: i32,
    pub farmer_id: i32,
    pub name: String,
    pub description: Option<String>,
    pub price: f32,
    pub category: String,
    pub stock: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Cart

#[derive(Queryable, Selectable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::schema::cart_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct CartItemEntity {
    pub customer_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Deserialize, Debug)]
#[diesel(table_name = crate::schema::cart_items)]
pub struct CreateCartItemEntity {
    pub customer_id: i32,
    pub product_id: i32,
    pub quantity: i32,
}

// Orders

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::schema::orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderEntity {
    pub id: i32,
    pub customer_id: i32,
    pub total_amount: f32,
    pub delivery_address: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::orders)]
pub struct CreateOrderEntity {
    pub customer_id: i32,
    pub total_amount: f32,
    pub delivery_address: Value,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::schema::sub_orders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SubOrderEntity {
    pub id: i32,
    pub order_id: i32,
    pub farmer_id: i32,
    pub total_amount: f32,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::sub_orders)]
pub struct CreateSubOrderEntity {
    pub order_id: i32,
    pub farmer_id: i32,
    pub total_amount: f32,
    pub status: String,
}

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::schema::order_items)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct OrderItemEntity {
    pub id: i32,
    pub sub_order_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub price: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::order_items)]
pub struct CreateOrderItemEntity {
    pub sub_order_id: i32,
    pub product_id: i32,
    pub quantity: i32,
    pub price: f32,
}

// Notifications

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug)]
#[diesel(table_name = crate::schema::notifications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct NotificationEntity {
    pub id: Uuid,
    pub user_id: i32,
    pub notification_type: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::notifications)]
pub struct CreateNotificationEntity {
    pub user_id: i32,
    pub notification_type: String,
    pub message: String,
}

// Messages

#[derive(Queryable, Selectable, Identifiable, Serialize, Debug, Clone)]
#[diesel(table_name = crate::schema::messages)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct MessageEntity {
    pub id: i32,
    pub sender_id: i32,
    pub recipient_id: i32,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::schema::messages)]
pub struct CreateMessageEntity {
    pub sender_id: i32,
    pub recipient_id: i32,
    pub content: String,
}

/// Delivery address captured at checkout and stored on the order as JSONB.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DeliveryAddress {
    pub address_line1: String,
    #[serde(default)]
    pub address_line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub state: Option<String>,
    pub country: String,
    pub postal_code: String,
}

impl DeliveryAddress {
    /// Check the required fields before anything is written.
    pub fn validate(&self) -> Result<(), String> {
        if self.address_line1.trim().is_empty() {
            return Err("Address Line 1 is required".into());
        }
        if self.city.trim().is_empty() {
            return Err("City is required".into());
        }
        if self.country.trim().is_empty() {
            return Err("Country is required".into());
        }
        if self.postal_code.trim().is_empty() {
            return Err("Postal Code is required".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> DeliveryAddress {
        DeliveryAddress {
            address_line1: "12 Market Road".into(),
            address_line2: None,
            city: "Accra".into(),
            state: None,
            country: "Ghana".into(),
            postal_code: "GA-145".into(),
        }
    }

    #[test]
    fn complete_address_passes_validation() {
        assert!(address().validate().is_ok());
    }

    #[test]
    fn missing_required_fields_are_reported() {
        let mut addr = address();
        addr.address_line1 = "  ".into();
        assert_eq!(addr.validate().unwrap_err(), "Address Line 1 is required");

        let mut addr = address();
        addr.city = String::new();
        assert_eq!(addr.validate().unwrap_err(), "City is required");

        let mut addr = address();
        addr.country = String::new();
        assert_eq!(addr.validate().unwrap_err(), "Country is required");

        let mut addr = address();
        addr.postal_code = String::new();
        assert_eq!(addr.validate().unwrap_err(), "Postal Code is required");
    }

    #[test]
    fn optional_lines_may_be_absent_in_json() {
        let addr: DeliveryAddress = serde_json::from_value(serde_json::json!({
            "address_line1": "12 Market Road",
            "city": "Accra",
            "country": "Ghana",
            "postal_code": "GA-145",
        }))
        .unwrap();
        assert!(addr.address_line2.is_none());
        assert!(addr.validate().is_ok());
    }

    #[test]
    fn user_role_parses_lowercase() {
        assert_eq!("farmer".parse::<UserRole>().unwrap(), UserRole::Farmer);
        assert_eq!("customer".parse::<UserRole>().unwrap(), UserRole::Customer);
        assert!("admin".parse::<UserRole>().is_err());
    }
}
