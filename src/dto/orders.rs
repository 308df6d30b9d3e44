use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::dto::phone_error;
use crate::error::{AppError, AppResult, FieldError};
use crate::models::{Order, OrderItem};

pub const PAYMENT_METHODS: [&str; 3] = ["cod", "card", "upi"];

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateOrderRequest {
    pub payment_method: String,
    pub shipping_address: String,
    pub phone: String,
    pub notes: Option<String>,
}

impl CreateOrderRequest {
    pub fn validate(&self) -> AppResult<()> {
        let mut errors = Vec::new();
        if !PAYMENT_METHODS.contains(&self.payment_method.as_str()) {
            errors.push(FieldError::new(
                "payment_method",
                "Payment method must be one of: cod, card, upi",
            ));
        }
        if self.shipping_address.trim().is_empty() {
            errors.push(FieldError::new(
                "shipping_address",
                "Shipping address is required",
            ));
        }
        if let Some(err) = phone_error("phone", &self.phone) {
            errors.push(err);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderWithItems {
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct OrderList {
    #[schema(value_type = Vec<Order>)]
    pub items: Vec<Order>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_payment_method() {
        let request = CreateOrderRequest {
            payment_method: "barter".into(),
            shipping_address: "1 Crab Lane".into(),
            phone: "+4915112345678".into(),
            notes: None,
        };
        assert!(matches!(
            request.validate(),
            Err(AppError::Validation(errors)) if errors[0].field == "payment_method"
        ));
    }
}
