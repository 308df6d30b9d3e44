use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult, FieldError};
use crate::models::Product;

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateProductRequest {
    pub category_id: Uuid,
    pub name: String,
    pub slug: Option<String>,
    pub description: String,
    pub price: i64,
    pub stock: i32,
    pub featured: Option<bool>,
}

impl CreateProductRequest {
    pub fn validate(&self) -> AppResult<()> {
        let mut errors = Vec::new();
        if self.name.trim().is_empty() || self.name.len() > 200 {
            errors.push(FieldError::new(
                "name",
                "Name must be between 1 and 200 characters",
            ));
        }
        if self.price <= 0 {
            errors.push(FieldError::new("price", "Price must be greater than zero"));
        }
        if self.stock < 0 {
            errors.push(FieldError::new("stock", "Stock cannot be negative"));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProductRequest {
    pub category_id: Option<Uuid>,
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub stock: Option<i32>,
    pub is_active: Option<bool>,
    pub featured: Option<bool>,
}

impl UpdateProductRequest {
    pub fn validate(&self) -> AppResult<()> {
        let mut errors = Vec::new();
        if let Some(price) = self.price {
            if price <= 0 {
                errors.push(FieldError::new("price", "Price must be greater than zero"));
            }
        }
        if let Some(stock) = self.stock {
            if stock < 0 {
                errors.push(FieldError::new("stock", "Stock cannot be negative"));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(errors))
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct ProductList {
    #[schema(value_type = Vec<Product>)]
    pub items: Vec<Product>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_and_stock_bounds() {
        let request = CreateProductRequest {
            category_id: Uuid::new_v4(),
            name: "Widget".into(),
            slug: None,
            description: "".into(),
            price: 0,
            stock: -1,
            featured: None,
        };
        match request.validate() {
            Err(AppError::Validation(errors)) => {
                let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, ["price", "stock"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }
}
