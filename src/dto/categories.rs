use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{AppError, AppResult, FieldError};

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCategoryRequest {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
}

impl CreateCategoryRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.name.trim().is_empty() || self.name.len() > 100 {
            return Err(AppError::Validation(vec![FieldError::new(
                "name",
                "Name must be between 1 and 100 characters",
            )]));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

impl UpdateCategoryRequest {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(name) = self.name.as_deref() {
            if name.trim().is_empty() || name.len() > 100 {
                return Err(AppError::Validation(vec![FieldError::new(
                    "name",
                    "Name must be between 1 and 100 characters",
                )]));
            }
        }
        Ok(())
    }
}

/// Category plus its cached count of active products.
#[derive(Debug, Serialize, ToSchema)]
pub struct CategoryDto {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub description: String,
    pub is_active: bool,
    pub product_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct CategoryList {
    #[schema(value_type = Vec<CategoryDto>)]
    pub items: Vec<CategoryDto>,
}
