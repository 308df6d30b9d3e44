use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::sea_query::extension::postgres::PgExpr;
use sea_orm::{
    ActiveModelTrait, ActiveValue::NotSet, ColumnTrait, Condition, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use uuid::Uuid;

use crate::{
    audit::log_audit,
    cache::Cache,
    dto::categories::{CategoryDto, CategoryList, CreateCategoryRequest, UpdateCategoryRequest},
    entity::{
        categories::{ActiveModel as CategoryActive, Column, Entity as Categories, Model as CategoryModel},
        products::{Column as ProdCol, Entity as Products},
    },
    error::{AppError, AppResult, FieldError},
    middleware::auth::{AuthUser, ensure_owner, is_owner},
    response::{ApiResponse, Meta},
    routes::params::CategoryQuery,
    slug::slugify,
    state::AppState,
};

const PRODUCT_COUNT_TTL: std::time::Duration = std::time::Duration::from_secs(300);

pub async fn list_categories(
    state: &AppState,
    viewer: Option<&AuthUser>,
    query: CategoryQuery,
) -> AppResult<ApiResponse<CategoryList>> {
    let (page, limit, offset) = query.pagination.normalize();
    let mut condition = Condition::all();
    if !is_owner(viewer) {
        condition = condition.add(Column::IsActive.eq(true));
    }
    if let Some(search) = query.q.as_ref().filter(|s| !s.is_empty()) {
        let pattern = format!("%{}%", search);
        condition = condition.add(
            Condition::any()
                .add(Expr::col(Column::Name).ilike(pattern.clone()))
                .add(Expr::col(Column::Description).ilike(pattern)),
        );
    }

    let finder = Categories::find()
        .filter(condition)
        .order_by_asc(Column::Name);

    let total = finder.clone().count(&state.orm).await? as i64;

    let models = finder
        .limit(limit as u64)
        .offset(offset as u64)
        .all(&state.orm)
        .await?;

    let mut items = Vec::with_capacity(models.len());
    for model in models {
        items.push(category_dto(state, model).await?);
    }

    let meta = Meta::new(page, limit, total);
    Ok(ApiResponse::success(
        "Categories",
        CategoryList { items },
        Some(meta),
    ))
}

pub async fn get_category(
    state: &AppState,
    viewer: Option<&AuthUser>,
    id: Uuid,
) -> AppResult<ApiResponse<CategoryDto>> {
    let model = Categories::find_by_id(id).one(&state.orm).await?;
    let model = match model {
        Some(m) if m.is_active || is_owner(viewer) => m,
        _ => return Err(AppError::NotFound),
    };
    let dto = category_dto(state, model).await?;
    Ok(ApiResponse::success("Category", dto, None))
}

pub async fn create_category(
    state: &AppState,
    user: &AuthUser,
    payload: CreateCategoryRequest,
) -> AppResult<ApiResponse<CategoryDto>> {
    ensure_owner(user)?;
    payload.validate()?;

    let slug = payload
        .slug
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| slugify(&payload.name));
    if slug.is_empty() {
        return Err(AppError::Validation(vec![FieldError::new(
            "slug",
            "Could not derive a slug from the name",
        )]));
    }
    ensure_unique(state, &payload.name, &slug, None).await?;

    let active = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(payload.name),
        slug: Set(slug),
        description: Set(payload.description.unwrap_or_default()),
        is_active: Set(true),
        created_at: NotSet,
        updated_at: NotSet,
    };
    let model = active.insert(&state.orm).await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "category_create",
        Some("categories"),
        Some(serde_json::json!({ "category_id": model.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let dto = category_dto(state, model).await?;
    Ok(ApiResponse::success(
        "Category created",
        dto,
        Some(Meta::empty()),
    ))
}

pub async fn update_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateCategoryRequest,
) -> AppResult<ApiResponse<CategoryDto>> {
    ensure_owner(user)?;
    payload.validate()?;

    let existing = Categories::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(m) => m,
        None => return Err(AppError::NotFound),
    };

    let name = payload.name.clone().unwrap_or_else(|| existing.name.clone());
    let slug = payload.slug.clone().unwrap_or_else(|| existing.slug.clone());
    if name != existing.name || slug != existing.slug {
        ensure_unique(state, &name, &slug, Some(existing.id)).await?;
    }

    let mut active: CategoryActive = existing.into();
    active.name = Set(name);
    active.slug = Set(slug);
    if let Some(description) = payload.description {
        active.description = Set(description);
    }
    if let Some(is_active) = payload.is_active {
        active.is_active = Set(is_active);
    }
    active.updated_at = Set(Utc::now().into());
    let model = active.update(&state.orm).await?;

    invalidate_product_count(&state.cache, model.id);

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "category_update",
        Some("categories"),
        Some(serde_json::json!({ "category_id": model.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let dto = category_dto(state, model).await?;
    Ok(ApiResponse::success("Updated", dto, Some(Meta::empty())))
}

/// Soft delete. The row stays behind `is_active = false` so existing products
/// keep their category reference.
pub async fn delete_category(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    ensure_owner(user)?;
    let existing = Categories::find_by_id(id).one(&state.orm).await?;
    let existing = match existing {
        Some(m) => m,
        None => return Err(AppError::NotFound),
    };

    let mut active: CategoryActive = existing.into();
    active.is_active = Set(false);
    active.updated_at = Set(Utc::now().into());
    let model = active.update(&state.orm).await?;

    invalidate_product_count(&state.cache, model.id);

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "category_delete",
        Some("categories"),
        Some(serde_json::json!({ "category_id": id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Deleted",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Active-product count, cached for five minutes per category.
pub async fn product_count(state: &AppState, category_id: Uuid) -> AppResult<i64> {
    let key = product_count_key(category_id);
    if let Some(cached) = state.cache.get(&key) {
        if let Ok(count) = cached.parse::<i64>() {
            return Ok(count);
        }
    }

    let count = Products::find()
        .filter(
            Condition::all()
                .add(ProdCol::CategoryId.eq(category_id))
                .add(ProdCol::IsActive.eq(true)),
        )
        .count(&state.orm)
        .await? as i64;

    state
        .cache
        .set(&key, count.to_string(), Some(PRODUCT_COUNT_TTL));
    Ok(count)
}

pub fn invalidate_product_count(cache: &Cache, category_id: Uuid) {
    cache.delete(&product_count_key(category_id));
}

fn product_count_key(category_id: Uuid) -> String {
    format!("category_{category_id}_product_count")
}

async fn ensure_unique(
    state: &AppState,
    name: &str,
    slug: &str,
    exclude: Option<Uuid>,
) -> AppResult<()> {
    let mut condition = Condition::any()
        .add(Column::Name.eq(name))
        .add(Column::Slug.eq(slug));
    if let Some(id) = exclude {
        condition = Condition::all()
            .add(condition)
            .add(Column::Id.ne(id));
    }
    let clash = Categories::find().filter(condition).one(&state.orm).await?;
    if let Some(clash) = clash {
        let field = if clash.name == name { "name" } else { "slug" };
        return Err(AppError::Validation(vec![FieldError::new(
            field,
            format!("Category {field} already exists"),
        )]));
    }
    Ok(())
}

async fn category_dto(state: &AppState, model: CategoryModel) -> AppResult<CategoryDto> {
    let count = product_count(state, model.id).await?;
    Ok(CategoryDto {
        id: model.id,
        name: model.name,
        slug: model.slug,
        description: model.description,
        is_active: model.is_active,
        product_count: count,
        created_at: model.created_at.with_timezone(&Utc),
        updated_at: model.updated_at.with_timezone(&Utc),
    })
}
