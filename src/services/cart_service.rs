use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::cart::{AddItemRequest, CartDto, CartItemDto, UpdateItemRequest},
    error::{AppError, AppResult},
    middleware::auth::AuthUser,
    models::Product,
    response::{ApiResponse, Meta},
    state::AppState,
};

#[derive(FromRow)]
struct CartRow {
    id: Uuid,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct CartLineRow {
    item_id: Uuid,
    quantity: i32,
    product_id: Uuid,
    category_id: Uuid,
    name: String,
    slug: String,
    description: String,
    price: i64,
    stock: i32,
    is_active: bool,
    featured: bool,
    product_created_at: DateTime<Utc>,
    product_updated_at: DateTime<Utc>,
}

const CART_LINE_SELECT: &str = r#"
    SELECT ci.id AS item_id, ci.quantity,
           p.id AS product_id, p.category_id, p.name, p.slug, p.description,
           p.price, p.stock, p.is_active, p.featured,
           p.created_at AS product_created_at, p.updated_at AS product_updated_at
    FROM cart_items ci
    JOIN products p ON p.id = ci.product_id
"#;

pub async fn get_cart(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<CartDto>> {
    let mut conn = state.pool.acquire().await?;
    let cart = ensure_cart(&mut *conn, user.user_id).await?;
    drop(conn);

    let dto = load_cart_dto(state, cart).await?;
    Ok(ApiResponse::success("OK", dto, Some(Meta::empty())))
}

pub async fn add_item(
    state: &AppState,
    user: &AuthUser,
    payload: AddItemRequest,
) -> AppResult<ApiResponse<CartItemDto>> {
    if payload.quantity <= 0 {
        return Err(AppError::BadRequest(
            "quantity must be greater than 0".to_string(),
        ));
    }

    let mut txn = state.pool.begin().await?;

    let cart = ensure_cart(&mut *txn, user.user_id).await?;
    // Serializes concurrent mutations of the same user's cart.
    sqlx::query("SELECT id FROM carts WHERE id = $1 FOR UPDATE")
        .bind(cart.id)
        .execute(&mut *txn)
        .await?;

    let product: Option<(String, i32, bool)> =
        sqlx::query_as("SELECT name, stock, is_active FROM products WHERE id = $1")
            .bind(payload.product_id)
            .fetch_optional(&mut *txn)
            .await?;
    let (name, stock, is_active) = match product {
        Some(p) => p,
        None => return Err(AppError::BadRequest("Product not found".to_string())),
    };
    if !is_active {
        return Err(AppError::BadRequest("Product is not available".to_string()));
    }

    let existing: Option<(Uuid, i32)> =
        sqlx::query_as("SELECT id, quantity FROM cart_items WHERE cart_id = $1 AND product_id = $2")
            .bind(cart.id)
            .bind(payload.product_id)
            .fetch_optional(&mut *txn)
            .await?;

    let new_quantity = existing.map(|(_, q)| q).unwrap_or(0) + payload.quantity;
    if new_quantity > stock {
        return Err(AppError::BadRequest(format!(
            "Only {stock} items available in stock"
        )));
    }

    let item_id = match existing {
        Some((id, _)) => {
            sqlx::query("UPDATE cart_items SET quantity = $2 WHERE id = $1")
                .bind(id)
                .bind(new_quantity)
                .execute(&mut *txn)
                .await?;
            id
        }
        None => {
            let id = Uuid::new_v4();
            sqlx::query(
                "INSERT INTO cart_items (id, cart_id, product_id, quantity) VALUES ($1, $2, $3, $4)",
            )
            .bind(id)
            .bind(cart.id)
            .bind(payload.product_id)
            .bind(payload.quantity)
            .execute(&mut *txn)
            .await?;
            id
        }
    };

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_add",
        Some("cart_items"),
        Some(serde_json::json!({ "product_id": payload.product_id, "quantity": new_quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    tracing::info!(product = %name, quantity = new_quantity, "item added to cart");

    let item = load_line(state, item_id).await?;
    Ok(ApiResponse::success("Item added to cart", item, None))
}

pub async fn update_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
    payload: UpdateItemRequest,
) -> AppResult<ApiResponse<CartDto>> {
    let mut txn = state.pool.begin().await?;

    let cart: Option<CartRow> =
        sqlx::query_as("SELECT id, created_at FROM carts WHERE user_id = $1 FOR UPDATE")
            .bind(user.user_id)
            .fetch_optional(&mut *txn)
            .await?;
    let cart = match cart {
        Some(c) => c,
        None => return Err(AppError::NotFound),
    };

    let line: Option<(i32, String)> = sqlx::query_as(
        r#"
        SELECT p.stock, p.name
        FROM cart_items ci
        JOIN products p ON p.id = ci.product_id
        WHERE ci.id = $1 AND ci.cart_id = $2
        FOR UPDATE OF ci
        "#,
    )
    .bind(item_id)
    .bind(cart.id)
    .fetch_optional(&mut *txn)
    .await?;
    let (stock, name) = match line {
        Some(l) => l,
        None => return Err(AppError::NotFound),
    };

    let message = if payload.quantity <= 0 {
        sqlx::query("DELETE FROM cart_items WHERE id = $1")
            .bind(item_id)
            .execute(&mut *txn)
            .await?;
        tracing::info!(product = %name, "item removed from cart");
        "Item removed from cart"
    } else {
        if payload.quantity > stock {
            return Err(AppError::BadRequest(format!(
                "Only {stock} items available in stock"
            )));
        }
        sqlx::query("UPDATE cart_items SET quantity = $2 WHERE id = $1")
            .bind(item_id)
            .bind(payload.quantity)
            .execute(&mut *txn)
            .await?;
        "Cart updated"
    };

    txn.commit().await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_update",
        Some("cart_items"),
        Some(serde_json::json!({ "item_id": item_id, "quantity": payload.quantity })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let dto = load_cart_dto(state, cart).await?;
    Ok(ApiResponse::success(message, dto, Some(Meta::empty())))
}

pub async fn remove_item(
    state: &AppState,
    user: &AuthUser,
    item_id: Uuid,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query(
        r#"
        DELETE FROM cart_items ci
        USING carts c
        WHERE ci.id = $1 AND ci.cart_id = c.id AND c.user_id = $2
        "#,
    )
    .bind(item_id)
    .bind(user.user_id)
    .execute(&state.pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound);
    }

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_remove",
        Some("cart_items"),
        Some(serde_json::json!({ "item_id": item_id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Item removed from cart",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn clear_cart(
    state: &AppState,
    user: &AuthUser,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let result = sqlx::query(
        "DELETE FROM cart_items WHERE cart_id IN (SELECT id FROM carts WHERE user_id = $1)",
    )
    .bind(user.user_id)
    .execute(&state.pool)
    .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "cart_clear",
        Some("cart_items"),
        Some(serde_json::json!({ "removed": result.rows_affected() })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    tracing::info!(removed = result.rows_affected(), "cart cleared");

    Ok(ApiResponse::success(
        "Cart cleared",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

/// Get-or-create the user's singleton cart.
async fn ensure_cart(conn: &mut sqlx::PgConnection, user_id: Uuid) -> AppResult<CartRow> {
    let cart: CartRow = sqlx::query_as(
        r#"
        INSERT INTO carts (id, user_id) VALUES ($1, $2)
        ON CONFLICT (user_id) DO UPDATE SET updated_at = now()
        RETURNING id, created_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;
    Ok(cart)
}

async fn load_cart_dto(state: &AppState, cart: CartRow) -> AppResult<CartDto> {
    let rows = sqlx::query_as::<_, CartLineRow>(&format!(
        "{CART_LINE_SELECT} WHERE ci.cart_id = $1 ORDER BY ci.created_at"
    ))
    .bind(cart.id)
    .fetch_all(&state.pool)
    .await?;

    let items: Vec<CartItemDto> = rows.into_iter().map(line_dto).collect();
    let total_items = items.iter().map(|i| i.quantity as i64).sum();
    let total_amount = items.iter().map(|i| i.subtotal).sum();

    Ok(CartDto {
        id: cart.id,
        created_at: cart.created_at,
        items,
        total_items,
        total_amount,
    })
}

async fn load_line(state: &AppState, item_id: Uuid) -> AppResult<CartItemDto> {
    let row = sqlx::query_as::<_, CartLineRow>(&format!("{CART_LINE_SELECT} WHERE ci.id = $1"))
        .bind(item_id)
        .fetch_one(&state.pool)
        .await?;
    Ok(line_dto(row))
}

fn line_dto(row: CartLineRow) -> CartItemDto {
    CartItemDto {
        id: row.item_id,
        subtotal: row.price * row.quantity as i64,
        quantity: row.quantity,
        product: Product {
            id: row.product_id,
            category_id: row.category_id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            price: row.price,
            in_stock: row.stock > 0,
            stock: row.stock,
            is_active: row.is_active,
            featured: row.featured,
            created_at: row.product_created_at,
            updated_at: row.product_updated_at,
        },
    }
}
