use axum_storefront_api::{
    config::AppConfig,
    db::{create_orm_conn, create_pool, run_migrations},
    services::auth_service::hash_password,
};
use uuid::Uuid;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;

    let orm = create_orm_conn(&config.database_url).await?;
    run_migrations(&orm).await?;

    let pool = create_pool(&config.database_url).await?;

    let owner_id = ensure_user(&pool, "storeowner", "owner@example.com", "owner123!", "owner").await?;
    let customer_id =
        ensure_user(&pool, "ferris", "ferris@example.com", "customer123!", "customer").await?;
    seed_catalog(&pool).await?;

    println!("Seed completed. Owner ID: {owner_id}, Customer ID: {customer_id}");
    Ok(())
}

async fn ensure_user(
    pool: &sqlx::PgPool,
    username: &str,
    email: &str,
    password: &str,
    role: &str,
) -> anyhow::Result<Uuid> {
    let password_hash = hash_password(password).map_err(|e| anyhow::anyhow!(e.to_string()))?;

    let row: (Uuid,) = sqlx::query_as(
        r#"
        INSERT INTO users (id, username, email, password_hash, role)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (email) DO UPDATE SET role = EXCLUDED.role
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(role)
    .fetch_one(pool)
    .await?;

    println!("Ensured user {email} (role={role})");
    Ok(row.0)
}

async fn seed_catalog(pool: &sqlx::PgPool) -> anyhow::Result<()> {
    let categories = vec![
        ("Apparel", "apparel", "Things to wear"),
        ("Mugs", "mugs", "Things to drink from"),
        ("Stickers", "stickers", "Things to stick"),
    ];

    for (name, slug, description) in categories {
        sqlx::query(
            r#"
            INSERT INTO categories (id, name, slug, description)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(slug)
        .bind(description)
        .execute(pool)
        .await?;
    }

    let products = vec![
        ("apparel", "Axum Hoodie", "axum-hoodie", "Warm hoodie for Rustaceans", 550000_i64, 50, true),
        ("mugs", "Ferris Mug", "ferris-mug", "Coffee tastes better with Ferris", 120000, 100, true),
        ("stickers", "Rust Sticker Pack", "rust-sticker-pack", "Decorate your laptop", 50000, 200, false),
        ("apparel", "Borrow Checker Tee", "borrow-checker-tee", "One owner at a time", 250000, 75, false),
    ];

    for (category_slug, name, slug, description, price, stock, featured) in products {
        sqlx::query(
            r#"
            INSERT INTO products (id, category_id, name, slug, description, price, stock, featured)
            SELECT $1, c.id, $2, $3, $4, $5, $6, $7
            FROM categories c
            WHERE c.slug = $8
            ON CONFLICT (slug) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(slug)
        .bind(description)
        .bind(price)
        .bind(stock)
        .bind(featured)
        .bind(category_slug)
        .execute(pool)
        .await?;
    }

    println!("Seeded catalog");
    Ok(())
}
