use axum_storefront_api::{
    cache::Cache,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::{
        cart::{AddItemRequest, UpdateItemRequest},
        orders::{CreateOrderRequest, UpdateOrderStatusRequest},
        products::UpdateProductRequest,
    },
    entity::{
        categories::ActiveModel as CategoryActive, products::ActiveModel as ProductActive,
        users::ActiveModel as UserActive,
    },
    error::AppError,
    mailer::{Mailer, MemoryMailer},
    middleware::auth::AuthUser,
    routes::params::{Pagination, ProductQuery},
    services::{
        cart_service,
        notification_service::{Notifier, NotifyConfig},
        order_service, product_service,
    },
    state::AppState,
};
use sea_orm::ActiveValue::NotSet;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set, Statement};
use std::time::Duration;
use uuid::Uuid;

// Integration flow: cart -> order with snapshots, stock decrement, owner-only
// status updates and soft-delete visibility.
#[tokio::test]
async fn cart_checkout_and_status_flow() -> anyhow::Result<()> {
    // Allow skipping when no DB is configured in the environment.
    let database_url =
        match std::env::var("TEST_DATABASE_URL").or_else(|_| std::env::var("DATABASE_URL")) {
            Ok(url) => url,
            Err(_) => {
                eprintln!(
                    "Skipping test: set TEST_DATABASE_URL or DATABASE_URL to run integration flow tests."
                );
                return Ok(());
            }
        };

    let (state, mailbox) = setup_state(&database_url).await?;

    let customer_id = create_user(&state, "customer", "buyer", "buyer@example.com").await?;
    let bystander_id = create_user(&state, "customer", "bystander", "bystander@example.com").await?;
    let owner_id = create_user(&state, "owner", "storeowner", "owner@example.com").await?;

    let category_id = create_category(&state, "Mugs", "mugs").await?;
    let product = ProductActive {
        id: Set(Uuid::new_v4()),
        category_id: Set(category_id),
        name: Set("Ferris Mug".into()),
        slug: Set("ferris-mug".into()),
        description: Set("Coffee tastes better with Ferris".into()),
        price: Set(1000),
        stock: Set(10),
        is_active: Set(true),
        featured: Set(false),
        created_by: Set(Some(owner_id)),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    let customer = AuthUser {
        user_id: customer_id,
        role: "customer".into(),
    };
    let bystander = AuthUser {
        user_id: bystander_id,
        role: "customer".into(),
    };
    let owner = AuthUser {
        user_id: owner_id,
        role: "owner".into(),
    };

    // Add to cart, then try to merge past the available stock.
    cart_service::add_item(
        &state,
        &customer,
        AddItemRequest {
            product_id: product.id,
            quantity: 2,
        },
    )
    .await?;

    let over_stock = cart_service::add_item(
        &state,
        &customer,
        AddItemRequest {
            product_id: product.id,
            quantity: 9,
        },
    )
    .await;
    assert!(matches!(over_stock, Err(AppError::BadRequest(_))));

    // Setting a quantity above stock is also rejected; a valid set sticks.
    let cart = cart_service::get_cart(&state, &customer).await?.data.unwrap();
    let line_id = cart.items[0].id;
    let too_many = cart_service::update_item(
        &state,
        &customer,
        line_id,
        UpdateItemRequest { quantity: 11 },
    )
    .await;
    assert!(matches!(too_many, Err(AppError::BadRequest(_))));
    cart_service::update_item(&state, &customer, line_id, UpdateItemRequest { quantity: 3 })
        .await?;

    // An empty cart cannot be ordered.
    let empty = order_service::create_order(&state, &bystander, order_request()).await;
    assert!(matches!(empty, Err(AppError::BadRequest(_))));

    // Place the order.
    let placed = order_service::create_order(&state, &customer, order_request())
        .await?
        .data
        .unwrap();
    assert_eq!(placed.order.status, "pending");
    assert_eq!(placed.order.total_amount, 3000);
    assert_eq!(placed.items.len(), 1);
    assert_eq!(placed.items[0].product_name, "Ferris Mug");
    assert_eq!(placed.items[0].subtotal, 3000);

    // Cart is emptied and stock decremented by exactly the ordered quantity.
    let cart = cart_service::get_cart(&state, &customer).await?.data.unwrap();
    assert!(cart.items.is_empty());
    let restocked = product_service::get_product(&state, Some(&owner), product.id)
        .await?
        .data
        .unwrap();
    assert_eq!(restocked.stock, 7);

    // Later product edits leave the snapshots untouched.
    product_service::update_product(
        &state,
        &owner,
        product.id,
        UpdateProductRequest {
            category_id: None,
            name: Some("Crab Cup".into()),
            slug: None,
            description: None,
            price: Some(9999),
            stock: None,
            is_active: None,
            featured: None,
        },
    )
    .await?;
    let reread = order_service::get_order(&state, &customer, placed.order.id)
        .await?
        .data
        .unwrap();
    assert_eq!(reread.items[0].product_name, "Ferris Mug");
    assert_eq!(reread.items[0].price, 1000);
    assert_eq!(reread.items[0].subtotal, 3000);

    // Status updates are owner-only and unordered.
    let forbidden = order_service::update_status(
        &state,
        &customer,
        placed.order.id,
        UpdateOrderStatusRequest {
            status: "shipped".into(),
        },
    )
    .await;
    assert!(matches!(forbidden, Err(AppError::Forbidden)));

    let shipped = order_service::update_status(
        &state,
        &owner,
        placed.order.id,
        UpdateOrderStatusRequest {
            status: "delivered".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(shipped.status, "delivered");

    let rewound = order_service::update_status(
        &state,
        &owner,
        placed.order.id,
        UpdateOrderStatusRequest {
            status: "pending".into(),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(rewound.status, "pending");

    let bogus = order_service::update_status(
        &state,
        &owner,
        placed.order.id,
        UpdateOrderStatusRequest {
            status: "teleported".into(),
        },
    )
    .await;
    assert!(matches!(bogus, Err(AppError::BadRequest(_))));

    // Soft delete hides the product from the public but not from owners.
    product_service::delete_product(&state, &owner, product.id).await?;
    let public = product_service::get_product(&state, None, product.id).await;
    assert!(matches!(public, Err(AppError::NotFound)));
    let for_owner = product_service::get_product(&state, Some(&owner), product.id)
        .await?
        .data
        .unwrap();
    assert!(!for_owner.is_active);

    let public_list = product_service::list_products(&state, None, product_query())
        .await?
        .data
        .unwrap();
    assert!(public_list.items.iter().all(|p| p.id != product.id));
    let owner_list = product_service::list_products(&state, Some(&owner), product_query())
        .await?
        .data
        .unwrap();
    assert!(owner_list.items.iter().any(|p| p.id == product.id));

    // The background worker delivers the confirmation email.
    let mut confirmation_seen = false;
    for _ in 0..100 {
        if mailbox
            .sent()
            .iter()
            .any(|m| m.subject.starts_with("Order Confirmation"))
        {
            confirmation_seen = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(confirmation_seen, "expected an order confirmation email");

    Ok(())
}

fn order_request() -> CreateOrderRequest {
    CreateOrderRequest {
        payment_method: "cod".into(),
        shipping_address: "1 Crab Lane".into(),
        phone: "+4915112345678".into(),
        notes: None,
    }
}

fn product_query() -> ProductQuery {
    ProductQuery {
        pagination: Pagination {
            page: Some(1),
            per_page: Some(50),
        },
        q: None,
        category: None,
        min_price: None,
        max_price: None,
        in_stock: None,
        featured: None,
        sort_by: None,
        sort_order: None,
    }
}

async fn setup_state(database_url: &str) -> anyhow::Result<(AppState, MemoryMailer)> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    // Clean tables between runs
    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, cart_items, carts, audit_logs, products, categories, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    let mailbox = MemoryMailer::new();
    let notifier = Notifier::spawn(
        orm.clone(),
        Mailer::Memory(mailbox.clone()),
        NotifyConfig {
            mail_from: "orders@storefront.test".into(),
            max_attempts: 3,
            retry_base: Duration::from_millis(1),
        },
    );

    Ok((
        AppState {
            pool,
            orm,
            cache: Cache::new(),
            notifier,
        },
        mailbox,
    ))
}

async fn create_user(
    state: &AppState,
    role: &str,
    username: &str,
    email: &str,
) -> anyhow::Result<Uuid> {
    let user = UserActive {
        id: Set(Uuid::new_v4()),
        username: Set(username.to_string()),
        email: Set(email.to_string()),
        password_hash: Set("dummy".into()),
        role: Set(role.into()),
        phone: Set(String::new()),
        address: Set(String::new()),
        is_verified: Set(false),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(user.id)
}

async fn create_category(state: &AppState, name: &str, slug: &str) -> anyhow::Result<Uuid> {
    let category = CategoryActive {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        slug: Set(slug.to_string()),
        description: Set(String::new()),
        is_active: Set(true),
        created_at: NotSet,
        updated_at: NotSet,
    }
    .insert(&state.orm)
    .await?;

    Ok(category.id)
}
