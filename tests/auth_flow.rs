use axum_storefront_api::{
    cache::Cache,
    db::{create_orm_conn, create_pool, run_migrations},
    dto::auth::{
        ChangePasswordRequest, LoginRequest, LogoutRequest, RefreshRequest, SignupRequest,
        UpdateProfileRequest,
    },
    error::AppError,
    mailer::{Mailer, MemoryMailer},
    middleware::auth::AuthUser,
    services::{
        auth_service,
        notification_service::{Notifier, NotifyConfig},
    },
    state::AppState,
};
use sea_orm::{ConnectionTrait, Statement};
use std::time::Duration;

// Signup, login rate limiting, token refresh/revocation and password change.
#[tokio::test]
async fn signup_login_and_rate_limit_flow() -> anyhow::Result<()> {
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

    // SAFETY: single-threaded at this point; the services read the secret per call.
    unsafe { std::env::set_var("JWT_SECRET", "integration-test-secret") };

    let state = setup_state(&database_url).await?;

    // Field-level validation failures come back together.
    let invalid = auth_service::signup(
        &state,
        SignupRequest {
            username: "ab".into(),
            email: "nope".into(),
            password: "short".into(),
            phone: None,
            address: None,
        },
    )
    .await;
    assert!(matches!(invalid, Err(AppError::Validation(_))));

    let registered = auth_service::signup(
        &state,
        SignupRequest {
            username: "ferris".into(),
            email: "Ferris@Example.com".into(),
            password: "correct horse".into(),
            phone: Some("+4915112345678".into()),
            address: Some("1 Crab Lane".into()),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(registered.user.email, "ferris@example.com");
    assert_eq!(registered.user.role, "customer");

    let duplicate = auth_service::signup(
        &state,
        SignupRequest {
            username: "ferris2".into(),
            email: "ferris@example.com".into(),
            password: "correct horse".into(),
            phone: None,
            address: None,
        },
    )
    .await;
    assert!(matches!(duplicate, Err(AppError::Validation(_))));

    // Five failures lock the account name out, even for the right password.
    for _ in 0..5 {
        let failed = auth_service::login(
            &state,
            LoginRequest {
                username: "ferris".into(),
                password: "wrong horse".into(),
            },
        )
        .await;
        assert!(matches!(failed, Err(AppError::Unauthorized(_))));
    }
    let locked_out = auth_service::login(
        &state,
        LoginRequest {
            username: "ferris".into(),
            password: "correct horse".into(),
        },
    )
    .await;
    assert!(matches!(locked_out, Err(AppError::TooManyRequests(_))));

    // Window expiry (simulated) lets the user back in; success resets the counter.
    state.cache.delete("login_attempts_ferris");
    let logged_in = auth_service::login(
        &state,
        LoginRequest {
            username: "ferris".into(),
            password: "correct horse".into(),
        },
    )
    .await?
    .data
    .unwrap();

    let user = AuthUser {
        user_id: logged_in.user.id,
        role: logged_in.user.role.clone(),
    };

    // Refresh issues a new pair until the token is revoked on logout.
    let refreshed = auth_service::refresh(
        &state,
        RefreshRequest {
            refresh: logged_in.tokens.refresh.clone(),
        },
    )
    .await?;
    assert!(refreshed.data.is_some());

    auth_service::logout(
        &state,
        &user,
        LogoutRequest {
            refresh: logged_in.tokens.refresh.clone(),
        },
    )
    .await?;
    let revoked = auth_service::refresh(
        &state,
        RefreshRequest {
            refresh: logged_in.tokens.refresh.clone(),
        },
    )
    .await;
    assert!(matches!(revoked, Err(AppError::Unauthorized(_))));

    // Profile updates stick.
    let profile = auth_service::update_profile(
        &state,
        &user,
        UpdateProfileRequest {
            email: None,
            phone: Some("+4915100000000".into()),
            address: Some("2 Shell Street".into()),
        },
    )
    .await?
    .data
    .unwrap();
    assert_eq!(profile.phone, "+4915100000000");
    let fetched = auth_service::get_profile(&state, &user).await?.data.unwrap();
    assert_eq!(fetched.address, "2 Shell Street");

    // Password change requires the old password.
    let wrong_old = auth_service::change_password(
        &state,
        &user,
        ChangePasswordRequest {
            old_password: "wrong horse".into(),
            new_password: "battery staple".into(),
        },
    )
    .await;
    assert!(matches!(wrong_old, Err(AppError::BadRequest(_))));

    auth_service::change_password(
        &state,
        &user,
        ChangePasswordRequest {
            old_password: "correct horse".into(),
            new_password: "battery staple".into(),
        },
    )
    .await?;

    let relogin = auth_service::login(
        &state,
        LoginRequest {
            username: "ferris".into(),
            password: "battery staple".into(),
        },
    )
    .await?;
    assert!(relogin.data.is_some());

    Ok(())
}

async fn setup_state(database_url: &str) -> anyhow::Result<AppState> {
    let pool = create_pool(database_url).await?;
    let orm = create_orm_conn(database_url).await?;
    run_migrations(&orm).await?;

    let backend = orm.get_database_backend();
    orm.execute(Statement::from_string(
        backend,
        "TRUNCATE TABLE order_items, orders, cart_items, carts, audit_logs, products, categories, users RESTART IDENTITY CASCADE",
    ))
    .await?;

    let notifier = Notifier::spawn(
        orm.clone(),
        Mailer::Memory(MemoryMailer::new()),
        NotifyConfig {
            mail_from: "orders@storefront.test".into(),
            max_attempts: 3,
            retry_base: Duration::from_millis(1),
        },
    );

    Ok(AppState {
        pool,
        orm,
        cache: Cache::new(),
        notifier,
    })
}
