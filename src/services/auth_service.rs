use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use password_hash::rand_core::OsRng;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::auth::{
        AuthResponse, ChangePasswordRequest, Claims, LoginRequest, LogoutRequest, ROLE_CUSTOMER,
        RefreshRequest, SignupRequest, TokenPair, UpdateProfileRequest,
    },
    error::{AppError, AppResult, FieldError},
    middleware::auth::{AuthUser, TOKEN_TYPE_ACCESS, TOKEN_TYPE_REFRESH},
    models::User,
    response::{ApiResponse, Meta},
    state::AppState,
};

const LOGIN_MAX_ATTEMPTS: u64 = 5;
const LOGIN_WINDOW: std::time::Duration = std::time::Duration::from_secs(15 * 60);
const ACCESS_TOKEN_HOURS: i64 = 24;
const REFRESH_TOKEN_DAYS: i64 = 7;

#[derive(sqlx::FromRow)]
struct UserRecord {
    id: Uuid,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    phone: String,
    address: String,
    is_verified: bool,
    created_at: DateTime<Utc>,
}

impl UserRecord {
    fn into_api(self) -> User {
        User {
            id: self.id,
            username: self.username,
            email: self.email,
            role: self.role,
            phone: self.phone,
            address: self.address,
            is_verified: self.is_verified,
            created_at: self.created_at,
        }
    }
}

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, phone, address, is_verified, created_at";

pub async fn signup(state: &AppState, payload: SignupRequest) -> AppResult<ApiResponse<AuthResponse>> {
    payload.validate()?;

    let email = payload.email.to_lowercase();
    let email_taken: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM users WHERE email = $1")
        .bind(email.as_str())
        .fetch_optional(&state.pool)
        .await?;
    if email_taken.is_some() {
        return Err(AppError::Validation(vec![FieldError::new(
            "email",
            "Email already registered",
        )]));
    }

    let username_taken: Option<(Uuid,)> =
        sqlx::query_as("SELECT id FROM users WHERE username = $1")
            .bind(payload.username.as_str())
            .fetch_optional(&state.pool)
            .await?;
    if username_taken.is_some() {
        return Err(AppError::Validation(vec![FieldError::new(
            "username",
            "Username already taken",
        )]));
    }

    let password_hash = hash_password(&payload.password)?;
    let id = Uuid::new_v4();

    let record: UserRecord = sqlx::query_as(&format!(
        r#"
        INSERT INTO users (id, username, email, password_hash, role, phone, address)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {USER_COLUMNS}
        "#,
    ))
    .bind(id)
    .bind(payload.username.as_str())
    .bind(email.as_str())
    .bind(password_hash)
    .bind(ROLE_CUSTOMER)
    .bind(payload.phone.unwrap_or_default())
    .bind(payload.address.unwrap_or_default())
    .fetch_one(&state.pool)
    .await?;

    let secret = jwt_secret()?;
    let tokens = issue_token_pair(&secret, record.id, &record.role)?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(record.id),
        "user_signup",
        Some("users"),
        Some(serde_json::json!({ "user_id": record.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    tracing::info!(username = %record.username, "new user registered");

    Ok(ApiResponse::success(
        "User registered successfully",
        AuthResponse {
            user: record.into_api(),
            tokens,
        },
        None,
    ))
}

pub async fn login(state: &AppState, payload: LoginRequest) -> AppResult<ApiResponse<AuthResponse>> {
    let attempt_key = login_attempt_key(&payload.username);
    if state.cache.get_count(&attempt_key) >= LOGIN_MAX_ATTEMPTS {
        return Err(AppError::TooManyRequests(
            "Too many login attempts. Try again in 15 minutes.".into(),
        ));
    }

    let record: Option<UserRecord> = sqlx::query_as(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
    ))
    .bind(payload.username.as_str())
    .fetch_optional(&state.pool)
    .await?;

    let valid = record
        .as_ref()
        .is_some_and(|r| verify_password(&r.password_hash, &payload.password));

    let record = match record {
        Some(record) if valid => record,
        _ => {
            state.cache.incr(&attempt_key, LOGIN_WINDOW);
            return Err(AppError::Unauthorized("Invalid credentials".into()));
        }
    };

    state.cache.delete(&attempt_key);

    let secret = jwt_secret()?;
    let tokens = issue_token_pair(&secret, record.id, &record.role)?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(record.id),
        "user_login",
        Some("users"),
        Some(serde_json::json!({ "user_id": record.id })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    tracing::info!(username = %record.username, "user logged in");

    Ok(ApiResponse::success(
        "Login successful",
        AuthResponse {
            user: record.into_api(),
            tokens,
        },
        Some(Meta::empty()),
    ))
}

pub async fn refresh(state: &AppState, payload: RefreshRequest) -> AppResult<ApiResponse<TokenPair>> {
    let secret = jwt_secret()?;
    let claims = decode_claims(&secret, &payload.refresh)?;
    if claims.token_type != TOKEN_TYPE_REFRESH {
        return Err(AppError::Unauthorized("Refresh token required".into()));
    }
    if state.cache.contains(&blacklist_key(&claims.jti)) {
        return Err(AppError::Unauthorized("Token has been revoked".into()));
    }

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;
    let record: Option<UserRecord> =
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user_id)
            .fetch_optional(&state.pool)
            .await?;
    let record = match record {
        Some(r) => r,
        None => return Err(AppError::Unauthorized("Unknown user".into())),
    };

    let tokens = issue_token_pair(&secret, record.id, &record.role)?;
    Ok(ApiResponse::success(
        "Token refreshed",
        tokens,
        Some(Meta::empty()),
    ))
}

pub async fn logout(state: &AppState, user: &AuthUser, payload: LogoutRequest) -> AppResult<ApiResponse<serde_json::Value>> {
    let secret = jwt_secret()?;
    let claims = decode_claims(&secret, &payload.refresh)?;
    if claims.token_type != TOKEN_TYPE_REFRESH {
        return Err(AppError::BadRequest("Refresh token required".into()));
    }

    // Blacklist for the token's remaining lifetime; after that the exp check
    // rejects it anyway.
    let remaining = (claims.exp as i64 - Utc::now().timestamp()).max(0) as u64;
    state.cache.set(
        &blacklist_key(&claims.jti),
        "revoked",
        Some(std::time::Duration::from_secs(remaining)),
    );

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "user_logout",
        Some("users"),
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(ApiResponse::success(
        "Logout successful",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn get_profile(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let record: Option<UserRecord> =
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user.user_id)
            .fetch_optional(&state.pool)
            .await?;
    let record = match record {
        Some(r) => r,
        None => return Err(AppError::NotFound),
    };
    Ok(ApiResponse::success("OK", record.into_api(), None))
}

pub async fn update_profile(
    state: &AppState,
    user: &AuthUser,
    payload: UpdateProfileRequest,
) -> AppResult<ApiResponse<User>> {
    payload.validate()?;

    let existing: Option<UserRecord> =
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user.user_id)
            .fetch_optional(&state.pool)
            .await?;
    let existing = match existing {
        Some(r) => r,
        None => return Err(AppError::NotFound),
    };

    let email = payload
        .email
        .map(|e| e.to_lowercase())
        .unwrap_or(existing.email);
    if !email.is_empty() {
        let taken: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM users WHERE email = $1 AND id <> $2")
                .bind(email.as_str())
                .bind(user.user_id)
                .fetch_optional(&state.pool)
                .await?;
        if taken.is_some() {
            return Err(AppError::Validation(vec![FieldError::new(
                "email",
                "Email already registered",
            )]));
        }
    }
    let phone = payload.phone.unwrap_or(existing.phone);
    let address = payload.address.unwrap_or(existing.address);

    let record: UserRecord = sqlx::query_as(&format!(
        r#"
        UPDATE users
        SET email = $2, phone = $3, address = $4, updated_at = now()
        WHERE id = $1
        RETURNING {USER_COLUMNS}
        "#,
    ))
    .bind(user.user_id)
    .bind(email.as_str())
    .bind(phone)
    .bind(address)
    .fetch_one(&state.pool)
    .await?;

    Ok(ApiResponse::success(
        "Profile updated successfully",
        record.into_api(),
        Some(Meta::empty()),
    ))
}

pub async fn change_password(
    state: &AppState,
    user: &AuthUser,
    payload: ChangePasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    payload.validate()?;

    let record: Option<UserRecord> =
        sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(user.user_id)
            .fetch_optional(&state.pool)
            .await?;
    let record = match record {
        Some(r) => r,
        None => return Err(AppError::NotFound),
    };

    if !verify_password(&record.password_hash, &payload.old_password) {
        return Err(AppError::BadRequest("Old password is incorrect".into()));
    }

    let password_hash = hash_password(&payload.new_password)?;
    sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
        .bind(user.user_id)
        .bind(password_hash)
        .execute(&state.pool)
        .await?;

    if let Err(err) = log_audit(
        &state.pool,
        Some(user.user_id),
        "password_change",
        Some("users"),
        None,
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    tracing::info!(username = %record.username, "password changed");

    Ok(ApiResponse::success(
        "Password changed successfully",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))?
        .to_string();
    Ok(hash)
}

pub fn verify_password(hash: &str, password: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

pub fn issue_token_pair(secret: &str, user_id: Uuid, role: &str) -> AppResult<TokenPair> {
    let access = issue_token(
        secret,
        user_id,
        role,
        TOKEN_TYPE_ACCESS,
        Duration::hours(ACCESS_TOKEN_HOURS),
    )?;
    let refresh = issue_token(
        secret,
        user_id,
        role,
        TOKEN_TYPE_REFRESH,
        Duration::days(REFRESH_TOKEN_DAYS),
    )?;
    Ok(TokenPair { access, refresh })
}

fn issue_token(
    secret: &str,
    user_id: Uuid,
    role: &str,
    token_type: &str,
    lifetime: Duration,
) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(lifetime)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: expiration.timestamp() as usize,
        token_type: token_type.to_string(),
        jti: Uuid::new_v4().to_string(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn decode_claims(secret: &str, token: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))
}

fn jwt_secret() -> AppResult<String> {
    std::env::var("JWT_SECRET")
        .map_err(|_| AppError::Internal(anyhow::anyhow!("JWT_SECRET is not set")))
}

fn login_attempt_key(username: &str) -> String {
    format!("login_attempts_{username}")
}

fn blacklist_key(jti: &str) -> String {
    format!("token_blacklist_{jti}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_pair_roundtrip() {
        let secret = "unit-test-secret";
        let user_id = Uuid::new_v4();
        let pair = issue_token_pair(secret, user_id, "customer").unwrap();

        let access = decode_claims(secret, &pair.access).unwrap();
        assert_eq!(access.sub, user_id.to_string());
        assert_eq!(access.role, "customer");
        assert_eq!(access.token_type, TOKEN_TYPE_ACCESS);

        let refresh = decode_claims(secret, &pair.refresh).unwrap();
        assert_eq!(refresh.token_type, TOKEN_TYPE_REFRESH);
        assert_ne!(access.jti, refresh.jti);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let pair = issue_token_pair("secret-a", Uuid::new_v4(), "owner").unwrap();
        assert!(decode_claims("secret-b", &pair.access).is_err());
    }

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password(&hash, "correct horse"));
        assert!(!verify_password(&hash, "wrong horse"));
    }
}
