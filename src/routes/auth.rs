use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::IntoResponse,
    routing::{get, post},
};
use bcrypt::{DEFAULT_COST, hash, verify};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::{ApiError, AppState, api_error, internal_error};
use crate::config::AppConfig;
use crate::models::{CreateUser, LoginUser, RegisterResponse, TokenResponse, User, UserResponse};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub exp: usize,
}

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/me", get(get_me))
}

async fn register(
    State(state): State<AppState>,
    Json(input): Json<CreateUser>,
) -> Result<impl IntoResponse, ApiError> {
    let full_name = input.full_name.trim();
    let email = input.email.trim();
    if full_name.is_empty() || email.is_empty() || input.password.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "full_name, email and password are required",
        ));
    }

    let existing = sqlx::query_scalar::<_, i64>("SELECT user_id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(&state.pool)
        .await
        .map_err(internal_error)?;

    if existing.is_some() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "User already exists with this email",
        ));
    }

    let hashed = hash(&input.password, DEFAULT_COST).map_err(internal_error)?;
    let role = input
        .role
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "Researcher".to_string());

    let result = sqlx::query(
        r#"INSERT INTO users (full_name, email, password_hash, institution, country, bio, research_interest, role, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(full_name)
    .bind(email)
    .bind(&hashed)
    .bind(&input.institution)
    .bind(&input.country)
    .bind(&input.bio)
    .bind(&input.research_interest)
    .bind(&role)
    .bind(Utc::now())
    .execute(&state.pool)
    .await
    .map_err(internal_error)?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = ?")
        .bind(result.last_insert_rowid())
        .fetch_one(&state.pool)
        .await
        .map_err(internal_error)?;

    tracing::info!(user_id = user.user_id, "User registered");

    let token = generate_jwt(&state.config, user.user_id)?;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user: UserResponse::from(user),
            token: TokenResponse {
                access_token: token,
                token_type: "bearer".to_string(),
            },
        }),
    ))
}

async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginUser>,
) -> Result<impl IntoResponse, ApiError> {
    if input.email.trim().is_empty() || input.password.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Please provide email and password",
        ));
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
        .bind(input.email.trim())
        .fetch_optional(&state.pool)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Invalid credentials"))?;

    let valid = verify(&input.password, &user.password_hash).map_err(internal_error)?;
    if !valid {
        return Err(api_error(StatusCode::UNAUTHORIZED, "Invalid credentials"));
    }

    let token = generate_jwt(&state.config, user.user_id)?;
    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
    }))
}

async fn get_me(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = extract_current_user(&state, &headers).await?;
    Ok(Json(UserResponse::from(user)))
}

pub async fn extract_current_user(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let auth_header = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Missing authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "Invalid authorization header"))?;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.secret_key.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| api_error(StatusCode::UNAUTHORIZED, "Invalid token"))?;

    let user_id: i64 = token_data
        .claims
        .sub
        .parse()
        .map_err(|_| api_error(StatusCode::UNAUTHORIZED, "Invalid token"))?;

    sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = ?")
        .bind(user_id)
        .fetch_optional(&state.pool)
        .await
        .map_err(internal_error)?
        .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "User not found"))
}

pub fn generate_jwt(config: &AppConfig, user_id: i64) -> Result<String, ApiError> {
    let expiration = Utc::now()
        .checked_add_signed(chrono::Duration::days(config.token_ttl_days))
        .ok_or_else(|| internal_error("Token expiry out of range"))?
        .timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.secret_key.as_bytes()),
    )
    .map_err(internal_error)
}
