use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub user_id: i64,
    pub full_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub institution: Option<String>,
    pub country: Option<String>,
    pub bio: Option<String>,
    pub research_interest: Option<String>,
    pub role: String,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserResponse {
    pub user_id: i64,
    pub full_name: String,
    pub email: String,
    pub institution: Option<String>,
    pub country: Option<String>,
    pub bio: Option<String>,
    pub research_interest: Option<String>,
    pub role: String,
    pub profile_picture: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            user_id: user.user_id,
            full_name: user.full_name,
            email: user.email,
            institution: user.institution,
            country: user.country,
            bio: user.bio,
            research_interest: user.research_interest,
            role: user.role,
            profile_picture: user.profile_picture,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub institution: Option<String>,
    pub country: Option<String>,
    pub bio: Option<String>,
    pub research_interest: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginUser {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user: UserResponse,
    #[serde(flatten)]
    pub token: TokenResponse,
}
