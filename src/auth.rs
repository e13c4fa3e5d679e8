use std::env;
use std::future::Future;

use axum::{
    extract::{FromRequestParts, Json, State},
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::IntoResponse,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::store::{NewUser, User, UserRole};
use crate::AppState;

const AUTH_COOKIE_NAME: &str = "auth_token";

// Authentication is intentionally mock: we look the user up by email and
// accept any password. The JWT only carries the session across requests.

#[derive(Deserialize)]
pub struct LoginRequest {
    email: String,
    #[allow(dead_code)]
    password: String,
}

#[derive(Deserialize)]
pub struct SignupRequest {
    full_name: String,
    email: String,
    password: String,
    role: UserRole,
    ngo_verification_id: Option<String>,
    address: Option<String>,
}

#[derive(Serialize)]
pub struct AuthResponse {
    user: User,
}

// Claims for our JWT
#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
    email: String,
    name: String,
    role: String,
}

pub struct AuthenticatedUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: UserRole,
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync + 'static,
{
    type Rejection = (StatusCode, String);

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let token = extract_token_from_headers(&parts.headers)
                .ok_or((StatusCode::UNAUTHORIZED, "Missing auth token".to_string()))?;
            let claims = validate_token_str(&token).map_err(|e| {
                tracing::error!("Token error: {}", e);
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
            })?;
            let role = claims.role.parse::<UserRole>().map_err(|e| {
                tracing::error!("Token role error: {}", e);
                (StatusCode::UNAUTHORIZED, "Invalid token".to_string())
            })?;

            Ok(AuthenticatedUser {
                id: claims.sub,
                email: claims.email,
                name: claims.name,
                role,
            })
        }
    }
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> impl IntoResponse {
    if payload.email.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Email is required").into_response();
    }

    let Some(user) = state.store.find_user_by_email(payload.email.trim()) else {
        return (
            StatusCode::UNAUTHORIZED,
            "User not found. Please check the email or sign up.",
        )
            .into_response();
    };

    session_response(StatusCode::OK, user)
}

pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> impl IntoResponse {
    let full_name = payload.full_name.trim();
    let email = payload.email.trim();
    if full_name.is_empty() || email.is_empty() || payload.password.is_empty() {
        return (StatusCode::BAD_REQUEST, "Please fill all fields").into_response();
    }

    let created = state.store.add_user(NewUser {
        email: email.to_string(),
        full_name: full_name.to_string(),
        role: payload.role,
        ngo_verification_id: payload.ngo_verification_id,
        address: payload.address,
    });

    match created {
        // Signup doubles as login: the response already carries the session.
        Ok(user) => session_response(StatusCode::CREATED, user),
        Err(e) => {
            tracing::warn!("Signup rejected for {}: {}", email, e);
            (StatusCode::CONFLICT, e.to_string()).into_response()
        }
    }
}

pub async fn logout() -> impl IntoResponse {
    let cookie = clear_auth_cookie();
    let mut response = (StatusCode::OK, "OK").into_response();
    response
        .headers_mut()
        .insert(header::SET_COOKIE, HeaderValue::from_str(&cookie).unwrap());
    response
}

pub async fn me(State(state): State<AppState>, user: AuthenticatedUser) -> impl IntoResponse {
    // The store is in-memory, so a token can outlive its user after a
    // restart. Treat that as an expired session.
    match state.store.find_user_by_id(&user.id) {
        Some(profile) => Json(profile).into_response(),
        None => (StatusCode::UNAUTHORIZED, "Session expired").into_response(),
    }
}

fn session_response(status: StatusCode, user: User) -> axum::response::Response {
    let token = match create_jwt(&user) {
        Ok(t) => t,
        Err(e) => {
            tracing::error!("JWT creation failed: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Auth failed").into_response();
        }
    };
    let cookie = build_auth_cookie(&token);
    let mut response = (status, Json(AuthResponse { user })).into_response();
    response
        .headers_mut()
        .insert(header::SET_COOKIE, HeaderValue::from_str(&cookie).unwrap());
    response
}

fn create_jwt(user: &User) -> anyhow::Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::days(1))
        .expect("valid timestamp")
        .timestamp();

    let claims = Claims {
        sub: user.id.clone(),
        email: user.email.clone(),
        name: user.full_name.clone(),
        role: user.role.to_string(),
        exp: expiration as usize,
    };

    let secret = env::var("JWT_SECRET")
        .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )?;

    Ok(token)
}

fn validate_token_str(token: &str) -> anyhow::Result<Claims> {
    let secret = env::var("JWT_SECRET")
        .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable not set"))?;
    let mut validation = Validation::default();
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &validation,
    )?;
    Ok(data.claims)
}

/// True when the request carries a decodable session token. Used by the
/// router-level guard over `/api/*`.
pub fn request_is_authenticated(headers: &HeaderMap) -> bool {
    extract_token_from_headers(headers)
        .map(|token| validate_token_str(&token).is_ok())
        .unwrap_or(false)
}

fn extract_token_from_headers(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = auth_header.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    if let Some(cookie_header) = headers.get(header::COOKIE).and_then(|h| h.to_str().ok()) {
        for cookie in cookie_header.split(';') {
            let cookie = cookie.trim();
            if let Some((k, v)) = cookie.split_once('=') {
                if k == AUTH_COOKIE_NAME {
                    return Some(v.to_string());
                }
            }
        }
    }
    None
}

fn build_auth_cookie(token: &str) -> String {
    let secure = env::var("RUST_ENV").unwrap_or_else(|_| "development".to_string()) == "production";
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age=86400",
        AUTH_COOKIE_NAME, token
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn clear_auth_cookie() -> String {
    let secure = env::var("RUST_ENV").unwrap_or_else(|_| "development".to_string()) == "production";
    let mut cookie = format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        AUTH_COOKIE_NAME
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}
