//! HTTP surface of the identity service.

use crate::service::{Credentials, IdentityService, Registration, ServiceError, Session};
use agora_core::model::UserSummary;
use agora_web::{
    ApiResponse, AppError, Json, Query, WebResult, correlation_id_layer, server::health_routes,
};
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, HeaderValue, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Name of the cookie carrying the refresh token.
pub const REFRESH_COOKIE: &str = "refreshToken";

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(message) => Self::bad_request(message),
            ServiceError::Conflict => Self::conflict("User already exists"),
            ServiceError::InvalidCredentials => Self::unauthorized("Invalid credentials"),
            ServiceError::InvalidRefreshToken => {
                Self::unauthorized("Invalid or expired refresh token")
            }
            ServiceError::Store(e) => Self::internal().with_source(e),
            ServiceError::Token(e) => Self::internal().with_source(e),
            ServiceError::Password(e) => Self::internal().with_source(e),
        }
    }
}

/// Build the identity router.
pub fn router(service: Arc<IdentityService>) -> Router {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh-token", post(refresh_token))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/get-many-users", get(get_many_users))
        .with_state(service)
        .merge(health_routes("identity-service"))
        .layer(correlation_id_layer())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SessionBody {
    access_token: String,
    user_id: String,
}

fn session_response(
    session: Session,
    refresh_ttl: chrono::Duration,
    created: bool,
    message: &str,
) -> Response {
    let cookie = refresh_cookie(&session.refresh_token, refresh_ttl.num_seconds());
    let body = SessionBody {
        access_token: session.access_token,
        user_id: session.user_id,
    };
    let envelope = if created {
        ApiResponse::created(body)
    } else {
        ApiResponse::ok(body)
    }
    .with_message(message);

    let mut response = envelope.into_response();
    if let Ok(value) = HeaderValue::from_str(&cookie) {
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    response
}

async fn register(
    State(service): State<Arc<IdentityService>>,
    Json(registration): Json<Registration>,
) -> WebResult<Response> {
    let session = service.register(registration).await?;
    Ok(session_response(
        session,
        service.refresh_ttl(),
        true,
        "User registered successfully",
    ))
}

async fn login(
    State(service): State<Arc<IdentityService>>,
    Json(credentials): Json<Credentials>,
) -> WebResult<Response> {
    let session = service.login(credentials).await?;
    Ok(session_response(session, service.refresh_ttl(), false, "Logged in"))
}

async fn refresh_token(
    State(service): State<Arc<IdentityService>>,
    headers: HeaderMap,
) -> WebResult<Response> {
    let token = cookie_value(&headers, REFRESH_COOKIE)
        .ok_or_else(|| AppError::bad_request("Refresh token not found"))?;
    let session = service.refresh(&token).await?;
    Ok(session_response(session, service.refresh_ttl(), false, "Token refreshed"))
}

async fn logout(
    State(service): State<Arc<IdentityService>>,
    headers: HeaderMap,
) -> WebResult<Response> {
    let token = cookie_value(&headers, REFRESH_COOKIE)
        .ok_or_else(|| AppError::bad_request("Refresh token not found"))?;
    service.logout(&token).await?;

    let mut response = ApiResponse::message("Logged out successfully").into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_static("refreshToken=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0"),
    );
    Ok(response)
}

#[derive(Deserialize)]
struct IdsQuery {
    #[serde(default)]
    ids: String,
}

#[derive(Serialize)]
struct UsersBody {
    users: Vec<UserSummary>,
}

async fn get_many_users(
    State(service): State<Arc<IdentityService>>,
    Query(query): Query<IdsQuery>,
) -> WebResult<ApiResponse<UsersBody>> {
    let ids: Vec<String> = query.ids.split(',').map(ToString::to_string).collect();
    let users = service.users_by_ids(&ids).await?;
    Ok(ApiResponse::ok(UsersBody { users }))
}

fn refresh_cookie(token: &str, max_age_secs: i64) -> String {
    format!("{REFRESH_COOKIE}={token}; HttpOnly; SameSite=Strict; Path=/; Max-Age={max_age_secs}")
}

/// Value of the named cookie from the `Cookie` header(s).
fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}
