use std::sync::Arc;

use axum::{
    extract::Request,
    http::header,
    middleware::Next,
    response::IntoResponse,
    Extension,
};
use axum_extra::extract::cookie::CookieJar;

use crate::{
    error::{ErrorMessage, HttpError},
    models::usermodel::{Actor, UserRole},
    utils::token,
    AppState,
};

pub const TENANT_HEADER: &str = "x-tenant-id";

/// The authenticated caller, inserted by [`auth`].
#[derive(Debug, Clone)]
pub struct JWTAuthMiddeware {
    pub actor: Actor,
}

fn bearer_token(req: &Request) -> Option<String> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|auth_header| auth_header.to_str().ok())
        .and_then(|auth_value| auth_value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_owned())
}

fn tenant_header(req: &Request) -> Option<String> {
    req.headers()
        .get(TENANT_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

pub async fn auth(
    cookie_jar: CookieJar,
    Extension(app_state): Extension<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    let token = cookie_jar
        .get("token")
        .map(|cookie| cookie.value().to_string())
        .or_else(|| bearer_token(&req))
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::TokenNotProvided.to_string()))?;

    let claims = token::decode_token(token, app_state.env.jwt_secret.as_bytes())?;

    let actor = claims
        .into_actor(tenant_header(&req))
        .ok_or_else(|| HttpError::bad_request(ErrorMessage::TenantNotProvided.to_string()))?;

    req.extensions_mut().insert(JWTAuthMiddeware { actor });

    Ok(next.run(req).await)
}

/// Like [`auth`], but lets anonymous callers through as customers of the
/// tenant named in `X-Tenant-ID`.
pub async fn optional_auth(
    cookie_jar: CookieJar,
    Extension(app_state): Extension<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, HttpError> {
    let token = cookie_jar
        .get("token")
        .map(|cookie| cookie.value().to_string())
        .or_else(|| bearer_token(&req));

    let tenant = tenant_header(&req);
    let actor = match token.and_then(|t| token::decode_token(t, app_state.env.jwt_secret.as_bytes()).ok()) {
        Some(claims) => claims.into_actor(tenant),
        None => tenant.map(|tenant_id| Actor {
            user_id: "anonymous".to_string(),
            tenant_id,
            name: String::new(),
            email: String::new(),
            role: UserRole::Customer,
        }),
    }
    .ok_or_else(|| HttpError::bad_request(ErrorMessage::TenantNotProvided.to_string()))?;

    req.extensions_mut().insert(JWTAuthMiddeware { actor });

    Ok(next.run(req).await)
}

pub async fn role_check(
    Extension(_app_state): Extension<Arc<AppState>>,
    req: Request,
    next: Next,
    required_roles: Vec<UserRole>,
) -> Result<impl IntoResponse, HttpError> {
    let user = req
        .extensions()
        .get::<JWTAuthMiddeware>()
        .ok_or_else(|| HttpError::unauthorized(ErrorMessage::UserNotAuthenticated.to_string()))?;

    if !required_roles.contains(&user.actor.role) {
        return Err(HttpError::forbidden(ErrorMessage::PermissionDenied.to_string()));
    }

    Ok(next.run(req).await)
}
