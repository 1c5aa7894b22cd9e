// routes.rs
use std::sync::Arc;

use axum::{middleware, routing::get, Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    handler::{
        admin::admin_handler,
        departments::{catalog_handler, department_admin_handler},
        tickets::{agent_handler, tickets_handler},
    },
    middleware::{auth, optional_auth, role_check},
    models::usermodel::UserRole,
    AppState,
};

fn staff_roles() -> Vec<UserRole> {
    vec![
        UserRole::Agent,
        UserRole::Supervisor,
        UserRole::Manager,
        UserRole::Admin,
        UserRole::System,
    ]
}

fn admin_roles() -> Vec<UserRole> {
    vec![UserRole::Supervisor, UserRole::Manager, UserRole::Admin, UserRole::System]
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "success",
        "data": { "service": "ticketdesk", "status": "healthy" }
    }))
}

async fn ready_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "success",
        "data": { "service": "ticketdesk", "status": "ready" }
    }))
}

async fn live_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "success",
        "data": { "service": "ticketdesk", "status": "live" }
    }))
}

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let public_routes = catalog_handler().route_layer(middleware::from_fn(optional_auth));

    let customer_routes = tickets_handler().route_layer(middleware::from_fn(auth));

    let agent_routes = agent_handler()
        .route_layer(middleware::from_fn(|state, req, next| {
            role_check(state, req, next, staff_roles())
        }))
        .route_layer(middleware::from_fn(auth));

    let admin_routes = department_admin_handler()
        .merge(admin_handler())
        .route_layer(middleware::from_fn(|state, req, next| {
            role_check(state, req, next, admin_roles())
        }))
        .route_layer(middleware::from_fn(auth));

    let api_route = Router::new()
        .merge(public_routes)
        .merge(customer_routes)
        .merge(agent_routes)
        .nest("/admin", admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/live", get(live_check))
        .nest("/api/v1", api_route)
}
