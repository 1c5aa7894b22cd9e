// handler/departments.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Extension, Json, Router,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dtos::admindtos::{
        CreateCategoryDto, CreateDepartmentDto, DepartmentAgentDto, DepartmentListQueryDto, DepartmentScopeQueryDto,
        UpdateCategoryDto, UpdateDepartmentDto,
    },
    error::HttpError,
    middleware::JWTAuthMiddeware,
    AppState,
};

/// Read-only routes; anonymous callers only see active departments and public categories.
pub fn catalog_handler() -> Router {
    Router::new()
        .route("/departments", get(list_departments))
        .route("/departments/:id", get(get_department))
        .route("/categories", get(list_categories))
        .route("/categories/:id", get(get_category))
}

pub fn department_admin_handler() -> Router {
    Router::new()
        .route("/departments", post(create_department).get(list_departments))
        .route(
            "/departments/:id",
            get(get_department).patch(update_department).delete(delete_department),
        )
        .route("/departments/:id/agents", get(department_agents).post(add_department_agent))
        .route("/departments/:id/agents/:agent_id", delete(remove_department_agent))
        .route("/categories", post(create_category).get(list_categories))
        .route(
            "/categories/:id",
            get(get_category).patch(update_category).delete(delete_category),
        )
}

pub async fn list_departments(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(params): Query<DepartmentListQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let active_only = !auth.actor.is_agent() || params.active_only.unwrap_or(false);
    let departments = app_state
        .department_service
        .list_departments(&auth.actor.tenant_id, active_only)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": departments
    })))
}

pub async fn get_department(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(department_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let department = app_state
        .department_service
        .get_department(&auth.actor.tenant_id, department_id)
        .await?;

    if !department.is_active && !auth.actor.is_agent() {
        return Err(HttpError::not_found(format!("Department {} not found", department_id)));
    }

    Ok(Json(json!({
        "status": "success",
        "data": department
    })))
}

pub async fn create_department(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateDepartmentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let department = app_state
        .department_service
        .create_department(&auth.actor.tenant_id, body)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": department
        })),
    ))
}

pub async fn update_department(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(department_id): Path<Uuid>,
    Json(body): Json<UpdateDepartmentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let department = app_state
        .department_service
        .update_department(&auth.actor.tenant_id, department_id, body)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": department
    })))
}

pub async fn delete_department(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(department_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .department_service
        .delete_department(&auth.actor.tenant_id, department_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Department deleted"
    })))
}

pub async fn department_agents(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(department_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let agents = app_state
        .department_service
        .department_agents(&auth.actor.tenant_id, department_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": agents
    })))
}

pub async fn add_department_agent(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(department_id): Path<Uuid>,
    Json(body): Json<DepartmentAgentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let department = app_state
        .department_service
        .add_agent(&auth.actor.tenant_id, department_id, &body.agent_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": department
    })))
}

pub async fn remove_department_agent(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path((department_id, agent_id)): Path<(Uuid, String)>,
) -> Result<impl IntoResponse, HttpError> {
    let department = app_state
        .department_service
        .remove_agent(&auth.actor.tenant_id, department_id, &agent_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": department
    })))
}

// ===== Categories =====

pub async fn list_categories(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(params): Query<DepartmentScopeQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let categories = app_state
        .department_service
        .list_categories(&auth.actor.tenant_id, params.department_id, !auth.actor.is_agent())
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": categories
    })))
}

pub async fn get_category(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(category_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let category = app_state
        .department_service
        .get_category(&auth.actor.tenant_id, category_id)
        .await?;

    if !category.is_public && !auth.actor.is_agent() {
        return Err(HttpError::not_found(format!("Category {} not found", category_id)));
    }

    Ok(Json(json!({
        "status": "success",
        "data": category
    })))
}

pub async fn create_category(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateCategoryDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let category = app_state
        .department_service
        .create_category(&auth.actor.tenant_id, body)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": category
        })),
    ))
}

pub async fn update_category(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(category_id): Path<Uuid>,
    Json(body): Json<UpdateCategoryDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let category = app_state
        .department_service
        .update_category(&auth.actor.tenant_id, category_id, body)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": category
    })))
}

pub async fn delete_category(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(category_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .department_service
        .delete_category(&auth.actor.tenant_id, category_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Category deleted"
    })))
}
