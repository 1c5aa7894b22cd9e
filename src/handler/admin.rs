// handler/admin.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::cache::CacheHelper,
    dtos::{
        admindtos::{
            CreateAgentDto, CreateCannedResponseDto, CreateSlaPolicyDto, DepartmentScopeQueryDto, UpdateAgentDto,
            UpdateAgentStatusDto, UpdateCannedResponseDto, UpdateSlaPolicyDto,
        },
        ticketdtos::{
            BulkAssignDto, BulkDeleteDto, BulkPriorityDto, BulkResultDto, BulkStatusDto, BulkTransferDto,
            DueSoonQueryDto, PageQueryDto,
        },
    },
    error::HttpError,
    middleware::JWTAuthMiddeware,
    models::ticketmodel::TicketStats,
    AppState,
};

pub fn admin_handler() -> Router {
    Router::new()
        .route("/agents", post(create_agent).get(list_agents))
        .route("/agents/:id", get(get_agent).patch(update_agent).delete(delete_agent))
        .route("/agents/:id/status", patch(update_agent_status))
        .route("/sla-policies", post(create_sla_policy).get(list_sla_policies))
        .route(
            "/sla-policies/:id",
            get(get_sla_policy).patch(update_sla_policy).delete(delete_sla_policy),
        )
        .route("/canned-responses", post(create_canned_response).get(list_canned_responses))
        .route(
            "/canned-responses/:id",
            get(get_canned_response)
                .patch(update_canned_response)
                .delete(delete_canned_response),
        )
        .route("/tickets/bulk-assign", post(bulk_assign))
        .route("/tickets/bulk-status", post(bulk_status))
        .route("/tickets/bulk-priority", post(bulk_priority))
        .route("/tickets/bulk-transfer", post(bulk_transfer))
        .route("/tickets/bulk-delete", post(bulk_delete))
        .route("/dashboard/stats", get(dashboard_stats))
        .route("/dashboard/sla-breached", get(sla_breached_tickets))
        .route("/dashboard/due-soon", get(tickets_due_soon))
        .route("/dashboard/unassigned", get(unassigned_tickets))
}

/// Drops cached dashboard numbers after a write that changes them.
pub async fn invalidate_stats(app_state: &AppState, tenant_id: &str) {
    if let Some(redis) = &app_state.redis {
        if let Err(e) = CacheHelper::invalidate_tenant_stats(redis, tenant_id).await {
            tracing::warn!("Failed to invalidate stats cache for {}: {}", tenant_id, e);
        }
    }
}

// ===== Agents =====

pub async fn create_agent(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateAgentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let agent = app_state
        .admin_service
        .create_agent(&auth.actor.tenant_id, body)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": agent
        })),
    ))
}

pub async fn list_agents(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(params): Query<DepartmentScopeQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let agents = app_state
        .admin_service
        .list_agents(&auth.actor.tenant_id, params.department_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": agents
    })))
}

pub async fn get_agent(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(agent_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let agent = app_state
        .admin_service
        .get_agent(&auth.actor.tenant_id, agent_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": agent
    })))
}

pub async fn update_agent(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(agent_id): Path<Uuid>,
    Json(body): Json<UpdateAgentDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let agent = app_state
        .admin_service
        .update_agent(&auth.actor.tenant_id, agent_id, body)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": agent
    })))
}

pub async fn delete_agent(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(agent_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .admin_service
        .delete_agent(&auth.actor.tenant_id, agent_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Agent deleted"
    })))
}

pub async fn update_agent_status(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(agent_id): Path<Uuid>,
    Json(body): Json<UpdateAgentStatusDto>,
) -> Result<impl IntoResponse, HttpError> {
    let tenant_id = &auth.actor.tenant_id;
    let agent = app_state.admin_service.get_agent(tenant_id, agent_id).await?;
    let agent = app_state
        .admin_service
        .update_agent_status(tenant_id, &agent.user_id, body.status)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": agent
    })))
}

// ===== SLA policies =====

pub async fn create_sla_policy(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateSlaPolicyDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let policy = app_state
        .admin_service
        .create_sla_policy(&auth.actor.tenant_id, body)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": policy
        })),
    ))
}

pub async fn list_sla_policies(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let policies = app_state
        .admin_service
        .list_sla_policies(&auth.actor.tenant_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": policies
    })))
}

pub async fn get_sla_policy(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(policy_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let policy = app_state
        .admin_service
        .get_sla_policy(&auth.actor.tenant_id, policy_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": policy
    })))
}

pub async fn update_sla_policy(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(policy_id): Path<Uuid>,
    Json(body): Json<UpdateSlaPolicyDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let policy = app_state
        .admin_service
        .update_sla_policy(&auth.actor.tenant_id, policy_id, body)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": policy
    })))
}

pub async fn delete_sla_policy(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(policy_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .admin_service
        .delete_sla_policy(&auth.actor.tenant_id, policy_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "message": "SLA policy deleted"
    })))
}

// ===== Canned responses =====

pub async fn create_canned_response(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateCannedResponseDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let response = app_state
        .admin_service
        .create_canned_response(&auth.actor, body)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": response
        })),
    ))
}

pub async fn list_canned_responses(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(params): Query<DepartmentScopeQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    let responses = app_state
        .admin_service
        .list_canned_responses(&auth.actor.tenant_id, params.department_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": responses
    })))
}

pub async fn get_canned_response(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(response_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let response = app_state
        .admin_service
        .get_canned_response(&auth.actor.tenant_id, response_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": response
    })))
}

pub async fn update_canned_response(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(response_id): Path<Uuid>,
    Json(body): Json<UpdateCannedResponseDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let response = app_state
        .admin_service
        .update_canned_response(&auth.actor.tenant_id, response_id, body)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": response
    })))
}

pub async fn delete_canned_response(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(response_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .admin_service
        .delete_canned_response(&auth.actor.tenant_id, response_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "message": "Canned response deleted"
    })))
}

// ===== Bulk operations =====

fn bulk_result(success_count: usize, requested: usize) -> Json<serde_json::Value> {
    let result = BulkResultDto {
        success_count,
        requested,
    };
    Json(json!({
        "status": "success",
        "data": result
    }))
}

pub async fn bulk_assign(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<BulkAssignDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let requested = body.ticket_ids.len();
    let changed = app_state
        .bulk_service
        .bulk_assign(&auth.actor, body)
        .await?
        .into_logged("bulk_assign");

    invalidate_stats(&app_state, &auth.actor.tenant_id).await;
    Ok(bulk_result(changed, requested))
}

pub async fn bulk_status(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<BulkStatusDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let requested = body.ticket_ids.len();
    let changed = app_state
        .bulk_service
        .bulk_update_status(&auth.actor, body)
        .await?
        .into_logged("bulk_update_status");

    invalidate_stats(&app_state, &auth.actor.tenant_id).await;
    Ok(bulk_result(changed, requested))
}

pub async fn bulk_priority(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<BulkPriorityDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let requested = body.ticket_ids.len();
    let changed = app_state
        .bulk_service
        .bulk_update_priority(&auth.actor, body)
        .await?
        .into_logged("bulk_update_priority");

    Ok(bulk_result(changed, requested))
}

pub async fn bulk_transfer(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<BulkTransferDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let requested = body.ticket_ids.len();
    let changed = app_state
        .bulk_service
        .bulk_transfer(&auth.actor, body)
        .await?
        .into_logged("bulk_transfer");

    invalidate_stats(&app_state, &auth.actor.tenant_id).await;
    Ok(bulk_result(changed, requested))
}

pub async fn bulk_delete(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<BulkDeleteDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let requested = body.ticket_ids.len();
    let changed = app_state
        .bulk_service
        .bulk_delete(&auth.actor, body)
        .await?
        .into_logged("bulk_delete");

    invalidate_stats(&app_state, &auth.actor.tenant_id).await;
    Ok(bulk_result(changed, requested))
}

// ===== Dashboard =====

pub async fn dashboard_stats(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let key = CacheHelper::stats_key(&auth.actor.tenant_id, "dashboard");

    if let Some(redis) = &app_state.redis {
        if let Ok(Some(stats)) = CacheHelper::get::<TicketStats>(redis, &key).await {
            return Ok(Json(json!({
                "status": "success",
                "data": stats
            })));
        }
    }

    let stats = app_state.ticket_service.stats(&auth.actor).await?;

    if let Some(redis) = &app_state.redis {
        if let Err(e) = CacheHelper::set(redis, &key, &stats, app_state.env.stats_cache_ttl).await {
            tracing::warn!("Failed to cache dashboard stats: {}", e);
        }
    }

    Ok(Json(json!({
        "status": "success",
        "data": stats
    })))
}

pub async fn sla_breached_tickets(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(params): Query<PageQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    params
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let page = app_state
        .ticket_service
        .sla_breached_tickets(&auth.actor, params.page.unwrap_or(1), params.per_page.unwrap_or(20))
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": page
    })))
}

pub async fn tickets_due_soon(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(params): Query<DueSoonQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    params
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let tickets = app_state
        .ticket_service
        .tickets_due_soon(&auth.actor, params.hours.unwrap_or(4), params.limit.unwrap_or(20))
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": tickets
    })))
}

pub async fn unassigned_tickets(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(params): Query<PageQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    params
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let page = app_state
        .ticket_service
        .unassigned_tickets(&auth.actor, params.page.unwrap_or(1), params.per_page.unwrap_or(20))
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": page
    })))
}
