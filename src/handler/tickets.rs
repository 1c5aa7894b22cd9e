// handler/tickets.rs
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
    dtos::{
        admindtos::UpdateAgentStatusDto,
        ticketdtos::{
            AddReplyDto, AgentTicketsQueryDto, AssignTicketDto, ChangeStatusDto, CreateTicketDto, EditMessageDto,
            PageQueryDto, RateTicketDto, TicketQueryDto, TransferTicketDto, UpdateTicketDto,
        },
    },
    error::HttpError,
    handler::admin::invalidate_stats,
    middleware::JWTAuthMiddeware,
    AppState,
};

/// Routes open to every authenticated caller. Customers are scoped to their
/// own tickets by the engine.
pub fn tickets_handler() -> Router {
    Router::new()
        .route("/tickets", post(create_ticket).get(list_tickets))
        .route("/tickets/stats", get(get_stats))
        .route("/tickets/number/:number", get(get_ticket_by_number))
        .route("/tickets/:id", get(get_ticket).patch(update_ticket).delete(delete_ticket))
        .route("/tickets/:id/status", patch(change_status))
        .route("/tickets/:id/rate", post(rate_ticket))
        .route("/tickets/:id/messages", get(get_ticket_messages).post(add_reply))
        .route("/tickets/:id/messages/:message_id", patch(edit_message))
        .route("/tickets/:id/history", get(get_ticket_history))
        .route("/customers/:customer_id/tickets", get(get_customer_tickets))
}

/// Routes reserved for support staff.
pub fn agent_handler() -> Router {
    Router::new()
        .route("/tickets/:id/assign", post(assign_ticket))
        .route("/tickets/:id/transfer", post(transfer_ticket))
        .route("/agents/me/status", patch(set_my_status))
        .route("/agents/:agent_id/tickets", get(get_agent_tickets))
}

pub async fn create_ticket(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<CreateTicketDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let ticket = app_state
        .ticket_service
        .create_ticket(&auth.actor, body)
        .await?
        .into_logged("create_ticket");

    invalidate_stats(&app_state, &auth.actor.tenant_id).await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": ticket
        })),
    ))
}

pub async fn list_tickets(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Query(params): Query<TicketQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    params
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let filter = params.to_filter(&auth.actor.tenant_id);
    let page = app_state.ticket_service.list_tickets(&auth.actor, filter).await?;

    Ok(Json(json!({
        "status": "success",
        "data": page
    })))
}

pub async fn get_stats(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
) -> Result<impl IntoResponse, HttpError> {
    let stats = app_state.ticket_service.stats(&auth.actor).await?;

    Ok(Json(json!({
        "status": "success",
        "data": stats
    })))
}

pub async fn get_ticket(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let ticket = app_state.ticket_service.get_ticket(&auth.actor, ticket_id).await?;

    Ok(Json(json!({
        "status": "success",
        "data": ticket
    })))
}

pub async fn get_ticket_by_number(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(number): Path<String>,
) -> Result<impl IntoResponse, HttpError> {
    let ticket = app_state
        .ticket_service
        .get_ticket_by_number(&auth.actor, &number)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": ticket
    })))
}

pub async fn update_ticket(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<UpdateTicketDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let ticket = app_state
        .ticket_service
        .update_ticket(&auth.actor, ticket_id, body)
        .await?
        .into_logged("update_ticket");

    Ok(Json(json!({
        "status": "success",
        "data": ticket
    })))
}

pub async fn delete_ticket(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    app_state
        .ticket_service
        .delete_ticket(&auth.actor, ticket_id)
        .await?
        .into_logged("delete_ticket");

    invalidate_stats(&app_state, &auth.actor.tenant_id).await;

    Ok(Json(json!({
        "status": "success",
        "message": "Ticket deleted"
    })))
}

pub async fn change_status(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<ChangeStatusDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let ticket = app_state
        .ticket_service
        .change_status(&auth.actor, ticket_id, body)
        .await?
        .into_logged("change_status");

    invalidate_stats(&app_state, &auth.actor.tenant_id).await;

    Ok(Json(json!({
        "status": "success",
        "data": ticket
    })))
}

pub async fn rate_ticket(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<RateTicketDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let ticket = app_state
        .ticket_service
        .rate_ticket(&auth.actor, ticket_id, body)
        .await?
        .into_logged("rate_ticket");

    Ok(Json(json!({
        "status": "success",
        "data": ticket
    })))
}

pub async fn get_ticket_messages(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
    Query(params): Query<PageQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    params
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let page = params.page.unwrap_or(1);
    let per_page = params.per_page.unwrap_or(50);
    let (messages, total) = app_state
        .ticket_service
        .ticket_messages(&auth.actor, ticket_id, page, per_page)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": {
            "messages": messages,
            "total": total,
            "page": page,
            "per_page": per_page
        }
    })))
}

pub async fn add_reply(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<AddReplyDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let message = app_state
        .ticket_service
        .add_reply(&auth.actor, ticket_id, body)
        .await?
        .into_logged("add_reply");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": message
        })),
    ))
}

pub async fn edit_message(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path((_ticket_id, message_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<EditMessageDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let message = app_state
        .ticket_service
        .edit_message(&auth.actor, message_id, body)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": message
    })))
}

pub async fn get_ticket_history(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
) -> Result<impl IntoResponse, HttpError> {
    let history = app_state
        .ticket_service
        .ticket_history(&auth.actor, ticket_id)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": history
    })))
}

pub async fn get_customer_tickets(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(customer_id): Path<String>,
    Query(params): Query<PageQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    params
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let page = app_state
        .ticket_service
        .customer_tickets(
            &auth.actor,
            &customer_id,
            params.page.unwrap_or(1),
            params.per_page.unwrap_or(20),
        )
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": page
    })))
}

pub async fn assign_ticket(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<AssignTicketDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let ticket = app_state
        .ticket_service
        .assign_ticket(&auth.actor, ticket_id, &body.agent_id)
        .await?
        .into_logged("assign_ticket");

    Ok(Json(json!({
        "status": "success",
        "data": ticket
    })))
}

pub async fn transfer_ticket(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(ticket_id): Path<Uuid>,
    Json(body): Json<TransferTicketDto>,
) -> Result<impl IntoResponse, HttpError> {
    body.validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let ticket = app_state
        .ticket_service
        .transfer_ticket(&auth.actor, ticket_id, body)
        .await?
        .into_logged("transfer_ticket");

    Ok(Json(json!({
        "status": "success",
        "data": ticket
    })))
}

pub async fn get_agent_tickets(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Path(agent_id): Path<String>,
    Query(params): Query<AgentTicketsQueryDto>,
) -> Result<impl IntoResponse, HttpError> {
    params
        .validate()
        .map_err(|e| HttpError::bad_request(e.to_string()))?;

    let page = app_state
        .ticket_service
        .agent_tickets(
            &auth.actor,
            &agent_id,
            params.status,
            params.page.unwrap_or(1),
            params.per_page.unwrap_or(20),
        )
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": page
    })))
}

pub async fn set_my_status(
    Extension(app_state): Extension<Arc<AppState>>,
    Extension(auth): Extension<JWTAuthMiddeware>,
    Json(body): Json<UpdateAgentStatusDto>,
) -> Result<impl IntoResponse, HttpError> {
    let agent = app_state
        .admin_service
        .set_agent_status(&auth.actor, body.status)
        .await?;

    Ok(Json(json!({
        "status": "success",
        "data": agent
    })))
}
