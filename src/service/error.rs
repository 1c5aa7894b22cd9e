use axum::http::StatusCode;
use thiserror::Error;
use uuid::Uuid;

use crate::{db::DbError, error::HttpError, models::ticketmodel::TicketStatus};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Ticket {0} not found")]
    TicketNotFound(String),

    #[error("Agent {0} not found")]
    AgentNotFound(String),

    #[error("Department {0} not found")]
    DepartmentNotFound(Uuid),

    #[error("Category {0} not found")]
    CategoryNotFound(Uuid),

    #[error("SLA policy {0} not found")]
    SlaPolicyNotFound(Uuid),

    #[error("Canned response {0} not found")]
    CannedResponseNotFound(Uuid),

    #[error("Message {0} not found")]
    MessageNotFound(Uuid),

    #[error("User {user_id} is not authorized to access ticket {ticket_number}")]
    UnauthorizedTicketAccess { user_id: String, ticket_number: String },

    #[error("User {0} is not authorized to perform this action")]
    Unauthorized(String),

    #[error("Cannot move ticket from {from} to {to}")]
    InvalidStatusTransition { from: TicketStatus, to: TicketStatus },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Agent {0} is at maximum ticket capacity")]
    AgentAtCapacity(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    Database(#[source] DbError),
}

impl From<DbError> for ServiceError {
    fn from(error: DbError) -> Self {
        match error {
            DbError::Conflict(what) => {
                ServiceError::Conflict(format!("{} was modified concurrently, retry the request", what))
            }
            DbError::Duplicate(what) => ServiceError::Conflict(format!("{} already exists", what)),
            other => ServiceError::Database(other),
        }
    }
}

impl ServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) | ServiceError::InvalidStatusTransition { .. } => {
                StatusCode::BAD_REQUEST
            }

            ServiceError::TicketNotFound(_)
            | ServiceError::AgentNotFound(_)
            | ServiceError::DepartmentNotFound(_)
            | ServiceError::CategoryNotFound(_)
            | ServiceError::SlaPolicyNotFound(_)
            | ServiceError::CannedResponseNotFound(_)
            | ServiceError::MessageNotFound(_) => StatusCode::NOT_FOUND,

            ServiceError::UnauthorizedTicketAccess { .. } | ServiceError::Unauthorized(_) => {
                StatusCode::FORBIDDEN
            }

            ServiceError::InvalidState(_)
            | ServiceError::AgentAtCapacity(_)
            | ServiceError::Conflict(_) => StatusCode::CONFLICT,

            ServiceError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        let message = error.to_string();
        match error.status_code() {
            StatusCode::BAD_REQUEST => HttpError::bad_request(message),
            StatusCode::NOT_FOUND => HttpError::not_found(message),
            StatusCode::FORBIDDEN => HttpError::forbidden(message),
            StatusCode::CONFLICT => HttpError::conflict(message),
            status if status.is_server_error() => {
                tracing::error!("Service failure: {}", message);
                HttpError::server_error(crate::error::ErrorMessage::ServerError.to_string())
            }
            status => HttpError::new(message, status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_http_status() {
        let cases = vec![
            (ServiceError::Validation("subject".into()), StatusCode::BAD_REQUEST),
            (ServiceError::TicketNotFound("x".into()), StatusCode::NOT_FOUND),
            (ServiceError::DepartmentNotFound(Uuid::nil()), StatusCode::NOT_FOUND),
            (
                ServiceError::UnauthorizedTicketAccess {
                    user_id: "u".into(),
                    ticket_number: "TKT-000001".into(),
                },
                StatusCode::FORBIDDEN,
            ),
            (
                ServiceError::InvalidStatusTransition {
                    from: TicketStatus::Open,
                    to: TicketStatus::Resolved,
                },
                StatusCode::BAD_REQUEST,
            ),
            (ServiceError::InvalidState("not resolved".into()), StatusCode::CONFLICT),
            (ServiceError::AgentAtCapacity("a1".into()), StatusCode::CONFLICT),
        ];

        for (error, status) in cases {
            assert_eq!(error.status_code(), status, "{}", error);
            let http: HttpError = error.into();
            assert_eq!(http.status, status);
        }
    }

    #[test]
    fn store_conflicts_become_409() {
        let error: ServiceError = DbError::Conflict("ticket TKT-000001".into()).into();
        assert_eq!(error.status_code(), StatusCode::CONFLICT);

        let error: ServiceError = DbError::Duplicate("agent".into()).into();
        assert!(matches!(error, ServiceError::Conflict(_)));
    }

    #[test]
    fn database_errors_hide_details() {
        let error: ServiceError = DbError::Sqlx(sqlx::Error::PoolTimedOut).into();
        let http: HttpError = error.into();
        assert_eq!(http.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!http.message.contains("pool"));
    }
}
