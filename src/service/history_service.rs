// service/history_service.rs
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    db::Store,
    models::{
        ticketmodel::{HistoryAction, Ticket, TicketHistory, TicketStatus},
        usermodel::Actor,
    },
    service::error::ServiceError,
};

/// Writes the ticket audit trail. Entries are never updated or removed.
#[derive(Clone)]
pub struct HistoryService {
    store: Arc<dyn Store>,
}

impl HistoryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn log_created(&self, ticket: &Ticket, actor: &Actor) -> Result<(), ServiceError> {
        self.log_history_event(
            ticket,
            HistoryAction::Created,
            None,
            Value::Null,
            json!(ticket.ticket_number),
            actor,
            None,
        )
        .await
    }

    pub async fn log_field_change(
        &self,
        ticket: &Ticket,
        field: &str,
        old_value: Value,
        new_value: Value,
        actor: &Actor,
    ) -> Result<(), ServiceError> {
        self.log_history_event(
            ticket,
            HistoryAction::Updated,
            Some(field),
            old_value,
            new_value,
            actor,
            None,
        )
        .await
    }

    pub async fn log_assignment(
        &self,
        ticket: &Ticket,
        previous_assignee: Option<&str>,
        actor: &Actor,
        automatic: bool,
    ) -> Result<(), ServiceError> {
        let action = if automatic {
            HistoryAction::AutoAssigned
        } else {
            HistoryAction::Assigned
        };

        self.log_history_event(
            ticket,
            action,
            Some("assigned_to"),
            json!(previous_assignee),
            json!(ticket.assigned_to_name),
            actor,
            None,
        )
        .await
    }

    pub async fn log_status_change(
        &self,
        ticket: &Ticket,
        from: TicketStatus,
        to: TicketStatus,
        actor: &Actor,
        comment: Option<&str>,
    ) -> Result<(), ServiceError> {
        self.log_history_event(
            ticket,
            HistoryAction::StatusChanged,
            Some("status"),
            json!(from),
            json!(to),
            actor,
            comment,
        )
        .await
    }

    pub async fn log_transfer(
        &self,
        ticket: &Ticket,
        previous_department: Option<&str>,
        actor: &Actor,
    ) -> Result<(), ServiceError> {
        self.log_history_event(
            ticket,
            HistoryAction::Transferred,
            Some("department"),
            json!(previous_department),
            json!(ticket.department_name),
            actor,
            None,
        )
        .await
    }

    pub async fn log_rating(&self, ticket: &Ticket, actor: &Actor) -> Result<(), ServiceError> {
        self.log_history_event(
            ticket,
            HistoryAction::Rated,
            Some("satisfaction_rating"),
            Value::Null,
            json!(ticket.satisfaction_rating),
            actor,
            ticket.satisfaction_comment.as_deref(),
        )
        .await
    }

    pub async fn log_deletion(&self, ticket: &Ticket, actor: &Actor) -> Result<(), ServiceError> {
        self.log_history_event(
            ticket,
            HistoryAction::Deleted,
            None,
            Value::Null,
            Value::Null,
            actor,
            None,
        )
        .await
    }

    pub async fn list(&self, tenant_id: &str, ticket_id: Uuid) -> Result<Vec<TicketHistory>, ServiceError> {
        Ok(self.store.list_history(tenant_id, ticket_id).await?)
    }

    #[allow(clippy::too_many_arguments)]
    async fn log_history_event(
        &self,
        ticket: &Ticket,
        action: HistoryAction,
        field: Option<&str>,
        old_value: Value,
        new_value: Value,
        actor: &Actor,
        comment: Option<&str>,
    ) -> Result<(), ServiceError> {
        let entry = TicketHistory {
            id: Uuid::new_v4(),
            ticket_id: ticket.id,
            tenant_id: ticket.tenant_id.clone(),
            action,
            field: field.map(str::to_string),
            old_value,
            new_value,
            changed_by: actor.user_id.clone(),
            changed_by_name: actor.name.clone(),
            comment: comment.map(str::to_string),
            created_at: Utc::now(),
        };

        self.store.create_history(&entry).await?;
        Ok(())
    }
}
