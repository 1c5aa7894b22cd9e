// dtos/ticketdtos.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    messagemodel::MessageType,
    ticketmodel::{FieldMap, TicketFilter, TicketPriority, TicketSortField, TicketSource, TicketStatus, TicketType},
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AttachmentDto {
    #[validate(length(min = 1, max = 255, message = "Attachment name must be between 1 and 255 characters"))]
    pub name: String,

    #[validate(url(message = "Attachment url is invalid"))]
    pub url: String,

    #[validate(range(min = 0, message = "Attachment size must be positive"))]
    pub size: i64,

    #[validate(length(min = 1, message = "Attachment mime type is required"))]
    pub mime_type: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateTicketDto {
    #[validate(length(min = 1, max = 500, message = "Subject must be between 1 and 500 characters"))]
    pub subject: String,

    #[validate(length(min = 1, max = 50000, message = "Description must be between 1 and 50000 characters"))]
    pub description: String,

    #[serde(rename = "type")]
    pub ticket_type: Option<TicketType>,
    pub priority: Option<TicketPriority>,
    pub source: Option<TicketSource>,

    pub department_id: Option<Uuid>,
    pub category_id: Option<Uuid>,

    #[validate(length(max = 32, message = "Phone number is too long"))]
    pub customer_phone: Option<String>,

    pub tags: Option<Vec<String>>,

    #[validate]
    pub attachments: Option<Vec<AttachmentDto>>,

    pub custom_fields: Option<FieldMap>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateTicketDto {
    #[validate(length(min = 1, max = 500, message = "Subject must be between 1 and 500 characters"))]
    pub subject: Option<String>,

    #[validate(length(min = 1, max = 50000, message = "Description must be between 1 and 50000 characters"))]
    pub description: Option<String>,

    #[serde(rename = "type")]
    pub ticket_type: Option<TicketType>,
    pub priority: Option<TicketPriority>,
    pub department_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub tags: Option<Vec<String>>,
    pub custom_fields: Option<FieldMap>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChangeStatusDto {
    pub status: TicketStatus,

    #[validate(length(max = 2000, message = "Comment must be at most 2000 characters"))]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AssignTicketDto {
    /// External user id of the agent.
    #[validate(length(min = 1, message = "Agent id is required"))]
    pub agent_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TransferTicketDto {
    pub department_id: Uuid,

    #[validate(length(min = 1, message = "Agent id must not be empty"))]
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AddReplyDto {
    #[validate(length(max = 50000, message = "Reply must be at most 50000 characters"))]
    #[serde(default)]
    pub content: String,

    pub content_html: Option<String>,

    #[serde(rename = "type")]
    pub message_type: Option<MessageType>,

    #[serde(default)]
    pub is_private: bool,

    #[validate]
    pub attachments: Option<Vec<AttachmentDto>>,

    pub canned_response_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EditMessageDto {
    #[validate(length(min = 1, max = 50000, message = "Message must be between 1 and 50000 characters"))]
    pub content: String,

    pub content_html: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RateTicketDto {
    #[validate(range(min = 1, max = 5, message = "Rating must be between 1 and 5"))]
    pub rating: i32,

    #[validate(length(max = 2000, message = "Comment must be at most 2000 characters"))]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct TicketQueryDto {
    pub status: Option<TicketStatus>,
    pub priority: Option<TicketPriority>,
    pub department_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub assigned_to: Option<String>,
    pub customer_id: Option<String>,
    pub unassigned: Option<bool>,
    pub sla_breached: Option<bool>,
    /// Comma separated, every tag must match.
    pub tags: Option<String>,
    #[validate(length(max = 200))]
    pub search: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub sort_by: Option<TicketSortField>,
    pub sort_order: Option<String>,
    #[validate(range(min = 1, max = 10000))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub per_page: Option<i64>,
}

impl TicketQueryDto {
    pub fn to_filter(&self, tenant_id: &str) -> TicketFilter {
        let mut filter = TicketFilter::for_tenant(tenant_id);
        filter.statuses = self.status.into_iter().collect();
        filter.priorities = self.priority.into_iter().collect();
        filter.department_id = self.department_id;
        filter.category_id = self.category_id;
        filter.assigned_to_id = self.assigned_to.clone();
        filter.customer_id = self.customer_id.clone();
        filter.unassigned_only = self.unassigned.unwrap_or(false);
        filter.sla_breached = self.sla_breached;
        filter.tags = self
            .tags
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        filter.search = self.search.clone().filter(|s| !s.trim().is_empty());
        filter.created_from = self.created_from;
        filter.created_to = self.created_to;
        filter.sort_by = self.sort_by.unwrap_or_default();
        filter.sort_desc = !matches!(self.sort_order.as_deref(), Some("asc"));
        filter.page = self.page.unwrap_or(1);
        filter.per_page = self.per_page.unwrap_or(20);
        filter
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct PageQueryDto {
    #[validate(range(min = 1, max = 10000))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub per_page: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AgentTicketsQueryDto {
    pub status: Option<TicketStatus>,
    #[validate(range(min = 1, max = 10000))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub per_page: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct DueSoonQueryDto {
    #[validate(range(min = 1, max = 720))]
    pub hours: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BulkAssignDto {
    #[validate(length(min = 1, max = 100, message = "Between 1 and 100 tickets per request"))]
    pub ticket_ids: Vec<String>,
    #[validate(length(min = 1, message = "Agent id is required"))]
    pub agent_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BulkStatusDto {
    #[validate(length(min = 1, max = 100, message = "Between 1 and 100 tickets per request"))]
    pub ticket_ids: Vec<String>,
    pub status: TicketStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BulkPriorityDto {
    #[validate(length(min = 1, max = 100, message = "Between 1 and 100 tickets per request"))]
    pub ticket_ids: Vec<String>,
    pub priority: TicketPriority,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BulkTransferDto {
    #[validate(length(min = 1, max = 100, message = "Between 1 and 100 tickets per request"))]
    pub ticket_ids: Vec<String>,
    pub department_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BulkDeleteDto {
    #[validate(length(min = 1, max = 100, message = "Between 1 and 100 tickets per request"))]
    pub ticket_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkResultDto {
    pub success_count: usize,
    pub requested: usize,
}
