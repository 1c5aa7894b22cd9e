// src/models/ticketmodel.rs
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::Type;
use uuid::Uuid;

/// Free-form, string keyed values attached to a ticket or message.
pub type FieldMap = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "ticket_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    Open,
    InProgress,
    Pending,
    OnHold,
    Resolved,
    Closed,
    Reopened,
    Escalated,
    Cancelled,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 9] = [
        TicketStatus::Open,
        TicketStatus::InProgress,
        TicketStatus::Pending,
        TicketStatus::OnHold,
        TicketStatus::Resolved,
        TicketStatus::Closed,
        TicketStatus::Reopened,
        TicketStatus::Escalated,
        TicketStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Open => "open",
            TicketStatus::InProgress => "in_progress",
            TicketStatus::Pending => "pending",
            TicketStatus::OnHold => "on_hold",
            TicketStatus::Resolved => "resolved",
            TicketStatus::Closed => "closed",
            TicketStatus::Reopened => "reopened",
            TicketStatus::Escalated => "escalated",
            TicketStatus::Cancelled => "cancelled",
        }
    }

    /// Whether a ticket in this status is counted in its department's
    /// open counter and its agent's current workload.
    pub fn counts_as_open(&self) -> bool {
        !matches!(self, TicketStatus::Resolved | TicketStatus::Closed)
    }
}

impl std::fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Hash, Default)]
#[sqlx(type_name = "ticket_priority", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketPriority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
    Critical,
}

impl TicketPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketPriority::Low => "low",
            TicketPriority::Medium => "medium",
            TicketPriority::High => "high",
            TicketPriority::Urgent => "urgent",
            TicketPriority::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "ticket_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketType {
    #[default]
    Question,
    Incident,
    Problem,
    FeatureRequest,
    Bug,
    Task,
    Complaint,
    Feedback,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "ticket_source", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TicketSource {
    #[default]
    Web,
    Email,
    Api,
    Phone,
    Chat,
    Mobile,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub id: String,
    pub name: String,
    pub url: String,
    pub size: i64,
    pub mime_type: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Ticket {
    pub id: Uuid,
    pub tenant_id: String,
    pub ticket_number: String,

    pub subject: String,
    pub description: String,
    #[serde(rename = "type")]
    pub ticket_type: TicketType,
    pub status: TicketStatus,
    pub priority: TicketPriority,
    pub source: TicketSource,

    pub customer_id: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,

    pub department_id: Option<Uuid>,
    pub department_name: Option<String>,
    pub category_id: Option<Uuid>,
    pub category_name: Option<String>,

    pub assigned_to_id: Option<String>,
    pub assigned_to_name: Option<String>,
    pub assigned_to_email: Option<String>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub assigned_by_id: Option<String>,

    pub sla_policy_id: Option<Uuid>,
    pub first_response_due: Option<DateTime<Utc>>,
    pub resolution_due: Option<DateTime<Utc>>,
    pub first_responded_at: Option<DateTime<Utc>>,
    pub sla_breached: bool,
    pub response_sla_breached: bool,
    pub resolve_sla_breached: bool,

    pub parent_ticket_id: Option<Uuid>,
    pub related_ticket_ids: Vec<Uuid>,
    pub merged_into_id: Option<Uuid>,

    #[sqlx(json)]
    pub attachments: Vec<Attachment>,
    pub tags: Vec<String>,
    #[sqlx(json)]
    pub custom_fields: FieldMap,

    pub message_count: i32,
    pub internal_notes: i32,
    pub reopen_count: i32,
    pub escalation_level: i32,

    pub satisfaction_rating: Option<i32>,
    pub satisfaction_comment: Option<String>,
    pub rated_at: Option<DateTime<Utc>>,

    pub watcher_ids: Vec<String>,
    #[sqlx(json)]
    pub metadata: FieldMap,

    /// Bumped on every write; stale writers are rejected.
    pub version: i64,

    pub is_deleted: bool,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub last_activity_at: DateTime<Utc>,
    pub last_customer_reply_at: Option<DateTime<Utc>>,
    pub last_agent_reply_at: Option<DateTime<Utc>>,
}

impl Ticket {
    pub fn counts_as_open(&self) -> bool {
        self.status.counts_as_open()
    }

    pub fn is_assigned(&self) -> bool {
        self.assigned_to_id.is_some()
    }

    pub fn clear_assignment(&mut self) {
        self.assigned_to_id = None;
        self.assigned_to_name = None;
        self.assigned_to_email = None;
        self.assigned_at = None;
        self.assigned_by_id = None;
    }
}

/// Partial write applied by `TicketExt::update_ticket_fields`.
/// `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct TicketFieldsUpdate {
    pub status: Option<TicketStatus>,
    pub last_activity_at: Option<DateTime<Utc>>,
    pub last_customer_reply_at: Option<DateTime<Utc>>,
    pub last_agent_reply_at: Option<DateTime<Utc>>,
    pub first_responded_at: Option<DateTime<Utc>>,
}

impl TicketFieldsUpdate {
    pub fn apply(&self, ticket: &mut Ticket) {
        if let Some(status) = self.status {
            ticket.status = status;
        }
        if let Some(at) = self.last_activity_at {
            ticket.last_activity_at = at;
        }
        if let Some(at) = self.last_customer_reply_at {
            ticket.last_customer_reply_at = Some(at);
        }
        if let Some(at) = self.last_agent_reply_at {
            ticket.last_agent_reply_at = Some(at);
        }
        if let Some(at) = self.first_responded_at {
            ticket.first_responded_at = Some(at);
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "history_action", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HistoryAction {
    Created,
    Updated,
    Assigned,
    AutoAssigned,
    StatusChanged,
    Transferred,
    Rated,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TicketHistory {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub tenant_id: String,
    pub action: HistoryAction,
    pub field: Option<String>,
    pub old_value: Value,
    pub new_value: Value,
    pub changed_by: String,
    pub changed_by_name: String,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TicketSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Priority,
    Status,
    TicketNumber,
    LastActivityAt,
    ResolutionDue,
}

impl TicketSortField {
    pub fn column(&self) -> &'static str {
        match self {
            TicketSortField::CreatedAt => "created_at",
            TicketSortField::UpdatedAt => "updated_at",
            TicketSortField::Priority => "priority",
            TicketSortField::Status => "status",
            TicketSortField::TicketNumber => "ticket_number",
            TicketSortField::LastActivityAt => "last_activity_at",
            TicketSortField::ResolutionDue => "resolution_due",
        }
    }
}

/// Store-level listing filter. Every listing is tenant scoped.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub tenant_id: String,
    pub statuses: Vec<TicketStatus>,
    pub priorities: Vec<TicketPriority>,
    pub department_id: Option<Uuid>,
    pub category_id: Option<Uuid>,
    pub assigned_to_id: Option<String>,
    pub customer_id: Option<String>,
    pub unassigned_only: bool,
    pub sla_breached: Option<bool>,
    pub tags: Vec<String>,
    pub search: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub sort_by: TicketSortField,
    pub sort_desc: bool,
    pub page: i64,
    pub per_page: i64,
}

/// Rows to skip for a 1-based page; saturates instead of overflowing.
pub fn page_offset(page: i64, limit: i64) -> i64 {
    page.max(1).saturating_sub(1).saturating_mul(limit.max(0))
}

impl TicketFilter {
    pub fn for_tenant(tenant_id: &str) -> Self {
        TicketFilter {
            tenant_id: tenant_id.to_string(),
            sort_desc: true,
            page: 1,
            per_page: 20,
            ..Default::default()
        }
    }

    pub fn offset(&self) -> i64 {
        page_offset(self.page, self.limit())
    }

    pub fn limit(&self) -> i64 {
        self.per_page.clamp(1, 100)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketPage {
    pub tickets: Vec<Ticket>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, sqlx::FromRow)]
pub struct TicketStats {
    pub total: i64,
    pub open: i64,
    pub in_progress: i64,
    pub pending: i64,
    pub resolved: i64,
    pub closed: i64,
    pub unassigned: i64,
    pub sla_breached: i64,
    pub avg_rating: Option<f64>,
}
