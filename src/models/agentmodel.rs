// src/models/agentmodel.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use uuid::Uuid;

use super::ticketmodel::TicketPriority;

pub const DEFAULT_MAX_TICKETS: i32 = 20;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "agent_role", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    #[default]
    Agent,
    Supervisor,
    Manager,
    Admin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "agent_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Available,
    Busy,
    Away,
    #[default]
    Offline,
    OnBreak,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Agent {
    pub id: Uuid,
    pub tenant_id: String,
    /// External identity reference, the id carried in the bearer token.
    pub user_id: String,
    pub name: String,
    pub email: String,
    pub role: AgentRole,
    pub department_ids: Vec<Uuid>,
    pub team_id: Option<Uuid>,

    pub status: AgentStatus,
    pub last_active_at: Option<DateTime<Utc>>,

    pub max_tickets: i32,
    pub current_tickets: i32,
    pub tickets_today: i32,
    pub tickets_this_week: i32,
    pub tickets_this_month: i32,

    pub skills: Vec<String>,
    pub languages: Vec<String>,

    pub avg_rating: f64,
    pub total_resolved: i32,

    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn has_capacity(&self) -> bool {
        self.current_tickets < self.max_tickets
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SlaTarget {
    pub priority: TicketPriority,
    pub first_response_mins: i64,
    pub resolution_mins: i64,
    #[serde(default)]
    pub next_response_mins: i64,
    #[serde(default)]
    pub escalation_enabled: bool,
    #[serde(default)]
    pub escalation_after_mins: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SlaPolicy {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
    pub is_active: bool,
    #[sqlx(json)]
    pub targets: Vec<SlaTarget>,
    pub use_business_hours: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SlaPolicy {
    pub fn target_for(&self, priority: TicketPriority) -> Option<&SlaTarget> {
        self.targets.iter().find(|t| t.priority == priority)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CannedResponse {
    pub id: Uuid,
    pub tenant_id: String,
    pub title: String,
    pub content: String,
    pub shortcut: Option<String>,
    /// `None` means the response is global to the tenant.
    pub department_id: Option<Uuid>,
    pub category: Option<String>,
    pub tags: Vec<String>,
    pub usage_count: i32,
    pub created_by: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
