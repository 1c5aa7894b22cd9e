// dtos/admindtos.rs
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::{
    agentmodel::{AgentRole, AgentStatus, SlaTarget},
    departmentmodel::BusinessHours,
    ticketmodel::TicketPriority,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateAgentDto {
    #[validate(length(min = 1, message = "User id is required"))]
    pub user_id: String,

    #[validate(length(min = 1, max = 200, message = "Name must be between 1 and 200 characters"))]
    pub name: String,

    #[validate(email(message = "Email is invalid"))]
    pub email: String,

    pub role: Option<AgentRole>,
    pub department_ids: Option<Vec<Uuid>>,
    pub team_id: Option<Uuid>,

    #[validate(range(min = 1, max = 500, message = "Max tickets must be between 1 and 500"))]
    pub max_tickets: Option<i32>,

    pub skills: Option<Vec<String>>,
    pub languages: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateAgentDto {
    #[validate(length(min = 1, max = 200, message = "Name must be between 1 and 200 characters"))]
    pub name: Option<String>,

    #[validate(email(message = "Email is invalid"))]
    pub email: Option<String>,

    pub role: Option<AgentRole>,
    pub department_ids: Option<Vec<Uuid>>,
    pub team_id: Option<Uuid>,

    #[validate(range(min = 1, max = 500, message = "Max tickets must be between 1 and 500"))]
    pub max_tickets: Option<i32>,

    pub skills: Option<Vec<String>>,
    pub languages: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateAgentStatusDto {
    pub status: AgentStatus,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateDepartmentDto {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,

    #[validate(length(max = 1000))]
    pub description: Option<String>,

    #[validate(email(message = "Email is invalid"))]
    pub email: Option<String>,

    pub parent_id: Option<Uuid>,
    pub manager_id: Option<String>,
    pub manager_name: Option<String>,
    pub auto_assign: Option<bool>,
    pub auto_assign_type: Option<String>,
    pub default_priority: Option<TicketPriority>,
    pub sla_policy_id: Option<Uuid>,
    pub business_hours: Option<BusinessHours>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateDepartmentDto {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 1000))]
    pub description: Option<String>,

    #[validate(email(message = "Email is invalid"))]
    pub email: Option<String>,

    pub manager_id: Option<String>,
    pub manager_name: Option<String>,
    pub auto_assign: Option<bool>,
    pub auto_assign_type: Option<String>,
    pub default_priority: Option<TicketPriority>,
    pub sla_policy_id: Option<Uuid>,
    pub business_hours: Option<BusinessHours>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DepartmentAgentDto {
    #[validate(length(min = 1, message = "Agent id is required"))]
    pub agent_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateCategoryDto {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,

    #[validate(length(max = 1000))]
    pub description: Option<String>,

    pub parent_id: Option<Uuid>,
    pub department_id: Option<Uuid>,
    pub default_priority: Option<TicketPriority>,
    pub sort_order: Option<i32>,
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateCategoryDto {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,

    #[validate(length(max = 1000))]
    pub description: Option<String>,

    pub department_id: Option<Uuid>,
    pub default_priority: Option<TicketPriority>,
    pub sort_order: Option<i32>,
    pub is_public: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SlaTargetDto {
    pub priority: TicketPriority,

    #[validate(range(min = 1, max = 2628000, message = "First response target must be between one minute and five years"))]
    pub first_response_mins: i64,

    #[validate(range(min = 1, max = 2628000, message = "Resolution target must be between one minute and five years"))]
    pub resolution_mins: i64,

    #[validate(range(min = 0, max = 2628000))]
    pub next_response_mins: Option<i64>,
    pub escalation_enabled: Option<bool>,
    #[validate(range(min = 0, max = 2628000))]
    pub escalation_after_mins: Option<i64>,
}

impl SlaTargetDto {
    pub fn into_target(self) -> SlaTarget {
        SlaTarget {
            priority: self.priority,
            first_response_mins: self.first_response_mins,
            resolution_mins: self.resolution_mins,
            next_response_mins: self.next_response_mins.unwrap_or(0),
            escalation_enabled: self.escalation_enabled.unwrap_or(false),
            escalation_after_mins: self.escalation_after_mins.unwrap_or(0),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateSlaPolicyDto {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: String,

    pub description: Option<String>,
    pub is_default: Option<bool>,

    #[validate(length(min = 1, message = "At least one priority target is required"))]
    pub targets: Vec<SlaTargetDto>,

    pub use_business_hours: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateSlaPolicyDto {
    #[validate(length(min = 1, max = 100, message = "Name must be between 1 and 100 characters"))]
    pub name: Option<String>,

    pub description: Option<String>,
    pub is_default: Option<bool>,
    pub is_active: Option<bool>,

    pub targets: Option<Vec<SlaTargetDto>>,

    pub use_business_hours: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct CreateCannedResponseDto {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: String,

    #[validate(length(min = 1, max = 10000, message = "Content must be between 1 and 10000 characters"))]
    pub content: String,

    #[validate(length(min = 1, max = 50, message = "Shortcut must be between 1 and 50 characters"))]
    pub shortcut: Option<String>,

    pub department_id: Option<Uuid>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateCannedResponseDto {
    #[validate(length(min = 1, max = 200, message = "Title must be between 1 and 200 characters"))]
    pub title: Option<String>,

    #[validate(length(min = 1, max = 10000, message = "Content must be between 1 and 10000 characters"))]
    pub content: Option<String>,

    #[validate(length(min = 1, max = 50, message = "Shortcut must be between 1 and 50 characters"))]
    pub shortcut: Option<String>,

    pub department_id: Option<Uuid>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepartmentScopeQueryDto {
    pub department_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DepartmentListQueryDto {
    pub active_only: Option<bool>,
}
