// src/models/departmentmodel.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ticketmodel::{FieldMap, TicketPriority};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaySchedule {
    /// 0 = Sunday .. 6 = Saturday
    pub day: u8,
    pub is_work_day: bool,
    /// "HH:MM"
    pub start_time: String,
    pub end_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Holiday {
    pub date: NaiveDate,
    pub name: String,
}

/// Weekly working schedule. Times are read as UTC.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusinessHours {
    pub enabled: bool,
    #[serde(default)]
    pub timezone: String,
    pub schedule: Vec<DaySchedule>,
    #[serde(default)]
    pub holidays: Vec<Holiday>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Department {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub email: Option<String>,

    pub parent_id: Option<Uuid>,
    pub path: String,
    pub level: i32,

    pub manager_id: Option<String>,
    pub manager_name: Option<String>,
    pub agent_ids: Vec<String>,

    pub auto_assign: bool,
    pub auto_assign_type: String,
    pub default_priority: TicketPriority,
    pub sla_policy_id: Option<Uuid>,
    #[sqlx(json)]
    pub business_hours: Option<BusinessHours>,

    pub open_tickets: i32,
    pub total_tickets: i32,

    #[sqlx(json)]
    pub metadata: FieldMap,

    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,

    pub parent_id: Option<Uuid>,
    pub path: String,
    pub level: i32,

    pub department_id: Option<Uuid>,
    pub default_priority: Option<TicketPriority>,

    pub sort_order: i32,
    pub is_active: bool,
    pub is_public: bool,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lowercased name with spaces replaced by dashes.
pub fn slugify(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_from_name() {
        assert_eq!(slugify("Billing Support"), "billing-support");
        assert_eq!(slugify("  Tier   2 "), "tier-2");
    }
}
