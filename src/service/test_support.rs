// service/test_support.rs
//! Fixtures shared by the service tests.
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    config::{SlaSettings, TicketSettings},
    db::{agentdb::AgentExt, departmentdb::DepartmentExt, memory::MemoryStore, Store},
    dtos::ticketdtos::CreateTicketDto,
    models::{
        agentmodel::{Agent, AgentRole, AgentStatus, SlaPolicy, SlaTarget},
        departmentmodel::{slugify, Department},
        ticketmodel::{FieldMap, TicketPriority},
        usermodel::{Actor, UserRole},
    },
    service::ticket_service::TicketService,
};

pub const TENANT: &str = "tenant-a";
pub const OTHER_TENANT: &str = "tenant-b";

pub fn actor(user_id: &str, role: UserRole) -> Actor {
    Actor {
        user_id: user_id.to_string(),
        tenant_id: TENANT.to_string(),
        name: format!("{} name", user_id),
        email: format!("{}@example.com", user_id),
        role,
    }
}

pub fn customer(user_id: &str) -> Actor {
    actor(user_id, UserRole::Customer)
}

pub fn staff(user_id: &str) -> Actor {
    actor(user_id, UserRole::Agent)
}

pub fn admin() -> Actor {
    actor("admin-1", UserRole::Admin)
}

pub fn department(name: &str) -> Department {
    let now = Utc::now();
    Department {
        id: Uuid::new_v4(),
        tenant_id: TENANT.to_string(),
        name: name.to_string(),
        slug: slugify(name),
        description: None,
        email: None,
        parent_id: None,
        path: format!("/{}", slugify(name)),
        level: 0,
        manager_id: None,
        manager_name: None,
        agent_ids: Vec::new(),
        auto_assign: true,
        auto_assign_type: "round_robin".to_string(),
        default_priority: TicketPriority::Medium,
        sla_policy_id: None,
        business_hours: None,
        open_tickets: 0,
        total_tickets: 0,
        metadata: FieldMap::new(),
        is_active: true,
        is_deleted: false,
        created_at: now,
        updated_at: now,
    }
}

pub fn agent(user_id: &str, department_ids: Vec<Uuid>, max_tickets: i32) -> Agent {
    let now = Utc::now();
    Agent {
        id: Uuid::new_v4(),
        tenant_id: TENANT.to_string(),
        user_id: user_id.to_string(),
        name: format!("{} name", user_id),
        email: format!("{}@example.com", user_id),
        role: AgentRole::Agent,
        department_ids,
        team_id: None,
        status: AgentStatus::Available,
        last_active_at: None,
        max_tickets,
        current_tickets: 0,
        tickets_today: 0,
        tickets_this_week: 0,
        tickets_this_month: 0,
        skills: Vec::new(),
        languages: Vec::new(),
        avg_rating: 0.0,
        total_resolved: 0,
        is_active: true,
        is_deleted: false,
        created_at: now,
        updated_at: now,
    }
}

/// A policy with a single `high` priority target.
pub fn policy(name: &str, is_default: bool, first_response_mins: i64, resolution_mins: i64) -> SlaPolicy {
    let now = Utc::now();
    SlaPolicy {
        id: Uuid::new_v4(),
        tenant_id: TENANT.to_string(),
        name: name.to_string(),
        description: None,
        is_default,
        is_active: true,
        targets: vec![SlaTarget {
            priority: TicketPriority::High,
            first_response_mins,
            resolution_mins,
            next_response_mins: 0,
            escalation_enabled: false,
            escalation_after_mins: 0,
        }],
        use_business_hours: false,
        created_at: now,
        updated_at: now,
    }
}

pub fn new_ticket(subject: &str) -> CreateTicketDto {
    CreateTicketDto {
        subject: subject.to_string(),
        description: format!("{} - details", subject),
        ..Default::default()
    }
}

pub fn engine(store: Arc<MemoryStore>) -> TicketService {
    engine_with(store, true)
}

pub fn engine_with(store: Arc<MemoryStore>, auto_assign_enabled: bool) -> TicketService {
    let store: Arc<dyn Store> = store;
    TicketService::new(
        store,
        SlaSettings::default(),
        TicketSettings {
            auto_assign_enabled,
            ..TicketSettings::default()
        },
    )
}

pub async fn seed_department(store: &MemoryStore, name: &str) -> Department {
    store.create_department(&department(name)).await.unwrap()
}

pub async fn seed_agent(store: &MemoryStore, user_id: &str, department_ids: Vec<Uuid>, max_tickets: i32) -> Agent {
    store
        .create_agent(&agent(user_id, department_ids, max_tickets))
        .await
        .unwrap()
}

pub async fn department_counts(store: &MemoryStore, department_id: Uuid) -> (i32, i32) {
    let dept = store.get_department(TENANT, department_id).await.unwrap().unwrap();
    (dept.open_tickets, dept.total_tickets)
}

pub async fn agent_load(store: &MemoryStore, user_id: &str) -> i32 {
    store
        .get_agent_by_user_id(TENANT, user_id)
        .await
        .unwrap()
        .unwrap()
        .current_tickets
}
