// src/db/memory.rs
//! In-process store used when no `DATABASE_URL` is configured and by the
//! service tests. One lock guards every table, so each call is atomic.
use std::{
    cmp::Ordering,
    collections::HashMap,
    sync::atomic::{AtomicBool, Ordering as AtomicOrdering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    agentdb::AgentExt,
    departmentdb::{CategoryExt, DepartmentExt},
    messagedb::{HistoryExt, MessageExt},
    sladb::{CannedResponseExt, SlaPolicyExt},
    ticketdb::{format_ticket_number, TicketExt},
    DbError,
};
use crate::models::{
    agentmodel::{Agent, AgentStatus, CannedResponse, SlaPolicy},
    departmentmodel::{Category, Department},
    messagemodel::TicketMessage,
    ticketmodel::*,
};

#[derive(Default)]
struct Tables {
    counters: HashMap<String, i64>,
    tickets: HashMap<Uuid, Ticket>,
    messages: HashMap<Uuid, TicketMessage>,
    history: Vec<TicketHistory>,
    departments: HashMap<Uuid, Department>,
    categories: HashMap<Uuid, Category>,
    agents: HashMap<Uuid, Agent>,
    sla_policies: HashMap<Uuid, SlaPolicy>,
    canned_responses: HashMap<Uuid, CannedResponse>,
}

impl Tables {
    fn agent_mut(&mut self, tenant_id: &str, user_id: &str) -> Option<&mut Agent> {
        self.agents
            .values_mut()
            .find(|a| a.tenant_id == tenant_id && a.user_id == user_id && !a.is_deleted)
    }

    fn department_mut(&mut self, tenant_id: &str, department_id: Uuid) -> Option<&mut Department> {
        self.departments
            .get_mut(&department_id)
            .filter(|d| d.tenant_id == tenant_id)
    }

    fn live_ticket_mut(&mut self, tenant_id: &str, ticket_id: Uuid) -> Option<&mut Ticket> {
        self.tickets
            .get_mut(&ticket_id)
            .filter(|t| t.tenant_id == tenant_id && !t.is_deleted)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    fail_history: AtomicBool,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every history write fail until switched off again.
    pub fn set_history_failure(&self, fail: bool) {
        self.fail_history.store(fail, AtomicOrdering::SeqCst);
    }
}

fn ticket_matches(ticket: &Ticket, filter: &TicketFilter) -> bool {
    if ticket.is_deleted || ticket.tenant_id != filter.tenant_id {
        return false;
    }
    if !filter.statuses.is_empty() && !filter.statuses.contains(&ticket.status) {
        return false;
    }
    if !filter.priorities.is_empty() && !filter.priorities.contains(&ticket.priority) {
        return false;
    }
    if filter.department_id.is_some() && ticket.department_id != filter.department_id {
        return false;
    }
    if filter.category_id.is_some() && ticket.category_id != filter.category_id {
        return false;
    }
    if filter.assigned_to_id.is_some() && ticket.assigned_to_id != filter.assigned_to_id {
        return false;
    }
    if let Some(ref customer) = filter.customer_id {
        if &ticket.customer_id != customer {
            return false;
        }
    }
    if filter.unassigned_only && ticket.assigned_to_id.is_some() {
        return false;
    }
    if let Some(breached) = filter.sla_breached {
        if ticket.sla_breached != breached {
            return false;
        }
    }
    if !filter.tags.iter().all(|tag| ticket.tags.contains(tag)) {
        return false;
    }
    if let Some(ref search) = filter.search {
        let needle = search.to_lowercase();
        let hit = ticket.subject.to_lowercase().contains(&needle)
            || ticket.description.to_lowercase().contains(&needle)
            || ticket.ticket_number.to_lowercase().contains(&needle);
        if !hit {
            return false;
        }
    }
    if let Some(from) = filter.created_from {
        if ticket.created_at < from {
            return false;
        }
    }
    if let Some(to) = filter.created_to {
        if ticket.created_at > to {
            return false;
        }
    }
    true
}

fn compare_tickets(a: &Ticket, b: &Ticket, sort_by: TicketSortField) -> Ordering {
    match sort_by {
        TicketSortField::CreatedAt => a.created_at.cmp(&b.created_at),
        TicketSortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
        TicketSortField::Priority => (a.priority as u8).cmp(&(b.priority as u8)),
        TicketSortField::Status => (a.status as u8).cmp(&(b.status as u8)),
        TicketSortField::TicketNumber => a.ticket_number.cmp(&b.ticket_number),
        TicketSortField::LastActivityAt => a.last_activity_at.cmp(&b.last_activity_at),
        TicketSortField::ResolutionDue => a.resolution_due.cmp(&b.resolution_due),
    }
}

fn is_live(status: TicketStatus) -> bool {
    !matches!(
        status,
        TicketStatus::Resolved | TicketStatus::Closed | TicketStatus::Cancelled
    )
}

#[async_trait]
impl TicketExt for MemoryStore {
    async fn next_ticket_number(&self, tenant_id: &str) -> Result<String, DbError> {
        let mut tables = self.tables.write().await;
        let sequence = tables.counters.entry(tenant_id.to_string()).or_insert(0);
        *sequence += 1;
        Ok(format_ticket_number(*sequence))
    }

    async fn create_ticket(&self, ticket: &Ticket) -> Result<Ticket, DbError> {
        let mut tables = self.tables.write().await;
        let duplicate = tables
            .tickets
            .values()
            .any(|t| t.tenant_id == ticket.tenant_id && t.ticket_number == ticket.ticket_number);
        if duplicate {
            return Err(DbError::Duplicate("ticket number".to_string()));
        }
        tables.tickets.insert(ticket.id, ticket.clone());
        Ok(ticket.clone())
    }

    async fn get_ticket(&self, tenant_id: &str, ticket_id: Uuid) -> Result<Option<Ticket>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .tickets
            .get(&ticket_id)
            .filter(|t| t.tenant_id == tenant_id && !t.is_deleted)
            .cloned())
    }

    async fn get_ticket_by_number(
        &self,
        tenant_id: &str,
        ticket_number: &str,
    ) -> Result<Option<Ticket>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .tickets
            .values()
            .find(|t| t.tenant_id == tenant_id && t.ticket_number == ticket_number && !t.is_deleted)
            .cloned())
    }

    async fn update_ticket(&self, ticket: &Ticket) -> Result<Ticket, DbError> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .tickets
            .get_mut(&ticket.id)
            .filter(|t| t.tenant_id == ticket.tenant_id && t.version == ticket.version)
            .ok_or_else(|| DbError::Conflict(format!("ticket {}", ticket.ticket_number)))?;

        let created_at = stored.created_at;
        *stored = ticket.clone();
        stored.created_at = created_at;
        stored.version += 1;
        Ok(stored.clone())
    }

    async fn update_ticket_fields(
        &self,
        tenant_id: &str,
        ticket_id: Uuid,
        fields: &TicketFieldsUpdate,
    ) -> Result<Option<Ticket>, DbError> {
        let mut tables = self.tables.write().await;
        Ok(tables.live_ticket_mut(tenant_id, ticket_id).map(|ticket| {
            fields.apply(ticket);
            ticket.updated_at = Utc::now();
            ticket.version += 1;
            ticket.clone()
        }))
    }

    async fn increment_message_count(
        &self,
        tenant_id: &str,
        ticket_id: Uuid,
        is_private: bool,
    ) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        if let Some(ticket) = tables.tickets.get_mut(&ticket_id).filter(|t| t.tenant_id == tenant_id) {
            ticket.message_count += 1;
            if is_private {
                ticket.internal_notes += 1;
            }
            ticket.version += 1;
        }
        Ok(())
    }

    async fn soft_delete_ticket(
        &self,
        tenant_id: &str,
        ticket_id: Uuid,
        deleted_by: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let mut tables = self.tables.write().await;
        Ok(match tables.live_ticket_mut(tenant_id, ticket_id) {
            Some(ticket) => {
                ticket.is_deleted = true;
                ticket.deleted_by = Some(deleted_by.to_string());
                ticket.deleted_at = Some(deleted_at);
                ticket.updated_at = deleted_at;
                ticket.version += 1;
                true
            }
            None => false,
        })
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> Result<(Vec<Ticket>, i64), DbError> {
        let tables = self.tables.read().await;
        let mut tickets: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| ticket_matches(t, filter))
            .cloned()
            .collect();

        tickets.sort_by(|a, b| {
            let ordering = compare_tickets(a, b, filter.sort_by).then_with(|| a.id.cmp(&b.id));
            if filter.sort_desc {
                ordering.reverse()
            } else {
                ordering
            }
        });

        let total = tickets.len() as i64;
        let page = tickets
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit() as usize)
            .collect();
        Ok((page, total))
    }

    async fn get_tickets_due_soon(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Ticket>, DbError> {
        let in_window = |due: Option<DateTime<Utc>>| due.map_or(false, |d| d > now && d <= until);

        let tables = self.tables.read().await;
        let mut tickets: Vec<Ticket> = tables
            .tickets
            .values()
            .filter(|t| {
                t.tenant_id == tenant_id
                    && !t.is_deleted
                    && !t.sla_breached
                    && is_live(t.status)
                    && ((t.first_responded_at.is_none() && in_window(t.first_response_due))
                        || in_window(t.resolution_due))
            })
            .cloned()
            .collect();
        tickets.sort_by(|a, b| match (a.resolution_due, b.resolution_due) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        tickets.truncate(limit.max(0) as usize);
        Ok(tickets)
    }

    async fn get_ticket_stats(&self, tenant_id: &str) -> Result<TicketStats, DbError> {
        let tables = self.tables.read().await;
        let mut stats = TicketStats::default();
        let mut rating_sum = 0i64;
        let mut rating_count = 0i64;

        for ticket in tables
            .tickets
            .values()
            .filter(|t| t.tenant_id == tenant_id && !t.is_deleted)
        {
            stats.total += 1;
            match ticket.status {
                TicketStatus::Open => stats.open += 1,
                TicketStatus::InProgress => stats.in_progress += 1,
                TicketStatus::Pending => stats.pending += 1,
                TicketStatus::Resolved => stats.resolved += 1,
                TicketStatus::Closed => stats.closed += 1,
                _ => {}
            }
            if ticket.assigned_to_id.is_none() && is_live(ticket.status) {
                stats.unassigned += 1;
            }
            if ticket.sla_breached {
                stats.sla_breached += 1;
            }
            if let Some(rating) = ticket.satisfaction_rating {
                rating_sum += rating as i64;
                rating_count += 1;
            }
        }

        if rating_count > 0 {
            stats.avg_rating = Some(rating_sum as f64 / rating_count as f64);
        }
        Ok(stats)
    }

    async fn mark_sla_breaches(&self, now: DateTime<Utc>) -> Result<u64, DbError> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;

        for ticket in tables
            .tickets
            .values_mut()
            .filter(|t| !t.is_deleted && is_live(t.status))
        {
            let response_breach = !ticket.response_sla_breached
                && ticket.first_responded_at.is_none()
                && ticket.first_response_due.map_or(false, |due| due < now);
            let resolve_breach =
                !ticket.resolve_sla_breached && ticket.resolution_due.map_or(false, |due| due < now);

            if response_breach || resolve_breach {
                ticket.response_sla_breached |= response_breach;
                ticket.resolve_sla_breached |= resolve_breach;
                ticket.sla_breached = true;
                ticket.version += 1;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl MessageExt for MemoryStore {
    async fn create_message(&self, message: &TicketMessage) -> Result<TicketMessage, DbError> {
        let mut tables = self.tables.write().await;
        tables.messages.insert(message.id, message.clone());
        Ok(message.clone())
    }

    async fn get_message(
        &self,
        tenant_id: &str,
        message_id: Uuid,
    ) -> Result<Option<TicketMessage>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .get(&message_id)
            .filter(|m| m.tenant_id == tenant_id && !m.is_deleted)
            .cloned())
    }

    async fn update_message(&self, message: &TicketMessage) -> Result<TicketMessage, DbError> {
        let mut tables = self.tables.write().await;
        match tables
            .messages
            .get_mut(&message.id)
            .filter(|m| m.tenant_id == message.tenant_id)
        {
            Some(stored) => {
                *stored = message.clone();
                Ok(stored.clone())
            }
            None => Err(DbError::Sqlx(sqlx::Error::RowNotFound)),
        }
    }

    async fn list_messages(
        &self,
        tenant_id: &str,
        ticket_id: Uuid,
        include_private: bool,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<TicketMessage>, i64), DbError> {
        let limit = per_page.clamp(1, 100);
        let offset = page_offset(page, limit);

        let tables = self.tables.read().await;
        let mut messages: Vec<TicketMessage> = tables
            .messages
            .values()
            .filter(|m| {
                m.tenant_id == tenant_id
                    && m.ticket_id == ticket_id
                    && !m.is_deleted
                    && (include_private || !m.is_private)
            })
            .cloned()
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

        let total = messages.len() as i64;
        let page = messages
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok((page, total))
    }
}

#[async_trait]
impl HistoryExt for MemoryStore {
    async fn create_history(&self, entry: &TicketHistory) -> Result<(), DbError> {
        if self.fail_history.load(AtomicOrdering::SeqCst) {
            return Err(DbError::Sqlx(sqlx::Error::PoolTimedOut));
        }
        let mut tables = self.tables.write().await;
        tables.history.push(entry.clone());
        Ok(())
    }

    async fn list_history(
        &self,
        tenant_id: &str,
        ticket_id: Uuid,
    ) -> Result<Vec<TicketHistory>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .history
            .iter()
            .filter(|h| h.tenant_id == tenant_id && h.ticket_id == ticket_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl DepartmentExt for MemoryStore {
    async fn create_department(&self, department: &Department) -> Result<Department, DbError> {
        let mut tables = self.tables.write().await;
        let duplicate = tables.departments.values().any(|d| {
            d.tenant_id == department.tenant_id && d.slug == department.slug && !d.is_deleted
        });
        if duplicate {
            return Err(DbError::Duplicate("department slug".to_string()));
        }
        tables.departments.insert(department.id, department.clone());
        Ok(department.clone())
    }

    async fn get_department(
        &self,
        tenant_id: &str,
        department_id: Uuid,
    ) -> Result<Option<Department>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .departments
            .get(&department_id)
            .filter(|d| d.tenant_id == tenant_id && !d.is_deleted)
            .cloned())
    }

    async fn update_department(&self, department: &Department) -> Result<Department, DbError> {
        let mut tables = self.tables.write().await;
        let duplicate = tables.departments.values().any(|d| {
            d.id != department.id
                && d.tenant_id == department.tenant_id
                && d.slug == department.slug
                && !d.is_deleted
        });
        if duplicate {
            return Err(DbError::Duplicate("department slug".to_string()));
        }

        let stored = tables
            .department_mut(&department.tenant_id, department.id)
            .filter(|d| !d.is_deleted)
            .ok_or(DbError::Sqlx(sqlx::Error::RowNotFound))?;
        let (open_tickets, total_tickets, created_at) =
            (stored.open_tickets, stored.total_tickets, stored.created_at);
        *stored = department.clone();
        stored.open_tickets = open_tickets;
        stored.total_tickets = total_tickets;
        stored.created_at = created_at;
        Ok(stored.clone())
    }

    async fn soft_delete_department(&self, tenant_id: &str, department_id: Uuid) -> Result<bool, DbError> {
        let mut tables = self.tables.write().await;
        Ok(match tables.department_mut(tenant_id, department_id).filter(|d| !d.is_deleted) {
            Some(department) => {
                department.is_deleted = true;
                department.is_active = false;
                department.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn list_departments(&self, tenant_id: &str, active_only: bool) -> Result<Vec<Department>, DbError> {
        let tables = self.tables.read().await;
        let mut departments: Vec<Department> = tables
            .departments
            .values()
            .filter(|d| d.tenant_id == tenant_id && !d.is_deleted && (!active_only || d.is_active))
            .cloned()
            .collect();
        departments.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(departments)
    }

    async fn increment_department_tickets(
        &self,
        tenant_id: &str,
        department_id: Uuid,
        is_open: bool,
    ) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        if let Some(department) = tables.department_mut(tenant_id, department_id) {
            department.total_tickets += 1;
            if is_open {
                department.open_tickets += 1;
            }
        }
        Ok(())
    }

    async fn increment_department_open_tickets(
        &self,
        tenant_id: &str,
        department_id: Uuid,
    ) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        if let Some(department) = tables.department_mut(tenant_id, department_id) {
            department.open_tickets += 1;
        }
        Ok(())
    }

    async fn decrement_department_open_tickets(
        &self,
        tenant_id: &str,
        department_id: Uuid,
    ) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        if let Some(department) = tables.department_mut(tenant_id, department_id) {
            department.open_tickets = (department.open_tickets - 1).max(0);
        }
        Ok(())
    }
}

#[async_trait]
impl CategoryExt for MemoryStore {
    async fn create_category(&self, category: &Category) -> Result<Category, DbError> {
        let mut tables = self.tables.write().await;
        tables.categories.insert(category.id, category.clone());
        Ok(category.clone())
    }

    async fn get_category(&self, tenant_id: &str, category_id: Uuid) -> Result<Option<Category>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .categories
            .get(&category_id)
            .filter(|c| c.tenant_id == tenant_id && !c.is_deleted)
            .cloned())
    }

    async fn update_category(&self, category: &Category) -> Result<Category, DbError> {
        let mut tables = self.tables.write().await;
        match tables
            .categories
            .get_mut(&category.id)
            .filter(|c| c.tenant_id == category.tenant_id && !c.is_deleted)
        {
            Some(stored) => {
                let created_at = stored.created_at;
                *stored = category.clone();
                stored.created_at = created_at;
                Ok(stored.clone())
            }
            None => Err(DbError::Sqlx(sqlx::Error::RowNotFound)),
        }
    }

    async fn soft_delete_category(&self, tenant_id: &str, category_id: Uuid) -> Result<bool, DbError> {
        let mut tables = self.tables.write().await;
        Ok(match tables
            .categories
            .get_mut(&category_id)
            .filter(|c| c.tenant_id == tenant_id && !c.is_deleted)
        {
            Some(category) => {
                category.is_deleted = true;
                category.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn list_categories(
        &self,
        tenant_id: &str,
        department_id: Option<Uuid>,
        public_only: bool,
    ) -> Result<Vec<Category>, DbError> {
        let tables = self.tables.read().await;
        let mut categories: Vec<Category> = tables
            .categories
            .values()
            .filter(|c| {
                c.tenant_id == tenant_id
                    && !c.is_deleted
                    && c.is_active
                    && (department_id.is_none()
                        || c.department_id.is_none()
                        || c.department_id == department_id)
                    && (!public_only || c.is_public)
            })
            .cloned()
            .collect();
        categories.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then_with(|| a.name.cmp(&b.name)));
        Ok(categories)
    }
}

#[async_trait]
impl AgentExt for MemoryStore {
    async fn create_agent(&self, agent: &Agent) -> Result<Agent, DbError> {
        let mut tables = self.tables.write().await;
        if tables.agent_mut(&agent.tenant_id, &agent.user_id).is_some() {
            return Err(DbError::Duplicate("agent".to_string()));
        }
        tables.agents.insert(agent.id, agent.clone());
        Ok(agent.clone())
    }

    async fn get_agent(&self, tenant_id: &str, agent_id: Uuid) -> Result<Option<Agent>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .agents
            .get(&agent_id)
            .filter(|a| a.tenant_id == tenant_id && !a.is_deleted)
            .cloned())
    }

    async fn get_agent_by_user_id(&self, tenant_id: &str, user_id: &str) -> Result<Option<Agent>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .agents
            .values()
            .find(|a| a.tenant_id == tenant_id && a.user_id == user_id && !a.is_deleted)
            .cloned())
    }

    async fn update_agent(&self, agent: &Agent) -> Result<Agent, DbError> {
        let mut tables = self.tables.write().await;
        match tables
            .agents
            .get_mut(&agent.id)
            .filter(|a| a.tenant_id == agent.tenant_id && !a.is_deleted)
        {
            Some(stored) => {
                stored.name = agent.name.clone();
                stored.email = agent.email.clone();
                stored.role = agent.role;
                stored.department_ids = agent.department_ids.clone();
                stored.team_id = agent.team_id;
                stored.status = agent.status;
                stored.max_tickets = agent.max_tickets;
                stored.skills = agent.skills.clone();
                stored.languages = agent.languages.clone();
                stored.is_active = agent.is_active;
                stored.updated_at = agent.updated_at;
                Ok(stored.clone())
            }
            None => Err(DbError::Sqlx(sqlx::Error::RowNotFound)),
        }
    }

    async fn soft_delete_agent(&self, tenant_id: &str, agent_id: Uuid) -> Result<bool, DbError> {
        let mut tables = self.tables.write().await;
        Ok(match tables
            .agents
            .get_mut(&agent_id)
            .filter(|a| a.tenant_id == tenant_id && !a.is_deleted)
        {
            Some(agent) => {
                agent.is_deleted = true;
                agent.is_active = false;
                agent.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn list_agents(&self, tenant_id: &str, department_id: Option<Uuid>) -> Result<Vec<Agent>, DbError> {
        let tables = self.tables.read().await;
        let mut agents: Vec<Agent> = tables
            .agents
            .values()
            .filter(|a| {
                a.tenant_id == tenant_id
                    && !a.is_deleted
                    && department_id.map_or(true, |d| a.department_ids.contains(&d))
            })
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(agents)
    }

    async fn list_available_agents(
        &self,
        tenant_id: &str,
        department_id: Option<Uuid>,
    ) -> Result<Vec<Agent>, DbError> {
        let tables = self.tables.read().await;
        let mut agents: Vec<Agent> = tables
            .agents
            .values()
            .filter(|a| {
                a.tenant_id == tenant_id
                    && !a.is_deleted
                    && a.is_active
                    && a.status == AgentStatus::Available
                    && a.has_capacity()
                    && department_id.map_or(true, |d| a.department_ids.contains(&d))
            })
            .cloned()
            .collect();
        agents.sort_by(|a, b| {
            a.current_tickets
                .cmp(&b.current_tickets)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(agents)
    }

    async fn update_agent_status(
        &self,
        tenant_id: &str,
        user_id: &str,
        status: AgentStatus,
    ) -> Result<Option<Agent>, DbError> {
        let mut tables = self.tables.write().await;
        Ok(tables.agent_mut(tenant_id, user_id).map(|agent| {
            let now = Utc::now();
            agent.status = status;
            agent.last_active_at = Some(now);
            agent.updated_at = now;
            agent.clone()
        }))
    }

    async fn try_increment_agent_tickets(&self, tenant_id: &str, user_id: &str) -> Result<bool, DbError> {
        let mut tables = self.tables.write().await;
        Ok(match tables.agent_mut(tenant_id, user_id) {
            Some(agent) if agent.has_capacity() => {
                agent.current_tickets += 1;
                agent.tickets_today += 1;
                agent.tickets_this_week += 1;
                agent.tickets_this_month += 1;
                true
            }
            _ => false,
        })
    }

    async fn increment_agent_tickets(&self, tenant_id: &str, user_id: &str) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        if let Some(agent) = tables.agent_mut(tenant_id, user_id) {
            agent.current_tickets += 1;
        }
        Ok(())
    }

    async fn decrement_agent_tickets(&self, tenant_id: &str, user_id: &str) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        if let Some(agent) = tables.agent_mut(tenant_id, user_id) {
            agent.current_tickets = (agent.current_tickets - 1).max(0);
        }
        Ok(())
    }

    async fn increment_agent_resolved(&self, tenant_id: &str, user_id: &str) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        if let Some(agent) = tables.agent_mut(tenant_id, user_id) {
            agent.total_resolved += 1;
        }
        Ok(())
    }

    async fn update_agent_rating(&self, tenant_id: &str, user_id: &str, avg_rating: f64) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        if let Some(agent) = tables.agent_mut(tenant_id, user_id) {
            agent.avg_rating = avg_rating;
            agent.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl SlaPolicyExt for MemoryStore {
    async fn create_sla_policy(&self, policy: &SlaPolicy) -> Result<SlaPolicy, DbError> {
        let mut tables = self.tables.write().await;
        tables.sla_policies.insert(policy.id, policy.clone());
        Ok(policy.clone())
    }

    async fn get_sla_policy(&self, tenant_id: &str, policy_id: Uuid) -> Result<Option<SlaPolicy>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .sla_policies
            .get(&policy_id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned())
    }

    async fn get_default_sla_policy(&self, tenant_id: &str) -> Result<Option<SlaPolicy>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .sla_policies
            .values()
            .filter(|p| p.tenant_id == tenant_id && p.is_default && p.is_active)
            .max_by_key(|p| p.updated_at)
            .cloned())
    }

    async fn update_sla_policy(&self, policy: &SlaPolicy) -> Result<SlaPolicy, DbError> {
        let mut tables = self.tables.write().await;
        match tables
            .sla_policies
            .get_mut(&policy.id)
            .filter(|p| p.tenant_id == policy.tenant_id)
        {
            Some(stored) => {
                let created_at = stored.created_at;
                *stored = policy.clone();
                stored.created_at = created_at;
                Ok(stored.clone())
            }
            None => Err(DbError::Sqlx(sqlx::Error::RowNotFound)),
        }
    }

    async fn delete_sla_policy(&self, tenant_id: &str, policy_id: Uuid) -> Result<bool, DbError> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .sla_policies
            .get(&policy_id)
            .map_or(false, |p| p.tenant_id == tenant_id);
        Ok(owned && tables.sla_policies.remove(&policy_id).is_some())
    }

    async fn list_sla_policies(&self, tenant_id: &str) -> Result<Vec<SlaPolicy>, DbError> {
        let tables = self.tables.read().await;
        let mut policies: Vec<SlaPolicy> = tables
            .sla_policies
            .values()
            .filter(|p| p.tenant_id == tenant_id)
            .cloned()
            .collect();
        policies.sort_by(|a, b| b.is_default.cmp(&a.is_default).then_with(|| a.name.cmp(&b.name)));
        Ok(policies)
    }

    async fn clear_default_sla_policy(&self, tenant_id: &str, keep: Uuid) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        for policy in tables
            .sla_policies
            .values_mut()
            .filter(|p| p.tenant_id == tenant_id && p.id != keep && p.is_default)
        {
            policy.is_default = false;
            policy.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl CannedResponseExt for MemoryStore {
    async fn create_canned_response(&self, response: &CannedResponse) -> Result<CannedResponse, DbError> {
        let mut tables = self.tables.write().await;
        if let Some(ref shortcut) = response.shortcut {
            let taken = tables.canned_responses.values().any(|r| {
                r.tenant_id == response.tenant_id && r.shortcut.as_ref() == Some(shortcut)
            });
            if taken {
                return Err(DbError::Duplicate("canned response shortcut".to_string()));
            }
        }
        tables.canned_responses.insert(response.id, response.clone());
        Ok(response.clone())
    }

    async fn get_canned_response(
        &self,
        tenant_id: &str,
        response_id: Uuid,
    ) -> Result<Option<CannedResponse>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .canned_responses
            .get(&response_id)
            .filter(|r| r.tenant_id == tenant_id)
            .cloned())
    }

    async fn get_canned_response_by_shortcut(
        &self,
        tenant_id: &str,
        shortcut: &str,
    ) -> Result<Option<CannedResponse>, DbError> {
        let tables = self.tables.read().await;
        Ok(tables
            .canned_responses
            .values()
            .find(|r| r.tenant_id == tenant_id && r.shortcut.as_deref() == Some(shortcut))
            .cloned())
    }

    async fn update_canned_response(&self, response: &CannedResponse) -> Result<CannedResponse, DbError> {
        let mut tables = self.tables.write().await;
        if let Some(ref shortcut) = response.shortcut {
            let taken = tables.canned_responses.values().any(|r| {
                r.id != response.id
                    && r.tenant_id == response.tenant_id
                    && r.shortcut.as_ref() == Some(shortcut)
            });
            if taken {
                return Err(DbError::Duplicate("canned response shortcut".to_string()));
            }
        }
        match tables
            .canned_responses
            .get_mut(&response.id)
            .filter(|r| r.tenant_id == response.tenant_id)
        {
            Some(stored) => {
                let (usage_count, created_at) = (stored.usage_count, stored.created_at);
                *stored = response.clone();
                stored.usage_count = usage_count;
                stored.created_at = created_at;
                Ok(stored.clone())
            }
            None => Err(DbError::Sqlx(sqlx::Error::RowNotFound)),
        }
    }

    async fn delete_canned_response(&self, tenant_id: &str, response_id: Uuid) -> Result<bool, DbError> {
        let mut tables = self.tables.write().await;
        let owned = tables
            .canned_responses
            .get(&response_id)
            .map_or(false, |r| r.tenant_id == tenant_id);
        Ok(owned && tables.canned_responses.remove(&response_id).is_some())
    }

    async fn list_canned_responses(
        &self,
        tenant_id: &str,
        department_id: Option<Uuid>,
    ) -> Result<Vec<CannedResponse>, DbError> {
        let tables = self.tables.read().await;
        let mut responses: Vec<CannedResponse> = tables
            .canned_responses
            .values()
            .filter(|r| {
                r.tenant_id == tenant_id
                    && r.is_active
                    && (r.department_id.is_none() || r.department_id == department_id)
            })
            .cloned()
            .collect();
        responses.sort_by(|a, b| {
            b.usage_count
                .cmp(&a.usage_count)
                .then_with(|| a.title.cmp(&b.title))
        });
        Ok(responses)
    }

    async fn increment_canned_usage(&self, tenant_id: &str, response_id: Uuid) -> Result<(), DbError> {
        let mut tables = self.tables.write().await;
        if let Some(response) = tables
            .canned_responses
            .get_mut(&response_id)
            .filter(|r| r.tenant_id == tenant_id)
        {
            response.usage_count += 1;
        }
        Ok(())
    }
}
