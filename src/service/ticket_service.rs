// service/ticket_service.rs
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    config::{SlaSettings, TicketSettings},
    db::Store,
    dtos::ticketdtos::{
        AddReplyDto, AttachmentDto, ChangeStatusDto, CreateTicketDto, EditMessageDto, RateTicketDto,
        TransferTicketDto, UpdateTicketDto,
    },
    models::{
        departmentmodel::{Category, Department},
        messagemodel::{MessageType, SenderType, TicketMessage},
        ticketmodel::{
            Attachment, FieldMap, Ticket, TicketFieldsUpdate, TicketFilter, TicketHistory, TicketPage,
            TicketStats, TicketStatus,
        },
        usermodel::{Actor, UserRole},
    },
    service::{
        assignment_service::{stamp_assignment, AssignmentService},
        error::ServiceError,
        history_service::HistoryService,
        outcome::{Outcome, SideEffect, SideEffects},
        sla_service::SlaService,
    },
};

/// Statuses a customer may move their own ticket between. Agents may move
/// any status to any status.
pub fn can_transition(from: TicketStatus, to: TicketStatus, is_agent: bool) -> bool {
    if is_agent {
        return true;
    }
    matches!(
        (from, to),
        (TicketStatus::Resolved, TicketStatus::Reopened)
            | (TicketStatus::Resolved, TicketStatus::Closed)
            | (TicketStatus::Pending, TicketStatus::Open)
            | (TicketStatus::Open, TicketStatus::Cancelled)
    )
}

fn ensure_access(actor: &Actor, ticket: &Ticket) -> Result<(), ServiceError> {
    if actor.is_agent() || ticket.customer_id == actor.user_id {
        Ok(())
    } else {
        Err(ServiceError::UnauthorizedTicketAccess {
            user_id: actor.user_id.clone(),
            ticket_number: ticket.ticket_number.clone(),
        })
    }
}

fn ensure_agent(actor: &Actor) -> Result<(), ServiceError> {
    if actor.is_agent() {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(actor.user_id.clone()))
    }
}

fn sender_type(actor: &Actor) -> SenderType {
    match actor.role {
        UserRole::Customer => SenderType::Customer,
        UserRole::System => SenderType::System,
        _ => SenderType::Agent,
    }
}

/// The ticket lifecycle engine.
///
/// Every mutating operation returns an `Outcome`: the primary write either
/// succeeds or the call fails, while counter, history and assignment
/// follow-ups are collected as side effects.
#[derive(Clone)]
pub struct TicketService {
    store: Arc<dyn Store>,
    sla: SlaService,
    assignment: AssignmentService,
    history: HistoryService,
    settings: TicketSettings,
}

impl TicketService {
    pub fn new(store: Arc<dyn Store>, sla_settings: SlaSettings, settings: TicketSettings) -> Self {
        let history = HistoryService::new(store.clone());
        Self {
            sla: SlaService::new(store.clone(), sla_settings),
            assignment: AssignmentService::new(store.clone(), history.clone(), settings.auto_assign_enabled),
            history,
            store,
            settings,
        }
    }

    async fn load(&self, tenant_id: &str, ticket_id: Uuid) -> Result<Ticket, ServiceError> {
        self.store
            .get_ticket(tenant_id, ticket_id)
            .await?
            .ok_or_else(|| ServiceError::TicketNotFound(ticket_id.to_string()))
    }

    async fn resolve_department(&self, tenant_id: &str, department_id: Option<Uuid>) -> Option<Department> {
        let id = department_id?;
        self.store
            .get_department(tenant_id, id)
            .await
            .ok()
            .flatten()
            .filter(|d| d.is_active && !d.is_deleted)
    }

    async fn resolve_category(&self, tenant_id: &str, category_id: Option<Uuid>) -> Option<Category> {
        let id = category_id?;
        self.store
            .get_category(tenant_id, id)
            .await
            .ok()
            .flatten()
            .filter(|c| c.is_active && !c.is_deleted)
    }

    fn check_attachments(&self, attachments: Option<&Vec<AttachmentDto>>) -> Result<(), ServiceError> {
        let count = attachments.map_or(0, Vec::len);
        if count > self.settings.max_attachments {
            return Err(ServiceError::Validation(format!(
                "At most {} attachments are allowed",
                self.settings.max_attachments
            )));
        }
        Ok(())
    }

    fn stored_attachments(attachments: Option<Vec<AttachmentDto>>, actor: &Actor) -> Vec<Attachment> {
        let now = Utc::now();
        attachments
            .unwrap_or_default()
            .into_iter()
            .map(|a| Attachment {
                id: Uuid::new_v4().to_string(),
                name: a.name,
                url: a.url,
                size: a.size,
                mime_type: a.mime_type,
                uploaded_by: actor.user_id.clone(),
                uploaded_at: now,
            })
            .collect()
    }

    /// The ticket stopped counting as open: release its department slot and agent workload.
    async fn leave_open(&self, ticket: &Ticket, effects: &mut SideEffects) {
        if let Some(department_id) = ticket.department_id {
            effects.note(
                SideEffect::DepartmentCounter,
                self.store
                    .decrement_department_open_tickets(&ticket.tenant_id, department_id)
                    .await,
            );
        }
        if let Some(ref agent_id) = ticket.assigned_to_id {
            effects.note(
                SideEffect::AgentCounter,
                self.store.decrement_agent_tickets(&ticket.tenant_id, agent_id).await,
            );
        }
    }

    async fn enter_open(&self, ticket: &Ticket, effects: &mut SideEffects) {
        if let Some(department_id) = ticket.department_id {
            effects.note(
                SideEffect::DepartmentCounter,
                self.store
                    .increment_department_open_tickets(&ticket.tenant_id, department_id)
                    .await,
            );
        }
        if let Some(ref agent_id) = ticket.assigned_to_id {
            effects.note(
                SideEffect::AgentCounter,
                self.store.increment_agent_tickets(&ticket.tenant_id, agent_id).await,
            );
        }
    }

    /// Moves the department counters of a ticket that changed department.
    async fn move_department(
        &self,
        ticket: &Ticket,
        previous: Option<Uuid>,
        next: Uuid,
        effects: &mut SideEffects,
    ) {
        let is_open = ticket.counts_as_open();
        if let (Some(previous), true) = (previous, is_open) {
            effects.note(
                SideEffect::DepartmentCounter,
                self.store
                    .decrement_department_open_tickets(&ticket.tenant_id, previous)
                    .await,
            );
        }
        effects.note(
            SideEffect::DepartmentCounter,
            self.store
                .increment_department_tickets(&ticket.tenant_id, next, is_open)
                .await,
        );
    }

    pub async fn create_ticket(
        &self,
        actor: &Actor,
        body: CreateTicketDto,
    ) -> Result<Outcome<Ticket>, ServiceError> {
        if body.subject.trim().is_empty() {
            return Err(ServiceError::Validation("Subject is required".to_string()));
        }
        if body.description.trim().is_empty() {
            return Err(ServiceError::Validation("Description is required".to_string()));
        }
        self.check_attachments(body.attachments.as_ref())?;

        let tenant_id = actor.tenant_id.as_str();
        let ticket_number = self.store.next_ticket_number(tenant_id).await?;
        let department = self.resolve_department(tenant_id, body.department_id).await;
        let category = self.resolve_category(tenant_id, body.category_id).await;
        let now = Utc::now();

        let mut ticket = Ticket {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            ticket_number,
            subject: body.subject.trim().to_string(),
            description: body.description,
            ticket_type: body.ticket_type.unwrap_or_default(),
            status: TicketStatus::Open,
            priority: body.priority.unwrap_or_default(),
            source: body.source.unwrap_or_default(),
            customer_id: actor.user_id.clone(),
            customer_name: actor.name.clone(),
            customer_email: actor.email.clone(),
            customer_phone: body.customer_phone,
            department_id: department.as_ref().map(|d| d.id),
            department_name: department.as_ref().map(|d| d.name.clone()),
            category_id: category.as_ref().map(|c| c.id),
            category_name: category.as_ref().map(|c| c.name.clone()),
            assigned_to_id: None,
            assigned_to_name: None,
            assigned_to_email: None,
            assigned_at: None,
            assigned_by_id: None,
            sla_policy_id: None,
            first_response_due: None,
            resolution_due: None,
            first_responded_at: None,
            sla_breached: false,
            response_sla_breached: false,
            resolve_sla_breached: false,
            parent_ticket_id: None,
            related_ticket_ids: Vec::new(),
            merged_into_id: None,
            attachments: Self::stored_attachments(body.attachments, actor),
            tags: body.tags.unwrap_or_default(),
            custom_fields: body.custom_fields.unwrap_or_default(),
            message_count: 0,
            internal_notes: 0,
            reopen_count: 0,
            escalation_level: 0,
            satisfaction_rating: None,
            satisfaction_comment: None,
            rated_at: None,
            watcher_ids: Vec::new(),
            metadata: FieldMap::new(),
            version: 1,
            is_deleted: false,
            deleted_by: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
            closed_at: None,
            last_activity_at: now,
            last_customer_reply_at: None,
            last_agent_reply_at: None,
        };

        self.sla
            .resolve(tenant_id, ticket.priority, department.as_ref(), now)
            .await
            .apply_to(&mut ticket);

        let mut ticket = self.store.create_ticket(&ticket).await?;
        let mut effects = SideEffects::new();

        if let Some(ref department) = department {
            effects.note(
                SideEffect::DepartmentCounter,
                self.store
                    .increment_department_tickets(tenant_id, department.id, true)
                    .await,
            );
        }
        effects.note(SideEffect::HistoryEntry, self.history.log_created(&ticket, actor).await);

        if department.is_some() {
            match self.assignment.auto_assign(&ticket, now).await {
                Ok(outcome) => {
                    effects.absorb(outcome.side_effects);
                    if let Some(assigned) = outcome.value {
                        ticket = assigned;
                    }
                }
                Err(e) => effects.note::<ServiceError>(SideEffect::AutoAssign, Err(e)),
            }
        }

        Ok(effects.finish(ticket))
    }

    pub async fn get_ticket(&self, actor: &Actor, ticket_id: Uuid) -> Result<Ticket, ServiceError> {
        let ticket = self.load(&actor.tenant_id, ticket_id).await?;
        ensure_access(actor, &ticket)?;
        Ok(ticket)
    }

    pub async fn get_ticket_by_number(&self, actor: &Actor, ticket_number: &str) -> Result<Ticket, ServiceError> {
        let ticket = self
            .store
            .get_ticket_by_number(&actor.tenant_id, ticket_number)
            .await?
            .ok_or_else(|| ServiceError::TicketNotFound(ticket_number.to_string()))?;
        ensure_access(actor, &ticket)?;
        Ok(ticket)
    }

    pub async fn update_ticket(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        body: UpdateTicketDto,
    ) -> Result<Outcome<Ticket>, ServiceError> {
        let mut ticket = self.load(&actor.tenant_id, ticket_id).await?;
        ensure_access(actor, &ticket)?;

        let mut changes: Vec<(&'static str, Value, Value)> = Vec::new();

        if let Some(subject) = body.subject {
            let subject = subject.trim().to_string();
            if subject.is_empty() {
                return Err(ServiceError::Validation("Subject is required".to_string()));
            }
            if subject != ticket.subject {
                changes.push(("subject", json!(ticket.subject), json!(subject)));
                ticket.subject = subject;
            }
        }
        if let Some(description) = body.description {
            if description.trim().is_empty() {
                return Err(ServiceError::Validation("Description is required".to_string()));
            }
            if description != ticket.description {
                changes.push(("description", json!(ticket.description), json!(description)));
                ticket.description = description;
            }
        }
        if let Some(ticket_type) = body.ticket_type.filter(|t| *t != ticket.ticket_type) {
            changes.push(("type", json!(ticket.ticket_type), json!(ticket_type)));
            ticket.ticket_type = ticket_type;
        }
        let mut priority_changed = false;
        if let Some(priority) = body.priority.filter(|p| *p != ticket.priority) {
            changes.push(("priority", json!(ticket.priority), json!(priority)));
            ticket.priority = priority;
            priority_changed = true;
        }
        if let Some(tags) = body.tags.filter(|t| *t != ticket.tags) {
            changes.push(("tags", json!(ticket.tags), json!(tags)));
            ticket.tags = tags;
        }
        if let Some(custom_fields) = body.custom_fields.filter(|f| *f != ticket.custom_fields) {
            changes.push(("custom_fields", json!(ticket.custom_fields), json!(custom_fields)));
            ticket.custom_fields = custom_fields;
        }

        let previous_department = ticket.department_id;
        let mut moved_to = None;
        if body.department_id.is_some() && body.department_id != ticket.department_id {
            if let Some(department) = self.resolve_department(&ticket.tenant_id, body.department_id).await {
                changes.push(("department", json!(ticket.department_name), json!(department.name)));
                ticket.department_id = Some(department.id);
                ticket.department_name = Some(department.name);
                moved_to = Some(department.id);
            }
        }
        if body.category_id.is_some() && body.category_id != ticket.category_id {
            if let Some(category) = self.resolve_category(&ticket.tenant_id, body.category_id).await {
                changes.push(("category", json!(ticket.category_name), json!(category.name)));
                ticket.category_id = Some(category.id);
                ticket.category_name = Some(category.name);
            }
        }

        if changes.is_empty() {
            return Ok(Outcome::new(ticket));
        }

        let now = Utc::now();
        if priority_changed {
            self.sla.resolve_for_ticket(&ticket, now).await.apply_to(&mut ticket);
        }
        ticket.updated_at = now;
        ticket.last_activity_at = now;

        let saved = self.store.update_ticket(&ticket).await?;
        let mut effects = SideEffects::new();

        if let Some(next) = moved_to {
            self.move_department(&saved, previous_department, next, &mut effects).await;
        }
        for (field, old_value, new_value) in changes {
            effects.note(
                SideEffect::HistoryEntry,
                self.history
                    .log_field_change(&saved, field, old_value, new_value, actor)
                    .await,
            );
        }

        Ok(effects.finish(saved))
    }

    pub async fn change_status(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        body: ChangeStatusDto,
    ) -> Result<Outcome<Ticket>, ServiceError> {
        let mut ticket = self.load(&actor.tenant_id, ticket_id).await?;
        ensure_access(actor, &ticket)?;

        let from = ticket.status;
        let to = body.status;
        if !can_transition(from, to, actor.is_agent()) {
            return Err(ServiceError::InvalidStatusTransition { from, to });
        }

        let now = Utc::now();
        ticket.status = to;
        match to {
            TicketStatus::Resolved => ticket.resolved_at = Some(now),
            TicketStatus::Closed => ticket.closed_at = Some(now),
            TicketStatus::Reopened => {
                ticket.resolved_at = None;
                ticket.closed_at = None;
                ticket.reopen_count += 1;
            }
            _ => {}
        }
        ticket.updated_at = now;
        ticket.last_activity_at = now;

        let saved = self.store.update_ticket(&ticket).await?;
        let mut effects = SideEffects::new();

        match (from.counts_as_open(), to.counts_as_open()) {
            (true, false) => self.leave_open(&saved, &mut effects).await,
            (false, true) => self.enter_open(&saved, &mut effects).await,
            _ => {}
        }
        if to == TicketStatus::Resolved && from != TicketStatus::Resolved {
            if let Some(ref agent_id) = saved.assigned_to_id {
                effects.note(
                    SideEffect::AgentResolved,
                    self.store.increment_agent_resolved(&saved.tenant_id, agent_id).await,
                );
            }
        }
        effects.note(
            SideEffect::HistoryEntry,
            self.history
                .log_status_change(&saved, from, to, actor, body.comment.as_deref())
                .await,
        );

        Ok(effects.finish(saved))
    }

    pub async fn assign_ticket(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        agent_user_id: &str,
    ) -> Result<Outcome<Ticket>, ServiceError> {
        ensure_agent(actor)?;
        let ticket = self.load(&actor.tenant_id, ticket_id).await?;
        self.assign_loaded(actor, ticket, agent_user_id).await
    }

    async fn assign_loaded(
        &self,
        actor: &Actor,
        mut ticket: Ticket,
        agent_user_id: &str,
    ) -> Result<Outcome<Ticket>, ServiceError> {
        let tenant_id = ticket.tenant_id.clone();
        let agent = self.assignment.find_agent(&tenant_id, agent_user_id).await?;

        let previous_id = ticket.assigned_to_id.clone();
        let previous_name = ticket.assigned_to_name.clone();
        let same_agent = previous_id.as_deref() == Some(agent.user_id.as_str());
        let counts = ticket.counts_as_open();

        // Only open tickets occupy a slot; closed ones still need room to be handed over.
        let reserved = !same_agent && counts;
        if reserved {
            self.assignment.reserve(&tenant_id, &agent).await?;
        } else if !same_agent && !agent.has_capacity() {
            return Err(ServiceError::AgentAtCapacity(agent.user_id.clone()));
        }

        let now = Utc::now();
        let from = ticket.status;
        stamp_assignment(&mut ticket, &agent, &actor.user_id, now);
        if ticket.first_response_due.is_none() && ticket.resolution_due.is_none() {
            self.sla.resolve_for_ticket(&ticket, now).await.apply_to(&mut ticket);
        }
        if ticket.status == TicketStatus::Open {
            ticket.status = TicketStatus::InProgress;
        }

        let saved = match self.store.update_ticket(&ticket).await {
            Ok(saved) => saved,
            Err(err) if reserved => return Err(self.assignment.rollback(&tenant_id, &agent.user_id, err).await),
            Err(err) => return Err(err.into()),
        };

        let mut effects = SideEffects::new();
        if let (true, Some(previous)) = (reserved, previous_id.as_deref()) {
            effects.note(
                SideEffect::AgentCounter,
                self.assignment.release(&tenant_id, previous).await,
            );
        }
        effects.note(
            SideEffect::HistoryEntry,
            self.history
                .log_assignment(&saved, previous_name.as_deref(), actor, false)
                .await,
        );
        if saved.status != from {
            effects.note(
                SideEffect::HistoryEntry,
                self.history
                    .log_status_change(&saved, from, saved.status, actor, None)
                    .await,
            );
        }

        Ok(effects.finish(saved))
    }

    pub async fn transfer_ticket(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        body: TransferTicketDto,
    ) -> Result<Outcome<Ticket>, ServiceError> {
        ensure_agent(actor)?;
        let mut ticket = self.load(&actor.tenant_id, ticket_id).await?;
        let department = self
            .store
            .get_department(&ticket.tenant_id, body.department_id)
            .await?
            .filter(|d| !d.is_deleted)
            .ok_or(ServiceError::DepartmentNotFound(body.department_id))?;

        let before = ticket.clone();
        let now = Utc::now();
        ticket.department_id = Some(department.id);
        ticket.department_name = Some(department.name.clone());
        ticket.clear_assignment();
        ticket.updated_at = now;
        ticket.last_activity_at = now;

        let saved = self.store.update_ticket(&ticket).await?;
        let mut effects = SideEffects::new();

        if before.counts_as_open() {
            if let Some(ref agent_id) = before.assigned_to_id {
                effects.note(
                    SideEffect::AgentCounter,
                    self.store.decrement_agent_tickets(&before.tenant_id, agent_id).await,
                );
            }
        }
        self.move_department(&saved, before.department_id, department.id, &mut effects)
            .await;
        effects.note(
            SideEffect::HistoryEntry,
            self.history
                .log_transfer(&saved, before.department_name.as_deref(), actor)
                .await,
        );

        let mut result = saved;
        match body.agent_id {
            Some(agent_id) => match self.assign_loaded(actor, result.clone(), &agent_id).await {
                Ok(outcome) => {
                    effects.absorb(outcome.side_effects);
                    result = outcome.value;
                }
                Err(e) => effects.note::<ServiceError>(SideEffect::ChainedAssign, Err(e)),
            },
            None => match self.assignment.auto_assign(&result, now).await {
                Ok(outcome) => {
                    effects.absorb(outcome.side_effects);
                    if let Some(assigned) = outcome.value {
                        result = assigned;
                    }
                }
                Err(e) => effects.note::<ServiceError>(SideEffect::AutoAssign, Err(e)),
            },
        }

        Ok(effects.finish(result))
    }

    pub async fn add_reply(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        body: AddReplyDto,
    ) -> Result<Outcome<TicketMessage>, ServiceError> {
        let ticket = self.load(&actor.tenant_id, ticket_id).await?;
        ensure_access(actor, &ticket)?;
        self.check_attachments(body.attachments.as_ref())?;

        let is_private = body.is_private || body.message_type == Some(MessageType::InternalNote);
        if is_private && !actor.is_agent() {
            return Err(ServiceError::Validation(
                "Customers cannot post internal notes".to_string(),
            ));
        }
        let message_type = if is_private {
            MessageType::InternalNote
        } else {
            body.message_type.unwrap_or_default()
        };

        let canned = match body.canned_response_id {
            Some(id) => Some(
                self.store
                    .get_canned_response(&ticket.tenant_id, id)
                    .await?
                    .filter(|c| c.is_active)
                    .ok_or(ServiceError::CannedResponseNotFound(id))?,
            ),
            None => None,
        };

        let content = match (body.content.trim().is_empty(), canned.as_ref()) {
            (false, _) => body.content,
            (true, Some(canned)) => canned.content.clone(),
            (true, None) => return Err(ServiceError::Validation("Reply content is required".to_string())),
        };

        let now = Utc::now();
        let sender_type = sender_type(actor);
        let message = TicketMessage {
            id: Uuid::new_v4(),
            ticket_id: ticket.id,
            tenant_id: ticket.tenant_id.clone(),
            message_type,
            content,
            content_html: body.content_html.map(|html| ammonia::clean(&html)),
            sender_type,
            sender_id: actor.user_id.clone(),
            sender_name: actor.name.clone(),
            sender_email: Some(actor.email.clone()).filter(|e| !e.is_empty()),
            attachments: Self::stored_attachments(body.attachments, actor),
            is_private,
            is_edited: false,
            edited_at: None,
            edited_by: None,
            original_content: None,
            canned_response_id: canned.as_ref().map(|c| c.id),
            metadata: FieldMap::new(),
            is_deleted: false,
            created_at: now,
        };

        let message = self.store.create_message(&message).await?;
        let mut effects = SideEffects::new();

        effects.note(
            SideEffect::MessageCounter,
            self.store
                .increment_message_count(&ticket.tenant_id, ticket.id, is_private)
                .await,
        );

        let mut fields = TicketFieldsUpdate {
            last_activity_at: Some(now),
            ..Default::default()
        };
        let mut reopened_from_pending = false;
        match sender_type {
            SenderType::Customer => {
                fields.last_customer_reply_at = Some(now);
                if ticket.status == TicketStatus::Pending {
                    fields.status = Some(TicketStatus::Open);
                    reopened_from_pending = true;
                }
            }
            SenderType::Agent if !is_private => {
                fields.last_agent_reply_at = Some(now);
                if ticket.first_responded_at.is_none() {
                    fields.first_responded_at = Some(now);
                }
            }
            _ => {}
        }

        let updated = self
            .store
            .update_ticket_fields(&ticket.tenant_id, ticket.id, &fields)
            .await;
        match updated {
            Ok(Some(updated)) if reopened_from_pending => {
                effects.note(
                    SideEffect::HistoryEntry,
                    self.history
                        .log_status_change(&updated, TicketStatus::Pending, TicketStatus::Open, actor, None)
                        .await,
                );
            }
            Ok(_) => {}
            Err(e) => effects.note(SideEffect::ActivityTimestamps, Err(e)),
        }

        if let Some(canned) = canned {
            effects.note(
                SideEffect::CannedUsage,
                self.store
                    .increment_canned_usage(&ticket.tenant_id, canned.id)
                    .await,
            );
        }

        Ok(effects.finish(message))
    }

    pub async fn edit_message(
        &self,
        actor: &Actor,
        message_id: Uuid,
        body: EditMessageDto,
    ) -> Result<TicketMessage, ServiceError> {
        let mut message = self
            .store
            .get_message(&actor.tenant_id, message_id)
            .await?
            .filter(|m| !m.is_deleted)
            .ok_or(ServiceError::MessageNotFound(message_id))?;

        if message.sender_id != actor.user_id {
            return Err(ServiceError::Unauthorized(actor.user_id.clone()));
        }
        if body.content.trim().is_empty() {
            return Err(ServiceError::Validation("Message content is required".to_string()));
        }

        if message.original_content.is_none() {
            message.original_content = Some(message.content.clone());
        }
        message.content = body.content;
        message.content_html = body.content_html.map(|html| ammonia::clean(&html));
        message.is_edited = true;
        message.edited_at = Some(Utc::now());
        message.edited_by = Some(actor.user_id.clone());

        Ok(self.store.update_message(&message).await?)
    }

    pub async fn rate_ticket(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        body: RateTicketDto,
    ) -> Result<Outcome<Ticket>, ServiceError> {
        let mut ticket = self.load(&actor.tenant_id, ticket_id).await?;
        if ticket.customer_id != actor.user_id {
            return Err(ServiceError::UnauthorizedTicketAccess {
                user_id: actor.user_id.clone(),
                ticket_number: ticket.ticket_number.clone(),
            });
        }
        if !(1..=5).contains(&body.rating) {
            return Err(ServiceError::Validation("Rating must be between 1 and 5".to_string()));
        }
        if !matches!(ticket.status, TicketStatus::Resolved | TicketStatus::Closed) {
            return Err(ServiceError::InvalidState(format!(
                "Ticket {} must be resolved or closed before it can be rated",
                ticket.ticket_number
            )));
        }
        if ticket.satisfaction_rating.is_some() {
            return Err(ServiceError::InvalidState(format!(
                "Ticket {} has already been rated",
                ticket.ticket_number
            )));
        }

        let now = Utc::now();
        ticket.satisfaction_rating = Some(body.rating);
        ticket.satisfaction_comment = body.comment;
        ticket.rated_at = Some(now);
        ticket.updated_at = now;

        let saved = self.store.update_ticket(&ticket).await?;
        let mut effects = SideEffects::new();

        if let Some(ref agent_id) = saved.assigned_to_id {
            effects.note(
                SideEffect::AgentRating,
                self.update_agent_rating(&saved.tenant_id, agent_id, body.rating).await,
            );
        }
        effects.note(SideEffect::HistoryEntry, self.history.log_rating(&saved, actor).await);

        Ok(effects.finish(saved))
    }

    async fn update_agent_rating(&self, tenant_id: &str, user_id: &str, rating: i32) -> Result<(), ServiceError> {
        let agent = self
            .store
            .get_agent_by_user_id(tenant_id, user_id)
            .await?
            .ok_or_else(|| ServiceError::AgentNotFound(user_id.to_string()))?;

        let average = if agent.total_resolved <= 0 {
            rating as f64
        } else {
            let n = agent.total_resolved as f64;
            (agent.avg_rating * (n - 1.0) + rating as f64) / n
        };
        self.store.update_agent_rating(tenant_id, user_id, average).await?;
        Ok(())
    }

    pub async fn delete_ticket(&self, actor: &Actor, ticket_id: Uuid) -> Result<Outcome<()>, ServiceError> {
        ensure_agent(actor)?;
        let ticket = self.load(&actor.tenant_id, ticket_id).await?;

        let deleted = self
            .store
            .soft_delete_ticket(&ticket.tenant_id, ticket.id, &actor.user_id, Utc::now())
            .await?;
        if !deleted {
            return Err(ServiceError::TicketNotFound(ticket_id.to_string()));
        }

        let mut effects = SideEffects::new();
        if ticket.counts_as_open() {
            self.leave_open(&ticket, &mut effects).await;
        }
        effects.note(SideEffect::HistoryEntry, self.history.log_deletion(&ticket, actor).await);

        Ok(effects.finish(()))
    }

    /// Customers only ever see their own tickets.
    pub async fn list_tickets(&self, actor: &Actor, mut filter: TicketFilter) -> Result<TicketPage, ServiceError> {
        filter.tenant_id = actor.tenant_id.clone();
        if !actor.is_agent() {
            filter.customer_id = Some(actor.user_id.clone());
        }
        let (tickets, total) = self.store.list_tickets(&filter).await?;
        Ok(TicketPage {
            tickets,
            total,
            page: filter.page.max(1),
            per_page: filter.limit(),
        })
    }

    /// A customer may only list their own tickets; agents may list anyone's.
    pub async fn customer_tickets(
        &self,
        actor: &Actor,
        customer_id: &str,
        page: i64,
        per_page: i64,
    ) -> Result<TicketPage, ServiceError> {
        if !actor.is_agent() && actor.user_id != customer_id {
            return Err(ServiceError::Unauthorized(actor.user_id.clone()));
        }
        let mut filter = TicketFilter::for_tenant(&actor.tenant_id);
        filter.customer_id = Some(customer_id.to_string());
        filter.page = page;
        filter.per_page = per_page;
        self.list_tickets(actor, filter).await
    }

    pub async fn agent_tickets(
        &self,
        actor: &Actor,
        agent_id: &str,
        status: Option<TicketStatus>,
        page: i64,
        per_page: i64,
    ) -> Result<TicketPage, ServiceError> {
        ensure_agent(actor)?;
        let mut filter = TicketFilter::for_tenant(&actor.tenant_id);
        filter.assigned_to_id = Some(agent_id.to_string());
        filter.statuses = status.into_iter().collect();
        filter.page = page;
        filter.per_page = per_page;
        self.list_tickets(actor, filter).await
    }

    pub async fn unassigned_tickets(&self, actor: &Actor, page: i64, per_page: i64) -> Result<TicketPage, ServiceError> {
        ensure_agent(actor)?;
        let mut filter = TicketFilter::for_tenant(&actor.tenant_id);
        filter.unassigned_only = true;
        filter.statuses = TicketStatus::ALL
            .into_iter()
            .filter(|s| s.counts_as_open() && *s != TicketStatus::Cancelled)
            .collect();
        filter.sort_desc = false;
        filter.page = page;
        filter.per_page = per_page;
        self.list_tickets(actor, filter).await
    }

    pub async fn sla_breached_tickets(&self, actor: &Actor, page: i64, per_page: i64) -> Result<TicketPage, ServiceError> {
        ensure_agent(actor)?;
        let mut filter = TicketFilter::for_tenant(&actor.tenant_id);
        filter.sla_breached = Some(true);
        filter.page = page;
        filter.per_page = per_page;
        self.list_tickets(actor, filter).await
    }

    pub async fn tickets_due_soon(&self, actor: &Actor, hours: i64, limit: i64) -> Result<Vec<Ticket>, ServiceError> {
        ensure_agent(actor)?;
        let now = Utc::now();
        Ok(self
            .store
            .get_tickets_due_soon(&actor.tenant_id, now, now + Duration::hours(hours.clamp(1, 720)), limit)
            .await?)
    }

    /// Private notes are only returned to agents.
    pub async fn ticket_messages(
        &self,
        actor: &Actor,
        ticket_id: Uuid,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<TicketMessage>, i64), ServiceError> {
        let ticket = self.load(&actor.tenant_id, ticket_id).await?;
        ensure_access(actor, &ticket)?;
        Ok(self
            .store
            .list_messages(&actor.tenant_id, ticket.id, actor.is_agent(), page, per_page)
            .await?)
    }

    pub async fn ticket_history(&self, actor: &Actor, ticket_id: Uuid) -> Result<Vec<TicketHistory>, ServiceError> {
        ensure_agent(actor)?;
        let ticket = self.load(&actor.tenant_id, ticket_id).await?;
        self.history.list(&actor.tenant_id, ticket.id).await
    }

    pub async fn stats(&self, actor: &Actor) -> Result<TicketStats, ServiceError> {
        ensure_agent(actor)?;
        Ok(self.store.get_ticket_stats(&actor.tenant_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::{
        db::{
            agentdb::AgentExt, departmentdb::DepartmentExt, memory::MemoryStore, messagedb::HistoryExt,
            sladb::{CannedResponseExt, SlaPolicyExt}, ticketdb::TicketExt,
        },
        models::{
            agentmodel::CannedResponse,
            ticketmodel::{HistoryAction, TicketPriority},
        },
        service::test_support::*,
    };

    fn status(status: TicketStatus) -> ChangeStatusDto {
        ChangeStatusDto { status, comment: None }
    }

    fn routed(subject: &str, department_id: Uuid) -> CreateTicketDto {
        CreateTicketDto {
            department_id: Some(department_id),
            ..new_ticket(subject)
        }
    }

    async fn force_status(store: &MemoryStore, ticket_id: Uuid, status: TicketStatus) -> Ticket {
        let mut ticket = store.get_ticket(TENANT, ticket_id).await.unwrap().unwrap();
        ticket.status = status;
        store.update_ticket(&ticket).await.unwrap()
    }

    /// Recounts open tickets per department and agent from the ticket table.
    async fn assert_counters_conserved(store: &MemoryStore) {
        let mut filter = TicketFilter::for_tenant(TENANT);
        filter.per_page = 100;
        let (tickets, _) = store.list_tickets(&filter).await.unwrap();

        let mut per_department: HashMap<Uuid, i32> = HashMap::new();
        let mut per_agent: HashMap<String, i32> = HashMap::new();
        for ticket in tickets.iter().filter(|t| t.counts_as_open()) {
            if let Some(id) = ticket.department_id {
                *per_department.entry(id).or_default() += 1;
            }
            if let Some(ref agent) = ticket.assigned_to_id {
                *per_agent.entry(agent.clone()).or_default() += 1;
            }
        }

        for dept in store.list_departments(TENANT, false).await.unwrap() {
            assert_eq!(
                dept.open_tickets,
                per_department.get(&dept.id).copied().unwrap_or(0),
                "department {}",
                dept.name
            );
        }
        for agent in store.list_agents(TENANT, None).await.unwrap() {
            assert_eq!(
                agent.current_tickets,
                per_agent.get(&agent.user_id).copied().unwrap_or(0),
                "agent {}",
                agent.user_id
            );
        }
    }

    #[tokio::test]
    async fn create_applies_defaults_and_counts() {
        let store = Arc::new(MemoryStore::new());
        let dept = seed_department(&store, "Support").await;
        let engine = engine_with(store.clone(), false);

        let outcome = engine
            .create_ticket(&customer("c1"), routed("Refund please", dept.id))
            .await
            .unwrap();
        assert!(outcome.is_clean());
        let ticket = outcome.value;

        assert_eq!(ticket.ticket_number, "TKT-000001");
        assert_eq!(ticket.status, TicketStatus::Open);
        assert_eq!(ticket.priority, TicketPriority::Medium);
        assert_eq!(ticket.customer_id, "c1");
        assert_eq!(ticket.department_name.as_deref(), Some("Support"));
        assert!(ticket.first_response_due.is_some());
        assert_eq!(department_counts(&store, dept.id).await, (1, 1));

        let history = store.list_history(TENANT, ticket.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].action, HistoryAction::Created);
    }

    #[tokio::test]
    async fn create_rejects_blank_fields_before_numbering() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());

        let err = engine
            .create_ticket(&customer("c1"), new_ticket("   "))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let ticket = engine.create_ticket(&customer("c1"), new_ticket("ok")).await.unwrap().value;
        assert_eq!(ticket.ticket_number, "TKT-000001");
    }

    #[tokio::test]
    async fn unknown_department_is_ignored_on_create() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());

        let ticket = engine
            .create_ticket(&customer("c1"), routed("Lost", Uuid::new_v4()))
            .await
            .unwrap()
            .value;
        assert_eq!(ticket.department_id, None);
        assert_eq!(ticket.department_name, None);
    }

    #[tokio::test]
    async fn attachments_are_stamped_and_capped() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let attachment = AttachmentDto {
            name: "log.txt".into(),
            url: "https://files.example.com/log.txt".into(),
            size: 42,
            mime_type: "text/plain".into(),
        };

        let dto = CreateTicketDto {
            attachments: Some(vec![attachment.clone()]),
            ..new_ticket("Crash")
        };
        let ticket = engine.create_ticket(&customer("c1"), dto).await.unwrap().value;
        assert_eq!(ticket.attachments.len(), 1);
        assert_eq!(ticket.attachments[0].uploaded_by, "c1");
        assert!(!ticket.attachments[0].id.is_empty());

        let dto = CreateTicketDto {
            attachments: Some(vec![attachment; 11]),
            ..new_ticket("Too many")
        };
        let err = engine.create_ticket(&customer("c1"), dto).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn concurrent_creates_get_unique_sequential_numbers() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());

        let handles: Vec<_> = (0..25)
            .map(|i| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine
                        .create_ticket(&customer("c1"), new_ticket(&format!("ticket {}", i)))
                        .await
                        .unwrap()
                        .value
                        .ticket_number
                })
            })
            .collect();

        let mut numbers = Vec::new();
        for handle in handles {
            numbers.push(handle.await.unwrap());
        }
        numbers.sort();
        let expected: Vec<String> = (1..=25).map(|n| format!("TKT-{:06}", n)).collect();
        assert_eq!(numbers, expected);
    }

    #[tokio::test]
    async fn transition_table_is_enforced_exhaustively() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine_with(store.clone(), false);
        let owner = customer("c1");
        let agent = staff("a1");

        for from in TicketStatus::ALL {
            for to in TicketStatus::ALL {
                for is_agent in [false, true] {
                    let ticket = engine.create_ticket(&owner, new_ticket("t")).await.unwrap().value;
                    force_status(&store, ticket.id, from).await;

                    let actor = if is_agent { &agent } else { &owner };
                    let result = engine.change_status(actor, ticket.id, status(to)).await;

                    if can_transition(from, to, is_agent) {
                        let outcome = result.unwrap_or_else(|e| panic!("{} -> {} ({}): {}", from, to, is_agent, e));
                        assert_eq!(outcome.value.status, to);
                    } else {
                        assert!(
                            matches!(result, Err(ServiceError::InvalidStatusTransition { .. })),
                            "{} -> {} should be rejected for customers",
                            from,
                            to
                        );
                    }
                }
            }
        }

        // Exactly the four customer moves are allowed.
        let customer_moves = TicketStatus::ALL
            .iter()
            .flat_map(|f| TicketStatus::ALL.iter().map(move |t| (*f, *t)))
            .filter(|(f, t)| can_transition(*f, *t, false))
            .count();
        assert_eq!(customer_moves, 4);
    }

    #[tokio::test]
    async fn customers_cannot_touch_other_tickets() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let ticket = engine.create_ticket(&customer("c1"), new_ticket("mine")).await.unwrap().value;

        let intruder = customer("c2");
        let err = engine
            .change_status(&intruder, ticket.id, status(TicketStatus::Cancelled))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnauthorizedTicketAccess { .. }));

        let err = engine.get_ticket(&intruder, ticket.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::UnauthorizedTicketAccess { .. }));
    }

    #[tokio::test]
    async fn other_tenants_see_nothing() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let ticket = engine.create_ticket(&customer("c1"), new_ticket("mine")).await.unwrap().value;

        let mut foreign = staff("a9");
        foreign.tenant_id = OTHER_TENANT.to_string();
        let err = engine.get_ticket(&foreign, ticket.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::TicketNotFound(_)));
    }

    #[tokio::test]
    async fn update_records_one_entry_per_changed_field() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let owner = customer("c1");
        let ticket = engine.create_ticket(&owner, new_ticket("Slow site")).await.unwrap().value;

        let err = engine
            .update_ticket(&customer("c2"), ticket.id, UpdateTicketDto::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::UnauthorizedTicketAccess { .. }));

        let patch = UpdateTicketDto {
            subject: Some("Very slow site".into()),
            description: Some(ticket.description.clone()),
            priority: Some(TicketPriority::High),
            ..Default::default()
        };
        let updated = engine.update_ticket(&owner, ticket.id, patch).await.unwrap().value;
        assert_eq!(updated.subject, "Very slow site");
        assert_eq!(updated.priority, TicketPriority::High);
        assert!(updated.version > ticket.version);

        let fields: Vec<_> = store
            .list_history(TENANT, ticket.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|h| h.action == HistoryAction::Updated)
            .filter_map(|h| h.field)
            .collect();
        assert_eq!(fields, vec!["subject".to_string(), "priority".to_string()]);
    }

    #[tokio::test]
    async fn priority_change_re_resolves_sla() {
        let store = Arc::new(MemoryStore::new());
        store.create_sla_policy(&policy("Default", true, 30, 120)).await.unwrap();
        let engine = engine(store.clone());
        let ticket = engine.create_ticket(&customer("c1"), new_ticket("Down")).await.unwrap().value;
        assert_eq!(ticket.sla_policy_id, None);

        let patch = UpdateTicketDto {
            priority: Some(TicketPriority::High),
            ..Default::default()
        };
        let updated = engine.update_ticket(&staff("a1"), ticket.id, patch).await.unwrap().value;
        assert!(updated.sla_policy_id.is_some());
        let due = updated.first_response_due.unwrap();
        assert!(due <= Utc::now() + Duration::minutes(30));
    }

    #[tokio::test]
    async fn department_change_on_update_moves_counters() {
        let store = Arc::new(MemoryStore::new());
        let billing = seed_department(&store, "Billing").await;
        let sales = seed_department(&store, "Sales").await;
        let engine = engine_with(store.clone(), false);
        let ticket = engine
            .create_ticket(&customer("c1"), routed("Invoice", billing.id))
            .await
            .unwrap()
            .value;

        let patch = UpdateTicketDto {
            department_id: Some(sales.id),
            ..Default::default()
        };
        let _ = engine.update_ticket(&staff("a1"), ticket.id, patch).await.unwrap();

        assert_eq!(department_counts(&store, billing.id).await, (0, 1));
        assert_eq!(department_counts(&store, sales.id).await, (1, 1));
    }

    #[tokio::test]
    async fn assign_promotes_and_reserves_capacity() {
        let store = Arc::new(MemoryStore::new());
        seed_agent(&store, "a1", vec![], 1).await;
        let engine = engine(store.clone());
        let first = engine.create_ticket(&customer("c1"), new_ticket("one")).await.unwrap().value;
        let second = engine.create_ticket(&customer("c1"), new_ticket("two")).await.unwrap().value;
        let supervisor = staff("lead");

        let assigned = engine.assign_ticket(&supervisor, first.id, "a1").await.unwrap().value;
        assert_eq!(assigned.status, TicketStatus::InProgress);
        assert_eq!(assigned.assigned_by_id.as_deref(), Some("lead"));
        assert_eq!(agent_load(&store, "a1").await, 1);

        let err = engine.assign_ticket(&supervisor, second.id, "a1").await.unwrap_err();
        assert!(matches!(err, ServiceError::AgentAtCapacity(_)));
        assert_eq!(agent_load(&store, "a1").await, 1);

        // Re-assigning the same agent is not a second reservation.
        let _ = engine.assign_ticket(&supervisor, first.id, "a1").await.unwrap();
        assert_eq!(agent_load(&store, "a1").await, 1);

        let err = engine.assign_ticket(&supervisor, second.id, "ghost").await.unwrap_err();
        assert!(matches!(err, ServiceError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn reassignment_moves_workload() {
        let store = Arc::new(MemoryStore::new());
        seed_agent(&store, "a1", vec![], 5).await;
        seed_agent(&store, "a2", vec![], 5).await;
        let engine = engine(store.clone());
        let ticket = engine.create_ticket(&customer("c1"), new_ticket("one")).await.unwrap().value;
        let lead = staff("lead");

        let _ = engine.assign_ticket(&lead, ticket.id, "a1").await.unwrap();
        let moved = engine.assign_ticket(&lead, ticket.id, "a2").await.unwrap().value;

        assert_eq!(moved.assigned_to_id.as_deref(), Some("a2"));
        assert_eq!(agent_load(&store, "a1").await, 0);
        assert_eq!(agent_load(&store, "a2").await, 1);

        let history = store.list_history(TENANT, ticket.id).await.unwrap();
        let last = history.iter().rev().find(|h| h.action == HistoryAction::Assigned).unwrap();
        assert_eq!(last.old_value, json!("a1 name"));
        assert_eq!(last.new_value, json!("a2 name"));
    }

    #[tokio::test]
    async fn capacity_is_never_exceeded_under_contention() {
        let store = Arc::new(MemoryStore::new());
        seed_agent(&store, "a1", vec![], 3).await;
        let engine = engine(store.clone());
        let mut ids = Vec::new();
        for i in 0..8 {
            ids.push(
                engine
                    .create_ticket(&customer("c1"), new_ticket(&format!("t{}", i)))
                    .await
                    .unwrap()
                    .value
                    .id,
            );
        }

        let handles: Vec<_> = ids
            .into_iter()
            .map(|id| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.assign_ticket(&staff("lead"), id, "a1").await.is_ok() })
            })
            .collect();
        let mut assigned = 0;
        for handle in handles {
            if handle.await.unwrap() {
                assigned += 1;
            }
        }

        assert_eq!(assigned, 3);
        assert_eq!(agent_load(&store, "a1").await, 3);
    }

    #[tokio::test]
    async fn transfer_to_unknown_department_changes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let dept = seed_department(&store, "Support").await;
        let engine = engine_with(store.clone(), false);
        let ticket = engine
            .create_ticket(&customer("c1"), routed("Move me", dept.id))
            .await
            .unwrap()
            .value;

        let body = TransferTicketDto {
            department_id: Uuid::new_v4(),
            agent_id: None,
        };
        let err = engine.transfer_ticket(&staff("a1"), ticket.id, body).await.unwrap_err();
        assert!(matches!(err, ServiceError::DepartmentNotFound(_)));

        let stored = store.get_ticket(TENANT, ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.version, ticket.version);
        assert_eq!(stored.department_id, Some(dept.id));
        assert_eq!(store.list_history(TENANT, ticket.id).await.unwrap().len(), 1);
        assert_eq!(department_counts(&store, dept.id).await, (1, 1));
    }

    #[tokio::test]
    async fn transfer_moves_counters_and_chains_assignment() {
        let store = Arc::new(MemoryStore::new());
        let support = seed_department(&store, "Support").await;
        let billing = seed_department(&store, "Billing").await;
        seed_agent(&store, "a1", vec![support.id], 5).await;
        seed_agent(&store, "b1", vec![billing.id], 5).await;
        let engine = engine_with(store.clone(), false);
        let lead = staff("lead");

        let ticket = engine
            .create_ticket(&customer("c1"), routed("Charge twice", support.id))
            .await
            .unwrap()
            .value;
        let _ = engine.assign_ticket(&lead, ticket.id, "a1").await.unwrap();

        let body = TransferTicketDto {
            department_id: billing.id,
            agent_id: Some("b1".into()),
        };
        let outcome = engine.transfer_ticket(&lead, ticket.id, body).await.unwrap();
        assert!(outcome.is_clean());
        let moved = outcome.value;

        assert_eq!(moved.department_id, Some(billing.id));
        assert_eq!(moved.assigned_to_id.as_deref(), Some("b1"));
        assert_eq!(department_counts(&store, support.id).await, (0, 1));
        assert_eq!(department_counts(&store, billing.id).await, (1, 1));
        assert_eq!(agent_load(&store, "a1").await, 0);
        assert_eq!(agent_load(&store, "b1").await, 1);

        let actions: Vec<_> = store
            .list_history(TENANT, ticket.id)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.action)
            .collect();
        assert!(actions.contains(&HistoryAction::Transferred));
    }

    #[tokio::test]
    async fn failed_chained_assignment_keeps_the_transfer() {
        let store = Arc::new(MemoryStore::new());
        let billing = seed_department(&store, "Billing").await;
        let engine = engine_with(store.clone(), false);
        let ticket = engine.create_ticket(&customer("c1"), new_ticket("x")).await.unwrap().value;

        let body = TransferTicketDto {
            department_id: billing.id,
            agent_id: Some("nobody".into()),
        };
        let outcome = engine.transfer_ticket(&staff("lead"), ticket.id, body).await.unwrap();

        assert_eq!(outcome.value.department_id, Some(billing.id));
        assert_eq!(outcome.side_effects.len(), 1);
        assert_eq!(outcome.side_effects[0].effect, SideEffect::ChainedAssign);
    }

    #[tokio::test]
    async fn auto_assign_on_create_and_transfer() {
        let store = Arc::new(MemoryStore::new());
        let support = seed_department(&store, "Support").await;
        let billing = seed_department(&store, "Billing").await;
        seed_agent(&store, "a1", vec![support.id], 5).await;
        seed_agent(&store, "b1", vec![billing.id], 5).await;
        let engine = engine(store.clone());

        let ticket = engine
            .create_ticket(&customer("c1"), routed("Help", support.id))
            .await
            .unwrap()
            .value;
        assert_eq!(ticket.assigned_to_id.as_deref(), Some("a1"));
        assert_eq!(ticket.status, TicketStatus::Open);

        let body = TransferTicketDto {
            department_id: billing.id,
            agent_id: None,
        };
        let moved = engine.transfer_ticket(&staff("lead"), ticket.id, body).await.unwrap().value;
        assert_eq!(moved.assigned_to_id.as_deref(), Some("b1"));
        assert_counters_conserved(&store).await;
    }

    #[tokio::test]
    async fn replies_classify_notes_and_track_first_response() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let ticket = engine.create_ticket(&customer("c1"), new_ticket("Q")).await.unwrap().value;
        let agent = staff("a1");

        let note = AddReplyDto {
            content: "customer seems upset".into(),
            message_type: Some(MessageType::Reply),
            is_private: true,
            ..Default::default()
        };
        let note = engine.add_reply(&agent, ticket.id, note).await.unwrap().value;
        assert_eq!(note.message_type, MessageType::InternalNote);
        assert!(note.is_private);

        let stored = store.get_ticket(TENANT, ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.first_responded_at, None);
        assert_eq!(stored.internal_notes, 1);

        let reply = AddReplyDto {
            content: "Looking into it".into(),
            content_html: Some("<p>Looking<script>alert(1)</script></p>".into()),
            ..Default::default()
        };
        let reply = engine.add_reply(&agent, ticket.id, reply).await.unwrap().value;
        assert!(!reply.content_html.unwrap().contains("script"));

        let stored = store.get_ticket(TENANT, ticket.id).await.unwrap().unwrap();
        let first = stored.first_responded_at.unwrap();
        assert_eq!(stored.message_count, 2);
        assert!(stored.last_agent_reply_at.is_some());

        let again = AddReplyDto {
            content: "Still looking".into(),
            ..Default::default()
        };
        let _ = engine.add_reply(&agent, ticket.id, again).await.unwrap();
        let stored = store.get_ticket(TENANT, ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.first_responded_at, Some(first));

        let (visible, total) = engine.ticket_messages(&customer("c1"), ticket.id, 1, 50).await.unwrap();
        assert_eq!(total, 2);
        assert!(visible.iter().all(|m| !m.is_private));
    }

    #[tokio::test]
    async fn customers_cannot_post_internal_notes() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let owner = customer("c1");
        let ticket = engine.create_ticket(&owner, new_ticket("Q")).await.unwrap().value;

        let body = AddReplyDto {
            content: "psst".into(),
            message_type: Some(MessageType::InternalNote),
            ..Default::default()
        };
        let err = engine.add_reply(&owner, ticket.id, body).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn canned_response_fills_empty_reply() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let ticket = engine.create_ticket(&customer("c1"), new_ticket("Reset")).await.unwrap().value;
        let now = Utc::now();
        let canned = store
            .create_canned_response(&CannedResponse {
                id: Uuid::new_v4(),
                tenant_id: TENANT.to_string(),
                title: "Password reset".into(),
                content: "Use the reset link on the login page.".into(),
                shortcut: Some("reset".into()),
                department_id: None,
                category: None,
                tags: vec![],
                usage_count: 0,
                created_by: "admin-1".into(),
                is_active: true,
                created_at: now,
                updated_at: now,
            })
            .await
            .unwrap();

        let body = AddReplyDto {
            canned_response_id: Some(canned.id),
            ..Default::default()
        };
        let message = engine.add_reply(&staff("a1"), ticket.id, body).await.unwrap().value;
        assert_eq!(message.content, canned.content);
        assert_eq!(message.canned_response_id, Some(canned.id));

        let canned = store.get_canned_response(TENANT, canned.id).await.unwrap().unwrap();
        assert_eq!(canned.usage_count, 1);
    }

    #[tokio::test]
    async fn only_the_sender_edits_a_message() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let owner = customer("c1");
        let ticket = engine.create_ticket(&owner, new_ticket("Q")).await.unwrap().value;
        let body = AddReplyDto {
            content: "typo hre".into(),
            ..Default::default()
        };
        let message = engine.add_reply(&owner, ticket.id, body).await.unwrap().value;

        let edit = EditMessageDto {
            content: "typo here".into(),
            content_html: None,
        };
        let err = engine.edit_message(&staff("a1"), message.id, edit.clone()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let edited = engine.edit_message(&owner, message.id, edit).await.unwrap();
        assert!(edited.is_edited);
        assert_eq!(edited.content, "typo here");
        assert_eq!(edited.original_content.as_deref(), Some("typo hre"));
    }

    #[tokio::test]
    async fn rating_rules() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let owner = customer("c1");
        let ticket = engine.create_ticket(&owner, new_ticket("Q")).await.unwrap().value;
        let five = || RateTicketDto {
            rating: 5,
            comment: None,
        };

        let err = engine.rate_ticket(&owner, ticket.id, five()).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        let _ = engine
            .change_status(&staff("a1"), ticket.id, status(TicketStatus::Resolved))
            .await
            .unwrap();

        let err = engine.rate_ticket(&customer("c2"), ticket.id, five()).await.unwrap_err();
        assert!(matches!(err, ServiceError::UnauthorizedTicketAccess { .. }));
        let err = engine.rate_ticket(&staff("a1"), ticket.id, five()).await.unwrap_err();
        assert!(matches!(err, ServiceError::UnauthorizedTicketAccess { .. }));

        let rated = engine.rate_ticket(&owner, ticket.id, five()).await.unwrap().value;
        assert_eq!(rated.satisfaction_rating, Some(5));
        assert!(rated.rated_at.is_some());

        let err = engine.rate_ticket(&owner, ticket.id, five()).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn rating_an_agent_without_resolved_tickets_uses_the_rating() {
        let store = Arc::new(MemoryStore::new());
        seed_agent(&store, "a1", vec![], 5).await;
        let engine = engine(store.clone());
        let owner = customer("c1");
        let ticket = engine.create_ticket(&owner, new_ticket("Q")).await.unwrap().value;
        let _ = engine.assign_ticket(&staff("lead"), ticket.id, "a1").await.unwrap();
        // Closed straight away, so the agent never gets a resolved count.
        let _ = engine
            .change_status(&staff("a1"), ticket.id, status(TicketStatus::Closed))
            .await
            .unwrap();

        let body = RateTicketDto {
            rating: 4,
            comment: None,
        };
        let outcome = engine.rate_ticket(&owner, ticket.id, body).await.unwrap();
        assert!(outcome.is_clean());

        let agent = store.get_agent_by_user_id(TENANT, "a1").await.unwrap().unwrap();
        assert_eq!(agent.total_resolved, 0);
        assert_eq!(agent.avg_rating, 4.0);
    }

    #[tokio::test]
    async fn full_ticket_scenario() {
        let store = Arc::new(MemoryStore::new());
        let sla = store.create_sla_policy(&policy("Gold", false, 240, 1440)).await.unwrap();
        let mut dept = department("Support");
        dept.sla_policy_id = Some(sla.id);
        let dept = store.create_department(&dept).await.unwrap();
        seed_agent(&store, "agent-a", vec![dept.id], 5).await;
        let engine = engine_with(store.clone(), false);
        let owner = customer("c1");
        let agent = staff("agent-a");

        let before = Utc::now();
        let dto = CreateTicketDto {
            priority: Some(TicketPriority::High),
            ..routed("Checkout broken", dept.id)
        };
        let ticket = engine.create_ticket(&owner, dto).await.unwrap().value;
        let due = ticket.first_response_due.unwrap();
        assert!(due >= before + Duration::hours(4));
        assert!(due <= Utc::now() + Duration::hours(4));

        let assigned = engine.assign_ticket(&agent, ticket.id, "agent-a").await.unwrap().value;
        assert_eq!(assigned.status, TicketStatus::InProgress);
        assert_eq!(agent_load(&store, "agent-a").await, 1);

        let _ = engine
            .change_status(&agent, ticket.id, status(TicketStatus::Pending))
            .await
            .unwrap();
        let reply = AddReplyDto {
            content: "Here is the screenshot".into(),
            ..Default::default()
        };
        let _ = engine.add_reply(&owner, ticket.id, reply).await.unwrap();
        let stored = store.get_ticket(TENANT, ticket.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Open);
        assert!(stored.last_customer_reply_at.is_some());

        let resolved = engine
            .change_status(&agent, ticket.id, status(TicketStatus::Resolved))
            .await
            .unwrap()
            .value;
        assert!(resolved.resolved_at.is_some());
        let a = store.get_agent_by_user_id(TENANT, "agent-a").await.unwrap().unwrap();
        assert_eq!(a.current_tickets, 0);
        assert_eq!(a.total_resolved, 1);
        assert_eq!(department_counts(&store, dept.id).await, (0, 1));

        let body = RateTicketDto {
            rating: 5,
            comment: Some("fast".into()),
        };
        let _ = engine.rate_ticket(&owner, ticket.id, body).await.unwrap();
        let a = store.get_agent_by_user_id(TENANT, "agent-a").await.unwrap().unwrap();
        assert_eq!(a.avg_rating, 5.0);
    }

    #[tokio::test]
    async fn reopen_restores_counters() {
        let store = Arc::new(MemoryStore::new());
        let dept = seed_department(&store, "Support").await;
        seed_agent(&store, "a1", vec![dept.id], 5).await;
        let engine = engine_with(store.clone(), false);
        let owner = customer("c1");
        let ticket = engine
            .create_ticket(&owner, routed("Flaky", dept.id))
            .await
            .unwrap()
            .value;
        let _ = engine.assign_ticket(&staff("lead"), ticket.id, "a1").await.unwrap();
        let _ = engine
            .change_status(&staff("a1"), ticket.id, status(TicketStatus::Resolved))
            .await
            .unwrap();

        let reopened = engine
            .change_status(&owner, ticket.id, status(TicketStatus::Reopened))
            .await
            .unwrap()
            .value;
        assert_eq!(reopened.reopen_count, 1);
        assert_eq!(reopened.resolved_at, None);
        assert_eq!(department_counts(&store, dept.id).await, (1, 1));
        assert_eq!(agent_load(&store, "a1").await, 1);

        // Closing a resolved ticket does not decrement twice.
        let _ = engine
            .change_status(&staff("a1"), ticket.id, status(TicketStatus::Resolved))
            .await
            .unwrap();
        let _ = engine
            .change_status(&owner, ticket.id, status(TicketStatus::Closed))
            .await
            .unwrap();
        assert_eq!(department_counts(&store, dept.id).await, (0, 1));
        assert_eq!(agent_load(&store, "a1").await, 0);
    }

    #[tokio::test]
    async fn counters_are_conserved_across_mixed_operations() {
        let store = Arc::new(MemoryStore::new());
        let support = seed_department(&store, "Support").await;
        let billing = seed_department(&store, "Billing").await;
        seed_agent(&store, "a1", vec![support.id], 10).await;
        seed_agent(&store, "a2", vec![billing.id], 10).await;
        let engine = engine(store.clone());
        let lead = staff("lead");
        let owner = customer("c1");

        let mut tickets = Vec::new();
        for i in 0..6 {
            let dept = if i % 2 == 0 { support.id } else { billing.id };
            tickets.push(
                engine
                    .create_ticket(&owner, routed(&format!("t{}", i), dept))
                    .await
                    .unwrap()
                    .value
                    .id,
            );
        }
        assert_counters_conserved(&store).await;

        let _ = engine.assign_ticket(&lead, tickets[0], "a2").await.unwrap();
        let _ = engine
            .transfer_ticket(&lead, tickets[1], TransferTicketDto { department_id: support.id, agent_id: None })
            .await
            .unwrap();
        let _ = engine.change_status(&lead, tickets[2], status(TicketStatus::Resolved)).await.unwrap();
        let _ = engine.change_status(&lead, tickets[2], status(TicketStatus::Closed)).await.unwrap();
        let _ = engine.change_status(&lead, tickets[3], status(TicketStatus::Closed)).await.unwrap();
        let _ = engine.change_status(&lead, tickets[3], status(TicketStatus::Reopened)).await.unwrap();
        let _ = engine.change_status(&lead, tickets[4], status(TicketStatus::Resolved)).await.unwrap();
        let _ = engine
            .transfer_ticket(&lead, tickets[4], TransferTicketDto { department_id: billing.id, agent_id: None })
            .await
            .unwrap();
        let _ = engine.delete_ticket(&lead, tickets[5]).await.unwrap();
        let _ = engine.delete_ticket(&lead, tickets[4]).await.unwrap();
        let _ = engine.change_status(&lead, tickets[0], status(TicketStatus::Cancelled)).await.unwrap();

        assert_counters_conserved(&store).await;
    }

    #[tokio::test]
    async fn delete_is_soft_and_releases_counters() {
        let store = Arc::new(MemoryStore::new());
        let dept = seed_department(&store, "Support").await;
        seed_agent(&store, "a1", vec![dept.id], 5).await;
        let engine = engine(store.clone());
        let ticket = engine
            .create_ticket(&customer("c1"), routed("Bye", dept.id))
            .await
            .unwrap()
            .value;
        assert_eq!(agent_load(&store, "a1").await, 1);

        let err = engine.delete_ticket(&customer("c1"), ticket.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let outcome = engine.delete_ticket(&staff("lead"), ticket.id).await.unwrap();
        assert!(outcome.is_clean());
        assert!(store.get_ticket(TENANT, ticket.id).await.unwrap().is_none());
        assert_eq!(department_counts(&store, dept.id).await, (0, 1));
        assert_eq!(agent_load(&store, "a1").await, 0);

        let history = store.list_history(TENANT, ticket.id).await.unwrap();
        assert_eq!(history.last().unwrap().action, HistoryAction::Deleted);
    }

    #[tokio::test]
    async fn history_failures_are_reported_not_raised() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        store.set_history_failure(true);

        let outcome = engine.create_ticket(&customer("c1"), new_ticket("Q")).await.unwrap();
        assert!(!outcome.is_clean());
        assert_eq!(outcome.side_effects[0].effect, SideEffect::HistoryEntry);
        assert!(store.get_ticket(TENANT, outcome.value.id).await.unwrap().is_some());

        let id = outcome.value.id;
        let outcome = engine
            .change_status(&staff("a1"), id, status(TicketStatus::Escalated))
            .await
            .unwrap();
        assert_eq!(outcome.value.status, TicketStatus::Escalated);
        assert_eq!(outcome.side_effects.len(), 1);
    }

    #[tokio::test]
    async fn listing_scopes_customers_to_their_own_tickets() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let _ = engine.create_ticket(&customer("c1"), new_ticket("mine")).await.unwrap();
        let _ = engine.create_ticket(&customer("c2"), new_ticket("theirs")).await.unwrap();

        let page = engine
            .list_tickets(&customer("c1"), TicketFilter::for_tenant(TENANT))
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.tickets[0].subject, "mine");

        let page = engine
            .list_tickets(&staff("a1"), TicketFilter::for_tenant(TENANT))
            .await
            .unwrap();
        assert_eq!(page.total, 2);

        let unassigned = engine.unassigned_tickets(&staff("a1"), 1, 20).await.unwrap();
        assert_eq!(unassigned.total, 2);

        let stats = engine.stats(&staff("a1")).await.unwrap();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.open, 2);

        let theirs = engine.customer_tickets(&staff("a1"), "c2", 1, 20).await.unwrap();
        assert_eq!(theirs.total, 1);
        assert!(matches!(
            engine.customer_tickets(&customer("c1"), "c2", 1, 20).await,
            Err(ServiceError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn pages_past_the_end_are_empty() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(store.clone());
        let _created = engine.create_ticket(&customer("c1"), new_ticket("only")).await.unwrap();

        let page = engine.customer_tickets(&customer("c1"), "c1", i64::MAX, 20).await.unwrap();
        assert_eq!(page.total, 1);
        assert!(page.tickets.is_empty());
    }
}
