// service/assignment_service.rs
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::{
    db::{DbError, Store},
    models::{agentmodel::Agent, ticketmodel::Ticket, usermodel::Actor},
    service::{
        error::ServiceError,
        history_service::HistoryService,
        outcome::{Outcome, SideEffect, SideEffects},
    },
};

/// Copies the agent onto the ticket's assignment fields.
pub fn stamp_assignment(ticket: &mut Ticket, agent: &Agent, assigned_by: &str, now: DateTime<Utc>) {
    ticket.assigned_to_id = Some(agent.user_id.clone());
    ticket.assigned_to_name = Some(agent.name.clone());
    ticket.assigned_to_email = Some(agent.email.clone());
    ticket.assigned_at = Some(now);
    ticket.assigned_by_id = Some(assigned_by.to_string());
    ticket.updated_at = now;
    ticket.last_activity_at = now;
}

/// Agent selection and workload reservations.
///
/// Reservations go through `try_increment_agent_tickets`, so two requests
/// racing for the last slot of an agent cannot both win.
#[derive(Clone)]
pub struct AssignmentService {
    store: Arc<dyn Store>,
    history: HistoryService,
    auto_assign_enabled: bool,
}

impl AssignmentService {
    pub fn new(store: Arc<dyn Store>, history: HistoryService, auto_assign_enabled: bool) -> Self {
        Self {
            store,
            history,
            auto_assign_enabled,
        }
    }

    pub async fn find_agent(&self, tenant_id: &str, user_id: &str) -> Result<Agent, ServiceError> {
        self.store
            .get_agent_by_user_id(tenant_id, user_id)
            .await?
            .filter(|agent| agent.is_active)
            .ok_or_else(|| ServiceError::AgentNotFound(user_id.to_string()))
    }

    /// Takes one unit of the agent's capacity or fails with `AgentAtCapacity`.
    pub async fn reserve(&self, tenant_id: &str, agent: &Agent) -> Result<(), ServiceError> {
        if self
            .store
            .try_increment_agent_tickets(tenant_id, &agent.user_id)
            .await?
        {
            Ok(())
        } else {
            Err(ServiceError::AgentAtCapacity(agent.user_id.clone()))
        }
    }

    pub async fn release(&self, tenant_id: &str, user_id: &str) -> Result<(), DbError> {
        self.store.decrement_agent_tickets(tenant_id, user_id).await
    }

    /// Gives the ticket back its reservation after the ticket write failed.
    pub async fn rollback(&self, tenant_id: &str, user_id: &str, cause: DbError) -> ServiceError {
        if let Err(release_error) = self.release(tenant_id, user_id).await {
            return ServiceError::Database(release_error);
        }
        cause.into()
    }

    /// Hands an unassigned open ticket to the least busy available agent of
    /// its department. `None` when auto-assign is off or nobody has capacity.
    pub async fn auto_assign(
        &self,
        ticket: &Ticket,
        now: DateTime<Utc>,
    ) -> Result<Outcome<Option<Ticket>>, ServiceError> {
        let department_id = match ticket.department_id {
            Some(id) if self.auto_assign_enabled && !ticket.is_assigned() && ticket.counts_as_open() => id,
            _ => return Ok(Outcome::new(None)),
        };

        let candidates = self
            .store
            .list_available_agents(&ticket.tenant_id, Some(department_id))
            .await?;

        for agent in candidates {
            if !self
                .store
                .try_increment_agent_tickets(&ticket.tenant_id, &agent.user_id)
                .await?
            {
                // Lost the race for this agent's last slot.
                continue;
            }

            let mut assigned = ticket.clone();
            stamp_assignment(&mut assigned, &agent, Actor::SYSTEM_ID, now);

            let saved = match self.store.update_ticket(&assigned).await {
                Ok(saved) => saved,
                Err(err) => return Err(self.rollback(&ticket.tenant_id, &agent.user_id, err).await),
            };

            let system = Actor::system(&ticket.tenant_id);
            let mut effects = SideEffects::new();
            effects.note(
                SideEffect::HistoryEntry,
                self.history.log_assignment(&saved, None, &system, true).await,
            );
            return Ok(effects.finish(Some(saved)));
        }

        Ok(Outcome::new(None))
    }
}
