// service/admin_service.rs
use std::{collections::HashSet, sync::Arc};

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::Store,
    dtos::admindtos::{
        CreateAgentDto, CreateCannedResponseDto, CreateSlaPolicyDto, SlaTargetDto, UpdateAgentDto,
        UpdateCannedResponseDto, UpdateSlaPolicyDto,
    },
    models::{
        agentmodel::{Agent, AgentRole, AgentStatus, CannedResponse, SlaPolicy, SlaTarget, DEFAULT_MAX_TICKETS},
        usermodel::Actor,
    },
    service::error::ServiceError,
};

/// Checks each target and rejects a priority listed twice.
fn validate_targets(targets: Vec<SlaTargetDto>) -> Result<Vec<SlaTarget>, ServiceError> {
    if targets.is_empty() {
        return Err(ServiceError::Validation(
            "At least one priority target is required".to_string(),
        ));
    }
    let mut seen = HashSet::new();
    let mut validated = Vec::with_capacity(targets.len());
    for target in targets {
        target
            .validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;
        if !seen.insert(target.priority) {
            return Err(ServiceError::Validation(format!(
                "Priority {} has more than one target",
                target.priority.as_str()
            )));
        }
        validated.push(target.into_target());
    }
    Ok(validated)
}

/// Agent profiles, SLA policies and canned responses.
#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn Store>,
}

impl AdminService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_agent(&self, tenant_id: &str, body: CreateAgentDto) -> Result<Agent, ServiceError> {
        let now = Utc::now();
        let agent = Agent {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            user_id: body.user_id.trim().to_string(),
            name: body.name,
            email: body.email,
            role: body.role.unwrap_or(AgentRole::Agent),
            department_ids: body.department_ids.unwrap_or_default(),
            team_id: body.team_id,
            status: AgentStatus::Offline,
            last_active_at: None,
            max_tickets: body.max_tickets.unwrap_or(DEFAULT_MAX_TICKETS),
            current_tickets: 0,
            tickets_today: 0,
            tickets_this_week: 0,
            tickets_this_month: 0,
            skills: body.skills.unwrap_or_default(),
            languages: body.languages.unwrap_or_default(),
            avg_rating: 0.0,
            total_resolved: 0,
            is_active: true,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        Ok(self.store.create_agent(&agent).await?)
    }

    pub async fn get_agent(&self, tenant_id: &str, agent_id: Uuid) -> Result<Agent, ServiceError> {
        self.store
            .get_agent(tenant_id, agent_id)
            .await?
            .ok_or_else(|| ServiceError::AgentNotFound(agent_id.to_string()))
    }

    pub async fn update_agent(
        &self,
        tenant_id: &str,
        agent_id: Uuid,
        body: UpdateAgentDto,
    ) -> Result<Agent, ServiceError> {
        let mut agent = self.get_agent(tenant_id, agent_id).await?;

        if let Some(name) = body.name {
            agent.name = name;
        }
        if let Some(email) = body.email {
            agent.email = email;
        }
        if let Some(role) = body.role {
            agent.role = role;
        }
        if let Some(department_ids) = body.department_ids {
            agent.department_ids = department_ids;
        }
        if body.team_id.is_some() {
            agent.team_id = body.team_id;
        }
        if let Some(max_tickets) = body.max_tickets {
            agent.max_tickets = max_tickets;
        }
        if let Some(skills) = body.skills {
            agent.skills = skills;
        }
        if let Some(languages) = body.languages {
            agent.languages = languages;
        }
        if let Some(is_active) = body.is_active {
            agent.is_active = is_active;
        }
        agent.updated_at = Utc::now();

        Ok(self.store.update_agent(&agent).await?)
    }

    pub async fn delete_agent(&self, tenant_id: &str, agent_id: Uuid) -> Result<(), ServiceError> {
        let agent = self.get_agent(tenant_id, agent_id).await?;
        if agent.current_tickets > 0 {
            return Err(ServiceError::InvalidState(format!(
                "Agent {} still has {} open tickets",
                agent.user_id, agent.current_tickets
            )));
        }
        if !self.store.soft_delete_agent(tenant_id, agent_id).await? {
            return Err(ServiceError::AgentNotFound(agent_id.to_string()));
        }
        Ok(())
    }

    pub async fn list_agents(&self, tenant_id: &str, department_id: Option<Uuid>) -> Result<Vec<Agent>, ServiceError> {
        Ok(self.store.list_agents(tenant_id, department_id).await?)
    }

    pub async fn update_agent_status(
        &self,
        tenant_id: &str,
        user_id: &str,
        status: AgentStatus,
    ) -> Result<Agent, ServiceError> {
        self.store
            .update_agent_status(tenant_id, user_id, status)
            .await?
            .ok_or_else(|| ServiceError::AgentNotFound(user_id.to_string()))
    }

    /// Agents set their own availability.
    pub async fn set_agent_status(&self, actor: &Actor, status: AgentStatus) -> Result<Agent, ServiceError> {
        self.update_agent_status(&actor.tenant_id, &actor.user_id, status).await
    }

    pub async fn create_sla_policy(
        &self,
        tenant_id: &str,
        body: CreateSlaPolicyDto,
    ) -> Result<SlaPolicy, ServiceError> {
        let targets = validate_targets(body.targets)?;
        let now = Utc::now();
        let policy = SlaPolicy {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            name: body.name,
            description: body.description,
            is_default: body.is_default.unwrap_or(false),
            is_active: true,
            targets,
            use_business_hours: body.use_business_hours.unwrap_or(false),
            created_at: now,
            updated_at: now,
        };

        let policy = self.store.create_sla_policy(&policy).await?;
        if policy.is_default {
            self.store.clear_default_sla_policy(tenant_id, policy.id).await?;
        }
        Ok(policy)
    }

    pub async fn get_sla_policy(&self, tenant_id: &str, policy_id: Uuid) -> Result<SlaPolicy, ServiceError> {
        self.store
            .get_sla_policy(tenant_id, policy_id)
            .await?
            .ok_or(ServiceError::SlaPolicyNotFound(policy_id))
    }

    pub async fn list_sla_policies(&self, tenant_id: &str) -> Result<Vec<SlaPolicy>, ServiceError> {
        Ok(self.store.list_sla_policies(tenant_id).await?)
    }

    pub async fn update_sla_policy(
        &self,
        tenant_id: &str,
        policy_id: Uuid,
        body: UpdateSlaPolicyDto,
    ) -> Result<SlaPolicy, ServiceError> {
        let mut policy = self.get_sla_policy(tenant_id, policy_id).await?;

        if let Some(targets) = body.targets {
            policy.targets = validate_targets(targets)?;
        }
        if let Some(name) = body.name {
            policy.name = name;
        }
        if body.description.is_some() {
            policy.description = body.description;
        }
        if let Some(is_default) = body.is_default {
            policy.is_default = is_default;
        }
        if let Some(is_active) = body.is_active {
            policy.is_active = is_active;
        }
        if let Some(use_business_hours) = body.use_business_hours {
            policy.use_business_hours = use_business_hours;
        }
        policy.updated_at = Utc::now();

        let policy = self.store.update_sla_policy(&policy).await?;
        if policy.is_default {
            self.store.clear_default_sla_policy(tenant_id, policy.id).await?;
        }
        Ok(policy)
    }

    pub async fn delete_sla_policy(&self, tenant_id: &str, policy_id: Uuid) -> Result<(), ServiceError> {
        let policy = self.get_sla_policy(tenant_id, policy_id).await?;
        if policy.is_default {
            return Err(ServiceError::InvalidState(
                "The default SLA policy cannot be deleted".to_string(),
            ));
        }
        if !self.store.delete_sla_policy(tenant_id, policy_id).await? {
            return Err(ServiceError::SlaPolicyNotFound(policy_id));
        }
        Ok(())
    }

    pub async fn create_canned_response(
        &self,
        actor: &Actor,
        body: CreateCannedResponseDto,
    ) -> Result<CannedResponse, ServiceError> {
        let now = Utc::now();
        let response = CannedResponse {
            id: Uuid::new_v4(),
            tenant_id: actor.tenant_id.clone(),
            title: body.title,
            content: body.content,
            shortcut: body.shortcut.map(|s| s.trim().to_string()),
            department_id: body.department_id,
            category: body.category,
            tags: body.tags.unwrap_or_default(),
            usage_count: 0,
            created_by: actor.user_id.clone(),
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        Ok(self.store.create_canned_response(&response).await?)
    }

    pub async fn get_canned_response(&self, tenant_id: &str, response_id: Uuid) -> Result<CannedResponse, ServiceError> {
        self.store
            .get_canned_response(tenant_id, response_id)
            .await?
            .ok_or(ServiceError::CannedResponseNotFound(response_id))
    }

    pub async fn update_canned_response(
        &self,
        tenant_id: &str,
        response_id: Uuid,
        body: UpdateCannedResponseDto,
    ) -> Result<CannedResponse, ServiceError> {
        let mut response = self.get_canned_response(tenant_id, response_id).await?;

        if let Some(title) = body.title {
            response.title = title;
        }
        if let Some(content) = body.content {
            response.content = content;
        }
        if let Some(shortcut) = body.shortcut {
            response.shortcut = Some(shortcut.trim().to_string());
        }
        if body.department_id.is_some() {
            response.department_id = body.department_id;
        }
        if body.category.is_some() {
            response.category = body.category;
        }
        if let Some(tags) = body.tags {
            response.tags = tags;
        }
        if let Some(is_active) = body.is_active {
            response.is_active = is_active;
        }
        response.updated_at = Utc::now();

        Ok(self.store.update_canned_response(&response).await?)
    }

    pub async fn delete_canned_response(&self, tenant_id: &str, response_id: Uuid) -> Result<(), ServiceError> {
        if !self.store.delete_canned_response(tenant_id, response_id).await? {
            return Err(ServiceError::CannedResponseNotFound(response_id));
        }
        Ok(())
    }

    pub async fn list_canned_responses(
        &self,
        tenant_id: &str,
        department_id: Option<Uuid>,
    ) -> Result<Vec<CannedResponse>, ServiceError> {
        Ok(self.store.list_canned_responses(tenant_id, department_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{agentdb::AgentExt, memory::MemoryStore, sladb::SlaPolicyExt},
        models::ticketmodel::TicketPriority,
        service::test_support::*,
    };

    fn admin_service(store: Arc<MemoryStore>) -> AdminService {
        AdminService::new(store)
    }

    fn target(priority: TicketPriority, first: i64, resolve: i64) -> SlaTargetDto {
        SlaTargetDto {
            priority,
            first_response_mins: first,
            resolution_mins: resolve,
            next_response_mins: None,
            escalation_enabled: None,
            escalation_after_mins: None,
        }
    }

    fn policy_body(name: &str, is_default: bool) -> CreateSlaPolicyDto {
        CreateSlaPolicyDto {
            name: name.to_string(),
            description: None,
            is_default: Some(is_default),
            targets: vec![target(TicketPriority::High, 60, 240)],
            use_business_hours: None,
        }
    }

    #[tokio::test]
    async fn agent_defaults_and_unique_user_id() {
        let store = Arc::new(MemoryStore::new());
        let service = admin_service(store);
        let body = CreateAgentDto {
            user_id: "u-1".into(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            ..Default::default()
        };

        let agent = service.create_agent(TENANT, body.clone()).await.unwrap();
        assert_eq!(agent.role, AgentRole::Agent);
        assert_eq!(agent.status, AgentStatus::Offline);
        assert_eq!(agent.max_tickets, DEFAULT_MAX_TICKETS);

        let err = service.create_agent(TENANT, body.clone()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // Same user id is fine in another tenant.
        service.create_agent(OTHER_TENANT, body).await.unwrap();
    }

    #[tokio::test]
    async fn busy_agents_cannot_be_deleted() {
        let store = Arc::new(MemoryStore::new());
        let agent = seed_agent(&store, "a1", vec![], 5).await;
        store.try_increment_agent_tickets(TENANT, "a1").await.unwrap();
        let service = admin_service(store.clone());

        let err = service.delete_agent(TENANT, agent.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        store.decrement_agent_tickets(TENANT, "a1").await.unwrap();
        service.delete_agent(TENANT, agent.id).await.unwrap();
        assert!(matches!(
            service.get_agent(TENANT, agent.id).await,
            Err(ServiceError::AgentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn agents_set_their_own_status() {
        let store = Arc::new(MemoryStore::new());
        seed_agent(&store, "a1", vec![], 5).await;
        let service = admin_service(store);

        let agent = service.set_agent_status(&staff("a1"), AgentStatus::Busy).await.unwrap();
        assert_eq!(agent.status, AgentStatus::Busy);
        assert!(agent.last_active_at.is_some());

        let err = service.set_agent_status(&staff("nobody"), AgentStatus::Away).await.unwrap_err();
        assert!(matches!(err, ServiceError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn only_one_default_policy_survives() {
        let store = Arc::new(MemoryStore::new());
        let service = admin_service(store);

        let first = service.create_sla_policy(TENANT, policy_body("Standard", true)).await.unwrap();
        let second = service.create_sla_policy(TENANT, policy_body("Gold", true)).await.unwrap();

        let first = service.get_sla_policy(TENANT, first.id).await.unwrap();
        assert!(!first.is_default);
        assert!(service.get_sla_policy(TENANT, second.id).await.unwrap().is_default);

        let err = service.delete_sla_policy(TENANT, second.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
        service.delete_sla_policy(TENANT, first.id).await.unwrap();
        assert_eq!(service.list_sla_policies(TENANT).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn policy_targets_are_checked() {
        let store = Arc::new(MemoryStore::new());
        let service = admin_service(store);

        let mut body = policy_body("Broken", false);
        body.targets.push(target(TicketPriority::High, 30, 60));
        let err = service.create_sla_policy(TENANT, body).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let created = service.create_sla_policy(TENANT, policy_body("Ok", false)).await.unwrap();
        let patch = UpdateSlaPolicyDto {
            targets: Some(vec![target(TicketPriority::Low, 0, 60)]),
            ..Default::default()
        };
        let err = service.update_sla_policy(TENANT, created.id, patch).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn policy_targets_are_capped() {
        let store = Arc::new(MemoryStore::new());
        let service = admin_service(store.clone());

        let mut body = policy_body("Forever", true);
        body.targets = vec![target(TicketPriority::Medium, 1_000_000_000_000, 1_000_000_000_000)];
        let err = service.create_sla_policy(TENANT, body).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let mut escalation = target(TicketPriority::Medium, 60, 240);
        escalation.escalation_after_mins = Some(i64::MAX);
        let mut body = policy_body("Escalating", true);
        body.targets = vec![escalation];
        let err = service.create_sla_policy(TENANT, body).await.unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let mut body = policy_body("Five years", true);
        body.targets = vec![target(TicketPriority::Medium, 2_628_000, 2_628_000)];
        service.create_sla_policy(TENANT, body).await.unwrap();
        assert!(store.get_default_sla_policy(TENANT).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn canned_shortcuts_are_unique_per_tenant() {
        let store = Arc::new(MemoryStore::new());
        let service = admin_service(store);
        let body = CreateCannedResponseDto {
            title: "Greeting".into(),
            content: "Hello, thanks for reaching out.".into(),
            shortcut: Some("hi".into()),
            ..Default::default()
        };

        let created = service.create_canned_response(&admin(), body.clone()).await.unwrap();
        assert_eq!(created.created_by, "admin-1");

        let err = service.create_canned_response(&admin(), body).await.unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        let patch = UpdateCannedResponseDto {
            is_active: Some(false),
            ..Default::default()
        };
        service.update_canned_response(TENANT, created.id, patch).await.unwrap();
        assert!(service.list_canned_responses(TENANT, None).await.unwrap().is_empty());

        service.delete_canned_response(TENANT, created.id).await.unwrap();
        let err = service.delete_canned_response(TENANT, created.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::CannedResponseNotFound(_)));
    }
}
