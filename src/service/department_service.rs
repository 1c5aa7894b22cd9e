// service/department_service.rs
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::Store,
    dtos::admindtos::{CreateCategoryDto, CreateDepartmentDto, UpdateCategoryDto, UpdateDepartmentDto},
    models::{
        agentmodel::Agent,
        departmentmodel::{slugify, Category, Department},
        ticketmodel::{FieldMap, TicketPriority},
    },
    service::error::ServiceError,
};

/// Departments, their agent rosters, and ticket categories.
#[derive(Clone)]
pub struct DepartmentService {
    store: Arc<dyn Store>,
}

impl DepartmentService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// A dangling policy reference is dropped rather than rejected.
    async fn known_policy(&self, tenant_id: &str, policy_id: Option<Uuid>) -> Option<Uuid> {
        let id = policy_id?;
        self.store
            .get_sla_policy(tenant_id, id)
            .await
            .ok()
            .flatten()
            .map(|policy| policy.id)
    }

    pub async fn create_department(
        &self,
        tenant_id: &str,
        body: CreateDepartmentDto,
    ) -> Result<Department, ServiceError> {
        let slug = slugify(&body.name);
        if slug.is_empty() {
            return Err(ServiceError::Validation("Department name is required".to_string()));
        }

        let (path, level) = match body.parent_id {
            Some(parent_id) => {
                let parent = self.get_department(tenant_id, parent_id).await?;
                (format!("{}/{}", parent.path, slug), parent.level + 1)
            }
            None => (format!("/{}", slug), 0),
        };

        let now = Utc::now();
        let department = Department {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            name: body.name.trim().to_string(),
            slug,
            description: body.description,
            email: body.email,
            parent_id: body.parent_id,
            path,
            level,
            manager_id: body.manager_id,
            manager_name: body.manager_name,
            agent_ids: Vec::new(),
            auto_assign: body.auto_assign.unwrap_or(true),
            auto_assign_type: body.auto_assign_type.unwrap_or_else(|| "round_robin".to_string()),
            default_priority: body.default_priority.unwrap_or(TicketPriority::Medium),
            sla_policy_id: self.known_policy(tenant_id, body.sla_policy_id).await,
            business_hours: body.business_hours,
            open_tickets: 0,
            total_tickets: 0,
            metadata: FieldMap::new(),
            is_active: true,
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        Ok(self.store.create_department(&department).await?)
    }

    pub async fn get_department(&self, tenant_id: &str, department_id: Uuid) -> Result<Department, ServiceError> {
        self.store
            .get_department(tenant_id, department_id)
            .await?
            .ok_or(ServiceError::DepartmentNotFound(department_id))
    }

    /// Renaming keeps the slug and path, so child paths stay valid.
    pub async fn update_department(
        &self,
        tenant_id: &str,
        department_id: Uuid,
        body: UpdateDepartmentDto,
    ) -> Result<Department, ServiceError> {
        let mut department = self.get_department(tenant_id, department_id).await?;

        if let Some(name) = body.name {
            department.name = name.trim().to_string();
        }
        if body.description.is_some() {
            department.description = body.description;
        }
        if body.email.is_some() {
            department.email = body.email;
        }
        if body.manager_id.is_some() {
            department.manager_id = body.manager_id;
            department.manager_name = body.manager_name;
        }
        if let Some(auto_assign) = body.auto_assign {
            department.auto_assign = auto_assign;
        }
        if let Some(auto_assign_type) = body.auto_assign_type {
            department.auto_assign_type = auto_assign_type;
        }
        if let Some(priority) = body.default_priority {
            department.default_priority = priority;
        }
        if body.sla_policy_id.is_some() {
            department.sla_policy_id = self.known_policy(tenant_id, body.sla_policy_id).await;
        }
        if body.business_hours.is_some() {
            department.business_hours = body.business_hours;
        }
        if let Some(is_active) = body.is_active {
            department.is_active = is_active;
        }
        department.updated_at = Utc::now();

        Ok(self.store.update_department(&department).await?)
    }

    pub async fn delete_department(&self, tenant_id: &str, department_id: Uuid) -> Result<(), ServiceError> {
        let department = self.get_department(tenant_id, department_id).await?;
        if department.open_tickets > 0 {
            return Err(ServiceError::InvalidState(format!(
                "Department {} still has {} open tickets",
                department.name, department.open_tickets
            )));
        }
        if !self.store.soft_delete_department(tenant_id, department_id).await? {
            return Err(ServiceError::DepartmentNotFound(department_id));
        }
        Ok(())
    }

    pub async fn list_departments(&self, tenant_id: &str, active_only: bool) -> Result<Vec<Department>, ServiceError> {
        Ok(self.store.list_departments(tenant_id, active_only).await?)
    }

    pub async fn department_agents(&self, tenant_id: &str, department_id: Uuid) -> Result<Vec<Agent>, ServiceError> {
        let department = self.get_department(tenant_id, department_id).await?;
        Ok(self.store.list_agents(tenant_id, Some(department.id)).await?)
    }

    /// Links the agent and the department on both records.
    pub async fn add_agent(
        &self,
        tenant_id: &str,
        department_id: Uuid,
        user_id: &str,
    ) -> Result<Department, ServiceError> {
        let mut department = self.get_department(tenant_id, department_id).await?;
        let mut agent = self.find_agent(tenant_id, user_id).await?;

        if !agent.department_ids.contains(&department.id) {
            agent.department_ids.push(department.id);
            agent.updated_at = Utc::now();
            self.store.update_agent(&agent).await?;
        }
        if department.agent_ids.iter().any(|id| id == &agent.user_id) {
            return Ok(department);
        }
        department.agent_ids.push(agent.user_id);
        department.updated_at = Utc::now();
        Ok(self.store.update_department(&department).await?)
    }

    pub async fn remove_agent(
        &self,
        tenant_id: &str,
        department_id: Uuid,
        user_id: &str,
    ) -> Result<Department, ServiceError> {
        let mut department = self.get_department(tenant_id, department_id).await?;
        let mut agent = self.find_agent(tenant_id, user_id).await?;

        if agent.department_ids.contains(&department.id) {
            agent.department_ids.retain(|id| *id != department.id);
            agent.updated_at = Utc::now();
            self.store.update_agent(&agent).await?;
        }
        department.agent_ids.retain(|id| id != &agent.user_id);
        department.updated_at = Utc::now();
        Ok(self.store.update_department(&department).await?)
    }

    async fn find_agent(&self, tenant_id: &str, user_id: &str) -> Result<Agent, ServiceError> {
        self.store
            .get_agent_by_user_id(tenant_id, user_id)
            .await?
            .ok_or_else(|| ServiceError::AgentNotFound(user_id.to_string()))
    }

    pub async fn create_category(&self, tenant_id: &str, body: CreateCategoryDto) -> Result<Category, ServiceError> {
        let slug = slugify(&body.name);
        if slug.is_empty() {
            return Err(ServiceError::Validation("Category name is required".to_string()));
        }

        let (path, level) = match body.parent_id {
            Some(parent_id) => {
                let parent = self.get_category(tenant_id, parent_id).await?;
                (format!("{}/{}", parent.path, slug), parent.level + 1)
            }
            None => (format!("/{}", slug), 0),
        };
        if let Some(department_id) = body.department_id {
            self.get_department(tenant_id, department_id).await?;
        }

        let now = Utc::now();
        let category = Category {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            name: body.name.trim().to_string(),
            slug,
            description: body.description,
            parent_id: body.parent_id,
            path,
            level,
            department_id: body.department_id,
            default_priority: body.default_priority,
            sort_order: body.sort_order.unwrap_or(0),
            is_active: true,
            is_public: body.is_public.unwrap_or(true),
            is_deleted: false,
            created_at: now,
            updated_at: now,
        };

        Ok(self.store.create_category(&category).await?)
    }

    pub async fn get_category(&self, tenant_id: &str, category_id: Uuid) -> Result<Category, ServiceError> {
        self.store
            .get_category(tenant_id, category_id)
            .await?
            .ok_or(ServiceError::CategoryNotFound(category_id))
    }

    pub async fn update_category(
        &self,
        tenant_id: &str,
        category_id: Uuid,
        body: UpdateCategoryDto,
    ) -> Result<Category, ServiceError> {
        let mut category = self.get_category(tenant_id, category_id).await?;

        if let Some(name) = body.name {
            category.name = name.trim().to_string();
        }
        if body.description.is_some() {
            category.description = body.description;
        }
        if let Some(department_id) = body.department_id {
            self.get_department(tenant_id, department_id).await?;
            category.department_id = Some(department_id);
        }
        if body.default_priority.is_some() {
            category.default_priority = body.default_priority;
        }
        if let Some(sort_order) = body.sort_order {
            category.sort_order = sort_order;
        }
        if let Some(is_public) = body.is_public {
            category.is_public = is_public;
        }
        if let Some(is_active) = body.is_active {
            category.is_active = is_active;
        }
        category.updated_at = Utc::now();

        Ok(self.store.update_category(&category).await?)
    }

    pub async fn delete_category(&self, tenant_id: &str, category_id: Uuid) -> Result<(), ServiceError> {
        if !self.store.soft_delete_category(tenant_id, category_id).await? {
            return Err(ServiceError::CategoryNotFound(category_id));
        }
        Ok(())
    }

    /// Customers only see public categories.
    pub async fn list_categories(
        &self,
        tenant_id: &str,
        department_id: Option<Uuid>,
        public_only: bool,
    ) -> Result<Vec<Category>, ServiceError> {
        Ok(self
            .store
            .list_categories(tenant_id, department_id, public_only)
            .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::{agentdb::AgentExt, departmentdb::DepartmentExt, memory::MemoryStore},
        service::test_support::*,
    };

    fn departments(store: Arc<MemoryStore>) -> DepartmentService {
        DepartmentService::new(store)
    }

    fn named(name: &str) -> CreateDepartmentDto {
        CreateDepartmentDto {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn child_departments_extend_the_parent_path() {
        let store = Arc::new(MemoryStore::new());
        let service = departments(store);

        let parent = service.create_department(TENANT, named("Customer Care")).await.unwrap();
        assert_eq!(parent.slug, "customer-care");
        assert_eq!(parent.path, "/customer-care");
        assert_eq!(parent.default_priority, TicketPriority::Medium);

        let child = service
            .create_department(
                TENANT,
                CreateDepartmentDto {
                    parent_id: Some(parent.id),
                    ..named("Refunds")
                },
            )
            .await
            .unwrap();
        assert_eq!(child.path, "/customer-care/refunds");
        assert_eq!(child.level, 1);

        let err = service
            .create_department(TENANT, named("Customer Care"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[tokio::test]
    async fn unknown_sla_policy_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let service = departments(store);

        let department = service
            .create_department(
                TENANT,
                CreateDepartmentDto {
                    sla_policy_id: Some(Uuid::new_v4()),
                    ..named("Billing")
                },
            )
            .await
            .unwrap();
        assert_eq!(department.sla_policy_id, None);
    }

    #[tokio::test]
    async fn departments_with_open_tickets_are_kept() {
        let store = Arc::new(MemoryStore::new());
        let dept = seed_department(&store, "Support").await;
        store.increment_department_tickets(TENANT, dept.id, true).await.unwrap();
        let service = departments(store.clone());

        let err = service.delete_department(TENANT, dept.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        store.decrement_department_open_tickets(TENANT, dept.id).await.unwrap();
        service.delete_department(TENANT, dept.id).await.unwrap();
        assert!(service.list_departments(TENANT, false).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn roster_changes_update_both_sides() {
        let store = Arc::new(MemoryStore::new());
        let dept = seed_department(&store, "Support").await;
        seed_agent(&store, "a1", vec![], 5).await;
        let service = departments(store.clone());

        let updated = service.add_agent(TENANT, dept.id, "a1").await.unwrap();
        assert_eq!(updated.agent_ids, vec!["a1".to_string()]);
        // Adding twice is harmless.
        service.add_agent(TENANT, dept.id, "a1").await.unwrap();
        let roster = service.department_agents(TENANT, dept.id).await.unwrap();
        assert_eq!(roster.len(), 1);

        let updated = service.remove_agent(TENANT, dept.id, "a1").await.unwrap();
        assert!(updated.agent_ids.is_empty());
        let agent = store.get_agent_by_user_id(TENANT, "a1").await.unwrap().unwrap();
        assert!(agent.department_ids.is_empty());

        let err = service.add_agent(TENANT, dept.id, "ghost").await.unwrap_err();
        assert!(matches!(err, ServiceError::AgentNotFound(_)));
    }

    #[tokio::test]
    async fn categories_nest_and_hide_private_entries() {
        let store = Arc::new(MemoryStore::new());
        let service = departments(store);

        let billing = service
            .create_category(
                TENANT,
                CreateCategoryDto {
                    name: "Billing".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let internal = service
            .create_category(
                TENANT,
                CreateCategoryDto {
                    name: "Chargebacks".into(),
                    parent_id: Some(billing.id),
                    is_public: Some(false),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(internal.path, "/billing/chargebacks");

        assert_eq!(service.list_categories(TENANT, None, true).await.unwrap().len(), 1);
        assert_eq!(service.list_categories(TENANT, None, false).await.unwrap().len(), 2);

        let err = service
            .create_category(
                TENANT,
                CreateCategoryDto {
                    name: "Orphan".into(),
                    department_id: Some(Uuid::new_v4()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::DepartmentNotFound(_)));

        service.delete_category(TENANT, internal.id).await.unwrap();
        assert!(matches!(
            service.get_category(TENANT, internal.id).await,
            Err(ServiceError::CategoryNotFound(_))
        ));
    }
}
