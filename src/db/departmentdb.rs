// src/db/departmentdb.rs
use async_trait::async_trait;
use sqlx::types::Json;
use uuid::Uuid;

use super::{db::DBClient, DbError};
use crate::models::departmentmodel::{Category, Department};

#[async_trait]
pub trait DepartmentExt: Send + Sync {
    async fn create_department(&self, department: &Department) -> Result<Department, DbError>;

    async fn get_department(
        &self,
        tenant_id: &str,
        department_id: Uuid,
    ) -> Result<Option<Department>, DbError>;

    async fn update_department(&self, department: &Department) -> Result<Department, DbError>;

    async fn soft_delete_department(&self, tenant_id: &str, department_id: Uuid) -> Result<bool, DbError>;

    async fn list_departments(&self, tenant_id: &str, active_only: bool) -> Result<Vec<Department>, DbError>;

    /// Bumps the total counter, and the open counter when `is_open`.
    async fn increment_department_tickets(
        &self,
        tenant_id: &str,
        department_id: Uuid,
        is_open: bool,
    ) -> Result<(), DbError>;

    async fn increment_department_open_tickets(
        &self,
        tenant_id: &str,
        department_id: Uuid,
    ) -> Result<(), DbError>;

    /// Never drops below zero.
    async fn decrement_department_open_tickets(
        &self,
        tenant_id: &str,
        department_id: Uuid,
    ) -> Result<(), DbError>;
}

#[async_trait]
pub trait CategoryExt: Send + Sync {
    async fn create_category(&self, category: &Category) -> Result<Category, DbError>;

    async fn get_category(&self, tenant_id: &str, category_id: Uuid) -> Result<Option<Category>, DbError>;

    async fn update_category(&self, category: &Category) -> Result<Category, DbError>;

    async fn soft_delete_category(&self, tenant_id: &str, category_id: Uuid) -> Result<bool, DbError>;

    async fn list_categories(
        &self,
        tenant_id: &str,
        department_id: Option<Uuid>,
        public_only: bool,
    ) -> Result<Vec<Category>, DbError>;
}

#[async_trait]
impl DepartmentExt for DBClient {
    async fn create_department(&self, department: &Department) -> Result<Department, DbError> {
        sqlx::query_as::<_, Department>(
            r#"
            INSERT INTO departments (
                id, tenant_id, name, slug, description, email, parent_id, path, level,
                manager_id, manager_name, agent_ids, auto_assign, auto_assign_type,
                default_priority, sla_policy_id, business_hours, open_tickets,
                total_tickets, metadata, is_active, is_deleted, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20, $21, $22, $23, $24
            )
            RETURNING *
            "#,
        )
        .bind(department.id)
        .bind(&department.tenant_id)
        .bind(&department.name)
        .bind(&department.slug)
        .bind(&department.description)
        .bind(&department.email)
        .bind(department.parent_id)
        .bind(&department.path)
        .bind(department.level)
        .bind(&department.manager_id)
        .bind(&department.manager_name)
        .bind(&department.agent_ids)
        .bind(department.auto_assign)
        .bind(&department.auto_assign_type)
        .bind(department.default_priority)
        .bind(department.sla_policy_id)
        .bind(Json(&department.business_hours))
        .bind(department.open_tickets)
        .bind(department.total_tickets)
        .bind(Json(&department.metadata))
        .bind(department.is_active)
        .bind(department.is_deleted)
        .bind(department.created_at)
        .bind(department.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::unique(e, "department slug"))
    }

    async fn get_department(
        &self,
        tenant_id: &str,
        department_id: Uuid,
    ) -> Result<Option<Department>, DbError> {
        let department = sqlx::query_as::<_, Department>(
            r#"
            SELECT * FROM departments
            WHERE id = $1 AND tenant_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(department_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(department)
    }

    async fn update_department(&self, department: &Department) -> Result<Department, DbError> {
        // Counters are owned by the increment/decrement calls and never written here.
        sqlx::query_as::<_, Department>(
            r#"
            UPDATE departments SET
                name = $3, slug = $4, description = $5, email = $6, parent_id = $7,
                path = $8, level = $9, manager_id = $10, manager_name = $11,
                agent_ids = $12, auto_assign = $13, auto_assign_type = $14,
                default_priority = $15, sla_policy_id = $16, business_hours = $17,
                metadata = $18, is_active = $19, updated_at = $20
            WHERE id = $1 AND tenant_id = $2 AND NOT is_deleted
            RETURNING *
            "#,
        )
        .bind(department.id)
        .bind(&department.tenant_id)
        .bind(&department.name)
        .bind(&department.slug)
        .bind(&department.description)
        .bind(&department.email)
        .bind(department.parent_id)
        .bind(&department.path)
        .bind(department.level)
        .bind(&department.manager_id)
        .bind(&department.manager_name)
        .bind(&department.agent_ids)
        .bind(department.auto_assign)
        .bind(&department.auto_assign_type)
        .bind(department.default_priority)
        .bind(department.sla_policy_id)
        .bind(Json(&department.business_hours))
        .bind(Json(&department.metadata))
        .bind(department.is_active)
        .bind(department.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::unique(e, "department slug"))
    }

    async fn soft_delete_department(&self, tenant_id: &str, department_id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE departments SET is_deleted = TRUE, is_active = FALSE, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(department_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_departments(&self, tenant_id: &str, active_only: bool) -> Result<Vec<Department>, DbError> {
        let departments = sqlx::query_as::<_, Department>(
            r#"
            SELECT * FROM departments
            WHERE tenant_id = $1 AND NOT is_deleted AND (NOT $2 OR is_active)
            ORDER BY path ASC
            "#,
        )
        .bind(tenant_id)
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(departments)
    }

    async fn increment_department_tickets(
        &self,
        tenant_id: &str,
        department_id: Uuid,
        is_open: bool,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE departments SET
                total_tickets = total_tickets + 1,
                open_tickets = open_tickets + CASE WHEN $3 THEN 1 ELSE 0 END
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(department_id)
        .bind(tenant_id)
        .bind(is_open)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_department_open_tickets(
        &self,
        tenant_id: &str,
        department_id: Uuid,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE departments SET open_tickets = open_tickets + 1
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(department_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn decrement_department_open_tickets(
        &self,
        tenant_id: &str,
        department_id: Uuid,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE departments SET open_tickets = GREATEST(open_tickets - 1, 0)
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(department_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CategoryExt for DBClient {
    async fn create_category(&self, category: &Category) -> Result<Category, DbError> {
        let created = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (
                id, tenant_id, name, slug, description, parent_id, path, level,
                department_id, default_priority, sort_order, is_active, is_public,
                is_deleted, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING *
            "#,
        )
        .bind(category.id)
        .bind(&category.tenant_id)
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.description)
        .bind(category.parent_id)
        .bind(&category.path)
        .bind(category.level)
        .bind(category.department_id)
        .bind(category.default_priority)
        .bind(category.sort_order)
        .bind(category.is_active)
        .bind(category.is_public)
        .bind(category.is_deleted)
        .bind(category.created_at)
        .bind(category.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn get_category(&self, tenant_id: &str, category_id: Uuid) -> Result<Option<Category>, DbError> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            SELECT * FROM categories
            WHERE id = $1 AND tenant_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(category_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(category)
    }

    async fn update_category(&self, category: &Category) -> Result<Category, DbError> {
        let updated = sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories SET
                name = $3, slug = $4, description = $5, parent_id = $6, path = $7,
                level = $8, department_id = $9, default_priority = $10, sort_order = $11,
                is_active = $12, is_public = $13, updated_at = $14
            WHERE id = $1 AND tenant_id = $2 AND NOT is_deleted
            RETURNING *
            "#,
        )
        .bind(category.id)
        .bind(&category.tenant_id)
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.description)
        .bind(category.parent_id)
        .bind(&category.path)
        .bind(category.level)
        .bind(category.department_id)
        .bind(category.default_priority)
        .bind(category.sort_order)
        .bind(category.is_active)
        .bind(category.is_public)
        .bind(category.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }

    async fn soft_delete_category(&self, tenant_id: &str, category_id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE categories SET is_deleted = TRUE, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(category_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_categories(
        &self,
        tenant_id: &str,
        department_id: Option<Uuid>,
        public_only: bool,
    ) -> Result<Vec<Category>, DbError> {
        let categories = sqlx::query_as::<_, Category>(
            r#"
            SELECT * FROM categories
            WHERE tenant_id = $1 AND NOT is_deleted AND is_active
              AND ($2::UUID IS NULL OR department_id IS NULL OR department_id = $2)
              AND (NOT $3 OR is_public)
            ORDER BY sort_order ASC, name ASC
            "#,
        )
        .bind(tenant_id)
        .bind(department_id)
        .bind(public_only)
        .fetch_all(&self.pool)
        .await?;

        Ok(categories)
    }
}
