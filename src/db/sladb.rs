// src/db/sladb.rs
use async_trait::async_trait;
use sqlx::types::Json;
use uuid::Uuid;

use super::{db::DBClient, DbError};
use crate::models::agentmodel::{CannedResponse, SlaPolicy};

#[async_trait]
pub trait SlaPolicyExt: Send + Sync {
    async fn create_sla_policy(&self, policy: &SlaPolicy) -> Result<SlaPolicy, DbError>;

    async fn get_sla_policy(&self, tenant_id: &str, policy_id: Uuid) -> Result<Option<SlaPolicy>, DbError>;

    async fn get_default_sla_policy(&self, tenant_id: &str) -> Result<Option<SlaPolicy>, DbError>;

    async fn update_sla_policy(&self, policy: &SlaPolicy) -> Result<SlaPolicy, DbError>;

    async fn delete_sla_policy(&self, tenant_id: &str, policy_id: Uuid) -> Result<bool, DbError>;

    async fn list_sla_policies(&self, tenant_id: &str) -> Result<Vec<SlaPolicy>, DbError>;

    /// Drops the default flag from every tenant policy except `keep`.
    async fn clear_default_sla_policy(&self, tenant_id: &str, keep: Uuid) -> Result<(), DbError>;
}

#[async_trait]
pub trait CannedResponseExt: Send + Sync {
    async fn create_canned_response(&self, response: &CannedResponse) -> Result<CannedResponse, DbError>;

    async fn get_canned_response(
        &self,
        tenant_id: &str,
        response_id: Uuid,
    ) -> Result<Option<CannedResponse>, DbError>;

    async fn get_canned_response_by_shortcut(
        &self,
        tenant_id: &str,
        shortcut: &str,
    ) -> Result<Option<CannedResponse>, DbError>;

    async fn update_canned_response(&self, response: &CannedResponse) -> Result<CannedResponse, DbError>;

    async fn delete_canned_response(&self, tenant_id: &str, response_id: Uuid) -> Result<bool, DbError>;

    /// Global responses plus the ones scoped to `department_id`.
    async fn list_canned_responses(
        &self,
        tenant_id: &str,
        department_id: Option<Uuid>,
    ) -> Result<Vec<CannedResponse>, DbError>;

    async fn increment_canned_usage(&self, tenant_id: &str, response_id: Uuid) -> Result<(), DbError>;
}

#[async_trait]
impl SlaPolicyExt for DBClient {
    async fn create_sla_policy(&self, policy: &SlaPolicy) -> Result<SlaPolicy, DbError> {
        let created = sqlx::query_as::<_, SlaPolicy>(
            r#"
            INSERT INTO sla_policies (
                id, tenant_id, name, description, is_default, is_active, targets,
                use_business_hours, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(policy.id)
        .bind(&policy.tenant_id)
        .bind(&policy.name)
        .bind(&policy.description)
        .bind(policy.is_default)
        .bind(policy.is_active)
        .bind(Json(&policy.targets))
        .bind(policy.use_business_hours)
        .bind(policy.created_at)
        .bind(policy.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn get_sla_policy(&self, tenant_id: &str, policy_id: Uuid) -> Result<Option<SlaPolicy>, DbError> {
        let policy = sqlx::query_as::<_, SlaPolicy>(
            "SELECT * FROM sla_policies WHERE id = $1 AND tenant_id = $2",
        )
        .bind(policy_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(policy)
    }

    async fn get_default_sla_policy(&self, tenant_id: &str) -> Result<Option<SlaPolicy>, DbError> {
        let policy = sqlx::query_as::<_, SlaPolicy>(
            r#"
            SELECT * FROM sla_policies
            WHERE tenant_id = $1 AND is_default AND is_active
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(policy)
    }

    async fn update_sla_policy(&self, policy: &SlaPolicy) -> Result<SlaPolicy, DbError> {
        let updated = sqlx::query_as::<_, SlaPolicy>(
            r#"
            UPDATE sla_policies SET
                name = $3, description = $4, is_default = $5, is_active = $6,
                targets = $7, use_business_hours = $8, updated_at = $9
            WHERE id = $1 AND tenant_id = $2
            RETURNING *
            "#,
        )
        .bind(policy.id)
        .bind(&policy.tenant_id)
        .bind(&policy.name)
        .bind(&policy.description)
        .bind(policy.is_default)
        .bind(policy.is_active)
        .bind(Json(&policy.targets))
        .bind(policy.use_business_hours)
        .bind(policy.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }

    async fn delete_sla_policy(&self, tenant_id: &str, policy_id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM sla_policies WHERE id = $1 AND tenant_id = $2")
            .bind(policy_id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_sla_policies(&self, tenant_id: &str) -> Result<Vec<SlaPolicy>, DbError> {
        let policies = sqlx::query_as::<_, SlaPolicy>(
            r#"
            SELECT * FROM sla_policies
            WHERE tenant_id = $1
            ORDER BY is_default DESC, name ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(policies)
    }

    async fn clear_default_sla_policy(&self, tenant_id: &str, keep: Uuid) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE sla_policies SET is_default = FALSE, updated_at = NOW()
            WHERE tenant_id = $1 AND id <> $2 AND is_default
            "#,
        )
        .bind(tenant_id)
        .bind(keep)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl CannedResponseExt for DBClient {
    async fn create_canned_response(&self, response: &CannedResponse) -> Result<CannedResponse, DbError> {
        sqlx::query_as::<_, CannedResponse>(
            r#"
            INSERT INTO canned_responses (
                id, tenant_id, title, content, shortcut, department_id, category,
                tags, usage_count, created_by, is_active, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
            "#,
        )
        .bind(response.id)
        .bind(&response.tenant_id)
        .bind(&response.title)
        .bind(&response.content)
        .bind(&response.shortcut)
        .bind(response.department_id)
        .bind(&response.category)
        .bind(&response.tags)
        .bind(response.usage_count)
        .bind(&response.created_by)
        .bind(response.is_active)
        .bind(response.created_at)
        .bind(response.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::unique(e, "canned response shortcut"))
    }

    async fn get_canned_response(
        &self,
        tenant_id: &str,
        response_id: Uuid,
    ) -> Result<Option<CannedResponse>, DbError> {
        let response = sqlx::query_as::<_, CannedResponse>(
            "SELECT * FROM canned_responses WHERE id = $1 AND tenant_id = $2",
        )
        .bind(response_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(response)
    }

    async fn get_canned_response_by_shortcut(
        &self,
        tenant_id: &str,
        shortcut: &str,
    ) -> Result<Option<CannedResponse>, DbError> {
        let response = sqlx::query_as::<_, CannedResponse>(
            "SELECT * FROM canned_responses WHERE shortcut = $1 AND tenant_id = $2",
        )
        .bind(shortcut)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(response)
    }

    async fn update_canned_response(&self, response: &CannedResponse) -> Result<CannedResponse, DbError> {
        sqlx::query_as::<_, CannedResponse>(
            r#"
            UPDATE canned_responses SET
                title = $3, content = $4, shortcut = $5, department_id = $6,
                category = $7, tags = $8, is_active = $9, updated_at = $10
            WHERE id = $1 AND tenant_id = $2
            RETURNING *
            "#,
        )
        .bind(response.id)
        .bind(&response.tenant_id)
        .bind(&response.title)
        .bind(&response.content)
        .bind(&response.shortcut)
        .bind(response.department_id)
        .bind(&response.category)
        .bind(&response.tags)
        .bind(response.is_active)
        .bind(response.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::unique(e, "canned response shortcut"))
    }

    async fn delete_canned_response(&self, tenant_id: &str, response_id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query("DELETE FROM canned_responses WHERE id = $1 AND tenant_id = $2")
            .bind(response_id)
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_canned_responses(
        &self,
        tenant_id: &str,
        department_id: Option<Uuid>,
    ) -> Result<Vec<CannedResponse>, DbError> {
        let responses = sqlx::query_as::<_, CannedResponse>(
            r#"
            SELECT * FROM canned_responses
            WHERE tenant_id = $1 AND is_active
              AND (department_id IS NULL OR department_id = $2)
            ORDER BY usage_count DESC, title ASC
            "#,
        )
        .bind(tenant_id)
        .bind(department_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(responses)
    }

    async fn increment_canned_usage(&self, tenant_id: &str, response_id: Uuid) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE canned_responses SET usage_count = usage_count + 1
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(response_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
