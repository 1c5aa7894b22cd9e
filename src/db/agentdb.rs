// src/db/agentdb.rs
use async_trait::async_trait;
use uuid::Uuid;

use super::{db::DBClient, DbError};
use crate::models::agentmodel::{Agent, AgentStatus};

#[async_trait]
pub trait AgentExt: Send + Sync {
    async fn create_agent(&self, agent: &Agent) -> Result<Agent, DbError>;

    async fn get_agent(&self, tenant_id: &str, agent_id: Uuid) -> Result<Option<Agent>, DbError>;

    async fn get_agent_by_user_id(&self, tenant_id: &str, user_id: &str) -> Result<Option<Agent>, DbError>;

    async fn update_agent(&self, agent: &Agent) -> Result<Agent, DbError>;

    async fn soft_delete_agent(&self, tenant_id: &str, agent_id: Uuid) -> Result<bool, DbError>;

    async fn list_agents(&self, tenant_id: &str, department_id: Option<Uuid>) -> Result<Vec<Agent>, DbError>;

    /// Active, available agents below capacity, least busy first.
    async fn list_available_agents(
        &self,
        tenant_id: &str,
        department_id: Option<Uuid>,
    ) -> Result<Vec<Agent>, DbError>;

    async fn update_agent_status(
        &self,
        tenant_id: &str,
        user_id: &str,
        status: AgentStatus,
    ) -> Result<Option<Agent>, DbError>;

    /// Takes one unit of capacity only while `current_tickets < max_tickets`.
    /// Returns whether the reservation was made.
    async fn try_increment_agent_tickets(&self, tenant_id: &str, user_id: &str) -> Result<bool, DbError>;

    async fn increment_agent_tickets(&self, tenant_id: &str, user_id: &str) -> Result<(), DbError>;

    /// Never drops below zero.
    async fn decrement_agent_tickets(&self, tenant_id: &str, user_id: &str) -> Result<(), DbError>;

    async fn increment_agent_resolved(&self, tenant_id: &str, user_id: &str) -> Result<(), DbError>;

    async fn update_agent_rating(&self, tenant_id: &str, user_id: &str, avg_rating: f64) -> Result<(), DbError>;
}

#[async_trait]
impl AgentExt for DBClient {
    async fn create_agent(&self, agent: &Agent) -> Result<Agent, DbError> {
        sqlx::query_as::<_, Agent>(
            r#"
            INSERT INTO agents (
                id, tenant_id, user_id, name, email, role, department_ids, team_id,
                status, last_active_at, max_tickets, current_tickets, tickets_today,
                tickets_this_week, tickets_this_month, skills, languages, avg_rating,
                total_resolved, is_active, is_deleted, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20, $21, $22, $23
            )
            RETURNING *
            "#,
        )
        .bind(agent.id)
        .bind(&agent.tenant_id)
        .bind(&agent.user_id)
        .bind(&agent.name)
        .bind(&agent.email)
        .bind(agent.role)
        .bind(&agent.department_ids)
        .bind(agent.team_id)
        .bind(agent.status)
        .bind(agent.last_active_at)
        .bind(agent.max_tickets)
        .bind(agent.current_tickets)
        .bind(agent.tickets_today)
        .bind(agent.tickets_this_week)
        .bind(agent.tickets_this_month)
        .bind(&agent.skills)
        .bind(&agent.languages)
        .bind(agent.avg_rating)
        .bind(agent.total_resolved)
        .bind(agent.is_active)
        .bind(agent.is_deleted)
        .bind(agent.created_at)
        .bind(agent.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| DbError::unique(e, "agent"))
    }

    async fn get_agent(&self, tenant_id: &str, agent_id: Uuid) -> Result<Option<Agent>, DbError> {
        let agent = sqlx::query_as::<_, Agent>(
            r#"
            SELECT * FROM agents
            WHERE id = $1 AND tenant_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(agent_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(agent)
    }

    async fn get_agent_by_user_id(&self, tenant_id: &str, user_id: &str) -> Result<Option<Agent>, DbError> {
        let agent = sqlx::query_as::<_, Agent>(
            r#"
            SELECT * FROM agents
            WHERE user_id = $1 AND tenant_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(agent)
    }

    async fn update_agent(&self, agent: &Agent) -> Result<Agent, DbError> {
        // Workload counters are owned by the increment/decrement calls.
        let updated = sqlx::query_as::<_, Agent>(
            r#"
            UPDATE agents SET
                name = $3, email = $4, role = $5, department_ids = $6, team_id = $7,
                status = $8, max_tickets = $9, skills = $10, languages = $11,
                is_active = $12, updated_at = $13
            WHERE id = $1 AND tenant_id = $2 AND NOT is_deleted
            RETURNING *
            "#,
        )
        .bind(agent.id)
        .bind(&agent.tenant_id)
        .bind(&agent.name)
        .bind(&agent.email)
        .bind(agent.role)
        .bind(&agent.department_ids)
        .bind(agent.team_id)
        .bind(agent.status)
        .bind(agent.max_tickets)
        .bind(&agent.skills)
        .bind(&agent.languages)
        .bind(agent.is_active)
        .bind(agent.updated_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
    }

    async fn soft_delete_agent(&self, tenant_id: &str, agent_id: Uuid) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE agents SET is_deleted = TRUE, is_active = FALSE, updated_at = NOW()
            WHERE id = $1 AND tenant_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(agent_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_agents(&self, tenant_id: &str, department_id: Option<Uuid>) -> Result<Vec<Agent>, DbError> {
        let agents = sqlx::query_as::<_, Agent>(
            r#"
            SELECT * FROM agents
            WHERE tenant_id = $1 AND NOT is_deleted
              AND ($2::UUID IS NULL OR $2 = ANY(department_ids))
            ORDER BY name ASC
            "#,
        )
        .bind(tenant_id)
        .bind(department_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(agents)
    }

    async fn list_available_agents(
        &self,
        tenant_id: &str,
        department_id: Option<Uuid>,
    ) -> Result<Vec<Agent>, DbError> {
        let agents = sqlx::query_as::<_, Agent>(
            r#"
            SELECT * FROM agents
            WHERE tenant_id = $1 AND NOT is_deleted AND is_active
              AND status = 'available'
              AND current_tickets < max_tickets
              AND ($2::UUID IS NULL OR $2 = ANY(department_ids))
            ORDER BY current_tickets ASC, created_at ASC
            "#,
        )
        .bind(tenant_id)
        .bind(department_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(agents)
    }

    async fn update_agent_status(
        &self,
        tenant_id: &str,
        user_id: &str,
        status: AgentStatus,
    ) -> Result<Option<Agent>, DbError> {
        let agent = sqlx::query_as::<_, Agent>(
            r#"
            UPDATE agents SET status = $3, last_active_at = NOW(), updated_at = NOW()
            WHERE user_id = $1 AND tenant_id = $2 AND NOT is_deleted
            RETURNING *
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .bind(status)
        .fetch_optional(&self.pool)
        .await?;

        Ok(agent)
    }

    async fn try_increment_agent_tickets(&self, tenant_id: &str, user_id: &str) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE agents SET
                current_tickets = current_tickets + 1,
                tickets_today = tickets_today + 1,
                tickets_this_week = tickets_this_week + 1,
                tickets_this_month = tickets_this_month + 1
            WHERE user_id = $1 AND tenant_id = $2 AND NOT is_deleted
              AND current_tickets < max_tickets
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn increment_agent_tickets(&self, tenant_id: &str, user_id: &str) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE agents SET current_tickets = current_tickets + 1
            WHERE user_id = $1 AND tenant_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn decrement_agent_tickets(&self, tenant_id: &str, user_id: &str) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE agents SET current_tickets = GREATEST(current_tickets - 1, 0)
            WHERE user_id = $1 AND tenant_id = $2
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn increment_agent_resolved(&self, tenant_id: &str, user_id: &str) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE agents SET total_resolved = total_resolved + 1
            WHERE user_id = $1 AND tenant_id = $2
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update_agent_rating(&self, tenant_id: &str, user_id: &str, avg_rating: f64) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE agents SET avg_rating = $3, updated_at = NOW()
            WHERE user_id = $1 AND tenant_id = $2
            "#,
        )
        .bind(user_id)
        .bind(tenant_id)
        .bind(avg_rating)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
