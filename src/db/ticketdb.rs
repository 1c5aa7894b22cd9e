// src/db/ticketdb.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgArguments, query::QueryAs, types::Json, Postgres, QueryBuilder};
use uuid::Uuid;

use super::{db::DBClient, DbError};
use crate::models::ticketmodel::*;

#[async_trait]
pub trait TicketExt: Send + Sync {
    /// Atomically allocates the tenant's next number, formatted `TKT-000042`.
    async fn next_ticket_number(&self, tenant_id: &str) -> Result<String, DbError>;

    async fn create_ticket(&self, ticket: &Ticket) -> Result<Ticket, DbError>;

    async fn get_ticket(&self, tenant_id: &str, ticket_id: Uuid) -> Result<Option<Ticket>, DbError>;

    async fn get_ticket_by_number(
        &self,
        tenant_id: &str,
        ticket_number: &str,
    ) -> Result<Option<Ticket>, DbError>;

    /// Writes the whole entity. Fails with `DbError::Conflict` when
    /// `ticket.version` no longer matches the stored row.
    async fn update_ticket(&self, ticket: &Ticket) -> Result<Ticket, DbError>;

    async fn update_ticket_fields(
        &self,
        tenant_id: &str,
        ticket_id: Uuid,
        fields: &TicketFieldsUpdate,
    ) -> Result<Option<Ticket>, DbError>;

    async fn increment_message_count(
        &self,
        tenant_id: &str,
        ticket_id: Uuid,
        is_private: bool,
    ) -> Result<(), DbError>;

    async fn soft_delete_ticket(
        &self,
        tenant_id: &str,
        ticket_id: Uuid,
        deleted_by: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool, DbError>;

    async fn list_tickets(&self, filter: &TicketFilter) -> Result<(Vec<Ticket>, i64), DbError>;

    async fn get_tickets_due_soon(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Ticket>, DbError>;

    async fn get_ticket_stats(&self, tenant_id: &str) -> Result<TicketStats, DbError>;

    /// Flags every open ticket whose due dates have passed. Returns how many changed.
    async fn mark_sla_breaches(&self, now: DateTime<Utc>) -> Result<u64, DbError>;
}

pub fn format_ticket_number(sequence: i64) -> String {
    format!("TKT-{:06}", sequence)
}

type TicketQuery<'q> = QueryAs<'q, Postgres, Ticket, PgArguments>;

fn bind_mutable_columns<'q>(query: TicketQuery<'q>, t: &'q Ticket) -> TicketQuery<'q> {
    query
        .bind(&t.subject)
        .bind(&t.description)
        .bind(t.ticket_type)
        .bind(t.status)
        .bind(t.priority)
        .bind(t.source)
        .bind(&t.customer_id)
        .bind(&t.customer_name)
        .bind(&t.customer_email)
        .bind(&t.customer_phone)
        .bind(t.department_id)
        .bind(&t.department_name)
        .bind(t.category_id)
        .bind(&t.category_name)
        .bind(&t.assigned_to_id)
        .bind(&t.assigned_to_name)
        .bind(&t.assigned_to_email)
        .bind(t.assigned_at)
        .bind(&t.assigned_by_id)
        .bind(t.sla_policy_id)
        .bind(t.first_response_due)
        .bind(t.resolution_due)
        .bind(t.first_responded_at)
        .bind(t.sla_breached)
        .bind(t.response_sla_breached)
        .bind(t.resolve_sla_breached)
        .bind(t.parent_ticket_id)
        .bind(&t.related_ticket_ids)
        .bind(t.merged_into_id)
        .bind(Json(&t.attachments))
        .bind(&t.tags)
        .bind(Json(&t.custom_fields))
        .bind(t.message_count)
        .bind(t.internal_notes)
        .bind(t.reopen_count)
        .bind(t.escalation_level)
        .bind(t.satisfaction_rating)
        .bind(&t.satisfaction_comment)
        .bind(t.rated_at)
        .bind(&t.watcher_ids)
        .bind(Json(&t.metadata))
        .bind(t.is_deleted)
        .bind(&t.deleted_by)
        .bind(t.deleted_at)
        .bind(t.updated_at)
        .bind(t.resolved_at)
        .bind(t.closed_at)
        .bind(t.last_activity_at)
        .bind(t.last_customer_reply_at)
        .bind(t.last_agent_reply_at)
}

fn push_ticket_filters<'a>(qb: &mut QueryBuilder<'a, Postgres>, filter: &'a TicketFilter) {
    qb.push(" WHERE NOT is_deleted AND tenant_id = ");
    qb.push_bind(&filter.tenant_id);

    if !filter.statuses.is_empty() {
        qb.push(" AND status IN (");
        let mut separated = qb.separated(", ");
        for status in &filter.statuses {
            separated.push_bind(*status);
        }
        separated.push_unseparated(")");
    }

    if !filter.priorities.is_empty() {
        qb.push(" AND priority IN (");
        let mut separated = qb.separated(", ");
        for priority in &filter.priorities {
            separated.push_bind(*priority);
        }
        separated.push_unseparated(")");
    }

    if let Some(department_id) = filter.department_id {
        qb.push(" AND department_id = ").push_bind(department_id);
    }
    if let Some(category_id) = filter.category_id {
        qb.push(" AND category_id = ").push_bind(category_id);
    }
    if let Some(ref assignee) = filter.assigned_to_id {
        qb.push(" AND assigned_to_id = ").push_bind(assignee);
    }
    if let Some(ref customer) = filter.customer_id {
        qb.push(" AND customer_id = ").push_bind(customer);
    }
    if filter.unassigned_only {
        qb.push(" AND assigned_to_id IS NULL");
    }
    if let Some(breached) = filter.sla_breached {
        qb.push(" AND sla_breached = ").push_bind(breached);
    }
    if !filter.tags.is_empty() {
        qb.push(" AND tags @> ").push_bind(&filter.tags);
    }
    if let Some(ref search) = filter.search {
        let pattern = format!("%{}%", search);
        qb.push(" AND (subject ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR ticket_number ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(from) = filter.created_from {
        qb.push(" AND created_at >= ").push_bind(from);
    }
    if let Some(to) = filter.created_to {
        qb.push(" AND created_at <= ").push_bind(to);
    }
}

#[async_trait]
impl TicketExt for DBClient {
    async fn next_ticket_number(&self, tenant_id: &str) -> Result<String, DbError> {
        let sequence = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO ticket_counters (tenant_id, sequence)
            VALUES ($1, 1)
            ON CONFLICT (tenant_id)
            DO UPDATE SET sequence = ticket_counters.sequence + 1
            RETURNING sequence
            "#,
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(format_ticket_number(sequence))
    }

    async fn create_ticket(&self, ticket: &Ticket) -> Result<Ticket, DbError> {
        let query = sqlx::query_as::<_, Ticket>(
            r#"
            INSERT INTO tickets (
                id, tenant_id, ticket_number,
                subject, description, ticket_type, status, priority, source,
                customer_id, customer_name, customer_email, customer_phone,
                department_id, department_name, category_id, category_name,
                assigned_to_id, assigned_to_name, assigned_to_email, assigned_at, assigned_by_id,
                sla_policy_id, first_response_due, resolution_due, first_responded_at,
                sla_breached, response_sla_breached, resolve_sla_breached,
                parent_ticket_id, related_ticket_ids, merged_into_id,
                attachments, tags, custom_fields,
                message_count, internal_notes, reopen_count, escalation_level,
                satisfaction_rating, satisfaction_comment, rated_at,
                watcher_ids, metadata, is_deleted, deleted_by, deleted_at,
                updated_at, resolved_at, closed_at,
                last_activity_at, last_customer_reply_at, last_agent_reply_at,
                version, created_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                $17, $18, $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30,
                $31, $32, $33, $34, $35, $36, $37, $38, $39, $40, $41, $42, $43, $44,
                $45, $46, $47, $48, $49, $50, $51, $52, $53, $54, $55
            )
            RETURNING *
            "#,
        )
        .bind(ticket.id)
        .bind(&ticket.tenant_id)
        .bind(&ticket.ticket_number);

        let created = bind_mutable_columns(query, ticket)
            .bind(ticket.version)
            .bind(ticket.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| DbError::unique(e, "ticket number"))?;

        Ok(created)
    }

    async fn get_ticket(&self, tenant_id: &str, ticket_id: Uuid) -> Result<Option<Ticket>, DbError> {
        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT * FROM tickets
            WHERE id = $1 AND tenant_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(ticket_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ticket)
    }

    async fn get_ticket_by_number(
        &self,
        tenant_id: &str,
        ticket_number: &str,
    ) -> Result<Option<Ticket>, DbError> {
        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT * FROM tickets
            WHERE ticket_number = $1 AND tenant_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(ticket_number)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ticket)
    }

    async fn update_ticket(&self, ticket: &Ticket) -> Result<Ticket, DbError> {
        let query = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets SET
                subject = $4, description = $5, ticket_type = $6, status = $7,
                priority = $8, source = $9, customer_id = $10, customer_name = $11,
                customer_email = $12, customer_phone = $13, department_id = $14,
                department_name = $15, category_id = $16, category_name = $17,
                assigned_to_id = $18, assigned_to_name = $19, assigned_to_email = $20,
                assigned_at = $21, assigned_by_id = $22, sla_policy_id = $23,
                first_response_due = $24, resolution_due = $25,
                first_responded_at = $26, sla_breached = $27,
                response_sla_breached = $28, resolve_sla_breached = $29,
                parent_ticket_id = $30, related_ticket_ids = $31, merged_into_id = $32,
                attachments = $33, tags = $34, custom_fields = $35,
                message_count = $36, internal_notes = $37, reopen_count = $38,
                escalation_level = $39, satisfaction_rating = $40,
                satisfaction_comment = $41, rated_at = $42, watcher_ids = $43,
                metadata = $44, is_deleted = $45, deleted_by = $46, deleted_at = $47,
                updated_at = $48, resolved_at = $49, closed_at = $50,
                last_activity_at = $51, last_customer_reply_at = $52,
                last_agent_reply_at = $53,
                version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND version = $3
            RETURNING *
            "#,
        )
        .bind(ticket.id)
        .bind(&ticket.tenant_id)
        .bind(ticket.version);

        bind_mutable_columns(query, ticket)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DbError::Conflict(format!("ticket {}", ticket.ticket_number)))
    }

    async fn update_ticket_fields(
        &self,
        tenant_id: &str,
        ticket_id: Uuid,
        fields: &TicketFieldsUpdate,
    ) -> Result<Option<Ticket>, DbError> {
        let ticket = sqlx::query_as::<_, Ticket>(
            r#"
            UPDATE tickets SET
                status = COALESCE($3, status),
                last_activity_at = COALESCE($4, last_activity_at),
                last_customer_reply_at = COALESCE($5, last_customer_reply_at),
                last_agent_reply_at = COALESCE($6, last_agent_reply_at),
                first_responded_at = COALESCE($7, first_responded_at),
                updated_at = NOW(),
                version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND NOT is_deleted
            RETURNING *
            "#,
        )
        .bind(ticket_id)
        .bind(tenant_id)
        .bind(fields.status)
        .bind(fields.last_activity_at)
        .bind(fields.last_customer_reply_at)
        .bind(fields.last_agent_reply_at)
        .bind(fields.first_responded_at)
        .fetch_optional(&self.pool)
        .await?;

        Ok(ticket)
    }

    async fn increment_message_count(
        &self,
        tenant_id: &str,
        ticket_id: Uuid,
        is_private: bool,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            UPDATE tickets SET
                message_count = message_count + 1,
                internal_notes = internal_notes + CASE WHEN $3 THEN 1 ELSE 0 END,
                version = version + 1
            WHERE id = $1 AND tenant_id = $2
            "#,
        )
        .bind(ticket_id)
        .bind(tenant_id)
        .bind(is_private)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn soft_delete_ticket(
        &self,
        tenant_id: &str,
        ticket_id: Uuid,
        deleted_by: &str,
        deleted_at: DateTime<Utc>,
    ) -> Result<bool, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE tickets SET
                is_deleted = TRUE,
                deleted_by = $3,
                deleted_at = $4,
                updated_at = $4,
                version = version + 1
            WHERE id = $1 AND tenant_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(ticket_id)
        .bind(tenant_id)
        .bind(deleted_by)
        .bind(deleted_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_tickets(&self, filter: &TicketFilter) -> Result<(Vec<Ticket>, i64), DbError> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM tickets");
        push_ticket_filters(&mut count_query, filter);
        let total = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await?;

        let mut query = QueryBuilder::<Postgres>::new("SELECT * FROM tickets");
        push_ticket_filters(&mut query, filter);
        query
            .push(" ORDER BY ")
            .push(filter.sort_by.column())
            .push(if filter.sort_desc { " DESC" } else { " ASC" })
            .push(", id LIMIT ")
            .push_bind(filter.limit())
            .push(" OFFSET ")
            .push_bind(filter.offset());

        let tickets = query
            .build_query_as::<Ticket>()
            .fetch_all(&self.pool)
            .await?;

        Ok((tickets, total))
    }

    async fn get_tickets_due_soon(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
        until: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Ticket>, DbError> {
        let tickets = sqlx::query_as::<_, Ticket>(
            r#"
            SELECT * FROM tickets
            WHERE tenant_id = $1
              AND NOT is_deleted
              AND NOT sla_breached
              AND status NOT IN ('resolved', 'closed', 'cancelled')
              AND (
                (first_responded_at IS NULL AND first_response_due > $2 AND first_response_due <= $3)
                OR (resolution_due > $2 AND resolution_due <= $3)
              )
            ORDER BY resolution_due ASC NULLS LAST
            LIMIT $4
            "#,
        )
        .bind(tenant_id)
        .bind(now)
        .bind(until)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(tickets)
    }

    async fn get_ticket_stats(&self, tenant_id: &str) -> Result<TicketStats, DbError> {
        let stats = sqlx::query_as::<_, TicketStats>(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'open') AS open,
                COUNT(*) FILTER (WHERE status = 'in_progress') AS in_progress,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'resolved') AS resolved,
                COUNT(*) FILTER (WHERE status = 'closed') AS closed,
                COUNT(*) FILTER (
                    WHERE assigned_to_id IS NULL
                      AND status NOT IN ('resolved', 'closed', 'cancelled')
                ) AS unassigned,
                COUNT(*) FILTER (WHERE sla_breached) AS sla_breached,
                AVG(satisfaction_rating)::FLOAT8 AS avg_rating
            FROM tickets
            WHERE tenant_id = $1 AND NOT is_deleted
            "#,
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }

    async fn mark_sla_breaches(&self, now: DateTime<Utc>) -> Result<u64, DbError> {
        let result = sqlx::query(
            r#"
            UPDATE tickets SET
                response_sla_breached = response_sla_breached
                    OR (first_responded_at IS NULL AND first_response_due < $1),
                resolve_sla_breached = resolve_sla_breached OR resolution_due < $1,
                sla_breached = TRUE,
                version = version + 1
            WHERE NOT is_deleted
              AND status NOT IN ('resolved', 'closed', 'cancelled')
              AND (
                (NOT response_sla_breached AND first_responded_at IS NULL AND first_response_due < $1)
                OR (NOT resolve_sla_breached AND resolution_due < $1)
              )
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticket_numbers_are_zero_padded() {
        assert_eq!(format_ticket_number(42), "TKT-000042");
        assert_eq!(format_ticket_number(1_234_567), "TKT-1234567");
    }
}
