// src/db/messagedb.rs
use async_trait::async_trait;
use sqlx::types::Json;
use uuid::Uuid;

use super::{db::DBClient, DbError};
use crate::models::{
    messagemodel::TicketMessage,
    ticketmodel::{page_offset, TicketHistory},
};

#[async_trait]
pub trait MessageExt: Send + Sync {
    async fn create_message(&self, message: &TicketMessage) -> Result<TicketMessage, DbError>;

    async fn get_message(
        &self,
        tenant_id: &str,
        message_id: Uuid,
    ) -> Result<Option<TicketMessage>, DbError>;

    async fn update_message(&self, message: &TicketMessage) -> Result<TicketMessage, DbError>;

    /// Oldest first. Private notes are left out unless `include_private`.
    async fn list_messages(
        &self,
        tenant_id: &str,
        ticket_id: Uuid,
        include_private: bool,
        page: i64,
        per_page: i64,
    ) -> Result<(Vec<TicketMessage>, i64), DbError>;
}

/// Append-only audit trail.
#[async_trait]
pub trait HistoryExt: Send + Sync {
    async fn create_history(&self, entry: &TicketHistory) -> Result<(), DbError>;

    async fn list_history(
        &self,
        tenant_id: &str,
        ticket_id: Uuid,
    ) -> Result<Vec<TicketHistory>, DbError>;
}

#[async_trait]
impl MessageExt for DBClient {
    async fn create_message(&self, message: &TicketMessage) -> Result<TicketMessage, DbError> {
        let created = sqlx::query_as::<_, TicketMessage>(
            r#"
            INSERT INTO ticket_messages (
                id, ticket_id, tenant_id, message_type, content, content_html,
                sender_type, sender_id, sender_name, sender_email, attachments,
                is_private, is_edited, edited_at, edited_by, original_content,
                canned_response_id, metadata, is_deleted, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            RETURNING *
            "#,
        )
        .bind(message.id)
        .bind(message.ticket_id)
        .bind(&message.tenant_id)
        .bind(message.message_type)
        .bind(&message.content)
        .bind(&message.content_html)
        .bind(message.sender_type)
        .bind(&message.sender_id)
        .bind(&message.sender_name)
        .bind(&message.sender_email)
        .bind(Json(&message.attachments))
        .bind(message.is_private)
        .bind(message.is_edited)
        .bind(message.edited_at)
        .bind(&message.edited_by)
        .bind(&message.original_content)
        .bind(message.canned_response_id)
        .bind(Json(&message.metadata))
        .bind(message.is_deleted)
        .bind(message.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn get_message(
        &self,
        tenant_id: &str,
        message_id: Uuid,
    ) -> Result<Option<TicketMessage>, DbError> {
        let message = sqlx::query_as::<_, TicketMessage>(
            r#"
            SELECT * FROM ticket_messages
            WHERE id = $1 AND tenant_id = $2 AND NOT is_deleted
            "#,
        )
        .bind(message_id)
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(message)
    }

    async fn update_message(&self, message: &TicketMessage) -> Result<TicketMessage, DbError> {
        let updated = sqlx::query_as::<_, TicketMessage>(
            r#"
            UPDATE ticket_messages SET
                content = $3,
                content_html = $4,
                attachments = $5,
                is_edited = $6,
                edited_at = $7,
                edited_by = $8,
                original_content = $9,
                metadata = $10
            WHERE id = $1 AND tenant_id = $2
            RETURNING *
            "#,
        )
        .bind(message.id)
        .bind(&message.tenant_id)
        .bind(&message.content)
        .bind(&message.content_html)
        .bind(Json(&message.attachments))
        .bind(message.is_edited)
        .bind(message.edited_at)
        .bind(&message.edited_by)
        .bind(&message.original_content)
        .bind(Json(&message.metadata))
        .fetch_one(&self.pool)
        .await?;

        Ok(updated)
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

        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM ticket_messages
            WHERE tenant_id = $1 AND ticket_id = $2 AND NOT is_deleted
              AND ($3 OR NOT is_private)
            "#,
        )
        .bind(tenant_id)
        .bind(ticket_id)
        .bind(include_private)
        .fetch_one(&self.pool)
        .await?;

        let messages = sqlx::query_as::<_, TicketMessage>(
            r#"
            SELECT * FROM ticket_messages
            WHERE tenant_id = $1 AND ticket_id = $2 AND NOT is_deleted
              AND ($3 OR NOT is_private)
            ORDER BY created_at ASC, id
            LIMIT $4 OFFSET $5
            "#,
        )
        .bind(tenant_id)
        .bind(ticket_id)
        .bind(include_private)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((messages, total))
    }
}

#[async_trait]
impl HistoryExt for DBClient {
    async fn create_history(&self, entry: &TicketHistory) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO ticket_history (
                id, ticket_id, tenant_id, action, field, old_value, new_value,
                changed_by, changed_by_name, comment, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(entry.id)
        .bind(entry.ticket_id)
        .bind(&entry.tenant_id)
        .bind(entry.action)
        .bind(&entry.field)
        .bind(&entry.old_value)
        .bind(&entry.new_value)
        .bind(&entry.changed_by)
        .bind(&entry.changed_by_name)
        .bind(&entry.comment)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_history(
        &self,
        tenant_id: &str,
        ticket_id: Uuid,
    ) -> Result<Vec<TicketHistory>, DbError> {
        let entries = sqlx::query_as::<_, TicketHistory>(
            r#"
            SELECT * FROM ticket_history
            WHERE tenant_id = $1 AND ticket_id = $2
            ORDER BY created_at ASC, id
            "#,
        )
        .bind(tenant_id)
        .bind(ticket_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}
