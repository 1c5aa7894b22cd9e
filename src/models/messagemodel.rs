// src/models/messagemodel.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Type;
use uuid::Uuid;

use super::ticketmodel::{Attachment, FieldMap};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq, Default)]
#[sqlx(type_name = "message_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    #[default]
    Reply,
    InternalNote,
    System,
    AutoReply,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Type, PartialEq, Eq)]
#[sqlx(type_name = "sender_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    Customer,
    Agent,
    System,
    Bot,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TicketMessage {
    pub id: Uuid,
    pub ticket_id: Uuid,
    pub tenant_id: String,

    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: String,
    pub content_html: Option<String>,

    pub sender_type: SenderType,
    pub sender_id: String,
    pub sender_name: String,
    pub sender_email: Option<String>,

    #[sqlx(json)]
    pub attachments: Vec<Attachment>,

    pub is_private: bool,

    pub is_edited: bool,
    pub edited_at: Option<DateTime<Utc>>,
    pub edited_by: Option<String>,
    #[serde(skip_serializing)]
    pub original_content: Option<String>,

    pub canned_response_id: Option<Uuid>,
    #[sqlx(json)]
    pub metadata: FieldMap,

    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
}
