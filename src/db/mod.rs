pub mod agentdb;
pub mod cache;
pub mod db;
pub mod departmentdb;
pub mod memory;
pub mod messagedb;
pub mod sladb;
pub mod ticketdb;

use thiserror::Error;

use self::{
    agentdb::AgentExt,
    departmentdb::{CategoryExt, DepartmentExt},
    messagedb::{HistoryExt, MessageExt},
    sladb::{CannedResponseExt, SlaPolicyExt},
    ticketdb::TicketExt,
};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("{0} was modified concurrently")]
    Conflict(String),

    #[error("{0} already exists")]
    Duplicate(String),
}

impl DbError {
    /// Maps a Postgres unique violation to `Duplicate`, anything else passes through.
    pub fn unique(err: sqlx::Error, what: &str) -> Self {
        if let sqlx::Error::Database(ref db_err) = err {
            if db_err.is_unique_violation() {
                return DbError::Duplicate(what.to_string());
            }
        }
        DbError::Sqlx(err)
    }
}

/// Everything the ticketing services need from persistence.
pub trait Store:
    TicketExt
    + MessageExt
    + HistoryExt
    + DepartmentExt
    + CategoryExt
    + AgentExt
    + SlaPolicyExt
    + CannedResponseExt
    + Send
    + Sync
{
}

impl<T> Store for T where
    T: TicketExt
        + MessageExt
        + HistoryExt
        + DepartmentExt
        + CategoryExt
        + AgentExt
        + SlaPolicyExt
        + CannedResponseExt
        + Send
        + Sync
{
}
