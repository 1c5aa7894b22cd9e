pub mod admin_service;
pub mod assignment_service;
pub mod background_jobs;
pub mod bulk_service;
pub mod department_service;
pub mod error;
pub mod history_service;
pub mod outcome;
pub mod sla_service;
pub mod ticket_service;

#[cfg(test)]
pub mod test_support;
