pub mod agentmodel;
pub mod departmentmodel;
pub mod messagemodel;
pub mod ticketmodel;
pub mod usermodel;
