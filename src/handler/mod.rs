pub mod admin;
pub mod departments;
pub mod tickets;
