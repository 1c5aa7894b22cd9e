pub mod admindtos;
pub mod ticketdtos;
