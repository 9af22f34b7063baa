pub mod analytics;
pub mod auth;
pub mod campaigns;
pub mod compliance;
pub mod inboxes;
pub mod leads;
