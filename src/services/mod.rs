pub mod access;
pub mod analytics;
pub mod assessment;
pub mod history;
