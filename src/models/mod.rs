pub mod assessment;
pub mod department;
pub mod principal;
pub mod skill;
pub mod user;
