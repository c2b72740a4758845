pub mod auth;
pub mod catalog;
pub mod inventory;
pub mod invoice;
pub mod report;
pub mod tenancy;
