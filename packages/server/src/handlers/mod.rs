pub mod auth;
pub mod category;
