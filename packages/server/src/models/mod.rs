pub mod auth;
pub mod category;
pub mod shared;
