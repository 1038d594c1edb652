mod auth;
mod common;
mod image;
