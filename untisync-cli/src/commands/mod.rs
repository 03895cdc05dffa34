pub mod auth;
pub mod cache;
pub mod show;
pub mod sync;
