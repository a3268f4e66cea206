pub mod audit;
pub mod cache;
pub mod check;
pub mod config;
pub mod health;
pub mod roles;
pub mod snapshot;
pub mod sync;
