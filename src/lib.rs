pub mod audit;
pub mod closings;
pub mod commands;
pub mod config;
pub mod dashboards;
pub mod db;
pub mod domain;
pub mod error;
pub mod export;
pub mod files;
pub mod models;
pub mod remote;
pub mod reports;
pub mod repo;
pub mod server;
pub mod session;
pub mod tasks;

pub use commands::AppState;
