pub mod cli;
pub mod config;
pub mod db;
pub mod models;
pub mod shutdown;
pub mod validate;

pub use db::Database;
