//! Mission Control library
//!
//! A kanban board whose in-progress tasks are backed by agent sessions on an
//! external gateway, plus the reconciliation loop that notices when those
//! sessions finish.

pub mod board;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod db;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod reconcile;
pub mod types;
