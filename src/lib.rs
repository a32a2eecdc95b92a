pub mod backend;
pub mod cli;
pub mod config;
pub mod console;
pub mod core;
pub mod engine;
pub mod exit;
pub mod fetch;
pub mod insights;
pub mod logs;
pub mod platform;
pub mod remediation;
pub mod tui;
pub mod ui;
