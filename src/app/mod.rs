pub mod adb;
pub mod catalog;
pub mod cleanup;
pub mod commands;
pub mod config;
pub mod console;
pub mod device;
pub mod error;
pub mod logging;
pub mod models;
pub mod packages;
pub mod scheduler;
pub mod state;
pub mod terminal;
