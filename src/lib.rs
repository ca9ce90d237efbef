// ABOUTME: Library module for opgrants-migrator
// ABOUTME: Exports all core functionality for use in binary and tests

pub mod blob;
pub mod commands;
pub mod config;
pub mod document;
pub mod error;
pub mod extract;
pub mod interactive;
pub mod migrate;
pub mod mongodb;
pub mod sqlite;
pub mod transform;
pub mod utils;
