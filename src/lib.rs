pub mod commands;
pub mod config;
pub mod constraint;
pub mod error;
pub mod installer;
pub mod manager;
pub mod package;
pub mod registry;
pub mod runtime;
pub mod solver;
pub mod source;
