//! Local configuration storage

pub mod app_config;
pub mod layout;
pub mod settings;
