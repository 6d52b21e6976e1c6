//! deployctl library
//!
//! Deploy orchestration, live progress presentation and the cluster API
//! transports behind the `deployctl` command.

pub mod app;
pub mod deploy;
pub mod errors;
pub mod filesys;
pub mod http;
pub mod logs;
pub mod progress;
pub mod storage;
pub mod utils;
