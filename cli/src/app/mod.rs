//! Command implementations

pub mod options;
pub mod prompt;
pub mod report;
pub mod run;
