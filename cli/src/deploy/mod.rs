//! Deploy run: gate, archive, remote build and record lifecycle

pub mod analyze;
pub mod archive;
pub mod build;
pub mod demux;
pub mod fsm;
pub mod gate;
pub mod git;
pub mod lifecycle;
pub mod orchestrator;
