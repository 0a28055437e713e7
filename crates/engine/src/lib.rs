// caseclerk-engine: case workflow orchestration over a pluggable platform client

pub mod actions;
pub mod archive;
pub mod config;
pub mod error;
pub mod guard;
pub mod platform;
pub mod rename;
pub mod session;
pub mod tags;
pub mod telemetry;
pub mod workflow;
