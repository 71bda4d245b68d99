pub mod classifier;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod gc;
pub mod investigator;
pub mod model;
pub mod opts;
pub mod reconciler;
pub mod telemetry;
pub mod time_source;
pub mod timeout;
pub mod verifier;
