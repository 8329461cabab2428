//! Multi-peer host: opens one session per configured peer, exercises each
//! one and writes a structured report.

pub mod config;
pub mod host;
pub mod report;

pub use config::{HostConfig, ScriptStep, ServerSpec, StepAction};
pub use host::{Connector, Host, TransportConnector};
pub use report::{ClientReport, Report, TestOutcome, TestStatus};
