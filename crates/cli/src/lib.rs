//! owl CLI
//!
//! Builds the app, launches it on a simulator or device, and runs the
//! screenshot tests against it through the bridge.

pub mod commands;
pub mod coordinator;
pub mod driver;
pub mod report;

pub use coordinator::{RunCoordinator, RunState};
pub use driver::{BuildCommand, DeviceHandle, PlatformDriver};
pub use report::{HtmlReportGenerator, ReportGenerator, TestReport};
