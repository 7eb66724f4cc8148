//! owl Common Library
//!
//! Configuration, error types, and process execution shared by the bridge
//! and the CLI.

pub mod config;
pub mod error;
pub mod exec;
pub mod logging;

pub use config::{
    AndroidConfig, BridgeSettings, BuildType, OwlConfig, Platform, RunConfiguration,
    SimulatorConfig, TargetConfig, DEFAULT_BRIDGE_PORT,
};
pub use error::{Error, ExitCode, Result};
pub use exec::{CommandExecutor, ExecOptions, ExecOutput, ProcessHandle, StdioMode, SystemExecutor};

/// owl version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable pointing the app bundler at the instrumentation entry script
pub const ENTRY_FILE_ENV: &str = "ENTRY_FILE";

/// Entry script that loads the in-app instrumentation client
pub const ENTRY_FILE: &str = "./node_modules/react-native-owl/dist/client/index.app.js";
