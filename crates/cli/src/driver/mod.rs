//! Platform drivers
//!
//! A driver knows how to build, install and launch the app for one platform
//! family, and how to put the device back the way it found it.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use owl_common::{
    CommandExecutor, Error, ExecOptions, Platform, Result, RunConfiguration, TargetConfig,
    ENTRY_FILE, ENTRY_FILE_ENV,
};

mod device;
mod simulator;

pub use device::DeviceDriver;
pub use simulator::SimulatorDriver;

/// A fully synthesized build invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    /// Shell command line
    pub line: String,
    /// `None` runs in the invoking process's working directory
    pub cwd: Option<PathBuf>,
}

impl BuildCommand {
    pub fn options(&self) -> ExecOptions {
        let options = ExecOptions::inherit().env(ENTRY_FILE_ENV, ENTRY_FILE);
        match &self.cwd {
            Some(cwd) => options.cwd(cwd),
            None => options,
        }
    }
}

/// What the launch step left running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    /// Simulator name or device serial; empty for "the attached device"
    pub device: String,
    /// Installed binary
    pub app_path: PathBuf,
    /// Bundle identifier (discovered) or package name (configured)
    pub app_id: String,
}

#[async_trait]
pub trait PlatformDriver: Send + Sync {
    fn platform(&self) -> Platform;

    fn build_command(&self) -> BuildCommand;

    fn executor(&self) -> &dyn CommandExecutor;

    /// Run the build. A failing toolchain aborts the run.
    async fn build(&self) -> Result<()> {
        let build = self.build_command();
        info!("[OWL - CLI] Building the app with: {}.", build.line);

        self.executor()
            .run(&build.line, &build.options())
            .await
            .map_err(|e| match e {
                Error::CommandFailed { code, .. } => Error::BuildFailure {
                    command: build.line.clone(),
                    code,
                },
                other => other,
            })?;
        Ok(())
    }

    /// Install and start the app
    async fn launch(&self) -> Result<DeviceHandle>;

    /// Undo device changes made by `launch`
    async fn restore(&self) -> Result<()> {
        Ok(())
    }
}

/// Pick the driver for the run's platform
pub fn for_run(
    run: &RunConfiguration,
    executor: Arc<dyn CommandExecutor>,
) -> Box<dyn PlatformDriver> {
    match &run.target {
        TargetConfig::Simulator(config) => Box::new(SimulatorDriver::new(
            run.platform,
            config.clone(),
            run.project_root.clone(),
            executor,
        )),
        TargetConfig::Device(config) => Box::new(DeviceDriver::new(
            config.clone(),
            run.project_root.clone(),
            executor,
        )),
    }
}

/// Run a device control command, reporting failures as install/launch errors
pub(crate) async fn control(
    executor: &dyn CommandExecutor,
    command: &str,
    options: &ExecOptions,
) -> Result<String> {
    executor
        .run(command, options)
        .await
        .map(|output| output.stdout)
        .map_err(|e| Error::InstallLaunch(format!("`{}` failed: {}", command, e)))
}
