//! Run coordinator
//!
//! Sequences one `owl run`:
//!
//! ```text
//! Idle -> Preparing -> DeviceReady -> Testing -> Restoring -> [Reporting] -> Done
//!            \              \            \
//!             +--------------+------------+--> Failed
//! ```
//!
//! Once the testing phase has started, the bridge is stopped and the device
//! restored on every path out of it. A failing test runner is reported (when
//! report mode is on) and then surfaced as the run's error.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use owl_bridge::{BridgeConfig, BridgeHandle, BridgeServer, ScreenshotStore};
use owl_common::{CommandExecutor, Error, ExecOptions, ExitCode, Result, RunConfiguration};

use crate::driver::{self, PlatformDriver};
use crate::report::{ReportGenerator, TestReport};

/// Environment handed to the test runner
pub const ENV_DEBUG: &str = "OWL_DEBUG";
pub const ENV_IOS_SIMULATOR: &str = "OWL_IOS_SIMULATOR";
pub const ENV_PLATFORM: &str = "OWL_PLATFORM";
pub const ENV_UPDATE_BASELINE: &str = "OWL_UPDATE_BASELINE";
pub const ENV_BRIDGE_URL: &str = "OWL_BRIDGE_URL";

/// Jest config shipped with the installed package
pub const JEST_CONFIG: &str = "node_modules/react-native-owl/dist/jest-config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Preparing,
    DeviceReady,
    Testing,
    Restoring,
    Reporting,
    Done,
    Failed,
}

pub struct RunCoordinator {
    run: RunConfiguration,
    executor: Arc<dyn CommandExecutor>,
    reporter: Arc<dyn ReportGenerator>,
    build: bool,
    state: RunState,
}

impl RunCoordinator {
    pub fn new(
        run: RunConfiguration,
        executor: Arc<dyn CommandExecutor>,
        reporter: Arc<dyn ReportGenerator>,
    ) -> Self {
        Self {
            run,
            executor,
            reporter,
            build: false,
            state: RunState::Idle,
        }
    }

    /// Build the app before installing it
    pub fn with_build(mut self, build: bool) -> Self {
        self.build = build;
        self
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &RunConfiguration {
        &self.run
    }

    fn set_state(&mut self, state: RunState) {
        debug!("[OWL - CLI] Run state {:?} -> {:?}.", self.state, state);
        self.state = state;
    }

    /// Test runner command line
    pub fn test_command(&self) -> String {
        let root = self.run.project_root.display();
        let mut command = match &self.run.test_command {
            Some(custom) => custom.clone(),
            None => format!(
                "jest --config={} --roots={} --runInBand",
                self.run.project_root.join(JEST_CONFIG).display(),
                root
            ),
        };

        if self.run.report {
            command.push_str(&format!(
                " --json --outputFile={}",
                self.run.report_json_path().display()
            ));
        }
        command
    }

    /// Options for the test runner process
    pub fn test_options(&self, bridge_url: &str) -> ExecOptions {
        ExecOptions::inherit()
            .env(ENV_DEBUG, self.run.debug.to_string())
            .env(ENV_IOS_SIMULATOR, self.run.simulator_device.as_str())
            .env(ENV_PLATFORM, self.run.platform.as_str())
            .env(ENV_UPDATE_BASELINE, self.run.update_baseline.to_string())
            .env(ENV_BRIDGE_URL, bridge_url)
    }

    /// Drive the run to a terminal state
    pub async fn run(&mut self) -> Result<()> {
        let result = self.execute().await;
        self.set_state(if result.is_ok() {
            RunState::Done
        } else {
            RunState::Failed
        });
        result
    }

    async fn execute(&mut self) -> Result<()> {
        self.set_state(RunState::Preparing);
        info!(
            "[OWL - CLI] Starting tests on {} platform.",
            self.run.platform
        );

        let driver = driver::for_run(&self.run, self.executor.clone());
        if self.build {
            driver.build().await?;
        }
        let device = driver.launch().await?;
        debug!("[OWL - CLI] Device ready: {:?}.", device);
        self.set_state(RunState::DeviceReady);

        self.set_state(RunState::Testing);
        let (bridge, tested) = match self.prepare_dirs() {
            Err(e) => (None, Err(e)),
            Ok(()) => match self.start_bridge().await {
                Ok(bridge) => {
                    let tested = self.run_tests(&bridge).await;
                    (Some(bridge), tested)
                }
                Err(e) => (
                    None,
                    Err(Error::BridgeConnectionLost(format!(
                        "could not start the bridge: {}",
                        e
                    ))),
                ),
            },
        };

        self.set_state(RunState::Restoring);
        self.cleanup(bridge, driver.as_ref()).await;

        if let Err(Error::TestExecution { .. }) = &tested {
            if self.run.report {
                self.set_state(RunState::Reporting);
                self.report().await;
            }
        }

        if tested.is_ok() {
            info!("[OWL - CLI] Tests passed on {} platform.", self.run.platform);
        }
        tested
    }

    fn prepare_dirs(&self) -> Result<()> {
        if self.run.update_baseline {
            std::fs::create_dir_all(self.run.baseline_dir())?;
        }
        if self.run.report {
            std::fs::create_dir_all(self.run.report_dir())?;
        }
        Ok(())
    }

    async fn start_bridge(&self) -> owl_bridge::BridgeResult<BridgeHandle> {
        let config = BridgeConfig::from_settings(&self.run.bridge)
            .with_store(ScreenshotStore::from_run(&self.run));
        BridgeServer::start(config).await
    }

    async fn run_tests(&self, bridge: &BridgeHandle) -> Result<()> {
        let command = self.test_command();
        let options = self.test_options(&bridge.url());
        info!("[OWL - CLI] Running tests with: {}.", command);

        let mut runner = self.executor.spawn(&command, &options);
        let finished = tokio::select! {
            result = runner.wait() => Some(result),
            _ = tokio::signal::ctrl_c() => None,
        };

        let result = match finished {
            Some(result) => result,
            None => {
                warn!("[OWL - CLI] Interrupted, stopping the test runner.");
                if let Err(e) = runner.kill().await {
                    error!("[OWL - CLI] Could not stop the test runner: {}", e);
                }
                return Err(Error::TestExecution { code: ExitCode(None) });
            }
        };

        result.map(|_| ()).map_err(|e| {
            debug!("[OWL - CLI] Test runner failed: {}", e);
            Error::TestExecution {
                code: ExitCode(e.exit_code()),
            }
        })
    }

    /// Stop the bridge and restore the device. Problems are logged, never
    /// returned, so the test outcome stays the run's outcome.
    async fn cleanup(&self, bridge: Option<BridgeHandle>, driver: &dyn PlatformDriver) {
        if let Some(bridge) = bridge {
            bridge.stop().await;
        }

        if let Err(e) = driver.restore().await {
            warn!("[OWL - CLI] Could not restore the {} device: {}", driver.platform(), e);
        }
    }

    /// The runner's JSON results, if it wrote any
    fn load_results(&self) -> Option<TestReport> {
        let path = self.run.report_json_path();
        if !path.exists() {
            warn!(
                "[OWL - CLI] No test results found at {}.",
                path.display()
            );
            return None;
        }
        match TestReport::load(&path) {
            Ok(report) => Some(report),
            Err(e) => {
                error!("[OWL - CLI] Could not read the test results: {}", e);
                None
            }
        }
    }

    async fn report(&self) {
        info!("[OWL - CLI] Generating the report.");
        let results = self.load_results();
        match self.reporter.generate(&self.run, results.as_ref()).await {
            Ok(path) => info!("[OWL - CLI] Report available at {}.", path.display()),
            Err(e) => error!("[OWL - CLI] Report generation failed: {}", e),
        }
    }
}
