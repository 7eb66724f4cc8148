//! iOS / tvOS simulator driver

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use owl_common::{
    CommandExecutor, Error, ExecOptions, Platform, Result, SimulatorConfig,
};

use super::{control, BuildCommand, DeviceHandle, PlatformDriver};

/// Where PlistBuddy lives on macOS
const PLIST_BUDDY_DIR: &str = "/usr/libexec";

/// Status bar clock shown while capturing
const STATUS_BAR_TIME: &str = "9:41";

/// Where the app bundle is and where simctl should run from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppLocation {
    pub cwd: PathBuf,
    /// Bundle name relative to `cwd`
    pub app: String,
    pub plist: PathBuf,
}

pub struct SimulatorDriver {
    platform: Platform,
    config: SimulatorConfig,
    project_root: PathBuf,
    executor: Arc<dyn CommandExecutor>,
}

impl SimulatorDriver {
    pub fn new(
        platform: Platform,
        config: SimulatorConfig,
        project_root: PathBuf,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            platform,
            config,
            project_root,
            executor,
        }
    }

    fn sdk(&self) -> &'static str {
        match self.platform {
            Platform::Tvos => "appletvsimulator",
            _ => "iphonesimulator",
        }
    }

    fn scheme(&self) -> &str {
        self.config.scheme.as_deref().unwrap_or_default()
    }

    /// Simulator name with spaces escaped for the shell
    pub fn device(&self) -> String {
        self.config
            .device
            .as_deref()
            .unwrap_or_default()
            .replace(' ', "\\ ")
    }

    /// An explicit binary path only applies to custom builds
    pub fn app_location(&self) -> AppLocation {
        if let (Some(_), Some(binary)) = (&self.config.build_command, &self.config.binary_path) {
            let binary = if binary.is_absolute() {
                binary.clone()
            } else {
                self.project_root.join(binary)
            };
            let cwd = binary
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| self.project_root.clone());
            let app = binary
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();

            return AppLocation {
                plist: binary.join("Info.plist"),
                cwd,
                app,
            };
        }

        let cwd = self
            .project_root
            .join("ios/build/Build/Products")
            .join(format!("{}-{}", self.config.configuration, self.sdk()));
        let app = format!("{}.app", self.scheme());

        AppLocation {
            plist: cwd.join(&app).join("Info.plist"),
            cwd,
            app,
        }
    }

    /// Read CFBundleIdentifier from the built app
    async fn bundle_id(&self, plist: &Path) -> Result<String> {
        let command = format!(
            "./PlistBuddy -c 'Print CFBundleIdentifier' {}",
            plist.display()
        );
        let stdout = control(
            self.executor.as_ref(),
            &command,
            &ExecOptions::capture().cwd(PLIST_BUDDY_DIR),
        )
        .await?;

        let bundle_id = stdout.trim().to_string();
        if bundle_id.is_empty() {
            return Err(Error::InstallLaunch(format!(
                "no CFBundleIdentifier found in {}",
                plist.display()
            )));
        }
        Ok(bundle_id)
    }
}

#[async_trait]
impl PlatformDriver for SimulatorDriver {
    fn platform(&self) -> Platform {
        self.platform
    }

    fn build_command(&self) -> BuildCommand {
        if let Some(custom) = &self.config.build_command {
            return BuildCommand {
                line: custom.clone(),
                cwd: None,
            };
        }

        let mut args = vec![
            "xcodebuild".to_string(),
            format!("-workspace {}", self.config.workspace.as_deref().unwrap_or_default()),
            format!("-scheme {}", self.scheme()),
            format!("-configuration {}", self.config.configuration),
            format!("-sdk {}", self.sdk()),
            "-derivedDataPath ios/build".to_string(),
        ];
        if self.config.quiet {
            args.push("-quiet".to_string());
        }

        BuildCommand {
            line: args.join(" "),
            cwd: Some(self.project_root.clone()),
        }
    }

    fn executor(&self) -> &dyn CommandExecutor {
        self.executor.as_ref()
    }

    async fn launch(&self) -> Result<DeviceHandle> {
        let location = self.app_location();
        let device = self.device();
        let in_products = ExecOptions::ignore().cwd(&location.cwd);

        let bundle_id = self.bundle_id(&location.plist).await?;
        debug!("[OWL - CLI] Discovered bundle identifier {}.", bundle_id);

        control(
            self.executor.as_ref(),
            &format!(
                "xcrun simctl status_bar {} override --time {}",
                device, STATUS_BAR_TIME
            ),
            &in_products,
        )
        .await?;

        control(
            self.executor.as_ref(),
            &format!("xcrun simctl install {} {}", device, location.app),
            &in_products,
        )
        .await?;

        control(
            self.executor.as_ref(),
            &format!("xcrun simctl launch {} {}", device, bundle_id),
            &ExecOptions::ignore(),
        )
        .await?;

        info!("[OWL - CLI] Launched {} on {}.", bundle_id, device);

        Ok(DeviceHandle {
            device,
            app_path: location.cwd.join(&location.app),
            app_id: bundle_id,
        })
    }

    async fn restore(&self) -> Result<()> {
        let location = self.app_location();
        control(
            self.executor.as_ref(),
            &format!("xcrun simctl status_bar {} clear", self.device()),
            &ExecOptions::ignore().cwd(&location.cwd),
        )
        .await?;
        debug!("[OWL - CLI] Restored the simulator status bar.");
        Ok(())
    }
}
