//! Android device driver

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use owl_common::{AndroidConfig, CommandExecutor, ExecOptions, Platform, Result};

use super::{control, BuildCommand, DeviceHandle, PlatformDriver};

/// Gradle property that switches the app to the owl manifest, which allows
/// cleartext WebSocket traffic to the bridge
const OWL_BUILD_PROPERTY: &str = "-PisOwlBuild=true";

pub struct DeviceDriver {
    config: AndroidConfig,
    project_root: PathBuf,
    executor: Arc<dyn CommandExecutor>,
}

impl DeviceDriver {
    pub fn new(
        config: AndroidConfig,
        project_root: PathBuf,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            config,
            project_root,
            executor,
        }
    }

    fn package_name(&self) -> &str {
        self.config.package_name.as_deref().unwrap_or_default()
    }

    /// APK to install
    pub fn apk_path(&self) -> PathBuf {
        if let Some(path) = &self.config.binary_path {
            return path.clone();
        }

        let build = self.config.build_type.output_name();
        self.project_root
            .join("android/app/build/outputs/apk")
            .join(build)
            .join(format!("app-{}.apk", build))
    }
}

#[async_trait]
impl PlatformDriver for DeviceDriver {
    fn platform(&self) -> Platform {
        Platform::Android
    }

    fn build_command(&self) -> BuildCommand {
        if let Some(custom) = &self.config.build_command {
            return BuildCommand {
                line: custom.clone(),
                cwd: None,
            };
        }

        let mut args = vec![
            "./gradlew",
            self.config.build_type.gradle_task(),
            "--console plain",
        ];
        if self.config.quiet {
            args.push("--quiet");
        }
        args.push(OWL_BUILD_PROPERTY);

        BuildCommand {
            line: args.join(" "),
            cwd: Some(self.project_root.join("android")),
        }
    }

    fn executor(&self) -> &dyn CommandExecutor {
        self.executor.as_ref()
    }

    async fn launch(&self) -> Result<DeviceHandle> {
        let apk = self.apk_path();
        let package = self.package_name();

        control(
            self.executor.as_ref(),
            &format!("adb install -r {}", apk.display()),
            &ExecOptions::ignore(),
        )
        .await?;

        control(
            self.executor.as_ref(),
            &format!(
                "adb shell monkey -p \"{}\" -c android.intent.category.LAUNCHER 1",
                package
            ),
            &ExecOptions::ignore(),
        )
        .await?;

        info!("[OWL - CLI] Launched {} on the attached device.", package);

        Ok(DeviceHandle {
            device: String::new(),
            app_path: apk,
            app_id: package.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use owl_common::exec::testing::ScriptedExecutor;
    use owl_common::{BuildType, Error};

    const ROOT: &str = "/Users/johndoe/Projects/my-project";

    fn driver(config: AndroidConfig, exec: &Arc<ScriptedExecutor>) -> DeviceDriver {
        DeviceDriver::new(config, PathBuf::from(ROOT), exec.clone())
    }

    fn demo_config() -> AndroidConfig {
        AndroidConfig {
            package_name: Some("com.rndemo".into()),
            build_type: BuildType::Release,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_build_command() {
        let exec = Arc::new(ScriptedExecutor::new());
        let build = driver(demo_config(), &exec).build_command();
        assert_eq!(
            build.line,
            "./gradlew assembleRelease --console plain -PisOwlBuild=true"
        );
        assert_eq!(build.cwd, Some(PathBuf::from(ROOT).join("android")));

        let config = AndroidConfig {
            build_type: BuildType::Debug,
            quiet: true,
            ..demo_config()
        };
        assert_eq!(
            driver(config, &exec).build_command().line,
            "./gradlew assembleDebug --console plain --quiet -PisOwlBuild=true"
        );
    }

    #[test]
    fn test_custom_build_command_is_verbatim() {
        let exec = Arc::new(ScriptedExecutor::new());
        let config = AndroidConfig {
            build_command: Some("./gradlew example".into()),
            quiet: true,
            ..demo_config()
        };
        let build = driver(config, &exec).build_command();
        assert_eq!(build.line, "./gradlew example");
        assert_eq!(build.cwd, None);
    }

    #[tokio::test]
    async fn test_launch_with_default_build() {
        let exec = Arc::new(ScriptedExecutor::new());
        let handle = driver(demo_config(), &exec).launch().await.unwrap();

        let apk = format!("{}/android/app/build/outputs/apk/release/app-release.apk", ROOT);
        let calls = exec.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].command, format!("adb install -r {}", apk));
        assert_eq!(calls[0].options, ExecOptions::ignore());
        assert_eq!(
            calls[1].command,
            "adb shell monkey -p \"com.rndemo\" -c android.intent.category.LAUNCHER 1"
        );
        assert_eq!(calls[1].options, ExecOptions::ignore());
        assert_eq!(handle.app_id, "com.rndemo");
    }

    #[tokio::test]
    async fn test_launch_with_binary_path() {
        let exec = Arc::new(ScriptedExecutor::new());
        let config = AndroidConfig {
            build_command: Some("./gradlew example".into()),
            binary_path: Some("/Users/Demo/Desktop/app-release.apk".into()),
            ..demo_config()
        };
        driver(config, &exec).launch().await.unwrap();
        assert_eq!(
            exec.commands()[0],
            "adb install -r /Users/Demo/Desktop/app-release.apk"
        );
    }

    #[tokio::test]
    async fn test_failed_install_skips_launch() {
        let exec = Arc::new(ScriptedExecutor::new().fail("adb install", 1));
        let err = driver(demo_config(), &exec).launch().await.unwrap_err();
        assert!(matches!(err, Error::InstallLaunch(_)));
        assert_eq!(exec.count("monkey"), 0);
    }

    #[tokio::test]
    async fn test_restore_is_a_noop() {
        let exec = Arc::new(ScriptedExecutor::new());
        driver(demo_config(), &exec).restore().await.unwrap();
        assert!(exec.calls().is_empty());
    }
}
