//! Run configuration
//!
//! The file configuration (`owl.config.json`, or `.toml`) mirrors the layout
//! of the React Native project: one section per platform plus a few run-wide
//! flags. [`RunConfiguration`] is the validated, immutable view the rest of
//! the workspace reads from; it is resolved once per invocation.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{Error, Result};

/// Default port the bridge listens on.
pub const DEFAULT_BRIDGE_PORT: u16 = 8123;

/// Target platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Tvos,
    Android,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Tvos => "tvos",
            Platform::Android => "android",
        }
    }

    /// Whether this platform runs on an Apple simulator.
    pub fn is_simulator(&self) -> bool {
        matches!(self, Platform::Ios | Platform::Tvos)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ios" => Ok(Platform::Ios),
            "tvos" => Ok(Platform::Tvos),
            "android" => Ok(Platform::Android),
            other => Err(Error::Configuration(format!(
                "unknown platform '{}' (expected ios, tvos or android)",
                other
            ))),
        }
    }
}

/// iOS / tvOS section of the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulatorConfig {
    pub workspace: Option<String>,
    pub scheme: Option<String>,
    #[serde(default = "default_configuration")]
    pub configuration: String,
    pub build_command: Option<String>,
    pub binary_path: Option<PathBuf>,
    pub device: Option<String>,
    #[serde(default)]
    pub quiet: bool,
}

fn default_configuration() -> String {
    "Debug".to_string()
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            scheme: None,
            configuration: default_configuration(),
            build_command: None,
            binary_path: None,
            device: None,
            quiet: false,
        }
    }
}

/// Android build type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BuildType {
    Debug,
    #[default]
    Release,
}

impl BuildType {
    /// Gradle task assembling this build type.
    pub fn gradle_task(&self) -> &'static str {
        match self {
            BuildType::Debug => "assembleDebug",
            BuildType::Release => "assembleRelease",
        }
    }

    /// Directory/file suffix used by the Android Gradle plugin outputs.
    pub fn output_name(&self) -> &'static str {
        match self {
            BuildType::Debug => "debug",
            BuildType::Release => "release",
        }
    }
}

/// Android section of the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AndroidConfig {
    pub package_name: Option<String>,
    pub build_command: Option<String>,
    #[serde(default)]
    pub build_type: BuildType,
    pub binary_path: Option<PathBuf>,
    #[serde(default)]
    pub quiet: bool,
}

/// Bridge server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BridgeSettings {
    /// Local port the bridge listens on
    pub port: u16,

    /// How long a capture waits for the app client to connect
    pub connect_timeout_ms: u64,

    /// How long a capture waits for the app to answer
    pub request_timeout_ms: u64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_BRIDGE_PORT,
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
        }
    }
}

/// Contents of the config file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwlConfig {
    pub ios: Option<SimulatorConfig>,
    pub tvos: Option<SimulatorConfig>,
    pub android: Option<AndroidConfig>,

    #[serde(default)]
    pub debug: bool,

    #[serde(default = "default_report")]
    pub report: bool,

    /// Replaces the default jest invocation
    pub test_command: Option<String>,

    #[serde(default)]
    pub bridge: BridgeSettings,
}

fn default_report() -> bool {
    true
}

impl Default for OwlConfig {
    fn default() -> Self {
        Self {
            ios: None,
            tvos: None,
            android: None,
            debug: false,
            report: default_report(),
            test_command: None,
            bridge: BridgeSettings::default(),
        }
    }
}

impl OwlConfig {
    /// Load configuration from file. `.toml` files are parsed as TOML,
    /// everything else as JSON.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Configuration(format!(
                "Could not find the config file at {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let is_toml = path.extension().map(|e| e == "toml").unwrap_or(false);

        if is_toml {
            toml::from_str(&content).map_err(|e| {
                Error::Configuration(format!("{} is not valid TOML: {}", path.display(), e))
            })
        } else {
            serde_json::from_str(&content).map_err(|e| {
                Error::Configuration(format!("{} is not valid JSON: {}", path.display(), e))
            })
        }
    }
}

/// Platform section selected for a run
#[derive(Debug, Clone)]
pub enum TargetConfig {
    Simulator(SimulatorConfig),
    Device(AndroidConfig),
}

/// Validated configuration for a single build or run
#[derive(Debug, Clone)]
pub struct RunConfiguration {
    pub platform: Platform,
    pub target: TargetConfig,
    pub update_baseline: bool,
    pub report: bool,
    pub debug: bool,
    pub test_command: Option<String>,
    pub bridge: BridgeSettings,

    /// Directory the CLI was invoked from
    pub project_root: PathBuf,

    /// Value exported to the test runner as `OWL_IOS_SIMULATOR`
    pub simulator_device: String,
}

impl RunConfiguration {
    /// Select and validate the platform section, then freeze the result.
    pub fn resolve(
        file: OwlConfig,
        platform: Platform,
        update_baseline: bool,
        project_root: impl Into<PathBuf>,
    ) -> Result<Self> {
        let ios_device = file.ios.as_ref().and_then(|c| c.device.clone());

        let (target, simulator_device) = match platform {
            Platform::Ios | Platform::Tvos => {
                let section = if platform == Platform::Ios {
                    file.ios
                } else {
                    file.tvos
                };
                let section = section.ok_or_else(|| missing_section(platform))?;
                validate_simulator(platform, &section)?;
                let device = section.device.clone().unwrap_or_default();
                (TargetConfig::Simulator(section), device)
            }
            Platform::Android => {
                let section = file.android.ok_or_else(|| missing_section(platform))?;
                if section.package_name.as_deref().map_or(true, str::is_empty) {
                    return Err(Error::Configuration(
                        "android.packageName is required".to_string(),
                    ));
                }
                (TargetConfig::Device(section), ios_device.unwrap_or_default())
            }
        };

        Ok(Self {
            platform,
            target,
            update_baseline,
            report: file.report,
            debug: file.debug,
            test_command: file.test_command,
            bridge: file.bridge,
            project_root: project_root.into(),
            simulator_device,
        })
    }

    /// Root of every artifact the run writes
    pub fn owl_dir(&self) -> PathBuf {
        self.project_root.join(".owl")
    }

    pub fn baseline_dir(&self) -> PathBuf {
        self.owl_dir().join("baseline").join(self.platform.as_str())
    }

    pub fn current_dir(&self) -> PathBuf {
        self.owl_dir().join("current").join(self.platform.as_str())
    }

    pub fn diff_dir(&self) -> PathBuf {
        self.owl_dir().join("diff").join(self.platform.as_str())
    }

    pub fn report_dir(&self) -> PathBuf {
        self.owl_dir().join("report")
    }

    /// JSON artifact written by the test runner in report mode
    pub fn report_json_path(&self) -> PathBuf {
        self.report_dir().join("jest-report.json")
    }
}

fn missing_section(platform: Platform) -> Error {
    Error::Configuration(format!(
        "the config file has no '{}' section",
        platform.as_str()
    ))
}

fn validate_simulator(platform: Platform, section: &SimulatorConfig) -> Result<()> {
    let name = platform.as_str();
    let is_set = |v: &Option<String>| v.as_deref().map_or(false, |s| !s.is_empty());

    if !is_set(&section.device) {
        return Err(Error::Configuration(format!("{}.device is required", name)));
    }

    if section.build_command.is_none() && !(is_set(&section.workspace) && is_set(&section.scheme)) {
        return Err(Error::Configuration(format!(
            "{name}.workspace and {name}.scheme are required unless {name}.buildCommand is set"
        )));
    }

    if section.binary_path.is_none() && !is_set(&section.scheme) {
        return Err(Error::Configuration(format!(
            "{name}.scheme is required unless {name}.binaryPath is set"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn ios_section() -> SimulatorConfig {
        SimulatorConfig {
            workspace: Some("ios/RNDemo.xcworkspace".into()),
            scheme: Some("RNDemo".into()),
            configuration: "Debug".into(),
            device: Some("iPhone Simulator".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_json_config_with_defaults() {
        let json = r#"{
            "ios": {
                "workspace": "ios/RNDemo.xcworkspace",
                "scheme": "RNDemo",
                "device": "iPhone Simulator"
            },
            "android": { "packageName": "com.rndemo" }
        }"#;
        let config: OwlConfig = serde_json::from_str(json).unwrap();

        let ios = config.ios.unwrap();
        assert_eq!(ios.configuration, "Debug");
        assert!(!ios.quiet);

        let android = config.android.unwrap();
        assert_eq!(android.build_type, BuildType::Release);
        assert!(config.report);
        assert!(!config.debug);
        assert_eq!(config.bridge.port, DEFAULT_BRIDGE_PORT);
    }

    #[test]
    fn test_load_toml_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("owl.config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "report = false\n\n[android]\npackageName = \"com.rndemo\"\nbuildType = \"Debug\"\n\n[bridge]\nport = 9000"
        )
        .unwrap();

        let config = OwlConfig::load(&path).unwrap();
        assert!(!config.report);
        assert_eq!(config.bridge.port, 9000);
        assert_eq!(config.bridge.request_timeout_ms, 30_000);
        assert_eq!(config.android.unwrap().build_type, BuildType::Debug);
    }

    #[test]
    fn test_missing_config_file_is_configuration_error() {
        let err = OwlConfig::load(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_resolve_requires_platform_section() {
        let err = RunConfiguration::resolve(OwlConfig::default(), Platform::Android, false, "/p")
            .unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_resolve_requires_device_and_scheme() {
        let mut section = ios_section();
        section.device = None;
        let file = OwlConfig {
            ios: Some(section),
            ..Default::default()
        };
        assert!(RunConfiguration::resolve(file, Platform::Ios, false, "/p").is_err());

        let mut section = ios_section();
        section.scheme = None;
        let file = OwlConfig {
            ios: Some(section),
            ..Default::default()
        };
        assert!(RunConfiguration::resolve(file, Platform::Ios, false, "/p").is_err());
    }

    #[test]
    fn test_custom_build_with_binary_path_needs_no_scheme() {
        let section = SimulatorConfig {
            build_command: Some("echo 'Hello World'".into()),
            binary_path: Some("custom/path/RNDemo.app".into()),
            device: Some("iPhone Simulator".into()),
            ..Default::default()
        };
        let file = OwlConfig {
            ios: Some(section),
            ..Default::default()
        };
        let config = RunConfiguration::resolve(file, Platform::Ios, true, "/p").unwrap();
        assert!(config.update_baseline);
        assert_eq!(config.simulator_device, "iPhone Simulator");
    }

    #[test]
    fn test_android_exports_ios_device_and_paths() {
        let file = OwlConfig {
            ios: Some(ios_section()),
            android: Some(AndroidConfig {
                package_name: Some("com.rndemo".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let config =
            RunConfiguration::resolve(file, Platform::Android, false, "/Users/johndoe/app").unwrap();

        assert_eq!(config.simulator_device, "iPhone Simulator");
        assert_eq!(
            config.baseline_dir(),
            PathBuf::from("/Users/johndoe/app/.owl/baseline/android")
        );
        assert_eq!(
            config.report_json_path(),
            PathBuf::from("/Users/johndoe/app/.owl/report/jest-report.json")
        );
    }

    #[test]
    fn test_platform_from_str() {
        assert_eq!("tvOS".parse::<Platform>().unwrap(), Platform::Tvos);
        assert!("windows".parse::<Platform>().is_err());
        assert!(Platform::Ios.is_simulator());
        assert!(!Platform::Android.is_simulator());
    }
}
