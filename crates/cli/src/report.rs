//! HTML report for failed runs
//!
//! Built from the JSON results the test runner writes in report mode, as
//! loaded by the coordinator, plus any diff images the bridge left behind.

use async_trait::async_trait;
use chrono::Local;
use serde::Deserialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use owl_common::{Error, Result, RunConfiguration};

/// Turns a finished run's results into something a person can look at
#[async_trait]
pub trait ReportGenerator: Send + Sync {
    /// Returns the path of the generated report. `results` is `None` when
    /// the runner left no readable results.
    async fn generate(
        &self,
        run: &RunConfiguration,
        results: Option<&TestReport>,
    ) -> Result<PathBuf>;
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestReport {
    pub num_total_tests: u64,
    pub num_passed_tests: u64,
    pub num_failed_tests: u64,
    pub test_results: Vec<SuiteResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SuiteResult {
    pub name: String,
    pub assertion_results: Vec<AssertionResult>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AssertionResult {
    pub full_name: String,
    pub title: String,
    pub status: String,
    pub failure_messages: Vec<String>,
}

impl AssertionResult {
    fn display_name(&self) -> &str {
        if self.full_name.is_empty() {
            &self.title
        } else {
            &self.full_name
        }
    }
}

impl TestReport {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ReportGeneration(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&content).map_err(|e| {
            Error::ReportGeneration(format!("{} is not a valid test report: {}", path.display(), e))
        })
    }

    /// Failed assertions with the file they came from
    pub fn failures(&self) -> impl Iterator<Item = (&SuiteResult, &AssertionResult)> {
        self.test_results.iter().flat_map(|suite| {
            suite
                .assertion_results
                .iter()
                .filter(|a| a.status == "failed")
                .map(move |a| (suite, a))
        })
    }
}

/// Writes `index.html` into the run's report directory
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlReportGenerator;

#[async_trait]
impl ReportGenerator for HtmlReportGenerator {
    async fn generate(
        &self,
        run: &RunConfiguration,
        results: Option<&TestReport>,
    ) -> Result<PathBuf> {
        let diffs = diff_images(&run.diff_dir())?;
        debug!(
            "[OWL - CLI] Rendering report for {} failed tests and {} diff images.",
            results.map(|r| r.num_failed_tests).unwrap_or(0),
            diffs.len()
        );

        let html = render(run, results, &diffs);
        let out = run.report_dir().join("index.html");
        std::fs::create_dir_all(run.report_dir())
            .and_then(|_| std::fs::write(&out, html))
            .map_err(|e| Error::ReportGeneration(format!("cannot write {}: {}", out.display(), e)))?;

        info!("[OWL - CLI] Report written to {}.", out.display());
        Ok(out)
    }
}

/// Names of diff images, sorted
fn diff_images(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().map(|e| e == "png").unwrap_or(false) {
            if let Some(name) = path.file_name() {
                names.push(name.to_string_lossy().into_owned());
            }
        }
    }
    names.sort();
    Ok(names)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

fn render(run: &RunConfiguration, results: Option<&TestReport>, diffs: &[String]) -> String {
    let platform = run.platform.as_str();
    let mut html = String::new();

    // Writing to a String cannot fail
    let _ = write!(
        html,
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n\
         <title>owl report ({platform})</title>\n</head>\n<body>\n\
         <h1>owl report: {platform}</h1>\n\
         <p class=\"generated\">Generated {}</p>\n",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
    );

    match results {
        Some(report) => {
            let _ = writeln!(
                html,
                "<p class=\"summary\">{} of {} tests failed, {} passed</p>",
                report.num_failed_tests, report.num_total_tests, report.num_passed_tests,
            );

            html.push_str("<h2>Failures</h2>\n<ul class=\"failures\">\n");
            for (suite, assertion) in report.failures() {
                let _ = write!(
                    html,
                    "<li><strong>{}</strong> <span class=\"suite\">{}</span>",
                    escape(assertion.display_name()),
                    escape(&suite.name)
                );
                for message in &assertion.failure_messages {
                    let _ = write!(html, "<pre>{}</pre>", escape(message));
                }
                html.push_str("</li>\n");
            }
            html.push_str("</ul>\n");
        }
        None => html.push_str("<p class=\"summary\">No test results were recorded.</p>\n"),
    }

    if !diffs.is_empty() {
        html.push_str("<h2>Differences</h2>\n");
        for name in diffs {
            let name = escape(name);
            let _ = write!(
                html,
                "<figure><img src=\"../diff/{platform}/{name}\" alt=\"{name}\">\
                 <figcaption>{name}</figcaption></figure>\n"
            );
        }
    }

    html.push_str("</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use owl_common::{OwlConfig, Platform, SimulatorConfig};

    const JEST_REPORT: &str = r#"{
        "numTotalTests": 3,
        "numPassedTests": 2,
        "numFailedTests": 1,
        "testResults": [{
            "name": "/app/__tests__/home.owl.tsx",
            "assertionResults": [
                {"fullName": "Home renders", "title": "renders", "status": "passed", "failureMessages": []},
                {"fullName": "Home <matches> baseline", "title": "matches baseline", "status": "failed",
                 "failureMessages": ["Expected home.png to match the baseline"]}
            ]
        }]
    }"#;

    fn run_in(root: &Path) -> RunConfiguration {
        let file = OwlConfig {
            ios: Some(SimulatorConfig {
                workspace: Some("ios/RNDemo.xcworkspace".into()),
                scheme: Some("RNDemo".into()),
                device: Some("iPhone Simulator".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        RunConfiguration::resolve(file, Platform::Ios, false, root).unwrap()
    }

    #[test]
    fn test_failures_are_collected() {
        let report: TestReport = serde_json::from_str(JEST_REPORT).unwrap();
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].1.display_name(), "Home <matches> baseline");
    }

    #[tokio::test]
    async fn test_generate_writes_index() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_in(dir.path());
        std::fs::create_dir_all(run.diff_dir()).unwrap();
        std::fs::write(run.diff_dir().join("home.png"), b"png").unwrap();

        let results: TestReport = serde_json::from_str(JEST_REPORT).unwrap();
        let path = HtmlReportGenerator
            .generate(&run, Some(&results))
            .await
            .unwrap();
        assert_eq!(path, run.report_dir().join("index.html"));

        let html = std::fs::read_to_string(path).unwrap();
        assert!(html.contains("1 of 3 tests failed"));
        assert!(html.contains("Home &lt;matches&gt; baseline"));
        assert!(html.contains("Expected home.png to match the baseline"));
        assert!(html.contains("../diff/ios/home.png"));
        assert!(!html.contains("Home renders"));
    }

    #[tokio::test]
    async fn test_missing_results_still_renders() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_in(dir.path());

        let path = HtmlReportGenerator.generate(&run, None).await.unwrap();
        let html = std::fs::read_to_string(path).unwrap();
        assert!(html.contains("No test results were recorded."));
        assert!(!html.contains("<h2>Failures</h2>"));
    }

    #[test]
    fn test_load_rejects_malformed_results() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jest-report.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            TestReport::load(&path),
            Err(Error::ReportGeneration(_))
        ));
        assert!(matches!(
            TestReport::load(&dir.path().join("missing.json")),
            Err(Error::ReportGeneration(_))
        ));
    }

    #[tokio::test]
    async fn test_unwritable_report_dir_is_a_report_error() {
        let dir = tempfile::tempdir().unwrap();
        let run = run_in(dir.path());
        std::fs::create_dir_all(run.report_dir().parent().unwrap()).unwrap();
        std::fs::write(run.report_dir(), b"not a directory").unwrap();

        let err = HtmlReportGenerator.generate(&run, None).await.unwrap_err();
        assert!(matches!(err, Error::ReportGeneration(_)));
    }
}
