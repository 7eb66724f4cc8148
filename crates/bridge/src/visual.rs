//! Screenshot storage and baseline comparison

use image::{Pixel, RgbaImage};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use owl_common::RunConfiguration;

use crate::error::{BridgeError, BridgeResult};

/// Per-channel difference tolerated before a pixel counts as changed
const CHANNEL_TOLERANCE: i32 = 5;

/// Outcome of recording one screenshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScreenshotOutcome {
    /// No baseline existed, or baselines are being updated
    BaselineSaved,
    Match,
    Mismatch,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScreenshotReport {
    pub name: String,
    pub outcome: ScreenshotOutcome,
    pub diff_percent: f64,
    pub diff_pixels: u64,
    pub total_pixels: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diff_path: Option<PathBuf>,
}

/// Pixel comparison of two images
#[derive(Debug, Clone)]
pub struct ImageDiff {
    pub diff_pixels: u64,
    pub total_pixels: u64,
    pub overlay: RgbaImage,
}

impl ImageDiff {
    pub fn percent(&self) -> f64 {
        if self.total_pixels == 0 {
            return 0.0;
        }
        (self.diff_pixels as f64 / self.total_pixels as f64) * 100.0
    }
}

/// Compare `actual` against `baseline`. Pixels outside the overlapping
/// region of differently sized images count as changed. Changed pixels are
/// painted red on the overlay; the rest are dimmed.
pub fn compare(actual: &RgbaImage, baseline: &RgbaImage) -> ImageDiff {
    let width = actual.width().max(baseline.width());
    let height = actual.height().max(baseline.height());
    let mut overlay = RgbaImage::new(width, height);
    let mut diff_pixels = 0u64;

    for y in 0..height {
        for x in 0..width {
            let a = (x < actual.width() && y < actual.height()).then(|| actual.get_pixel(x, y));
            let b = (x < baseline.width() && y < baseline.height())
                .then(|| baseline.get_pixel(x, y));

            match (a, b) {
                (Some(a), Some(b)) if !pixels_differ(a, b) => {
                    let c = a.channels();
                    overlay.put_pixel(x, y, image::Rgba([c[0] / 2, c[1] / 2, c[2] / 2, 128]));
                }
                _ => {
                    diff_pixels += 1;
                    overlay.put_pixel(x, y, image::Rgba([255, 0, 0, 255]));
                }
            }
        }
    }

    ImageDiff {
        diff_pixels,
        total_pixels: width as u64 * height as u64,
        overlay,
    }
}

fn pixels_differ(a: &image::Rgba<u8>, b: &image::Rgba<u8>) -> bool {
    a.channels()
        .iter()
        .zip(b.channels())
        .any(|(x, y)| (*x as i32 - *y as i32).abs() > CHANNEL_TOLERANCE)
}

fn sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Names become file names, so keep them to a safe alphabet
pub(crate) fn validate_name(name: &str) -> BridgeResult<()> {
    let valid = !name.is_empty()
        && name.len() <= 128
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(BridgeError::InvalidName(name.to_string()))
    }
}

/// Where screenshots of a run live and how they are judged
#[derive(Debug, Clone)]
pub struct ScreenshotStore {
    baseline_dir: PathBuf,
    current_dir: PathBuf,
    diff_dir: PathBuf,
    update_baseline: bool,
    /// Percent of changed pixels still considered a match
    threshold: f64,
}

impl ScreenshotStore {
    pub fn new(
        baseline_dir: impl Into<PathBuf>,
        current_dir: impl Into<PathBuf>,
        diff_dir: impl Into<PathBuf>,
        update_baseline: bool,
    ) -> Self {
        Self {
            baseline_dir: baseline_dir.into(),
            current_dir: current_dir.into(),
            diff_dir: diff_dir.into(),
            update_baseline,
            threshold: 0.0,
        }
    }

    pub fn from_run(run: &RunConfiguration) -> Self {
        Self::new(
            run.baseline_dir(),
            run.current_dir(),
            run.diff_dir(),
            run.update_baseline,
        )
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn baseline_path(&self, name: &str) -> PathBuf {
        self.baseline_dir.join(format!("{}.png", name))
    }

    pub fn current_path(&self, name: &str) -> PathBuf {
        self.current_dir.join(format!("{}.png", name))
    }

    pub fn diff_path(&self, name: &str) -> PathBuf {
        self.diff_dir.join(format!("{}.png", name))
    }

    /// Store a freshly captured PNG and judge it against the baseline
    pub fn record(&self, name: &str, png: &[u8]) -> BridgeResult<ScreenshotReport> {
        validate_name(name)?;

        write_file(&self.current_path(name), png)?;

        let baseline_path = self.baseline_path(name);
        if self.update_baseline || !baseline_path.exists() {
            write_file(&baseline_path, png)?;
            self.clear_diff(name)?;
            info!("[OWL - Bridge] saved baseline for '{}'", name);
            return Ok(self.report(name, ScreenshotOutcome::BaselineSaved, None, None));
        }

        let baseline = std::fs::read(&baseline_path)?;
        if sha256(&baseline) == sha256(png) {
            debug!("[OWL - Bridge] '{}' matches baseline exactly", name);
            self.clear_diff(name)?;
            return Ok(self.report(name, ScreenshotOutcome::Match, None, None));
        }

        let actual = image::load_from_memory(png)?.to_rgba8();
        let expected = image::load_from_memory(&baseline)?.to_rgba8();
        if actual.dimensions() != expected.dimensions() {
            warn!(
                "[OWL - Bridge] '{}' dimensions differ: current {:?} vs baseline {:?}",
                name,
                actual.dimensions(),
                expected.dimensions()
            );
        }

        let diff = compare(&actual, &expected);
        let diff_path = self.diff_path(name);
        let outcome = if diff.diff_pixels == 0 || diff.percent() <= self.threshold {
            ScreenshotOutcome::Match
        } else {
            ScreenshotOutcome::Mismatch
        };

        let saved = if outcome == ScreenshotOutcome::Mismatch {
            warn!(
                "[OWL - Bridge] '{}' differs from baseline: {:.2}% of pixels changed",
                name,
                diff.percent()
            );
            if let Some(parent) = diff_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            diff.overlay.save(&diff_path)?;
            Some(diff_path)
        } else {
            self.clear_diff(name)?;
            None
        };

        Ok(self.report(name, outcome, Some(&diff), saved))
    }

    /// Drop a diff image left over from an earlier mismatch
    fn clear_diff(&self, name: &str) -> BridgeResult<()> {
        match std::fs::remove_file(self.diff_path(name)) {
            Ok(()) => {
                debug!("[OWL - Bridge] removed stale diff for '{}'", name);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn report(
        &self,
        name: &str,
        outcome: ScreenshotOutcome,
        diff: Option<&ImageDiff>,
        diff_path: Option<PathBuf>,
    ) -> ScreenshotReport {
        ScreenshotReport {
            name: name.to_string(),
            outcome,
            diff_percent: diff.map(ImageDiff::percent).unwrap_or(0.0),
            diff_pixels: diff.map(|d| d.diff_pixels).unwrap_or(0),
            total_pixels: diff.map(|d| d.total_pixels).unwrap_or(0),
            diff_path,
        }
    }
}

fn write_file(path: &Path, data: &[u8]) -> BridgeResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageOutputFormat, Rgba};
    use std::io::Cursor;

    fn solid(width: u32, height: u32, color: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba(color))
    }

    fn png(img: &RgbaImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img.clone())
            .write_to(&mut buf, ImageOutputFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn store(dir: &Path, update: bool) -> ScreenshotStore {
        ScreenshotStore::new(
            dir.join("baseline"),
            dir.join("current"),
            dir.join("diff"),
            update,
        )
    }

    #[test]
    fn test_compare_tolerates_small_differences() {
        let a = solid(4, 4, [100, 100, 100, 255]);
        let b = solid(4, 4, [103, 98, 100, 255]);
        let diff = compare(&a, &b);
        assert_eq!(diff.diff_pixels, 0);
        assert_eq!(diff.total_pixels, 16);
    }

    #[test]
    fn test_compare_counts_changed_and_missing_pixels() {
        let mut a = solid(4, 4, [0, 0, 0, 255]);
        a.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        let b = solid(4, 4, [0, 0, 0, 255]);
        let diff = compare(&a, &b);
        assert_eq!(diff.diff_pixels, 1);
        assert_eq!(*diff.overlay.get_pixel(0, 0), Rgba([255, 0, 0, 255]));

        let wide = solid(5, 4, [0, 0, 0, 255]);
        let diff = compare(&wide, &b);
        assert_eq!(diff.total_pixels, 20);
        assert_eq!(diff.diff_pixels, 4);
    }

    #[test]
    fn test_first_capture_saves_baseline() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), false);
        let data = png(&solid(2, 2, [10, 20, 30, 255]));

        let report = store.record("home", &data).unwrap();
        assert_eq!(report.outcome, ScreenshotOutcome::BaselineSaved);
        assert_eq!(std::fs::read(store.baseline_path("home")).unwrap(), data);
        assert_eq!(std::fs::read(store.current_path("home")).unwrap(), data);

        let report = store.record("home", &data).unwrap();
        assert_eq!(report.outcome, ScreenshotOutcome::Match);
    }

    #[test]
    fn test_changed_capture_is_mismatch_with_diff_image() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), false);
        store
            .record("home", &png(&solid(2, 2, [0, 0, 0, 255])))
            .unwrap();

        let report = store
            .record("home", &png(&solid(2, 2, [255, 255, 255, 255])))
            .unwrap();
        assert_eq!(report.outcome, ScreenshotOutcome::Mismatch);
        assert_eq!(report.diff_pixels, 4);
        assert_eq!(report.diff_path, Some(store.diff_path("home")));
        assert!(store.diff_path("home").exists());
    }

    #[test]
    fn test_matching_capture_clears_stale_diff() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), false);
        let black = png(&solid(2, 2, [0, 0, 0, 255]));
        store.record("home", &black).unwrap();

        store
            .record("home", &png(&solid(2, 2, [255, 255, 255, 255])))
            .unwrap();
        assert!(store.diff_path("home").exists());

        let report = store.record("home", &black).unwrap();
        assert_eq!(report.outcome, ScreenshotOutcome::Match);
        assert_eq!(report.diff_path, None);
        assert!(!store.diff_path("home").exists());
    }

    #[test]
    fn test_tolerated_difference_writes_no_diff() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), false).with_threshold(50.0);
        store
            .record("home", &png(&solid(2, 2, [0, 0, 0, 255])))
            .unwrap();

        let mut changed = solid(2, 2, [0, 0, 0, 255]);
        changed.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        let report = store.record("home", &png(&changed)).unwrap();
        assert_eq!(report.outcome, ScreenshotOutcome::Match);
        assert_eq!(report.diff_pixels, 1);
        assert!(!store.diff_path("home").exists());
    }

    #[test]
    fn test_update_mode_clears_stale_diff() {
        let dir = tempfile::tempdir().unwrap();
        let checking = store(dir.path(), false);
        checking
            .record("home", &png(&solid(2, 2, [0, 0, 0, 255])))
            .unwrap();
        let white = png(&solid(2, 2, [255, 255, 255, 255]));
        checking.record("home", &white).unwrap();
        assert!(checking.diff_path("home").exists());

        let updating = store(dir.path(), true);
        updating.record("home", &white).unwrap();
        assert!(!updating.diff_path("home").exists());
    }

    #[test]
    fn test_update_mode_overwrites_baseline() {
        let dir = tempfile::tempdir().unwrap();
        store(dir.path(), false)
            .record("home", &png(&solid(2, 2, [0, 0, 0, 255])))
            .unwrap();

        let updating = store(dir.path(), true);
        let fresh = png(&solid(2, 2, [255, 255, 255, 255]));
        let report = updating.record("home", &fresh).unwrap();
        assert_eq!(report.outcome, ScreenshotOutcome::BaselineSaved);
        assert_eq!(std::fs::read(updating.baseline_path("home")).unwrap(), fresh);
    }

    #[test]
    fn test_invalid_names_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path(), false);
        for name in ["", "../escape", "a/b", ".hidden"] {
            assert!(matches!(
                store.record(name, b"png"),
                Err(BridgeError::InvalidName(_))
            ));
        }
    }
}
