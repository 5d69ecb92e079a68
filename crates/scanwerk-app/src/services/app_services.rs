// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer — owns the persisted settings and runs one scan
// from image files to a finished PDF.

use std::path::{Path, PathBuf};

use scanwerk_bridge::stub::load_frame;
use scanwerk_bridge::{
    BoundaryDetector, FileCaptureSource, FullFrameDetector, HoughBoundaryDetector, PlatformBridge,
    platform_bridge,
};
use scanwerk_core::error::{Result, ScanError, SessionError};
use scanwerk_core::{Quadrilateral, RawFrame, ScanConfig, SessionSnapshot};
use scanwerk_document::{AssemblyReport, ScanCoordinator};
use tracing::{info, instrument, warn};

use super::data_dir;

const CONFIG_FILE: &str = "config.json";

/// Where page outlines come from when no corners are given.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectorKind {
    /// Whatever the platform bridge provides.
    #[default]
    Platform,
    /// The whole image is the page.
    FullFrame,
    /// Edge and line detection.
    Hough,
}

impl DetectorKind {
    fn build(self) -> Box<dyn BoundaryDetector> {
        match self {
            Self::Platform => {
                let bridge = platform_bridge();
                info!(platform = bridge.platform_name(), "Using platform page detector");
                Box::new(BridgeDetector(bridge))
            }
            Self::FullFrame => Box::new(FullFrameDetector::default()),
            Self::Hough => Box::new(HoughBoundaryDetector::default()),
        }
    }
}

/// Narrows a platform bridge to its detector.
struct BridgeDetector(Box<dyn PlatformBridge>);

impl BoundaryDetector for BridgeDetector {
    fn detect_boundary(&self, frame: &RawFrame) -> Result<Option<Quadrilateral>> {
        self.0.detect_boundary(frame)
    }
}

/// One scan, as requested on the command line.
#[derive(Debug, Clone, Default)]
pub struct ScanPlan {
    pub images: Vec<PathBuf>,
    /// Page outlines for the first `corners.len()` images.
    pub corners: Vec<Quadrilateral>,
    pub detector: DetectorKind,
    /// Zero-based `(from, to)` reorderings, applied in order after capture.
    pub moves: Vec<(usize, usize)>,
    pub output: PathBuf,
    /// Also write each rectified page as a JPEG here.
    pub jpeg_dir: Option<PathBuf>,
}

/// What a finished scan produced.
#[derive(Debug)]
pub struct ScanOutcome {
    pub report: AssemblyReport,
    /// The session as it was handed to the assembler.
    pub snapshot: SessionSnapshot,
    /// Images that did not become pages, with the reason.
    pub skipped: Vec<(PathBuf, ScanError)>,
    pub exported: Vec<PathBuf>,
}

/// Settings plus the scan pipeline.
#[derive(Debug, Clone)]
pub struct AppServices {
    config_path: PathBuf,
    config: ScanConfig,
}

impl AppServices {
    /// Load settings from `config_path`, or from the data directory when
    /// `None`.
    ///
    /// An explicit path must exist and parse. The default file may be
    /// missing, and a damaged default file is replaced by defaults.
    pub fn init(config_path: Option<&Path>) -> Result<Self> {
        match config_path {
            Some(path) => {
                let config = load_config(path)?;
                info!(path = %path.display(), "Settings loaded");
                Ok(Self {
                    config_path: path.to_path_buf(),
                    config,
                })
            }
            None => {
                let path = data_dir::data_dir().join(CONFIG_FILE);
                let config = if path.exists() {
                    load_config(&path).unwrap_or_else(|err| {
                        warn!(path = %path.display(), %err, "Settings unreadable; using defaults");
                        ScanConfig::default()
                    })
                } else {
                    ScanConfig::default()
                };
                Ok(Self {
                    config_path: path,
                    config,
                })
            }
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut ScanConfig {
        &mut self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Write the current settings back to where they were loaded from.
    pub fn save_config(&self) -> Result<()> {
        persist_config(&self.config_path, &self.config)?;
        info!(path = %self.config_path.display(), "Settings saved");
        Ok(())
    }

    /// Capture every image in `plan`, apply the reorderings and write the
    /// PDF.
    ///
    /// Images that fail on their own (unreadable, no page found, bad
    /// outline) are skipped and reported. Anything else ends the run.
    #[instrument(skip_all, fields(images = plan.images.len(), output = %plan.output.display()))]
    pub fn run_scan(&self, plan: &ScanPlan) -> Result<ScanOutcome> {
        let mut coordinator = ScanCoordinator::new(self.config.clone());
        coordinator.begin_session()?;
        let detector = plan.detector.build();

        let skipped = if plan.corners.is_empty() {
            import_all(&mut coordinator, &plan.images, detector.as_ref())?
        } else {
            import_each(&mut coordinator, plan, detector.as_ref())?
        };

        for &(from, to) in &plan.moves {
            coordinator.move_page(from, to)?;
        }

        let exported = match &plan.jpeg_dir {
            Some(dir) => coordinator.export_page_images(dir)?,
            None => Vec::new(),
        };

        let snapshot = coordinator.snapshot()?;
        let report = coordinator.finish_to_file(&plan.output)?;
        Ok(ScanOutcome {
            report,
            snapshot,
            skipped,
            exported,
        })
    }
}

/// Gallery import: one batch through a file capture source.
fn import_all(
    coordinator: &mut ScanCoordinator,
    images: &[PathBuf],
    detector: &dyn BoundaryDetector,
) -> Result<Vec<(PathBuf, ScanError)>> {
    let mut source = FileCaptureSource::new(images.iter().cloned());
    let results = coordinator.capture_from_source(&mut source, detector)?;

    let mut skipped = Vec::new();
    for (path, result) in images.iter().zip(results) {
        if let Err(err) = result {
            warn!(path = %path.display(), %err, "Image skipped");
            skipped.push((path.clone(), err));
        }
    }
    Ok(skipped)
}

/// One image at a time, using the given outline where there is one.
/// Images past the page limit are skipped, as in a batch import.
fn import_each(
    coordinator: &mut ScanCoordinator,
    plan: &ScanPlan,
    detector: &dyn BoundaryDetector,
) -> Result<Vec<(PathBuf, ScanError)>> {
    let mut skipped = Vec::new();
    for (i, path) in plan.images.iter().enumerate() {
        let captured = load_frame(path).and_then(|frame| match plan.corners.get(i) {
            Some(quad) => coordinator.capture_page(&frame, Some(*quad)),
            None => coordinator.capture_with_detector(&frame, detector),
        });
        match captured {
            Ok(_) => {}
            Err(err) if err.is_recoverable() || is_page_limit(&err) => {
                warn!(path = %path.display(), %err, "Image skipped");
                skipped.push((path.clone(), err));
            }
            Err(err) => return Err(err),
        }
    }
    Ok(skipped)
}

fn is_page_limit(err: &ScanError) -> bool {
    matches!(err, ScanError::Session(SessionError::PageLimit { .. }))
}

fn load_config(path: &Path) -> Result<ScanConfig> {
    let data = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&data)?)
}

fn persist_config(path: &Path, config: &ScanConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanwerk_core::config::PageFilter;

    #[test]
    fn settings_survive_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{}").unwrap();

        let mut services = AppServices::init(Some(&path)).unwrap();
        assert_eq!(services.config(), &ScanConfig::default());

        services.config_mut().jpeg_quality = 60;
        services.config_mut().filter = PageFilter::Otsu;
        services.save_config().unwrap();

        let reloaded = AppServices::init(Some(&path)).unwrap();
        assert_eq!(reloaded.config().jpeg_quality, 60);
        assert_eq!(reloaded.config().filter, PageFilter::Otsu);
    }

    fn services_with(dir: &Path, json: &str) -> AppServices {
        let path = dir.join(CONFIG_FILE);
        std::fs::write(&path, json).unwrap();
        AppServices::init(Some(&path)).unwrap()
    }

    fn photos(dir: &Path, count: usize) -> Vec<PathBuf> {
        (0..count)
            .map(|i| {
                let path = dir.join(format!("photo-{i}.png"));
                image::RgbImage::from_pixel(60, 80, image::Rgb([210, 200, 190]))
                    .save(&path)
                    .unwrap();
                path
            })
            .collect()
    }

    fn plan(dir: &Path, images: Vec<PathBuf>, corners: Vec<Quadrilateral>) -> ScanPlan {
        ScanPlan {
            images,
            corners,
            output: dir.join("scan.pdf"),
            ..ScanPlan::default()
        }
    }

    fn assert_limited_to_one_page(outcome: &ScanOutcome, output: &Path) {
        assert_eq!(outcome.report.page_count, 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert!(is_page_limit(&outcome.skipped[0].1));
        let reader = scanwerk_document::PdfReader::open(output).unwrap();
        assert_eq!(reader.page_count(), 1);
    }

    #[test]
    fn page_limit_skips_extra_images_with_corners() {
        let dir = tempfile::tempdir().unwrap();
        let services = services_with(dir.path(), r#"{ "max_pages": 1 }"#);
        let quad = Quadrilateral::from_rect(0.0, 0.0, 60.0, 80.0);
        let plan = plan(dir.path(), photos(dir.path(), 2), vec![quad, quad]);

        let outcome = services.run_scan(&plan).unwrap();
        assert_limited_to_one_page(&outcome, &plan.output);
    }

    #[test]
    fn page_limit_skips_extra_images_in_batch_import() {
        let dir = tempfile::tempdir().unwrap();
        let services = services_with(dir.path(), r#"{ "max_pages": 1 }"#);
        let plan = plan(dir.path(), photos(dir.path(), 2), Vec::new());

        let outcome = services.run_scan(&plan).unwrap();
        assert_limited_to_one_page(&outcome, &plan.output);
    }

    #[test]
    fn platform_detector_is_the_default() {
        let dir = tempfile::tempdir().unwrap();
        let services = services_with(dir.path(), "{}");
        let plan = plan(dir.path(), photos(dir.path(), 2), Vec::new());
        assert_eq!(plan.detector, DetectorKind::Platform);

        let outcome = services.run_scan(&plan).unwrap();
        assert!(outcome.skipped.is_empty());
        let sizes: Vec<(u32, u32)> = outcome.snapshot.pages.iter().map(|p| (p.width, p.height)).collect();
        assert_eq!(sizes, vec![(60, 80), (60, 80)]);
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = AppServices::init(Some(&dir.path().join("absent.json"))).unwrap_err();
        assert!(matches!(err, ScanError::Io(_)));
    }

    #[test]
    fn explicit_config_must_parse() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = AppServices::init(Some(&path)).unwrap_err();
        assert!(matches!(err, ScanError::Serialization(_)));
    }
}
