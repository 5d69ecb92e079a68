// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scan coordinator — drives one session at a time through
// capture -> validate -> rectify -> enhance -> store, and hands finished
// sessions to the PDF assembler.
//
//   Idle --begin--> Capturing --finish--> Finalizing --> Done
//                   Capturing --discard--> Idle
//
// The coordinator is the session's only writer. Observers read
// `SessionSnapshot` copies.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use scanwerk_bridge::{BoundaryDetector, CaptureSource};
use scanwerk_core::error::{Result, ScanError, SessionError};
use scanwerk_core::{Bitmap, Quadrilateral, RawFrame, ScanConfig, SessionId, SessionSnapshot};
use tracing::{debug, info, instrument, warn};

use crate::geometry::GeometryEngine;
use crate::image::processor::encode_jpeg;
use crate::pdf::{AssemblyReport, PdfOptions, assemble};
use crate::rectify::PageRectifier;
use crate::scan::enhance::ScanEnhancer;
use crate::session::{Page, PageSession};

/// Where the coordinator is in the capture lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Capturing,
    Finalizing,
    Done,
}

/// One frame submitted to [`ScanCoordinator::capture_batch`].
pub type BatchItem = (RawFrame, Option<Quadrilateral>);

pub struct ScanCoordinator {
    config: ScanConfig,
    geometry: GeometryEngine,
    rectifier: PageRectifier,
    enhancer: ScanEnhancer,
    state: CoordinatorState,
    session: Option<PageSession>,
}

impl ScanCoordinator {
    pub fn new(config: ScanConfig) -> Self {
        Self {
            geometry: GeometryEngine::new(config.geometry),
            rectifier: PageRectifier::new(config.rectify),
            enhancer: ScanEnhancer::new(config.filter),
            config,
            state: CoordinatorState::Idle,
            session: None,
        }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Id of the current (or just finished) session.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(PageSession::id)
    }

    // -- Lifecycle ------------------------------------------------------------

    /// Open a new session. Allowed from `Idle` and `Done`.
    #[instrument(skip(self))]
    pub fn begin_session(&mut self) -> Result<SessionId> {
        if let (CoordinatorState::Capturing | CoordinatorState::Finalizing, Some(session)) =
            (self.state, &self.session)
        {
            return Err(ScanError::SessionActive(session.id()));
        }

        let session = PageSession::new(self.config.max_pages);
        let id = session.id();
        self.session = Some(session);
        self.state = CoordinatorState::Capturing;
        info!(session = %id, "Scan started");
        Ok(id)
    }

    /// Abandon the current session and release its pages. Does nothing when
    /// already idle.
    #[instrument(skip(self))]
    pub fn discard_session(&mut self) -> Result<()> {
        match self.state {
            CoordinatorState::Idle => Ok(()),
            CoordinatorState::Capturing => {
                if let Some(session) = self.session.as_mut() {
                    session.discard()?;
                }
                self.session = None;
                self.state = CoordinatorState::Idle;
                Ok(())
            }
            CoordinatorState::Finalizing | CoordinatorState::Done => {
                let session = self.session.as_mut().ok_or(ScanError::NoActiveSession)?;
                session.discard()?;
                Ok(())
            }
        }
    }

    // -- Capture --------------------------------------------------------------

    /// Rectify `frame` inside `quad` and append it to the session.
    ///
    /// `None` means the detector found no page. Every per-page failure
    /// leaves the session open for a retry.
    #[instrument(skip(self, frame), fields(w = frame.width(), h = frame.height()))]
    pub fn capture_page(&mut self, frame: &RawFrame, quad: Option<Quadrilateral>) -> Result<usize> {
        self.ensure_capturing()?;
        let (page, quad) = self.process(frame, quad)?;
        let index = self.session_mut()?.add_page(page, quad)?;
        info!(index, "Page captured");
        Ok(index)
    }

    /// Ask `detector` for the page outline, then capture.
    pub fn capture_with_detector(
        &mut self,
        frame: &RawFrame,
        detector: &dyn BoundaryDetector,
    ) -> Result<usize> {
        self.ensure_capturing()?;
        let quad = detector.detect_boundary(frame)?;
        self.capture_page(frame, quad)
    }

    /// Capture several frames, rectifying them in parallel.
    ///
    /// Pages are stored in submission order whatever order rectification
    /// finishes in. Each entry of the result belongs to the frame at the
    /// same position.
    #[instrument(skip_all, fields(frames = frames.len()))]
    pub fn capture_batch(&mut self, frames: Vec<BatchItem>) -> Result<Vec<Result<usize>>> {
        self.ensure_capturing()?;

        let processed: Vec<Result<(Bitmap, Quadrilateral)>> = if self.config.parallel_rectification {
            frames
                .par_iter()
                .map(|(frame, quad)| self.process(frame, *quad))
                .collect()
        } else {
            frames
                .iter()
                .map(|(frame, quad)| self.process(frame, *quad))
                .collect()
        };
        drop(frames);

        let session = self.session_mut()?;
        let results: Vec<Result<usize>> = processed
            .into_iter()
            .map(|item| {
                let (page, quad) = item?;
                Ok(session.add_page(page, quad)?)
            })
            .collect();

        let stored = results.iter().filter(|r| r.is_ok()).count();
        info!(stored, failed = results.len() - stored, "Batch captured");
        Ok(results)
    }

    /// Drain `source`, detecting each page with `detector`, and capture the
    /// frames in batches of one per rayon thread. Frames the source could
    /// not produce appear as errors at their position.
    #[instrument(skip_all)]
    pub fn capture_from_source(
        &mut self,
        source: &mut dyn CaptureSource,
        detector: &dyn BoundaryDetector,
    ) -> Result<Vec<Result<usize>>> {
        let chunk = rayon::current_num_threads().max(1);
        self.capture_in_chunks(source, detector, chunk)
    }

    fn capture_in_chunks(
        &mut self,
        source: &mut dyn CaptureSource,
        detector: &dyn BoundaryDetector,
        chunk: usize,
    ) -> Result<Vec<Result<usize>>> {
        self.ensure_capturing()?;

        let mut results = Vec::new();
        let mut exhausted = false;
        while !exhausted {
            let mut slots: Vec<Option<ScanError>> = Vec::new();
            let mut batch = Vec::with_capacity(chunk);
            while batch.len() < chunk {
                match source.next_frame() {
                    Ok(Some(frame)) => match detector.detect_boundary(&frame) {
                        Ok(quad) => {
                            batch.push((frame, quad));
                            slots.push(None);
                        }
                        Err(err) => slots.push(Some(err)),
                    },
                    Ok(None) => {
                        exhausted = true;
                        break;
                    }
                    Err(err) => {
                        warn!(%err, "Frame could not be read");
                        slots.push(Some(err));
                    }
                }
            }
            if slots.is_empty() {
                break;
            }

            let mut captured = self.capture_batch(batch)?.into_iter();
            results.extend(slots.into_iter().map(|slot| match slot {
                Some(err) => Err(err),
                None => captured.next().unwrap_or(Err(ScanError::NoDocumentFound)),
            }));
        }
        Ok(results)
    }

    // -- Editing --------------------------------------------------------------

    pub fn move_page(&mut self, from: usize, to: usize) -> Result<()> {
        self.ensure_capturing()?;
        Ok(self.session_mut()?.move_page(from, to)?)
    }

    pub fn remove_page(&mut self, index: usize) -> Result<Page> {
        self.ensure_capturing()?;
        Ok(self.session_mut()?.remove_page(index)?)
    }

    /// Replace the page at `index` with a new capture, keeping its position.
    #[instrument(skip(self, frame))]
    pub fn retake_page(
        &mut self,
        index: usize,
        frame: &RawFrame,
        quad: Option<Quadrilateral>,
    ) -> Result<()> {
        self.ensure_capturing()?;
        let session = self.session.as_ref().ok_or(ScanError::NoActiveSession)?;
        if index >= session.len() {
            return Err(SessionError::IndexOutOfRange {
                index,
                len: session.len(),
            }
            .into());
        }

        let (page, quad) = self.process(frame, quad)?;
        self.session_mut()?.replace_page(index, page, quad)?;
        Ok(())
    }

    // -- Observation ----------------------------------------------------------

    pub fn snapshot(&self) -> Result<SessionSnapshot> {
        self.session
            .as_ref()
            .map(PageSession::snapshot)
            .ok_or(ScanError::NoActiveSession)
    }

    pub fn page_preview(&self, index: usize) -> Result<Bitmap> {
        let session = self.session.as_ref().ok_or(ScanError::NoActiveSession)?;
        Ok(session.page_preview(index)?)
    }

    /// Write every page as `page-001.jpg`, `page-002.jpg`, ... into `dir`.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display()))]
    pub fn export_page_images(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        self.ensure_capturing()?;
        let session = self.session.as_ref().ok_or(ScanError::NoActiveSession)?;
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;

        let mut written = Vec::with_capacity(session.len());
        let mut buffer = Vec::new();
        for index in 0..session.len() {
            let Some(page) = session.page(index) else {
                break;
            };
            let bitmap = page.bitmap();
            buffer.clear();
            encode_jpeg(
                bitmap.as_bytes(),
                bitmap.width(),
                bitmap.height(),
                bitmap.format(),
                self.config.jpeg_quality,
                &mut buffer,
            )
            .map_err(|err| ScanError::Export {
                page: index,
                reason: err.to_string(),
            })?;

            let path = dir.join(format!("page-{:03}.jpg", index + 1));
            std::fs::write(&path, &buffer)?;
            debug!(path = %path.display(), "Page image written");
            written.push(path);
        }
        info!(pages = written.len(), "Page images exported");
        Ok(written)
    }

    // -- Output ---------------------------------------------------------------

    /// Finalize the session and stream it into `sink` as a PDF.
    ///
    /// An empty session is refused and stays open. Once pages have been
    /// handed to the assembler the session is closed whatever happens; an
    /// assembler failure is reported as [`ScanError::AssemblyFailed`] and
    /// the scan has to start over.
    #[instrument(skip_all)]
    pub fn finish_session<W: Write>(&mut self, sink: W) -> Result<AssemblyReport> {
        self.ensure_capturing()?;
        let session = self.session.as_mut().ok_or(ScanError::NoActiveSession)?;
        let id = session.id();
        let pages = session.finalize()?;

        self.state = CoordinatorState::Finalizing;
        let options = PdfOptions::from_config(&self.config);
        let result = assemble(pages, sink, options);
        self.state = CoordinatorState::Done;

        match result {
            Ok(report) => {
                info!(session = %id, pages = report.page_count, "Scan finished");
                Ok(report)
            }
            Err(source) => {
                warn!(session = %id, %source, "PDF assembly failed; session cannot be resumed");
                Err(ScanError::AssemblyFailed {
                    session: id,
                    source,
                })
            }
        }
    }

    /// Finish into a file at `path`. A partially written file is removed
    /// when assembly fails.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn finish_to_file(&mut self, path: impl AsRef<Path>) -> Result<AssemblyReport> {
        self.ensure_capturing()?;
        let path = path.as_ref();
        if self.session.as_ref().is_some_and(PageSession::is_empty) {
            return Err(SessionError::Empty.into());
        }

        let file = File::create(path)?;
        let result = self.finish_session(BufWriter::new(file));
        if result.is_err() {
            if let Err(err) = std::fs::remove_file(path) {
                warn!(%err, "Could not remove partial PDF");
            }
        }
        result
    }

    // -- Helpers --------------------------------------------------------------

    fn ensure_capturing(&self) -> Result<()> {
        if self.state == CoordinatorState::Capturing && self.session.is_some() {
            Ok(())
        } else {
            Err(ScanError::NoActiveSession)
        }
    }

    fn session_mut(&mut self) -> Result<&mut PageSession> {
        self.session.as_mut().ok_or(ScanError::NoActiveSession)
    }

    /// Validate, rectify and enhance one frame. Touches no session state,
    /// so it can run on any thread.
    fn process(&self, frame: &RawFrame, quad: Option<Quadrilateral>) -> Result<(Bitmap, Quadrilateral)> {
        let quad = quad.ok_or(ScanError::NoDocumentFound)?;
        let transform = self.geometry.compute_transform(&quad)?;
        let page = self.rectifier.rectify(frame, &transform)?;
        let page = self.enhancer.apply(page)?;
        Ok((page, quad))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanwerk_bridge::{FixedDetector, FullFrameDetector, MemoryCaptureSource};
    use scanwerk_core::error::GeometryError;
    use scanwerk_core::{PageStatus, PixelFormat, SessionState};

    fn frame(shade: u8) -> RawFrame {
        Bitmap::filled(64, 48, PixelFormat::Rgb8, &[shade, shade, shade]).unwrap()
    }

    fn full(frame: &RawFrame) -> Option<Quadrilateral> {
        Some(Quadrilateral::from_rect(0.0, 0.0, frame.width() as f64, frame.height() as f64))
    }

    fn capturing() -> ScanCoordinator {
        let mut coordinator = ScanCoordinator::new(ScanConfig::default());
        coordinator.begin_session().unwrap();
        coordinator
    }

    fn shades(coordinator: &ScanCoordinator) -> Vec<u8> {
        let count = coordinator.snapshot().unwrap().page_count();
        (0..count)
            .map(|i| coordinator.page_preview(i).unwrap().as_bytes()[0])
            .collect()
    }

    #[test]
    fn operations_require_a_session() {
        let mut coordinator = ScanCoordinator::new(ScanConfig::default());
        let f = frame(1);
        assert!(matches!(coordinator.capture_page(&f, full(&f)), Err(ScanError::NoActiveSession)));
        assert!(matches!(coordinator.finish_session(Vec::new()), Err(ScanError::NoActiveSession)));
        assert!(matches!(coordinator.snapshot(), Err(ScanError::NoActiveSession)));
        coordinator.discard_session().unwrap();
    }

    #[test]
    fn second_begin_is_refused() {
        let mut coordinator = capturing();
        let id = coordinator.session_id().unwrap();
        match coordinator.begin_session() {
            Err(ScanError::SessionActive(active)) => assert_eq!(active, id),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn missing_boundary_is_recoverable() {
        let mut coordinator = capturing();
        let err = coordinator
            .capture_with_detector(&frame(9), &FixedDetector::none())
            .unwrap_err();
        assert!(matches!(err, ScanError::NoDocumentFound));
        assert!(err.is_recoverable());
        assert_eq!(coordinator.state(), CoordinatorState::Capturing);

        let f = frame(9);
        assert_eq!(coordinator.capture_with_detector(&f, &FullFrameDetector::default()).unwrap(), 0);
    }

    #[test]
    fn degenerate_quad_keeps_session_open() {
        let mut coordinator = capturing();
        let collinear = Quadrilateral::from_tuples([(0.0, 0.0), (30.0, 0.0), (60.0, 0.0), (10.0, 40.0)]);
        let err = coordinator.capture_page(&frame(1), Some(collinear)).unwrap_err();
        assert!(matches!(err, ScanError::Geometry(GeometryError::Degenerate { .. })));
        assert_eq!(coordinator.snapshot().unwrap().state, SessionState::Open);
    }

    #[test]
    fn batch_is_stored_in_submission_order() {
        let mut coordinator = capturing();
        let bad = Quadrilateral::from_tuples([(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)]);
        let frames: Vec<BatchItem> = (1..=6u8)
            .map(|i| {
                let f = frame(i * 10);
                let quad = if i == 3 { Some(bad) } else { full(&f) };
                (f, quad)
            })
            .collect();

        let results = coordinator.capture_batch(frames).unwrap();
        assert!(results[2].is_err());
        let indices: Vec<usize> = results.iter().filter_map(|r| r.as_ref().ok().copied()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(shades(&coordinator), vec![10, 20, 40, 50, 60]);
        let snapshot = coordinator.snapshot().unwrap();
        assert!(snapshot.pages.iter().all(|p| p.status == PageStatus::Rectified));
    }

    #[test]
    fn capture_from_source_keeps_positions() {
        let mut coordinator = capturing();
        let mut source = MemoryCaptureSource::new([frame(5), frame(6)]);
        let results = coordinator
            .capture_from_source(&mut source, &FullFrameDetector::default())
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(shades(&coordinator), vec![5, 6]);
    }

    /// Replays a fixed list of frames and read failures.
    struct ScriptedSource(std::collections::VecDeque<Result<RawFrame>>);

    impl CaptureSource for ScriptedSource {
        fn next_frame(&mut self) -> Result<Option<RawFrame>> {
            self.0.pop_front().transpose()
        }
    }

    #[test]
    fn chunked_capture_keeps_positions_across_chunks() {
        let unreadable = || Err(ScanError::Image("unreadable".into()));
        let mut source = ScriptedSource(
            vec![
                Ok(frame(10)),
                unreadable(),
                unreadable(),
                Ok(frame(20)),
                Ok(frame(30)),
                unreadable(),
                Ok(frame(40)),
            ]
            .into(),
        );
        let mut coordinator = capturing();
        let results = coordinator
            .capture_in_chunks(&mut source, &FullFrameDetector::default(), 2)
            .unwrap();

        let positions: Vec<Option<usize>> = results.iter().map(|r| r.as_ref().ok().copied()).collect();
        assert_eq!(
            positions,
            vec![Some(0), None, None, Some(1), Some(2), None, Some(3)]
        );
        assert!(matches!(results[1], Err(ScanError::Image(_))));
        assert_eq!(shades(&coordinator), vec![10, 20, 30, 40]);
    }

    #[test]
    fn chunked_capture_of_an_empty_source() {
        let mut coordinator = capturing();
        let mut source = ScriptedSource(Default::default());
        let results = coordinator
            .capture_in_chunks(&mut source, &FullFrameDetector::default(), 3)
            .unwrap();
        assert!(results.is_empty());
        assert_eq!(coordinator.snapshot().unwrap().page_count(), 0);
    }

    #[test]
    fn export_failure_is_not_a_capture_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut coordinator = capturing();
        let wide = Bitmap::filled(70_000, 1, PixelFormat::Gray8, &[128]).unwrap();
        coordinator
            .session_mut()
            .unwrap()
            .add_page(wide, Quadrilateral::from_rect(0.0, 0.0, 70_000.0, 1.0))
            .unwrap();

        let err = coordinator.export_page_images(dir.path()).unwrap_err();
        assert!(matches!(err, ScanError::Export { page: 0, .. }));
        assert!(!err.is_recoverable());
        assert_eq!(coordinator.state(), CoordinatorState::Capturing);
        assert_eq!(coordinator.snapshot().unwrap().page_count(), 1);
    }

    #[test]
    fn edit_operations() {
        let mut coordinator = capturing();
        for shade in [1, 2, 3] {
            let f = frame(shade);
            coordinator.capture_page(&f, full(&f)).unwrap();
        }
        coordinator.move_page(2, 0).unwrap();
        assert_eq!(shades(&coordinator), vec![3, 1, 2]);

        let removed = coordinator.remove_page(1).unwrap();
        assert_eq!(removed.bitmap().as_bytes()[0], 1);

        let f = frame(9);
        coordinator.retake_page(0, &f, full(&f)).unwrap();
        assert_eq!(shades(&coordinator), vec![9, 2]);

        assert!(matches!(
            coordinator.retake_page(5, &f, full(&f)),
            Err(ScanError::Session(SessionError::IndexOutOfRange { index: 5, len: 2 }))
        ));
    }

    #[test]
    fn empty_finish_keeps_capturing() {
        let mut coordinator = capturing();
        assert!(matches!(
            coordinator.finish_session(Vec::new()),
            Err(ScanError::Session(SessionError::Empty))
        ));
        assert_eq!(coordinator.state(), CoordinatorState::Capturing);
    }

    #[test]
    fn finish_then_begin_again() {
        let mut coordinator = capturing();
        let f = frame(100);
        coordinator.capture_page(&f, full(&f)).unwrap();

        let mut out = Vec::new();
        let report = coordinator.finish_session(&mut out).unwrap();
        assert_eq!(report.page_count, 1);
        assert_eq!(coordinator.state(), CoordinatorState::Done);
        assert_eq!(coordinator.snapshot().unwrap().state, SessionState::Closed);
        assert!(matches!(coordinator.capture_page(&f, full(&f)), Err(ScanError::NoActiveSession)));

        let first = report.sha256;
        coordinator.begin_session().unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Capturing);
        assert!(!first.is_empty());
    }

    #[test]
    fn discard_returns_to_idle() {
        let mut coordinator = capturing();
        let f = frame(1);
        coordinator.capture_page(&f, full(&f)).unwrap();
        coordinator.discard_session().unwrap();
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert!(coordinator.session_id().is_none());
        coordinator.discard_session().unwrap();
    }

    #[test]
    fn page_limit_surfaces_as_session_error() {
        let config = ScanConfig {
            max_pages: 1,
            ..ScanConfig::default()
        };
        let mut coordinator = ScanCoordinator::new(config);
        coordinator.begin_session().unwrap();
        let f = frame(1);
        coordinator.capture_page(&f, full(&f)).unwrap();
        assert!(matches!(
            coordinator.capture_page(&f, full(&f)),
            Err(ScanError::Session(SessionError::PageLimit { limit: 1 }))
        ));
    }
}
