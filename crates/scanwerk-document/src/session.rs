// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Page session — the ordered, in-memory set of rectified pages for one
// scanning interaction.
//
// A session is single-writer: every mutating method takes `&mut self`, so
// the owning coordinator is the only code path that can change it.
// Observers get `SessionSnapshot` copies.

use chrono::{DateTime, Utc};
use scanwerk_core::error::SessionError;
use scanwerk_core::{
    Bitmap, PageStatus, PageSummary, Quadrilateral, SessionId, SessionSnapshot, SessionState,
};
use tracing::{debug, info, instrument, warn};

/// One rectified page held by a session.
#[derive(Debug, Clone)]
pub struct Page {
    index: usize,
    bitmap: Bitmap,
    source_quad: Quadrilateral,
    status: PageStatus,
}

impl Page {
    /// Position in the session, always contiguous from zero.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub fn source_quad(&self) -> &Quadrilateral {
        &self.source_quad
    }

    pub fn status(&self) -> PageStatus {
        self.status
    }

    /// Release the page, returning its bitmap.
    pub fn into_bitmap(self) -> Bitmap {
        self.bitmap
    }

    fn summary(&self) -> PageSummary {
        PageSummary {
            index: self.index,
            width: self.bitmap.width(),
            height: self.bitmap.height(),
            format: self.bitmap.format(),
            status: self.status,
            source_quad: self.source_quad,
        }
    }
}

/// Ordered collection of rectified pages with an explicit lifecycle:
/// `Open -> Finalizing -> Closed`, or `Open -> Discarded`.
#[derive(Debug)]
pub struct PageSession {
    id: SessionId,
    state: SessionState,
    pages: Vec<Page>,
    /// 0 means unlimited.
    max_pages: usize,
    version: u64,
    created_at: DateTime<Utc>,
}

impl PageSession {
    /// Open a new, empty session. `max_pages == 0` means unlimited.
    pub fn new(max_pages: usize) -> Self {
        let id = SessionId::new();
        info!(session = %id, max_pages, "Session opened");
        Self {
            id,
            state: SessionState::Open,
            pages: Vec::new(),
            max_pages,
            version: 0,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    /// Mutation counter; changes whenever pages or state change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Borrow a page for read-only inspection by the owner.
    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    // -- Mutation -------------------------------------------------------------

    /// Append a rectified page and return its index.
    #[instrument(skip(self, bitmap, source_quad), fields(session = %self.id))]
    pub fn add_page(&mut self, bitmap: Bitmap, source_quad: Quadrilateral) -> Result<usize, SessionError> {
        self.ensure_open()?;
        if self.max_pages > 0 && self.pages.len() >= self.max_pages {
            return Err(SessionError::PageLimit {
                limit: self.max_pages,
            });
        }

        let index = self.pages.len();
        debug!(index, width = bitmap.width(), height = bitmap.height(), "Page added");
        self.pages.push(Page {
            index,
            bitmap,
            source_quad,
            status: PageStatus::Rectified,
        });
        self.touch();
        Ok(index)
    }

    /// Move the page at `from` so it ends up at position `to`.
    #[instrument(skip(self), fields(session = %self.id))]
    pub fn move_page(&mut self, from: usize, to: usize) -> Result<(), SessionError> {
        self.ensure_open()?;
        self.check_index(from)?;
        self.check_index(to)?;

        if from != to {
            let page = self.pages.remove(from);
            self.pages.insert(to, page);
            self.renumber();
        }
        self.touch();
        debug!(from, to, "Page moved");
        Ok(())
    }

    /// Remove the page at `index`, renumbering the rest. The returned page
    /// is no longer owned by the session.
    #[instrument(skip(self), fields(session = %self.id))]
    pub fn remove_page(&mut self, index: usize) -> Result<Page, SessionError> {
        self.ensure_open()?;
        self.check_index(index)?;

        let mut removed = self.pages.remove(index);
        self.renumber();
        self.touch();
        removed.index = 0;
        debug!(index, remaining = self.pages.len(), "Page removed");
        Ok(removed)
    }

    /// Replace the page at `index` in place (retake). Returns the old page.
    #[instrument(skip(self, bitmap, source_quad), fields(session = %self.id))]
    pub fn replace_page(
        &mut self,
        index: usize,
        bitmap: Bitmap,
        source_quad: Quadrilateral,
    ) -> Result<Page, SessionError> {
        self.ensure_open()?;
        self.check_index(index)?;

        let replacement = Page {
            index,
            bitmap,
            source_quad,
            status: PageStatus::Rectified,
        };
        let old = std::mem::replace(&mut self.pages[index], replacement);
        self.touch();
        debug!(index, "Page replaced");
        Ok(old)
    }

    /// Hand the ordered page bitmaps over for assembly and close the session.
    ///
    /// An empty session stays `Open` and fails with [`SessionError::Empty`].
    #[instrument(skip(self), fields(session = %self.id))]
    pub fn finalize(&mut self) -> Result<Vec<Bitmap>, SessionError> {
        self.ensure_open()?;
        if self.pages.is_empty() {
            warn!("Finalize requested on an empty session");
            return Err(SessionError::Empty);
        }

        self.state = SessionState::Finalizing;
        let bitmaps: Vec<Bitmap> = std::mem::take(&mut self.pages)
            .into_iter()
            .map(Page::into_bitmap)
            .collect();
        self.state = SessionState::Closed;
        self.touch();

        info!(pages = bitmaps.len(), "Session finalized");
        Ok(bitmaps)
    }

    /// Abandon the session and release every page. Discarding twice is a
    /// no-op; a closed session cannot be discarded.
    #[instrument(skip(self), fields(session = %self.id))]
    pub fn discard(&mut self) -> Result<(), SessionError> {
        match self.state {
            SessionState::Discarded => Ok(()),
            SessionState::Open => {
                let released = self.pages.len();
                self.pages.clear();
                self.pages.shrink_to_fit();
                self.state = SessionState::Discarded;
                self.touch();
                info!(released, "Session discarded");
                Ok(())
            }
            state => Err(SessionError::Closed { state }),
        }
    }

    // -- Observation ----------------------------------------------------------

    /// Copy of the current page metadata and state.
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            state: self.state,
            version: self.version,
            pages: self.pages.iter().map(Page::summary).collect(),
            created_at: self.created_at,
            taken_at: Utc::now(),
        }
    }

    /// Owned copy of one page's bitmap, for previews.
    pub fn page_preview(&self, index: usize) -> Result<Bitmap, SessionError> {
        self.check_index(index)?;
        Ok(self.pages[index].bitmap.clone())
    }

    // -- Helpers --------------------------------------------------------------

    fn ensure_open(&self) -> Result<(), SessionError> {
        if self.state == SessionState::Open {
            Ok(())
        } else {
            Err(SessionError::Closed { state: self.state })
        }
    }

    fn check_index(&self, index: usize) -> Result<(), SessionError> {
        if index < self.pages.len() {
            Ok(())
        } else {
            Err(SessionError::IndexOutOfRange {
                index,
                len: self.pages.len(),
            })
        }
    }

    fn renumber(&mut self) {
        for (i, page) in self.pages.iter_mut().enumerate() {
            page.index = i;
        }
    }

    fn touch(&mut self) {
        self.version += 1;
    }
}
