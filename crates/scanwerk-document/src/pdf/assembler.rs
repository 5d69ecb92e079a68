// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Streaming PDF assembler — writes one JPEG image page at a time so that
// memory use is bounded by a single page, however long the document.
//
// Object layout:
//
//   1            Catalog
//   2            Pages (written by `finish`, once every kid is known)
//   3k+3..3k+5   image XObject, content stream and Page for page k
//   last         Info dictionary
//
// The cross-reference table and trailer are only written by `finish`, so an
// interrupted stream never ends in `%%EOF`.

use std::fmt::Write as _;
use std::io::{self, Write};

use chrono::{DateTime, Utc};
use scanwerk_core::config::{MAX_DPI, MIN_DPI, PageLayout, ScanConfig};
use scanwerk_core::error::PdfError;
use scanwerk_core::{Bitmap, PixelFormat, mm_to_pt};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use crate::image::processor::{MAX_JPEG_SIDE, encode_jpeg};

const CATALOG_ID: u32 = 1;
const PAGES_ID: u32 = 2;
const FIRST_PAGE_ID: u32 = 3;

/// Margin kept free on fixed paper sizes.
const PAPER_MARGIN_MM: f64 = 15.0;
/// Resolution assumed for images placed on fixed paper sizes.
const PAPER_IMAGE_DPI: f64 = 150.0;
const DEFAULT_DPI: f64 = 150.0;

/// Output settings for one document.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfOptions {
    /// JPEG quality, 1-100.
    pub jpeg_quality: u8,
    pub layout: PageLayout,
    pub title: Option<String>,
    /// Written as `/CreationDate`. Fixing it makes output reproducible.
    pub created: DateTime<Utc>,
}

impl Default for PdfOptions {
    fn default() -> Self {
        Self {
            jpeg_quality: 85,
            layout: PageLayout::default(),
            title: None,
            created: Utc::now(),
        }
    }
}

impl PdfOptions {
    pub fn from_config(config: &ScanConfig) -> Self {
        Self {
            jpeg_quality: config.jpeg_quality,
            layout: config.layout,
            title: config.title.clone(),
            created: Utc::now(),
        }
    }
}

/// Summary of a finished document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyReport {
    pub page_count: usize,
    pub bytes_written: u64,
    /// Hex SHA-256 of every byte written.
    pub sha256: String,
}

/// Counts and hashes everything passed to the inner writer.
struct CountingWriter<W> {
    inner: W,
    count: u64,
    hasher: Sha256,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Incremental writer of an image-per-page PDF.
///
/// `finish` consumes the assembler, so no page can be appended to a
/// finished document.
pub struct PdfAssembler<W: Write> {
    out: CountingWriter<W>,
    options: PdfOptions,
    /// Byte offset of each object, indexed by object number.
    offsets: Vec<Option<u64>>,
    page_ids: Vec<u32>,
    /// Reused JPEG buffer.
    scratch: Vec<u8>,
    poisoned: bool,
}

impl<W: Write> PdfAssembler<W> {
    /// Write the file header and catalog to `sink`.
    #[instrument(skip_all, fields(layout = ?options.layout, quality = options.jpeg_quality))]
    pub fn begin(sink: W, options: PdfOptions) -> Result<Self, PdfError> {
        let mut assembler = Self {
            out: CountingWriter {
                inner: sink,
                count: 0,
                hasher: Sha256::new(),
            },
            options,
            offsets: vec![None; FIRST_PAGE_ID as usize],
            page_ids: Vec::new(),
            scratch: Vec::new(),
            poisoned: false,
        };

        // The binary comment marks the file as 8-bit for transfer tools.
        assembler.emit(b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n")?;
        assembler.write_object(
            CATALOG_ID,
            format!("<< /Type /Catalog /Pages {PAGES_ID} 0 R >>").as_bytes(),
        )?;

        info!("PDF assembly started");
        Ok(assembler)
    }

    /// Pages written so far.
    pub fn page_count(&self) -> usize {
        self.page_ids.len()
    }

    /// Bytes written so far.
    pub fn bytes_written(&self) -> u64 {
        self.out.count
    }

    /// Encode `page` and write its image, content stream and page object.
    /// The bitmap is released before this returns.
    #[instrument(skip_all, fields(page = self.page_ids.len(), w = page.width(), h = page.height()))]
    pub fn append_page(&mut self, page: Bitmap) -> Result<(), PdfError> {
        let index = self.page_ids.len();
        let (w, h, format) = (page.width(), page.height(), page.format());

        if w > MAX_JPEG_SIDE || h > MAX_JPEG_SIDE {
            return Err(PdfError::EncodeFailed {
                page: index,
                reason: format!("{w}x{h} exceeds the JPEG limit of {MAX_JPEG_SIDE} pixels per side"),
            });
        }

        self.scratch.clear();
        encode_jpeg(page.as_bytes(), w, h, format, self.options.jpeg_quality, &mut self.scratch)
            .map_err(|err| PdfError::EncodeFailed {
                page: index,
                reason: err.to_string(),
            })?;
        drop(page);

        let image_id = self.next_id();
        let content_id = image_id + 1;
        let page_id = image_id + 2;

        let color_space = match format {
            PixelFormat::Gray8 => "/DeviceGray",
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => "/DeviceRGB",
        };
        let image_dict = format!(
            "<< /Type /XObject /Subtype /Image /Width {w} /Height {h} /ColorSpace {color_space} \
             /BitsPerComponent 8 /Filter /DCTDecode /Length {} >>",
            self.scratch.len()
        );
        let jpeg = std::mem::take(&mut self.scratch);
        let written = self.write_stream(image_id, &image_dict, &jpeg);
        self.scratch = jpeg;
        written?;

        let placement = place_image(w, h, &self.options.layout);
        let content = format!(
            "q {:.2} 0 0 {:.2} {:.2} {:.2} cm /Im0 Do Q\n",
            placement.draw_w, placement.draw_h, placement.x, placement.y
        );
        self.write_stream(
            content_id,
            &format!("<< /Length {} >>", content.len()),
            content.as_bytes(),
        )?;

        let page_dict = format!(
            "<< /Type /Page /Parent {PAGES_ID} 0 R /MediaBox [0 0 {:.2} {:.2}] \
             /Resources << /XObject << /Im0 {image_id} 0 R >> >> /Contents {content_id} 0 R >>",
            placement.page_w, placement.page_h
        );
        self.write_object(page_id, page_dict.as_bytes())?;
        self.page_ids.push(page_id);

        debug!(index, bytes = self.out.count, "Page written");
        Ok(())
    }

    /// Write the page tree, info dictionary, cross-reference table and
    /// trailer, then flush the sink.
    #[instrument(skip_all, fields(pages = self.page_ids.len()))]
    pub fn finish(mut self) -> Result<AssemblyReport, PdfError> {
        if self.page_ids.is_empty() {
            warn!("Finish requested with no pages");
            return Err(PdfError::NoPages);
        }

        let kids = self
            .page_ids
            .iter()
            .map(|id| format!("{id} 0 R"))
            .collect::<Vec<_>>()
            .join(" ");
        let pages_dict = format!(
            "<< /Type /Pages /Kids [{kids}] /Count {} >>",
            self.page_ids.len()
        );
        self.write_object(PAGES_ID, pages_dict.as_bytes())?;

        let info_id = self.next_id();
        let info_dict = self.info_dictionary();
        self.write_object(info_id, info_dict.as_bytes())?;

        // The document ID is derived from everything written so far.
        let doc_id = hex::encode(&self.out.hasher.clone().finalize()[..16]);

        let xref_offset = self.out.count;
        let mut xref = format!("xref\n0 {}\n0000000000 65535 f \n", self.offsets.len());
        for (id, offset) in self.offsets.iter().enumerate().skip(1) {
            let offset = offset.ok_or_else(|| {
                PdfError::Malformed(format!("object {id} was reserved but never written"))
            })?;
            let _ = writeln!(xref, "{offset:010} 00000 n ");
        }
        let _ = write!(
            xref,
            "trailer\n<< /Size {} /Root {CATALOG_ID} 0 R /Info {info_id} 0 R /ID [<{doc_id}> <{doc_id}>] >>\n\
             startxref\n{xref_offset}\n%%EOF\n",
            self.offsets.len()
        );
        self.emit(xref.as_bytes())?;
        self.out.flush().map_err(PdfError::WriteFailed)?;

        let report = AssemblyReport {
            page_count: self.page_ids.len(),
            bytes_written: self.out.count,
            sha256: hex::encode(self.out.hasher.finalize()),
        };
        info!(
            pages = report.page_count,
            bytes = report.bytes_written,
            sha256 = %report.sha256,
            "PDF assembly finished"
        );
        Ok(report)
    }

    // -- Low-level output -----------------------------------------------------

    fn next_id(&self) -> u32 {
        self.offsets.len() as u32
    }

    fn info_dictionary(&self) -> String {
        let mut dict = String::from("<< ");
        if let Some(title) = &self.options.title {
            let _ = write!(dict, "/Title {} ", utf16_hex_string(title));
        }
        let _ = write!(
            dict,
            "/Producer (Scanwerk {}) /CreationDate (D:{}Z) >>",
            env!("CARGO_PKG_VERSION"),
            self.options.created.format("%Y%m%d%H%M%S")
        );
        dict
    }

    fn write_object(&mut self, id: u32, body: &[u8]) -> Result<(), PdfError> {
        self.record_offset(id);
        self.emit(format!("{id} 0 obj\n").as_bytes())?;
        self.emit(body)?;
        self.emit(b"\nendobj\n")
    }

    fn write_stream(&mut self, id: u32, dict: &str, data: &[u8]) -> Result<(), PdfError> {
        self.record_offset(id);
        self.emit(format!("{id} 0 obj\n{dict}\nstream\n").as_bytes())?;
        self.emit(data)?;
        self.emit(b"\nendstream\nendobj\n")
    }

    fn record_offset(&mut self, id: u32) {
        let id = id as usize;
        if self.offsets.len() <= id {
            self.offsets.resize(id + 1, None);
        }
        self.offsets[id] = Some(self.out.count);
    }

    /// Write to the sink. After the first failure every later write fails
    /// too, so a broken stream is never silently continued.
    fn emit(&mut self, bytes: &[u8]) -> Result<(), PdfError> {
        if self.poisoned {
            return Err(PdfError::WriteFailed(io::Error::other(
                "output sink failed earlier in this document",
            )));
        }
        self.out.write_all(bytes).map_err(|err| {
            self.poisoned = true;
            PdfError::WriteFailed(err)
        })
    }
}

/// Stream `pages` into `sink` as one document.
pub fn assemble<W, I>(pages: I, sink: W, options: PdfOptions) -> Result<AssemblyReport, PdfError>
where
    W: Write,
    I: IntoIterator<Item = Bitmap>,
{
    let mut assembler = PdfAssembler::begin(sink, options)?;
    for page in pages {
        assembler.append_page(page)?;
    }
    assembler.finish()
}

/// Page size and image rectangle, in points.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    page_w: f64,
    page_h: f64,
    x: f64,
    y: f64,
    draw_w: f64,
    draw_h: f64,
}

fn place_image(width: u32, height: u32, layout: &PageLayout) -> Placement {
    match layout {
        PageLayout::Native { dpi } => {
            let dpi = if dpi.is_finite() && *dpi > 0.0 {
                dpi.clamp(MIN_DPI, MAX_DPI)
            } else {
                DEFAULT_DPI
            };
            let page_w = width as f64 * 72.0 / dpi;
            let page_h = height as f64 * 72.0 / dpi;
            Placement {
                page_w,
                page_h,
                x: 0.0,
                y: 0.0,
                draw_w: page_w,
                draw_h: page_h,
            }
        }
        PageLayout::Paper(paper) => {
            let (page_w, page_h) = paper.dimensions_pt();
            let margin = mm_to_pt(PAPER_MARGIN_MM);
            let avail_w = (page_w - 2.0 * margin).max(1.0);
            let avail_h = (page_h - 2.0 * margin).max(1.0);

            let native_w = width as f64 * 72.0 / PAPER_IMAGE_DPI;
            let native_h = height as f64 * 72.0 / PAPER_IMAGE_DPI;
            let scale = (avail_w / native_w).min(avail_h / native_h).min(1.0);
            let (draw_w, draw_h) = (native_w * scale, native_h * scale);

            Placement {
                page_w,
                page_h,
                x: (page_w - draw_w) / 2.0,
                y: (page_h - draw_h) / 2.0,
                draw_w,
                draw_h,
            }
        }
    }
}

/// PDF text string in UTF-16BE with a byte-order mark, hex encoded.
fn utf16_hex_string(text: &str) -> String {
    let mut bytes = vec![0xFE, 0xFF];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_be_bytes());
    }
    format!("<{}>", hex::encode_upper(bytes))
}
