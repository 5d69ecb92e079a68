// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// PDF reader — inspection of scan output with `lopdf`, plus a byte-level
// check that a file was written to the end.

use std::path::Path;

use lopdf::{Dictionary, Document, Object};
use scanwerk_core::error::PdfError;
use tracing::{debug, info, instrument};

/// How far from the end of the file `startxref` may appear.
const TRAILER_WINDOW: usize = 1024;

/// The image drawn on one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    /// Zero-based page position.
    pub page: usize,
    pub width: u32,
    pub height: u32,
    /// Stream filter, e.g. `DCTDecode`.
    pub filter: Option<String>,
    pub color_space: Option<String>,
}

/// Read-only view of an existing PDF.
pub struct PdfReader {
    document: Document,
    /// Source path, if opened from a file.
    source_path: Option<String>,
}

impl PdfReader {
    // -- Construction ---------------------------------------------------------

    /// Open a PDF from the filesystem.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PdfError> {
        let path_ref = path.as_ref();
        let document = Document::load(path_ref).map_err(|err| {
            PdfError::Malformed(format!("failed to open {}: {}", path_ref.display(), err))
        })?;

        info!(pages = document.get_pages().len(), "PDF opened");
        Ok(Self {
            document,
            source_path: Some(path_ref.display().to_string()),
        })
    }

    /// Parse a PDF already in memory.
    #[instrument(skip_all, fields(bytes_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, PdfError> {
        let document = Document::load_mem(data)
            .map_err(|err| PdfError::Malformed(format!("failed to load PDF from memory: {}", err)))?;

        debug!(pages = document.get_pages().len(), "PDF loaded from bytes");
        Ok(Self {
            document,
            source_path: None,
        })
    }

    // -- Inspection -----------------------------------------------------------

    pub fn page_count(&self) -> usize {
        self.document.get_pages().len()
    }

    pub fn source_path(&self) -> Option<&str> {
        self.source_path.as_deref()
    }

    /// Title from the information dictionary, if any.
    pub fn title(&self) -> Option<String> {
        let info = self.document.trailer.get(b"Info").ok()?;
        let (_, info) = self.document.dereference(info).ok()?;
        let title = info.as_dict().ok()?.get(b"Title").ok()?;
        match title {
            Object::String(bytes, _) => Some(decode_text_string(bytes)),
            _ => None,
        }
    }

    /// The image XObjects of every page, in page order.
    pub fn page_images(&self) -> Result<Vec<PageImage>, PdfError> {
        let mut images = Vec::new();
        // `get_pages` is keyed by 1-based page number, so iteration is in order.
        for (position, (_, page_id)) in self.document.get_pages().into_iter().enumerate() {
            let page = self
                .document
                .get_dictionary(page_id)
                .map_err(|err| PdfError::Malformed(format!("page {position}: {err}")))?;

            let xobjects = match self.resolve_dict(page, b"Resources")? {
                Some(resources) => self.resolve_dict(resources, b"XObject")?,
                None => None,
            };
            let Some(xobjects) = xobjects else {
                continue;
            };

            for (_, value) in xobjects.iter() {
                let (_, object) = self
                    .document
                    .dereference(value)
                    .map_err(|err| PdfError::Malformed(format!("page {position}: {err}")))?;
                let Ok(stream) = object.as_stream() else {
                    continue;
                };
                let dict = &stream.dict;
                if name(dict, b"Subtype").as_deref() != Some("Image") {
                    continue;
                }
                images.push(PageImage {
                    page: position,
                    width: integer(dict, b"Width")?,
                    height: integer(dict, b"Height")?,
                    filter: name(dict, b"Filter"),
                    color_space: name(dict, b"ColorSpace"),
                });
            }
        }
        Ok(images)
    }

    fn resolve_dict<'a>(&'a self, dict: &'a Dictionary, key: &[u8]) -> Result<Option<&'a Dictionary>, PdfError> {
        let Ok(value) = dict.get(key) else {
            return Ok(None);
        };
        let (_, object) = self
            .document
            .dereference(value)
            .map_err(|err| PdfError::Malformed(err.to_string()))?;
        object
            .as_dict()
            .map(Some)
            .map_err(|err| PdfError::Malformed(format!("/{} is not a dictionary: {err}", String::from_utf8_lossy(key))))
    }
}

fn name(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key).ok()? {
        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
        _ => None,
    }
}

fn integer(dict: &Dictionary, key: &[u8]) -> Result<u32, PdfError> {
    dict.get(key)
        .ok()
        .and_then(|v| v.as_i64().ok())
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| PdfError::Malformed(format!("image has no valid /{}", String::from_utf8_lossy(key))))
}

/// Decode a PDF text string: UTF-16BE with a byte-order mark, otherwise
/// treated as Latin-1.
fn decode_text_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|&b| b as char).collect(),
    }
}

// -- Completeness ---------------------------------------------------------------

/// Whether `bytes` ends with a trailer: `startxref` near the end followed by
/// `%%EOF`. A stream cut off mid-write fails this check.
pub fn is_complete(bytes: &[u8]) -> bool {
    let trimmed = trim_trailing_whitespace(bytes);
    if !trimmed.ends_with(b"%%EOF") {
        return false;
    }
    let window = &trimmed[trimmed.len().saturating_sub(TRAILER_WINDOW)..];
    find_last(window, b"startxref").is_some()
}

/// Follow `startxref` to the cross-reference table and check that every
/// in-use entry points at the start of its object. Returns the number of
/// objects checked.
pub fn verify_xref(bytes: &[u8]) -> Result<usize, PdfError> {
    if !is_complete(bytes) {
        return Err(PdfError::Malformed("missing trailer or %%EOF".into()));
    }

    let start = find_last(bytes, b"startxref")
        .ok_or_else(|| PdfError::Malformed("missing startxref".into()))?;
    let offset: usize = ascii(&bytes[start + b"startxref".len()..])?
        .split_whitespace()
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| PdfError::Malformed("startxref has no offset".into()))?;

    let table = bytes
        .get(offset..)
        .filter(|rest| rest.starts_with(b"xref"))
        .ok_or_else(|| PdfError::Malformed(format!("no xref table at offset {offset}")))?;
    let table = ascii(table)?;

    let mut lines = table.lines().skip(1);
    let header = lines
        .next()
        .ok_or_else(|| PdfError::Malformed("empty xref table".into()))?;
    let mut fields = header.split_whitespace().map(str::parse::<usize>);
    let (Some(Ok(first)), Some(Ok(count))) = (fields.next(), fields.next()) else {
        return Err(PdfError::Malformed(format!("bad xref subsection header {header:?}")));
    };

    let mut checked = 0;
    for (i, entry) in lines.take(count).enumerate() {
        let parts: Vec<&str> = entry.split_whitespace().collect();
        let [offset, _generation, kind] = parts[..] else {
            return Err(PdfError::Malformed(format!("bad xref entry {entry:?}")));
        };
        if kind != "n" {
            continue;
        }
        let id = first + i;
        let at: usize = offset
            .parse()
            .map_err(|_| PdfError::Malformed(format!("bad offset in xref entry {entry:?}")))?;
        let expected = format!("{id} 0 obj");
        if !bytes.get(at..).is_some_and(|rest| rest.starts_with(expected.as_bytes())) {
            return Err(PdfError::Malformed(format!(
                "xref entry for object {id} points at offset {at}, which is not its start"
            )));
        }
        checked += 1;
    }
    Ok(checked)
}

/// The ASCII prefix of `bytes`, up to the first non-ASCII byte.
fn ascii(bytes: &[u8]) -> Result<&str, PdfError> {
    let end = bytes.iter().position(|b| !b.is_ascii()).unwrap_or(bytes.len());
    std::str::from_utf8(&bytes[..end]).map_err(|err| PdfError::Malformed(err.to_string()))
}

fn trim_trailing_whitespace(bytes: &[u8]) -> &[u8] {
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &bytes[..end]
}

fn find_last(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).rposition(|w| w == needle)
}
