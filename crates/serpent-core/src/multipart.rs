//! Streaming `multipart/form-data` boundary scanner.
//!
//! The scanner is fed arbitrary chunks of a request body and emits events as
//! soon as they can be decided: a part's headers, slices of its payload, the
//! end of the part, and the end of the body. Payload bytes are only released
//! once they provably cannot belong to the `CRLF--boundary` delimiter that
//! closes the part, so a delimiter split across chunks is never leaked into
//! file contents.
//!
//! ```
//! use serpent_core::multipart::{MultipartScanner, ScanEvent};
//!
//! let body = b"--XyZ\r\n\
//!     Content-Disposition: form-data; name=\"file\"; filename=\"a.txt\"\r\n\
//!     \r\n\
//!     hello\r\n\
//!     --XyZ--\r\n";
//!
//! let mut scanner = MultipartScanner::new("XyZ");
//! scanner.push(body);
//!
//! let mut payload = Vec::new();
//! while let Some(event) = scanner.next_event().unwrap() {
//!     if let ScanEvent::Data(bytes) = event {
//!         payload.extend_from_slice(&bytes);
//!     }
//! }
//! scanner.finish().unwrap();
//! assert_eq!(payload, b"hello");
//! ```

use bytes::{Buf, Bytes, BytesMut};
use thiserror::Error;

/// Largest accepted header block of a single part.
pub const MAX_HEADER_BYTES: usize = 8 * 1024;

/// Longest boundary allowed by RFC 2046.
pub const MAX_BOUNDARY_LEN: usize = 70;

/// Multipart framing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MultipartError {
    /// Media type is not `multipart/form-data`.
    #[error("expected multipart/form-data, got '{0}'")]
    NotMultipart(String),
    /// Content type carries no `boundary=` parameter.
    #[error("boundary parameter missing from content type")]
    MissingBoundary,
    /// Boundary is empty or longer than 70 bytes.
    #[error("boundary must be 1 to {MAX_BOUNDARY_LEN} bytes, got {0}")]
    InvalidBoundary(usize),
    /// Body never contained the opening delimiter.
    #[error("opening boundary delimiter not found")]
    MissingDelimiter,
    /// A delimiter was followed by something other than CRLF or `--`.
    #[error("malformed boundary delimiter line")]
    MalformedDelimiter,
    /// Part header block exceeds `MAX_HEADER_BYTES`.
    #[error("part headers exceed {MAX_HEADER_BYTES} bytes")]
    HeadersTooLarge,
    /// A header line has no `name: value` shape.
    #[error("malformed part header line: {0}")]
    MalformedHeader(String),
    /// Part has no `Content-Disposition` header.
    #[error("part is missing a content-disposition header")]
    MissingDisposition,
    /// Body ended before the closing delimiter.
    #[error("body ended before the closing boundary")]
    UnexpectedEof,
}

/// Headers of a single part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartHeaders {
    /// Form field name from `Content-Disposition`
    pub name: Option<String>,
    /// Client-supplied filename from `Content-Disposition`
    pub filename: Option<String>,
    /// Declared media type of the part
    pub content_type: Option<String>,
}

/// Event produced by the scanner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanEvent {
    /// A new part begins.
    PartStart(PartHeaders),
    /// A slice of the current part's payload.
    Data(Bytes),
    /// The current part is complete.
    PartEnd,
    /// The closing delimiter was reached; the epilogue is ignored.
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Preamble,
    Delimiter,
    Headers,
    Body,
    Finished,
}

/// Incremental multipart scanner.
#[derive(Debug)]
pub struct MultipartScanner {
    delimiter: Vec<u8>,
    buffer: BytesMut,
    state: State,
}

impl MultipartScanner {
    /// Creates a scanner for the given boundary (without leading dashes).
    pub fn new(boundary: &str) -> Self {
        let mut delimiter = Vec::with_capacity(boundary.len() + 4);
        delimiter.extend_from_slice(b"\r\n--");
        delimiter.extend_from_slice(boundary.as_bytes());

        // The opening delimiter has no leading CRLF; seeding one lets every
        // delimiter match the same pattern.
        let mut buffer = BytesMut::with_capacity(8 * 1024);
        buffer.extend_from_slice(b"\r\n");

        Self { delimiter, buffer, state: State::Preamble }
    }

    /// Feeds the next chunk of the body.
    pub fn push(&mut self, chunk: &[u8]) {
        if self.state != State::Finished {
            self.buffer.extend_from_slice(chunk);
        }
    }

    /// Returns whether the closing delimiter has been seen.
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// Returns the next event, or `None` when more input is needed or the
    /// scan has finished.
    ///
    /// # Errors
    ///
    /// Returns a `MultipartError` as soon as the framing is known to be
    /// invalid. The scanner must not be used after an error.
    pub fn next_event(&mut self) -> Result<Option<ScanEvent>, MultipartError> {
        loop {
            match self.state {
                State::Preamble => match find(&self.buffer, &self.delimiter) {
                    Some(pos) => {
                        self.buffer.advance(pos + self.delimiter.len());
                        self.state = State::Delimiter;
                    },
                    None => {
                        let keep = self.delimiter.len() - 1;
                        if self.buffer.len() > keep {
                            let discard = self.buffer.len() - keep;
                            self.buffer.advance(discard);
                        }
                        return Ok(None);
                    },
                },
                State::Delimiter => {
                    if self.buffer.len() < 2 {
                        return Ok(None);
                    }
                    if self.buffer.starts_with(b"--") {
                        self.buffer.clear();
                        self.state = State::Finished;
                        return Ok(Some(ScanEvent::End));
                    }
                    // RFC 2046 permits trailing whitespace after a delimiter.
                    let padding =
                        self.buffer.iter().take_while(|b| **b == b' ' || **b == b'\t').count();
                    if padding > MAX_HEADER_BYTES {
                        return Err(MultipartError::MalformedDelimiter);
                    }
                    if self.buffer.len() < padding + 2 {
                        return Ok(None);
                    }
                    if &self.buffer[padding..padding + 2] != b"\r\n" {
                        return Err(MultipartError::MalformedDelimiter);
                    }
                    self.buffer.advance(padding + 2);
                    self.state = State::Headers;
                },
                State::Headers => {
                    if self.buffer.starts_with(b"\r\n") {
                        return Err(MultipartError::MissingDisposition);
                    }
                    let Some(end) = find(&self.buffer, b"\r\n\r\n") else {
                        if self.buffer.len() > MAX_HEADER_BYTES {
                            return Err(MultipartError::HeadersTooLarge);
                        }
                        return Ok(None);
                    };
                    if end > MAX_HEADER_BYTES {
                        return Err(MultipartError::HeadersTooLarge);
                    }
                    let block = self.buffer.split_to(end);
                    self.buffer.advance(4);
                    let headers = parse_part_headers(&block)?;
                    self.state = State::Body;
                    return Ok(Some(ScanEvent::PartStart(headers)));
                },
                State::Body => {
                    return match find(&self.buffer, &self.delimiter) {
                        Some(0) => {
                            self.buffer.advance(self.delimiter.len());
                            self.state = State::Delimiter;
                            Ok(Some(ScanEvent::PartEnd))
                        },
                        Some(pos) => Ok(Some(ScanEvent::Data(self.buffer.split_to(pos).freeze()))),
                        None => {
                            let safe = self.buffer.len().saturating_sub(self.delimiter.len() - 1);
                            if safe == 0 {
                                Ok(None)
                            } else {
                                Ok(Some(ScanEvent::Data(self.buffer.split_to(safe).freeze())))
                            }
                        },
                    };
                },
                State::Finished => return Ok(None),
            }
        }
    }

    /// Confirms that the input ended after the closing delimiter.
    ///
    /// # Errors
    ///
    /// Returns `MissingDelimiter` if no part was ever opened and
    /// `UnexpectedEof` if the body was truncated.
    pub fn finish(&self) -> Result<(), MultipartError> {
        match self.state {
            State::Finished => Ok(()),
            State::Preamble => Err(MultipartError::MissingDelimiter),
            State::Delimiter | State::Headers | State::Body => Err(MultipartError::UnexpectedEof),
        }
    }
}

/// Extracts the boundary from a `Content-Type` header value.
///
/// # Errors
///
/// Returns `NotMultipart` for other media types, `MissingBoundary` when the
/// parameter is absent and `InvalidBoundary` for an empty or over-long value.
pub fn boundary_from_content_type(content_type: &str) -> Result<String, MultipartError> {
    let mut params = split_params(content_type).into_iter();
    let media_type = params.next().unwrap_or_default();
    if !media_type.trim().eq_ignore_ascii_case("multipart/form-data") {
        return Err(MultipartError::NotMultipart(media_type.trim().to_string()));
    }

    for param in params {
        let Some((key, value)) = param.split_once('=') else { continue };
        if key.trim().eq_ignore_ascii_case("boundary") {
            let boundary = unquote(value.trim());
            if boundary.is_empty() || boundary.len() > MAX_BOUNDARY_LEN {
                return Err(MultipartError::InvalidBoundary(boundary.len()));
            }
            return Ok(boundary);
        }
    }

    Err(MultipartError::MissingBoundary)
}

fn parse_part_headers(block: &[u8]) -> Result<PartHeaders, MultipartError> {
    let text = std::str::from_utf8(block).map_err(|e| {
        MultipartError::MalformedHeader(format!(
            "header block is not UTF-8: {}",
            String::from_utf8_lossy(&block[..e.valid_up_to()])
        ))
    })?;
    let mut headers = PartHeaders::default();
    let mut has_disposition = false;

    for line in text.split("\r\n") {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| MultipartError::MalformedHeader(line.to_string()))?;
        let name = name.trim();

        if name.eq_ignore_ascii_case("content-disposition") {
            has_disposition = true;
            parse_disposition(value, &mut headers);
        } else if name.eq_ignore_ascii_case("content-type") {
            headers.content_type = Some(value.trim().to_string());
        }
    }

    if !has_disposition {
        return Err(MultipartError::MissingDisposition);
    }
    Ok(headers)
}

fn parse_disposition(value: &str, headers: &mut PartHeaders) {
    let mut extended_filename = None;

    for param in split_params(value).into_iter().skip(1) {
        let Some((key, raw)) = param.split_once('=') else { continue };
        let key = key.trim();
        let raw = raw.trim();

        if key.eq_ignore_ascii_case("name") {
            headers.name = Some(unquote(raw));
        } else if key.eq_ignore_ascii_case("filename") {
            headers.filename = Some(unquote(raw));
        } else if key.eq_ignore_ascii_case("filename*") {
            extended_filename = decode_ext_value(raw);
        }
    }

    // RFC 6266: the extended form wins when both are present.
    if extended_filename.is_some() {
        headers.filename = extended_filename;
    }
}

/// Decodes an RFC 5987 `charset'lang'percent-encoded` value.
fn decode_ext_value(raw: &str) -> Option<String> {
    let mut pieces = raw.splitn(3, '\'');
    let charset = pieces.next()?;
    let _language = pieces.next()?;
    let encoded = pieces.next()?;
    if !charset.eq_ignore_ascii_case("utf-8") {
        return None;
    }
    urlencoding::decode(encoded).ok().map(|s| s.into_owned())
}

/// Splits on `;` outside of quoted strings.
fn split_params(value: &str) -> Vec<String> {
    let mut params = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in value.chars() {
        match c {
            _ if escaped => {
                current.push(c);
                escaped = false;
            },
            '\\' if in_quotes => {
                current.push(c);
                escaped = true;
            },
            '"' => {
                current.push(c);
                in_quotes = !in_quotes;
            },
            ';' if !in_quotes => params.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    params.push(current);
    params
}

fn unquote(value: &str) -> String {
    let Some(inner) = value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) else {
        return value.to_string();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|window| window == needle)
}
