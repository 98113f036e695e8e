//! Incremental HTTP/1.1 parser.
//!
//! Bytes are fed in via [`RequestParser::push`]/[`ResponseParser::push`] as
//! they arrive off the transport; each call advances the state machine as
//! far as the buffered prefix allows and returns a completed message, if
//! one became available. Left-over bytes (the start of a pipelined
//! message) stay buffered for the next call.

use bytes::{Buf, BytesMut};

use crate::error::HttpError;
use crate::http::message::{Headers, HttpRequest, HttpResponse, Method, Version};

const MAX_START_LINE: usize = 8 * 1024;
const MAX_HEADER_BLOCK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    StartLine,
    Headers,
    Body,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyMode {
    None,
    ContentLength(usize),
    Chunked,
    ReadUntilClose,
}

/// Finds the index just past the first `\r\n` in `buf`, if any.
fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n").map(|i| i + 2)
}

/// Finds the end of the whole header block (the blank terminator line),
/// without consuming anything — called repeatedly as bytes trickle in, so
/// it must be idempotent and must not mutate `headers` until the block is
/// known to be complete (otherwise a line seen in an earlier, incomplete
/// call gets inserted again on every subsequent call).
fn find_header_block_end(buf: &[u8]) -> Option<usize> {
    let mut cursor = 0;
    loop {
        let line_end = find_crlf(&buf[cursor..])?;
        if line_end == 2 {
            return Some(cursor + line_end);
        }
        cursor += line_end;
    }
}

/// Consumes the header block once it is fully buffered, returns
/// `Some(bytes_consumed)` after inserting every line exactly once.
fn consume_header_lines(headers: &mut Headers, buf: &[u8]) -> Result<Option<usize>, HttpError> {
    let Some(block_end) = find_header_block_end(buf) else {
        return Ok(None);
    };
    let mut cursor = 0;
    while cursor < block_end {
        let line_end = find_crlf(&buf[cursor..]).expect("block_end guarantees this line ends");
        let line = &buf[cursor..cursor + line_end - 2];
        cursor += line_end;
        if line.is_empty() {
            break;
        }
        let line = std::str::from_utf8(line).map_err(|_| {
            HttpError::MalformedHeader(String::from_utf8_lossy(line).into_owned())
        })?;
        let Some(colon) = line.find(':') else {
            return Err(HttpError::MalformedHeader(line.to_string()));
        };
        let (key, value) = line.split_at(colon);
        headers.insert(key, &value[1..]);
    }
    Ok(Some(block_end))
}

fn body_mode_from_headers(headers: &Headers, default_to_close: bool) -> Result<BodyMode, HttpError> {
    if let Some(te) = headers.get("transfer-encoding") {
        if te.eq_ignore_ascii_case("chunked") {
            return Ok(BodyMode::Chunked);
        }
    }
    if let Some(len) = headers.get("content-length") {
        let n: usize = len
            .trim()
            .parse()
            .map_err(|_| HttpError::BadContentLength(len))?;
        return Ok(BodyMode::ContentLength(n));
    }
    if default_to_close {
        Ok(BodyMode::ReadUntilClose)
    } else {
        Ok(BodyMode::None)
    }
}

/// Consumes one RFC 7230 §4.1 chunk sequence. Returns `Some(bytes_consumed)`
/// once the terminating zero-length chunk and its trailing CRLF have both
/// been seen; appends decoded chunk data to `out`.
fn consume_chunks(buf: &[u8], out: &mut Vec<u8>) -> Result<Option<usize>, HttpError> {
    let mut cursor = 0;
    loop {
        let Some(size_line_end) = find_crlf(&buf[cursor..]) else {
            return Ok(None);
        };
        let size_line = &buf[cursor..cursor + size_line_end - 2];
        let size_str = std::str::from_utf8(size_line)
            .ok()
            .and_then(|s| s.split(';').next())
            .unwrap_or("");
        let size = usize::from_str_radix(size_str.trim(), 16)
            .map_err(|_| HttpError::BadContentLength(String::from_utf8_lossy(size_line).into_owned()))?;
        let chunk_start = cursor + size_line_end;
        if size == 0 {
            // Trailers (if any) followed by the final CRLF; the documented
            // subset here is "no trailers", so just require the blank line.
            let Some(term) = find_crlf(&buf[chunk_start..]) else {
                return Ok(None);
            };
            return Ok(Some(chunk_start + term));
        }
        let chunk_end = chunk_start + size;
        if buf.len() < chunk_end + 2 {
            return Ok(None);
        }
        out.extend_from_slice(&buf[chunk_start..chunk_end]);
        cursor = chunk_end + 2; // skip trailing CRLF after chunk data
    }
}

/// Streaming parser for `HttpRequest`s, one per connection.
pub struct RequestParser {
    buf: BytesMut,
    phase: Phase,
    partial: HttpRequest,
    body_mode: BodyMode,
    body_acc: Vec<u8>,
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            phase: Phase::StartLine,
            partial: HttpRequest::new(Method::Get, ""),
            body_mode: BodyMode::None,
            body_acc: Vec::new(),
        }
    }

    /// Appends bytes read off the transport and advances the state
    /// machine as far as possible, returning a completed request if one
    /// became available. Idempotent w.r.t. chunking: feeding `B` in any
    /// partition yields the same sequence of completed requests as
    /// feeding `B` whole.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Option<HttpRequest>, HttpError> {
        self.buf.extend_from_slice(bytes);
        loop {
            match self.phase {
                Phase::StartLine => {
                    if self.buf.len() > MAX_START_LINE && find_crlf(&self.buf).is_none() {
                        return Err(HttpError::BadStartLine);
                    }
                    let Some(end) = find_crlf(&self.buf) else {
                        return Ok(None);
                    };
                    let line = self.buf.split_to(end);
                    let line = &line[..line.len() - 2];
                    let text = std::str::from_utf8(line).map_err(|_| HttpError::BadStartLine)?;
                    let mut parts = text.split(' ').filter(|s| !s.is_empty());
                    let (Some(method), Some(url), Some(version)) =
                        (parts.next(), parts.next(), parts.next())
                    else {
                        return Err(HttpError::BadStartLine);
                    };
                    let method = Method::parse(method)
                        .ok_or_else(|| HttpError::UnknownMethod(method.to_string()))?;
                    let version = Version::parse(version)
                        .ok_or_else(|| HttpError::UnsupportedVersion(version.to_string()))?;
                    self.partial = HttpRequest {
                        method,
                        url: url.to_string(),
                        version,
                        headers: Headers::new(),
                        body: Vec::new(),
                    };
                    self.phase = Phase::Headers;
                }
                Phase::Headers => {
                    let Some(consumed) = consume_header_lines(&mut self.partial.headers, &self.buf)?
                    else {
                        if self.buf.len() > MAX_HEADER_BLOCK {
                            return Err(HttpError::MalformedHeader("header block too large".into()));
                        }
                        return Ok(None);
                    };
                    self.buf.advance(consumed);
                    self.body_mode = body_mode_from_headers(&self.partial.headers, false)?;
                    self.phase = Phase::Body;
                    self.body_acc.clear();
                }
                Phase::Body => match self.body_mode {
                    BodyMode::None => {
                        self.phase = Phase::Done;
                    }
                    BodyMode::ContentLength(n) => {
                        if self.buf.len() < n {
                            return Ok(None);
                        }
                        self.body_acc = self.buf.split_to(n).to_vec();
                        self.phase = Phase::Done;
                    }
                    BodyMode::Chunked => {
                        let Some(consumed) = consume_chunks(&self.buf, &mut self.body_acc)? else {
                            return Ok(None);
                        };
                        self.buf.advance(consumed);
                        self.phase = Phase::Done;
                    }
                    BodyMode::ReadUntilClose => {
                        // Requests never read-until-close; treated as empty body.
                        self.phase = Phase::Done;
                    }
                },
                Phase::Done => {
                    let mut finished = std::mem::replace(
                        &mut self.partial,
                        HttpRequest::new(Method::Get, ""),
                    );
                    finished.body = std::mem::take(&mut self.body_acc);
                    self.phase = Phase::StartLine;
                    return Ok(Some(finished));
                }
            }
        }
    }

    /// Signals that the transport reached EOF; returns an error if a
    /// message was left truncated mid-body.
    pub fn finish_on_eof(&self) -> Result<(), HttpError> {
        match self.phase {
            Phase::StartLine if self.buf.is_empty() => Ok(()),
            Phase::Body | Phase::StartLine | Phase::Headers => Err(HttpError::TruncatedBody),
            Phase::Done => Ok(()),
        }
    }
}

/// Streaming parser for `HttpResponse`s. Same state machine as
/// [`RequestParser`] with start-line semantics swapped (status line
/// instead of request line), needed so the client side can read back
/// a server's response the same incremental way the server reads requests.
pub struct ResponseParser {
    buf: BytesMut,
    phase: Phase,
    partial: HttpResponse,
    body_mode: BodyMode,
    body_acc: Vec<u8>,
    /// Requests for which this parses a response never have a body by
    /// HTTP semantics (e.g. HEAD); set by the caller before `push`.
    pub no_body_expected: bool,
}

impl Default for ResponseParser {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseParser {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            phase: Phase::StartLine,
            partial: HttpResponse::with_code(0),
            body_mode: BodyMode::None,
            body_acc: Vec::new(),
            no_body_expected: false,
        }
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<Option<HttpResponse>, HttpError> {
        self.buf.extend_from_slice(bytes);
        loop {
            match self.phase {
                Phase::StartLine => {
                    let Some(end) = find_crlf(&self.buf) else {
                        return Ok(None);
                    };
                    let line = self.buf.split_to(end);
                    let line = &line[..line.len() - 2];
                    let text = std::str::from_utf8(line).map_err(|_| HttpError::BadStartLine)?;
                    let mut parts = text.splitn(3, ' ');
                    let (Some(version), Some(status), reason) =
                        (parts.next(), parts.next(), parts.next().unwrap_or(""))
                    else {
                        return Err(HttpError::BadStartLine);
                    };
                    let version = Version::parse(version)
                        .ok_or_else(|| HttpError::UnsupportedVersion(version.to_string()))?;
                    let status: u16 = status
                        .parse()
                        .map_err(|_| HttpError::BadStartLine)?;
                    self.partial = HttpResponse {
                        version,
                        status,
                        reason: reason.to_string(),
                        headers: Headers::new(),
                        body: Vec::new(),
                    };
                    self.phase = Phase::Headers;
                }
                Phase::Headers => {
                    let Some(consumed) = consume_header_lines(&mut self.partial.headers, &self.buf)?
                    else {
                        return Ok(None);
                    };
                    self.buf.advance(consumed);
                    self.body_mode = if self.no_body_expected {
                        BodyMode::None
                    } else {
                        body_mode_from_headers(&self.partial.headers, true)?
                    };
                    self.phase = Phase::Body;
                    self.body_acc.clear();
                }
                Phase::Body => match self.body_mode {
                    BodyMode::None => {
                        self.phase = Phase::Done;
                    }
                    BodyMode::ContentLength(n) => {
                        if self.buf.len() < n {
                            return Ok(None);
                        }
                        self.body_acc = self.buf.split_to(n).to_vec();
                        self.phase = Phase::Done;
                    }
                    BodyMode::Chunked => {
                        let Some(consumed) = consume_chunks(&self.buf, &mut self.body_acc)? else {
                            return Ok(None);
                        };
                        self.buf.advance(consumed);
                        self.phase = Phase::Done;
                    }
                    BodyMode::ReadUntilClose => {
                        // Stays pending until `finish_on_eof` is called;
                        // drain whatever arrived so far into the body.
                        self.body_acc.extend_from_slice(&self.buf);
                        self.buf.clear();
                        return Ok(None);
                    }
                },
                Phase::Done => {
                    let mut finished =
                        std::mem::replace(&mut self.partial, HttpResponse::with_code(0));
                    finished.body = std::mem::take(&mut self.body_acc);
                    self.phase = Phase::StartLine;
                    return Ok(Some(finished));
                }
            }
        }
    }

    /// EOF on a read-until-close body completes the response.
    pub fn finish_on_eof(&mut self) -> Result<Option<HttpResponse>, HttpError> {
        match (self.phase, self.body_mode) {
            (Phase::Body, BodyMode::ReadUntilClose) => {
                let mut finished =
                    std::mem::replace(&mut self.partial, HttpResponse::with_code(0));
                finished.body = std::mem::take(&mut self.body_acc);
                self.phase = Phase::StartLine;
                Ok(Some(finished))
            }
            (Phase::StartLine, _) if self.buf.is_empty() => Ok(None),
            (Phase::Done, _) => Ok(None),
            _ => Err(HttpError::TruncatedBody),
        }
    }
}
