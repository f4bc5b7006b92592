//! Incremental HTTP/1.x response parsing over a byte buffer
//!
//! The reader task appends whatever the socket yields to a `BytesMut` and
//! calls [`parse_response`] after every read. A response is only taken out
//! of the buffer once it is complete, so a read deadline expiring halfway
//! through a response loses nothing.

use crate::error::{Result, TransferError};
use bytes::{Bytes, BytesMut};
use hyper::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_LENGTH, ETAG, TRANSFER_ENCODING};
use hyper::StatusCode;

/// Upper bound for the status line plus headers
const MAX_HEAD_LEN: usize = 64 * 1024;

/// One complete response
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ParsedResponse {
    /// Provisional responses (1xx) do not end the exchange
    pub fn is_provisional(&self) -> bool {
        self.status.is_informational()
    }

    /// Entity tag with surrounding quotes trimmed
    pub fn etag(&self) -> Option<String> {
        self.headers
            .get(ETAG)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).trim_matches('"').to_string())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Try to take one response off the front of `buf`.
///
/// Returns `Ok(None)` when more bytes are needed. `eof` tells the parser the
/// peer closed its side, which completes responses delimited by connection
/// close and turns any other partial response into an error.
pub fn parse_response(buf: &mut BytesMut, eof: bool) -> Result<Option<ParsedResponse>> {
    let head_end = match find(buf, b"\r\n\r\n", 0) {
        Some(pos) => pos,
        None => {
            if buf.len() > MAX_HEAD_LEN {
                return Err(TransferError::malformed("response header block too large"));
            }
            if eof && !buf.is_empty() {
                return Err(TransferError::malformed("connection closed inside response header"));
            }
            return Ok(None);
        }
    };
    if head_end > MAX_HEAD_LEN {
        return Err(TransferError::malformed("response header block too large"));
    }

    let (status, headers) = parse_head(&buf[..head_end])?;
    let body_start = head_end + 4;

    let framing = body_framing(status, &headers)?;
    let (body, consumed) = match framing {
        Framing::Empty => (Bytes::new(), 0),
        Framing::Length(len) => {
            if buf.len() - body_start < len {
                if eof {
                    return Err(TransferError::malformed(format!(
                        "connection closed after {} of {} body bytes",
                        buf.len() - body_start,
                        len
                    )));
                }
                return Ok(None);
            }
            (Bytes::copy_from_slice(&buf[body_start..body_start + len]), len)
        }
        Framing::Chunked => match decode_chunked(&buf[body_start..])? {
            Some(decoded) => decoded,
            None if eof => {
                return Err(TransferError::malformed("connection closed inside chunked body"))
            }
            None => return Ok(None),
        },
        Framing::UntilClose => {
            if !eof {
                return Ok(None);
            }
            let len = buf.len() - body_start;
            (Bytes::copy_from_slice(&buf[body_start..]), len)
        }
    };

    let _ = buf.split_to(body_start + consumed);
    Ok(Some(ParsedResponse {
        status,
        headers,
        body,
    }))
}

enum Framing {
    Empty,
    Length(usize),
    Chunked,
    UntilClose,
}

fn body_framing(status: StatusCode, headers: &HeaderMap) -> Result<Framing> {
    if status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        return Ok(Framing::Empty);
    }

    let chunked = headers.get_all(TRANSFER_ENCODING).iter().any(|v| {
        String::from_utf8_lossy(v.as_bytes())
            .to_ascii_lowercase()
            .contains("chunked")
    });
    if chunked {
        return Ok(Framing::Chunked);
    }

    match headers.get(CONTENT_LENGTH) {
        Some(value) => {
            let len = std::str::from_utf8(value.as_bytes())
                .ok()
                .and_then(|s| s.trim().parse::<usize>().ok())
                .ok_or_else(|| TransferError::malformed("invalid Content-Length"))?;
            Ok(if len == 0 {
                Framing::Empty
            } else {
                Framing::Length(len)
            })
        }
        None => Ok(Framing::UntilClose),
    }
}

fn parse_head(head: &[u8]) -> Result<(StatusCode, HeaderMap)> {
    // header values may carry obs-text, so only the status line must be text
    let mut lines = split_lines(head);

    let status_line = String::from_utf8_lossy(lines.next().unwrap_or_default());
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(TransferError::malformed(format!(
            "bad status line '{}'",
            status_line
        )));
    }
    let status = parts
        .next()
        .and_then(|code| code.parse::<u16>().ok())
        .and_then(|code| StatusCode::from_u16(code).ok())
        .ok_or_else(|| TransferError::malformed(format!("bad status line '{}'", status_line)))?;

    let mut headers = HeaderMap::new();
    for line in lines {
        let colon = line.iter().position(|&b| b == b':').ok_or_else(|| {
            TransferError::malformed(format!(
                "bad header line '{}'",
                String::from_utf8_lossy(line)
            ))
        })?;
        let (name, value) = (&line[..colon], &line[colon + 1..]);
        let name = HeaderName::from_bytes(name.trim_ascii()).map_err(|_| {
            TransferError::malformed(format!(
                "bad header name '{}'",
                String::from_utf8_lossy(name)
            ))
        })?;
        let value = HeaderValue::from_bytes(value.trim_ascii())
            .map_err(|_| TransferError::malformed(format!("bad value for header '{}'", name)))?;
        headers.append(name, value);
    }

    Ok((status, headers))
}

fn split_lines(head: &[u8]) -> impl Iterator<Item = &[u8]> {
    let mut rest = Some(head);
    std::iter::from_fn(move || {
        let data = rest?;
        match find(data, b"\r\n", 0) {
            Some(end) => {
                rest = Some(&data[end + 2..]);
                Some(&data[..end])
            }
            None => {
                rest = None;
                Some(data)
            }
        }
    })
}

/// Decode a chunked body; returns the body and how many bytes it spanned
fn decode_chunked(data: &[u8]) -> Result<Option<(Bytes, usize)>> {
    let mut body = BytesMut::new();
    let mut pos = 0;

    loop {
        let line_end = match find(data, b"\r\n", pos) {
            Some(end) => end,
            None => return Ok(None),
        };
        let size_line = std::str::from_utf8(&data[pos..line_end])
            .map_err(|_| TransferError::malformed("bad chunk size line"))?;
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| TransferError::malformed(format!("bad chunk size '{}'", size_hex)))?;
        pos = line_end + 2;

        if size == 0 {
            // trailer section ends with an empty line
            loop {
                let end = match find(data, b"\r\n", pos) {
                    Some(end) => end,
                    None => return Ok(None),
                };
                let empty = end == pos;
                pos = end + 2;
                if empty {
                    return Ok(Some((body.freeze(), pos)));
                }
            }
        }

        if data.len() < pos + size + 2 {
            return Ok(None);
        }
        body.extend_from_slice(&data[pos..pos + size]);
        if &data[pos + size..pos + size + 2] != b"\r\n" {
            return Err(TransferError::malformed("chunk not terminated by CRLF"));
        }
        pos += size + 2;
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    if from >= haystack.len() {
        return None;
    }
    haystack[from..]
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|p| p + from)
}
