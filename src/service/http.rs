//! Minimal HTTP/1.1 request reading and response writing.
//!
//! One request per connection. The body length comes from `Content-Length`;
//! chunked transfer encoding is not accepted.

use std::collections::HashMap;
use std::io::{self, Read, Write};

/// Upper bound for the request line plus headers.
pub(crate) const MAX_HEADER_BYTES: usize = 8192;

#[derive(Debug, thiserror::Error)]
pub(crate) enum RequestError {
    #[error("connection closed before a complete request")]
    Incomplete,
    #[error("malformed request: {0}")]
    Malformed(String),
    #[error("request headers too large")]
    HeadersTooLarge,
    #[error("content-length required")]
    LengthRequired,
    #[error("request body of {length} bytes exceeds limit of {limit}")]
    BodyTooLarge { length: usize, limit: usize },
    #[error("unsupported transfer-encoding")]
    UnsupportedEncoding,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl RequestError {
    /// Status and error code to answer with, if the connection is still usable.
    pub(crate) fn response(&self) -> Option<(u16, &'static str)> {
        match self {
            RequestError::Incomplete | RequestError::Io(_) => None,
            RequestError::Malformed(_) => Some((400, "bad_request")),
            RequestError::HeadersTooLarge => Some((431, "headers_too_large")),
            RequestError::LengthRequired => Some((411, "length_required")),
            RequestError::BodyTooLarge { .. } => Some((413, "payload_too_large")),
            RequestError::UnsupportedEncoding => Some((501, "not_implemented")),
        }
    }
}

/// Request line and headers. The body has not been read yet.
#[derive(Debug)]
pub(crate) struct RequestHead {
    pub method: String,
    pub path: String,
    headers: HashMap<String, String>,
    /// Bytes received past the end of the header block.
    leftover: Vec<u8>,
}

impl RequestHead {
    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub(crate) fn content_length(&self) -> Result<Option<usize>, RequestError> {
        self.header("content-length")
            .map(|value| {
                value
                    .parse::<usize>()
                    .map_err(|_| RequestError::Malformed(format!("bad content-length '{value}'")))
            })
            .transpose()
    }

    pub(crate) fn expects_continue(&self) -> bool {
        self.header("expect")
            .is_some_and(|value| value.eq_ignore_ascii_case("100-continue"))
    }
}

pub(crate) fn read_head<R: Read>(reader: &mut R) -> Result<RequestHead, RequestError> {
    let mut buf = [0u8; 1024];
    let mut data = Vec::new();
    let header_end = loop {
        if let Some(pos) = find_header_end(&data) {
            break pos;
        }
        if data.len() > MAX_HEADER_BYTES {
            return Err(RequestError::HeadersTooLarge);
        }
        let n = reader.read(&mut buf)?;
        if n == 0 {
            return Err(RequestError::Incomplete);
        }
        data.extend_from_slice(&buf[..n]);
    };
    if header_end > MAX_HEADER_BYTES {
        return Err(RequestError::HeadersTooLarge);
    }

    let leftover = data.split_off(header_end + 4);
    let text = std::str::from_utf8(&data[..header_end])
        .map_err(|_| RequestError::Malformed("headers are not utf-8".into()))?;
    let mut lines = text.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let (Some(method), Some(raw_path)) = (parts.next(), parts.next()) else {
        return Err(RequestError::Malformed(format!(
            "bad request line '{request_line}'"
        )));
    };

    let mut headers = HashMap::new();
    for line in lines {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| RequestError::Malformed(format!("bad header line '{line}'")))?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    let path = raw_path.split('?').next().unwrap_or(raw_path).to_string();

    Ok(RequestHead {
        method: method.to_string(),
        path,
        headers,
        leftover,
    })
}

/// Read the body announced by `head`, refusing anything above `limit` bytes
/// before reading it.
pub(crate) fn read_body<R: Read>(
    reader: &mut R,
    head: RequestHead,
    limit: usize,
) -> Result<Vec<u8>, RequestError> {
    if head.header("transfer-encoding").is_some() {
        return Err(RequestError::UnsupportedEncoding);
    }
    let length = head.content_length()?.ok_or(RequestError::LengthRequired)?;
    if length > limit {
        return Err(RequestError::BodyTooLarge { length, limit });
    }

    let mut body = head.leftover;
    body.truncate(length);
    if body.len() < length {
        let missing = length - body.len();
        let start = body.len();
        body.resize(length, 0);
        reader.read_exact(&mut body[start..start + missing]).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                RequestError::Incomplete
            } else {
                RequestError::Io(err)
            }
        })?;
    }
    Ok(body)
}

fn find_header_end(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"\r\n\r\n")
}

pub(crate) fn write_continue<W: Write>(writer: &mut W) -> io::Result<()> {
    writer.write_all(b"HTTP/1.1 100 Continue\r\n\r\n")?;
    writer.flush()
}

pub(crate) fn write_response<W: Write>(
    writer: &mut W,
    status: u16,
    content_type: &str,
    extra_headers: &[(&str, String)],
    body: &[u8],
) -> io::Result<()> {
    let mut header = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nCache-Control: no-store\r\nConnection: close\r\n",
        reason = reason_phrase(status),
        len = body.len()
    );
    for (name, value) in extra_headers {
        header.push_str(&format!("{name}: {value}\r\n"));
    }
    header.push_str("\r\n");
    writer.write_all(header.as_bytes())?;
    writer.write_all(body)?;
    writer.flush()
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        405 => "Method Not Allowed",
        411 => "Length Required",
        413 => "Payload Too Large",
        431 => "Request Header Fields Too Large",
        501 => "Not Implemented",
        503 => "Service Unavailable",
        _ => "Internal Server Error",
    }
}
