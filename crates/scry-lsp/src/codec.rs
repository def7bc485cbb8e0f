//! JSON-RPC framing over stdio.
//!
//! `Content-Length: <n>\r\n\r\n<body>`. `Content-Type` is accepted and
//! ignored; any other header is a hard error. A desynchronized input
//! stream cannot be recovered, so the caller terminates the process.

use std::io::{BufRead, Read, Write};

pub type Result<T> = std::result::Result<T, ProtocolError>;

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing Content-Length header")]
    MissingContentLength,

    #[error("invalid Content-Length value: {0:?}")]
    InvalidContentLength(String),

    #[error("unknown header field: {0:?}")]
    UnknownHeader(String),

    #[error("truncated message body: expected {expected} bytes, got {got}")]
    TruncatedBody { expected: usize, got: usize },
}

/// Reads one framed message body. Returns `None` on a clean EOF before any
/// header byte.
pub fn read_message(reader: &mut impl BufRead) -> Result<Option<String>> {
    let mut content_length: Option<usize> = None;
    let mut saw_any_header = false;

    loop {
        let mut line = String::new();
        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            if saw_any_header {
                return Err(ProtocolError::MissingContentLength);
            }
            return Ok(None);
        }

        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            break;
        }
        saw_any_header = true;

        match line.split_once(':') {
            Some((name, value)) if name.eq_ignore_ascii_case("Content-Length") => {
                let value = value.trim();
                content_length = Some(
                    value
                        .parse::<usize>()
                        .map_err(|_| ProtocolError::InvalidContentLength(value.to_string()))?,
                );
            }
            Some((name, _)) if name.eq_ignore_ascii_case("Content-Type") => {}
            _ => return Err(ProtocolError::UnknownHeader(line.to_string())),
        }
    }

    let expected = content_length.ok_or(ProtocolError::MissingContentLength)?;
    let mut buf = vec![0u8; expected];
    let mut got = 0;
    while got < expected {
        let n = reader.read(&mut buf[got..])?;
        if n == 0 {
            return Err(ProtocolError::TruncatedBody { expected, got });
        }
        got += n;
    }

    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| ProtocolError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "message body is not UTF-8",
        )))
}

/// Writes one framed message.
pub fn write_message(writer: &mut impl Write, body: &str) -> std::io::Result<()> {
    write!(writer, "Content-Length: {}\r\n\r\n", body.len())?;
    writer.write_all(body.as_bytes())?;
    writer.flush()
}
