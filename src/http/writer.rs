//! Status-observing response writer.
//!
//! [`ResponseWriter`] sits between the dispatcher and the transport stream.
//! The status line is finalized by the first body write, matching HTTP/1.1
//! semantics: a status set after that point is ignored and logged.

use crate::http::response::reason_phrase;
use crate::http::Response;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Writers that can report the status code that was (or will be) sent.
///
/// The provided method reports `200`, which is what a wrapper that does not
/// track status degrades to.
pub trait ObservableResponseWriter {
    fn observed_status(&self) -> u16 {
        200
    }
}

/// Status code observed on `writer`; `200` unless a tracking writer saw
/// something else.
pub fn response_status<W: ObservableResponseWriter + ?Sized>(writer: &W) -> u16 {
    writer.observed_status()
}

pub struct ResponseWriter<W> {
    inner: W,
    status: u16,
    committed: bool,
    head: bool,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl<W> ResponseWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            status: 200,
            committed: false,
            head: false,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Answers a HEAD request: no body goes on the wire and a declared
    /// `Content-Length` is sent as is.
    pub fn head_only(mut self) -> Self {
        self.head = true;
        self
    }

    /// Records the status code. Ignored once the body has started.
    pub fn write_header(&mut self, status: u16) {
        if self.committed {
            tracing::warn!(
                status,
                committed = self.status,
                "superfluous status write after body started"
            );
            return;
        }
        self.status = status;
    }

    /// Queues a header. Names or values containing CR or LF are dropped.
    pub fn header(&mut self, name: &str, value: &str) {
        if self.committed {
            tracing::warn!(header = name, "header set after body started; ignored");
            return;
        }
        let breaks_line = |text: &str| text.contains(['\r', '\n']);
        if breaks_line(name) || breaks_line(value) {
            tracing::warn!(header = ?name, "header contains a line break; dropped");
            return;
        }
        self.headers.push((name.to_string(), value.to_string()));
    }

    /// Appends body bytes, finalizing the status on the first call.
    pub fn write(&mut self, bytes: &[u8]) {
        self.committed = true;
        self.body.extend_from_slice(bytes);
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W> ObservableResponseWriter for ResponseWriter<W> {
    fn observed_status(&self) -> u16 {
        self.status
    }
}

impl<W: AsyncWrite + Unpin> ResponseWriter<W> {
    /// Copies a handler's [`Response`] into the writer and flushes it.
    pub async fn send(&mut self, response: &Response) -> io::Result<()> {
        self.write_header(response.status);
        for (name, value) in &response.headers {
            self.header(name, value);
        }
        self.write(&response.body);
        self.finish().await
    }

    /// Serializes the status line, headers and body onto the stream.
    pub async fn finish(&mut self) -> io::Result<()> {
        self.committed = true;
        let mut head = format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status));
        for (name, value) in &self.headers {
            if name.eq_ignore_ascii_case("content-length") || name.eq_ignore_ascii_case("connection") {
                continue;
            }
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        if !self.headers.iter().any(|(name, _)| name.eq_ignore_ascii_case("date")) {
            head.push_str("Date: ");
            head.push_str(&httpdate::fmt_http_date(std::time::SystemTime::now()));
            head.push_str("\r\n");
        }
        head.push_str("Connection: close\r\n");
        head.push_str(&format!("Content-Length: {}\r\n\r\n", self.content_length()));

        self.inner.write_all(head.as_bytes()).await?;
        if !self.head {
            self.inner.write_all(&self.body).await?;
        }
        self.inner.flush().await
    }

    fn content_length(&self) -> usize {
        let declared = || {
            self.headers
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                .and_then(|(_, value)| value.trim().parse().ok())
        };
        if self.head && self.body.is_empty() {
            declared().unwrap_or(0)
        } else {
            self.body.len()
        }
    }
}
