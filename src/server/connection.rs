use crate::app::Application;
use crate::error::ServerError;
use crate::http::{response_status, Body, Method, Request, Response, ResponseWriter};
use std::collections::HashMap;
use std::io::{Error, ErrorKind};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::time::timeout;

const MAX_HEADERS: usize = 100;
const MAX_LINE_BYTES: u64 = 8 * 1024;

/// Per-connection limits, copied out of the config at listener start.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Limits {
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_body_bytes: usize,
}

/// Serves exactly one request on `stream`.
pub(crate) async fn serve<S>(
    app: &Application,
    mut stream: S,
    peer: SocketAddr,
    limits: Limits,
) -> Result<(), Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let parsed = {
        let mut reader = BufReader::new(&mut stream);
        match timeout(limits.read_timeout, read_request(&mut reader, limits.max_body_bytes)).await
        {
            Ok(parsed) => parsed,
            Err(_) => {
                tracing::debug!(peer = %peer, "read timed out");
                return Ok(());
            }
        }
    };

    let head = matches!(&parsed, Ok(Some(request)) if request.method == Method::HEAD);
    let response = match parsed {
        Ok(Some(request)) => app.dispatch(request).await,
        Ok(None) => return Ok(()),
        Err(ServerError::IoError(err)) => return Err(err),
        Err(err) => {
            tracing::debug!(peer = %peer, error = %err, "rejected request");
            Response::error(err)
        }
    };

    let mut writer = ResponseWriter::new(&mut stream);
    if head {
        writer = writer.head_only();
    }
    match timeout(limits.write_timeout, writer.send(&response)).await {
        Ok(result) => result?,
        Err(_) => return Err(Error::new(ErrorKind::TimedOut, "write timed out")),
    }
    tracing::trace!(peer = %peer, status = response_status(&writer), "response written");
    // Sends FIN, or close_notify on TLS.
    timeout(limits.write_timeout, stream.shutdown())
        .await
        .unwrap_or(Ok(()))
}

/// Reads one request head and body. `Ok(None)` means the peer closed the
/// connection before sending anything.
pub(crate) async fn read_request<R>(
    reader: &mut R,
    max_body_bytes: usize,
) -> Result<Option<Request>, ServerError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::new();
    if read_line(reader, &mut line).await? == 0 {
        return Ok(None);
    }
    let request_line = std::str::from_utf8(&line)
        .map_err(|_| ServerError::BadRequest("request line is not valid UTF-8".into()))?;

    let mut parts = request_line.split_whitespace();
    let (method, target) = match (parts.next(), parts.next()) {
        (Some(method), Some(target)) => (method, target),
        _ => return Err(ServerError::BadRequest("malformed request line".into())),
    };
    let method: Method = method
        .parse()
        .map_err(|err| ServerError::BadRequest(format!("{err}")))?;
    if !target.starts_with('/') {
        return Err(ServerError::BadRequest(format!("unsupported request target {target:?}")));
    }
    let mut request = Request::from_target(method, target);

    let mut headers = HashMap::new();
    loop {
        if read_line(reader, &mut line).await? == 0 {
            return Err(ServerError::BadRequest("connection closed inside headers".into()));
        }
        // Header values are opaque bytes; anything that is not UTF-8 is
        // replaced rather than rejected.
        let decoded = String::from_utf8_lossy(&line);
        let text = decoded.trim();
        if text.is_empty() {
            break;
        }
        if headers.len() == MAX_HEADERS {
            return Err(ServerError::BadRequest("too many headers".into()));
        }
        match text.split_once(':') {
            Some((key, value)) => {
                headers.insert(key.trim().to_lowercase(), value.trim().to_string());
            }
            None => return Err(ServerError::BadRequest(format!("malformed header {text:?}"))),
        }
    }

    let length = match headers.get("content-length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| ServerError::BadRequest(format!("invalid content-length {value:?}")))?,
        None => 0,
    };
    if length > max_body_bytes {
        return Err(ServerError::PayloadTooLarge(length));
    }
    let mut data = Vec::with_capacity(length);
    (&mut *reader).take(length as u64).read_to_end(&mut data).await?;
    if data.len() < length {
        return Err(ServerError::BadRequest("body shorter than content-length".into()));
    }

    request.body = Body::from_bytes(data);
    request.body.content_type = headers.get("content-type").cloned();
    request.headers = headers;
    Ok(Some(request))
}

/// Reads one `\n`-terminated line into `buf`, replacing its contents.
/// A line that reaches [`MAX_LINE_BYTES`] without a terminator is refused.
async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> Result<usize, ServerError>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let read = (&mut *reader).take(MAX_LINE_BYTES).read_until(b'\n', buf).await?;
    if read as u64 == MAX_LINE_BYTES && buf.last() != Some(&b'\n') {
        return Err(ServerError::HeaderTooLarge(MAX_LINE_BYTES as usize));
    }
    Ok(read)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(raw: &str, limit: usize) -> Result<Option<Request>, ServerError> {
        parse_bytes(raw.as_bytes(), limit).await
    }

    async fn parse_bytes(raw: &[u8], limit: usize) -> Result<Option<Request>, ServerError> {
        let mut reader = BufReader::new(raw);
        read_request(&mut reader, limit).await
    }

    #[tokio::test]
    async fn parses_head_query_and_body() {
        let raw = "POST /users/7?tag=a%20b&x=1 HTTP/1.1\r\nHost: local\r\nContent-Type: application/json\r\nContent-Length: 9\r\n\r\n{\"n\": 1}\n";
        let req = parse(raw, 1024).await.unwrap().unwrap();
        assert_eq!(req.method, Method::POST);
        assert_eq!(req.path, "/users/7");
        assert_eq!(req.get_query("tag"), Some("a b"));
        assert_eq!(req.get_header("Host"), Some("local"));
        assert_eq!(req.body.content_type(), Some("application/json"));
        assert_eq!(req.body.len(), 9);
    }

    #[tokio::test]
    async fn empty_stream_yields_nothing() {
        assert!(parse("", 1024).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_method_is_bad_request() {
        let err = parse("BREW /pot HTTP/1.1\r\n\r\n", 1024).await.unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn oversized_body_is_refused_before_reading() {
        let err = parse("POST / HTTP/1.1\r\nContent-Length: 4096\r\n\r\n", 16)
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::PayloadTooLarge(4096)));
    }

    #[tokio::test]
    async fn truncated_body_is_bad_request() {
        let err = parse("POST / HTTP/1.1\r\nContent-Length: 10\r\n\r\nabc", 1024)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn non_utf8_request_line_is_bad_request() {
        let err = parse_bytes(b"GET /\xff\xfe HTTP/1.1\r\n\r\n", 1024)
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[tokio::test]
    async fn non_utf8_header_value_is_decoded_lossily() {
        let req = parse_bytes(b"GET /health HTTP/1.1\r\nX-Name: caf\xe9\r\n\r\n", 1024)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(req.get_header("x-name"), Some("caf\u{fffd}"));
    }

    #[tokio::test]
    async fn unterminated_long_line_is_refused() {
        let mut raw = b"GET / HTTP/1.1\r\nX-Long: ".to_vec();
        raw.resize(raw.len() + MAX_LINE_BYTES as usize, b'a');
        let err = parse_bytes(&raw, 1024).await.unwrap_err();
        assert!(matches!(err, ServerError::HeaderTooLarge(_)));
        assert_eq!(err.status_code(), 431);

        let long_target = format!("GET /{} HTTP/1.1\r\n\r\n", "a".repeat(MAX_LINE_BYTES as usize));
        let err = parse(&long_target, 1024).await.unwrap_err();
        assert_eq!(err.status_code(), 431);
    }

    #[tokio::test]
    async fn line_just_under_the_cap_is_accepted() {
        let prefix = "GET / HTTP/1.1\r\nX-Fill: ";
        let fill = MAX_LINE_BYTES as usize - "X-Fill: ".len() - 2;
        let raw = format!("{prefix}{}\r\n\r\n", "b".repeat(fill));
        let req = parse(&raw, 1024).await.unwrap().unwrap();
        assert_eq!(req.get_header("x-fill").map(str::len), Some(fill));
    }
}
