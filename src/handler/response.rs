//! Response rendering
//!
//! Writes JSON payloads, CSV exports and error envelopes onto a
//! [`ResponseSink`]. Each request is answered by exactly one of
//! [`write_json`], [`write_csv`] or [`write_error`]; the first two fall back
//! to [`write_error`] when rendering fails.

use crate::handler::csv::CsvFormatter;
use crate::model::AggregatedQueryResponse;
use axum::{
    body::{Body, Bytes},
    http::{header, HeaderMap, HeaderValue, Response, StatusCode},
    response::IntoResponse,
};
use chrono::{DateTime, Local, TimeZone};
use serde::Serialize;
use std::io;
use tokio::sync::{mpsc, oneshot};

/// Body chunks buffered between a streaming writer and the connection
const STREAM_CHANNEL_CAPACITY: usize = 16;

/// Destination of a rendered response.
///
/// Headers must be set before [`ResponseSink::write_status`]; once the status
/// is committed, later header changes and status writes have no effect.
pub trait ResponseSink {
    /// Headers that will be sent with the status line
    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Commit the status line and headers
    fn write_status(&mut self, status: StatusCode);

    /// Append body bytes, committing `200 OK` first if nothing was committed yet
    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()>;
}

fn warn_superfluous_status(committed: StatusCode, ignored: StatusCode) {
    tracing::warn!(
        committed = %committed.as_u16(),
        ignored = %ignored.as_u16(),
        "Superfluous status write, response already committed"
    );
}

/// In-memory sink that becomes an axum response
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    pending_headers: HeaderMap,
    committed: Option<(StatusCode, HeaderMap)>,
    body: Vec<u8>,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Committed status, if any
    pub fn status(&self) -> Option<StatusCode> {
        self.committed.as_ref().map(|(status, _)| *status)
    }

    /// Headers as they will be sent
    pub fn headers(&self) -> &HeaderMap {
        match &self.committed {
            Some((_, headers)) => headers,
            None => &self.pending_headers,
        }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl ResponseSink for ResponseBuffer {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.pending_headers
    }

    fn write_status(&mut self, status: StatusCode) {
        if let Some((committed, _)) = &self.committed {
            warn_superfluous_status(*committed, status);
            return;
        }
        self.committed = Some((status, self.pending_headers.clone()));
    }

    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.committed.is_none() {
            self.write_status(StatusCode::OK);
        }
        self.body.extend_from_slice(bytes);
        Ok(())
    }
}

impl IntoResponse for ResponseBuffer {
    fn into_response(self) -> axum::response::Response {
        let (status, headers) = self
            .committed
            .unwrap_or((StatusCode::OK, self.pending_headers));

        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

/// Sink forwarding each body write to a streamed response as it happens.
///
/// Writes block while the connection is behind, so it must be driven from a
/// blocking thread; see [`stream_response`].
#[derive(Debug)]
pub struct ChannelSink {
    pending_headers: HeaderMap,
    head: Option<oneshot::Sender<(StatusCode, HeaderMap)>>,
    committed: Option<StatusCode>,
    body: mpsc::Sender<Bytes>,
}

impl ResponseSink for ChannelSink {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.pending_headers
    }

    fn write_status(&mut self, status: StatusCode) {
        if let Some(committed) = self.committed {
            warn_superfluous_status(committed, status);
            return;
        }
        self.committed = Some(status);
        if let Some(head) = self.head.take() {
            // The receiver only goes away with the request itself
            let _ = head.send((status, self.pending_headers.clone()));
        }
    }

    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()> {
        if self.committed.is_none() {
            self.write_status(StatusCode::OK);
        }
        self.body
            .blocking_send(Bytes::copy_from_slice(bytes))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response stream closed"))
    }
}

/// Run `render` on a blocking thread and stream what it writes.
///
/// Resolves as soon as the status is committed; the body follows chunk by
/// chunk, framed by the server.
pub async fn stream_response<F>(render: F) -> axum::response::Response
where
    F: FnOnce(&mut ChannelSink) + Send + 'static,
{
    let (head_tx, head_rx) = oneshot::channel();
    let (body_tx, body_rx) = mpsc::channel(STREAM_CHANNEL_CAPACITY);
    let mut sink = ChannelSink {
        pending_headers: HeaderMap::new(),
        head: Some(head_tx),
        committed: None,
        body: body_tx,
    };

    tokio::task::spawn_blocking(move || render(&mut sink));

    let Ok((status, headers)) = head_rx.await else {
        tracing::error!("Response writer finished without committing a status");
        let mut buffer = ResponseBuffer::new();
        write_error(
            &mut buffer,
            StatusCode::INTERNAL_SERVER_ERROR,
            "No response was produced",
        );
        return buffer.into_response();
    };

    let chunks = futures_util::stream::unfold(body_rx, |mut rx| async move {
        rx.recv().await.map(|chunk| (Ok::<_, io::Error>(chunk), rx))
    });

    let mut response = Response::new(Body::from_stream(chunks));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// Error envelope shared by every failure path
#[derive(Debug, Serialize)]
pub struct ErrorResponse<'a> {
    #[serde(rename = "Message")]
    pub message: &'a str,
}

/// Serialize `payload` and write it with `code`.
///
/// A payload that cannot be serialized is answered with a 500 envelope
/// instead; nothing of the payload is written.
pub fn write_json<S, T>(sink: &mut S, code: StatusCode, payload: &T)
where
    S: ResponseSink + ?Sized,
    T: Serialize + ?Sized,
{
    let response = match serde_json::to_vec(payload) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Marshalling error while responding JSON");
            write_error(sink, StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
            return;
        }
    };

    sink.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    sink.write_status(code);
    if let Err(e) = sink.write_body(&response) {
        tracing::error!(error = %e, "Error while responding JSON");
    }
}

/// Name of the CSV attachment for the given time: `export-YYYY-MM-DD-HH-mm.csv`
pub fn export_filename<Tz>(at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("export-{}.csv", at.format("%Y-%m-%d-%H-%M"))
}

/// Format `result` with `formatter` and stream it as a CSV attachment.
///
/// Formatter failures produce a 500 envelope before any CSV header is set.
/// A row that fails to encode after the status was committed only appends
/// the envelope to the body; the status cannot change anymore.
pub fn write_csv<S, F>(
    sink: &mut S,
    code: StatusCode,
    formatter: &F,
    result: Option<&AggregatedQueryResponse>,
    columns: &[String],
) where
    S: ResponseSink + ?Sized,
    F: CsvFormatter + ?Sized,
{
    let data = match formatter.format(result, columns) {
        Ok(data) => data,
        Err(e) => {
            write_error(sink, StatusCode::INTERNAL_SERVER_ERROR, &e.to_string());
            return;
        }
    };
    tracing::trace!(rows = %data.len(), "CSV data ready");

    let disposition = format!("attachment; filename={}", export_filename(&Local::now()));
    let headers = sink.headers_mut();
    match HeaderValue::from_str(&disposition) {
        Ok(value) => {
            headers.insert(header::CONTENT_DISPOSITION, value);
        }
        Err(e) => tracing::error!(error = %e, "Invalid Content-Disposition header"),
    }
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/csv"));
    headers.insert(
        header::TRANSFER_ENCODING,
        HeaderValue::from_static("chunked"),
    );
    sink.write_status(code);

    let failed_row = {
        let mut writer = ::csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(SinkWriter(&mut *sink));
        let failed_row = data.iter().find(|row| match writer.write_record(*row) {
            Ok(()) => false,
            Err(e) => {
                tracing::error!(error = %e, row = ?row, "Cannot write CSV row");
                true
            }
        });
        if failed_row.is_none() {
            if let Err(e) = writer.flush() {
                tracing::error!(error = %e, "Error while flushing CSV");
            }
        }
        failed_row
    };

    if let Some(row) = failed_row {
        write_error(
            sink,
            StatusCode::INTERNAL_SERVER_ERROR,
            &format!("Cannot write row {:?}", row),
        );
    }
}

/// Write the `{"Message": ...}` envelope with `code`
pub fn write_error<S>(sink: &mut S, code: StatusCode, message: &str)
where
    S: ResponseSink + ?Sized,
{
    let mut code = code;
    let response = match serde_json::to_vec(&ErrorResponse { message }) {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(
                error = %e,
                message = %message,
                "Marshalling error while responding an error"
            );
            code = StatusCode::INTERNAL_SERVER_ERROR;
            Vec::new()
        }
    };

    sink.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    sink.write_status(code);
    if let Err(e) = sink.write_body(&response) {
        tracing::error!(error = %e, message = %message, "Error while responding an error");
    }
}

/// `io::Write` adapter feeding the CSV encoder into a sink
struct SinkWriter<'a, S: ?Sized>(&'a mut S);

impl<S: ResponseSink + ?Sized> io::Write for SinkWriter<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write_body(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
