//! Output streams for the fetch loop
//!
//! Fetched resources go to an XML envelope: one `<resource>` element per
//! fetch, with the response body base64 encoded. Items the loop gives up on
//! go to the requeue stream in their input form so a later run can pick them
//! up again.

use crate::crawler::work_item::{InputFormat, WorkItem};
use crate::SumiError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

const ENVELOPE_OPEN: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<resources>\n";
const ENVELOPE_CLOSE: &str = "</resources>\n";

/// The outcome of one fetch, as written to the envelope
#[derive(Debug, Clone)]
pub struct FetchRecord {
    /// The URI that was requested
    pub uri: String,

    /// When the response (or failure) was observed
    pub fetched_at: DateTime<Utc>,

    /// Request line and headers as sent
    pub request: String,

    pub outcome: FetchOutcome,
}

#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The server answered, with any status
    Response {
        status: u16,
        headers: String,
        body: Vec<u8>,
    },

    /// No response was received
    Exception(String),
}

type Sink = BufWriter<Box<dyn Write + Send>>;

/// Thread-safe writer of the XML resource envelope
///
/// The opening element is written on construction and the closing element
/// on [`close`](Self::close). Writes after close fail with
/// [`SumiError::WriterClosed`].
pub struct EnvelopeWriter {
    sink: Mutex<Option<Sink>>,
    records: AtomicU64,
}

impl EnvelopeWriter {
    /// Starts an envelope on an arbitrary writer
    pub fn new(writer: Box<dyn Write + Send>) -> Result<Self, SumiError> {
        let mut sink = BufWriter::new(writer);
        sink.write_all(ENVELOPE_OPEN.as_bytes())?;
        Ok(Self {
            sink: Mutex::new(Some(sink)),
            records: AtomicU64::new(0),
        })
    }

    /// Creates (or truncates) `path` and starts an envelope in it
    pub fn create(path: &Path) -> Result<Self, SumiError> {
        let file = File::create(path).map_err(|source| SumiError::OpenFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::new(Box::new(file))
    }

    pub fn stdout() -> Result<Self, SumiError> {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Appends one resource element
    pub fn write_record(&self, record: &FetchRecord) -> Result<(), SumiError> {
        let element = render_record(record);
        let mut guard = self.lock();
        let sink = guard.as_mut().ok_or(SumiError::WriterClosed)?;
        sink.write_all(element.as_bytes())?;
        self.records.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Number of records written so far
    pub fn records(&self) -> u64 {
        self.records.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().is_none()
    }

    /// Writes the closing element and flushes; closing twice is a no-op
    pub fn close(&self) -> Result<(), SumiError> {
        let Some(mut sink) = self.lock().take() else {
            return Ok(());
        };
        sink.write_all(ENVELOPE_CLOSE.as_bytes())?;
        sink.flush()?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Option<Sink>> {
        self.sink.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn render_record(record: &FetchRecord) -> String {
    let mut out = format!(
        "<resource uri=\"{}\" fetched-at=\"{}\">\n<request>{}</request>\n",
        escape_xml(&record.uri),
        record.fetched_at.to_rfc3339(),
        escape_xml(&record.request)
    );
    match &record.outcome {
        FetchOutcome::Response {
            status,
            headers,
            body,
        } => {
            out.push_str(&format!(
                "<response status=\"{}\">{}</response>\n<body encoding=\"base64\">{}</body>\n",
                status,
                escape_xml(headers),
                BASE64.encode(body)
            ));
        }
        FetchOutcome::Exception(message) => {
            out.push_str(&format!("<exception>{}</exception>\n", escape_xml(message)));
        }
    }
    out.push_str("</resource>\n");
    out
}

/// Escapes the five XML special characters
pub fn escape_xml(text: &str) -> Cow<'_, str> {
    if !text.contains(['&', '<', '>', '"', '\'']) {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}

/// Appends items the fetch loop gave up on, one per line
///
/// A writer without a destination drops items and counts them.
pub struct RequeueWriter {
    sink: Option<Mutex<BufWriter<File>>>,
    format: InputFormat,
    written: AtomicU64,
    dropped: AtomicU64,
}

impl RequeueWriter {
    /// Opens `path` for appending, creating it if needed
    pub fn open(path: &Path, format: InputFormat) -> Result<Self, SumiError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| SumiError::OpenFile {
                path: path.display().to_string(),
                source,
            })?;
        Ok(Self {
            sink: Some(Mutex::new(BufWriter::new(file))),
            format,
            written: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn disabled(format: InputFormat) -> Self {
        Self {
            sink: None,
            format,
            written: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Writes `item` in its input form; returns whether it was written
    pub fn requeue(&self, item: &WorkItem) -> Result<bool, SumiError> {
        let Some(sink) = &self.sink else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return Ok(false);
        };
        let line = item.to_line(self.format)?;
        let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
        writeln!(sink, "{}", line)?;
        self.written.fetch_add(1, Ordering::Relaxed);
        Ok(true)
    }

    pub fn flush(&self) -> Result<(), SumiError> {
        if let Some(sink) = &self.sink {
            sink.lock().unwrap_or_else(PoisonError::into_inner).flush()?;
        }
        Ok(())
    }

    pub fn written(&self) -> u64 {
        self.written.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }
}
