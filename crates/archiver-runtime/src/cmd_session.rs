//! `archiver session`: one client session driven over stdio.
//!
//! UI events arrive as JSON lines on stdin (see [`UiEvent`]); surface
//! operations leave as JSON lines on stdout. A host page script sits on
//! the other end of both pipes.

use std::io::Write;

use archiver_core::{FileRecord, InputView};
use archiver_relay::{ClientSession, Surface, UiEvent, UnixConnector};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

pub async fn cmd_session(socket_path: &str) -> anyhow::Result<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    let reader = tokio::spawn(read_events(tx));

    let surface = JsonLinesSurface::new(std::io::stdout());
    let mut session = ClientSession::new(UnixConnector::new(socket_path), surface);
    if !session.connect().await {
        tracing::warn!(socket = socket_path, "relay not reachable yet, will retry on demand");
    }
    let session = session.run(rx).await;

    if session.pending_requests() > 0 {
        tracing::warn!(
            pending = session.pending_requests(),
            "input closed with unanswered requests"
        );
    }
    reader.abort();
    Ok(())
}

async fn read_events(tx: mpsc::UnboundedSender<UiEvent>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<UiEvent>(&line) {
                    Ok(event) => {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("ignoring malformed UI event: {e}"),
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("stdin read error: {e}");
                break;
            }
        }
    }
}

// ─── Surface ──────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum SurfaceOp<'a> {
    Bind {
        hash: &'a str,
        index: usize,
        filename: &'a str,
        state: &'static str,
        #[serde(flatten)]
        view: &'a InputView,
    },
    Update {
        hash: &'a str,
        #[serde(flatten)]
        view: &'a InputView,
    },
    Suggest {
        hash: &'a str,
        suggestion: &'a str,
    },
    Fill {
        hash: &'a str,
        text: &'a str,
    },
    Focus {
        hash: &'a str,
    },
}

#[derive(Serialize)]
struct Stamped<'a> {
    at: DateTime<Utc>,
    #[serde(flatten)]
    op: SurfaceOp<'a>,
}

/// Writes each surface operation as one JSON line.
pub struct JsonLinesSurface<W> {
    out: W,
}

impl<W: Write + Send> JsonLinesSurface<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, op: SurfaceOp<'_>) {
        let line = Stamped { at: Utc::now(), op };
        let written = serde_json::to_writer(&mut self.out, &line)
            .map_err(std::io::Error::from)
            .and_then(|()| self.out.write_all(b"\n"))
            .and_then(|()| self.out.flush());
        if let Err(e) = written {
            tracing::warn!("failed to write surface op: {e}");
        }
    }
}

impl<W: Write + Send> Surface for JsonLinesSurface<W> {
    fn bind(&mut self, record: &FileRecord, view: &InputView) {
        self.emit(SurfaceOp::Bind {
            hash: &record.hash,
            index: record.index,
            filename: &record.current_filename,
            state: record.state.label(),
            view,
        });
    }

    fn update(&mut self, hash: &str, view: &InputView) {
        self.emit(SurfaceOp::Update { hash, view });
    }

    fn suggest(&mut self, hash: &str, suggestion: &str) {
        self.emit(SurfaceOp::Suggest { hash, suggestion });
    }

    fn fill(&mut self, hash: &str, text: &str) {
        self.emit(SurfaceOp::Fill { hash, text });
    }

    fn focus(&mut self, hash: &str) {
        self.emit(SurfaceOp::Focus { hash });
    }
}

// ─── Tests ────────────────────────────────────────────────────────
