//! Tokio glue for `mdmerge`.
//!
//! A `Session` takes one caller at a time and re-parses its open block on every write. This crate
//! feeds it from async producers:
//!
//! - [`ChunkBatcher`] groups deltas into batches that end on a line (or blank line) boundary, so
//!   the session mostly sees whole lines. A partial trailing line stays behind until it completes,
//!   the batch overflows, or the delay runs out.
//! - [`spawn_session_actor`] owns the `Session` in one task and applies batches in arrival order.

use std::time::Duration;

use mdmerge::{BlockParser, Session, SessionError, Snapshot};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Where a batch may end without waiting for the delay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadyBoundary {
    /// After the last complete line.
    Line,
    /// After the last blank line, the point where a paragraph can be committed.
    BlankLine,
}

#[derive(Clone, Copy, Debug)]
pub struct BatchOptions {
    pub ready: ReadyBoundary,
    /// Longest time a delta waits before it is sent, boundary or not.
    pub max_delay: Duration,
    /// Pending bytes that force a batch of everything buffered.
    pub max_bytes: usize,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            ready: ReadyBoundary::Line,
            max_delay: Duration::from_millis(50),
            max_bytes: 16 * 1024,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatchCause {
    /// The batch ends on a ready boundary; any partial tail stays pending.
    Ready,
    Deadline,
    Overflow,
    /// Every sender is gone; the batch holds whatever was left.
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Batch {
    pub text: String,
    pub cause: BatchCause,
    /// Deltas received since the previous batch.
    pub deltas: usize,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchCounters {
    pub deltas: u64,
    pub batches: u64,
    pub bytes: u64,
    /// Bytes held back as a partial line when a `Ready` batch was cut.
    pub carried_bytes: u64,
}

pub struct ChunkBatcher {
    rx: mpsc::Receiver<String>,
    opts: BatchOptions,
    pending: String,
    pending_deltas: usize,
    deadline: Option<Instant>,
    /// Everything batched so far ends with a newline (or nothing was batched yet).
    at_line_start: bool,
    closed: bool,
    counters: BatchCounters,
}

impl ChunkBatcher {
    pub fn new(rx: mpsc::Receiver<String>, opts: BatchOptions) -> Self {
        Self {
            rx,
            opts,
            pending: String::new(),
            pending_deltas: 0,
            deadline: None,
            at_line_start: true,
            closed: false,
            counters: BatchCounters::default(),
        }
    }

    pub fn counters(&self) -> BatchCounters {
        self.counters
    }

    /// Next batch, or `None` once all senders are dropped and nothing is pending.
    pub async fn next_batch(&mut self) -> Option<Batch> {
        loop {
            if let Some(batch) = self.take_ready() {
                return Some(batch);
            }
            if self.closed {
                return self.take_all(BatchCause::Closed);
            }
            let received = match self.deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, self.rx.recv()).await {
                    Ok(received) => received,
                    Err(_) => return self.take_all(BatchCause::Deadline),
                },
                None => self.rx.recv().await,
            };
            match received {
                Some(delta) => self.push(&delta),
                None => self.closed = true,
            }
        }
    }

    fn push(&mut self, delta: &str) {
        if self.pending.is_empty() {
            self.deadline = Some(Instant::now() + self.opts.max_delay);
        }
        self.pending.push_str(delta);
        self.pending_deltas += 1;
        self.counters.deltas += 1;
    }

    fn take_ready(&mut self) -> Option<Batch> {
        if self.pending.len() >= self.opts.max_bytes {
            return self.take_all(BatchCause::Overflow);
        }
        let end = match self.opts.ready {
            ReadyBoundary::Line => self.pending.rfind('\n').map(|i| i + 1),
            ReadyBoundary::BlankLine => last_blank_line_end(&self.pending, self.at_line_start),
        }?;
        let rest = self.pending.split_off(end);
        self.counters.carried_bytes += rest.len() as u64;
        let text = std::mem::replace(&mut self.pending, rest);
        self.deadline = if self.pending.is_empty() {
            None
        } else {
            Some(Instant::now() + self.opts.max_delay)
        };
        Some(self.emit(text, BatchCause::Ready))
    }

    fn take_all(&mut self, cause: BatchCause) -> Option<Batch> {
        if self.pending.is_empty() {
            return None;
        }
        self.deadline = None;
        let text = std::mem::take(&mut self.pending);
        Some(self.emit(text, cause))
    }

    fn emit(&mut self, text: String, cause: BatchCause) -> Batch {
        self.at_line_start = text.ends_with('\n');
        self.counters.batches += 1;
        self.counters.bytes += text.len() as u64;
        let deltas = std::mem::take(&mut self.pending_deltas);
        trace!(?cause, bytes = text.len(), deltas, "batch ready");
        Batch {
            text,
            cause,
            deltas,
        }
    }
}

/// End of the last whitespace-only line in `text`.
///
/// The first line only counts as a whole line if the previous batch ended with a newline.
fn last_blank_line_end(text: &str, at_line_start: bool) -> Option<usize> {
    let mut line_start = 0usize;
    let mut found = None;
    for (i, _) in text.match_indices('\n') {
        let whole_line = line_start > 0 || at_line_start;
        if whole_line && text[line_start..i].trim().is_empty() {
            found = Some(i + 1);
        }
        line_start = i + 1;
    }
    found
}

/// Spawn a task that owns `session` and emits a snapshot per batch.
///
/// Batches are written in arrival order, so any number of cloned senders feed one ordered stream.
/// When every sender is dropped the session is finalized, and the final snapshot is the last item
/// before the output channel closes. A write error (the session was already finalized) is
/// forwarded and ends the task.
pub fn spawn_session_actor<P>(
    mut session: Session<P>,
    rx: mpsc::Receiver<String>,
    opts: BatchOptions,
) -> mpsc::Receiver<Result<Snapshot, SessionError>>
where
    P: BlockParser + Send + 'static,
{
    let (tx_out, rx_out) = mpsc::channel::<Result<Snapshot, SessionError>>(64);

    tokio::spawn(async move {
        let mut batcher = ChunkBatcher::new(rx, opts);
        while let Some(batch) = batcher.next_batch().await {
            let result = session.write(&batch.text);
            let failed = result.is_err();
            if tx_out.send(result).await.is_err() {
                debug!("snapshot receiver dropped; stopping session actor");
                return;
            }
            if failed {
                return;
            }
        }
        let snapshot = session.finalize(None);
        debug!(
            version = snapshot.version,
            committed = snapshot.committed.len(),
            deltas = batcher.counters().deltas,
            "session actor finalized"
        );
        let _ = tx_out.send(Ok(snapshot)).await;
    });

    rx_out
}

#[cfg(test)]
mod tests {
    use super::*;
    use mdmerge::{LineBlockParser, Seed};

    fn opts(ready: ReadyBoundary) -> BatchOptions {
        BatchOptions {
            ready,
            max_delay: Duration::from_secs(60),
            max_bytes: 1024,
        }
    }

    #[tokio::test]
    async fn line_batches_carry_the_partial_tail() {
        let (tx, rx) = mpsc::channel::<String>(8);
        let mut batcher = ChunkBatcher::new(rx, opts(ReadyBoundary::Line));

        tx.send("Hel".to_string()).await.unwrap();
        tx.send("lo\nwor".to_string()).await.unwrap();
        drop(tx);

        let first = batcher.next_batch().await.unwrap();
        assert_eq!(first.text, "Hello\n");
        assert_eq!(first.cause, BatchCause::Ready);
        assert_eq!(first.deltas, 2);

        let second = batcher.next_batch().await.unwrap();
        assert_eq!(second.text, "wor");
        assert_eq!(second.cause, BatchCause::Closed);
        assert_eq!(second.deltas, 0);

        assert!(batcher.next_batch().await.is_none());
        let counters = batcher.counters();
        assert_eq!(counters.deltas, 2);
        assert_eq!(counters.batches, 2);
        assert_eq!(counters.bytes, 9);
        assert_eq!(counters.carried_bytes, 3);
    }

    #[tokio::test]
    async fn blank_line_batches_end_where_a_paragraph_can_commit() {
        let (tx, rx) = mpsc::channel::<String>(8);
        let mut batcher = ChunkBatcher::new(rx, opts(ReadyBoundary::BlankLine));

        tx.send("para one\n".to_string()).await.unwrap();
        tx.send("still para\n".to_string()).await.unwrap();
        tx.send("\nNext".to_string()).await.unwrap();
        drop(tx);

        let first = batcher.next_batch().await.unwrap();
        assert_eq!(first.text, "para one\nstill para\n\n");
        assert_eq!(first.cause, BatchCause::Ready);

        let second = batcher.next_batch().await.unwrap();
        assert_eq!(second.text, "Next");
        assert_eq!(second.cause, BatchCause::Closed);
    }

    #[test]
    fn blank_line_needs_a_line_start() {
        assert_eq!(last_blank_line_end("\nabc", true), Some(1));
        // Without a line start the leading "\n" only finishes the previous line.
        assert_eq!(last_blank_line_end("\nabc", false), None);
        assert_eq!(last_blank_line_end("a\n  \nb\n\nc", false), Some(8));
    }

    #[tokio::test]
    async fn overflow_and_deadline_flush_everything() {
        let (tx, rx) = mpsc::channel::<String>(8);
        let mut batcher = ChunkBatcher::new(
            rx,
            BatchOptions {
                ready: ReadyBoundary::BlankLine,
                max_delay: Duration::from_millis(10),
                max_bytes: 4,
            },
        );

        tx.send("abcdef".to_string()).await.unwrap();
        let got = batcher.next_batch().await.unwrap();
        assert_eq!(got.text, "abcdef");
        assert_eq!(got.cause, BatchCause::Overflow);

        tx.send("ab".to_string()).await.unwrap();
        let got = batcher.next_batch().await.unwrap();
        assert_eq!(got.text, "ab");
        assert_eq!(got.cause, BatchCause::Deadline);
    }

    #[tokio::test]
    async fn actor_applies_batches_in_order_and_finalizes() {
        let (tx, rx) = mpsc::channel::<String>(8);
        let mut out = spawn_session_actor(Session::new(), rx, BatchOptions::default());

        let producer = tx.clone();
        producer.send("Hello\n\n".to_string()).await.unwrap();
        tx.send("World".to_string()).await.unwrap();
        drop(producer);
        drop(tx);

        let mut snapshots = Vec::new();
        while let Some(item) = out.recv().await {
            snapshots.push(item.unwrap());
        }

        let last = snapshots.last().unwrap();
        assert!(last.done);
        let raws: Vec<&str> = last.committed.iter().map(|b| &*b.raw).collect();
        assert_eq!(raws, vec!["Hello\n\n", "World"]);
        assert!(last.buffer.is_none());
        assert_eq!(snapshots.iter().filter(|s| s.done).count(), 1);
    }

    #[tokio::test]
    async fn actor_forwards_invalid_state() {
        let (tx, rx) = mpsc::channel::<String>(8);
        let session = Session::create(LineBlockParser::default(), Some(Seed::done("hello")));
        let mut out = spawn_session_actor(session, rx, BatchOptions::default());

        tx.send("world\n".to_string()).await.unwrap();
        assert_eq!(out.recv().await, Some(Err(SessionError::InvalidState)));
        assert_eq!(out.recv().await, None);
    }
}
