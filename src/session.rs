use std::borrow::Cow;

use tracing::debug;

use crate::error::SessionError;
use crate::merge::{MergeInput, MergeState, merge, merge_append};
use crate::options::Options;
use crate::parser::{BlockParser, LineBlockParser};
use crate::snapshot::Snapshot;

/// Initial text for [`Session::create`] and [`Session::reset`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seed {
    pub value: String,
    pub done: bool,
}

impl Seed {
    pub fn streaming(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            done: false,
        }
    }

    pub fn done(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            done: true,
        }
    }
}

/// A stateful wrapper around [`merge`] for append-only streams.
///
/// The session owns the running text and the current [`MergeState`]; every operation returns a
/// [`Snapshot`] for the consumer.
///
/// ```
/// use mdmerge::Session;
///
/// let mut session = Session::new();
/// let snap = session.write("Hello world\n\nSecond").unwrap();
/// assert_eq!(snap.committed.len(), 1);
/// assert_eq!(&*snap.buffer.unwrap().raw, "Second");
///
/// let snap = session.finalize(None);
/// assert_eq!(snap.committed.len(), 2);
/// assert!(snap.buffer.is_none());
/// ```
#[derive(Debug)]
pub struct Session<P = LineBlockParser> {
    parser: P,
    opts: Options,
    state: MergeState,
    /// The last accepted chunk ended in `\r`; the next chunk decides if it was CRLF.
    pending_cr: bool,
}

impl Default for Session<LineBlockParser> {
    fn default() -> Self {
        Self::new()
    }
}

impl Session<LineBlockParser> {
    pub fn new() -> Self {
        let opts = Options::default();
        Self::with_options(LineBlockParser::from_options(&opts), opts, None)
    }
}

impl<P: BlockParser> Session<P> {
    pub fn create(parser: P, seed: Option<Seed>) -> Self {
        Self::with_options(parser, Options::default(), seed)
    }

    pub fn with_options(parser: P, opts: Options, seed: Option<Seed>) -> Self {
        let mut session = Self {
            parser,
            opts,
            state: MergeState::empty(),
            pending_cr: false,
        };
        if let Some(seed) = seed {
            let (text, done) = session.seed_text(seed);
            session.state = merge(&session.parser, None, MergeInput { text: &text, done });
        }
        session
    }

    /// Append `chunk` to the running text and merge.
    ///
    /// Fails with [`SessionError::InvalidState`] once the session is finalized.
    pub fn write(&mut self, chunk: &str) -> Result<Snapshot, SessionError> {
        if self.state.is_done() {
            debug!(chunk_len = chunk.len(), "write rejected: session is finalized");
            return Err(SessionError::InvalidState);
        }
        if chunk.is_empty() {
            return Ok(self.snapshot());
        }
        let chunk = self.normalize_newlines(chunk);
        if chunk.is_empty() {
            // A lone '\r' held back for the next chunk.
            return Ok(self.snapshot());
        }

        let state = std::mem::take(&mut self.state);
        self.state = merge_append(&self.parser, state, &chunk, false);
        Ok(self.snapshot())
    }

    /// Mark the stream complete, optionally appending a final chunk, and commit everything.
    ///
    /// Calling this again on a finalized session returns the same snapshot.
    pub fn finalize(&mut self, extra: Option<&str>) -> Snapshot {
        if self.state.is_done() {
            return self.snapshot();
        }
        let mut tail = match extra {
            Some(extra) => self.normalize_newlines(extra).into_owned(),
            None => String::new(),
        };
        if std::mem::take(&mut self.pending_cr) {
            tail.push('\n');
        }
        let state = std::mem::take(&mut self.state);
        self.state = merge_append(&self.parser, state, &tail, true);
        self.snapshot()
    }

    /// Discard all text and blocks, optionally starting over from `seed`.
    ///
    /// A seed is parsed from scratch exactly as in [`Session::create`]. The version is the previous
    /// version plus one so consumers can tell snapshots apart; block ids start over.
    pub fn reset(&mut self, seed: Option<Seed>) -> Snapshot {
        let version = self.state.version() + 1;
        self.pending_cr = false;
        self.state = match seed {
            None => MergeState::empty_at_version(version),
            Some(seed) => {
                let (text, done) = self.seed_text(seed);
                merge(&self.parser, None, MergeInput { text: &text, done }).with_version(version)
            }
        };
        debug!(version = self.state.version(), "session reset");
        self.snapshot()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }

    /// The running text after newline normalization.
    pub fn text(&self) -> &str {
        self.state.text()
    }

    pub fn is_done(&self) -> bool {
        self.state.is_done()
    }

    pub fn state(&self) -> &MergeState {
        &self.state
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    pub fn options(&self) -> &Options {
        &self.opts
    }

    fn seed_text(&mut self, seed: Seed) -> (String, bool) {
        let mut text = self.normalize_newlines(&seed.value).into_owned();
        if seed.done && std::mem::take(&mut self.pending_cr) {
            text.push('\n');
        }
        (text, seed.done)
    }

    fn normalize_newlines<'a>(&mut self, chunk: &'a str) -> Cow<'a, str> {
        if !self.opts.normalize_newlines || (!chunk.contains('\r') && !self.pending_cr) {
            return Cow::Borrowed(chunk);
        }

        let mut out = String::with_capacity(chunk.len() + 1);
        let mut chars = chunk.chars().peekable();

        if self.pending_cr && chars.peek().is_some() {
            if chars.peek() == Some(&'\n') {
                chars.next();
            }
            out.push('\n');
            self.pending_cr = false;
        }

        while let Some(c) = chars.next() {
            if c != '\r' {
                out.push(c);
                continue;
            }
            if chars.peek() == Some(&'\n') {
                chars.next();
                out.push('\n');
                continue;
            }
            if chars.peek().is_none() {
                self.pending_cr = true;
                continue;
            }
            out.push('\n');
        }

        Cow::Owned(out)
    }
}
