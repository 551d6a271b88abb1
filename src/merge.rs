use std::sync::Arc;

use tracing::debug;

use crate::parser::{BlockParser, parse_span};
use crate::promotion::partition;
use crate::snapshot::Snapshot;
use crate::types::{Block, BlockId, ParsedBlock};

/// Engine state: the running text plus its committed/buffered partition.
///
/// Only [`merge`] produces new states; callers read them. A clone keeps the identity of the
/// committed sequence, which is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeState {
    text: String,
    cursor: usize,
    version: u64,
    committed: Arc<[Block]>,
    buffer: Option<Block>,
    done: bool,
    next_id: u64,
}

impl Default for MergeState {
    fn default() -> Self {
        Self::empty()
    }
}

impl MergeState {
    pub fn empty() -> Self {
        Self::empty_at_version(0)
    }

    /// An empty state whose version continues from an earlier lineage.
    pub(crate) fn empty_at_version(version: u64) -> Self {
        Self {
            text: String::new(),
            cursor: 0,
            version,
            committed: Arc::from(Vec::new()),
            buffer: None,
            done: false,
            next_id: 1,
        }
    }

    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Bytes of the running text accounted for by committed blocks and the buffer block's start.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn committed(&self) -> &[Block] {
        &self.committed
    }

    pub fn buffer(&self) -> Option<&Block> {
        self.buffer.as_ref()
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            committed: Arc::clone(&self.committed),
            buffer: self.buffer.clone(),
            version: self.version,
            cursor: self.cursor,
            done: self.done,
        }
    }
}

/// New input for [`merge`]: the full running text, not a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeInput<'a> {
    pub text: &'a str,
    pub done: bool,
}

impl<'a> MergeInput<'a> {
    pub fn streaming(text: &'a str) -> Self {
        Self { text, done: false }
    }

    pub fn done(text: &'a str) -> Self {
        Self { text, done: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStrategy {
    /// Same text and completion flag: return the previous state untouched.
    NoOp,
    /// The new text extends the previous one: re-parse only from the cursor.
    Extend,
    /// Cold start, or the text changed behind the cursor: re-parse everything.
    Rebuild,
}

pub fn classify(previous: Option<&MergeState>, input: &MergeInput<'_>) -> MergeStrategy {
    let Some(prev) = previous else {
        return MergeStrategy::Rebuild;
    };
    if input.text == prev.text && (input.done == prev.done || prev.done) {
        return MergeStrategy::NoOp;
    }
    if input.text.starts_with(prev.text.as_str()) {
        return MergeStrategy::Extend;
    }
    MergeStrategy::Rebuild
}

/// Fold `input` into `previous`, returning the next state.
///
/// - No-op inputs return a clone of `previous` (same committed sequence identity).
/// - Extensions parse `input.text[cursor..]`, append the promoted blocks to the committed
///   sequence, and replace the buffer block.
/// - Anything else re-parses the whole text and starts a new committed sequence with a bumped
///   version.
///
/// Parser failures never escape: a failed span yields no blocks.
pub fn merge<P>(parser: &P, previous: Option<&MergeState>, input: MergeInput<'_>) -> MergeState
where
    P: BlockParser + ?Sized,
{
    let strategy = classify(previous, &input);
    let next = match (strategy, previous) {
        (MergeStrategy::NoOp, Some(prev)) => prev.clone(),
        (MergeStrategy::Extend, Some(prev)) => {
            let mut next = MergeState {
                text: input.text.to_owned(),
                cursor: prev.cursor,
                version: prev.version,
                committed: Arc::clone(&prev.committed),
                buffer: prev.buffer.clone(),
                done: prev.done,
                next_id: prev.next_id,
            };
            advance(parser, &mut next, input.done || prev.done);
            next
        }
        (_, previous) => rebuild(parser, previous, input),
    };
    log_merge(strategy, &next);
    next
}

/// Append `chunk` to the running text of `state` in place and merge.
///
/// Same result as [`merge`] with `prev.text + chunk`, without copying the text that is already
/// there. Appending is always a no-op or an extension, never a rebuild.
pub(crate) fn merge_append<P>(
    parser: &P,
    mut state: MergeState,
    chunk: &str,
    done: bool,
) -> MergeState
where
    P: BlockParser + ?Sized,
{
    if chunk.is_empty() && (done == state.done || state.done) {
        log_merge(MergeStrategy::NoOp, &state);
        return state;
    }
    state.text.push_str(chunk);
    let finalize = done || state.done;
    advance(parser, &mut state, finalize);
    log_merge(MergeStrategy::Extend, &state);
    state
}

fn log_merge(strategy: MergeStrategy, next: &MergeState) {
    debug!(
        ?strategy,
        text_len = next.text.len(),
        cursor = next.cursor,
        committed = next.committed.len(),
        buffered = next.buffer.is_some(),
        version = next.version,
        done = next.done,
        "merged input"
    );
}

/// Re-parse `state.text[cursor..]` and fold the result into `state`.
///
/// `state.text` already holds the extended text; every other field still describes the previous
/// merge.
fn advance<P>(parser: &P, state: &mut MergeState, finalize: bool)
where
    P: BlockParser + ?Sized,
{
    let base = state.cursor;
    let suffix = &state.text[base..];
    let part = partition(parse_span(parser, suffix, finalize), suffix.len(), finalize);

    let mut ids = IdAllocator {
        next: state.next_id,
        carried: state.buffer.as_ref().map(|b| (b.start, b.id)),
    };
    let (promoted, buffer) =
        materialize(&state.text, base, &part.promoted, part.buffered, &mut ids);

    if !promoted.is_empty() || (finalize && !state.done) {
        state.version += 1;
    }
    if !promoted.is_empty() {
        let mut all = Vec::with_capacity(state.committed.len() + promoted.len());
        all.extend(state.committed.iter().cloned());
        all.extend(promoted);
        state.committed = Arc::from(all);
    }
    state.buffer = buffer;
    state.cursor = base + part.resume;
    state.done = finalize;
    state.next_id = ids.next;
}

fn rebuild<P>(parser: &P, previous: Option<&MergeState>, input: MergeInput<'_>) -> MergeState
where
    P: BlockParser + ?Sized,
{
    let finalize = input.done || previous.is_some_and(|p| p.done);
    let part = partition(parse_span(parser, input.text, finalize), input.text.len(), finalize);

    let mut ids = IdAllocator {
        next: previous.map_or(1, |p| p.next_id),
        carried: None,
    };
    let (promoted, buffer) = materialize(input.text, 0, &part.promoted, part.buffered, &mut ids);

    MergeState {
        text: input.text.to_owned(),
        cursor: part.resume,
        version: previous.map_or(0, |p| p.version + 1),
        committed: Arc::from(promoted),
        buffer,
        done: finalize,
        next_id: ids.next,
    }
}

struct IdAllocator {
    next: u64,
    /// The previous buffer block: a block re-parsed at the same start keeps its id.
    carried: Option<(usize, BlockId)>,
}

impl IdAllocator {
    fn assign(&mut self, start: usize) -> BlockId {
        if let Some((carried_start, id)) = self.carried {
            if carried_start == start {
                self.carried = None;
                return id;
            }
        }
        let id = BlockId(self.next);
        self.next += 1;
        id
    }
}

/// Turn span-relative blocks into absolute, id-carrying blocks over `text`.
///
/// Each block runs until the next block's start; the last one runs to the end of `text`.
fn materialize(
    text: &str,
    base: usize,
    promoted: &[ParsedBlock],
    buffered: Option<ParsedBlock>,
    ids: &mut IdAllocator,
) -> (Vec<Block>, Option<Block>) {
    let nodes: Vec<ParsedBlock> = promoted.iter().copied().chain(buffered).collect();
    let mut blocks: Vec<Block> = nodes
        .iter()
        .enumerate()
        .map(|(i, node)| {
            let start = base + node.start;
            let end = nodes.get(i + 1).map_or(text.len(), |next| base + next.start);
            Block {
                id: ids.assign(start),
                kind: node.kind,
                start,
                raw: Arc::from(&text[start..end]),
            }
        })
        .collect();
    let buffer = if buffered.is_some() { blocks.pop() } else { None };
    (blocks, buffer)
}
