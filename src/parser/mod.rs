mod line;

pub use line::LineBlockParser;

use tracing::{trace, warn};

use crate::error::ParseError;
use crate::types::ParsedBlock;

/// Turns a span of text into ordered, positioned blocks.
///
/// Implementations must be deterministic and free of side effects for a given span. Block starts
/// are byte offsets relative to the span, strictly ascending, and on `char` boundaries.
pub trait BlockParser {
    fn parse(&self, span: &str) -> Result<Vec<ParsedBlock>, ParseError>;

    /// Parse a span that runs to the end of the document.
    ///
    /// The last line of `span` is known to be complete even without a trailing newline. Parsers
    /// that hold back decisions on an unterminated last line can resolve them here.
    fn parse_final(&self, span: &str) -> Result<Vec<ParsedBlock>, ParseError> {
        self.parse(span)
    }
}

/// Adapt a closure into a [`BlockParser`].
///
/// Handy for injecting a fake parser in tests.
pub struct FnBlockParser<F> {
    parse: F,
}

impl<F> FnBlockParser<F>
where
    F: Fn(&str) -> Result<Vec<ParsedBlock>, ParseError>,
{
    pub fn new(parse: F) -> Self {
        Self { parse }
    }
}

impl<F> std::fmt::Debug for FnBlockParser<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnBlockParser").finish_non_exhaustive()
    }
}

impl<F> BlockParser for FnBlockParser<F>
where
    F: Fn(&str) -> Result<Vec<ParsedBlock>, ParseError>,
{
    fn parse(&self, span: &str) -> Result<Vec<ParsedBlock>, ParseError> {
        (self.parse)(span)
    }
}

/// Run `parser` over `span`, degrading every failure to "no blocks".
///
/// Parse errors and structurally invalid output (starts out of range, not ascending, or splitting
/// a UTF-8 sequence) are logged and swallowed, so malformed input can never take down the merge or
/// disturb blocks that were already committed.
pub(crate) fn parse_span<P>(parser: &P, span: &str, finalize: bool) -> Vec<ParsedBlock>
where
    P: BlockParser + ?Sized,
{
    if span.is_empty() {
        return Vec::new();
    }
    let result = if finalize {
        parser.parse_final(span)
    } else {
        parser.parse(span)
    };
    let blocks = match result {
        Ok(blocks) => blocks,
        Err(err) => {
            warn!(
                span_len = span.len(),
                error = %err,
                "block parser failed; treating span as empty"
            );
            return Vec::new();
        }
    };
    if let Err(err) = validate(span, &blocks) {
        warn!(
            span_len = span.len(),
            error = %err,
            "block parser returned invalid blocks; treating span as empty"
        );
        return Vec::new();
    }
    trace!(span_len = span.len(), blocks = blocks.len(), finalize, "parsed span");
    blocks
}

fn validate(span: &str, blocks: &[ParsedBlock]) -> Result<(), ParseError> {
    let mut prev: Option<usize> = None;
    for block in blocks {
        if block.start >= span.len() {
            return Err(ParseError::new(format!(
                "block start {} is outside a span of {} bytes",
                block.start,
                span.len()
            )));
        }
        if !span.is_char_boundary(block.start) {
            return Err(ParseError::new(format!(
                "block start {} is not on a char boundary",
                block.start
            )));
        }
        if prev.is_some_and(|p| block.start <= p) {
            return Err(ParseError::new(format!(
                "block start {} does not follow the previous start",
                block.start
            )));
        }
        prev = Some(block.start);
    }
    Ok(())
}
