use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(pub u64);

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockId({})", self.0)
    }
}

/// Block classification reported by a parser.
///
/// The merge engine never looks at this; it is carried through for renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Paragraph,
    Heading,
    ThematicBreak,
    CodeFence,
    List,
    BlockQuote,
    Table,
    HtmlBlock,
    MathBlock,
    FootnoteDefinition,
    Directive,
    Unknown,
}

/// A block as reported by a [`crate::BlockParser`].
///
/// `start` is a byte offset relative to the span handed to the parser. The end of a block is
/// implied by the start of the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedBlock {
    pub kind: BlockKind,
    pub start: usize,
}

impl ParsedBlock {
    pub fn new(kind: BlockKind, start: usize) -> Self {
        Self { kind, start }
    }
}

/// A positioned block owned by the merge engine.
///
/// `start` is an absolute byte offset into the running text and `raw` covers everything up to the
/// next block (trailing blank lines included). Cloning is cheap: `raw` is shared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub id: BlockId,
    pub kind: BlockKind,
    pub start: usize,
    pub raw: Arc<str>,
}

impl Block {
    pub fn end(&self) -> usize {
        self.start + self.raw.len()
    }

    pub fn code_fence_header(&self) -> Option<crate::syntax::CodeFenceHeader<'_>> {
        if self.kind != BlockKind::CodeFence {
            return None;
        }
        crate::syntax::parse_code_fence_header(first_line(&self.raw))
    }

    pub fn code_fence_language(&self) -> Option<&str> {
        self.code_fence_header().and_then(|h| h.language)
    }

    /// Header of a `:::name` directive block.
    pub fn directive(&self) -> Option<crate::syntax::DirectiveHeader<'_>> {
        if self.kind != BlockKind::Directive {
            return None;
        }
        crate::syntax::parse_directive_header(first_line(&self.raw))
    }
}

fn first_line(text: &str) -> &str {
    text.split('\n').next().unwrap_or(text)
}
