use pulldown_cmark::{Event, Options as PulldownOptions, Parser, Tag};

use crate::error::ParseError;
use crate::parser::BlockParser;
use crate::types::{BlockKind, ParsedBlock};

/// A [`BlockParser`] backed by `pulldown-cmark`.
///
/// Reports one block per top-level element of the CommonMark tree. Unlike
/// [`crate::LineBlockParser`], a full CommonMark parse is not prefix-stable (a setext underline
/// can turn an earlier paragraph into a heading), so the buffered last block carries more of the
/// settling work.
#[derive(Debug, Clone, Copy)]
pub struct PulldownBlockParser {
    pub options: PulldownOptions,
}

impl Default for PulldownBlockParser {
    fn default() -> Self {
        Self::new(PulldownOptions::empty())
    }
}

impl PulldownBlockParser {
    pub fn new(options: PulldownOptions) -> Self {
        Self { options }
    }

    /// Tables, footnotes, strikethrough, task lists and math.
    pub fn gfm() -> Self {
        Self::new(
            PulldownOptions::ENABLE_TABLES
                | PulldownOptions::ENABLE_FOOTNOTES
                | PulldownOptions::ENABLE_STRIKETHROUGH
                | PulldownOptions::ENABLE_TASKLISTS
                | PulldownOptions::ENABLE_MATH,
        )
    }
}

fn kind_for_tag(tag: &Tag<'_>) -> BlockKind {
    match tag {
        Tag::Paragraph => BlockKind::Paragraph,
        Tag::Heading { .. } => BlockKind::Heading,
        Tag::CodeBlock(_) => BlockKind::CodeFence,
        Tag::List(_) => BlockKind::List,
        Tag::BlockQuote(_) => BlockKind::BlockQuote,
        Tag::Table(_) => BlockKind::Table,
        Tag::HtmlBlock => BlockKind::HtmlBlock,
        Tag::FootnoteDefinition(_) => BlockKind::FootnoteDefinition,
        _ => BlockKind::Unknown,
    }
}

impl BlockParser for PulldownBlockParser {
    fn parse(&self, span: &str) -> Result<Vec<ParsedBlock>, ParseError> {
        let mut out: Vec<ParsedBlock> = Vec::new();
        let mut depth = 0usize;
        for (event, range) in Parser::new_ext(span, self.options).into_offset_iter() {
            let kind = match &event {
                Event::Start(tag) => {
                    depth += 1;
                    if depth > 1 {
                        continue;
                    }
                    kind_for_tag(tag)
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    continue;
                }
                Event::Rule if depth == 0 => BlockKind::ThematicBreak,
                _ => continue,
            };
            // Starts must be strictly ascending and inside the span.
            if out.last().is_some_and(|prev| prev.start >= range.start) {
                continue;
            }
            if range.start >= span.len() {
                continue;
            }
            out.push(ParsedBlock::new(kind, range.start));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds_and_starts(text: &str) -> Vec<(BlockKind, usize)> {
        PulldownBlockParser::gfm()
            .parse(text)
            .unwrap()
            .into_iter()
            .map(|b| (b.kind, b.start))
            .collect()
    }

    #[test]
    fn reports_top_level_blocks_only() {
        let text = "# Title\n\n- a\n- b\n\n> quote\n\n---\n\n```rs\nfn x() {}\n```\n";
        assert_eq!(
            kinds_and_starts(text),
            vec![
                (BlockKind::Heading, 0),
                (BlockKind::List, 9),
                (BlockKind::BlockQuote, 18),
                (BlockKind::ThematicBreak, 27),
                (BlockKind::CodeFence, 32),
            ]
        );
    }

    #[test]
    fn table_is_one_block() {
        let text = "| a | b |\n|---|---|\n| 1 | 2 |\n\nafter\n";
        assert_eq!(
            kinds_and_starts(text),
            vec![(BlockKind::Table, 0), (BlockKind::Paragraph, 31)]
        );
    }
}
