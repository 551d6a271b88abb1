use std::sync::Arc;

use super::BlockParser;
use crate::boundary::{BoundaryPlugin, BoundaryScope, BoundaryUpdate, DirectivePlugin};
use crate::error::ParseError;
use crate::options::Options;
use crate::syntax::{is_code_fence_closing_line, parse_code_fence_header};
use crate::types::{BlockKind, ParsedBlock};

/// Line-oriented CommonMark-ish block splitter.
///
/// The parser only decides where blocks start and what kind they are; it does not build an AST.
/// Decisions about a block boundary only look at lines up to and including the line that creates
/// it, and an unterminated last line never splits or reclassifies an open block (except after a
/// blank line in a paragraph or table). As a result, every boundary but the last one reported for
/// a text is also reported for any extension of that text.
#[derive(Clone)]
pub struct LineBlockParser {
    boundary_plugins: Vec<Arc<dyn BoundaryPlugin>>,
}

impl std::fmt::Debug for LineBlockParser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineBlockParser")
            .field("boundary_plugins_len", &self.boundary_plugins.len())
            .finish()
    }
}

impl Default for LineBlockParser {
    fn default() -> Self {
        Self::from_options(&Options::default())
    }
}

impl LineBlockParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// A parser with no boundary plugins at all.
    pub fn without_plugins() -> Self {
        Self {
            boundary_plugins: Vec::new(),
        }
    }

    pub fn from_options(opts: &Options) -> Self {
        let mut parser = Self::without_plugins();
        if opts.directives {
            parser.push_boundary_plugin(DirectivePlugin::default());
        }
        parser
    }

    pub fn push_boundary_plugin<T>(&mut self, plugin: T)
    where
        T: BoundaryPlugin + 'static,
    {
        self.boundary_plugins.push(Arc::new(plugin));
    }

    pub fn with_boundary_plugin<T>(mut self, plugin: T) -> Self
    where
        T: BoundaryPlugin + 'static,
    {
        self.push_boundary_plugin(plugin);
        self
    }

    fn split(&self, span: &str, last_line_complete: bool) -> Vec<ParsedBlock> {
        let mut lines = Vec::new();
        let mut offset = 0usize;
        for segment in span.split_inclusive('\n') {
            let (text, has_newline) = match segment.strip_suffix('\n') {
                Some(text) => (text, true),
                None => (segment, false),
            };
            lines.push(Line {
                start: offset,
                text,
                complete: has_newline || last_line_complete,
            });
            offset += segment.len();
        }

        let mut splitter = Splitter {
            plugins: &self.boundary_plugins,
            lines,
            blocks: Vec::new(),
            open: None,
        };
        splitter.run();
        splitter.blocks
    }
}

impl BlockParser for LineBlockParser {
    fn parse(&self, span: &str) -> Result<Vec<ParsedBlock>, ParseError> {
        Ok(self.split(span, false))
    }

    fn parse_final(&self, span: &str) -> Result<Vec<ParsedBlock>, ParseError> {
        Ok(self.split(span, true))
    }
}

#[derive(Debug, Clone, Copy)]
struct Line<'a> {
    start: usize,
    text: &'a str,
    complete: bool,
}

#[derive(Debug, Clone)]
enum BlockMode {
    Paragraph,
    Heading,
    ThematicBreak,
    CodeFence { fence_char: char, fence_len: usize },
    Custom { kind: BlockKind },
    List,
    BlockQuote,
    HtmlBlock { stack: Vec<String>, in_comment: bool },
    Table,
    MathBlock { open_count: usize },
    FootnoteDefinition,
}

impl BlockMode {
    fn kind(&self) -> BlockKind {
        match self {
            BlockMode::Paragraph => BlockKind::Paragraph,
            BlockMode::Heading => BlockKind::Heading,
            BlockMode::ThematicBreak => BlockKind::ThematicBreak,
            BlockMode::CodeFence { .. } => BlockKind::CodeFence,
            BlockMode::Custom { kind } => *kind,
            BlockMode::List => BlockKind::List,
            BlockMode::BlockQuote => BlockKind::BlockQuote,
            BlockMode::HtmlBlock { .. } => BlockKind::HtmlBlock,
            BlockMode::Table => BlockKind::Table,
            BlockMode::MathBlock { .. } => BlockKind::MathBlock,
            BlockMode::FootnoteDefinition => BlockKind::FootnoteDefinition,
        }
    }
}

struct OpenBlock {
    start_line: usize,
    mode: BlockMode,
    scope: Option<Box<dyn BoundaryScope>>,
}

struct Splitter<'p, 'a> {
    plugins: &'p [Arc<dyn BoundaryPlugin>],
    lines: Vec<Line<'a>>,
    blocks: Vec<ParsedBlock>,
    open: Option<OpenBlock>,
}

impl<'a> Splitter<'_, 'a> {
    fn run(&mut self) {
        for i in 0..self.lines.len() {
            if self.lines[i].complete {
                self.feed(i);
            } else {
                // Only the last line can be unterminated.
                self.feed_incomplete_tail(i);
            }
        }
        self.close();
    }

    fn text(&self, i: usize) -> &'a str {
        self.lines[i].text
    }

    fn feed(&mut self, i: usize) {
        let curr = self.text(i);
        let Some(open) = &self.open else {
            if !is_empty_line(curr) {
                self.begin(i);
                self.update(i);
            }
            return;
        };

        let prev = self.text(i - 1);
        if matches!(open.mode, BlockMode::Paragraph)
            && open.start_line + 1 < i
            && is_table_delimiter(curr)
            && prev.contains('|')
        {
            // The previous line is a table header: it leaves the paragraph and opens the table.
            self.close();
            self.open = Some(OpenBlock {
                start_line: i - 1,
                mode: BlockMode::Table,
                scope: None,
            });
            return;
        }

        if self.is_new_block_boundary(i) {
            self.close();
            self.begin(i);
        }
        self.update(i);
    }

    fn feed_incomplete_tail(&mut self, i: usize) {
        let curr = self.text(i);
        if is_empty_line(curr) {
            return;
        }
        let Some(open) = &self.open else {
            self.begin(i);
            return;
        };
        if matches!(open.mode, BlockMode::Paragraph | BlockMode::Table)
            && is_empty_line(self.text(i - 1))
        {
            self.close();
            self.begin(i);
        }
    }

    fn begin(&mut self, i: usize) {
        let line = self.text(i);
        let open = match self.plugins.iter().find(|p| p.matches_start(line)) {
            Some(plugin) => OpenBlock {
                start_line: i,
                mode: BlockMode::Custom {
                    kind: plugin.kind(),
                },
                scope: Some(plugin.open(line)),
            },
            None => OpenBlock {
                start_line: i,
                mode: start_mode_for_line(line),
                scope: None,
            },
        };
        self.open = Some(open);
    }

    fn close(&mut self) {
        if let Some(open) = self.open.take() {
            self.blocks.push(ParsedBlock {
                kind: open.mode.kind(),
                start: self.lines[open.start_line].start,
            });
        }
    }

    fn update(&mut self, i: usize) {
        let line = self.text(i);
        let prev = if i > 0 { Some(self.text(i - 1)) } else { None };
        let Some(open) = self.open.as_mut() else {
            return;
        };
        let first_line = open.start_line == i;
        let closes = match open.mode {
            BlockMode::Heading | BlockMode::ThematicBreak => true,
            BlockMode::CodeFence {
                fence_char,
                fence_len,
            } => !first_line && is_code_fence_closing_line(line, fence_char, fence_len),
            BlockMode::Custom { .. } => open
                .scope
                .as_mut()
                .is_some_and(|scope| scope.update(line) == BoundaryUpdate::Close),
            BlockMode::MathBlock { ref mut open_count } => {
                *open_count += count_double_dollars(line);
                *open_count % 2 == 0
            }
            BlockMode::HtmlBlock {
                ref mut stack,
                ref mut in_comment,
            } => {
                update_html_block_state(line, stack, in_comment);
                !*in_comment && stack.is_empty()
            }
            BlockMode::Paragraph => {
                let second_line = open.start_line + 1 == i;
                let prev = prev.unwrap_or("");
                if second_line && !is_empty_line(prev) && setext_underline_char(line).is_some() {
                    open.mode = BlockMode::Heading;
                    true
                } else {
                    if second_line && is_table_delimiter(line) && prev.contains('|') {
                        open.mode = BlockMode::Table;
                    }
                    false
                }
            }
            BlockMode::Table
            | BlockMode::List
            | BlockMode::BlockQuote
            | BlockMode::FootnoteDefinition => false,
        };
        if closes {
            self.close();
        }
    }

    fn is_new_block_boundary(&self, i: usize) -> bool {
        let Some(open) = &self.open else {
            return true;
        };
        let prev = self.text(i - 1);
        let curr = self.text(i);

        // Containers that are still open never split.
        match open.mode {
            BlockMode::CodeFence { .. }
            | BlockMode::Custom { .. }
            | BlockMode::HtmlBlock { .. }
            | BlockMode::MathBlock { .. } => return false,
            _ => {}
        }

        if is_empty_line(curr) {
            return false;
        }

        let mode = &open.mode;
        if matches!(mode, BlockMode::FootnoteDefinition) && is_footnote_continuation(curr) {
            return false;
        }

        // A new block can start after an empty line.
        if is_empty_line(prev) {
            // Lists can contain blank lines between items and within an item's continuation.
            if matches!(mode, BlockMode::List) && is_list_continuation(curr) {
                return false;
            }
            // Blockquotes continue across blank lines only if the marker is present.
            if matches!(mode, BlockMode::BlockQuote) && is_blockquote_start(curr) {
                return false;
            }
            return true;
        }

        // Indented content belongs to the current list item.
        if matches!(mode, BlockMode::List) && is_indented(curr) {
            return false;
        }

        // A setext underline is part of the paragraph, not a new block.
        if matches!(mode, BlockMode::Paragraph)
            && open.start_line + 1 == i
            && setext_underline_char(curr).is_some()
        {
            return false;
        }

        // Block starters that can interrupt paragraphs, lists and quotes.
        if is_heading(curr) || is_thematic_break(curr) {
            return true;
        }
        if parse_code_fence_header(curr).is_some() {
            return true;
        }
        if self.plugins.iter().any(|p| p.matches_start(curr)) {
            return true;
        }
        if is_footnote_definition_start(curr) {
            return true;
        }
        if is_blockquote_start(curr)
            && !is_blockquote_start(prev)
            && !matches!(mode, BlockMode::BlockQuote)
        {
            return true;
        }
        if is_list_item_start(curr)
            && !is_list_item_start(prev)
            && !matches!(mode, BlockMode::List)
        {
            return true;
        }
        false
    }
}

fn start_mode_for_line(line: &str) -> BlockMode {
    if is_heading(line) {
        return BlockMode::Heading;
    }
    if is_thematic_break(line) {
        return BlockMode::ThematicBreak;
    }
    if let Some(header) = parse_code_fence_header(line) {
        return BlockMode::CodeFence {
            fence_char: header.fence_char,
            fence_len: header.fence_len,
        };
    }
    if is_footnote_definition_start(line) {
        return BlockMode::FootnoteDefinition;
    }
    if is_blockquote_start(line) {
        return BlockMode::BlockQuote;
    }
    if is_list_item_start(line) {
        return BlockMode::List;
    }
    if is_html_block_start(line) {
        // The opening line's tags are applied by the regular per-line update.
        return BlockMode::HtmlBlock {
            stack: Vec::new(),
            in_comment: false,
        };
    }
    if count_double_dollars(line) % 2 == 1 && line.trim_start().starts_with("$$") {
        return BlockMode::MathBlock { open_count: 0 };
    }
    BlockMode::Paragraph
}

fn is_empty_line(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_heading(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('#')
        && trimmed[1..].starts_with(|c: char| c == ' ' || c == '\t' || c == '#')
}

/// A run of one marker character, optionally separated by spaces/tabs, after up to 3 spaces.
fn marker_line_char(line: &str, markers: &[char], min_count: usize) -> Option<char> {
    let s = crate::syntax::strip_up_to_three_leading_spaces(line);
    let s = s.trim_end_matches([' ', '\t']);
    let mut it = s.chars();
    let first = it.next()?;
    if !markers.contains(&first) {
        return None;
    }
    let mut count = 1usize;
    for c in it {
        if c == first {
            count += 1;
            continue;
        }
        if c == ' ' || c == '\t' {
            continue;
        }
        return None;
    }
    if count >= min_count { Some(first) } else { None }
}

fn is_thematic_break(line: &str) -> bool {
    marker_line_char(line, &['-', '*', '_'], 3).is_some()
}

fn setext_underline_char(line: &str) -> Option<char> {
    marker_line_char(line, &['=', '-'], 2)
}

fn is_blockquote_start(line: &str) -> bool {
    line.trim_start().starts_with('>')
}

fn is_list_item_start(line: &str) -> bool {
    let s = line.trim_start();
    if s.len() < 2 {
        return false;
    }
    let bytes = s.as_bytes();
    match bytes[0] {
        b'-' | b'+' | b'*' => bytes[1] == b' ' || bytes[1] == b'\t',
        b'0'..=b'9' => {
            let mut i = 0usize;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i + 1 >= bytes.len() {
                return false;
            }
            (bytes[i] == b'.' || bytes[i] == b')')
                && (bytes[i + 1] == b' ' || bytes[i + 1] == b'\t')
        }
        _ => false,
    }
}

fn is_indented(line: &str) -> bool {
    line.starts_with('\t') || line.starts_with("  ")
}

fn is_list_continuation(line: &str) -> bool {
    is_list_item_start(line) || is_indented(line)
}

fn is_footnote_definition_start(line: &str) -> bool {
    let s = line.trim_start();
    s.starts_with("[^") && s.contains("]:")
}

fn is_footnote_continuation(line: &str) -> bool {
    line.starts_with("    ") || line.starts_with('\t')
}

fn is_table_delimiter(line: &str) -> bool {
    let s = line.trim();
    if s.is_empty() {
        return false;
    }
    let mut has_dash = false;
    for c in s.chars() {
        match c {
            '|' | ':' | ' ' | '\t' => {}
            '-' => has_dash = true,
            _ => return false,
        }
    }
    has_dash
}

fn count_double_dollars(line: &str) -> usize {
    let bytes = line.as_bytes();
    let mut count = 0usize;
    let mut i = 0usize;
    while i + 1 < bytes.len() {
        if bytes[i] == b'$' && bytes[i + 1] == b'$' {
            if i > 0 && bytes[i - 1] == b'\\' {
                i += 2;
                continue;
            }
            count += 1;
            i += 2;
            continue;
        }
        i += 1;
    }
    count
}

fn is_html_block_start(line: &str) -> bool {
    let s = crate::syntax::strip_up_to_three_leading_spaces(line).trim_end();
    if !s.starts_with('<') || s.len() < 3 {
        return false;
    }
    // Tag-like start only; autolinks such as "<https://...>" are rejected here.
    parse_tag_at(s).is_some()
}

#[derive(Debug, Clone)]
enum HtmlTag {
    Opening { name: String, self_closing: bool },
    Closing { name: String },
    CommentOpen,
}

fn is_ascii_tag_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_void_html_tag(name: &str) -> bool {
    matches!(
        name,
        "area"
            | "base"
            | "br"
            | "col"
            | "embed"
            | "hr"
            | "img"
            | "input"
            | "link"
            | "meta"
            | "param"
            | "source"
            | "track"
            | "wbr"
    )
}

/// Parse a tag starting at the `<` that begins `s`. Returns the tag and the text after it.
fn parse_tag_at(s: &str) -> Option<(HtmlTag, &str)> {
    let bytes = s.as_bytes();
    if bytes.first() != Some(&b'<') {
        return None;
    }
    if let Some(rest) = s.strip_prefix("<!--") {
        return Some((HtmlTag::CommentOpen, rest));
    }
    let mut i = 1usize;
    let is_closing = bytes.get(i) == Some(&b'/');
    if is_closing {
        i += 1;
    }
    if !bytes.get(i).is_some_and(|b| b.is_ascii_alphabetic()) {
        return None;
    }
    let name_start = i;
    i += 1;
    while i < bytes.len() && is_ascii_tag_name_char(bytes[i]) {
        i += 1;
    }
    let name = s[name_start..i].to_ascii_lowercase();
    // Must be followed by whitespace, '>', or '/' to be tag-like.
    if !matches!(bytes.get(i), Some(b' ' | b'\t' | b'>' | b'/')) {
        return None;
    }
    let close = i + s[i..].find('>')?;

    if is_closing {
        return Some((HtmlTag::Closing { name }, &s[close + 1..]));
    }

    let mut j = close;
    while j > i && matches!(bytes[j - 1], b' ' | b'\t') {
        j -= 1;
    }
    let self_closing = (j > i && bytes[j - 1] == b'/') || is_void_html_tag(&name);
    Some((HtmlTag::Opening { name, self_closing }, &s[close + 1..]))
}

fn update_html_block_state(line: &str, stack: &mut Vec<String>, in_comment: &mut bool) {
    let mut s = line;
    loop {
        if *in_comment {
            let Some(pos) = s.find("-->") else {
                return;
            };
            *in_comment = false;
            s = &s[pos + 3..];
            continue;
        }

        let Some(lt) = s.find('<') else {
            return;
        };
        let Some((tag, rest)) = parse_tag_at(&s[lt..]) else {
            s = &s[lt + 1..];
            continue;
        };
        match tag {
            HtmlTag::CommentOpen => *in_comment = true,
            HtmlTag::Opening { name, self_closing } => {
                if !self_closing {
                    stack.push(name);
                }
            }
            HtmlTag::Closing { name } => {
                if stack.last().is_some_and(|t| *t == name) {
                    stack.pop();
                }
            }
        }
        s = rest;
    }
}
