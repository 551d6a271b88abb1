mod support;

use std::cell::Cell;

use mdmerge::{
    BlockKind, BlockParser, FnBlockParser, MergeInput, MergeStrategy, ParseError, ParsedBlock,
    Seed, Session, classify, merge,
};
use pretty_assertions::assert_eq;

/// One block per `;`-terminated statement; fails on any span containing `!`.
#[derive(Debug, Default)]
struct StatementParser {
    calls: Cell<usize>,
}

impl BlockParser for StatementParser {
    fn parse(&self, span: &str) -> Result<Vec<ParsedBlock>, ParseError> {
        self.calls.set(self.calls.get() + 1);
        if span.contains('!') {
            return Err(ParseError::new("unexpected '!'"));
        }
        let mut out = vec![ParsedBlock::new(BlockKind::Unknown, 0)];
        for (i, _) in span.match_indices(';') {
            if i + 1 < span.len() {
                out.push(ParsedBlock::new(BlockKind::Unknown, i + 1));
            }
        }
        Ok(out)
    }
}

#[test]
fn custom_parser_drives_promotion() {
    let mut s = Session::create(StatementParser::default(), None);
    let snap = s.write("a=1;b=2;c").unwrap();
    assert_eq!(support::raws(snap.committed_blocks()), vec!["a=1;", "b=2;"]);
    assert_eq!(support::raws(snap.buffer_blocks()), vec!["c"]);

    let snap = s.write("=3;d").unwrap();
    assert_eq!(support::raws(snap.committed_blocks()), vec!["a=1;", "b=2;", "c=3;"]);
    assert_eq!(snap.cursor, 12);
}

#[test]
fn only_the_unconsumed_suffix_is_reparsed() {
    let parser = FnBlockParser::new(|span: &str| {
        assert!(!span.starts_with("first"), "committed text was parsed again: {span:?}");
        Ok(vec![ParsedBlock::new(BlockKind::Paragraph, 0)])
    });
    let prev = merge(
        &FnBlockParser::new(|_span: &str| {
            Ok(vec![
                ParsedBlock::new(BlockKind::Paragraph, 0),
                ParsedBlock::new(BlockKind::Paragraph, 7),
            ])
        }),
        None,
        MergeInput::streaming("first\n\nsecond"),
    );
    assert_eq!(prev.cursor(), 7);
    assert_eq!(
        classify(Some(&prev), &MergeInput::streaming("first\n\nsecond and more")),
        MergeStrategy::Extend
    );
    let next = merge(&parser, Some(&prev), MergeInput::streaming("first\n\nsecond and more"));
    assert_eq!(&*next.buffer().unwrap().raw, "second and more");
}

#[test]
fn parse_failure_keeps_committed_blocks() {
    let mut s = Session::create(StatementParser::default(), None);
    let good = s.write("a;b").unwrap();
    let bad = s.write("!").unwrap();
    assert!(bad.same_committed(&good));
    assert!(bad.buffer_blocks().is_empty());
    assert_eq!(bad.cursor, good.cursor);

    // The failing span keeps failing; finalize still empties the buffer.
    let done = s.finalize(Some(";c"));
    assert!(done.done);
    assert!(done.buffer_blocks().is_empty());
    assert_eq!(support::raws(done.committed_blocks()), vec!["a;"]);
    assert!(s.parser().calls.get() >= 3);
}

#[test]
fn invalid_offsets_are_ignored() {
    let parser = FnBlockParser::new(|span: &str| {
        Ok(vec![
            ParsedBlock::new(BlockKind::Paragraph, 0),
            ParsedBlock::new(BlockKind::Paragraph, span.len() + 5),
        ])
    });
    let mut s = Session::create(parser, None);
    let snap = s.write("anything").unwrap();
    assert!(snap.committed_blocks().is_empty());
    assert!(snap.buffer_blocks().is_empty());
}

#[test]
fn divergent_text_rebuilds_with_fresh_ids() {
    let mut s = Session::create(StatementParser::default(), Some(Seed::streaming("x;y")));
    let before = s.snapshot();
    assert_eq!(before.version, 0);

    let state = s.state().clone();
    let rebuilt = merge(s.parser(), Some(&state), MergeInput::streaming("q;r;s"));
    assert_eq!(rebuilt.version(), state.version() + 1);
    let raws: Vec<&str> = rebuilt.committed().iter().map(|b| &*b.raw).collect();
    assert_eq!(raws, vec!["q;", "r;"]);
    assert!(rebuilt.committed().iter().all(|b| b.id.0 > before.committed[0].id.0));
}
