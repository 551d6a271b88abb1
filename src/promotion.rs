use crate::types::ParsedBlock;

/// Result of splitting freshly parsed blocks into promoted and buffered parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Blocks that are now stable, in order.
    pub promoted: Vec<ParsedBlock>,
    /// The newest block, withheld because later text could still change it.
    pub buffered: Option<ParsedBlock>,
    /// Offset within the parsed span where the next incremental parse must begin.
    ///
    /// - finalize: the span length (everything is accounted for)
    /// - a block is buffered: that block's start
    /// - nothing parsed: `0`, so the same span is parsed again once more text arrives
    pub resume: usize,
}

/// Promote every block but the newest one.
///
/// A block is only safe to commit once a later, structurally distinct block has started: that
/// proves its end boundary is fixed. The newest block never has that proof, so it stays buffered
/// until another block follows it or the stream is finalized.
pub fn partition(mut nodes: Vec<ParsedBlock>, span_len: usize, finalize: bool) -> Partition {
    if finalize {
        return Partition {
            promoted: nodes,
            buffered: None,
            resume: span_len,
        };
    }
    match nodes.pop() {
        None => Partition {
            promoted: Vec::new(),
            buffered: None,
            resume: 0,
        },
        Some(last) => Partition {
            promoted: nodes,
            buffered: Some(last),
            resume: last.start,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockKind;

    fn p(start: usize) -> ParsedBlock {
        ParsedBlock::new(BlockKind::Paragraph, start)
    }

    #[test]
    fn empty_input_promotes_nothing_and_keeps_resume_point() {
        let part = partition(Vec::new(), 12, false);
        assert!(part.promoted.is_empty());
        assert_eq!(part.buffered, None);
        assert_eq!(part.resume, 0);
    }

    #[test]
    fn single_block_is_buffered() {
        let part = partition(vec![p(2)], 20, false);
        assert!(part.promoted.is_empty());
        assert_eq!(part.buffered, Some(p(2)));
        assert_eq!(part.resume, 2);
    }

    #[test]
    fn all_but_last_are_promoted() {
        let part = partition(vec![p(0), p(5), p(9)], 20, false);
        assert_eq!(part.promoted, vec![p(0), p(5)]);
        assert_eq!(part.buffered, Some(p(9)));
        assert_eq!(part.resume, 9);
    }

    #[test]
    fn finalize_promotes_everything() {
        let part = partition(vec![p(0), p(5)], 20, true);
        assert_eq!(part.promoted, vec![p(0), p(5)]);
        assert_eq!(part.buffered, None);
        assert_eq!(part.resume, 20);

        let part = partition(Vec::new(), 7, true);
        assert!(part.promoted.is_empty());
        assert_eq!(part.resume, 7);
    }
}
