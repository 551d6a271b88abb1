use std::borrow::Cow;

use crate::syntax::{
    directive_closing_marker_len, parse_directive_header, strip_up_to_three_leading_spaces,
};
use crate::types::BlockKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryUpdate {
    Continue,
    Close,
}

/// Claim container-like blocks for the line parser.
///
/// A plugin decides whether a line opens one of its blocks; the per-block state then lives in the
/// [`BoundaryScope`] returned by [`BoundaryPlugin::open`]. Plugins themselves hold no mutable
/// state, so a parser that owns them stays deterministic across calls.
///
/// While a scope is open the parser never splits the block.
pub trait BoundaryPlugin: Send + Sync {
    /// Return `true` if `line` can open this container.
    fn matches_start(&self, line: &str) -> bool;

    /// Begin a container at `line`. Only called after `matches_start` returned `true`.
    fn open(&self, line: &str) -> Box<dyn BoundaryScope>;

    fn kind(&self) -> BlockKind {
        BlockKind::Unknown
    }
}

pub trait BoundaryScope {
    /// Called for each line of the block, including the opening line.
    ///
    /// Return `BoundaryUpdate::Close` to end the block after this line.
    fn update(&mut self, line: &str) -> BoundaryUpdate;
}

/// `:::` directive containers.
///
/// ```text
/// :::warning[Careful]{.wide}
/// content...
/// :::
/// ```
///
/// - Start: a run of at least `min_marker_len` colons followed by a name.
/// - End: a bare marker run at least as long as the innermost open marker.
/// - Nested openers are tracked, so both `::::outer` / `:::inner` and same-length nesting close
///   correctly.
#[derive(Debug, Clone)]
pub struct DirectivePlugin {
    pub min_marker_len: usize,
    /// If set, only these directive names open a container.
    pub allowed_names: Option<Vec<String>>,
}

impl Default for DirectivePlugin {
    fn default() -> Self {
        Self {
            min_marker_len: 3,
            allowed_names: None,
        }
    }
}

impl DirectivePlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_allowed_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    fn opener_len(&self, line: &str) -> Option<usize> {
        let header = parse_directive_header(line)?;
        if header.marker_len < self.min_marker_len {
            return None;
        }
        if let Some(allowed) = &self.allowed_names {
            if !allowed.iter().any(|n| n == header.name) {
                return None;
            }
        }
        Some(header.marker_len)
    }
}

impl BoundaryPlugin for DirectivePlugin {
    fn matches_start(&self, line: &str) -> bool {
        self.opener_len(line).is_some()
    }

    fn open(&self, line: &str) -> Box<dyn BoundaryScope> {
        Box::new(DirectiveScope {
            plugin: self.clone(),
            open_markers: self.opener_len(line).into_iter().collect(),
            just_started: true,
        })
    }

    fn kind(&self) -> BlockKind {
        BlockKind::Directive
    }
}

struct DirectiveScope {
    plugin: DirectivePlugin,
    open_markers: Vec<usize>,
    just_started: bool,
}

impl BoundaryScope for DirectiveScope {
    fn update(&mut self, line: &str) -> BoundaryUpdate {
        if self.just_started {
            self.just_started = false;
            return BoundaryUpdate::Continue;
        }
        let Some(&innermost) = self.open_markers.last() else {
            return BoundaryUpdate::Close;
        };
        if let Some(len) = directive_closing_marker_len(line) {
            if len >= innermost {
                self.open_markers.pop();
                if self.open_markers.is_empty() {
                    return BoundaryUpdate::Close;
                }
            }
            return BoundaryUpdate::Continue;
        }
        if let Some(len) = self.plugin.opener_len(line) {
            self.open_markers.push(len);
        }
        BoundaryUpdate::Continue
    }
}

/// A paired-tag container such as
///
/// ```text
/// <thinking>
/// ...
/// </thinking>
/// ```
///
/// The opening tag must be complete on its line. The closing tag must stand alone on its line
/// unless `require_standalone_end` is `false`.
#[derive(Debug, Clone)]
pub struct TagPlugin {
    pub tag: String,
    pub case_insensitive: bool,
    pub allow_attributes: bool,
    pub require_standalone_end: bool,
}

impl TagPlugin {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            case_insensitive: true,
            allow_attributes: true,
            require_standalone_end: true,
        }
    }

    pub fn thinking() -> Self {
        Self::new("thinking")
    }

    fn is_tag_name_char(b: u8) -> bool {
        b.is_ascii_alphanumeric() || b == b'-' || b == b'_' || b == b':'
    }

    fn norm_tag<'a>(&self, tag: &'a str) -> Cow<'a, str> {
        if self.case_insensitive {
            Cow::Owned(tag.to_ascii_lowercase())
        } else {
            Cow::Borrowed(tag)
        }
    }

    /// Length of the tag name at the start of `s`.
    fn name_len(s: &str) -> usize {
        let bytes = s.as_bytes();
        if bytes.is_empty() || !bytes[0].is_ascii_alphabetic() {
            return 0;
        }
        let mut end = 1usize;
        while end < bytes.len() && Self::is_tag_name_char(bytes[end]) {
            end += 1;
        }
        end
    }

    fn matches_opening(&self, line: &str) -> bool {
        let s = strip_up_to_three_leading_spaces(line).trim_end();
        let Some(inside) = s.strip_prefix('<') else {
            return false;
        };
        let Some(gt) = inside.find('>') else {
            return false;
        };
        let inside = &inside[..gt];
        let name_end = Self::name_len(inside);
        if name_end == 0 {
            return false;
        }
        if self.norm_tag(&inside[..name_end]) != self.norm_tag(&self.tag) {
            return false;
        }
        let rest = inside[name_end..].trim();
        rest.is_empty() || self.allow_attributes
    }

    fn matches_closing(&self, line: &str) -> bool {
        let s = strip_up_to_three_leading_spaces(line).trim_end();
        let Some(after) = s.strip_prefix("</") else {
            return false;
        };
        let name_end = Self::name_len(after);
        if name_end == 0 {
            return false;
        }
        if self.norm_tag(&after[..name_end]) != self.norm_tag(&self.tag) {
            return false;
        }
        let rest = after[name_end..].trim();
        if self.require_standalone_end {
            rest == ">"
        } else {
            rest.starts_with('>')
        }
    }
}

impl BoundaryPlugin for TagPlugin {
    fn matches_start(&self, line: &str) -> bool {
        self.matches_opening(line)
    }

    fn open(&self, _line: &str) -> Box<dyn BoundaryScope> {
        Box::new(TagScope {
            plugin: self.clone(),
        })
    }
}

struct TagScope {
    plugin: TagPlugin,
}

impl BoundaryScope for TagScope {
    fn update(&mut self, line: &str) -> BoundaryUpdate {
        if self.plugin.matches_closing(line) {
            BoundaryUpdate::Close
        } else {
            BoundaryUpdate::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(plugin: &dyn BoundaryPlugin, lines: &[&str]) -> Vec<BoundaryUpdate> {
        let mut scope = plugin.open(lines[0]);
        lines.iter().map(|l| scope.update(l)).collect()
    }

    #[test]
    fn directive_closes_on_bare_marker() {
        let p = DirectivePlugin::new();
        assert!(p.matches_start(":::note"));
        assert!(!p.matches_start(":::"));
        assert_eq!(
            run(&p, &[":::note", "body", ":::"]),
            vec![
                BoundaryUpdate::Continue,
                BoundaryUpdate::Continue,
                BoundaryUpdate::Close
            ]
        );
    }

    #[test]
    fn directive_tracks_nesting() {
        let p = DirectivePlugin::new();
        let updates = run(&p, &["::::outer", ":::inner", "x", ":::", "y", "::::"]);
        assert_eq!(updates.last(), Some(&BoundaryUpdate::Close));
        assert!(updates[..5].iter().all(|u| *u == BoundaryUpdate::Continue));

        let updates = run(&p, &[":::a", ":::b", ":::", ":::"]);
        assert_eq!(
            updates,
            vec![
                BoundaryUpdate::Continue,
                BoundaryUpdate::Continue,
                BoundaryUpdate::Continue,
                BoundaryUpdate::Close
            ]
        );
    }

    #[test]
    fn directive_shorter_closer_does_not_close_longer_opener() {
        let p = DirectivePlugin::new();
        let updates = run(&p, &["::::note", ":::", "::::"]);
        assert_eq!(
            updates,
            vec![
                BoundaryUpdate::Continue,
                BoundaryUpdate::Continue,
                BoundaryUpdate::Close
            ]
        );
    }

    #[test]
    fn directive_respects_allowed_names() {
        let p = DirectivePlugin::new().with_allowed_names(["note", "tip"]);
        assert!(p.matches_start(":::tip"));
        assert!(!p.matches_start(":::danger"));
    }

    #[test]
    fn tag_plugin_matches_case_insensitively() {
        let p = TagPlugin::thinking();
        assert!(p.matches_start("<Thinking>"));
        assert!(p.matches_start("<thinking mode=\"deep\">"));
        assert!(!p.matches_start("</thinking>"));
        assert!(!p.matches_start("<thinker>"));
        assert_eq!(
            run(&p, &["<thinking>", "hmm", "</THINKING>"]),
            vec![
                BoundaryUpdate::Continue,
                BoundaryUpdate::Continue,
                BoundaryUpdate::Close
            ]
        );
    }

    #[test]
    fn tag_plugin_requires_standalone_end_by_default() {
        let mut p = TagPlugin::thinking();
        assert_eq!(
            run(&p, &["<thinking>", "</thinking> trailing"]),
            vec![BoundaryUpdate::Continue, BoundaryUpdate::Continue]
        );
        p.require_standalone_end = false;
        assert_eq!(
            run(&p, &["<thinking>", "</thinking> trailing"]),
            vec![BoundaryUpdate::Continue, BoundaryUpdate::Close]
        );
    }
}
