#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeFenceHeader<'a> {
    pub fence_char: char,
    pub fence_len: usize,
    /// Entire info string (trimmed), excluding fence markers.
    pub info: &'a str,
    /// First token of `info`. `None` means "no language".
    pub language: Option<&'a str>,
}

/// Opening line of a `:::name` directive container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectiveHeader<'a> {
    pub marker_len: usize,
    pub name: &'a str,
    /// Text inside `[...]` right after the name.
    pub label: Option<&'a str>,
    /// Text inside `{...}`, or any other trailing text after the name and label.
    pub attributes: Option<&'a str>,
}

pub(crate) fn strip_up_to_three_leading_spaces(line: &str) -> &str {
    let mut s = line;
    let mut spaces = 0usize;
    while spaces < 3 && s.starts_with(' ') {
        s = &s[1..];
        spaces += 1;
    }
    s
}

fn marker_run(s: &str, marker: u8) -> usize {
    s.bytes().take_while(|&b| b == marker).count()
}

pub fn parse_code_fence_header(line: &str) -> Option<CodeFenceHeader<'_>> {
    // CommonMark-ish fence opening line:
    // - up to 3 leading spaces
    // - fence is ``` or ~~~ (>=3)
    // - info string is the rest of the line after the fence run
    let s = strip_up_to_three_leading_spaces(line);
    let fence_char = match s.as_bytes().first() {
        Some(b'`') => '`',
        Some(b'~') => '~',
        _ => return None,
    };
    let fence_len = marker_run(s, fence_char as u8);
    if fence_len < 3 {
        return None;
    }

    let info = s[fence_len..].trim();
    // Backtick fences may not carry backticks in their info string.
    if fence_char == '`' && info.contains('`') {
        return None;
    }
    let language = info.split_whitespace().next();

    Some(CodeFenceHeader {
        fence_char,
        fence_len,
        info,
        language,
    })
}

pub fn is_code_fence_closing_line(line: &str, fence_char: char, fence_len: usize) -> bool {
    let s = strip_up_to_three_leading_spaces(line);
    let trimmed = s.trim_end();
    let mut count = 0usize;
    for ch in trimmed.chars() {
        if ch != fence_char {
            return false;
        }
        count += 1;
    }
    count >= fence_len
}

fn is_directive_name_start(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

fn is_directive_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-'
}

/// Count of `:` markers that make up a bare directive closing line, if `line` is one.
pub fn directive_closing_marker_len(line: &str) -> Option<usize> {
    let s = strip_up_to_three_leading_spaces(line).trim_end();
    let len = marker_run(s, b':');
    if len >= 3 && len == s.len() {
        Some(len)
    } else {
        None
    }
}

/// Parse a directive opener such as `:::note`, `::: warning`, `:::tip[Heads up]{.wide}`.
pub fn parse_directive_header(line: &str) -> Option<DirectiveHeader<'_>> {
    let s = strip_up_to_three_leading_spaces(line).trim_end();
    let marker_len = marker_run(s, b':');
    if marker_len < 3 {
        return None;
    }
    let rest = s[marker_len..].trim_start_matches([' ', '\t']);
    let bytes = rest.as_bytes();
    if !bytes.first().is_some_and(|&b| is_directive_name_start(b)) {
        return None;
    }
    let mut name_end = 1usize;
    while name_end < bytes.len() && is_directive_name_char(bytes[name_end]) {
        name_end += 1;
    }
    let name = &rest[..name_end];

    let mut tail = &rest[name_end..];
    let mut label = None;
    if tail.starts_with('[') {
        if let Some(close) = tail.find(']') {
            label = Some(&tail[1..close]);
            tail = &tail[close + 1..];
        }
    }
    let tail = tail.trim();
    let attributes = if tail.is_empty() {
        None
    } else if tail.starts_with('{') && tail.ends_with('}') {
        Some(tail[1..tail.len() - 1].trim())
    } else {
        Some(tail)
    };

    Some(DirectiveHeader {
        marker_len,
        name,
        label,
        attributes,
    })
}
