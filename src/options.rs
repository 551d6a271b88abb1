#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Rewrite `\r\n` and lone `\r` to `\n` before text reaches the parser.
    ///
    /// A chunk that ends in `\r` is held back until the next chunk (or `finalize`) shows whether
    /// it was half of a CRLF pair.
    pub normalize_newlines: bool,
    /// Recognize `:::name` directive containers in the default line parser.
    pub directives: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            normalize_newlines: true,
            directives: true,
        }
    }
}
