/// State of a [`LineTokenizer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenizerState {
    /// The header line has not been completed yet.
    ReadingHeader,
    /// The header line was consumed; completed lines are data.
    ReadingRows,
    /// The input is exhausted and a trailing unterminated line was flushed.
    Draining,
}

/// Classification of a physical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// The configured header line.
    Header,
    /// Any other line, including lines before the header line and an unterminated trailing line.
    Data,
}

/// A complete physical line, without its terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenizedLine {
    /// Zero-based physical line number.
    pub number: u64,
    pub kind: LineKind,
    pub text: String,
}

/// Incremental byte to line splitter.
///
/// Bytes are decoded one byte per character. Lines end at `\n`; a `\r` directly before it is
/// dropped. Chunk boundaries can fall anywhere, including inside a `\r\n` pair.
///
/// Only a terminated line can be the header line. Content left over when the input ends is
/// always data.
#[derive(Debug)]
pub struct LineTokenizer {
    header_line: u64,
    line_number: u64,
    pending: String,
    state: TokenizerState,
}

impl LineTokenizer {
    /// Creates a tokenizer that treats physical line `header_line` as the header.
    pub fn new(header_line: u64) -> Self {
        Self {
            header_line,
            line_number: 0,
            pending: String::new(),
            state: TokenizerState::ReadingHeader,
        }
    }

    pub fn state(&self) -> TokenizerState {
        self.state
    }

    /// Returns the number of lines completed so far.
    pub fn lines_completed(&self) -> u64 {
        self.line_number
    }

    /// Feeds a chunk of bytes and returns the lines it completed.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<TokenizedLine> {
        let mut lines = Vec::new();

        for &byte in bytes {
            if byte == b'\n' {
                let kind = if self.line_number == self.header_line {
                    LineKind::Header
                } else {
                    LineKind::Data
                };
                lines.push(self.complete_line(kind));
            } else {
                self.pending.push(char::from(byte));
            }
        }

        lines
    }

    /// Signals the end of input and flushes an unterminated trailing line, if any.
    pub fn finish(&mut self) -> Option<TokenizedLine> {
        self.state = TokenizerState::Draining;

        if self.pending.is_empty() {
            return None;
        }

        Some(self.complete_line(LineKind::Data))
    }

    fn complete_line(&mut self, kind: LineKind) -> TokenizedLine {
        let mut text = std::mem::take(&mut self.pending);
        if text.ends_with('\r') {
            text.pop();
        }

        let number = self.line_number;
        self.line_number += 1;
        if kind == LineKind::Header && self.state == TokenizerState::ReadingHeader {
            self.state = TokenizerState::ReadingRows;
        }

        TokenizedLine { number, kind, text }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(lines: &[TokenizedLine]) -> Vec<(LineKind, &str)> {
        lines
            .iter()
            .map(|line| (line.kind, line.text.as_str()))
            .collect()
    }

    #[test]
    fn test_header_then_rows() {
        let mut tokenizer = LineTokenizer::new(0);
        assert_eq!(tokenizer.state(), TokenizerState::ReadingHeader);

        let lines = tokenizer.push(b"id,name\n1,Alice\n2,Bob\n");
        assert_eq!(
            texts(&lines),
            vec![
                (LineKind::Header, "id,name"),
                (LineKind::Data, "1,Alice"),
                (LineKind::Data, "2,Bob"),
            ]
        );
        assert_eq!(tokenizer.state(), TokenizerState::ReadingRows);
        assert_eq!(tokenizer.finish(), None);
        assert_eq!(tokenizer.state(), TokenizerState::Draining);
        assert_eq!(tokenizer.lines_completed(), 3);
    }

    #[test]
    fn test_lines_span_chunks() {
        let mut tokenizer = LineTokenizer::new(0);
        let mut lines = Vec::new();
        for chunk in b"id,na|me\n1,Al|ice\r|\n2,Bob".split(|byte| *byte == b'|') {
            lines.extend(tokenizer.push(chunk));
        }
        lines.extend(tokenizer.finish());

        assert_eq!(
            texts(&lines),
            vec![
                (LineKind::Header, "id,name"),
                (LineKind::Data, "1,Alice"),
                (LineKind::Data, "2,Bob"),
            ]
        );
    }

    #[test]
    fn test_lines_before_header_are_data() {
        let mut tokenizer = LineTokenizer::new(2);
        let lines = tokenizer.push(b"report\n\nid\n7\n");

        assert_eq!(
            texts(&lines),
            vec![
                (LineKind::Data, "report"),
                (LineKind::Data, ""),
                (LineKind::Header, "id"),
                (LineKind::Data, "7"),
            ]
        );
        assert_eq!(tokenizer.state(), TokenizerState::ReadingRows);
        assert_eq!(lines[3].number, 3);
    }

    #[test]
    fn test_unterminated_header_line_is_data() {
        let mut tokenizer = LineTokenizer::new(0);
        assert!(tokenizer.push(b"id,name").is_empty());

        let line = tokenizer.finish().unwrap();
        assert_eq!((line.kind, line.text.as_str()), (LineKind::Data, "id,name"));
        assert_eq!(line.number, 0);
        assert_eq!(tokenizer.state(), TokenizerState::Draining);
    }

    #[test]
    fn test_empty_lines_are_kept() {
        let mut tokenizer = LineTokenizer::new(0);
        let lines = tokenizer.push(b"h\n\n\n");
        assert_eq!(
            texts(&lines),
            vec![
                (LineKind::Header, "h"),
                (LineKind::Data, ""),
                (LineKind::Data, ""),
            ]
        );
    }

    #[test]
    fn test_bytes_decode_one_per_character() {
        let mut tokenizer = LineTokenizer::new(0);
        tokenizer.push(b"h\n");
        let lines = tokenizer.push(&[b'a', 0xE9, b'\n']);
        assert_eq!(lines[0].text, "a\u{e9}");
    }

    #[test]
    fn test_only_one_carriage_return_is_stripped() {
        let mut tokenizer = LineTokenizer::new(0);
        let lines = tokenizer.push(b"h\r\r\n");
        assert_eq!(lines[0].text, "h\r");
    }
}
