//! Line reassembly across arbitrary chunk boundaries.

use super::sanitize::sanitize;

/// Reassembles complete lines from output chunks.
///
/// The carry buffer holds raw bytes after the last `\n` seen so far. Only
/// `\n`-terminated regions are sanitized, so an escape sequence or a
/// multi-byte character split across two reads is always seen whole.
#[derive(Debug, Default)]
pub struct LineAssembler {
    carry: Vec<u8>,
}

impl LineAssembler {
    /// Create an assembler with an empty carry buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return every line it completes, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.carry.extend_from_slice(chunk);

        let Some(last_newline) = self.carry.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };

        let rest = self.carry.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.carry, rest);
        lines_of(&sanitize(&complete))
    }

    /// Flush whatever is left in the carry buffer at end of stream.
    pub fn finish(&mut self) -> Vec<String> {
        if self.carry.is_empty() {
            return Vec::new();
        }
        let rest = std::mem::take(&mut self.carry);
        lines_of(&sanitize(&rest))
    }

    /// Raw bytes of the current incomplete line.
    #[must_use]
    pub fn pending(&self) -> &[u8] {
        &self.carry
    }
}

/// Split sanitized text on `\n`, dropping the empty fragment after a
/// trailing terminator.
fn lines_of(text: &str) -> Vec<String> {
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    if lines.last().is_some_and(String::is_empty) {
        lines.pop();
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(chunks: &[&[u8]]) -> Vec<String> {
        let mut assembler = LineAssembler::new();
        let mut lines = Vec::new();
        for chunk in chunks {
            lines.extend(assembler.push(chunk));
        }
        lines.extend(assembler.finish());
        lines
    }

    #[test]
    fn test_single_chunk_multiple_lines() {
        assert_eq!(collect(&[b"a\nb\nc\n"]), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_partial_line_is_carried() {
        let mut assembler = LineAssembler::new();
        assert!(assembler.push(b"{\"type\":").is_empty());
        assert_eq!(assembler.pending(), b"{\"type\":");
        assert_eq!(assembler.push(b"\"x\"}\n"), vec!["{\"type\":\"x\"}"]);
        assert!(assembler.pending().is_empty());
    }

    #[test]
    fn test_finish_flushes_unterminated_line() {
        assert_eq!(collect(&[b"first\nsecond"]), vec!["first", "second"]);
    }

    #[test]
    fn test_finish_on_empty_carry_is_empty() {
        let mut assembler = LineAssembler::new();
        assert_eq!(assembler.push(b"line\n"), vec!["line"]);
        assert!(assembler.finish().is_empty());
    }

    #[test]
    fn test_empty_lines_are_preserved() {
        assert_eq!(collect(&[b"a\n\nb\n"]), vec!["a", "", "b"]);
    }

    #[test]
    fn test_escape_sequence_split_across_chunks() {
        assert_eq!(collect(&[b"\x1b[3", b"1mred\x1b[0m\n"]), vec!["red"]);
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        assert_eq!(collect(&[b"one\r", b"\ntwo\r\n"]), vec!["one", "two"]);
    }

    #[test]
    fn test_multibyte_char_split_across_chunks() {
        let bytes = "héllo\n".as_bytes();
        assert_eq!(collect(&[&bytes[..2], &bytes[2..]]), vec!["héllo"]);
    }

    #[test]
    fn test_every_split_point_yields_same_lines() {
        let input: &[u8] =
            b"\x1b[?25l\x1b]0;agent\x07{\"type\":\"system\"}\r\nnoise\x1b[2K\n{\"type\":\"result\"}";
        let expected = collect(&[input]);
        assert_eq!(expected.len(), 3);

        for split in 0..=input.len() {
            let (head, tail) = input.split_at(split);
            assert_eq!(collect(&[head, tail]), expected, "split at {split}");
        }

        let bytewise: Vec<&[u8]> = input.chunks(1).collect();
        assert_eq!(collect(&bytewise), expected);
    }
}
