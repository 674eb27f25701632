//! Terminal control-sequence stripping for PTY-wrapped output.
//!
//! Output that passes through a pseudo-terminal picks up cursor movement,
//! colors, window titles and mode switches. None of it belongs to the JSON
//! payload, so it is removed before any line is decoded.

use std::borrow::Cow;
use std::sync::OnceLock;

use regex::Regex;

/// Patterns applied in order. Stray control bytes are removed last so that
/// they cannot be mistaken for the start of a sequence by an earlier pass.
const CONTROL_PATTERNS: &[&str] = &[
    // CSI: colors, cursor movement, erase
    r"\x1B\[[0-9;]*[a-zA-Z]",
    // OSC: window title and friends, terminated by BEL or ESC \
    r"\x1B\][^\x07\x1B]*(?:\x07|\x1B\\)",
    // Character set selection
    r"\x1B\([A-Z]",
    // Keypad mode
    r"\x1B[=>]",
    // Private CSI (e.g. ?25h)
    r"\x1B\[\?[0-9;]*[a-zA-Z]",
    // Remaining C0 controls except \t \n \r
    r"[\x00-\x08\x0B\x0C\x0E-\x1F]",
];

fn control_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        CONTROL_PATTERNS
            .iter()
            .map(|pattern| Regex::new(pattern).expect("control pattern is valid"))
            .collect()
    })
}

/// Strip terminal control sequences from raw output bytes.
///
/// Invalid UTF-8 is replaced rather than rejected. `\r\n` and lone `\r`
/// both become `\n`.
#[must_use]
pub fn sanitize(raw: &[u8]) -> String {
    let mut text: Cow<'_, str> = String::from_utf8_lossy(raw);

    for pattern in control_patterns() {
        if let Cow::Owned(stripped) = pattern.replace_all(&text, "") {
            text = Cow::Owned(stripped);
        }
    }

    normalize_newlines(&text)
}

fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}
