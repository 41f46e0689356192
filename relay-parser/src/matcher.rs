//! Tag matching against partial input.

/// Result of matching an opening tag at a position in the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The input ends while still a prefix of the tag (or right after the
    /// tag name, before the byte that tells a real tag from a lookalike).
    NeedMore,
    /// The full tag name is present and followed by `>` or whitespace.
    Matched,
    /// The input stops matching at byte offset `at`. Everything in
    /// `start..at` is ordinary text.
    Diverged { at: usize },
}

/// Match `tag` (e.g. `<relayArtifact`) against `input` starting at `start`.
///
/// `input[start]` is expected to be the first byte of `tag`. The byte after
/// the tag name decides between a structural tag and an unrelated one that
/// only shares the prefix (`<relayArtifacts>`), so a complete tag name at
/// the very end of the input still needs more input.
pub fn match_open_tag(input: &str, start: usize, tag: &str) -> MatchOutcome {
    let bytes = input.as_bytes();
    let tag = tag.as_bytes();

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        let j = start + offset;
        match tag.get(offset) {
            Some(&expected) if expected == byte => continue,
            Some(_) => return diverged(input, start, j),
            None if is_tag_boundary(byte) => return MatchOutcome::Matched,
            None => return diverged(input, start, j),
        }
    }

    MatchOutcome::NeedMore
}

/// Bytes allowed right after a tag name.
fn is_tag_boundary(byte: u8) -> bool {
    byte == b'>' || byte.is_ascii_whitespace()
}

fn diverged(input: &str, start: usize, mut at: usize) -> MatchOutcome {
    // A multi-byte tag name can diverge mid-character; text must split on a
    // char boundary and always make progress past `start`.
    while at > start + 1 && !input.is_char_boundary(at) {
        at -= 1;
    }
    MatchOutcome::Diverged { at: at.max(start + 1) }
}
