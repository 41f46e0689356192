//! Splitting a finished transcript back into the cumulative prefixes a live
//! stream would have delivered.

/// Byte offsets at which to cut `text` so each prefix grows by `chunk_size`
/// characters. The last offset is always `text.len()`.
///
/// A `chunk_size` of zero delivers the whole text at once.
pub fn prefix_ends(text: &str, chunk_size: usize) -> Vec<usize> {
    if chunk_size == 0 || text.is_empty() {
        return vec![text.len()];
    }

    text.char_indices()
        .map(|(i, _)| i)
        .skip(chunk_size)
        .step_by(chunk_size)
        .chain(std::iter::once(text.len()))
        .collect()
}
