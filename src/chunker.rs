//! Overlapping fixed-window text chunking.
//!
//! Documents are split into the units of embedding and retrieval here;
//! the same splitter must be used at ingestion time and when re-running
//! embeddings so chunk indices stay stable.

pub const CHUNK_SIZE: usize = 500;
pub const CHUNK_OVERLAP: usize = 50;

/// Split text into overlapping chunks.
///
/// Windows of `CHUNK_SIZE` characters slide from the start of the text in
/// steps of `CHUNK_SIZE - CHUNK_OVERLAP`. Each window is trimmed; windows
/// that trim to nothing are dropped. Deterministic for a given input.
pub fn chunk_text(text: &str) -> Vec<String> {
    chunk_text_with(text, CHUNK_SIZE, CHUNK_OVERLAP)
}

/// `chunk_text` with explicit window geometry.
pub fn chunk_text_with(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let step = chunk_size.saturating_sub(overlap).max(1);

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < total {
        let end = (start + chunk_size).min(total);
        let window: String = chars[start..end].iter().collect();
        let trimmed = window.trim();

        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        start += step;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_is_deterministic() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(40);
        assert_eq!(chunk_text(&text), chunk_text(&text));
    }

    #[test]
    fn short_text_yields_single_chunk() {
        let chunks = chunk_text("  hello world  ");
        assert_eq!(chunks, vec!["hello world".to_string()]);
    }

    #[test]
    fn empty_and_whitespace_yield_no_chunks() {
        assert!(chunk_text("").is_empty());
        assert!(chunk_text("   \n\t  ").is_empty());
    }

    #[test]
    fn twelve_hundred_chars_yield_three_chunks() {
        // 1200 non-whitespace chars: windows at 0, 450, and 900.
        let text: String = std::iter::repeat('x').take(1200).collect();
        let chunks = chunk_text(&text);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 500);
        assert_eq!(chunks[1].len(), 500);
        assert_eq!(chunks[2].len(), 300);

        // The second window starts 450 characters into the source.
        let marked: String = (0..1200)
            .map(|i| if i == 450 { 'A' } else { 'x' })
            .collect();
        let marked_chunks = chunk_text(&marked);
        assert!(marked_chunks[1].starts_with('A'));
    }

    #[test]
    fn no_characters_lost_across_boundaries() {
        let text: String = ('a'..='z').cycle().take(1337).collect();
        let chunks = chunk_text(&text);

        // Consecutive windows overlap by 50 chars; dropping the overlap from
        // every chunk after the first must reconstruct the original.
        let mut rebuilt = chunks[0].clone();
        for chunk in &chunks[1..] {
            let tail: String = chunk.chars().skip(CHUNK_OVERLAP).collect();
            rebuilt.push_str(&tail);
        }
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let text = "日本語のテキスト。".repeat(120);
        let chunks = chunk_text(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= CHUNK_SIZE);
        }
    }
}
