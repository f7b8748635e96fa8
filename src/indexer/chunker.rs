//! Splits extracted text into overlapping windows, preferring to end each
//! window on a paragraph, line, sentence or word boundary.

/// Boundaries tried in order when looking for a place to end a window.
const BREAKS: &[&str] = &["\n\n", "\n", ". ", "? ", "! ", "。", "？", "！", " "];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    max_bytes: usize,
    overlap: usize,
}

impl Chunker {
    /// `overlap` is clamped below `max_bytes` so every window makes progress.
    pub fn new(max_bytes: usize, overlap: usize) -> Self {
        let max_bytes = max_bytes.max(1);
        Self {
            max_bytes,
            overlap: overlap.min(max_bytes - 1),
        }
    }

    pub fn split(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        if text.len() <= self.max_bytes {
            return vec![text.to_string()];
        }

        let mut pieces = Vec::new();
        let mut start = 0;
        while start < text.len() {
            let limit = ceil_boundary(text, start + self.max_bytes);
            let end = if limit < text.len() {
                break_before(text, start, limit)
            } else {
                limit
            };

            let piece = text[start..end].trim();
            if !piece.is_empty() {
                pieces.push(piece.to_string());
            }
            if end >= text.len() {
                break;
            }

            let next = floor_boundary(text, end.saturating_sub(self.overlap));
            start = if next > start { next } else { end };
        }
        pieces
    }
}

fn ceil_boundary(text: &str, mut pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    while !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

fn floor_boundary(text: &str, mut pos: usize) -> usize {
    if pos >= text.len() {
        return text.len();
    }
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

fn break_before(text: &str, start: usize, limit: usize) -> usize {
    let window = &text[start..limit];
    BREAKS
        .iter()
        .find_map(|sep| window.rfind(sep).map(|pos| start + pos + sep.len()))
        .filter(|end| *end > start)
        .unwrap_or(limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_text_single_chunk() {
        assert_eq!(Chunker::new(100, 10).split("  short  "), vec!["short"]);
    }

    #[test]
    fn test_empty_text() {
        assert!(Chunker::new(100, 10).split("   ").is_empty());
    }

    #[test]
    fn test_breaks_on_sentences() {
        let text = "First sentence here. Second sentence here. Third sentence here.";
        let pieces = Chunker::new(30, 0).split(text);
        assert_eq!(pieces[0], "First sentence here.");
        assert!(pieces.iter().all(|p| p.len() <= 30));
    }

    #[test]
    fn test_overlap_repeats_tail() {
        let text = "aaaa bbbb cccc dddd eeee ffff gggg";
        let pieces = Chunker::new(15, 5).split(text);
        assert!(pieces.len() > 2);
        let last_word = pieces[0].split(' ').last().unwrap();
        assert!(pieces[1].contains(last_word));
    }

    #[test]
    fn test_multibyte_text() {
        let text = "これはテスト文章です。日本語のマルチバイト文字を含むテキストを正しく分割できるか確認します。";
        let pieces = Chunker::new(40, 8).split(text);
        assert!(pieces.len() > 1);
        assert!(pieces.iter().all(|p| !p.is_empty()));
    }

    #[test]
    fn test_unbroken_text_hard_splits() {
        let text = "x".repeat(250);
        let pieces = Chunker::new(100, 0).split(&text);
        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces.concat(), text);
    }
}
