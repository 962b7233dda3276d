//! Text helpers shared by the document backends.

/// Split a document into chunks of roughly `max_chars` characters.
///
/// Paragraphs (separated by blank lines) are packed together until the next
/// one would overflow. A single paragraph longer than `max_chars` is split on
/// whitespace.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    let paragraphs = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty());

    for paragraph in paragraphs {
        let needed = if current.is_empty() {
            paragraph.chars().count()
        } else {
            current.chars().count() + 2 + paragraph.chars().count()
        };

        if needed <= max_chars {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if paragraph.chars().count() <= max_chars {
            current.push_str(paragraph);
        } else {
            for word in paragraph.split_whitespace() {
                let len = current.chars().count();
                if len > 0 && len + 1 + word.chars().count() > max_chars {
                    chunks.push(std::mem::take(&mut current));
                }
                if !current.is_empty() {
                    current.push(' ');
                }
                current.push_str(word);
            }
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Lowercased search terms of three or more alphanumeric characters.
pub(crate) fn search_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in query.split(|c: char| !c.is_alphanumeric()) {
        let word = word.to_lowercase();
        if word.chars().count() >= 3 && !terms.contains(&word) {
            terms.push(word);
        }
    }
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_paragraphs_are_packed() {
        let chunks = chunk_text("uno\n\ndos\n\n\n\ntres", 1000);
        assert_eq!(chunks, vec!["uno\n\ndos\n\ntres".to_string()]);
    }

    #[test]
    fn paragraphs_split_when_full() {
        let a = "a".repeat(600);
        let b = "b".repeat(600);
        let chunks = chunk_text(&format!("{a}\n\n{b}"), 1000);
        assert_eq!(chunks, vec![a, b]);
    }

    #[test]
    fn long_paragraph_splits_on_whitespace() {
        let paragraph = vec!["palabra"; 300].join(" ");
        let chunks = chunk_text(&paragraph, 100);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));
    }

    #[test]
    fn empty_document_has_no_chunks() {
        assert!(chunk_text("  \n\n  ", 1000).is_empty());
    }

    #[test]
    fn search_terms_drop_short_words_and_duplicates() {
        assert_eq!(
            search_terms("¿Cómo duerme el bebé? duerme mal"),
            vec!["cómo", "duerme", "bebé", "mal"]
        );
    }
}
