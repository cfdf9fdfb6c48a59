//! Line breaking for text blobs.
//!
//! Two policies: `no_wrap` passes the input through as a single row, and
//! `soft_wrap` greedily word-wraps to a target width. Embedded newlines are
//! hard line breaks in the soft policy. A single word wider than the target
//! is character-broken into width-sized chunks, one row per chunk.
//!
//! Widths are measured in code points, matching the cell grid the rows are
//! rasterized into.

/// One row per input; empty input yields no rows.
pub fn no_wrap(s: &str) -> Vec<String> {
    if s.is_empty() {
        return Vec::new();
    }
    vec![s.to_string()]
}

/// Greedy word wrap to `width` code points per row.
///
/// Words are whitespace-delimited. A row is extended while appending the
/// next word plus a separating space stays within the width; otherwise the
/// row is flushed. Empty input (or a zero width) yields no rows.
pub fn soft_wrap(s: &str, width: usize) -> Vec<String> {
    if s.is_empty() || width == 0 {
        return Vec::new();
    }
    let mut rows = Vec::new();
    for line in s.split('\n') {
        wrap_line(line, width, &mut rows);
    }
    rows
}

fn wrap_line(line: &str, width: usize, rows: &mut Vec<String>) {
    if line.trim().is_empty() {
        rows.push(String::new());
        return;
    }
    let mut current = String::new();
    let mut current_len = 0usize;
    for word in line.split_whitespace() {
        let word_len = word.chars().count();
        if word_len > width {
            // Hard character break; each chunk becomes its own row.
            if !current.is_empty() {
                rows.push(std::mem::take(&mut current));
                current_len = 0;
            }
            for chunk in char_chunks(word, width) {
                rows.push(chunk);
            }
            continue;
        }
        if current.is_empty() {
            current.push_str(word);
            current_len = word_len;
        } else if current_len + 1 + word_len <= width {
            current.push(' ');
            current.push_str(word);
            current_len += 1 + word_len;
        } else {
            rows.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        }
    }
    if !current.is_empty() {
        rows.push(current);
    }
}

fn char_chunks(word: &str, width: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars.chunks(width).map(|c| c.iter().collect()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_zero_rows() {
        assert!(no_wrap("").is_empty());
        assert!(soft_wrap("", 10).is_empty());
    }

    #[test]
    fn no_wrap_is_a_single_row() {
        assert_eq!(no_wrap("hello world"), vec!["hello world"]);
    }

    #[test]
    fn soft_wrap_breaks_greedily() {
        let rows = soft_wrap("the quick brown fox", 9);
        assert_eq!(rows, vec!["the quick", "brown fox"]);
    }

    #[test]
    fn soft_wrap_keeps_rows_within_width() {
        let rows = soft_wrap("alpha beta gamma delta epsilon", 7);
        for row in &rows {
            assert!(row.chars().count() <= 7, "row too wide: {:?}", row);
        }
    }

    #[test]
    fn single_overlong_word_is_hard_broken() {
        let rows = soft_wrap("abcdefghij", 4);
        assert_eq!(rows, vec!["abcd", "efgh", "ij"]);
    }

    #[test]
    fn overlong_word_mid_line_flushes_first() {
        let rows = soft_wrap("ok reallylongword end", 6);
        assert_eq!(rows, vec!["ok", "really", "longwo", "rd", "end"]);
    }

    #[test]
    fn embedded_newlines_are_hard_breaks() {
        let rows = soft_wrap("one\n\ntwo three", 20);
        assert_eq!(rows, vec!["one", "", "two three"]);
    }

    #[test]
    fn wrap_preserves_collapsed_content() {
        // Law: joining rows with single spaces equals the whitespace-collapsed
        // input (no hard-broken words in this sample).
        let input = "a  few   words to wrap over lines";
        let rows = soft_wrap(input, 8);
        let joined = rows.join(" ");
        let collapse = |s: &str| s.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(collapse(&joined), collapse(input));
    }

    #[test]
    fn multibyte_runes_count_as_one_cell() {
        let rows = soft_wrap("héllo wörld", 5);
        assert_eq!(rows, vec!["héllo", "wörld"]);
    }
}
