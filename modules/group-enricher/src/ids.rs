//! Turning spreadsheet cells into VK group ids, and chunking helpers.

/// Prefixes VK puts in front of a numeric community id in short links.
const NUMERIC_ID_PREFIXES: &[&str] = &["club", "public", "event"];

/// Derive a group id from a link or bare id: the last path segment, with a
/// `club`/`public`/`event` prefix stripped when it is followed by digits.
///
/// `https://vk.com/club12345` → `12345`, `https://vk.com/pavel_durov` →
/// `pavel_durov`. Blank cells give an empty string.
pub fn extract_id(raw: &str) -> String {
    let without_suffix = raw.trim().split(['?', '#']).next().unwrap_or_default();
    let segment = without_suffix
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default();

    for prefix in NUMERIC_ID_PREFIXES {
        if let Some(rest) = segment.strip_prefix(prefix) {
            if !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()) {
                return rest.to_string();
            }
        }
    }
    segment.to_string()
}

/// Split into consecutive chunks of at most `size` items (the last may be shorter).
pub fn split_into_chunks<T: Clone>(items: &[T], size: usize) -> Vec<Vec<T>> {
    items.chunks(size.max(1)).map(<[T]>::to_vec).collect()
}

/// First signed integer appearing in free text: `"Score: -3 (low)"` → `-3`.
pub fn leading_integer(text: &str) -> Option<i64> {
    let bytes = text.as_bytes();
    let start = (0..bytes.len()).find(|&i| {
        bytes[i].is_ascii_digit()
            || (bytes[i] == b'-' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
    })?;
    let digits_from = if bytes[start] == b'-' { start + 1 } else { start };
    let end = (digits_from..bytes.len())
        .find(|&i| !bytes[i].is_ascii_digit())
        .unwrap_or(bytes.len());
    text[start..end].parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn club_links_yield_numeric_id() {
        assert_eq!(extract_id("https://vk.com/club12345"), "12345");
        assert_eq!(extract_id("https://vk.com/public777"), "777");
    }

    #[test]
    fn screen_names_are_kept() {
        assert_eq!(extract_id("https://vk.com/pavel_durov"), "pavel_durov");
        assert_eq!(extract_id("https://vk.com/clubhouse"), "clubhouse");
        assert_eq!(extract_id("apiclub"), "apiclub");
    }

    #[test]
    fn extraction_ignores_noise_around_the_segment() {
        assert_eq!(extract_id("  https://vk.com/club42/  "), "42");
        assert_eq!(extract_id("https://m.vk.com/club42?from=search#wall"), "42");
        assert_eq!(extract_id("vk.com/team"), "team");
    }

    #[test]
    fn extraction_is_idempotent() {
        let once = extract_id("https://vk.com/club12345");
        assert_eq!(extract_id(&once), once);
    }

    #[test]
    fn blank_cells_give_empty_id() {
        assert_eq!(extract_id(""), "");
        assert_eq!(extract_id("   "), "");
    }

    #[test]
    fn chunks_keep_order_with_short_tail() {
        let items: Vec<u32> = (1..=10).collect();
        assert_eq!(
            split_into_chunks(&items, 3),
            vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9], vec![10]]
        );
    }

    #[test]
    fn chunks_of_empty_input_are_empty() {
        let items: Vec<u32> = Vec::new();
        assert!(split_into_chunks(&items, 3).is_empty());
    }

    #[test]
    fn zero_chunk_size_is_treated_as_one() {
        assert_eq!(split_into_chunks(&[1, 2], 0), vec![vec![1], vec![2]]);
    }

    #[test]
    fn leading_integer_takes_first_signed_number() {
        assert_eq!(leading_integer("7"), Some(7));
        assert_eq!(leading_integer("Score: -3 (low)"), Some(-3));
        assert_eq!(leading_integer("8/10"), Some(8));
        assert_eq!(leading_integer("well - 5"), Some(5));
        assert_eq!(leading_integer("none"), None);
    }
}
