/// Characters of context kept on each side of a match.
pub const CONTEXT_RADIUS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Excerpt<'a> {
    pub text: &'a str,
    /// False when no term was located and `text` is the whole transcript.
    pub matched: bool,
}

/// Cut `radius` chars either side of the start of the earliest case-insensitive match
/// of any term: chars `[max(0, pos - radius), min(len, pos + radius))`.
///
/// The server-side filter and the local fold can disagree (e.g. `ß` vs `SS`); when no
/// term is located here the full text is returned with `matched = false`.
pub fn context_window<'a>(text: &'a str, terms: &[String], radius: usize) -> Excerpt<'a> {
    let chars: Vec<(usize, char)> = text.char_indices().collect();
    let Some(pos) = terms.iter().filter_map(|t| find_ignore_case(&chars, t)).min() else {
        return Excerpt {
            text,
            matched: false,
        };
    };

    let start = chars[pos.saturating_sub(radius)].0;
    let end = chars
        .get(pos.saturating_add(radius))
        .map_or(text.len(), |(byte, _)| *byte);
    Excerpt {
        text: &text[start..end],
        matched: true,
    }
}

/// Char index of the first occurrence of `term`.
fn find_ignore_case(haystack: &[(usize, char)], term: &str) -> Option<usize> {
    let needle: Vec<char> = term.chars().collect();
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&i| {
        needle
            .iter()
            .zip(&haystack[i..])
            .all(|(&n, &(_, h))| n == h || n.to_lowercase().eq(h.to_lowercase()))
    })
}
