//! Approximate substring search.
//!
//! [`find_near_matches`] runs a semi-global edit-distance alignment (Sellers'
//! algorithm) over the haystack, one column per haystack character. Only the
//! rows that can still end within `max_diffs` are computed (Ukkonen's cut-off),
//! so a full page of text against a sentence-sized needle stays cheap even
//! with a generous tolerance.
//!
//! All positions are **character** offsets, not byte offsets.

use std::mem;

/// One approximate occurrence of a needle inside a haystack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzyMatch {
    /// Char offset of the first matched haystack character.
    pub start: usize,
    /// Char offset one past the last matched haystack character.
    pub end: usize,
    /// Insertions + deletions + substitutions needed.
    pub distance: usize,
}

impl FuzzyMatch {
    /// Render the matched span of `haystack` for explanations.
    pub fn snippet(&self, haystack: &[char]) -> String {
        haystack[self.start.min(haystack.len())..self.end.min(haystack.len())]
            .iter()
            .collect()
    }
}

/// Tolerance derived from text length when a fact doesn't give one.
///
/// One edit per 20 characters, at least one, never more than a quarter of
/// the text. Monotonic in `len`.
pub fn default_max_diffs(len: usize) -> usize {
    (len / 20).max(1).min(len / 4)
}

/// Clamp a requested tolerance so it stays well below the needle length.
///
/// At most `(len - 1) / 2` edits are allowed; otherwise a short needle would
/// match almost any text.
pub fn effective_max_diffs(needle_len: usize, max_diffs: usize) -> usize {
    max_diffs.min(needle_len.saturating_sub(1) / 2)
}

/// Find every non-overlapping region of `haystack` within `max_diffs` edits
/// of `needle`, best match per region, ordered by position.
///
/// `max_diffs` is used as given; callers wanting the safety cap apply
/// [`effective_max_diffs`] first.
pub fn find_near_matches(haystack: &[char], needle: &[char], max_diffs: usize) -> Vec<FuzzyMatch> {
    let m = needle.len();
    if m == 0 || haystack.is_empty() {
        return vec![];
    }
    let k = max_diffs;
    let cap = k + 1;

    // Column 0: matching needle[..i] against nothing costs i deletions.
    let mut prev = vec![cap; m + 1];
    for (i, slot) in prev.iter_mut().enumerate().take(m.min(k) + 1) {
        *slot = i;
    }
    let mut prev_start = vec![0usize; m + 1];
    let mut prev_hi = m.min(k);
    let mut prev_written = m.min(k);

    let mut cur = vec![cap; m + 1];
    let mut cur_start = vec![0usize; m + 1];
    let mut cur_written = 0usize;

    let mut raw = Vec::new();

    for (j, &hc) in haystack.iter().enumerate() {
        let col = j + 1;
        cur[0] = 0;
        cur_start[0] = col;

        let limit = (prev_hi + 1).min(m);
        let mut hi = 0;
        for i in 1..=limit {
            let diag = prev[i - 1] + usize::from(needle[i - 1] != hc);
            let skip_hay = prev[i] + 1;
            let skip_needle = cur[i - 1] + 1;

            let (mut v, mut s) = (diag, prev_start[i - 1]);
            if skip_hay < v {
                v = skip_hay;
                s = prev_start[i];
            }
            if skip_needle < v {
                v = skip_needle;
                s = cur_start[i - 1];
            }
            let v = v.min(cap);
            cur[i] = v;
            cur_start[i] = s;
            if v <= k {
                hi = i;
            }
        }
        // Rows above `limit` still hold a column from two steps back.
        if cur_written > limit {
            for slot in &mut cur[limit + 1..=cur_written] {
                *slot = cap;
            }
        }
        cur_written = limit;

        if hi == m {
            raw.push(FuzzyMatch {
                start: cur_start[m],
                end: col,
                distance: cur[m],
            });
        }

        mem::swap(&mut prev, &mut cur);
        mem::swap(&mut prev_start, &mut cur_start);
        mem::swap(&mut prev_written, &mut cur_written);
        prev_hi = hi;
    }

    collapse_overlapping(raw)
}

/// Keep the lowest-distance match out of each run of overlapping candidates.
fn collapse_overlapping(raw: Vec<FuzzyMatch>) -> Vec<FuzzyMatch> {
    let mut out: Vec<FuzzyMatch> = Vec::new();
    let mut group_end = 0usize;
    for m in raw {
        match out.last_mut() {
            Some(best) if m.start < group_end => {
                group_end = group_end.max(m.end);
                if m.distance < best.distance {
                    *best = m;
                }
            }
            _ => {
                group_end = m.end;
                out.push(m);
            }
        }
    }
    out
}

/// Best approximate occurrence of `needle` in `haystack` within `max_diffs`
/// (after [`effective_max_diffs`] capping). Lowest distance wins; ties go to
/// the earliest occurrence. `None` on empty haystack or needle.
pub fn find_best_match(haystack: &[char], needle: &[char], max_diffs: usize) -> Option<FuzzyMatch> {
    let k = effective_max_diffs(needle.len(), max_diffs);
    find_near_matches(haystack, needle, k)
        .into_iter()
        .min_by_key(|m| (m.distance, m.start))
}

/// Closest region of `haystack` to `needle` with no tolerance limit.
///
/// Used to tell the user what was found instead when a match fails.
pub fn nearest_match(haystack: &[char], needle: &[char]) -> Option<FuzzyMatch> {
    find_near_matches(haystack, needle, needle.len())
        .into_iter()
        .filter(|m| m.end > m.start)
        .min_by_key(|m| (m.distance, m.start))
}

/// Plain Levenshtein distance between two whole strings.
pub fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut cur = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        cur[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let sub = prev[j] + usize::from(ca != cb);
            cur[j + 1] = sub.min(prev[j + 1] + 1).min(cur[j] + 1);
        }
        mem::swap(&mut prev, &mut cur);
    }
    prev[b.len()]
}

/// Whole-string fuzzy equality: `Some(distance)` when within `max_diffs`
/// (capped like substring search).
pub fn text_matches(candidate: &str, expected: &str, max_diffs: usize) -> Option<usize> {
    let a: Vec<char> = candidate.chars().collect();
    let b: Vec<char> = expected.chars().collect();
    if b.is_empty() {
        return a.is_empty().then_some(0);
    }
    let k = effective_max_diffs(b.len(), max_diffs);
    if a.len().abs_diff(b.len()) > k {
        return None;
    }
    let d = levenshtein(&a, &b);
    (d <= k).then_some(d)
}

/// Similarity in `[0, 1]` for ranking near-misses.
pub fn similarity(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    rapidfuzz::fuzz::ratio(a.chars(), b.chars())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    // =========================================================================
    // Exact and approximate search
    // =========================================================================

    #[test]
    fn test_exact_match_found() {
        let hay = chars("The quick brown fox jumps over the lazy dog");
        let m = find_best_match(&hay, &chars("brown fox"), 0).unwrap();
        assert_eq!(m.distance, 0);
        assert_eq!(m.snippet(&hay), "brown fox");
        assert_eq!(m.start, 10);
        assert_eq!(m.end, 19);
    }

    #[test]
    fn test_exact_match_missing() {
        let hay = chars("The quick brown fox");
        assert!(find_best_match(&hay, &chars("brown cat"), 0).is_none());
    }

    #[test]
    fn test_substitution_within_tolerance() {
        let hay = chars("The quick brown fox");
        let m = find_best_match(&hay, &chars("quack brown"), 1).unwrap();
        assert_eq!(m.distance, 1);
    }

    #[test]
    fn test_insertion_and_deletion() {
        let hay = chars("recognition of characters");
        // one missing letter, one extra letter
        assert!(find_best_match(&hay, &chars("recogniton"), 1).is_some());
        assert!(find_best_match(&hay, &chars("charactterss"), 2).is_some());
        assert!(find_best_match(&hay, &chars("charactterss"), 1).is_none());
    }

    #[test]
    fn test_match_at_haystack_edges() {
        let hay = chars("alpha beta gamma");
        assert_eq!(find_best_match(&hay, &chars("alpha"), 0).unwrap().start, 0);
        assert_eq!(find_best_match(&hay, &chars("gamma"), 0).unwrap().end, hay.len());
    }

    #[test]
    fn test_empty_inputs() {
        assert!(find_best_match(&[], &chars("abc"), 2).is_none());
        assert!(find_best_match(&chars("abc"), &[], 2).is_none());
    }

    #[test]
    fn test_tolerance_capped_below_needle_length() {
        // Asking for 10 edits on a 4-char needle must not match arbitrary text.
        let hay = chars("completely unrelated words here");
        assert!(find_best_match(&hay, &chars("zqxj"), 10).is_none());
        assert_eq!(effective_max_diffs(4, 10), 1);
        assert_eq!(effective_max_diffs(1, 5), 0);
    }

    #[test]
    fn test_multiple_occurrences_collapsed() {
        let hay = chars("one cat, two cats, three cats");
        let matches = find_near_matches(&hay, &chars("cat"), 0);
        assert_eq!(matches.len(), 3);
        assert!(matches.windows(2).all(|w| w[0].end <= w[1].start));
    }

    #[test]
    fn test_best_prefers_lower_distance() {
        let hay = chars("color colour");
        let m = find_best_match(&hay, &chars("colour"), 1).unwrap();
        assert_eq!(m.distance, 0);
        assert_eq!(m.start, 6);
    }

    #[test]
    fn test_long_haystack_performance_smoke() {
        let para = "Lorem ipsum dolor sit amet, consectetur adipiscing elit. ";
        let hay: Vec<char> = para.repeat(800).chars().collect();
        let needle = chars("Sed do eiusmod tempor incididunt ut labore et dolore magna aliqua.");
        assert!(find_best_match(&hay, &needle, 3).is_none());
        let needle = chars("consectetur adipiscing elit. Lorem ipsum");
        assert!(find_best_match(&hay, &needle, 2).is_some());
    }

    #[test]
    fn test_nearest_match_reports_closest() {
        let hay = chars("the results were significant");
        let m = nearest_match(&hay, &chars("results are significant")).unwrap();
        assert!(m.distance > 0);
        assert!(m.snippet(&hay).contains("significant"));
    }

    // =========================================================================
    // Whole-string comparisons
    // =========================================================================

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein(&chars("kitten"), &chars("sitting")), 3);
        assert_eq!(levenshtein(&chars(""), &chars("abc")), 3);
        assert_eq!(levenshtein(&chars("same"), &chars("same")), 0);
    }

    #[test]
    fn test_text_matches() {
        assert_eq!(text_matches("3.32T", "3.32T", 0), Some(0));
        assert_eq!(text_matches("3.32 T", "3.32T", 1), Some(1));
        assert_eq!(text_matches("3.71T", "3.32T", 0), None);
        assert_eq!(text_matches("", "", 0), Some(0));
        assert_eq!(text_matches("x", "", 0), None);
    }

    #[test]
    fn test_default_max_diffs_monotonic_and_bounded() {
        let mut last = 0;
        for len in 0..500 {
            let d = default_max_diffs(len);
            assert!(d >= last, "not monotonic at {len}");
            assert!(d <= len / 4, "exceeds a quarter at {len}");
            last = d;
        }
        assert_eq!(default_max_diffs(40), 2);
        assert_eq!(default_max_diffs(3), 0);
    }

    #[test]
    fn test_similarity_range() {
        assert!((similarity("abc", "abc") - 1.0).abs() < 1e-9);
        assert!(similarity("abc", "xyz") < 0.5);
    }
}
