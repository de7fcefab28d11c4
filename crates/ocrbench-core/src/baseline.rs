//! Page-level sanity checks that apply to every rendering.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::evaluate::Verdict;
use crate::facts::BaselineFact;

/// Longest n-gram checked for tail repetition.
const MAX_NGRAM: usize = 5;

/// Emoji and pictographs, which no OCR of a scanned page should produce.
static DISALLOWED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[\x{1F600}-\x{1FAFF}\x{2600}-\x{27BF}\x{1F300}-\x{1F5FF}\x{1F680}-\x{1F6FF}\x{1F900}-\x{1F9FF}\x{1F1E0}-\x{1F1FF}\x{2B50}\x{2B06}\x{2194}-\x{21AA}]",
    )
    .unwrap()
});

/// For each n in `1..=MAX_NGRAM`, how many times the final n characters
/// repeat back-to-back at the end of `chars`.
pub fn tail_repeats(chars: &[char]) -> [usize; MAX_NGRAM] {
    let mut counts = [0; MAX_NGRAM];
    for n in 1..=MAX_NGRAM {
        if chars.len() < n {
            break;
        }
        let tail = &chars[chars.len() - n..];
        let mut count = 1;
        let mut end = chars.len() - n;
        while end >= n && &chars[end - n..end] == tail {
            count += 1;
            end -= n;
        }
        counts[n - 1] = count;
    }
    counts
}

/// Apply a baseline fact to a raw rendering.
pub fn check_baseline(text: &str, fact: &BaselineFact) -> Verdict {
    let alnum = text.chars().filter(|c| c.is_alphanumeric()).count();

    if let Some(max_length) = fact.max_length {
        return if alnum > max_length {
            Verdict::fail(format!(
                "expected a blank page: {alnum} alphanumeric characters, at most {max_length} allowed"
            ))
        } else {
            Verdict::pass(format!("blank page ({alnum} alphanumeric characters)"))
        };
    }

    if alnum == 0 {
        return Verdict::fail("rendering has no alphanumeric content");
    }

    let chars: Vec<char> = text.trim_end().chars().collect();
    for (i, count) in tail_repeats(&chars).into_iter().enumerate() {
        if count > fact.max_repeats {
            let n = i + 1;
            let gram: String = chars[chars.len() - n..].iter().collect();
            return Verdict::fail(format!(
                "text ends with {count} repeats of the {n}-gram \"{gram}\" (max {})",
                fact.max_repeats
            ));
        }
    }

    if fact.check_disallowed_characters
        && let Some(m) = DISALLOWED_RE.find(text)
    {
        return Verdict::fail(format!(
            "disallowed character \"{}\" at byte {}",
            m.as_str(),
            m.start()
        ));
    }

    Verdict::pass(format!("{alnum} alphanumeric characters, no degenerate output"))
}
