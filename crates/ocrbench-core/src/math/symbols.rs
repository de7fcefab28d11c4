//! Flatten rendered MathML into an ordered sequence of leaf symbols.
//!
//! Symbols are read the way the typeset expression is read: left to right,
//! and for stacked constructs top to bottom. So `\int_a^b` yields `∫ b a`
//! and `\frac{x}{y}` yields `x y`.

use scraper::{ElementRef, Html};

/// Leaf elements whose text is made of symbols.
const TOKEN_ELEMENTS: &[&str] = &["mi", "mn", "mo", "mtext", "ms"];

/// Subtrees that carry no visible math.
const SKIPPED_ELEMENTS: &[&str] = &["annotation", "annotation-xml", "mspace", "mprescripts", "none"];

fn is_invisible(c: char) -> bool {
    c.is_whitespace() || ('\u{2061}'..='\u{2064}').contains(&c) || c == '\u{200B}'
}

/// Symbol sequence of a MathML (or HTML containing MathML) document.
pub fn mathml_symbols(mathml: &str) -> Vec<char> {
    let fragment = Html::parse_fragment(mathml);
    let mut out = Vec::new();
    walk(fragment.root_element(), &mut out);
    out
}

fn element_children(el: ElementRef<'_>) -> Vec<ElementRef<'_>> {
    el.children().filter_map(ElementRef::wrap).collect()
}

fn walk(el: ElementRef<'_>, out: &mut Vec<char>) {
    let name = el.value().name();
    if SKIPPED_ELEMENTS.contains(&name) {
        return;
    }
    if TOKEN_ELEMENTS.contains(&name) {
        out.extend(el.text().flat_map(str::chars).filter(|c| !is_invisible(*c)));
        return;
    }

    let kids = element_children(el);
    // Positional reading order for the script/limit layouts.
    let order: &[usize] = match (name, kids.len()) {
        ("msubsup", 3) => &[0, 2, 1],
        ("munderover", 3) => &[2, 0, 1],
        ("mover", 2) => &[1, 0],
        ("mroot", 2) => &[1, 0],
        _ => {
            for kid in kids {
                walk(kid, out);
            }
            return;
        }
    };
    for &i in order {
        walk(kids[i], out);
    }
}

/// `true` when every symbol of `target` occurs in `candidate` in the same
/// relative order (gaps allowed).
pub fn is_ordered_subsequence(target: &[char], candidate: &[char]) -> bool {
    let mut it = candidate.iter();
    target.iter().all(|t| it.any(|c| c == t))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syms(mathml: &str) -> String {
        mathml_symbols(mathml).into_iter().collect()
    }

    #[test]
    fn test_leaves_in_order() {
        let m = "<math><mrow><mn>3</mn><msup><mi>x</mi><mn>2</mn></msup></mrow></math>";
        assert_eq!(syms(m), "3x2");
    }

    #[test]
    fn test_integral_limits_top_to_bottom() {
        let m = "<math><mrow><msubsup><mo>∫</mo><mi>a</mi><mi>b</mi></msubsup>\
                 <mn>3</mn><msup><mi>x</mi><mn>2</mn></msup><mspace width=\"0.1667em\"></mspace>\
                 <mi>d</mi><mi>x</mi></mrow></math>";
        assert_eq!(syms(m), "∫ba3x2dx");
    }

    #[test]
    fn test_under_over_and_root() {
        let m = "<math><munderover><mo>∑</mo><mrow><mi>i</mi><mo>=</mo><mn>1</mn></mrow><mi>n</mi></munderover></math>";
        assert_eq!(syms(m), "n∑i=1");
        let m = "<math><mroot><mi>x</mi><mn>3</mn></mroot></math>";
        assert_eq!(syms(m), "3x");
        let m = "<math><mover><mi>x</mi><mo>^</mo></mover></math>";
        assert_eq!(syms(m), "^x");
        let m = "<math><mfrac><mi>a</mi><mi>b</mi></mfrac></math>";
        assert_eq!(syms(m), "ab");
    }

    #[test]
    fn test_annotation_and_invisible_operators_skipped() {
        let m = "<span class=\"katex\"><math><semantics><mrow><mi>f</mi><mo>\u{2061}</mo>\
                 <mo>(</mo><mi>x</mi><mo>)</mo></mrow>\
                 <annotation encoding=\"application/x-tex\">f(x)</annotation></semantics></math></span>";
        assert_eq!(syms(m), "f(x)");
    }

    #[test]
    fn test_multi_letter_identifiers_split() {
        let m = "<math><mi>sin</mi><mi>θ</mi></math>";
        assert_eq!(syms(m), "sinθ");
    }

    #[test]
    fn test_ordered_subsequence() {
        let cand: Vec<char> = "∫ba3x2dx".chars().collect();
        assert!(is_ordered_subsequence(&"3x2".chars().collect::<Vec<_>>(), &cand));
        assert!(is_ordered_subsequence(&[], &cand));
        assert!(!is_ordered_subsequence(&"dx∫".chars().collect::<Vec<_>>(), &cand));
        assert!(!is_ordered_subsequence(&"y".chars().collect::<Vec<_>>(), &cand));
    }
}
