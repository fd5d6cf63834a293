//! Natural ("human") ordering of names.
//!
//! Scanlation archives are rarely zero-padded: `Ch 2.cbz` must come before
//! `Ch 10.cbz`, and page `9.jpg` before `10.jpg`. Every ordering decision in
//! the pipeline (archives, chapters, pages) goes through [`natural_cmp`].
//!
//! Runs of ASCII digits compare by numeric value, everything else compares
//! character by character. When two names are equal under that rule
//! (`Ch 01` vs `Ch 1`) the plain string order breaks the tie so the ordering
//! stays total and deterministic.

use std::cmp::Ordering;
use std::path::Path;

/// Compare two strings in natural order.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.char_indices().peekable();
    let mut bi = b.char_indices().peekable();

    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((sa, ca)), Some((sb, cb))) => {
                if ca.is_ascii_digit() && cb.is_ascii_digit() {
                    let ea = digit_run_end(a, sa);
                    let eb = digit_run_end(b, sb);
                    let ord = cmp_digit_runs(&a[sa..ea], &b[sb..eb]);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                    while ai.peek().is_some_and(|&(i, _)| i < ea) {
                        ai.next();
                    }
                    while bi.peek().is_some_and(|&(i, _)| i < eb) {
                        bi.next();
                    }
                } else {
                    let ord = ca.cmp(&cb);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                    ai.next();
                    bi.next();
                }
            }
        }
    }
}

/// Compare two paths by their string form in natural order.
pub fn natural_cmp_path(a: &Path, b: &Path) -> Ordering {
    natural_cmp(&a.to_string_lossy(), &b.to_string_lossy())
}

/// Sort a slice of strings in place, naturally.
pub fn natural_sort<S: AsRef<str>>(items: &mut [S]) {
    items.sort_by(|a, b| natural_cmp(a.as_ref(), b.as_ref()));
}

fn digit_run_end(s: &str, start: usize) -> usize {
    s[start..]
        .find(|c: char| !c.is_ascii_digit())
        .map_or(s.len(), |off| start + off)
}

/// Numeric comparison of two digit runs of arbitrary length.
fn cmp_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sorted(items: &[&str]) -> Vec<String> {
        let mut v: Vec<String> = items.iter().map(|s| s.to_string()).collect();
        natural_sort(&mut v);
        v
    }

    #[test]
    fn numbers_compare_by_value() {
        assert_eq!(
            sorted(&["Ch 10.cbz", "Ch 2.cbz", "Ch 1.cbz"]),
            vec!["Ch 1.cbz", "Ch 2.cbz", "Ch 10.cbz"]
        );
    }

    #[test]
    fn unit_names_keep_chapter_then_page_order() {
        assert_eq!(
            sorted(&["Ch 10-0.jpg", "Ch 1-10.jpg", "Ch 1-2.jpg", "Ch 2-0.jpg"]),
            vec!["Ch 1-2.jpg", "Ch 1-10.jpg", "Ch 2-0.jpg", "Ch 10-0.jpg"]
        );
    }

    #[test]
    fn leading_zeros_tie_break_is_total() {
        assert_eq!(natural_cmp("Ch 01", "Ch 1"), "Ch 01".cmp("Ch 1"));
        assert_ne!(natural_cmp("Ch 01", "Ch 1"), Ordering::Equal);
        assert_eq!(natural_cmp("007", "7").reverse(), natural_cmp("7", "007"));
    }

    #[test]
    fn prefix_sorts_first() {
        assert_eq!(natural_cmp("Vol", "Vol 1"), Ordering::Less);
        assert_eq!(natural_cmp("", "a"), Ordering::Less);
        assert_eq!(natural_cmp("a", "a"), Ordering::Equal);
    }

    #[test]
    fn very_long_digit_runs_do_not_overflow() {
        let big = "9".repeat(40);
        let bigger = format!("1{}", "0".repeat(40));
        assert_eq!(natural_cmp(&big, &bigger), Ordering::Less);
    }

    #[test]
    fn non_ascii_names() {
        assert_eq!(
            sorted(&["第10話", "第2話", "第1話"]),
            vec!["第1話", "第2話", "第10話"]
        );
    }

    #[test]
    fn paths_compare_naturally() {
        assert_eq!(
            natural_cmp_path(Path::new("p/img9.png"), Path::new("p/img10.png")),
            Ordering::Less
        );
    }
}
