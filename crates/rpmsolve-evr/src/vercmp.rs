//! Segment-wise version comparison (the rpmvercmp algorithm)

use std::cmp::Ordering;
use std::hash::Hasher;

#[inline]
fn is_segment_char(c: u8) -> bool {
    c.is_ascii_alphanumeric() || c == b'~' || c == b'^'
}

/// Compare two version (or release) strings the way rpm does.
///
/// Strings are split into alternating numeric and alphabetic segments;
/// everything else is a separator. Numeric segments compare numerically,
/// alphabetic ones lexically, and a numeric segment is always newer than an
/// alphabetic one. `~` sorts before everything (including the end of the
/// string), `^` sorts after the end of the string but before any further
/// segment.
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let a = a.as_bytes();
    let b = b.as_bytes();
    let mut i = 0;
    let mut j = 0;

    loop {
        while i < a.len() && !is_segment_char(a[i]) {
            i += 1;
        }
        while j < b.len() && !is_segment_char(b[j]) {
            j += 1;
        }

        let a_tilde = a.get(i) == Some(&b'~');
        let b_tilde = b.get(j) == Some(&b'~');
        if a_tilde || b_tilde {
            if !a_tilde {
                return Ordering::Greater;
            }
            if !b_tilde {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        let a_caret = a.get(i) == Some(&b'^');
        let b_caret = b.get(j) == Some(&b'^');
        if a_caret || b_caret {
            if i >= a.len() {
                return Ordering::Less;
            }
            if j >= b.len() {
                return Ordering::Greater;
            }
            if !a_caret {
                return Ordering::Greater;
            }
            if !b_caret {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        if i >= a.len() || j >= b.len() {
            break;
        }

        let start_a = i;
        let start_b = j;
        let numeric = a[i].is_ascii_digit();
        if numeric {
            while i < a.len() && a[i].is_ascii_digit() {
                i += 1;
            }
            while j < b.len() && b[j].is_ascii_digit() {
                j += 1;
            }
        } else {
            while i < a.len() && a[i].is_ascii_alphabetic() {
                i += 1;
            }
            while j < b.len() && b[j].is_ascii_alphabetic() {
                j += 1;
            }
        }

        let seg_a = &a[start_a..i];
        let seg_b = &b[start_b..j];

        // Segment types differ: numbers win over letters
        if seg_b.is_empty() {
            return if numeric { Ordering::Greater } else { Ordering::Less };
        }

        let ord = if numeric {
            compare_numeric(seg_a, seg_b)
        } else {
            seg_a.cmp(seg_b)
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }

    match (i >= a.len(), j >= b.len()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Less,
        _ => Ordering::Greater,
    }
}

/// Feed `version` to `state` so that strings equal under [`rpmvercmp`]
/// hash alike.
pub(crate) fn hash_version<H: Hasher>(version: &str, state: &mut H) {
    let s = version.as_bytes();
    let mut i = 0;
    while i < s.len() {
        let start = i;
        if s[i] == b'~' || s[i] == b'^' {
            state.write_u8(s[i]);
            i += 1;
        } else if s[i].is_ascii_digit() {
            while i < s.len() && s[i].is_ascii_digit() {
                i += 1;
            }
            state.write_u8(b'0');
            state.write(strip_leading_zeros(&s[start..i]));
            state.write_u8(0xff);
        } else if s[i].is_ascii_alphabetic() {
            while i < s.len() && s[i].is_ascii_alphabetic() {
                i += 1;
            }
            state.write_u8(b'a');
            state.write(&s[start..i]);
            state.write_u8(0xff);
        } else {
            i += 1;
        }
    }
}

fn compare_numeric(a: &[u8], b: &[u8]) -> Ordering {
    let a = strip_leading_zeros(a);
    let b = strip_leading_zeros(b);
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

fn strip_leading_zeros(s: &[u8]) -> &[u8] {
    let zeros = s.iter().take_while(|&&c| c == b'0').count();
    &s[zeros..]
}
