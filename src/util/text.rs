use std::borrow::Cow;

use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const ELLIPSIS: &str = "...";
const ELLIPSIS_WIDTH: usize = 3;

/// Truncates a string to fit within `max_width` terminal columns.
///
/// Appends "..." when text is cut. Widths of 3 or less have no room for an
/// ellipsis, so as many characters as fit are returned instead. Returns
/// `Cow::Borrowed` when the string already fits.
///
/// ```
/// use bazaar::util::truncate_to_width;
///
/// assert_eq!(truncate_to_width("Mountain bike", 20), "Mountain bike");
/// assert_eq!(truncate_to_width("Mountain bike", 8), "Mount...");
/// assert_eq!(truncate_to_width("Bike", 2), "Bi");
/// ```
pub fn truncate_to_width(s: &str, max_width: usize) -> Cow<'_, str> {
    if UnicodeWidthStr::width(s) <= max_width {
        return Cow::Borrowed(s);
    }

    let (budget, suffix) = if max_width <= ELLIPSIS_WIDTH {
        (max_width, "")
    } else {
        (max_width - ELLIPSIS_WIDTH, ELLIPSIS)
    };

    let mut used = 0;
    let mut cut = 0;
    for (idx, c) in s.char_indices() {
        let w = UnicodeWidthChar::width(c).unwrap_or(0);
        if used + w > budget {
            break;
        }
        used += w;
        cut = idx + c.len_utf8();
    }

    Cow::Owned(format!("{}{}", &s[..cut], suffix))
}

/// Strips terminal escape sequences and control characters from remote text.
///
/// Listing titles and descriptions are user-submitted; without this, a title
/// could carry ANSI/OSC sequences that rewrite the terminal. Tab, newline and
/// carriage return are kept.
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    let dirty = s.bytes().any(is_stripped_byte);
    if !dirty {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\x1b' => match chars.peek() {
                // CSI: parameters until a final byte in 0x40..=0x7e
                Some('[') => {
                    chars.next();
                    for n in chars.by_ref() {
                        if ('\x40'..='\x7e').contains(&n) {
                            break;
                        }
                    }
                }
                // OSC: until BEL or ST (ESC \)
                Some(']') => {
                    chars.next();
                    while let Some(n) = chars.next() {
                        if n == '\x07' {
                            break;
                        }
                        if n == '\x1b' && chars.peek() == Some(&'\\') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => {}
            },
            c if c.is_ascii() && is_stripped_byte(c as u8) => {}
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

/// Sanitizes remote text for a single terminal line: control characters are
/// stripped and any whitespace run (including newlines) collapses to one space.
pub fn sanitize_line(s: &str) -> Cow<'_, str> {
    let stripped = strip_control_chars(s);
    let needs_collapse = stripped.contains(&['\n', '\r', '\t'][..])
        || stripped.contains("  ")
        || stripped.starts_with(' ')
        || stripped.ends_with(' ');
    if !needs_collapse {
        return stripped;
    }
    Cow::Owned(stripped.split_whitespace().collect::<Vec<_>>().join(" "))
}

fn is_stripped_byte(b: u8) -> bool {
    b == 0x1b || b == 0x7f || (b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncation_fits_borrowed() {
        assert!(matches!(truncate_to_width("Lamp", 10), Cow::Borrowed(_)));
        assert_eq!(truncate_to_width("12345", 5), "12345");
    }

    #[test]
    fn test_truncation_appends_ellipsis() {
        assert_eq!(truncate_to_width("Hello World", 8), "Hello...");
        assert_eq!(truncate_to_width("Testing", 4), "T...");
    }

    #[test]
    fn test_truncation_wide_chars() {
        // Each CJK character is 2 columns wide
        assert_eq!(truncate_to_width("\u{4f60}\u{597d}\u{4e16}\u{754c}", 7), "\u{4f60}\u{597d}...");
        assert_eq!(truncate_to_width("\u{4f60}\u{597d}", 1), "");
    }

    #[test]
    fn test_truncation_narrow_widths() {
        assert_eq!(truncate_to_width("Test", 0), "");
        assert_eq!(truncate_to_width("Test", 1), "T");
        assert_eq!(truncate_to_width("Test", 3), "Tes");
    }

    #[test]
    fn test_strip_clean_text_borrowed() {
        let input = "Vintage chair\nwith\ttabs";
        assert!(matches!(strip_control_chars(input), Cow::Borrowed(_)));
    }

    #[test]
    fn test_strip_ansi_and_osc() {
        assert_eq!(strip_control_chars("\x1b[31mRed\x1b[0m chair"), "Red chair");
        assert_eq!(strip_control_chars("\x1b]0;pwned\x07Sofa"), "Sofa");
        assert_eq!(strip_control_chars("\x1b]0;pwned\x1b\\Sofa"), "Sofa");
        assert_eq!(strip_control_chars("a\x1bb"), "ab");
    }

    #[test]
    fn test_strip_control_bytes() {
        assert_eq!(strip_control_chars("he\x00ll\x07o\x7f"), "hello");
    }

    #[test]
    fn test_sanitize_line_collapses_whitespace() {
        assert_eq!(sanitize_line("  Road\n bike \t 54cm "), "Road bike 54cm");
        assert!(matches!(sanitize_line("Road bike"), Cow::Borrowed(_)));
    }
}
