use std::borrow::Cow;

/// Escapes text for inclusion in an HTML description body.
///
/// Everything that did not arrive as trusted markup goes through here before
/// it is embedded in `description`. Returns `Cow::Borrowed` when nothing needs
/// escaping.
pub fn escape_html(s: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(s)
}

/// Strips control characters and ANSI escape sequences from scraped text.
///
/// Scrapers frequently hand over `innerText` that still contains stray
/// terminal sequences or NUL bytes; both are invalid in XML 1.0 and would make
/// the rendered document unreadable. Tab, newline and carriage return survive.
///
/// Returns `Cow::Borrowed` when the input is already clean (the common case).
pub fn strip_control_chars(s: &str) -> Cow<'_, str> {
    if !s.chars().any(is_stripped) {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\x1b' {
            if !is_stripped(c) {
                out.push(c);
            }
            continue;
        }

        match chars.peek() {
            // CSI: parameters until a final byte in 0x40..=0x7E
            Some('[') => {
                chars.next();
                for c in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&c) {
                        break;
                    }
                }
            }
            // OSC: until BEL or ST (ESC \)
            Some(']') => {
                chars.next();
                while let Some(c) = chars.next() {
                    if c == '\x07' {
                        break;
                    }
                    if c == '\x1b' && chars.peek() == Some(&'\\') {
                        chars.next();
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    Cow::Owned(out)
}

fn is_stripped(c: char) -> bool {
    c == '\x1b' || c == '\x7f' || (c < '\x20' && !matches!(c, '\t' | '\n' | '\r'))
}

/// Returns the first non-empty line of `s`, trimmed.
///
/// Product cards often render the name followed by badges or colour counts on
/// subsequent lines; only the first line is the title.
pub fn first_line(s: &str) -> &str {
    s.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("")
}

/// Formats an integer amount with comma thousands separators (`12100` → `12,100`).
pub fn format_amount(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    if amount < 0 {
        out.push('-');
    }
    for (i, d) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(d);
    }
    out
}

/// Normalizes a scraped price string: trims it and replaces the full-width
/// yen sign with the ASCII-range one.
pub fn normalize_price_text(s: &str) -> String {
    s.trim().replace('￥', "¥")
}
