//! Normalization of converted document text.
//!
//! PDF text extraction often emits kerned headings as single letters with
//! spaces in between ("D i v i d e n d e") and separates words by two or more
//! spaces on such lines. This pass restores those words and cleans up line
//! endings and exotic whitespace. All shapes match against normalized text.
//!
//! A line is split into segments at runs of two or more spaces. A segment is
//! collapsed only if every token in it is a single character and it has at
//! least [`MIN_KERNED_TOKENS`] tokens. Segments that mix longer tokens, like
//! the security name "C VS H e a lt h Co r p.", are left untouched since
//! there is no way to tell where the words were.

use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum number of single-character tokens for a segment to count as kerned
pub const MIN_KERNED_TOKENS: usize = 3;

static RE_SEGMENT_GAP: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());

/// Normalize raw document text
///
/// Never fails; text without kerning artifacts only has its line endings
/// and trailing whitespace cleaned.
pub fn normalize_text(raw: &str) -> String {
    // 1. Normalize line endings (CRLF / CR → LF)
    let text = raw.replace("\r\n", "\n").replace('\r', "\n");

    // 2. Normalize Unicode whitespace to ASCII space (except newlines)
    let text = normalize_unicode_whitespace(&text);

    // 3. Per line: trim the end and collapse kerned segments
    text.split('\n')
        .map(|line| collapse_kerning(line.trim_end()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Replace Unicode whitespace characters with ASCII space
/// Preserves newlines and regular spaces
fn normalize_unicode_whitespace(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_whitespace() && c != '\n' && c != ' ' {
                ' '
            } else {
                c
            }
        })
        .collect()
}

/// Collapse kerned segments of a single line
pub fn collapse_kerning(line: &str) -> String {
    let trimmed = line.trim();
    let mut changed = false;

    let segments: Vec<String> = RE_SEGMENT_GAP
        .split(trimmed)
        .map(|segment| {
            if is_kerned(segment) {
                changed = true;
                segment.replace(' ', "")
            } else {
                segment.to_string()
            }
        })
        .collect();

    if changed {
        segments.join(" ")
    } else {
        line.to_string()
    }
}

fn is_kerned(segment: &str) -> bool {
    let mut count = 0;
    for token in segment.split(' ') {
        if token.chars().count() != 1 {
            return false;
        }
        count += 1;
    }
    count >= MIN_KERNED_TOKENS
}
