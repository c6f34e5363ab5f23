//! Splitting a normalized document into event blocks.
//!
//! A block starts at a line that fully matches one of the start anchors and
//! runs until the line before the next start line. Lines before the first
//! anchor do not belong to any block.

use regex::Regex;

/// Compile a pattern that has to match a whole line
pub fn compile_line_pattern(pattern: &str) -> Result<Regex, String> {
    Regex::new(&format!("^(?:{})$", pattern)).map_err(|e| format!("{}: {}", pattern, e))
}

/// Start (and optional end) condition of a block
#[derive(Debug, Clone)]
pub struct Anchor {
    start: Option<Regex>,
    end: Option<Regex>,
    max_size: Option<usize>,
    defects: Vec<String>,
}

impl Anchor {
    pub fn new(start: &str) -> Self {
        let mut anchor = Self {
            start: None,
            end: None,
            max_size: None,
            defects: Vec::new(),
        };
        match compile_line_pattern(start) {
            Ok(re) => anchor.start = Some(re),
            Err(e) => anchor.defects.push(e),
        }
        anchor
    }

    /// Cut the block at the first line matching `end` (inclusive).
    /// Blocks that never reach their end line are dropped.
    pub fn ends_with(mut self, end: &str) -> Self {
        match compile_line_pattern(end) {
            Ok(re) => self.end = Some(re),
            Err(e) => self.defects.push(e),
        }
        self
    }

    /// Limit the block to `lines` lines
    pub fn max_size(mut self, lines: usize) -> Self {
        self.max_size = Some(lines);
        self
    }

    pub fn defects(&self) -> &[String] {
        &self.defects
    }

    fn starts_at(&self, line: &str) -> bool {
        self.start.as_ref().is_some_and(|re| re.is_match(line))
    }
}

/// A block found in a document: line range `start..=end` of anchor `anchor`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub anchor: usize,
    pub start: usize,
    pub end: usize,
}

impl Segment {
    pub fn lines<'a>(&self, lines: &'a [&'a str]) -> &'a [&'a str] {
        &lines[self.start..=self.end]
    }
}

/// Segment `lines` using `anchors`.
///
/// When several anchors match the same line the first one wins. Segments are
/// returned in document order.
pub fn segment(lines: &[&str], anchors: &[&Anchor]) -> Vec<Segment> {
    let starts: Vec<(usize, usize)> = lines
        .iter()
        .enumerate()
        .filter_map(|(line_no, line)| {
            anchors
                .iter()
                .position(|anchor| anchor.starts_at(line))
                .map(|anchor| (line_no, anchor))
        })
        .collect();

    let mut segments = Vec::with_capacity(starts.len());
    for (i, &(start, anchor_index)) in starts.iter().enumerate() {
        let anchor = anchors[anchor_index];
        let mut end = starts
            .get(i + 1)
            .map(|&(next, _)| next - 1)
            .unwrap_or(lines.len() - 1);

        if let Some(end_re) = &anchor.end {
            match (start..=end).find(|&n| end_re.is_match(lines[n])) {
                Some(found) => end = found,
                None => {
                    log::debug!("Block starting at line {} has no end line, skipped", start + 1);
                    continue;
                }
            }
        }

        if let Some(max) = anchor.max_size {
            end = end.min(start + max.max(1) - 1);
        }

        segments.push(Segment {
            anchor: anchor_index,
            start,
            end,
        });
    }

    segments
}
