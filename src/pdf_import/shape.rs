//! Document shapes: declarative descriptions of how to read one kind of
//! document.
//!
//! A [`DocumentType`] decides whether a document is handled at all and holds
//! the [`Block`]s it is cut into. Each block offers candidate [`Shape`]s; the
//! first shape whose anchors all occur in the block is used. A shape is an
//! ordered list of [`Section`]s, each matching one or more full lines and
//! handing the named captures to an assignment closure that fills a
//! [`TransactionDraft`].

use std::collections::HashMap;

use chrono::NaiveDateTime;
use regex::Regex;
use rust_decimal::Decimal;

use super::draft::{DraftKind, TransactionDraft};
use super::segmenter::{compile_line_pattern, segment, Anchor};
use super::values::{self, NumberLocale};
use crate::error::{ExtractionError, FieldError};
use crate::pp::Money;

/// Assignment from captured values into a draft
pub type Assign =
    Box<dyn Fn(&mut TransactionDraft, &ParsedData<'_>) -> Result<(), FieldError> + Send + Sync>;

fn compile_search_pattern(pattern: &str) -> Result<Regex, String> {
    Regex::new(&format!("(?m){}", pattern)).map_err(|e| format!("{}: {}", pattern, e))
}

// =============================================================================
// Captured values
// =============================================================================

/// Values read from the whole document, visible to every block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentContext {
    values: HashMap<String, String>,
}

impl DocumentContext {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// First value for a key wins
    pub fn insert(&mut self, key: &str, value: &str) {
        self.values
            .entry(key.to_string())
            .or_insert_with(|| value.trim().to_string());
    }
}

/// Named captures of one section match plus typed accessors
pub struct ParsedData<'a> {
    values: HashMap<&'static str, String>,
    context: &'a DocumentContext,
    locale: NumberLocale,
}

impl<'a> ParsedData<'a> {
    /// Captured value, falling back to the document context
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .or_else(|| self.context.get(name))
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn require(&self, name: &str) -> Result<&str, FieldError> {
        self.get(name).ok_or_else(|| FieldError::missing(name))
    }

    pub fn date(&self, name: &str) -> Result<NaiveDateTime, FieldError> {
        values::parse_date(self.require(name)?).map_err(|e| FieldError::new(name, e))
    }

    /// Date with the optional time captured as `time`
    pub fn date_time(&self, date: &str, time: &str) -> Result<NaiveDateTime, FieldError> {
        values::parse_date_time(self.require(date)?, self.get(time))
            .map_err(|e| FieldError::new(date, e))
    }

    pub fn shares(&self, name: &str) -> Result<i64, FieldError> {
        values::parse_shares(self.require(name)?, self.locale).map_err(|e| FieldError::new(name, e))
    }

    pub fn rate(&self, name: &str) -> Result<Decimal, FieldError> {
        values::parse_exchange_rate(self.require(name)?, self.locale)
            .map_err(|e| FieldError::new(name, e))
    }

    pub fn currency(&self, name: &str) -> Result<String, FieldError> {
        values::parse_currency(self.require(name)?).map_err(|e| FieldError::new(name, e))
    }

    /// Amount captured as `amount` in the currency captured as `currency`
    pub fn money(&self, amount: &str, currency: &str) -> Result<Money, FieldError> {
        let code = self.require(currency)?;
        values::parse_amount(self.require(amount)?, code, self.locale)
            .map_err(|e| FieldError::new(amount, e))
    }

    pub fn isin(&self, name: &str) -> Result<String, FieldError> {
        values::parse_isin(self.require(name)?).map_err(|e| FieldError::new(name, e))
    }

    pub fn wkn(&self, name: &str) -> Result<String, FieldError> {
        values::parse_wkn(self.require(name)?).map_err(|e| FieldError::new(name, e))
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Consecutive line patterns producing a set of attributes
pub struct Section {
    attributes: Vec<&'static str>,
    patterns: Vec<Regex>,
    optional: bool,
    multiple: bool,
    assign: Option<Assign>,
    defects: Vec<String>,
}

impl Section {
    pub fn new(attributes: &[&'static str]) -> Self {
        Self {
            attributes: attributes.to_vec(),
            patterns: Vec::new(),
            optional: false,
            multiple: false,
            assign: None,
            defects: Vec::new(),
        }
    }

    /// Add a full-line pattern; patterns match successive lines in order
    pub fn find(mut self, pattern: &str) -> Self {
        match compile_line_pattern(pattern) {
            Ok(re) => self.patterns.push(re),
            Err(e) => self.defects.push(e),
        }
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Apply for every occurrence instead of only the first
    pub fn multiple_times(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn assign<F>(mut self, assign: F) -> Self
    where
        F: Fn(&mut TransactionDraft, &ParsedData<'_>) -> Result<(), FieldError>
            + Send
            + Sync
            + 'static,
    {
        self.assign = Some(Box::new(assign));
        self
    }

    fn label(&self) -> String {
        self.attributes.join(", ")
    }

    fn validate(&self, shape: &str) -> Result<(), ExtractionError> {
        if let Some(defect) = self.defects.first() {
            return Err(ExtractionError::defect(shape, defect.clone()));
        }
        if self.patterns.is_empty() {
            return Err(ExtractionError::defect(
                shape,
                format!("section [{}] has no pattern", self.label()),
            ));
        }
        if self.assign.is_none() {
            return Err(ExtractionError::defect(
                shape,
                format!("section [{}] assigns nothing", self.label()),
            ));
        }
        for attribute in &self.attributes {
            let captured = self
                .patterns
                .iter()
                .any(|re| re.capture_names().flatten().any(|n| n == *attribute));
            if !captured {
                return Err(ExtractionError::defect(
                    shape,
                    format!("attribute '{}' is not captured by any pattern", attribute),
                ));
            }
        }
        Ok(())
    }

    /// Run the section over `lines`. Returns whether it matched at least once.
    fn apply(
        &self,
        lines: &[&str],
        context: &DocumentContext,
        locale: NumberLocale,
        draft: &mut TransactionDraft,
    ) -> Result<bool, FieldError> {
        let Some(assign) = &self.assign else {
            return Ok(false);
        };
        if self.patterns.is_empty() {
            return Ok(false);
        }

        let mut found = false;
        let mut pattern_no = 0;
        let mut values = HashMap::new();

        for line in lines {
            let Some(caps) = self.patterns[pattern_no].captures(line) else {
                continue;
            };
            for attribute in &self.attributes {
                if let Some(m) = caps.name(attribute) {
                    values.insert(*attribute, m.as_str().trim().to_string());
                }
            }

            pattern_no += 1;
            if pattern_no == self.patterns.len() {
                let data = ParsedData {
                    values: std::mem::take(&mut values),
                    context,
                    locale,
                };
                assign(draft, &data)?;
                found = true;
                if !self.multiple {
                    break;
                }
                pattern_no = 0;
            }
        }

        Ok(found)
    }
}

enum Step {
    Section(Section),
    OneOf {
        alternatives: Vec<Section>,
        optional: bool,
    },
}

// =============================================================================
// Shapes, blocks and document types
// =============================================================================

/// How to read one kind of event out of a block
pub struct Shape {
    name: &'static str,
    kind: DraftKind,
    locale: NumberLocale,
    anchors: Vec<Regex>,
    steps: Vec<Step>,
    defects: Vec<String>,
}

impl Shape {
    pub fn new(name: &'static str, kind: DraftKind) -> Self {
        Self {
            name,
            kind,
            locale: NumberLocale::German,
            anchors: Vec::new(),
            steps: Vec::new(),
            defects: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn locale(mut self, locale: NumberLocale) -> Self {
        self.locale = locale;
        self
    }

    /// A full line that must occur somewhere in the block for the shape to apply
    pub fn anchor(mut self, pattern: &str) -> Self {
        match compile_line_pattern(pattern) {
            Ok(re) => self.anchors.push(re),
            Err(e) => self.defects.push(e),
        }
        self
    }

    pub fn section(mut self, section: Section) -> Self {
        self.steps.push(Step::Section(section));
        self
    }

    /// The first matching alternative is applied; one must match
    pub fn one_of(mut self, alternatives: Vec<Section>) -> Self {
        self.steps.push(Step::OneOf {
            alternatives,
            optional: false,
        });
        self
    }

    /// The first matching alternative is applied, if any
    pub fn optional_one_of(mut self, alternatives: Vec<Section>) -> Self {
        self.steps.push(Step::OneOf {
            alternatives,
            optional: true,
        });
        self
    }

    /// Do all anchors occur in the block?
    pub fn matches(&self, lines: &[&str]) -> bool {
        self.anchors
            .iter()
            .all(|re| lines.iter().any(|line| re.is_match(line)))
    }

    /// Read the block into a draft
    pub fn extract(
        &self,
        lines: &[&str],
        context: &DocumentContext,
    ) -> Result<TransactionDraft, ExtractionError> {
        let mut draft = TransactionDraft::new(self.name, self.kind);

        for step in &self.steps {
            match step {
                Step::Section(section) => {
                    let found = section
                        .apply(lines, context, self.locale, &mut draft)
                        .map_err(|e| e.into_extraction_error(self.name))?;
                    if !found && !section.optional {
                        return Err(ExtractionError::required(
                            self.name,
                            &section.label(),
                            "no matching line",
                        ));
                    }
                }
                Step::OneOf {
                    alternatives,
                    optional,
                } => {
                    let mut found = false;
                    for section in alternatives {
                        if section
                            .apply(lines, context, self.locale, &mut draft)
                            .map_err(|e| e.into_extraction_error(self.name))?
                        {
                            found = true;
                            break;
                        }
                    }
                    if !found && !optional {
                        let labels: Vec<String> =
                            alternatives.iter().map(Section::label).collect();
                        return Err(ExtractionError::required(
                            self.name,
                            &labels.join(" | "),
                            "none of the alternatives matched",
                        ));
                    }
                }
            }
        }

        Ok(draft)
    }

    pub fn validate(&self) -> Result<(), ExtractionError> {
        if let Some(defect) = self.defects.first() {
            return Err(ExtractionError::defect(self.name, defect.clone()));
        }
        for step in &self.steps {
            match step {
                Step::Section(section) => section.validate(self.name)?,
                Step::OneOf { alternatives, .. } => {
                    if alternatives.is_empty() {
                        return Err(ExtractionError::defect(self.name, "empty alternatives"));
                    }
                    for section in alternatives {
                        section.validate(self.name)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// A kind of block within a document and the shapes that can read it
pub struct Block {
    anchor: Anchor,
    shapes: Vec<Shape>,
}

impl Block {
    /// Block starting at every line fully matching `start`
    pub fn new(start: &str) -> Self {
        Self {
            anchor: Anchor::new(start),
            shapes: Vec::new(),
        }
    }

    pub fn ends_with(mut self, end: &str) -> Self {
        self.anchor = self.anchor.ends_with(end);
        self
    }

    pub fn max_size(mut self, lines: usize) -> Self {
        self.anchor = self.anchor.max_size(lines);
        self
    }

    /// Add a candidate shape; candidates are tried in order
    pub fn shape(mut self, shape: Shape) -> Self {
        self.shapes.push(shape);
        self
    }

    fn select(&self, lines: &[&str]) -> Option<&Shape> {
        self.shapes.iter().find(|shape| shape.matches(lines))
    }
}

/// Result of reading one block
#[derive(Debug, Clone, PartialEq)]
pub struct BlockOutcome {
    /// Line number of the block start (zero based)
    pub start_line: usize,
    pub first_line: String,
    pub result: Result<TransactionDraft, ExtractionError>,
}

/// A document layout of one issuer
pub struct DocumentType {
    name: &'static str,
    must_include: Vec<Regex>,
    must_not_include: Vec<Regex>,
    context: Vec<Regex>,
    blocks: Vec<Block>,
    defects: Vec<String>,
}

impl DocumentType {
    /// Document type applying to documents containing `must_include`
    pub fn new(name: &'static str, must_include: &str) -> Self {
        Self {
            name,
            must_include: Vec::new(),
            must_not_include: Vec::new(),
            context: Vec::new(),
            blocks: Vec::new(),
            defects: Vec::new(),
        }
        .must_include(must_include)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn must_include(mut self, pattern: &str) -> Self {
        match compile_search_pattern(pattern) {
            Ok(re) => self.must_include.push(re),
            Err(e) => self.defects.push(e),
        }
        self
    }

    pub fn must_not_include(mut self, pattern: &str) -> Self {
        match compile_search_pattern(pattern) {
            Ok(re) => self.must_not_include.push(re),
            Err(e) => self.defects.push(e),
        }
        self
    }

    /// Full-line pattern whose named captures are stored in the document context
    pub fn context(mut self, pattern: &str) -> Self {
        match compile_line_pattern(pattern) {
            Ok(re) => self.context.push(re),
            Err(e) => self.defects.push(e),
        }
        self
    }

    pub fn block(mut self, block: Block) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn matches(&self, text: &str) -> bool {
        self.must_include.iter().all(|re| re.is_match(text))
            && !self.must_not_include.iter().any(|re| re.is_match(text))
    }

    pub fn read_context(&self, lines: &[&str]) -> DocumentContext {
        let mut context = DocumentContext::default();
        for line in lines {
            for re in &self.context {
                if let Some(caps) = re.captures(line) {
                    for name in re.capture_names().flatten() {
                        if let Some(m) = caps.name(name) {
                            context.insert(name, m.as_str());
                        }
                    }
                }
            }
        }
        context
    }

    /// Segment the document and read every block
    pub fn extract(&self, lines: &[&str]) -> Vec<BlockOutcome> {
        let context = self.read_context(lines);
        let anchors: Vec<&Anchor> = self.blocks.iter().map(|b| &b.anchor).collect();

        segment(lines, &anchors)
            .into_iter()
            .map(|seg| {
                let block_lines = seg.lines(lines);
                let first_line = block_lines[0].to_string();
                let block = &self.blocks[seg.anchor];

                let result = match block.select(block_lines) {
                    Some(shape) => {
                        log::debug!(
                            "{}: block at line {} read with shape '{}'",
                            self.name,
                            seg.start + 1,
                            shape.name()
                        );
                        shape.extract(block_lines, &context)
                    }
                    None => Err(ExtractionError::NoShapeMatched {
                        line: first_line.clone(),
                    }),
                };

                BlockOutcome {
                    start_line: seg.start,
                    first_line,
                    result,
                }
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ExtractionError> {
        if let Some(defect) = self.defects.first() {
            return Err(ExtractionError::defect(self.name, defect.clone()));
        }
        for block in &self.blocks {
            if let Some(defect) = block.anchor.defects().first() {
                return Err(ExtractionError::defect(self.name, defect.clone()));
            }
            if block.shapes.is_empty() {
                return Err(ExtractionError::defect(self.name, "block without shapes"));
            }
            for shape in &block.shapes {
                shape.validate()?;
            }
        }
        Ok(())
    }
}
