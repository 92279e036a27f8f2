//! Parser for submitted result batches.
//!
//! A batch is any root element whose direct `mcq-test-result` children are
//! the records. Everything else in the document is skipped, so scanner
//! metadata (extra attributes, per-question answers) passes through
//! harmlessly.

use crate::ids::{IdError, NumericId};
use crate::import::ParsedRecord;
use quick_xml::events::attributes::Attributes;
use quick_xml::events::{BytesEnd, BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

const RECORD_TAG: &[u8] = b"mcq-test-result";

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("{0}")]
    Syntax(String),

    #[error("record {record}: missing {field}")]
    MissingField { record: usize, field: &'static str },

    #[error("record {record}: invalid {field}: {source}")]
    InvalidId {
        record: usize,
        field: &'static str,
        source: IdError,
    },

    #[error("record {record}: {field} {value:?} is not an integer")]
    InvalidMark {
        record: usize,
        field: &'static str,
        value: String,
    },

    #[error("record {record}: {field} {value} is out of range")]
    MarkOutOfRange {
        record: usize,
        field: &'static str,
        value: i64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    FirstName,
    LastName,
    StudentNumber,
    TestId,
}

impl Field {
    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"first-name" => Some(Field::FirstName),
            b"last-name" => Some(Field::LastName),
            b"student-number" => Some(Field::StudentNumber),
            b"test-id" => Some(Field::TestId),
            _ => None,
        }
    }
}

/// Raw text collected for one record before validation.
#[derive(Debug, Default)]
struct RecordAccum {
    first_name: Option<String>,
    last_name: Option<String>,
    student_number: Option<String>,
    test_id: Option<String>,
    available: Option<String>,
    obtained: Option<String>,
}

impl RecordAccum {
    fn slot(&mut self, field: Field) -> &mut Option<String> {
        match field {
            Field::FirstName => &mut self.first_name,
            Field::LastName => &mut self.last_name,
            Field::StudentNumber => &mut self.student_number,
            Field::TestId => &mut self.test_id,
        }
    }

    fn into_record(self, record: usize) -> Result<ParsedRecord, XmlError> {
        let required = |v: Option<String>, field: &'static str| {
            v.ok_or(XmlError::MissingField { record, field })
        };
        let id = |v: Option<String>, field: &'static str| -> Result<NumericId, XmlError> {
            required(v, field)?
                .parse()
                .map_err(|source| XmlError::InvalidId {
                    record,
                    field,
                    source,
                })
        };
        let mark = |v: Option<String>, field: &'static str| -> Result<i64, XmlError> {
            let raw = required(v, field)?;
            raw.trim().parse().map_err(|_| XmlError::InvalidMark {
                record,
                field,
                value: raw.clone(),
            })
        };

        let first_name = required(self.first_name, "first-name")?;
        let last_name = required(self.last_name, "last-name")?;
        let student_number = id(self.student_number, "student-number")?;
        let test_id = id(self.test_id, "test-id")?;
        let marks_available = mark(self.available, "summary-marks@available")?;
        let marks_obtained = mark(self.obtained, "summary-marks@obtained")?;

        if marks_available <= 0 {
            return Err(XmlError::MarkOutOfRange {
                record,
                field: "summary-marks@available",
                value: marks_available,
            });
        }
        if marks_obtained < 0 {
            return Err(XmlError::MarkOutOfRange {
                record,
                field: "summary-marks@obtained",
                value: marks_obtained,
            });
        }

        Ok(ParsedRecord {
            first_name,
            last_name,
            student_number,
            test_id,
            marks_available,
            marks_obtained,
        })
    }
}

/// Element-depth state machine over the event stream.
///
/// Depth 1 is the root, 2 a record, 3 a record field.
struct BatchParser {
    records: Vec<ParsedRecord>,
    accum: RecordAccum,
    depth: usize,
    in_record: bool,
    current_field: Option<Field>,
    root_seen: bool,
}

impl BatchParser {
    fn new() -> Self {
        Self {
            records: Vec::new(),
            accum: RecordAccum::default(),
            depth: 0,
            in_record: false,
            current_field: None,
            root_seen: false,
        }
    }

    fn enter_root(&mut self) -> Result<(), XmlError> {
        if self.root_seen {
            return Err(XmlError::Syntax("junk after document element".into()));
        }
        self.root_seen = true;
        Ok(())
    }

    fn handle_start(&mut self, e: &BytesStart<'_>) -> Result<(), XmlError> {
        if self.depth == 0 {
            self.enter_root()?;
        }
        self.depth += 1;
        let name = e.name();
        let tag = name.as_ref();
        match self.depth {
            2 if tag == RECORD_TAG => {
                self.in_record = true;
                self.accum = RecordAccum::default();
            }
            3 if self.in_record => {
                if tag == b"summary-marks" {
                    self.read_summary_marks(e.attributes())?;
                } else if let Some(field) = Field::from_tag(tag) {
                    // The first occurrence of a field wins.
                    let slot = self.accum.slot(field);
                    if slot.is_none() {
                        *slot = Some(String::new());
                        self.current_field = Some(field);
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_empty(&mut self, e: &BytesStart<'_>) -> Result<(), XmlError> {
        let name = e.name();
        let tag = name.as_ref();
        match self.depth {
            0 => self.enter_root()?,
            1 if tag == RECORD_TAG => {
                let index = self.records.len();
                let record = RecordAccum::default().into_record(index)?;
                self.records.push(record);
            }
            2 if self.in_record => {
                if tag == b"summary-marks" {
                    self.read_summary_marks(e.attributes())?;
                } else if let Some(field) = Field::from_tag(tag) {
                    let slot = self.accum.slot(field);
                    if slot.is_none() {
                        *slot = Some(String::new());
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_text(&mut self, text: &str) -> Result<(), XmlError> {
        if self.depth == 0 {
            if text.trim().is_empty() {
                return Ok(());
            }
            return Err(XmlError::Syntax("text outside the document element".into()));
        }
        if self.depth != 3 {
            return Ok(());
        }
        if let Some(field) = self.current_field {
            if let Some(buf) = self.accum.slot(field) {
                buf.push_str(text);
            }
        }
        Ok(())
    }

    fn handle_end(&mut self, _e: &BytesEnd<'_>) -> Result<(), XmlError> {
        match self.depth {
            0 => return Err(XmlError::Syntax("unmatched end tag".into())),
            2 if self.in_record => {
                let finished = std::mem::take(&mut self.accum);
                let index = self.records.len();
                self.records.push(finished.into_record(index)?);
                self.in_record = false;
            }
            3 => self.current_field = None,
            _ => {}
        }
        self.depth -= 1;
        Ok(())
    }

    fn read_summary_marks(&mut self, attrs: Attributes<'_>) -> Result<(), XmlError> {
        for attr in attrs {
            let attr = attr.map_err(|e| XmlError::Syntax(e.to_string()))?;
            let slot = match attr.key.as_ref() {
                b"available" => &mut self.accum.available,
                b"obtained" => &mut self.accum.obtained,
                _ => continue,
            };
            if slot.is_none() {
                let value = attr
                    .unescape_value()
                    .map_err(|e| XmlError::Syntax(e.to_string()))?;
                *slot = Some(value.into_owned());
            }
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<ParsedRecord>, XmlError> {
        if !self.root_seen {
            return Err(XmlError::Syntax("no element found".into()));
        }
        if self.depth > 0 {
            return Err(XmlError::Syntax("unclosed element at end of document".into()));
        }
        Ok(self.records)
    }
}

/// Parse a submitted batch into records, in document order.
pub fn parse_results_xml(xml: &str) -> Result<Vec<ParsedRecord>, XmlError> {
    // Text is kept verbatim; names keep their whitespace and numbers are
    // trimmed where they are parsed.
    let mut reader = Reader::from_str(xml);
    let mut parser = BatchParser::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => parser.handle_start(e)?,
            Ok(Event::Empty(ref e)) => parser.handle_empty(e)?,
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().map_err(|err| XmlError::Syntax(err.to_string()))?;
                parser.handle_text(&text)?;
            }
            Ok(Event::CData(e)) => {
                let raw = e.into_inner();
                parser.handle_text(&String::from_utf8_lossy(&raw))?;
            }
            Ok(Event::End(ref e)) => parser.handle_end(e)?,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(XmlError::Syntax(format!(
                    "{e} at position {}",
                    reader.buffer_position()
                )))
            }
        }
    }

    parser.finish()
}
