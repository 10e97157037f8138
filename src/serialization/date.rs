//! Date patterns and the date-time wire type.
//!
//! Patterns use the familiar `SimpleDateFormat` letters
//! (`yyyy-MM-dd HH:mm:ss.SSS`) and are compiled once into a chrono format
//! string. The encoder installs its pattern for the duration of each
//! encode/decode call, so every [`Timestamp`] in a body renders identically.

use std::cell::RefCell;
use std::fmt::{self, Write as _};
use std::ops::Deref;
use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

pub const DEFAULT_DATE_FORMAT: &str = "yyyy-MM-dd HH:mm:ss.SSS";

/// Error compiling a date pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateFormatError {
    #[error("empty pattern")]
    Empty,

    #[error("unterminated quote")]
    UnterminatedQuote,

    #[error("unsupported field '{letter}' x{count}")]
    Unsupported { letter: char, count: usize },
}

/// A compiled date pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DateFormat {
    pattern: String,
    strftime: String,
}

impl DateFormat {
    pub fn parse(pattern: &str) -> Result<Self, DateFormatError> {
        if pattern.is_empty() {
            return Err(DateFormatError::Empty);
        }

        let chars: Vec<char> = pattern.chars().collect();
        let mut out = String::new();
        let mut i = 0;

        while i < chars.len() {
            let c = chars[i];

            if c == '\'' {
                if chars.get(i + 1) == Some(&'\'') {
                    out.push('\'');
                    i += 2;
                    continue;
                }
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(DateFormatError::UnterminatedQuote),
                        Some('\'') if chars.get(i + 1) == Some(&'\'') => {
                            out.push('\'');
                            i += 2;
                        }
                        Some('\'') => {
                            i += 1;
                            break;
                        }
                        Some(&lit) => {
                            push_literal(&mut out, lit);
                            i += 1;
                        }
                    }
                }
                continue;
            }

            if !c.is_ascii_alphabetic() {
                push_literal(&mut out, c);
                i += 1;
                continue;
            }

            let mut count = 1;
            while chars.get(i + count) == Some(&c) {
                count += 1;
            }
            out.push_str(field(c, count)?);
            i += count;
        }

        // Every directive above is a known chrono specifier; this only guards
        // against a mapping mistake.
        if StrftimeItems::new(&out).any(|item| matches!(item, Item::Error)) {
            return Err(DateFormatError::Unsupported { letter: '%', count: 1 });
        }

        Ok(Self {
            pattern: pattern.to_string(),
            strftime: out,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn format(&self, value: &NaiveDateTime) -> Result<String, fmt::Error> {
        let mut s = String::new();
        write!(s, "{}", value.format(&self.strftime))?;
        Ok(s)
    }

    /// Parse `input` with this pattern. Patterns without time fields yield
    /// midnight of the parsed day.
    pub fn parse_datetime(&self, input: &str) -> Result<NaiveDateTime, chrono::ParseError> {
        NaiveDateTime::parse_from_str(input, &self.strftime).or_else(|e| {
            NaiveDate::parse_from_str(input, &self.strftime)
                .map(|date| date.and_time(NaiveTime::MIN))
                .map_err(|_| e)
        })
    }

    /// Make this pattern the active one on the current thread until the
    /// returned guard drops.
    pub fn scope(self: &Arc<Self>) -> FormatScope {
        let previous = ACTIVE_FORMAT.with(|f| f.replace(Some(Arc::clone(self))));
        FormatScope { previous }
    }
}

impl Default for DateFormat {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_DATE_FORMAT.to_string(),
            strftime: "%Y-%m-%d %H:%M:%S.%3f".to_string(),
        }
    }
}

fn push_literal(out: &mut String, c: char) {
    if c == '%' {
        out.push_str("%%");
    } else {
        out.push(c);
    }
}

fn field(letter: char, count: usize) -> Result<&'static str, DateFormatError> {
    let spec = match (letter, count) {
        ('y', 2) => "%y",
        ('y', _) => "%Y",
        ('M', 1) => "%-m",
        ('M', 2) => "%m",
        ('M', 3) => "%b",
        ('M', _) => "%B",
        ('d', 1) => "%-d",
        ('d', 2) => "%d",
        ('H', 1) => "%-H",
        ('H', 2) => "%H",
        ('h', 1) => "%-I",
        ('h', 2) => "%I",
        ('m', 1) => "%-M",
        ('m', 2) => "%M",
        ('s', 1) => "%-S",
        ('s', 2) => "%S",
        ('S', 3) => "%3f",
        ('S', 6) => "%6f",
        ('S', 9) => "%9f",
        ('a', 1) => "%p",
        ('E', 1..=3) => "%a",
        ('E', _) => "%A",
        _ => return Err(DateFormatError::Unsupported { letter, count }),
    };
    Ok(spec)
}

thread_local! {
    static ACTIVE_FORMAT: RefCell<Option<Arc<DateFormat>>> = const { RefCell::new(None) };
}

/// Restores the previously active pattern on drop.
pub struct FormatScope {
    previous: Option<Arc<DateFormat>>,
}

impl Drop for FormatScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        ACTIVE_FORMAT.with(|f| f.replace(previous));
    }
}

fn with_active<R>(f: impl FnOnce(&DateFormat) -> R) -> R {
    ACTIVE_FORMAT.with(|active| match active.borrow().as_deref() {
        Some(format) => f(format),
        None => f(&DateFormat::default()),
    })
}

/// A local date-time rendered with the encoder's date pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(pub NaiveDateTime);

impl Timestamp {
    pub fn now() -> Self {
        Self(Local::now().naive_local())
    }
}

impl From<NaiveDateTime> for Timestamp {
    fn from(value: NaiveDateTime) -> Self {
        Self(value)
    }
}

impl Deref for Timestamp {
    type Target = NaiveDateTime;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let rendered = with_active(|format| format.format(&self.0))
            .map_err(|_| serde::ser::Error::custom("date could not be formatted"))?;
        serializer.serialize_str(&rendered)
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        with_active(|format| format.parse_datetime(&raw))
            .or_else(|_| raw.parse::<NaiveDateTime>())
            .map(Timestamp)
            .map_err(|_| de::Error::custom(format!("invalid date '{}'", raw)))
    }
}
