//! Conversion of Rust values into Presto literal fragments.
//!
//! # Overview
//!
//! The [`IntoLiteral`] trait provides a unified interface for converting
//! Rust primitive and complex types into [`Literal`] values that can be
//! bound to a query. The literal is then rendered into Presto's SQL literal
//! syntax when the statement is submitted.
//!
//! Floats, raw bytes, durations, raw JSON, and maps are intentionally
//! representable but not serializable: binding one returns an
//! unsupported-arg error instead of silently losing precision or guessing a
//! server type.
//!
//! # Example
//!
//! ```
//! use presto_client::{Date, IntoLiteral, Numeric};
//!
//! let q = "O'Hara".into_literal();
//! let d = Date::new(2024, 1, 2).into_literal();
//! let n = Numeric("1e10".to_string()).into_literal();
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

use crate::error::Error;

/// A string representation of a number, such as `"10"`, `"5.5"`, or a value
/// in scientific form. It is emitted verbatim after a float parse check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Numeric(pub String);

/// A calendar date, rendered as `DATE 'YYYY-MM-DD'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Date {
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl Date {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Date { year, month, day }
    }
}

/// A time of day, rendered as `TIME 'HH:MM:SS.nnnnnnnnn'`. For precision
/// higher than nanoseconds, pass the value as a string and cast in the
/// query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Time {
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
    pub nanosecond: u32,
}

impl Time {
    pub fn new(hour: u32, minute: u32, second: u32, nanosecond: u32) -> Self {
        Time {
            hour,
            minute,
            second,
            nanosecond,
        }
    }
}

/// A time of day with a UTC offset, rendered as
/// `TIME 'HH:MM:SS.fffffffff +HH:MM'`. A missing offset means UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeTz {
    pub time: Time,
    pub offset: Option<FixedOffset>,
}

impl TimeTz {
    pub fn new(hour: u32, minute: u32, second: u32, nanosecond: u32, offset: Option<FixedOffset>) -> Self {
        TimeTz {
            time: Time::new(hour, minute, second, nanosecond),
            offset,
        }
    }
}

/// A timestamp without a time zone, rendered as
/// `TIMESTAMP 'YYYY-MM-DD HH:MM:SS.fffffffff'`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamp {
    pub date: Date,
    pub time: Time,
}

impl Timestamp {
    pub fn new(
        year: i32,
        month: u32,
        day: u32,
        hour: u32,
        minute: u32,
        second: u32,
        nanosecond: u32,
    ) -> Self {
        Timestamp {
            date: Date::new(year, month, day),
            time: Time::new(hour, minute, second, nanosecond),
        }
    }
}

/// A parameter value with a Presto literal rendering, or one of the
/// explicitly rejected kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    USmallInt(u16),
    UInt(u32),
    UBigInt(u64),
    Float(f32),
    Double(f64),
    Byte(u8),
    Numeric(Numeric),
    Varchar(String),
    Varbinary(Vec<u8>),
    Date(Date),
    Time(Time),
    TimeTz(TimeTz),
    Timestamp(Timestamp),
    Instant(DateTime<FixedOffset>),
    Array(Vec<Literal>),
    Duration(std::time::Duration),
    Json(serde_json::Value),
    Map,
}

/// Converts a Rust value into a [`Literal`] for binding to a query.
pub trait IntoLiteral {
    fn into_literal(self) -> Literal;
}

impl IntoLiteral for Literal {
    fn into_literal(self) -> Literal {
        self
    }
}

/// Macro to implement IntoLiteral for a type mapping to a Literal variant.
macro_rules! impl_into_literal {
    ($ty:ty => $variant:ident) => {
        impl IntoLiteral for $ty {
            fn into_literal(self) -> Literal {
                Literal::$variant(self)
            }
        }
    };
}

impl_into_literal!(bool => Bool);
impl_into_literal!(i8 => TinyInt);
impl_into_literal!(i16 => SmallInt);
impl_into_literal!(i32 => Int);
impl_into_literal!(i64 => BigInt);
impl_into_literal!(u8 => Byte);
impl_into_literal!(u16 => USmallInt);
impl_into_literal!(u32 => UInt);
impl_into_literal!(u64 => UBigInt);
impl_into_literal!(f32 => Float);
impl_into_literal!(f64 => Double);
impl_into_literal!(String => Varchar);
impl_into_literal!(Numeric => Numeric);
impl_into_literal!(Date => Date);
impl_into_literal!(Time => Time);
impl_into_literal!(TimeTz => TimeTz);
impl_into_literal!(Timestamp => Timestamp);
impl_into_literal!(std::time::Duration => Duration);
impl_into_literal!(serde_json::Value => Json);

impl IntoLiteral for &str {
    fn into_literal(self) -> Literal {
        Literal::Varchar(self.to_string())
    }
}

impl IntoLiteral for &[u8] {
    fn into_literal(self) -> Literal {
        Literal::Varbinary(self.to_vec())
    }
}

impl<T: IntoLiteral> IntoLiteral for Option<T> {
    fn into_literal(self) -> Literal {
        match self {
            Some(value) => value.into_literal(),
            None => Literal::Null,
        }
    }
}

impl<T: IntoLiteral> IntoLiteral for Vec<T> {
    fn into_literal(self) -> Literal {
        Literal::Array(self.into_iter().map(IntoLiteral::into_literal).collect())
    }
}

impl<K, V> IntoLiteral for HashMap<K, V> {
    fn into_literal(self) -> Literal {
        Literal::Map
    }
}

impl IntoLiteral for NaiveDate {
    fn into_literal(self) -> Literal {
        Literal::Date(Date::new(self.year(), self.month(), self.day()))
    }
}

impl IntoLiteral for NaiveTime {
    fn into_literal(self) -> Literal {
        Literal::Time(Time::new(
            self.hour(),
            self.minute(),
            self.second(),
            self.nanosecond(),
        ))
    }
}

impl IntoLiteral for NaiveDateTime {
    fn into_literal(self) -> Literal {
        Literal::Timestamp(Timestamp {
            date: Date::new(self.year(), self.month(), self.day()),
            time: Time::new(self.hour(), self.minute(), self.second(), self.nanosecond()),
        })
    }
}

impl IntoLiteral for DateTime<FixedOffset> {
    fn into_literal(self) -> Literal {
        Literal::Instant(self)
    }
}

impl IntoLiteral for DateTime<Utc> {
    fn into_literal(self) -> Literal {
        Literal::Instant(self.fixed_offset())
    }
}

/// Renders a literal into its Presto SQL fragment.
pub(crate) fn serialize(literal: &Literal) -> Result<String, Error> {
    match literal {
        Literal::Null => Ok("NULL".to_string()),
        Literal::Bool(v) => Ok(v.to_string()),
        Literal::TinyInt(v) => Ok(v.to_string()),
        Literal::SmallInt(v) => Ok(v.to_string()),
        Literal::Int(v) => Ok(v.to_string()),
        Literal::BigInt(v) => Ok(v.to_string()),
        Literal::USmallInt(v) => Ok(v.to_string()),
        Literal::UInt(v) => Ok(v.to_string()),
        Literal::UBigInt(v) => Ok(v.to_string()),
        Literal::Numeric(n) => {
            if n.0.parse::<f64>().is_err() {
                return Err(Error::Decode(format!("invalid numeric literal: {:?}", n.0)));
            }
            Ok(n.0.clone())
        }
        Literal::Varchar(s) => Ok(format!("'{}'", s.replace('\'', "''"))),
        Literal::Date(d) => Ok(format!("DATE '{:04}-{:02}-{:02}'", d.year, d.month, d.day)),
        Literal::Time(t) => Ok(format!(
            "TIME '{:02}:{:02}:{:02}.{:09}'",
            t.hour, t.minute, t.second, t.nanosecond
        )),
        Literal::TimeTz(t) => Ok(format!(
            "TIME '{:02}:{:02}:{:02}{} {}'",
            t.time.hour,
            t.time.minute,
            t.time.second,
            fraction(t.time.nanosecond),
            offset_fragment(t.offset.map(|o| o.local_minus_utc()).unwrap_or(0)),
        )),
        Literal::Timestamp(ts) => Ok(format!(
            "TIMESTAMP '{:04}-{:02}-{:02} {:02}:{:02}:{:02}{}'",
            ts.date.year,
            ts.date.month,
            ts.date.day,
            ts.time.hour,
            ts.time.minute,
            ts.time.second,
            fraction(ts.time.nanosecond),
        )),
        Literal::Instant(dt) => Ok(format!(
            "TIMESTAMP '{:04}-{:02}-{:02} {:02}:{:02}:{:02}{} {}'",
            dt.year(),
            dt.month(),
            dt.day(),
            dt.hour(),
            dt.minute(),
            dt.second(),
            fraction(dt.nanosecond()),
            offset_fragment(dt.offset().local_minus_utc()),
        )),
        Literal::Array(items) => {
            let mut fragments = Vec::with_capacity(items.len());
            for item in items {
                fragments.push(serialize(item)?);
            }
            Ok(format!("ARRAY[{}]", fragments.join(", ")))
        }
        // Digit precision of native floats will easily cause large problems;
        // use Numeric instead.
        Literal::Float(_) => Err(Error::UnsupportedArg("f32".to_string())),
        Literal::Double(_) => Err(Error::UnsupportedArg("f64".to_string())),
        Literal::Byte(_) => Err(Error::UnsupportedArg("u8".to_string())),
        Literal::Varbinary(_) => Err(Error::UnsupportedArg("byte array".to_string())),
        Literal::Duration(_) => Err(Error::UnsupportedArg("duration".to_string())),
        Literal::Json(_) => Err(Error::UnsupportedArg("raw json".to_string())),
        Literal::Map => Err(Error::UnsupportedArg("map".to_string())),
    }
}

/// Fractional seconds with trailing zeros removed; empty when zero.
fn fraction(nanosecond: u32) -> String {
    if nanosecond == 0 {
        return String::new();
    }
    let mut s = format!(".{:09}", nanosecond);
    while s.ends_with('0') {
        s.pop();
    }
    s
}

fn offset_fragment(offset_seconds: i32) -> String {
    let sign = if offset_seconds < 0 { '-' } else { '+' };
    let abs = offset_seconds.abs();
    format!("{}{:02}:{:02}", sign, abs / 3600, (abs % 3600) / 60)
}
