// Copyright (C) 2022-2025 Michael Herstine <sp1ff@pobox.com>
//
// This file is part of journal-native.
//
// journal-native is free software: you can redistribute it and/or modify it under the terms of the
// GNU General Public License as published by the Free Software Foundation, either version 3 of the
// License, or (at your option) any later version.
//
// journal-native is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See
// the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with journal-native.  If
// not, see <http://www.gnu.org/licenses/>.

//! Log records & their attributes.
//!
//! A [`Record`] is what a logging front-end hands to a [`Handler`]: a timestamp, a [`Level`], a
//! message, the identity of the call site that produced it and an ordered list of [`Attr`]s. The
//! [`Handler`] borrows it for the duration of one call & keeps nothing.
//!
//! [`Handler`]: crate::handler::Handler

use crate::{callsite::Caller, priority::Level};

use chrono::prelude::*;

use std::sync::Arc;

/// Something that computes its [`Value`] only when the attribute is actually rendered.
pub trait LogValuer: Send + Sync {
    fn log_value(&self) -> Value;
}

impl<F> LogValuer for F
where
    F: Fn() -> Value + Send + Sync,
{
    fn log_value(&self) -> Value {
        self()
    }
}

/// A structured source location
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Source {
    pub function: String,
    pub file: String,
    pub line: u32,
}

/// The value half of an [`Attr`]
#[derive(Clone)]
pub enum Value {
    String(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    Bool(bool),
    Time(DateTime<FixedOffset>),
    Duration(std::time::Duration),
    Source(Source),
    Group(Vec<Attr>),
    Lazy(Arc<dyn LogValuer>),
}

/// The number of times [`Value::resolve`] will call a [`LogValuer`] that keeps answering with
/// another [`LogValuer`].
const MAX_LOG_VALUER_DEPTH: usize = 100;

impl Value {
    /// Replace a [`Value::Lazy`] with whatever it computes.
    pub fn resolve(self) -> Value {
        let mut value = self;
        for _ in 0..MAX_LOG_VALUER_DEPTH {
            match value {
                Value::Lazy(valuer) => value = valuer.log_value(),
                other => return other,
            }
        }
        Value::String("!ERROR:LogValuer resolution exceeded the maximum depth".to_string())
    }

    /// The "zero" value for each kind; an [`Attr`] with an empty key & a zero value is elided.
    pub(crate) fn is_zero(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::Int(n) => *n == 0,
            Value::Uint(n) => *n == 0,
            Value::Float(x) => *x == 0.0,
            Value::Bool(b) => !b,
            // Every instant, the epoch included, is a real time.
            Value::Time(_) => false,
            Value::Duration(d) => d.is_zero(),
            Value::Source(src) => *src == Source::default(),
            Value::Group(attrs) => attrs.is_empty(),
            Value::Lazy(_) => false,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Int(n) => write!(f, "Int({})", n),
            Value::Uint(n) => write!(f, "Uint({})", n),
            Value::Float(x) => write!(f, "Float({})", x),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Time(t) => write!(f, "Time({})", t),
            Value::Duration(d) => write!(f, "Duration({:?})", d),
            Value::Source(src) => write!(f, "Source({:?})", src),
            Value::Group(attrs) => f.debug_tuple("Group").field(attrs).finish(),
            Value::Lazy(_) => write!(f, "Lazy(..)"),
        }
    }
}

impl std::fmt::Display for Value {
    /// Scalars only; times, sources & groups are rendered by the handler.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::String(s) => write!(f, "{}", s),
            Value::Int(n) => write!(f, "{}", n),
            Value::Uint(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{}", x),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339()),
            Value::Duration(d) => write!(f, "{:?}", d),
            Value::Source(src) => write!(f, "{}:{}", src.file, src.line),
            Value::Group(attrs) => {
                write!(f, "[")?;
                for (i, attr) in attrs.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{}={}", attr.key, attr.value)?;
                }
                write!(f, "]")
            }
            Value::Lazy(_) => write!(f, "<lazy>"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<u64> for Value {
    fn from(n: u64) -> Self {
        Value::Uint(n)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Value::Float(x)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Value {
    fn from(t: DateTime<Tz>) -> Self {
        Value::Time(t.fixed_offset())
    }
}

impl From<std::time::Duration> for Value {
    fn from(d: std::time::Duration) -> Self {
        Value::Duration(d)
    }
}

impl From<Source> for Value {
    fn from(src: Source) -> Self {
        Value::Source(src)
    }
}

/// A key/value pair
#[derive(Clone, Debug)]
pub struct Attr {
    pub key: String,
    pub value: Value,
}

impl Attr {
    pub fn new<K: Into<String>, V: Into<Value>>(key: K, value: V) -> Attr {
        Attr {
            key: key.into(),
            value: value.into(),
        }
    }
    /// A group of attributes; an empty `key` splices `attrs` into the enclosing scope.
    pub fn group<K: Into<String>>(key: K, attrs: Vec<Attr>) -> Attr {
        Attr {
            key: key.into(),
            value: Value::Group(attrs),
        }
    }
    /// An attribute whose value is computed when (and if) it is rendered
    pub fn lazy<K: Into<String>, L: LogValuer + 'static>(key: K, valuer: L) -> Attr {
        Attr {
            key: key.into(),
            value: Value::Lazy(Arc::new(valuer)),
        }
    }
    /// True if both key & value are empty
    pub fn is_empty(&self) -> bool {
        self.key.is_empty() && self.value.is_zero()
    }
}

/// One log event, as handed to a [`Handler`](crate::handler::Handler).
#[derive(Clone, Debug)]
pub struct Record {
    /// `None` means "unspecified"; no `SYSLOG_TIMESTAMP` field is written
    pub time: Option<DateTime<Utc>>,
    pub level: Level,
    pub message: String,
    pub caller: Caller,
    pub attrs: Vec<Attr>,
}

impl Record {
    pub fn new<M: Into<String>>(
        time: Option<DateTime<Utc>>,
        level: Level,
        message: M,
        caller: Caller,
    ) -> Record {
        Record {
            time,
            level,
            message: message.into(),
            caller,
            attrs: Vec::new(),
        }
    }
    pub fn add_attrs<I: IntoIterator<Item = Attr>>(&mut self, attrs: I) {
        self.attrs.extend(attrs)
    }
    pub fn with_attr<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Record {
        self.attrs.push(Attr::new(key, value));
        self
    }
}
