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

//! Rendering attributes as `key=value` text.
//!
//! Attributes end up in the journal's `MESSAGE` field as space-separated `key=value` pairs. Keys
//! inside groups are qualified by the group names, joined with `.`; values (and keys) containing
//! whitespace, control characters or a double quote are written as double-quoted strings with
//! backslash escapes.

use crate::record::{Attr, Value};

use bytes::BufMut;

use std::fmt::Write;

/// Separator between group names & keys
pub const KEY_COMPONENT_SEP: char = '.';

/// The default format for time-valued attributes: RFC 3339 with nanoseconds & a numeric offset
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.9f%:z";

/// Rendering state for one pass over a list of attributes.
///
/// `sep` is written before the next key; it starts out as whatever the caller needs (empty at the
/// start of a buffer, the delimiter right after a message) & becomes a single space once anything
/// has been written. `prefix` holds the group qualification for the next key, including its
/// trailing `.`.
pub struct RenderState<'a, B: BufMut> {
    pub buf: &'a mut B,
    pub sep: &'a str,
    pub prefix: String,
    time_format: &'a str,
}

impl<'a, B: BufMut> RenderState<'a, B> {
    pub fn new(buf: &'a mut B, sep: &'a str, prefix: &str, time_format: &'a str) -> Self {
        RenderState {
            buf,
            sep,
            prefix: prefix.to_string(),
            time_format,
        }
    }

    /// Open each of `groups` in turn
    pub fn open_groups(&mut self, groups: &[String]) {
        for name in groups {
            self.open_group(name);
        }
    }

    pub fn open_group(&mut self, name: &str) {
        self.prefix.push_str(name);
        self.prefix.push(KEY_COMPONENT_SEP);
    }

    fn close_group(&mut self, name: &str) {
        let len = self.prefix.len().saturating_sub(name.len() + 1);
        self.prefix.truncate(len);
        self.sep = " ";
    }

    pub fn append_attrs<'b, I: IntoIterator<Item = &'b Attr>>(&mut self, attrs: I) {
        for attr in attrs {
            self.append_attr(attr);
        }
    }

    pub fn append_attr(&mut self, attr: &Attr) {
        let resolved;
        let value = match &attr.value {
            Value::Lazy(_) => {
                resolved = attr.value.clone().resolve();
                &resolved
            }
            value => value,
        };
        if attr.key.is_empty() && value.is_zero() {
            return;
        }
        match value {
            Value::Group(attrs) => {
                if attrs.is_empty() {
                    return;
                }
                // A group with an empty key is spliced into the enclosing scope.
                if !attr.key.is_empty() {
                    self.open_group(&attr.key);
                }
                for child in attrs {
                    self.append_attr(child);
                }
                if !attr.key.is_empty() {
                    self.close_group(&attr.key);
                }
            }
            Value::String(s) => {
                self.append_key(&attr.key);
                self.append_string(s);
            }
            Value::Source(src) => {
                self.append_key(&attr.key);
                self.append_string(&format!("{}:{}", src.file, src.line));
            }
            Value::Time(t) => {
                let mut text = String::new();
                if write!(text, "{}", t.format(self.time_format)).is_err() {
                    text.clear();
                    text.push_str(&t.to_rfc3339());
                }
                self.append_key(&attr.key);
                self.append_string(&text);
            }
            value => {
                self.append_key(&attr.key);
                self.append_string(&value.to_string());
            }
        }
    }

    fn append_key(&mut self, key: &str) {
        self.buf.put_slice(self.sep.as_bytes());
        if self.prefix.is_empty() {
            self.append_string(key);
        } else {
            let qualified = format!("{}{}", self.prefix, key);
            self.append_string(&qualified);
        }
        self.buf.put_u8(b'=');
        self.sep = " ";
    }

    fn append_string(&mut self, s: &str) {
        if needs_quoting(s) {
            append_quoted(&mut *self.buf, s);
        } else {
            self.buf.put_slice(s.as_bytes());
        }
    }
}

/// True if `s` contains whitespace, control characters or a double quote
pub fn needs_quoting(s: &str) -> bool {
    s.chars()
        .any(|c| c.is_whitespace() || c.is_control() || c == '"')
}

/// Write `s` as a double-quoted string, escaping quotes, backslashes & control characters
pub fn append_quoted<B: BufMut>(buf: &mut B, s: &str) {
    buf.put_u8(b'"');
    for c in s.chars() {
        match c {
            '"' => buf.put_slice(b"\\\""),
            '\\' => buf.put_slice(b"\\\\"),
            '\x07' => buf.put_slice(b"\\a"),
            '\x08' => buf.put_slice(b"\\b"),
            '\x0c' => buf.put_slice(b"\\f"),
            '\n' => buf.put_slice(b"\\n"),
            '\r' => buf.put_slice(b"\\r"),
            '\t' => buf.put_slice(b"\\t"),
            '\x0b' => buf.put_slice(b"\\v"),
            c if (c as u32) < 0x20 || c == '\x7f' => {
                buf.put_slice(format!("\\x{:02x}", c as u32).as_bytes())
            }
            c if c.is_control() => buf.put_slice(format!("\\u{:04x}", c as u32).as_bytes()),
            c => {
                let mut utf8 = [0u8; 4];
                buf.put_slice(c.encode_utf8(&mut utf8).as_bytes());
            }
        }
    }
    buf.put_u8(b'"');
}
