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

//! Encoding [`Record`]s as journal entries.
//!
//! # Introduction
//!
//! A [`Handler`] turns [`Record`]s into entries in journald's [native protocol] & hands them to a
//! [`Transport`]. An entry is a sequence of fields, each either `NAME=value\n` or, for values
//! that might contain a newline, `NAME\n` followed by the value's length as a little-endian
//! `u64`, the value itself & a closing `\n`. Every entry this crate produces looks like:
//!
//! ```text
//! PRIORITY=6
//! MESSAGE
//! <len>prefix message: k=v g.k2="v 2"
//! CODE_FILE=src/main.rs
//! CODE_LINE=12
//! CODE_FUNC=app::main
//! SYSLOG_TIMESTAMP=1700000000
//! ```
//!
//! Attributes are rendered into the `MESSAGE` field rather than as fields of their own, so the
//! message is always written in the length-prefixed form.
//!
//! [native protocol]: https://systemd.io/JOURNAL_NATIVE_PROTOCOL/
//!
//! # Derived handlers
//!
//! [`Handler::with_attrs`] & [`Handler::with_group`] return new [`Handler`]s rather than
//! modifying their receiver. Attributes bound through [`Handler::with_attrs`] are rendered once,
//! at binding time, and the text is copied into every subsequent entry; groups opened with
//! [`Handler::with_group`] are remembered & only rendered (as a key prefix) when attributes next
//! appear in them. Every derived [`Handler`] owns its own copy of that state, so handlers derived
//! from a common parent may be used (and derived from) concurrently.

use crate::{
    buffer::Scratch,
    callsite::CallsiteCache,
    error::{Error, Result},
    priority::{Level, Priority, LENGTH_SLOT},
    record::{Attr, Record},
    render::{RenderState, DEFAULT_TIME_FORMAT},
    transport::{Transport, DEFAULT_SOCKET},
};

use backtrace::Backtrace;
use bytes::{BufMut, BytesMut};

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

/// Separates the message from the attributes that follow it, e.g. `msg: k=v`
pub const COLON_DELIMITER: &str = ": ";
/// Separates the message from the attributes that follow it, e.g. `msg k=v`
pub const SPACE_DELIMITER: &str = " ";

/// Encodes [`Record`]s in journald's native protocol & sends them.
#[derive(Clone)]
pub struct Handler {
    level: Level,
    msg_prefix: String,
    time_format: Arc<str>,
    delimiter: Arc<str>,
    /// Attributes bound via `with_attrs()`, already rendered
    preformatted: Vec<u8>,
    /// Key prefix for the groups already reflected in `preformatted`
    group_prefix: String,
    /// Every group opened via `with_group()`
    groups: Vec<String>,
    /// How many of `groups` are reflected in `group_prefix`
    n_open_groups: usize,
    transport: Arc<dyn Transport>,
    callsites: Arc<CallsiteCache>,
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("level", &self.level)
            .field("msg_prefix", &self.msg_prefix)
            .field("preformatted", &String::from_utf8_lossy(&self.preformatted))
            .field("groups", &self.groups)
            .field("n_open_groups", &self.n_open_groups)
            .finish()
    }
}

/// Configure & build a [`Handler`].
pub struct HandlerBuilder {
    level: Level,
    msg_prefix: String,
    time_format: String,
    delimiter: String,
    socket: PathBuf,
    large_entries: bool,
    callsites: Option<Arc<CallsiteCache>>,
    transport: Option<Arc<dyn Transport>>,
}

impl std::default::Default for HandlerBuilder {
    fn default() -> Self {
        HandlerBuilder {
            level: Level::DEBUG,
            msg_prefix: String::new(),
            time_format: DEFAULT_TIME_FORMAT.to_string(),
            delimiter: COLON_DELIMITER.to_string(),
            socket: PathBuf::from(DEFAULT_SOCKET),
            large_entries: crate::anon_file::LARGE_ENTRY_SUPPORT,
            callsites: None,
            transport: None,
        }
    }
}

impl HandlerBuilder {
    /// Records below `level` are discarded
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
    /// Prepended to every message
    pub fn prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.msg_prefix = prefix.into();
        self
    }
    /// A [`chrono` format specification](chrono::format::strftime) for time-valued attributes
    pub fn time_format(mut self, spec: &str) -> Result<Self> {
        use chrono::format::{Item, StrftimeItems};
        if StrftimeItems::new(spec).any(|item| matches!(item, Item::Error)) {
            return Err(Error::BadTimeFormat {
                spec: spec.to_string(),
                back: Backtrace::new(),
            });
        }
        self.time_format = spec.to_string();
        Ok(self)
    }
    /// Written between the message & the first attribute
    pub fn delimiter<S: Into<String>>(mut self, delimiter: S) -> Self {
        self.delimiter = delimiter.into();
        self
    }
    /// Send to the socket at `path` rather than journald's usual address. Ignored if a
    /// [`Transport`] is supplied.
    pub fn socket<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.socket = path.as_ref().to_path_buf();
        self
    }
    /// Whether to pass entries too large for a datagram by file descriptor. Ignored if a
    /// [`Transport`] is supplied.
    pub fn large_entries(mut self, enabled: bool) -> Self {
        self.large_entries = enabled;
        self
    }
    /// Share a [`CallsiteCache`] with other [`Handler`]s
    pub fn callsites(mut self, callsites: Arc<CallsiteCache>) -> Self {
        self.callsites = Some(callsites);
        self
    }
    /// Send entries via `transport`
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        let transport: Arc<dyn Transport> = Arc::new(transport);
        self.transport = Some(transport);
        self
    }
    pub fn build(self) -> Result<Handler> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport(&self.socket, self.large_entries)?,
        };
        Ok(Handler {
            level: self.level,
            msg_prefix: self.msg_prefix,
            time_format: Arc::from(self.time_format),
            delimiter: Arc::from(self.delimiter),
            preformatted: Vec::new(),
            group_prefix: String::new(),
            groups: Vec::new(),
            n_open_groups: 0,
            transport,
            callsites: self.callsites.unwrap_or_default(),
        })
    }
}

#[cfg(unix)]
fn default_transport(path: &Path, large_entries: bool) -> Result<Arc<dyn Transport>> {
    let socket = crate::transport::JournalSocket::new(path)?.with_large_entries(large_entries);
    Ok(Arc::new(socket))
}

#[cfg(not(unix))]
fn default_transport(_path: &Path, _large_entries: bool) -> Result<Arc<dyn Transport>> {
    Err(Error::Socket {
        source: std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Unix datagram sockets are not available on this platform",
        ),
        back: Backtrace::new(),
    })
}

impl Handler {
    pub fn builder() -> HandlerBuilder {
        HandlerBuilder::default()
    }

    /// Attempt to construct a [`Handler`] that sends to journald at its usual address, with the
    /// default settings
    pub fn try_default() -> Result<Handler> {
        Handler::builder().build()
    }

    /// True if a record at `level` would be sent
    pub fn enabled(&self, level: Level) -> bool {
        level >= self.level
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn callsites(&self) -> &Arc<CallsiteCache> {
        &self.callsites
    }

    /// Derive a [`Handler`] whose entries carry `attrs` (in addition to any already bound).
    pub fn with_attrs(&self, attrs: &[Attr]) -> Handler {
        let mut h2 = self.clone();
        let sep = if h2.preformatted.is_empty() { "" } else { " " };
        let mut state = RenderState::new(
            &mut h2.preformatted,
            sep,
            &self.group_prefix,
            &self.time_format,
        );
        state.open_groups(&self.groups[self.n_open_groups..]);
        state.append_attrs(attrs);
        // Remember the prefix for later keys, and that these groups needn't be opened again.
        h2.group_prefix = state.prefix;
        h2.n_open_groups = h2.groups.len();
        h2
    }

    /// Derive a [`Handler`] that qualifies all subsequent attribute keys with `name`.
    pub fn with_group(&self, name: &str) -> Handler {
        let mut h2 = self.clone();
        if !name.is_empty() {
            h2.groups.push(name.to_string());
        }
        h2
    }

    /// Derive a [`Handler`] whose message prefix is this one's followed by `prefix`.
    pub fn extend_prefix(&self, prefix: &str) -> Handler {
        let mut h2 = self.clone();
        h2.msg_prefix.push_str(prefix);
        h2
    }

    /// Encode & send `record`; records below this handler's level are quietly dropped.
    pub fn handle(&self, record: &Record) -> Result<()> {
        if !self.enabled(record.level) {
            return Ok(());
        }
        let entry = self.encode(record);
        self.transport.send(&entry)
    }

    /// Encode `record` as one complete journal entry.
    pub fn encode(&self, record: &Record) -> Scratch {
        let mut buf = Scratch::new();

        buf.put_slice(Priority::from_level(record.level).preamble());
        let message_offset = buf.len();
        buf.put_slice(self.msg_prefix.as_bytes());
        buf.put_slice(record.message.as_bytes());
        let sep: &str = if buf.len() > message_offset {
            &self.delimiter
        } else {
            ""
        };
        self.append_non_builtins(&mut buf, sep, record);
        let message_len = (buf.len() - message_offset) as u64;
        buf[message_offset - LENGTH_SLOT..message_offset]
            .copy_from_slice(&message_len.to_le_bytes());
        buf.put_u8(b'\n');

        buf.put_slice(self.callsites.resolve(record.caller).as_bytes());
        if let Some(time) = record.time {
            buf.put_slice(b"SYSLOG_TIMESTAMP=");
            buf.put_slice(time.timestamp().to_string().as_bytes());
            buf.put_u8(b'\n');
        }

        buf
    }

    /// Append the bound attributes, then the record's own.
    fn append_non_builtins(&self, buf: &mut BytesMut, sep: &str, record: &Record) {
        let mut sep = sep;
        if !self.preformatted.is_empty() {
            buf.put_slice(sep.as_bytes());
            buf.put_slice(&self.preformatted);
            sep = " ";
        }
        // The record's attributes belong in every group opened so far, including any that
        // `with_attrs()` hasn't yet had occasion to render.
        let mut state = RenderState::new(buf, sep, &self.group_prefix, &self.time_format);
        state.open_groups(&self.groups[self.n_open_groups..]);
        state.append_attrs(&record.attrs);
    }
}
