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

//! Structured logging straight to [systemd-journald], in its [native protocol].
//!
//! [systemd-journald]: https://www.freedesktop.org/software/systemd/man/systemd-journald.service.html
//! [native protocol]: https://systemd.io/JOURNAL_NATIVE_PROTOCOL/
//!
//! # Introduction
//!
//! journald accepts log entries on a Unix datagram socket (`/run/systemd/journal/socket`) in a
//! simple format of its own: a sequence of `NAME=value` lines, with a length-prefixed binary form
//! for values that might contain newlines. Speaking that protocol directly (rather than going
//! through `syslog(3)` or stderr) lets a program attach its own priority, source location &
//! timestamp to each entry.
//!
//! This crate provides:
//!
//! - a [`Handler`](handler::Handler) that encodes [`Record`](record::Record)s (a level, a
//!   message & a list of key/value [`Attr`](record::Attr)ibutes) as journal entries; handlers may
//!   be cheaply derived from one another to attach attributes & groups once rather than on every
//!   record
//! - a [`JournalSocket`](transport::JournalSocket) transport that, when an entry is too large
//!   for a single datagram, writes it to an anonymous file & passes journald the descriptor
//!   instead
//! - a [`tracing-subscriber`] [`Layer`](layer::Layer) so that [`tracing`] events & spans can be
//!   sent to the journal
//!
//! [`tracing-subscriber`]: https://docs.rs/tracing-subscriber/latest/tracing_subscriber/index.html
//! [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
//!
//! # Usage
//!
//! With [`tracing`]:
//!
//! ```no_run
//! use tracing::info;
//! use journal_native::layer::Layer;
//! use tracing_subscriber::registry::Registry;
//! use tracing_subscriber::layer::SubscriberExt; // Needed to get `with()`
//!
//! let subscriber = Registry::default().with(Layer::try_default().unwrap());
//! let _guard = tracing::subscriber::set_default(subscriber);
//!
//! let span = tracing::info_span!("req", id = 7);
//! let _enter = span.enter();
//! info!(user = "alice", "Hello, world!");
//! ```
//!
//! will produce a journal entry whose `MESSAGE` is `Hello, world!: req.id=7 user=alice`, with
//! `PRIORITY=6` & `CODE_FILE`, `CODE_LINE` & `CODE_FUNC` fields naming the call site.
//!
//! The [`Handler`](handler::Handler) may also be used directly:
//!
//! ```no_run
//! use journal_native::{
//!     callsite::{caller_pc, Caller},
//!     handler::{Handler, SPACE_DELIMITER},
//!     priority::Level,
//!     record::{Attr, Record},
//! };
//!
//! let handler = Handler::builder()
//!     .level(Level::INFO)
//!     .delimiter(SPACE_DELIMITER)
//!     .build()
//!     .unwrap()
//!     .with_attrs(&[Attr::new("service", "frobnicator")])
//!     .with_group("req");
//!
//! let record = Record::new(
//!     Some(chrono::Utc::now()),
//!     Level::WARN,
//!     "slow request",
//!     Caller::Pc(caller_pc()),
//! )
//! .with_attr("ms", 1500i64);
//! handler.handle(&record).unwrap();
//! ```

pub mod anon_file;
pub mod buffer;
pub mod callsite;
pub mod error;
pub mod handler;
pub mod layer;
pub mod priority;
pub mod record;
pub mod render;
pub mod transport;
