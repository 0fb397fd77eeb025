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

//! Test writing to journald on the local host.
//!
//! Check the results with `journalctl -o verbose _COMM=journal-test`.

use journal_native::{
    callsite::{caller_pc, Caller},
    handler::Handler,
    layer::Layer,
    priority::Level,
    record::{Attr, Record},
};
use tracing::{debug, error, info, info_span, trace, warn};
use tracing_subscriber::{
    layer::SubscriberExt, // Needed to get `with()`
    registry::Registry,
};

pub fn main() {
    let subscriber = Registry::default().with(Layer::try_default().unwrap());
    let _guard = tracing::subscriber::set_default(subscriber);

    trace!("你好, journald.");
    debug!("你好, journald.");
    info!(lang = "zh", "你好, journald.");
    warn!("你好, journald.");
    error!("你好, journald.");

    let span = info_span!("req", id = 7);
    let _enter = span.enter();
    info!(user = "alice", "inside a span");

    // Far too large for one datagram; should arrive via a passed file descriptor.
    let handler = Handler::try_default()
        .unwrap()
        .with_attrs(&[Attr::new("test", "large-entry")]);
    let big = "x".repeat(1024 * 1024);
    handler
        .handle(
            &Record::new(
                Some(chrono::Utc::now()),
                Level::NOTICE,
                "a one megabyte message follows",
                Caller::Pc(caller_pc()),
            )
            .with_attr("payload", big),
        )
        .unwrap();
}
