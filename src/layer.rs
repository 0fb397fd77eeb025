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

//! Layer implementation
//!
//! Each [`Span`](tracing::Span) gets its own [`Handler`], derived from its parent's (or, for a
//! root span, from the [`Layer`]'s) by binding the span's fields as a group named after the span.
//! Events are sent through the [`Handler`] belonging to the innermost span in which they occur.

use crate::{
    callsite::Caller,
    error::Result,
    handler::Handler,
    priority::Level,
    record::{Attr, Record},
};

use chrono::Utc;
use tracing::{field::Field, span, Event};
use tracing_subscriber::{layer::Context, registry::LookupSpan};

/// A [`tracing_subscriber::Layer`] that sends [`tracing`] events to journald.
pub struct Layer {
    handler: Handler,
}

/// The [`Handler`] for one span, kept in the span's extensions
struct SpanHandler(Handler);

impl Layer {
    pub fn new(handler: Handler) -> Layer {
        Layer { handler }
    }
    /// Send to journald's usual socket, with the default settings
    pub fn try_default() -> Result<Layer> {
        Ok(Layer::new(Handler::try_default()?))
    }
    pub fn handler(&self) -> &Handler {
        &self.handler
    }
}

/// Events emitted by this crate about itself are not fed back into the journal.
fn is_internal(target: &str) -> bool {
    target == crate::transport::TARGET || target == module_path!()
}

/// Collect an event's (or span's) fields as [`Attr`]s, setting aside the message.
#[derive(Default)]
struct AttrVisitor {
    message: Option<String>,
    attrs: Vec<Attr>,
}

impl tracing::field::Visit for AttrVisitor {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.attrs.push(Attr::new(field.name(), value));
    }
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.attrs.push(Attr::new(field.name(), value));
    }
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.attrs.push(Attr::new(field.name(), value));
    }
    fn record_bool(&mut self, field: &Field, value: bool) {
        self.attrs.push(Attr::new(field.name(), value));
    }
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.attrs.push(Attr::new(field.name(), value));
        }
    }
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        // The tracing macros pre-format `message` as `std::fmt::Arguments`, whose debug format
        // has no enclosing double-quotes.
        let text = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(text);
        } else {
            self.attrs.push(Attr::new(field.name(), text));
        }
    }
}

impl AttrVisitor {
    /// Bind whatever was collected to `handler`, as one group named `name`
    fn bind(self, name: &str, handler: &Handler) -> Handler {
        if self.attrs.is_empty() {
            handler.clone()
        } else {
            handler.with_attrs(&[Attr::group(name, self.attrs)])
        }
    }
}

impl<S> tracing_subscriber::layer::Layer<S> for Layer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        let span = match ctx.span(id) {
            Some(span) => span,
            None => return,
        };
        let parent = span
            .parent()
            .and_then(|parent| parent.extensions().get::<SpanHandler>().map(|h| h.0.clone()))
            .unwrap_or_else(|| self.handler.clone());
        let mut visitor = AttrVisitor::default();
        attrs.record(&mut visitor);
        let handler = visitor.bind(span.name(), &parent);
        span.extensions_mut().insert(SpanHandler(handler));
    }

    fn on_record(&self, id: &span::Id, values: &span::Record<'_>, ctx: Context<'_, S>) {
        let span = match ctx.span(id) {
            Some(span) => span,
            None => return,
        };
        let mut visitor = AttrVisitor::default();
        values.record(&mut visitor);
        let mut extensions = span.extensions_mut();
        if let Some(SpanHandler(handler)) = extensions.get_mut::<SpanHandler>() {
            *handler = visitor.bind(span.name(), handler);
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_internal(metadata.target()) {
            return;
        }
        let level = Level::from(metadata.level());
        let span = ctx.event_span(event);
        let extensions = span.as_ref().map(|span| span.extensions());
        let handler = extensions
            .as_ref()
            .and_then(|ext| ext.get::<SpanHandler>())
            .map(|h| &h.0)
            .unwrap_or(&self.handler);
        if !handler.enabled(level) {
            return;
        }

        let mut visitor = AttrVisitor::default();
        event.record(&mut visitor);
        let mut record = Record::new(
            Some(Utc::now()),
            level,
            visitor.message.unwrap_or_default(),
            Caller::Metadata(metadata),
        );
        record.add_attrs(visitor.attrs);

        if let Err(err) = handler.handle(&record) {
            tracing::error!("failed to send a journal entry: {}", err);
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;

    use crate::handler::test::Capture;

    use tracing::{debug, error, info, info_span, trace, warn, Callsite};
    use tracing_subscriber::{
        layer::SubscriberExt, // Needed to get `with()`
        registry::Registry,
    };

    use std::collections::HashMap;

    fn capture_subscriber() -> (Capture, impl tracing::Subscriber + Send + Sync) {
        let capture = Capture::default();
        let handler = Handler::builder()
            .transport(capture.clone())
            .build()
            .unwrap();
        (capture, Registry::default().with(Layer::new(handler)))
    }

    fn message(fields: &HashMap<String, Vec<u8>>) -> String {
        String::from_utf8(fields["MESSAGE"].clone()).unwrap()
    }

    #[test]
    fn events() {
        let (capture, subscriber) = capture_subscriber();
        let line = tracing::subscriber::with_default(subscriber, || {
            info!(user = "alice", n = 3, "hello, {}", "世界");
            line!() - 1
        });
        let entries = capture.entries();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(message(entry), "hello, 世界: user=alice n=3");
        assert_eq!(entry["PRIORITY"], b"6");
        assert!(String::from_utf8_lossy(&entry["CODE_FILE"]).ends_with("layer.rs"));
        assert_eq!(entry["CODE_LINE"], line.to_string().as_bytes());
        assert_eq!(entry["CODE_FUNC"], module_path!().as_bytes());
        assert!(entry.contains_key("SYSLOG_TIMESTAMP"));
    }

    #[test]
    fn levels() {
        let (capture, subscriber) = capture_subscriber();
        tracing::subscriber::with_default(subscriber, || {
            trace!("below the floor");
            debug!("d");
            info!("i");
            warn!("w");
            error!("e");
        });
        let priorities: Vec<Vec<u8>> = capture
            .entries()
            .into_iter()
            .map(|mut fields| fields.remove("PRIORITY").unwrap())
            .collect();
        assert_eq!(
            priorities,
            vec![b"7".to_vec(), b"6".to_vec(), b"4".to_vec(), b"3".to_vec()]
        );
    }

    #[test]
    fn spans() {
        let (capture, subscriber) = capture_subscriber();
        tracing::subscriber::with_default(subscriber, || {
            let req = info_span!("req", id = 7);
            let _req = req.enter();
            info!("outer");
            {
                let db = info_span!("db", table = "users", rows = tracing::field::Empty);
                let _db = db.enter();
                info!(ms = 12, "query");
                db.record("rows", 2);
                info!("done");
            }
            info!("after");
        });
        let messages: Vec<String> = capture.entries().iter().map(message).collect();
        assert_eq!(
            messages,
            vec![
                "outer: req.id=7",
                "query: req.id=7 db.table=users ms=12",
                "done: req.id=7 db.table=users db.rows=2",
                "after: req.id=7",
            ]
        );
    }

    #[test]
    fn own_diagnostics_are_skipped() {
        let (capture, subscriber) = capture_subscriber();
        tracing::subscriber::with_default(subscriber, || {
            info!(target: "journal_native::transport", "internal");
            info!(target: "journal_native::layer", "internal");
            info!(target: "journal_native::layer::elsewhere", "external");
        });
        let messages: Vec<String> = capture.entries().iter().map(message).collect();
        assert_eq!(messages, vec!["external"]);
    }

    // Building an `Event` by hand lets us control its metadata completely.
    struct TestCallsite {
        metadata: &'static tracing::Metadata<'static>,
    }
    impl tracing_core::callsite::Callsite for TestCallsite {
        fn set_interest(&self, _interest: tracing_core::subscriber::Interest) {}
        fn metadata(&self) -> &tracing::Metadata<'static> {
            self.metadata
        }
    }
    impl TestCallsite {
        pub const fn new(metadata: &'static tracing::Metadata<'static>) -> TestCallsite {
            TestCallsite { metadata }
        }
    }

    #[test]
    fn call_site_from_metadata() {
        static CALLSITE: TestCallsite = {
            static METADATA: tracing::Metadata = tracing::Metadata::new(
                "test event metadata",
                "test-target",
                tracing::Level::WARN,
                Some("src/app.rs"),
                Some(42),
                Some("app::module"),
                tracing::field::FieldSet::new(
                    &["message"],
                    tracing_core::callsite::Identifier(&CALLSITE),
                ),
                tracing_core::metadata::Kind::EVENT,
            );
            TestCallsite::new(&METADATA)
        };

        let (capture, subscriber) = capture_subscriber();
        tracing::subscriber::with_default(subscriber, || {
            let fields = CALLSITE.metadata().fields();
            let field = fields.field("message").unwrap();
            for _ in 0..2 {
                Event::dispatch(
                    CALLSITE.metadata(),
                    &fields.value_set(&[(
                        &field,
                        Some(&format_args!("Hello, world!") as &dyn tracing::field::Value),
                    )]),
                );
            }
        });

        let entries = capture.entries();
        assert_eq!(entries.len(), 2);
        for entry in &entries {
            assert_eq!(message(entry), "Hello, world!");
            assert_eq!(entry["PRIORITY"], b"4");
            assert_eq!(entry["CODE_FILE"], b"src/app.rs");
            assert_eq!(entry["CODE_LINE"], b"42");
            assert_eq!(entry["CODE_FUNC"], b"app::module");
        }
    }
}
