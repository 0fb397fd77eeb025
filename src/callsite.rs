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

//! Call-site identity & the call-site cache.
//!
//! Every journal entry carries `CODE_FILE`, `CODE_LINE` & `CODE_FUNC` fields describing the code
//! that logged it. Working those out from a program counter means symbolicating it, which is far
//! too slow to do per record. Since the number of distinct call sites is a property of the
//! program text rather than of traffic, [`CallsiteCache`] simply remembers every answer it has
//! ever computed & never evicts.

use dashmap::DashMap;

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Who logged a record
#[derive(Copy, Clone, Debug)]
pub enum Caller {
    /// A program counter within the logging function, e.g. as returned by [`caller_pc`]; zero
    /// means "unknown"
    Pc(usize),
    /// The static metadata of a [`tracing`] call site
    ///
    /// [`tracing`]: https://docs.rs/tracing/latest/tracing/index.html
    Metadata(&'static tracing::Metadata<'static>),
}

impl std::default::Default for Caller {
    fn default() -> Self {
        Caller::Pc(0)
    }
}

impl Caller {
    /// The cache key. Program counters point into code & metadata lives in static data, so the
    /// two never collide.
    fn key(&self) -> usize {
        match self {
            Caller::Pc(pc) => *pc,
            Caller::Metadata(meta) => *meta as *const tracing::Metadata<'static> as usize,
        }
    }

    /// Work out this caller's location fields, the slow way.
    fn location_fields(&self) -> String {
        match self {
            Caller::Pc(0) => format_location("", 0, ""),
            Caller::Pc(pc) => {
                let mut location: Option<String> = None;
                // An address inside inlined code resolves to several symbols, innermost first;
                // the innermost is the one that actually logged.
                backtrace::resolve(*pc as *mut std::ffi::c_void, |symbol| {
                    if location.is_none() {
                        let file = symbol
                            .filename()
                            .map(|p| p.display().to_string())
                            .unwrap_or_default();
                        let function = symbol
                            .name()
                            .map(|name| format!("{:#}", name))
                            .unwrap_or_default();
                        location = Some(format_location(
                            &file,
                            symbol.lineno().unwrap_or(0),
                            &function,
                        ));
                    }
                });
                location.unwrap_or_else(|| format_location("", 0, ""))
            }
            Caller::Metadata(meta) => format_location(
                meta.file().unwrap_or(""),
                meta.line().unwrap_or(0),
                meta.module_path().unwrap_or_else(|| meta.target()),
            ),
        }
    }
}

fn format_location(file: &str, line: u32, function: &str) -> String {
    format!(
        "CODE_FILE={}\nCODE_LINE={}\nCODE_FUNC={}\n",
        file.replace('\n', " "),
        line,
        function.replace('\n', " ")
    )
}

/// Return a program counter within the function that called this one.
///
/// Returns zero if the caller's frame can't be found (e.g. on a platform where the unwinder can't
/// report the start of a function).
#[inline(never)]
pub fn caller_pc() -> usize {
    let this = caller_pc as fn() -> usize as usize;
    let mut found = false;
    let mut pc = 0;
    backtrace::trace(|frame| {
        if found {
            pc = frame.ip() as usize;
            return false;
        }
        if frame.symbol_address() as usize == this {
            found = true;
        }
        true
    });
    pc
}

/// Process-wide memo from [`Caller`] to its pre-joined `CODE_FILE`/`CODE_LINE`/`CODE_FUNC`
/// fields.
///
/// Safe for concurrent use. Two threads missing on the same key at the same time will both compute
/// the fields & both insert them; since the fields are a pure function of the key, it doesn't
/// matter whose insert lands last.
#[derive(Debug, Default)]
pub struct CallsiteCache {
    fields: DashMap<usize, Arc<str>>,
    misses: AtomicUsize,
}

impl CallsiteCache {
    pub fn new() -> CallsiteCache {
        CallsiteCache::default()
    }

    /// Look up the location fields for `caller`, computing them on first use.
    pub fn resolve(&self, caller: Caller) -> Arc<str> {
        let key = caller.key();
        if let Some(hit) = self.fields.get(&key) {
            return hit.value().clone();
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let fields: Arc<str> = Arc::from(caller.location_fields());
        self.fields.insert(key, fields.clone());
        fields
    }

    /// The number of lookups that had to compute their answer
    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }

    /// The number of distinct call sites seen so far
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn unknown_caller() {
        let cache = CallsiteCache::new();
        assert_eq!(
            &*cache.resolve(Caller::default()),
            "CODE_FILE=\nCODE_LINE=0\nCODE_FUNC=\n"
        );
    }

    #[test]
    fn same_pc_same_answer() {
        let cache = CallsiteCache::new();
        let mut pcs = Vec::new();
        for _ in 0..2 {
            pcs.push(caller_pc());
        }
        assert_eq!(pcs[0], pcs[1]);
        let first = cache.resolve(Caller::Pc(pcs[0]));
        let second = cache.resolve(Caller::Pc(pcs[1]));
        assert_eq!(first, second);
        assert_eq!(cache.misses(), 1);
        assert_eq!(cache.len(), 1);
        assert!(first.starts_with("CODE_FILE="));
        assert!(first.ends_with('\n'));
    }

    #[test]
    fn distinct_callers() {
        let cache = CallsiteCache::new();
        let a = caller_pc();
        let b = caller_pc();
        cache.resolve(Caller::Pc(a));
        cache.resolve(Caller::Pc(b));
        cache.resolve(Caller::Pc(a));
        assert_eq!(cache.misses(), if a == b { 1 } else { 2 });
    }

    #[test]
    fn concurrent_lookups() {
        let cache = Arc::new(CallsiteCache::new());
        let pc = caller_pc();
        let expected = cache.resolve(Caller::Pc(pc));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.resolve(Caller::Pc(pc)))
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
        assert_eq!(cache.misses(), 1);
    }
}
