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

//! Scratch buffers.
//!
//! Entries are assembled in a [`Scratch`]: a [`BytesMut`] borrowed from a per-thread free list &
//! handed back (emptied) when the [`Scratch`] is dropped, so that steady-state logging doesn't
//! allocate a fresh buffer per record.

use bytes::BytesMut;

use std::cell::RefCell;

/// Buffers that grew past this are dropped rather than pooled, so that one huge entry doesn't pin
/// its memory for the life of the thread.
const MAX_POOLED_CAPACITY: usize = 64 * 1024;
const INITIAL_CAPACITY: usize = 1024;
/// Bound on the number of idle buffers kept per thread
const MAX_POOLED_BUFFERS: usize = 8;

thread_local! {
    static POOL: RefCell<Vec<BytesMut>> = const { RefCell::new(Vec::new()) };
}

/// A pooled, growable byte buffer
pub struct Scratch {
    buf: BytesMut,
}

impl Scratch {
    pub fn new() -> Scratch {
        let buf = POOL
            .try_with(|pool| pool.borrow_mut().pop())
            .ok()
            .flatten()
            .unwrap_or_else(|| BytesMut::with_capacity(INITIAL_CAPACITY));
        Scratch { buf }
    }
}

impl std::default::Default for Scratch {
    fn default() -> Self {
        Scratch::new()
    }
}

impl std::ops::Deref for Scratch {
    type Target = BytesMut;
    fn deref(&self) -> &BytesMut {
        &self.buf
    }
}

impl std::ops::DerefMut for Scratch {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let mut buf = std::mem::take(&mut self.buf);
        if buf.capacity() > MAX_POOLED_CAPACITY {
            return;
        }
        buf.clear();
        // The pool may already be gone if we're being dropped during thread teardown.
        let _ = POOL.try_with(|pool| {
            let mut pool = pool.borrow_mut();
            if pool.len() < MAX_POOLED_BUFFERS {
                pool.push(buf);
            }
        });
    }
}

#[cfg(test)]
mod test {
    use super::*;

    use bytes::BufMut;

    #[test]
    fn reuse() {
        let ptr = {
            let mut s = Scratch::new();
            s.put_slice(b"hello");
            assert_eq!(&s[..], b"hello");
            s.as_ptr()
        };
        let s = Scratch::new();
        assert!(s.is_empty());
        assert_eq!(s.as_ptr(), ptr);
    }

    #[test]
    fn oversized_buffers_are_not_pooled() {
        {
            let mut s = Scratch::new();
            s.put_bytes(b'x', MAX_POOLED_CAPACITY * 2);
        }
        let s = Scratch::new();
        assert!(s.capacity() <= MAX_POOLED_CAPACITY);
    }
}
