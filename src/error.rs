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

//! [journal-native](crate) errors

use backtrace::Backtrace;

/// [journal-native](crate) error type
///
/// [journal-native](crate) eschews libraries like [thiserror], [anyhow] & [Snafu] in favor of
/// a straightforward enumeration with a few match arms chosen on the basis what the caller will
/// need to respond.
///
/// The transport variants carry the [`std::io::Error`] exactly as the operating system reported
/// it; see [`Error::io_error`].
///
/// [thiserror]: https://docs.rs/thiserror
/// [anyhow]: https://docs.rs/anyhow
/// [Snafu]: https://docs.rs/snafu/latest/snafu
#[non_exhaustive]
pub enum Error {
    /// A time format specification that `chrono` can't parse
    BadTimeFormat { spec: String, back: Backtrace },
    /// Failed to open the local sending socket
    Socket {
        source: std::io::Error,
        back: Backtrace,
    },
    /// Failed to send an entry to the journal
    Send {
        source: std::io::Error,
        back: Backtrace,
    },
    /// Failed to hand an oversized entry to the journal by way of a file descriptor
    Fallback {
        source: std::io::Error,
        back: Backtrace,
    },
}

impl Error {
    /// The underlying I/O error, if any
    pub fn io_error(&self) -> Option<&std::io::Error> {
        match self {
            Error::Socket { source, .. }
            | Error::Send { source, .. }
            | Error::Fallback { source, .. } => Some(source),
            Error::BadTimeFormat { .. } => None,
        }
    }
}

impl std::fmt::Display for Error {
    // `Error` is non-exhaustive so that adding variants won't be a breaking change to our
    // callers. That means the compiler won't catch us if we miss a variant here, so we
    // always include a `_` arm.
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadTimeFormat { spec, .. } => {
                write!(f, "{:?} is not a valid time format specification", spec)
            }
            Error::Socket { source, .. } => {
                write!(f, "While opening a socket to the journal, got {}", source)
            }
            Error::Send { source, .. } => {
                write!(f, "While sending a journal entry, got {}", source)
            }
            Error::Fallback { source, .. } => write!(
                f,
                "While passing an oversized journal entry by file descriptor, got {}",
                source
            ),
            _ => write!(f, "journal-native error"),
        }
    }
}

impl std::fmt::Debug for Error {
    #[allow(unreachable_patterns)]
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::BadTimeFormat { spec: _, back } => write!(f, "{}\n{:#?}", self, back),
            Error::Socket { source: _, back } => write!(f, "{}\n{:#?}", self, back),
            Error::Send { source: _, back } => write!(f, "{}\n{:#?}", self, back),
            Error::Fallback { source: _, back } => write!(f, "{}\n{:#?}", self, back),
            _ => write!(f, "{}", self),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.io_error()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
