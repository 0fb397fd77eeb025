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

//! Application severity levels & journal priorities.
//!
//! There are two scales in play. [`Level`] is the application's: an open-ended, ordered integer
//! scale with a handful of named tiers spaced far enough apart that callers can express
//! "a little more than INFO" as `Level::INFO + 1`. [`Priority`] is the journal's: the eight
//! `<syslog.h>` levels, with zero the most severe. [`Priority::from_level`] maps the former onto
//! the latter through a fixed table.

type StdResult<T, E> = std::result::Result<T, E>;

/// An ordered severity level; larger is more severe.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Level(pub i32);

impl Level {
    pub const DEBUG: Level = Level(-4);
    pub const INFO: Level = Level(0);
    pub const NOTICE: Level = Level(2);
    pub const WARN: Level = Level(4);
    pub const ERROR: Level = Level(8);
    pub const CRIT: Level = Level(12);
    pub const ALERT: Level = Level(16);
}

impl std::default::Default for Level {
    fn default() -> Self {
        Level::INFO
    }
}

impl std::ops::Add<i32> for Level {
    type Output = Level;
    fn add(self, rhs: i32) -> Level {
        Level(self.0.saturating_add(rhs))
    }
}

impl std::ops::Sub<i32> for Level {
    type Output = Level;
    fn sub(self, rhs: i32) -> Level {
        Level(self.0.saturating_sub(rhs))
    }
}

impl std::fmt::Display for Level {
    /// Named tiers print by name; anything else prints as an offset from the nearest tier below
    /// it, e.g. "INFO+1".
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        const TIERS: [(Level, &str); 7] = [
            (Level::ALERT, "ALERT"),
            (Level::CRIT, "CRIT"),
            (Level::ERROR, "ERROR"),
            (Level::WARN, "WARN"),
            (Level::NOTICE, "NOTICE"),
            (Level::INFO, "INFO"),
            (Level::DEBUG, "DEBUG"),
        ];
        let (base, name) = TIERS
            .iter()
            .find(|(tier, _)| *self >= *tier)
            .copied()
            .unwrap_or((Level::DEBUG, "DEBUG"));
        match self.0 - base.0 {
            0 => write!(f, "{}", name),
            n if n > 0 => write!(f, "{}+{}", name, n),
            n => write!(f, "{}{}", name, n),
        }
    }
}

impl std::convert::From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Level::DEBUG - 4,
            tracing::Level::DEBUG => Level::DEBUG,
            tracing::Level::INFO => Level::INFO,
            tracing::Level::WARN => Level::WARN,
            tracing::Level::ERROR => Level::ERROR,
        }
    }
}

/// The eight journal priorities. The enumeration values duplicate the constants documented as
/// per the `syslog()` manual [page] & defined in `<syslog.h>`; journald reads them from the
/// `PRIORITY` field.
///
/// [page]: https://man7.org/linux/man-pages/man3/syslog.3.html
#[allow(non_camel_case_types)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// system is unusable
    LOG_EMERG,
    /// action must be take immediately
    LOG_ALERT,
    /// critical conditions
    LOG_CRIT,
    /// error conditions
    LOG_ERR,
    /// warning conditions
    LOG_WARNING,
    /// normal, but significant condition
    LOG_NOTICE,
    /// informational message
    LOG_INFO,
    /// debug-level message
    LOG_DEBUG,
}

/// Priorities for `Level::DEBUG` through `Level::CRIT`, indexed by `level - Level::DEBUG`. Levels
/// below the table are LOG_DEBUG, levels above it LOG_ALERT.
const PRIORITY_TABLE: [Priority; 17] = [
    Priority::LOG_DEBUG, // DEBUG
    Priority::LOG_INFO,
    Priority::LOG_INFO,
    Priority::LOG_INFO,
    Priority::LOG_INFO,    // INFO
    Priority::LOG_NOTICE,  // INFO + 1
    Priority::LOG_NOTICE,  // NOTICE
    Priority::LOG_NOTICE,  // WARN - 1
    Priority::LOG_WARNING, // WARN
    Priority::LOG_ERR,
    Priority::LOG_ERR,
    Priority::LOG_ERR,
    Priority::LOG_ERR,  // ERROR
    Priority::LOG_CRIT, // ERROR + 1
    Priority::LOG_CRIT,
    Priority::LOG_CRIT,
    Priority::LOG_CRIT, // CRIT
];

/// The length of the message field's length slot
pub const LENGTH_SLOT: usize = 8;

impl Priority {
    pub fn from_level(level: Level) -> Priority {
        let i = level.0 as i64 - Level::DEBUG.0 as i64;
        if i < 0 {
            Priority::LOG_DEBUG
        } else if (i as usize) < PRIORITY_TABLE.len() {
            PRIORITY_TABLE[i as usize]
        } else {
            Priority::LOG_ALERT
        }
    }

    /// The fixed head of every entry at this priority: the `PRIORITY` field, followed by the
    /// `MESSAGE` field name & an all-zero slot for the message length.
    pub fn preamble(self) -> &'static [u8] {
        match self {
            Priority::LOG_EMERG => b"PRIORITY=0\nMESSAGE\n\0\0\0\0\0\0\0\0",
            Priority::LOG_ALERT => b"PRIORITY=1\nMESSAGE\n\0\0\0\0\0\0\0\0",
            Priority::LOG_CRIT => b"PRIORITY=2\nMESSAGE\n\0\0\0\0\0\0\0\0",
            Priority::LOG_ERR => b"PRIORITY=3\nMESSAGE\n\0\0\0\0\0\0\0\0",
            Priority::LOG_WARNING => b"PRIORITY=4\nMESSAGE\n\0\0\0\0\0\0\0\0",
            Priority::LOG_NOTICE => b"PRIORITY=5\nMESSAGE\n\0\0\0\0\0\0\0\0",
            Priority::LOG_INFO => b"PRIORITY=6\nMESSAGE\n\0\0\0\0\0\0\0\0",
            Priority::LOG_DEBUG => b"PRIORITY=7\nMESSAGE\n\0\0\0\0\0\0\0\0",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> StdResult<(), std::fmt::Error> {
        write!(
            f,
            "{}",
            match self {
                Priority::LOG_EMERG => "LOG_EMERG",
                Priority::LOG_ALERT => "LOG_ALERT",
                Priority::LOG_CRIT => "LOG_CRIT",
                Priority::LOG_ERR => "LOG_ERR",
                Priority::LOG_WARNING => "LOG_WARNING",
                Priority::LOG_NOTICE => "LOG_NOTICE",
                Priority::LOG_INFO => "LOG_INFO",
                Priority::LOG_DEBUG => "LOG_DEBUG",
            }
        )
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn named_tiers() {
        assert_eq!(Priority::from_level(Level::DEBUG), Priority::LOG_DEBUG);
        assert_eq!(Priority::from_level(Level::INFO), Priority::LOG_INFO);
        assert_eq!(Priority::from_level(Level::NOTICE), Priority::LOG_NOTICE);
        assert_eq!(Priority::from_level(Level::WARN), Priority::LOG_WARNING);
        assert_eq!(Priority::from_level(Level::ERROR), Priority::LOG_ERR);
        assert_eq!(Priority::from_level(Level::CRIT), Priority::LOG_CRIT);
        assert_eq!(Priority::from_level(Level::ALERT), Priority::LOG_ALERT);
    }

    #[test]
    fn offsets_and_clamping() {
        assert_eq!(Priority::from_level(Level::INFO - 3), Priority::LOG_INFO);
        assert_eq!(Priority::from_level(Level::INFO + 1), Priority::LOG_NOTICE);
        assert_eq!(Priority::from_level(Level::WARN - 1), Priority::LOG_NOTICE);
        assert_eq!(Priority::from_level(Level::WARN + 1), Priority::LOG_ERR);
        assert_eq!(Priority::from_level(Level::ERROR + 1), Priority::LOG_CRIT);
        assert_eq!(Priority::from_level(Level::CRIT + 1), Priority::LOG_ALERT);
        assert_eq!(Priority::from_level(Level(i32::MIN)), Priority::LOG_DEBUG);
        assert_eq!(Priority::from_level(Level(i32::MAX)), Priority::LOG_ALERT);
    }

    #[test]
    fn monotonic() {
        let mut last = Priority::LOG_DEBUG;
        for n in -40..40 {
            let p = Priority::from_level(Level(n));
            assert!(p <= last, "{} mapped to {} after {}", Level(n), p, last);
            last = p;
        }
    }

    #[test]
    fn preamble_matches_priority() {
        for (n, p) in [
            Priority::LOG_EMERG,
            Priority::LOG_ALERT,
            Priority::LOG_CRIT,
            Priority::LOG_ERR,
            Priority::LOG_WARNING,
            Priority::LOG_NOTICE,
            Priority::LOG_INFO,
            Priority::LOG_DEBUG,
        ]
        .iter()
        .enumerate()
        {
            let mut golden = format!("PRIORITY={}\nMESSAGE\n", n).into_bytes();
            golden.extend_from_slice(&[0; LENGTH_SLOT]);
            assert_eq!(p.preamble(), &golden[..]);
        }
    }

    #[test]
    fn level_display() {
        assert_eq!(format!("{}", Level::INFO), "INFO");
        assert_eq!(format!("{}", Level::INFO + 1), "INFO+1");
        assert_eq!(format!("{}", Level::DEBUG - 4), "DEBUG-4");
        assert_eq!(format!("{}", Level::ALERT + 8), "ALERT+8");
        assert_eq!(format!("{}", Priority::LOG_ERR), "LOG_ERR");
    }
}
