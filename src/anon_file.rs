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

//! Files without names.
//!
//! An entry too large for one datagram is written to a file whose descriptor is then passed to
//! journald. That file must not be reachable through the filesystem: on Linux it lives in memory
//! courtesy of [memfd_create(2)]; on other Unices it is a temporary file that is unlinked as soon
//! as it has been created, so that only the open descriptor keeps it alive.
//!
//! [memfd_create(2)]: https://man7.org/linux/man-pages/man2/memfd_create.2.html

use std::{fs::File, io};

/// True on platforms that can pass file descriptors over Unix sockets, & so can deliver entries
/// too large for a single datagram.
pub const LARGE_ENTRY_SUPPORT: bool = cfg!(unix);

/// Create an anonymous, writable file.
#[cfg(target_os = "linux")]
pub fn create() -> io::Result<File> {
    use std::os::unix::io::FromRawFd;

    const NAME: &[u8] = b"journal-entry\0";
    let fd = unsafe { libc::memfd_create(NAME.as_ptr() as *const libc::c_char, libc::MFD_CLOEXEC) };
    if fd < 0 {
        return Err(io::Error::last_os_error());
    }
    // Safety: `fd` was just handed to us by the kernel, and we own it exclusively.
    Ok(unsafe { File::from_raw_fd(fd) })
}

/// Create an anonymous, writable file.
#[cfg(all(unix, not(target_os = "linux")))]
pub fn create() -> io::Result<File> {
    create_unlinked()
}

/// Create a temporary file & remove its directory entry straight away.
#[cfg(any(test, all(unix, not(target_os = "linux"))))]
pub fn create_unlinked() -> io::Result<File> {
    // `tempfile()` creates the file in `std::env::temp_dir()` & unlinks it before returning.
    tempfile::tempfile()
}
