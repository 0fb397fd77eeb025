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

//! The journal transport layer.
//!
//! This module defines the [`Transport`] trait that all implementations must support, as well
//! as [`JournalSocket`], which speaks to journald over its native-protocol datagram socket.
//!
//! # Examples
//!
//! Opening the socket never fails merely because journald isn't there; the datagram socket we send
//! from is unbound & unconnected, and the destination is only consulted per send:
//!
//! ```rust
//! use journal_native::transport::JournalSocket;
//! let transpo = JournalSocket::new("/i/am/not/there.s");
//! assert!(transpo.is_ok());
//! ```
//!
//! # Large entries
//!
//! A Unix datagram can be no larger than the socket's send buffer. When the kernel refuses an
//! entry with `EMSGSIZE` (or `ENOBUFS`), [`JournalSocket`] writes the entry to an
//! [anonymous file](crate::anon_file) and sends journald an empty datagram carrying that file's
//! descriptor as `SCM_RIGHTS` ancillary data. The kernel duplicates the descriptor into the
//! receiving process, so ours is closed as soon as the send returns, whatever its outcome.

use crate::error::{Error, Result};

use backtrace::Backtrace;

#[cfg(unix)]
use std::{
    io::Write,
    os::unix::{ffi::OsStrExt, io::AsRawFd, net::UnixDatagram},
    path::{Path, PathBuf},
};

/// journald's native-protocol socket
pub const DEFAULT_SOCKET: &str = "/run/systemd/journal/socket";

/// Target of this module's own diagnostics
pub(crate) const TARGET: &str = module_path!();

////////////////////////////////////////////////////////////////////////////////////////////////////
//                                      transport mechanisms                                      //
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Operations all transport layers must support.
///
/// Implementations must tolerate concurrent calls to [`Transport::send`]; a [`Handler`] & every
/// [`Handler`] derived from it share one transport.
///
/// [`Handler`]: crate::handler::Handler
pub trait Transport: Send + Sync {
    /// Deliver one complete journal entry, or fail having delivered none of it.
    fn send(&self, entry: &[u8]) -> Result<()>;
}

/// Sending journal entries via Unix datagrams
#[cfg(unix)]
pub struct JournalSocket {
    socket: UnixDatagram,
    addr: PathBuf,
    large_entries: bool,
}

#[cfg(unix)]
impl JournalSocket {
    /// Construct a [`Transport`] implementation that will send to the socket at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<JournalSocket> {
        let socket = UnixDatagram::unbound().map_err(|err| Error::Socket {
            source: err,
            back: Backtrace::new(),
        })?;
        Ok(JournalSocket {
            socket,
            addr: path.as_ref().to_path_buf(),
            large_entries: crate::anon_file::LARGE_ENTRY_SUPPORT,
        })
    }
    /// Construct a [`Transport`] implementation that will send to journald at its usual address.
    pub fn try_default() -> Result<JournalSocket> {
        JournalSocket::new(DEFAULT_SOCKET)
    }
    /// Enable or disable passing oversized entries by file descriptor. When disabled, an entry
    /// too large for a datagram fails with the kernel's error, unchanged.
    pub fn with_large_entries(mut self, enabled: bool) -> JournalSocket {
        self.large_entries = enabled && crate::anon_file::LARGE_ENTRY_SUPPORT;
        self
    }
    /// The destination address
    pub fn path(&self) -> &Path {
        &self.addr
    }

    fn send_via_file(&self, entry: &[u8]) -> Result<()> {
        let fallback_err = |err: std::io::Error| Error::Fallback {
            source: err,
            back: Backtrace::new(),
        };
        // `file` is closed when it goes out of scope, whether or not the send succeeded.
        let mut file = crate::anon_file::create().map_err(fallback_err)?;
        file.write_all(entry).map_err(fallback_err)?;
        send_fd(&self.socket, &self.addr, file.as_raw_fd()).map_err(fallback_err)
    }
}

/// True for the errors the kernel returns when a datagram exceeds what the socket will take.
#[cfg(unix)]
fn is_too_large(err: &std::io::Error) -> bool {
    matches!(err.raw_os_error(), Some(libc::EMSGSIZE) | Some(libc::ENOBUFS))
}

#[cfg(unix)]
impl Transport for JournalSocket {
    fn send(&self, entry: &[u8]) -> Result<()> {
        match self.socket.send_to(entry, &self.addr) {
            Ok(_) => Ok(()),
            Err(err) if self.large_entries && is_too_large(&err) => {
                tracing::debug!(
                    len = entry.len(),
                    "entry too large for one datagram ({}); passing it by file descriptor",
                    err
                );
                self.send_via_file(entry)
            }
            Err(err) => Err(Error::Send {
                source: err,
                back: Backtrace::new(),
            }),
        }
    }
}

/// Send an empty datagram to `addr` carrying `fd` as `SCM_RIGHTS` ancillary data.
///
/// `std` can't yet attach ancillary data to a datagram on stable, so this goes through
/// [sendmsg(2)] directly.
///
/// [sendmsg(2)]: https://man7.org/linux/man-pages/man2/sendmsg.2.html
#[cfg(unix)]
fn send_fd(socket: &UnixDatagram, addr: &Path, fd: std::os::unix::io::RawFd) -> std::io::Result<()> {
    use std::{mem, ptr};

    let (mut sun, sun_len) = sockaddr_un(addr)?;

    let fd_len = mem::size_of::<std::os::unix::io::RawFd>() as libc::c_uint;
    let space = unsafe { libc::CMSG_SPACE(fd_len) } as usize;
    // `u64`s so that the control buffer is suitably aligned for a `cmsghdr`
    let mut control = vec![0u64; (space + mem::size_of::<u64>() - 1) / mem::size_of::<u64>()];

    let mut msg: libc::msghdr = unsafe { mem::zeroed() };
    msg.msg_name = &mut sun as *mut libc::sockaddr_un as *mut libc::c_void;
    msg.msg_namelen = sun_len;
    msg.msg_iov = ptr::null_mut();
    msg.msg_iovlen = 0;
    msg.msg_control = control.as_mut_ptr() as *mut libc::c_void;
    msg.msg_controllen = space as _;

    // Safety: `control` holds at least CMSG_SPACE(sizeof(int)) bytes, so CMSG_FIRSTHDR is non-null
    // & the header plus one descriptor fit.
    unsafe {
        let cmsg = libc::CMSG_FIRSTHDR(&msg);
        (*cmsg).cmsg_level = libc::SOL_SOCKET;
        (*cmsg).cmsg_type = libc::SCM_RIGHTS;
        (*cmsg).cmsg_len = libc::CMSG_LEN(fd_len) as _;
        ptr::copy_nonoverlapping(
            &fd as *const std::os::unix::io::RawFd as *const u8,
            libc::CMSG_DATA(cmsg),
            fd_len as usize,
        );
    }

    if unsafe { libc::sendmsg(socket.as_raw_fd(), &msg, 0) } < 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Build a `sockaddr_un` for `path`, along with its length.
#[cfg(unix)]
fn sockaddr_un(path: &Path) -> std::io::Result<(libc::sockaddr_un, libc::socklen_t)> {
    let mut sun: libc::sockaddr_un = unsafe { std::mem::zeroed() };
    sun.sun_family = libc::AF_UNIX as libc::sa_family_t;

    let bytes = path.as_os_str().as_bytes();
    // Leave room for the trailing NUL
    if bytes.len() >= sun.sun_path.len() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "socket path too long",
        ));
    }
    for (dst, src) in sun.sun_path.iter_mut().zip(bytes) {
        *dst = *src as libc::c_char;
    }

    let offset = sun.sun_path.as_ptr() as usize - &sun as *const libc::sockaddr_un as usize;
    Ok((sun, (offset + bytes.len() + 1) as libc::socklen_t))
}

#[cfg(all(test, unix))]
pub(crate) mod test {
    use super::*;

    use std::os::unix::io::{FromRawFd, OwnedFd, RawFd};

    /// Receive one datagram, along with any descriptor passed with it.
    pub(crate) fn recv_with_fd(sock: &UnixDatagram) -> (Vec<u8>, Option<OwnedFd>) {
        use std::{mem, ptr};

        let mut data = vec![0u8; 1 << 16];
        let mut iov = libc::iovec {
            iov_base: data.as_mut_ptr() as *mut libc::c_void,
            iov_len: data.len(),
        };
        let mut control = [0u64; 16];
        let mut msg: libc::msghdr = unsafe { mem::zeroed() };
        msg.msg_iov = &mut iov;
        msg.msg_iovlen = 1;
        msg.msg_control = control.as_mut_ptr() as *mut libc::c_void;
        msg.msg_controllen = mem::size_of_val(&control) as _;

        let n = unsafe { libc::recvmsg(sock.as_raw_fd(), &mut msg, 0) };
        assert!(n >= 0, "recvmsg: {}", std::io::Error::last_os_error());
        data.truncate(n as usize);

        let mut fd = None;
        unsafe {
            let mut cmsg = libc::CMSG_FIRSTHDR(&msg);
            while !cmsg.is_null() {
                if (*cmsg).cmsg_level == libc::SOL_SOCKET && (*cmsg).cmsg_type == libc::SCM_RIGHTS {
                    let mut raw: RawFd = -1;
                    ptr::copy_nonoverlapping(
                        libc::CMSG_DATA(cmsg),
                        &mut raw as *mut RawFd as *mut u8,
                        mem::size_of::<RawFd>(),
                    );
                    fd = Some(OwnedFd::from_raw_fd(raw));
                }
                cmsg = libc::CMSG_NXTHDR(&msg, cmsg);
            }
        }
        (data, fd)
    }

    static ENTRY_FILES: std::sync::Mutex<()> = std::sync::Mutex::new(());

    /// Held by every test that creates entry files, so that [`open_entry_files`] sees only its
    /// caller's.
    pub(crate) fn entry_files_lock() -> std::sync::MutexGuard<'static, ()> {
        ENTRY_FILES.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The number of anonymous entry files this process currently has open.
    #[cfg(target_os = "linux")]
    pub(crate) fn open_entry_files() -> usize {
        std::fs::read_dir("/proc/self/fd")
            .unwrap()
            .filter_map(|entry| std::fs::read_link(entry.ok()?.path()).ok())
            .filter(|target| target.to_string_lossy().contains("memfd:journal-entry"))
            .count()
    }

    /// Bind a receiving socket in a fresh temporary directory.
    pub(crate) fn listener() -> (tempfile::TempDir, PathBuf, UnixDatagram) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("socket");
        let sock = UnixDatagram::bind(&path).unwrap();
        (dir, path, sock)
    }

    /// Read the whole of a passed file, from the start.
    pub(crate) fn read_passed_file(fd: OwnedFd) -> Vec<u8> {
        use std::io::{Read, Seek, SeekFrom};
        let mut file = std::fs::File::from(fd);
        file.seek(SeekFrom::Start(0)).unwrap();
        let mut contents = Vec::new();
        file.read_to_end(&mut contents).unwrap();
        contents
    }

    #[test]
    fn small_entry_is_one_datagram() {
        let (_dir, path, sock) = listener();
        let transpo = JournalSocket::new(&path).unwrap();
        let entry = b"PRIORITY=6\nMESSAGE\n\x02\0\0\0\0\0\0\0hi\n";
        transpo.send(entry).unwrap();
        let (data, fd) = recv_with_fd(&sock);
        assert_eq!(data, entry);
        assert!(fd.is_none());
    }

    #[test]
    fn large_entry_is_passed_by_descriptor() {
        let _lock = entry_files_lock();
        let (_dir, path, sock) = listener();
        let transpo = JournalSocket::new(&path).unwrap();
        let mut entry = b"PRIORITY=6\nMESSAGE\n".to_vec();
        let payload = vec![b'x'; 4 << 20];
        entry.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        entry.extend_from_slice(&payload);
        entry.push(b'\n');

        transpo.send(&entry).unwrap();

        let (data, fd) = recv_with_fd(&sock);
        assert!(data.is_empty());
        let contents = read_passed_file(fd.expect("no descriptor was passed"));
        assert_eq!(contents.len(), entry.len());
        assert!(contents == entry);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn failed_fallback_closes_its_file() {
        let _lock = entry_files_lock();
        let dir = tempfile::tempdir().unwrap();
        let transpo = JournalSocket::new(dir.path().join("nobody-home")).unwrap();
        let entry = vec![b'x'; 4 << 20];

        let before = open_entry_files();
        let err = transpo.send(&entry).unwrap_err();
        assert!(matches!(err, Error::Fallback { .. }), "{}", err);
        assert_eq!(
            err.io_error().unwrap().kind(),
            std::io::ErrorKind::NotFound
        );
        assert_eq!(open_entry_files(), before);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn successful_fallback_closes_its_file() {
        let _lock = entry_files_lock();
        let (_dir, path, sock) = listener();
        let transpo = JournalSocket::new(&path).unwrap();
        let entry = vec![b'x'; 4 << 20];

        let before = open_entry_files();
        transpo.send(&entry).unwrap();
        // Only the receiver's duplicate remains in flight, queued on `sock`.
        let (_, fd) = recv_with_fd(&sock);
        assert_eq!(open_entry_files(), before + 1);
        drop(fd);
        assert_eq!(open_entry_files(), before);
    }

    #[test]
    fn large_entry_without_fallback() {
        let (_dir, path, _sock) = listener();
        let transpo = JournalSocket::new(&path)
            .unwrap()
            .with_large_entries(false);
        let entry = vec![b'x'; 4 << 20];
        let err = transpo.send(&entry).unwrap_err();
        assert!(matches!(err, Error::Send { .. }));
        assert!(is_too_large(err.io_error().unwrap()));
    }

    #[test]
    fn absent_receiver() {
        let dir = tempfile::tempdir().unwrap();
        let transpo = JournalSocket::new(dir.path().join("nobody-home")).unwrap();
        let err = transpo.send(b"PRIORITY=6\n").unwrap_err();
        assert!(matches!(err, Error::Send { .. }));
        assert_eq!(
            err.io_error().unwrap().kind(),
            std::io::ErrorKind::NotFound
        );
    }

    #[test]
    fn path_too_long() {
        let long = "x".repeat(4096);
        assert!(sockaddr_un(Path::new(&long)).is_err());
    }
}
