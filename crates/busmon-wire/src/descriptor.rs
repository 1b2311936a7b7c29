//! File descriptor descriptions.
//!
//! A descriptor received in a monitored message belongs to this process once
//! it has been extracted. It is inspected (inode, file type, socket
//! addresses) and closed before the description is returned.
//!
//! # Safety
//!
//! `getsockname`/`getpeername` write into a zeroed `sockaddr_storage`, which
//! is large enough for every address family. The storage is only
//! reinterpreted as a family-specific struct after checking `ss_family`.

use std::fmt::Write as _;
use std::fs::File;
use std::mem;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::fs::{FileTypeExt, MetadataExt};

/// Describes `fd` and closes it.
///
/// Always starts with `file descriptor`; every further detail is appended
/// only if it could be determined.
pub fn describe(fd: OwnedFd) -> String {
    let file = File::from(fd);
    let mut out = String::from("file descriptor");

    let Ok(meta) = file.metadata() else {
        return out;
    };

    let _ = write!(
        out,
        " inode: {}; type: {}",
        meta.ino(),
        file_type_name(&meta)
    );

    if meta.file_type().is_socket() {
        describe_socket(file.as_raw_fd(), &mut out);
    }

    out
}

fn file_type_name(meta: &std::fs::Metadata) -> &'static str {
    let ft = meta.file_type();
    if ft.is_file() {
        "file"
    } else if ft.is_dir() {
        "directory"
    } else if ft.is_char_device() {
        "char"
    } else if ft.is_block_device() {
        "block"
    } else if ft.is_fifo() {
        "fifo"
    } else if ft.is_symlink() {
        "link"
    } else if ft.is_socket() {
        "socket"
    } else {
        "unknown"
    }
}

// ============================================================================
// Sockets
// ============================================================================

#[derive(Clone, Copy)]
enum End {
    Local,
    Peer,
}

struct SockAddr {
    storage: libc::sockaddr_storage,
    len: usize,
}

impl SockAddr {
    fn query(fd: RawFd, end: End) -> Option<Self> {
        // SAFETY: sockaddr_storage is plain data; all-zero is a valid value.
        let mut storage: libc::sockaddr_storage = unsafe { mem::zeroed() };
        let mut len = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
        let ptr = &mut storage as *mut libc::sockaddr_storage as *mut libc::sockaddr;

        // SAFETY: ptr and len describe a writable buffer of the right size.
        let rc = unsafe {
            match end {
                End::Local => libc::getsockname(fd, ptr, &mut len),
                End::Peer => libc::getpeername(fd, ptr, &mut len),
            }
        };

        (rc == 0).then_some(Self {
            storage,
            len: len as usize,
        })
    }

    fn family(&self) -> libc::c_int {
        libc::c_int::from(self.storage.ss_family)
    }

    fn unix_name(&self) -> String {
        // SAFETY: family checked by the caller; sockaddr_un fits in storage.
        let un = unsafe { &*(&self.storage as *const _ as *const libc::sockaddr_un) };
        let path_len = self
            .len
            .saturating_sub(mem::size_of::<libc::sa_family_t>())
            .min(un.sun_path.len());
        let raw: Vec<u8> = un.sun_path[..path_len].iter().map(|&c| c as u8).collect();
        unix_path_text(&raw)
    }

    fn inet(&self) -> (Ipv4Addr, u16) {
        // SAFETY: family checked by the caller; sockaddr_in fits in storage.
        let sin = unsafe { &*(&self.storage as *const _ as *const libc::sockaddr_in) };
        (
            Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)),
            u16::from_be(sin.sin_port),
        )
    }

    fn inet6(&self) -> (Ipv6Addr, u16) {
        // SAFETY: family checked by the caller; sockaddr_in6 fits in storage.
        let sin6 = unsafe { &*(&self.storage as *const _ as *const libc::sockaddr_in6) };
        (
            Ipv6Addr::from(sin6.sin6_addr.s6_addr),
            u16::from_be(sin6.sin6_port),
        )
    }
}

/// Abstract socket names start with NUL and are shown with a leading `@`.
fn unix_path_text(raw: &[u8]) -> String {
    match raw.split_first() {
        None => String::new(),
        Some((0, rest)) => {
            let end = rest.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
            format!("@{}", String::from_utf8_lossy(&rest[..end]))
        }
        Some(_) => {
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            String::from_utf8_lossy(&raw[..end]).into_owned()
        }
    }
}

fn describe_socket(fd: RawFd, out: &mut String) {
    let Some(local) = SockAddr::query(fd, End::Local) else {
        return;
    };
    let peer = SockAddr::query(fd, End::Peer);

    match local.family() {
        libc::AF_UNIX => {
            let _ = write!(out, "; address family: unix name {}", local.unix_name());
            if let Some(peer) = peer.filter(|p| p.family() == libc::AF_UNIX) {
                let _ = write!(out, " peer {}", peer.unix_name());
            }
        }
        libc::AF_INET => {
            let (ip, port) = local.inet();
            let _ = write!(out, "; address family: inet name {ip} port {port}");
            if let Some(peer) = peer.filter(|p| p.family() == libc::AF_INET) {
                let (ip, port) = peer.inet();
                let _ = write!(out, " peer {ip} port {port}");
            }
        }
        libc::AF_INET6 => {
            let (ip, port) = local.inet6();
            let _ = write!(out, "; address family: inet6 name {ip} port {port}");
            if let Some(peer) = peer.filter(|p| p.family() == libc::AF_INET6) {
                let (ip, port) = peer.inet6();
                let _ = write!(out, " peer {ip} port {port}");
            }
        }
        #[cfg(target_os = "linux")]
        libc::AF_BLUETOOTH => out.push_str("; address family: bluetooth"),
        other => {
            let _ = write!(out, "; address family: unknown family ({other})");
        }
    }
}
