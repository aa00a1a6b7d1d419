// src/syscalls.rs
use std::fs::File;
use std::io;
use std::mem;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::unix::io::AsRawFd;
use std::ptr;

use libc::{c_int, c_void, socklen_t};

use crate::error::EtudeResult;

// ---- Socket Operations ----

/// Create the non-blocking listening socket: SO_REUSEADDR, bind, listen.
pub fn create_listen_socket(addr: SocketAddrV4, backlog: c_int) -> EtudeResult<c_int> {
    unsafe {
        let fd = libc::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_NONBLOCK, 0);
        if fd < 0 {
            return Err(io::Error::last_os_error().into());
        }

        let one: c_int = 1;
        if libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_REUSEADDR,
            &one as *const _ as *const c_void,
            mem::size_of_val(&one) as socklen_t,
        ) < 0
        {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err.into());
        }

        let sin = libc::sockaddr_in {
            sin_family: libc::AF_INET as libc::sa_family_t,
            sin_port: addr.port().to_be(),
            sin_addr: libc::in_addr {
                s_addr: u32::from_ne_bytes(addr.ip().octets()),
            },
            sin_zero: [0; 8],
        };
        if libc::bind(
            fd,
            &sin as *const _ as *const libc::sockaddr,
            mem::size_of_val(&sin) as socklen_t,
        ) < 0
        {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err.into());
        }

        if libc::listen(fd, backlog) < 0 {
            let err = io::Error::last_os_error();
            libc::close(fd);
            return Err(err.into());
        }

        Ok(fd)
    }
}

/// Port the socket actually bound; differs from the requested port when the
/// caller asked for 0.
pub fn local_port(fd: c_int) -> EtudeResult<u16> {
    unsafe {
        let mut sin: libc::sockaddr_in = mem::zeroed();
        let mut len = mem::size_of::<libc::sockaddr_in>() as socklen_t;
        if libc::getsockname(fd, &mut sin as *mut _ as *mut libc::sockaddr, &mut len) < 0 {
            return Err(io::Error::last_os_error().into());
        }
        Ok(u16::from_be(sin.sin_port))
    }
}

/// Accept one pending connection, non-blocking. `Ok(None)` means the backlog
/// is drained.
pub fn accept_connection(listen_fd: c_int) -> EtudeResult<Option<(c_int, SocketAddrV4)>> {
    unsafe {
        let mut sin: libc::sockaddr_in = mem::zeroed();
        let mut len = mem::size_of::<libc::sockaddr_in>() as socklen_t;
        let fd = libc::accept4(
            listen_fd,
            &mut sin as *mut _ as *mut libc::sockaddr,
            &mut len,
            libc::SOCK_NONBLOCK,
        );
        if fd < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::WouldBlock {
                Ok(None)
            } else {
                Err(err.into())
            }
        } else {
            let peer = SocketAddrV4::new(
                Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes()),
                u16::from_be(sin.sin_port),
            );
            Ok(Some((fd, peer)))
        }
    }
}

pub fn close_fd(fd: c_int) {
    unsafe {
        libc::close(fd);
    }
}

/// The second write to a peer-closed socket raises SIGPIPE, which kills the
/// process by default; the write error is reported through `writev` instead.
pub fn ignore_sigpipe() {
    unsafe {
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
    }
}

// ---- Non-blocking I/O ----

/// Single `recv` into `buf`. `Ok(0)` is end-of-stream; would-block surfaces
/// as an error of kind `WouldBlock` for the caller to end its drain loop on.
pub fn recv_nonblocking(fd: c_int, buf: &mut [u8]) -> io::Result<usize> {
    let res = unsafe { libc::recv(fd, buf.as_mut_ptr() as *mut c_void, buf.len(), 0) };
    if res < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(res as usize)
    }
}

/// Vectored write of up to two segments in a single syscall.
pub fn writev_nonblocking(fd: c_int, bufs: &[&[u8]]) -> io::Result<usize> {
    let mut iovecs: [libc::iovec; 2] = unsafe { mem::zeroed() };
    let count = bufs.len().min(2);
    for i in 0..count {
        iovecs[i] = libc::iovec {
            iov_base: bufs[i].as_ptr() as *mut c_void,
            iov_len: bufs[i].len(),
        };
    }
    let res = unsafe { libc::writev(fd, iovecs.as_ptr(), count as c_int) };
    if res < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(res as usize)
    }
}

// ---- Epoll Operations ----

pub struct Epoll {
    fd: c_int,
}

impl Epoll {
    pub fn new() -> EtudeResult<Self> {
        unsafe {
            let fd = libc::epoll_create1(0);
            if fd < 0 {
                return Err(io::Error::last_os_error().into());
            }
            Ok(Self { fd })
        }
    }

    /// Register a descriptor edge-triggered, watching for readability and
    /// peer hangup. `one_shot` additionally requires an explicit `rearm`
    /// before the next event fires; that exclusivity is what keeps a
    /// connection owned by at most one executor at a time.
    pub fn add(&self, fd: c_int, interests: i32, one_shot: bool) -> EtudeResult<()> {
        let mut flags = interests | libc::EPOLLET | libc::EPOLLRDHUP;
        if one_shot {
            flags |= libc::EPOLLONESHOT;
        }
        let mut event = libc::epoll_event {
            events: flags as u32,
            u64: fd as u64,
        };
        unsafe {
            if libc::epoll_ctl(self.fd, libc::EPOLL_CTL_ADD, fd, &mut event) < 0 {
                return Err(io::Error::last_os_error().into());
            }
        }
        Ok(())
    }

    /// Re-arm a one-shot descriptor for its next readiness event.
    pub fn rearm(&self, fd: c_int, interests: i32) -> EtudeResult<()> {
        let mut event = libc::epoll_event {
            events: (interests | libc::EPOLLET | libc::EPOLLONESHOT | libc::EPOLLRDHUP) as u32,
            u64: fd as u64,
        };
        unsafe {
            if libc::epoll_ctl(self.fd, libc::EPOLL_CTL_MOD, fd, &mut event) < 0 {
                return Err(io::Error::last_os_error().into());
            }
        }
        Ok(())
    }

    pub fn delete(&self, fd: c_int) -> EtudeResult<()> {
        unsafe {
            if libc::epoll_ctl(self.fd, libc::EPOLL_CTL_DEL, fd, ptr::null_mut()) < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() != Some(libc::ENOENT) {
                    return Err(err.into());
                }
            }
        }
        Ok(())
    }

    /// Wait for readiness events. A wait interrupted by a signal is reported
    /// as zero events, not an error.
    pub fn wait(&self, events: &mut [libc::epoll_event], timeout_ms: i32) -> EtudeResult<usize> {
        unsafe {
            let res = libc::epoll_wait(
                self.fd,
                events.as_mut_ptr(),
                events.len() as c_int,
                timeout_ms,
            );
            if res < 0 {
                let err = io::Error::last_os_error();
                if err.raw_os_error() == Some(libc::EINTR) {
                    return Ok(0);
                }
                return Err(err.into());
            }
            Ok(res as usize)
        }
    }
}

impl Drop for Epoll {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.fd);
        }
    }
}

// ---- File Mapping ----

/// Read-only private mapping of a whole file. The mapping is released exactly
/// once, when the value is dropped.
pub struct MappedFile {
    ptr: *mut c_void,
    len: usize,
}

// The mapping is immutable after creation and page-backed; nothing about it
// is tied to the creating thread.
unsafe impl Send for MappedFile {}

impl MappedFile {
    pub fn map(file: &File, len: usize) -> io::Result<Self> {
        // mmap rejects zero-length requests; model an empty file as an empty
        // mapping so callers need no special case.
        if len == 0 {
            return Ok(Self {
                ptr: ptr::null_mut(),
                len: 0,
            });
        }
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ,
                libc::MAP_PRIVATE,
                file.as_raw_fd(),
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            Err(io::Error::last_os_error())
        } else {
            Ok(Self { ptr, len })
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        if self.len == 0 {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.ptr as *const u8, self.len) }
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Drop for MappedFile {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                libc::munmap(self.ptr, self.len);
            }
        }
    }
}
