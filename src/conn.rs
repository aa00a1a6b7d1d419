// src/conn.rs
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::time::SystemTime;

use libc::{EPOLLIN, EPOLLOUT};

use crate::config::Config;
use crate::error::EtudeResult;
use crate::http::{self, Method, RequestStatus};
use crate::metrics::ServerMetrics;
use crate::reactor::ServerShared;
use crate::store::CredentialStore;
use crate::syscalls::{self, Epoll, MappedFile};

pub const READ_BUF_SIZE: usize = 2048;
pub const WRITE_BUF_SIZE: usize = 1024;

/// Which executor currently owns the slot. One-shot epoll registration is
/// what enforces exclusivity; this tag makes the invariant visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Free,
    Reading,
    Writing,
}

/// Position of the main state machine inside the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CheckState {
    RequestLine,
    Header,
    Content,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineStatus {
    Ok,
    Open,
    Bad,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PasswordStatus {
    Right,
    Wrong,
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RegisterStatus {
    Exists,
    EmptyPassword,
    Accepted,
}

/// Interior slice into `read_buf`, kept as offsets so slot reuse can never
/// leave a dangling reference into a previous request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Span {
    start: usize,
    len: usize,
}

impl Span {
    fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }
}

/// One connection slot: socket identity, read/parse/write cursors, and the
/// mapped file being served. Slots live in a fixed table indexed by fd and
/// are reused across requests and clients.
pub struct Conn {
    fd: i32,
    peer: SocketAddrV4,
    phase: Phase,

    read_buf: [u8; READ_BUF_SIZE],
    read_idx: usize,
    checked_idx: usize,
    start_line: usize,

    state: CheckState,
    method: Method,
    url: Span,
    url_override: Option<&'static str>,
    content_length: usize,
    keep_alive: bool,
    host: Option<Span>,
    login_name: Option<Span>,
    login_pswd: Option<Span>,
    rgt_name: Option<Span>,
    rgt_pswd: Option<Span>,

    write_buf: [u8; WRITE_BUF_SIZE],
    write_idx: usize,
    bytes_to_send: usize,
    bytes_have_send: usize,

    file: Option<MappedFile>,
}

impl Conn {
    pub fn empty() -> Self {
        Self {
            fd: -1,
            peer: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            phase: Phase::Free,
            read_buf: [0; READ_BUF_SIZE],
            read_idx: 0,
            checked_idx: 0,
            start_line: 0,
            state: CheckState::RequestLine,
            method: Method::Get,
            url: Span::default(),
            url_override: None,
            content_length: 0,
            keep_alive: false,
            host: None,
            login_name: None,
            login_pswd: None,
            rgt_name: None,
            rgt_pswd: None,
            write_buf: [0; WRITE_BUF_SIZE],
            write_idx: 0,
            bytes_to_send: 0,
            bytes_have_send: 0,
            file: None,
        }
    }

    pub fn fd(&self) -> i32 {
        self.fd
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn keep_alive(&self) -> bool {
        self.keep_alive
    }

    /// Claim the slot for a freshly accepted socket.
    pub fn open(&mut self, fd: i32, peer: SocketAddrV4) {
        self.fd = fd;
        self.peer = peer;
        self.phase = Phase::Reading;
        self.reset();
    }

    /// Forget the socket without touching it; used when registration fails
    /// and the raw fd is closed by the caller.
    pub fn release(&mut self) {
        self.fd = -1;
        self.phase = Phase::Free;
        self.file = None;
    }

    /// Tear down the socket and free the slot.
    pub fn close(&mut self, epoll: &Epoll, metrics: &ServerMetrics) {
        if self.fd != -1 {
            let _ = epoll.delete(self.fd);
            syscalls::close_fd(self.fd);
            self.fd = -1;
            self.phase = Phase::Free;
            self.file = None;
            metrics.dec_conn();
        }
    }

    /// Reset every per-request cursor and interior slice. Buffers are not
    /// zeroed; the cursors are the sole source of truth for what is valid.
    pub fn reset(&mut self) {
        self.read_idx = 0;
        self.checked_idx = 0;
        self.start_line = 0;
        self.state = CheckState::RequestLine;
        self.method = Method::Get;
        self.url = Span::default();
        self.url_override = None;
        self.content_length = 0;
        self.keep_alive = false;
        self.host = None;
        self.login_name = None;
        self.login_pswd = None;
        self.rgt_name = None;
        self.rgt_pswd = None;
        self.write_idx = 0;
        self.bytes_to_send = 0;
        self.bytes_have_send = 0;
        self.file = None;
    }

    // ---- Reading ----

    /// Drain everything currently readable into the tail of `read_buf`.
    /// Returns false when the peer closed, a hard error occurred, or the
    /// buffer was already full before any read could be attempted.
    pub fn read_input(&mut self) -> bool {
        if self.read_idx >= READ_BUF_SIZE {
            return false;
        }
        loop {
            match syscalls::recv_nonblocking(self.fd, &mut self.read_buf[self.read_idx..]) {
                Ok(0) => return false, // peer closed
                Ok(n) => {
                    self.read_idx += n;
                    if self.read_idx >= READ_BUF_SIZE {
                        // Full; parse what we have. A request that still
                        // is not complete fails on the next read.
                        return true;
                    }
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => return true,
                Err(e) => {
                    tracing::debug!(fd = self.fd, error = %e, "recv failed");
                    return false;
                }
            }
        }
    }

    // ---- Line scanning ----

    /// Scan forward from the parse cursor for a CRLF terminator.
    fn parse_line(&mut self) -> LineStatus {
        while self.checked_idx < self.read_idx {
            match self.read_buf[self.checked_idx] {
                b'\r' => {
                    if self.checked_idx + 1 == self.read_idx {
                        return LineStatus::Open;
                    }
                    if self.read_buf[self.checked_idx + 1] == b'\n' {
                        self.checked_idx += 2;
                        return LineStatus::Ok;
                    }
                    return LineStatus::Bad;
                }
                b'\n' => {
                    // A leading line feed is only valid when the previous
                    // drain ended exactly between CR and LF.
                    if self.checked_idx >= 1 && self.read_buf[self.checked_idx - 1] == b'\r' {
                        self.checked_idx += 1;
                        return LineStatus::Ok;
                    }
                    return LineStatus::Bad;
                }
                _ => self.checked_idx += 1,
            }
        }
        LineStatus::Open
    }

    /// The line `parse_line` just completed, excluding its terminator.
    fn take_line(&mut self) -> Span {
        let line = Span::new(self.start_line, self.checked_idx - 2 - self.start_line);
        self.start_line = self.checked_idx;
        line
    }

    fn span_bytes(&self, span: Span) -> &[u8] {
        &self.read_buf[span.start..span.start + span.len]
    }

    fn span_str(&self, span: Span) -> Option<&str> {
        std::str::from_utf8(self.span_bytes(span)).ok()
    }

    /// Collapse %XX escapes inside the span, in place. The span shrinks;
    /// bytes past the new end are garbage and never referenced again.
    fn decode_in_place(&mut self, span: Span) -> Span {
        let mut read = span.start;
        let mut write = span.start;
        let end = span.start + span.len;
        while read < end {
            let b = self.read_buf[read];
            if b == b'%' && read + 2 < end {
                if let (Some(hi), Some(lo)) = (
                    hex_val(self.read_buf[read + 1]),
                    hex_val(self.read_buf[read + 2]),
                ) {
                    self.read_buf[write] = hi * 16 + lo;
                    write += 1;
                    read += 3;
                    continue;
                }
            }
            self.read_buf[write] = b;
            write += 1;
            read += 1;
        }
        Span::new(span.start, write - span.start)
    }

    // ---- Request line ----

    fn parse_request_line(&mut self, line: Span) -> RequestStatus {
        let Some((method_span, rest)) = split_field(&self.read_buf, line) else {
            return RequestStatus::BadRequest;
        };
        let Some(method) = Method::from_bytes(self.span_bytes(method_span)) else {
            return RequestStatus::BadRequest;
        };
        self.method = method;

        let Some((mut url, version)) = split_field(&self.read_buf, rest) else {
            return RequestStatus::BadRequest;
        };
        if !self.span_bytes(version).eq_ignore_ascii_case(b"HTTP/1.1") {
            return RequestStatus::BadRequest;
        }

        // A query component is fed through the same field-cut as a POST
        // body, so login via GET query parameters works.
        if let Some(pos) = self.span_bytes(url).iter().position(|&b| b == b'?') {
            let query = Span::new(url.start + pos + 1, url.len - pos - 1);
            url = Span::new(url.start, pos);
            self.cut_fields(query);
        }

        // Absolute-form `http://host/path` collapses to the path.
        if url.len >= 7 && self.span_bytes(url)[..7].eq_ignore_ascii_case(b"http://") {
            let after = Span::new(url.start + 7, url.len - 7);
            match self.span_bytes(after).iter().position(|&b| b == b'/') {
                Some(slash) => url = Span::new(after.start + slash, after.len - slash),
                None => return RequestStatus::BadRequest,
            }
        }
        if url.len == 0 || self.read_buf[url.start] != b'/' {
            return RequestStatus::BadRequest;
        }

        self.url = self.decode_in_place(url);
        self.state = CheckState::Header;
        RequestStatus::NoRequest
    }

    // ---- Field cutting ----

    /// Split `&`-separated key=value pairs, capturing the login and
    /// registration fields by case-insensitive key prefix.
    fn cut_fields(&mut self, span: Span) {
        let mut cursor = span.start;
        let end = span.start + span.len;
        while cursor < end {
            let amp = self.read_buf[cursor..end]
                .iter()
                .position(|&b| b == b'&')
                .map(|p| cursor + p)
                .unwrap_or(end);
            self.capture_field(Span::new(cursor, amp - cursor));
            cursor = amp + 1;
        }
    }

    fn capture_field(&mut self, pair: Span) {
        const KEYS: [&[u8]; 4] = [b"username=", b"Password=", b"rgtname=", b"rgtpswd="];
        let mut matched = None;
        {
            let bytes = self.span_bytes(pair);
            for (which, key) in KEYS.iter().enumerate() {
                if bytes.len() >= key.len() && bytes[..key.len()].eq_ignore_ascii_case(key) {
                    matched = Some((key.len(), which));
                    break;
                }
            }
        }
        if let Some((key_len, which)) = matched {
            let value = self.decode_in_place(Span::new(pair.start + key_len, pair.len - key_len));
            match which {
                0 => self.login_name = Some(value),
                1 => self.login_pswd = Some(value),
                2 => self.rgt_name = Some(value),
                _ => self.rgt_pswd = Some(value),
            }
        }
    }

    // ---- Headers ----

    fn parse_headers(&mut self, line: Span) -> RequestStatus {
        if line.len == 0 {
            // Blank line: headers done. A declared body moves the machine to
            // content; otherwise the request is complete.
            if self.content_length != 0 {
                self.state = CheckState::Content;
                return RequestStatus::NoRequest;
            }
            return RequestStatus::GetRequest;
        }
        let bytes = self.span_bytes(line);
        if starts_with_ci(bytes, b"Connection:") {
            let value = self.header_value(line, 11);
            if self.span_bytes(value).eq_ignore_ascii_case(b"keep-alive") {
                self.keep_alive = true;
            }
        } else if starts_with_ci(bytes, b"Content-Length:") {
            let value = self.header_value(line, 15);
            self.content_length = self
                .span_str(value)
                .and_then(|s| s.parse().ok())
                .unwrap_or(0);
        } else if starts_with_ci(bytes, b"Host:") {
            let value = self.header_value(line, 5);
            self.host = Some(value);
        } else {
            tracing::trace!(fd = self.fd, "ignoring header");
        }
        RequestStatus::NoRequest
    }

    /// Header value span after the given prefix length, leading blanks
    /// skipped.
    fn header_value(&self, line: Span, prefix_len: usize) -> Span {
        let mut start = line.start + prefix_len;
        let end = line.start + line.len;
        while start < end && (self.read_buf[start] == b' ' || self.read_buf[start] == b'\t') {
            start += 1;
        }
        Span::new(start, end - start)
    }

    // ---- Credentials ----

    fn check_credentials(&self, store: &dyn CredentialStore) -> EtudeResult<PasswordStatus> {
        let name = match self.login_name.and_then(|s| self.span_str(s)) {
            Some(n) => n,
            None => return Ok(PasswordStatus::NotFound),
        };
        let supplied = match self.login_pswd.and_then(|s| self.span_str(s)) {
            Some(p) => p,
            None => return Ok(PasswordStatus::NotFound),
        };
        match store.find_password(name)? {
            None => Ok(PasswordStatus::NotFound),
            // Stored passwords are compared byte for byte; see DESIGN.md.
            Some(stored) => Ok(if stored.as_bytes() == supplied.as_bytes() {
                PasswordStatus::Right
            } else {
                PasswordStatus::Wrong
            }),
        }
    }

    fn try_register(&self, store: &dyn CredentialStore) -> EtudeResult<RegisterStatus> {
        let name = match self.rgt_name.and_then(|s| self.span_str(s)) {
            Some(n) => n,
            None => return Ok(RegisterStatus::EmptyPassword),
        };
        if store.find_password(name)?.is_some() {
            return Ok(RegisterStatus::Exists);
        }
        let password = self.rgt_pswd.and_then(|s| self.span_str(s)).unwrap_or("");
        if password.is_empty() {
            return Ok(RegisterStatus::EmptyPassword);
        }
        store.insert_user(name, password)?;
        Ok(RegisterStatus::Accepted)
    }

    fn login_outcome(&mut self, store: &dyn CredentialStore) -> Result<&'static str, RequestStatus> {
        match self.check_credentials(store) {
            Ok(PasswordStatus::Right) => Ok(http::DOC_WELCOME),
            Ok(PasswordStatus::Wrong) => Ok(http::DOC_PASSWORD_ERROR),
            Ok(PasswordStatus::NotFound) => Ok(http::DOC_UNKNOWN_USER),
            Err(e) => {
                tracing::error!(fd = self.fd, error = %e, "credential lookup failed");
                Err(RequestStatus::InternalError)
            }
        }
    }

    // ---- Main state machine ----

    /// Drive the request machine over the buffered bytes. Returns
    /// `NoRequest` when more input is needed; any other status is final for
    /// this request.
    pub fn process_read(&mut self, store: &dyn CredentialStore, config: &Config) -> RequestStatus {
        loop {
            if self.state == CheckState::Content {
                // Body completeness is byte-counted, not line-based.
                if self.read_idx < self.checked_idx + self.content_length {
                    return RequestStatus::NoRequest;
                }
                let body = Span::new(self.checked_idx, self.content_length);
                return self.finish_content(body, store, config);
            }
            match self.parse_line() {
                LineStatus::Open => return RequestStatus::NoRequest,
                LineStatus::Bad => return RequestStatus::BadRequest,
                LineStatus::Ok => {}
            }
            let line = self.take_line();
            match self.state {
                CheckState::RequestLine => {
                    if self.parse_request_line(line) == RequestStatus::BadRequest {
                        return RequestStatus::BadRequest;
                    }
                }
                CheckState::Header => match self.parse_headers(line) {
                    RequestStatus::BadRequest => return RequestStatus::BadRequest,
                    RequestStatus::GetRequest => {
                        // A login that arrived in the query string resolves
                        // here, before file resolution.
                        if self.login_name.is_some() {
                            match self.login_outcome(store) {
                                Ok(doc) => self.url_override = Some(doc),
                                Err(status) => return status,
                            }
                        }
                        return self.do_request(config);
                    }
                    _ => {}
                },
                CheckState::Content => return RequestStatus::InternalError,
            }
        }
    }

    fn finish_content(
        &mut self,
        body: Span,
        store: &dyn CredentialStore,
        config: &Config,
    ) -> RequestStatus {
        match self.method {
            // A GET body is only length-checked, never interpreted.
            Method::Get => self.do_request(config),
            Method::Post => {
                if body.len == 0 {
                    return self.do_request(config);
                }
                self.cut_fields(body);
                let doc = if self.login_name.is_some() {
                    match self.login_outcome(store) {
                        Ok(doc) => doc,
                        Err(status) => return status,
                    }
                } else if self.rgt_name.is_some() {
                    match self.try_register(store) {
                        Ok(RegisterStatus::Exists) => http::DOC_USER_EXISTS,
                        Ok(RegisterStatus::EmptyPassword) => http::DOC_EMPTY_PASSWORD,
                        Ok(RegisterStatus::Accepted) => http::DOC_REGISTER_OK,
                        Err(e) => {
                            tracing::error!(fd = self.fd, error = %e, "registration failed");
                            return RequestStatus::InternalError;
                        }
                    }
                } else {
                    return self.do_request(config);
                };
                self.url_override = Some(doc);
                self.do_request(config)
            }
        }
    }

    // ---- File resolution ----

    fn resolve_target(&self, config: &Config) -> Result<PathBuf, RequestStatus> {
        let url: &str = match self.url_override {
            Some(doc) => doc,
            None => self
                .span_str(self.url)
                .ok_or(RequestStatus::BadRequest)?,
        };
        // Containment: a decoded path may not climb out of the root.
        if url.split('/').any(|seg| seg == "..") {
            return Err(RequestStatus::Forbidden);
        }
        Ok(config.doc_root.join(url.trim_start_matches('/')))
    }

    /// Resolve the requested document under the root and map it. Ownership
    /// of the mapping stays with the connection until the response is fully
    /// written or the connection dies.
    fn do_request(&mut self, config: &Config) -> RequestStatus {
        let path = match self.resolve_target(config) {
            Ok(p) => p,
            Err(status) => return status,
        };
        let meta = match fs::metadata(&path) {
            Ok(m) => m,
            Err(_) => return RequestStatus::NoResource,
        };
        // World-readable, as in S_IROTH.
        if meta.permissions().mode() & 0o004 == 0 {
            return RequestStatus::Forbidden;
        }
        if meta.is_dir() {
            return RequestStatus::BadRequest;
        }
        let file = match fs::File::open(&path) {
            Ok(f) => f,
            Err(_) => return RequestStatus::NoResource,
        };
        match MappedFile::map(&file, meta.len() as usize) {
            Ok(mapped) => {
                self.file = Some(mapped);
                RequestStatus::FileRequest
            }
            Err(e) => {
                tracing::error!(path = %path.display(), error = %e, "mmap failed");
                RequestStatus::InternalError
            }
        }
    }

    // ---- Response assembly ----

    fn add_response(&mut self, args: fmt::Arguments<'_>) -> bool {
        if self.write_idx >= WRITE_BUF_SIZE {
            return false;
        }
        let mut cursor = io::Cursor::new(&mut self.write_buf[self.write_idx..]);
        if cursor.write_fmt(args).is_err() {
            return false;
        }
        self.write_idx += cursor.position() as usize;
        true
    }

    fn add_status_line(&mut self, status: u16, title: &str) -> bool {
        self.add_response(format_args!("HTTP/1.1 {} {}\r\n", status, title))
    }

    fn add_headers(&mut self, content_len: usize) -> bool {
        self.add_response(format_args!("Content-Length: {}\r\n", content_len))
            && self.add_response(format_args!("Content-Type: text/html\r\n"))
            && self.add_response(format_args!(
                "Date: {}\r\n",
                httpdate::fmt_http_date(SystemTime::now())
            ))
            && self.add_response(format_args!(
                "Connection: {}\r\n",
                if self.keep_alive { "keep-alive" } else { "close" }
            ))
            && self.add_response(format_args!("\r\n"))
    }

    fn add_content(&mut self, content: &str) -> bool {
        self.add_response(format_args!("{}", content))
    }

    fn error_page(&mut self, status: u16, title: &str, body: &str) -> bool {
        if !(self.add_status_line(status, title)
            && self.add_headers(body.len())
            && self.add_content(body))
        {
            return false;
        }
        self.bytes_to_send = self.write_idx;
        true
    }

    /// Build the response for the given parse outcome into the write buffer.
    /// The success case pairs the header buffer with the mapped file; error
    /// cases are a single buffered segment.
    pub fn process_write(&mut self, status: RequestStatus) -> bool {
        match status {
            RequestStatus::InternalError => {
                self.error_page(500, http::ERROR_500_TITLE, http::ERROR_500_FORM)
            }
            RequestStatus::BadRequest => {
                self.error_page(400, http::ERROR_400_TITLE, http::ERROR_400_FORM)
            }
            RequestStatus::NoResource => {
                self.error_page(404, http::ERROR_404_TITLE, http::ERROR_404_FORM)
            }
            RequestStatus::Forbidden => {
                self.error_page(403, http::ERROR_403_TITLE, http::ERROR_403_FORM)
            }
            RequestStatus::FileRequest => {
                let file_len = self.file.as_ref().map(|f| f.len()).unwrap_or(0);
                if !(self.add_status_line(200, http::OK_200_TITLE) && self.add_headers(file_len)) {
                    return false;
                }
                self.bytes_to_send = self.write_idx + file_len;
                true
            }
            _ => false,
        }
    }

    // ---- Writing ----

    /// Drive the scatter write of the prepared segments. Returns false when
    /// the connection must be closed.
    pub fn write_step(&mut self, epoll: &Epoll, metrics: &ServerMetrics) -> bool {
        if self.bytes_to_send == 0 {
            // Nothing pending; treat as a completed response.
            let _ = epoll.rearm(self.fd, EPOLLIN);
            self.phase = Phase::Reading;
            self.reset();
            return true;
        }
        loop {
            let sent;
            {
                let mut segs: [&[u8]; 2] = [&[], &[]];
                let mut n_segs = 0;
                if self.bytes_have_send < self.write_idx {
                    segs[n_segs] = &self.write_buf[self.bytes_have_send..self.write_idx];
                    n_segs += 1;
                }
                if let Some(file) = &self.file {
                    let off = self.bytes_have_send.saturating_sub(self.write_idx);
                    let data = &file.as_slice()[off..];
                    if !data.is_empty() {
                        segs[n_segs] = data;
                        n_segs += 1;
                    }
                }
                match syscalls::writev_nonblocking(self.fd, &segs[..n_segs]) {
                    Ok(n) => sent = n,
                    Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                        // Kernel buffer full: wait for the next write-ready
                        // event and resume from the same cursors.
                        let _ = epoll.rearm(self.fd, EPOLLOUT);
                        return true;
                    }
                    Err(e) => {
                        tracing::debug!(fd = self.fd, error = %e, "writev failed");
                        self.file = None;
                        return false;
                    }
                }
            }
            if sent == 0 {
                let _ = epoll.rearm(self.fd, EPOLLOUT);
                return true;
            }
            metrics.add_bytes(sent);
            self.bytes_have_send += sent;
            self.bytes_to_send -= sent;
            if self.bytes_to_send == 0 {
                self.file = None; // unmap exactly once, before reuse
                let _ = epoll.rearm(self.fd, EPOLLIN);
                if self.keep_alive {
                    self.phase = Phase::Reading;
                    self.reset();
                    return true;
                }
                return false;
            }
        }
    }

    // ---- Pool entry point ----

    /// Run the parse-and-assemble pipeline on a worker thread. An incomplete
    /// request just re-arms for more reads; the connection state survives
    /// until the next readiness event resumes it.
    pub fn process(&mut self, shared: &ServerShared) {
        let status = self.process_read(shared.store.as_ref(), &shared.config);
        if status == RequestStatus::NoRequest {
            let _ = shared.epoll.rearm(self.fd, EPOLLIN);
            return;
        }
        tracing::debug!(fd = self.fd, peer = %self.peer, ?status, "request parsed");
        shared.metrics.inc_req();
        if !self.process_write(status) {
            self.close(&shared.epoll, &shared.metrics);
            return;
        }
        self.phase = Phase::Writing;
        let _ = shared.epoll.rearm(self.fd, EPOLLOUT);
    }
}

/// Split at the first space or tab inside the span.
fn split_field(buf: &[u8; READ_BUF_SIZE], span: Span) -> Option<(Span, Span)> {
    let bytes = &buf[span.start..span.start + span.len];
    let pos = bytes.iter().position(|&b| b == b' ' || b == b'\t')?;
    Some((
        Span::new(span.start, pos),
        Span::new(span.start + pos + 1, span.len - pos - 1),
    ))
}

fn starts_with_ci(bytes: &[u8], prefix: &[u8]) -> bool {
    bytes.len() >= prefix.len() && bytes[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
