// src/http.rs

/// Request methods the server accepts. Anything else is a protocol error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    pub fn from_bytes(b: &[u8]) -> Option<Self> {
        if b.eq_ignore_ascii_case(b"GET") {
            Some(Method::Get)
        } else if b.eq_ignore_ascii_case(b"POST") {
            Some(Method::Post)
        } else {
            None
        }
    }
}

/// Outcome of driving the read-side state machine over the bytes currently
/// buffered for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// More input is required before the request is complete.
    NoRequest,
    /// Request fully parsed; file resolution may proceed.
    GetRequest,
    /// A world-readable regular file was resolved and mapped.
    FileRequest,
    /// Malformed request line, version, method, or target.
    BadRequest,
    /// The resolved target does not exist.
    NoResource,
    /// The target is not world-readable or escapes the document root.
    Forbidden,
    /// Impossible state or a failed collaborator.
    InternalError,
}

pub const OK_200_TITLE: &str = "OK";
pub const ERROR_400_TITLE: &str = "Bad Request";
pub const ERROR_400_FORM: &str =
    "Your request has bad syntax or is inherently impossible to satisfy.\n";
pub const ERROR_403_TITLE: &str = "Forbidden";
pub const ERROR_403_FORM: &str = "You do not have permission to get file from this server.\n";
pub const ERROR_404_TITLE: &str = "Not Found";
pub const ERROR_404_FORM: &str = "The requested file was not found on this server.\n";
pub const ERROR_500_TITLE: &str = "Internal Error";
pub const ERROR_500_FORM: &str = "There was an unusual problem serving the requested file.\n";

// Login and registration outcomes are answered by rewriting the request
// target to one of these documents under the document root.
pub const DOC_WELCOME: &str = "/welcome.html";
pub const DOC_PASSWORD_ERROR: &str = "/password_error.html";
pub const DOC_UNKNOWN_USER: &str = "/unknown_user.html";
pub const DOC_USER_EXISTS: &str = "/user_exists.html";
pub const DOC_EMPTY_PASSWORD: &str = "/empty_password.html";
pub const DOC_REGISTER_OK: &str = "/register_ok.html";
