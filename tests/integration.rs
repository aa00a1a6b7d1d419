//! Socket-level scenarios against a running reactor.

use std::fs;
use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpStream};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use etude::config::Config;
use etude::reactor::{Reactor, ServerShared};
use etude::store::{CredentialStore, SqliteStore};

fn test_config(doc_root: PathBuf) -> Config {
    Config {
        host: Ipv4Addr::LOCALHOST,
        port: 0,
        doc_root,
        workers: 2,
        max_queue: 64,
        max_connections: 4096,
        max_events: 256,
        backlog: 5,
        database_path: ":memory:".to_string(),
    }
}

fn docroot(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("etude-e2e-{}-{}", tag, std::process::id()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_doc(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

/// Bind a reactor on an ephemeral port and run it on a background thread.
fn start_server(doc_root: PathBuf, store: SqliteStore) -> (u16, Arc<ServerShared>) {
    let reactor = Reactor::bind(test_config(doc_root), Box::new(store)).expect("bind reactor");
    let port = reactor.local_port();
    let shared = reactor.shared();
    thread::spawn(move || {
        let _ = reactor.run();
    });
    (port, shared)
}

fn connect(port: u16) -> TcpStream {
    let stream = TcpStream::connect((Ipv4Addr::LOCALHOST, port)).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    stream
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Read one response: the header block and exactly Content-Length body bytes.
fn read_response(stream: &mut TcpStream) -> (String, Vec<u8>) {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 1024];
    let header_end = loop {
        let n = stream.read(&mut tmp).expect("read headers");
        assert!(n > 0, "connection closed before headers completed");
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = find_subslice(&buf, b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let headers = String::from_utf8(buf[..header_end].to_vec()).unwrap();
    let content_length = headers
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            if key.eq_ignore_ascii_case("content-length") {
                value.trim().parse::<usize>().ok()
            } else {
                None
            }
        })
        .expect("Content-Length header");
    let mut body = buf[header_end..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut tmp).expect("read body");
        assert!(n > 0, "connection closed mid-body");
        body.extend_from_slice(&tmp[..n]);
    }
    body.truncate(content_length);
    (headers, body)
}

#[test]
fn get_served_file_and_keep_alive_reuse() {
    let root = docroot("keepalive");
    write_doc(&root, "index.html", "<html>it works</html>");
    let (port, _shared) = start_server(root, SqliteStore::open_in_memory().unwrap());

    let mut stream = connect(port);
    stream
        .write_all(b"GET /index.html HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();
    let (headers, body) = read_response(&mut stream);
    assert!(headers.starts_with("HTTP/1.1 200 OK\r\n"), "{headers}");
    assert!(headers.contains("Connection: keep-alive\r\n"));
    assert!(headers.contains("Content-Type: text/html\r\n"));
    assert_eq!(body, b"<html>it works</html>");

    // The connection stayed open for a second request.
    stream
        .write_all(b"GET /index.html HTTP/1.1\r\nHost: x\r\nConnection: keep-alive\r\n\r\n")
        .unwrap();
    let (headers2, body2) = read_response(&mut stream);
    assert!(headers2.starts_with("HTTP/1.1 200 OK\r\n"));
    assert_eq!(body2, b"<html>it works</html>");
}

#[test]
fn missing_file_gets_the_canned_404() {
    let root = docroot("notfound");
    let (port, _shared) = start_server(root, SqliteStore::open_in_memory().unwrap());

    let mut stream = connect(port);
    stream
        .write_all(b"GET /missing.html HTTP/1.1\r\n\r\n")
        .unwrap();
    let (headers, body) = read_response(&mut stream);
    assert!(headers.starts_with("HTTP/1.1 404 Not Found\r\n"), "{headers}");
    assert!(headers.contains("Connection: close\r\n"));
    assert_eq!(
        body,
        b"The requested file was not found on this server.\n"
    );

    // No keep-alive requested: the server closes after the response.
    let mut tmp = [0u8; 16];
    match stream.read(&mut tmp) {
        Ok(0) => {}
        Ok(n) => panic!("unexpected extra bytes: {n}"),
        Err(_) => {} // reset is also a valid teardown observation
    }
}

#[test]
fn unreadable_file_is_forbidden() {
    let root = docroot("forbidden");
    write_doc(&root, "secret.html", "hidden");
    fs::set_permissions(root.join("secret.html"), fs::Permissions::from_mode(0o600)).unwrap();
    let (port, _shared) = start_server(root, SqliteStore::open_in_memory().unwrap());

    let mut stream = connect(port);
    stream
        .write_all(b"GET /secret.html HTTP/1.1\r\n\r\n")
        .unwrap();
    let (headers, body) = read_response(&mut stream);
    assert!(headers.starts_with("HTTP/1.1 403 Forbidden\r\n"), "{headers}");
    assert_eq!(
        body,
        b"You do not have permission to get file from this server.\n"
    );
}

#[test]
fn post_login_serves_welcome_document() {
    let root = docroot("login");
    write_doc(&root, "welcome.html", "<html>hello bob</html>");
    write_doc(&root, "password_error.html", "<html>wrong password</html>");
    let store = SqliteStore::open_in_memory().unwrap();
    store.insert_user("bob", "x").unwrap();
    let (port, _shared) = start_server(root, store);

    let body = b"username=bob&Password=x";
    let mut stream = connect(port);
    stream
        .write_all(
            format!(
                "POST /login HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n",
                body.len()
            )
            .as_bytes(),
        )
        .unwrap();
    stream.write_all(body).unwrap();
    let (headers, resp_body) = read_response(&mut stream);
    assert!(headers.starts_with("HTTP/1.1 200 OK\r\n"), "{headers}");
    assert_eq!(resp_body, b"<html>hello bob</html>");

    // Same user, wrong password: the password-error document instead.
    let body = b"username=bob&Password=nope";
    let mut stream = connect(port);
    stream
        .write_all(
            format!(
                "POST /login HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n",
                body.len()
            )
            .as_bytes(),
        )
        .unwrap();
    stream.write_all(body).unwrap();
    let (headers, resp_body) = read_response(&mut stream);
    assert!(headers.starts_with("HTTP/1.1 200 OK\r\n"), "{headers}");
    assert_eq!(resp_body, b"<html>wrong password</html>");
}

#[test]
fn post_registration_persists_the_user() {
    let root = docroot("register");
    write_doc(&root, "register_ok.html", "<html>registered</html>");
    let (port, shared) = start_server(root, SqliteStore::open_in_memory().unwrap());

    let body = b"rgtname=alice&rgtpswd=secret";
    let mut stream = connect(port);
    stream
        .write_all(
            format!(
                "POST /register HTTP/1.1\r\nContent-Length: {}\r\n\r\n",
                body.len()
            )
            .as_bytes(),
        )
        .unwrap();
    stream.write_all(body).unwrap();
    let (headers, resp_body) = read_response(&mut stream);
    assert!(headers.starts_with("HTTP/1.1 200 OK\r\n"), "{headers}");
    assert_eq!(resp_body, b"<html>registered</html>");
    assert_eq!(
        shared.store.find_password("alice").unwrap(),
        Some("secret".to_string())
    );
}

#[test]
fn oversized_request_line_tears_the_connection_down() {
    let root = docroot("oversized");
    let (port, _shared) = start_server(root, SqliteStore::open_in_memory().unwrap());

    let mut stream = connect(port);
    // Never send a terminator; the read buffer fills and the server closes
    // without a response.
    let garbage = vec![b'A'; 4096];
    stream.write_all(&garbage).unwrap();

    let mut tmp = [0u8; 64];
    match stream.read(&mut tmp) {
        Ok(0) => {} // clean close, nothing was sent back
        Ok(_) => panic!("server responded to an unterminated request"),
        Err(e)
            if e.kind() == std::io::ErrorKind::WouldBlock
                || e.kind() == std::io::ErrorKind::TimedOut =>
        {
            panic!("server did not close the connection")
        }
        Err(_) => {} // connection reset
    }
}
