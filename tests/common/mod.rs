//! Shared utilities for integration testing.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::mpsc,
};

use reweb_lambda::Config;

/// A mock local service. Every request it receives is forwarded, raw, to
/// `requests`.
#[allow(dead_code)]
pub struct Backend {
    pub port: u16,
    pub requests: mpsc::UnboundedReceiver<String>,
}

/// Start a mock backend. `respond` is given the zero-based request number and
/// the backend's own port, and returns the complete raw HTTP response to send.
#[allow(dead_code)]
pub async fn start_backend<F>(respond: F) -> Backend
where
    F: Fn(usize, u16) -> String + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::unbounded_channel();
    let respond = Arc::new(respond);
    let counter = Arc::new(AtomicUsize::new(0));

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let respond = respond.clone();
                    let counter = counter.clone();
                    let tx = tx.clone();

                    tokio::spawn(async move {
                        let request = read_request(&mut socket).await;
                        let n = counter.fetch_add(1, Ordering::SeqCst);
                        let _ = tx.send(request);
                        let _ = socket.write_all(respond(n, port).as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    Backend { port, requests: rx }
}

/// A port with nothing listening on it.
#[allow(dead_code)]
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// Format a raw HTTP/1.1 response.
#[allow(dead_code)]
pub fn http_response(status_line: &str, headers: &[(&str, &str)], body: &str) -> String {
    let mut out = format!("HTTP/1.1 {status_line}\r\n");
    for (name, value) in headers {
        out.push_str(&format!("{name}: {value}\r\n"));
    }
    out.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    ));
    out
}

#[allow(dead_code)]
pub fn config(port: u16) -> Config {
    Config {
        application_exec: "true".to_owned(),
        application_port: port,
        force_gzip: false,
        wait_path: "/".to_owned(),
        wait_code: None,
        debug: false,
        gateway_force_https: true,
    }
}

/// Find a header line in a raw request, case-insensitively.
#[allow(dead_code)]
pub fn request_header<'a>(request: &'a str, name: &str) -> Option<&'a str> {
    request
        .split("\r\n\r\n")
        .next()?
        .lines()
        .skip(1)
        .filter_map(|line| line.split_once(':'))
        .find(|(n, _)| n.trim().eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim())
}

async fn read_request(socket: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(i) = find(&buf, b"\r\n\r\n") {
            break i + 4;
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return String::from_utf8_lossy(&buf).into_owned(),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let content_length = request_header(&head, "content-length")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }

    String::from_utf8_lossy(&buf).into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}
