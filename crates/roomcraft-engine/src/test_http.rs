//! Single-request HTTP responder for exercising provider clients offline.

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub(crate) struct OneShot {
    handle: JoinHandle<String>,
}

impl OneShot {
    /// Raw request text (head and body) the responder received.
    pub(crate) fn request(self) -> anyhow::Result<String> {
        self.handle
            .join()
            .map_err(|_| anyhow::anyhow!("responder thread panicked"))
    }
}

/// Answers exactly one request on `127.0.0.1` with the canned response and
/// returns the base URL to point a client at.
pub(crate) fn serve_once(
    status: &'static str,
    content_type: &'static str,
    body: Vec<u8>,
) -> anyhow::Result<(String, OneShot)> {
    let listener = TcpListener::bind("127.0.0.1:0")?;
    let base = format!("http://{}", listener.local_addr()?);
    let handle = thread::spawn(move || {
        let Ok((mut stream, _)) = listener.accept() else {
            return String::new();
        };
        let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
        let request = read_request(&mut stream);
        let head = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        let _ = stream.write_all(head.as_bytes());
        let _ = stream.write_all(&body);
        let _ = stream.flush();
        request
    });
    Ok((base, OneShot { handle }))
}

/// Reads the head and a `Content-Length` body so the client never sees a reset.
fn read_request(stream: &mut TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    let header_end = loop {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => return String::from_utf8_lossy(&buf).into_owned(),
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
        if let Some(pos) = buf.windows(4).position(|window| window == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let content_length = String::from_utf8_lossy(&buf[..header_end])
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        match stream.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
