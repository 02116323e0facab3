//! In-process HTTP/1.1 responder for the cases a mock server can't express: dropped
//! connections, refused connections and connection reuse.
//!
//! `spawn_scripted_server` serves each reply on its own connection (`Connection: close`) and
//! closes the listener before the last reply is written, so any request after the script ends is
//! refused. `spawn_keep_alive_server` keeps connections open and records which accepted
//! connection carried each request.

use serde_json::Value;
use std::net::SocketAddr;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

pub enum Scripted {
    Reply { status: u16, body: String },
    /// Read the request, then drop the connection without answering.
    HangUp,
}

impl Scripted {
    pub fn json(status: u16, body: &str) -> Self {
        Scripted::Reply {
            status,
            body: body.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub path: String,
    pub body: String,
    /// Zero-based index of the accepted connection that carried the request.
    pub connection: usize,
}

impl CapturedRequest {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

pub struct ScriptedServer {
    addr: SocketAddr,
    handle: JoinHandle<Vec<CapturedRequest>>,
}

impl ScriptedServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    pub async fn finish(self) -> Vec<CapturedRequest> {
        self.handle.await.expect("scripted server task")
    }
}

pub async fn spawn_scripted_server(script: Vec<Scripted>) -> ScriptedServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    if script.is_empty() {
        drop(listener);
        return ScriptedServer {
            addr,
            handle: tokio::spawn(async { Vec::new() }),
        };
    }

    let handle = tokio::spawn(async move {
        let mut captured = Vec::new();
        let mut listener = Some(listener);
        let total = script.len();
        for (idx, step) in script.into_iter().enumerate() {
            let (mut stream, _) = listener
                .as_ref()
                .expect("listener open")
                .accept()
                .await
                .expect("accept");
            let request = read_request(&mut stream, idx)
                .await
                .expect("client sent a request");
            if idx + 1 == total {
                listener.take();
            }
            captured.push(request);
            match step {
                Scripted::Reply { status, body } => {
                    write_reply(&mut stream, status, &body, false).await;
                    let _ = stream.shutdown().await;
                }
                Scripted::HangUp => drop(stream),
            }
        }
        captured
    });

    ScriptedServer { addr, handle }
}

pub async fn spawn_keep_alive_server(script: Vec<Scripted>) -> ScriptedServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");

    let handle = tokio::spawn(async move {
        let mut captured = Vec::new();
        let mut stream: Option<TcpStream> = None;
        let mut accepted = 0usize;
        for step in script {
            let request = loop {
                if stream.is_none() {
                    let (conn, _) = listener.accept().await.expect("accept");
                    accepted += 1;
                    stream = Some(conn);
                }
                let conn = stream.as_mut().expect("connection open");
                match read_request(conn, accepted - 1).await {
                    Some(request) => break request,
                    None => stream = None,
                }
            };
            captured.push(request);
            match step {
                Scripted::Reply { status, body } => {
                    let conn = stream.as_mut().expect("connection open");
                    write_reply(conn, status, &body, true).await;
                }
                Scripted::HangUp => stream = None,
            }
        }
        captured
    });

    ScriptedServer { addr, handle }
}

async fn write_reply(stream: &mut TcpStream, status: u16, body: &str, keep_alive: bool) {
    let connection = if keep_alive { "keep-alive" } else { "close" };
    let head = format!(
        "HTTP/1.1 {status} Scripted\r\ncontent-type: application/json\r\n\
content-length: {}\r\nconnection: {connection}\r\n\r\n",
        body.len()
    );
    stream.write_all(head.as_bytes()).await.expect("write head");
    stream.write_all(body.as_bytes()).await.expect("write body");
    stream.flush().await.expect("flush reply");
}

/// `None` when the peer closed the connection before sending anything.
async fn read_request(stream: &mut TcpStream, connection: usize) -> Option<CapturedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            assert!(buf.is_empty(), "client closed mid-request");
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let path = head
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await.expect("read body");
        assert!(n > 0, "client closed mid-body");
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..header_end + content_length]).to_string();
    Some(CapturedRequest {
        path,
        body,
        connection,
    })
}
