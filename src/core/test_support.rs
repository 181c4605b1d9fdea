// Shared fixtures for unit tests: a tiny HTTP server and process spies.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use crate::core::error::WrapperResult;
use crate::core::process::{HealthProbe, LaunchSpec, ProcessSupervisor};

#[derive(Debug, Clone)]
pub struct Route {
    status: u16,
    body: Vec<u8>,
    content_length: bool,
}

impl Route {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            content_length: true,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: Vec::new(),
            content_length: true,
        }
    }

    /// Body delimited by connection close, no `Content-Length`.
    pub fn without_length(mut self) -> Self {
        self.content_length = false;
        self
    }
}

/// One-route-per-path HTTP/1.1 server on an ephemeral loopback port.
pub struct TestServer {
    addr: SocketAddr,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl TestServer {
    pub async fn start(routes: Vec<(&str, Route)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let routes: Arc<HashMap<String, Route>> = Arc::new(
            routes
                .into_iter()
                .map(|(path, route)| (path.to_string(), route))
                .collect(),
        );
        let hits = Arc::new(Mutex::new(HashMap::new()));

        let server_hits = hits.clone();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let routes = routes.clone();
                let hits = server_hits.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }
                    let head = String::from_utf8_lossy(&request);
                    let path = head
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();
                    *hits.lock().unwrap().entry(path.clone()).or_insert(0) += 1;

                    let route = routes.get(&path).cloned().unwrap_or(Route::status(404));
                    let mut response = format!("HTTP/1.1 {} Test\r\nConnection: close\r\n", route.status);
                    if route.content_length {
                        response.push_str(&format!("Content-Length: {}\r\n", route.body.len()));
                    }
                    response.push_str("\r\n");
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.write_all(&route.body).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        Self { addr, hits }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self, path: &str) -> usize {
        self.hits.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

/// Records every call and pretends the process is up from spawn until
/// terminate. Doubles as the health probe so "reachable" tracks "alive".
#[derive(Debug, Default)]
pub struct SpySupervisor {
    alive: AtomicBool,
    /// Keep answering "alive" after terminate, like a stuck process.
    stubborn: AtomicBool,
    /// Never report reachable, like a service that fails to boot.
    unreachable: AtomicBool,
    pub spawned: Mutex<Vec<LaunchSpec>>,
    pub terminations: AtomicUsize,
    pub reaps: AtomicUsize,
}

impl SpySupervisor {
    pub const PID: u32 = 4242;

    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stubborn() -> Arc<Self> {
        let spy = Self::default();
        spy.stubborn.store(true, Ordering::SeqCst);
        Arc::new(spy)
    }

    pub fn unreachable() -> Arc<Self> {
        let spy = Self::default();
        spy.unreachable.store(true, Ordering::SeqCst);
        Arc::new(spy)
    }

    /// Ignores the stop signal and never answers.
    pub fn hung() -> Arc<Self> {
        let spy = Self::default();
        spy.stubborn.store(true, Ordering::SeqCst);
        spy.unreachable.store(true, Ordering::SeqCst);
        Arc::new(spy)
    }

    pub fn spawn_count(&self) -> usize {
        self.spawned.lock().unwrap().len()
    }

    pub fn termination_count(&self) -> usize {
        self.terminations.load(Ordering::SeqCst)
    }

    pub fn reap_count(&self) -> usize {
        self.reaps.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProcessSupervisor for SpySupervisor {
    async fn spawn(&self, spec: &LaunchSpec) -> WrapperResult<u32> {
        self.spawned.lock().unwrap().push(spec.clone());
        self.alive.store(true, Ordering::SeqCst);
        Ok(Self::PID)
    }

    fn is_alive(&self, pid: u32) -> bool {
        pid == Self::PID && self.alive.load(Ordering::SeqCst)
    }

    fn terminate(&self, _pid: u32) -> WrapperResult<()> {
        self.terminations.fetch_add(1, Ordering::SeqCst);
        if !self.stubborn.load(Ordering::SeqCst) {
            self.alive.store(false, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn reap(&self, _pid: u32) {
        self.reaps.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl HealthProbe for SpySupervisor {
    async fn is_reachable(&self, _host: &str, _port: &str) -> bool {
        !self.unreachable.load(Ordering::SeqCst) && self.alive.load(Ordering::SeqCst)
    }
}
