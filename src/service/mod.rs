//! Served mode: `POST /process` over HTTP.
//!
//! The request body is an encoded image (PNG, JPEG or GIF). It is decoded
//! into a `Frame`, pushed through the shared `AnalyticInvoker`, and the
//! resulting `FrameData` is returned as JSON.
//!
//! Each connection is handled on its own thread, so requests arrive at the
//! invoker concurrently; the invoker serializes them. At most
//! `max_connections` workers exist at once; a connection accepted past that
//! cap is answered 503 and closed. A failed request is answered with an error
//! status and never takes the server down.
//!
//! Each request is independent: `frame_num` is always 0 and the timestamp is
//! the time the request was received.

mod http;

use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use self::http::{read_body, read_head, write_continue, write_response, RequestError};
use crate::envelope::encode_frame_data;
use crate::error::StreamError;
use crate::frame::Frame;
use crate::invoker::AnalyticInvoker;

/// Frame number assigned to every served request.
pub const SERVED_FRAME_NUM: u64 = 0;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listen address. Port 0 picks a free port.
    pub addr: String,
    /// Largest accepted request body.
    pub max_body_bytes: usize,
    pub read_timeout_ms: u64,
    /// Concurrent connection workers.
    pub max_connections: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:50051".to_string(),
            max_body_bytes: 16 * 1024 * 1024,
            read_timeout_ms: 5_000,
            max_connections: 32,
        }
    }
}

impl ServiceConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug)]
pub struct ServiceHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl ServiceHandle {
    /// Stop accepting connections and wait for in-flight requests.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("service thread panicked"))?;
        }
        Ok(())
    }
}

pub struct ServiceServer {
    cfg: ServiceConfig,
    invoker: Arc<AnalyticInvoker>,
}

impl ServiceServer {
    pub fn new(cfg: ServiceConfig, invoker: Arc<AnalyticInvoker>) -> Self {
        Self { cfg, invoker }
    }

    /// Bind the listener and start the accept loop on a background thread.
    pub fn spawn(self) -> Result<ServiceHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid service address '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("bind {}", configured_addr))?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let cfg = self.cfg;
        let invoker = self.invoker;
        let join = std::thread::spawn(move || {
            if let Err(err) = run_service(listener, cfg, invoker, shutdown_thread) {
                log::error!("service stopped: {}", err);
            }
        });

        log::info!("service listening on {}", addr);
        Ok(ServiceHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

fn run_service(
    listener: TcpListener,
    cfg: ServiceConfig,
    invoker: Arc<AnalyticInvoker>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((mut stream, peer)) => {
                workers.retain(|worker| !worker.is_finished());
                if workers.len() >= cfg.max_connections {
                    log::warn!("busy: refusing connection from {}", peer);
                    if let Err(err) = refuse_busy(&mut stream) {
                        log::debug!("busy response to {} failed: {}", peer, err);
                    }
                    continue;
                }
                let cfg = cfg.clone();
                let invoker = invoker.clone();
                workers.push(std::thread::spawn(move || {
                    if let Err(err) = handle_connection(stream, &cfg, &invoker) {
                        log::warn!("request from {} rejected: {:#}", peer, err);
                    }
                }));
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                workers.retain(|worker| !worker.is_finished());
                std::thread::sleep(Duration::from_millis(20));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    for worker in workers {
        let _ = worker.join();
    }
    Ok(())
}

fn handle_connection(
    mut stream: TcpStream,
    cfg: &ServiceConfig,
    invoker: &AnalyticInvoker,
) -> Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(cfg.read_timeout()))?;

    let head = match read_head(&mut stream) {
        Ok(head) => head,
        Err(err) => return reject(&mut stream, err),
    };

    let (method, path) = (head.method.clone(), head.path.clone());
    match (method.as_str(), path.as_str()) {
        ("GET", "/health") => {
            write_response(&mut stream, 200, "application/json", &[], br#"{"status":"ok"}"#)?;
            Ok(())
        }
        ("POST", "/process") => {
            if head.expects_continue() {
                write_continue(&mut stream)?;
            }
            let body = match read_body(&mut stream, head, cfg.max_body_bytes) {
                Ok(body) => body,
                Err(err) => return reject(&mut stream, err),
            };
            match process(&body, invoker) {
                Ok(payload) => {
                    write_response(
                        &mut stream,
                        200,
                        "application/json",
                        &[("X-Frame-Num", SERVED_FRAME_NUM.to_string())],
                        &payload,
                    )?;
                    Ok(())
                }
                Err(err) => {
                    write_error(&mut stream, err.http_status(), err.code(), &err.to_string())?;
                    Err(anyhow::Error::new(err))
                }
            }
        }
        (_, "/health") | (_, "/process") => {
            write_error(&mut stream, 405, "method_not_allowed", "method not allowed")?;
            Ok(())
        }
        _ => {
            write_error(&mut stream, 404, "not_found", "no such route")?;
            Ok(())
        }
    }
}

/// Decode one payload and run it through the invoker.
fn process(body: &[u8], invoker: &AnalyticInvoker) -> Result<Vec<u8>, StreamError> {
    let timestamp = crate::epoch_secs();
    let frame = Frame::decode(body)?;
    let invocation = invoker.invoke(&frame, SERVED_FRAME_NUM, timestamp)?;
    encode_frame_data(&invocation.data)
}

fn refuse_busy(stream: &mut TcpStream) -> Result<()> {
    stream.set_nonblocking(false)?;
    write_error(stream, 503, "busy", "too many concurrent connections")?;
    stream.shutdown(Shutdown::Write)?;
    Ok(())
}

fn reject(stream: &mut TcpStream, err: RequestError) -> Result<()> {
    if let Some((status, code)) = err.response() {
        write_error(stream, status, code, &err.to_string())?;
    }
    Err(err.into())
}

fn write_error(stream: &mut TcpStream, status: u16, code: &str, message: &str) -> Result<()> {
    let body = serde_json::to_vec(&serde_json::json!({
        "error": code,
        "message": message,
    }))?;
    write_response(stream, status, "application/json", &[], &body)?;
    Ok(())
}
