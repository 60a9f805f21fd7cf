// src/events/ingest.rs
//
// Protokoll: 4 Byte Länge (big-endian) + UTF-8 JSON. Antwort: OK | QUEUE_FULL | ERROR,
// danach wird die Verbindung geschlossen.

use std::io::{Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Context;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, error, info, warn};

use crate::core::IngestError;

use super::event::Event;
use super::scheduler::EventScheduler;

pub const REPLY_OK: &[u8] = b"OK";
pub const REPLY_QUEUE_FULL: &[u8] = b"QUEUE_FULL";
pub const REPLY_ERROR: &[u8] = b"ERROR";

const ACCEPT_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Accepted(u64),
    QueueFull,
    Rejected,
}

impl Reply {
    pub fn token(&self) -> &'static [u8] {
        match self {
            Reply::Accepted(_) => REPLY_OK,
            Reply::QueueFull => REPLY_QUEUE_FULL,
            Reply::Rejected => REPLY_ERROR,
        }
    }
}

/// Reads one length-prefixed request body.
pub fn read_request<R: Read>(r: &mut R, max_len: usize) -> Result<Vec<u8>, IngestError> {
    let len = r.read_u32::<BigEndian>()? as usize;
    if len > max_len {
        return Err(IngestError::TooLarge { len, max: max_len });
    }
    let mut body = vec![0u8; len];
    r.read_exact(&mut body)?;
    Ok(body)
}

/// Parses a request body and admits it; never touches other connections.
pub fn admit(body: &[u8], scheduler: &EventScheduler) -> Result<Reply, IngestError> {
    let event = Event::from_json(body)?;
    let summary = format!("{} / {} / type={:?}", event.kind, event.camera, event.camera_type);

    match scheduler.try_add_event(event) {
        Ok(seq) => {
            info!("[ingest] accepted #{}: {}", seq, summary);
            Ok(Reply::Accepted(seq))
        }
        Err(full) => {
            warn!("[ingest] rejected {}: {}", summary, full);
            Ok(Reply::QueueFull)
        }
    }
}

pub struct IngestServer {
    listener: TcpListener,
    scheduler: Arc<EventScheduler>,
    max_message_bytes: usize,
    read_timeout: Duration,
}

impl IngestServer {
    pub fn bind(
        addr: &str,
        scheduler: Arc<EventScheduler>,
        max_message_bytes: usize,
        read_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(addr).with_context(|| format!("bind {}", addr))?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            listener,
            scheduler,
            max_message_bytes,
            read_timeout,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop; returns once `running` goes false.
    pub fn run(self, running: Arc<AtomicBool>) {
        info!("[ingest] listening on {:?}", self.listener.local_addr());

        while running.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!("[ingest] connection from {}", peer);
                    let scheduler = self.scheduler.clone();
                    let max = self.max_message_bytes;
                    let timeout = self.read_timeout;
                    thread::spawn(move || serve_connection(stream, peer, &scheduler, max, timeout));
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    error!("[ingest] accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }

        info!("[ingest] stopped");
    }

    pub fn spawn(self, running: Arc<AtomicBool>) -> thread::JoinHandle<()> {
        thread::spawn(move || self.run(running))
    }
}

// Akzeptierte Sockets erben sonst den nonblocking-Modus des Listeners.
fn prepare_stream(stream: &TcpStream, timeout: Duration) -> std::io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))
}

fn serve_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    scheduler: &EventScheduler,
    max_len: usize,
    timeout: Duration,
) {
    if let Err(e) = prepare_stream(&stream, timeout) {
        debug!("[ingest] socket setup for {} failed: {}", peer, e);
    }

    let reply = match read_request(&mut stream, max_len).and_then(|body| admit(&body, scheduler)) {
        Ok(reply) => reply,
        Err(e) => {
            warn!("[ingest] bad request from {}: {}", peer, e);
            Reply::Rejected
        }
    };

    if let Err(e) = stream.write_all(reply.token()) {
        debug!("[ingest] reply to {} failed: {}", peer, e);
    }
    let _ = stream.shutdown(Shutdown::Both);
}

/// Client side: sends one request and returns the server's reply token.
pub fn send_request(
    addr: impl ToSocketAddrs,
    body: &[u8],
    timeout: Duration,
) -> std::io::Result<String> {
    let addr = addr
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidInput, "no address"))?;

    let mut stream = TcpStream::connect_timeout(&addr, timeout)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.write_u32::<BigEndian>(body.len() as u32)?;
    stream.write_all(body)?;
    stream.flush()?;

    let mut reply = String::new();
    stream.read_to_string(&mut reply)?;
    Ok(reply)
}
