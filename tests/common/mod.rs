#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use iso_gateway::GatewayConfig;
use iso_gateway::codec::{FieldTable, ProtocolMessage, decode, encode};
use iso_gateway::transport::encode_frame;

/// What the mock host does with one request.
pub enum Reply {
    Message(ProtocolMessage),
    /// Close the connection without answering.
    Hangup,
    Delay(Duration, ProtocolMessage),
}

type Responder = dyn Fn(&ProtocolMessage, usize) -> Reply + Send + Sync;

/// In-process authorization host speaking 2-byte length-prefixed frames.
pub struct MockHost {
    port: u16,
    accepted: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<ProtocolMessage>>>,
}

impl MockHost {
    /// `responder` gets each request and its 1-based sequence number across
    /// all connections.
    pub fn start<F>(responder: F) -> Self
    where
        F: Fn(&ProtocolMessage, usize) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));
        let responder: Arc<Responder> = Arc::new(responder);

        {
            let accepted = Arc::clone(&accepted);
            let received = Arc::clone(&received);
            thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(stream) = stream else { break };
                    accepted.fetch_add(1, Ordering::SeqCst);
                    let received = Arc::clone(&received);
                    let responder = Arc::clone(&responder);
                    thread::spawn(move || serve(stream, &*responder, &received));
                }
            });
        }

        Self {
            port,
            accepted,
            received,
        }
    }

    /// Answer every request with `code`.
    pub fn answering(code: &'static str) -> Self {
        Self::start(move |request, _| Reply::Message(respond(request, code)))
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn request_count(&self) -> usize {
        self.received.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ProtocolMessage> {
        self.received.lock().unwrap().clone()
    }
}

fn serve(mut stream: TcpStream, responder: &Responder, received: &Mutex<Vec<ProtocolMessage>>) {
    let fields = FieldTable::default();
    loop {
        let mut header = [0u8; 2];
        if stream.read_exact(&mut header).is_err() {
            return;
        }
        let mut body = vec![0u8; usize::from(u16::from_be_bytes(header))];
        if stream.read_exact(&mut body).is_err() {
            return;
        }
        let Ok(request) = decode(&body, &fields) else {
            return;
        };
        let sequence = {
            let mut received = received.lock().unwrap();
            received.push(request.clone());
            received.len()
        };

        let reply = match responder(&request, sequence) {
            Reply::Message(reply) => reply,
            Reply::Hangup => return,
            Reply::Delay(delay, reply) => {
                thread::sleep(delay);
                reply
            }
        };
        let frame = encode_frame(&encode(&reply, &fields).unwrap(), 2).unwrap();
        if stream.write_all(&frame).is_err() {
            return;
        }
    }
}

/// Echo the request as its response MTI with an auth code and `code`.
pub fn respond(request: &ProtocolMessage, code: &str) -> ProtocolMessage {
    let mut reply = request.clone();
    let mti: u16 = request.mti().parse().unwrap();
    reply.set_mti(format!("{:04}", mti + 10));
    reply.set(38, "AB12CD").set(39, code);
    reply
}

/// Config pointing at a local port with short timeouts and backoff.
pub fn config_for(port: u16) -> GatewayConfig {
    GatewayConfig {
        host: "127.0.0.1".into(),
        port,
        connect_timeout_ms: 1_000,
        read_timeout_ms: 2_000,
        min_connections: 1,
        max_connections: 4,
        pool_timeout_ms: 2_000,
        retry_attempts: 3,
        retry_delay_ms: 10,
        max_retry_delay_ms: 50,
        shutdown_grace_ms: 500,
        ..GatewayConfig::default()
    }
}

/// A port nothing listens on.
pub fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
