//! Loopback tracker fixtures shared by the integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use riptide_tracker::torrent::{InfoHash, PeerId};
use riptide_tracker::{AnnounceEvent, AnnounceRequest};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;

pub const CONNECTION_ID: u64 = 0x0102_0304_0506_0708;

/// Info hash whose percent-encoding mixes escaped and unreserved bytes.
pub const INFO_HASH: [u8; 20] = [
    0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde, 0xf1, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef, 0x12,
    0x34, 0x56, 0x78, 0x9a,
];
pub const INFO_HASH_ENCODED: &str = "%124Vx%9A%BC%DE%F1%23Eg%89%AB%CD%EF%124Vx%9A";

pub fn announce_request(event: AnnounceEvent) -> AnnounceRequest {
    AnnounceRequest {
        event,
        ..AnnounceRequest::started(
            InfoHash::new(INFO_HASH),
            PeerId::new(*b"-RT0001-abcdefghijkl"),
            6881,
            4096,
        )
    }
}

pub fn compact_peer(addr: &str) -> Vec<u8> {
    let SocketAddr::V4(addr) = addr.parse::<SocketAddr>().unwrap() else {
        panic!("compact peers are IPv4");
    };
    let mut entry = addr.ip().octets().to_vec();
    entry.extend_from_slice(&addr.port().to_be_bytes());
    entry
}

pub fn connect_reply(transaction_id: u32, connection_id: u64) -> Vec<u8> {
    let mut reply = Vec::with_capacity(16);
    reply.extend_from_slice(&0u32.to_be_bytes());
    reply.extend_from_slice(&transaction_id.to_be_bytes());
    reply.extend_from_slice(&connection_id.to_be_bytes());
    reply
}

pub fn announce_reply(transaction_id: u32, interval: u32, peers: &[Vec<u8>]) -> Vec<u8> {
    let mut reply = Vec::new();
    reply.extend_from_slice(&1u32.to_be_bytes());
    reply.extend_from_slice(&transaction_id.to_be_bytes());
    reply.extend_from_slice(&interval.to_be_bytes());
    reply.extend_from_slice(&2u32.to_be_bytes()); // leechers
    reply.extend_from_slice(&5u32.to_be_bytes()); // seeders
    for peer in peers {
        reply.extend_from_slice(peer);
    }
    reply
}

pub fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap())
}

pub fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_be_bytes(bytes[offset..offset + 8].try_into().unwrap())
}

/// How the scripted UDP tracker answers.
#[derive(Debug, Clone)]
pub enum UdpBehaviour {
    Respond { interval: u32, peers: Vec<Vec<u8>> },
    ErrorOnAnnounce(&'static str),
    Silent,
}

/// UDP tracker on loopback answering connect, announce and scrape.
pub struct ScriptedUdpTracker {
    pub addr: SocketAddr,
    pub connects: Arc<AtomicUsize>,
    pub announces: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl ScriptedUdpTracker {
    pub async fn spawn(behaviour: UdpBehaviour) -> Self {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let connects = Arc::new(AtomicUsize::new(0));
        let announces = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn({
            let connects = Arc::clone(&connects);
            let announces = Arc::clone(&announces);
            async move {
                let mut buf = [0u8; 2048];
                loop {
                    let Ok((len, peer)) = socket.recv_from(&mut buf).await else {
                        continue;
                    };
                    if len < 16 {
                        continue;
                    }
                    let packet = &buf[..len];
                    let transaction_id = read_u32(packet, 12);

                    let reply = match read_u32(packet, 8) {
                        0 => {
                            connects.fetch_add(1, Ordering::SeqCst);
                            connect_reply(transaction_id, CONNECTION_ID)
                        }
                        1 => {
                            announces.fetch_add(1, Ordering::SeqCst);
                            assert_eq!(read_u64(packet, 0), CONNECTION_ID);
                            match &behaviour {
                                UdpBehaviour::Respond { interval, peers } => {
                                    announce_reply(transaction_id, *interval, peers)
                                }
                                UdpBehaviour::ErrorOnAnnounce(message) => {
                                    let mut reply = 3u32.to_be_bytes().to_vec();
                                    reply.extend_from_slice(&transaction_id.to_be_bytes());
                                    reply.extend_from_slice(message.as_bytes());
                                    reply
                                }
                                UdpBehaviour::Silent => continue,
                            }
                        }
                        2 => {
                            let hashes = (len - 16) / 20;
                            let mut reply = 2u32.to_be_bytes().to_vec();
                            reply.extend_from_slice(&transaction_id.to_be_bytes());
                            for _ in 0..hashes {
                                for value in [5u32, 50, 7] {
                                    reply.extend_from_slice(&value.to_be_bytes());
                                }
                            }
                            reply
                        }
                        _ => continue,
                    };

                    if matches!(behaviour, UdpBehaviour::Silent) {
                        continue;
                    }
                    let _ = socket.send_to(&reply, peer).await;
                }
            }
        });

        Self {
            addr,
            connects,
            announces,
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("udp://{}/announce", self.addr)
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn announce_count(&self) -> usize {
        self.announces.load(Ordering::SeqCst)
    }
}

impl Drop for ScriptedUdpTracker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// HTTP tracker answering one request; the handle yields the request head.
pub struct OneShotHttpTracker {
    pub base: String,
    pub request: JoinHandle<String>,
}

impl OneShotHttpTracker {
    pub async fn spawn(status: &'static str, body: Vec<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let request = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let head = read_request_head(&mut stream).await;

            let mut response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            )
            .into_bytes();
            response.extend_from_slice(&body);
            stream.write_all(&response).await.unwrap();
            stream.shutdown().await.unwrap();
            head
        });

        Self { base, request }
    }

    pub fn announce_url(&self) -> String {
        format!("{}/announce", self.base)
    }
}

/// HTTP tracker that accepts connections and never answers.
pub async fn hanging_http_tracker() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/announce", listener.local_addr().unwrap());

    let task = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    (url, task)
}

/// Address nothing listens on, for refused connections.
pub async fn closed_tcp_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/announce")
}

async fn read_request_head(stream: &mut tokio::net::TcpStream) -> String {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|window| window == b"\r\n\r\n") {
        let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
            .await
            .unwrap()
            .unwrap();
        if read == 0 {
            break;
        }
        head.extend_from_slice(&buf[..read]);
    }
    String::from_utf8_lossy(&head).into_owned()
}
