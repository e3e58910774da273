//! Binary layouts of UDP tracker packets (BEP 15). All integers are big-endian.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::torrent::tracker::protocol::{self, constants};
use crate::torrent::tracker::types::ScrapeStats;
use crate::torrent::{InfoHash, PeerId, TrackerError};

/// Magic connection ID carried by every connect request.
pub const PROTOCOL_ID: u64 = 0x41727101980;

pub const CONNECT_REQUEST_SIZE: usize = 16;
pub const CONNECT_RESPONSE_SIZE: usize = 16;
pub const ANNOUNCE_REQUEST_SIZE: usize = 98;
pub const ANNOUNCE_RESPONSE_HEADER_SIZE: usize = 20;
pub const SCRAPE_RESPONSE_ENTRY_SIZE: usize = 12;
/// Action + transaction ID, the prefix shared by every response.
pub const RESPONSE_HEADER_SIZE: usize = 8;
/// Largest number of info hashes one scrape packet may carry.
pub const MAX_SCRAPE_HASHES: usize = 74;

pub type TransactionId = u32;
pub type ConnectionId = u64;

/// Action codes shared by requests and responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Connect = 0,
    Announce = 1,
    Scrape = 2,
    Error = 3,
}

impl TryFrom<u32> for Action {
    type Error = TrackerError;

    fn try_from(code: u32) -> Result<Self, TrackerError> {
        match code {
            0 => Ok(Action::Connect),
            1 => Ok(Action::Announce),
            2 => Ok(Action::Scrape),
            3 => Ok(Action::Error),
            other => Err(TrackerError::MalformedData {
                reason: format!("Unknown UDP tracker action {other}"),
            }),
        }
    }
}

/// Fields of a UDP announce request following the connection header.
#[derive(Debug, Clone, Copy)]
pub struct AnnouncePacket {
    pub connection_id: ConnectionId,
    pub transaction_id: TransactionId,
    pub info_hash: InfoHash,
    pub peer_id: PeerId,
    pub downloaded: u64,
    pub left: u64,
    pub uploaded: u64,
    pub event: u32,
    /// 0 asks the tracker to use the packet's source address
    pub ip: u32,
    pub key: u32,
    /// -1 lets the tracker choose
    pub num_want: i32,
    pub port: u16,
}

pub fn encode_connect(transaction_id: TransactionId) -> Bytes {
    let mut buf = BytesMut::with_capacity(CONNECT_REQUEST_SIZE);
    buf.put_u64(PROTOCOL_ID);
    buf.put_u32(Action::Connect as u32);
    buf.put_u32(transaction_id);
    buf.freeze()
}

pub fn encode_announce(packet: &AnnouncePacket) -> Bytes {
    let mut buf = BytesMut::with_capacity(ANNOUNCE_REQUEST_SIZE);
    buf.put_u64(packet.connection_id);
    buf.put_u32(Action::Announce as u32);
    buf.put_u32(packet.transaction_id);
    buf.put_slice(packet.info_hash.as_bytes());
    buf.put_slice(packet.peer_id.as_bytes());
    buf.put_u64(packet.downloaded);
    buf.put_u64(packet.left);
    buf.put_u64(packet.uploaded);
    buf.put_u32(packet.event);
    buf.put_u32(packet.ip);
    buf.put_u32(packet.key);
    buf.put_i32(packet.num_want);
    buf.put_u16(packet.port);
    buf.freeze()
}

pub fn encode_scrape(
    connection_id: ConnectionId,
    transaction_id: TransactionId,
    info_hashes: &[InfoHash],
) -> Bytes {
    let mut buf = BytesMut::with_capacity(16 + 20 * info_hashes.len());
    buf.put_u64(connection_id);
    buf.put_u32(Action::Scrape as u32);
    buf.put_u32(transaction_id);
    for info_hash in info_hashes {
        buf.put_slice(info_hash.as_bytes());
    }
    buf.freeze()
}

/// Reads the transaction ID of a datagram without validating the rest.
pub fn peek_transaction_id(datagram: &[u8]) -> Option<TransactionId> {
    let bytes = datagram.get(4..8)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Decoded tracker reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Connect {
        transaction_id: TransactionId,
        connection_id: ConnectionId,
    },
    Announce {
        transaction_id: TransactionId,
        interval: u32,
        leechers: u32,
        seeders: u32,
        peers: Vec<std::net::SocketAddr>,
    },
    Scrape {
        transaction_id: TransactionId,
        stats: Vec<ScrapeStats>,
    },
    Error {
        transaction_id: TransactionId,
        message: String,
    },
}

impl Response {
    /// Parses a reply datagram.
    ///
    /// # Errors
    ///
    /// - `TrackerError::MalformedData` - Unknown action or truncated packet
    pub fn parse(datagram: &[u8]) -> Result<Self, TrackerError> {
        if datagram.len() < RESPONSE_HEADER_SIZE {
            return Err(truncated("header", datagram.len()));
        }

        let mut buf = datagram;
        let action = Action::try_from(buf.get_u32())?;
        let transaction_id = buf.get_u32();

        match action {
            Action::Connect => {
                if datagram.len() < CONNECT_RESPONSE_SIZE {
                    return Err(truncated("connect response", datagram.len()));
                }
                Ok(Response::Connect {
                    transaction_id,
                    connection_id: buf.get_u64(),
                })
            }
            Action::Announce => {
                if datagram.len() < ANNOUNCE_RESPONSE_HEADER_SIZE {
                    return Err(truncated("announce response", datagram.len()));
                }
                let interval = buf.get_u32();
                let leechers = buf.get_u32();
                let seeders = buf.get_u32();
                // Trailing bytes short of a full entry are ignored.
                let usable = buf.len() - buf.len() % constants::COMPACT_PEER_SIZE;
                let peers = protocol::parse_compact_peers(&buf[..usable])?;
                Ok(Response::Announce {
                    transaction_id,
                    interval,
                    leechers,
                    seeders,
                    peers,
                })
            }
            Action::Scrape => {
                let stats = buf
                    .chunks_exact(SCRAPE_RESPONSE_ENTRY_SIZE)
                    .map(|mut entry| ScrapeStats {
                        complete: entry.get_u32(),
                        downloaded: entry.get_u32(),
                        incomplete: entry.get_u32(),
                    })
                    .collect();
                Ok(Response::Scrape {
                    transaction_id,
                    stats,
                })
            }
            Action::Error => Ok(Response::Error {
                transaction_id,
                message: String::from_utf8_lossy(buf)
                    .trim_end_matches('\0')
                    .to_string(),
            }),
        }
    }
}

fn truncated(what: &str, length: usize) -> TrackerError {
    TrackerError::MalformedData {
        reason: format!("Truncated UDP {what}: {length} bytes"),
    }
}
