//! BitTorrent tracker protocol utilities and constants

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use super::types::PeerList;
use crate::bencode::Value;
use crate::torrent::TrackerError;

/// BitTorrent tracker protocol constants
pub mod constants {
    /// Default tracker announce interval in seconds
    pub const DEFAULT_ANNOUNCE_INTERVAL: u32 = 1800;

    /// Minimum announce interval in seconds
    pub const MIN_ANNOUNCE_INTERVAL: u32 = 60;

    /// Compact IPv4 peer entry (4-byte address + 2-byte port)
    pub const COMPACT_PEER_SIZE: usize = 6;

    /// Compact IPv6 peer entry (16-byte address + 2-byte port)
    pub const COMPACT_PEER6_SIZE: usize = 18;
}

/// URL encoding utilities for tracker communication
pub mod encoding {
    /// Percent-encodes raw bytes for tracker query parameters.
    ///
    /// Info hashes and peer IDs are binary blobs, so every byte outside the
    /// RFC 3986 unreserved set is escaped individually; no UTF-8
    /// interpretation takes place.
    pub fn url_encode_bytes(bytes: &[u8]) -> String {
        urlencoding::encode_binary(bytes).into_owned()
    }

    /// Decodes a percent-encoded query value back to raw bytes.
    pub fn url_decode_bytes(encoded: &str) -> Vec<u8> {
        urlencoding::decode_binary(encoded.as_bytes()).into_owned()
    }
}

/// Parse compact IPv4 peer list (6 bytes per peer).
///
/// # Errors
/// - `TrackerError::MalformedData` - Length is not a multiple of 6 bytes
pub fn parse_compact_peers(peer_bytes: &[u8]) -> PeerList {
    if !peer_bytes.len().is_multiple_of(constants::COMPACT_PEER_SIZE) {
        return Err(TrackerError::MalformedData {
            reason: format!("Invalid compact peer data length {}", peer_bytes.len()),
        });
    }

    Ok(peer_bytes
        .chunks_exact(constants::COMPACT_PEER_SIZE)
        .map(|chunk| {
            let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
            let port = u16::from_be_bytes([chunk[4], chunk[5]]);
            SocketAddr::new(IpAddr::V4(ip), port)
        })
        .collect())
}

/// Parse compact IPv6 peer list (18 bytes per peer).
///
/// # Errors
/// - `TrackerError::MalformedData` - Length is not a multiple of 18 bytes
pub fn parse_compact_peers6(peer_bytes: &[u8]) -> PeerList {
    if !peer_bytes.len().is_multiple_of(constants::COMPACT_PEER6_SIZE) {
        return Err(TrackerError::MalformedData {
            reason: format!("Invalid compact IPv6 peer data length {}", peer_bytes.len()),
        });
    }

    Ok(peer_bytes
        .chunks_exact(constants::COMPACT_PEER6_SIZE)
        .map(|chunk| {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&chunk[..16]);
            let port = u16::from_be_bytes([chunk[16], chunk[17]]);
            SocketAddr::new(IpAddr::V6(Ipv6Addr::from(octets)), port)
        })
        .collect())
}

/// Parse the dictionary peer model: a list of `{peer id, ip, port}`.
///
/// Entries whose `ip` is not a literal address or whose port is out of
/// range are skipped; other entries in the list remain usable.
///
/// # Errors
/// - `TrackerError::MalformedData` - An entry is not a dictionary
pub fn parse_dictionary_peers(entries: &[Value]) -> PeerList {
    let mut peers = Vec::with_capacity(entries.len());

    for entry in entries {
        if entry.as_dictionary().is_none() {
            return Err(TrackerError::MalformedData {
                reason: "Peer list entry is not a dictionary".to_string(),
            });
        }

        let ip = entry
            .get(b"ip")
            .and_then(Value::as_str)
            .and_then(|text| text.parse::<IpAddr>().ok());
        let port = entry
            .get(b"port")
            .and_then(Value::as_integer)
            .and_then(|port| u16::try_from(port).ok());

        match (ip, port) {
            (Some(ip), Some(port)) => peers.push(SocketAddr::new(ip, port)),
            _ => tracing::trace!("Skipping peer entry without usable ip/port"),
        }
    }

    Ok(peers)
}
