//! Tracker-relevant fields of a `.torrent` file: tier list and info hash

use sha1::{Digest, Sha1};

use super::tracker::TierList;
use super::{InfoHash, TrackerError};
use crate::bencode::{self, Decoder, Value};

/// What the announce layer needs from torrent metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metainfo {
    pub info_hash: InfoHash,
    pub name: Option<String>,
    pub tiers: TierList,
}

impl Metainfo {
    /// Parses torrent bytes.
    ///
    /// The info hash is the SHA-1 of the `info` value exactly as it appears
    /// in the file. Tiers come from `announce-list` (BEP 12) when it holds
    /// any usable URL, otherwise from `announce` as a single tier.
    ///
    /// # Errors
    ///
    /// - `TrackerError::InvalidTorrent` - If bencode parsing or field extraction failed
    pub fn from_bytes(torrent_bytes: &[u8]) -> Result<Self, TrackerError> {
        let root = Decoder::lenient()
            .decode(torrent_bytes)
            .map_err(|e| invalid(format!("Bencode parsing failed: {e}")))?;

        if root.as_dictionary().is_none() {
            return Err(invalid("Root element must be dictionary"));
        }

        let info = root.get(b"info").ok_or_else(|| invalid("Missing 'info' field"))?;
        let name = info
            .get(b"name")
            .and_then(Value::as_str)
            .map(str::to_string);

        let info_range = bencode::find_raw_entry(torrent_bytes, b"info")
            .map_err(|e| invalid(format!("Bencode parsing failed: {e}")))?
            .ok_or_else(|| invalid("Missing 'info' field"))?;
        let info_hash = InfoHash::new(Sha1::digest(&torrent_bytes[info_range]).into());

        let tiers = Self::extract_tiers(&root);
        if tiers.is_empty() {
            return Err(invalid("No announce URLs found"));
        }

        tracing::debug!(
            "Parsed torrent {} with {} trackers in {} tiers",
            info_hash,
            tiers.tracker_count(),
            tiers.tier_count()
        );

        Ok(Self {
            info_hash,
            name,
            tiers,
        })
    }

    fn extract_tiers(root: &Value) -> TierList {
        let announce_list: Vec<Vec<String>> = root
            .get(b"announce-list")
            .and_then(Value::as_list)
            .unwrap_or_default()
            .iter()
            .filter_map(Value::as_list)
            .map(|tier| {
                tier.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|tier| !tier.is_empty())
            .collect();

        if !announce_list.is_empty() {
            return TierList::new(announce_list);
        }

        root.get(b"announce")
            .and_then(Value::as_str)
            .map(TierList::single)
            .unwrap_or_default()
    }
}

fn invalid(reason: impl Into<String>) -> TrackerError {
    TrackerError::InvalidTorrent {
        reason: reason.into(),
    }
}
