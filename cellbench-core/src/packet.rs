//! Datagrams and out-of-band packet metadata.
//!
//! Packets carry a payload size and a list of metadata tags. Tags travel
//! beside the payload and never count toward the measured packet size, so
//! instrumenting a flow does not change its throughput.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::time::SimTime;

/// Encoded length of a timestamp tag.
pub const TIMESTAMP_TAG_LEN: usize = 8;

/// Non-fatal failures when reading or writing packet metadata.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    /// Packet carries no tag of the requested kind
    #[error("Packet carries no {kind:?} tag")]
    Missing {
        /// Kind that was looked up
        kind: TagKind,
    },

    /// Tag bytes do not match the fixed-width encoding
    #[error("Malformed {kind:?} tag: expected {expected} bytes, found {len}")]
    Malformed {
        /// Kind being decoded
        kind: TagKind,
        /// Required encoded length
        expected: usize,
        /// Actual encoded length
        len: usize,
    },

    /// Packet already carries a tag of this kind
    #[error("Packet already carries a {kind:?} tag")]
    AlreadyTagged {
        /// Kind that was already present
        kind: TagKind,
    },
}

/// Discriminant of a metadata tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagKind {
    /// Send-time stamp written by the timestamp tagger
    Timestamp,
}

/// Send-time stamp attached to a generated packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampTag {
    sent_at: SimTime,
}

impl TimestampTag {
    /// Creates a tag for a packet sent at `sent_at`.
    pub fn new(sent_at: SimTime) -> Self {
        Self { sent_at }
    }

    /// Simulation time at which the packet left the generator.
    pub fn sent_at(&self) -> SimTime {
        self.sent_at
    }
}

/// Metadata tag variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketTag {
    Timestamp(TimestampTag),
}

impl PacketTag {
    /// Returns the discriminant of this tag.
    pub fn kind(&self) -> TagKind {
        match self {
            PacketTag::Timestamp(_) => TagKind::Timestamp,
        }
    }

    /// Encodes the tag body.
    ///
    /// A timestamp is an unsigned 64-bit nanosecond count, little-endian.
    pub fn encode(&self) -> Bytes {
        match self {
            PacketTag::Timestamp(tag) => {
                let mut buf = BytesMut::with_capacity(TIMESTAMP_TAG_LEN);
                buf.put_u64_le(tag.sent_at.as_nanos());
                buf.freeze()
            }
        }
    }

    /// Decodes a tag body of the given kind.
    ///
    /// # Errors
    ///
    /// - `TagError::Malformed` - Body length does not match the kind's fixed width
    pub fn decode(kind: TagKind, body: &[u8]) -> Result<Self, TagError> {
        match kind {
            TagKind::Timestamp => {
                if body.len() != TIMESTAMP_TAG_LEN {
                    return Err(TagError::Malformed {
                        kind,
                        expected: TIMESTAMP_TAG_LEN,
                        len: body.len(),
                    });
                }
                let mut cursor = body;
                let nanos = cursor.get_u64_le();
                Ok(PacketTag::Timestamp(TimestampTag::new(SimTime::from_nanos(
                    nanos,
                ))))
            }
        }
    }
}

/// Monotonic packet identifier assigned by the generator.
pub type PacketUid = u64;

/// A datagram in flight through the simulated data path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    uid: PacketUid,
    size: u32,
    metadata: Vec<(TagKind, Bytes)>,
}

impl Packet {
    /// Creates an untagged packet with `size` payload bytes.
    pub fn new(uid: PacketUid, size: u32) -> Self {
        Self {
            uid,
            size,
            metadata: Vec::new(),
        }
    }

    pub fn uid(&self) -> PacketUid {
        self.uid
    }

    /// Payload size in bytes. Metadata is excluded.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Attaches a tag as out-of-band metadata.
    ///
    /// # Errors
    ///
    /// - `TagError::AlreadyTagged` - A tag of the same kind is already attached
    pub fn add_tag(&mut self, tag: PacketTag) -> Result<(), TagError> {
        let kind = tag.kind();
        if self.metadata.iter().any(|(existing, _)| *existing == kind) {
            return Err(TagError::AlreadyTagged { kind });
        }
        self.metadata.push((kind, tag.encode()));
        Ok(())
    }

    /// Reads a tag without removing it.
    ///
    /// # Errors
    ///
    /// - `TagError::Missing` - No tag of this kind is attached
    /// - `TagError::Malformed` - The attached bytes cannot be decoded
    pub fn peek_tag(&self, kind: TagKind) -> Result<PacketTag, TagError> {
        let (_, body) = self
            .metadata
            .iter()
            .find(|(existing, _)| *existing == kind)
            .ok_or(TagError::Missing { kind })?;
        PacketTag::decode(kind, body)
    }

    /// Reads the send-time stamp.
    ///
    /// # Errors
    ///
    /// - `TagError::Missing` - Packet was not instrumented or lost its metadata
    /// - `TagError::Malformed` - The attached bytes cannot be decoded
    pub fn timestamp(&self) -> Result<TimestampTag, TagError> {
        match self.peek_tag(TagKind::Timestamp)? {
            PacketTag::Timestamp(tag) => Ok(tag),
        }
    }

    /// Returns true if any metadata is attached.
    pub fn is_tagged(&self) -> bool {
        !self.metadata.is_empty()
    }

    /// Drops every metadata tag, as a hop that does not propagate metadata would.
    pub fn strip_metadata(&mut self) {
        self.metadata.clear();
    }

    #[cfg(test)]
    pub(crate) fn insert_raw_tag(&mut self, kind: TagKind, body: Bytes) {
        self.metadata.push((kind, body));
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_timestamp_tag_encoding_is_eight_bytes_little_endian() {
        let tag = PacketTag::Timestamp(TimestampTag::new(SimTime::from_nanos(0x0102_0304)));
        let encoded = tag.encode();

        assert_eq!(encoded.len(), TIMESTAMP_TAG_LEN);
        assert_eq!(&encoded[..], &[0x04, 0x03, 0x02, 0x01, 0, 0, 0, 0]);
    }

    #[test]
    fn test_tag_does_not_change_payload_size() {
        let mut packet = Packet::new(1, 512);
        packet
            .add_tag(PacketTag::Timestamp(TimestampTag::new(SimTime::from_millis(2))))
            .unwrap();

        assert_eq!(packet.size(), 512);
        assert!(packet.is_tagged());
        assert_eq!(packet.timestamp().unwrap().sent_at(), SimTime::from_millis(2));
    }

    #[test]
    fn test_packet_is_never_retagged() {
        let mut packet = Packet::new(1, 512);
        let first = PacketTag::Timestamp(TimestampTag::new(SimTime::from_millis(1)));
        let second = PacketTag::Timestamp(TimestampTag::new(SimTime::from_millis(5)));

        packet.add_tag(first).unwrap();
        assert_eq!(
            packet.add_tag(second),
            Err(TagError::AlreadyTagged {
                kind: TagKind::Timestamp
            })
        );
        assert_eq!(packet.timestamp().unwrap().sent_at(), SimTime::from_millis(1));
    }

    #[test]
    fn test_missing_and_stripped_tags() {
        let mut packet = Packet::new(7, 1500);
        assert_eq!(
            packet.timestamp(),
            Err(TagError::Missing {
                kind: TagKind::Timestamp
            })
        );

        packet
            .add_tag(PacketTag::Timestamp(TimestampTag::new(SimTime::from_millis(1))))
            .unwrap();
        packet.strip_metadata();
        assert!(!packet.is_tagged());
        assert!(matches!(packet.timestamp(), Err(TagError::Missing { .. })));
    }

    #[test]
    fn test_truncated_tag_is_malformed() {
        let mut packet = Packet::new(3, 64);
        packet.insert_raw_tag(TagKind::Timestamp, Bytes::from_static(&[1, 2, 3]));

        assert_eq!(
            packet.timestamp(),
            Err(TagError::Malformed {
                kind: TagKind::Timestamp,
                expected: TIMESTAMP_TAG_LEN,
                len: 3
            })
        );
    }

    proptest! {
        #[test]
        fn prop_timestamp_survives_encoding(nanos in any::<u64>()) {
            let tag = PacketTag::Timestamp(TimestampTag::new(SimTime::from_nanos(nanos)));
            let decoded = PacketTag::decode(TagKind::Timestamp, &tag.encode()).unwrap();
            prop_assert_eq!(decoded, tag);
        }
    }
}
