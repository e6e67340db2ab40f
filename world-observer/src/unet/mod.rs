//! UDP reliable/ordered/fragmented transport demultiplexer.
//!
//! Strips the fixed packet headers, walks the combined/reliable/fragmented
//! sub-message stream, and for each emitted sub-message applies the
//! per-channel post-processing (fragment reassembly, reliable/ordered
//! header stripping) described in the protocol's channel table.

pub mod ack;
pub mod fragment;

use thiserror::Error;
use tracing::{debug, trace, warn};

pub use ack::AcksCache;
pub use fragment::{FragmentError, FragmentTable};

/// Highest addressable channel id: `3 + 102*2`, reflecting the engine's
/// channel table (3 reserved fragmented channels plus 102 reliable/
/// unreliable channel pairs).
pub const MAX_CHANNEL_ID: u8 = 207;

const RELIABLE_DELIMITER: u8 = 0xFF;
const COMBINED_DELIMITER: u8 = 0xFE;

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DemuxError {
    #[error("datagram truncated while reading sub-message header")]
    Truncated,
    #[error("channel id {0} exceeds max channel id {MAX_CHANNEL_ID}")]
    BadChannel(u8),
    #[error(transparent)]
    Fragment(#[from] FragmentError),
}

/// Direction of a datagram relative to the observed client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

/// A fully demultiplexed application payload ready for the [dispatcher](crate::dispatch),
/// already reassembled (if fragmented) and stripped of channel-level headers.
#[derive(Debug, Clone)]
pub struct DemuxedMessage {
    pub channel: u8,
    pub payload: Vec<u8>,
}

/// Read the 1-or-2-byte length prefix used both for the outer sub-message
/// walk and the reliable delimiter's declared body length: high bit of the
/// first byte set ⇒ a 2-byte big-endian 15-bit length, otherwise a literal
/// single byte.
fn read_length(data: &[u8]) -> Result<(u16, usize), DemuxError> {
    let high = *data.first().ok_or(DemuxError::Truncated)?;
    if high & 0x80 != 0 {
        let low = *data.get(1).ok_or(DemuxError::Truncated)?;
        Ok(((((high & 0x7F) as u16) << 8) | low as u16, 2))
    } else {
        Ok((high as u16, 1))
    }
}

/// Walk the sub-message stream of one datagram (after the fixed 24-byte
/// packet/acks header has already been stripped by the caller), emitting
/// `(channel, body)` pairs in wire order. `acks` is the direction-appropriate
/// ack cache used both for the reliable-delimiter dedup and the per-channel
/// reliable stream dedup.
fn walk_submessages<'a>(
    mut data: &'a [u8],
    acks: &mut AcksCache,
) -> Result<Vec<(u8, &'a [u8])>, DemuxError> {
    let mut out = Vec::new();

    loop {
        if data.is_empty() {
            break;
        }

        let marker = data[0];

        if marker == RELIABLE_DELIMITER {
            let rest = &data[1..];
            let channel = *rest.first().ok_or(DemuxError::Truncated)?;
            let (len, len_bytes) = read_length(&rest[1..])?;
            let header_len = 1 + len_bytes;
            let msg_id_off = header_len;
            if rest.len() < msg_id_off + 2 {
                return Err(DemuxError::Truncated);
            }
            let msg_id = u16::from_be_bytes([rest[msg_id_off], rest[msg_id_off + 1]]);
            let body_off = msg_id_off + 2;
            let body_end = body_off + len as usize;
            if rest.len() < body_end {
                return Err(DemuxError::Truncated);
            }
            let body = &rest[body_off..body_end];

            if acks.read_message(msg_id) {
                out.push((channel, body));
            } else {
                trace!(msg_id, "dropping duplicate reliable sub-message");
            }

            data = &rest[body_end..];
            continue;
        }

        let channel_off;
        if marker == COMBINED_DELIMITER {
            channel_off = 1;
        } else {
            channel_off = 0;
        }

        let channel = *data.get(channel_off).ok_or(DemuxError::Truncated)?;
        if channel > MAX_CHANNEL_ID {
            return Err(DemuxError::BadChannel(channel));
        }

        let len_off = channel_off + 1;
        let (len, len_bytes) = read_length(&data[len_off..])?;
        let body_off = len_off + len_bytes;
        let body_end = body_off + len as usize;
        if data.len() < body_end {
            return Err(DemuxError::Truncated);
        }

        out.push((channel, &data[body_off..body_end]));
        data = &data[body_end..];
    }

    Ok(out)
}

/// Apply per-channel post-processing to one emitted sub-message: fragment
/// reassembly for channels 0-2, reliable/ordered header stripping with ack
/// dedup otherwise. Returns `None` if the message was a duplicate or an
/// incomplete fragment.
fn postprocess_channel(
    channel: u8,
    body: &[u8],
    acks: &mut AcksCache,
    fragments: &mut FragmentTable,
) -> Result<Option<DemuxedMessage>, DemuxError> {
    if channel <= 2 {
        if body.len() < 3 {
            return Err(DemuxError::Truncated);
        }
        let id = body[0];
        let index = body[1];
        let count = body[2];
        let payload = body[3..].to_vec();
        match fragments.insert(channel, id, index, count, payload)? {
            Some(assembled) => {
                debug!(channel, id, "fragment reassembly complete");
                Ok(Some(DemuxedMessage { channel, payload: assembled }))
            }
            None => Ok(None),
        }
    } else if channel % 2 == 1 {
        if body.len() < 3 {
            return Err(DemuxError::Truncated);
        }
        let msg_id = u16::from_be_bytes([body[0], body[1]]);
        if acks.read_message(msg_id) {
            Ok(Some(DemuxedMessage { channel, payload: body[3..].to_vec() }))
        } else {
            trace!(channel, msg_id, "dropping duplicate channel-reliable message");
            Ok(None)
        }
    } else {
        if body.len() < 3 {
            return Err(DemuxError::Truncated);
        }
        Ok(Some(DemuxedMessage { channel, payload: body[3..].to_vec() }))
    }
}

/// Demultiplex one datagram (already stripped of the 24-byte packet/acks
/// header) into zero or more complete application payloads.
pub fn demux(
    data: &[u8],
    acks: &mut AcksCache,
    fragments: &mut FragmentTable,
) -> Result<Vec<DemuxedMessage>, DemuxError> {
    let mut out = Vec::new();
    for (channel, body) in walk_submessages(data, acks)? {
        match postprocess_channel(channel, body, acks, fragments) {
            Ok(Some(msg)) => out.push(msg),
            Ok(None) => {}
            Err(e) => {
                warn!(channel, error = %e, "rejecting sub-message");
                if matches!(e, DemuxError::BadChannel(_)) {
                    return Err(e);
                }
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain_message(channel: u8, body: &[u8]) -> Vec<u8> {
        let mut out = vec![channel, body.len() as u8];
        out.extend_from_slice(body);
        out
    }

    #[test]
    fn plain_even_channel_strips_three_byte_header() {
        let mut acks = AcksCache::new("IN");
        let mut frags = FragmentTable::new();
        // Channel 4 (even, unreliable-ordered): 3-byte header + payload.
        let datagram = plain_message(4, &[0, 0, 0, 1, 2, 3]);
        let out = demux(&datagram, &mut acks, &mut frags).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].channel, 4);
        assert_eq!(out[0].payload, vec![1, 2, 3]);
    }

    #[test]
    fn odd_channel_dedups_by_message_id() {
        let mut acks = AcksCache::new("IN");
        let mut frags = FragmentTable::new();
        let datagram = plain_message(5, &[0, 0, 0, 9, 9]);
        let out1 = demux(&datagram, &mut acks, &mut frags).unwrap();
        assert_eq!(out1.len(), 1);
        let out2 = demux(&datagram, &mut acks, &mut frags).unwrap();
        assert!(out2.is_empty(), "duplicate message id must be dropped");
    }

    #[test]
    fn bad_channel_aborts_walk() {
        let mut acks = AcksCache::new("IN");
        let mut frags = FragmentTable::new();
        let datagram = plain_message(255 - 1, &[0]); // channel 254 > 207, but not a delimiter byte
        let err = demux(&datagram, &mut acks, &mut frags).unwrap_err();
        assert!(matches!(err, DemuxError::BadChannel(254)));
    }

    #[test]
    fn combined_delimiter_uses_following_byte_as_channel() {
        let mut acks = AcksCache::new("IN");
        let mut frags = FragmentTable::new();
        let mut datagram = vec![COMBINED_DELIMITER];
        datagram.extend(plain_message(4, &[0, 0, 0, 7]));
        let out = demux(&datagram, &mut acks, &mut frags).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].channel, 4);
        assert_eq!(out[0].payload, vec![7]);
    }

    #[test]
    fn fragmented_channel_reassembles_after_all_parts() {
        let mut acks = AcksCache::new("IN");
        let mut frags = FragmentTable::new();

        let mut datagram = Vec::new();
        // Channel 0, fragment id 1, index 0 of 2.
        datagram.extend(plain_message(0, &[1, 0, 2, b'h', b'i']));
        let out = demux(&datagram, &mut acks, &mut frags).unwrap();
        assert!(out.is_empty());

        let mut datagram2 = Vec::new();
        datagram2.extend(plain_message(0, &[1, 1, 2, b'!', b'!']));
        let out2 = demux(&datagram2, &mut acks, &mut frags).unwrap();
        assert_eq!(out2.len(), 1);
        assert_eq!(out2[0].payload, b"hi!!");
    }

    #[test]
    fn reliable_delimiter_dedups_and_emits_body() {
        let mut acks = AcksCache::new("IN");
        let mut frags = FragmentTable::new();

        // Delimiter-level header (channel 3, len=4, outer msg id 1234),
        // wrapping channel 3's own odd-channel reliable body: inner msg id
        // 99, ordered byte, single payload byte.
        let mut datagram = vec![RELIABLE_DELIMITER, 3, 4];
        datagram.extend_from_slice(&1234u16.to_be_bytes());
        datagram.extend_from_slice(&99u16.to_be_bytes());
        datagram.push(0); // ordered
        datagram.push(42); // payload

        let out = demux(&datagram, &mut acks, &mut frags).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].channel, 3);
        assert_eq!(out[0].payload, vec![42]);

        // Re-sending the same outer msg id must be deduped before the inner
        // body is even looked at.
        let out2 = demux(&datagram, &mut acks, &mut frags).unwrap();
        assert!(out2.is_empty());
    }
}
