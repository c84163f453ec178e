//! Decoder for the raw notification stream.
//!
//! The event source hands back byte buffers holding a packed sequence of
//! variable-length records in the inotify wire layout: a fixed 16-byte
//! little-endian header followed by a NUL-padded filename payload whose
//! length the header declares.
//!
//! ```text
//! [wd: i32][mask: u32][cookie: u32][len: u32][name: len bytes, NUL padded]
//! ```
//!
//! Decoding is pure and stateless across calls: each call operates on a
//! self-contained buffer and the source guarantees buffers are aligned on
//! whole records. The cursor never advances past the buffer end; a trailing
//! record the buffer cannot hold is reported as a [`DecodeError`], never
//! silently skipped or guessed at.

use crate::error::DecodeError;
use crate::event::{ChangeEvent, EventMask, WatchId};

/// Size of the fixed per-record header.
pub const HEADER_SIZE: usize = 16;

fn read_i32(buf: &[u8], at: usize) -> i32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[at..at + 4]);
    i32::from_le_bytes(raw)
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[at..at + 4]);
    u32::from_le_bytes(raw)
}

/// Decodes a whole-record-aligned buffer into structured change events.
///
/// A payload length of zero is valid and yields a directory-level event with
/// no name. An empty buffer decodes to an empty vector.
///
/// # Errors
///
/// - [`DecodeError::TruncatedHeader`] if a record starts with fewer than
///   [`HEADER_SIZE`] bytes remaining.
/// - [`DecodeError::TruncatedRecord`] if the header claims more payload
///   bytes than the buffer holds.
/// - [`DecodeError::InvalidName`] if the name payload is not valid UTF-8.
pub fn decode(buf: &[u8]) -> Result<Vec<ChangeEvent>, DecodeError> {
    let mut events = Vec::new();
    let mut cursor = 0usize;

    while cursor < buf.len() {
        let remaining = buf.len() - cursor;
        if remaining < HEADER_SIZE {
            return Err(DecodeError::TruncatedHeader {
                offset: cursor,
                remaining,
                header_size: HEADER_SIZE,
            });
        }

        let wd = read_i32(buf, cursor);
        let mask = read_u32(buf, cursor + 4);
        let cookie = read_u32(buf, cursor + 8);
        let len = read_u32(buf, cursor + 12) as usize;

        let payload_start = cursor + HEADER_SIZE;
        let payload_remaining = buf.len() - payload_start;
        if len > payload_remaining {
            return Err(DecodeError::TruncatedRecord {
                offset: cursor,
                claimed: len,
                remaining: payload_remaining,
            });
        }

        let name = if len == 0 {
            None
        } else {
            let payload = &buf[payload_start..payload_start + len];
            // The kernel pads names with NULs out to an alignment boundary;
            // the name ends at the first NUL.
            let end = payload.iter().position(|&b| b == 0).unwrap_or(len);
            if end == 0 {
                None
            } else {
                match std::str::from_utf8(&payload[..end]) {
                    Ok(s) => Some(s.to_string()),
                    Err(_) => return Err(DecodeError::InvalidName { offset: cursor }),
                }
            }
        };

        events.push(ChangeEvent {
            id: WatchId::new(wd),
            mask: EventMask::from_raw(mask),
            cookie,
            name,
        });

        cursor = payload_start + len;
    }

    Ok(events)
}

/// Encodes one record in the wire layout.
///
/// The inverse of [`decode`] for a single record; used by scripted event
/// sources and tests to build well-formed buffers.
#[must_use]
pub fn encode_record(id: WatchId, mask: EventMask, cookie: u32, name: Option<&str>) -> Vec<u8> {
    let payload = name.map_or(&[] as &[u8], str::as_bytes);
    // Pad the payload with a trailing NUL as the kernel does, unless empty.
    let len = if payload.is_empty() {
        0
    } else {
        payload.len() + 1
    };

    let mut out = Vec::with_capacity(HEADER_SIZE + len);
    out.extend_from_slice(&id.raw().to_le_bytes());
    out.extend_from_slice(&mask.raw().to_le_bytes());
    out.extend_from_slice(&cookie.to_le_bytes());
    out.extend_from_slice(&u32::try_from(len).unwrap_or(u32::MAX).to_le_bytes());
    out.extend_from_slice(payload);
    if len > 0 {
        out.push(0);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_buffer_decodes_to_no_events() {
        assert_eq!(decode(&[]).unwrap(), Vec::new());
    }

    #[test]
    fn concatenated_records_decode_in_order() {
        let mut buf = encode_record(WatchId::new(3), EventMask::CREATED, 0, Some("a"));
        buf.extend(encode_record(WatchId::new(7), EventMask::MODIFIED, 0, Some("cron")));
        buf.extend(encode_record(WatchId::new(3), EventMask::DELETED, 0, None));

        let events = decode(&buf).unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].id, WatchId::new(3));
        assert_eq!(events[0].name.as_deref(), Some("a"));
        assert_eq!(events[1].id, WatchId::new(7));
        assert_eq!(events[1].mask, EventMask::MODIFIED);
        assert_eq!(events[1].name.as_deref(), Some("cron"));
        assert_eq!(events[2].name, None);
    }

    #[test]
    fn zero_length_payload_is_a_directory_level_event() {
        let buf = encode_record(WatchId::new(5), EventMask::METADATA, 0, None);
        assert_eq!(buf.len(), HEADER_SIZE);
        let events = decode(&buf).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, None);
    }

    #[test]
    fn name_is_trimmed_at_first_nul() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&3i32.to_le_bytes());
        buf.extend_from_slice(&EventMask::CREATED.raw().to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&8u32.to_le_bytes());
        buf.extend_from_slice(b"abc\0\0\0\0\0");

        let events = decode(&buf).unwrap();
        assert_eq!(events[0].name.as_deref(), Some("abc"));
    }

    #[test]
    fn truncated_final_record_by_one_byte_is_an_error() {
        let mut buf = encode_record(WatchId::new(3), EventMask::CREATED, 0, Some("a"));
        buf.extend(encode_record(WatchId::new(7), EventMask::MODIFIED, 0, Some("file")));
        buf.pop();

        let err = decode(&buf).unwrap_err();
        assert!(matches!(err, DecodeError::TruncatedRecord { claimed: 5, .. }));
    }

    #[test]
    fn short_trailing_header_is_an_error() {
        let mut buf = encode_record(WatchId::new(3), EventMask::CREATED, 0, None);
        buf.extend_from_slice(&[1, 2, 3]);

        let err = decode(&buf).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TruncatedHeader {
                offset: HEADER_SIZE,
                remaining: 3,
                header_size: HEADER_SIZE,
            }
        );
    }

    #[test]
    fn header_claiming_more_than_buffer_is_an_error_not_an_overrun() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&3i32.to_le_bytes());
        buf.extend_from_slice(&EventMask::CREATED.raw().to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&1024u32.to_le_bytes());
        buf.extend_from_slice(b"xy");

        let err = decode(&buf).unwrap_err();
        assert_eq!(
            err,
            DecodeError::TruncatedRecord {
                offset: 0,
                claimed: 1024,
                remaining: 2,
            }
        );
    }

    #[test]
    fn non_utf8_name_is_rejected_with_offset() {
        let first = encode_record(WatchId::new(1), EventMask::CREATED, 0, Some("ok"));
        let offset = first.len();

        let mut buf = first;
        buf.extend_from_slice(&2i32.to_le_bytes());
        buf.extend_from_slice(&EventMask::CREATED.raw().to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&4u32.to_le_bytes());
        buf.extend_from_slice(&[0xff, 0xfe, 0x01, 0x00]);

        let err = decode(&buf).unwrap_err();
        assert_eq!(err, DecodeError::InvalidName { offset });
    }

    #[test]
    fn move_pair_cookie_round_trips() {
        let mut buf = encode_record(WatchId::new(4), EventMask::MOVED_FROM, 99, Some("old"));
        buf.extend(encode_record(WatchId::new(4), EventMask::MOVED_TO, 99, Some("new")));

        let events = decode(&buf).unwrap();
        assert_eq!(events[0].cookie, 99);
        assert_eq!(events[1].cookie, 99);
    }

    #[test]
    fn overflow_record_uses_sentinel_descriptor() {
        let buf = encode_record(WatchId::new(-1), EventMask::QUEUE_OVERFLOW, 0, None);
        let events = decode(&buf).unwrap();
        assert!(events[0].is_overflow());
        assert_eq!(events[0].id.raw(), -1);
    }
}
