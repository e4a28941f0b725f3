//! Backend-agnostic record encoding (spec §6's persisted state layout),
//! little-endian throughout:
//!
//! `[u32 length][u8 version][u8 state][u16 flags][u64 trace_id_low]`
//! `[u64 trace_id_high][u64 enqueue_time_ns][u32 attempts][u32 method_len]`
//! `[method bytes][u32 path_len][path bytes][u32 headers_len][headers bytes]`
//! `[u64 body_len][body bytes][u32 crc32c]`
//!
//! `length` covers everything from `version` through the body, exclusive of
//! the trailing checksum. A record is valid iff the trailing CRC32C matches;
//! a storage backend scanning a segment stops at the first invalid record
//! and truncates to that offset rather than attempting to resync.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use stellane_types::{JournalEntry, JournalState, RequestFingerprint, TraceId};

use crate::error::{JournalError, Result};

const WIRE_VERSION: u8 = 1;

fn state_tag(state: JournalState) -> u8 {
    match state {
        JournalState::Pending => 0,
        JournalState::InFlight => 1,
        JournalState::Completed => 2,
        JournalState::Failed => 3,
    }
}

fn state_from_tag(tag: u8) -> Result<JournalState> {
    match tag {
        0 => Ok(JournalState::Pending),
        1 => Ok(JournalState::InFlight),
        2 => Ok(JournalState::Completed),
        3 => Ok(JournalState::Failed),
        other => Err(JournalError::Corrupt(format!("unknown state tag {other}"))),
    }
}

fn encode_headers(headers: &[(String, String)]) -> Vec<u8> {
    let mut buf = Vec::new();
    for (k, v) in headers {
        buf.extend_from_slice(&(k.len() as u32).to_le_bytes());
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(&(v.len() as u32).to_le_bytes());
        buf.extend_from_slice(v.as_bytes());
    }
    buf
}

fn decode_headers(buf: &[u8]) -> Result<Vec<(String, String)>> {
    let mut headers = Vec::new();
    let mut pos = 0;
    while pos < buf.len() {
        let (k, next) = read_len_prefixed(buf, pos)?;
        pos = next;
        let (v, next) = read_len_prefixed(buf, pos)?;
        pos = next;
        headers.push((
            String::from_utf8(k).map_err(|e| JournalError::Corrupt(e.to_string()))?,
            String::from_utf8(v).map_err(|e| JournalError::Corrupt(e.to_string()))?,
        ));
    }
    Ok(headers)
}

fn read_len_prefixed(buf: &[u8], pos: usize) -> Result<(Vec<u8>, usize)> {
    let len_bytes = buf
        .get(pos..pos + 4)
        .ok_or_else(|| JournalError::Corrupt("truncated header length".into()))?;
    let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
    let start = pos + 4;
    let bytes = buf
        .get(start..start + len)
        .ok_or_else(|| JournalError::Corrupt("truncated header value".into()))?
        .to_vec();
    Ok((bytes, start + len))
}

/// Encodes `entry` into its durable wire form, trailer included.
pub fn encode(entry: &JournalEntry) -> Vec<u8> {
    let (trace_lo, trace_hi) = entry.trace_id.to_parts();
    let enqueue_ns = entry
        .enqueued_at
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64;

    let method = entry.fingerprint.method.as_bytes();
    let path = entry.fingerprint.path.as_bytes();
    let headers = encode_headers(&entry.fingerprint.headers);
    let body = &entry.fingerprint.body;

    let mut body_section = Vec::new();
    body_section.push(WIRE_VERSION);
    body_section.push(state_tag(entry.state));
    body_section.extend_from_slice(&0u16.to_le_bytes()); // flags, reserved
    body_section.extend_from_slice(&trace_lo.to_le_bytes());
    body_section.extend_from_slice(&trace_hi.to_le_bytes());
    body_section.extend_from_slice(&enqueue_ns.to_le_bytes());
    body_section.extend_from_slice(&entry.attempts.to_le_bytes());
    body_section.extend_from_slice(&(method.len() as u32).to_le_bytes());
    body_section.extend_from_slice(method);
    body_section.extend_from_slice(&(path.len() as u32).to_le_bytes());
    body_section.extend_from_slice(path);
    body_section.extend_from_slice(&(headers.len() as u32).to_le_bytes());
    body_section.extend_from_slice(&headers);
    body_section.extend_from_slice(&(body.len() as u64).to_le_bytes());
    body_section.extend_from_slice(body);

    let mut record = Vec::with_capacity(4 + body_section.len() + 4);
    record.extend_from_slice(&(body_section.len() as u32).to_le_bytes());
    record.extend_from_slice(&body_section);
    let crc = crc32c::crc32c(&body_section);
    record.extend_from_slice(&crc.to_le_bytes());
    record
}

/// Result of decoding one record: the entry plus how many bytes it occupied,
/// so a scanner can advance its cursor.
pub struct Decoded {
    pub entry: JournalEntry,
    pub len: usize,
}

/// Decodes one record starting at the front of `buf`. Returns `Ok(None)` if
/// `buf` doesn't even hold a length prefix (end of a live, not-yet-full
/// segment) rather than treating it as corruption.
pub fn decode(buf: &[u8]) -> Result<Option<Decoded>> {
    if buf.len() < 4 {
        return Ok(None);
    }
    let length = u32::from_le_bytes(buf[0..4].try_into().unwrap()) as usize;
    if length == 0 {
        // Untouched, zero-filled space past the live write cursor in a
        // pre-allocated mmap segment; never a real record (the smallest
        // possible body section is the fixed header alone).
        return Ok(None);
    }
    let total = 4 + length + 4;
    if buf.len() < total {
        return Ok(None);
    }

    let body_section = &buf[4..4 + length];
    let stored_crc = u32::from_le_bytes(buf[4 + length..total].try_into().unwrap());
    let actual_crc = crc32c::crc32c(body_section);
    if stored_crc != actual_crc {
        return Err(JournalError::Corrupt(format!(
            "crc mismatch: stored {stored_crc:#x}, computed {actual_crc:#x}"
        )));
    }

    let mut pos = 0;
    let version = body_section[pos];
    pos += 1;
    if version != WIRE_VERSION {
        return Err(JournalError::Corrupt(format!(
            "unsupported wire version {version}"
        )));
    }
    let state = state_from_tag(body_section[pos])?;
    pos += 1;
    pos += 2; // flags, unused
    let trace_lo = u64::from_le_bytes(body_section[pos..pos + 8].try_into().unwrap());
    pos += 8;
    let trace_hi = u64::from_le_bytes(body_section[pos..pos + 8].try_into().unwrap());
    pos += 8;
    let enqueue_ns = u64::from_le_bytes(body_section[pos..pos + 8].try_into().unwrap());
    pos += 8;
    let attempts = u32::from_le_bytes(body_section[pos..pos + 4].try_into().unwrap());
    pos += 4;

    let method_len = u32::from_le_bytes(body_section[pos..pos + 4].try_into().unwrap()) as usize;
    pos += 4;
    let method = String::from_utf8(body_section[pos..pos + method_len].to_vec())
        .map_err(|e| JournalError::Corrupt(e.to_string()))?;
    pos += method_len;

    let path_len = u32::from_le_bytes(body_section[pos..pos + 4].try_into().unwrap()) as usize;
    pos += 4;
    let path = String::from_utf8(body_section[pos..pos + path_len].to_vec())
        .map_err(|e| JournalError::Corrupt(e.to_string()))?;
    pos += path_len;

    let headers_len = u32::from_le_bytes(body_section[pos..pos + 4].try_into().unwrap()) as usize;
    pos += 4;
    let headers = decode_headers(&body_section[pos..pos + headers_len])?;
    pos += headers_len;

    let body_len = u64::from_le_bytes(body_section[pos..pos + 8].try_into().unwrap()) as usize;
    pos += 8;
    let body = body_section[pos..pos + body_len].to_vec();

    let trace_id = TraceId::from_parts(trace_hi, trace_lo);
    let enqueued_at = SystemTime::UNIX_EPOCH + Duration::from_nanos(enqueue_ns);

    let mut fingerprint = RequestFingerprint::new(method, path, body);
    fingerprint.headers = headers;

    let entry = JournalEntry {
        trace_id,
        fingerprint,
        state,
        attempts,
        enqueued_at,
        next_eligible_at: enqueued_at,
    };

    Ok(Some(Decoded { entry, len: total }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> JournalEntry {
        let fp = RequestFingerprint::new("POST", "/orders", b"payload".to_vec())
            .with_header("Authorization", "Bearer token");
        let mut entry = JournalEntry::new(TraceId::new_v4(), fp);
        entry.attempts = 3;
        entry.state = JournalState::InFlight;
        entry
    }

    #[test]
    fn round_trips_through_encode_decode() {
        let entry = sample();
        let bytes = encode(&entry);
        let decoded = decode(&bytes).unwrap().unwrap();
        assert_eq!(decoded.len, bytes.len());
        assert_eq!(decoded.entry.trace_id, entry.trace_id);
        assert_eq!(decoded.entry.fingerprint.method, entry.fingerprint.method);
        assert_eq!(decoded.entry.fingerprint.path, entry.fingerprint.path);
        assert_eq!(decoded.entry.fingerprint.body, entry.fingerprint.body);
        assert_eq!(
            decoded.entry.fingerprint.header("Authorization"),
            Some("Bearer token")
        );
        assert_eq!(decoded.entry.state, entry.state);
        assert_eq!(decoded.entry.attempts, entry.attempts);
    }

    #[test]
    fn rejects_corrupted_checksum() {
        let entry = sample();
        let mut bytes = encode(&entry);
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        assert!(matches!(decode(&bytes), Err(JournalError::Corrupt(_))));
    }

    #[test]
    fn returns_none_on_incomplete_buffer() {
        let entry = sample();
        let bytes = encode(&entry);
        let truncated = &bytes[..bytes.len() - 5];
        assert!(decode(truncated).unwrap().is_none());
    }

    #[test]
    fn zero_filled_space_is_not_mistaken_for_a_record() {
        let zeros = vec![0u8; 64];
        assert!(decode(&zeros).unwrap().is_none());
    }
}
