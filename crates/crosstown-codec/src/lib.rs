//! Compact, self-delimiting binary codec for `SignedEvent`s.
//!
//! Field order is fixed: `id, pubkey, created_at, kind, tags, content, sig`.
//! All multi-byte integers are big-endian. `encode`/`decode` round-trip the
//! bare per-event layout; `encode_envelope`/`decode_envelope` additionally
//! carry the optional payment-channel-claim sidecar behind a one-byte tag,
//! which is the form actually embedded in a packet's `data` field.

use thiserror::Error;

use crosstown_types::{SignedClaim, SignedEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("invalid event: truncated input")]
    Truncated,
    #[error("invalid event: {0} trailing byte(s) after the expected layout")]
    TrailingBytes(usize),
    #[error("invalid event: malformed tag row")]
    MalformedTagRow,
    #[error("invalid event: content/tag bytes are not valid utf-8")]
    InvalidUtf8,
    #[error("invalid event: field {field} must be exactly {expected} raw bytes")]
    InvalidHexField { field: &'static str, expected: usize },
    #[error("invalid event: {0} exceeds the field's length-prefix capacity")]
    FieldTooLarge(&'static str),
    #[error("invalid event: unknown envelope tag {0:#04x}")]
    UnknownEnvelopeTag(u8),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Decoded protocol-data envelope: a bare event, or an event with an
/// attached payment-channel-claim sidecar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Event(SignedEvent),
    EventWithClaim(SignedEvent, SignedClaim),
}

impl Envelope {
    pub fn event(&self) -> &SignedEvent {
        match self {
            Envelope::Event(e) => e,
            Envelope::EventWithClaim(e, _) => e,
        }
    }

    pub fn claim(&self) -> Option<&SignedClaim> {
        match self {
            Envelope::Event(_) => None,
            Envelope::EventWithClaim(_, c) => Some(c),
        }
    }
}

const ENVELOPE_BARE: u8 = 0x00;
const ENVELOPE_CLAIM: u8 = 0x01;

/// Deterministically encodes a `SignedEvent` into the fixed field-order,
/// length-prefixed layout. Infallible for any event whose hex
/// fields carry the expected byte widths (true for anything produced by
/// `crosstown-crypto` or round-tripped through `decode`).
pub fn encode(event: &SignedEvent) -> CodecResult<Vec<u8>> {
    let mut buf = Vec::new();
    write_fixed_hex(&mut buf, "id", &event.id, 32)?;
    write_fixed_hex(&mut buf, "pubkey", &event.pubkey, 32)?;
    buf.extend_from_slice(&(event.created_at as u64).to_be_bytes());
    buf.extend_from_slice(&event.kind.to_be_bytes());
    write_tags(&mut buf, &event.tags)?;
    write_u32_prefixed(&mut buf, "content", event.content.as_bytes())?;
    write_fixed_hex(&mut buf, "sig", &event.sig, 64)?;
    Ok(buf)
}

/// Decodes a bare (untagged) event, rejecting any structural violation —
/// never panics. The input must be exactly the bytes of one encoded event,
/// with nothing trailing.
pub fn decode(bytes: &[u8]) -> CodecResult<SignedEvent> {
    let mut r = Reader::new(bytes);
    let id = hex::encode(r.take(32)?);
    let pubkey = hex::encode(r.take(32)?);
    let created_at = r.read_u64()? as i64;
    let kind = r.read_u32()?;
    let tags = read_tags(&mut r)?;
    let content = read_u32_prefixed_utf8(&mut r)?;
    let sig = hex::encode(r.take(64)?);
    if r.remaining() != 0 {
        return Err(CodecError::TrailingBytes(r.remaining()));
    }
    Ok(SignedEvent { id, pubkey, created_at, kind, tags, content, sig })
}

/// Encodes the protocol-data envelope: a one-byte tag
/// followed by either a bare event or a length-prefixed event plus claim
/// sidecar.
pub fn encode_envelope(envelope: &Envelope) -> CodecResult<Vec<u8>> {
    match envelope {
        Envelope::Event(event) => {
            let mut buf = vec![ENVELOPE_BARE];
            buf.extend(encode(event)?);
            Ok(buf)
        }
        Envelope::EventWithClaim(event, claim) => {
            let event_bytes = encode(event)?;
            let mut buf = vec![ENVELOPE_CLAIM];
            write_u32_prefixed_bytes(&mut buf, "envelope event", &event_bytes)?;
            write_fixed_hex(&mut buf, "channel_id", &claim.channel_id, 32)?;
            buf.extend_from_slice(&claim.nonce.to_be_bytes());
            buf.extend_from_slice(&claim.amount.to_be_bytes());
            write_fixed_hex(&mut buf, "claim signature", &claim.signature, 64)?;
            Ok(buf)
        }
    }
}

/// Decodes the protocol-data envelope, accepting both the bare-event and
/// event-plus-claim forms. This is the entry point packet handling
/// should use on `req.data`, not the bare `decode`.
pub fn decode_envelope(bytes: &[u8]) -> CodecResult<Envelope> {
    let mut r = Reader::new(bytes);
    let tag = r.take(1)?[0];
    match tag {
        ENVELOPE_BARE => {
            let event = decode(r.rest())?;
            Ok(Envelope::Event(event))
        }
        ENVELOPE_CLAIM => {
            let event_len = r.read_u32()? as usize;
            let event = decode(r.take(event_len)?)?;
            let channel_id = hex::encode(r.take(32)?);
            let nonce = r.read_u64()?;
            let amount = r.read_u64()?;
            let signature = hex::encode(r.take(64)?);
            if r.remaining() != 0 {
                return Err(CodecError::TrailingBytes(r.remaining()));
            }
            Ok(Envelope::EventWithClaim(event, SignedClaim { channel_id, nonce, amount, signature }))
        }
        other => Err(CodecError::UnknownEnvelopeTag(other)),
    }
}

fn write_fixed_hex(buf: &mut Vec<u8>, field: &'static str, hex_str: &str, expected: usize) -> CodecResult<()> {
    let bytes = hex::decode(hex_str).map_err(|_| CodecError::InvalidHexField { field, expected })?;
    if bytes.len() != expected {
        return Err(CodecError::InvalidHexField { field, expected });
    }
    buf.extend_from_slice(&bytes);
    Ok(())
}

fn write_u32_prefixed(buf: &mut Vec<u8>, field: &'static str, bytes: &[u8]) -> CodecResult<()> {
    write_u32_prefixed_bytes(buf, field, bytes)
}

fn write_u32_prefixed_bytes(buf: &mut Vec<u8>, field: &'static str, bytes: &[u8]) -> CodecResult<()> {
    let len: u32 = bytes.len().try_into().map_err(|_| CodecError::FieldTooLarge(field))?;
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(bytes);
    Ok(())
}

fn write_tags(buf: &mut Vec<u8>, tags: &[Vec<String>]) -> CodecResult<()> {
    let row_count: u16 = tags.len().try_into().map_err(|_| CodecError::FieldTooLarge("tags"))?;
    buf.extend_from_slice(&row_count.to_be_bytes());
    for row in tags {
        let elem_count: u16 = row.len().try_into().map_err(|_| CodecError::FieldTooLarge("tag row"))?;
        buf.extend_from_slice(&elem_count.to_be_bytes());
        for elem in row {
            let elem_bytes = elem.as_bytes();
            let elem_len: u16 = elem_bytes.len().try_into().map_err(|_| CodecError::FieldTooLarge("tag element"))?;
            buf.extend_from_slice(&elem_len.to_be_bytes());
            buf.extend_from_slice(elem_bytes);
        }
    }
    Ok(())
}

fn read_tags(r: &mut Reader<'_>) -> CodecResult<Vec<Vec<String>>> {
    let row_count = r.read_u16()?;
    let mut tags = Vec::with_capacity(row_count as usize);
    for _ in 0..row_count {
        let elem_count = r.read_u16()?;
        let mut row = Vec::with_capacity(elem_count as usize);
        for _ in 0..elem_count {
            let elem_len = r.read_u16()? as usize;
            let elem_bytes = r.take(elem_len)?;
            let elem = std::str::from_utf8(elem_bytes).map_err(|_| CodecError::InvalidUtf8)?.to_string();
            row.push(elem);
        }
        if elem_count == 0 {
            return Err(CodecError::MalformedTagRow);
        }
        tags.push(row);
    }
    Ok(tags)
}

fn read_u32_prefixed_utf8(r: &mut Reader<'_>) -> CodecResult<String> {
    let len = r.read_u32()? as usize;
    let bytes = r.take(len)?;
    std::str::from_utf8(bytes).map(str::to_string).map_err(|_| CodecError::InvalidUtf8)
}

/// A minimal forward-only cursor over a byte slice; never panics, rejects
/// short reads with `CodecError::Truncated`.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> CodecResult<&'a [u8]> {
        if self.buf.len() - self.pos < n {
            return Err(CodecError::Truncated);
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }

    fn read_u16(&mut self) -> CodecResult<u16> {
        Ok(u16::from_be_bytes(self.take(2)?.try_into().unwrap()))
    }

    fn read_u32(&mut self) -> CodecResult<u32> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn read_u64(&mut self) -> CodecResult<u64> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }
}
