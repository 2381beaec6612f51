//! # Packet Framing and Armor
//!
//! Every packet exchanged with a peer shares one frame layout:
//!
//! ```text
//! [0..5)   destination overlay address
//! [5..10)  source overlay address
//! [10]     verb byte (low bits: verb, high bit: encrypted flag)
//! [11..]   payload
//! ```
//!
//! [`Packet`] is an append-style builder over that frame; multi-byte fields
//! are big-endian. `armor` seals a finished frame with the peer session
//! key:
//!
//! - always: a 16-byte keyed-BLAKE3 MAC over the whole frame is appended
//! - with encryption: the payload is first sealed with XChaCha20-Poly1305
//!   (random 24-byte nonce prepended, frame header as associated data) and
//!   the verb's high bit is set
//!
//! HELLO is armored but not encrypted — a peer that does not yet know the
//! sender's identity must be able to read it. Everything else the path
//! manager emits is encrypted.
//!
//! MAC and cipher keys are derived from the session key under distinct
//! domains, so the two uses can never collide.

use std::fmt;

use chacha20poly1305::aead::{Aead, KeyInit, Payload};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

use crate::identity::{Address, SessionKey, ADDRESS_LEN};

/// Frame offset of the destination address.
pub const PACKET_IDX_DEST: usize = 0;
/// Frame offset of the source address.
pub const PACKET_IDX_SRC: usize = ADDRESS_LEN;
/// Frame offset of the verb byte.
pub const PACKET_IDX_VERB: usize = 2 * ADDRESS_LEN;
/// Frame offset of the payload.
pub const PACKET_IDX_PAYLOAD: usize = 2 * ADDRESS_LEN + 1;

/// Length of the appended authentication tag.
pub const MAC_LEN: usize = 16;
/// Length of the nonce prepended to encrypted payloads.
pub const NONCE_LEN: usize = 24;
/// Length of the AEAD tag XChaCha20-Poly1305 appends to sealed payloads.
const POLY1305_TAG_LEN: usize = 16;
/// Total bytes `armor` adds to an encrypted frame: nonce, AEAD tag and
/// frame MAC. Size-capped packets budget against this.
pub const ENCRYPTED_ARMOR_OVERHEAD: usize = NONCE_LEN + POLY1305_TAG_LEN + MAC_LEN;

/// Verb-byte flag: payload is sealed with the session cipher.
pub const VERB_FLAG_ENCRYPTED: u8 = 0x80;
/// Mask selecting the verb proper out of the verb byte.
pub const VERB_MASK: u8 = 0x7f;

/// Domain separation context for the frame MAC key.
const MAC_KEY_DOMAIN: &str = "weft v1 packet mac";
/// Domain separation context for the payload cipher key.
const CIPHER_KEY_DOMAIN: &str = "weft v1 packet cipher";

// ============================================================================
// Verbs
// ============================================================================

/// Packet verbs understood by the path manager.
///
/// Discriminants are wire values and must never be renumbered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Verb {
    Hello = 0x01,
    Error = 0x02,
    Ok = 0x03,
    Whois = 0x04,
    Rendezvous = 0x05,
    Frame = 0x06,
    ExtFrame = 0x07,
    Echo = 0x08,
    MulticastLike = 0x09,
    MulticastFrame = 0x0e,
    PushDirectPaths = 0x10,
}

impl Verb {
    pub fn from_u8(raw: u8) -> Option<Verb> {
        match raw & VERB_MASK {
            0x01 => Some(Verb::Hello),
            0x02 => Some(Verb::Error),
            0x03 => Some(Verb::Ok),
            0x04 => Some(Verb::Whois),
            0x05 => Some(Verb::Rendezvous),
            0x06 => Some(Verb::Frame),
            0x07 => Some(Verb::ExtFrame),
            0x08 => Some(Verb::Echo),
            0x09 => Some(Verb::MulticastLike),
            0x0e => Some(Verb::MulticastFrame),
            0x10 => Some(Verb::PushDirectPaths),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Verb::Hello => "HELLO",
            Verb::Error => "ERROR",
            Verb::Ok => "OK",
            Verb::Whois => "WHOIS",
            Verb::Rendezvous => "RENDEZVOUS",
            Verb::Frame => "FRAME",
            Verb::ExtFrame => "EXT_FRAME",
            Verb::Echo => "ECHO",
            Verb::MulticastLike => "MULTICAST_LIKE",
            Verb::MulticastFrame => "MULTICAST_FRAME",
            Verb::PushDirectPaths => "PUSH_DIRECT_PATHS",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error type for packet parsing and dearmor failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketError {
    /// Frame shorter than the fixed header (or, for dearmor, header + MAC).
    Truncated,
    /// MAC verification failed.
    BadMac,
    /// Payload decryption failed.
    DecryptFailed,
    /// The verb byte does not name a known verb.
    UnknownVerb(u8),
}

impl fmt::Display for PacketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketError::Truncated => write!(f, "packet truncated"),
            PacketError::BadMac => write!(f, "packet MAC verification failed"),
            PacketError::DecryptFailed => write!(f, "packet payload decryption failed"),
            PacketError::UnknownVerb(v) => write!(f, "unknown verb byte 0x{:02x}", v),
        }
    }
}

impl std::error::Error for PacketError {}

// ============================================================================
// Packet
// ============================================================================

/// An overlay packet under construction or received from the wire.
#[derive(Clone, Debug)]
pub struct Packet {
    buf: Vec<u8>,
}

impl Packet {
    /// Start a new outbound packet.
    pub fn new(dest: Address, src: Address, verb: Verb) -> Self {
        let mut buf = Vec::with_capacity(64);
        buf.extend_from_slice(dest.as_bytes());
        buf.extend_from_slice(src.as_bytes());
        buf.push(verb as u8);
        Self { buf }
    }

    /// Wrap a received frame. Rejects frames shorter than the fixed header.
    pub fn from_bytes(buf: Vec<u8>) -> Result<Self, PacketError> {
        if buf.len() < PACKET_IDX_PAYLOAD {
            return Err(PacketError::Truncated);
        }
        Ok(Self { buf })
    }

    pub fn append_u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn append_u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn append_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Overwrite two bytes at an absolute frame offset. Used to patch a
    /// record count in after packing.
    pub fn set_u16(&mut self, at: usize, v: u16) {
        self.buf[at..at + 2].copy_from_slice(&v.to_be_bytes());
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    pub fn destination(&self) -> Address {
        let mut b = [0u8; ADDRESS_LEN];
        b.copy_from_slice(&self.buf[PACKET_IDX_DEST..PACKET_IDX_DEST + ADDRESS_LEN]);
        Address::from_bytes(b)
    }

    pub fn source(&self) -> Address {
        let mut b = [0u8; ADDRESS_LEN];
        b.copy_from_slice(&self.buf[PACKET_IDX_SRC..PACKET_IDX_SRC + ADDRESS_LEN]);
        Address::from_bytes(b)
    }

    pub fn verb(&self) -> Result<Verb, PacketError> {
        let raw = self.buf[PACKET_IDX_VERB];
        Verb::from_u8(raw).ok_or(PacketError::UnknownVerb(raw & VERB_MASK))
    }

    pub fn is_encrypted(&self) -> bool {
        self.buf[PACKET_IDX_VERB] & VERB_FLAG_ENCRYPTED != 0
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf[PACKET_IDX_PAYLOAD..]
    }

    /// Seal the frame with the peer session key.
    ///
    /// With `encrypt`, the payload is replaced by `nonce || ciphertext` and
    /// the verb's encrypted flag is set; the frame header is bound as
    /// associated data. In all cases a truncated keyed-BLAKE3 MAC over the
    /// whole frame is appended.
    pub fn armor(&mut self, key: &SessionKey, encrypt: bool) {
        if encrypt {
            self.buf[PACKET_IDX_VERB] |= VERB_FLAG_ENCRYPTED;

            let mut nonce = [0u8; NONCE_LEN];
            OsRng.fill_bytes(&mut nonce);

            let cipher_key = blake3::derive_key(CIPHER_KEY_DOMAIN, key.as_bytes());
            let cipher = XChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&cipher_key));
            let (header, payload) = self.buf.split_at(PACKET_IDX_PAYLOAD);
            let sealed = cipher
                .encrypt(
                    XNonce::from_slice(&nonce),
                    Payload {
                        msg: payload,
                        aad: header,
                    },
                )
                .expect("XChaCha20-Poly1305 sealing of an in-memory buffer cannot fail");

            self.buf.truncate(PACKET_IDX_PAYLOAD);
            self.buf.extend_from_slice(&nonce);
            self.buf.extend_from_slice(&sealed);
        }

        let mac_key = blake3::derive_key(MAC_KEY_DOMAIN, key.as_bytes());
        let tag = blake3::keyed_hash(&mac_key, &self.buf);
        self.buf.extend_from_slice(&tag.as_bytes()[..MAC_LEN]);
    }

    /// Authenticate (and, if flagged, decrypt) a received frame in place.
    pub fn dearmor(&mut self, key: &SessionKey) -> Result<(), PacketError> {
        if self.buf.len() < PACKET_IDX_PAYLOAD + MAC_LEN {
            return Err(PacketError::Truncated);
        }

        let body_len = self.buf.len() - MAC_LEN;
        let mac_key = blake3::derive_key(MAC_KEY_DOMAIN, key.as_bytes());
        let expected = blake3::keyed_hash(&mac_key, &self.buf[..body_len]);
        let ok: bool = expected.as_bytes()[..MAC_LEN]
            .ct_eq(&self.buf[body_len..])
            .into();
        if !ok {
            return Err(PacketError::BadMac);
        }
        self.buf.truncate(body_len);

        if self.is_encrypted() {
            let payload = &self.buf[PACKET_IDX_PAYLOAD..];
            // nonce plus at least the Poly1305 tag
            if payload.len() < NONCE_LEN + POLY1305_TAG_LEN {
                return Err(PacketError::Truncated);
            }
            let cipher_key = blake3::derive_key(CIPHER_KEY_DOMAIN, key.as_bytes());
            let cipher = XChaCha20Poly1305::new(chacha20poly1305::Key::from_slice(&cipher_key));
            let (header, payload) = self.buf.split_at(PACKET_IDX_PAYLOAD);
            let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
            let plain = cipher
                .decrypt(
                    XNonce::from_slice(nonce),
                    Payload {
                        msg: ciphertext,
                        aad: header,
                    },
                )
                .map_err(|_| PacketError::DecryptFailed)?;

            self.buf.truncate(PACKET_IDX_PAYLOAD);
            self.buf.extend_from_slice(&plain);
            self.buf[PACKET_IDX_VERB] &= VERB_MASK;
        }

        Ok(())
    }
}
