//! # Identity and Key Agreement
//!
//! This module defines the identity types for the overlay:
//!
//! - [`Keypair`]: the local node's secrets (Ed25519 signing key + X25519
//!   agreement key)
//! - [`Identity`]: a peer's public half (both public keys), self-certifying
//!   via its derived [`Address`]
//! - [`Address`]: the 40-bit overlay address, the first 5 bytes of
//!   `BLAKE3(ed25519_pk || x25519_pk)`
//! - [`SessionKey`]: the 32-byte symmetric key shared with one peer,
//!   derived once by ECDH at peer construction
//!
//! ## Identity Model
//!
//! An identity is its public keys; the short address is derived, not
//! assigned, so a peer cannot claim an address without holding keys that
//! hash to it. Key agreement is X25519 followed by a domain-separated
//! BLAKE3 KDF. Degenerate (non-contributory) shared secrets are rejected:
//! a peer advertising a low-order agreement key never yields a session key,
//! and no peer state is created for it.

use std::fmt;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

/// Length of an overlay address in bytes (40 bits).
pub const ADDRESS_LEN: usize = 5;

/// Length of a peer session key in bytes.
pub const SESSION_KEY_LEN: usize = 32;

/// Length of an identity's wire form: address + both public keys.
pub const IDENTITY_WIRE_LEN: usize = ADDRESS_LEN + 32 + 32;

/// Domain separation context for session key derivation.
/// Prevents the raw ECDH output from being used directly as key material.
const SESSION_KEY_DOMAIN: &str = "weft v1 peer session key";

/// Domain separation context for address derivation.
const ADDRESS_DOMAIN: &str = "weft v1 overlay address";

// ============================================================================
// Address
// ============================================================================

/// A 40-bit overlay address derived from an identity's public keys.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address([u8; ADDRESS_LEN]);

impl Address {
    pub const fn from_bytes(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    pub fn to_u64(&self) -> u64 {
        let b = &self.0;
        ((b[0] as u64) << 32)
            | ((b[1] as u64) << 24)
            | ((b[2] as u64) << 16)
            | ((b[3] as u64) << 8)
            | (b[4] as u64)
    }

    fn derive(ed25519_pk: &[u8; 32], x25519_pk: &[u8; 32]) -> Self {
        let mut material = [0u8; 64];
        material[..32].copy_from_slice(ed25519_pk);
        material[32..].copy_from_slice(x25519_pk);
        let digest = blake3::derive_key(ADDRESS_DOMAIN, &material);
        let mut addr = [0u8; ADDRESS_LEN];
        addr.copy_from_slice(&digest[..ADDRESS_LEN]);
        Self(addr)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

// ============================================================================
// Session Key
// ============================================================================

/// A 32-byte symmetric key shared with exactly one peer.
///
/// Derived once at peer construction and immutable thereafter. `Debug`
/// never prints key material.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionKey([u8; SESSION_KEY_LEN]);

impl SessionKey {
    pub const fn as_bytes(&self) -> &[u8; SESSION_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionKey([REDACTED])")
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error type for identity parsing and validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityError {
    /// Wire form shorter than [`IDENTITY_WIRE_LEN`].
    Truncated,
    /// The Ed25519 public key is not a valid curve point.
    InvalidSigningKey,
    /// The embedded address does not match the keys it claims to be
    /// derived from.
    AddressMismatch,
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityError::Truncated => write!(f, "identity wire form truncated"),
            IdentityError::InvalidSigningKey => write!(f, "invalid Ed25519 public key"),
            IdentityError::AddressMismatch => {
                write!(f, "identity address does not match its public keys")
            }
        }
    }
}

impl std::error::Error for IdentityError {}

/// Error type for key agreement failures.
///
/// Agreement fails only when the remote agreement key is degenerate (a
/// low-order point producing a non-contributory shared secret).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgreementError;

impl fmt::Display for AgreementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "key agreement produced a non-contributory shared secret")
    }
}

impl std::error::Error for AgreementError {}

// ============================================================================
// Identity
// ============================================================================

/// A peer's public identity: Ed25519 public key, X25519 agreement key and
/// the address derived from both.
#[derive(Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    ed25519: [u8; 32],
    x25519: [u8; 32],
    address: Address,
}

impl Identity {
    /// Build an identity from its two public keys, validating the Ed25519
    /// key and deriving the address.
    pub fn from_keys(ed25519: [u8; 32], x25519: [u8; 32]) -> Result<Self, IdentityError> {
        VerifyingKey::from_bytes(&ed25519).map_err(|_| IdentityError::InvalidSigningKey)?;
        Ok(Self {
            ed25519,
            x25519,
            address: Address::derive(&ed25519, &x25519),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub const fn signing_key_bytes(&self) -> &[u8; 32] {
        &self.ed25519
    }

    pub const fn agreement_key_bytes(&self) -> &[u8; 32] {
        &self.x25519
    }

    /// Append the wire form (`address || ed25519_pk || x25519_pk`) to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self.address.as_bytes());
        out.extend_from_slice(&self.ed25519);
        out.extend_from_slice(&self.x25519);
    }

    pub fn to_wire(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(IDENTITY_WIRE_LEN);
        self.write_to(&mut out);
        out
    }

    /// Parse one wire-form identity from the front of `data`, validating
    /// the keys and the address binding. Returns the identity and the
    /// number of bytes consumed.
    pub fn read_from(data: &[u8]) -> Result<(Self, usize), IdentityError> {
        if data.len() < IDENTITY_WIRE_LEN {
            return Err(IdentityError::Truncated);
        }
        let mut claimed = [0u8; ADDRESS_LEN];
        claimed.copy_from_slice(&data[..ADDRESS_LEN]);
        let mut ed25519 = [0u8; 32];
        ed25519.copy_from_slice(&data[ADDRESS_LEN..ADDRESS_LEN + 32]);
        let mut x25519 = [0u8; 32];
        x25519.copy_from_slice(&data[ADDRESS_LEN + 32..IDENTITY_WIRE_LEN]);

        let identity = Self::from_keys(ed25519, x25519)?;
        if *identity.address.as_bytes() != claimed {
            return Err(IdentityError::AddressMismatch);
        }
        Ok((identity, IDENTITY_WIRE_LEN))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.address)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}

// ============================================================================
// Keypair
// ============================================================================

/// The local node's identity secrets.
pub struct Keypair {
    signing: SigningKey,
    agreement: StaticSecret,
    identity: Identity,
}

impl Keypair {
    /// Generate a fresh identity from the system CSPRNG.
    pub fn generate() -> Self {
        let signing = SigningKey::generate(&mut OsRng);
        let agreement = StaticSecret::random_from_rng(OsRng);
        Self::from_secrets(signing, agreement)
    }

    /// Rebuild a keypair from stored secret bytes.
    pub fn from_secret_bytes(signing: [u8; 32], agreement: [u8; 32]) -> Self {
        Self::from_secrets(SigningKey::from_bytes(&signing), StaticSecret::from(agreement))
    }

    fn from_secrets(signing: SigningKey, agreement: StaticSecret) -> Self {
        let ed25519 = signing.verifying_key().to_bytes();
        let x25519 = X25519PublicKey::from(&agreement).to_bytes();
        let identity = Identity {
            ed25519,
            x25519,
            address: Address::derive(&ed25519, &x25519),
        };
        Self {
            signing,
            agreement,
            identity,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn address(&self) -> Address {
        self.identity.address
    }

    pub fn secret_bytes(&self) -> ([u8; 32], [u8; 32]) {
        (self.signing.to_bytes(), self.agreement.to_bytes())
    }

    /// Derive the symmetric session key shared with `remote`.
    ///
    /// Both sides derive the same key. Fails when the ECDH output is
    /// non-contributory (degenerate remote key).
    pub fn agree(&self, remote: &Identity) -> Result<SessionKey, AgreementError> {
        let remote_pk = X25519PublicKey::from(*remote.agreement_key_bytes());
        let shared = self.agreement.diffie_hellman(&remote_pk);
        if !shared.was_contributory() {
            return Err(AgreementError);
        }
        Ok(SessionKey(blake3::derive_key(
            SESSION_KEY_DOMAIN,
            shared.as_bytes(),
        )))
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("identity", &self.identity)
            .field("secrets", &"[REDACTED]")
            .finish()
    }
}
