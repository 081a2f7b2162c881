//! Utility functions and helpers
//!
//! Hashing, ECDSA signing and the binary encoding used for hashing
//! and on-disk state.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    current_timestamp, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify,
    new_key_pair, public_key_from_pkcs8, sha256_digest,
};

pub use serialization::{deserialize, serialize};
