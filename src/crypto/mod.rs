//! Transport obfuscation for client submissions: rotating base keys, the
//! 7-round byte transform and the envelope format around it.
//!
//! None of this is authenticated encryption. See [`cipher`].

pub mod base64;
pub mod cipher;
pub mod envelope;
pub mod key_manager;
pub mod transport;
pub mod types;

pub use envelope::{Envelope, Expectation, PlaintextRecord};
pub use key_manager::{
    derive_key, DerivedKey, EntropySource, GenerationInfo, KeyGenerations, KeyManager, KeySlot,
    OsEntropy,
};
pub use transport::{open_with_key, seal, seal_envelope, SecureTransport};
