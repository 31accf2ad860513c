/// Number of obfuscation rounds, shared by key shaping and the byte transform.
pub const ROUNDS: usize = 7;

/// Maximum length of a shaped key string.
pub const SHAPED_KEY_MAX_LEN: usize = 32;

/// Random bytes drawn for each base key generation.
pub const BASE_KEY_ENTROPY_BYTES: usize = 32;

/// Per-round XOR constant multiplier: round `r` XORs every byte with `r * 13`.
pub const ROUND_CONSTANT: u8 = 13;

/// Field separator of the plaintext record.
pub const FIELD_SEPARATOR: char = '|';

/// Number of fields in a plaintext record: timestamp, fingerprint, nonce, body.
pub const RECORD_FIELD_COUNT: usize = 4;
