//! Base primitives shared by every crate in the workspace: the 32-byte
//! hash/buffer type, SHA-256 helpers, signing keys, and the canonical
//! little-endian wire codec.

pub mod buf;
pub mod codec;
pub mod hash;
pub mod keys;

pub use buf::Hash32;
pub use codec::{CodecError, Decodable, Encodable, Reader, Writer};
pub use hash::{sha256, sha256_parts};
pub use keys::{CryptoError, Keypair, PublicKey, Signature};
