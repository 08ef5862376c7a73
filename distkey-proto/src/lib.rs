//! Distributed key generation, threshold DSS signatures, and threshold
//! ElGamal decryption over a prime-order subgroup of `(Z/pZ)*`, running
//! on reliable broadcast and authenticated point-to-point channels.
//!
//! A participant constructs a [`distkey_group::Group`], its channels, and
//! then the protocol objects ([`Dkg`], [`ThresholdDss`],
//! [`ThresholdDecryptor`]); every protocol round runs over the supplied
//! broadcast/unicast instances and ends with a sync barrier so lagging
//! honest parties catch up.

pub mod coin;
pub mod decrypt;
pub mod dkg;
pub mod dss;
mod error;
pub mod math;
pub mod vss;
mod wire;

pub use coin::Edcf;
pub use decrypt::{encrypt, Ciphertext, DecryptionShare, ThresholdDecryptor};
pub use dkg::Dkg;
pub use dss::{Signature, ThresholdDss};
pub use error::{ProtocolError, RoundLog};

use std::sync::OnceLock;

static INIT: OnceLock<bool> = OnceLock::new();

/// One-time library bootstrap: verifies that the hash, MAC, and block
/// cipher primitives the channel layer relies on produce their known
/// answers. Idempotent; returns `false` when the environment is unusable.
/// `secure_memory` requests zeroizing storage for secret values, which
/// this implementation always applies.
pub fn init(secure_memory: bool) -> bool {
    let _ = secure_memory;
    *INIT.get_or_init(self_test)
}

fn self_test() -> bool {
    use aes::cipher::generic_array::GenericArray;
    use aes::cipher::{NewCipher, StreamCipher};
    use aes::Aes128Ctr;
    use hmac::{Hmac, Mac};
    use sha2::{Digest, Sha256};

    // SHA-256("abc")
    let digest = Sha256::digest(b"abc");
    let sha_expected: [u8; 32] = [
        0xba, 0x78, 0x16, 0xbf, 0x8f, 0x01, 0xcf, 0xea, 0x41, 0x41, 0x40, 0xde, 0x5d, 0xae,
        0x22, 0x23, 0xb0, 0x03, 0x61, 0xa3, 0x96, 0x17, 0x7a, 0x9c, 0xb4, 0x10, 0xff, 0x61,
        0xf2, 0x00, 0x15, 0xad,
    ];
    if digest.as_slice() != sha_expected {
        return false;
    }

    // HMAC-SHA256("key", "The quick brown fox jumps over the lazy dog")
    let mut mac = match <Hmac<Sha256> as Mac>::new_from_slice(b"key") {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(b"The quick brown fox jumps over the lazy dog");
    let hmac_expected: [u8; 32] = [
        0xf7, 0xbc, 0x83, 0xf4, 0x30, 0x53, 0x84, 0x24, 0xb1, 0x32, 0x98, 0xe6, 0xaa, 0x6f,
        0xb1, 0x43, 0xef, 0x4d, 0x59, 0xa1, 0x49, 0x46, 0x17, 0x59, 0x97, 0x47, 0x9d, 0xbc,
        0x2d, 0x1a, 0x3c, 0xd8,
    ];
    if mac.finalize().into_bytes().as_slice() != hmac_expected {
        return false;
    }

    // AES-128-CTR keystream block 0 with zero key and zero nonce equals
    // the AES encryption of the zero block
    let mut block = [0u8; 16];
    let mut cipher = Aes128Ctr::new(
        GenericArray::from_slice(&[0u8; 16]),
        GenericArray::from_slice(&[0u8; 16]),
    );
    cipher.apply_keystream(&mut block);
    let aes_expected: [u8; 16] = [
        0x66, 0xe9, 0x4b, 0xd4, 0xef, 0x8a, 0x2c, 0x3b, 0x88, 0x4c, 0xfa, 0x59, 0xca, 0x34,
        0x2b, 0x2e,
    ];
    block == aes_expected
}
