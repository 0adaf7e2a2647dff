use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

pub type Blake2bHash = [u8; 32];
pub type Address = [u8; 20];
pub type PublicKey = [u8; 32];
pub type Signature = [u8; 64];
pub type PeerId = [u8; 16];

type Blake2b256 = Blake2b<U32>;

pub fn hash(data: &[u8]) -> Blake2bHash {
    let mut hasher = Blake2b256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// First 4 bytes of the Blake2b-256 digest. Used as the frame checksum.
pub fn checksum(data: &[u8]) -> [u8; 4] {
    let digest = hash(data);
    [digest[0], digest[1], digest[2], digest[3]]
}
