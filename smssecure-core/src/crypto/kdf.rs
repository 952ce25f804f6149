//! HKDF-SHA256 key derivation.

use ring::hkdf;

/// HKDF-SHA256 helpers.
pub struct HKDF;

/// Output length marker for `ring::hkdf`.
struct Len(usize);

impl hkdf::KeyType for Len {
    fn len(&self) -> usize {
        self.0
    }
}

impl HKDF {
    /// Derives `N` bytes from input keying material.
    pub fn derive<const N: usize>(salt: Option<&[u8]>, ikm: &[u8], info: &[&[u8]]) -> [u8; N] {
        let salt = hkdf::Salt::new(hkdf::HKDF_SHA256, salt.unwrap_or(&[]));
        let prk = salt.extract(ikm);
        let mut out = [0u8; N];
        // Only fails when N exceeds 255 * 32 bytes.
        prk.expand(info, Len(N))
            .and_then(|okm| okm.fill(&mut out))
            .expect("HKDF output length within limits");
        out
    }

    /// Derives a single 32-byte key.
    pub fn derive_key(salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> [u8; 32] {
        Self::derive::<32>(salt, ikm, &[info])
    }

    /// Derives two 32-byte keys.
    pub fn derive_key_pair(salt: Option<&[u8]>, ikm: &[u8], info: &[u8]) -> ([u8; 32], [u8; 32]) {
        let okm = Self::derive::<64>(salt, ikm, &[info]);
        let mut first = [0u8; 32];
        let mut second = [0u8; 32];
        first.copy_from_slice(&okm[..32]);
        second.copy_from_slice(&okm[32..]);
        (first, second)
    }
}
