// PKCE helper for the S256 challenge (RFC 7636)
use base64::{engine::general_purpose, Engine as _};
use rand::Rng;
use sha2::{Digest, Sha256};

/// Unreserved characters allowed in a code verifier (RFC 7636 section 2.3).
const UNRESERVED: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-._~";

pub const MIN_VERIFIER_LEN: usize = 43;
pub const MAX_VERIFIER_LEN: usize = 128;

/// A verifier and its derived challenge. The challenge is always
/// `base64url_nopad(SHA256(verifier))`; it is never stored on its own.
#[derive(Debug, Clone)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
}

impl Pkce {
    /// Generate a fresh pair. `len` must already be validated against
    /// the RFC range (config validation does this).
    pub fn generate(len: usize) -> Self {
        let verifier = generate_code_verifier(len);
        let challenge = code_challenge_s256(&verifier);
        Pkce { verifier, challenge }
    }
}

/// Each character drawn independently and uniformly from the unreserved
/// alphabet. `thread_rng` is a CSPRNG; a predictable source here is a
/// protocol violation, not a style choice.
pub fn generate_code_verifier(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| UNRESERVED[rng.gen_range(0..UNRESERVED.len())] as char)
        .collect()
}

pub fn code_challenge_s256(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    general_purpose::URL_SAFE_NO_PAD.encode(hash)
}

/// True if `s` could have been produced by [`generate_code_verifier`].
pub fn is_valid_verifier(s: &str) -> bool {
    (MIN_VERIFIER_LEN..=MAX_VERIFIER_LEN).contains(&s.len())
        && s.bytes().all(|b| UNRESERVED.contains(&b))
}
