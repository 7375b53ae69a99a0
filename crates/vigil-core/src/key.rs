//! Short URL-safe daemon keys.
//!
//! Generated keys start at three random bytes (four base64 characters)
//! and only grow when the engine keeps colliding with existing keys, so
//! keys stay short while the namespace is sparse.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;

/// Number of random bytes in a freshly generated key.
pub const INITIAL_KEY_BYTES: usize = 3;

/// Consecutive insert collisions tolerated before the key grows by one
/// byte.
pub const MAX_KEY_COLLISIONS: u32 = 4;

/// Generates a random key from `n` bytes of OS entropy, encoded as
/// URL-safe base64 without padding.
///
/// # Errors
///
/// Returns the underlying [`rand::Error`] when the entropy source fails.
pub fn generate_key(n: usize) -> Result<String, rand::Error> {
    let mut data = vec![0u8; n];
    OsRng.try_fill_bytes(&mut data)?;
    Ok(URL_SAFE_NO_PAD.encode(data))
}
