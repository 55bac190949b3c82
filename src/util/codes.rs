//! Private-match join code generation and validation

use rand::Rng;

/// Code alphabet; excludes I, O, 0, 1 to avoid transcription mistakes
pub const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of a standard join code
pub const JOIN_CODE_LEN: usize = 4;

/// Attempts at a unique short code before falling back to a longer one
pub const JOIN_CODE_MAX_ATTEMPTS: usize = 50;

/// Length of the fallback code when the short space is saturated
pub const JOIN_CODE_FALLBACK_LEN: usize = 8;

/// Generate a random code of the given length from the join-code alphabet
pub fn generate_code<R: Rng>(rng: &mut R, len: usize) -> String {
    (0..len)
        .map(|_| {
            let idx = rng.gen_range(0..JOIN_CODE_ALPHABET.len());
            JOIN_CODE_ALPHABET[idx] as char
        })
        .collect()
}

/// Normalize and validate a client-supplied code.
/// Returns the canonical uppercase form, or None if it is not a valid code.
pub fn sanitize_code(input: &str) -> Option<String> {
    let upper = input.trim().to_ascii_uppercase();
    if upper.len() != JOIN_CODE_LEN {
        return None;
    }
    if !upper.bytes().all(|b| JOIN_CODE_ALPHABET.contains(&b)) {
        return None;
    }
    Some(upper)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn generated_codes_use_the_alphabet() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for _ in 0..100 {
            let code = generate_code(&mut rng, JOIN_CODE_LEN);
            assert_eq!(code.len(), JOIN_CODE_LEN);
            assert!(code.bytes().all(|b| JOIN_CODE_ALPHABET.contains(&b)));
        }
    }

    #[test]
    fn sanitize_accepts_lowercase_and_whitespace() {
        assert_eq!(sanitize_code(" abcd "), Some("ABCD".to_string()));
        assert_eq!(sanitize_code("x2y3"), Some("X2Y3".to_string()));
    }

    #[test]
    fn sanitize_rejects_bad_codes() {
        assert_eq!(sanitize_code("AB"), None); // too short
        assert_eq!(sanitize_code("ABCDE"), None); // too long
        assert_eq!(sanitize_code("AB0D"), None); // 0 not in alphabet
        assert_eq!(sanitize_code("AB1D"), None); // 1 not in alphabet
        assert_eq!(sanitize_code("ABID"), None); // I not in alphabet
        assert_eq!(sanitize_code("AB-D"), None);
    }
}
