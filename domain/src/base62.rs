//! Base62 encoding used to turn random seeds into names and secrets that are
//! safe for docker names, environment variables and connection strings.

const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Longest base62 rendering of a u64 (62^11 > 2^64).
pub const MAX_U64_WIDTH: usize = 11;

/// Encode an unsigned 64-bit integer into a base62 string using the alphabet
/// 0-9, A-Z, a-z. Zero encodes to "0".
pub fn encode_u64(mut n: u64) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let mut buf = [0u8; MAX_U64_WIDTH];
    let mut i = buf.len();
    while n > 0 {
        let rem = (n % 62) as usize;
        i -= 1;
        buf[i] = ALPHABET[rem];
        n /= 62;
    }
    buf[i..].iter().map(|&b| b as char).collect()
}

/// Encode `n` left-padded with '0' to at least `width` characters.
pub fn encode_padded(n: u64, width: usize) -> String {
    let s = encode_u64(n);
    if s.len() >= width {
        return s;
    }
    let mut out = String::with_capacity(width);
    out.extend(std::iter::repeat('0').take(width - s.len()));
    out.push_str(&s);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_known_vectors() {
        assert_eq!(encode_u64(0), "0");
        assert_eq!(encode_u64(61), "z");
        assert_eq!(encode_u64(62), "10");
        assert_eq!(encode_u64(3843), "zz"); // 62*62-1
    }

    #[test]
    fn max_value_fits_width() {
        assert_eq!(encode_u64(u64::MAX).len(), MAX_U64_WIDTH);
    }

    #[test]
    fn padding_only_grows() {
        assert_eq!(encode_padded(1, 4), "0001");
        assert_eq!(encode_padded(3843, 2), "zz");
        assert_eq!(encode_padded(3843, 1), "zz");
    }
}
