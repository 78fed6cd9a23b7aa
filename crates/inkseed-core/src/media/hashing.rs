//! Content hashing and file-type sniffing for downloaded media.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of a buffer.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Image signatures checked against the head of a buffer.
const SIGNATURES: &[(&[u8], &str)] = &[
    (b"\x89PNG\r\n\x1a\n", "png"),
    (b"\xff\xd8\xff", "jpg"),
    (b"GIF87a", "gif"),
    (b"GIF89a", "gif"),
    (b"BM", "bmp"),
];

/// File extension guessed from magic bytes; `bin` when unrecognized.
pub fn sniff_extension(bytes: &[u8]) -> &'static str {
    for &(magic, ext) in SIGNATURES {
        if bytes.starts_with(magic) {
            return ext;
        }
    }

    // RIFF....WEBP and ....ftypavif
    if bytes.len() >= 12 {
        if &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            return "webp";
        }
        if &bytes[4..8] == b"ftyp" && (&bytes[8..12] == b"avif" || &bytes[8..12] == b"avis") {
            return "avif";
        }
    }

    "bin"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sniff_extension() {
        assert_eq!(sniff_extension(b"\x89PNG\r\n\x1a\n0000"), "png");
        assert_eq!(sniff_extension(b"\xff\xd8\xff\xe0"), "jpg");
        assert_eq!(sniff_extension(b"GIF89a..."), "gif");
        assert_eq!(sniff_extension(b"RIFF\x00\x00\x00\x00WEBPVP8 "), "webp");
        assert_eq!(sniff_extension(b"\x00\x00\x00\x1cftypavif"), "avif");
        assert_eq!(sniff_extension(b"plain text"), "bin");
        assert_eq!(sniff_extension(b""), "bin");
    }
}
