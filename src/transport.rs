use base64::{Engine, engine::general_purpose::STANDARD};

/// Encode binary data as unwrapped standard base64 for embedding in JSON.
#[must_use]
pub fn encode_binary(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(text: &str) -> Vec<u8> {
        STANDARD.decode(text).unwrap_or_else(|e| panic!("{e}"))
    }

    #[test]
    fn round_trips_arbitrary_bytes() {
        let all: Vec<u8> = (0..=255).collect();
        for input in [&b""[..], b"f", b"fo", b"foo", b"RIFF\x00\xff\x7f", &all] {
            assert_eq!(decode(&encode_binary(input)), input);
        }
    }

    #[test]
    fn empty_input_is_empty_text() {
        assert_eq!(encode_binary(&[]), "");
    }

    #[test]
    fn uses_standard_alphabet_with_padding() {
        assert_eq!(encode_binary(&[0xfb, 0xff]), "+/8=");
    }

    #[test]
    fn long_input_is_not_wrapped() {
        let text = encode_binary(&vec![0u8; 4096]);
        assert!(!text.contains('\n'));
        assert!(!text.contains('\r'));
    }
}
