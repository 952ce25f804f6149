// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Property tests for the SMS body codec.

use proptest::prelude::*;
use smssecure_core::transport::{CodecConfig, TransportCodec, TransportError};

fn codec(bucket_size: usize) -> TransportCodec {
    TransportCodec::new(CodecConfig { bucket_size })
}

proptest! {
    #[test]
    fn prop_decode_inverts_encode(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let codec = TransportCodec::default();
        let text = codec.encode(&bytes);
        prop_assert_eq!(codec.decode(&text).unwrap(), bytes);
    }

    #[test]
    fn prop_encoded_text_is_sms_safe(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let text = TransportCodec::default().encode(&bytes);
        prop_assert!(!text.contains('='));
        prop_assert!(text.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/'));
    }

    #[test]
    fn prop_strip_inverts_pad(
        body in prop::collection::vec(any::<u8>(), 0..300),
        bucket_size in 1usize..64,
    ) {
        let codec = codec(bucket_size);
        let padded = codec.pad(&body);
        prop_assert_eq!(padded.len() % bucket_size, 0);
        prop_assert!(padded.len() > body.len());
        prop_assert_eq!(codec.strip_padding(&padded).unwrap(), body);
    }

    #[test]
    fn prop_padding_hides_length_within_bucket(a in 0usize..16, b in 0usize..16) {
        let codec = TransportCodec::default();
        prop_assert_eq!(codec.pad(&vec![1u8; a]).len(), codec.pad(&vec![2u8; b]).len());
    }
}

#[test]
fn test_decode_rejects_foreign_characters() {
    let result = TransportCodec::default().decode("not*base64");
    assert!(matches!(result, Err(TransportError::MalformedEncoding(_))));
}
