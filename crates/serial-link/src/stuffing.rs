//! COBS byte stuffing for zero-delimited frames
//!
//! The ring buffer ends a frame at every zero byte it sees. Senders that
//! need to carry arbitrary payloads COBS-encode them so the only zero on
//! the wire is the terminating delimiter.

use crate::error::LinkError;
use ring_buffer::DELIMITER;

/// Encode `payload` and append the frame delimiter
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut frame = cobs::encode_vec(payload);
    frame.push(DELIMITER);
    frame
}

/// Decode a frame as returned by the ring buffer (delimiter already stripped)
pub fn decode_frame(frame: &[u8]) -> Result<Vec<u8>, LinkError> {
    if frame.contains(&DELIMITER) {
        return Err(LinkError::Decode(format!(
            "{}-byte frame contains a zero byte",
            frame.len()
        )));
    }
    cobs::decode_vec(frame)
        .map_err(|_| LinkError::Decode(format!("malformed {}-byte COBS frame", frame.len())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encoded_frame_has_single_trailing_zero() {
        let frame = encode_frame(&[0x11, 0x00, 0x22, 0x00]);
        assert_eq!(frame.last(), Some(&DELIMITER));
        assert_eq!(frame.iter().filter(|&&b| b == 0).count(), 1);
    }

    #[test]
    fn test_known_encoding() {
        assert_eq!(
            encode_frame(&[0x11, 0x22, 0x00, 0x33]),
            vec![0x03, 0x11, 0x22, 0x02, 0x33, 0x00]
        );
        assert_eq!(
            decode_frame(&[0x03, 0x11, 0x22, 0x02, 0x33]).unwrap(),
            vec![0x11, 0x22, 0x00, 0x33]
        );
    }

    #[test]
    fn test_truncated_block_is_rejected() {
        assert!(matches!(decode_frame(&[0x05, 0x01]), Err(LinkError::Decode(_))));
    }

    #[test]
    fn test_embedded_zero_is_rejected() {
        assert!(matches!(decode_frame(&[0x02, 0x00, 0x01]), Err(LinkError::Decode(_))));
    }

    proptest! {
        #[test]
        fn prop_stuffed_payload_survives_buffer(
            payload in proptest::collection::vec(any::<u8>(), 1..300)
        ) {
            let buffer = ring_buffer::FramedRingBuffer::new(1024).unwrap();
            buffer.extend(&encode_frame(&payload)).unwrap();
            prop_assert_eq!(buffer.pending_frames(), 1);

            let frame = buffer.try_read().unwrap();
            prop_assert_eq!(decode_frame(&frame).unwrap(), payload);
        }
    }
}
