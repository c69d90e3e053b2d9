//! Property-based tests for strata-binary using proptest.

use proptest::prelude::*;
use strata_binary::{
    decode_frame, encode_request, encode_response, ColumnData, DataUpdate, Frame, FrameDecoder,
    RequestType, ResponseType, SubscriptionRequest, SubscriptionResponse,
};

proptest! {
    /// Arbitrary input never panics the decoder.
    #[test]
    fn decode_arbitrary_bytes(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let _ = decode_frame(&bytes);
        let mut decoder = FrameDecoder::with_max_frame_len(1024);
        decoder.push(&bytes);
        for _ in 0..8 {
            match decoder.next_frame() {
                Ok(Some(_)) => continue,
                Ok(None) => break,
                Err(e) if e.is_fatal() => break,
                Err(_) => continue,
            }
        }
    }

    /// Frames split at arbitrary points come out whole and in order.
    #[test]
    fn frames_survive_arbitrary_chunking(
        tokens in prop::collection::vec(any::<i64>(), 1..10),
        chunk in 1usize..40,
    ) {
        let mut stream = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            if i % 2 == 0 {
                stream.extend(encode_request(&SubscriptionRequest {
                    msg_token: *token,
                    subscription_id: i as i32,
                    request_type: RequestType::Modify,
                    subscription: None,
                }));
            } else {
                let mut data = DataUpdate::with_rows(vec![i as u32]);
                data.int64_data.push(ColumnData::new(0, vec![*token]));
                let mut resp = SubscriptionResponse::data(i as i32, ResponseType::Add, data);
                resp.msg_token = *token;
                stream.extend(encode_response(&resp));
            }
        }

        let mut decoder = FrameDecoder::new();
        let mut seen = Vec::new();
        for piece in stream.chunks(chunk) {
            decoder.push(piece);
            while let Some(frame) = decoder.next_frame().unwrap() {
                seen.push(match frame {
                    Frame::Request(r) => r.msg_token,
                    Frame::Response(r) => r.msg_token,
                });
            }
        }
        prop_assert_eq!(seen, tokens);
        prop_assert_eq!(decoder.buffered(), 0);
    }
}
