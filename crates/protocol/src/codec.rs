use std::{fmt::Debug, marker::PhantomData};

use serde::{de::DeserializeOwned, Serialize};
use tokio_util::{
    bytes::{Buf, BufMut, BytesMut},
    codec::{Decoder, Encoder},
};

/// Upper bound for a single frame. A peer announcing more is desynced or
/// hostile, so the codec fails instead of buffering.
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Length-prefixed bincode framing: u32-le body length, then the bincode body.
/// `Tx` is the message type written to the wire and `Rx` the one expected
/// back, so each side of the channel instantiates its own direction.
pub struct FrameCodec<Tx, Rx> {
    _tmp: PhantomData<(Tx, Rx)>,
}

impl<Tx, Rx> Default for FrameCodec<Tx, Rx> {
    fn default() -> Self {
        Self { _tmp: Default::default() }
    }
}

fn oversized(len: usize) -> bincode::Error {
    Box::new(bincode::ErrorKind::Custom(format!("frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}")))
}

impl<Tx: Serialize, Rx> Encoder<Tx> for FrameCodec<Tx, Rx> {
    type Error = bincode::Error;

    fn encode(&mut self, item: Tx, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let body = bincode::serialize(&item)?;
        if body.len() > MAX_FRAME_LEN {
            return Err(oversized(body.len()));
        }
        dst.reserve(4 + body.len());
        dst.put_u32_le(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }
}

impl<Tx, Rx: DeserializeOwned + Debug> Decoder for FrameCodec<Tx, Rx> {
    type Error = bincode::Error;
    type Item = Rx;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < 4 {
            return Ok(None);
        }
        let body_len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
        if body_len > MAX_FRAME_LEN {
            return Err(oversized(body_len));
        }
        if src.len() < 4 + body_len {
            src.reserve(4 + body_len - src.len());
            return Ok(None);
        }
        src.advance(4);
        let body = src.split_to(body_len);
        bincode::deserialize(&body).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msg::{Request, Response};

    #[test]
    fn roundtrip_request() {
        let mut codec = FrameCodec::<Request, Request>::default();
        let mut buf = BytesMut::new();
        codec.encode(Request::Ping, &mut buf).unwrap();
        codec.encode(Request::PubKey, &mut buf).unwrap();

        let first = codec.decode(&mut buf).unwrap();
        assert_eq!(first, Some(Request::Ping));
        let second = codec.decode(&mut buf).unwrap();
        assert_eq!(second, Some(Request::PubKey));
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn partial_frame_waits_for_more_bytes() {
        let mut codec = FrameCodec::<Response, Response>::default();
        let mut full = BytesMut::new();
        codec.encode(Response::Pong, &mut full).unwrap();

        let mut buf = BytesMut::new();
        buf.put_slice(&full[..2]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.put_slice(&full[2..full.len() - 1]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.put_slice(&full[full.len() - 1..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Response::Pong));
    }

    #[test]
    fn oversized_frame_rejected() {
        let mut codec = FrameCodec::<Request, Request>::default();
        let mut buf = BytesMut::new();
        buf.put_u32_le(MAX_FRAME_LEN as u32 + 1);
        assert!(codec.decode(&mut buf).is_err());
    }
}
