//! Tokio framing for the wire protocol.
//!
//! Frames are a big-endian `u32` payload length followed by a JSON
//! document. The decoder refuses frames above a configured ceiling
//! *before* buffering the payload, so an abusive peer cannot make the
//! server allocate unbounded memory.

use std::marker::PhantomData;

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::WireError;

/// Default maximum frame payload (1 MiB).
pub const MAX_FRAME_BYTES: usize = 1024 * 1024;

const LEN_PREFIX: usize = 4;

/// Length-prefixed JSON codec.
///
/// `In` is the frame type produced by [`Decoder`]; the [`Encoder`] side
/// accepts any serializable frame, so one codec serves both the server
/// (decode [`ClientFrame`](crate::ClientFrame), encode
/// [`ServerFrame`](crate::ServerFrame)) and clients (the reverse).
#[derive(Debug)]
pub struct FrameCodec<In> {
    max_frame_bytes: usize,
    _in: PhantomData<In>,
}

impl<In> FrameCodec<In> {
    /// Codec with an explicit frame-size ceiling.
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            max_frame_bytes,
            _in: PhantomData,
        }
    }
}

impl<In> Default for FrameCodec<In> {
    fn default() -> Self {
        Self::new(MAX_FRAME_BYTES)
    }
}

impl<In: DeserializeOwned> Decoder for FrameCodec<In> {
    type Item = In;
    type Error = WireError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<In>, WireError> {
        if src.len() < LEN_PREFIX {
            return Ok(None);
        }

        let mut len_bytes = [0u8; LEN_PREFIX];
        len_bytes.copy_from_slice(&src[..LEN_PREFIX]);
        let len = u32::from_be_bytes(len_bytes) as usize;

        if len > self.max_frame_bytes {
            return Err(WireError::FrameTooLarge {
                len,
                max: self.max_frame_bytes,
            });
        }

        if src.len() < LEN_PREFIX + len {
            src.reserve(LEN_PREFIX + len - src.len());
            return Ok(None);
        }

        src.advance(LEN_PREFIX);
        let payload = src.split_to(len);
        Ok(Some(serde_json::from_slice(&payload)?))
    }
}

impl<In, T: Serialize> Encoder<&T> for FrameCodec<In> {
    type Error = WireError;

    fn encode(&mut self, frame: &T, dst: &mut BytesMut) -> Result<(), WireError> {
        let payload = serde_json::to_vec(frame)?;
        if payload.len() > self.max_frame_bytes {
            return Err(WireError::FrameTooLarge {
                len: payload.len(),
                max: self.max_frame_bytes,
            });
        }
        dst.reserve(LEN_PREFIX + payload.len());
        dst.put_u32(payload.len() as u32);
        dst.put_slice(&payload);
        Ok(())
    }
}
