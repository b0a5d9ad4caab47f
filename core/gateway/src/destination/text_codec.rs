use crate::error::GatewayError;
use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
/// Sip text over a raw tcp stream.
///
/// Every decode hands out what has been read so far, so one read becomes
/// one websocket message. A multi byte character cut by the read boundary
/// stays in the buffer until the rest of it arrives.
#[derive(Debug, Default)]
pub struct DestinationTextCodec;
impl DestinationTextCodec {
    pub fn new() -> Self {
        Self
    }
}
impl Decoder for DestinationTextCodec {
    type Item = String;
    type Error = GatewayError;
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        let complete_len = match std::str::from_utf8(src) {
            Ok(_) => src.len(),
            // Incomplete trailing character, wait for more bytes
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => {
                let invalid_data = src.split_to(src.len());
                return Ok(Some(String::from_utf8_lossy(&invalid_data).into_owned()));
            }
        };
        if complete_len == 0 {
            return Ok(None);
        }
        let text_data = src.split_to(complete_len);
        Ok(Some(String::from_utf8_lossy(&text_data).into_owned()))
    }
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(text) => Ok(Some(text)),
            None if src.is_empty() => Ok(None),
            None => {
                let remaining = src.split_to(src.len());
                Ok(Some(String::from_utf8_lossy(&remaining).into_owned()))
            }
        }
    }
}
impl Encoder<String> for DestinationTextCodec {
    type Error = GatewayError;
    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(item.as_bytes());
        Ok(())
    }
}
