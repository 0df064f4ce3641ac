use crate::audio::AudioStream;
use crate::error::StageError;
use crate::stage::AudioCodec;

/// Identity codec for raw signed 16-bit little-endian PCM
#[derive(Debug, Clone, Copy, Default)]
pub struct PcmCodec;

impl PcmCodec {
    pub const ENCODING: &'static str = "pcm_s16le";
}

impl AudioCodec for PcmCodec {
    fn encode(&self, input: AudioStream) -> Result<AudioStream, StageError> {
        Ok(input)
    }

    fn decode(&self, input: AudioStream) -> Result<AudioStream, StageError> {
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::chunked_stream;
    use bytes::Bytes;
    use futures::TryStreamExt;

    #[tokio::test]
    async fn test_pcm_codec_is_identity() {
        let codec = PcmCodec;
        let encoded = codec
            .encode(chunked_stream(Bytes::from_static(b"\x01\x00\x02\x00"), 2))
            .unwrap();
        let decoded = codec.decode(encoded).unwrap();

        let chunks: Vec<Bytes> = decoded.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"\x01\x00\x02\x00");
    }
}
