//! Uncompressed packet codec: little-endian 16-bit PCM, one packet per frame.
//!
//! Stands in for opus on the host so the whole pipeline runs without a
//! native codec library.  Packet sizes are `rate * frame_ms / 1000` samples.
//!
//! Sound assets for the host use the same P3 framing with raw PCM records
//! (`[len: u16 BE][pcm: i16 LE × len/2]`); device assets carrying opus
//! frames are not decodable here.

use crate::audio::{CodecError, OpusDecode, OpusEncode, OpusFactory};

#[derive(Debug, Default, Clone, Copy)]
pub struct RawPcmFactory;

impl OpusFactory for RawPcmFactory {
    fn new_encoder(
        &self,
        sample_rate: u32,
        channels: u16,
        frame_duration_ms: u32,
    ) -> Box<dyn OpusEncode> {
        Box::new(RawPcmEncoder::new(sample_rate, channels, frame_duration_ms))
    }

    fn new_decoder(
        &self,
        sample_rate: u32,
        _channels: u16,
        frame_duration_ms: u32,
    ) -> Box<dyn OpusDecode> {
        Box::new(RawPcmDecoder {
            sample_rate,
            frame_duration_ms,
        })
    }
}

// ---------------------------------------------------------------------------
// Encoder
// ---------------------------------------------------------------------------

pub struct RawPcmEncoder {
    frame_samples: usize,
    pending: Vec<i16>,
}

impl RawPcmEncoder {
    pub fn new(sample_rate: u32, channels: u16, frame_duration_ms: u32) -> Self {
        let frame_samples =
            (sample_rate as usize * frame_duration_ms as usize / 1000) * channels.max(1) as usize;
        Self {
            frame_samples: frame_samples.max(1),
            pending: Vec::new(),
        }
    }
}

impl OpusEncode for RawPcmEncoder {
    fn encode(&mut self, pcm: &[i16]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(pcm);

        let mut packets = Vec::new();
        while self.pending.len() >= self.frame_samples {
            let frame: Vec<i16> = self.pending.drain(..self.frame_samples).collect();
            packets.push(frame.iter().flat_map(|s| s.to_le_bytes()).collect());
        }
        packets
    }

    fn reset_state(&mut self) {
        self.pending.clear();
    }
}

// ---------------------------------------------------------------------------
// Decoder
// ---------------------------------------------------------------------------

pub struct RawPcmDecoder {
    sample_rate: u32,
    frame_duration_ms: u32,
}

impl OpusDecode for RawPcmDecoder {
    fn decode(&mut self, packet: &[u8]) -> Result<Vec<i16>, CodecError> {
        if packet.len() % 2 != 0 {
            return Err(CodecError::Corrupt(format!(
                "odd packet length {}",
                packet.len()
            )));
        }
        Ok(packet
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect())
    }

    fn reset_state(&mut self) {}

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn frame_duration_ms(&self) -> u32 {
        self.frame_duration_ms
    }
}
