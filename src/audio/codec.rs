use base64::Engine;

/// Convert f32 samples to 16-bit little-endian PCM bytes.
///
/// Samples are clamped to [-1.0, 1.0] before scaling, so out-of-range
/// input never wraps.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let scaled = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
        bytes.extend_from_slice(&scaled.to_le_bytes());
    }
    bytes
}

/// Convert 16-bit little-endian PCM bytes back to f32 samples in [-1.0, 1.0).
///
/// A trailing odd byte is ignored.
pub fn pcm16_to_float(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Base64-encode PCM bytes for transport.
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decode a base64 chunk back to PCM bytes.
pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(encoded)
}

/// Encode one capture frame for the wire: PCM16 bytes, then base64.
pub fn encode_frame(samples: &[f32]) -> String {
    encode_base64(&float_to_pcm16(samples))
}

/// Decode one wire chunk back to f32 samples.
pub fn decode_chunk(encoded: &str) -> Result<Vec<f32>, base64::DecodeError> {
    Ok(pcm16_to_float(&decode_base64(encoded)?))
}
