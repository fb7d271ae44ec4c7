use std::io::Cursor;

/// Content type of every payload produced by the speech engines.
pub const WAV_CONTENT_TYPE: &str = "audio/wav";

fn mono16(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Encode f32 samples in [-1.0, 1.0] as a 16-bit mono PCM WAV file.
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> anyhow::Result<Vec<u8>> {
    const I16_MAX_F32: f32 = i16::MAX as f32;

    // WAV header (44 bytes) + 2 bytes per sample
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, mono16(sample_rate))
            .map_err(|e| anyhow::anyhow!("wav write err: {e}"))?;
        for &s in samples {
            let v = (s.clamp(-1.0, 1.0) * I16_MAX_F32) as i16;
            writer
                .write_sample(v)
                .map_err(|e| anyhow::anyhow!("wav sample err: {e}"))?;
        }
        writer
            .finalize()
            .map_err(|e| anyhow::anyhow!("wav finalize err: {e}"))?;
    }
    Ok(cursor.into_inner())
}

/// Wrap raw little-endian 16-bit mono PCM in a WAV container.
///
/// A trailing odd byte (half a sample) is dropped.
pub fn pcm16_to_wav(pcm: &[u8], sample_rate: u32) -> anyhow::Result<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::<u8>::with_capacity(44 + pcm.len()));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, mono16(sample_rate))
            .map_err(|e| anyhow::anyhow!("wav write err: {e}"))?;
        for pair in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .map_err(|e| anyhow::anyhow!("wav sample err: {e}"))?;
        }
        writer
            .finalize()
            .map_err(|e| anyhow::anyhow!("wav finalize err: {e}"))?;
    }
    Ok(cursor.into_inner())
}

/// Playback duration of a WAV payload in milliseconds.
pub fn wav_duration_ms(wav: &[u8]) -> anyhow::Result<u64> {
    let reader = hound::WavReader::new(Cursor::new(wav))
        .map_err(|e| anyhow::anyhow!("wav read err: {e}"))?;
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Ok(0);
    }
    let frames = reader.duration() as u64;
    Ok(frames * 1000 / spec.sample_rate as u64)
}
