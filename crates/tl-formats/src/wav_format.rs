//! WAV encoding for rendered audio (16-bit stereo PCM).

use std::io::Write;

/// Write interleaved stereo `f32` samples as a 16-bit PCM WAV stream.
///
/// Values outside [-1.0, 1.0] are clipped at conversion time.
pub fn write_wav(w: &mut impl Write, samples: &[f32], sample_rate: u32) -> std::io::Result<()> {
    let num_channels: u16 = 2;
    let bits_per_sample: u16 = 16;
    let block_align = num_channels * (bits_per_sample / 8);
    let frames = samples.len() / num_channels as usize;
    let data_size = frames as u32 * block_align as u32;

    write_riff_header(w, data_size)?;
    write_fmt_chunk(w, num_channels, sample_rate, block_align, bits_per_sample)?;
    write_data_chunk(w, &samples[..frames * num_channels as usize], data_size)
}

/// Encode interleaved stereo samples into an in-memory WAV file.
pub fn interleaved_to_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(44 + samples.len() * 2);
    // Writing into a Vec cannot fail.
    let _ = write_wav(&mut buf, samples, sample_rate);
    buf
}

fn write_riff_header(w: &mut impl Write, data_size: u32) -> std::io::Result<()> {
    w.write_all(b"RIFF")?;
    w.write_all(&(36 + data_size).to_le_bytes())?;
    w.write_all(b"WAVE")
}

fn write_fmt_chunk(
    w: &mut impl Write,
    num_channels: u16,
    sample_rate: u32,
    block_align: u16,
    bits_per_sample: u16,
) -> std::io::Result<()> {
    w.write_all(b"fmt ")?;
    w.write_all(&16u32.to_le_bytes())?;
    w.write_all(&1u16.to_le_bytes())?;
    w.write_all(&num_channels.to_le_bytes())?;
    w.write_all(&sample_rate.to_le_bytes())?;
    w.write_all(&(sample_rate * block_align as u32).to_le_bytes())?;
    w.write_all(&block_align.to_le_bytes())?;
    w.write_all(&bits_per_sample.to_le_bytes())
}

fn write_data_chunk(w: &mut impl Write, samples: &[f32], data_size: u32) -> std::io::Result<()> {
    w.write_all(b"data")?;
    w.write_all(&data_size.to_le_bytes())?;
    for &s in samples {
        w.write_all(&to_pcm16(s).to_le_bytes())?;
    }
    Ok(())
}

fn to_pcm16(value: f32) -> i16 {
    if !value.is_finite() {
        return 0;
    }
    (value * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}
