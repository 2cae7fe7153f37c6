//! WAV stitching
//!
//! Concatenates synthesized WAV segments into a single file with hound.
//! Every segment must share the first segment's format; pauses are written
//! as silence in that format.
//!
//! Streamed WAV responses carry placeholder RIFF and `data` sizes
//! (`0xFFFFFFFF`); those headers are rewritten to the bytes actually present
//! before decoding.

use docmind_common::errors::{AppError, Result};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::borrow::Cow;
use std::io::Cursor;

enum Samples {
    Int(Vec<i32>),
    Float(Vec<f32>),
}

/// Accumulates WAV segments and pauses
#[derive(Default)]
pub struct AudioStitcher {
    spec: Option<WavSpec>,
    samples: Option<Samples>,
}

impl AudioStitcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one WAV file
    pub fn push_segment(&mut self, wav: &[u8]) -> Result<()> {
        let wav = with_actual_sizes(wav);
        let mut reader = WavReader::new(Cursor::new(wav.as_ref()))?;
        let spec = reader.spec();

        match self.spec {
            None => {
                self.spec = Some(spec);
                self.samples = Some(match spec.sample_format {
                    SampleFormat::Int => Samples::Int(Vec::new()),
                    SampleFormat::Float => Samples::Float(Vec::new()),
                });
            }
            Some(first) if !same_format(&first, &spec) => {
                return Err(AppError::Audio {
                    message: format!(
                        "Segment format {}Hz/{}ch/{}bit differs from {}Hz/{}ch/{}bit",
                        spec.sample_rate,
                        spec.channels,
                        spec.bits_per_sample,
                        first.sample_rate,
                        first.channels,
                        first.bits_per_sample
                    ),
                });
            }
            Some(_) => {}
        }

        match self.samples.as_mut() {
            Some(Samples::Int(out)) => {
                for sample in reader.samples::<i32>() {
                    out.push(sample?);
                }
            }
            Some(Samples::Float(out)) => {
                for sample in reader.samples::<f32>() {
                    out.push(sample?);
                }
            }
            None => {}
        }
        Ok(())
    }

    /// Append silence; ignored before the first segment
    pub fn push_pause(&mut self, millis: u32) {
        let Some(spec) = self.spec else {
            return;
        };
        let count = (spec.sample_rate as u64 * millis as u64 / 1000) as usize * spec.channels as usize;
        match self.samples.as_mut() {
            Some(Samples::Int(out)) => out.extend(std::iter::repeat(0).take(count)),
            Some(Samples::Float(out)) => out.extend(std::iter::repeat(0.0).take(count)),
            None => {}
        }
    }

    /// Duration of everything pushed so far, in seconds
    pub fn duration_seconds(&self) -> f64 {
        let Some(spec) = self.spec else {
            return 0.0;
        };
        let total = match &self.samples {
            Some(Samples::Int(s)) => s.len(),
            Some(Samples::Float(s)) => s.len(),
            None => 0,
        };
        total as f64 / spec.channels.max(1) as f64 / spec.sample_rate.max(1) as f64
    }

    /// Encode the stitched audio; returns the WAV bytes and duration in seconds
    pub fn finish(self) -> Result<(Vec<u8>, f64)> {
        let duration = self.duration_seconds();
        let (Some(spec), Some(samples)) = (self.spec, self.samples) else {
            return Err(AppError::Audio {
                message: "No audio segments to stitch".to_string(),
            });
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = WavWriter::new(&mut cursor, spec)?;
            match samples {
                Samples::Int(values) => {
                    for v in values {
                        writer.write_sample(v)?;
                    }
                }
                Samples::Float(values) => {
                    for v in values {
                        writer.write_sample(v)?;
                    }
                }
            }
            writer.finalize()?;
        }

        Ok((cursor.into_inner(), duration))
    }
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Rewrite a `data` chunk size that overruns the buffer to the whole
/// sample frames actually present. Anything else is returned unchanged.
fn with_actual_sizes(wav: &[u8]) -> Cow<'_, [u8]> {
    if wav.len() < 12 || &wav[0..4] != b"RIFF" || &wav[8..12] != b"WAVE" {
        return Cow::Borrowed(wav);
    }

    let mut block_align = 1usize;
    let mut pos = 12usize;
    while let Some(size) = read_u32(wav, pos + 4) {
        let id = &wav[pos..pos + 4];
        let body = pos + 8;
        let available = wav.len() - body;

        if id == b"fmt " {
            if let Some(align) = wav.get(body + 12..body + 14) {
                block_align = (u16::from_le_bytes([align[0], align[1]]) as usize).max(1);
            }
        } else if id == b"data" {
            if size as usize <= available {
                return Cow::Borrowed(wav);
            }
            let data_len = available - available % block_align;
            let mut fixed = wav[..body + data_len].to_vec();
            fixed[4..8].copy_from_slice(&((body + data_len - 8) as u32).to_le_bytes());
            fixed[pos + 4..pos + 8].copy_from_slice(&(data_len as u32).to_le_bytes());
            return Cow::Owned(fixed);
        }

        // chunks are padded to even lengths
        pos = body + size as usize + (size as usize & 1);
        if pos + 8 > wav.len() {
            break;
        }
    }
    Cow::Borrowed(wav)
}

fn same_format(a: &WavSpec, b: &WavSpec) -> bool {
    a.channels == b.channels
        && a.sample_rate == b.sample_rate
        && a.bits_per_sample == b.bits_per_sample
        && a.sample_format == b.sample_format
}
