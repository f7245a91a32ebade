//! Definite-length binary block decoding.
//!
//! Trace data comes back as an IEEE 488.2 definite-length block:
//!
//! ```text
//! '#'  <n: one digit 1-9>  <n ASCII digits: payload length L>  <L bytes>  <terminator>
//! ```
//!
//! The payload is a run of big-endian 64-bit floats (`FORM:DATA REAL,64`).
//! Complex S-parameter data is laid out as (real, imaginary) pairs.
//!
//! The channel may deliver fewer bytes than requested per read, so every
//! segment is accumulated across as many reads as needed, never asking for
//! more bytes than the segment has left.

use crate::adapters::DeviceChannel;
use crate::error::{AppResult, PnaError};
use crate::hardware::pna::measurement::select_command;
use bytes::{BufMut, Bytes, BytesMut};
use num_complex::Complex64;
use tracing::instrument;

/// Marker byte that opens a definite-length block.
const BLOCK_MARKER: u8 = b'#';

/// Width of one encoded float.
const FLOAT_WIDTH: usize = std::mem::size_of::<f64>();

/// How payload elements map onto samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// (real, imaginary) pairs, 16 bytes per sample
    Complex,
    /// one float per sample, 8 bytes per sample
    Scalar,
}

impl SampleFormat {
    /// Encoded bytes per sample.
    pub fn element_width(&self) -> usize {
        match self {
            SampleFormat::Complex => 2 * FLOAT_WIDTH,
            SampleFormat::Scalar => FLOAT_WIDTH,
        }
    }
}

/// Decoded samples for one measurement.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBlock {
    /// S-parameter data
    Complex(Vec<Complex64>),
    /// Formatted (phase-only) data
    Real(Vec<f64>),
}

impl SampleBlock {
    /// Number of samples
    pub fn len(&self) -> usize {
        match self {
            SampleBlock::Complex(samples) => samples.len(),
            SampleBlock::Real(samples) => samples.len(),
        }
    }

    /// True when the block holds no samples
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Complex samples, if this is an S-parameter block.
    pub fn as_complex(&self) -> Option<&[Complex64]> {
        match self {
            SampleBlock::Complex(samples) => Some(samples),
            SampleBlock::Real(_) => None,
        }
    }

    /// Real samples, if this is a formatted block.
    pub fn as_real(&self) -> Option<&[f64]> {
        match self {
            SampleBlock::Real(samples) => Some(samples),
            SampleBlock::Complex(_) => None,
        }
    }
}

/// Read exactly `len` bytes, at most `chunk` per channel read.
async fn read_exact(
    channel: &mut dyn DeviceChannel,
    len: usize,
    chunk: usize,
) -> AppResult<Bytes> {
    let chunk = chunk.max(1);
    // The declared length comes from the device; grow with what arrives.
    let mut buf = BytesMut::with_capacity(len.min(chunk));

    while buf.len() < len {
        let request = chunk.min(len - buf.len());
        let part = channel.read(request).await?;
        if part.is_empty() {
            return Err(PnaError::Channel(format!(
                "Channel returned no data with {} of {} bytes outstanding",
                len - buf.len(),
                len
            )));
        }
        if part.len() > request {
            return Err(PnaError::Channel(format!(
                "Channel returned {} bytes for a {} byte read",
                part.len(),
                request
            )));
        }
        buf.put(part);
    }

    Ok(buf.freeze())
}

/// Read one definite-length block from the channel and decode it.
///
/// Consumes the whole block including the trailing terminator, even when the
/// payload turns out not to be a whole number of samples. A framing error
/// therefore leaves the channel positioned after the block.
#[instrument(skip(channel), err)]
pub async fn read_block(
    channel: &mut dyn DeviceChannel,
    format: SampleFormat,
    chunk: usize,
) -> AppResult<SampleBlock> {
    let lead = read_exact(channel, 2, chunk).await?;
    if lead[0] != BLOCK_MARKER {
        return Err(PnaError::Framing(format!(
            "Expected block marker '#', got 0x{:02x}",
            lead[0]
        )));
    }

    let header_len = match lead[1] {
        digit @ b'1'..=b'9' => usize::from(digit - b'0'),
        other => {
            return Err(PnaError::Framing(format!(
                "Header length digit must be 1-9, got 0x{:02x}",
                other
            )))
        }
    };

    let header = read_exact(channel, header_len, chunk).await?;
    let payload_len: usize = std::str::from_utf8(&header)
        .ok()
        .filter(|text| text.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|text| text.parse().ok())
        .ok_or_else(|| {
            PnaError::Framing(format!(
                "Block byte count is not a decimal integer: {:?}",
                String::from_utf8_lossy(&header)
            ))
        })?;

    let payload = read_exact(channel, payload_len, chunk).await?;
    read_exact(channel, 1, chunk).await?;

    tracing::debug!(payload_len, ?format, "Read definite-length block");
    decode_payload(&payload, format)
}

/// Decode a raw payload (no header, no terminator).
pub fn decode_payload(payload: &[u8], format: SampleFormat) -> AppResult<SampleBlock> {
    let width = format.element_width();
    if payload.len() % width != 0 {
        return Err(PnaError::Framing(format!(
            "Payload of {} bytes is not a multiple of the {}-byte sample width",
            payload.len(),
            width
        )));
    }

    let floats = payload.chunks_exact(FLOAT_WIDTH).map(|bytes| {
        let mut raw = [0u8; FLOAT_WIDTH];
        raw.copy_from_slice(bytes);
        f64::from_be_bytes(raw)
    });

    let block = match format {
        SampleFormat::Scalar => SampleBlock::Real(floats.collect()),
        SampleFormat::Complex => {
            let values: Vec<f64> = floats.collect();
            SampleBlock::Complex(
                values
                    .chunks_exact(2)
                    .map(|pair| Complex64::new(pair[0], pair[1]))
                    .collect(),
            )
        }
    };
    Ok(block)
}

/// Encode floats as a definite-length block with a newline terminator.
///
/// Inverse of [`read_block`]; used by the simulated instrument.
pub fn encode_block(values: &[f64]) -> Bytes {
    let payload_len = values.len() * FLOAT_WIDTH;
    let digits = payload_len.to_string();

    let mut buf = BytesMut::with_capacity(2 + digits.len() + payload_len + 1);
    buf.put_u8(BLOCK_MARKER);
    buf.put_slice(digits.len().to_string().as_bytes());
    buf.put_slice(digits.as_bytes());
    for value in values {
        buf.put_f64(*value);
    }
    buf.put_u8(b'\n');
    buf.freeze()
}

/// Flatten complex samples into (re, im) floats.
pub fn interleave(samples: &[Complex64]) -> Vec<f64> {
    samples.iter().flat_map(|s| [s.re, s.im]).collect()
}

/// Fetch the complex S-parameter trace of a defined parameter.
#[instrument(skip(channel), err)]
pub async fn fetch_sdata(
    channel: &mut dyn DeviceChannel,
    parameter: &str,
    chunk: usize,
) -> AppResult<SampleBlock> {
    channel.write(&select_command(parameter)).await?;
    channel.write("CALC:DATA? SDATA").await?;
    read_block(channel, SampleFormat::Complex, chunk).await
}

/// Fetch the phase-formatted trace of a defined parameter.
#[instrument(skip(channel), err)]
pub async fn fetch_phase(
    channel: &mut dyn DeviceChannel,
    parameter: &str,
    chunk: usize,
) -> AppResult<SampleBlock> {
    channel.write(&select_command(parameter)).await?;
    channel.write("CALC:FORM PHAS").await?;
    channel.write("CALC:DATA? FDATA").await?;
    read_block(channel, SampleFormat::Scalar, chunk).await
}
