// Hyperion
// Copyright (c) 2026 The Project Hyperion Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A lossless CCSDS 123.0-B-1 compressor and decompressor for multispectral and hyperspectral
//! image cubes.
//!
//! Compression runs the cube through an adaptive per-band linear predictor and entropy-codes
//! the mapped residuals with either a sample-adaptive Golomb coder or a block-adaptive Rice
//! coder. The compressed stream is self-describing: a packed header carries everything needed
//! to reconstruct the configuration, and [`decompress`] recovers the raw samples bit for bit.
//!
//! All state lives inside a single call. Nothing survives a compression or decompression, and a
//! failed call yields only the error.

#![warn(rust_2018_idioms)]
#![forbid(unsafe_code)]
// The following lints are allowed in all Hyperion crates. Please see the workspace Cargo.toml for
// their justification.
#![allow(clippy::comparison_chain)]
#![allow(clippy::identity_op)]
#![allow(clippy::manual_range_contains)]
// Disable to better express the edge-case ladders of the standard.
#![allow(clippy::collapsible_else_if)]

mod entropy;
mod header;
mod predictor;

use std::io;

use log::debug;

use hyperion_core::cube::{alloc_cells, read_samples, write_samples};
use hyperion_core::errors::Result;
use hyperion_core::io::{BitReaderLtr, BitWriterLtr};
use hyperion_core::meta::{validate_config, EncoderParams, ImageParams, PredictorParams};
use hyperion_core::scan::ScanIter;

use entropy::{ResidualDecoder, ResidualEncoder};

pub use predictor::{predict, unpredict};

/// The outcome of a successful [`decompress`] call.
#[derive(Debug)]
pub struct Decompressed {
    /// Image description recovered from the header.
    pub image: ImageParams,
    /// Predictor configuration recovered from the header.
    pub predictor: PredictorParams,
    /// Encoder configuration recovered from the header.
    pub encoder: EncoderParams,
    /// The raw samples, serialized in the image's declared layout and byte order.
    pub samples: Vec<u8>,
}

/// Compresses a raw sample cube into `sink` and returns the number of bytes written.
///
/// `samples` must hold exactly `x_size * y_size * z_size` two-byte words in the layout the
/// image descriptor declares. The configuration is validated in full before anything is
/// allocated or written; a failed call leaves only whatever prefix reached the sink, which the
/// caller should discard.
pub fn compress<W: io::Write>(
    image: &ImageParams,
    predictor: &PredictorParams,
    encoder: &EncoderParams,
    samples: &[u8],
    sink: &mut W,
) -> Result<u64> {
    image.validate()?;

    // More previous bands than the cube holds degrade to the available count, as opposed to
    // being rejected. The clamped value is what the header carries.
    let mut predictor = predictor.clone();
    predictor.bands = predictor.effective_bands(image.z_size);

    validate_config(image, &predictor, encoder)?;

    let cube = read_samples(image, samples)?;
    let residuals = predict(image, &predictor, &cube)?;

    let mut bw = BitWriterLtr::new(sink);
    header::write_header(&mut bw, image, &predictor, encoder)?;

    let shape = image.shape();
    let mut coder = ResidualEncoder::new(image, encoder);

    for (x, y, z) in ScanIter::new(shape, encoder.interleaving, encoder.interleaving_depth) {
        coder.encode_one(&mut bw, z as usize, residuals[shape.bsq_index(x, y, z)])?;
    }
    coder.finish(&mut bw)?;

    bw.align()?;
    bw.pad_to_word(u64::from(encoder.word_size))?;

    let written = bw.bytes_written();

    debug!(
        "compressed {} samples into {} bytes ({:.3} bits/sample)",
        shape.volume(),
        written,
        written as f64 * 8.0 / shape.volume() as f64
    );

    Ok(written)
}

/// Decompresses a complete compressed stream back into raw samples.
///
/// The recovered configuration records equal the ones the stream was produced with, and the
/// sample buffer is byte-identical to the compressor's input.
pub fn decompress(stream: &[u8]) -> Result<Decompressed> {
    let mut br = BitReaderLtr::new(stream);

    let (image, predictor, encoder) = header::parse_header(&mut br)?;

    let shape = image.shape();
    let mut residuals = alloc_cells(shape.volume())?;

    let mut coder = ResidualDecoder::new(&image, &encoder, shape.volume() as u64);

    for (x, y, z) in ScanIter::new(shape, encoder.interleaving, encoder.interleaving_depth) {
        residuals[shape.bsq_index(x, y, z)] = coder.decode_one(&mut br, z as usize)?;
    }

    let cube = unpredict(&image, &predictor, &residuals)?;
    let samples = write_samples(&image, &cube);

    debug!("decompressed {} samples from {} bytes", shape.volume(), stream.len());

    Ok(Decompressed { image, predictor, encoder, samples })
}
