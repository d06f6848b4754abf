// Hyperion
// Copyright (c) 2026 The Project Hyperion Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `cube` module moves raw samples between their on-disk layout and the in-memory cube.
//!
//! Raw samples travel as 2-byte words in a declared byte order and interleaving. In memory the
//! cube is always band-sequential: the predictor walks bands outermost no matter how the input
//! was laid out, so samples are materialized once, up front.

use log::debug;

use crate::errors::{config_error, Error, Result};
use crate::meta::{ByteOrder, ImageParams};
use crate::scan::ScanIter;

/// Allocate a zeroed cell buffer, surfacing allocation failure instead of aborting.
pub fn alloc_cells(len: usize) -> Result<Vec<u16>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| Error::AllocFailed)?;
    buf.resize(len, 0);
    Ok(buf)
}

/// Reads raw sample words into a band-sequential cube buffer.
///
/// Each word is masked to the declared dynamic range. The raw buffer length must match the image
/// extents exactly.
pub fn read_samples(image: &ImageParams, raw: &[u8]) -> Result<Vec<u16>> {
    let shape = image.shape();

    if raw.len() != shape.volume() * 2 {
        return config_error("cube: raw sample buffer does not match the image extents");
    }

    let mut cube = alloc_cells(shape.volume())?;

    let mask = (((1u32 << image.dyn_range) - 1) & 0xffff) as u16;

    let scan = ScanIter::new(shape, image.interleaving, image.interleaving_depth);
    for (i, (x, y, z)) in scan.enumerate() {
        let word = [raw[2 * i], raw[2 * i + 1]];
        let value = match image.byte_order {
            ByteOrder::Little => u16::from_le_bytes(word),
            ByteOrder::Big => u16::from_be_bytes(word),
        };
        cube[shape.bsq_index(x, y, z)] = value & mask;
    }

    debug!(
        "materialized {}x{}x{} cube ({} cells at {} bits)",
        image.x_size,
        image.y_size,
        image.z_size,
        shape.volume(),
        image.dyn_range
    );

    Ok(cube)
}

/// Serializes a band-sequential cube buffer into the declared raw layout.
pub fn write_samples(image: &ImageParams, cube: &[u16]) -> Vec<u8> {
    let shape = image.shape();
    debug_assert!(cube.len() == shape.volume());

    let mut raw = Vec::with_capacity(shape.volume() * 2);

    let scan = ScanIter::new(shape, image.interleaving, image.interleaving_depth);
    for (x, y, z) in scan {
        let value = cube[shape.bsq_index(x, y, z)];
        let word = match image.byte_order {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        };
        raw.extend_from_slice(&word);
    }

    raw
}
