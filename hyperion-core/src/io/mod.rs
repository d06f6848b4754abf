// Hyperion
// Copyright (c) 2026 The Project Hyperion Developers.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The `io` module implements bit-level I/O.
//!
//! Both the compressed-stream header and the entropy-coded payload are sequences of
//! most-significant-bit-first codewords with no byte alignment between them. The [`BitReaderLtr`]
//! and [`BitWriterLtr`] types provide the symmetric read and write halves of that bitstream.

mod bit;

pub use bit::{BitReaderLtr, BitWriterLtr};
