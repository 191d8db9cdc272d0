//! Sparse bitmap compression.
//!
//! The encoding is recursive: a byte string is replaced by a bitset marking
//! its non-zero bytes (itself compressed the same way) followed by those
//! non-zero bytes. The all-zero input compresses to nothing. If encoding does
//! not shrink the input, the input is kept verbatim; the decoder tells the two
//! forms apart by comparing the payload length with the expected length.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("compressed payload exceeds target length")]
    ExceededTarget,

    #[error("compressed payload has unreferenced trailing data")]
    UnreferencedData,

    #[error("compressed payload is truncated")]
    MissingData,

    #[error("compressed payload references a zero byte")]
    ZeroContent,
}

/// Compress `data`. The result decodes back with [`decompress`] given `data.len()`.
pub fn compress(data: &[u8]) -> Vec<u8> {
    let out = bitset_encode(data);
    if out.len() < data.len() {
        out
    } else {
        data.to_vec()
    }
}

fn bitset_encode(data: &[u8]) -> Vec<u8> {
    match data {
        [] => Vec::new(),
        [0] => Vec::new(),
        [b] => vec![*b],
        _ => {
            let mut nonzero_bitset = vec![0u8; data.len().div_ceil(8)];
            let mut nonzero_bytes = Vec::with_capacity(data.len());
            for (i, &b) in data.iter().enumerate() {
                if b != 0 {
                    nonzero_bytes.push(b);
                    nonzero_bitset[i / 8] |= 1 << (7 - i % 8);
                }
            }
            if nonzero_bytes.is_empty() {
                return Vec::new();
            }
            let mut out = bitset_encode(&nonzero_bitset);
            out.extend_from_slice(&nonzero_bytes);
            out
        }
    }
}

/// Decompress `data` into exactly `target` bytes.
pub fn decompress(data: &[u8], target: usize) -> Result<Vec<u8>, Error> {
    if data.len() > target {
        return Err(Error::ExceededTarget);
    }
    if data.len() == target {
        return Ok(data.to_vec());
    }
    let (out, consumed) = bitset_decode_partial(data, target)?;
    if consumed != data.len() {
        return Err(Error::UnreferencedData);
    }
    Ok(out)
}

/// Decode a prefix of `data`, returning the output and the bytes consumed.
fn bitset_decode_partial(data: &[u8], target: usize) -> Result<(Vec<u8>, usize), Error> {
    if target == 0 {
        return Ok((Vec::new(), 0));
    }
    let mut decomp = vec![0u8; target];
    if data.is_empty() {
        return Ok((decomp, 0));
    }
    if target == 1 {
        decomp[0] = data[0];
        let consumed = usize::from(data[0] != 0);
        return Ok((decomp, consumed));
    }

    let (nonzero_bitset, mut ptr) = bitset_decode_partial(data, target.div_ceil(8))?;
    for i in 0..8 * nonzero_bitset.len() {
        if nonzero_bitset[i / 8] & (1 << (7 - i % 8)) == 0 {
            continue;
        }
        if ptr >= data.len() {
            return Err(Error::MissingData);
        }
        if i >= decomp.len() {
            return Err(Error::ExceededTarget);
        }
        if data[ptr] == 0 {
            return Err(Error::ZeroContent);
        }
        decomp[i] = data[ptr];
        ptr += 1;
    }
    Ok((decomp, ptr))
}
