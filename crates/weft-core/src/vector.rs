//! # Vectors
//!
//! Unit-norm embeddings and their packed on-disk form.
//!
//! Every stored embedding is L2-normalized so that a plain dot product is the
//! cosine similarity. Packed vectors are little-endian `f32` runs; a reader
//! always goes through [`PackedVector`], which carries an explicit byte offset
//! and length into the backing buffer.

use crate::primitives::{ELEMENT_SIZE, NORM_TOLERANCE, ZERO_MAGNITUDE};
use crate::WeftError;

// =============================================================================
// EMBEDDING
// =============================================================================

/// A unit-norm embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// Normalize a raw provider vector to unit L2 norm.
    ///
    /// # Errors
    ///
    /// Returns `InvalidVector` for an empty vector, a non-finite component or
    /// a (near) zero magnitude.
    pub fn normalized(raw: &[f32]) -> Result<Self, WeftError> {
        if raw.is_empty() {
            return Err(WeftError::InvalidVector("empty vector".to_string()));
        }
        if raw.iter().any(|x| !x.is_finite()) {
            return Err(WeftError::InvalidVector("non-finite component".to_string()));
        }
        let magnitude = l2_norm(raw);
        if magnitude < ZERO_MAGNITUDE {
            return Err(WeftError::InvalidVector("zero magnitude".to_string()));
        }
        Ok(Self(raw.iter().map(|x| (f64::from(*x) / magnitude) as f32).collect()))
    }

    /// Wrap an already-normalized vector, checking the unit-norm invariant.
    pub fn from_unit(values: Vec<f32>) -> Result<Self, WeftError> {
        let norm = l2_norm(&values);
        if (norm - 1.0).abs() > NORM_TOLERANCE {
            return Err(WeftError::InvalidVector(format!(
                "norm {norm:.6} is not 1.0"
            )));
        }
        Ok(Self(values))
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.0.len()
    }

    /// L2 norm (1.0 within tolerance for every constructed embedding).
    #[must_use]
    pub fn norm(&self) -> f64 {
        l2_norm(&self.0)
    }

    /// Dot product, which equals cosine similarity for unit vectors.
    ///
    /// Returns `None` when the dimensions differ.
    #[must_use]
    pub fn dot(&self, other: &Embedding) -> Option<f32> {
        dot(&self.0, &other.0)
    }

    /// Pack into little-endian bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        pack(&self.0)
    }
}

// =============================================================================
// PACKED VECTOR
// =============================================================================

/// A borrowed view of a packed `f32` vector inside a byte buffer.
#[derive(Debug, Clone, Copy)]
pub struct PackedVector<'a> {
    buf: &'a [u8],
    offset: usize,
    len: usize,
}

impl<'a> PackedVector<'a> {
    /// View `len` bytes starting at `offset` within `buf`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidVector` if the range leaves the buffer or `len` is not a
    /// multiple of the element size.
    pub fn new(buf: &'a [u8], offset: usize, len: usize) -> Result<Self, WeftError> {
        let end = offset
            .checked_add(len)
            .ok_or_else(|| WeftError::InvalidVector("offset overflow".to_string()))?;
        if end > buf.len() {
            return Err(WeftError::InvalidVector(format!(
                "range {offset}..{end} exceeds buffer of {} bytes",
                buf.len()
            )));
        }
        if len % ELEMENT_SIZE != 0 {
            return Err(WeftError::InvalidVector(format!(
                "byte length {len} is not a multiple of {ELEMENT_SIZE}"
            )));
        }
        Ok(Self { buf, offset, len })
    }

    /// View a whole buffer.
    pub fn from_bytes(buf: &'a [u8]) -> Result<Self, WeftError> {
        Self::new(buf, 0, buf.len())
    }

    #[must_use]
    pub fn dimensions(&self) -> usize {
        self.len / ELEMENT_SIZE
    }

    /// The exact bytes of this vector.
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        &self.buf[self.offset..self.offset + self.len]
    }

    /// Decode components in order.
    pub fn iter(&self) -> impl Iterator<Item = f32> + 'a {
        self.bytes()
            .chunks_exact(ELEMENT_SIZE)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
    }

    /// Dot product against a query without materializing the vector.
    #[must_use]
    pub fn dot(&self, query: &[f32]) -> Option<f32> {
        if self.dimensions() != query.len() {
            return None;
        }
        Some(self.iter().zip(query).map(|(a, b)| a * b).sum())
    }

    #[must_use]
    pub fn to_vec(&self) -> Vec<f32> {
        self.iter().collect()
    }

    /// Decode and check the unit-norm invariant.
    pub fn to_embedding(&self) -> Result<Embedding, WeftError> {
        Embedding::from_unit(self.to_vec())
    }
}

/// Pack components as little-endian bytes.
#[must_use]
pub fn pack(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * ELEMENT_SIZE);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Dot product of two equal-length slices.
#[must_use]
pub fn dot(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() {
        return None;
    }
    Some(a.iter().zip(b).map(|(x, y)| x * y).sum())
}

fn l2_norm(values: &[f32]) -> f64 {
    values
        .iter()
        .map(|x| f64::from(*x) * f64::from(*x))
        .sum::<f64>()
        .sqrt()
}

// =============================================================================
// TESTS
// =============================================================================
