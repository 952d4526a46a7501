//! Typed 2D pixel buffers.
//!
//! A [`Surface`] is an immutable rectangular buffer of `u8`, `u16`, `i16`
//! or `i32` samples with an aligned row stride. Surfaces are built once
//! through [`SurfaceBuilder`] (`reserve`, `fill` or `generate`), sealed by
//! `finish`, and then shared by cheap clones; plane payloads flow between
//! pipeline stages as `Surface`s.

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::Arc;

use crate::{Error, Result};

// Row starts are aligned to this many bytes; a power of two so strides
// stay power-of-two multiples of the element size.
const ROW_ALIGN: usize = 64;

/// Sample types a [`Surface`] may hold.
pub trait Element: bytemuck::Pod + Default + PartialEq + std::fmt::Debug {}

impl Element for u8 {}
impl Element for u16 {}
impl Element for i16 {}
impl Element for i32 {}

/// Immutable typed 2D buffer with an aligned row stride.
#[derive(Clone, Debug)]
pub struct Surface<T> {
    width: usize,
    height: usize,
    // In elements, >= width, power-of-two aligned in bytes
    stride: usize,
    data: Arc<[T]>,
}

impl<T: Element> Surface<T> {
    /// Start building a new surface.
    pub fn build() -> SurfaceBuilder<T> {
        SurfaceBuilder { inner: None }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Row stride in elements.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Read the sample at `(x, y)`; panics when out of bounds.
    #[inline]
    pub fn read(&self, x: usize, y: usize) -> T {
        debug_assert!(x < self.width && y < self.height);
        self.data[y * self.stride + x]
    }

    /// One row of samples, `width` elements long.
    #[inline]
    pub fn row(&self, y: usize) -> &[T] {
        let start = y * self.stride;
        &self.data[start..start + self.width]
    }
}

impl<T: Element> PartialEq for Surface<T> {
    fn eq(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && (0..self.height).all(|y| self.row(y) == other.row(y))
    }
}

fn aligned_stride<T>(width: usize) -> usize {
    let esize = std::mem::size_of::<T>();
    let bytes = (width.max(1) * esize + ROW_ALIGN - 1) & !(ROW_ALIGN - 1);
    bytes / esize
}

/// Write access to a surface under construction.
///
/// Sealed into an immutable [`Surface`] by [`SurfaceBuilder::finish`];
/// there is no mutation after that point.
pub struct SurfaceBuilder<T> {
    inner: Option<BuilderInner<T>>,
}

struct BuilderInner<T> {
    width: usize,
    height: usize,
    stride: usize,
    data: Box<[T]>,
}

impl<T: Element> SurfaceBuilder<T> {
    /// Allocate a zeroed `width` x `height` buffer.
    pub fn reserve(mut self, width: usize, height: usize) -> Result<Self> {
        let stride = aligned_stride::<T>(width);
        let elements = stride
            .checked_mul(height.max(1))
            .ok_or(Error::OutOfMemory)?;
        let data = bytemuck::allocation::try_zeroed_slice_box(elements)
            .map_err(|_| Error::OutOfMemory)?;
        self.inner = Some(BuilderInner {
            width,
            height,
            stride,
            data,
        });
        Ok(self)
    }

    /// Allocate and fill every sample with `value`.
    pub fn fill(self, value: T, width: usize, height: usize) -> Result<Self> {
        let mut b = self.reserve(width, height)?;
        let inner = b.inner.as_mut().unwrap();
        for v in inner.data.iter_mut() {
            *v = value;
        }
        Ok(b)
    }

    /// Allocate and compute every sample from `(x, y)`.
    pub fn generate<F: FnMut(usize, usize) -> T>(
        self,
        width: usize,
        height: usize,
        mut f: F,
    ) -> Result<Self> {
        let mut b = self.reserve(width, height)?;
        let inner = b.inner.as_mut().unwrap();
        for y in 0..height {
            let row = &mut inner.data[y * inner.stride..y * inner.stride + width];
            for (x, v) in row.iter_mut().enumerate() {
                *v = f(x, y);
            }
        }
        Ok(b)
    }

    /// Write the sample at `(x, y)`.
    #[inline]
    pub fn write(&mut self, x: usize, y: usize, value: T) {
        let inner = self.inner.as_mut().expect("write before reserve");
        debug_assert!(x < inner.width && y < inner.height);
        inner.data[y * inner.stride + x] = value;
    }

    /// Mutable row of samples, `width` elements long.
    #[inline]
    pub fn row_mut(&mut self, y: usize) -> &mut [T] {
        let inner = self.inner.as_mut().expect("row_mut before reserve");
        let start = y * inner.stride;
        let width = inner.width;
        &mut inner.data[start..start + width]
    }

    /// Seal into an immutable surface.
    pub fn finish(self) -> Surface<T> {
        let inner = self.inner.expect("finish before reserve");
        Surface {
            width: inner.width,
            height: inner.height,
            stride: inner.stride,
            data: Arc::from(inner.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_is_aligned_and_covers_width() {
        let s = Surface::<i16>::build().reserve(333, 2).unwrap().finish();
        assert!(s.stride() >= s.width());
        let stride_bytes = s.stride() * std::mem::size_of::<i16>();
        assert_eq!(stride_bytes % ROW_ALIGN, 0);
    }

    #[test]
    fn generate_and_read() {
        let s = Surface::<i16>::build()
            .generate(4, 3, |x, y| (10 * y + x) as i16)
            .unwrap()
            .finish();
        assert_eq!(s.read(0, 0), 0);
        assert_eq!(s.read(3, 2), 23);
        assert_eq!(s.row(1), &[10, 11, 12, 13]);
    }

    #[test]
    fn fill_is_uniform() {
        let s = Surface::<u8>::build().fill(7, 5, 5).unwrap().finish();
        assert!((0..5).all(|y| s.row(y).iter().all(|&v| v == 7)));
    }

    #[test]
    fn reserve_is_zeroed() {
        let s = Surface::<i32>::build().reserve(9, 9).unwrap().finish();
        assert!((0..9).all(|y| s.row(y).iter().all(|&v| v == 0)));
    }

    #[test]
    fn builder_write() {
        let mut b = Surface::<i16>::build().reserve(2, 2).unwrap();
        b.write(1, 0, -5);
        b.write(0, 1, 6);
        let s = b.finish();
        assert_eq!(s.read(1, 0), -5);
        assert_eq!(s.read(0, 1), 6);
        assert_eq!(s.read(0, 0), 0);
    }
}
