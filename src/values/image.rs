//! Image and histogram buffer cells
//!
//! Images are large enough that re-sending the whole plane on every change
//! is not acceptable. A write can therefore carry a sub-rectangle: only
//! that region is considered changed and only the still-pending region is
//! transmitted at flush time. Overlapping pending rectangles coalesce into
//! their union bounding rectangle. A histogram is a small bucket buffer
//! whose "clear" path deliberately transmits no buffer at all.

use bytes::Bytes;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::schema::ValueId;
use crate::transport::{ImagePatch, SyncMessage};

/// Sub-rectangle of an image, in pixels: `[y, x]` origin, `h * w` extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub y: u32,
    pub x: u32,
    pub h: u32,
    pub w: u32,
}

impl Rect {
    /// Union bounding rectangle of two rects
    pub fn union(&self, other: &Rect) -> Rect {
        // widen so extents near u32::MAX cannot overflow
        let y = self.y.min(other.y);
        let x = self.x.min(other.x);
        let bottom = (self.y as u64 + self.h as u64).max(other.y as u64 + other.h as u64);
        let right = (self.x as u64 + self.w as u64).max(other.x as u64 + other.w as u64);
        Rect {
            y,
            x,
            h: (bottom - y as u64) as u32,
            w: (right - x as u64) as u32,
        }
    }

    /// Whether this rect lies fully inside an image of `size` `[h, w]`
    pub fn fits(&self, size: [u32; 2]) -> bool {
        self.y as u64 + self.h as u64 <= size[0] as u64
            && self.x as u64 + self.w as u64 <= size[1] as u64
    }
}

/// Pixel layout of an image plane
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    Gray,
    GrayAlpha,
    Rgb,
    Rgba,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Gray => 1,
            PixelFormat::GrayAlpha => 2,
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// One image plane: `size` is `[height, width]`, `data` row-major pixels
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    pub size: [u32; 2],
    pub format: PixelFormat,
    pub data: Bytes,
}

impl ImageFrame {
    pub fn new(size: [u32; 2], format: PixelFormat, data: impl Into<Bytes>) -> Self {
        Self {
            size,
            format,
            data: data.into(),
        }
    }

    fn expected_len(&self) -> usize {
        self.size[0] as usize * self.size[1] as usize * self.format.bytes_per_pixel()
    }
}

enum ImageDirty {
    Clean,
    Full,
    Rect(Rect),
}

struct Stored {
    size: [u32; 2],
    format: PixelFormat,
    data: Vec<u8>,
}

struct Inner {
    stored: Option<Stored>,
    dirty: ImageDirty,
    pending: bool,
}

pub(crate) struct ImageCell {
    id: ValueId,
    inner: RwLock<Inner>,
}

impl ImageCell {
    pub(crate) fn new(id: ValueId) -> Self {
        Self {
            id,
            inner: RwLock::new(Inner {
                stored: None,
                dirty: ImageDirty::Clean,
                pending: false,
            }),
        }
    }

    fn shape_err(&self, reason: impl Into<String>) -> StoreError {
        StoreError::ShapeMismatch {
            id: self.id,
            reason: reason.into(),
        }
    }

    /// Write the image. `rect: None` replaces the whole plane; `rect:
    /// Some(r)` writes only that region (`frame` then holds exactly the
    /// region's pixels and `frame.size` must equal `[r.h, r.w]`).
    pub(crate) fn set(
        &self,
        frame: ImageFrame,
        update: bool,
        rect: Option<Rect>,
    ) -> Result<(), StoreError> {
        if frame.data.len() != frame.expected_len() {
            return Err(self.shape_err(format!(
                "buffer holds {} bytes, {:?} {}x{} needs {}",
                frame.data.len(),
                frame.format,
                frame.size[0],
                frame.size[1],
                frame.expected_len()
            )));
        }

        let mut w = self.inner.write();
        match rect {
            None => {
                w.stored = Some(Stored {
                    size: frame.size,
                    format: frame.format,
                    data: frame.data.to_vec(),
                });
                w.dirty = ImageDirty::Full;
            }
            Some(r) => {
                let stored = w
                    .stored
                    .as_mut()
                    .ok_or_else(|| self.shape_err("partial update before any full image"))?;
                if frame.format != stored.format {
                    return Err(self.shape_err(format!(
                        "patch format {:?} does not match stored {:?}",
                        frame.format, stored.format
                    )));
                }
                if frame.size != [r.h, r.w] {
                    return Err(self.shape_err(format!(
                        "patch buffer is {}x{} but rect is {}x{}",
                        frame.size[0], frame.size[1], r.h, r.w
                    )));
                }
                if !r.fits(stored.size) {
                    return Err(self.shape_err(format!(
                        "rect {:?} outside image {}x{}",
                        r, stored.size[0], stored.size[1]
                    )));
                }

                let bpp = stored.format.bytes_per_pixel();
                let stride = stored.size[1] as usize * bpp;
                let row_len = r.w as usize * bpp;
                for row in 0..r.h as usize {
                    let dst = (r.y as usize + row) * stride + r.x as usize * bpp;
                    let src = row * row_len;
                    stored.data[dst..dst + row_len]
                        .copy_from_slice(&frame.data[src..src + row_len]);
                }

                // overlapping partials coalesce to the union bounding rect
                w.dirty = match w.dirty {
                    ImageDirty::Clean => ImageDirty::Rect(r),
                    ImageDirty::Full => ImageDirty::Full,
                    ImageDirty::Rect(prev) => ImageDirty::Rect(prev.union(&r)),
                };
            }
        }
        w.pending |= update;
        Ok(())
    }

    /// Snapshot of the whole image, `None` until the first full write
    pub(crate) fn get(&self) -> Option<ImageFrame> {
        let r = self.inner.read();
        r.stored.as_ref().map(|s| ImageFrame {
            size: s.size,
            format: s.format,
            data: Bytes::copy_from_slice(&s.data),
        })
    }

    pub(crate) fn mark_dirty(&self) {
        let mut w = self.inner.write();
        if w.stored.is_some() {
            w.dirty = ImageDirty::Full;
            w.pending = true;
        }
    }

    /// Take the still-pending region as a patch message
    pub(crate) fn flush(&self) -> Option<SyncMessage> {
        let mut w = self.inner.write();
        if !w.pending {
            return None;
        }
        w.pending = false;
        let dirty = std::mem::replace(&mut w.dirty, ImageDirty::Clean);
        let stored = w.stored.as_ref()?;

        let patch = match dirty {
            ImageDirty::Clean => return None,
            ImageDirty::Full => ImagePatch {
                size: stored.size,
                format: stored.format,
                rect: None,
                data: stored.data.clone(),
            },
            ImageDirty::Rect(r) => {
                let bpp = stored.format.bytes_per_pixel();
                let stride = stored.size[1] as usize * bpp;
                let row_len = r.w as usize * bpp;
                let mut data = Vec::with_capacity(r.h as usize * row_len);
                for row in 0..r.h as usize {
                    let src = (r.y as usize + row) * stride + r.x as usize * bpp;
                    data.extend_from_slice(&stored.data[src..src + row_len]);
                }
                ImagePatch {
                    size: stored.size,
                    format: stored.format,
                    rect: Some(r),
                    data,
                }
            }
        };
        Some(SyncMessage::Image { id: self.id, patch })
    }
}

enum HistDirty {
    Clean,
    Replace,
    Cleared,
}

struct HistInner {
    buckets: Vec<f32>,
    dirty: HistDirty,
    pending: bool,
}

/// Bucket-count buffer; clearing transmits no buffer at all
pub(crate) struct HistogramCell {
    id: ValueId,
    inner: RwLock<HistInner>,
}

impl HistogramCell {
    pub(crate) fn new(id: ValueId) -> Self {
        Self {
            id,
            inner: RwLock::new(HistInner {
                buckets: Vec::new(),
                dirty: HistDirty::Clean,
                pending: false,
            }),
        }
    }

    /// `Some` replaces the buckets, `None` clears without allocating a
    /// zero buffer
    pub(crate) fn set(&self, buckets: Option<Vec<f32>>, update: bool) {
        let mut w = self.inner.write();
        match buckets {
            Some(buckets) => {
                w.buckets = buckets;
                w.dirty = HistDirty::Replace;
            }
            None => {
                w.buckets.clear();
                w.dirty = HistDirty::Cleared;
            }
        }
        w.pending |= update;
    }

    pub(crate) fn get(&self) -> Vec<f32> {
        self.inner.read().buckets.clone()
    }

    pub(crate) fn mark_dirty(&self) {
        let mut w = self.inner.write();
        w.dirty = if w.buckets.is_empty() {
            HistDirty::Cleared
        } else {
            HistDirty::Replace
        };
        w.pending = true;
    }

    pub(crate) fn flush(&self) -> Option<SyncMessage> {
        let mut w = self.inner.write();
        if !w.pending {
            return None;
        }
        w.pending = false;
        let dirty = std::mem::replace(&mut w.dirty, HistDirty::Clean);
        let buckets = match dirty {
            HistDirty::Clean => return None,
            HistDirty::Replace => Some(w.buckets.clone()),
            HistDirty::Cleared => None,
        };
        Some(SyncMessage::Histogram {
            id: self.id,
            buckets,
        })
    }
}
