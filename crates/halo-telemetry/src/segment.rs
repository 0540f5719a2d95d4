#![allow(unsafe_code)]
//! Raw access to a mapped segment.
//!
//! Both ends keep the mapping alive and derive typed pointers into it. The
//! producer maps the file read-write, consumers map it read-only; consumers
//! only ever perform atomic loads and byte copies.

use memmap2::{Mmap, MmapMut};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::layout::{
    SampleCell, SegmentGeometry, SegmentHeader, HEADER_SIZE, MAGIC, RETIRED_MAGIC,
};

enum Mapping {
    Writable(MmapMut),
    ReadOnly(Mmap),
}

impl Mapping {
    fn len(&self) -> usize {
        match self {
            Mapping::Writable(m) => m.len(),
            Mapping::ReadOnly(m) => m.len(),
        }
    }
}

/// A mapped segment with pointers to its header, payload and trailer.
pub(crate) struct MappedSegment {
    path: PathBuf,
    mapping: Mapping,
    geometry: SegmentGeometry,

    /// SAFETY: points to the start of the mapping, valid while `mapping` lives
    header: *const SegmentHeader,

    /// SAFETY: points HEADER_SIZE bytes into the mapping, valid for
    /// `geometry.cell_count()` cells while `mapping` lives
    cells: *mut SampleCell,

    /// SAFETY: points `geometry.trailer_offset()` bytes into the mapping
    sequence: *const AtomicU32,
}

// SAFETY: the mapping is owned by the segment and every pointer is derived
// from it; moving the segment between threads moves the mapping with it.
unsafe impl Send for MappedSegment {}

impl std::fmt::Debug for MappedSegment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedSegment")
            .field("path", &self.path)
            .field("geometry", &self.geometry)
            .field("len", &self.mapping.len())
            .finish()
    }
}

impl MappedSegment {
    /// Wrap a writable mapping.
    ///
    /// # Safety
    /// `mmap.len()` must be at least `geometry.segment_bytes()`.
    pub(crate) unsafe fn writable(path: &Path, mut mmap: MmapMut, geometry: SegmentGeometry) -> Self {
        debug_assert!(mmap.len() >= geometry.segment_bytes());
        let base = mmap.as_mut_ptr();
        Self::from_base(path, base, Mapping::Writable(mmap), geometry)
    }

    /// Wrap a read-only mapping.
    ///
    /// # Safety
    /// `mmap.len()` must be at least `geometry.segment_bytes()`.
    pub(crate) unsafe fn read_only(path: &Path, mmap: Mmap, geometry: SegmentGeometry) -> Self {
        debug_assert!(mmap.len() >= geometry.segment_bytes());
        let base = mmap.as_ptr() as *mut u8;
        Self::from_base(path, base, Mapping::ReadOnly(mmap), geometry)
    }

    unsafe fn from_base(
        path: &Path,
        base: *mut u8,
        mapping: Mapping,
        geometry: SegmentGeometry,
    ) -> Self {
        Self {
            path: path.to_path_buf(),
            header: base as *const SegmentHeader,
            cells: base.add(HEADER_SIZE) as *mut SampleCell,
            sequence: base.add(geometry.trailer_offset()) as *const AtomicU32,
            mapping,
            geometry,
        }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn geometry(&self) -> SegmentGeometry {
        self.geometry
    }

    pub(crate) fn header(&self) -> &SegmentHeader {
        // SAFETY: the header pointer is valid and 4-byte aligned for the
        // lifetime of the mapping; mutable fields are atomics.
        unsafe { &*self.header }
    }

    pub(crate) fn sequence(&self) -> &AtomicU32 {
        // SAFETY: trailer_offset is a multiple of 4 inside the mapping
        unsafe { &*self.sequence }
    }

    pub(crate) fn is_writable(&self) -> bool {
        matches!(self.mapping, Mapping::Writable(_))
    }

    /// Write a fresh header and zero the sequence, then publish the magic.
    pub(crate) fn initialise(&self, data_size: u32) {
        debug_assert!(self.is_writable());
        let g = self.geometry;
        // SAFETY: the mapping is writable and at least segment_bytes long.
        // The magic stays retired until every other field is in place.
        unsafe {
            std::ptr::write(
                self.header as *mut SegmentHeader,
                SegmentHeader {
                    magic: AtomicU32::new(RETIRED_MAGIC),
                    timestamp: AtomicU32::new(0),
                    data_size,
                    stream_count: g.stream_count,
                    channel_count: g.channel_count,
                    sample_rate: g.sample_rate,
                },
            );
            std::ptr::write(self.sequence as *mut AtomicU32, AtomicU32::new(0));
        }
        self.header().magic.store(MAGIC, Ordering::Release);
    }

    /// Overwrite the payload. Only called by the producer inside an odd
    /// sequence window.
    pub(crate) fn write_cells(&self, cells: &[SampleCell]) {
        debug_assert!(self.is_writable());
        debug_assert_eq!(cells.len(), self.geometry.cell_count());
        // SAFETY: the payload region holds exactly cell_count cells and the
        // mapping is writable.
        unsafe {
            std::ptr::copy_nonoverlapping(cells.as_ptr(), self.cells, cells.len());
        }
    }

    /// Copy the payload out. The copy may be torn; callers validate it with
    /// the sequence counter.
    pub(crate) fn copy_cells(&self) -> Vec<SampleCell> {
        let count = self.geometry.cell_count();
        let mut out = vec![SampleCell::default(); count];
        // SAFETY: the payload region holds exactly cell_count cells; the
        // destination was allocated with the same length.
        unsafe {
            std::ptr::copy_nonoverlapping(self.cells as *const SampleCell, out.as_mut_ptr(), count);
        }
        out
    }
}
