//! The shared frame buffer: one file-backed mapping the client writes and
//! the compositor reads, exposed to the compositor as a wl_shm pool plus a
//! single ARGB buffer carved from it.

use std::fs::{File, OpenOptions};
use std::os::fd::AsFd;

use memmap2::MmapMut;
use tracing::debug;
use wayland_client::protocol::wl_buffer::WlBuffer;
use wayland_client::protocol::wl_shm::{self, WlShm};
use wayland_client::protocol::wl_shm_pool::WlShmPool;
use wayland_client::QueueHandle;

use crate::error::HelperError;
use crate::wayland::Session;

/// Bytes for one frame: 32-bit premultiplied ARGB, stride = width * 4.
pub fn frame_len(width: i32, height: i32) -> usize {
    width as usize * height as usize * 4
}

/// Open the client-supplied pixel file. This is the only place the helper
/// acquires the descriptor, so no cleanup path can ever close one it did
/// not open itself.
pub fn open_pixel_file(path: &str) -> Result<File, HelperError> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|source| HelperError::ShmOpen { path: path.to_owned(), source })
}

/// The pixel file and its read-write mapping, always sized to exactly one
/// frame of the current geometry.
pub struct PixelMapping {
    map: MmapMut,
    file: File,
    len: usize,
}

impl PixelMapping {
    /// (Re)size the backing file to one frame and map the full range.
    pub fn from_file(file: File, width: i32, height: i32) -> Result<Self, HelperError> {
        let len = frame_len(width, height);
        file.set_len(len as u64).map_err(HelperError::ShmBuffers)?;
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(HelperError::ShmBuffers)?;
        Ok(PixelMapping { map, file, len })
    }

    pub fn clear(&mut self) {
        self.map.fill(0);
    }

    pub fn byte_len(&self) -> usize {
        self.len
    }
}

/// Compositor-side view of a [`PixelMapping`]: the shm pool over the same
/// fd and the one buffer handle attached on every commit.
pub struct FrameBuffer {
    mapping: PixelMapping,
    pool: WlShmPool,
    buffer: WlBuffer,
}

impl FrameBuffer {
    pub fn create(
        shm: &WlShm,
        qh: &QueueHandle<Session>,
        mapping: PixelMapping,
        width: i32,
        height: i32,
    ) -> Self {
        let pool = shm.create_pool(mapping.file.as_fd(), mapping.byte_len() as i32, qh, ());
        let buffer = pool.create_buffer(
            0,
            width,
            height,
            width * 4,
            wl_shm::Format::Argb8888,
            qh,
            (),
        );
        debug!("shm buffer created: {}x{} ({} bytes)", width, height, mapping.byte_len());
        FrameBuffer { mapping, pool, buffer }
    }

    /// Tear the binding down and rebuild it at new dimensions, reusing the
    /// already-open file. Release order matters: buffer, pool, mapping.
    pub fn resize(
        self,
        shm: &WlShm,
        qh: &QueueHandle<Session>,
        width: i32,
        height: i32,
    ) -> Result<Self, HelperError> {
        let PixelMapping { map, file, .. } = self.into_mapping();
        drop(map);
        let mapping = PixelMapping::from_file(file, width, height)?;
        Ok(Self::create(shm, qh, mapping, width, height))
    }

    /// Destroy the compositor-side objects, handing back the mapping.
    fn into_mapping(self) -> PixelMapping {
        self.buffer.destroy();
        self.pool.destroy();
        self.mapping
    }

    /// Full teardown: buffer, pool, then unmap and close.
    pub fn destroy(self) {
        drop(self.into_mapping());
    }

    pub fn wl_buffer(&self) -> &WlBuffer {
        &self.buffer
    }

    pub fn clear(&mut self) {
        self.mapping.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn mapping_is_sized_to_one_frame() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let file = open_pixel_file(tmp.path().to_str().unwrap()).unwrap();
        let mapping = PixelMapping::from_file(file, 8, 4).unwrap();
        assert_eq!(mapping.byte_len(), 8 * 4 * 4);
        assert_eq!(tmp.as_file().metadata().unwrap().len(), 8 * 4 * 4);
    }

    #[test]
    fn clear_zeroes_every_byte() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&[0xff; 64]).unwrap();
        let file = open_pixel_file(tmp.path().to_str().unwrap()).unwrap();
        let mut mapping = PixelMapping::from_file(file, 4, 4).unwrap();
        mapping.clear();
        assert!(mapping.map.iter().all(|&b| b == 0));
    }

    #[test]
    fn remap_tracks_the_new_geometry() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let file = open_pixel_file(tmp.path().to_str().unwrap()).unwrap();
        let mapping = PixelMapping::from_file(file, 4, 4).unwrap();
        let PixelMapping { map, file, .. } = mapping;
        drop(map);
        let remapped = PixelMapping::from_file(file, 16, 2).unwrap();
        assert_eq!(remapped.byte_len(), 16 * 2 * 4);
        assert_eq!(tmp.as_file().metadata().unwrap().len(), 16 * 2 * 4);
    }

    #[test]
    fn missing_file_reports_the_shm_open_code() {
        let err = open_pixel_file("/nonexistent/pixel-file").unwrap_err();
        assert_eq!(err.wire_code(), Some(layerhost_common::code::SHM_OPEN));
    }
}
