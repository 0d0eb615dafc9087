//! Register access: map the 4-byte capability register and read it.
//!
//! Mapping is the only fallible step. Once a [`RegisterWindow`] exists a
//! read is a single volatile 32-bit load with no caching.

use crate::error::{DetectorError, DetectorResult};
use hwmod::detector::config::RegisterResource;
use hwmod::detector::consts::MODULE_REG_SIZE;
use memmap2::{Mmap, MmapOptions};
use nix::unistd::{SysconfVar, sysconf};
use std::fs::OpenOptions;
use std::io;
use tracing::debug;

/// Fallback when `sysconf(_SC_PAGESIZE)` is unavailable
const FALLBACK_PAGE_SIZE: u64 = 4096;

/// A mapped, readable register.
///
/// Dropping the window unmaps the region.
pub trait RegisterWindow: Send + Sync {
    /// Load the current 32-bit register value.
    fn read(&self) -> u32;
}

/// Turns a register descriptor into a live mapping.
pub trait RegisterMapper {
    /// Map `resource`.
    ///
    /// # Errors
    /// - `ResourceUnavailable` if the descriptor is malformed or its backing
    ///   path does not exist
    /// - `MapFailed` if opening or mapping the region fails
    fn map(&self, resource: &RegisterResource) -> DetectorResult<Box<dyn RegisterWindow>>;
}

/// Maps registers out of a file with `mmap(2)`.
///
/// Works for `/dev/mem`, UIO nodes and regular files alike.
#[derive(Debug, Default, Clone, Copy)]
pub struct MmapRegisterMapper;

impl RegisterMapper for MmapRegisterMapper {
    fn map(&self, resource: &RegisterResource) -> DetectorResult<Box<dyn RegisterWindow>> {
        resource
            .check_geometry()
            .map_err(|reason| DetectorError::ResourceUnavailable { reason })?;

        if !resource.path.exists() {
            return Err(DetectorError::ResourceUnavailable {
                reason: format!("{} does not exist", resource.path.display()),
            });
        }

        let map_failed = |source: io::Error| DetectorError::MapFailed {
            path: resource.path.display().to_string(),
            source,
        };

        let file = OpenOptions::new()
            .read(true)
            .open(&resource.path)
            .map_err(map_failed)?;

        // Device nodes report a length of 0, only regular files can be checked.
        let metadata = file.metadata().map_err(map_failed)?;
        let end = resource
            .end()
            .ok_or_else(|| DetectorError::ResourceUnavailable {
                reason: format!("register offset {:#x} overflows", resource.offset),
            })?;
        if metadata.is_file() && metadata.len() < end {
            return Err(map_failed(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file is {} bytes, register ends at {end}", metadata.len()),
            )));
        }

        let page = page_size();
        let base = resource.offset - resource.offset % page;
        let delta = (resource.offset - base) as usize;

        // SAFETY: read-only mapping; the window never hands out references
        // into it, only volatile copies.
        let mmap = unsafe {
            MmapOptions::new()
                .offset(base)
                .len(delta + MODULE_REG_SIZE)
                .map(&file)
        }
        .map_err(map_failed)?;

        debug!(
            "Mapped register {}@{:#x} (page base {:#x})",
            resource.path.display(),
            resource.offset,
            base
        );

        Ok(Box::new(MmapRegister { mmap, delta }))
    }
}

/// Register window backed by a memory map.
pub struct MmapRegister {
    mmap: Mmap,
    /// Register offset inside the mapping
    delta: usize,
}

impl RegisterWindow for MmapRegister {
    fn read(&self) -> u32 {
        // SAFETY: `delta + 4 <= mmap.len()` by construction, and `delta` is
        // 4-byte aligned because the page base is and the offset is.
        let raw = unsafe {
            let ptr = self.mmap.as_ptr().add(self.delta) as *const u32;
            std::ptr::read_volatile(ptr)
        };
        u32::from_le(raw)
    }
}

/// System page size in bytes.
fn page_size() -> u64 {
    match sysconf(SysconfVar::PAGE_SIZE) {
        Ok(Some(size)) if size > 0 => size as u64,
        _ => FALLBACK_PAGE_SIZE,
    }
}
