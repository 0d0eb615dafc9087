//! Shared helpers for detector integration tests.

#![allow(dead_code)]

use hwmod::detector::config::RegisterResource;
use hwmod_detector::{
    Attribute, AttributeTree, DetectorResult, MemoryTree, NodeId, RegisterMapper,
    RegisterWindow, TreeError,
};
use parking_lot::{Mutex, MutexGuard};
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::NamedTempFile;

/// Serializes tests that touch the process-wide detector slot.
static GLOBAL_SLOT: Mutex<()> = parking_lot::const_mutex(());

pub fn lock_global() -> MutexGuard<'static, ()> {
    let guard = GLOBAL_SLOT.lock();
    hwmod_detector::detach();
    guard
}

/// Backing file holding `value` as a little-endian register at `offset`.
pub fn register_file(value: u32, offset: u64) -> (NamedTempFile, RegisterResource) {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&vec![0u8; offset as usize]).unwrap();
    file.write_all(&value.to_le_bytes()).unwrap();
    file.flush().unwrap();
    let resource = RegisterResource::new(file.path(), offset);
    (file, resource)
}

/// Mapper returning a fixed value and counting live windows.
pub struct FakeMapper {
    pub value: u32,
    pub live: Arc<AtomicUsize>,
}

impl FakeMapper {
    pub fn new(value: u32) -> Self {
        Self {
            value,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn live_windows(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

struct FakeWindow {
    value: u32,
    live: Arc<AtomicUsize>,
}

impl RegisterWindow for FakeWindow {
    fn read(&self) -> u32 {
        self.value
    }
}

impl Drop for FakeWindow {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

impl RegisterMapper for FakeMapper {
    fn map(&self, _resource: &RegisterResource) -> DetectorResult<Box<dyn RegisterWindow>> {
        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeWindow {
            value: self.value,
            live: Arc::clone(&self.live),
        }))
    }
}

/// Memory tree that refuses to create one attribute name.
#[derive(Default)]
pub struct FaultyTree {
    pub inner: MemoryTree,
    pub fail_on: Option<String>,
}

impl FaultyTree {
    pub fn failing_at(name: &str) -> Self {
        Self {
            inner: MemoryTree::new(),
            fail_on: Some(name.to_string()),
        }
    }
}

impl AttributeTree for FaultyTree {
    fn create_node(&self, class: &str, device: &str) -> Result<NodeId, TreeError> {
        self.inner.create_node(class, device)
    }

    fn remove_node(&self, node: &NodeId) {
        self.inner.remove_node(node)
    }

    fn create_file(&self, node: &NodeId, attr: Arc<Attribute>) -> Result<(), TreeError> {
        if self.fail_on.as_deref() == Some(attr.name()) {
            return Err(TreeError::Rejected {
                name: attr.name().to_string(),
            });
        }
        self.inner.create_file(node, attr)
    }

    fn remove_file(&self, node: &NodeId, name: &str) {
        self.inner.remove_file(node, name)
    }
}
