//! Attribute registry: the observer-visible surface of the detector.
//!
//! One aggregate attribute (`module_bits`) and one attribute per register bit
//! (`module_0` .. `module_31`) are published under a namespace node of an
//! [`AttributeTree`]. Publishing is all-or-nothing: handles are collected in an
//! [`AttributeSetBuilder`] and released again if any single creation fails.
//!
//! Two trees are provided:
//!
//! - [`MemoryTree`] - in-process, readable through [`MemoryTree::read`]
//! - [`DirTree`] - one directory per node and one read-only file per attribute
//!
//! ```text
//!   <root>/hw_module/hw_module/
//!       module_bits   "0x0000002a\n"
//!       module_0      "0\n"
//!       module_1      "1\n"
//!       ...
//! ```

use crate::bitmask::ModuleBits;
use crate::error::TreeError;
use hwmod::detector::consts::{ATTR_MODE, MASK_ATTR_NAME, MODULE_BIT_COUNT, bit_attr_name};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Read handler of an attribute.
pub type ShowFn = Box<dyn Fn() -> String + Send + Sync>;

/// A named, read-only attribute.
pub struct Attribute {
    name: String,
    mode: u32,
    show: ShowFn,
}

impl Attribute {
    /// Read-only attribute whose content is produced by `show`.
    pub fn read_only(name: impl Into<String>, show: ShowFn) -> Self {
        Self {
            name: name.into(),
            mode: ATTR_MODE,
            show,
        }
    }

    /// Attribute name within its node.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Permission bits.
    pub fn mode(&self) -> u32 {
        self.mode
    }

    /// Run the read handler.
    pub fn render(&self) -> String {
        (self.show)()
    }
}

impl fmt::Debug for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attribute")
            .field("name", &self.name)
            .field("mode", &format_args!("{:#o}", self.mode))
            .finish_non_exhaustive()
    }
}

/// Identifies a namespace node of a tree (`"<class>/<device>"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(String);

impl NodeId {
    /// Node for `device` under `class`.
    pub fn new(class: &str, device: &str) -> Self {
        Self(format!("{class}/{device}"))
    }

    /// Relative path of the node.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Namespace into which attributes are published.
///
/// Removal is best-effort and never fails; removing something that is not
/// there is a no-op.
pub trait AttributeTree: Send + Sync {
    /// Create the node `class/device`.
    fn create_node(&self, class: &str, device: &str) -> Result<NodeId, TreeError>;

    /// Remove a node created by `create_node`.
    fn remove_node(&self, node: &NodeId);

    /// Publish `attr` under `node`. Names are unique per node.
    fn create_file(&self, node: &NodeId, attr: Arc<Attribute>) -> Result<(), TreeError>;

    /// Withdraw the attribute `name` from `node`.
    fn remove_file(&self, node: &NodeId, name: &str);
}

// ─── In-memory tree ─────────────────────────────────────────────────

/// Attribute tree held in process memory.
#[derive(Default)]
pub struct MemoryTree {
    nodes: Mutex<BTreeMap<NodeId, BTreeMap<String, Arc<Attribute>>>>,
}

impl MemoryTree {
    /// Empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read attribute `name` under `node`, as an observer would.
    pub fn read(&self, node: &NodeId, name: &str) -> Option<String> {
        let attr = self.nodes.lock().get(node)?.get(name).cloned()?;
        Some(attr.render())
    }

    /// Attribute names under `node`, sorted.
    pub fn list(&self, node: &NodeId) -> Vec<String> {
        self.nodes
            .lock()
            .get(node)
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `node` currently exists.
    pub fn node_exists(&self, node: &NodeId) -> bool {
        self.nodes.lock().contains_key(node)
    }

    /// Number of existing nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Number of attributes published across all nodes.
    pub fn file_count(&self) -> usize {
        self.nodes.lock().values().map(BTreeMap::len).sum()
    }
}

impl AttributeTree for MemoryTree {
    fn create_node(&self, class: &str, device: &str) -> Result<NodeId, TreeError> {
        let node = NodeId::new(class, device);
        let mut nodes = self.nodes.lock();
        if nodes.contains_key(&node) {
            return Err(TreeError::AlreadyExists {
                name: node.to_string(),
            });
        }
        nodes.insert(node.clone(), BTreeMap::new());
        Ok(node)
    }

    fn remove_node(&self, node: &NodeId) {
        self.nodes.lock().remove(node);
    }

    fn create_file(&self, node: &NodeId, attr: Arc<Attribute>) -> Result<(), TreeError> {
        let mut nodes = self.nodes.lock();
        let files = nodes.get_mut(node).ok_or_else(|| TreeError::NodeMissing {
            node: node.to_string(),
        })?;
        if files.contains_key(attr.name()) {
            return Err(TreeError::AlreadyExists {
                name: attr.name().to_string(),
            });
        }
        files.insert(attr.name().to_string(), attr);
        Ok(())
    }

    fn remove_file(&self, node: &NodeId, name: &str) {
        if let Some(files) = self.nodes.lock().get_mut(node) {
            files.remove(name);
        }
    }
}

// ─── Directory-backed tree ──────────────────────────────────────────

/// Attribute tree materialized as directories and read-only files.
///
/// Contents are rendered once at publish time; every value published by the
/// detector is immutable while it is attached.
#[derive(Debug, Clone)]
pub struct DirTree {
    root: PathBuf,
}

impl DirTree {
    /// Tree rooted at `root` (created on demand).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory backing `node`.
    pub fn node_path(&self, node: &NodeId) -> PathBuf {
        self.root.join(node.as_str())
    }
}

fn collision_or_io(name: &str, err: io::Error) -> TreeError {
    if err.kind() == io::ErrorKind::AlreadyExists {
        TreeError::AlreadyExists {
            name: name.to_string(),
        }
    } else {
        TreeError::Io { source: err }
    }
}

impl AttributeTree for DirTree {
    fn create_node(&self, class: &str, device: &str) -> Result<NodeId, TreeError> {
        let node = NodeId::new(class, device);
        fs::create_dir_all(self.root.join(class))?;
        fs::create_dir(self.node_path(&node)).map_err(|e| collision_or_io(node.as_str(), e))?;
        Ok(node)
    }

    fn remove_node(&self, node: &NodeId) {
        let path = self.node_path(node);
        match fs::remove_dir(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove node {}: {}", path.display(), e),
        }
        // The class directory goes once its last device is gone.
        if let Some(class_dir) = path.parent() {
            let _ = fs::remove_dir(class_dir);
        }
    }

    fn create_file(&self, node: &NodeId, attr: Arc<Attribute>) -> Result<(), TreeError> {
        let dir = self.node_path(node);
        if !dir.is_dir() {
            return Err(TreeError::NodeMissing {
                node: node.to_string(),
            });
        }

        let path = dir.join(attr.name());
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(attr.mode())
            .open(&path)
            .map_err(|e| collision_or_io(attr.name(), e))?;

        if let Err(e) = file.write_all(attr.render().as_bytes()) {
            let _ = fs::remove_file(&path);
            return Err(e.into());
        }
        Ok(())
    }

    fn remove_file(&self, node: &NodeId, name: &str) {
        let path = self.node_path(node).join(name);
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!("Failed to remove attribute {}: {}", path.display(), e),
        }
    }
}

// ─── Attribute set ──────────────────────────────────────────────────

/// Handles of the attributes published for one detector.
///
/// Slot `i` holds `module_i` iff that attribute is currently published.
pub struct AttributeSet {
    node: NodeId,
    aggregate: Option<Arc<Attribute>>,
    bits: [Option<Arc<Attribute>>; MODULE_BIT_COUNT],
}

impl AttributeSet {
    fn empty(node: NodeId) -> Self {
        Self {
            node,
            aggregate: None,
            bits: std::array::from_fn(|_| None),
        }
    }

    /// Node the attributes live under.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// The aggregate `module_bits` attribute, if published.
    pub fn aggregate(&self) -> Option<&Attribute> {
        self.aggregate.as_deref()
    }

    /// The `module_<bit>` attribute, if published.
    pub fn bit(&self, bit: usize) -> Option<&Attribute> {
        self.bits.get(bit)?.as_deref()
    }

    /// Number of published handles (aggregate included).
    pub fn live_count(&self) -> usize {
        usize::from(self.aggregate.is_some()) + self.bits.iter().flatten().count()
    }

    /// True once every handle has been released.
    pub fn is_empty(&self) -> bool {
        self.live_count() == 0
    }
}

impl fmt::Debug for AttributeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeSet")
            .field("node", &self.node)
            .field("live", &self.live_count())
            .finish()
    }
}

/// Remove every present handle of `set` from `tree`. Returns how many went.
fn release(tree: &dyn AttributeTree, set: &mut AttributeSet) -> usize {
    let mut released = 0;
    for slot in set.bits.iter_mut() {
        if let Some(attr) = slot.take() {
            tree.remove_file(&set.node, attr.name());
            released += 1;
        }
    }
    if let Some(attr) = set.aggregate.take() {
        tree.remove_file(&set.node, attr.name());
        released += 1;
    }
    released
}

/// Accumulates published attributes until `commit`.
///
/// An uncommitted builder rolls everything back when dropped.
pub struct AttributeSetBuilder<'t> {
    tree: &'t dyn AttributeTree,
    set: AttributeSet,
}

impl<'t> AttributeSetBuilder<'t> {
    /// Start an empty set under `node`.
    pub fn new(tree: &'t dyn AttributeTree, node: NodeId) -> Self {
        Self {
            tree,
            set: AttributeSet::empty(node),
        }
    }

    /// Publish the aggregate attribute.
    pub fn add_aggregate(&mut self, attr: Attribute) -> Result<(), TreeError> {
        let attr = Arc::new(attr);
        self.tree.create_file(&self.set.node, Arc::clone(&attr))?;
        debug!("Published {}/{}", self.set.node, attr.name());
        self.set.aggregate = Some(attr);
        Ok(())
    }

    /// Publish the attribute for `bit`.
    pub fn add_bit(&mut self, bit: usize, attr: Attribute) -> Result<(), TreeError> {
        if bit >= MODULE_BIT_COUNT {
            return Err(TreeError::Rejected {
                name: attr.name().to_string(),
            });
        }
        let attr = Arc::new(attr);
        self.tree.create_file(&self.set.node, Arc::clone(&attr))?;
        debug!("Published {}/{}", self.set.node, attr.name());
        self.set.bits[bit] = Some(attr);
        Ok(())
    }

    /// Handles published so far.
    pub fn live_count(&self) -> usize {
        self.set.live_count()
    }

    /// Withdraw everything published through this builder.
    pub fn rollback(&mut self) -> usize {
        release(self.tree, &mut self.set)
    }

    /// Keep what was published and hand the handles over.
    pub fn commit(mut self) -> AttributeSet {
        let node = self.set.node.clone();
        std::mem::replace(&mut self.set, AttributeSet::empty(node))
    }
}

impl Drop for AttributeSetBuilder<'_> {
    fn drop(&mut self) {
        if !self.set.is_empty() {
            let released = self.rollback();
            warn!("Uncommitted attribute set dropped, released {}", released);
        }
    }
}

fn mask_attribute(bits: ModuleBits) -> Attribute {
    Attribute::read_only(MASK_ATTR_NAME, Box::new(move || format!("{bits}\n")))
}

fn bit_attribute(bits: ModuleBits, bit: usize) -> Attribute {
    Attribute::read_only(
        bit_attr_name(bit),
        Box::new(move || {
            if bits.present(bit as u32) {
                "1\n".to_string()
            } else {
                "0\n".to_string()
            }
        }),
    )
}

/// Publish `module_bits` and `module_0..31` for `bits` under `node`.
///
/// On failure nothing published by this call remains in the tree.
pub fn publish(
    tree: &dyn AttributeTree,
    node: &NodeId,
    bits: ModuleBits,
) -> Result<AttributeSet, TreeError> {
    let mut builder = AttributeSetBuilder::new(tree, node.clone());

    if let Err(e) = builder.add_aggregate(mask_attribute(bits)) {
        error!("Failed to publish {}/{}: {}", node, MASK_ATTR_NAME, e);
        return Err(e);
    }

    for bit in 0..MODULE_BIT_COUNT {
        if let Err(e) = builder.add_bit(bit, bit_attribute(bits, bit)) {
            let released = builder.rollback();
            error!(
                "Failed to publish {}/{}: {} (rolled back {} attributes)",
                node,
                bit_attr_name(bit),
                e,
                released
            );
            return Err(e);
        }
    }

    Ok(builder.commit())
}

/// Withdraw every attribute still held by `set`.
///
/// Safe on partially populated or already released sets.
pub fn unpublish(tree: &dyn AttributeTree, set: &mut AttributeSet) -> usize {
    let released = release(tree, set);
    debug!("Unpublished {} attributes from {}", released, set.node);
    released
}
