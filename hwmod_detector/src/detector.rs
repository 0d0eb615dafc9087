//! Detector instance and its attach/detach lifecycle.
//!
//! ```text
//!   Detached ──attach──► Attaching ──ok──► Attached ──detach──► Detaching ──► Detached
//!                            │
//!                            └──err (everything released)──► Detached
//! ```
//!
//! At most one detector is attached per process. The attached instance is
//! owned by a process-wide slot; its mask is mirrored into the lock-free
//! query cell of [`crate::bitmask`]. Attach and detach are expected to be
//! serialized by the caller (device bind/unbind events); the slot lock only
//! guards against misuse.

use crate::attributes::{self, AttributeSet, AttributeTree, DirTree, NodeId};
use crate::bitmask::{self, ModuleBits};
use crate::error::{DetectorError, DetectorResult};
use crate::register::{MmapRegisterMapper, RegisterMapper, RegisterWindow};
use hwmod::detector::config::{DetectorConfig, NamespaceConfig, RegisterResource};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::LazyLock;
use std::sync::atomic::{AtomicU8, Ordering};
use tracing::{debug, error, info};

/// Lifecycle state of the process-wide detector slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// No detector attached
    Detached = 0,
    /// Attach in progress
    Attaching = 1,
    /// Detector attached and published
    Attached = 2,
    /// Detach in progress
    Detaching = 3,
}

impl LifecycleState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => LifecycleState::Attaching,
            2 => LifecycleState::Attached,
            3 => LifecycleState::Detaching,
            _ => LifecycleState::Detached,
        }
    }
}

/// An attached hardware module detector.
///
/// Owns the register mapping and the published attribute handles. The mask
/// is read exactly once, in [`Detector::probe`].
pub struct Detector {
    register: Box<dyn RegisterWindow>,
    module_bits: ModuleBits,
    attributes: AttributeSet,
    tree: Arc<dyn AttributeTree>,
    node: NodeId,
}

impl Detector {
    /// Map, read, and publish. On error nothing stays mapped or published.
    ///
    /// # Errors
    /// - `ResourceUnavailable` if `resource` is `None` or malformed
    /// - `MapFailed` if the register cannot be mapped
    /// - `NamespaceCreateFailed` if the namespace node cannot be created
    /// - `PublishFailed` if any attribute cannot be published
    pub fn probe(
        resource: Option<&RegisterResource>,
        mapper: &dyn RegisterMapper,
        tree: Arc<dyn AttributeTree>,
        namespace: &NamespaceConfig,
    ) -> DetectorResult<Self> {
        let resource = resource.ok_or_else(|| DetectorError::ResourceUnavailable {
            reason: "no register resource supplied".to_string(),
        })?;

        let register = mapper.map(resource)?;
        let module_bits = ModuleBits::new(register.read());
        info!("Hardware module register value: {}", module_bits);

        let node = tree
            .create_node(&namespace.class, &namespace.device)
            .map_err(|source| DetectorError::NamespaceCreateFailed {
                node: NodeId::new(&namespace.class, &namespace.device).to_string(),
                source,
            })?;

        let attributes = match attributes::publish(tree.as_ref(), &node, module_bits) {
            Ok(set) => set,
            Err(source) => {
                tree.remove_node(&node);
                return Err(DetectorError::PublishFailed { source });
            }
        };

        Ok(Self {
            register,
            module_bits,
            attributes,
            tree,
            node,
        })
    }

    /// The snapshot captured at probe time.
    pub fn module_bits(&self) -> ModuleBits {
        self.module_bits
    }

    /// Namespace node the attributes live under.
    pub fn node(&self) -> &NodeId {
        &self.node
    }

    /// Published attribute handles.
    pub fn attributes(&self) -> &AttributeSet {
        &self.attributes
    }

    /// Re-read the mapped register. Diagnostic only; the snapshot returned
    /// by [`Detector::module_bits`] is never updated from it.
    pub fn read_live(&self) -> u32 {
        self.register.read()
    }

    /// Unpublish, release the node, unmap. Never fails.
    pub fn remove(mut self) {
        attributes::unpublish(self.tree.as_ref(), &mut self.attributes);
        self.tree.remove_node(&self.node);
        debug!("Released namespace node {}", self.node);
        // Dropping `self` unmaps the register.
    }
}

impl fmt::Debug for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Detector")
            .field("module_bits", &self.module_bits)
            .field("node", &self.node)
            .field("attributes", &self.attributes)
            .finish_non_exhaustive()
    }
}

// ─── Process-wide slot ──────────────────────────────────────────────

/// The attached detector, if any.
static ACTIVE: LazyLock<Mutex<Option<Detector>>> = LazyLock::new(|| Mutex::new(None));

static STATE: AtomicU8 = AtomicU8::new(LifecycleState::Detached as u8);

fn set_state(state: LifecycleState) {
    STATE.store(state as u8, Ordering::Release);
}

/// Current lifecycle state.
pub fn state() -> LifecycleState {
    LifecycleState::from_u8(STATE.load(Ordering::Acquire))
}

/// Attach the process-wide detector.
///
/// # Errors
/// `AlreadyAttached` if a detector is attached, otherwise whatever
/// [`Detector::probe`] reports. Failed attaches leave the slot detached.
pub fn attach(
    resource: Option<&RegisterResource>,
    mapper: &dyn RegisterMapper,
    tree: Arc<dyn AttributeTree>,
    namespace: &NamespaceConfig,
) -> DetectorResult<()> {
    let mut active = ACTIVE.lock();
    if active.is_some() {
        return Err(DetectorError::AlreadyAttached);
    }

    set_state(LifecycleState::Attaching);
    match Detector::probe(resource, mapper, tree, namespace) {
        Ok(detector) => {
            bitmask::publish_snapshot(detector.module_bits());
            info!(
                "Hardware module detector attached at {} ({} modules present)",
                detector.node(),
                detector.module_bits().count()
            );
            *active = Some(detector);
            set_state(LifecycleState::Attached);
            Ok(())
        }
        Err(e) => {
            error!("Hardware module detector attach failed: {}", e);
            set_state(LifecycleState::Detached);
            Err(e)
        }
    }
}

/// Attach using the memory-mapped register and a directory tree at
/// `config.namespace.root`.
pub fn attach_with_config(config: &DetectorConfig) -> DetectorResult<()> {
    config.validate()?;
    let tree: Arc<dyn AttributeTree> = Arc::new(DirTree::new(&config.namespace.root));
    attach(
        config.register.as_ref(),
        &MmapRegisterMapper,
        tree,
        &config.namespace,
    )
}

/// Detach the process-wide detector. A no-op when nothing is attached.
pub fn detach() {
    let mut active = ACTIVE.lock();
    let Some(detector) = active.take() else {
        debug!("Detach requested with no detector attached");
        return;
    };

    set_state(LifecycleState::Detaching);
    let node = detector.node().clone();
    detector.remove();
    bitmask::clear_snapshot();
    set_state(LifecycleState::Detached);
    info!("Hardware module detector detached from {}", node);
}

/// Run `f` against the attached detector.
///
/// `f` runs with the slot lock held. It must not call [`attach`],
/// [`detach`] or `with_detector`; the lock is not reentrant and the call
/// deadlocks.
pub fn with_detector<R>(f: impl FnOnce(&Detector) -> R) -> Option<R> {
    ACTIVE.lock().as_ref().map(f)
}
