//! Attach/detach lifecycle of the process-wide detector.

mod common;

use common::{FakeMapper, FaultyTree, lock_global, register_file};
use hwmod::detector::config::{DetectorConfig, NamespaceConfig, RegisterResource};
use hwmod::detector::consts::MODULE_BIT_COUNT;
use hwmod_detector::{
    AttributeTree, DetectorError, LifecycleState, MemoryTree, MmapRegisterMapper, NodeId, attach,
    attach_with_config, detach, module_mask, module_present, state, with_detector,
};
use std::fs;
use std::io::{Seek, SeekFrom, Write};
use std::sync::Arc;
use tempfile::TempDir;

fn default_node() -> NodeId {
    NodeId::new("hw_module", "hw_module")
}

#[test]
fn test_end_to_end_0x2a() {
    let _guard = lock_global();
    let (_file, resource) = register_file(0x0000_002a, 0);
    let tree = Arc::new(MemoryTree::new());

    attach(
        Some(&resource),
        &MmapRegisterMapper,
        tree.clone(),
        &NamespaceConfig::default(),
    )
    .unwrap();
    assert_eq!(state(), LifecycleState::Attached);

    assert!(module_present(1));
    assert!(module_present(3));
    assert!(module_present(5));
    assert!(!module_present(0));
    assert!(!module_present(2));
    assert_eq!(module_mask(), 0x0000_002a);

    let node = default_node();
    assert_eq!(tree.read(&node, "module_bits").unwrap(), "0x0000002a\n");
    assert_eq!(tree.read(&node, "module_1").unwrap(), "1\n");
    assert_eq!(tree.read(&node, "module_0").unwrap(), "0\n");

    detach();
    assert_eq!(state(), LifecycleState::Detached);
}

#[test]
fn test_queries_after_detach_report_absent() {
    let _guard = lock_global();
    let tree = Arc::new(MemoryTree::new());
    let mapper = FakeMapper::new(u32::MAX);
    let resource = RegisterResource::new("/dev/null", 0);

    attach(Some(&resource), &mapper, tree.clone(), &NamespaceConfig::default()).unwrap();
    assert_eq!(module_mask(), u32::MAX);

    detach();
    assert_eq!(module_mask(), 0);
    for bit in 0..40 {
        assert!(!module_present(bit));
    }
    assert!(with_detector(|d| d.module_bits()).is_none());
    assert_eq!(tree.node_count(), 0);
    assert_eq!(tree.file_count(), 0);
    assert_eq!(mapper.live_windows(), 0);
}

#[test]
fn test_detach_twice_is_noop() {
    let _guard = lock_global();
    let tree = Arc::new(MemoryTree::new());
    let mapper = FakeMapper::new(0x10);
    let resource = RegisterResource::new("/dev/null", 0);

    attach(Some(&resource), &mapper, tree, &NamespaceConfig::default()).unwrap();
    detach();
    detach();
    assert_eq!(state(), LifecycleState::Detached);
    assert_eq!(module_mask(), 0);
}

#[test]
fn test_detach_without_attach_is_noop() {
    let _guard = lock_global();
    detach();
    assert_eq!(state(), LifecycleState::Detached);
    assert!(!module_present(0));
}

#[test]
fn test_snapshot_ignores_later_register_changes() {
    let _guard = lock_global();
    let (mut file, resource) = register_file(0x0000_00f0, 8);
    let tree = Arc::new(MemoryTree::new());

    attach(
        Some(&resource),
        &MmapRegisterMapper,
        tree.clone(),
        &NamespaceConfig::default(),
    )
    .unwrap();

    file.seek(SeekFrom::Start(8)).unwrap();
    file.write_all(&0x0000_000f_u32.to_le_bytes()).unwrap();
    file.flush().unwrap();

    assert_eq!(with_detector(|d| d.read_live()), Some(0x0000_000f));
    assert_eq!(module_mask(), 0x0000_00f0);
    assert!(module_present(4));
    assert!(!module_present(0));
    assert_eq!(
        tree.read(&default_node(), "module_bits").unwrap(),
        "0x000000f0\n"
    );

    detach();
}

#[test]
fn test_second_attach_is_rejected() {
    let _guard = lock_global();
    let tree = Arc::new(MemoryTree::new());
    let first = FakeMapper::new(0x1);
    let second = FakeMapper::new(0x2);
    let resource = RegisterResource::new("/dev/null", 0);
    let other_ns = NamespaceConfig {
        device: "hw_module1".to_string(),
        ..NamespaceConfig::default()
    };

    attach(Some(&resource), &first, tree.clone(), &NamespaceConfig::default()).unwrap();
    let result = attach(Some(&resource), &second, tree.clone(), &other_ns);
    assert!(matches!(result, Err(DetectorError::AlreadyAttached)));

    assert_eq!(module_mask(), 0x1);
    assert_eq!(second.live_windows(), 0);
    assert_eq!(tree.node_count(), 1);
    assert_eq!(state(), LifecycleState::Attached);

    detach();
}

#[test]
fn test_rollback_for_every_failing_bit() {
    let _guard = lock_global();
    let resource = RegisterResource::new("/dev/null", 0);

    for k in 0..MODULE_BIT_COUNT {
        let tree = Arc::new(FaultyTree::failing_at(&format!("module_{k}")));
        let mapper = FakeMapper::new(0xa5a5_a5a5);

        let result = attach(Some(&resource), &mapper, tree.clone(), &NamespaceConfig::default());
        assert!(
            matches!(result, Err(DetectorError::PublishFailed { .. })),
            "bit {k}: {result:?}"
        );

        assert_eq!(tree.inner.file_count(), 0, "bit {k} leaked attributes");
        assert_eq!(tree.inner.node_count(), 0, "bit {k} leaked the node");
        assert_eq!(mapper.live_windows(), 0, "bit {k} leaked the mapping");
        assert_eq!(state(), LifecycleState::Detached);
        assert_eq!(module_mask(), 0);
    }
}

#[test]
fn test_aggregate_failure_is_publish_failure() {
    let _guard = lock_global();
    let resource = RegisterResource::new("/dev/null", 0);
    let tree = Arc::new(FaultyTree::failing_at("module_bits"));
    let mapper = FakeMapper::new(1);

    let result = attach(Some(&resource), &mapper, tree.clone(), &NamespaceConfig::default());
    assert!(matches!(result, Err(DetectorError::PublishFailed { .. })));
    assert_eq!(tree.inner.node_count(), 0);
    assert_eq!(mapper.live_windows(), 0);
}

#[test]
fn test_attach_after_failed_attach_succeeds() {
    let _guard = lock_global();
    let resource = RegisterResource::new("/dev/null", 0);

    let faulty = Arc::new(FaultyTree::failing_at("module_12"));
    assert!(attach(Some(&resource), &FakeMapper::new(7), faulty, &NamespaceConfig::default()).is_err());

    let tree = Arc::new(MemoryTree::new());
    attach(Some(&resource), &FakeMapper::new(7), tree, &NamespaceConfig::default()).unwrap();
    assert_eq!(module_mask(), 7);
    detach();
}

#[test]
fn test_missing_resource_is_unavailable() {
    let _guard = lock_global();
    let tree = Arc::new(MemoryTree::new());
    let mapper = FakeMapper::new(1);

    let result = attach(None, &mapper, tree.clone(), &NamespaceConfig::default());
    assert!(matches!(result, Err(DetectorError::ResourceUnavailable { .. })));
    assert_eq!(tree.node_count(), 0);
    assert_eq!(state(), LifecycleState::Detached);
}

#[test]
fn test_namespace_collision_releases_mapping() {
    let _guard = lock_global();
    let tree = Arc::new(MemoryTree::new());
    let stale = tree.create_node("hw_module", "hw_module").unwrap();
    let mapper = FakeMapper::new(1);
    let resource = RegisterResource::new("/dev/null", 0);

    let result = attach(Some(&resource), &mapper, tree.clone(), &NamespaceConfig::default());
    assert!(matches!(
        result,
        Err(DetectorError::NamespaceCreateFailed { .. })
    ));
    assert_eq!(mapper.live_windows(), 0);
    assert!(tree.node_exists(&stale));
    assert_eq!(module_mask(), 0);
}

#[test]
fn test_attach_with_config_publishes_directory() {
    let _guard = lock_global();
    let root = TempDir::new().unwrap();
    let (_file, resource) = register_file(0x8000_0001, 4);

    let mut config = DetectorConfig::default();
    config.register = Some(resource);
    config.namespace.root = root.path().to_path_buf();

    attach_with_config(&config).unwrap();

    let node_dir = root.path().join("hw_module").join("hw_module");
    assert_eq!(
        fs::read_to_string(node_dir.join("module_bits")).unwrap(),
        "0x80000001\n"
    );
    assert_eq!(fs::read_to_string(node_dir.join("module_0")).unwrap(), "1\n");
    assert_eq!(fs::read_to_string(node_dir.join("module_31")).unwrap(), "1\n");
    assert_eq!(fs::read_to_string(node_dir.join("module_30")).unwrap(), "0\n");
    assert_eq!(fs::read_dir(&node_dir).unwrap().count(), MODULE_BIT_COUNT + 1);

    detach();
    assert!(!node_dir.exists());
}

#[test]
fn test_attach_with_config_without_register() {
    let _guard = lock_global();
    let root = TempDir::new().unwrap();
    let mut config = DetectorConfig::default();
    config.namespace.root = root.path().to_path_buf();

    let result = attach_with_config(&config);
    assert!(matches!(result, Err(DetectorError::ResourceUnavailable { .. })));
    assert!(!root.path().join("hw_module").exists());
}

#[test]
fn test_concurrent_queries_while_attached() {
    let _guard = lock_global();
    let tree = Arc::new(MemoryTree::new());
    let mapper = FakeMapper::new(0x0000_ff00);
    let resource = RegisterResource::new("/dev/null", 0);
    attach(Some(&resource), &mapper, tree, &NamespaceConfig::default()).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            std::thread::spawn(|| {
                for _ in 0..1000 {
                    assert_eq!(module_mask(), 0x0000_ff00);
                    assert!(module_present(8));
                    assert!(!module_present(7));
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    detach();
}
