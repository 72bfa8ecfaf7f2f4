use crate::sim::{Registry, StorageKind};
use std::sync::Arc;

#[test]
fn put_then_get_returns_the_same_object() {
    let registry = Registry::new();
    registry.put(
        StorageKind::Software,
        "browser",
        Arc::new("application".to_string()),
    );

    let item = registry
        .get(StorageKind::Software, "browser")
        .expect("stored item");
    let text = item.downcast::<String>().expect("string item");
    assert_eq!(*text, "application");
}

#[test]
fn kinds_are_separate_namespaces() {
    let registry = Registry::new();
    registry.put(StorageKind::Software, "tor", Arc::new(1u32));
    registry.put(StorageKind::Cdfs, "tor", Arc::new(2u32));
    registry.put(StorageKind::PluginPaths, "tor", Arc::new(3u32));

    for (kind, expected) in [
        (StorageKind::Software, 1u32),
        (StorageKind::Cdfs, 2u32),
        (StorageKind::PluginPaths, 3u32),
    ] {
        let item = registry.get(kind, "tor").expect("stored item");
        assert_eq!(*item.downcast::<u32>().expect("u32 item"), expected);
    }
}

#[test]
fn missing_ids_return_none() {
    let registry = Registry::new();
    assert!(registry.get(StorageKind::Cdfs, "missing").is_none());
}

#[test]
fn put_replaces_an_existing_entry() {
    let registry = Registry::new();
    registry.put(StorageKind::PluginPaths, "p", Arc::new(1u32));
    registry.put(StorageKind::PluginPaths, "p", Arc::new(2u32));

    let item = registry.get(StorageKind::PluginPaths, "p").expect("entry");
    assert_eq!(*item.downcast::<u32>().expect("u32 item"), 2);
}
