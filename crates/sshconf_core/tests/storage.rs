//! Storage behavior over a file-backed driver.

use proptest::prelude::*;
use sshconf_core::{
    strategy::RelatedGet, ApplicationStorage, CommitPolicy, CoreError, GetStrategyKind, Group,
    Host, Model, Query, RecordId, SaveStrategyKind, StorageConfig, Tag, Union, HOST, TAG,
};
use tempfile::TempDir;

fn open(dir: &TempDir, config: StorageConfig) -> ApplicationStorage {
    ApplicationStorage::open(config.path(dir.path().join("app.storage"))).unwrap()
}

#[test]
fn saved_model_roundtrips_through_file() {
    let dir = TempDir::new().unwrap();
    let id = {
        let mut storage = open(&dir, StorageConfig::new());
        storage
            .session(|s| s.save(Host::new("web", "10.0.0.1")))
            .unwrap()
            .id()
            .unwrap()
    };

    let storage = open(&dir, StorageConfig::new());
    let host: Host = storage.get(&Query::new().with("id", id)).unwrap();
    assert_eq!(host.label(), Some("web"));
    assert_eq!(host.address(), Some("10.0.0.1"));
    // Sync bookkeeping survives reopening.
    assert_eq!(storage.pending().len(), 1);
}

#[test]
fn unflushed_changes_are_lost() {
    let dir = TempDir::new().unwrap();
    {
        let mut storage = open(&dir, StorageConfig::new());
        storage.save(Tag::new("gone")).unwrap();
    }
    let storage = open(&dir, StorageConfig::new());
    assert!(storage.get_all::<Tag>().unwrap().is_empty());
}

#[test]
fn corrupt_file_fails_to_open() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.storage");
    std::fs::write(&path, b"\xff\x00 not cbor").unwrap();
    let err = ApplicationStorage::open(StorageConfig::new().path(&path)).unwrap_err();
    assert!(matches!(err, CoreError::Storage(ref e) if e.is_corruption()));
}

#[test]
fn rejected_low_set_leaves_file_loadable() {
    let dir = TempDir::new().unwrap();
    {
        let mut storage = open(&dir, StorageConfig::new());
        let tag = storage.save(Tag::new("kept")).unwrap();
        let raw = storage.low_get("tag").unwrap()[0].clone();
        let err = storage
            .session(|s| s.low_set("tag", vec![raw.clone(), raw]))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvariantViolation { .. }));
        assert!(storage.contains(&TAG, tag.id().unwrap()));
    }

    let storage = open(&dir, StorageConfig::new());
    assert_eq!(storage.get_all::<Tag>().unwrap().len(), 1);
}

#[test]
fn update_never_duplicates() {
    let dir = TempDir::new().unwrap();
    let mut storage = open(&dir, StorageConfig::new());
    let mut tag = storage.save(Tag::new("a")).unwrap();
    storage.save(Tag::new("b")).unwrap();
    for label in ["c", "d", "e"] {
        tag.set("label", label);
        tag = storage.save(tag).unwrap();
        let same_id = storage
            .get_all::<Tag>()
            .unwrap()
            .iter()
            .filter(|t| t.id() == tag.id())
            .count();
        assert_eq!(same_id, 1);
    }
    let labels: Vec<_> = storage
        .get_all::<Tag>()
        .unwrap()
        .iter()
        .map(|t| t.label().unwrap_or_default().to_string())
        .collect();
    assert_eq!(labels, vec!["e", "b"]);
}

#[test]
fn delete_then_get_all() {
    let dir = TempDir::new().unwrap();
    let mut storage = open(&dir, StorageConfig::new());
    let a = storage.save(Tag::new("a")).unwrap();
    storage.save(Tag::new("b")).unwrap();
    storage.delete(&a).unwrap();
    assert!(storage
        .get_all::<Tag>()
        .unwrap()
        .iter()
        .all(|t| t.id() != a.id()));
    assert!(storage.delete(&a).unwrap_err().is_not_found());
}

#[test]
fn get_cardinality_across_operators() {
    let mut storage = ApplicationStorage::in_memory(StorageConfig::new()).unwrap();
    for (label, port) in [("a", 22), ("b", 2222), ("c", 22)] {
        let mut host = Host::new(label, "10.0.0.1").into_record();
        host.set("port", port);
        storage.save_record(host).unwrap();
    }

    let err = storage
        .get::<Host>(&Query::new().with("port.gt", 3000))
        .unwrap_err();
    assert!(err.is_not_found());

    let err = storage
        .get::<Host>(&Query::new().with("port.le", 22))
        .unwrap_err();
    assert!(matches!(err, CoreError::AmbiguousMatch { count: 2, .. }));

    let err = storage
        .get::<Host>(&Query::new().with("label.in", vec!["a", "b"]))
        .unwrap_err();
    assert!(matches!(err, CoreError::AmbiguousMatch { count: 2, .. }));

    let host: Host = storage
        .get(&Query::new().with("port.ge", 1000).with("label", "b"))
        .unwrap();
    assert_eq!(host.label(), Some("b"));
}

#[test]
fn related_resolution_then_resave_is_noop() {
    let dir = TempDir::new().unwrap();
    let config = StorageConfig::new().save_strategy(SaveStrategyKind::Cascade);
    let mut storage = open(&dir, config);
    let host = storage
        .save(Host::new("web", "10.0.0.1").with_group(Group::new("prod").with_parent(Group::new("all"))))
        .unwrap();
    let id = host.id().unwrap();
    let before = storage.low_get("host").cloned();

    let resolved = storage
        .find_record(&HOST, id, GetStrategyKind::Related)
        .unwrap()
        .unwrap();
    assert!(resolved.is_resolved());
    storage.save(Host::from_record(resolved)).unwrap();

    assert_eq!(storage.low_get("host").cloned(), before);
    assert_eq!(storage.get_all::<Group>().unwrap().len(), 2);
}

#[test]
fn unsaved_group_under_each_save_strategy() {
    // Sync rejects the host and writes nothing.
    let mut storage = ApplicationStorage::in_memory(StorageConfig::new()).unwrap();
    let err = storage
        .save(Host::new("web", "10.0.0.1").with_group(Group::new("prod")))
        .unwrap_err();
    assert!(matches!(
        err,
        CoreError::UnresolvedReference { ref field, ref target, .. }
            if field == "group" && target == "group"
    ));
    assert!(storage.get_all::<Host>().unwrap().is_empty());
    assert!(storage.get_all::<Group>().unwrap().is_empty());

    // Cascade saves the group first and points the host at it.
    let config = StorageConfig::new().save_strategy(SaveStrategyKind::Cascade);
    let mut storage = ApplicationStorage::in_memory(config).unwrap();
    let host = storage
        .save(Host::new("web", "10.0.0.1").with_group(Group::new("prod")))
        .unwrap();
    let group: Group = storage.get(&Query::new().with("label", "prod")).unwrap();
    assert_eq!(host.reference("group"), group.id());
    assert_eq!(storage.pending().len(), 2);
}

#[test]
fn dotted_lookup_with_related_get() {
    let config = StorageConfig::new()
        .save_strategy(SaveStrategyKind::Cascade)
        .get_strategy(GetStrategyKind::Related);
    let mut storage = ApplicationStorage::in_memory(config).unwrap();
    storage
        .save(Host::new("web", "10.0.0.1").with_group(Group::new("prod")))
        .unwrap();
    storage
        .save(Host::new("dev", "10.0.0.2").with_group(Group::new("staging")))
        .unwrap();

    let host: Host = storage.get(&Query::new().with("group.label", "prod")).unwrap();
    assert_eq!(host.label(), Some("web"));

    // Raw reads do not see through relations.
    let raw = storage
        .raw_records(&HOST)
        .unwrap()
        .into_iter()
        .filter(|r| Query::new().with("group.label", "prod").matches(r))
        .count();
    assert_eq!(raw, 0);

    let resolved = storage.all_records_with(&HOST, &RelatedGet::new()).unwrap();
    assert!(resolved.iter().all(|r| r.related("group").is_some()));
}

#[test]
fn failed_session_persists_partial_work_by_default() {
    let dir = TempDir::new().unwrap();
    {
        let mut storage = open(&dir, StorageConfig::new());
        let result: Result<(), CoreError> = storage.session(|s| {
            s.save(Tag::new("partial"))?;
            s.get::<Tag>(&Query::new().with("label", "missing"))?;
            Ok(())
        });
        assert!(result.unwrap_err().is_not_found());
    }
    let storage = open(&dir, StorageConfig::new());
    assert_eq!(storage.get_all::<Tag>().unwrap().len(), 1);
}

#[test]
fn failed_session_rolls_back_on_success_policy() {
    let dir = TempDir::new().unwrap();
    let config = || StorageConfig::new().commit_policy(CommitPolicy::OnSuccess);
    {
        let mut storage = open(&dir, config());
        let result: Result<(), CoreError> = storage.session(|s| {
            s.save(Tag::new("partial"))?;
            Err(CoreError::invariant("stop"))
        });
        assert!(result.is_err());
        assert!(storage.get_all::<Tag>().unwrap().is_empty());
    }
    let storage = open(&dir, config());
    assert!(storage.get_all::<Tag>().unwrap().is_empty());
}

#[test]
fn reassign_keeps_host_group_link() {
    let config = StorageConfig::new().save_strategy(SaveStrategyKind::Cascade);
    let mut storage = ApplicationStorage::in_memory(config).unwrap();
    let host = storage
        .save(Host::new("web", "10.0.0.1").with_group(Group::new("prod")))
        .unwrap();
    let local = host.reference("group").unwrap();

    storage
        .reassign_id(&sshconf_core::GROUP, local, RecordId::Remote(40))
        .unwrap();

    let host: Host = storage.get(&Query::new().with("label", "web")).unwrap();
    assert_eq!(host.reference("group"), Some(RecordId::Remote(40)));
}

proptest! {
    #[test]
    fn save_then_get_by_id(labels in prop::collection::vec("[a-z]{1,8}", 1..20)) {
        let mut storage = ApplicationStorage::in_memory(StorageConfig::new()).unwrap();
        for label in &labels {
            let saved = storage.save(Tag::new(label)).unwrap();
            let id = saved.id();
            prop_assert!(id.is_some());
            let found: Tag = storage.get(&Query::new().with("id", id)).unwrap();
            prop_assert_eq!(found.raw(), saved.raw());
        }
        prop_assert_eq!(storage.get_all::<Tag>().unwrap().len(), labels.len());
    }

    #[test]
    fn range_filter_over_storage(ports in prop::collection::vec(1u16..100, 0..30)) {
        let mut storage = ApplicationStorage::in_memory(StorageConfig::new()).unwrap();
        for port in &ports {
            let mut host = Host::new("h", "10.0.0.1").into_record();
            host.set("port", *port);
            storage.save_record(host).unwrap();
        }
        let all = Query::new().with("port.ge", 5).with("port.le", 10);
        let any = all.clone().union(Union::Any);

        let expected_all = ports.iter().filter(|p| (5..=10).contains(*p)).count();
        let expected_any = ports.iter().filter(|p| **p >= 5 || **p <= 10).count();
        prop_assert_eq!(storage.filter::<Host>(&all).unwrap().len(), expected_all);
        prop_assert_eq!(storage.filter::<Host>(&any).unwrap().len(), expected_any);
    }
}
