//! Save strategies.

use super::SaveStrategy;
use crate::error::{CoreError, CoreResult};
use crate::record::{Related, Record};
use crate::store::{RecordKey, RecordStore};
use sshconf_storage::Value;
use tracing::debug;

/// Writes records as they are.
///
/// Attached related records must already have ids; their ids are written
/// into the foreign keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainSave;

impl SaveStrategy for PlainSave {
    fn save(&self, record: Record, _store: &mut RecordStore) -> CoreResult<Record> {
        link_saved(record)
    }

    fn mark(&self, _record: &Record, _store: &mut RecordStore) -> CoreResult<()> {
        Ok(())
    }
}

/// Like [`PlainSave`], and marks every written record for the next push.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncSave;

impl SaveStrategy for SyncSave {
    fn save(&self, record: Record, _store: &mut RecordStore) -> CoreResult<Record> {
        link_saved(record)
    }

    fn mark(&self, record: &Record, store: &mut RecordStore) -> CoreResult<()> {
        mark_pending(record, store);
        Ok(())
    }
}

/// Like [`SyncSave`], and persists unsaved related records first.
///
/// Unsaved records attached to a foreign key are created (recursively,
/// deepest first) and the key is rewritten to the generated id.
#[derive(Debug, Default, Clone, Copy)]
pub struct CascadeSave;

impl CascadeSave {
    fn persist(&self, related: Record, store: &mut RecordStore) -> CoreResult<Record> {
        if related.id().is_some() {
            return Ok(related);
        }
        let related = self.save(related, store)?;
        let related = store.create(related)?;
        self.mark(&related, store)?;
        debug!(set = related.set_name(), "cascaded save of related record");
        Ok(related)
    }
}

impl SaveStrategy for CascadeSave {
    fn save(&self, mut record: Record, store: &mut RecordStore) -> CoreResult<Record> {
        for (field, related) in record.take_related() {
            let related = match related {
                Related::One(Some(target)) => {
                    let target = self.persist(*target, store)?;
                    record.raw_mut().insert(field, target.id());
                    Related::One(Some(Box::new(target)))
                }
                Related::Many(targets) => {
                    let targets = targets
                        .into_iter()
                        .map(|target| self.persist(target, store))
                        .collect::<CoreResult<Vec<_>>>()?;
                    let mut ids = record.references(field);
                    for id in targets.iter().filter_map(Record::id) {
                        if !ids.contains(&id) {
                            ids.push(id);
                        }
                    }
                    record.raw_mut().insert(field, ids);
                    Related::Many(targets)
                }
                unresolved => unresolved,
            };
            record.put_related(field, related);
        }
        Ok(record)
    }

    fn mark(&self, record: &Record, store: &mut RecordStore) -> CoreResult<()> {
        mark_pending(record, store);
        Ok(())
    }
}

fn mark_pending(record: &Record, store: &mut RecordStore) {
    if let Some(id) = record.id() {
        store.mark_pending(RecordKey::new(record.set_name(), id));
    }
}

/// Rejects unsaved related records and syncs foreign keys with the ids of
/// saved ones.
fn link_saved(mut record: Record) -> CoreResult<Record> {
    let schema = record.schema();
    let related = record.take_related();
    for (field, entry) in &related {
        let unresolved = || CoreError::UnresolvedReference {
            set_name: schema.set_name.to_string(),
            field: (*field).to_string(),
            target: schema
                .relation(field)
                .map_or("unknown", |r| r.target.set_name)
                .to_string(),
        };
        match entry {
            Related::One(Some(target)) => {
                let id = target.id().ok_or_else(unresolved)?;
                if record.reference(field) != Some(id) {
                    record.raw_mut().insert(*field, Value::from(id));
                }
            }
            Related::Many(targets) => {
                if targets.iter().any(|t| t.id().is_none()) {
                    return Err(unresolved());
                }
            }
            Related::One(None) => {}
        }
    }
    for (field, entry) in related {
        record.put_related(field, entry);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::UuidGenerator;
    use crate::schema::{Relation, SetSchema};
    use sshconf_storage::{MemoryDriver, RecordId};

    static ORG: SetSchema = SetSchema::new("org", &[]);
    static TEAM: SetSchema = SetSchema::new("team", &[Relation::one("org", &ORG)]);
    static PLAYER: SetSchema = SetSchema::new(
        "player",
        &[Relation::one("team", &TEAM), Relation::many("mentors", &PLAYER)],
    );

    fn store() -> RecordStore {
        RecordStore::new(
            Box::new(MemoryDriver::new()),
            Box::new(UuidGenerator::new()),
            vec![&ORG, &TEAM, &PLAYER],
        )
        .unwrap()
    }

    fn player_in_unsaved_team() -> Record {
        let mut team = Record::new(&TEAM).with("name", "reds");
        team.set_related("org", Record::new(&ORG).with("name", "acme"))
            .unwrap();
        let mut player = Record::new(&PLAYER).with("name", "ann");
        player.set_related("team", team).unwrap();
        player
    }

    #[test]
    fn plain_and_sync_reject_unsaved_related() {
        let mut store = store();
        for strategy in [&PlainSave as &dyn SaveStrategy, &SyncSave] {
            let err = strategy
                .save(player_in_unsaved_team(), &mut store)
                .unwrap_err();
            match err {
                CoreError::UnresolvedReference {
                    set_name,
                    field,
                    target,
                } => {
                    assert_eq!(set_name, "player");
                    assert_eq!(field, "team");
                    assert_eq!(target, "team");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
        assert!(store.records(&TEAM).is_empty());
    }

    #[test]
    fn plain_links_saved_related() {
        let mut store = store();
        let mut team = Record::new(&TEAM);
        team.set_id(RecordId::Remote(5));
        let mut player = Record::new(&PLAYER);
        player.set_related("team", team).unwrap();
        // Stale key from an earlier edit.
        player.set("team", RecordId::Remote(4));

        let player = PlainSave.save(player, &mut store).unwrap();
        assert_eq!(player.reference("team"), Some(RecordId::Remote(5)));
        assert!(player.related("team").is_some());
    }

    #[test]
    fn cascade_persists_chain_and_rewrites_keys() {
        let mut store = store();
        let player = CascadeSave.save(player_in_unsaved_team(), &mut store).unwrap();

        let team_id = player.reference("team").unwrap();
        assert!(team_id.is_local());
        let team = store.find(&TEAM, team_id).unwrap();
        let org_id = team.get("org").and_then(Value::as_id).unwrap();
        assert!(store.contains(&ORG, org_id));

        // Both cascaded records are queued for push.
        assert!(store.is_pending("team", team_id));
        assert!(store.is_pending("org", org_id));
        // The player itself is written by the caller.
        assert!(store.records(&PLAYER).is_empty());
    }

    #[test]
    fn cascade_persists_many() {
        let mut store = store();
        let mut player = Record::new(&PLAYER);
        player
            .push_related("mentors", Record::new(&PLAYER).with("name", "bo"))
            .unwrap();
        let player = CascadeSave.save(player, &mut store).unwrap();
        let mentors = player.references("mentors");
        assert_eq!(mentors.len(), 1);
        assert!(store.contains(&PLAYER, mentors[0]));
    }

    #[test]
    fn cascade_leaves_saved_related_alone() {
        let mut store = store();
        let mut team = Record::new(&TEAM).with("name", "reds");
        team.set_id(RecordId::Remote(9));
        let mut player = Record::new(&PLAYER);
        player.set_related("team", team).unwrap();

        let player = CascadeSave.save(player, &mut store).unwrap();
        assert_eq!(player.reference("team"), Some(RecordId::Remote(9)));
        assert!(store.records(&TEAM).is_empty());
    }

    #[test]
    fn sync_marks_identified_records() {
        let mut store = store();
        let mut record = Record::new(&ORG);
        record.set_id(RecordId::Remote(1));
        SyncSave.mark(&record, &mut store).unwrap();
        PlainSave.mark(&record, &mut store).unwrap();
        assert_eq!(store.pending(), vec![RecordKey::new("org", RecordId::Remote(1))]);
    }
}
