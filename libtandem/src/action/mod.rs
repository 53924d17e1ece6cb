// Copyright 2023 Bitwise IO, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Actions and the two-phase commit coordinator.

mod action;
mod coordinator;
mod status;
mod table;
mod two_phase;

pub use action::{Action, ActionLog, ACTION_TYPE};
pub use coordinator::Coordinator;
pub use status::ActionStatus;
pub use table::ActionTable;

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::Arc;

    use crate::config::CoordinatorConfigBuilder;
    use crate::context::CoordinatorContextBuilder;
    use crate::error::{ActionError, StoreError};
    use crate::record::{
        FinishOutcome, HeuristicOutcome, InsertOutcome, ParticipantRegistry, PrepareVote,
        RecordType,
    };
    use crate::state::{load_committed, InputObjectState, OutputObjectState, StateManaged};
    use crate::store::{MemoryStore, ObjectStore, StateSlot, StateStatus};
    use crate::testing::{CallLog, Counter, Scripted, COUNTER_TYPE};
    use crate::uid::Uid;

    use super::*;

    fn coordinator(store: Arc<dyn ObjectStore>) -> Coordinator {
        let context = CoordinatorContextBuilder::new()
            .with_store(store)
            .build()
            .unwrap();
        Coordinator::new(Arc::new(context))
    }

    fn logs(store: &dyn ObjectStore) -> Vec<Uid> {
        store.uids(ACTION_TYPE, StateSlot::Committed).unwrap()
    }

    #[test]
    fn all_ok_commits_every_participant_once() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator(store.clone());
        let log = CallLog::default();

        let action = coordinator.begin();
        coordinator
            .enlist_participant(&action, Scripted::new("a", &log).boxed())
            .unwrap();
        coordinator
            .enlist_participant(&action, Scripted::new("b", &log).boxed())
            .unwrap();

        assert_eq!(coordinator.commit(&action).unwrap(), ActionStatus::Committed);
        assert_eq!(
            log.calls(),
            vec!["a:prepare", "b:prepare", "a:commit", "b:commit"]
        );
        assert_eq!(coordinator.status(&action), None);
        assert!(logs(store.as_ref()).is_empty());
    }

    #[test]
    fn any_no_vote_aborts_without_commits() {
        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator(store.clone());
        let log = CallLog::default();

        let action = coordinator.begin();
        for participant in [
            Scripted::new("a", &log),
            Scripted::new("b", &log).voting(PrepareVote::NotOk),
            Scripted::new("c", &log),
        ] {
            coordinator
                .enlist_participant(&action, participant.boxed())
                .unwrap();
        }

        assert_eq!(coordinator.commit(&action).unwrap(), ActionStatus::Aborted);
        assert_eq!(log.count("a:commit") + log.count("c:commit"), 0);
        assert_eq!(log.count("a:abort"), 1);
        assert!(logs(store.as_ref()).is_empty());
    }

    #[test]
    fn intentions_log_is_written_at_prepare() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator(store.clone());
        let log = CallLog::default();

        let action = coordinator.begin();
        coordinator.enlist_participant(&action, Scripted::new("a", &log).boxed())?;
        coordinator.enlist_participant(&action, Scripted::new("b", &log).boxed())?;
        coordinator.enlist_volatile(&action, Scripted::new("v", &log).boxed())?;

        assert_eq!(coordinator.prepare(&action)?, ActionStatus::Prepared);
        assert_eq!(logs(store.as_ref()), vec![action]);

        let registry = ParticipantRegistry::new();
        let written = ActionLog::read(store.as_ref(), &action, &registry)?.unwrap();
        assert_eq!(written.status, ActionStatus::Prepared);
        assert_eq!(written.records.len(), 2);
        assert!(written
            .records
            .iter()
            .all(|record| record.record_type() == RecordType::Resource));

        assert_eq!(coordinator.commit(&action)?, ActionStatus::Committed);
        assert!(logs(store.as_ref()).is_empty());
        Ok(())
    }

    #[test]
    fn failed_commit_is_kept_in_the_log() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator(store.clone());
        let log = CallLog::default();

        let action = coordinator.begin();
        coordinator.enlist_participant(&action, Scripted::new("a", &log).boxed())?;
        let failing = coordinator.enlist_participant(
            &action,
            Scripted::new("b", &log)
                .committing(FinishOutcome::Error)
                .boxed(),
        )?;

        assert_eq!(coordinator.commit(&action)?, ActionStatus::Committed);
        let written = ActionLog::read(store.as_ref(), &action, &ParticipantRegistry::new())?;
        let written = written.unwrap();
        assert_eq!(written.records.len(), 1);
        assert!(written.records.find(&failing).is_some());
        Ok(())
    }

    #[test]
    fn disagreement_after_commit_is_heuristic_mixed() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator(store.clone());
        let log = CallLog::default();

        let action = coordinator.begin();
        coordinator.enlist_participant(&action, Scripted::new("a", &log).boxed())?;
        coordinator.enlist_participant(
            &action,
            Scripted::new("b", &log)
                .committing(FinishOutcome::Heuristic(HeuristicOutcome::Rollback))
                .boxed(),
        )?;

        assert_eq!(coordinator.commit(&action)?, ActionStatus::HeuristicMixed);
        assert_eq!(
            coordinator.status(&action),
            Some(ActionStatus::HeuristicMixed)
        );
        assert_eq!(logs(store.as_ref()), vec![action]);

        assert!(coordinator.forget(&action)?);
        assert_eq!(log.count("b:forget"), 1);
        assert_eq!(coordinator.status(&action), None);
        assert!(logs(store.as_ref()).is_empty());
        Ok(())
    }

    #[test]
    fn single_participant_commits_in_one_phase() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator(store.clone());
        let log = CallLog::default();

        let action = coordinator.begin();
        coordinator.enlist_participant(&action, Scripted::new("a", &log).boxed())?;
        assert_eq!(coordinator.commit(&action)?, ActionStatus::Committed);
        assert_eq!(log.calls(), vec!["a:prepare", "a:commit"]);

        let action = coordinator.begin();
        coordinator.enlist_participant(
            &action,
            Scripted::new("b", &log).voting(PrepareVote::NotOk).boxed(),
        )?;
        assert_eq!(coordinator.commit(&action)?, ActionStatus::Aborted);
        assert_eq!(log.count("b:abort"), 1);
        assert!(store.types()?.is_empty());
        Ok(())
    }

    #[test]
    fn one_phase_commit_can_be_disabled() -> Result<(), Box<dyn std::error::Error>> {
        let store: Arc<dyn ObjectStore> = Arc::new(MemoryStore::new());
        let context = CoordinatorContextBuilder::new()
            .with_store(store.clone())
            .with_config(
                CoordinatorConfigBuilder::new()
                    .with_one_phase_commit(false)
                    .build(),
            )
            .build()?;
        let coordinator = Coordinator::new(Arc::new(context));
        let log = CallLog::default();

        let action = coordinator.begin();
        coordinator.enlist_participant(&action, Scripted::new("a", &log).boxed())?;
        assert_eq!(coordinator.prepare(&action)?, ActionStatus::Prepared);
        assert_eq!(logs(store.as_ref()), vec![action]);
        assert_eq!(coordinator.commit(&action)?, ActionStatus::Committed);
        Ok(())
    }

    #[test]
    fn read_only_action_commits_without_phase_two() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator(store.clone());
        let log = CallLog::default();

        let action = coordinator.begin();
        for name in ["a", "b"] {
            coordinator.enlist_participant(
                &action,
                Scripted::new(name, &log)
                    .voting(PrepareVote::ReadOnly)
                    .boxed(),
            )?;
        }

        assert_eq!(coordinator.commit(&action)?, ActionStatus::Committed);
        assert_eq!(log.calls(), vec!["a:prepare", "b:prepare"]);
        assert!(store.types()?.is_empty());
        Ok(())
    }

    #[test]
    fn objects_are_restored_on_abort() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator(store.clone());
        let counter = Counter::shared(1);
        let uid = counter.lock().uid();

        let action = coordinator.begin();
        assert_eq!(
            coordinator.enlist_object(&action, counter.clone())?,
            InsertOutcome::Added
        );
        counter.lock().value = 2;
        assert_eq!(coordinator.abort(&action)?, ActionStatus::Aborted);
        assert_eq!(counter.lock().value, 1);
        assert_eq!(store.current_state(&uid, COUNTER_TYPE)?, StateStatus::Unknown);

        let action = coordinator.begin();
        coordinator.enlist_object(&action, counter.clone())?;
        counter.lock().value = 3;
        assert_eq!(coordinator.commit(&action)?, ActionStatus::Committed);
        assert_eq!(store.current_state(&uid, COUNTER_TYPE)?, StateStatus::Committed);

        let restored = Counter::with_uid(uid);
        let header = load_committed(store.as_ref(), &mut *restored.lock())?.unwrap();
        assert_eq!(header.action, action);
        assert_eq!(restored.lock().value, 3);
        Ok(())
    }

    #[test]
    fn re_enlisted_object_is_restored_to_its_first_image() -> Result<(), Box<dyn std::error::Error>>
    {
        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator(store.clone());
        let counter = Counter::shared(1);

        let action = coordinator.begin();
        coordinator.enlist_object(&action, counter.clone())?;
        counter.lock().value = 2;
        assert_eq!(
            coordinator.enlist_object(&action, counter.clone())?,
            InsertOutcome::Duplicate
        );
        counter.lock().value = 3;

        assert_eq!(coordinator.abort(&action)?, ActionStatus::Aborted);
        assert_eq!(counter.lock().value, 1);
        Ok(())
    }

    #[test]
    fn failed_abort_is_dropped_with_the_log() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator(store.clone());
        let log = CallLog::default();

        let action = coordinator.begin();
        coordinator.enlist_participant(&action, Scripted::new("a", &log).boxed())?;
        coordinator.enlist_participant(
            &action,
            Scripted::new("b", &log)
                .aborting(FinishOutcome::Error)
                .boxed(),
        )?;
        assert_eq!(coordinator.prepare(&action)?, ActionStatus::Prepared);
        assert_eq!(logs(store.as_ref()), vec![action]);

        assert_eq!(coordinator.abort(&action)?, ActionStatus::Aborted);
        assert_eq!(
            log.calls(),
            vec!["a:prepare", "b:prepare", "b:abort", "a:abort"]
        );
        assert!(logs(store.as_ref()).is_empty());
        assert_eq!(coordinator.status(&action), None);
        Ok(())
    }

    #[test]
    fn sub_action_commit_hands_records_to_parent() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(MemoryStore::new());
        let coordinator = coordinator(store.clone());
        let log = CallLog::default();

        let parent = coordinator.begin();
        let child = coordinator.begin_nested(&parent)?;
        coordinator.enlist_participant(&child, Scripted::new("a", &log).boxed())?;
        coordinator.enlist_participant(&child, Scripted::new("b", &log).boxed())?;

        assert_eq!(coordinator.commit(&child)?, ActionStatus::Committed);
        assert!(log.calls().is_empty());
        assert_eq!(coordinator.status(&child), None);

        {
            let handle = coordinator.context().actions().get(&parent).unwrap();
            let guard = handle.lock();
            assert!(guard.children().is_empty());
            assert_eq!(guard.pending().len(), 1);
            let nested = guard.pending().iter().next().unwrap();
            assert_eq!(nested.record_type(), RecordType::Nested);
            assert_eq!(nested.uid(), &child);
            assert_eq!(nested.nested_records().unwrap().len(), 2);
        }

        assert_eq!(coordinator.commit(&parent)?, ActionStatus::Committed);
        assert_eq!(
            log.calls(),
            vec!["a:prepare", "b:prepare", "a:commit", "b:commit"]
        );
        Ok(())
    }

    #[test]
    fn empty_sub_action_contributes_nothing() -> Result<(), Box<dyn std::error::Error>> {
        let coordinator = coordinator(Arc::new(MemoryStore::new()));
        let parent = coordinator.begin();
        let child = coordinator.begin_nested(&parent)?;

        assert_eq!(coordinator.commit(&child)?, ActionStatus::Committed);
        let handle = coordinator.context().actions().get(&parent).unwrap();
        assert!(handle.lock().pending().is_empty());
        Ok(())
    }

    #[test]
    fn sub_action_abort_moves_cadavers_to_parent() -> Result<(), Box<dyn std::error::Error>> {
        let coordinator = coordinator(Arc::new(MemoryStore::new()));
        let log = CallLog::default();
        let counter = Counter::shared(5);
        let uid = counter.lock().uid();

        let parent = coordinator.begin();
        let child = coordinator.begin_nested(&parent)?;
        coordinator.enlist_participant(&child, Scripted::new("a", &log).boxed())?;
        coordinator.destroy_object(&child, counter.clone())?;

        assert_eq!(coordinator.abort(&child)?, ActionStatus::Aborted);
        assert_eq!(log.calls(), vec!["a:abort"]);

        let handle = coordinator.context().actions().get(&parent).unwrap();
        let guard = handle.lock();
        let cadaver = guard.pending().find(&uid).unwrap();
        assert_eq!(cadaver.record_type(), RecordType::Cadaver);
        assert_eq!(cadaver.owner(), &parent);
        Ok(())
    }

    #[test]
    fn commit_with_running_children_aborts() -> Result<(), Box<dyn std::error::Error>> {
        let coordinator = coordinator(Arc::new(MemoryStore::new()));
        let log = CallLog::default();

        let parent = coordinator.begin();
        coordinator.enlist_participant(&parent, Scripted::new("p", &log).boxed())?;
        let child = coordinator.begin_nested(&parent)?;
        let grandchild = coordinator.begin_nested(&child)?;
        coordinator.enlist_participant(&grandchild, Scripted::new("g", &log).boxed())?;

        assert_eq!(coordinator.commit(&parent)?, ActionStatus::Aborted);
        assert_eq!(log.calls(), vec!["g:abort", "p:abort"]);
        assert!(coordinator.context().actions().is_empty());
        Ok(())
    }

    #[test]
    fn misuse_is_reported() {
        let coordinator = coordinator(Arc::new(MemoryStore::new()));
        let log = CallLog::default();

        assert!(matches!(
            coordinator.commit(&Uid::new()),
            Err(ActionError::InvalidArgument(_))
        ));

        let parent = coordinator.begin();
        let child = coordinator.begin_nested(&parent).unwrap();
        assert!(matches!(
            coordinator.prepare(&child),
            Err(ActionError::InvalidState(_))
        ));
        assert!(matches!(
            coordinator.prepare(&parent),
            Err(ActionError::InvalidState(_))
        ));

        let action = coordinator.begin();
        coordinator
            .enlist_participant(&action, Scripted::new("a", &log).boxed())
            .unwrap();
        coordinator
            .enlist_participant(&action, Scripted::new("b", &log).boxed())
            .unwrap();
        assert_eq!(coordinator.prepare(&action).unwrap(), ActionStatus::Prepared);
        assert!(matches!(
            coordinator.enlist_participant(&action, Scripted::new("c", &log).boxed()),
            Err(ActionError::InvalidState(_))
        ));
        assert!(matches!(
            coordinator.begin_nested(&action),
            Err(ActionError::InvalidState(_))
        ));
        assert_eq!(coordinator.abort(&action).unwrap(), ActionStatus::Aborted);
    }

    struct FailingStore {
        inner: MemoryStore,
    }

    impl ObjectStore for FailingStore {
        fn read_committed(
            &self,
            uid: &Uid,
            type_name: &str,
        ) -> Result<Option<InputObjectState>, StoreError> {
            self.inner.read_committed(uid, type_name)
        }

        fn read_uncommitted(
            &self,
            uid: &Uid,
            type_name: &str,
        ) -> Result<Option<InputObjectState>, StoreError> {
            self.inner.read_uncommitted(uid, type_name)
        }

        fn write_committed(
            &self,
            _uid: &Uid,
            _type_name: &str,
            _state: &OutputObjectState,
        ) -> Result<(), StoreError> {
            Err(StoreError::Io(io::Error::new(io::ErrorKind::Other, "disk full")))
        }

        fn write_uncommitted(
            &self,
            uid: &Uid,
            type_name: &str,
            state: &OutputObjectState,
        ) -> Result<(), StoreError> {
            self.inner.write_uncommitted(uid, type_name, state)
        }

        fn remove_committed(&self, uid: &Uid, type_name: &str) -> Result<bool, StoreError> {
            self.inner.remove_committed(uid, type_name)
        }

        fn remove_uncommitted(&self, uid: &Uid, type_name: &str) -> Result<bool, StoreError> {
            self.inner.remove_uncommitted(uid, type_name)
        }

        fn commit_state(&self, uid: &Uid, type_name: &str) -> Result<bool, StoreError> {
            self.inner.commit_state(uid, type_name)
        }

        fn current_state(&self, uid: &Uid, type_name: &str) -> Result<StateStatus, StoreError> {
            self.inner.current_state(uid, type_name)
        }

        fn all_obj_uids(
            &self,
            type_name: &str,
            slot: StateSlot,
        ) -> Result<InputObjectState, StoreError> {
            self.inner.all_obj_uids(type_name, slot)
        }

        fn all_types(&self) -> Result<InputObjectState, StoreError> {
            self.inner.all_types()
        }
    }

    #[test]
    fn log_write_failure_aborts() -> Result<(), Box<dyn std::error::Error>> {
        let store = Arc::new(FailingStore {
            inner: MemoryStore::new(),
        });
        let coordinator = coordinator(store.clone());
        let log = CallLog::default();
        let counter = Counter::shared(1);
        let uid = counter.lock().uid();

        let action = coordinator.begin();
        coordinator.enlist_participant(&action, Scripted::new("a", &log).boxed())?;
        coordinator.enlist_object(&action, counter.clone())?;
        counter.lock().value = 2;

        assert_eq!(coordinator.commit(&action)?, ActionStatus::Aborted);
        assert_eq!(log.calls(), vec!["a:prepare", "a:abort"]);
        assert_eq!(counter.lock().value, 1);
        assert_eq!(store.current_state(&uid, COUNTER_TYPE)?, StateStatus::Unknown);
        Ok(())
    }
}
