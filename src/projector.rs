//! Maps import status transitions onto the minimal set of library changes.

use crate::library::Library;
use crate::model::{FailureRecord, ImportJob, JobStatus, Raster};

/// A status transition observed for one import.
#[derive(Clone, Debug)]
pub enum Transition {
    /// The job is (still) pending.
    Pending(ImportJob),
    /// The job finished and its raster has been loaded.
    Succeeded {
        import_id: String,
        raster: Raster,
        collection_id: Option<String>,
    },
    /// The job failed; `job` carries the reason and modification time.
    Failed(ImportJob),
    /// The user dropped a pending job.
    Cancelled {
        import_id: String,
        collection_id: Option<String>,
    },
}

/// One externally observable change to the library.
#[derive(Clone, Debug, PartialEq)]
pub enum StateChange {
    UpsertPlaceholder(ImportJob),
    AddTemporaryMember {
        collection_id: String,
        entity_id: String,
    },
    RemoveTemporaryMember {
        collection_id: String,
        entity_id: String,
    },
    AddPermanentMember {
        collection_id: String,
        entity_id: String,
    },
    RemovePlaceholder(String),
    MaterializeRaster(Raster),
    RecordFailure(FailureRecord),
}

/// Compute the changes `transition` implies that `library` does not yet reflect.
pub fn project(library: &Library, transition: &Transition) -> Vec<StateChange> {
    let mut changes = Vec::new();
    match transition {
        Transition::Pending(job) => {
            if library.placeholder(&job.import_id) != Some(job) {
                changes.push(StateChange::UpsertPlaceholder(job.clone()));
            }
            if let Some(cid) = &job.collection_id
                && !library.is_temporary_member(cid, &job.import_id)
            {
                changes.push(StateChange::AddTemporaryMember {
                    collection_id: cid.clone(),
                    entity_id: job.import_id.clone(),
                });
            }
        }
        Transition::Succeeded {
            import_id,
            raster,
            collection_id,
        } => {
            if let Some(cid) = collection_id {
                if library.is_temporary_member(cid, import_id) {
                    changes.push(StateChange::RemoveTemporaryMember {
                        collection_id: cid.clone(),
                        entity_id: import_id.clone(),
                    });
                }
                if !library.is_member(cid, &raster.id) {
                    changes.push(StateChange::AddPermanentMember {
                        collection_id: cid.clone(),
                        entity_id: raster.id.clone(),
                    });
                }
            }
            if library.placeholder(import_id).is_some() {
                changes.push(StateChange::RemovePlaceholder(import_id.clone()));
            }
            if library.raster(&raster.id) != Some(raster) {
                changes.push(StateChange::MaterializeRaster(raster.clone()));
            }
        }
        Transition::Failed(job) => {
            remove_pending(library, &job.import_id, job.collection_id.as_deref(), &mut changes);
            if job.status == JobStatus::Failed && library.failure(&job.import_id).is_none() {
                changes.push(StateChange::RecordFailure(FailureRecord {
                    import_id: job.import_id.clone(),
                    name: job.name.clone(),
                    reason: job.failure_reason.clone().unwrap_or_default(),
                    modified_at: job.modified_at,
                }));
            }
        }
        Transition::Cancelled {
            import_id,
            collection_id,
        } => {
            remove_pending(library, import_id, collection_id.as_deref(), &mut changes);
        }
    }
    changes
}

fn remove_pending(
    library: &Library,
    import_id: &str,
    collection_id: Option<&str>,
    changes: &mut Vec<StateChange>,
) {
    if let Some(cid) = collection_id
        && library.is_temporary_member(cid, import_id)
    {
        changes.push(StateChange::RemoveTemporaryMember {
            collection_id: cid.to_string(),
            entity_id: import_id.to_string(),
        });
    }
    if library.placeholder(import_id).is_some() {
        changes.push(StateChange::RemovePlaceholder(import_id.to_string()));
    }
}

/// Project and apply in one step, returning what changed.
pub fn project_and_apply(library: &mut Library, transition: &Transition) -> Vec<StateChange> {
    let changes = project(library, transition);
    for c in &changes {
        library.apply(c);
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raster(id: &str) -> Raster {
        Raster {
            id: id.into(),
            name: "rivers.tif".into(),
            created: None,
            modified: None,
            extra: Default::default(),
        }
    }

    fn pending_in_c1() -> ImportJob {
        ImportJob::pending("J1".into(), "rivers.tif".into(), Some("C1".into()))
    }

    #[test]
    fn test_pending_creates_placeholder_and_temporary_membership() {
        let mut lib = Library::default();
        let changes = project_and_apply(&mut lib, &Transition::Pending(pending_in_c1()));
        assert_eq!(changes.len(), 2);
        assert!(lib.placeholder("J1").is_some());
        assert!(lib.is_temporary_member("C1", "J1"));
    }

    #[test]
    fn test_repeated_pending_is_minimal() {
        let mut lib = Library::default();
        let job = pending_in_c1();
        project_and_apply(&mut lib, &Transition::Pending(job.clone()));
        assert!(project(&lib, &Transition::Pending(job)).is_empty());
    }

    #[test]
    fn test_success_swaps_membership_and_replaces_placeholder() {
        let mut lib = Library::default();
        project_and_apply(&mut lib, &Transition::Pending(pending_in_c1()));
        let ok = Transition::Succeeded {
            import_id: "J1".into(),
            raster: raster("R1"),
            collection_id: Some("C1".into()),
        };
        project_and_apply(&mut lib, &ok);

        assert!(lib.entity("J1").is_none());
        assert!(lib.raster("R1").is_some());
        assert!(!lib.is_temporary_member("C1", "J1"));
        assert!(lib.is_member("C1", "R1"));
        assert_eq!(lib.memberships("J1"), Vec::<String>::new());
    }

    #[test]
    fn test_success_delivered_twice_changes_nothing() {
        let mut lib = Library::default();
        project_and_apply(&mut lib, &Transition::Pending(pending_in_c1()));
        let ok = Transition::Succeeded {
            import_id: "J1".into(),
            raster: raster("R1"),
            collection_id: Some("C1".into()),
        };
        assert!(!project_and_apply(&mut lib, &ok).is_empty());
        assert!(project_and_apply(&mut lib, &ok).is_empty());

        assert_eq!(lib.entities().len(), 1);
        assert_eq!(lib.collection("C1").unwrap().entities.len(), 1);
    }

    #[test]
    fn test_failure_removes_placeholder_and_membership() {
        let mut lib = Library::default();
        let mut job = pending_in_c1();
        project_and_apply(&mut lib, &Transition::Pending(job.clone()));

        job.fail("bad format".into()).unwrap();
        project_and_apply(&mut lib, &Transition::Failed(job.clone()));

        assert!(lib.entity("J1").is_none());
        assert!(!lib.is_temporary_member("C1", "J1"));
        let rec = lib.failure("J1").unwrap();
        assert_eq!(rec.reason, "bad format");
        assert_eq!(rec.modified_at, job.modified_at);

        // 同じ失敗の再配信は何も変えない。
        assert!(project(&lib, &Transition::Failed(job)).is_empty());
    }

    #[test]
    fn test_cancel_removes_pending_state_without_failure_record() {
        let mut lib = Library::default();
        project_and_apply(&mut lib, &Transition::Pending(pending_in_c1()));
        project_and_apply(
            &mut lib,
            &Transition::Cancelled {
                import_id: "J1".into(),
                collection_id: Some("C1".into()),
            },
        );
        assert!(lib.entity("J1").is_none());
        assert!(!lib.is_temporary_member("C1", "J1"));
        assert!(lib.failure("J1").is_none());
    }
}
