//! Upload job lifecycle

use chrono::{TimeZone, Utc};
use portal_common::{EventBus, FixedClock, HookList, PortalEvent};
use portal_querycsv::{
    read_source, run_job, FieldDescriptor, FieldMapping, MemoryStore, ModelSchema, QueryCsvService, UploadJob,
    UploadStatus,
};
use std::sync::Arc;

fn service(hooks: HookList) -> QueryCsvService {
    let schema = Arc::new(
        ModelSchema::new("member")
            .field(FieldDescriptor::text("email").required().unique())
            .field(FieldDescriptor::text("first_name")),
    );
    QueryCsvService::new(schema, Arc::new(MemoryStore::new())).with_hooks(hooks)
}

fn clock() -> FixedClock {
    FixedClock::new(Utc.with_ymd_and_hms(2024, 9, 1, 9, 0, 0).unwrap())
}

#[tokio::test]
async fn test_job_with_row_errors_writes_both_reports() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("members.csv");
    std::fs::write(&file, "email,first_name\na@x,Ann\n,Bob\nc@x,Cid\n").unwrap();
    let reports_dir = dir.path().join("reports");

    let service = service(HookList::new());
    let mut job = UploadJob::new("member", &file, Vec::new());
    run_job(&mut job, &service, &clock(), &reports_dir).await.unwrap();

    assert_eq!(job.status, UploadStatus::ContainsErrors);
    assert_eq!(job.processed, 3);
    assert_eq!(job.total_rows, 3);
    assert_eq!(job.success_count, 2);
    assert_eq!(job.failure_count, 1);
    assert!(job.started_at.is_some() && job.finished_at.is_some());
    assert!(job.logs.iter().any(|l| l.message.contains("2 rows saved, 1 rows failed")));

    assert_eq!(job.reports.len(), 2);
    let successful = read_source(&job.reports[0]).unwrap();
    assert_eq!(successful.len(), 2);
    let failed = read_source(&job.reports[1]).unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed.headers.last().unwrap(), "errors");
    assert!(failed.rows[0]["errors"].as_str().unwrap().contains("email"));
}

#[tokio::test]
async fn test_clean_job_is_success_and_notifies() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("members.csv");
    std::fs::write(&file, "Email Address,Notes\na@x,skip me\n").unwrap();

    let bus = Arc::new(EventBus::new(16));
    let mut events = bus.subscribe();
    let service = service(HookList::new().with(bus.clone()));

    let mappings = vec![FieldMapping::new("Email Address", "email"), FieldMapping::skip("Notes")];
    let mut job = UploadJob::new("member", &file, mappings);
    run_job(&mut job, &service, &clock(), dir.path()).await.unwrap();

    assert_eq!(job.status, UploadStatus::Success);

    let mut saw_finished = false;
    while let Ok(event) = events.try_recv() {
        if let PortalEvent::UploadFinished { job_id, success_count, .. } = event {
            assert_eq!(job_id, Some(job.id));
            assert_eq!(success_count, 1);
            saw_finished = true;
        }
    }
    assert!(saw_finished);
}

#[tokio::test]
async fn test_unsupported_file_is_invalid() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("members.pdf");
    std::fs::write(&file, "%PDF").unwrap();

    let mut job = UploadJob::new("member", &file, Vec::new());
    run_job(&mut job, &service(HookList::new()), &clock(), dir.path()).await.unwrap();

    assert_eq!(job.status, UploadStatus::Invalid);
    assert!(job.error.is_some());
    assert!(job.started_at.is_none());
}

#[tokio::test]
async fn test_batch_fatal_mapping_fails_job() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("members.csv");
    std::fs::write(&file, "email\na@x\n").unwrap();

    let schema = Arc::new(
        ModelSchema::new("club").field(FieldDescriptor::nested(
            "officers",
            Arc::new(ModelSchema::new("officer").field(FieldDescriptor::text("email"))),
            portal_querycsv::Relation::reverse_many("club"),
        )),
    );
    let service = QueryCsvService::new(schema, Arc::new(MemoryStore::new()));

    let mut job = UploadJob::new("club", &file, vec![FieldMapping::new("email 1 2", "officers[n].email")]);
    run_job(&mut job, &service, &clock(), dir.path()).await.unwrap();

    assert_eq!(job.status, UploadStatus::Failed);
    assert!(job.error.as_deref().unwrap().contains("email 1 2"));
    assert_eq!(job.success_count, 0);
}
