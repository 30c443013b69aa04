// /////////////////////////////////////////////////////////////////////////////
// Claims Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Orchestrator behavior: bounded queue backpressure, worker draining, and
//! graceful shutdown accounting.

use crate::common::*;
use std::sync::Arc;
use std::time::Duration;

use claims_pipeline::application::services::{IngestionPipeline, NoopAcker, Orchestrator};
use claims_pipeline::infrastructure::config::IngestionConfig;
use claims_pipeline::infrastructure::metrics::IngestionMetrics;
use claims_pipeline::infrastructure::services::Verifier;
use claims_pipeline_domain::repositories::{DocumentPersister, IngestionStore};
use claims_pipeline_domain::value_objects::staged_payload::StagedPayload;
use claims_pipeline_domain::{IngestError, SourceHandle, WorkItem};

const SUBMISSION_XML: &str = r#"<Claim.Submission>
  <Header>
    <SenderID>PROV1</SenderID><ReceiverID>PAYER1</ReceiverID>
    <TransactionDate>14/02/2025 12:00</TransactionDate>
    <RecordCount>0</RecordCount><DispositionFlag>PRODUCTION</DispositionFlag>
  </Header>
</Claim.Submission>"#;

async fn pipeline_for(pool: &sqlx::SqlitePool) -> Arc<IngestionPipeline> {
    let (store, persister) = persister_stack(pool);
    Arc::new(IngestionPipeline::new(
        store.clone() as Arc<dyn IngestionStore>,
        persister as Arc<dyn DocumentPersister>,
        Verifier::new(store as Arc<dyn IngestionStore>),
        Arc::new(NoopAcker),
        IngestionMetrics::shared(),
    ))
}

fn item(file_id: &str) -> WorkItem {
    WorkItem::new(
        file_id,
        format!("{file_id}.xml"),
        StagedPayload::Memory(SUBMISSION_XML.as_bytes().to_vec()),
        SourceHandle::Dhpo {
            facility_code: "F-001".into(),
        },
    )
}

fn config(workers: usize, capacity: usize) -> IngestionConfig {
    IngestionConfig {
        workers,
        queue_capacity: capacity,
        stage_timeout_ms: 120_000,
    }
}

#[tokio::test]
async fn processes_submitted_items_and_drains_on_shutdown() {
    let pool = test_pool().await;
    let orchestrator = Orchestrator::start(&config(3, 16), pipeline_for(&pool).await, IngestionMetrics::shared());

    for i in 0..8 {
        orchestrator.submit(item(&format!("FILE-{i}"))).unwrap();
    }

    let drain = orchestrator.shutdown(Duration::from_secs(10)).await;
    assert_eq!(drain.completed, 8);
    assert_eq!(drain.abandoned, 0);

    // Every file landed in the store.
    assert_eq!(count(&pool, "claims_ingestion_file").await, 8);
}

#[tokio::test]
async fn queue_full_rejects_with_backpressure() {
    let pool = test_pool().await;
    let orchestrator = Orchestrator::start(&config(1, 2), pipeline_for(&pool).await, IngestionMetrics::shared());

    // Flood the queue faster than one worker can drain it; at least one
    // submit must hit the bound.
    let mut rejected = 0;
    for i in 0..64 {
        match orchestrator.submit(item(&format!("FLOOD-{i}"))) {
            Ok(()) => {}
            Err(IngestError::QueueFull) => rejected += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert!(rejected > 0, "bounded queue never pushed back");
    assert!(orchestrator.queue_available() <= 2);

    orchestrator.shutdown(Duration::from_secs(10)).await;
}

#[tokio::test]
async fn submit_after_shutdown_is_rejected() {
    let pool = test_pool().await;
    let orchestrator = Orchestrator::start(&config(2, 8), pipeline_for(&pool).await, IngestionMetrics::shared());

    orchestrator.shutdown(Duration::from_millis(200)).await;
    let err = orchestrator.submit(item("LATE")).unwrap_err();
    assert!(matches!(err, IngestError::Cancelled(_)));
}

#[tokio::test]
async fn a_poisonous_item_does_not_kill_the_worker() {
    let pool = test_pool().await;
    let orchestrator = Orchestrator::start(&config(1, 8), pipeline_for(&pool).await, IngestionMetrics::shared());

    // A payload pointing at a missing staged file fails at Register.
    let poison = WorkItem::new(
        "POISON",
        "poison.xml",
        StagedPayload::Disk("/definitely/missing".into()),
        SourceHandle::Dhpo {
            facility_code: "F-001".into(),
        },
    );
    orchestrator.submit(poison).unwrap();
    orchestrator.submit(item("HEALTHY")).unwrap();

    let drain = orchestrator.shutdown(Duration::from_secs(10)).await;
    assert_eq!(drain.completed, 2, "the worker survived the poisonous item");

    // The healthy file made it through.
    let healthy: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM claims_ingestion_file WHERE file_id = 'HEALTHY'")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(healthy, 1);
}
