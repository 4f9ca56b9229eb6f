// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory [`TaskQueue`]: accepts every job and keeps it for inspection.
//! Workers are external, so nothing here executes the jobs.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::queue::{JobDescriptor, QueueAck, TaskQueue};

#[derive(Clone, Default)]
pub struct InMemoryTaskQueue {
    jobs: Arc<Mutex<Vec<(String, JobDescriptor)>>>,
    failure: Arc<RwLock<Option<String>>>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every submission with `message` until [`recover`](Self::recover).
    pub fn fail_with(&self, message: impl Into<String>) {
        *self.failure.write() = Some(message.into());
    }

    pub fn recover(&self) {
        *self.failure.write() = None;
    }

    /// Accepted jobs in submission order.
    pub fn submitted(&self) -> Vec<(String, JobDescriptor)> {
        self.jobs.lock().clone()
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn submit(&self, job: JobDescriptor) -> QueueAck {
        let kind = job.kind.to_string();
        if let Some(message) = self.failure.read().clone() {
            warn!(kind = %job.kind, entity_id = %job.entity_id, "Queue rejected job: {}", message);
            metrics::counter!("loom_queue_submissions_total", "kind" => kind, "outcome" => "rejected")
                .increment(1);
            return QueueAck::rejected(message);
        }

        let job_id = format!("job-{}", Uuid::new_v4());
        debug!(job_id = %job_id, kind = %job.kind, entity_id = %job.entity_id, "Job queued");
        self.jobs.lock().push((job_id.clone(), job));
        metrics::counter!("loom_queue_submissions_total", "kind" => kind, "outcome" => "accepted")
            .increment(1);
        QueueAck::accepted(job_id)
    }
}
