//! Tracking records for background jobs (feed fetches, OPML imports).
//!
//! Records live in the shared broker under `job:<id>` and expire a fixed
//! time after their last update. Status changes of owned jobs are published
//! as domain events so the owner sees them on their stream.

use crate::error::Result;
use crate::keys::job_key;
use broker::Broker;
use events::{DomainEvent, EventPublisher};
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub status: JobStatus,
    /// User that started the job and receives its status notifications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Clone)]
pub struct JobStore {
    broker: Arc<dyn Broker>,
    ttl: Duration,
    events: EventPublisher,
}

impl JobStore {
    pub fn new(broker: Arc<dyn Broker>, ttl: Duration) -> Self {
        Self {
            broker,
            ttl,
            events: EventPublisher::new(),
        }
    }

    /// Publishes `JobStatusChanged` through `events` on every update of an
    /// owned job.
    pub fn with_event_publisher(mut self, events: EventPublisher) -> Self {
        self.events = events;
        self
    }

    pub async fn create_job(&self, owner_id: Option<&str>) -> Result<Job> {
        let job = Job {
            id: uuid::Uuid::new_v4().to_string(),
            status: JobStatus::Pending,
            owner_id: owner_id.map(str::to_string),
            result: None,
            error: None,
        };
        self.save(&job).await?;
        debug!("Created job {}", job.id);
        Ok(job)
    }

    pub async fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        match self.broker.get(&job_key(job_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Records a new status for an existing job. `result` and `error` keep
    /// their previous values when `None`. Updating a job that does not exist
    /// (never created, or already expired) is logged and ignored.
    ///
    /// Read-modify-write, not atomic: each job has a single worker updating it.
    pub async fn update_job(
        &self,
        job_id: &str,
        status: JobStatus,
        result: Option<Value>,
        error: Option<String>,
    ) -> Result<Option<Job>> {
        let Some(mut job) = self.get_job(job_id).await? else {
            warn!("Ignoring status update to {status} for unknown job {job_id}");
            return Ok(None);
        };

        job.status = status;
        if result.is_some() {
            job.result = result;
        }
        if error.is_some() {
            job.error = error;
        }
        self.save(&job).await?;

        if status == JobStatus::Failed {
            info!(
                "Job {job_id} failed: {}",
                job.error.as_deref().unwrap_or("no error recorded")
            );
        } else {
            debug!("Job {job_id} is now {status}");
        }

        if let Some(owner_id) = &job.owner_id {
            self.events
                .publish(DomainEvent::JobStatusChanged {
                    job_id: job.id.clone(),
                    status: status.to_string(),
                    notify_user_ids: vec![owner_id.clone()],
                })
                .await;
        }

        Ok(Some(job))
    }

    async fn save(&self, job: &Job) -> Result<()> {
        let raw = serde_json::to_string(job)?;
        self.broker
            .set(&job_key(&job.id), &raw, Some(self.ttl))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use broker::MemoryBroker;
    use events::EventHandler;
    use serde_json::json;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<DomainEvent>>);

    #[async_trait]
    impl EventHandler for Recorder {
        async fn handle(&self, event: &DomainEvent) {
            self.0.lock().unwrap().push(event.clone());
        }
    }

    fn store(broker: &Arc<MemoryBroker>) -> JobStore {
        JobStore::new(broker.clone(), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn update_of_missing_job_is_ignored() {
        let broker = Arc::new(MemoryBroker::new());
        let jobs = store(&broker);

        let updated = jobs
            .update_job(
                "job-x",
                JobStatus::Failed,
                None,
                Some("timeout".to_string()),
            )
            .await
            .unwrap();

        assert_eq!(updated, None);
        assert!(!broker.exists("job:job-x").await.unwrap());
    }

    #[tokio::test]
    async fn update_keeps_unspecified_fields() {
        let broker = Arc::new(MemoryBroker::new());
        let jobs = store(&broker);
        let job = jobs.create_job(None).await.unwrap();

        jobs.update_job(&job.id, JobStatus::Running, Some(json!({"fetched": 3})), None)
            .await
            .unwrap();
        let updated = jobs
            .update_job(&job.id, JobStatus::Completed, None, None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.status, JobStatus::Completed);
        assert_eq!(updated.result, Some(json!({"fetched": 3})));
        assert_eq!(jobs.get_job(&job.id).await.unwrap(), Some(updated));
    }

    #[tokio::test(start_paused = true)]
    async fn job_records_expire() {
        let broker = Arc::new(MemoryBroker::new());
        let jobs = JobStore::new(broker.clone(), Duration::from_secs(60));
        let job = jobs.create_job(None).await.unwrap();

        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(jobs.get_job(&job.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn owned_job_updates_publish_domain_events() {
        let broker = Arc::new(MemoryBroker::new());
        let recorder = Arc::new(Recorder(Mutex::new(Vec::new())));
        let jobs = store(&broker)
            .with_event_publisher(EventPublisher::new().with_handler(recorder.clone()));

        let owned = jobs.create_job(Some("u1")).await.unwrap();
        let anonymous = jobs.create_job(None).await.unwrap();
        jobs.update_job(&owned.id, JobStatus::Completed, None, None)
            .await
            .unwrap();
        jobs.update_job(&anonymous.id, JobStatus::Completed, None, None)
            .await
            .unwrap();

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![DomainEvent::JobStatusChanged {
                job_id: owned.id,
                status: "completed".to_string(),
                notify_user_ids: vec!["u1".to_string()],
            }]
        );
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_value(JobStatus::Completed).unwrap(),
            json!("completed")
        );
    }
}
