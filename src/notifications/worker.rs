//! Job queue and workers for post-response webhook side effects.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use metrics::increment_counter;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{MiniAppEvent, NotificationDetails, NotificationStore};

#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub fid: u64,
    pub event: MiniAppEvent,
    pub received_at: DateTime<Utc>,
}

/// Sending half of the job queue. Enqueueing never waits.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<NotificationJob>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<NotificationJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Returns false when the job was dropped (queue full or closed).
    pub fn enqueue(&self, job: NotificationJob) -> bool {
        let fid = job.fid;
        let event = job.event.name();
        match self.tx.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                increment_counter!("seersleague_notification_jobs_dropped_total", "reason" => "full");
                warn!(fid, event, "notification queue full, dropping job");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                increment_counter!("seersleague_notification_jobs_dropped_total", "reason" => "closed");
                warn!(fid, event, "notification queue closed, dropping job");
                false
            }
        }
    }
}

#[derive(Clone)]
pub struct NotificationWorker {
    store: Arc<NotificationStore>,
    http: reqwest::Client,
    app_url: String,
}

impl NotificationWorker {
    pub fn new(store: Arc<NotificationStore>, http: reqwest::Client, app_url: String) -> Self {
        Self {
            store,
            http,
            app_url,
        }
    }

    pub fn spawn_workers(self, rx: mpsc::Receiver<NotificationJob>, worker_count: usize) {
        let shared_rx = Arc::new(Mutex::new(rx));
        let workers = worker_count.max(1);

        for i in 0..workers {
            let svc = self.clone();
            let rx = shared_rx.clone();
            tokio::spawn(async move {
                loop {
                    let job_opt = { rx.lock().await.recv().await };
                    let Some(job) = job_opt else {
                        break;
                    };
                    let (fid, event) = (job.fid, job.event.name());
                    if let Err(e) = svc.process_job(job).await {
                        warn!(worker = i, fid, event, error = %format!("{e:#}"), "notification job failed");
                    }
                }
                debug!(worker = i, "notification worker stopped");
            });
        }
    }

    pub async fn process_job(&self, job: NotificationJob) -> Result<()> {
        let lag_ms = (Utc::now() - job.received_at).num_milliseconds();
        debug!(fid = job.fid, event = job.event.name(), lag_ms, "processing notification job");

        match job.event {
            MiniAppEvent::MiniappAdded {
                notification_details: Some(details),
            }
            | MiniAppEvent::NotificationsEnabled {
                notification_details: details,
            } => {
                self.save(job.fid, details.clone()).await?;
                self.send_welcome(&details).await?;
                info!(fid = job.fid, "notifications enabled");
            }
            MiniAppEvent::MiniappAdded {
                notification_details: None,
            } => {
                debug!(fid = job.fid, "miniapp added without notification details");
            }
            MiniAppEvent::MiniappRemoved | MiniAppEvent::NotificationsDisabled => {
                let store = self.store.clone();
                let fid = job.fid;
                let existed = tokio::task::spawn_blocking(move || store.remove(fid))
                    .await
                    .context("store task panicked")??;
                info!(fid, existed, "notifications disabled");
            }
        }
        Ok(())
    }

    async fn save(&self, fid: u64, details: NotificationDetails) -> Result<()> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.upsert(fid, &details))
            .await
            .context("store task panicked")?
    }

    async fn send_welcome(&self, details: &NotificationDetails) -> Result<()> {
        let body = json!({
            "notificationId": Uuid::new_v4().to_string(),
            "title": "Welcome to SeersLeague",
            "body": "Your daily predictions are waiting. Five free picks to start.",
            "targetUrl": self.app_url,
            "tokens": [details.token],
        });

        self.http
            .post(&details.url)
            .json(&body)
            .send()
            .await
            .context("welcome notification request failed")?
            .error_for_status()
            .context("welcome notification rejected")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn job(fid: u64, event: MiniAppEvent) -> NotificationJob {
        NotificationJob {
            fid,
            event,
            received_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_queue_drops_when_full() {
        let (queue, _rx) = JobQueue::new(1);
        assert!(queue.enqueue(job(1, MiniAppEvent::MiniappRemoved)));
        assert!(!queue.enqueue(job(2, MiniAppEvent::MiniappRemoved)));
    }

    #[tokio::test]
    async fn test_queue_reports_closed() {
        let (queue, rx) = JobQueue::new(4);
        drop(rx);
        assert!(!queue.enqueue(job(1, MiniAppEvent::MiniappRemoved)));
    }

    #[tokio::test]
    async fn test_disable_removes_subscription() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("n.db");
        let store = Arc::new(NotificationStore::new(path.to_str().unwrap()).unwrap());
        store
            .upsert(
                9,
                &NotificationDetails {
                    url: "http://127.0.0.1:1/notify".to_string(),
                    token: "t".to_string(),
                },
            )
            .unwrap();

        let worker = NotificationWorker::new(store.clone(), reqwest::Client::new(), "https://app".to_string());
        worker
            .process_job(job(9, MiniAppEvent::NotificationsDisabled))
            .await
            .unwrap();
        assert!(store.get(9).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enable_persists_even_when_welcome_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("n.db");
        let store = Arc::new(NotificationStore::new(path.to_str().unwrap()).unwrap());
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(500))
            .build()
            .unwrap();
        let worker = NotificationWorker::new(store.clone(), http, "https://app".to_string());

        let result = worker
            .process_job(job(
                5,
                MiniAppEvent::NotificationsEnabled {
                    notification_details: NotificationDetails {
                        url: "http://127.0.0.1:1/notify".to_string(),
                        token: "tok".to_string(),
                    },
                },
            ))
            .await;
        assert!(result.is_err());
        assert_eq!(store.get(5).unwrap().unwrap().token, "tok");
    }
}
