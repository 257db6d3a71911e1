use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::{sleep, timeout, Duration};
use tracing::{debug, error, info, instrument, warn};

use crate::error::MailQueueError;
use crate::models::{CancellationJob, JobStatus, WorkerConfig};
use crate::services::locale::{format_human, Locale};
use crate::services::mailer::{MailMessage, Mailer};
use crate::services::queue::CancellationQueue;
use crate::services::template::{self, MailTemplate, TemplateContext};

/// Background consumer of the cancellation mail queue. Runs detached from
/// the request path: the HTTP caller has long since received its response
/// by the time a job is processed, so failures here are retried or dropped,
/// never surfaced upstream.
pub struct MailWorkerService {
    worker_id: String,
    config: WorkerConfig,
    queue: Arc<dyn CancellationQueue>,
    mailer: Arc<dyn Mailer>,
    sender: String,
    is_shutdown: Arc<RwLock<bool>>,
}

impl MailWorkerService {
    pub fn new(
        config: WorkerConfig,
        queue: Arc<dyn CancellationQueue>,
        mailer: Arc<dyn Mailer>,
        sender: String,
    ) -> Self {
        Self {
            worker_id: config.worker_id.clone(),
            config,
            queue,
            mailer,
            sender,
            is_shutdown: Arc::new(RwLock::new(false)),
        }
    }

    #[instrument(skip(self))]
    pub async fn start(&self) -> Result<(), MailQueueError> {
        info!("Starting mail worker {}", self.worker_id);

        let mut handles = Vec::new();

        for i in 0..self.config.max_concurrent_jobs {
            let worker_clone = self.clone_for_worker();
            let worker_name = format!("{}-{}", self.worker_id, i);

            let handle = tokio::spawn(async move { worker_clone.worker_loop(worker_name).await });

            handles.push(handle);
        }

        let sweeper = self.clone_for_worker();
        let sweep_handle = tokio::spawn(async move { sweeper.sweep_loop().await });
        handles.push(sweep_handle);

        let shutdown_signal = self.wait_for_shutdown();

        tokio::select! {
            _ = shutdown_signal => {
                info!("Shutdown signal received, stopping mail worker {}", self.worker_id);
            }
            _ = futures::future::try_join_all(handles) => {
                warn!("All mail worker loops completed unexpectedly");
            }
        }

        Ok(())
    }

    pub async fn shutdown(&self) -> Result<(), MailQueueError> {
        info!("Initiating graceful shutdown for mail worker {}", self.worker_id);

        {
            let mut is_shutdown = self.is_shutdown.write().await;
            *is_shutdown = true;
        }

        let shutdown_timeout = Duration::from_secs(self.config.graceful_shutdown_timeout_seconds);
        sleep(shutdown_timeout).await;

        info!("Mail worker {} shutdown complete", self.worker_id);
        Ok(())
    }

    async fn worker_loop(&self, worker_name: String) -> Result<(), MailQueueError> {
        debug!("Mail worker loop started: {}", worker_name);

        loop {
            if *self.is_shutdown.read().await {
                debug!("Mail worker {} received shutdown signal", worker_name);
                break;
            }

            match self.queue.dequeue_job(&worker_name).await {
                Ok(Some(job)) => {
                    if let Err(e) = self.process_job(job, &worker_name).await {
                        error!("Worker {} failed to process job: {}", worker_name, e);
                    }
                }
                Ok(None) => {
                    sleep(Duration::from_millis(100)).await;
                }
                Err(e) => {
                    error!("Worker {} failed to dequeue job: {}", worker_name, e);
                    sleep(Duration::from_secs(5)).await;
                }
            }
        }

        debug!("Mail worker loop ended: {}", worker_name);
        Ok(())
    }

    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    async fn process_job(&self, job: CancellationJob, worker_name: &str) -> Result<(), MailQueueError> {
        info!("Processing cancellation mail job {} with worker {}", job.job_id, worker_name);

        let message = self.build_message(&job);
        let job_timeout = Duration::from_secs(self.config.job_timeout_seconds);

        match timeout(job_timeout, self.mailer.send(&message)).await {
            Ok(Ok(())) => {
                self.queue
                    .update_job_status(job.job_id, JobStatus::Completed, None)
                    .await?;
                info!(
                    "Cancellation mail for appointment {} delivered to {}",
                    job.snapshot.appointment_id, job.snapshot.provider_email
                );
            }
            Ok(Err(e)) => {
                let retryable = e.is_retryable();
                self.handle_failure(job, e.to_string(), retryable).await?;
            }
            Err(_) => {
                let message = format!(
                    "Mail send timed out after {} seconds",
                    self.config.job_timeout_seconds
                );
                self.handle_failure(job, message, true).await?;
            }
        }

        Ok(())
    }

    async fn handle_failure(
        &self,
        mut job: CancellationJob,
        error_message: String,
        retryable: bool,
    ) -> Result<(), MailQueueError> {
        self.queue
            .update_job_status(job.job_id, JobStatus::Failed, Some(error_message.clone()))
            .await?;
        job.status = JobStatus::Failed;

        if retryable && job.can_retry() {
            warn!(
                "Job {} failed ({}), will be retried (attempt {}/{})",
                job.job_id,
                error_message,
                job.retry_count + 1,
                job.max_retries
            );
            sleep(Duration::from_secs(self.config.retry_delay_seconds)).await;
            self.queue.retry_job(job.job_id).await?;
        } else {
            self.queue
                .update_job_status(job.job_id, JobStatus::Dropped, Some(error_message.clone()))
                .await?;
            error!(
                "Cancellation mail for appointment {} dropped after {} attempts: {}",
                job.snapshot.appointment_id,
                job.retry_count + 1,
                error_message
            );
        }

        Ok(())
    }

    fn build_message(&self, job: &CancellationJob) -> MailMessage {
        let snapshot = &job.snapshot;
        let context = TemplateContext {
            provider: snapshot.provider_name.clone(),
            requester: snapshot.requester_name.clone(),
            date: format_human(snapshot.slot, Locale::PtBr),
        };

        MailMessage {
            from: self.sender.clone(),
            to: format!("{} <{}>", snapshot.provider_name, snapshot.provider_email),
            subject: template::subject(MailTemplate::Cancellation).to_string(),
            text: template::render(MailTemplate::Cancellation, &context),
        }
    }

    async fn sweep_loop(&self) -> Result<(), MailQueueError> {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.sweep_interval_seconds));

        loop {
            interval.tick().await;

            if *self.is_shutdown.read().await {
                break;
            }

            if let Err(e) = self.queue.cleanup_expired_jobs().await {
                warn!("Failed to clean up expired cancellation jobs: {}", e);
            }
        }

        Ok(())
    }

    async fn wait_for_shutdown(&self) {
        loop {
            if *self.is_shutdown.read().await {
                break;
            }
            sleep(Duration::from_millis(100)).await;
        }
    }

    fn clone_for_worker(&self) -> Self {
        Self {
            worker_id: self.worker_id.clone(),
            config: self.config.clone(),
            queue: Arc::clone(&self.queue),
            mailer: Arc::clone(&self.mailer),
            sender: self.sender.clone(),
            is_shutdown: Arc::clone(&self.is_shutdown),
        }
    }
}
