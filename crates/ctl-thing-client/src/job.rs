//! Managed jobs: pending-job discovery, detail retrieval and status updates.
//!
//! A `jobs/notify` from the broker re-lists pending jobs immediately, so new
//! work is picked up without a poll.

use ctl_mqtt_channel::Channel;
use ctl_protocol::topics::{self, JobTopic, JobsTopic};
use ctl_protocol::{DescribeJobRequest, JobExecutionResponse, JobReply, StartNextRequest};
use serde_json::{Value, json};

use crate::outbound::{publish_logged, subscribe_all};

/// Invoked with `(job_id, payload)`. An empty job id carries the pending
/// job list.
pub type JobCallback<'a> = Box<dyn FnMut(&str, &Value) -> bool + 'a>;

pub struct JobDispatcher<'a, C: Channel> {
    channel: &'a C,
    thing_name: String,
    pending_jobs_requested: bool,
    callback: Option<JobCallback<'a>>,
}

impl<'a, C: Channel> JobDispatcher<'a, C> {
    pub fn new(channel: &'a C, thing_name: impl Into<String>) -> Self {
        Self {
            channel,
            thing_name: thing_name.into(),
            pending_jobs_requested: false,
            callback: None,
        }
    }

    pub fn set_callback(&mut self, callback: JobCallback<'a>) {
        self.callback = Some(callback);
    }

    pub fn begin(&self) -> bool {
        let thing = &self.thing_name;
        let list_topics = JobsTopic::SUBSCRIBED
            .into_iter()
            .map(|suffix| topics::jobs(thing, suffix));
        let job_topics = JobTopic::SUBSCRIBED
            .into_iter()
            .map(|suffix| topics::job(thing, topics::WILDCARD, suffix));
        subscribe_all(self.channel, list_topics.chain(job_topics))
    }

    /// True while a list request is outstanding.
    pub fn list_requested(&self) -> bool {
        self.pending_jobs_requested
    }

    /// Ask for the pending job list unless a request is already outstanding.
    pub fn list_pending_jobs(&mut self) -> bool {
        if self.pending_jobs_requested {
            tracing::debug!("pending job list already requested");
            return false;
        }
        let topic = topics::jobs(&self.thing_name, JobsTopic::Get);
        let published = publish_logged(self.channel, &topic, &json!({}));
        self.pending_jobs_requested = published;
        published
    }

    /// Start the next pending job; a zero timeout sends no step timeout.
    pub fn start_pending_jobs(&self, step_timeout_minutes: u32) -> bool {
        let request = StartNextRequest {
            step_timeout_in_minutes: (step_timeout_minutes > 0).then_some(step_timeout_minutes),
        };
        let topic = topics::jobs(&self.thing_name, JobsTopic::StartNext);
        publish_logged(self.channel, &topic, &request)
    }

    pub fn reply(&self, job_id: &str, reply: &JobReply) -> bool {
        let topic = topics::job(&self.thing_name, job_id, JobTopic::Update);
        tracing::debug!(job_id = %job_id, status = ?reply.status, "job status update");
        publish_logged(self.channel, &topic, reply)
    }

    pub fn request_detail(&self, job_id: &str) -> bool {
        let topic = topics::job(&self.thing_name, job_id, JobTopic::Get);
        let request = DescribeJobRequest {
            include_job_document: true,
        };
        publish_logged(self.channel, &topic, &request)
    }

    /// Route an inbound message; `None` if it is not a job topic.
    pub fn handle(&mut self, topic: &str, payload: &Value) -> Option<bool> {
        if let Some(suffix) = topics::parse_jobs(&self.thing_name, topic) {
            return Some(self.on_jobs(suffix, payload));
        }

        let (job_id, suffix) = topics::parse_job(&self.thing_name, topic)?;
        match suffix {
            JobTopic::GetAccepted => Some(self.dispatch(job_id, payload)),
            JobTopic::UpdateAccepted => {
                tracing::debug!(job_id = %job_id, "job update accepted");
                Some(true)
            }
            JobTopic::GetRejected | JobTopic::UpdateRejected => {
                tracing::warn!(job_id = %job_id, reply = ?suffix, payload = %payload, "job request rejected");
                Some(true)
            }
            JobTopic::Get | JobTopic::Update => None,
        }
    }

    fn on_jobs(&mut self, suffix: JobsTopic, payload: &Value) -> bool {
        match suffix {
            JobsTopic::GetAccepted => {
                self.pending_jobs_requested = false;
                self.dispatch("", payload)
            }
            JobsTopic::GetRejected => {
                self.pending_jobs_requested = false;
                tracing::warn!(payload = %payload, "pending job list rejected");
                true
            }
            JobsTopic::Notify => {
                tracing::info!("job notification received");
                self.list_pending_jobs();
                true
            }
            JobsTopic::StartNextAccepted => {
                let response: JobExecutionResponse =
                    serde_json::from_value(payload.clone()).unwrap_or_default();
                match response.execution.filter(|e| !e.job_id.is_empty()) {
                    Some(execution) => self.dispatch(&execution.job_id, payload),
                    None => {
                        tracing::debug!("no pending job to start");
                        true
                    }
                }
            }
            JobsTopic::StartNextRejected => {
                tracing::warn!(payload = %payload, "start-next rejected");
                true
            }
            JobsTopic::Get | JobsTopic::StartNext => false,
        }
    }

    fn dispatch(&mut self, job_id: &str, payload: &Value) -> bool {
        match self.callback.as_mut() {
            Some(callback) => callback(job_id, payload),
            None => {
                tracing::warn!(job_id = %job_id, "no job callback registered");
                false
            }
        }
    }
}
