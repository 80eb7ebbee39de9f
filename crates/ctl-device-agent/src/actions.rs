//! Work queued by client callbacks and performed after each message.
//!
//! Callbacks run inside `ThingClient::on_message` and cannot call back into
//! the client, so they only record what happened. [`drain`] then replies to
//! commands and advances jobs through the client.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use ctl_mqtt_channel::Channel;
use ctl_protocol::{CommandReply, JobExecutionResponse, JobReply, JobStatus};
use ctl_thing_client::ThingClient;
use serde_json::{Value, json};

use crate::executor::OperationExecutor;

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Command { execution_id: String, request: Value },
    JobList(Value),
    JobExecution { job_id: String, response: Value },
}

pub type Inbox = Rc<RefCell<VecDeque<Action>>>;

/// Route command, job and shadow callbacks of `client` into `inbox`.
pub fn install<'a, C: Channel>(client: &mut ThingClient<'a, C>, inbox: &Inbox) {
    let queue = inbox.clone();
    client.set_command_callback(Box::new(move |execution_id, request| {
        queue.borrow_mut().push_back(Action::Command {
            execution_id: execution_id.to_string(),
            request: request.clone(),
        });
        true
    }));

    let queue = inbox.clone();
    client.set_jobs_callback(Box::new(move |job_id, payload| {
        let action = if job_id.is_empty() {
            Action::JobList(payload.clone())
        } else {
            Action::JobExecution {
                job_id: job_id.to_string(),
                response: payload.clone(),
            }
        };
        queue.borrow_mut().push_back(action);
        true
    }));

    // Desired state is accepted as-is and reported back.
    client.set_shadow_callback(Box::new(|name, desired, should_mutate| {
        tracing::info!(shadow = %name, should_mutate, desired = %desired, "desired state received");
        true
    }));
}

/// Perform every queued action. Returns how many were processed.
pub fn drain<C: Channel>(
    client: &mut ThingClient<'_, C>,
    executor: &OperationExecutor,
    inbox: &Inbox,
) -> usize {
    let mut processed = 0;
    loop {
        // Release the borrow before touching the client.
        let Some(action) = inbox.borrow_mut().pop_front() else {
            break;
        };
        perform(client, executor, action);
        processed += 1;
    }
    processed
}

fn perform<C: Channel>(client: &mut ThingClient<'_, C>, executor: &OperationExecutor, action: Action) {
    match action {
        Action::Command {
            execution_id,
            request,
        } => {
            let reply = match executor.execute(&request) {
                Ok(result) => CommandReply::succeeded(result),
                Err(e) => {
                    tracing::warn!(execution_id = %execution_id, error = %e, "command failed");
                    CommandReply::failed(e.code(), e.to_string())
                }
            };
            client.command_reply(&execution_id, &reply);
        }
        Action::JobList(list) => {
            let pending = ["inProgressJobs", "queuedJobs"].iter().any(|key| {
                list.get(*key)
                    .and_then(Value::as_array)
                    .is_some_and(|jobs| !jobs.is_empty())
            });
            if pending {
                client.start_pending_jobs(0);
            }
        }
        Action::JobExecution { job_id, response } => {
            let execution = serde_json::from_value::<JobExecutionResponse>(response)
                .ok()
                .and_then(|r| r.execution)
                .unwrap_or_default();
            let document = execution.job_document.unwrap_or(Value::Null);
            let reply = match executor.execute(&document) {
                Ok(result) => JobReply {
                    status: JobStatus::Succeeded,
                    status_details: json!({"result": result.to_string()}),
                    expected_version: execution.version_number.unwrap_or_default(),
                },
                Err(e) => {
                    tracing::warn!(job_id = %job_id, error = %e, "job failed");
                    JobReply {
                        status: JobStatus::Failed,
                        status_details: json!({"reasonCode": e.code(), "reason": e.to_string()}),
                        expected_version: execution.version_number.unwrap_or_default(),
                    }
                }
            };
            client.job_reply(&job_id, &reply);
            client.list_pending_jobs();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ctl_mqtt_channel::MockChannel;
    use ctl_protocol::topics::{self, CommandDirection, JobTopic, JobsTopic};
    use ctl_thing_client::ManualClock;

    fn bytes(value: Value) -> Vec<u8> {
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn command_is_executed_and_answered() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(0);
        let inbox = Inbox::default();
        let executor = OperationExecutor::new("dev1");
        let mut client = ThingClient::new(&mock, &clock, "dev1");
        install(&mut client, &inbox);
        client.begin();

        let topic = topics::command("dev1", "exec-1", CommandDirection::Request);
        assert!(client.on_message(&topic, &bytes(json!({"operation": "ping"}))));
        assert_eq!(drain(&mut client, &executor, &inbox), 1);

        let reply = mock.last_published().unwrap();
        assert_eq!(reply.topic, topics::command("dev1", "exec-1", CommandDirection::Response));
        assert_eq!(reply.json()["status"], "SUCCEEDED");
        assert_eq!(reply.json()["result"]["pong"], true);
    }

    #[test]
    fn unsupported_command_fails_with_reason() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(0);
        let inbox = Inbox::default();
        let executor = OperationExecutor::new("dev1");
        let mut client = ThingClient::new(&mock, &clock, "dev1");
        install(&mut client, &inbox);
        client.begin();

        let topic = topics::command("dev1", "exec-2", CommandDirection::Request);
        client.on_message(&topic, &bytes(json!({"operation": "reboot"})));
        drain(&mut client, &executor, &inbox);

        let reply = mock.last_published().unwrap().json();
        assert_eq!(reply["status"], "FAILED");
        assert_eq!(reply["statusReason"]["reasonCode"], "UNSUPPORTED_OPERATION");
    }

    #[test]
    fn pending_list_starts_next_job() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(0);
        let inbox = Inbox::default();
        let executor = OperationExecutor::new("dev1");
        let mut client = ThingClient::new(&mock, &clock, "dev1");
        install(&mut client, &inbox);
        client.begin();

        let accepted = topics::jobs("dev1", JobsTopic::GetAccepted);
        client.on_message(&accepted, &bytes(json!({"queuedJobs": []})));
        drain(&mut client, &executor, &inbox);
        let start_next = topics::jobs("dev1", JobsTopic::StartNext);
        assert!(mock.published_to(&start_next).is_empty());

        client.on_message(&accepted, &bytes(json!({"queuedJobs": [{"jobId": "job-1"}]})));
        drain(&mut client, &executor, &inbox);
        assert_eq!(mock.published_to(&start_next).len(), 1);
    }

    #[test]
    fn started_job_is_executed_and_reported() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(0);
        let inbox = Inbox::default();
        let executor = OperationExecutor::new("dev1");
        let mut client = ThingClient::new(&mock, &clock, "dev1");
        install(&mut client, &inbox);
        client.begin();

        let topic = topics::jobs("dev1", JobsTopic::StartNextAccepted);
        let execution = json!({
            "execution": {
                "jobId": "job-1",
                "status": "QUEUED",
                "versionNumber": 4,
                "jobDocument": {"operation": "echo", "parameters": "hi"}
            }
        });
        client.on_message(&topic, &bytes(execution));
        drain(&mut client, &executor, &inbox);

        let update = mock.published_to(&topics::job("dev1", "job-1", JobTopic::Update));
        assert_eq!(update.len(), 1);
        assert_eq!(
            update[0].json(),
            json!({"status": "SUCCEEDED", "statusDetails": {"result": "\"hi\""}, "expectedVersion": 4})
        );
        assert_eq!(mock.published_to(&topics::jobs("dev1", JobsTopic::Get)).len(), 1);
    }

    #[test]
    fn desired_state_is_acknowledged() {
        let mock = MockChannel::new();
        let clock = ManualClock::new(0);
        let inbox = Inbox::default();
        let mut client = ThingClient::new(&mock, &clock, "dev1");
        install(&mut client, &inbox);
        client.register_shadow("config");
        client.begin();

        let topic = topics::shadow("dev1", "config", topics::ShadowTopic::GetAccepted);
        client.on_message(&topic, &bytes(json!({"state": {"desired": {"rate": 5}}})));

        let update = mock.last_published().unwrap();
        assert_eq!(update.topic, "$ctl/things/dev1/shadow/name/config/update");
        assert_eq!(update.json(), json!({"state": {"reported": {"rate": 5}}}));
        assert!(inbox.borrow().is_empty());
    }
}
