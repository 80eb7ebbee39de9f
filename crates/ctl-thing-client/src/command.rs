//! Remote command executions.
//!
//! No correlation state is kept: the execution id travels in the topic, and
//! the application replies to it with [`CommandDispatcher::reply`].

use ctl_mqtt_channel::Channel;
use ctl_protocol::CommandReply;
use ctl_protocol::topics::{self, CommandDirection};
use serde_json::Value;

use crate::outbound::{publish_logged, subscribe_all};

/// Invoked with `(execution_id, request_payload)`.
pub type CommandCallback<'a> = Box<dyn FnMut(&str, &Value) -> bool + 'a>;

pub struct CommandDispatcher<'a, C: Channel> {
    channel: &'a C,
    thing_name: String,
    callback: Option<CommandCallback<'a>>,
}

impl<'a, C: Channel> CommandDispatcher<'a, C> {
    pub fn new(channel: &'a C, thing_name: impl Into<String>) -> Self {
        Self {
            channel,
            thing_name: thing_name.into(),
            callback: None,
        }
    }

    pub fn set_callback(&mut self, callback: CommandCallback<'a>) {
        self.callback = Some(callback);
    }

    /// Subscribe to every command request addressed to this thing.
    pub fn begin(&self) -> bool {
        subscribe_all(
            self.channel,
            [topics::command_request_filter(&self.thing_name)],
        )
    }

    pub fn reply(&self, execution_id: &str, reply: &CommandReply) -> bool {
        let topic = topics::command(&self.thing_name, execution_id, CommandDirection::Response);
        tracing::debug!(execution_id = %execution_id, status = ?reply.status, "command reply");
        publish_logged(self.channel, &topic, reply)
    }

    /// Route an inbound message; `None` if it is not a command request.
    pub fn handle(&mut self, topic: &str, payload: &Value) -> Option<bool> {
        let execution_id = topics::parse_command_request(&self.thing_name, topic)?;
        tracing::info!(execution_id = %execution_id, "command received");

        match self.callback.as_mut() {
            Some(callback) => Some(callback(execution_id, payload)),
            None => {
                tracing::warn!(execution_id = %execution_id, "no command callback registered");
                Some(false)
            }
        }
    }
}
