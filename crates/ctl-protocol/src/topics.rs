//! Topic builders and parsers for the device-management topic hierarchy.
//!
//! Topic structure:
//! ```text
//! $ctl/certificates/create/json[/accepted|/rejected]
//! $ctl/provisioning-templates/{template}/provision/json[/accepted|/rejected]
//! $ctl/things/{thing}/shadow[/get|/update][/accepted|/rejected]
//! $ctl/things/{thing}/shadow/name/{shadow}/{get|update}[/accepted|/rejected|/delta|/documents]
//! $ctl/commands/things/{thing}/executions/{execution_id}/{request|response}/json
//! $ctl/things/{thing}/jobs/{notify|get|start-next}[/accepted|/rejected]
//! $ctl/things/{thing}/jobs/{job_id}/{get|update}[/accepted|/rejected]
//! ```
//!
//! Every parser goes through [`strip_topic`], so identifier extraction is
//! always "known prefix, known suffix" and never hand-written offset math.

const PREFIX: &str = "$ctl";

/// Single-level MQTT wildcard, used in place of an identifier segment.
pub const WILDCARD: &str = "+";

/// Synthetic topic handed to the provisioning completion callback.
pub const PROVISIONING_SUCCESS: &str = "provisioning/success";

/// Extract the variable segment between a known `prefix` and `suffix`.
///
/// The suffix is removed by its own length, so callers pass the exact suffix
/// they subscribed with (`"/get/accepted"` and `"/update/documents"` slice
/// differently). The remainder must be a single non-empty topic level.
pub fn strip_topic<'t>(topic: &'t str, prefix: &str, suffix: &str) -> Option<&'t str> {
    let segment = topic.strip_prefix(prefix)?.strip_suffix(suffix)?;
    if segment.is_empty() || segment.contains('/') {
        return None;
    }
    Some(segment)
}

// ─── Shadow topics ───

/// Operation suffixes for a named (or classic) shadow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShadowTopic {
    Get,
    GetAccepted,
    GetRejected,
    Update,
    UpdateAccepted,
    UpdateRejected,
    UpdateDelta,
    UpdateDocuments,
}

impl ShadowTopic {
    /// The inbound suffixes subscribed for every registered shadow.
    pub const SUBSCRIBED: [ShadowTopic; 6] = [
        ShadowTopic::GetAccepted,
        ShadowTopic::GetRejected,
        ShadowTopic::UpdateAccepted,
        ShadowTopic::UpdateRejected,
        ShadowTopic::UpdateDelta,
        ShadowTopic::UpdateDocuments,
    ];

    /// Suffix including its leading separator, e.g. `"/get/accepted"`.
    pub fn as_suffix(self) -> &'static str {
        match self {
            ShadowTopic::Get => "/get",
            ShadowTopic::GetAccepted => "/get/accepted",
            ShadowTopic::GetRejected => "/get/rejected",
            ShadowTopic::Update => "/update",
            ShadowTopic::UpdateAccepted => "/update/accepted",
            ShadowTopic::UpdateRejected => "/update/rejected",
            ShadowTopic::UpdateDelta => "/update/delta",
            ShadowTopic::UpdateDocuments => "/update/documents",
        }
    }
}

/// Common prefix of every named shadow topic for a thing.
pub fn shadow_name_prefix(thing: &str) -> String {
    format!("{PREFIX}/things/{thing}/shadow/name/")
}

pub fn shadow(thing: &str, shadow: &str, suffix: ShadowTopic) -> String {
    format!("{}{shadow}{}", shadow_name_prefix(thing), suffix.as_suffix())
}

/// Topic of the unnamed ("classic") shadow of a thing.
pub fn classic_shadow(thing: &str, suffix: ShadowTopic) -> String {
    format!("{PREFIX}/things/{thing}/shadow{}", suffix.as_suffix())
}

/// Parse an inbound named-shadow topic into `(shadow_name, suffix)`.
pub fn parse_shadow<'t>(thing: &str, topic: &'t str) -> Option<(&'t str, ShadowTopic)> {
    let prefix = shadow_name_prefix(thing);
    ShadowTopic::SUBSCRIBED.into_iter().find_map(|suffix| {
        strip_topic(topic, &prefix, suffix.as_suffix()).map(|name| (name, suffix))
    })
}

/// Parse an inbound classic-shadow topic.
pub fn parse_classic_shadow(thing: &str, topic: &str) -> Option<ShadowTopic> {
    [ShadowTopic::GetAccepted, ShadowTopic::GetRejected]
        .into_iter()
        .find(|suffix| topic == classic_shadow(thing, *suffix))
}

// ─── Command topics ───

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandDirection {
    Request,
    Response,
}

impl CommandDirection {
    pub fn as_suffix(self) -> &'static str {
        match self {
            CommandDirection::Request => "/request/json",
            CommandDirection::Response => "/response/json",
        }
    }
}

fn command_prefix(thing: &str) -> String {
    format!("{PREFIX}/commands/things/{thing}/executions/")
}

/// Command execution topic; pass [`WILDCARD`] as the id for a subscription filter.
pub fn command(thing: &str, execution_id: &str, direction: CommandDirection) -> String {
    format!("{}{execution_id}{}", command_prefix(thing), direction.as_suffix())
}

/// Subscription filter matching every command request for a thing.
pub fn command_request_filter(thing: &str) -> String {
    command(thing, WILDCARD, CommandDirection::Request)
}

/// Extract the execution id from an inbound command request topic.
pub fn parse_command_request<'t>(thing: &str, topic: &'t str) -> Option<&'t str> {
    strip_topic(
        topic,
        &command_prefix(thing),
        CommandDirection::Request.as_suffix(),
    )
}

// ─── Job topics ───

/// Thing-level job topics (no job id segment).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobsTopic {
    Notify,
    Get,
    GetAccepted,
    GetRejected,
    StartNext,
    StartNextAccepted,
    StartNextRejected,
}

impl JobsTopic {
    pub const SUBSCRIBED: [JobsTopic; 5] = [
        JobsTopic::Notify,
        JobsTopic::GetAccepted,
        JobsTopic::GetRejected,
        JobsTopic::StartNextAccepted,
        JobsTopic::StartNextRejected,
    ];

    pub fn as_suffix(self) -> &'static str {
        match self {
            JobsTopic::Notify => "/notify",
            JobsTopic::Get => "/get",
            JobsTopic::GetAccepted => "/get/accepted",
            JobsTopic::GetRejected => "/get/rejected",
            JobsTopic::StartNext => "/start-next",
            JobsTopic::StartNextAccepted => "/start-next/accepted",
            JobsTopic::StartNextRejected => "/start-next/rejected",
        }
    }
}

/// Per-job topics (`jobs/{job_id}/...`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobTopic {
    Get,
    GetAccepted,
    GetRejected,
    Update,
    UpdateAccepted,
    UpdateRejected,
}

impl JobTopic {
    pub const SUBSCRIBED: [JobTopic; 4] = [
        JobTopic::GetAccepted,
        JobTopic::GetRejected,
        JobTopic::UpdateAccepted,
        JobTopic::UpdateRejected,
    ];

    pub fn as_suffix(self) -> &'static str {
        match self {
            JobTopic::Get => "/get",
            JobTopic::GetAccepted => "/get/accepted",
            JobTopic::GetRejected => "/get/rejected",
            JobTopic::Update => "/update",
            JobTopic::UpdateAccepted => "/update/accepted",
            JobTopic::UpdateRejected => "/update/rejected",
        }
    }
}

fn jobs_prefix(thing: &str) -> String {
    format!("{PREFIX}/things/{thing}/jobs")
}

pub fn jobs(thing: &str, suffix: JobsTopic) -> String {
    format!("{}{}", jobs_prefix(thing), suffix.as_suffix())
}

/// Per-job topic; pass [`WILDCARD`] as the id for a subscription filter.
pub fn job(thing: &str, job_id: &str, suffix: JobTopic) -> String {
    format!("{}/{job_id}{}", jobs_prefix(thing), suffix.as_suffix())
}

/// Match an inbound thing-level job topic exactly.
pub fn parse_jobs(thing: &str, topic: &str) -> Option<JobsTopic> {
    JobsTopic::SUBSCRIBED
        .into_iter()
        .find(|suffix| topic == jobs(thing, *suffix))
}

/// Parse an inbound per-job topic into `(job_id, suffix)`.
pub fn parse_job<'t>(thing: &str, topic: &'t str) -> Option<(&'t str, JobTopic)> {
    let prefix = format!("{}/", jobs_prefix(thing));
    JobTopic::SUBSCRIBED.into_iter().find_map(|suffix| {
        strip_topic(topic, &prefix, suffix.as_suffix()).map(|id| (id, suffix))
    })
}

// ─── Provisioning topics ───

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningTopic {
    Request,
    Accepted,
    Rejected,
}

impl ProvisioningTopic {
    pub fn as_suffix(self) -> &'static str {
        match self {
            ProvisioningTopic::Request => "",
            ProvisioningTopic::Accepted => "/accepted",
            ProvisioningTopic::Rejected => "/rejected",
        }
    }
}

pub fn create_certificate(suffix: ProvisioningTopic) -> String {
    format!("{PREFIX}/certificates/create/json{}", suffix.as_suffix())
}

pub fn provisioning_template(template: &str, suffix: ProvisioningTopic) -> String {
    format!(
        "{PREFIX}/provisioning-templates/{template}/provision/json{}",
        suffix.as_suffix()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn named_shadow_topics() {
        assert_eq!(
            shadow("dev1", "temp", ShadowTopic::Get),
            "$ctl/things/dev1/shadow/name/temp/get"
        );
        assert_eq!(
            shadow("dev1", "temp", ShadowTopic::UpdateDocuments),
            "$ctl/things/dev1/shadow/name/temp/update/documents"
        );
    }

    #[test]
    fn classic_shadow_topics() {
        assert_eq!(
            classic_shadow("dev1", ShadowTopic::GetAccepted),
            "$ctl/things/dev1/shadow/get/accepted"
        );
        assert_eq!(
            parse_classic_shadow("dev1", "$ctl/things/dev1/shadow/get/accepted"),
            Some(ShadowTopic::GetAccepted)
        );
        assert_eq!(
            parse_classic_shadow("dev1", "$ctl/things/dev1/shadow/name/x/get/accepted"),
            None
        );
    }

    #[test]
    fn suffix_lengths_differ() {
        assert_eq!(ShadowTopic::GetAccepted.as_suffix().len(), 13);
        assert_eq!(ShadowTopic::UpdateDocuments.as_suffix().len(), 17);
    }

    #[test]
    fn shadow_name_survives_every_suffix() {
        for suffix in ShadowTopic::SUBSCRIBED {
            let topic = shadow("dev1", "temp", suffix);
            assert_eq!(parse_shadow("dev1", &topic), Some(("temp", suffix)));
        }
    }

    #[test]
    fn shadow_parse_rejects_other_things_and_outbound_suffixes() {
        let topic = shadow("dev2", "temp", ShadowTopic::GetAccepted);
        assert!(parse_shadow("dev1", &topic).is_none());

        let outbound = shadow("dev1", "temp", ShadowTopic::Update);
        assert!(parse_shadow("dev1", &outbound).is_none());
    }

    #[test]
    fn strip_topic_requires_single_level() {
        assert_eq!(strip_topic("a/x/b", "a/", "/b"), Some("x"));
        assert_eq!(strip_topic("a//b", "a/", "/b"), None);
        assert_eq!(strip_topic("a/x/y/b", "a/", "/b"), None);
        assert_eq!(strip_topic("c/x/b", "a/", "/b"), None);
    }

    #[test]
    fn command_topics() {
        assert_eq!(
            command("dev1", "exec-9", CommandDirection::Response),
            "$ctl/commands/things/dev1/executions/exec-9/response/json"
        );
        assert_eq!(
            command_request_filter("dev1"),
            "$ctl/commands/things/dev1/executions/+/request/json"
        );
        let request = command("dev1", "exec-9", CommandDirection::Request);
        assert_eq!(parse_command_request("dev1", &request), Some("exec-9"));
        let response = command("dev1", "exec-9", CommandDirection::Response);
        assert_eq!(parse_command_request("dev1", &response), None);
    }

    #[test]
    fn job_topics() {
        assert_eq!(jobs("dev1", JobsTopic::Notify), "$ctl/things/dev1/jobs/notify");
        assert_eq!(
            jobs("dev1", JobsTopic::StartNext),
            "$ctl/things/dev1/jobs/start-next"
        );
        assert_eq!(
            job("dev1", "job-7", JobTopic::Update),
            "$ctl/things/dev1/jobs/job-7/update"
        );
        assert_eq!(
            job("dev1", WILDCARD, JobTopic::GetAccepted),
            "$ctl/things/dev1/jobs/+/get/accepted"
        );
    }

    #[test]
    fn list_and_detail_topics_do_not_collide() {
        let list = jobs("dev1", JobsTopic::GetAccepted);
        assert_eq!(parse_jobs("dev1", &list), Some(JobsTopic::GetAccepted));
        assert!(parse_job("dev1", &list).is_none());

        let detail = job("dev1", "job-7", JobTopic::GetAccepted);
        assert_eq!(parse_job("dev1", &detail), Some(("job-7", JobTopic::GetAccepted)));
        assert!(parse_jobs("dev1", &detail).is_none());
    }

    #[test]
    fn provisioning_topics() {
        assert_eq!(
            create_certificate(ProvisioningTopic::Request),
            "$ctl/certificates/create/json"
        );
        assert_eq!(
            create_certificate(ProvisioningTopic::Accepted),
            "$ctl/certificates/create/json/accepted"
        );
        assert_eq!(
            provisioning_template("fleet", ProvisioningTopic::Rejected),
            "$ctl/provisioning-templates/fleet/provision/json/rejected"
        );
    }
}
