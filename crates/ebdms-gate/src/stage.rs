use std::time::Duration;

use ebdms_types::{ActorContext, ActorId, ProjectId};

use crate::config::GateConfig;
use crate::error::GateError;
use crate::policy::{Operation, ResourceType};

// ---------------------------------------------------------------------------
// AccessRequest
// ---------------------------------------------------------------------------

/// A single authorization question: may `actor` perform `operation` on
/// `subject_id` inside `project_id`?
#[derive(Clone, Copy, Debug)]
pub struct AccessRequest<'a> {
    pub actor: &'a ActorContext,
    pub project_id: &'a ProjectId,
    pub operation: Operation,
    pub resource_type: ResourceType,
    /// Identifier of the thing being touched, echoed into the grant for
    /// audit purposes.
    pub subject_id: &'a str,
}

impl<'a> AccessRequest<'a> {
    /// Request against the operation's natural resource type.
    pub fn new(
        actor: &'a ActorContext,
        project_id: &'a ProjectId,
        operation: Operation,
        subject_id: &'a str,
    ) -> Self {
        Self {
            actor,
            project_id,
            operation,
            resource_type: operation.resource_type(),
            subject_id,
        }
    }

    pub fn on(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = resource_type;
        self
    }
}

// ---------------------------------------------------------------------------
// StageDecision / StageResult
// ---------------------------------------------------------------------------

/// The outcome of a single stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StageDecision {
    Pass,
    Fail { reason: String },
}

impl StageDecision {
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Fail {
            reason: reason.into(),
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

/// Recorded result from a completed stage.
#[derive(Clone, Debug)]
pub struct StageResult {
    pub stage_name: String,
    pub passed: bool,
    pub reason: Option<String>,
    pub elapsed: Duration,
}

// ---------------------------------------------------------------------------
// GateContext
// ---------------------------------------------------------------------------

/// Shared state visible to every stage during one evaluation.
pub struct GateContext<'a> {
    pub config: &'a GateConfig,
    /// Results from stages that already ran in this evaluation.
    pub previous_stages: Vec<StageResult>,
}

impl<'a> GateContext<'a> {
    pub fn new(config: &'a GateConfig) -> Self {
        Self {
            config,
            previous_stages: Vec::new(),
        }
    }

    /// Whether the superuser bypass applies to this request.
    pub fn bypasses(&self, request: &AccessRequest<'_>) -> bool {
        self.config.superuser_bypass && request.actor.superuser
    }
}

// ---------------------------------------------------------------------------
// AccessGrant
// ---------------------------------------------------------------------------

/// Final decision for an [`AccessRequest`].
#[derive(Clone, Debug)]
pub struct AccessGrant {
    pub actor_id: ActorId,
    pub project_id: ProjectId,
    pub subject_id: String,
    pub operation: Operation,
    pub resource_type: ResourceType,
    pub allowed: bool,
    /// Denial reason from the first failing stage.
    pub reason: Option<String>,
    pub stage_results: Vec<StageResult>,
    pub elapsed: Duration,
}

impl AccessGrant {
    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    /// Name of the stage that denied, if any.
    pub fn denied_by(&self) -> Option<&str> {
        self.stage_results
            .iter()
            .find(|r| !r.passed)
            .map(|r| r.stage_name.as_str())
    }
}

// ---------------------------------------------------------------------------
// GateStage
// ---------------------------------------------------------------------------

/// One evaluation step in the access pipeline.
///
/// Stages are pure: they read the request and context and decide. They must
/// not perform I/O, so the same inputs always give the same decision.
pub trait GateStage: Send + Sync {
    fn name(&self) -> &str;

    fn evaluate(
        &self,
        request: &AccessRequest<'_>,
        context: &GateContext<'_>,
    ) -> Result<StageDecision, GateError>;
}
