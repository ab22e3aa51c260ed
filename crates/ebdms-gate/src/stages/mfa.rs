use crate::error::GateError;
use crate::stage::{AccessRequest, GateContext, GateStage, StageDecision};

/// Requires an MFA-verified session for operations in the configured scope.
///
/// Never honors the superuser bypass.
pub struct MfaStage;

impl GateStage for MfaStage {
    fn name(&self) -> &str {
        "mfa"
    }

    fn evaluate(
        &self,
        request: &AccessRequest<'_>,
        context: &GateContext<'_>,
    ) -> Result<StageDecision, GateError> {
        let required = context
            .config
            .mfa
            .requires_mfa(request.operation, request.resource_type);
        if required && !request.actor.mfa_verified {
            return Ok(StageDecision::fail(format!(
                "mfa required for {} on {}",
                request.operation, request.resource_type
            )));
        }
        Ok(StageDecision::Pass)
    }
}
