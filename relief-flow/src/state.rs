use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{FlowError, Result};

/// State of the 3-step analysis wizard.
///
/// The step number is derived from the variant, never stored separately,
/// so a session can only ever claim a step its bound documents justify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum WizardState {
    /// Step 1: nothing bound yet.
    AwaitingRequirements,
    /// Step 2: requirements document bound, waiting for the claim/form.
    AwaitingClaim { requirements_doc_id: Uuid },
    /// Step 3: both documents bound, analysis may run.
    ReadyToAnalyze {
        requirements_doc_id: Uuid,
        claim_doc_id: Uuid,
    },
}

impl WizardState {
    pub fn new() -> Self {
        WizardState::AwaitingRequirements
    }

    pub fn step(&self) -> u8 {
        match self {
            WizardState::AwaitingRequirements => 1,
            WizardState::AwaitingClaim { .. } => 2,
            WizardState::ReadyToAnalyze { .. } => 3,
        }
    }

    pub fn requirements_doc(&self) -> Option<Uuid> {
        match self {
            WizardState::AwaitingRequirements => None,
            WizardState::AwaitingClaim {
                requirements_doc_id,
            } => Some(*requirements_doc_id),
            WizardState::ReadyToAnalyze {
                requirements_doc_id,
                ..
            } => Some(*requirements_doc_id),
        }
    }

    pub fn claim_doc(&self) -> Option<Uuid> {
        match self {
            WizardState::ReadyToAnalyze { claim_doc_id, .. } => Some(*claim_doc_id),
            _ => None,
        }
    }

    /// Bind (or rebind) the requirements document. Legal from any state.
    ///
    /// Rebinding at step 1 after a claim document is already bound keeps
    /// the claim binding; later progress is not invalidated.
    pub fn bind_requirements(self, doc_id: Uuid) -> WizardState {
        match self {
            WizardState::ReadyToAnalyze { claim_doc_id, .. } => WizardState::ReadyToAnalyze {
                requirements_doc_id: doc_id,
                claim_doc_id,
            },
            _ => WizardState::AwaitingClaim {
                requirements_doc_id: doc_id,
            },
        }
    }

    /// Bind (or rebind) the claim/form document. Requires step 1 complete.
    pub fn bind_claim(self, doc_id: Uuid) -> Result<WizardState> {
        match self {
            WizardState::AwaitingRequirements => Err(FlowError::InvalidTransition(
                "a requirements document must be uploaded before the claim document".to_string(),
            )),
            WizardState::AwaitingClaim {
                requirements_doc_id,
            }
            | WizardState::ReadyToAnalyze {
                requirements_doc_id,
                ..
            } => Ok(WizardState::ReadyToAnalyze {
                requirements_doc_id,
                claim_doc_id: doc_id,
            }),
        }
    }

    /// Both documents bound, as a pair, or an invalid-transition error.
    pub fn bound_documents(&self) -> Result<(Uuid, Uuid)> {
        match self {
            WizardState::ReadyToAnalyze {
                requirements_doc_id,
                claim_doc_id,
            } => Ok((*requirements_doc_id, *claim_doc_id)),
            _ => Err(FlowError::InvalidTransition(
                "both a requirements and a claim document must be uploaded before analysis"
                    .to_string(),
            )),
        }
    }
}

impl Default for WizardState {
    fn default() -> Self {
        Self::new()
    }
}
