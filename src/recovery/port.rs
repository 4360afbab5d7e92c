use crate::core::ErrorKind;
use crate::storage::RescueArtifact;
use async_trait::async_trait;
use std::path::PathBuf;

/// Choices the load pipeline can offer after a terminal read failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOption {
    RetryRead,
    RestoreFromRescue,
    CreateDefaultDocument,
    AbortWithEmptyDocument,
    QuitProcess,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryDecision {
    RetryRead,
    RestoreFromRescue(RescueArtifact),
    CreateDefaultDocument,
    /// Continue with an empty in-memory document; nothing is written.
    AbortWithEmptyDocument,
    QuitProcess,
}

/// Everything a UI needs to render a recovery question.
#[derive(Debug, Clone)]
pub struct RecoveryPrompt {
    pub kind: ErrorKind,
    pub path: PathBuf,
    pub detail: String,
    /// Newest rescue artifact next to the document, if any
    pub rescue: Option<RescueArtifact>,
    /// Forensic copy made when the document failed to parse
    pub corrupt_backup: Option<PathBuf>,
    pub is_default_location: bool,
    /// 1 for the first question of a load, incremented on every `RetryRead`
    pub round: u32,
}

impl RecoveryPrompt {
    pub fn options(&self) -> Vec<RecoveryOption> {
        let mut options = vec![RecoveryOption::RetryRead];
        if self.rescue.is_some() {
            options.push(RecoveryOption::RestoreFromRescue);
        }
        options.extend([
            RecoveryOption::CreateDefaultDocument,
            RecoveryOption::AbortWithEmptyDocument,
            RecoveryOption::QuitProcess,
        ]);
        options
    }
}

/// Port through which the persistence core asks the calling layer how to
/// recover. UI code implements it with dialogs; tests with scripted fakes.
#[async_trait]
pub trait DecisionPort: Send + Sync {
    async fn decide(&self, prompt: &RecoveryPrompt) -> RecoveryDecision;
}

/// Non-interactive policy.
///
/// Restores the newest rescue artifact when there is one, creates a default
/// document for a missing file, and otherwise continues with an empty
/// document without writing, so a corrupt or locked file is never
/// overwritten unattended.
#[derive(Debug, Default, Clone, Copy)]
pub struct PolicyPort;

#[async_trait]
impl DecisionPort for PolicyPort {
    async fn decide(&self, prompt: &RecoveryPrompt) -> RecoveryDecision {
        if let Some(rescue) = &prompt.rescue {
            return RecoveryDecision::RestoreFromRescue(rescue.clone());
        }
        match prompt.kind {
            ErrorKind::NotFound => RecoveryDecision::CreateDefaultDocument,
            _ => RecoveryDecision::AbortWithEmptyDocument,
        }
    }
}
