//! Provisioning Phases
//!
//! The filesystem job keeps its progress on the driving Job as three
//! annotations: the current phase, a JSON phase-details record and a JSON
//! record of the resources created so far. A controller reading those
//! annotations depends on the exact keys and JSON field names below.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Annotation holding the current phase
pub const PHASE_ANNOTATION: &str = "fusion.storage.openshift.io/current-phase";

/// Annotation holding the JSON encoded [`PhaseDetails`]
pub const PHASE_DETAILS_ANNOTATION: &str = "fusion.storage.openshift.io/phase-details";

/// Annotation holding the JSON encoded [`CreatedResources`]
pub const CREATED_RESOURCES_ANNOTATION: &str = "fusion.storage.openshift.io/created-resources";

/// Number of provisioning steps reported in the progress string
pub const TOTAL_STEPS: usize = 3;

// =============================================================================
// Phase
// =============================================================================

/// Phase of a create-filesystem run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Starting,
    #[serde(rename = "creating-localdisks")]
    CreatingLocalDisks,
    #[serde(rename = "creating-filesystem")]
    CreatingFilesystem,
    #[serde(rename = "creating-storageclass")]
    CreatingStorageClass,
    Completed,
    Failed,
}

impl Phase {
    /// Annotation value of the phase
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Starting => "starting",
            Phase::CreatingLocalDisks => "creating-localdisks",
            Phase::CreatingFilesystem => "creating-filesystem",
            Phase::CreatingStorageClass => "creating-storageclass",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        }
    }

    /// Completed steps reported while in this phase
    pub fn step(&self) -> usize {
        match self {
            Phase::Starting => 0,
            Phase::CreatingLocalDisks => 1,
            Phase::CreatingFilesystem => 2,
            Phase::CreatingStorageClass | Phase::Completed | Phase::Failed => 3,
        }
    }

    /// Progress string, e.g. `2/3`
    pub fn progress(&self) -> String {
        format!("{}/{}", self.step(), TOTAL_STEPS)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    /// Whether `next` may follow this phase
    pub fn can_transition_to(&self, next: Phase) -> bool {
        match (self, next) {
            (Phase::Starting, Phase::CreatingLocalDisks)
            | (Phase::CreatingLocalDisks, Phase::CreatingFilesystem)
            | (Phase::CreatingFilesystem, Phase::CreatingStorageClass)
            | (Phase::CreatingStorageClass, Phase::Completed) => true,
            (current, Phase::Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Annotation Records
// =============================================================================

/// Phase details written to the phase-details annotation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDetails {
    /// Phase the details describe; on failure, the step that failed
    pub current_phase: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Checkpoint of the resources created by a run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedResources {
    /// New and reused LocalDisk names, in pool order
    #[serde(default, deserialize_with = "null_as_empty")]
    pub local_disks: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_system: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl CreatedResources {
    /// Parse a checkpoint record, treating empty strings as "nothing created"
    pub fn from_json(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_str(raw)?)
    }

    pub fn is_empty(&self) -> bool {
        self.local_disks.is_empty() && self.file_system.is_none() && self.storage_class.is_none()
    }
}

// =============================================================================
// Provisioning State
// =============================================================================

/// In-memory state of a create-filesystem run, rendered into annotations
#[derive(Debug, Clone)]
pub struct ProvisioningState {
    phase: Phase,
    details: PhaseDetails,
    created: CreatedResources,
}

impl ProvisioningState {
    /// State of a run that is starting
    pub fn start(message: impl Into<String>) -> Self {
        Self {
            phase: Phase::Starting,
            details: PhaseDetails {
                current_phase: Phase::Starting.to_string(),
                message: message.into(),
                progress: Some(Phase::Starting.progress()),
                error: None,
            },
            created: CreatedResources::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn details(&self) -> &PhaseDetails {
        &self.details
    }

    pub fn created(&self) -> &CreatedResources {
        &self.created
    }

    /// Mutable access to the checkpoint record
    pub fn created_mut(&mut self) -> &mut CreatedResources {
        &mut self.created
    }

    /// Move to the next phase
    pub fn advance(&mut self, next: Phase, message: impl Into<String>) -> Result<()> {
        if !self.phase.can_transition_to(next) || next == Phase::Failed {
            return Err(Error::Internal(format!(
                "invalid phase transition {} -> {}",
                self.phase, next
            )));
        }
        self.phase = next;
        self.details = PhaseDetails {
            current_phase: next.to_string(),
            message: message.into(),
            progress: Some(next.progress()),
            error: None,
        };
        Ok(())
    }

    /// Mark the run failed while keeping the failed step in the details
    pub fn fail(&mut self, message: impl Into<String>, error: impl std::fmt::Display) -> Result<()> {
        if !self.phase.can_transition_to(Phase::Failed) {
            return Err(Error::Internal(format!(
                "invalid phase transition {} -> {}",
                self.phase,
                Phase::Failed
            )));
        }
        let step = self.phase;
        self.phase = Phase::Failed;
        self.details = PhaseDetails {
            current_phase: step.to_string(),
            message: message.into(),
            progress: Some(step.progress()),
            error: Some(error.to_string()),
        };
        Ok(())
    }

    /// The three Job annotations describing this state
    pub fn annotations(&self) -> Result<BTreeMap<String, String>> {
        Ok(BTreeMap::from([
            (PHASE_ANNOTATION.to_string(), self.phase.to_string()),
            (
                PHASE_DETAILS_ANNOTATION.to_string(),
                serde_json::to_string(&self.details)?,
            ),
            (
                CREATED_RESOURCES_ANNOTATION.to_string(),
                serde_json::to_string(&self.created)?,
            ),
        ]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Phase; 6] = [
        Phase::Starting,
        Phase::CreatingLocalDisks,
        Phase::CreatingFilesystem,
        Phase::CreatingStorageClass,
        Phase::Completed,
        Phase::Failed,
    ];

    #[test]
    fn test_phase_strings() {
        for phase in ALL {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{}\"", phase.as_str()));
            let back: Phase = serde_json::from_str(&json).unwrap();
            assert_eq!(back, phase);
        }
        assert_eq!(Phase::CreatingLocalDisks.to_string(), "creating-localdisks");
        assert_eq!(Phase::CreatingStorageClass.progress(), "3/3");
        assert_eq!(Phase::Starting.progress(), "0/3");
    }

    #[test]
    fn test_transition_table() {
        let allowed = [
            (Phase::Starting, Phase::CreatingLocalDisks),
            (Phase::CreatingLocalDisks, Phase::CreatingFilesystem),
            (Phase::CreatingFilesystem, Phase::CreatingStorageClass),
            (Phase::CreatingStorageClass, Phase::Completed),
            (Phase::Starting, Phase::Failed),
            (Phase::CreatingLocalDisks, Phase::Failed),
            (Phase::CreatingFilesystem, Phase::Failed),
            (Phase::CreatingStorageClass, Phase::Failed),
        ];

        for from in ALL {
            for to in ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    allowed.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_created_resources_json() {
        let empty = CreatedResources::default();
        assert_eq!(serde_json::to_string(&empty).unwrap(), r#"{"localDisks":[]}"#);

        let full = CreatedResources {
            local_disks: vec!["sdb-0x5000".into()],
            file_system: Some("fs1".into()),
            storage_class: Some("fs1".into()),
        };
        assert_eq!(
            serde_json::to_string(&full).unwrap(),
            r#"{"localDisks":["sdb-0x5000"],"fileSystem":"fs1","storageClass":"fs1"}"#
        );

        let parsed = CreatedResources::from_json(r#"{"localDisks":null,"fileSystem":"fs1"}"#).unwrap();
        assert!(parsed.local_disks.is_empty());
        assert_eq!(parsed.file_system.as_deref(), Some("fs1"));

        assert!(CreatedResources::from_json("  ").unwrap().is_empty());
        assert!(CreatedResources::from_json("{not json").is_err());
    }

    #[test]
    fn test_phase_details_json() {
        let details = PhaseDetails {
            current_phase: "starting".into(),
            message: "Starting creation of filesystem fs1".into(),
            progress: Some("0/3".into()),
            error: None,
        };
        assert_eq!(
            serde_json::to_string(&details).unwrap(),
            r#"{"currentPhase":"starting","message":"Starting creation of filesystem fs1","progress":"0/3"}"#
        );
    }

    #[test]
    fn test_state_walk_and_failure() {
        let mut state = ProvisioningState::start("Starting creation of filesystem fs1");
        state
            .advance(Phase::CreatingLocalDisks, "Creating 2 new LocalDisk resources")
            .unwrap();
        assert!(state.advance(Phase::Completed, "skip").is_err());
        assert!(state.advance(Phase::Failed, "use fail()").is_err());

        state.advance(Phase::CreatingFilesystem, "Creating FileSystem").unwrap();
        state.created_mut().local_disks.push("sdb-0x1".into());
        state
            .fail("Failed to create FileSystem", "admission webhook denied")
            .unwrap();

        assert_eq!(state.phase(), Phase::Failed);
        assert_eq!(state.details().current_phase, "creating-filesystem");
        assert_eq!(state.details().progress.as_deref(), Some("2/3"));
        assert!(state.fail("again", "x").is_err());

        let annotations = state.annotations().unwrap();
        assert_eq!(annotations[PHASE_ANNOTATION], "failed");
        let details: PhaseDetails =
            serde_json::from_str(&annotations[PHASE_DETAILS_ANNOTATION]).unwrap();
        assert_eq!(details.error.as_deref(), Some("admission webhook denied"));
        let created =
            CreatedResources::from_json(&annotations[CREATED_RESOURCES_ANNOTATION]).unwrap();
        assert_eq!(created.local_disks, vec!["sdb-0x1".to_string()]);
    }
}
