//! Generation domain module.
//!
//! - `stage`: stage events reported by the service (`StageEvent`)
//! - `request`: options, job payload, request state, status and outcome
//! - `service`: collaborator traits (`GenerationService`, `AnalysisService`)

mod request;
mod service;
mod stage;

pub use request::{
    CancelPhase, CardType, GenerationJob, GenerationOptions, GenerationOutcome,
    GenerationRequest, GenerationStatus, JobState,
};
pub use service::{AnalysisResult, AnalysisService, GenerationService, StageSink};
pub use stage::{RawStageEvent, StageEnvelope, StageErrorKind, StageEvent};
