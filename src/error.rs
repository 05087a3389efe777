use std::fmt;

#[derive(Debug)]
pub enum SpindleError {
    Engine(EngineError),
    Placement(PlacementError),
    Proposal(ProposalError),
}

/// Failures of the audio session itself.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineError {
    /// No usable audio session can be constructed on this platform.
    UnsupportedPlatform { reason: String },
    /// The session was closed and cannot be resumed.
    Closed,
    /// Encoding the captured audio failed.
    Capture(String),
    /// Settings could not be parsed.
    Config(String),
}

/// Rejected note placements.
#[derive(Debug, Clone, PartialEq)]
pub enum PlacementError {
    TrackOutOfRange { track: usize },
    /// The span would overlap the existing note `existing` on the same track.
    Overlap { track: usize, angle: f64, existing: String },
    InvalidAngle { angle: f64 },
    UnknownColor { index: usize },
    UnknownColorKey { key: String },
}

/// Rejected batches of externally proposed notes. A batch is applied whole
/// or not at all.
#[derive(Debug, Clone, PartialEq)]
pub enum ProposalError {
    Json(String),
    NotAnArray,
    InvalidEntry { index: usize, reason: String },
}

impl fmt::Display for SpindleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpindleError::Engine(e) => write!(f, "Engine error: {e}"),
            SpindleError::Placement(e) => write!(f, "Placement error: {e}"),
            SpindleError::Proposal(e) => write!(f, "Generation failed: {e}"),
        }
    }
}

impl std::error::Error for SpindleError {}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::UnsupportedPlatform { reason } => write!(f, "audio unsupported: {reason}"),
            EngineError::Closed => write!(f, "audio session is closed"),
            EngineError::Capture(msg) => write!(f, "capture failed: {msg}"),
            EngineError::Config(msg) => write!(f, "invalid settings: {msg}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl fmt::Display for PlacementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlacementError::TrackOutOfRange { track } => write!(f, "track {track} does not exist"),
            PlacementError::Overlap { track, angle, existing } => {
                write!(f, "note at {angle}° on track {track} overlaps note '{existing}'")
            }
            PlacementError::InvalidAngle { angle } => write!(f, "angle {angle} is not a finite number"),
            PlacementError::UnknownColor { index } => write!(f, "no palette color at index {index}"),
            PlacementError::UnknownColorKey { key } => write!(f, "no palette color named '{key}'"),
        }
    }
}

impl std::error::Error for PlacementError {}

impl fmt::Display for ProposalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProposalError::Json(msg) => write!(f, "malformed proposal JSON: {msg}"),
            ProposalError::NotAnArray => write!(f, "proposal must be an array of notes"),
            ProposalError::InvalidEntry { index, reason } => write!(f, "proposal entry {index}: {reason}"),
        }
    }
}

impl std::error::Error for ProposalError {}

impl From<EngineError> for SpindleError {
    fn from(e: EngineError) -> Self {
        SpindleError::Engine(e)
    }
}

impl From<PlacementError> for SpindleError {
    fn from(e: PlacementError) -> Self {
        SpindleError::Placement(e)
    }
}

impl From<ProposalError> for SpindleError {
    fn from(e: ProposalError) -> Self {
        SpindleError::Proposal(e)
    }
}

impl From<hound::Error> for EngineError {
    fn from(e: hound::Error) -> Self {
        EngineError::Capture(e.to_string())
    }
}

impl From<serde_json::Error> for ProposalError {
    fn from(e: serde_json::Error) -> Self {
        ProposalError::Json(e.to_string())
    }
}
