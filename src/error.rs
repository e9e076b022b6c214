use thiserror::Error;

/// Contract violations raised by the geometry primitives.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("zero-length vector")]
    ZeroLength,

    #[error("matrix is singular and cannot be inverted")]
    SingularMatrix,

    #[error("at least {needed} points are required for axis fitting, got {got}")]
    TooFewPoints { needed: usize, got: usize },
}

/// Errors raised while composing per-frame transforms into a root frame.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameGraphError {
    #[error("invalid root_index {root} for {len} frames")]
    RootOutOfRange { root: usize, len: usize },

    #[error("invalid parent reference {parent} for frame index {index} (must be in [0, {len}))")]
    InvalidParent {
        index: usize,
        parent: i64,
        len: usize,
    },

    #[error("cycle detected in reference chain at frame index {index}")]
    Cycle { index: usize },

    #[error("no frames to resolve")]
    Empty,

    #[error("reference frame '{name}' not found. Available: {available}")]
    UnknownReference { name: String, available: String },
}

/// Errors raised while validating an electrode model catalog.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CatalogError {
    #[error("electrode library must be a JSON object")]
    NotAnObject,

    #[error("electrode library must include a 'models' list")]
    MissingModels,

    #[error("electrode library contains no models")]
    Empty,

    #[error("model #{position} missing required fields: {fields:?}")]
    MissingFields {
        position: usize,
        fields: Vec<String>,
    },

    #[error("model #{position} is malformed: {message}")]
    Malformed { position: usize, message: String },

    #[error("duplicate model id: {0}")]
    DuplicateId(String),

    #[error("model {id} has contact_count={contact_count} but {offsets} center offsets")]
    OffsetCountMismatch {
        id: String,
        contact_count: usize,
        offsets: usize,
    },

    #[error("model {0} center offsets must be strictly increasing")]
    OffsetsNotIncreasing(String),
}

/// Errors raised while reading assignment documents.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AssignmentError {
    #[error("unsupported assignments format")]
    UnsupportedFormat,

    #[error("invalid tip_at '{0}'. Expected 'entry' or 'target'")]
    InvalidTipAt(String),

    #[error("malformed assignment row: {0}")]
    MalformedRow(String),
}

/// Errors raised by contact placement.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlacementError {
    #[error("missing references in assignments: {}", .0.join(", "))]
    MissingReferences(Vec<String>),

    #[error("trajectory '{trajectory}': {source}")]
    Geometry {
        trajectory: String,
        #[source]
        source: GeometryError,
    },
}

/// Out-of-range tuning parameters.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be {requirement}, got {value}")]
    OutOfRange {
        field: &'static str,
        requirement: &'static str,
        value: f64,
    },
}

/// Input-contract violations of the axis fitter. Data-quality problems are
/// reported through `FitOutcome::Failure` instead.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum FitError {
    #[error("planned trajectory has zero length")]
    ZeroLengthTrajectory,

    #[error("no model contact offsets provided")]
    NoOffsets,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),
}
