use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {

    #[error("malformed element set: {0}")]
    MalformedElementSet(String),

    #[error("invalid orbit: {0}")]
    InvalidOrbit(String),

    #[error("propagation error: {0}")]
    Propagation(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("stale tracked-set handle (generation {given}, current {current})")]
    StaleHandle { given: u64, current: u64 },

    #[error("object {0} is not tracked")]
    UnknownObject(u32),

    #[error("scheduler worker has stopped")]
    WorkerStopped,

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error {0}")]
    Json(#[from] serde_json::Error),
}

macro_rules! malformed {
    ($fmt:literal $(, $arg:expr )* ) => {
        $crate::error::EngineError::MalformedElementSet( format!( $fmt $(, $arg)* ))
    };
}
pub(crate) use malformed;

macro_rules! invalid_param {
    ($fmt:literal $(, $arg:expr )* ) => {
        $crate::error::EngineError::InvalidParameter( format!( $fmt $(, $arg)* ))
    };
}
pub(crate) use invalid_param;
