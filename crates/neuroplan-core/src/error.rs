use std::fmt;

/// The recoverable failure classes of the planner, as stable codes a
/// host can match on without parsing message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// No oracle adapter has been registered.
    MissingOracle,
    /// A parameter value is outside its valid range.
    InvalidParams,
    /// The nearest-neighbour index returned fewer candidates than needed.
    NearestNeighbourShortfall,
    /// An SVT document failed to parse.
    InvalidSvt,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::MissingOracle => "MISSING_ORACLE",
            ErrorCode::InvalidParams => "INVALID_PARAMS",
            ErrorCode::NearestNeighbourShortfall => "NN_SHORTFALL",
            ErrorCode::InvalidSvt => "INVALID_SVT",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a fallible engine call hands back: a [`ErrorCode`] plus a
/// human-readable note about the concrete failure.
///
/// Only recoverable conditions travel this way. Precondition
/// violations (misusing the graph contract) panic instead.
#[derive(Debug, Clone)]
pub struct EngineError {
    pub code: ErrorCode,
    pub message: String,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    pub fn new(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into() }
    }
}
