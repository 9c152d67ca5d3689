//! Error types reported by the native driver.

use std::fmt;

/// Exception codes reported by the coordination service.
///
/// Mirrors the service's closed set of error codes; the numeric values match
/// what the ensemble puts on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    SystemError,
    RuntimeInconsistency,
    DataInconsistency,
    ConnectionLoss,
    MarshallingError,
    Unimplemented,
    OperationTimeout,
    BadArguments,
    ApiError,
    NoNode,
    NoAuth,
    BadVersion,
    NoChildrenForEphemerals,
    NodeExists,
    NotEmpty,
    SessionExpired,
    InvalidCallback,
    InvalidAcl,
    AuthFailed,
}

impl ErrorCode {
    /// Numeric code as reported by the service
    pub fn code(&self) -> i32 {
        match self {
            ErrorCode::SystemError => -1,
            ErrorCode::RuntimeInconsistency => -2,
            ErrorCode::DataInconsistency => -3,
            ErrorCode::ConnectionLoss => -4,
            ErrorCode::MarshallingError => -5,
            ErrorCode::Unimplemented => -6,
            ErrorCode::OperationTimeout => -7,
            ErrorCode::BadArguments => -8,
            ErrorCode::ApiError => -100,
            ErrorCode::NoNode => -101,
            ErrorCode::NoAuth => -102,
            ErrorCode::BadVersion => -103,
            ErrorCode::NoChildrenForEphemerals => -108,
            ErrorCode::NodeExists => -110,
            ErrorCode::NotEmpty => -111,
            ErrorCode::SessionExpired => -112,
            ErrorCode::InvalidCallback => -113,
            ErrorCode::InvalidAcl => -114,
            ErrorCode::AuthFailed => -115,
        }
    }

    /// Upper-case name as used in the service's exception messages
    pub fn name(&self) -> &'static str {
        match self {
            ErrorCode::SystemError => "SYSTEM_ERROR",
            ErrorCode::RuntimeInconsistency => "RUNTIME_INCONSISTENCY",
            ErrorCode::DataInconsistency => "DATA_INCONSISTENCY",
            ErrorCode::ConnectionLoss => "CONNECTION_LOSS",
            ErrorCode::MarshallingError => "MARSHALLING_ERROR",
            ErrorCode::Unimplemented => "UNIMPLEMENTED",
            ErrorCode::OperationTimeout => "OPERATION_TIMEOUT",
            ErrorCode::BadArguments => "BAD_ARGUMENTS",
            ErrorCode::ApiError => "API_ERROR",
            ErrorCode::NoNode => "NO_NODE",
            ErrorCode::NoAuth => "NO_AUTH",
            ErrorCode::BadVersion => "BAD_VERSION",
            ErrorCode::NoChildrenForEphemerals => "NO_CHILDREN_FOR_EPHEMERALS",
            ErrorCode::NodeExists => "NODE_EXISTS",
            ErrorCode::NotEmpty => "NOT_EMPTY",
            ErrorCode::SessionExpired => "SESSION_EXPIRED",
            ErrorCode::InvalidCallback => "INVALID_CALLBACK",
            ErrorCode::InvalidAcl => "INVALID_ACL",
            ErrorCode::AuthFailed => "AUTH_FAILED",
        }
    }

    /// Look up a code by its numeric value
    pub fn from_code(code: i32) -> Option<Self> {
        const ALL: [ErrorCode; 19] = [
            ErrorCode::SystemError,
            ErrorCode::RuntimeInconsistency,
            ErrorCode::DataInconsistency,
            ErrorCode::ConnectionLoss,
            ErrorCode::MarshallingError,
            ErrorCode::Unimplemented,
            ErrorCode::OperationTimeout,
            ErrorCode::BadArguments,
            ErrorCode::ApiError,
            ErrorCode::NoNode,
            ErrorCode::NoAuth,
            ErrorCode::BadVersion,
            ErrorCode::NoChildrenForEphemerals,
            ErrorCode::NodeExists,
            ErrorCode::NotEmpty,
            ErrorCode::SessionExpired,
            ErrorCode::InvalidCallback,
            ErrorCode::InvalidAcl,
            ErrorCode::AuthFailed,
        ];
        ALL.into_iter().find(|c| c.code() == code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name(), self.code())
    }
}

/// Errors handed to driver callbacks.
///
/// The driver is not fully typed: service exceptions carry a code, while
/// local failures (closed handle, bad input caught client-side) may only
/// carry a message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DriverError {
    /// Exception reported by the service, with the path it concerns
    #[error("Exception: {code}{}", fmt_path(.path))]
    Exception {
        code: ErrorCode,
        path: Option<String>,
    },

    /// Anything the driver could not attach a code to
    #[error("{0}")]
    Other(String),
}

impl DriverError {
    /// Build a service exception for a path
    pub fn exception(code: ErrorCode, path: impl Into<String>) -> Self {
        DriverError::Exception {
            code,
            path: Some(path.into()),
        }
    }

    /// The discriminant code, if the error carries one
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            DriverError::Exception { code, .. } => Some(*code),
            DriverError::Other(_) => None,
        }
    }
}

fn fmt_path(path: &Option<String>) -> String {
    path.as_deref().map(|p| format!(" @{p}")).unwrap_or_default()
}

/// Result type for driver operations
pub type Result<T> = std::result::Result<T, DriverError>;
