use crate::schema::FieldType;
use crate::wire::ErrorProto;

/// Failure of the RPC itself: network, auth, quota, service unavailable.
///
/// Carries the service's structured payload verbatim. Only `Job::wait`
/// retries these, and only when `transient` is set.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{}{message}", .status.map(|s| format!("[{s}] ")).unwrap_or_default())]
pub struct TransportError {
    /// HTTP status, `None` when no response arrived.
    pub status: Option<u16>,
    pub message: String,
    /// Detail entries from the service error body.
    pub errors: Vec<ErrorProto>,
    pub transient: bool,
}

impl TransportError {
    /// Error response from the service. 429 and 5xx are transient.
    pub fn http(status: u16, message: impl Into<String>, errors: Vec<ErrorProto>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
            errors,
            transient: status == 429 || (500..600).contains(&status),
        }
    }

    /// No response: connect failure, reset, timeout.
    pub fn connection(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
            errors: Vec::new(),
            transient: true,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// First `reason` of the detail entries (e.g. `notFound`, `rateLimitExceeded`).
    pub fn reason(&self) -> Option<&str> {
        self.errors.first().map(|e| e.reason.as_str())
    }
}

/// Schema inference or validation failure. Always fatal to the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("field '{field}': type {type_name} has no column mapping")]
    UnsupportedType { field: String, type_name: String },

    #[error("type {type_name} is recursive")]
    Cycle { type_name: String },

    #[error("duplicate field name '{name}'")]
    DuplicateField { name: String },

    #[error("field '{field}': repeated fields cannot be nullable")]
    NullableRepeated { field: String },

    #[error("field '{field}': repeated fields cannot hold arrays")]
    NestedRepeated { field: String },

    #[error("field '{field}': boxed record must be marked #[quarry(nullable)]")]
    BoxedRecordNotNullable { field: String },

    #[error("field '{field}': record has no fields")]
    EmptyRecord { field: String },

    #[error("field '{field}': only RECORD fields may have nested fields")]
    NestedFieldsOnScalar { field: String },

    #[error("empty field name")]
    EmptyName,
}

/// A native value does not fit the schema. Fatal to the one row.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("missing required field '{field}'")]
    MissingRequired { field: String },

    #[error("no such field '{field}' in schema")]
    UnknownField { field: String },

    #[error("field '{field}': cannot encode {found} as {expected}")]
    TypeMismatch {
        field: String,
        expected: FieldType,
        found: &'static str,
    },

    #[error("field '{field}': repeated values cannot contain NULL")]
    NullInRepeated { field: String },

    #[error("query parameter {parameter}: {reason}")]
    Parameter { parameter: String, reason: String },

    #[error("row saver failed: {0}")]
    Saver(String),

    #[error("value {value} out of range for {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("field '{field}': {source}")]
    InField {
        field: String,
        #[source]
        source: Box<EncodeError>,
    },
}

impl EncodeError {
    /// Attribute the error to a field. Nested calls build a path.
    pub fn in_field(self, field: &str) -> Self {
        Self::InField {
            field: field.to_string(),
            source: Box::new(self),
        }
    }
}

/// A wire value does not fit the requested native shape.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("cannot decode {found} into {expected}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("cannot load NULL into non-nullable {target}")]
    NullIntoNonNullable { target: &'static str },

    #[error("value {value} out of range for {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("invalid {field_type} value '{raw}': {reason}")]
    InvalidWire {
        field_type: FieldType,
        raw: String,
        reason: String,
    },

    #[error("row has {found} cells but schema has {expected} fields")]
    Arity { expected: usize, found: usize },

    #[error("field '{field}': {source}")]
    InField {
        field: String,
        #[source]
        source: Box<DecodeError>,
    },
}

impl DecodeError {
    pub fn mismatch(expected: &'static str, found: &crate::value::Value) -> Self {
        Self::TypeMismatch {
            expected,
            found: found.kind(),
        }
    }

    pub fn invalid(field_type: FieldType, raw: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidWire {
            field_type,
            raw: raw.into(),
            reason: reason.to_string(),
        }
    }

    /// Attribute the error to a field. Nested calls build a path.
    pub fn in_field(self, field: &str) -> Self {
        Self::InField {
            field: field.to_string(),
            source: Box::new(self),
        }
    }
}

/// The service ran the job and reported failure. Terminal.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("job {job_id} failed: {error}")]
pub struct JobError {
    pub job_id: String,
    /// The `errorResult` of the job status.
    pub error: ErrorProto,
    /// All errors encountered while running the job, if reported.
    pub errors: Vec<ErrorProto>,
}

/// Top-level error returned by every client operation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Job(#[from] JobError),

    /// Caller gave up: the cancellation token fired or a deadline passed.
    /// The remote job, if any, keeps running.
    #[error("operation cancelled")]
    Cancelled,

    #[error("job {0} is not a query job")]
    NotQueryJob(String),

    #[error("config error: {0}")]
    Config(String),

    /// The service answered with something the client cannot interpret.
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl Error {
    /// Add context to the error.
    ///
    /// Only message-carrying variants are changed; typed payloads are kept
    /// verbatim.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            Error::Config(msg) => Error::Config(format!("{ctx}: {msg}")),
            Error::Protocol(msg) => Error::Protocol(format!("{ctx}: {msg}")),
            other => other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}
