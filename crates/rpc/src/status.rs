//! Call outcomes and gRPC-compatible status codes.

use std::fmt;

use bytes::Bytes;

/// Canonical status codes, numerically compatible with gRPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StatusCode {
	/// Not an error.
	Ok = 0,
	/// The operation was cancelled, typically by the caller.
	Cancelled = 1,
	/// Unknown error.
	Unknown = 2,
	/// The client specified an invalid argument.
	InvalidArgument = 3,
	/// The deadline expired before the operation could complete.
	DeadlineExceeded = 4,
	/// Some requested entity was not found.
	NotFound = 5,
	/// The entity that a client attempted to create already exists.
	AlreadyExists = 6,
	/// The caller lacks permission for the operation.
	PermissionDenied = 7,
	/// Some resource has been exhausted.
	ResourceExhausted = 8,
	/// The system is not in a state required for the operation.
	FailedPrecondition = 9,
	/// The operation was aborted.
	Aborted = 10,
	/// The operation was attempted past the valid range.
	OutOfRange = 11,
	/// The operation is not implemented or supported.
	Unimplemented = 12,
	/// Internal invariant broken.
	Internal = 13,
	/// The service is currently unavailable.
	Unavailable = 14,
	/// Unrecoverable data loss or corruption.
	DataLoss = 15,
	/// The request lacks valid authentication credentials.
	Unauthenticated = 16,
}

impl StatusCode {
	/// Numeric wire value.
	#[must_use]
	pub const fn as_u32(self) -> u32 {
		self as u32
	}

	/// Parses a numeric wire value; unrecognised values map to [`StatusCode::Unknown`].
	#[must_use]
	pub const fn from_u32(code: u32) -> Self {
		match code {
			0 => Self::Ok,
			1 => Self::Cancelled,
			3 => Self::InvalidArgument,
			4 => Self::DeadlineExceeded,
			5 => Self::NotFound,
			6 => Self::AlreadyExists,
			7 => Self::PermissionDenied,
			8 => Self::ResourceExhausted,
			9 => Self::FailedPrecondition,
			10 => Self::Aborted,
			11 => Self::OutOfRange,
			12 => Self::Unimplemented,
			13 => Self::Internal,
			14 => Self::Unavailable,
			15 => Self::DataLoss,
			16 => Self::Unauthenticated,
			_ => Self::Unknown,
		}
	}

	/// Upper snake-case name, as printed by gRPC tooling.
	#[must_use]
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Ok => "OK",
			Self::Cancelled => "CANCELLED",
			Self::Unknown => "UNKNOWN",
			Self::InvalidArgument => "INVALID_ARGUMENT",
			Self::DeadlineExceeded => "DEADLINE_EXCEEDED",
			Self::NotFound => "NOT_FOUND",
			Self::AlreadyExists => "ALREADY_EXISTS",
			Self::PermissionDenied => "PERMISSION_DENIED",
			Self::ResourceExhausted => "RESOURCE_EXHAUSTED",
			Self::FailedPrecondition => "FAILED_PRECONDITION",
			Self::Aborted => "ABORTED",
			Self::OutOfRange => "OUT_OF_RANGE",
			Self::Unimplemented => "UNIMPLEMENTED",
			Self::Internal => "INTERNAL",
			Self::Unavailable => "UNAVAILABLE",
			Self::DataLoss => "DATA_LOSS",
			Self::Unauthenticated => "UNAUTHENTICATED",
		}
	}
}

impl fmt::Display for StatusCode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Non-OK status carried by a failed call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
	/// Status code.
	pub code: StatusCode,
	/// Human-readable detail.
	pub message: String,
}

impl Status {
	/// Creates a status from a code and message.
	pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
		Self {
			code,
			message: message.into(),
		}
	}

	/// `INVALID_ARGUMENT` status.
	pub fn invalid_argument(message: impl Into<String>) -> Self {
		Self::new(StatusCode::InvalidArgument, message)
	}

	/// `NOT_FOUND` status.
	pub fn not_found(message: impl Into<String>) -> Self {
		Self::new(StatusCode::NotFound, message)
	}

	/// `UNIMPLEMENTED` status.
	pub fn unimplemented(message: impl Into<String>) -> Self {
		Self::new(StatusCode::Unimplemented, message)
	}

	/// `INTERNAL` status.
	pub fn internal(message: impl Into<String>) -> Self {
		Self::new(StatusCode::Internal, message)
	}

	/// `UNAVAILABLE` status.
	pub fn unavailable(message: impl Into<String>) -> Self {
		Self::new(StatusCode::Unavailable, message)
	}
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if self.message.is_empty() {
			write!(f, "{}", self.code)
		} else {
			write!(f, "{}: {}", self.code, self.message)
		}
	}
}

impl std::error::Error for Status {}

/// Result of one handler invocation.
///
/// A failure is a normal outcome: it travels through FINISHING exactly like
/// a success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
	/// The call succeeded with this response payload.
	Ok(Bytes),
	/// The call failed with this status.
	Failure(Status),
}

impl Outcome {
	/// Successful outcome.
	pub fn ok(response: impl Into<Bytes>) -> Self {
		Self::Ok(response.into())
	}

	/// Failed outcome.
	pub fn failure(code: StatusCode, message: impl Into<String>) -> Self {
		Self::Failure(Status::new(code, message))
	}

	/// Returns `true` for [`Outcome::Ok`].
	#[must_use]
	pub fn is_ok(&self) -> bool {
		matches!(self, Self::Ok(_))
	}

	/// Status code of this outcome.
	#[must_use]
	pub fn code(&self) -> StatusCode {
		match self {
			Self::Ok(_) => StatusCode::Ok,
			Self::Failure(status) => status.code,
		}
	}

	/// Converts into a `Result`.
	///
	/// # Errors
	///
	/// Returns the failure status for [`Outcome::Failure`].
	pub fn into_result(self) -> Result<Bytes, Status> {
		match self {
			Self::Ok(bytes) => Ok(bytes),
			Self::Failure(status) => Err(status),
		}
	}
}

impl From<Result<Bytes, Status>> for Outcome {
	fn from(result: Result<Bytes, Status>) -> Self {
		match result {
			Ok(bytes) => Self::Ok(bytes),
			Err(status) => Self::Failure(status),
		}
	}
}
