/// Shared execution classes used for worker naming and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Completion-queue dispatch workers.
	Dispatch,
	/// Transport I/O: listeners, connection readers and writers.
	Transport,
	/// Blocking handler work moved off the dispatch workers.
	Offload,
}

impl TaskClass {
	/// Stable lowercase label used in tracing fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Dispatch => "dispatch",
			Self::Transport => "transport",
			Self::Offload => "offload",
		}
	}
}
