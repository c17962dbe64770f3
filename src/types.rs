use std::os::unix::io::RawFd;

/// What the shell does after starting a command: run the next one right
/// away (pipe, background) or block on it first (sequential).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtrlOp {
	Seq,
	Background,
	Pipe,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirOp {
	Read,
	Write,
	Append,
	ReadWrite,
	Clobber,
	DupRead,
	DupWrite,
}

impl RedirOp {
	pub fn is_dup(self) -> bool {
		matches!(self, RedirOp::DupRead | RedirOp::DupWrite)
	}

	pub fn default_fd(self) -> RawFd {
		match self {
			RedirOp::Read | RedirOp::ReadWrite | RedirOp::DupRead => libc::STDIN_FILENO,
			_ => libc::STDOUT_FILENO,
		}
	}
}

/// The filename field is a path, a decimal fd number, or the literal "-"
/// (close) for the dup operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoRedir {
	pub op: RedirOp,
	pub fd: RawFd,
	pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
	pub name: String,
	pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
	pub words: Vec<String>,
	pub assignments: Vec<Assignment>,
	pub redirs: Vec<IoRedir>,
	pub ctrl: CtrlOp,
}

impl Command {
	pub fn name(&self) -> Option<&str> {
		self.words.first().map(|w| w.as_str())
	}
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CommandList {
	pub commands: Vec<Command>,
}
