use std::os::unix::io::RawFd;

use nix::fcntl::{open, OFlag};
use nix::sys::stat::Mode;
use nix::unistd;

use crate::error::{Result, ShellError};
use crate::types::{Command, IoRedir, RedirOp};

/// Open flags for a redirection operator, per POSIX redirection:
/// everything with a '<' opens for reading, everything with a '>' opens
/// for writing and creates missing files; plain '>' refuses to clobber,
/// '>>' appends, '>|' truncates, '<>' opens read-write. '<&' and '>&'
/// fall back to '<' and '>' when their target turns out to be a file.
pub fn io_flags(op: RedirOp) -> OFlag {
	match op {
		RedirOp::Read | RedirOp::DupRead => OFlag::O_RDONLY,
		RedirOp::Write | RedirOp::DupWrite => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_EXCL,
		RedirOp::Append => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_APPEND,
		RedirOp::ReadWrite => OFlag::O_RDWR | OFlag::O_CREAT,
		RedirOp::Clobber => OFlag::O_WRONLY | OFlag::O_CREAT | OFlag::O_TRUNC,
	}
}

fn open_mode() -> Mode {
	// 0777, cut down by the process umask
	Mode::from_bits_truncate(0o777)
}

/// Moves src onto dst and closes src; equal descriptors are a no-op.
/// On failure neither descriptor has changed.
pub fn move_fd(src: RawFd, dst: RawFd) -> Result<RawFd> {
	if src == dst {
		return Ok(dst);
	}
	unistd::dup2(src, dst)?;
	unistd::close(src)?;
	Ok(dst)
}

fn parse_fd(target: &str) -> Option<RawFd> {
	target.parse::<RawFd>().ok()
}

/// Rewires the real descriptor table for an external command. Only ever
/// runs in a freshly forked child; the first failure aborts the command
/// before exec is reached.
pub fn apply_redirects(cmd: &Command) -> Result<()> {
	for r in &cmd.redirs {
		apply_one(r)?;
	}
	Ok(())
}

fn apply_one(r: &IoRedir) -> Result<()> {
	if r.op.is_dup() {
		if r.filename == "-" {
			// [n]>&- and [n]<&- close descriptor n
			unistd::close(r.fd)?;
			return Ok(());
		}
		if let Some(src) = parse_fd(&r.filename) {
			unistd::dup2(src, r.fd)?;
			return Ok(());
		}
	}
	let fd = open(r.filename.as_str(), io_flags(r.op), open_mode())?;
	move_fd(fd, r.fd)?;
	Ok(())
}

/// One virtual redirection: the fd number a builtin believes it is using
/// and the concrete descriptor backing it. A realfd of -1 means the
/// pseudofd is virtually closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BuiltinRedir {
	pseudofd: RawFd,
	realfd: RawFd,
}

/// Scoped virtual descriptor table for one builtin invocation.
///
/// Builtins run inside the shell process, so their redirections must not
/// touch the shell's own descriptors. The overlay records what the table
/// would have looked like; builtins resolve their I/O through it, and
/// dropping it closes every backing descriptor no matter how the
/// invocation ended.
#[derive(Debug, Default)]
pub struct RedirOverlay {
	entries: Vec<BuiltinRedir>,
}

impl RedirOverlay {
	pub fn new() -> RedirOverlay {
		RedirOverlay { entries: Vec::new() }
	}

	/// Seeds the overlay with a pipeline override, taking ownership of
	/// realfd.
	pub fn push_base(&mut self, pseudofd: RawFd, realfd: RawFd) {
		self.entries.push(BuiltinRedir { pseudofd, realfd });
	}

	/// The real descriptor behind fd: the overlay entry if one exists
	/// (-1 when virtually closed), the fd itself otherwise.
	pub fn resolve(&self, fd: RawFd) -> RawFd {
		self.entries.iter().find(|e| e.pseudofd == fd).map_or(fd, |e| e.realfd)
	}

	pub fn apply(&mut self, cmd: &Command) -> Result<()> {
		for r in &cmd.redirs {
			self.apply_one(r)?;
		}
		Ok(())
	}

	fn entry_index(&self, pseudofd: RawFd) -> Option<usize> {
		self.entries.iter().position(|e| e.pseudofd == pseudofd)
	}

	fn apply_one(&mut self, r: &IoRedir) -> Result<()> {
		if r.op.is_dup() {
			if r.filename == "-" {
				match self.entry_index(r.fd) {
					Some(i) => {
						if self.entries[i].realfd >= 0 {
							unistd::close(self.entries[i].realfd)?;
						}
						self.entries[i].realfd = -1;
					}
					None => self.entries.push(BuiltinRedir { pseudofd: r.fd, realfd: -1 }),
				}
				return Ok(());
			}
			if let Some(src) = parse_fd(&r.filename) {
				// One level of pseudofd aliasing; refuse to back two
				// distinct pseudofds with the same real descriptor.
				let alias = self.entry_index(src);
				let src = alias.map_or(src, |i| self.entries[i].realfd);
				let collision = self
					.entries
					.iter()
					.enumerate()
					.any(|(i, e)| Some(i) != alias && e.realfd == src && src >= 0);
				if collision {
					return Err(ShellError::FdInUse(src));
				}
				match self.entry_index(r.fd) {
					Some(i) => {
						unistd::dup2(src, self.entries[i].realfd)?;
					}
					None => {
						let dup = unistd::dup(src)?;
						self.entries.push(BuiltinRedir { pseudofd: r.fd, realfd: dup });
					}
				}
				return Ok(());
			}
		}
		let fd = open(r.filename.as_str(), io_flags(r.op), open_mode())?;
		match self.entry_index(r.fd) {
			Some(i) => {
				move_fd(fd, self.entries[i].realfd)?;
			}
			None => self.entries.push(BuiltinRedir { pseudofd: r.fd, realfd: fd }),
		}
		Ok(())
	}
}

impl Drop for RedirOverlay {
	fn drop(&mut self) {
		for e in &self.entries {
			if e.realfd >= 0 {
				let _ = unistd::close(e.realfd);
			}
		}
		self.entries.clear();
	}
}
