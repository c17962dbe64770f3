use std::ffi::CString;
use std::os::unix::io::{IntoRawFd, RawFd};

use log::debug;
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::unistd::{self, ForkResult, Pid};

use crate::builtin;
use crate::error::Result;
use crate::expand;
use crate::jobs::Jid;
use crate::redirect::{self, RedirOverlay};
use crate::session::Session;
use crate::types::{Command, CommandList, CtrlOp};
use crate::wait;

/// Status for a command that could not be found, could not be set up in
/// the parent, or a builtin that reported failure.
const FAILURE_STATUS: i32 = 127;
/// Child exit code when redirection/assignment/signal setup fails before
/// exec.
const CHILD_SETUP_FAILURE: i32 = 1;

pub fn run_command_list(session: &mut Session, list: &mut CommandList) {
	if let Err(e) = run_commands(session, list) {
		eprintln!("psh: {}", e);
		session.status = FAILURE_STATUS;
	}
}

fn run_commands(session: &mut Session, list: &mut CommandList) -> Result<()> {
	// pgid and jid of the pipeline currently being built, if any
	let mut pipeline: Option<(Pid, Jid)> = None;
	// read end of the previous command's pipe, destined for this one
	let mut next_stdin: Option<RawFd> = None;

	for cmd in &mut list.commands {
		expand_command(session, cmd);
		let cmd: &Command = cmd;

		let is_pipe = cmd.ctrl == CtrlOp::Pipe;
		let is_bg = cmd.ctrl == CtrlOp::Background;
		let is_fg = cmd.ctrl == CtrlOp::Seq;

		let stdin_override = next_stdin.take();
		let mut stdout_override = None;
		if is_pipe {
			match unistd::pipe2(OFlag::O_CLOEXEC) {
				Ok((read, write)) => {
					next_stdin = Some(read.into_raw_fd());
					stdout_override = Some(write.into_raw_fd());
				}
				Err(e) => {
					close_override(stdin_override);
					return Err(e.into());
				}
			}
		}

		// A command runs inside the shell only if it is a builtin *and*
		// foreground: that is what lets cd/exit/export act on the shell
		// itself. Everything else gets a child process.
		let builtin_fn = builtin::lookup(cmd);
		let fork_needed = builtin_fn.is_none() || !is_fg;

		let mut child_pid: Option<Pid> = None;
		if fork_needed {
			match unsafe { unistd::fork() } {
				Ok(ForkResult::Parent { child }) => child_pid = Some(child),
				Ok(ForkResult::Child) => {
					let join = pipeline.map_or(Pid::from_raw(0), |(pgid, _)| pgid);
					let _ = unistd::setpgid(Pid::from_raw(0), join);
				}
				Err(e) => {
					close_override(stdin_override);
					close_override(stdout_override);
					close_override(next_stdin.take());
					return Err(e.into());
				}
			}
		}

		let child = match child_pid {
			None => {
				// the forked child, or an in-process foreground builtin
				if let Some(f) = builtin_fn {
					let status = run_builtin(session, cmd, f, stdin_override, stdout_override);
					session.status = status;
					if fork_needed {
						unsafe { libc::_exit(status) }
					}
					if session.exit_request.is_some() {
						break;
					}
					continue;
				}
				let status = exec_child(session, cmd, stdin_override, stdout_override);
				unsafe { libc::_exit(status) }
			}
			Some(pid) => pid,
		};

		// The child owns the override descriptors now; the parent's
		// copies must go before anything else.
		close_override(stdout_override);
		close_override(stdin_override);

		let pgid = pipeline.map_or(child, |(pgid, _)| pgid);
		if let Err(e) = unistd::setpgid(child, pgid) {
			// The child sets its own group before exec as well, so
			// losing this race to an exec'd child is fine.
			if e != Errno::EACCES {
				close_override(next_stdin.take());
				return Err(e.into());
			}
		}
		let jid = match pipeline {
			Some((_, jid)) => jid,
			None => {
				let jid = session.jobs.add(pgid);
				pipeline = Some((pgid, jid));
				debug!("job [{}] group {} started", jid, pgid);
				jid
			}
		};

		if is_fg {
			wait::wait_on_fg_pgid(session, pgid)?;
		} else {
			session.bg_pid = Some(child);
			if is_bg {
				eprintln!("[{}] {}", jid, pgid);
			}
			// async commands never fail synchronously
			session.status = 0;
		}

		if !is_pipe {
			pipeline = None;
		}
	}
	Ok(())
}

fn expand_command(session: &Session, cmd: &mut Command) {
	for word in &mut cmd.words {
		expand::expand(session, word);
	}
	for assignment in &mut cmd.assignments {
		expand::expand(session, &mut assignment.value);
	}
	for redir in &mut cmd.redirs {
		expand::expand(session, &mut redir.filename);
	}
}

fn close_override(fd: Option<RawFd>) {
	if let Some(fd) = fd {
		let _ = unistd::close(fd);
	}
}

fn assign_variables(session: &mut Session, cmd: &Command, export_all: bool) -> Result<()> {
	for a in &cmd.assignments {
		session.vars.set(&a.name, &a.value)?;
		if export_all {
			session.vars.export(&a.name)?;
		}
	}
	Ok(())
}

/// Runs a builtin behind a virtual redirection overlay. The overlay is
/// torn down when it goes out of scope, on success and failure alike, so
/// the shell's own descriptors are untouched afterwards. The boolean
/// result collapses to 0 or the shared failure status.
fn run_builtin(
	session: &mut Session,
	cmd: &Command,
	f: builtin::Builtin,
	stdin_override: Option<RawFd>,
	stdout_override: Option<RawFd>,
) -> i32 {
	let mut overlay = RedirOverlay::new();
	if let Some(fd) = stdin_override {
		overlay.push_base(libc::STDIN_FILENO, fd);
	}
	if let Some(fd) = stdout_override {
		overlay.push_base(libc::STDOUT_FILENO, fd);
	}
	if let Err(e) = overlay.apply(cmd) {
		eprintln!("psh: {}", e);
		return FAILURE_STATUS;
	}
	// assignments on a builtin are local to the shell, never exported
	if let Err(e) = assign_variables(session, cmd, false) {
		eprintln!("psh: {}", e);
		return FAILURE_STATUS;
	}
	if f(session, cmd, &overlay) {
		0
	} else {
		FAILURE_STATUS
	}
}

fn child_setup(
	session: &mut Session,
	cmd: &Command,
	stdin_override: Option<RawFd>,
	stdout_override: Option<RawFd>,
) -> Result<Vec<CString>> {
	if let Some(fd) = stdin_override {
		redirect::move_fd(fd, libc::STDIN_FILENO)?;
	}
	if let Some(fd) = stdout_override {
		redirect::move_fd(fd, libc::STDOUT_FILENO)?;
	}
	redirect::apply_redirects(cmd)?;
	assign_variables(session, cmd, true)?;
	session.signals.restore()?;
	let argv = cmd
		.words
		.iter()
		.map(|w| CString::new(w.as_str()))
		.collect::<std::result::Result<Vec<_>, _>>()?;
	Ok(argv)
}

/// Final stretch of a forked child running an external command: rewire
/// descriptors, export assignments, put signal dispositions back, exec.
/// Returns only on failure, with the child's exit code.
fn exec_child(
	session: &mut Session,
	cmd: &Command,
	stdin_override: Option<RawFd>,
	stdout_override: Option<RawFd>,
) -> i32 {
	let argv = match child_setup(session, cmd, stdin_override, stdout_override) {
		Ok(argv) => argv,
		Err(e) => {
			eprintln!("psh: {}", e);
			return CHILD_SETUP_FAILURE;
		}
	};
	let program = match argv.first() {
		Some(program) => program,
		None => return FAILURE_STATUS,
	};
	let err = match unistd::execvp(program, &argv) {
		Err(e) => e,
		Ok(never) => match never {},
	};
	let name = cmd.name().unwrap_or("");
	if err == Errno::ENOENT {
		eprintln!("psh: {}: command not found", name);
	} else {
		eprintln!("psh: {}: {}", name, err.desc());
	}
	FAILURE_STATUS
}
