use std::os::unix::io::RawFd;

use nix::sys::signal::{killpg, Signal};
use nix::unistd;

use crate::jobs::Jid;
use crate::redirect::RedirOverlay;
use crate::session::Session;
use crate::types::Command;
use crate::wait;

/// A builtin gets the command, the session and the invocation's virtual
/// redirection overlay; all of its I/O has to go through the overlay.
pub type Builtin = fn(&mut Session, &Command, &RedirOverlay) -> bool;

pub fn lookup(cmd: &Command) -> Option<Builtin> {
	match cmd.name()? {
		"cd" => Some(builtin_cd),
		"exit" => Some(builtin_exit),
		"unset" => Some(builtin_unset),
		"export" => Some(builtin_export),
		"jobs" => Some(builtin_jobs),
		"fg" => Some(builtin_fg),
		"bg" => Some(builtin_bg),
		_ => None,
	}
}

fn emit(overlay: &RedirOverlay, fd: RawFd, text: &str) -> bool {
	let real = overlay.resolve(fd);
	if real < 0 {
		return false;
	}
	let n = unsafe { libc::write(real, text.as_ptr() as *const libc::c_void, text.len()) };
	n == text.len() as isize
}

fn parse_jid(arg: &str) -> Option<Jid> {
	arg.strip_prefix('%').unwrap_or(arg).parse().ok()
}

fn resolve_jid(session: &Session, cmd: &Command, overlay: &RedirOverlay) -> Option<Jid> {
	match cmd.words.get(1) {
		Some(arg) => match parse_jid(arg) {
			Some(jid) => Some(jid),
			None => {
				emit(overlay, 2, &format!("{}: {}: no such job\n", cmd.words[0], arg));
				None
			}
		},
		None => match session.jobs.last_jid() {
			Some(jid) => Some(jid),
			None => {
				emit(overlay, 2, &format!("{}: no current job\n", cmd.words[0]));
				None
			}
		},
	}
}

fn builtin_cd(session: &mut Session, cmd: &Command, overlay: &RedirOverlay) -> bool {
	let target = match cmd.words.get(1) {
		Some(dir) => dir.clone(),
		None => match session.vars.get("HOME") {
			Some(home) => home,
			None => {
				emit(overlay, 2, "cd: HOME not set\n");
				return false;
			}
		},
	};
	match unistd::chdir(target.as_str()) {
		Ok(()) => true,
		Err(e) => {
			emit(overlay, 2, &format!("cd: {}: {}\n", target, e.desc()));
			false
		}
	}
}

/// Asks the main loop to stop; the optional argument overrides the exit
/// status, otherwise the shell leaves with the current `$?`.
fn builtin_exit(session: &mut Session, cmd: &Command, overlay: &RedirOverlay) -> bool {
	let code = match cmd.words.get(1) {
		Some(arg) => match arg.parse() {
			Ok(code) => code,
			Err(_) => {
				emit(overlay, 2, &format!("exit: {}: numeric argument required\n", arg));
				return false;
			}
		},
		None => session.status,
	};
	session.exit_request = Some(code);
	true
}

fn builtin_unset(session: &mut Session, cmd: &Command, overlay: &RedirOverlay) -> bool {
	let mut ok = true;
	for name in &cmd.words[1..] {
		if let Err(e) = session.vars.unset(name) {
			emit(overlay, 2, &format!("unset: {}\n", e));
			ok = false;
		}
	}
	ok
}

fn builtin_export(session: &mut Session, cmd: &Command, overlay: &RedirOverlay) -> bool {
	let mut ok = true;
	for word in &cmd.words[1..] {
		let result = match word.split_once('=') {
			Some((name, value)) => {
				session.vars.set(name, value).and_then(|()| session.vars.export(name))
			}
			None => session.vars.export(word),
		};
		if let Err(e) = result {
			emit(overlay, 2, &format!("export: {}\n", e));
			ok = false;
		}
	}
	ok
}

fn builtin_jobs(session: &mut Session, _cmd: &Command, overlay: &RedirOverlay) -> bool {
	let mut out = String::new();
	for job in session.jobs.entries() {
		out.push_str(&format!("[{}] {}\n", job.jid, job.pgid));
	}
	emit(overlay, 1, &out)
}

fn builtin_fg(session: &mut Session, cmd: &Command, overlay: &RedirOverlay) -> bool {
	let Some(jid) = resolve_jid(session, cmd, overlay) else {
		return false;
	};
	match wait::wait_on_fg_job(session, jid) {
		Ok(()) => true,
		Err(e) => {
			emit(overlay, 2, &format!("fg: {}\n", e));
			false
		}
	}
}

/// Continues a stopped job without waiting on it; the background sweep
/// picks up whatever it does next.
fn builtin_bg(session: &mut Session, cmd: &Command, overlay: &RedirOverlay) -> bool {
	let Some(jid) = resolve_jid(session, cmd, overlay) else {
		return false;
	};
	let Some(pgid) = session.jobs.pgid(jid) else {
		emit(overlay, 2, &format!("bg: {}: no such job\n", jid));
		return false;
	};
	match killpg(pgid, Signal::SIGCONT) {
		Ok(()) => true,
		Err(e) => {
			emit(overlay, 2, &format!("bg: {}\n", e.desc()));
			false
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::signal::Signals;
	use crate::types::CtrlOp;

	fn command(words: &[&str]) -> Command {
		Command {
			words: words.iter().map(|w| w.to_string()).collect(),
			assignments: vec![],
			redirs: vec![],
			ctrl: CtrlOp::Seq,
		}
	}

	fn session() -> Session {
		Session::new(Signals::install().unwrap())
	}

	#[test]
	fn lookup_knows_the_builtins() {
		assert!(lookup(&command(&["cd"])).is_some());
		assert!(lookup(&command(&["exit"])).is_some());
		assert!(lookup(&command(&["jobs"])).is_some());
		assert!(lookup(&command(&["ls"])).is_none());
	}

	#[test]
	fn exit_records_the_request() {
		let mut session = session();
		session.status = 3;
		let overlay = RedirOverlay::new();
		assert!(builtin_exit(&mut session, &command(&["exit"]), &overlay));
		assert_eq!(session.exit_request, Some(3));
		assert!(builtin_exit(&mut session, &command(&["exit", "7"]), &overlay));
		assert_eq!(session.exit_request, Some(7));
		assert!(!builtin_exit(&mut session, &command(&["exit", "nope"]), &overlay));
	}

	#[test]
	fn export_accepts_assignment_form() {
		let mut session = session();
		let overlay = RedirOverlay::new();
		assert!(builtin_export(&mut session, &command(&["export", "PSH_BI_EXP=v"]), &overlay));
		assert_eq!(std::env::var("PSH_BI_EXP").as_deref(), Ok("v"));
		session.vars.unset("PSH_BI_EXP").unwrap();
	}

	#[test]
	fn fg_refuses_unknown_jobs() {
		let mut session = session();
		let overlay = RedirOverlay::new();
		assert!(!builtin_fg(&mut session, &command(&["fg", "%9"]), &overlay));
		assert!(!builtin_bg(&mut session, &command(&["bg"]), &overlay));
	}
}
