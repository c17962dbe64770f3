use std::io;
use std::os::unix::io::AsRawFd;

use log::debug;
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{self, Pid};

use crate::error::{Result, ShellError};
use crate::jobs::Jid;
use crate::session::Session;

fn wait_target(pgid: Pid) -> Pid {
	Pid::from_raw(-pgid.as_raw())
}

fn is_tty() -> bool {
	unsafe { libc::isatty(libc::STDIN_FILENO) == 1 }
}

/// Exit-status view of a wait status: the exit code for a normal exit,
/// 128 plus the signal number for a signal death.
fn derive_status(status: WaitStatus) -> Option<i32> {
	match status {
		WaitStatus::Exited(_, code) => Some(code),
		WaitStatus::Signaled(_, sig, _) => Some(128 + sig as i32),
		_ => None,
	}
}

// Initial "last seen" value: a group that is already fully reaped reads
// as a clean exit.
fn initial_status() -> WaitStatus {
	WaitStatus::Exited(Pid::from_raw(0), 0)
}

pub fn wait_on_fg_job(session: &mut Session, jid: Jid) -> Result<()> {
	let pgid = session
		.jobs
		.pgid(jid)
		.ok_or_else(|| ShellError::NoSuchJob(jid.to_string()))?;
	wait_on_fg_pgid(session, pgid)
}

/// Blocks until the foreground group has no children left or stops.
///
/// Four steps: continue the group, hand it the terminal, wait on the
/// whole group, hand the terminal back. The last step runs on every path
/// out, including failures in the first three.
pub fn wait_on_fg_pgid(session: &mut Session, pgid: Pid) -> Result<()> {
	let result = fg_wait(session, pgid);
	let restored = return_terminal();
	result?;
	restored
}

fn fg_wait(session: &mut Session, pgid: Pid) -> Result<()> {
	// a previously stopped job being re-foregrounded needs the kick
	killpg(pgid, Signal::SIGCONT)?;
	claim_terminal(pgid)?;

	let mut last = initial_status();
	loop {
		match waitpid(wait_target(pgid), Some(WaitPidFlag::WUNTRACED)) {
			Ok(WaitStatus::Stopped(..)) => {
				let jid = session.jobs.jid(pgid).unwrap_or(-1);
				eprintln!("[{}] Stopped", jid);
				return Ok(());
			}
			Ok(status) => last = status,
			Err(Errno::ECHILD) => {
				if let Some(code) = derive_status(last) {
					session.status = code;
				}
				session.jobs.remove(pgid);
				debug!("group {} fully reaped, status {}", pgid, session.status);
				return Ok(());
			}
			Err(e) => return Err(e.into()),
		}
	}
}

fn claim_terminal(pgid: Pid) -> Result<()> {
	if is_tty() {
		unistd::tcsetpgrp(io::stdin().as_raw_fd(), pgid)?;
	}
	Ok(())
}

fn return_terminal() -> Result<()> {
	if is_tty() {
		let own = unistd::getpgid(None)?;
		unistd::tcsetpgrp(io::stdin().as_raw_fd(), own)?;
	}
	Ok(())
}

/// Non-blocking poll of every tracked job, run once per main-loop turn
/// before new input is read. Reports Done/Terminated/Stopped and drops
/// finished jobs; the table is re-fetched after each removal since
/// removal relocates entries.
pub fn wait_on_bg_jobs(session: &mut Session) -> Result<()> {
	let mut i = 0;
	while i < session.jobs.len() {
		let job = session.jobs.entries()[i];
		let mut last = initial_status();
		loop {
			let flags = WaitPidFlag::WUNTRACED | WaitPidFlag::WNOHANG;
			match waitpid(wait_target(job.pgid), Some(flags)) {
				Ok(WaitStatus::StillAlive) => break,
				Ok(WaitStatus::Stopped(..)) => {
					eprintln!("[{}] Stopped", job.jid);
					break;
				}
				Ok(status) => last = status,
				Err(Errno::ECHILD) => {
					match last {
						WaitStatus::Signaled(..) => eprintln!("[{}] Terminated", job.jid),
						_ => eprintln!("[{}] Done", job.jid),
					}
					session.jobs.remove(job.pgid);
					debug!("background job [{}] reaped", job.jid);
					break;
				}
				Err(e) => return Err(e.into()),
			}
		}
		i += 1;
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::signal::Signals;
	use std::os::unix::process::CommandExt;
	use std::process::Command;
	use std::thread::sleep;
	use std::time::Duration;

	fn session() -> Session {
		Session::new(Signals::install().unwrap())
	}

	fn spawn_group(program: &str, args: &[&str]) -> Pid {
		let child = Command::new(program)
			.args(args)
			.process_group(0)
			.spawn()
			.expect("spawn test child");
		let pid = Pid::from_raw(child.id() as i32);
		// the child may not have entered its group yet; set it from
		// this side too and ignore the EACCES if it already exec'd
		let _ = unistd::setpgid(pid, pid);
		pid
	}

	fn reap_group(pgid: Pid) {
		let _ = killpg(pgid, Signal::SIGKILL);
		loop {
			match waitpid(wait_target(pgid), None) {
				Ok(_) => continue,
				Err(_) => break,
			}
		}
	}

	#[test]
	fn foreground_wait_reaps_and_clears_the_job() {
		let mut session = session();
		let pgid = spawn_group("true", &[]);
		session.jobs.add(pgid);
		wait_on_fg_pgid(&mut session, pgid).unwrap();
		assert_eq!(session.status, 0);
		assert_eq!(session.jobs.jid(pgid), None);
	}

	#[test]
	fn foreground_wait_propagates_exit_codes() {
		let mut session = session();
		let pgid = spawn_group("false", &[]);
		session.jobs.add(pgid);
		wait_on_fg_pgid(&mut session, pgid).unwrap();
		assert_eq!(session.status, 1);
	}

	#[test]
	fn signal_death_reads_as_128_plus_signo() {
		let mut session = session();
		let pgid = spawn_group("sleep", &["30"]);
		session.jobs.add(pgid);
		killpg(pgid, Signal::SIGKILL).unwrap();
		wait_on_fg_pgid(&mut session, pgid).unwrap();
		assert_eq!(session.status, 128 + libc::SIGKILL);
		assert_eq!(session.jobs.jid(pgid), None);
	}

	#[test]
	fn sweep_reaps_finished_jobs_and_leaves_running_ones() {
		let mut session = session();
		let done = spawn_group("true", &[]);
		session.jobs.add(done);
		let running = spawn_group("sleep", &["30"]);
		let running_jid = session.jobs.add(running);

		let deadline = std::time::Instant::now() + Duration::from_secs(5);
		while session.jobs.jid(done).is_some() {
			assert!(std::time::Instant::now() < deadline, "sweep never reaped the job");
			wait_on_bg_jobs(&mut session).unwrap();
			sleep(Duration::from_millis(10));
		}
		assert_eq!(session.jobs.jid(running), Some(running_jid));

		reap_group(running);
		// gone from the OS now; the next sweep drops it from the table
		wait_on_bg_jobs(&mut session).unwrap();
		assert_eq!(session.jobs.jid(running), None);
	}

	#[test]
	fn waiting_on_an_unknown_jid_fails() {
		let mut session = session();
		assert!(matches!(
			wait_on_fg_job(&mut session, 41),
			Err(ShellError::NoSuchJob(_))
		));
	}
}
