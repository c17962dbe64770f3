mod builtin;
mod error;
mod expand;
mod input;
mod jobs;
mod parser;
mod redirect;
mod runner;
mod session;
mod signal;
mod types;
mod vars;
mod wait;

use nix::errno::Errno;
use nix::sys::signal::Signal;

use crate::error::ShellError;
use crate::session::Session;
use crate::signal::Signals;

const PROMPT: &str = "$ ";

fn fatal(e: ShellError) -> ! {
	eprintln!("psh: {}", e);
	std::process::exit(127)
}

fn main() {
	env_logger::init();

	let signals = match Signals::install() {
		Ok(signals) => signals,
		Err(e) => fatal(e),
	};
	let mut session = Session::new(signals);

	let interactive = unsafe { libc::isatty(libc::STDIN_FILENO) == 1 };

	loop {
		// check on background jobs before prompting
		if let Err(e) = wait::wait_on_bg_jobs(&mut session) {
			fatal(e);
		}

		if interactive {
			eprint!("{}", PROMPT);
		}

		// SIGINT may only interrupt the blocking read, nothing else
		if let Err(e) = session.signals.enable_interrupt(Signal::SIGINT) {
			fatal(e);
		}
		let line = input::read_line();
		if let Err(e) = session.signals.ignore(Signal::SIGINT) {
			fatal(e);
		}

		let line = match line {
			Ok(Some(line)) => line,
			Ok(None) => break,
			Err(ShellError::Sys(Errno::EINTR)) => {
				eprintln!();
				continue;
			}
			Err(e) => fatal(e),
		};

		let mut list = match parser::parse(&line) {
			Ok(list) => list,
			Err(message) => {
				eprintln!("psh: syntax error: {}", message);
				continue;
			}
		};
		if list.commands.is_empty() {
			continue;
		}

		runner::run_command_list(&mut session, &mut list);

		if session.exit_request.is_some() {
			break;
		}
	}

	let code = session.exit_request.unwrap_or(session.status);
	std::process::exit(code);
}
