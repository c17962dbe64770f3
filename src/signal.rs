use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::error::Result;

extern "C" fn interrupting_handler(_signo: libc::c_int) {
	// Nothing. Its only job is to make a blocking read return EINTR.
}

fn ignore_action() -> SigAction {
	SigAction::new(SigHandler::SigIgn, SaFlags::empty(), SigSet::empty())
}

/// The shell ignores SIGTSTP, SIGINT and SIGTTOU for itself; the saved
/// dispositions are restored in children just before exec so they get the
/// behavior the shell was invoked with. SIGINT is switched to an
/// interrupting no-op handler only around the blocking input read.
#[derive(Clone, Copy)]
pub struct Signals {
	old_tstp: SigAction,
	old_int: SigAction,
	old_ttou: SigAction,
}

impl Signals {
	pub fn install() -> Result<Signals> {
		let ignore = ignore_action();
		unsafe {
			Ok(Signals {
				old_tstp: sigaction(Signal::SIGTSTP, &ignore)?,
				old_int: sigaction(Signal::SIGINT, &ignore)?,
				old_ttou: sigaction(Signal::SIGTTOU, &ignore)?,
			})
		}
	}

	pub fn enable_interrupt(&self, sig: Signal) -> Result<()> {
		// No SA_RESTART: the interrupted syscall must fail with EINTR.
		let action = SigAction::new(
			SigHandler::Handler(interrupting_handler),
			SaFlags::empty(),
			SigSet::empty(),
		);
		unsafe { sigaction(sig, &action)? };
		Ok(())
	}

	pub fn ignore(&self, sig: Signal) -> Result<()> {
		unsafe { sigaction(sig, &ignore_action())? };
		Ok(())
	}

	/// Puts back the dispositions saved at install time.
	pub fn restore(&self) -> Result<()> {
		unsafe {
			sigaction(Signal::SIGTSTP, &self.old_tstp)?;
			sigaction(Signal::SIGINT, &self.old_int)?;
			sigaction(Signal::SIGTTOU, &self.old_ttou)?;
		}
		Ok(())
	}
}
