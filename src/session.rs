use nix::unistd::{self, Pid};

use crate::jobs::JobTable;
use crate::signal::Signals;
use crate::vars::VarStore;

/// Everything the running shell mutates: `$?`, `$!`, the job table, the
/// variable store and the saved signal dispositions. One instance per
/// shell process, owned by main and threaded through every call.
pub struct Session {
	pub status: i32,
	pub bg_pid: Option<Pid>,
	pub pid: Pid,
	pub jobs: JobTable,
	pub vars: VarStore,
	pub signals: Signals,
	pub exit_request: Option<i32>,
}

impl Session {
	pub fn new(signals: Signals) -> Session {
		Session {
			status: 0,
			bg_pid: None,
			pid: unistd::getpid(),
			jobs: JobTable::new(),
			vars: VarStore::default(),
			signals,
			exit_request: None,
		}
	}
}
