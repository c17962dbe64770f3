use nix::unistd::Pid;

pub type Jid = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Job {
	pub jid: Jid,
	pub pgid: Pid,
}

/// One entry per pipeline still known to the shell. Jids are handed out
/// monotonically and never reused within a session.
#[derive(Debug)]
pub struct JobTable {
	jobs: Vec<Job>,
	next_jid: Jid,
}

impl JobTable {
	pub fn new() -> JobTable {
		JobTable { jobs: Vec::new(), next_jid: 1 }
	}

	pub fn add(&mut self, pgid: Pid) -> Jid {
		let jid = self.next_jid;
		self.next_jid += 1;
		self.jobs.push(Job { jid, pgid });
		jid
	}

	pub fn pgid(&self, jid: Jid) -> Option<Pid> {
		self.jobs.iter().find(|j| j.jid == jid).map(|j| j.pgid)
	}

	pub fn jid(&self, pgid: Pid) -> Option<Jid> {
		self.jobs.iter().find(|j| j.pgid == pgid).map(|j| j.jid)
	}

	/// Removal relocates later entries; anyone iterating by index has to
	/// re-fetch afterwards.
	pub fn remove(&mut self, pgid: Pid) {
		self.jobs.retain(|j| j.pgid != pgid);
	}

	pub fn entries(&self) -> &[Job] {
		&self.jobs
	}

	pub fn len(&self) -> usize {
		self.jobs.len()
	}

	pub fn last_jid(&self) -> Option<Jid> {
		self.jobs.iter().map(|j| j.jid).max()
	}
}
