use crate::session::Session;
use crate::vars;

/// Rewrites one word in place: `~` at the start becomes `$HOME`, `$$` the
/// shell pid, `$?` the last foreground status, `$!` the last background
/// pid (empty until one exists), and `$name`/`${name}` a variable lookup.
/// Anything that does not form an expansion is left verbatim.
pub fn expand(session: &Session, word: &mut String) {
	let src = std::mem::take(word);
	let mut rest: &str = &src;
	let mut out = String::with_capacity(src.len());

	if rest == "~" || rest.starts_with("~/") {
		if let Some(home) = session.vars.get("HOME") {
			out.push_str(&home);
			rest = &rest[1..];
		}
	}

	while let Some(pos) = rest.find('$') {
		out.push_str(&rest[..pos]);
		let tail = &rest[pos + 1..];
		let (subst, consumed) = match tail.as_bytes().first().copied() {
			Some(b'$') => (session.pid.to_string(), 1),
			Some(b'?') => (session.status.to_string(), 1),
			Some(b'!') => {
				let pid = session.bg_pid.map(|p| p.to_string()).unwrap_or_default();
				(pid, 1)
			}
			Some(b'{') => match tail.find('}') {
				Some(end) if vars::is_valid_name(&tail[1..end]) => {
					(session.vars.get(&tail[1..end]).unwrap_or_default(), end + 1)
				}
				_ => ("$".to_string(), 0),
			},
			Some(c) if c == b'_' || c.is_ascii_alphabetic() => {
				let len = tail
					.bytes()
					.take_while(|&c| c == b'_' || c.is_ascii_alphanumeric())
					.count();
				(session.vars.get(&tail[..len]).unwrap_or_default(), len)
			}
			_ => ("$".to_string(), 0),
		};
		out.push_str(&subst);
		rest = &tail[consumed..];
	}
	out.push_str(rest);

	*word = out;
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::signal::Signals;
	use nix::unistd::Pid;

	fn session() -> Session {
		let mut session = Session::new(Signals::install().unwrap());
		session.status = 42;
		session
	}

	fn expanded(session: &Session, input: &str) -> String {
		let mut word = input.to_string();
		expand(session, &mut word);
		word
	}

	#[test]
	fn status_and_pid_forms() {
		let session = session();
		assert_eq!(expanded(&session, "$?"), "42");
		assert_eq!(expanded(&session, "rc=$?."), "rc=42.");
		assert_eq!(expanded(&session, "$$"), session.pid.to_string());
	}

	#[test]
	fn bg_pid_is_empty_until_set() {
		let mut session = session();
		assert_eq!(expanded(&session, "x$!x"), "xx");
		session.bg_pid = Some(Pid::from_raw(4321));
		assert_eq!(expanded(&session, "$!"), "4321");
	}

	#[test]
	fn variable_lookups() {
		let mut session = session();
		session.vars.set("PSH_EXP_VAR", "hello").unwrap();
		assert_eq!(expanded(&session, "$PSH_EXP_VAR"), "hello");
		assert_eq!(expanded(&session, "${PSH_EXP_VAR}!"), "hello!");
		assert_eq!(expanded(&session, "$PSH_EXP_MISSING"), "");
	}

	#[test]
	fn tilde_prefix_uses_home() {
		let mut session = session();
		session.vars.set("HOME", "/test/home").unwrap();
		session.vars.export("HOME").unwrap();
		assert_eq!(expanded(&session, "~/sub"), "/test/home/sub");
		assert_eq!(expanded(&session, "~"), "/test/home");
		assert_eq!(expanded(&session, "a~b"), "a~b");
	}

	#[test]
	fn non_expansions_stay_verbatim() {
		let session = session();
		assert_eq!(expanded(&session, "plain"), "plain");
		assert_eq!(expanded(&session, "a$"), "a$");
		assert_eq!(expanded(&session, "$1"), "$1");
		assert_eq!(expanded(&session, "${unterminated"), "${unterminated");
	}
}
