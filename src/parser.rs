use crate::types::{Assignment, Command, CommandList, CtrlOp, IoRedir, RedirOp};
use crate::vars;

pub type ParseResult<T> = Result<T, String>;

struct Parser<'a> {
	line: &'a [u8],
	i: usize,
}

fn split_assignment(word: &str) -> Option<Assignment> {
	let (name, value) = word.split_once('=')?;
	if !vars::is_valid_name(name) {
		return None;
	}
	Some(Assignment { name: name.to_string(), value: value.to_string() })
}

impl<'a> Parser<'a> {
	fn proceed_while<F>(&mut self, f: F)
	where
		F: Fn(u8) -> bool,
	{
		while let Some(&c) = self.line.get(self.i) {
			if !f(c) {
				break;
			}
			self.i += 1;
		}
	}

	fn is_whitespace(c: u8) -> bool {
		matches!(c, b' ' | b'\t' | b'\n')
	}

	fn is_word_byte(c: u8) -> bool {
		!Parser::is_whitespace(c) && !matches!(c, b'<' | b'>' | b'&' | b'|' | b';')
	}

	fn peek(&self) -> Option<u8> {
		self.line.get(self.i).copied()
	}

	fn at_end(&self) -> bool {
		self.i >= self.line.len()
	}

	fn skip_whitespace(&mut self) {
		self.proceed_while(Parser::is_whitespace);
	}

	fn read_word(&mut self) -> &'a [u8] {
		let orig = self.i;
		self.proceed_while(Parser::is_word_byte);
		&self.line[orig..self.i]
	}

	fn read_number(&mut self) -> Option<ParseResult<i32>> {
		let orig = self.i;
		self.proceed_while(|c| c.is_ascii_digit());
		if orig == self.i {
			return None;
		}
		let digits = std::str::from_utf8(&self.line[orig..self.i]).unwrap_or("");
		Some(digits.parse().map_err(|_| format!("file descriptor out of range: {}", digits)))
	}

	fn parse_redirect(&mut self) -> ParseResult<Option<IoRedir>> {
		let orig = self.i;
		let num = self.read_number();

		let op = match self.peek() {
			Some(b'<') => {
				self.i += 1;
				match self.peek() {
					Some(b'>') => {
						self.i += 1;
						RedirOp::ReadWrite
					}
					Some(b'&') => {
						self.i += 1;
						RedirOp::DupRead
					}
					_ => RedirOp::Read,
				}
			}
			Some(b'>') => {
				self.i += 1;
				match self.peek() {
					Some(b'>') => {
						self.i += 1;
						RedirOp::Append
					}
					Some(b'|') => {
						self.i += 1;
						RedirOp::Clobber
					}
					Some(b'&') => {
						self.i += 1;
						RedirOp::DupWrite
					}
					_ => RedirOp::Write,
				}
			}
			_ => {
				// not a redirection; put any digits back
				self.i = orig;
				return Ok(None);
			}
		};

		let fd = match num {
			None => op.default_fd(),
			Some(Ok(n)) => n,
			Some(Err(e)) => return Err(e),
		};

		self.skip_whitespace();
		let target = self.read_word();
		if target.is_empty() {
			return Err("missing redirection target".to_string());
		}

		Ok(Some(IoRedir { op, fd, filename: String::from_utf8_lossy(target).into_owned() }))
	}

	fn parse_command(&mut self) -> ParseResult<Command> {
		let mut cmd =
			Command { words: vec![], assignments: vec![], redirs: vec![], ctrl: CtrlOp::Seq };

		loop {
			self.skip_whitespace();
			match self.peek() {
				None | Some(b';') | Some(b'&') | Some(b'|') => break,
				_ => {}
			}
			if let Some(redir) = self.parse_redirect()? {
				cmd.redirs.push(redir);
				continue;
			}
			let word = String::from_utf8_lossy(self.read_word()).into_owned();
			if cmd.words.is_empty() {
				if let Some(assignment) = split_assignment(&word) {
					cmd.assignments.push(assignment);
					continue;
				}
			}
			cmd.words.push(word);
		}

		if cmd.words.is_empty() {
			return Err("missing command name".to_string());
		}
		Ok(cmd)
	}

	fn parse_list(&mut self) -> ParseResult<CommandList> {
		let mut commands = vec![];
		loop {
			self.skip_whitespace();
			if self.at_end() {
				break;
			}
			let mut cmd = self.parse_command()?;
			self.skip_whitespace();
			cmd.ctrl = match self.peek() {
				None => CtrlOp::Seq,
				Some(b';') => {
					self.i += 1;
					CtrlOp::Seq
				}
				Some(b'&') => {
					self.i += 1;
					CtrlOp::Background
				}
				Some(b'|') => {
					self.i += 1;
					CtrlOp::Pipe
				}
				Some(c) => return Err(format!("unexpected character '{}'", c as char)),
			};
			if cmd.ctrl == CtrlOp::Pipe {
				self.skip_whitespace();
				if self.at_end() {
					return Err("missing command after '|'".to_string());
				}
			}
			commands.push(cmd);
		}
		Ok(CommandList { commands })
	}
}

pub fn parse(line: &str) -> ParseResult<CommandList> {
	Parser { line: line.as_bytes(), i: 0 }.parse_list()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn one(line: &str) -> Command {
		let list = parse(line).unwrap();
		assert_eq!(list.commands.len(), 1, "{:?}", list);
		list.commands.into_iter().next().unwrap()
	}

	#[test]
	fn words_and_default_ctrl() {
		let cmd = one("echo hello world");
		assert_eq!(cmd.words, ["echo", "hello", "world"]);
		assert_eq!(cmd.ctrl, CtrlOp::Seq);
		assert!(cmd.assignments.is_empty());
		assert!(cmd.redirs.is_empty());
	}

	#[test]
	fn control_operators() {
		let list = parse("a | b | c ; d & e").unwrap();
		let ctrls: Vec<CtrlOp> = list.commands.iter().map(|c| c.ctrl).collect();
		assert_eq!(
			ctrls,
			[CtrlOp::Pipe, CtrlOp::Pipe, CtrlOp::Seq, CtrlOp::Background, CtrlOp::Seq]
		);
	}

	#[test]
	fn redirection_operators_and_fd_defaults() {
		let cmd = one("cmd < in > out 2>> log <> rw >| clob");
		assert_eq!(cmd.words, ["cmd"]);
		let got: Vec<(RedirOp, i32, &str)> =
			cmd.redirs.iter().map(|r| (r.op, r.fd, r.filename.as_str())).collect();
		assert_eq!(
			got,
			[
				(RedirOp::Read, 0, "in"),
				(RedirOp::Write, 1, "out"),
				(RedirOp::Append, 2, "log"),
				(RedirOp::ReadWrite, 0, "rw"),
				(RedirOp::Clobber, 1, "clob"),
			]
		);
	}

	#[test]
	fn dup_operators() {
		let cmd = one("cmd 2>&1 <&- 3<&0");
		let got: Vec<(RedirOp, i32, &str)> =
			cmd.redirs.iter().map(|r| (r.op, r.fd, r.filename.as_str())).collect();
		assert_eq!(
			got,
			[
				(RedirOp::DupWrite, 2, "1"),
				(RedirOp::DupRead, 0, "-"),
				(RedirOp::DupRead, 3, "0"),
			]
		);
	}

	#[test]
	fn redirections_may_precede_the_command_name() {
		let cmd = one("2> log ls");
		assert_eq!(cmd.words, ["ls"]);
		assert_eq!(cmd.redirs[0].fd, 2);
	}

	#[test]
	fn assignments_only_before_the_command_name() {
		let cmd = one("A=1 B=two env C=3");
		assert_eq!(cmd.words, ["env", "C=3"]);
		assert_eq!(
			cmd.assignments,
			[
				Assignment { name: "A".into(), value: "1".into() },
				Assignment { name: "B".into(), value: "two".into() },
			]
		);
	}

	#[test]
	fn numeric_words_are_not_redirections() {
		let cmd = one("echo 2 3");
		assert_eq!(cmd.words, ["echo", "2", "3"]);
	}

	#[test]
	fn syntax_errors() {
		assert!(parse("a |").is_err());
		assert!(parse("a ; ; b").is_err());
		assert!(parse("cmd >").is_err());
		assert!(parse("& a").is_err());
		assert!(parse("99999999999> f").is_err());
	}

	#[test]
	fn empty_and_blank_lines_parse_to_nothing() {
		assert!(parse("").unwrap().commands.is_empty());
		assert!(parse("   \t  ").unwrap().commands.is_empty());
	}
}
