use nix::errno::Errno;

use crate::error::Result;

fn read_byte() -> Result<Option<u8>> {
	let mut byte = 0u8;
	let n = unsafe { libc::read(libc::STDIN_FILENO, &mut byte as *mut u8 as *mut libc::c_void, 1) };
	match n {
		1 => Ok(Some(byte)),
		0 => Ok(None),
		_ => Err(Errno::last().into()),
	}
}

/// Reads one line from fd 0, byte by byte so nothing past the newline is
/// consumed. Returns None at end of input. Goes through raw read because
/// std's buffered readers retry on EINTR, which would swallow the
/// interrupt the prompt relies on.
pub fn read_line() -> Result<Option<String>> {
	let mut line: Vec<u8> = Vec::new();
	loop {
		match read_byte()? {
			Some(b'\n') => break,
			Some(byte) => line.push(byte),
			None => {
				if line.is_empty() {
					return Ok(None);
				}
				break;
			}
		}
	}
	Ok(Some(String::from_utf8_lossy(&line).into_owned()))
}
