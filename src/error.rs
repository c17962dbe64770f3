use std::{ffi, io};

use nix::errno::Errno;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ShellError>;

#[derive(Debug, Error)]
pub enum ShellError {
	#[error("{0}")]
	Sys(#[from] Errno),
	#[error("{0}")]
	Io(#[from] io::Error),
	#[error("nul byte in word: {0}")]
	Nul(#[from] ffi::NulError),
	#[error("file descriptor {0} already in use")]
	FdInUse(i32),
	#[error("{0}: invalid variable name")]
	BadName(String),
	#[error("{0}: no such job")]
	NoSuchJob(String),
}
