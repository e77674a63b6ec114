//! Process takeover for the elected leader.
//!
//! When this container becomes leader in elect mode, it stops forwarding
//! and turns into the actual service by replacing its own process image
//! with the configured command. Forwarding from the remaining members
//! keeps routing to this address, which now belongs to the real service.

use std::convert::Infallible;

use crate::error::{Error, Result};

/// Replace the current process image with `command`, inheriting the
/// current environment. Never returns on success.
#[cfg(unix)]
pub fn take_over_process(command: &[String]) -> Result<Infallible> {
    use std::ffi::CString;
    use std::io;

    let Some(program) = command.first() else {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no command to take over with",
        )));
    };

    let program = CString::new(program.as_str())
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))?;
    let args = command
        .iter()
        .map(|arg| CString::new(arg.as_str()))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidInput, e)))?;

    // execvp resolves the program on PATH itself.
    match nix::unistd::execvp(&program, &args) {
        Ok(never) => match never {},
        Err(errno) => Err(Error::Io(io::Error::from_raw_os_error(errno as i32))),
    }
}

/// Fallback where no exec-replace primitive exists: run the command as a
/// supervised child and exit with its status. A deliberate deviation from
/// the unix behavior; the process id changes but the container's address
/// keeps serving the command.
#[cfg(not(unix))]
pub fn take_over_process(command: &[String]) -> Result<Infallible> {
    use std::io;

    let Some(program) = command.first() else {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "no command to take over with",
        )));
    };

    let status = std::process::Command::new(program)
        .args(&command[1..])
        .status()?;
    std::process::exit(status.code().unwrap_or(1));
}
