use std::io::{IsTerminal, Write};
use std::os::fd::AsFd;

use anyhow::{Context, Result};
use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg};
use zeroize::Zeroizing;

/// Read a password from stdin.
///
/// On a terminal the prompt goes to stderr and echo is switched off for
/// the duration of the read. Otherwise a single line is taken from stdin,
/// which lets scripts pipe the password in.
pub fn read_secret(prompt: &str) -> Result<Zeroizing<String>> {
    let stdin = std::io::stdin();
    let mut line = Zeroizing::new(String::new());

    if stdin.is_terminal() {
        let mut stderr = std::io::stderr();
        write!(stderr, "{prompt}").context("failed to write prompt")?;
        stderr.flush().context("failed to flush prompt")?;

        let fd = stdin.as_fd();
        let original = tcgetattr(fd).context("failed to read terminal attributes")?;
        let mut silent = original.clone();
        silent.local_flags.remove(LocalFlags::ECHO);
        silent.local_flags.insert(LocalFlags::ECHONL);
        tcsetattr(fd, SetArg::TCSANOW, &silent).context("failed to disable echo")?;

        let read = stdin.read_line(&mut line);
        // Restore echo before looking at the read result.
        tcsetattr(fd, SetArg::TCSANOW, &original).context("failed to restore terminal")?;
        read.context("failed to read password")?;
    } else {
        stdin
            .read_line(&mut line)
            .context("failed to read password from stdin")?;
    }

    let trimmed = line.trim_end_matches(['\r', '\n']).len();
    line.truncate(trimmed);
    Ok(line)
}
