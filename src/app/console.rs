//! Line-oriented operator console.
//!
//! Reads slash commands (see [`HELP`]) from any [`BufRead`], dispatches
//! them through [`ControlLoop::handle_command`] and writes one reply line
//! per command.  The firmware runs it on the USB-CDC / UART console;
//! tests drive it with in-memory buffers.

use std::io::{self, BufRead, Write};
use std::time::Duration;

use log::{info, warn};

use super::cadence::ShutdownSignal;
use super::commands::{HELP, OperatorCommand};
use super::control_loop::ControlLoop;

/// Back-off when the console has no input ready (non-blocking UART).
const IDLE_POLL: Duration = Duration::from_millis(100);

/// Serve commands until end of input or shutdown.  `/shutdown` triggers
/// `shutdown` itself, which stops the cadences and the firmware main loop.
///
/// Returns the number of commands dispatched.
pub fn run_console<R: BufRead, W: Write>(
    control: &ControlLoop,
    shutdown: &ShutdownSignal,
    mut input: R,
    mut output: W,
) -> io::Result<usize> {
    let mut dispatched = 0;
    let mut line = String::new();

    while !shutdown.is_triggered() {
        line.clear();
        match input.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                shutdown.wait_timeout(IDLE_POLL);
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }

        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if ["/help", "/start", "/hello"]
            .iter()
            .any(|c| text.eq_ignore_ascii_case(c))
        {
            writeln!(output, "{HELP}")?;
            output.flush()?;
            continue;
        }
        if text.eq_ignore_ascii_case("/shutdown") {
            warn!("Console: shutdown requested");
            writeln!(output, "Shutting down")?;
            output.flush()?;
            shutdown.trigger();
            break;
        }

        match text.parse::<OperatorCommand>() {
            Ok(command) => {
                info!("Console: {:?}", command);
                let reply = control.handle_command(command);
                writeln!(output, "{reply}")?;
                dispatched += 1;
            }
            Err(e) => {
                warn!("Console: rejected {:?} ({})", text, e);
                writeln!(output, "{e}")?;
            }
        }
        output.flush()?;
    }
    info!("Console: closed after {} commands", dispatched);
    Ok(dispatched)
}
