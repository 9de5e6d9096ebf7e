//! Line-oriented frontend for pipes and dumb terminals.
//!
//! Each stdin line is submitted as one message once the connection is up.
//! New transcript entries are printed to stdout as plain text; status
//! changes go to stderr.

use std::io::{self, BufRead, Stderr, Stdout, Write};
use std::thread::JoinHandle;

use copilot_render::plain_text;
use tokio::sync::watch;
use tracing::debug;

use crate::connection::Status;
use crate::panel::{Frontend, PanelEvent, PanelHandle, PanelView};
use crate::transcript::Origin;

pub struct PlainFrontend<W, E> {
    out: W,
    err: E,
    printed: usize,
    connected: bool,
}

impl PlainFrontend<Stdout, Stderr> {
    pub fn stdio() -> Self {
        Self::new(io::stdout(), io::stderr())
    }
}

impl<W: Write, E: Write> PlainFrontend<W, E> {
    pub fn new(out: W, err: E) -> Self {
        Self {
            out,
            err,
            printed: 0,
            connected: false,
        }
    }

    pub fn into_parts(self) -> (W, E) {
        (self.out, self.err)
    }
}

impl<W: Write, E: Write> Frontend for PlainFrontend<W, E> {
    fn draw(&mut self, view: &PanelView<'_>) -> io::Result<()> {
        let connected = view.status.is_connected();
        if connected != self.connected {
            self.connected = connected;
            let label = if connected { "connected" } else { "disconnected" };
            writeln!(self.err, "[copilot: {label}]")?;
            self.err.flush()?;
        }

        let entries = view.transcript.entries();
        for entry in &entries[self.printed.min(entries.len())..] {
            let text = plain_text(&entry.lines);
            match entry.origin {
                Origin::Inbound => writeln!(self.out, "{text}")?,
                Origin::Echo => writeln!(self.out, "> {text}")?,
            }
        }
        self.printed = entries.len();
        self.out.flush()
    }
}

/// Submit every line read from `reader`; quit the panel at end of input.
///
/// A line is held until the panel reports a live connection, so input piped
/// in before the server answers is sent rather than dropped. The quit is
/// queued behind the last line and so reaches the panel after it.
pub fn spawn_line_reader<R>(reader: R, handle: PanelHandle) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    std::thread::spawn(move || {
        let mut status = handle.status();
        for line in reader.lines() {
            match line {
                Ok(line) => {
                    if !wait_until_connected(&mut status) {
                        debug!("panel gone before line could be sent");
                        return;
                    }
                    if !handle.post(PanelEvent::Line(line)) {
                        return;
                    }
                }
                Err(e) => {
                    debug!(error = %e, "stdin read failed");
                    break;
                }
            }
        }
        handle.quit();
    })
}

/// Block until the status reads connected. False once the panel has stopped.
fn wait_until_connected(status: &mut watch::Receiver<Status>) -> bool {
    futures::executor::block_on(status.wait_for(|s| s.is_connected())).is_ok()
}
