//! # Sessions
//!
//! The three things the binary can do with a port, each run to completion
//! over any [`PortBackend`]:
//!
//! | Mode | Protocol | Ends when |
//! |------|----------|-----------|
//! | print | strobe | all characters are latched |
//! | server | nibble receive | the close sentinel arrives |
//! | client | nibble send | the user types `0` or input ends |
//!
//! Console traffic (prompts, echoed data) goes to the writer handed in, so
//! sessions are testable against a [`SimulatedPort`](crate::transport::SimulatedPort)
//! and a `Vec<u8>`.
//!
//! Client input is read on its own thread and handed over line by line, so
//! a blocked terminal read never holds up cancellation.

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;

use log::{info, warn};

use crate::config::Timing;
use crate::error::LinkError;
use crate::monitor::{CANCEL_SLICE, CancelToken};
use crate::printer::StrobePrinter;
use crate::protocol::{NibbleLink, ReceivedByte, SENTINEL, SessionSummary, TransferOutcome};
use crate::transport::{PortBackend, RegisterPort};

/// Client input token that closes the session.
pub const CLOSE_TOKEN: &str = "0";

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Send text to an attached printer
    Print { text: String, options: PrintOptions },
    /// Receive bytes from the peer
    Server,
    /// Send typed bytes to the peer
    Client,
}

/// Printer-mode flow control.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrintOptions {
    /// Wait for BUSY to clear before, and for ACK after, every byte
    pub handshake: bool,
}

/// Counters from a client session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientSummary {
    /// Payload bytes the peer confirmed
    pub delivered: usize,
    /// Payload bytes whose final handshake check failed
    pub failed: usize,
}

/// Shared session settings.
#[derive(Debug, Clone)]
pub struct Session {
    timing: Timing,
    cancel: CancelToken,
}

impl Session {
    pub fn new(timing: Timing, cancel: CancelToken) -> Self {
        Self { timing, cancel }
    }

    /// Run `mode` to completion.
    pub fn run<B, R, W>(&self, mode: &Mode, backend: B, input: R, out: &mut W) -> Result<(), LinkError>
    where
        B: PortBackend,
        R: BufRead + Send + 'static,
        W: Write,
    {
        match mode {
            Mode::Print { text, options } => {
                self.print(backend, text.as_bytes(), *options, out)?;
            }
            Mode::Server => {
                self.serve(backend, out)?;
            }
            Mode::Client => {
                self.client(backend, input, out)?;
            }
        }
        Ok(())
    }

    /// Reset the printer, wait for it to come online, then strobe out
    /// `text` byte by byte. Returns the number of bytes sent.
    pub fn print<B, W>(&self, backend: B, text: &[u8], options: PrintOptions, out: &mut W) -> Result<usize, LinkError>
    where
        B: PortBackend,
        W: Write,
    {
        let mut printer = StrobePrinter::new(RegisterPort::new(backend), self.timing, self.cancel.clone());

        printer.reset();
        printer.wait_for_connection(out)?;

        write!(out, "\nPrinted characters: ")?;
        for &ch in text {
            self.cancel.check()?;
            if options.handshake {
                printer.wait_while_busy()?;
            }
            printer.send_byte(ch);
            if options.handshake {
                printer.wait_for_acknowledge()?;
            }
            out.write_all(&[ch])?;
            out.flush()?;
        }
        writeln!(out, "\nPrint finished.")?;

        info!("Printed {} bytes", text.len());
        Ok(text.len())
    }

    /// Receive until the close sentinel, printing every byte. A stalled
    /// peer costs the byte in flight, never the session.
    pub fn serve<B, W>(&self, backend: B, out: &mut W) -> Result<SessionSummary, LinkError>
    where
        B: PortBackend,
        W: Write,
    {
        let mut link = NibbleLink::new(RegisterPort::new(backend), self.timing, self.cancel.clone());

        writeln!(out, "Server mode:")?;
        writeln!(out, "Data received:")?;
        info!("Server waiting for peer");

        // on_byte cannot fail, so the first console error is kept for later
        let mut console_err = None;
        let summary = link.receive_loop(|rx| {
            if console_err.is_none() {
                console_err = report_byte(out, rx).err();
            }
        })?;
        if let Some(e) = console_err {
            return Err(e.into());
        }

        writeln!(out, "\nConnection closed.")?;
        info!(
            "Server closed after {} bytes ({} dropped on stalls)",
            summary.bytes, summary.stalls
        );
        Ok(summary)
    }

    /// Prompt for input and send it, one byte at a time.
    ///
    /// Each line is split on whitespace. A token of exactly `0` sends the
    /// close sentinel and ends the session; so does end of input. Failed
    /// transfers are reported and the session carries on. Waiting at the
    /// prompt is cancellable.
    pub fn client<B, R, W>(&self, backend: B, input: R, out: &mut W) -> Result<ClientSummary, LinkError>
    where
        B: PortBackend,
        R: BufRead + Send + 'static,
        W: Write,
    {
        let mut link = NibbleLink::new(RegisterPort::new(backend), self.timing, self.cancel.clone());
        let mut summary = ClientSummary::default();
        let lines = LineFeed::spawn(input)?;

        writeln!(out, "Client mode:")?;
        writeln!(out, "Type characters to send (or zero to close):")?;

        'session: loop {
            write!(out, "> ")?;
            out.flush()?;

            let Some(line) = lines.next_line(&self.cancel)? else {
                info!("Input closed, sending close sentinel");
                break 'session;
            };

            for token in line.split_whitespace() {
                if token == CLOSE_TOKEN {
                    break 'session;
                }
                for &ch in token.as_bytes() {
                    match link.transmit_byte(ch)? {
                        TransferOutcome::Delivered => {
                            summary.delivered += 1;
                            writeln!(out, "Character sent: {}", printable(ch))?;
                        }
                        TransferOutcome::Failed => {
                            summary.failed += 1;
                            warn!("{}", LinkError::TransferFailed { byte: ch });
                            writeln!(out, "Character failed to send: {}", printable(ch))?;
                        }
                    }
                }
            }
        }

        if !link.transmit_byte(SENTINEL)?.is_delivered() {
            warn!("Peer did not confirm the close sentinel");
        }
        writeln!(out, "\nConnection closed.")?;
        info!(
            "Client closed: {} delivered, {} failed",
            summary.delivered, summary.failed
        );
        Ok(summary)
    }
}

/// Lines from a blocking reader, delivered over a channel.
struct LineFeed {
    rx: Receiver<io::Result<String>>,
}

impl LineFeed {
    fn spawn<R>(input: R) -> Result<Self, LinkError>
    where
        R: BufRead + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        thread::Builder::new()
            .name("client-input".into())
            .spawn(move || {
                for line in input.lines() {
                    let failed = line.is_err();
                    if tx.send(line).is_err() || failed {
                        break;
                    }
                }
            })?;
        Ok(Self { rx })
    }

    /// Next line, `None` at end of input.
    fn next_line(&self, cancel: &CancelToken) -> Result<Option<String>, LinkError> {
        loop {
            cancel.check()?;
            match self.rx.recv_timeout(CANCEL_SLICE) {
                Ok(line) => return Ok(Some(line?)),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Ok(None),
            }
        }
    }
}

fn report_byte<W: Write>(out: &mut W, rx: &ReceivedByte) -> std::io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Low nibble: {:x}", rx.low)?;
    writeln!(out, "High nibble: {:x}", rx.high)?;
    writeln!(out, "Character (hex): {:02x}", rx.byte())?;
    writeln!(out, "Character (chr): {}", printable(rx.byte()))?;
    out.flush()
}

/// Byte as a console character; non-printables become `.`.
fn printable(byte: u8) -> char {
    if byte.is_ascii_graphic() || byte == b' ' {
        byte as char
    } else {
        '.'
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_printable() {
        assert_eq!(printable(b'H'), 'H');
        assert_eq!(printable(b' '), ' ');
        assert_eq!(printable(0x00), '.');
        assert_eq!(printable(0x0A), '.');
        assert_eq!(printable(0xE9), '.');
    }

    #[test]
    fn test_line_feed_delivers_lines_then_end() {
        let feed = LineFeed::spawn(io::Cursor::new("a b\n0\n")).unwrap();
        let cancel = CancelToken::new();
        assert_eq!(feed.next_line(&cancel).unwrap().as_deref(), Some("a b"));
        assert_eq!(feed.next_line(&cancel).unwrap().as_deref(), Some("0"));
        assert_eq!(feed.next_line(&cancel).unwrap(), None);
    }

    #[test]
    fn test_line_feed_honors_cancel() {
        let feed = LineFeed::spawn(io::Cursor::new("never read\n")).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(matches!(feed.next_line(&cancel), Err(LinkError::Cancelled)));
    }

    #[test]
    fn test_report_byte() {
        let mut out = Vec::new();
        report_byte(&mut out, &ReceivedByte { high: 0x4, low: 0x8 }).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\nLow nibble: 8\nHigh nibble: 4\nCharacter (hex): 48\nCharacter (chr): H\n"
        );
    }
}
