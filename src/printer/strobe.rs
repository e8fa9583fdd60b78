//! # Strobe Printer Protocol
//!
//! Classic Centronics output: put a byte on D0–D7 and pulse STROBE. The
//! printer latches the data on the strobe edge.
//!
//! ## Byte Cycle
//!
//! ```text
//! Control bit0:  ──┐         ┌──
//!                  └─────────┘
//! Data:          ─────< ch >─────
//! ```
//!
//! [`StrobePrinter::send_byte`] does not wait for BUSY or ACK. The
//! [`wait_while_busy`](StrobePrinter::wait_while_busy) and
//! [`wait_for_acknowledge`](StrobePrinter::wait_for_acknowledge) primitives
//! are available for callers that want flow control.

use std::io::Write;

use log::{debug, info};

use crate::config::Timing;
use crate::error::LinkError;
use crate::monitor::{CancelToken, PollPolicy, poll_until, poll_until_with};
use crate::protocol::{CONTROL_INIT, CONTROL_STROBE, STATUS_ACK, STATUS_BUSY, STATUS_SELECT, Status};
use crate::transport::{PortBackend, RegisterPort};

/// A printer on the other end of the port.
///
/// ## Example
///
/// ```
/// use parport_link::config::Timing;
/// use parport_link::monitor::CancelToken;
/// use parport_link::printer::StrobePrinter;
/// use parport_link::transport::{RegisterPort, SimulatedPort};
///
/// let port = RegisterPort::new(SimulatedPort::new().with_control(0x0C));
/// let mut printer = StrobePrinter::new(port, Timing::immediate(), CancelToken::new());
/// printer.send_byte(b'A');
/// assert_eq!(printer.port().backend().control_writes(), vec![0x0C, 0x0D]);
/// assert_eq!(printer.port().backend().data_writes(), vec![b'A']);
/// ```
pub struct StrobePrinter<B> {
    port: RegisterPort<B>,
    timing: Timing,
    cancel: CancelToken,
}

impl<B: PortBackend> StrobePrinter<B> {
    pub fn new(port: RegisterPort<B>, timing: Timing, cancel: CancelToken) -> Self {
        Self {
            port,
            timing,
            cancel,
        }
    }

    pub fn port(&self) -> &RegisterPort<B> {
        &self.port
    }

    pub fn into_port(self) -> RegisterPort<B> {
        self.port
    }

    /// Pulse INIT: clear control bit2, then set it (rising edge).
    pub fn reset(&mut self) {
        let control = self.port.read_control();
        self.port.write_control(control & !CONTROL_INIT);
        self.port.write_control(control | CONTROL_INIT);
        info!("Printer reset, status register: {}", Status(self.port.read_status()));
    }

    /// Block until the printer reports SELECT (online).
    ///
    /// Polls every `connection_poll`, writing a `.` to `progress` after each
    /// unsuccessful poll. There is no timeout; the wait ends on SELECT or
    /// cancellation.
    pub fn wait_for_connection<W: Write>(&mut self, progress: &mut W) -> Result<(), LinkError> {
        write!(progress, "Waiting for connection ")?;
        progress.flush()?;

        let policy = PollPolicy::every(self.timing.connection_poll);
        let mut progress_err = None;
        poll_until_with(
            &mut self.port,
            &policy,
            &self.cancel,
            |s| s & STATUS_SELECT != 0,
            |_| {
                if progress_err.is_none() {
                    progress_err = write!(progress, ".").and_then(|_| progress.flush()).err();
                }
            },
        )?;
        if let Some(e) = progress_err {
            return Err(e.into());
        }

        writeln!(progress, " Connected.")?;
        Ok(())
    }

    /// Latch one byte: strobe low, data, strobe high.
    ///
    /// Exactly one strobe pulse per call, whatever the byte.
    pub fn send_byte(&mut self, ch: u8) {
        let control = self.port.read_control();
        self.port.write_control(control & !CONTROL_STROBE);
        self.port.write_data(ch);
        self.port.write_control(control | CONTROL_STROBE);
        debug!("strobe {:#04x}", ch);
    }

    /// Poll until BUSY clears.
    pub fn wait_while_busy(&mut self) -> Result<u8, LinkError> {
        let policy = self.flow_policy();
        poll_until(&mut self.port, &policy, &self.cancel, |s| s & STATUS_BUSY == 0)
    }

    /// Poll until ACK is set.
    pub fn wait_for_acknowledge(&mut self) -> Result<u8, LinkError> {
        let policy = self.flow_policy();
        poll_until(&mut self.port, &policy, &self.cancel, |s| s & STATUS_ACK != 0)
    }

    fn flow_policy(&self) -> PollPolicy {
        PollPolicy::every(self.timing.status_poll).within(self.timing.handshake_timeout)
    }
}
