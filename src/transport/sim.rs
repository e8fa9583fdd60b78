//! # Simulated Port
//!
//! An in-memory stand-in for the three parallel-port registers, used to run
//! the printer and nibble protocols deterministically without hardware.
//!
//! ## Status Script
//!
//! The status register is driven from a queue. Each status read consumes one
//! queued value; once the queue is empty the last value sticks. This models a
//! peer whose lines change between polls:
//!
//! ```
//! use parport_link::transport::{RegisterPort, SimulatedPort};
//!
//! let sim = SimulatedPort::new().with_status(0x80).queue_status([0x00, 0x10]);
//! let mut port = RegisterPort::new(sim);
//! assert_eq!(port.read_status(), 0x00);
//! assert_eq!(port.read_status(), 0x10);
//! assert_eq!(port.read_status(), 0x10);
//! ```
//!
//! ## Crossover Wiring
//!
//! A PC-to-PC nibble cable connects the peer's data lines D0–D4 to the local
//! status lines S3–S7. [`wire_status`] applies that mapping so a test can
//! replay the frames one side wrote as the status the other side reads.
//!
//! ## Live Peer
//!
//! A responder installed with [`SimulatedPort::with_responder`] sees every
//! data write as it happens and may answer with a status value, which is
//! queued for the next status read. This lets a test run the other end of
//! the cable in lockstep with the side under test.
//!
//! ```
//! use parport_link::transport::{RegisterPort, SimulatedPort, wire_status};
//!
//! // A peer that echoes our data lines back onto our status lines.
//! let sim = SimulatedPort::new().with_responder(|data| Some(wire_status(data)));
//! let mut port = RegisterPort::new(sim);
//! port.write_data(0x10);
//! assert_eq!(port.read_status(), 0x80);
//! ```

use std::collections::VecDeque;
use std::fmt;

use super::{PortBackend, Register};

/// One register access, as recorded by [`SimulatedPort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortEvent {
    Read(Register, u8),
    Write(Register, u8),
}

/// Status value the local side reads when the peer drives `data` onto a
/// crossover cable (D0–D4 → S3–S7).
pub const fn wire_status(data: u8) -> u8 {
    (data & 0x1F) << 3
}

/// Callback run on every data write; a returned value is queued as status.
pub type Responder = Box<dyn FnMut(u8) -> Option<u8> + Send>;

/// In-memory parallel port.
#[derive(Default)]
pub struct SimulatedPort {
    data: u8,
    status: u8,
    control: u8,
    script: VecDeque<u8>,
    events: Vec<PortEvent>,
    responder: Option<Responder>,
}

impl fmt::Debug for SimulatedPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimulatedPort")
            .field("data", &self.data)
            .field("status", &self.status)
            .field("control", &self.control)
            .field("script", &self.script)
            .field("events", &self.events.len())
            .field("responder", &self.responder.is_some())
            .finish()
    }
}

impl SimulatedPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the status value returned once the script is exhausted.
    pub fn with_status(mut self, status: u8) -> Self {
        self.status = status;
        self
    }

    /// Set the initial control register value.
    pub fn with_control(mut self, control: u8) -> Self {
        self.control = control;
        self
    }

    /// Append status values, one per future status read.
    pub fn queue_status<I: IntoIterator<Item = u8>>(mut self, values: I) -> Self {
        self.script.extend(values);
        self
    }

    /// Append the status a peer produces by writing `frames` to its data
    /// register, one frame per future status read.
    pub fn peer_frames<I: IntoIterator<Item = u8>>(self, frames: I) -> Self {
        self.queue_status(frames.into_iter().map(wire_status))
    }

    /// Answer data writes from `respond`.
    pub fn with_responder<F>(mut self, respond: F) -> Self
    where
        F: FnMut(u8) -> Option<u8> + Send + 'static,
    {
        self.responder = Some(Box::new(respond));
        self
    }

    /// Queue one more status value on a port already in use.
    pub fn feed(&mut self, status: u8) {
        self.script.push_back(status);
    }

    /// Number of status values still queued.
    pub fn pending_status(&self) -> usize {
        self.script.len()
    }

    /// Every register access so far, in order.
    pub fn events(&self) -> &[PortEvent] {
        &self.events
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    /// Values written to the data register, in order.
    pub fn data_writes(&self) -> Vec<u8> {
        self.writes_to(Register::Data)
    }

    /// Values written to the control register, in order.
    pub fn control_writes(&self) -> Vec<u8> {
        self.writes_to(Register::Control)
    }

    /// How many times the status register was read.
    pub fn status_reads(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, PortEvent::Read(Register::Status, _)))
            .count()
    }

    fn writes_to(&self, reg: Register) -> Vec<u8> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PortEvent::Write(r, v) if *r == reg => Some(*v),
                _ => None,
            })
            .collect()
    }
}

impl PortBackend for SimulatedPort {
    fn read(&mut self, reg: Register) -> u8 {
        let value = match reg {
            Register::Data => self.data,
            Register::Control => self.control,
            Register::Status => {
                if let Some(next) = self.script.pop_front() {
                    self.status = next;
                }
                self.status
            }
        };
        self.events.push(PortEvent::Read(reg, value));
        value
    }

    fn write(&mut self, reg: Register, value: u8) {
        match reg {
            Register::Data => self.data = value,
            Register::Control => self.control = value,
            // Input-only lines; a write has no effect on real hardware either.
            Register::Status => {}
        }
        self.events.push(PortEvent::Write(reg, value));

        if reg == Register::Data {
            if let Some(status) = self.responder.as_mut().and_then(|respond| respond(value)) {
                self.script.push_back(status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_script_then_sticky() {
        let mut sim = SimulatedPort::new().with_status(0x78).queue_status([0x80, 0x08]);
        assert_eq!(sim.read(Register::Status), 0x80);
        assert_eq!(sim.read(Register::Status), 0x08);
        assert_eq!(sim.read(Register::Status), 0x08);
        assert_eq!(sim.pending_status(), 0);
        assert_eq!(sim.status_reads(), 3);
    }

    #[test]
    fn test_default_status_when_unscripted() {
        let mut sim = SimulatedPort::new().with_status(0x78);
        assert_eq!(sim.read(Register::Status), 0x78);
    }

    #[test]
    fn test_status_writes_are_ignored() {
        let mut sim = SimulatedPort::new().with_status(0x10);
        sim.write(Register::Status, 0xFF);
        assert_eq!(sim.read(Register::Status), 0x10);
    }

    #[test]
    fn test_wire_status_mapping() {
        assert_eq!(wire_status(0x00), 0x00);
        assert_eq!(wire_status(0x10), 0x80);
        assert_eq!(wire_status(0x0F), 0x78);
        assert_eq!(wire_status(0x01), 0x08);
        // D5–D7 are not wired
        assert_eq!(wire_status(0xE0), 0x00);
    }

    #[test]
    fn test_peer_frames() {
        let mut sim = SimulatedPort::new().peer_frames([0x10, 0x08]);
        assert_eq!(sim.read(Register::Status), 0x80);
        assert_eq!(sim.read(Register::Status), 0x40);
    }

    #[test]
    fn test_responder_answers_data_writes_only() {
        let mut sim = SimulatedPort::new().with_responder(|data| (data != 0).then_some(0x80));
        sim.write(Register::Control, 0x01);
        sim.write(Register::Data, 0x00);
        assert_eq!(sim.pending_status(), 0);
        sim.write(Register::Data, 0x05);
        assert_eq!(sim.pending_status(), 1);
        assert_eq!(sim.read(Register::Status), 0x80);
    }

    #[test]
    fn test_feed_extends_script() {
        let mut sim = SimulatedPort::new().queue_status([0x08]);
        sim.feed(0x10);
        assert_eq!(sim.read(Register::Status), 0x08);
        assert_eq!(sim.read(Register::Status), 0x10);
    }

    #[test]
    fn test_write_log() {
        let mut sim = SimulatedPort::new();
        sim.write(Register::Data, 1);
        sim.write(Register::Control, 2);
        sim.write(Register::Data, 3);
        assert_eq!(sim.data_writes(), vec![1, 3]);
        assert_eq!(sim.control_writes(), vec![2]);
        sim.clear_events();
        assert!(sim.events().is_empty());
    }
}
