//! # Parallel Port Transport Layer
//!
//! This module provides register-level access to a legacy parallel port.
//! A port is three adjacent 8-bit I/O registers:
//!
//! | Offset | Register | Direction (local side) |
//! |--------|----------|------------------------|
//! | base+0 | Data     | read/write |
//! | base+1 | Status   | read-only, driven by the peer or printer |
//! | base+2 | Control  | read/write |
//!
//! ## Available Backends
//!
//! - [`hardware`]: direct `in`/`out` instructions after `ioperm` (Linux x86)
//! - [`sim`]: in-memory registers with scripted status and an event log

pub mod hardware;
pub mod sim;

pub use hardware::HardwarePort;
pub use sim::{PortEvent, Responder, SimulatedPort, wire_status};

/// Standard LPT1 base address.
pub const DEFAULT_BASE: u16 = 0x378;

/// Number of consecutive I/O ports a parallel port occupies.
pub const PORT_SPAN: u16 = 3;

/// One of the three parallel-port registers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Data,
    Status,
    Control,
}

impl Register {
    /// Offset of the register from the port base address.
    pub const fn offset(self) -> u16 {
        match self {
            Register::Data => 0,
            Register::Status => 1,
            Register::Control => 2,
        }
    }

    /// Absolute I/O address for a port at `base`.
    pub const fn address(self, base: u16) -> u16 {
        base + self.offset()
    }
}

/// Raw register access.
///
/// Every call is an immediate, unbuffered side effect. Implementations must
/// not cache values between calls.
pub trait PortBackend {
    fn read(&mut self, reg: Register) -> u8;
    fn write(&mut self, reg: Register, value: u8);
}

impl<B: PortBackend + ?Sized> PortBackend for &mut B {
    fn read(&mut self, reg: Register) -> u8 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Register, value: u8) {
        (**self).write(reg, value)
    }
}

impl<B: PortBackend + ?Sized> PortBackend for Box<B> {
    fn read(&mut self, reg: Register) -> u8 {
        (**self).read(reg)
    }

    fn write(&mut self, reg: Register, value: u8) {
        (**self).write(reg, value)
    }
}

/// # Register Port
///
/// Named accessors over a [`PortBackend`]. The protocols only ever go
/// through this type, so the status register is never written.
///
/// ## Example
///
/// ```
/// use parport_link::transport::{RegisterPort, SimulatedPort};
///
/// let mut port = RegisterPort::new(SimulatedPort::new());
/// port.write_data(0x41);
/// assert_eq!(port.read_data(), 0x41);
/// ```
#[derive(Debug)]
pub struct RegisterPort<B> {
    backend: B,
}

impl<B: PortBackend> RegisterPort<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn read_status(&mut self) -> u8 {
        self.backend.read(Register::Status)
    }

    pub fn read_control(&mut self) -> u8 {
        self.backend.read(Register::Control)
    }

    /// Read back the data latch. Only used for diagnostics.
    pub fn read_data(&mut self) -> u8 {
        self.backend.read(Register::Data)
    }

    pub fn write_data(&mut self, value: u8) {
        self.backend.write(Register::Data, value);
    }

    pub fn write_control(&mut self, value: u8) {
        self.backend.write(Register::Control, value);
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_inner(self) -> B {
        self.backend
    }
}
