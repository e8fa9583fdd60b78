//! # Hardware Port Backend
//!
//! Direct register I/O on a legacy PC parallel port (LPT) from user space.
//!
//! ## Access Capability
//!
//! User-space `in`/`out` instructions fault unless the process has been
//! granted the port range with `ioperm(2)`, which in turn needs
//! `CAP_SYS_RAWIO` (in practice: run as root). [`HardwarePort::open`] acquires
//! the range and the returned value owns it; dropping the port, or calling
//! [`HardwarePort::close`], gives it back. Every exit path of a session
//! (normal close, error, Ctrl+C) therefore releases the capability.
//!
//! ```no_run
//! use parport_link::transport::{HardwarePort, RegisterPort, DEFAULT_BASE};
//!
//! let hw = HardwarePort::open(DEFAULT_BASE)?;
//! let mut port = RegisterPort::new(hw);
//! println!("status: {:#04x}", port.read_status());
//! port.into_inner().close()?;
//! # Ok::<(), parport_link::LinkError>(())
//! ```
//!
//! ## Platform Support
//!
//! Only Linux on x86/x86_64 (glibc) exposes `ioperm`. Elsewhere `open` fails
//! with [`LinkError::Permission`].

use std::io;

use log::{debug, error, info};

use super::{PORT_SPAN, PortBackend, Register};
use crate::error::LinkError;

/// A parallel port whose I/O range this process currently holds.
#[derive(Debug)]
pub struct HardwarePort {
    base: u16,
    released: bool,
}

impl HardwarePort {
    /// Acquire access to the three registers at `base` and wrap them.
    ///
    /// ## Errors
    ///
    /// Returns [`LinkError::Permission`] with the OS reason if `ioperm`
    /// refuses (usually `EPERM` when not running as root).
    pub fn open(base: u16) -> Result<Self, LinkError> {
        set_permission(base, true).map_err(LinkError::Permission)?;
        info!("Acquired I/O ports {:#x}..{:#x}", base, base + PORT_SPAN);
        Ok(Self {
            base,
            released: false,
        })
    }

    /// Port base address.
    pub fn base(&self) -> u16 {
        self.base
    }

    /// Release the I/O range, reporting failure instead of just logging it.
    pub fn close(mut self) -> Result<(), LinkError> {
        self.released = true;
        set_permission(self.base, false).map_err(LinkError::Permission)?;
        info!("Released I/O ports at {:#x}", self.base);
        Ok(())
    }
}

impl Drop for HardwarePort {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match set_permission(self.base, false) {
            Ok(()) => debug!("Released I/O ports at {:#x} on drop", self.base),
            Err(e) => error!("ioperm release at {:#x} failed: {}", self.base, e),
        }
    }
}

impl PortBackend for HardwarePort {
    fn read(&mut self, reg: Register) -> u8 {
        // SAFETY: `self` exists only while ioperm grants the range.
        unsafe { port_io::inb(reg.address(self.base)) }
    }

    fn write(&mut self, reg: Register, value: u8) {
        // SAFETY: as above.
        unsafe { port_io::outb(reg.address(self.base), value) }
    }
}

#[cfg(all(
    target_os = "linux",
    target_env = "gnu",
    any(target_arch = "x86", target_arch = "x86_64")
))]
fn set_permission(base: u16, enable: bool) -> io::Result<()> {
    let result = unsafe {
        libc::ioperm(
            libc::c_ulong::from(base),
            libc::c_ulong::from(PORT_SPAN),
            libc::c_int::from(enable),
        )
    };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(all(
    target_os = "linux",
    target_env = "gnu",
    any(target_arch = "x86", target_arch = "x86_64")
)))]
fn set_permission(_base: u16, _enable: bool) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "direct port I/O needs Linux on x86",
    ))
}

#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod port_io {
    pub unsafe fn outb(port: u16, value: u8) {
        unsafe {
            core::arch::asm!("out dx, al", in("dx") port, in("al") value, options(nomem, nostack));
        }
    }

    pub unsafe fn inb(port: u16) -> u8 {
        let value: u8;
        unsafe {
            core::arch::asm!("in al, dx", in("dx") port, out("al") value, options(nomem, nostack));
        }
        value
    }
}

// No port I/O space; `HardwarePort::open` never succeeds on these targets.
#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
mod port_io {
    pub unsafe fn outb(_port: u16, _value: u8) {}

    pub unsafe fn inb(_port: u16) -> u8 {
        0xFF
    }
}
