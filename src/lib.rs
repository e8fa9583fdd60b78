//! # parport-link - Parallel Port Printer and PC-to-PC Transfer
//!
//! parport-link drives a legacy PC parallel port (LPT) by direct register
//! I/O, without the kernel's printer or `ppdev` drivers. It provides:
//!
//! - **Printer output**: Centronics strobe protocol with reset and
//!   connection wait
//! - **PC-to-PC transfer**: a half-duplex nibble protocol over a parallel
//!   cable, one byte at a time, closed by a zero sentinel
//! - **Backends**: real hardware (`ioperm` + `in`/`out`) and an in-memory
//!   simulation for tests
//!
//! ## Quick Start
//!
//! ```no_run
//! use parport_link::{
//!     config::Timing,
//!     monitor::CancelToken,
//!     protocol::NibbleLink,
//!     transport::{HardwarePort, RegisterPort, DEFAULT_BASE},
//! };
//!
//! // Needs root: grants this process the three port registers
//! let hw = HardwarePort::open(DEFAULT_BASE)?;
//!
//! let mut link = NibbleLink::new(RegisterPort::new(hw), Timing::default(), CancelToken::new());
//! for &b in b"hello" {
//!     link.transmit_byte(b)?;
//! }
//! // Zero closes the peer's session
//! link.transmit_byte(0)?;
//!
//! # Ok::<(), parport_link::error::LinkError>(())
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`transport`] | Register access and backends |
//! | [`protocol`] | Status/control bits and the nibble protocol |
//! | [`printer`] | Strobe printer protocol |
//! | [`monitor`] | Cancellable status polling |
//! | [`session`] | Print / server / client sessions |
//! | [`config`] | Port address and timing |
//! | [`error`] | Error types |

pub mod config;
pub mod error;
pub mod monitor;
pub mod printer;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use config::{LinkConfig, Timing};
pub use error::LinkError;
pub use monitor::CancelToken;
pub use session::{Mode, PrintOptions, Session};
pub use transport::{HardwarePort, RegisterPort, SimulatedPort};
