//! # Parallel Port Line Protocols
//!
//! Bit layouts of the status and control registers, and the wire constants
//! shared by the two protocols built on them.
//!
//! ## Module Structure
//!
//! - [`nibble`]: half-duplex 4-bit PC-to-PC transfer (sender and receiver)
//! - [`crate::printer::strobe`]: one-way 8-bit printer output
//!
//! ## Status Register (base+1)
//!
//! | Bit | Line | Meaning |
//! |-----|------|---------|
//! | 7 | BUSY | printer busy / peer handshake |
//! | 6 | ACK | acknowledge pulse |
//! | 5 | PE | paper out |
//! | 4 | SELECT | printer online / peer present |
//! | 3 | ERROR | error |
//! | 0–2 | - | undefined, never decoded |
//!
//! ## Control Register (base+2)
//!
//! | Bit | Line |
//! |-----|------|
//! | 0 | STROBE |
//! | 1 | AUTOFEED |
//! | 2 | INIT (reset) |
//! | 3 | SELECT IN |
//!
//! ## Nibble Lines
//!
//! On a PC-to-PC cable the peer's D0–D4 arrive on S3–S7. Shifting the status
//! right by three recovers the peer's five data lines: the low four carry a
//! nibble, the fifth (S7) carries the handshake.

pub mod nibble;

pub use nibble::{NibbleLink, ReceivedByte, SessionSummary, TransferOutcome};

// ============================================================================
// STATUS BITS
// ============================================================================

/// S7: BUSY. Printer busy, or the peer's handshake line.
pub const STATUS_BUSY: u8 = 0x80;

/// S6: ACK. Printer acknowledge.
pub const STATUS_ACK: u8 = 0x40;

/// S5: PE. Paper out.
pub const STATUS_PAPER_OUT: u8 = 0x20;

/// S4: SELECT. Printer online, or peer present.
pub const STATUS_SELECT: u8 = 0x10;

/// S3: ERROR.
pub const STATUS_ERROR: u8 = 0x08;

/// Bits 3–7; the rest of the status register is undefined.
pub const STATUS_MASK: u8 = 0xF8;

// ============================================================================
// CONTROL BITS
// ============================================================================

pub const CONTROL_STROBE: u8 = 0x01;
pub const CONTROL_AUTOFEED: u8 = 0x02;
pub const CONTROL_INIT: u8 = 0x04;
pub const CONTROL_SELECT_IN: u8 = 0x08;

// ============================================================================
// NIBBLE WIRE CONSTANTS
// ============================================================================

/// Written to Data to arm the line (sender) or to acknowledge a low nibble
/// (receiver). Drives the peer's S7.
pub const ARM_MARKER: u8 = 0x10;

/// Written to Data when a side goes idle, and the close sentinel.
pub const IDLE_MARKER: u8 = 0x00;

/// The byte that closes a session.
///
/// A real 0x00 payload cannot be told apart from it: sending a zero byte
/// always ends the receiver's session.
pub const SENTINEL: u8 = 0x00;

/// Decoded view of a status register snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status(pub u8);

impl Status {
    pub fn busy(self) -> bool {
        self.0 & STATUS_BUSY != 0
    }

    pub fn ack(self) -> bool {
        self.0 & STATUS_ACK != 0
    }

    pub fn paper_out(self) -> bool {
        self.0 & STATUS_PAPER_OUT != 0
    }

    pub fn selected(self) -> bool {
        self.0 & STATUS_SELECT != 0
    }

    pub fn error(self) -> bool {
        self.0 & STATUS_ERROR != 0
    }

    /// Peer handshake asserted ("peer busy").
    pub fn handshake(self) -> bool {
        handshake_flag(self.0)
    }

    /// Nibble presented by the peer on S3–S6.
    pub fn nibble(self) -> u8 {
        rx_nibble(self.0)
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#04x}", self.0)?;
        for (set, name) in [
            (self.busy(), "BUSY"),
            (self.ack(), "ACK"),
            (self.paper_out(), "PE"),
            (self.selected(), "SELECT"),
            (self.error(), "ERROR"),
        ] {
            if set {
                write!(f, " {}", name)?;
            }
        }
        Ok(())
    }
}

/// The peer's five data lines as seen on S3–S7.
pub const fn peer_lines(status: u8) -> u8 {
    (status & STATUS_MASK) >> 3
}

/// Handshake flag: the fifth peer line (S7).
pub const fn handshake_flag(status: u8) -> bool {
    peer_lines(status) & 0x10 != 0
}

/// Nibble on S3–S6. Bits 0–2 and 7 do not contribute.
pub const fn rx_nibble(status: u8) -> u8 {
    peer_lines(status) & 0x0F
}

/// Low nibble of a byte.
pub const fn low_nibble(byte: u8) -> u8 {
    byte & 0x0F
}

/// High nibble of a byte, shifted down.
pub const fn high_nibble(byte: u8) -> u8 {
    (byte >> 4) & 0x0F
}

/// Rebuild a byte from its two nibbles.
pub const fn join_nibbles(high: u8, low: u8) -> u8 {
    ((high & 0x0F) << 4) | (low & 0x0F)
}
