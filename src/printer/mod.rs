//! # Printer Module
//!
//! Driving a Centronics printer attached directly to the port.
//!
//! ## Modules
//!
//! - [`strobe`]: reset pulse, connection wait and strobed byte output

pub mod strobe;

pub use strobe::StrobePrinter;
