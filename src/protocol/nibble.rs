//! # Nibble Transfer Protocol
//!
//! Half-duplex PC-to-PC byte transfer over a parallel cable, four bits at a
//! time. The sender drives D0–D4, which arrive on the receiver's S3–S7; the
//! receiver answers on its own D4, which arrives on the sender's S7.
//!
//! ## One Byte on the Wire
//!
//! ```text
//! sender Data:    0x10 ── low ──────── high ────────────── 0x00
//!                 arm     │            │                    idle
//!                         │ wait flag  │ settle 500ms,
//!                         │ clear      │ check flag
//! receiver Data:          └─ 0x10 ─────┴─ 0x00
//!                            ack low      ack high
//! ```
//!
//! The receiver accepts a low nibble only on a falling edge of the
//! handshake line: the sender's arm marker raises it, the low nibble (with
//! D4 clear) drops it. The idle marker between bytes therefore never looks
//! like data.
//!
//! ## Session Close
//!
//! A byte whose nibbles are both zero is the close sentinel. A payload byte
//! of 0x00 cannot be sent: it always closes the session.

use log::{debug, warn};

use super::{
    ARM_MARKER, IDLE_MARKER, SENTINEL, handshake_flag, high_nibble, join_nibbles, low_nibble,
    rx_nibble,
};
use crate::config::Timing;
use crate::error::LinkError;
use crate::monitor::{CancelToken, PollPolicy, poll_edge, poll_until};
use crate::transport::{PortBackend, RegisterPort};

/// Result of the sender's post-transfer handshake check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Peer released the handshake line after the high nibble
    Delivered,
    /// Peer still asserted the handshake line after the settle period
    Failed,
}

impl TransferOutcome {
    pub fn is_delivered(self) -> bool {
        self == TransferOutcome::Delivered
    }
}

/// One byte as reassembled by the receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceivedByte {
    /// High nibble, 0–15
    pub high: u8,
    /// Low nibble, 0–15
    pub low: u8,
}

impl ReceivedByte {
    pub fn byte(&self) -> u8 {
        join_nibbles(self.high, self.low)
    }

    pub fn is_sentinel(&self) -> bool {
        self.byte() == SENTINEL
    }
}

/// What a receive session saw before it ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    /// Payload bytes received (the sentinel is not counted)
    pub bytes: usize,
    /// The session ended on the close sentinel
    pub closed: bool,
    /// Bytes dropped because the peer held the handshake line too long
    pub stalls: usize,
}

/// # Nibble Link
///
/// One end of a PC-to-PC parallel cable. The same type sends
/// ([`transmit_byte`](Self::transmit_byte)) and receives
/// ([`receive_loop`](Self::receive_loop)); a session only ever does one.
///
/// ## Example
///
/// ```
/// use parport_link::config::Timing;
/// use parport_link::monitor::CancelToken;
/// use parport_link::protocol::NibbleLink;
/// use parport_link::transport::{RegisterPort, SimulatedPort};
///
/// // The peer answers with its handshake line low: delivered.
/// let port = RegisterPort::new(SimulatedPort::new());
/// let mut link = NibbleLink::new(port, Timing::immediate(), CancelToken::new());
/// assert!(link.transmit_byte(b'A')?.is_delivered());
/// assert_eq!(link.port().backend().data_writes(), vec![0x10, 0x01, 0x04, 0x00]);
/// # Ok::<(), parport_link::LinkError>(())
/// ```
pub struct NibbleLink<B> {
    port: RegisterPort<B>,
    timing: Timing,
    cancel: CancelToken,
}

impl<B: PortBackend> NibbleLink<B> {
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

    pub fn port_mut(&mut self) -> &mut RegisterPort<B> {
        &mut self.port
    }

    pub fn into_port(self) -> RegisterPort<B> {
        self.port
    }

    // ========================================================================
    // SENDER
    // ========================================================================

    /// Send one byte, low nibble first.
    ///
    /// Exactly one low-nibble write and one high-nibble write are made, in
    /// that order, with the handshake wait between them. The line is left at
    /// the idle marker on every return path.
    ///
    /// ## Errors
    ///
    /// - [`LinkError::StalledPeer`] if `handshake_timeout` runs out while
    ///   waiting for the peer to release the handshake line
    /// - [`LinkError::Cancelled`] if interrupted
    pub fn transmit_byte(&mut self, ch: u8) -> Result<TransferOutcome, LinkError> {
        let result = self.drive_byte(ch);
        if result.is_err() {
            self.port.write_data(IDLE_MARKER);
        }
        result
    }

    fn drive_byte(&mut self, ch: u8) -> Result<TransferOutcome, LinkError> {
        let t = self.timing;

        self.port.write_data(ARM_MARKER);
        self.cancel.sleep(t.line_settle)?;

        let low = low_nibble(ch);
        self.port.write_data(low);
        debug!("tx {:#04x}: low nibble {:x}", ch, low);

        let handshake = PollPolicy::every(t.handshake_poll).within(t.handshake_timeout);
        poll_until(&mut self.port, &handshake, &self.cancel, |s| !handshake_flag(s))?;

        let high = high_nibble(ch);
        self.port.write_data(high);
        debug!("tx {:#04x}: high nibble {:x}", ch, high);

        self.cancel.sleep(t.transfer_settle)?;
        let still_busy = handshake_flag(self.port.read_status());

        self.cancel.sleep(t.release_settle)?;
        self.port.write_data(IDLE_MARKER);

        if still_busy {
            warn!("tx {:#04x}: peer still busy after settle", ch);
            Ok(TransferOutcome::Failed)
        } else {
            Ok(TransferOutcome::Delivered)
        }
    }

    // ========================================================================
    // RECEIVER
    // ========================================================================

    /// Receive one byte.
    ///
    /// Waits (unbounded, at `receive_poll`) for the peer to arm the line,
    /// then (bounded by `handshake_timeout`) for the low nibble to drop it.
    /// The arm marker is only held for the sender's `line_settle`, so
    /// `receive_poll` has to stay below it (zero yields between reads).
    ///
    /// ## Errors
    ///
    /// - [`LinkError::StalledPeer`] if the line stays armed past
    ///   `handshake_timeout`; nothing has been acknowledged
    /// - [`LinkError::Cancelled`] if interrupted
    pub fn receive_byte(&mut self) -> Result<ReceivedByte, LinkError> {
        let t = self.timing;
        let idle = PollPolicy::every(t.receive_poll);
        let armed = PollPolicy::every(t.receive_poll).within(t.handshake_timeout);

        let status = poll_edge(&mut self.port, &idle, &armed, &self.cancel, handshake_flag)?;
        let low = rx_nibble(status);
        self.port.write_data(ARM_MARKER);

        let high = rx_nibble(self.port.read_status());
        self.port.write_data(IDLE_MARKER);

        let rx = ReceivedByte { high, low };
        debug!("rx {:#04x}: low {:x} high {:x}", rx.byte(), low, high);
        Ok(rx)
    }

    /// Receive bytes until the close sentinel, handing each (sentinel
    /// included) to `on_byte` as soon as it is complete.
    ///
    /// A peer that holds the handshake line past `handshake_timeout` costs
    /// the byte in flight: the stall is logged and counted, and the loop
    /// goes back to waiting for the next arm. Only the sentinel or
    /// cancellation ends it. Bytes already handed out are never revisited.
    pub fn receive_loop<F>(&mut self, mut on_byte: F) -> Result<SessionSummary, LinkError>
    where
        F: FnMut(&ReceivedByte),
    {
        let mut summary = SessionSummary::default();
        loop {
            let rx = match self.receive_byte() {
                Ok(rx) => rx,
                Err(LinkError::StalledPeer { polls, waited }) => {
                    summary.stalls += 1;
                    warn!(
                        "rx: peer held the handshake line for {:?} ({} polls), byte dropped",
                        waited, polls
                    );
                    continue;
                }
                Err(e) => return Err(e),
            };
            on_byte(&rx);
            if rx.is_sentinel() {
                summary.closed = true;
                return Ok(summary);
            }
            summary.bytes += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{PortEvent, Register, SimulatedPort, wire_status};
    use pretty_assertions::assert_eq;
    use std::time::{Duration, Instant};

    fn link(sim: SimulatedPort) -> NibbleLink<SimulatedPort> {
        NibbleLink::new(RegisterPort::new(sim), Timing::immediate(), CancelToken::new())
    }

    /// Frames a sender writes for `byte`.
    fn frames(byte: u8) -> [u8; 4] {
        [ARM_MARKER, low_nibble(byte), high_nibble(byte), IDLE_MARKER]
    }

    #[test]
    fn test_transmit_frame_order() {
        let mut tx = link(SimulatedPort::new());
        let outcome = tx.transmit_byte(0x69).unwrap();
        assert_eq!(outcome, TransferOutcome::Delivered);
        assert_eq!(tx.port().backend().data_writes(), vec![0x10, 0x09, 0x06, 0x00]);
    }

    #[test]
    fn test_transmit_waits_for_handshake_before_high_nibble() {
        // busy, busy, released, then post-settle check
        let sim = SimulatedPort::new().queue_status([0x80, 0x80, 0x00, 0x00]);
        let mut tx = link(sim);
        tx.transmit_byte(0x48).unwrap();

        let backend = tx.port().backend();
        assert_eq!(backend.status_reads(), 4);
        let events = backend.events();
        let high_at = events
            .iter()
            .position(|e| *e == PortEvent::Write(Register::Data, 0x04))
            .unwrap();
        let release_at = events
            .iter()
            .position(|e| *e == PortEvent::Read(Register::Status, 0x00))
            .unwrap();
        assert!(release_at < high_at);
    }

    #[test]
    fn test_transmit_reports_failure_when_peer_stays_busy() {
        let sim = SimulatedPort::new().queue_status([0x00, 0x80]);
        let mut tx = link(sim);
        assert_eq!(tx.transmit_byte(b'x').unwrap(), TransferOutcome::Failed);
        // line still returns to idle
        assert_eq!(tx.port().backend().data_writes().last(), Some(&0x00));
    }

    #[test]
    fn test_transmit_stall_is_bounded() {
        let timing = Timing::immediate().with_handshake_timeout(Some(Duration::from_millis(5)));
        let sim = SimulatedPort::new().with_status(0x80);
        let mut tx = NibbleLink::new(RegisterPort::new(sim), timing, CancelToken::new());

        let err = tx.transmit_byte(b'x').unwrap_err();
        assert!(matches!(err, LinkError::StalledPeer { .. }));
        // high nibble never written; line left idle
        assert_eq!(tx.port().backend().data_writes(), vec![0x10, 0x08, 0x00]);
    }

    #[test]
    fn test_transmit_cancelled() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut tx = NibbleLink::new(RegisterPort::new(SimulatedPort::new()), Timing::immediate(), cancel);
        assert!(matches!(tx.transmit_byte(b'x'), Err(LinkError::Cancelled)));
        assert_eq!(tx.port().backend().data_writes().last(), Some(&0x00));
    }

    #[test]
    fn test_round_trip_all_nonzero_bytes() {
        // 0x00 is the close sentinel and is excluded on purpose
        for v in 1..=255u8 {
            let mut tx = link(SimulatedPort::new());
            assert!(tx.transmit_byte(v).unwrap().is_delivered());
            let written = tx.into_port().into_inner().data_writes();

            let mut rx = link(SimulatedPort::new().peer_frames(written));
            let got = rx.receive_byte().unwrap();
            assert_eq!(got.byte(), v, "byte {:#04x}", v);
            assert!(!got.is_sentinel());
        }
    }

    #[test]
    fn test_receiver_acknowledges_each_nibble() {
        let mut rx = link(SimulatedPort::new().peer_frames(frames(0x5A)));
        let got = rx.receive_byte().unwrap();
        assert_eq!(got, ReceivedByte { high: 0x5, low: 0xA });
        assert_eq!(rx.port().backend().data_writes(), vec![ARM_MARKER, IDLE_MARKER]);
    }

    #[test]
    fn test_receive_loop_stops_on_sentinel() {
        let wire: Vec<u8> = [b'H', b'i', SENTINEL].iter().flat_map(|&b| frames(b)).collect();
        let mut rx = link(SimulatedPort::new().peer_frames(wire));

        let mut got = Vec::new();
        let summary = rx.receive_loop(|b| got.push(b.byte())).unwrap();

        assert_eq!(got, vec![b'H', b'i', 0x00]);
        assert_eq!(summary, SessionSummary { bytes: 2, closed: true, stalls: 0 });
    }

    #[test]
    fn test_zero_payload_closes_session() {
        let wire: Vec<u8> = [0x00, b'A'].iter().flat_map(|&b| frames(b)).collect();
        let mut rx = link(SimulatedPort::new().peer_frames(wire));

        let mut got = Vec::new();
        let summary = rx.receive_loop(|b| got.push(b.byte())).unwrap();
        assert_eq!(got, vec![0x00]);
        assert_eq!(summary.bytes, 0);
        assert!(summary.closed);
    }

    #[test]
    fn test_idle_line_is_not_data() {
        // peer idle for a while before arming
        let mut wire = vec![IDLE_MARKER; 5];
        wire.extend(frames(0x21));
        let mut rx = link(SimulatedPort::new().peer_frames(wire));
        assert_eq!(rx.receive_byte().unwrap().byte(), 0x21);
    }

    #[test]
    fn test_stalled_mid_byte_with_timeout() {
        let timing = Timing::immediate().with_handshake_timeout(Some(Duration::from_millis(5)));
        let sim = SimulatedPort::new().with_status(0x80);
        let mut rx = NibbleLink::new(RegisterPort::new(sim), timing, CancelToken::new());
        assert!(matches!(rx.receive_byte(), Err(LinkError::StalledPeer { .. })));
        // nothing acknowledged
        assert!(rx.port().backend().data_writes().is_empty());
    }

    /// Peer lines driven by the clock for a while, then by a status script.
    struct TimedPeer {
        start: Instant,
        /// `(from, data)` steps; the last one at or before now is on the wire
        steps: Vec<(Duration, u8)>,
        /// When the script in `then` takes over
        until: Duration,
        then: SimulatedPort,
    }

    impl TimedPeer {
        fn new(steps: Vec<(Duration, u8)>, until: Duration, then: SimulatedPort) -> Self {
            Self {
                start: Instant::now(),
                steps,
                until,
                then,
            }
        }
    }

    impl PortBackend for TimedPeer {
        fn read(&mut self, reg: Register) -> u8 {
            let now = self.start.elapsed();
            if reg != Register::Status || now >= self.until {
                return self.then.read(reg);
            }
            let data = self
                .steps
                .iter()
                .take_while(|(from, _)| *from <= now)
                .last()
                .map_or(IDLE_MARKER, |&(_, data)| data);
            wire_status(data)
        }

        fn write(&mut self, reg: Register, value: u8) {
            self.then.write(reg, value);
        }
    }

    #[test]
    fn test_default_idle_poll_catches_brief_arm() {
        // idle, then the arm marker for only 2 ms, then the nibbles
        let peer = TimedPeer::new(
            vec![(Duration::ZERO, IDLE_MARKER), (Duration::from_millis(5), ARM_MARKER)],
            Duration::from_millis(7),
            SimulatedPort::new().peer_frames([low_nibble(0xC3), high_nibble(0xC3)]),
        );
        let mut rx = NibbleLink::new(RegisterPort::new(peer), Timing::default(), CancelToken::new());

        assert_eq!(rx.receive_byte().unwrap().byte(), 0xC3);
        let acks = rx.into_port().into_inner().then.data_writes();
        assert_eq!(acks, vec![ARM_MARKER, IDLE_MARKER]);
    }

    #[test]
    fn test_receive_loop_survives_stall() {
        // armed and held for 100 ms, well past the 5 ms bound, then a
        // complete sentinel; the extra arm frame covers a stall landing on
        // the hand-over read
        let peer = TimedPeer::new(
            vec![(Duration::ZERO, ARM_MARKER)],
            Duration::from_millis(100),
            SimulatedPort::new()
                .peer_frames([ARM_MARKER])
                .peer_frames(frames(SENTINEL)),
        );
        let timing = Timing::immediate().with_handshake_timeout(Some(Duration::from_millis(5)));
        let mut rx = NibbleLink::new(RegisterPort::new(peer), timing, CancelToken::new());

        let mut got = Vec::new();
        let summary = rx.receive_loop(|b| got.push(b.byte())).unwrap();

        assert_eq!(got, vec![SENTINEL]);
        assert!(summary.closed);
        assert!(summary.stalls >= 1, "summary {:?}", summary);
        // nothing acknowledged for the dropped bytes
        let acks = rx.into_port().into_inner().then.data_writes();
        assert_eq!(acks, vec![ARM_MARKER, IDLE_MARKER]);
    }
}
