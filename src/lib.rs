//! # softcan
//!
//! A portable, no_std software CAN 2.0A node that bit-bangs standard
//! 11-bit-identifier data frames over two digital I/O lines, with no
//! dedicated CAN controller.
//!
//! The driver implements the bus protocol entirely in software:
//! - NRZ bit encoding with bit stuffing and CRC-15
//! - bit-by-bit arbitration monitoring and the ACK handshake on the
//!   transmit path
//! - a non-blocking, cadence-driven receive state machine that
//!   destuffs, delimits frames, verifies the CRC and acknowledges
//! - TEC/REC fault confinement moving the node between Error-Active,
//!   Error-Passive and Bus-Off
//!
//! ## Host contract
//!
//! The node consumes exactly four primitives:
//!
//! | Primitive | Trait |
//! |-----------|-------|
//! | TX line (open-drain: low = dominant, high = recessive) | [`embedded_hal::digital::OutputPin`] |
//! | RX line (input with pull-up) | [`embedded_hal::digital::InputPin`] |
//! | blocking microsecond delay | [`embedded_hal::delay::DelayNs`] |
//! | monotonic microsecond clock | [`Clock`] |
//!
//! ## Crate features
//!
//! | Feature | Description |
//! |-----------|-------------|
//! | `std` | Disables `#![no_std]`; used by the test build |
//! | `defmt-0-3` | Derives `defmt::Format` on the public enums |
//! | `log` | Emits `log` records at state transitions and error paths |
//!
//! ## Usage
//!
//! ```rust
//! use embedded_can::Frame;
//! use softcan::{CanFrame, CanNode, Clock, ReadResult};
//! # use embedded_hal_mock::eh1::delay::NoopDelay as Delay;
//! # use embedded_hal_mock::eh1::digital::{Mock as Pin, State as PinState, Transaction as PinTransaction};
//!
//! /// Wraps the target's free-running microsecond counter.
//! struct Micros(u64);
//!
//! impl Clock for Micros {
//!     fn now_us(&mut self) -> u64 {
//!         self.0 += 8; // stand-in for e.g. a micros() register read
//!         self.0
//!     }
//! }
//!
//! # let tx = Pin::new(&[PinTransaction::set(PinState::High)]);
//! # let rx = Pin::new(&[PinTransaction::get(PinState::High)]);
//! let mut node = CanNode::new(rx, tx, Delay::new(), Micros(0));
//! node.begin(125_000);
//!
//! let frame = CanFrame::new(embedded_can::StandardId::ZERO, &[0x42]).unwrap();
//! assert_eq!(frame.dlc(), 1);
//! // node.send_frame(&frame) blocks for one frame time when called
//!
//! // poll at least at the bit rate from the host main loop
//! match node.read_frame() {
//!     ReadResult::Message(_received) => { /* hand it to the application */ }
//!     ReadResult::FrameError(_) | ReadResult::NoMessage => {}
//! }
//! # let (mut tx, mut rx, _, _) = node.free();
//! # tx.done();
//! # rx.done();
//! ```
//!
//! ## Integration notes
//!
//! - `read_frame` takes at most one line sample per call; the host
//!   must call it at least at the bit rate or the sampler loses the
//!   frame.
//! - `send_frame` and `read_frame` share the bus pins and must never
//!   be interleaved.
//! - Timing is best effort above 125 kbit/s; see [`timer`].
//!
//! --
//! Designed for `#![no_std]` use in resource-constrained embedded
//! environments.

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(feature = "std"), no_std)]

pub mod consts;
mod crc;
mod driver;
mod encoding;
mod fault;
mod frame;
mod line;
mod sampler;
pub mod timer;

pub use driver::{CanError, CanNode, ReadResult};
pub use fault::NodeState;
pub use frame::CanFrame;
pub use timer::Clock;

#[cfg(all(test, feature = "std"))]
mod tests {
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    use core::convert::Infallible;

    use embedded_can::{Frame, StandardId};
    use embedded_hal::digital::{self, InputPin, OutputPin};
    use embedded_hal_mock::eh1::delay::NoopDelay;

    use crate::consts::{DLC_OFFSET, HEADER_BITS};
    use crate::{CanError, CanFrame, CanNode, Clock, NodeState, ReadResult};

    /// Input pin fed from a scripted sample queue; reads recessive
    /// once the script runs out.
    #[derive(Clone, Debug, Default)]
    struct ScriptPin(Rc<RefCell<VecDeque<bool>>>);

    impl ScriptPin {
        fn feed(&self, levels: &[bool]) {
            self.0.borrow_mut().extend(levels.iter().copied());
        }
    }

    impl digital::ErrorType for ScriptPin {
        type Error = Infallible;
    }

    impl InputPin for ScriptPin {
        fn is_high(&mut self) -> Result<bool, Self::Error> {
            Ok(self.0.borrow_mut().pop_front().unwrap_or(true))
        }

        fn is_low(&mut self) -> Result<bool, Self::Error> {
            self.is_high().map(|level| !level)
        }
    }

    /// Output pin recording every level driven onto it, one entry per
    /// driven bit.
    #[derive(Clone, Debug, Default)]
    struct RecordPin(Rc<RefCell<Vec<bool>>>);

    impl RecordPin {
        fn levels(&self) -> Vec<bool> {
            self.0.borrow().clone()
        }
    }

    impl digital::ErrorType for RecordPin {
        type Error = Infallible;
    }

    impl OutputPin for RecordPin {
        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().push(true);
            Ok(())
        }

        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.0.borrow_mut().push(false);
            Ok(())
        }
    }

    /// Monotonic clock gaining one bit period per query, so every
    /// `read_frame` call is due for a sample.
    #[derive(Debug)]
    struct StepClock {
        now: u64,
        step: u64,
    }

    impl Clock for StepClock {
        fn now_us(&mut self) -> u64 {
            self.now += self.step;
            self.now
        }
    }

    type SimNode = CanNode<RecordPin, ScriptPin, NoopDelay, StepClock>;

    /// A node at 125 kbit/s over a recording TX pin and a scripted RX
    /// pin.
    fn sim_node() -> (SimNode, RecordPin, ScriptPin) {
        let tx = RecordPin::default();
        let rx = ScriptPin::default();
        let mut node = CanNode::new(
            rx.clone(),
            tx.clone(),
            NoopDelay::new(),
            StepClock { now: 0, step: 8 },
        );
        node.begin(125_000);
        (node, tx, rx)
    }

    /// Feeds a recorded wire stream into `node` until it reports
    /// something other than `NoMessage`.
    fn receive_wire(node: &mut SimNode, rx: &ScriptPin, wire: &[bool]) -> ReadResult {
        rx.feed(wire);
        for _ in 0..wire.len() + 16 {
            match node.read_frame() {
                ReadResult::NoMessage => {}
                outcome => return outcome,
            }
        }
        ReadResult::NoMessage
    }

    #[test]
    fn test_wire_round_trip() {
        let (mut sender, sender_tx, _sender_rx) = sim_node();
        let frame =
            CanFrame::new(StandardId::new(0x123).unwrap(), &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();

        // nobody on the simulated bus acknowledges, so the send itself
        // reports NoAck and scores a transmit error
        assert_eq!(sender.send_frame(&frame), Err(CanError::NoAck));
        assert_eq!(sender.tec(), 8);
        assert_eq!(sender.state(), NodeState::ErrorActive);

        let (mut receiver, receiver_tx, receiver_rx) = sim_node();
        let wire = sender_tx.levels();
        match receive_wire(&mut receiver, &receiver_rx, &wire) {
            ReadResult::Message(received) => {
                assert_eq!(received, frame);
                assert_eq!(received.wire_dlc(), 4);
                assert_eq!(received.data(), &[0xDE, 0xAD, 0xBE, 0xEF]);
            }
            outcome => panic!("expected a frame, got {outcome:?}"),
        }
        assert_eq!(receiver.rec(), 0);
        // the receiver pulled the ACK slot dominant
        assert!(receiver_tx.levels().contains(&false));
    }

    #[test]
    fn test_wire_never_carries_six_identical_bits_in_the_stuffed_region() {
        let (mut sender, sender_tx, _sender_rx) = sim_node();
        let frame = CanFrame::new(StandardId::new(0x00F).unwrap(), &[0xFF, 0x00, 0xFF]).unwrap();
        assert_eq!(sender.send_frame(&frame), Err(CanError::NoAck));

        let wire = sender_tx.levels();
        // wire[0] is the begin() idle level; the last three entries
        // (CRC delimiter, ACK release, post-slot restore) lie beyond
        // the stuffable region
        let stuffed = &wire[1..wire.len() - 3];
        let mut longest = 1;
        let mut run = 1;
        for window in stuffed.windows(2) {
            run = if window[0] == window[1] { run + 1 } else { 1 };
            longest = longest.max(run);
        }
        assert!(longest <= 5, "run of {longest} identical bits on the wire");
    }

    #[test]
    fn test_send_is_acknowledged() {
        let (mut sender, sender_tx, sender_rx) = sim_node();
        // id 0 / dlc 0 keeps every driven header bit dominant, so the
        // only monitored samples are the three recessive stuff bits;
        // the fourth scripted level is the dominant ACK
        sender_rx.feed(&[true, true, true, false]);

        let frame = CanFrame::new(StandardId::ZERO, &[]).unwrap();
        assert_eq!(sender.send_frame(&frame), Ok(()));
        assert_eq!(sender.tec(), 0);
        assert_eq!(sender.state(), NodeState::ErrorActive);

        let wire = sender_tx.levels();
        // idle + SOF + 33 logical bits + 6 stuff bits + CRC delimiter
        // + ACK release + restore + ACK delimiter + 7 EOF bits
        assert_eq!(wire.len(), 52);
        // everything after the ACK slot stays recessive
        assert!(wire[wire.len() - 8..].iter().all(|&level| level));
    }

    #[test]
    fn test_arbitration_loss_aborts_without_penalty() {
        let (mut sender, sender_tx, sender_rx) = sim_node();
        // the bus reads dominant while the second identifier bit is
        // driven recessive
        sender_rx.feed(&[false]);

        let frame = CanFrame::new(StandardId::new(0x200).unwrap(), &[]).unwrap();
        assert_eq!(sender.send_frame(&frame), Err(CanError::ArbitrationLost));
        assert_eq!(sender.tec(), 0);
        assert_eq!(sender.state(), NodeState::ErrorActive);

        // idle, SOF, first id bit, the lost recessive bit, then the
        // line is let go
        assert_eq!(sender_tx.levels(), vec![true, false, false, true, true]);
    }

    #[test]
    fn test_corrupted_bit_fails_crc_and_scores_rec() {
        let (mut sender, sender_tx, _sender_rx) = sim_node();
        let frame =
            CanFrame::new(StandardId::new(0x123).unwrap(), &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        assert_eq!(sender.send_frame(&frame), Err(CanError::NoAck));

        let mut wire = sender_tx.levels();
        // flip one data bit on the wire
        wire[25] = !wire[25];

        let (mut receiver, receiver_tx, receiver_rx) = sim_node();
        assert_eq!(
            receive_wire(&mut receiver, &receiver_rx, &wire),
            ReadResult::FrameError(CanError::Crc)
        );
        assert_eq!(receiver.rec(), 1);
        // no ACK left the node: nothing beyond the begin() idle level
        assert_eq!(receiver_tx.levels(), vec![true]);
    }

    #[test]
    fn test_dlc_above_eight_is_clamped_end_to_end() {
        let frame = CanFrame::from_parts(
            StandardId::new(0x100).unwrap(),
            12,
            [1, 2, 3, 4, 5, 6, 7, 8],
        );
        // the wire DLC field advertises 8
        let bits = crate::encoding::frame_bits(&frame);
        assert_eq!(&bits[DLC_OFFSET..HEADER_BITS], &[true, false, false, false]);
        assert_eq!(bits.len(), HEADER_BITS + 64);

        let (mut sender, sender_tx, _sender_rx) = sim_node();
        assert_eq!(sender.send_frame(&frame), Err(CanError::NoAck));

        let (mut receiver, _receiver_tx, receiver_rx) = sim_node();
        match receive_wire(&mut receiver, &receiver_rx, &sender_tx.levels()) {
            ReadResult::Message(received) => {
                assert_eq!(received.wire_dlc(), 8);
                assert_eq!(received.data(), &[1, 2, 3, 4, 5, 6, 7, 8]);
            }
            outcome => panic!("expected a frame, got {outcome:?}"),
        }
    }

    #[test]
    fn test_bus_off_silences_the_node() {
        let (mut node, tx, _rx) = sim_node();
        node.fault.force(256, 0);
        assert_eq!(node.state(), NodeState::BusOff);

        let frame = CanFrame::new(StandardId::new(0x7FF).unwrap(), &[0x01]).unwrap();
        assert_eq!(node.send_frame(&frame), Err(CanError::BusOff));
        for _ in 0..64 {
            assert_eq!(node.read_frame(), ReadResult::NoMessage);
        }
        // nothing after the begin() idle level ever reached the bus
        assert_eq!(tx.levels(), vec![true]);
    }

    #[test]
    fn test_begin_recovers_from_bus_off() {
        let (mut node, _tx, _rx) = sim_node();
        node.fault.force(256, 3);
        assert_eq!(node.state(), NodeState::BusOff);

        node.begin(125_000);
        assert_eq!(node.state(), NodeState::ErrorActive);
        assert_eq!(node.tec(), 0);
        assert_eq!(node.rec(), 0);
    }

    #[test]
    fn test_idle_bus_reads_nothing() {
        let (mut node, _tx, _rx) = sim_node();
        // 10 ms of recessive bus at 8 us per bit
        for _ in 0..1250 {
            assert_eq!(node.read_frame(), ReadResult::NoMessage);
        }
        assert_eq!(node.rec(), 0);
        assert_eq!(node.state(), NodeState::ErrorActive);
    }
}
