//! The CAN node itself: blocking transmit, non-blocking receive.
//!
//! [`CanNode`] bit-bangs standard CAN 2.0A data frames over two GPIO
//! lines using only the four primitives the host supplies: the TX
//! output, the RX input, a blocking microsecond delay and a monotonic
//! microsecond [`Clock`].
//!
//! The transmit path blocks for the duration of one frame (worst case
//! about 135 bit times) and monitors the bus bit by bit for
//! arbitration. The receive path is a cadence-driven state machine:
//! every call to [`read_frame`](CanNode::read_frame) takes at most one
//! line sample, so the host must poll it at least at the bit rate.
//! Send and read share the pins and must be serialised by the host.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use thiserror::Error;

use crate::consts::EOF_RUN;
use crate::encoding::{StuffRun, append_crc, decode_frame, frame_bits};
use crate::fault::{FaultCounters, NodeState};
use crate::frame::CanFrame;
use crate::line::BusLine;
use crate::sampler::{FrameSampler, SampleOutcome};
use crate::timer::{Clock, bit_time_us};

/// Everything that can go wrong while driving or sampling the bus.
///
/// Errors only ever surface through the return value of the operation
/// that provoked them; there is no out-of-band reporting. DLC values
/// above 8 are clamped silently and are deliberately absent here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum CanError {
    /// The node is Bus-Off; re-initialise via [`CanNode::begin`].
    #[error("node is bus-off")]
    BusOff,
    /// Another node won the bus with a higher-priority frame. Not a
    /// fault; the counters stay untouched.
    #[error("lost arbitration to a higher-priority frame")]
    ArbitrationLost,
    /// The ACK slot stayed recessive: no receiver saw the frame.
    #[error("no receiver acknowledged the frame")]
    NoAck,
    /// More than five consecutive bits of one polarity inside the
    /// stuffed region.
    #[error("bit stuffing rule violated")]
    Stuff,
    /// The received bit sequence cannot hold a whole frame.
    #[error("malformed or truncated frame")]
    Form,
    /// The received CRC sequence does not match the frame.
    #[error("crc mismatch")]
    Crc,
    /// The receiver's logical bit buffer overflowed.
    #[error("receive bit buffer overflowed")]
    Overrun,
}

impl embedded_can::Error for CanError {
    fn kind(&self) -> embedded_can::ErrorKind {
        match self {
            CanError::NoAck => embedded_can::ErrorKind::Acknowledge,
            CanError::Stuff => embedded_can::ErrorKind::Stuff,
            CanError::Form => embedded_can::ErrorKind::Form,
            CanError::Crc => embedded_can::ErrorKind::Crc,
            CanError::Overrun => embedded_can::ErrorKind::Overrun,
            CanError::BusOff | CanError::ArbitrationLost => embedded_can::ErrorKind::Other,
        }
    }
}

/// Outcome of a single [`CanNode::read_frame`] poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    /// Nothing new on the bus (or the next sample is not due yet).
    NoMessage,
    /// A frame arrived intact and was acknowledged.
    Message(CanFrame),
    /// A frame ended broken; the receive error counter went up.
    FrameError(CanError),
}

/// A software CAN 2.0A node over two GPIO lines.
///
/// Create it with the host's pins and timing primitives, then
/// configure it once via [`begin`](CanNode::begin) before use. The
/// node owns its pins and all protocol state; reclaim the resources
/// with [`free`](CanNode::free).
#[derive(Debug)]
pub struct CanNode<TX, RX, D, C>
where
    TX: OutputPin,
    RX: InputPin,
    D: DelayNs,
    C: Clock,
{
    pub(crate) line: BusLine<TX, RX>,
    pub(crate) fault: FaultCounters,
    sampler: FrameSampler,
    delay: D,
    clock: C,
    bit_time_us: u32,
    last_sample_us: u64,
}

impl<TX, RX, D, C> CanNode<TX, RX, D, C>
where
    TX: OutputPin,
    RX: InputPin,
    D: DelayNs,
    C: Clock,
{
    /// Creates a node over the given RX and TX pins.
    ///
    /// The node is inert until [`begin`](CanNode::begin) has run.
    pub fn new(rx: RX, tx: TX, delay: D, clock: C) -> Self {
        CanNode {
            line: BusLine::new(tx, rx),
            fault: FaultCounters::new(),
            sampler: FrameSampler::new(),
            delay,
            clock,
            bit_time_us: 0,
            last_sample_us: 0,
        }
    }

    /// Configures the node for `baudrate` bits per second and idles
    /// the bus recessive.
    ///
    /// Also the recovery path from Bus-Off: both error counters are
    /// zeroed and the state returns to Error-Active.
    pub fn begin(&mut self, baudrate: u32) {
        self.bit_time_us = bit_time_us(baudrate);
        self.line.drive_recessive();
        self.sampler.reset();
        self.fault.reset();
        self.last_sample_us = self.clock.now_us();
    }

    /// Current Transmit Error Counter.
    pub fn tec(&self) -> u16 {
        self.fault.tec()
    }

    /// Current Receive Error Counter.
    pub fn rec(&self) -> u16 {
        self.fault.rec()
    }

    /// Current fault-confinement state.
    pub fn state(&self) -> NodeState {
        self.fault.state()
    }

    /// Releases the pins and timing primitives.
    pub fn free(self) -> (TX, RX, D, C) {
        (self.line.tx, self.line.rx, self.delay, self.clock)
    }

    /// Drives `frame` onto the bus and waits for acknowledgement.
    ///
    /// Blocks for the whole frame. Returns `Ok(())` iff the frame was
    /// fully driven and some receiver pulled the ACK slot dominant.
    /// A DLC above 8 is clamped to 8 on the wire.
    ///
    /// Arbitration is monitored from the first identifier bit through
    /// the end of the data field: whenever the node drives recessive
    /// but reads the bus dominant, it stops driving and reports
    /// [`CanError::ArbitrationLost`] without scoring a transmit error.
    /// A recessive ACK slot scores TEC += 8 and reports
    /// [`CanError::NoAck`].
    pub fn send_frame(&mut self, frame: &CanFrame) -> Result<(), CanError> {
        if self.fault.state() == NodeState::BusOff {
            return Err(CanError::BusOff);
        }

        let mut bits = frame_bits(frame);
        let data_end = bits.len();
        append_crc(&mut bits);

        // SOF opens both the frame and the stuff run
        self.line.drive_dominant();
        self.delay.delay_us(self.bit_time_us);
        let mut run = StuffRun::after_sof();

        for (idx, &bit) in bits.iter().enumerate() {
            let monitored = idx < data_end;
            self.drive_bit(bit, monitored)?;
            // no stuff bit after the final CRC bit: the stuffable
            // region ends with the CRC field
            if run.advance(bit) && idx + 1 < bits.len() {
                let stuff = run.stuff_bit();
                self.drive_bit(stuff, monitored)?;
            }
        }

        // CRC delimiter
        self.drive_bit(true, false)?;

        // ACK slot: hand the bus over for exactly one bit time and
        // restore the output before taking any exit
        self.line.release();
        let half = self.bit_time_us / 2;
        self.delay.delay_us(half);
        let acked = !self.line.sample();
        self.delay.delay_us(self.bit_time_us - half);
        self.line.drive_recessive();

        if !acked {
            self.fault.on_tx_failure();
            return Err(CanError::NoAck);
        }

        // ACK delimiter, then EOF
        self.drive_bit(true, false)?;
        for _ in 0..EOF_RUN {
            self.drive_bit(true, false)?;
        }
        self.fault.on_tx_success();
        Ok(())
    }

    /// Polls the bus for one bit period's worth of progress.
    ///
    /// Non-blocking except when a frame just completed with a valid
    /// CRC, in which case the call stays busy through the CRC
    /// delimiter and drives the ACK slot dominant before returning the
    /// frame. Call at least as often as the bit rate; a slower host
    /// desynchronises the sampler.
    ///
    /// In Bus-Off this returns [`ReadResult::NoMessage`] without
    /// touching the bus.
    pub fn read_frame(&mut self) -> ReadResult {
        if self.fault.state() == NodeState::BusOff {
            return ReadResult::NoMessage;
        }

        let now = self.clock.now_us();
        if now.saturating_sub(self.last_sample_us) < u64::from(self.bit_time_us) {
            return ReadResult::NoMessage;
        }
        // advance additively rather than to `now`: this keeps the
        // sampling cadence phase-locked to the SOF it derived from
        self.last_sample_us += u64::from(self.bit_time_us);

        let bit = self.line.sample();
        match self.sampler.sample(bit) {
            SampleOutcome::Pending => ReadResult::NoMessage,
            SampleOutcome::FrameComplete => {
                let decoded = decode_frame(self.sampler.bits());
                self.sampler.reset();
                match decoded {
                    Ok(frame) => {
                        self.drive_ack();
                        self.fault.on_rx_success();
                        // the ACK path blocked for a few bit times;
                        // rearm instead of burning catch-up samples on
                        // the EOF tail
                        self.last_sample_us = self.clock.now_us();
                        ReadResult::Message(frame)
                    }
                    Err(err) => self.receive_error(err),
                }
            }
            SampleOutcome::Eof => {
                // fallback end for truncated traffic; a healthy frame
                // never gets here, so there is nothing left to ACK
                let decoded = decode_frame(self.sampler.bits());
                self.sampler.reset();
                match decoded {
                    Ok(frame) => {
                        self.fault.on_rx_success();
                        ReadResult::Message(frame)
                    }
                    Err(err) => self.receive_error(err),
                }
            }
            SampleOutcome::Error(err) => {
                self.sampler.reset();
                self.receive_error(err)
            }
        }
    }

    /// Drives one bit for a full bit time, checking arbitration on
    /// monitored recessive bits at the end of the period.
    fn drive_bit(&mut self, bit: bool, monitored: bool) -> Result<(), CanError> {
        if bit {
            self.line.drive_recessive();
        } else {
            self.line.drive_dominant();
        }
        self.delay.delay_us(self.bit_time_us);
        if monitored && bit && !self.line.sample() {
            // somebody else is still driving; stop contending
            self.line.drive_recessive();
            return Err(CanError::ArbitrationLost);
        }
        Ok(())
    }

    /// Pulls the ACK slot dominant for one bit time.
    ///
    /// Entered right after the mid-bit sample of the final CRC bit:
    /// ride out its second half plus the CRC delimiter, then own the
    /// slot. The transmitter samples mid-slot, so this window covers
    /// it for any SOF-relative sampling phase.
    fn drive_ack(&mut self) {
        let half = self.bit_time_us / 2;
        self.delay.delay_us(half + self.bit_time_us);
        self.line.drive_dominant();
        self.delay.delay_us(self.bit_time_us);
        self.line.release();
    }

    fn receive_error(&mut self, err: CanError) -> ReadResult {
        #[cfg(feature = "log")]
        log::trace!("receive failed: {}", err);
        self.fault.on_rx_failure();
        ReadResult::FrameError(err)
    }
}

impl<TX, RX, D, C> embedded_can::nb::Can for CanNode<TX, RX, D, C>
where
    TX: OutputPin,
    RX: InputPin,
    D: DelayNs,
    C: Clock,
{
    type Frame = CanFrame;
    type Error = CanError;

    fn transmit(&mut self, frame: &Self::Frame) -> nb::Result<Option<Self::Frame>, Self::Error> {
        self.send_frame(frame).map_err(nb::Error::Other)?;
        Ok(None)
    }

    fn receive(&mut self) -> nb::Result<Self::Frame, Self::Error> {
        match self.read_frame() {
            ReadResult::Message(frame) => Ok(frame),
            ReadResult::NoMessage => Err(nb::Error::WouldBlock),
            ReadResult::FrameError(err) => Err(nb::Error::Other(err)),
        }
    }
}
