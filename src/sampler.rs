//! Destuffing frame sampler for the receive path.
//!
//! [`FrameSampler`] consumes one mid-bit line sample per call and
//! reconstructs the logical bit sequence of a frame: it detects SOF on
//! an idle bus, strips stuff bits, flags stuff-rule violations and
//! recognises both ends a frame can have — the completion of the CRC
//! field (known as soon as the DLC is in) and the seven-recessive-bit
//! EOF fallback for truncated traffic.
//!
//! The sampler is purely combinational per sample; scheduling and the
//! decode/acknowledge sequence live in [`crate::driver`].

use heapless::Vec;

use crate::consts::{CRC_BITS, DLC_OFFSET, HEADER_BITS, MAX_DATA_LEN, RX_BUF_BITS, STUFF_RUN};
use crate::driver::CanError;
use crate::encoding::bits_msb;

/// Receiver sub-state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RxPhase {
    /// Bus idle; waiting for a dominant SOF.
    Idle,
    /// SOF seen; the next sample is the first identifier bit.
    Sof,
    /// Accumulating destuffed frame bits.
    Frame,
}

/// What a single sample did to the frame in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SampleOutcome {
    /// Nothing to report yet.
    Pending,
    /// The CRC field is complete; decode and acknowledge now.
    FrameComplete,
    /// Seven consecutive recessive bits: the frame ended at the last
    /// accumulated bit.
    Eof,
    /// Stuff violation or buffer overflow.
    Error(CanError),
}

/// Logical-bit accumulator fed one line sample per bit period.
#[derive(Debug)]
pub(crate) struct FrameSampler {
    phase: RxPhase,
    bits: Vec<bool, RX_BUF_BITS>,
    last: bool,
    run: u8,
    /// Total logical length once the DLC field fixes it.
    expected: Option<usize>,
}

impl FrameSampler {
    pub(crate) fn new() -> Self {
        FrameSampler {
            phase: RxPhase::Idle,
            bits: Vec::new(),
            last: true,
            run: 0,
            expected: None,
        }
    }

    /// The destuffed logical bits accumulated so far.
    pub(crate) fn bits(&self) -> &[bool] {
        &self.bits
    }

    /// Returns to Idle, dropping any frame in progress.
    pub(crate) fn reset(&mut self) {
        self.phase = RxPhase::Idle;
        self.bits.clear();
        self.last = true;
        self.run = 0;
        self.expected = None;
    }

    /// Feeds one sampled bit (`true` = recessive).
    pub(crate) fn sample(&mut self, bit: bool) -> SampleOutcome {
        match self.phase {
            RxPhase::Idle => {
                if !bit {
                    // dominant on an idle bus is SOF; it opens the stuff run
                    self.phase = RxPhase::Sof;
                    self.bits.clear();
                    self.last = false;
                    self.run = 1;
                    self.expected = None;
                }
                SampleOutcome::Pending
            }
            RxPhase::Sof => {
                self.phase = RxPhase::Frame;
                self.frame_bit(bit)
            }
            RxPhase::Frame => self.frame_bit(bit),
        }
    }

    fn frame_bit(&mut self, bit: bool) -> SampleOutcome {
        if self.run > STUFF_RUN {
            // six identical recessive bits already seen; only the
            // seventh of a forming EOF is legal here
            if bit {
                return SampleOutcome::Eof;
            }
            return SampleOutcome::Error(CanError::Stuff);
        }
        if self.run == STUFF_RUN {
            // the previous bit completed a run of five, so this one is
            // the stuff bit: discard it and restart the run
            if bit != self.last {
                self.last = bit;
                self.run = 1;
                return SampleOutcome::Pending;
            }
            if bit {
                // a sixth recessive bit may still turn out to be EOF
                self.run += 1;
                return SampleOutcome::Pending;
            }
            return SampleOutcome::Error(CanError::Stuff);
        }

        if bit == self.last {
            self.run += 1;
        } else {
            self.last = bit;
            self.run = 1;
        }
        if self.bits.push(bit).is_err() {
            return SampleOutcome::Error(CanError::Overrun);
        }

        if self.bits.len() == HEADER_BITS {
            let dlc = bits_msb(&self.bits[DLC_OFFSET..HEADER_BITS]).min(u16::from(MAX_DATA_LEN));
            self.expected = Some(HEADER_BITS + 8 * dlc as usize + CRC_BITS);
        }
        if self.expected == Some(self.bits.len()) {
            return SampleOutcome::FrameComplete;
        }
        SampleOutcome::Pending
    }
}
