//! Logical bit-level encoding of CAN 2.0A base frames.
//!
//! This module converts between [`CanFrame`]s and the *logical*
//! (pre-stuff) bit sequence a frame occupies on the wire between SOF
//! and the end of the CRC field:
//!
//! 11 identifier bits MSB first, RTR (0), IDE (0), r0 (0), 4 DLC bits
//! MSB first, `8 * DLC` data bits MSB first per byte, 15 CRC bits MSB
//! first. SOF is not part of the sequence; it is always dominant and
//! cannot advance the CRC register (see [`crate::crc`]).
//!
//! [`StuffRun`] tracks the consecutive-polarity run the transmitter
//! uses to insert stuff bits; destuffing on the receive side lives in
//! [`crate::sampler`].

use embedded_can::StandardId;
use heapless::Vec;

use crate::consts::{
    CRC_BITS, DLC_BITS, DLC_OFFSET, HEADER_BITS, ID_BITS, MAX_DATA_LEN, MAX_FRAME_BITS,
    MIN_FRAME_BITS, STUFF_RUN,
};
use crate::crc::crc15;
use crate::driver::CanError;
use crate::frame::CanFrame;

/// Logical bit sequence of a single frame, `true` = recessive.
pub(crate) type BitBuf = Vec<bool, MAX_FRAME_BITS>;

/// Appends the low `width` bits of `value`, most significant first.
fn push_bits_msb(bits: &mut BitBuf, value: u16, width: usize) {
    for shift in (0..width).rev() {
        // capacity is sized for the longest possible frame
        let _ = bits.push((value >> shift) & 1 != 0);
    }
}

/// Folds a logical bit slice into an integer, first bit most
/// significant.
pub(crate) fn bits_msb(bits: &[bool]) -> u16 {
    bits.iter().fold(0, |acc, &bit| (acc << 1) | u16::from(bit))
}

/// Builds the logical header + data sequence for `frame`.
///
/// The DLC is clamped to 8 here, so a host-supplied `dlc` of e.g. 15
/// serialises as `1000` with exactly 8 data bytes.
pub(crate) fn frame_bits(frame: &CanFrame) -> BitBuf {
    let mut bits = BitBuf::new();
    push_bits_msb(&mut bits, frame.id.as_raw(), ID_BITS);
    // RTR, IDE, r0: all dominant for a standard data frame
    push_bits_msb(&mut bits, 0, 3);
    let dlc = frame.wire_dlc();
    push_bits_msb(&mut bits, u16::from(dlc), DLC_BITS);
    for &byte in &frame.data[..dlc as usize] {
        push_bits_msb(&mut bits, u16::from(byte), 8);
    }
    bits
}

/// Computes CRC-15 over the sequence built so far and appends it.
pub(crate) fn append_crc(bits: &mut BitBuf) {
    let crc = crc15(bits);
    push_bits_msb(bits, crc, CRC_BITS);
}

/// Consecutive-polarity run tracker for the transmit path.
///
/// The run opens on SOF and covers everything through the end of the
/// CRC field; a stuff bit restarts it with length one of the opposite
/// polarity.
#[derive(Debug)]
pub(crate) struct StuffRun {
    last: bool,
    run: u8,
}

impl StuffRun {
    /// A run of length one against the dominant SOF bit.
    pub(crate) fn after_sof() -> Self {
        StuffRun {
            last: false,
            run: 1,
        }
    }

    /// Accounts for a driven bit; returns `true` when it completed a
    /// run of five and a stuff bit must follow.
    pub(crate) fn advance(&mut self, bit: bool) -> bool {
        if bit == self.last {
            self.run += 1;
        } else {
            self.last = bit;
            self.run = 1;
        }
        self.run == STUFF_RUN
    }

    /// The stuff bit that breaks the current run; restarts the run on
    /// its polarity.
    pub(crate) fn stuff_bit(&mut self) -> bool {
        let stuff = !self.last;
        self.last = stuff;
        self.run = 1;
        stuff
    }
}

/// Decodes an accumulated logical bit buffer back into a frame.
///
/// `bits` is everything the receiver collected after SOF, destuffed;
/// trailing bits beyond the CRC field (delimiters, EOF) are ignored.
/// The RTR, IDE and r0 positions are carried but not interpreted. A
/// received DLC above 8 is clamped without raising an error.
pub(crate) fn decode_frame(bits: &[bool]) -> Result<CanFrame, CanError> {
    if bits.len() < MIN_FRAME_BITS {
        return Err(CanError::Form);
    }

    let id = bits_msb(&bits[..ID_BITS]);
    let dlc_raw = bits_msb(&bits[DLC_OFFSET..HEADER_BITS]) as u8;
    let dlc = dlc_raw.min(MAX_DATA_LEN);

    let data_end = HEADER_BITS + 8 * dlc as usize;
    let total = data_end + CRC_BITS;
    if bits.len() < total {
        return Err(CanError::Form);
    }

    let mut data = [0u8; 8];
    for (byte, chunk) in data.iter_mut().zip(bits[HEADER_BITS..data_end].chunks(8)) {
        *byte = bits_msb(chunk) as u8;
    }

    let received_crc = bits_msb(&bits[data_end..total]);
    if crc15(&bits[..data_end]) != received_crc {
        return Err(CanError::Crc);
    }

    // SAFETY:
    // eleven bits cannot exceed StandardId::MAX
    let id = unsafe { StandardId::new_unchecked(id) };
    Ok(CanFrame::from_parts(id, dlc, data))
}
