//! The standard CAN 2.0A data frame as seen by the host.
//!
//! A [`CanFrame`] carries only the identifier, the Data Length Code and
//! the payload. CRC, stuff and delimiter bits are protocol level and
//! never surface here.

use core::fmt::Debug;

use embedded_can::{Frame, Id, StandardId};

use crate::consts::MAX_DATA_LEN;

/// A CAN 2.0A base frame: 11 bit identifier, up to 8 data bytes.
///
/// The stored DLC may exceed 8 (the host may hand over any value); it
/// is clamped to 8 wherever it reaches the wire, see
/// [`wire_dlc`](CanFrame::wire_dlc). Construct frames through
/// [`embedded_can::Frame::new`] or [`CanFrame::from_parts`].
#[derive(Clone, Copy)]
pub struct CanFrame {
    pub(crate) id: StandardId,
    pub(crate) dlc: u8,
    pub(crate) data: [u8; 8],
}

impl CanFrame {
    /// Builds a frame from raw parts without clamping the DLC.
    ///
    /// Only the first [`wire_dlc`](CanFrame::wire_dlc) bytes of `data`
    /// are significant.
    pub fn from_parts(id: StandardId, dlc: u8, data: [u8; 8]) -> Self {
        CanFrame { id, dlc, data }
    }

    /// The DLC as it is advertised on the wire, clamped to 8.
    pub fn wire_dlc(&self) -> u8 {
        self.dlc.min(MAX_DATA_LEN)
    }
}

impl Frame for CanFrame {
    fn new(id: impl Into<Id>, data: &[u8]) -> Option<Self> {
        // 29 bit identifiers are not part of this driver's contract
        let Id::Standard(id) = id.into() else {
            return None;
        };
        if data.len() > MAX_DATA_LEN as usize {
            return None;
        }

        let mut frame = CanFrame {
            id,
            dlc: data.len() as u8,
            data: [0; 8],
        };
        frame.data[..data.len()].copy_from_slice(data);
        Some(frame)
    }

    fn new_remote(_id: impl Into<Id>, _dlc: usize) -> Option<Self> {
        // remote frames are unsupported beyond the always-dominant RTR bit
        None
    }

    #[inline]
    fn is_extended(&self) -> bool {
        false
    }

    #[inline]
    fn is_remote_frame(&self) -> bool {
        false
    }

    fn id(&self) -> Id {
        Id::Standard(self.id)
    }

    #[inline]
    fn dlc(&self) -> usize {
        self.wire_dlc() as usize
    }

    #[inline]
    fn data(&self) -> &[u8] {
        &self.data[..self.wire_dlc() as usize]
    }
}

impl Default for CanFrame {
    fn default() -> Self {
        CanFrame {
            id: StandardId::ZERO,
            dlc: 0,
            data: [0; 8],
        }
    }
}

impl PartialEq for CanFrame {
    fn eq(&self, other: &Self) -> bool {
        let len = self.wire_dlc() as usize;
        self.id == other.id
            && self.wire_dlc() == other.wire_dlc()
            && self.data[..len] == other.data[..len]
    }
}

impl Eq for CanFrame {}

impl Debug for CanFrame {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CanFrame")
            .field("id", &self.id)
            .field("dlc", &self.wire_dlc())
            .field("data", &&self.data[..self.wire_dlc() as usize])
            .finish()
    }
}
