//! Thin driver for the two bus GPIOs.
//!
//! The TX line must be open-drain (or feed the TX input of a CAN
//! transceiver): low actively pulls the bus dominant, high stops
//! driving and lets the wired-AND bus float recessive, which is also
//! how the transmitter hands the bus over during the ACK slot. The RX
//! line is an input with pull-up; recessive reads high.

use embedded_hal::digital::{InputPin, OutputPin};

/// The node's view of the physical bus: one driven line, one sampled
/// line.
#[derive(Debug)]
pub(crate) struct BusLine<TX, RX> {
    pub(crate) tx: TX,
    pub(crate) rx: RX,
}

impl<TX, RX> BusLine<TX, RX>
where
    TX: OutputPin,
    RX: InputPin,
{
    pub(crate) fn new(tx: TX, rx: RX) -> Self {
        BusLine { tx, rx }
    }

    /// Pulls the bus dominant (line low).
    pub(crate) fn drive_dominant(&mut self) {
        let _ = self.tx.set_low();
    }

    /// Drives recessive (line high; on an open-drain pin this releases
    /// the pull).
    pub(crate) fn drive_recessive(&mut self) {
        let _ = self.tx.set_high();
    }

    /// Stops driving so another node may pull the bus dominant.
    ///
    /// Electrically identical to [`drive_recessive`](Self::drive_recessive)
    /// on an open-drain line; kept separate because the ACK slot hands
    /// bus ownership over rather than asserting a level.
    pub(crate) fn release(&mut self) {
        let _ = self.tx.set_high();
    }

    /// Samples the bus level: `true` = recessive, `false` = dominant.
    ///
    /// A failed read counts as recessive (idle).
    pub(crate) fn sample(&mut self) -> bool {
        self.rx.is_high().unwrap_or(true)
    }
}
