//! Fault confinement: the TEC/REC counter machine.
//!
//! Both the transmit and the receive path report their outcomes here;
//! the node owns exactly one instance, which is the single fault
//! authority. The node state is always the classification of the
//! counter pair: Bus-Off iff either counter exceeds 255, else
//! Error-Passive iff either exceeds 127, else Error-Active.
//!
//! Bus-Off is sticky: once entered, send and read become silent no-ops
//! so no hook fires again until the host re-initialises the node.

use crate::consts::{BUS_OFF_LIMIT, ERROR_PASSIVE_LIMIT, TX_ERROR_JUMP};

/// Operating state of a node's fault-confinement machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum NodeState {
    /// Healthy node, participating fully in bus traffic.
    #[default]
    ErrorActive,
    /// Degraded node. Symmetric to Error-Active in this software
    /// profile; a future extension may restrict error signalling here.
    ErrorPassive,
    /// Off the bus: transmissions fail and reception stops until the
    /// node is re-initialised.
    BusOff,
}

/// Transmit and Receive Error Counters plus the derived node state.
#[derive(Debug, Default)]
pub(crate) struct FaultCounters {
    tec: u16,
    rec: u16,
    state: NodeState,
}

impl FaultCounters {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn tec(&self) -> u16 {
        self.tec
    }

    pub(crate) fn rec(&self) -> u16 {
        self.rec
    }

    pub(crate) fn state(&self) -> NodeState {
        self.state
    }

    /// Zeroes both counters and returns to Error-Active.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// A driven frame went unacknowledged.
    ///
    /// Arbitration loss is deliberately not reported here: yielding to
    /// a higher-priority frame is not a transmit error.
    pub(crate) fn on_tx_failure(&mut self) {
        if self.state != NodeState::BusOff {
            self.tec = self.tec.saturating_add(TX_ERROR_JUMP);
            self.reclassify();
        }
    }

    /// A frame was received broken (stuff, form or CRC error).
    pub(crate) fn on_rx_failure(&mut self) {
        if self.state != NodeState::BusOff {
            self.rec = self.rec.saturating_add(1);
            self.reclassify();
        }
    }

    /// A frame was driven and acknowledged.
    pub(crate) fn on_tx_success(&mut self) {
        if self.tec > 0 {
            self.tec -= 1;
            self.reclassify();
        }
    }

    /// A frame was received intact.
    pub(crate) fn on_rx_success(&mut self) {
        if self.rec > 0 {
            self.rec -= 1;
            self.reclassify();
        }
    }

    #[cfg(test)]
    pub(crate) fn force(&mut self, tec: u16, rec: u16) {
        self.tec = tec;
        self.rec = rec;
        self.reclassify();
    }

    fn reclassify(&mut self) {
        let next = if self.tec > BUS_OFF_LIMIT || self.rec > BUS_OFF_LIMIT {
            NodeState::BusOff
        } else if self.tec > ERROR_PASSIVE_LIMIT || self.rec > ERROR_PASSIVE_LIMIT {
            NodeState::ErrorPassive
        } else {
            NodeState::ErrorActive
        };
        if next != self.state {
            #[cfg(feature = "log")]
            log::debug!(
                "fault confinement: {:?} -> {:?} (tec={}, rec={})",
                self.state,
                next,
                self.tec,
                self.rec
            );
            self.state = next;
        }
    }
}
