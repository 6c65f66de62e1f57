//! Bit timing and the host clock contract.
//!
//! The node never configures a hardware timer itself. The host hands
//! it two timing primitives: a blocking microsecond delay
//! ([`embedded_hal::delay::DelayNs`]) that paces the transmit path,
//! and a monotonic microsecond [`Clock`] that schedules the receive
//! sampler.

/// Monotonic microsecond clock supplied by the host.
///
/// Implementations typically wrap a free-running hardware counter
/// (e.g. an Arduino-style `micros()`). A counter narrower than 64 bits
/// must be widened by the implementation; the receiver relies on the
/// value never running backwards or wrapping.
pub trait Clock {
    /// Current time in microseconds since an arbitrary fixed epoch.
    fn now_us(&mut self) -> u64;
}

/// Nominal bit period in microseconds for a bit rate in bits/second.
pub const fn bit_time_us(baudrate: u32) -> u32 {
    1_000_000 / baudrate
}

/// Bit rates this driver is designed for.
///
/// Above 125 kbit/s the software bit timing is best effort; whether it
/// holds depends on the host's GPIO and delay latency.
pub const SUPPORTED_BITRATES: [u32; 6] =
    [50_000, 100_000, 125_000, 250_000, 500_000, 1_000_000];
