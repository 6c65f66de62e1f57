//! Constants shared across the CAN 2.0A wire protocol implementation.
//!
//! Field widths follow the standard base frame format: an 11 bit
//! identifier, the RTR/IDE/r0 control bits, a 4 bit DLC, up to 8 data
//! bytes and a 15 bit CRC. Everything here is expressed in *logical*
//! (pre-stuff) bits; stuff bits only exist on the wire.
//!
//! Throughout the crate a bit is carried as `bool` with `true` =
//! recessive (line high) and `false` = dominant (line low).

/// Width of the standard identifier field.
pub const ID_BITS: usize = 11;

/// Width of the Data Length Code field.
pub const DLC_BITS: usize = 4;

/// Width of the CRC sequence (CRC-15).
pub const CRC_BITS: usize = 15;

/// Logical offset of the DLC field: identifier plus RTR, IDE and r0.
pub const DLC_OFFSET: usize = ID_BITS + 3;

/// Logical bits from the first identifier bit through the DLC field.
pub const HEADER_BITS: usize = DLC_OFFSET + DLC_BITS;

/// Maximum payload length in bytes; larger DLC values are clamped.
pub const MAX_DATA_LEN: u8 = 8;

/// Longest possible logical frame (header, 8 data bytes, CRC),
/// excluding SOF and everything after the CRC sequence.
pub const MAX_FRAME_BITS: usize = HEADER_BITS + 8 * MAX_DATA_LEN as usize + CRC_BITS;

/// Shortest decodable logical frame: a zero-DLC header plus the CRC.
pub const MIN_FRAME_BITS: usize = HEADER_BITS + CRC_BITS;

/// Capacity of the receiver's logical bit buffer.
pub const RX_BUF_BITS: usize = 128;

/// Run length after which a stuff bit of opposite polarity follows.
pub const STUFF_RUN: u8 = 5;

/// Consecutive recessive bits that terminate a frame (End-Of-Frame).
pub const EOF_RUN: u8 = 7;

/// Transmit Error Counter penalty for a frame that went unacknowledged.
pub const TX_ERROR_JUMP: u16 = 8;

/// Counter value above which a node leaves Error-Active.
pub const ERROR_PASSIVE_LIMIT: u16 = 127;

/// Counter value above which a node goes Bus-Off.
pub const BUS_OFF_LIMIT: u16 = 255;
