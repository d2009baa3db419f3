//! SPI-mode command set and 6-byte command framing.
//!
//! A frame is `0x40 | index`, the 32-bit argument most-significant-byte
//! first, then a CRC byte. CRC checking is disabled once the card is in SPI
//! mode, so only the two commands issued before that point carry their real
//! (fixed) CRC; every other frame ends with an inert stop bit.

/// GO_IDLE_STATE - reset the card into SPI mode idle state.
pub const CMD0: u8 = 0;
/// SEND_IF_COND - verify SD Memory Card interface operating condition.
pub const CMD8: u8 = 8;
/// SEND_CSD - read the Card Specific Data register.
pub const CMD9: u8 = 9;
/// STOP_TRANSMISSION - end multiple block read sequence.
pub const CMD12: u8 = 12;
/// SEND_STATUS - read the card status register.
pub const CMD13: u8 = 13;
/// READ_SINGLE_BLOCK - read a single data block from the card.
pub const CMD17: u8 = 17;
/// READ_MULTIPLE_BLOCK - read data blocks until a STOP_TRANSMISSION.
pub const CMD18: u8 = 18;
/// WRITE_BLOCK - write a single data block to the card.
pub const CMD24: u8 = 24;
/// WRITE_MULTIPLE_BLOCK - write blocks of data until a stop token.
pub const CMD25: u8 = 25;
/// APP_CMD - escape for application specific command.
pub const CMD55: u8 = 55;
/// READ_OCR - read the OCR register of a card.
pub const CMD58: u8 = 58;
/// SD_SEND_OP_COND - send host capacity support and start initialization.
pub const ACMD41: u8 = 41;

/// Start bits of every command byte.
const START_BITS: u8 = 0x40;
/// Valid CRC for CMD0 with argument 0.
const CRC_CMD0: u8 = 0x95;
/// Valid CRC for CMD8 with argument 0x1AA.
const CRC_CMD8: u8 = 0x87;
/// Inert CRC byte (stop bit only) for commands sent after SPI mode entry.
const CRC_STUB: u8 = 0x01;

/// A single card command, consumed once by the framer.
///
/// Application commands must be preceded by an [`CMD55`] prefix frame on the
/// wire; modeling them as a distinct variant keeps that dispatch out of the
/// index value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum Command {
    Standard { index: u8, arg: u32 },
    Application { index: u8, arg: u32 },
}

impl Command {
    pub fn standard(index: u8, arg: u32) -> Self {
        Command::Standard { index, arg }
    }

    pub fn application(index: u8, arg: u32) -> Self {
        Command::Application { index, arg }
    }

    /// 6-bit command index.
    pub fn index(&self) -> u8 {
        match *self {
            Command::Standard { index, .. } | Command::Application { index, .. } => index & 0x3F,
        }
    }

    /// 32-bit command argument.
    pub fn arg(&self) -> u32 {
        match *self {
            Command::Standard { arg, .. } | Command::Application { arg, .. } => arg,
        }
    }

    /// Builds the 6-byte wire frame for this command.
    pub fn frame(&self) -> [u8; 6] {
        let index = self.index();
        let arg = self.arg();

        [
            START_BITS | index,
            (arg >> 24) as u8,
            (arg >> 16) as u8,
            (arg >> 8) as u8,
            arg as u8,
            Self::crc_byte(index),
        ]
    }

    fn crc_byte(index: u8) -> u8 {
        match index {
            CMD0 => CRC_CMD0,
            CMD8 => CRC_CMD8,
            _ => CRC_STUB,
        }
    }
}
