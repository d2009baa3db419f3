/// Transfer unit of the card, in bytes.
pub const BLOCK_SIZE: usize = 512;
/// Transfer unit of the card, as u64 for capacity math.
pub const BLOCK_SIZE_U64: u64 = BLOCK_SIZE as u64;

pub mod tokens {
    /// Filler clocked out when only receiving; also the idle bus level.
    pub const FILLER: u8 = 0xFF;
    /// Byte seen on the bus when the card is ready (not busy).
    pub const AVAILABLE: u8 = 0xFF;
    /// Start data token for read or write single block.
    pub const DATA_START_BLOCK: u8 = 0xFE;
    /// Stop token for write multiple blocks.
    pub const STOP_TRAN: u8 = 0xFD;
    /// Start data token for write multiple blocks.
    pub const WRITE_MULTIPLE: u8 = 0xFC;
    /// Mask for data response tokens after a write block operation.
    pub const DATA_RES_MASK: u8 = 0x1F;
    /// Write data accepted token.
    pub const DATA_RES_ACCEPTED: u8 = 0x05;
    /// Check pattern echoed back by CMD8.
    pub const CMD8_CHECK_PATTERN: u8 = 0xAA;
    /// Card Capacity Status bit in the first OCR byte.
    pub const OCR_CCS: u8 = 0x40;
}
