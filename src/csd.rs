//! Card Specific Data register, read once at the end of initialization to
//! learn the card capacity.

use crate::consts::BLOCK_SIZE_U64;
use crate::CardType;

use bitfield::bitfield;
use size::{consts::KiB, Size};

/// Raw CSD register contents.
pub type CsdData = [u8; 16];

bitfield! {
    /// Capacity-relevant fields of a version 1 CSD.
    #[derive(Debug, Clone, Copy)]
    pub struct CsdV1(u128);
    pub u8, version, _: 127, 126;
    pub u8, read_block_length, _: 83, 80;
    pub u16, device_size, _: 73, 62;
    pub u8, device_size_multiplier, _: 49, 47;
}

bitfield! {
    /// Capacity-relevant fields of a version 2 CSD.
    #[derive(Debug, Clone, Copy)]
    pub struct CsdV2(u128);
    pub u8, version, _: 127, 126;
    pub u32, device_size, _: 69, 48;
}

/// Card Specific Data, generic container.
#[derive(Debug, Clone, Copy)]
pub enum Csd {
    V1(CsdV1),
    V2(CsdV2),
}

impl Csd {
    /// Parses a raw register dump; the layout version follows the card type
    /// detected during negotiation.
    pub fn from_data(card_type: CardType, data: CsdData) -> Self {
        let raw = u128::from_be_bytes(data);

        match card_type {
            CardType::SD1 => Csd::V1(CsdV1(raw)),
            CardType::SD2 | CardType::SDHC => Csd::V2(CsdV2(raw)),
        }
    }

    /// Card capacity in 512-byte blocks.
    pub fn capacity_blocks(&self) -> u64 {
        match self {
            Csd::V1(csd) => {
                (u64::from(csd.device_size()) + 1)
                    << (csd.device_size_multiplier() + csd.read_block_length() - 7)
            }
            Csd::V2(csd) => (u64::from(csd.device_size()) + 1) * (KiB as u64),
        }
    }

    /// Card capacity in bytes.
    pub fn capacity(&self) -> Size {
        Size::from_bytes(self.capacity_blocks() * BLOCK_SIZE_U64)
    }
}
