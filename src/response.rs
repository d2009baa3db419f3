//! R1 response interpretation.

use crate::ProtocolError;

use bitfield::bitfield;

bitfield! {
    /// R1 response bitset. Bit 7 must be clear for the byte to be a
    /// response at all; the remaining bits flag error conditions, except
    /// bit 0 which only reports that the card is still in the idle state.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct R1Response(u8);
    pub in_idle_state, _: 0;
    pub erase_reset, _: 1;
    pub illegal_command, _: 2;
    pub command_crc_error, _: 3;
    pub erase_sequence_error, _: 4;
    pub address_error, _: 5;
    pub parameter_error, _: 6;
}

impl R1Response {
    /// Card left the idle state, no errors.
    pub const READY: R1Response = R1Response(0x00);
    /// Card is in the idle state, no errors.
    pub const IDLE: R1Response = R1Response(0x01);
    /// Idle with the illegal command bit set; a v1 card answering CMD8.
    pub const IDLE_AND_ILLEGAL: R1Response = R1Response(0x05);
    /// Sentinel for "the card never answered".
    pub const NO_RESPONSE: R1Response = R1Response(0xFF);

    pub fn new(raw: u8) -> Self {
        R1Response(raw)
    }

    pub fn raw(&self) -> u8 {
        self.0
    }

    /// A response token has its top bit clear.
    pub fn is_valid(&self) -> bool {
        self.0 & 0x80 == 0
    }
}

/// Maps a response that was required to be clean onto the error taxonomy.
///
/// 0xFF means the poll window closed without any response; any other byte
/// with bit 7 set is an ambiguous bus state; a valid byte is classified by
/// its highest-priority error bit. `index` names the offending command.
pub fn classify(index: u8, r1: R1Response) -> ProtocolError {
    if r1 == R1Response::NO_RESPONSE {
        ProtocolError::CommandTimeout(index)
    } else if !r1.is_valid() {
        ProtocolError::InvalidResponse(r1.raw())
    } else if r1.illegal_command() {
        ProtocolError::IllegalCommand(index)
    } else if r1.command_crc_error() {
        ProtocolError::CommandCrcError(index)
    } else if r1.erase_sequence_error() {
        ProtocolError::EraseSequenceError(index)
    } else if r1.address_error() {
        ProtocolError::AddressError(index)
    } else if r1.parameter_error() {
        ProtocolError::ParameterError(index)
    } else {
        ProtocolError::InvalidResponse(r1.raw())
    }
}
