//! SPI-mode SD/MMC block device driver for `no_std` targets.
//!
//! This crate brings a card through the SPI-mode power-up handshake and then
//! exposes sector-granular reads and writes to a file-system layer through
//! the [`diskio`] device contract. The hardware is reached through two
//! narrow seams: a full-duplex byte exchange
//! ([`embedded_hal::blocking::spi::Transfer`] plus [`BusControl`] for the
//! slow/fast clock switch) and a chip-select switch
//! ([`switch_hal::OutputSwitch`]). Bounded waits are timed by a shared
//! millisecond [`TimeoutClock`] decremented from a 1 kHz tick interrupt.
//!
//! Logging goes through the `log` crate by default; enable the `defmt-log`
//! feature (and disable default features) to use `defmt` instead. Exactly
//! one of the two features must be active.

#![cfg_attr(not(test), no_std)]

mod clock;
mod command;
mod config;
mod consts;
mod csd;
mod response;

#[cfg(test)]
mod sim;

pub use crate::clock::{TickDriver, TimeoutClock};
pub use crate::command::Command;
pub use crate::config::{DefaultSdSpiConfig, SdSpiConfig};
pub use crate::consts::BLOCK_SIZE;
pub use crate::csd::Csd;
pub use crate::response::R1Response;
pub use diskio::{
    BlockSize, DiskioDevice, Error as DiskioError, IoctlCmd, Lba, Status, StatusFlag,
};

use crate::consts::tokens;
use crate::csd::CsdData;

use core::{cell::RefCell, marker::PhantomData};
use embedded_hal::blocking::spi::Transfer;
use size::Size;
use switch_hal::OutputSwitch;

#[cfg(feature = "defmt-log")]
use defmt::{error, info, warn};
#[cfg(feature = "log")]
use log::{error, info, warn};

/// Bus clock rate, selectable on the SPI seam.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum BusSpeed {
    /// Card-detection-safe rate (400 kHz class) for initialization.
    Slow,
    /// Normal operating rate for data transfer.
    Fast,
}

/// Clock rate control for the SPI peripheral driving the card.
pub trait BusControl {
    fn set_speed(&mut self, speed: BusSpeed);
}

/// Protocol-level failure, one code per entry of the error taxonomy.
///
/// Codes that carry a `u8` report either the 6-bit index of the offending
/// command or the raw byte seen on the bus, as named per variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum ProtocolError {
    /// Card did not report ready within the selection window.
    SelectTimeout,
    /// Card stayed busy past the not-busy window.
    BusyTimeout,
    /// No response token within the poll budget for this command index.
    CommandTimeout(u8),
    /// Response byte with its top bit set; ambiguous bus state.
    InvalidResponse(u8),
    /// Illegal-command bit set answering this command index.
    IllegalCommand(u8),
    /// Command CRC rejected by the card for this command index.
    CommandCrcError(u8),
    /// Erase sequence error bit set for this command index.
    EraseSequenceError(u8),
    /// Address error bit set for this command index.
    AddressError(u8),
    /// Parameter error bit set for this command index.
    ParameterError(u8),
    /// No start-of-data token within the block-read window.
    DataTimeout,
    /// A token arrived but it was not the start-of-data token.
    BadDataToken(u8),
    /// Data response after a block write was not the accepted pattern.
    WriteRejected(u8),
    /// "Go idle" retry budget exhausted; the card never answered.
    NoIdleResponse,
    /// Operation requires an initialized card.
    NotReady,
    /// Hardware-level transport or chip-select fault.
    BusFault,
}

/// [`SdCardSpi`] result error.
///
/// `T` - transport error type.
/// `S` - select switch error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error<T, S> {
    /// Error from the SPI peripheral.
    Transport(T),
    /// Couldn't drive the chip-select line.
    Select(S),
    /// Failure within the card protocol itself.
    Protocol(ProtocolError),
}

impl<T, S> Error<T, S> {
    /// The protocol code recorded in [`CardState::Error`]; hardware faults
    /// collapse to [`ProtocolError::BusFault`].
    pub fn protocol_code(&self) -> ProtocolError {
        match self {
            Error::Protocol(code) => *code,
            Error::Transport(_) | Error::Select(_) => ProtocolError::BusFault,
        }
    }
}

impl<T, S> From<ProtocolError> for Error<T, S> {
    fn from(code: ProtocolError) -> Self {
        Error::Protocol(code)
    }
}

/// Card life cycle. `Ready` is required before any sector transfer; `Error`
/// is terminal until initialization is re-attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum CardState {
    Uninitialized,
    Idle,
    Ready,
    Error(ProtocolError),
}

/// Card type detected during negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-log", derive(defmt::Format))]
pub enum CardType {
    SD1,
    SD2,
    SDHC,
}

/// Error type alias.
type ErrorFor<Spi, Cs> =
    Error<<Spi as Transfer<u8>>::Error, <Cs as OutputSwitch>::Error>;

/// SD Card SPI driver.
///
/// `Spi` - SPI transport with clock rate control.
/// `Cs` - Chip select output switch.
/// `Config` - Implementation of the driver config trait.
///
/// The referenced [`TimeoutClock`] must be ticked at 1 kHz through a
/// [`TickDriver`]; every bounded wait in the driver is timed against it.
pub struct SdCardSpi<'c, Spi, Cs, Config>
where
    Spi: Transfer<u8> + BusControl,
    Cs: OutputSwitch,
    Config: SdSpiConfig,
{
    spi: RefCell<Spi>,
    cs: RefCell<Cs>,
    clock: &'c TimeoutClock,
    state: CardState,
    card_type: CardType,
    csd: Option<Csd>,
    config: PhantomData<Config>,
}

impl<'c, Spi, Cs, Config> SdCardSpi<'c, Spi, Cs, Config>
where
    Spi: Transfer<u8> + BusControl,
    Cs: OutputSwitch,
    Spi::Error: core::fmt::Debug,
    Cs::Error: core::fmt::Debug,
    Config: SdSpiConfig,
{
    /// Creates a new [`SdCardSpi`] in the `Uninitialized` state.
    ///
    /// `spi` - SPI instance.
    /// `cs` - chip select output switch.
    /// `clock` - shared millisecond countdown.
    pub fn new(spi: Spi, cs: Cs, clock: &'c TimeoutClock) -> Self {
        SdCardSpi {
            spi: RefCell::new(spi),
            cs: RefCell::new(cs),
            clock,
            state: CardState::Uninitialized,
            card_type: CardType::SD1,
            csd: None,
            config: PhantomData::<Config>,
        }
    }

    /// Current card life cycle state.
    pub fn card_state(&self) -> CardState {
        self.state
    }

    /// Card type detected during negotiation; meaningful once `Ready`.
    pub fn card_type(&self) -> CardType {
        self.card_type
    }

    /// Card capacity in 512-byte blocks, known once `Ready`.
    pub fn capacity_blocks(&self) -> Option<u64> {
        self.csd.map(|csd| csd.capacity_blocks())
    }

    /// Card capacity in bytes, known once `Ready`.
    pub fn capacity(&self) -> Option<Size> {
        self.csd.map(|csd| csd.capacity())
    }

    /// Validate buffer for read/write.
    fn validate_buffer_len(buf_len: usize) -> Result<(), DiskioError<ErrorFor<Spi, Cs>>> {
        if buf_len == 0 || buf_len % BLOCK_SIZE != 0 {
            error!(
                "sd invalid buffer, length: {}, block size: {}",
                buf_len, BLOCK_SIZE
            );
            Err(DiskioError::InvalidArgument)
        } else {
            Ok(())
        }
    }

    /// Block transfers require a negotiated, ready card.
    fn require_ready(&self) -> Result<(), ErrorFor<Spi, Cs>> {
        if self.state == CardState::Ready {
            Ok(())
        } else {
            Err(Error::Protocol(ProtocolError::NotReady))
        }
    }

    /// Sector index to on-wire address: standard capacity cards are byte
    /// addressed, high capacity cards are block addressed.
    fn sector_address(&self, sector: u32) -> u32 {
        match self.card_type {
            CardType::SD1 | CardType::SD2 => sector * BLOCK_SIZE as u32,
            CardType::SDHC => sector,
        }
    }

    /// Assert chip select and flush any half-clocked state.
    fn select(&self) -> Result<(), ErrorFor<Spi, Cs>> {
        self.cs.borrow_mut().on().map_err(Error::Select)?;
        self.skip_byte()
    }

    /// Deassert chip select and clock once to release the data line.
    fn deselect(&self) -> Result<(), ErrorFor<Spi, Cs>> {
        self.cs.borrow_mut().off().map_err(Error::Select)?;
        self.skip_byte()
    }

    /// CS scope.
    fn cs_scope<F>(&self, f: F) -> Result<(), ErrorFor<Spi, Cs>>
    where
        F: FnOnce(&Self) -> Result<(), ErrorFor<Spi, Cs>>,
    {
        self.select()?;
        let result = f(self);
        self.deselect()?;

        result
    }

    /// CS scope mut.
    fn cs_scope_mut<F>(&mut self, f: F) -> Result<(), ErrorFor<Spi, Cs>>
    where
        F: FnOnce(&mut Self) -> Result<(), ErrorFor<Spi, Cs>>,
    {
        self.select()?;
        let result = f(self);
        self.deselect()?;

        result
    }

    /// Send one byte and receive one byte.
    fn transfer(&self, data: u8) -> Result<u8, ErrorFor<Spi, Cs>> {
        self.spi
            .borrow_mut()
            .transfer(&mut [data])
            .map(|b| b[0])
            .map_err(Error::Transport)
    }

    /// Receive a byte from the card by clocking out filler.
    fn receive(&self) -> Result<u8, ErrorFor<Spi, Cs>> {
        self.transfer(tokens::FILLER)
    }

    /// Send a byte to the card.
    fn send(&self, data: u8) -> Result<(), ErrorFor<Spi, Cs>> {
        self.transfer(data).map(|_| ())
    }

    /// Receive a slice from the card.
    fn receive_slice(&self, data: &mut [u8]) -> Result<(), ErrorFor<Spi, Cs>> {
        for byte in data.iter_mut() {
            *byte = self.receive()?;
        }

        Ok(())
    }

    /// Send a slice to the card.
    fn send_slice(&self, data: &[u8]) -> Result<(), ErrorFor<Spi, Cs>> {
        for byte in data.iter() {
            self.send(*byte)?;
        }

        Ok(())
    }

    /// Skip byte.
    fn skip_byte(&self) -> Result<(), ErrorFor<Spi, Cs>> {
        self.receive().map(|_| ())
    }

    /// Bounded poll: clock out `filler` until the received byte satisfies
    /// `accept` or `timeout_ms` elapses on the shared countdown.
    ///
    /// Arms the countdown, so callers must not already be inside a timed
    /// wait. Returns the accepted byte, or `None` on expiry.
    fn poll_byte<F>(
        &self,
        filler: u8,
        timeout_ms: u32,
        accept: F,
    ) -> Result<Option<u8>, ErrorFor<Spi, Cs>>
    where
        F: Fn(u8) -> bool,
    {
        self.clock.arm(timeout_ms);

        loop {
            let byte = self.transfer(filler)?;

            if accept(byte) {
                return Ok(Some(byte));
            }

            if self.clock.expired() {
                return Ok(None);
            }
        }
    }

    /// Select the card and wait for it to report ready.
    ///
    /// On timeout the card is deselected again before the error is
    /// returned, so the caller never needs a cleanup path.
    fn select_card(&self) -> Result<(), ErrorFor<Spi, Cs>> {
        self.select()?;

        match self.poll_byte(tokens::FILLER, Config::SELECT_TIMEOUT_MS, |byte| {
            byte == tokens::AVAILABLE
        })? {
            Some(_) => Ok(()),
            None => {
                self.deselect()?;
                Err(Error::Protocol(ProtocolError::SelectTimeout))
            }
        }
    }

    /// Wait for the card to leave the busy state.
    fn wait_not_busy(&self) -> Result<(), ErrorFor<Spi, Cs>> {
        match self.poll_byte(tokens::FILLER, Config::WRITE_READY_TIMEOUT_MS, |byte| {
            byte == tokens::AVAILABLE
        })? {
            Some(_) => Ok(()),
            None => Err(Error::Protocol(ProtocolError::BusyTimeout)),
        }
    }

    /// Send a command and return the raw R1 response.
    ///
    /// Application commands are preceded by the APP_CMD prefix frame; if the
    /// prefix response already signals failure (value above 1) it is
    /// returned without sending the real command. A selection timeout
    /// surfaces as the 0xFF no-response sentinel rather than an error, per
    /// the legacy contract.
    fn send_command(&self, cmd: Command) -> Result<R1Response, ErrorFor<Spi, Cs>> {
        if let Command::Application { index, arg } = cmd {
            let prefix = self.send_frame(Command::standard(command::CMD55, 0))?;

            if prefix.raw() > 1 {
                return Ok(prefix);
            }

            return self.send_frame(Command::standard(index, arg));
        }

        self.send_frame(cmd)
    }

    /// Frame transmission and response polling for one command.
    fn send_frame(&self, cmd: Command) -> Result<R1Response, ErrorFor<Spi, Cs>> {
        let index = cmd.index();

        // Re-select (with a ready wait) for everything except the stop
        // command, which must go out while the read stream is still active.
        if index != command::CMD12 {
            self.deselect()?;

            match self.select_card() {
                Ok(()) => {}
                Err(Error::Protocol(ProtocolError::SelectTimeout)) => {
                    return Ok(R1Response::NO_RESPONSE)
                }
                Err(err) => return Err(err),
            }
        }

        self.send_slice(&cmd.frame())?;

        if index == command::CMD12 {
            // The card inserts one stuff byte before the CMD12 response.
            self.skip_byte()?;
        }

        let mut r1 = R1Response::NO_RESPONSE;

        for _ in 0..Config::RESPONSE_ATTEMPTS {
            r1 = R1Response::new(self.receive()?);

            if r1.is_valid() {
                break;
            }
        }

        Ok(r1)
    }

    /// Send a command whose response must equal `want` exactly.
    fn command_expect(
        &self,
        cmd: Command,
        want: R1Response,
    ) -> Result<(), ErrorFor<Spi, Cs>> {
        let index = cmd.index();
        let r1 = self.send_command(cmd)?;

        if r1 == want {
            Ok(())
        } else {
            Err(Error::Protocol(response::classify(index, r1)))
        }
    }

    /// Receive one data block into `buf`.
    ///
    /// Waits for the start token within the read window; on timeout the
    /// buffer is left untouched. The 2-byte CRC trailer is clocked out and
    /// discarded without verification, preserving the relaxed legacy
    /// behavior of this transport.
    fn receive_block(&self, buf: &mut [u8]) -> Result<(), ErrorFor<Spi, Cs>> {
        let token = self.poll_byte(tokens::FILLER, Config::READ_TOKEN_TIMEOUT_MS, |byte| {
            byte != tokens::FILLER
        })?;

        match token {
            None => Err(Error::Protocol(ProtocolError::DataTimeout)),
            Some(tokens::DATA_START_BLOCK) => {
                self.receive_slice(buf)?;

                self.skip_byte()?;
                self.skip_byte()?;

                Ok(())
            }
            Some(other) => Err(Error::Protocol(ProtocolError::BadDataToken(other))),
        }
    }

    /// Send one data block (or the stop token) to the card.
    ///
    /// Waits for the card to leave busy first. For data tokens the 512-byte
    /// payload is followed by two filler CRC bytes and the data response is
    /// checked for the accepted pattern; the stop token carries no payload.
    fn send_block(&self, token: u8, data: &[u8]) -> Result<(), ErrorFor<Spi, Cs>> {
        self.wait_not_busy()?;

        self.send(token)?;

        if token != tokens::STOP_TRAN {
            self.send_slice(data)?;
            self.send(tokens::FILLER)?;
            self.send(tokens::FILLER)?;

            let response = self.receive()?;

            if response & tokens::DATA_RES_MASK != tokens::DATA_RES_ACCEPTED {
                return Err(Error::Protocol(ProtocolError::WriteRejected(response)));
            }
        }

        Ok(())
    }

    /// Clock out the pre-command dummy bits (80 clocks at the default
    /// config) with the card deselected.
    fn send_dummy_clocks(&self) -> Result<(), ErrorFor<Spi, Cs>> {
        for _ in 0..Config::DUMMY_CLOCK_BYTES {
            self.send(tokens::FILLER)?;
        }

        Ok(())
    }

    /// Keep the clock running for the power-up window before the first
    /// command; the card is deselected the whole time.
    fn power_up_delay(&self) -> Result<(), ErrorFor<Spi, Cs>> {
        self.clock.arm(Config::POWER_UP_DELAY_MS);

        while !self.clock.expired() {
            self.skip_byte()?;
        }

        Ok(())
    }

    /// Drive the card into the SPI-mode idle state.
    ///
    /// Each attempt re-sends the dummy clock train while deselected, then
    /// issues "go idle"; the loop gives up after the configured budget.
    fn enter_idle_state(&mut self) -> Result<(), ErrorFor<Spi, Cs>> {
        for attempt in 0..Config::GO_IDLE_ATTEMPTS {
            self.deselect()?;
            self.send_dummy_clocks()?;

            let r1 = self.send_command(Command::standard(command::CMD0, 0))?;

            if r1 == R1Response::IDLE {
                info!("sd card idle, attempt: {}", attempt + 1);
                self.state = CardState::Idle;
                return Ok(());
            }
        }

        error!("sd card did not respond to initialization");
        Err(Error::Protocol(ProtocolError::NoIdleResponse))
    }

    /// Verify the interface operating condition (CMD8) and tell a v1 card
    /// from a v2 card.
    fn probe_interface_condition(&self) -> Result<CardType, ErrorFor<Spi, Cs>> {
        let cmd = Command::standard(command::CMD8, 0x0000_01AA);
        let r1 = self.send_command(cmd)?;

        if r1 == R1Response::IDLE_AND_ILLEGAL {
            // v1 cards do not know CMD8.
            return Ok(CardType::SD1);
        }

        if r1 != R1Response::IDLE {
            return Err(Error::Protocol(response::classify(command::CMD8, r1)));
        }

        let mut echo = [0u8; 4];
        self.receive_slice(&mut echo)?;

        if echo[3] != tokens::CMD8_CHECK_PATTERN {
            return Err(Error::Protocol(ProtocolError::InvalidResponse(echo[3])));
        }

        Ok(CardType::SD2)
    }

    /// Repeat the app-op-cond command until the card reports not-idle.
    fn send_op_cond(&self, arg: u32) -> Result<(), ErrorFor<Spi, Cs>> {
        for _ in 0..Config::OP_COND_ATTEMPTS {
            let r1 = self.send_command(Command::application(command::ACMD41, arg))?;

            if r1 == R1Response::READY {
                return Ok(());
            }

            if r1 != R1Response::IDLE {
                return Err(Error::Protocol(response::classify(command::ACMD41, r1)));
            }
        }

        Err(Error::Protocol(ProtocolError::CommandTimeout(
            command::ACMD41,
        )))
    }

    /// Voltage and capacity negotiation: CMD8 probe, ACMD41 loop, and the
    /// OCR capacity bit for v2 cards.
    fn negotiate(&self) -> Result<CardType, ErrorFor<Spi, Cs>> {
        let mut card_type = self.probe_interface_condition()?;

        let arg = match card_type {
            CardType::SD1 => 0x0000_0000,
            CardType::SD2 | CardType::SDHC => 0x4000_0000,
        };

        self.send_op_cond(arg)?;

        if card_type == CardType::SD2 {
            self.command_expect(
                Command::standard(command::CMD58, 0),
                R1Response::READY,
            )?;

            if self.receive()? & tokens::OCR_CCS != 0 {
                card_type = CardType::SDHC;
            }

            self.skip_byte()?;
            self.skip_byte()?;
            self.skip_byte()?;
        }

        info!("sd card negotiated");
        Ok(card_type)
    }

    /// Read the CSD register; same token and trailer framing as a data
    /// block, 16 bytes long.
    fn read_csd(&self) -> Result<Csd, ErrorFor<Spi, Cs>> {
        self.command_expect(Command::standard(command::CMD9, 0), R1Response::READY)?;

        let mut data: CsdData = Default::default();
        self.receive_block(&mut data)?;

        Ok(Csd::from_data(self.card_type, data))
    }

    /// Full initialization sequence: slow clock, power-up delay, go-idle
    /// loop, negotiation, CSD read, fast clock.
    fn init(&mut self) -> Result<(), ErrorFor<Spi, Cs>> {
        info!("sd card init started");

        self.state = CardState::Uninitialized;
        self.csd = None;
        self.spi.borrow_mut().set_speed(BusSpeed::Slow);

        self.deselect()?;
        self.power_up_delay()?;

        let result = self.cs_scope_mut(|s| {
            s.enter_idle_state()?;

            s.card_type = s.negotiate()?;
            s.state = CardState::Ready;
            s.csd = Some(s.read_csd()?);

            Ok(())
        });

        match &result {
            Ok(()) => {
                self.spi.borrow_mut().set_speed(BusSpeed::Fast);
                info!(
                    "sd card ready, type: {:?}, blocks: {}",
                    self.card_type,
                    self.capacity_blocks().unwrap_or(0)
                );
            }
            Err(err) => {
                let code = err.protocol_code();
                error!("sd card init failed: {:?}", code);
                self.state = CardState::Error(code);
            }
        }

        result
    }

    /// Read one 512-byte sector.
    pub fn read_sector(
        &self,
        sector: u32,
        out: &mut [u8; BLOCK_SIZE],
    ) -> Result<(), ErrorFor<Spi, Cs>> {
        self.require_ready()?;

        let addr = self.sector_address(sector);

        self.cs_scope(|s| {
            s.command_expect(Command::standard(command::CMD17, addr), R1Response::READY)?;
            s.receive_block(out)
        })
    }

    /// Write one 512-byte sector and verify the card status afterwards.
    pub fn write_sector(
        &self,
        sector: u32,
        data: &[u8; BLOCK_SIZE],
    ) -> Result<(), ErrorFor<Spi, Cs>> {
        self.require_ready()?;

        let addr = self.sector_address(sector);

        self.cs_scope(|s| {
            s.command_expect(Command::standard(command::CMD24, addr), R1Response::READY)?;
            s.send_block(tokens::DATA_START_BLOCK, data)?;
            s.wait_not_busy()?;

            s.command_expect(Command::standard(command::CMD13, 0), R1Response::READY)?;

            // Second byte of the R2 status; non-zero means the write failed
            // after acceptance.
            let status = s.receive()?;
            if status != 0 {
                return Err(Error::Protocol(ProtocolError::WriteRejected(status)));
            }

            Ok(())
        })
    }
}

impl<'c, Spi, Cs, Config> DiskioDevice for SdCardSpi<'c, Spi, Cs, Config>
where
    Spi: Transfer<u8> + BusControl,
    Cs: OutputSwitch,
    Spi::Error: core::fmt::Debug,
    Cs::Error: core::fmt::Debug,
    Config: SdSpiConfig,
{
    type HardwareError = ErrorFor<Spi, Cs>;

    fn status(&self) -> Status {
        match self.state {
            CardState::Ready => Status::default(),
            CardState::Error(_) => StatusFlag::ErrorOccured | StatusFlag::NotInitialized,
            CardState::Uninitialized | CardState::Idle => StatusFlag::NotInitialized.into(),
        }
    }

    fn reset(&mut self) {
        info!("sd card reset invoked");
        self.state = CardState::Uninitialized;
        self.csd = None;
    }

    fn initialize(&mut self) -> Result<(), DiskioError<Self::HardwareError>> {
        if self.state == CardState::Ready {
            warn!("sd card already initialized");
            return Err(DiskioError::AlreadyInitialized);
        }

        self.init().map_err(DiskioError::Hardware)
    }

    fn read(&self, buf: &mut [u8], lba: Lba) -> Result<(), DiskioError<Self::HardwareError>> {
        Self::validate_buffer_len(buf.len())?;
        self.require_ready()
            .map_err(|_| DiskioError::NotInitialized)?;

        let block_count = buf.len() / BLOCK_SIZE;
        let addr = self.sector_address(lba as u32);

        self.cs_scope(|s| {
            if block_count == 1 {
                s.command_expect(Command::standard(command::CMD17, addr), R1Response::READY)?;
                s.receive_block(buf)?;
            } else {
                s.command_expect(Command::standard(command::CMD18, addr), R1Response::READY)?;
                for chunk in buf.chunks_mut(BLOCK_SIZE) {
                    s.receive_block(chunk)?;
                }
                s.send_command(Command::standard(command::CMD12, 0))?;
            }

            Ok(())
        })
        .map_err(DiskioError::Hardware)
    }

    fn write(&self, buf: &[u8], lba: Lba) -> Result<(), DiskioError<Self::HardwareError>> {
        Self::validate_buffer_len(buf.len())?;
        self.require_ready()
            .map_err(|_| DiskioError::NotInitialized)?;

        let block_count = buf.len() / BLOCK_SIZE;
        let addr = self.sector_address(lba as u32);

        self.cs_scope(|s| {
            if block_count == 1 {
                s.command_expect(Command::standard(command::CMD24, addr), R1Response::READY)?;
                s.send_block(tokens::DATA_START_BLOCK, buf)?;
                s.wait_not_busy()?;
            } else {
                s.command_expect(Command::standard(command::CMD25, addr), R1Response::READY)?;
                for block in buf.chunks(BLOCK_SIZE) {
                    s.send_block(tokens::WRITE_MULTIPLE, block)?;
                }
                s.send_block(tokens::STOP_TRAN, &[])?;
                s.wait_not_busy()?;
            }

            Ok(())
        })
        .map_err(DiskioError::Hardware)
    }

    fn ioctl(&self, cmd: IoctlCmd) -> Result<(), DiskioError<Self::HardwareError>> {
        match cmd {
            IoctlCmd::CtrlSync => self
                .cs_scope(|s| s.wait_not_busy())
                .map_err(DiskioError::Hardware),
            IoctlCmd::GetBlockSize(block_size) => {
                *block_size = BLOCK_SIZE as BlockSize;
                Ok(())
            }
            _ => Err(DiskioError::NotSupported),
        }
    }
}
