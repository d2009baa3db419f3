//! Simulated SPI-mode card for the driver tests.
//!
//! [`SimCard`] models the card end of the bus one byte at a time: it parses
//! 6-byte command frames, answers with queued response bytes, and consumes
//! data blocks during writes. [`SimBus`] adapts it to the SPI seam and
//! advances the shared countdown by one tick per exchanged byte, so timed
//! waits elapse in byte-times.

use crate::clock::TickDriver;
use crate::{BusControl, BusSpeed};

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::blocking::spi::Transfer;
use switch_hal::OutputSwitch;

/// One recorded command frame: position of its first byte in the exchange
/// log, the 6-bit index, and the argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub offset: usize,
    pub index: u8,
    pub arg: u32,
}

enum Mode {
    Command,
    AwaitToken { multi: bool },
    Payload { multi: bool, buf: Vec<u8> },
}

pub struct SimCard {
    /// Byte driven while the card has nothing queued; 0xFF means ready.
    pub idle_byte: u8,
    /// CMD0 frames to swallow before answering with the idle response.
    pub cmd0_ignore: usize,
    /// ACMD41 polls answered "still idle" before reporting ready.
    pub acmd41_busy: usize,
    /// Whether the OCR advertises high capacity (block addressing).
    pub sdhc: bool,
    /// v1 card: rejects CMD8 with the illegal-command bit.
    pub old_card: bool,
    /// Forced CMD55 response, overriding the idle/ready default.
    pub cmd55_response: Option<u8>,
    /// Data response token after a received block.
    pub write_response: u8,
    /// CSD register served by CMD9.
    pub csd: [u8; 16],
    /// Backing store, keyed by block address.
    pub blocks: HashMap<u32, [u8; 512]>,
    /// Every byte the host clocked out, in order.
    pub log: Vec<u8>,
    /// Every command frame the card recognized.
    pub frames: Vec<Frame>,
    /// Bus speed changes requested by the host.
    pub speeds: Vec<BusSpeed>,

    out: VecDeque<u8>,
    frame: Vec<u8>,
    mode: Mode,
    idle: bool,
    write_lba: u32,
}

impl SimCard {
    pub fn new() -> Self {
        // v2 CSD with C_SIZE = 0x1000.
        let csd_raw: u128 = (0b01u128 << 126) | (0x1000u128 << 48);

        SimCard {
            idle_byte: 0xFF,
            cmd0_ignore: 0,
            acmd41_busy: 0,
            sdhc: true,
            old_card: false,
            cmd55_response: None,
            write_response: 0x05,
            csd: csd_raw.to_be_bytes(),
            blocks: HashMap::new(),
            log: Vec::new(),
            frames: Vec::new(),
            speeds: Vec::new(),
            out: VecDeque::new(),
            frame: Vec::new(),
            mode: Mode::Command,
            idle: false,
            write_lba: 0,
        }
    }

    /// Puts the card in the state following an accepted single-block write
    /// command, answering the block with `response`.
    pub fn expect_single_block(&mut self, lba: u32, response: u8) {
        self.mode = Mode::AwaitToken { multi: false };
        self.write_lba = lba;
        self.write_response = response;
    }

    /// Queues a full data-block read answer for `lba`.
    pub fn serve_block(&mut self, lba: u32) {
        self.out.extend([0xFF, 0xFE]);
        let block = self.stored_block(lba);
        self.out.extend(block);
        self.out.extend([0x00, 0x00]);
    }

    /// Full-duplex byte exchange, card side.
    pub fn exchange(&mut self, mosi: u8) -> u8 {
        let miso = self.out.pop_front().unwrap_or(self.idle_byte);
        self.log.push(mosi);
        self.advance(mosi);
        miso
    }

    fn advance(&mut self, mosi: u8) {
        let mode = std::mem::replace(&mut self.mode, Mode::Command);

        self.mode = match mode {
            Mode::Command => self.on_command_byte(mosi),
            Mode::AwaitToken { multi } => match mosi {
                0xFE | 0xFC => Mode::Payload {
                    multi,
                    buf: Vec::with_capacity(514),
                },
                0xFD if multi => {
                    // Stop token; the card goes busy briefly.
                    self.out.extend([0x00, 0x00]);
                    Mode::Command
                }
                _ => Mode::AwaitToken { multi },
            },
            Mode::Payload { multi, mut buf } => {
                buf.push(mosi);

                if buf.len() == 514 {
                    // 512 data bytes; the 2-byte CRC trailer is dropped.
                    let mut block = [0u8; 512];
                    block.copy_from_slice(&buf[..512]);
                    self.blocks.insert(self.write_lba, block);
                    self.write_lba += 1;

                    self.out.push_back(self.write_response);

                    if multi {
                        // Busy gap between streamed blocks; the host's
                        // ready-wait before the next block drains it. After
                        // a single block the line goes ready at once so the
                        // tests can drive the next transfer directly.
                        self.out.extend([0x00, 0x00]);
                        Mode::AwaitToken { multi: true }
                    } else {
                        Mode::Command
                    }
                } else {
                    Mode::Payload { multi, buf }
                }
            }
        };
    }

    fn on_command_byte(&mut self, mosi: u8) -> Mode {
        if self.frame.is_empty() {
            if mosi & 0xC0 == 0x40 {
                self.frame.push(mosi);
            }
            return Mode::Command;
        }

        self.frame.push(mosi);

        if self.frame.len() < 6 {
            return Mode::Command;
        }

        let mut frame = [0u8; 6];
        frame.copy_from_slice(&self.frame);
        self.frame.clear();

        self.handle_frame(frame)
    }

    fn handle_frame(&mut self, frame: [u8; 6]) -> Mode {
        let index = frame[0] & 0x3F;
        let arg = u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]);

        self.frames.push(Frame {
            offset: self.log.len() - 6,
            index,
            arg,
        });

        // A new command aborts whatever the card was still transmitting.
        self.out.clear();

        match index {
            0 => {
                if self.cmd0_ignore > 0 {
                    self.cmd0_ignore -= 1;
                } else {
                    self.idle = true;
                    self.out.push_back(0x01);
                }
            }
            8 => {
                if self.old_card {
                    self.out.push_back(0x05);
                } else {
                    self.out.extend([0x01, 0x00, 0x00, 0x01, 0xAA]);
                }
            }
            55 => {
                let default = if self.idle { 0x01 } else { 0x00 };
                let response = self.cmd55_response.unwrap_or(default);
                self.out.push_back(response);
            }
            41 => {
                if self.acmd41_busy > 0 {
                    self.acmd41_busy -= 1;
                    self.out.push_back(0x01);
                } else {
                    self.idle = false;
                    self.out.push_back(0x00);
                }
            }
            58 => {
                let ocr0 = if self.sdhc { 0xC0 } else { 0x80 };
                self.out.push_back(0x00);
                self.out.extend([ocr0, 0xFF, 0x80, 0x00]);
            }
            9 => {
                self.out.extend([0x00, 0xFF, 0xFE]);
                let csd = self.csd;
                self.out.extend(csd);
                self.out.extend([0x00, 0x00]);
            }
            13 => {
                self.out.extend([0x00, 0x00]);
            }
            17 => {
                self.out.push_back(0x00);
                self.serve_block(self.to_lba(arg));
            }
            18 => {
                self.out.push_back(0x00);
                let first = self.to_lba(arg);
                for i in 0..4 {
                    self.serve_block(first + i);
                }
            }
            12 => {
                // Stuff byte, then the response.
                self.out.extend([0xFF, 0x00]);
            }
            24 => {
                self.write_lba = self.to_lba(arg);
                self.out.push_back(0x00);
                return Mode::AwaitToken { multi: false };
            }
            25 => {
                self.write_lba = self.to_lba(arg);
                self.out.push_back(0x00);
                return Mode::AwaitToken { multi: true };
            }
            _ => {
                // Illegal command.
                self.out.push_back(0x04);
            }
        }

        Mode::Command
    }

    fn to_lba(&self, arg: u32) -> u32 {
        if self.sdhc {
            arg
        } else {
            arg / 512
        }
    }

    fn stored_block(&self, lba: u32) -> [u8; 512] {
        self.blocks.get(&lba).copied().unwrap_or([0u8; 512])
    }
}

/// SPI seam over a shared [`SimCard`], ticking the countdown per byte.
pub struct SimBus<'a> {
    card: Rc<RefCell<SimCard>>,
    ticks: TickDriver<'a>,
}

impl<'a> SimBus<'a> {
    pub fn new(card: Rc<RefCell<SimCard>>, ticks: TickDriver<'a>) -> Self {
        SimBus { card, ticks }
    }
}

impl Transfer<u8> for SimBus<'_> {
    type Error = Infallible;

    fn transfer<'w>(&mut self, words: &'w mut [u8]) -> Result<&'w [u8], Self::Error> {
        for word in words.iter_mut() {
            self.ticks.tick();
            *word = self.card.borrow_mut().exchange(*word);
        }

        Ok(words)
    }
}

impl BusControl for SimBus<'_> {
    fn set_speed(&mut self, speed: BusSpeed) {
        self.card.borrow_mut().speeds.push(speed);
    }
}

/// Chip-select stand-in; the simulated card ignores the select line.
pub struct SimCs;

impl OutputSwitch for SimCs {
    type Error = Infallible;

    fn on(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn off(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}
