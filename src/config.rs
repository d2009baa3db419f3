/// Represents config for [`SdCardSpi`](crate::SdCardSpi).
///
/// Timing bounds are in milliseconds of the shared countdown; attempt
/// bounds are in byte-times on the bus.
pub trait SdSpiConfig {
    /// Max attempts of the "go idle" command during initialization.
    const GO_IDLE_ATTEMPTS: usize;
    /// Max byte exchanges to poll for an R1 response after a command.
    const RESPONSE_ATTEMPTS: usize;
    /// Max attempts of the app-op-cond command during negotiation.
    const OP_COND_ATTEMPTS: usize;
    /// Bound for the card-ready poll after asserting chip select.
    const SELECT_TIMEOUT_MS: u32;
    /// Bound for the start-of-data token poll on block reads.
    const READ_TOKEN_TIMEOUT_MS: u32;
    /// Bound for the not-busy poll before block writes.
    const WRITE_READY_TIMEOUT_MS: u32;
    /// Dummy clocking time after power up, before the first command.
    const POWER_UP_DELAY_MS: u32;
    /// Dummy filler bytes clocked before each "go idle" attempt.
    const DUMMY_CLOCK_BYTES: usize;
}

/// Default implementation of [`SdSpiConfig`].
pub struct DefaultSdSpiConfig;

impl SdSpiConfig for DefaultSdSpiConfig {
    const GO_IDLE_ATTEMPTS: usize = 255;
    const RESPONSE_ATTEMPTS: usize = 10;
    const OP_COND_ATTEMPTS: usize = 256;
    const SELECT_TIMEOUT_MS: u32 = 500;
    const READ_TOKEN_TIMEOUT_MS: u32 = 200;
    const WRITE_READY_TIMEOUT_MS: u32 = 500;
    const POWER_UP_DELAY_MS: u32 = 100;
    const DUMMY_CLOCK_BYTES: usize = 10;
}
