//! Polling engine
//!
//! One cycle sends every primary command to every card, then each
//! multi-function command once. Every request is fully round-tripped before
//! the next one is built:
//!
//! ```text
//! Idle -> Building -> Awaiting -> Decoding -> Collected -> Idle
//! ```
//!
//! Per-request failures (no reply, short reply, wrong header, error code)
//! only drop that reading. Transport failures abort the cycle.

use crate::core::protocol::{
    build_frame, decode, validate_response, CommandSet, CommandTemplate, DecoderKind,
    ProtocolError, Telemetry, RESPONSE_OVERHEAD,
};
use crate::core::transport::{Transport, TransportError, DEFAULT_READ_TIMEOUT};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Card indexes fit in one request byte
pub const MAX_CARDS: u32 = 256;

/// Polling error types
#[derive(Error, Debug)]
pub enum PollError {
    /// The transport failed, the cycle is aborted
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A request could not be built
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// More cards than the card index byte can address
    #[error("Cannot poll {0} cards, at most {MAX_CARDS} are addressable")]
    TooManyCards(u32),
}

/// Polling parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollerConfig {
    /// Number of cards polled with the primary commands
    pub cards: u32,
    /// Also poll the multi-function commands
    pub multifunction: bool,
    /// How long to wait for each reply
    pub read_timeout: Duration,
    /// Lower bound on the expected response length
    pub min_response_len: Option<usize>,
}

impl PollerConfig {
    /// Create a configuration polling `cards` cards
    pub fn new(cards: u32) -> Self {
        Self {
            cards,
            multifunction: false,
            read_timeout: DEFAULT_READ_TIMEOUT,
            min_response_len: None,
        }
    }

    /// Enable multi-function polling
    #[must_use]
    pub fn multifunction(mut self, enable: bool) -> Self {
        self.multifunction = enable;
        self
    }

    /// Set the read timeout
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Length a complete reply to `template` must have
    ///
    /// The template's own response length, raised to `min_response_len` when
    /// that is larger. Never below the bare response overhead.
    pub fn expected_len(&self, template: &CommandTemplate) -> usize {
        template
            .response_len()
            .max(self.min_response_len.unwrap_or(0))
            .max(RESPONSE_OVERHEAD)
    }
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self::new(1)
    }
}

/// A decoded reading and the card it came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CardReading {
    /// Card index the request was addressed to
    pub card: u8,
    /// Decoded telemetry
    #[serde(flatten)]
    pub telemetry: Telemetry,
}

/// Readings collected for one command, in polling order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandReadings {
    /// Command name
    pub command: String,
    /// Decoder used for the replies
    pub kind: DecoderKind,
    /// One entry per card that answered
    pub readings: Vec<CardReading>,
}

/// Request counters of one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleStats {
    /// Requests written
    pub requests: u32,
    /// Readings collected
    pub readings: u32,
    /// Requests without any reply
    pub timeouts: u32,
    /// Replies that were short, malformed or carried an error code
    pub rejected: u32,
}

/// Readings of one polling cycle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResultSet {
    commands: Vec<CommandReadings>,
    stats: CycleStats,
}

impl ResultSet {
    /// Create an empty result set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a reading under `template`'s name
    pub fn push(&mut self, template: &CommandTemplate, reading: CardReading) {
        match self.commands.iter_mut().find(|c| c.command == template.name()) {
            Some(entry) => entry.readings.push(reading),
            None => self.commands.push(CommandReadings {
                command: template.name().to_string(),
                kind: template.kind(),
                readings: vec![reading],
            }),
        }
    }

    /// Readings of a command, in polling order
    pub fn get(&self, command: &str) -> Option<&[CardReading]> {
        self.commands
            .iter()
            .find(|c| c.command == command)
            .map(|c| c.readings.as_slice())
    }

    /// Commands that produced at least one reading, in polling order
    pub fn commands(&self) -> &[CommandReadings] {
        &self.commands
    }

    /// Cycle counters
    pub fn stats(&self) -> CycleStats {
        self.stats
    }

    /// Total number of readings
    pub fn len(&self) -> usize {
        self.commands.iter().map(|c| c.readings.len()).sum()
    }

    /// Whether no reading was collected
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Sequential poller owning its transport
pub struct Poller<T: Transport> {
    transport: T,
    commands: CommandSet,
    config: PollerConfig,
}

impl<T: Transport> Poller<T> {
    /// Create a poller
    pub fn new(transport: T, commands: CommandSet, config: PollerConfig) -> Self {
        Self {
            transport,
            commands,
            config,
        }
    }

    /// Polling parameters
    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Commands sent each cycle
    pub fn commands(&self) -> &CommandSet {
        &self.commands
    }

    /// Run one polling cycle
    pub fn run_cycle(&mut self) -> Result<ResultSet, PollError> {
        let Self {
            transport,
            commands,
            config,
        } = self;

        if config.cards > MAX_CARDS {
            return Err(PollError::TooManyCards(config.cards));
        }

        info!(
            "Polling {} card(s), multi-function {}",
            config.cards,
            if config.multifunction { "on" } else { "off" }
        );

        let mut results = ResultSet::new();

        for template in commands.primary() {
            for card in 0..config.cards {
                // MAX_CARDS keeps the index within a byte
                let card = u8::try_from(card).map_err(|_| PollError::TooManyCards(config.cards))?;
                Self::poll_one(transport, config, template, card, &mut results)?;
            }
        }

        if config.multifunction {
            for template in commands.multifunction() {
                let card = template.baked_card_index();
                Self::poll_one(transport, config, template, card, &mut results)?;
            }
        }

        let stats = results.stats;
        info!(
            "Cycle done: {} reading(s) from {} request(s), {} timeout(s), {} rejected",
            stats.readings, stats.requests, stats.timeouts, stats.rejected
        );

        Ok(results)
    }

    fn poll_one(
        transport: &mut T,
        config: &PollerConfig,
        template: &CommandTemplate,
        card: u8,
        results: &mut ResultSet,
    ) -> Result<(), PollError> {
        let frame = build_frame(template, card)?;
        debug!("TX {} card {}: {}", template.name(), card, frame);

        transport.write(frame.as_bytes())?;
        results.stats.requests += 1;

        let expected = config.expected_len(template);
        let raw = transport.read(expected, config.read_timeout)?;

        match validate_response(raw, expected) {
            Ok(response) => {
                debug!("RX {} card {}: {}", template.name(), card, response);
                let telemetry = decode(template.kind(), &response);
                results.push(template, CardReading { card, telemetry });
                results.stats.readings += 1;
                Ok(())
            }
            Err(ProtocolError::Timeout) => {
                warn!("{} card {}: {}", template.name(), card, ProtocolError::Timeout);
                results.stats.timeouts += 1;
                Ok(())
            }
            Err(e) if e.is_recoverable() => {
                warn!("{} card {}: {}", template.name(), card, e);
                results.stats.rejected += 1;
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Give the transport back
    pub fn into_transport(self) -> T {
        self.transport
    }
}
