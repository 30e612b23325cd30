//! Value types for the tunersched recording scheduler.
//!
//! This crate defines the neutral model shared between the scheduling
//! engine and the backends that store cards, channels, program listings,
//! schedules and rules.
//!
//! # Overview
//!
//! - [`Card`], [`TuningDetail`], [`Transmitter`]: tuner resources and how
//!   a card receives a channel
//! - [`Channel`], [`ChannelGroup`], [`Program`]: the program guide
//! - [`Schedule`], [`CanceledSchedule`]: persisted recording intents
//! - [`ScheduleRule`]: templates recording every matching program
//! - [`Conflict`]: occurrences that could not both get a card
//! - [`Recording`], [`KnownSeries`]: what is already recorded
//!
//! # Example
//!
//! ```rust
//! use tunersched_protocol::Transmitter;
//!
//! let a = Transmitter::DvbT { frequency: 506_000, bandwidth: 8 };
//! let b = Transmitter::DvbT { frequency: 506_000, bandwidth: 8 };
//! assert!(a.same_transmitter(&b));
//!
//! let cable = Transmitter::DvbC { frequency: 506_000, modulation: 64, symbol_rate: 6900 };
//! assert!(!a.same_transmitter(&cable));
//! ```

pub mod error;
pub mod types;

pub use error::{ProtocolError, ProviderError, ProviderResult};
pub use types::{
    time_in_range, titles_equal, weekday_from_number, weekday_in_range, weekday_of,
    CanceledSchedule, Card, CardId, Channel, ChannelGroup, ChannelGroupId, ChannelId, Conflict,
    EpisodeInfoFallback, EpisodeManagementScheme, KeepMethod, KnownEpisode, KnownSeries, Program,
    ProgramId, Recording, RecordingStatus, RuleId, RuleRecordingType, RuleSearchMatch,
    RuleSearchTarget, Schedule, ScheduleId, ScheduleRecordingType, ScheduleRule, SearchTarget,
    Transmitter, TuningDetail, MANUAL_RECORDING_TITLE,
};
