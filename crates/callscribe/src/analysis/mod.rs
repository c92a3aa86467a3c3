//! Pure computations over recordings: file-name parsing, speaker assignment
//! and call analytics.

pub mod analytics;
pub mod filename;
pub mod speakers;

pub use analytics::{compute_analytics, CallAnalytics};
pub use filename::{is_phone_number, normalize_phone_number, parse_recording_filename};
pub use speakers::{assign_speakers, distinct_speakers, SpeakerTurn};
