use serde::{Deserialize, Serialize};

use crate::catalog::TranscriptSegment;

/// A stretch of audio attributed to one speaker by the diarizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeakerTurn {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

/// Labels each transcript segment with the speaker whose turns overlap it
/// the most. Segments without any overlap keep no speaker.
pub fn assign_speakers(segments: &mut [TranscriptSegment], turns: &[SpeakerTurn]) {
    for segment in segments.iter_mut() {
        let mut best: Option<(&str, f64)> = None;
        for turn in turns {
            let overlap = segment.end.min(turn.end) - segment.start.max(turn.start);
            if overlap > best.map_or(0.0, |(_, o)| o) {
                best = Some((turn.speaker.as_str(), overlap));
            }
        }
        segment.speaker = best.map(|(speaker, _)| speaker.to_string());
    }
}

/// Distinct speakers in first-seen order.
pub fn distinct_speakers(turns: &[SpeakerTurn]) -> Vec<String> {
    let mut speakers: Vec<String> = Vec::new();
    for turn in turns {
        if !speakers.contains(&turn.speaker) {
            speakers.push(turn.speaker.clone());
        }
    }
    speakers
}
