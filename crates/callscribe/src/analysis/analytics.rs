//! Talk/silence statistics over a timed transcript.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::json;

use crate::catalog::{Enrichment, TranscriptSegment};

#[derive(Debug, Clone, PartialEq)]
pub struct CallAnalytics {
    pub total_speech_time: f64,
    pub total_silence_time: f64,
    pub talk_time_ratio: f64,
    pub silence_ratio: f64,
    pub segment_count: usize,
    pub avg_segment_length: f64,
    pub speaker_count: usize,
    pub speaker_turns: usize,
    pub long_silence_count: usize,
    pub long_silence_threshold_sec: f64,
    pub speaker_talk_times: BTreeMap<String, f64>,
    pub details: serde_json::Value,
}

impl CallAnalytics {
    /// Copies the statistics into an enrichment row. Diarization fields are
    /// left to the caller.
    pub fn apply_to(&self, enrichment: &mut Enrichment) {
        enrichment.speaker_count = self.speaker_count as i64;
        enrichment.total_speech_time = self.total_speech_time;
        enrichment.total_silence_time = self.total_silence_time;
        enrichment.talk_time_ratio = self.talk_time_ratio;
        enrichment.silence_ratio = self.silence_ratio;
        enrichment.segment_count = self.segment_count as i64;
        enrichment.avg_segment_length = self.avg_segment_length;
        enrichment.speaker_turns = self.speaker_turns as i64;
        enrichment.long_silence_count = self.long_silence_count as i64;
        enrichment.long_silence_threshold_sec = self.long_silence_threshold_sec;
        enrichment.analytics_json = Some(self.details.clone());
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Computes analytics. `duration` is the probed audio length; when unknown
/// the ratios are taken against speech plus silence.
pub fn compute_analytics(
    segments: &[TranscriptSegment],
    duration: Option<f64>,
    long_silence_threshold: f64,
) -> CallAnalytics {
    let duration = duration.filter(|d| *d > 0.0);

    if segments.is_empty() {
        return CallAnalytics {
            total_speech_time: 0.0,
            total_silence_time: duration.unwrap_or(0.0),
            talk_time_ratio: 0.0,
            silence_ratio: if duration.is_some() { 1.0 } else { 0.0 },
            segment_count: 0,
            avg_segment_length: 0.0,
            speaker_count: 0,
            speaker_turns: 0,
            long_silence_count: 0,
            long_silence_threshold_sec: long_silence_threshold,
            speaker_talk_times: BTreeMap::new(),
            details: json!({}),
        };
    }

    let mut sorted: Vec<&TranscriptSegment> = segments.iter().collect();
    sorted.sort_by(|a, b| a.start.total_cmp(&b.start));

    let total_speech_time: f64 = segments.iter().map(TranscriptSegment::duration).sum();

    let mut silences = Vec::new();
    if sorted[0].start > 0.0 {
        silences.push(sorted[0].start);
    }
    for pair in sorted.windows(2) {
        let gap = pair[1].start - pair[0].end;
        if gap > 0.0 {
            silences.push(gap);
        }
    }
    if let Some(d) = duration {
        let last_end = sorted[sorted.len() - 1].end;
        if last_end < d {
            silences.push(d - last_end);
        }
    }
    let total_silence_time: f64 = silences.iter().sum();

    let effective_duration = duration.unwrap_or(total_speech_time + total_silence_time);
    let (talk_time_ratio, silence_ratio) = if effective_duration > 0.0 {
        (
            total_speech_time / effective_duration,
            total_silence_time / effective_duration,
        )
    } else {
        (0.0, 0.0)
    };

    let mut speakers = BTreeSet::new();
    let mut speaker_talk_times: BTreeMap<String, f64> = BTreeMap::new();
    let mut speaker_turns = 0;
    let mut last_speaker: Option<&str> = None;
    for seg in &sorted {
        if let Some(speaker) = seg.speaker.as_deref() {
            speakers.insert(speaker);
            *speaker_talk_times.entry(speaker.to_string()).or_default() += seg.duration();
            if last_speaker != Some(speaker) {
                speaker_turns += 1;
                last_speaker = Some(speaker);
            }
        }
    }

    let long_silences: Vec<f64> = silences
        .iter()
        .filter(|s| **s >= long_silence_threshold)
        .map(|s| round2(*s))
        .collect();

    let details = json!({
        "speech_time_sec": round2(total_speech_time),
        "silence_time_sec": round2(total_silence_time),
        "effective_duration_sec": round2(effective_duration),
        "segment_lengths": sorted.iter().map(|s| round2(s.duration())).collect::<Vec<_>>(),
        "silence_lengths": silences.iter().map(|s| round2(*s)).collect::<Vec<_>>(),
        "speaker_talk_times": speaker_talk_times
            .iter()
            .map(|(k, v)| (k.clone(), json!(round2(*v))))
            .collect::<serde_json::Map<_, _>>(),
        "long_silences": long_silences,
    });

    let segment_count = segments.len();
    CallAnalytics {
        total_speech_time,
        total_silence_time,
        talk_time_ratio,
        silence_ratio,
        segment_count,
        avg_segment_length: total_speech_time / segment_count as f64,
        speaker_count: speakers.len(),
        speaker_turns,
        long_silence_count: long_silences.len(),
        long_silence_threshold_sec: long_silence_threshold,
        speaker_talk_times,
        details,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start: f64, end: f64, speaker: Option<&str>) -> TranscriptSegment {
        TranscriptSegment {
            start,
            end,
            text: "x".to_string(),
            speaker: speaker.map(str::to_string),
        }
    }

    fn sample() -> Vec<TranscriptSegment> {
        vec![
            seg(0.0, 3.0, Some("SPEAKER_0")),
            seg(3.5, 5.5, Some("SPEAKER_1")),
            seg(6.0, 8.0, Some("SPEAKER_0")),
        ]
    }

    #[test]
    fn test_empty_segments_with_duration() {
        let a = compute_analytics(&[], Some(60.0), 5.0);
        assert_eq!(a.total_speech_time, 0.0);
        assert_eq!(a.total_silence_time, 60.0);
        assert_eq!(a.silence_ratio, 1.0);
        assert_eq!(a.segment_count, 0);
    }

    #[test]
    fn test_empty_segments_without_duration() {
        let a = compute_analytics(&[], None, 5.0);
        assert_eq!(a.total_silence_time, 0.0);
        assert_eq!(a.silence_ratio, 0.0);
    }

    #[test]
    fn test_single_segment_gaps() {
        let a = compute_analytics(&[seg(10.0, 20.0, None)], Some(60.0), 5.0);
        assert_eq!(a.total_speech_time, 10.0);
        assert_eq!(a.total_silence_time, 50.0);
        assert!((a.talk_time_ratio - 10.0 / 60.0).abs() < 1e-9);
        assert_eq!(a.avg_segment_length, 10.0);
        assert_eq!(a.long_silence_count, 2);
    }

    #[test]
    fn test_speakers_and_turns() {
        let a = compute_analytics(&sample(), Some(8.0), 5.0);
        assert_eq!(a.total_speech_time, 7.0);
        assert_eq!(a.speaker_count, 2);
        assert_eq!(a.speaker_turns, 3);
        assert_eq!(a.speaker_talk_times["SPEAKER_0"], 5.0);
        assert_eq!(a.speaker_talk_times["SPEAKER_1"], 2.0);
        assert_eq!(a.long_silence_count, 0);
    }

    #[test]
    fn test_consecutive_same_speaker_is_one_turn() {
        let segments = vec![seg(0.0, 1.0, Some("A")), seg(1.0, 2.0, Some("A"))];
        assert_eq!(compute_analytics(&segments, None, 5.0).speaker_turns, 1);
    }

    #[test]
    fn test_duration_inferred_from_segments() {
        let segments = vec![seg(0.0, 4.0, None), seg(6.0, 10.0, None)];
        let a = compute_analytics(&segments, None, 5.0);
        assert_eq!(a.total_speech_time, 8.0);
        assert_eq!(a.total_silence_time, 2.0);
        assert!((a.talk_time_ratio - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_details_and_enrichment() {
        let a = compute_analytics(&sample(), Some(20.0), 5.0);
        assert_eq!(a.details["long_silences"], json!([12.0]));
        assert_eq!(a.details["speaker_talk_times"]["SPEAKER_1"], json!(2.0));

        let mut enrichment = Enrichment::default();
        a.apply_to(&mut enrichment);
        assert_eq!(enrichment.segment_count, 3);
        assert_eq!(enrichment.long_silence_count, 1);
        assert!(enrichment.analytics_json.is_some());
    }
}
