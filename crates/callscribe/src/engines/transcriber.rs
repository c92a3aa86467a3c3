use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::process::{input_arg, render_args, run_streaming};
use super::{Transcriber, Transcription};
use crate::catalog::TranscriptSegment;
use crate::config::TranscriberConfig;
use crate::error::EngineError;
use crate::runtime::Deadline;

/// One stdout line of the transcription command. Segment lines carry
/// timings; the summary line carries the detected language.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TranscriberLine {
    Segment { start: f64, end: f64, text: String },
    Info {
        language: Option<String>,
        language_probability: Option<f64>,
        duration: Option<f64>,
    },
}

/// Runs an external speech-to-text command that prints JSON lines.
pub struct CommandTranscriber {
    config: TranscriberConfig,
}

impl CommandTranscriber {
    pub fn new(config: &TranscriberConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn args(&self, path: &Path) -> Vec<String> {
        render_args(
            &self.config.command.args,
            &[
                ("model", self.config.model.clone()),
                ("language", self.config.language.clone()),
                ("beam_size", self.config.beam_size.to_string()),
                ("compute_type", self.config.compute_type.clone()),
                ("input", input_arg(path)),
            ],
        )
    }
}

impl Transcriber for CommandTranscriber {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn beam_size(&self) -> Option<u32> {
        Some(self.config.beam_size)
    }

    fn compute_type(&self) -> Option<&str> {
        Some(&self.config.compute_type)
    }

    fn transcribe(
        &self,
        path: &Path,
        deadline: &Deadline,
        on_segment: &mut dyn FnMut(usize),
    ) -> Result<Transcription, EngineError> {
        if !path.exists() {
            return Err(EngineError::MissingInput(path.to_path_buf()));
        }

        let program = &self.config.command.program;
        let mut collector = LineCollector::default();
        let timeout = deadline.clamp(self.config.timeout_secs.map(Duration::from_secs));
        run_streaming(program, &self.args(path), timeout, |line| {
            if collector.accept(line) {
                on_segment(collector.segments.len());
            }
        })?;

        Ok(collector.finish())
    }
}

#[derive(Default)]
struct LineCollector {
    segments: Vec<TranscriptSegment>,
    language: Option<String>,
    language_probability: Option<f64>,
    duration: Option<f64>,
}

impl LineCollector {
    /// Returns true when the line added a segment.
    fn accept(&mut self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }
        match serde_json::from_str::<TranscriberLine>(line) {
            Ok(TranscriberLine::Segment { start, end, text }) => {
                self.segments.push(TranscriptSegment {
                    start,
                    end,
                    text: text.trim().to_string(),
                    speaker: None,
                });
                true
            }
            Ok(TranscriberLine::Info {
                language,
                language_probability,
                duration,
            }) => {
                self.language = language.or(self.language.take());
                self.language_probability = language_probability.or(self.language_probability);
                self.duration = duration.or(self.duration);
                false
            }
            Err(_) => {
                log::debug!("Ignoring non-JSON transcriber output: {}", line);
                false
            }
        }
    }

    fn finish(self) -> Transcription {
        let text = self
            .segments
            .iter()
            .map(|s| s.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Transcription {
            language: self.language,
            language_probability: self.language_probability,
            duration: self.duration,
            text,
            segments: self.segments,
        }
    }
}
