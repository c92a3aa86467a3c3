use std::path::Path;

use serde::Deserialize;

use super::process::{input_arg, render_args, run_command};
use super::Diarizer;
use crate::analysis::SpeakerTurn;
use crate::config::CommandConfig;
use crate::error::EngineError;
use crate::runtime::Deadline;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DiarizerOutput {
    Turns(Vec<SpeakerTurn>),
    Wrapped { turns: Vec<SpeakerTurn> },
}

/// Runs an external diarization command that prints speaker turns as JSON,
/// either a bare array or `{"turns": [...]}`.
pub struct CommandDiarizer {
    command: CommandConfig,
}

impl CommandDiarizer {
    pub fn new(command: &CommandConfig) -> Self {
        Self {
            command: command.clone(),
        }
    }
}

impl Diarizer for CommandDiarizer {
    fn diarize(&self, path: &Path, deadline: &Deadline) -> Result<Vec<SpeakerTurn>, EngineError> {
        if !path.exists() {
            return Err(EngineError::MissingInput(path.to_path_buf()));
        }
        let args = render_args(&self.command.args, &[("input", input_arg(path))]);
        let output = run_command(&self.command.program, &args, deadline.remaining())?;
        parse_turns(&self.command.program, &output.stdout)
    }
}

pub(crate) fn parse_turns(program: &str, stdout: &[u8]) -> Result<Vec<SpeakerTurn>, EngineError> {
    let output: DiarizerOutput =
        serde_json::from_slice(stdout).map_err(|e| EngineError::InvalidOutput {
            program: program.to_string(),
            reason: e.to_string(),
        })?;
    let mut turns = match output {
        DiarizerOutput::Turns(turns) | DiarizerOutput::Wrapped { turns } => turns,
    };
    turns.sort_by(|a, b| a.start.total_cmp(&b.start));
    Ok(turns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_array() {
        let turns = parse_turns(
            "diarize",
            br#"[{"start": 2.0, "end": 3.0, "speaker": "B"}, {"start": 0.0, "end": 2.0, "speaker": "A"}]"#,
        )
        .unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].speaker, "A");
    }

    #[test]
    fn test_parse_wrapped() {
        let turns = parse_turns(
            "diarize",
            br#"{"turns": [{"start": 0.0, "end": 1.0, "speaker": "SPEAKER_00"}]}"#,
        )
        .unwrap();
        assert_eq!(turns[0].speaker, "SPEAKER_00");
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse_turns("diarize", b"oops").is_err());
    }
}
