use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::process::{input_arg, run_command};
use super::MetadataProber;
use crate::catalog::AudioMetadata;
use crate::config::ProbeConfig;
use crate::error::EngineError;
use crate::runtime::Deadline;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    channels: Option<i64>,
    sample_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
    bit_rate: Option<String>,
}

/// Reads container and stream details with `ffprobe`.
pub struct FfprobeProber {
    program: String,
    timeout: Duration,
}

impl FfprobeProber {
    pub fn new(config: &ProbeConfig) -> Self {
        Self {
            program: config.program.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }
}

impl MetadataProber for FfprobeProber {
    fn probe(&self, path: &Path, deadline: &Deadline) -> Result<AudioMetadata, EngineError> {
        if !path.exists() {
            return Err(EngineError::MissingInput(path.to_path_buf()));
        }

        let args: Vec<String> = [
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]
        .iter()
        .map(|s| s.to_string())
        .chain(std::iter::once(input_arg(path)))
        .collect();

        let output = run_command(&self.program, &args, deadline.clamp(Some(self.timeout)))?;
        parse_probe_output(&self.program, &output.stdout)
    }
}

fn positive<T: PartialOrd + Default>(v: Option<T>) -> Option<T> {
    v.filter(|x| *x > T::default())
}

pub(crate) fn parse_probe_output(program: &str, stdout: &[u8]) -> Result<AudioMetadata, EngineError> {
    let raw: serde_json::Value =
        serde_json::from_slice(stdout).map_err(|e| EngineError::InvalidOutput {
            program: program.to_string(),
            reason: e.to_string(),
        })?;
    let probe: ProbeOutput =
        serde_json::from_value(raw.clone()).map_err(|e| EngineError::InvalidOutput {
            program: program.to_string(),
            reason: e.to_string(),
        })?;

    let mut meta = AudioMetadata::default();
    if let Some(format) = probe.format {
        meta.duration_sec = positive(format.duration.and_then(|d| d.parse().ok()));
        meta.bit_rate = positive(format.bit_rate.and_then(|b| b.parse().ok()));
        meta.container = format.format_name;
    }

    if let Some(stream) = probe
        .streams
        .into_iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"))
    {
        meta.sample_rate = positive(stream.sample_rate.and_then(|s| s.parse().ok()));
        meta.channels = stream.channels;
        meta.codec = stream.codec_name;
    }

    meta.raw = Some(raw);
    Ok(meta)
}
