use crate::config::Config;

/// Settings the pipeline stages read, extracted from [`Config`].
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub diarization_enabled: bool,
    pub diarization_max_duration_secs: f64,
    pub long_silence_threshold_secs: f64,
}

impl PipelineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            diarization_enabled: config.diarization.enabled,
            diarization_max_duration_secs: config.diarization.max_duration_secs,
            long_silence_threshold_secs: config.analytics.long_silence_threshold_secs,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}
