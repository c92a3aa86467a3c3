use std::path::Path;
use std::sync::Arc;

use serde_json::json;
use tracing::{debug, info, info_span, warn};

use crate::analysis::{assign_speakers, compute_analytics, distinct_speakers, parse_recording_filename};
use crate::catalog::{Enrichment, Transcript};
use crate::db::recording_repo::{self, TransitionOutcome};
use crate::db::Database;
use crate::engines::Engines;
use crate::error::EngineError;
use crate::runtime::Deadline;

use super::config::PipelineConfig;
use super::context::{DiarizationOutcome, PipelineContext};
use super::error::{PipelineError, PipelineWarning, Stage};
use super::progress::ProgressReporter;

pub struct Pipeline {
    db: Database,
    engines: Arc<Engines>,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(db: Database, engines: Arc<Engines>, config: PipelineConfig) -> Self {
        Self {
            db,
            engines,
            config,
        }
    }

    /// Runs every stage in order against a record the caller has claimed.
    /// The first fatal error stops the run; `ctx` keeps the stage it
    /// stopped in.
    pub fn run(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
        deadline: &Deadline,
    ) -> Result<(), PipelineError> {
        let _pipeline_span = info_span!("pipeline",
            recording_id = %ctx.recording.id,
            file_name = %ctx.recording.file_name,
        )
        .entered();

        for stage in Stage::ALL {
            ctx.current_stage = Some(stage);
            if deadline.is_expired() {
                return Err(timeout(stage, deadline));
            }
            progress.stage_started(stage);

            let _step = info_span!("stage", name = stage.as_str()).entered();
            match stage {
                Stage::ParseMetadata => self.step_parse_metadata(ctx),
                Stage::ExtractMetadata => self.step_extract_metadata(ctx, deadline)?,
                Stage::Transcribe => self.step_transcribe(ctx, progress, deadline)?,
                Stage::Diarization => self.step_diarization(ctx, deadline)?,
                Stage::Analytics => self.step_analytics(ctx)?,
                Stage::StoreResults => self.step_store_results(ctx)?,
            }
        }

        info!(
            "Recording {} processed in {:.1}s ({} warnings)",
            ctx.recording.id,
            deadline.elapsed().as_secs_f64(),
            ctx.warnings.len()
        );
        Ok(())
    }

    /// Best effort: a failure here is a warning, never fatal.
    fn step_parse_metadata(&self, ctx: &mut PipelineContext) {
        let mut caller = parse_recording_filename(&ctx.recording.file_name);

        if caller.caller_name.is_none() {
            if let Some(phone) = caller.phone_number.as_deref() {
                let lookup = &self.engines.caller_lookup;
                if let Some(name) = lookup.lookup(phone) {
                    caller.caller_name = Some(name);
                    caller.caller_name_source = Some(lookup.source().to_string());
                }
            }
        }

        if caller == Default::default() {
            debug!("No caller details in '{}'", ctx.recording.file_name);
            return;
        }

        if let Err(e) = recording_repo::update_caller_info(&self.db, &ctx.recording.id, &caller) {
            warn!("Failed to store caller details: {}", e);
            ctx.warnings
                .push(PipelineWarning::ParseMetadataFailed(e.to_string()));
        }
        ctx.caller = caller;
    }

    fn step_extract_metadata(
        &self,
        ctx: &mut PipelineContext,
        deadline: &Deadline,
    ) -> Result<(), PipelineError> {
        let stage = Stage::ExtractMetadata;
        let audio = self
            .engines
            .prober
            .probe(Path::new(&ctx.recording.file_path), deadline)
            .map_err(|e| engine_failure(stage, deadline, e))?;

        recording_repo::update_audio_metadata(&self.db, &ctx.recording.id, &audio)
            .map_err(|source| PipelineError::Database { stage, source })?;

        debug!(
            "Probed {:?}s, codec {:?}",
            audio.duration_sec, audio.codec
        );
        ctx.audio = Some(audio);
        Ok(())
    }

    fn step_transcribe(
        &self,
        ctx: &mut PipelineContext,
        progress: &dyn ProgressReporter,
        deadline: &Deadline,
    ) -> Result<(), PipelineError> {
        let mut seen: Option<u32> = None;
        let result = self.engines.transcriber.transcribe(
            Path::new(&ctx.recording.file_path),
            deadline,
            &mut |count| {
                let count = u32::try_from(count).unwrap_or(u32::MAX);
                seen = Some(count);
                progress.segments(count);
            },
        );
        ctx.segments_seen = seen;

        let transcription =
            result.map_err(|e| engine_failure(Stage::Transcribe, deadline, e))?;
        ctx.segments_seen = Some(u32::try_from(transcription.segments.len()).unwrap_or(u32::MAX));
        debug!(
            "Transcribed {} segments, language {:?}",
            transcription.segments.len(),
            transcription.language
        );
        ctx.transcription = Some(transcription);
        Ok(())
    }

    /// Policy skips and engine failures degrade to an enrichment without
    /// speakers. Only the task deadline is fatal here.
    fn step_diarization(
        &self,
        ctx: &mut PipelineContext,
        deadline: &Deadline,
    ) -> Result<(), PipelineError> {
        let skip = |reason: String| DiarizationOutcome::Skipped { reason };

        if !self.config.diarization_enabled {
            ctx.diarization = skip("disabled".to_string());
            return Ok(());
        }
        let Some(diarizer) = self.engines.diarizer.as_ref() else {
            ctx.diarization = skip("no diarizer configured".to_string());
            return Ok(());
        };
        if let Some(duration) = ctx.duration() {
            if duration > self.config.diarization_max_duration_secs {
                ctx.diarization = skip(format!(
                    "duration {:.1}s exceeds limit {:.1}s",
                    duration, self.config.diarization_max_duration_secs
                ));
                return Ok(());
            }
        }

        match diarizer.diarize(Path::new(&ctx.recording.file_path), deadline) {
            Ok(turns) => {
                let speakers = distinct_speakers(&turns).len();
                if let Some(t) = ctx.transcription.as_mut() {
                    assign_speakers(&mut t.segments, &turns);
                }
                debug!("Diarized {} turns, {} speakers", turns.len(), speakers);
                ctx.diarization = DiarizationOutcome::Applied { speakers };
                Ok(())
            }
            Err(e) if deadline.is_expired() => Err(engine_failure(Stage::Diarization, deadline, e)),
            Err(e) => {
                warn!("Diarization failed, continuing without speakers: {}", e);
                ctx.warnings
                    .push(PipelineWarning::DiarizationFailed(e.to_string()));
                ctx.diarization = DiarizationOutcome::Failed {
                    reason: format!("failed: {}", e),
                };
                Ok(())
            }
        }
    }

    fn step_analytics(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let duration = ctx.duration();
        let Some(transcription) = ctx.transcription.as_ref() else {
            return Err(PipelineError::Analytics("no transcription".to_string()));
        };

        if let Some(bad) = transcription
            .segments
            .iter()
            .find(|s| !s.start.is_finite() || !s.end.is_finite() || s.end < s.start)
        {
            return Err(PipelineError::Analytics(format!(
                "invalid segment timing {}..{}",
                bad.start, bad.end
            )));
        }

        let analytics = compute_analytics(
            &transcription.segments,
            duration,
            self.config.long_silence_threshold_secs,
        );
        ctx.analytics = Some(analytics);
        Ok(())
    }

    fn step_store_results(&self, ctx: &mut PipelineContext) -> Result<(), PipelineError> {
        let stage = Stage::StoreResults;
        let (Some(transcription), Some(analytics)) =
            (ctx.transcription.as_ref(), ctx.analytics.as_ref())
        else {
            return Err(PipelineError::Analytics("nothing to store".to_string()));
        };

        let transcriber = &self.engines.transcriber;
        let transcript = Transcript {
            recording_id: ctx.recording.id.clone(),
            model_name: transcriber.model_name().to_string(),
            beam_size: transcriber.beam_size().map(i64::from),
            compute_type: transcriber.compute_type().map(str::to_string),
            language: transcription.language.clone(),
            language_probability: transcription.language_probability,
            text: transcription.text.clone(),
            segments: transcription.segments.clone(),
            transcript_json: Some(json!({
                "language": transcription.language,
                "language_probability": transcription.language_probability,
                "duration": transcription.duration,
                "segments": transcription.segments,
            })),
        };

        let mut enrichment = Enrichment {
            recording_id: ctx.recording.id.clone(),
            ..Default::default()
        };
        analytics.apply_to(&mut enrichment);
        match &ctx.diarization {
            DiarizationOutcome::Applied { speakers } => {
                enrichment.diarization_enabled = true;
                enrichment.speaker_count = enrichment.speaker_count.max(*speakers as i64);
            }
            DiarizationOutcome::Skipped { reason } => {
                enrichment.diarization_pending = true;
                enrichment.diarization_skip_reason = Some(reason.clone());
            }
            DiarizationOutcome::Failed { reason } => {
                enrichment.diarization_skip_reason = Some(reason.clone());
            }
            DiarizationOutcome::NotRun => {}
        }

        match recording_repo::complete(
            &self.db,
            &ctx.recording.id,
            ctx.recording.claim_token.as_deref(),
            &transcript,
            &enrichment,
        )
        .map_err(|source| PipelineError::Database { stage, source })?
        {
            TransitionOutcome::Applied { .. } => Ok(()),
            TransitionOutcome::Rejected { from } => Err(PipelineError::Superseded { status: from }),
            TransitionOutcome::NotFound => Err(PipelineError::Vanished),
        }
    }
}

fn timeout(stage: Stage, deadline: &Deadline) -> PipelineError {
    PipelineError::Timeout {
        stage,
        limit: deadline.limit().unwrap_or_default(),
    }
}

/// Engine errors after the task deadline passed are timeouts, whatever
/// the engine reported.
fn engine_failure(stage: Stage, deadline: &Deadline, source: EngineError) -> PipelineError {
    if deadline.is_expired() {
        timeout(stage, deadline)
    } else {
        PipelineError::Engine { stage, source }
    }
}
