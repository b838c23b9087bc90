//! Application context tying settings, the session machine, the remote API
//! and audio capture together. Front ends drive it and render the returned
//! events; it holds no global state.

use crate::api::{ApiChoice, SessionApi, StartRequest, VoiceRequest};
use crate::audio::capture::CaptureSource;
use crate::audio::resample::Resampler;
use crate::audio::{CapturePipeline, effective_record_secs, wav};
use crate::config::Config;
use crate::error::Result;
use crate::session::{Role, SessionMachine, Status, UiEvent};
use crate::settings::{InputMode, Settings, SettingsStore, SettingsUpdate};
use crate::transport::encode_binary;

pub const DEFAULT_SCENARIO: &str = "business";

const NO_DEVICE_NOTICE: &str = "No audio input device available.";
const NO_SPEECH_NOTICE: &str = "No speech detected. Try again.";
const RECORD_AGAIN_NOTICE: &str = "Tap record to speak again.";
const SESSION_ENDED_NOTICE: &str = "The conversation has ended. Reset or start a new session.";
const NO_SESSION_NOTICE: &str = "Start a session before recording.";

pub struct Coach<A, S> {
    config: Config,
    settings: Settings,
    store: SettingsStore,
    machine: SessionMachine,
    api: A,
    capture: CapturePipeline<S>,
}

impl<A: SessionApi, S: CaptureSource> Coach<A, S> {
    /// Build a context, loading persisted settings from `store`.
    pub fn new(config: Config, store: SettingsStore, api: A, source: S) -> Self {
        let settings = store.load();
        tracing::debug!(
            "settings: timeout {}s, record {}s, tts {}, mode {}",
            settings.timeout_seconds,
            settings.record_seconds(),
            settings.tts_enabled,
            settings.input_mode
        );

        Self {
            config,
            settings,
            store,
            machine: SessionMachine::new(),
            api,
            capture: CapturePipeline::new(source),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub const fn session(&self) -> &SessionMachine {
        &self.machine
    }

    #[must_use]
    pub const fn status(&self) -> Status {
        self.machine.status()
    }

    #[must_use]
    pub fn is_recording(&self) -> bool {
        self.capture.is_recording()
    }

    /// Seconds a voice capture will actually last.
    #[must_use]
    pub fn record_seconds(&self) -> u32 {
        effective_record_secs(self.settings.record_seconds())
    }

    /// Adopt the server's default record duration when the user never chose
    /// one. Failures are ignored and the built-in default stays in effect.
    pub async fn seed_record_default(&mut self) {
        if self.settings.has_record_seconds() {
            return;
        }

        match self.api.config().await {
            Ok(server) => match server.record_seconds_default {
                Some(secs) if secs > 0 => {
                    tracing::debug!("using server record default of {secs}s");
                    self.settings.set_record_seconds(secs);
                }
                _ => tracing::debug!("server has no record default"),
            },
            Err(e) => tracing::debug!("could not fetch server config: {e}"),
        }
    }

    /// Open a new session for `scenario`, replacing any current one.
    pub async fn start(&mut self, scenario: &str, api_choice: ApiChoice) -> Vec<UiEvent> {
        let mut events = self.machine.begin_start();

        let request = StartRequest {
            scenario_key: scenario.to_string(),
            api_choice,
            timeout_seconds: self.settings.timeout_seconds,
            tts_enabled: self.settings.tts_enabled,
            input_mode: self.settings.input_mode,
        };
        tracing::info!("starting scenario {scenario} with {api_choice}");

        let result = self.api.start(&request).await;
        events.extend(self.machine.apply_start(result));
        self.present(events)
    }

    /// Submit one user turn. Blank text, or text sent without an active
    /// session, produces no request and no events.
    pub async fn send(&mut self, text: &str) -> Vec<UiEvent> {
        let Some((request, mut events)) = self.machine.begin_turn(text) else {
            return Vec::new();
        };

        let result = self.api.message(&request).await;
        events.extend(self.machine.apply_turn(result));
        self.present(events)
    }

    /// Capture speech for `duration_secs` and transcribe it.
    ///
    /// `Ok(None)` when a capture is already running. An empty string means
    /// the server heard no speech.
    pub async fn transcribe_capture(&self, duration_secs: u32) -> Result<Option<String>> {
        let Some(waveform) = self.capture.capture(duration_secs).await? else {
            return Ok(None);
        };

        let resampler = Resampler::new(self.config.audio.target_rate)?;
        let waveform = resampler.resample(waveform);
        let payload = wav::encode(&waveform)?;
        tracing::debug!(
            "encoded {} samples ({} bytes) for transcription",
            payload.sample_count(),
            payload.bytes.len()
        );

        let request = VoiceRequest {
            audio_base64: encode_binary(&payload.bytes),
            sample_rate: payload.sample_rate,
            language_code: self.config.audio.language_code.clone(),
        };
        let reply = self.api.transcribe(&request).await?;
        Ok(Some(reply.transcript.trim().to_string()))
    }

    /// Record a spoken turn and send its transcript. Nothing is captured
    /// unless a session is accepting turns.
    pub async fn record(&mut self) -> Vec<UiEvent> {
        match self.machine.status() {
            Status::Active => {}
            Status::Complete => return vec![UiEvent::Notice(SESSION_ENDED_NOTICE.to_string())],
            Status::Idle | Status::Loading => {
                return vec![UiEvent::Notice(NO_SESSION_NOTICE.to_string())];
            }
        }
        if self.capture.is_recording() {
            tracing::debug!("record requested while already recording");
            return Vec::new();
        }
        if !self.capture.is_available() {
            return vec![UiEvent::Notice(NO_DEVICE_NOTICE.to_string())];
        }

        let secs = self.record_seconds();
        let mut events = vec![
            UiEvent::Notice(format!("Recording {secs} seconds...")),
            coach_bubble("Recording..."),
        ];

        match self.transcribe_capture(secs).await {
            Ok(None) => return events,
            Ok(Some(transcript)) if transcript.is_empty() => {
                events.push(UiEvent::Notice(NO_SPEECH_NOTICE.to_string()));
                events.push(coach_bubble("No speech detected."));
            }
            Ok(Some(transcript)) => {
                tracing::info!("transcribed {} characters", transcript.len());
                events.push(UiEvent::Notice("Transcribed. Sending...".to_string()));
                events.push(coach_bubble("Transcribed. Sending response..."));
                events.extend(self.send(&transcript).await);
            }
            Err(e) => {
                tracing::warn!("voice capture failed: {e}");
                let message = format!("Voice error: {e}");
                events.push(UiEvent::Notice(message.clone()));
                events.push(coach_bubble(message));
                return events;
            }
        }

        events.push(UiEvent::Notice(RECORD_AGAIN_NOTICE.to_string()));
        events
    }

    pub fn reset(&mut self) -> Vec<UiEvent> {
        self.machine.reset()
    }

    pub fn set_mode(&mut self, mode: InputMode) -> Result<Vec<UiEvent>> {
        self.update_settings(SettingsUpdate {
            input_mode: Some(mode),
            ..SettingsUpdate::default()
        })
    }

    /// Apply and persist a settings change.
    pub fn update_settings(&mut self, update: SettingsUpdate) -> Result<Vec<UiEvent>> {
        if update.is_empty() {
            return Ok(Vec::new());
        }

        update.apply(&mut self.settings);
        self.store.save(&self.settings)?;
        tracing::info!(
            "settings updated: timeout {}s, record {}s, tts {}, mode {}",
            self.settings.timeout_seconds,
            self.settings.record_seconds(),
            self.settings.tts_enabled,
            self.settings.input_mode
        );

        Ok(vec![UiEvent::Mode(self.settings.input_mode)])
    }

    fn present(&self, events: Vec<UiEvent>) -> Vec<UiEvent> {
        if self.settings.tts_enabled {
            return events;
        }
        events
            .into_iter()
            .filter(|e| !matches!(e, UiEvent::Speak(_)))
            .collect()
    }
}

fn coach_bubble(text: impl Into<String>) -> UiEvent {
    UiEvent::Bubble {
        role: Role::Coach,
        text: text.into(),
    }
}
