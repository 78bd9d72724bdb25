//! Speech synthesis through an external `espeak-ng` style command.
//!
//! Each utterance runs one child process.  Canceling kills the child, which
//! is how a new utterance silences the previous one.

use std::process::Stdio;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::process::Command;
use tokio::sync::oneshot;

use super::output::{SpeechSynthesizer, SynthesisEvent, Utterance, Voice};
use super::{primary_subtag, SpeechError};

/// espeak-ng default speaking rate in words per minute.
const BASE_WPM: f32 = 175.0;
/// espeak-ng amplitude range is 0..=200.
const MAX_AMPLITUDE: f32 = 200.0;

pub struct CommandSynthesizer {
    program: String,
    voices: Vec<Voice>,
    running: Mutex<Option<oneshot::Sender<()>>>,
}

impl CommandSynthesizer {
    /// Probe `program --voices`.  Returns `None` when the command is not
    /// installed or lists nothing.
    pub fn detect(program: &str) -> Option<Self> {
        let output = match std::process::Command::new(program).arg("--voices").output() {
            Ok(output) if output.status.success() => output,
            Ok(output) => {
                log::warn!("speech: `{program} --voices` exited with {}", output.status);
                return None;
            }
            Err(e) => {
                log::info!("speech: synthesizer `{program}` unavailable: {e}");
                return None;
            }
        };
        let voices = parse_voice_list(&String::from_utf8_lossy(&output.stdout));
        if voices.is_empty() {
            log::warn!("speech: `{program}` reported no voices");
            return None;
        }
        log::info!("speech: {} voices from `{program}`", voices.len());
        Some(Self::with_voices(program, voices))
    }

    pub fn with_voices(program: &str, voices: Vec<Voice>) -> Self {
        Self {
            program: program.to_string(),
            voices,
            running: Mutex::new(None),
        }
    }

    fn running(&self) -> std::sync::MutexGuard<'_, Option<oneshot::Sender<()>>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Parse the table printed by `espeak-ng --voices`:
///
/// ```text
/// Pty Language       Age/Gender VoiceName          File                 Other Languages
///  5  af              --/M      Afrikaans          gmw/af
///  5  en-us           --/M      English_(America)  gmw/en-US           (en 3)
/// ```
pub fn parse_voice_list(listing: &str) -> Vec<Voice> {
    listing
        .lines()
        .filter(|line| !line.trim_start().starts_with("Pty"))
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() < 4 {
                return None;
            }
            Some(Voice::new(fields[3].replace('_', " "), fields[1]))
        })
        .collect()
}

/// Command-line arguments for one utterance.
pub fn command_args(utterance: &Utterance) -> Vec<String> {
    let amplitude = (utterance.volume.clamp(0.0, 1.0) * MAX_AMPLITUDE).round() as u32;
    let wpm = (BASE_WPM * utterance.rate.clamp(0.1, 4.0)).round() as u32;
    let voice = match &utterance.voice {
        Some(v) => v.lang.clone(),
        None => primary_subtag(&utterance.lang),
    };
    vec![
        "-a".into(),
        amplitude.to_string(),
        "-s".into(),
        wpm.to_string(),
        "-v".into(),
        voice,
        "--".into(),
        utterance.text.clone(),
    ]
}

#[async_trait]
impl SpeechSynthesizer for CommandSynthesizer {
    fn voices(&self) -> Vec<Voice> {
        self.voices.clone()
    }

    async fn voices_changed(&self) {
        std::future::pending::<()>().await
    }

    fn speak(
        &self,
        utterance: Arc<Utterance>,
    ) -> Result<oneshot::Receiver<SynthesisEvent>, SpeechError> {
        let mut child = Command::new(&self.program)
            .args(command_args(&utterance))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SpeechError::Synthesis(format!("failed to start {}: {e}", self.program)))?;

        let (done_tx, done_rx) = oneshot::channel();
        let (cancel_tx, cancel_rx) = oneshot::channel::<()>();
        *self.running() = Some(cancel_tx);

        tokio::spawn(async move {
            let event = tokio::select! {
                status = child.wait() => match status {
                    Ok(s) if s.success() => SynthesisEvent::Finished,
                    Ok(s) => SynthesisEvent::Failed(format!("synthesizer exited with {s}")),
                    Err(e) => SynthesisEvent::Failed(e.to_string()),
                },
                _ = cancel_rx => SynthesisEvent::Interrupted,
            };
            if event == SynthesisEvent::Interrupted {
                if let Err(e) = child.kill().await {
                    log::debug!("speech: kill after cancel: {e}");
                }
            }
            drop(utterance);
            let _ = done_tx.send(event);
        });

        Ok(done_rx)
    }

    fn cancel(&self) {
        if let Some(tx) = self.running().take() {
            let _ = tx.send(());
        }
    }
}
