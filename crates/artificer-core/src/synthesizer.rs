//! External speech synthesis.
//!
//! The synthesizer is a black box: text goes in on stdin and a mono 16-bit
//! PCM WAV file comes out at the requested path. [`PiperSynthesizer`] drives
//! the Piper command-line tool. There is no timeout; a hung process blocks
//! the calling worker.

use crate::effect_params::EffectParameters;
use crate::error::{ArtificerError, ArtificerResult};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info, warn};

/// Everything the synthesizer needs for one line of dialogue
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    /// Text to speak
    pub text: String,
    /// Voice model file
    pub model: PathBuf,
    /// Phoneme length multiplier, `1 / speech_rate`
    pub length_scale: f32,
    /// Pause between sentences in seconds
    pub sentence_silence_s: f32,
}

impl SynthesisRequest {
    /// Request for `text` spoken by `model` with the synthesizer knobs from `params`
    #[must_use]
    pub fn new<S: Into<String>, P: Into<PathBuf>>(text: S, model: P, params: &EffectParameters) -> Self {
        Self {
            text: text.into(),
            model: model.into(),
            length_scale: params.length_scale(),
            sentence_silence_s: params.sentence_silence_s,
        }
    }

    /// Reject empty or oversized text and missing models before anything runs
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` describing the problem
    pub fn validate(&self) -> ArtificerResult<()> {
        if self.text.trim().is_empty() {
            return Err(ArtificerError::invalid_input("Enter some text to speak"));
        }
        if self.text.len() > crate::MAX_TEXT_LENGTH {
            return Err(ArtificerError::invalid_input(format!(
                "Text is {} bytes, the limit is {}",
                self.text.len(),
                crate::MAX_TEXT_LENGTH
            )));
        }
        if !self.model.is_file() {
            return Err(ArtificerError::invalid_input(format!(
                "Voice model {} not found",
                self.model.display()
            )));
        }
        if !self.length_scale.is_finite() || self.length_scale <= 0.0 {
            return Err(ArtificerError::invalid_input(format!(
                "Length scale must be positive, got {}",
                self.length_scale
            )));
        }
        Ok(())
    }
}

/// Text in, WAV file out
pub trait SpeechSynthesizer: Send + Sync {
    /// Render `request` into a mono 16-bit PCM WAV at `output`
    ///
    /// # Errors
    ///
    /// Returns `SynthesisError` if the process fails or leaves no output
    fn synthesize(&self, request: &SynthesisRequest, output: &Path) -> ArtificerResult<()>;
}

/// Runs the Piper command-line synthesizer
#[derive(Debug, Clone)]
pub struct PiperSynthesizer {
    executable: PathBuf,
    espeak_data_dir: Option<PathBuf>,
}

impl PiperSynthesizer {
    /// Synthesizer invoking `executable`
    #[must_use]
    pub fn new<P: Into<PathBuf>>(executable: P) -> Self {
        Self {
            executable: executable.into(),
            espeak_data_dir: None,
        }
    }

    /// Export `ESPEAK_DATA_PATH` for the child when the directory exists
    #[must_use]
    pub fn with_espeak_data<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.espeak_data_dir = Some(dir.into());
        self
    }

    /// Build from the `[synthesizer]` config section
    #[must_use]
    pub fn from_config(config: &crate::config::SynthesizerConfig) -> Self {
        let synthesizer = Self::new(&config.executable);
        match &config.espeak_data_dir {
            Some(dir) => synthesizer.with_espeak_data(dir),
            None => synthesizer,
        }
    }

    fn command(&self, request: &SynthesisRequest, output: &Path) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.arg("--model")
            .arg(&request.model)
            .arg("--output_file")
            .arg(output)
            .arg("--length_scale")
            .arg(request.length_scale.to_string())
            .arg("--sentence_silence")
            .arg(request.sentence_silence_s.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(dir) = self.espeak_data_dir.as_ref().filter(|d| d.is_dir()) {
            cmd.env("ESPEAK_DATA_PATH", dir);
        }
        cmd
    }
}

impl SpeechSynthesizer for PiperSynthesizer {
    fn synthesize(&self, request: &SynthesisRequest, output: &Path) -> ArtificerResult<()> {
        request.validate()?;
        info!(
            "Synthesizing {} chars with {} (length scale {:.2})",
            request.text.chars().count(),
            request.model.display(),
            request.length_scale
        );

        let mut child = self.command(request, output).spawn().map_err(|e| {
            ArtificerError::synthesis(format!("Could not start {}: {e}", self.executable.display()))
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits early closes the pipe; its exit status carries the real error
            if let Err(e) = stdin.write_all(request.text.as_bytes()) {
                warn!("Could not write text to synthesizer: {e}");
            }
        }

        let result = child
            .wait_with_output()
            .map_err(|e| ArtificerError::synthesis(format!("Synthesizer did not finish: {e}")))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ArtificerError::synthesis(format!(
                "{} exited with {}: {}",
                self.executable.display(),
                result.status,
                stderr.trim()
            )));
        }

        let written = std::fs::metadata(output).map(|m| m.len()).unwrap_or(0);
        if written == 0 {
            return Err(ArtificerError::synthesis(format!(
                "Synthesizer exited cleanly but wrote nothing to {}",
                output.display()
            )));
        }

        debug!("Synthesizer wrote {written} bytes to {}", output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    fn model(dir: &Path) -> PathBuf {
        let path = dir.join("voice.onnx");
        std::fs::write(&path, b"onnx").unwrap();
        path
    }

    #[test]
    fn test_request_from_params() {
        let params = EffectParameters {
            speech_rate: 0.5,
            sentence_silence_s: 0.4,
            ..EffectParameters::default()
        };
        let request = SynthesisRequest::new("Hail, traveller", "voice.onnx", &params);
        assert!((request.length_scale - 2.0).abs() < f32::EPSILON);
        assert!((request.sentence_silence_s - 0.4).abs() < f32::EPSILON);
    }

    #[test]
    fn test_empty_text_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let request = SynthesisRequest::new("   \n", model(temp_dir.path()), &EffectParameters::default());
        assert!(matches!(
            request.validate().unwrap_err(),
            ArtificerError::InvalidInput { .. }
        ));
    }

    #[test]
    fn test_missing_model_rejected() {
        let request = SynthesisRequest::new("Hello", "/nonexistent/voice.onnx", &EffectParameters::default());
        let err = request.validate().unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    #[serial]
    fn test_missing_executable_is_synthesis_error() {
        let temp_dir = TempDir::new().unwrap();
        let request = SynthesisRequest::new("Hello", model(temp_dir.path()), &EffectParameters::default());
        let synthesizer = PiperSynthesizer::new("/nonexistent/bin/piper");

        let err = synthesizer
            .synthesize(&request, &temp_dir.path().join("out.wav"))
            .unwrap_err();
        assert!(matches!(err, ArtificerError::SynthesisError { .. }));
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_non_zero_exit_captures_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let script = temp_dir.path().join("fake_piper.sh");
        std::fs::write(&script, "#!/bin/sh\ncat > /dev/null\necho 'voice exploded' >&2\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let request = SynthesisRequest::new("Hello", model(temp_dir.path()), &EffectParameters::default());
        let err = PiperSynthesizer::new(&script)
            .synthesize(&request, &temp_dir.path().join("out.wav"))
            .unwrap_err();
        assert!(err.to_string().contains("voice exploded"));
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_clean_exit_without_output_fails() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let script = temp_dir.path().join("lazy_piper.sh");
        std::fs::write(&script, "#!/bin/sh\ncat > /dev/null\nexit 0\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let request = SynthesisRequest::new("Hello", model(temp_dir.path()), &EffectParameters::default());
        let err = PiperSynthesizer::new(&script)
            .synthesize(&request, &temp_dir.path().join("out.wav"))
            .unwrap_err();
        assert!(err.to_string().contains("wrote nothing"));
    }
}
