//! Text-to-speech for agent replies.
//!
//! Audio is rendered through an OpenAI-compatible `/audio/speech` endpoint,
//! written to the uploads directory, and referenced by a URL under
//! `/uploads` that the server exposes as static files.

use serde::Serialize;
use std::path::PathBuf;

use crate::error::GenerationError;
use crate::openai::truncate_on_char_boundary;

/// Longest reply text sent for synthesis (4 KiB).
const MAX_SPEECH_INPUT_BYTES: usize = 4 * 1024;

/// URL prefix under which the uploads directory is served.
pub const UPLOADS_URL_PREFIX: &str = "/uploads";

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'static str,
}

#[derive(Debug, Clone)]
pub struct SpeechSynthesizer {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    voice: String,
    upload_dir: PathBuf,
}

impl SpeechSynthesizer {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: &str,
        model: &str,
        voice: &str,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            client,
            endpoint: format!("{}/audio/speech", base_url.trim_end_matches('/')),
            api_key: api_key.to_string(),
            model: model.to_string(),
            voice: voice.to_string(),
            upload_dir,
        }
    }

    /// Renders `text` to an MP3 file and returns its public URL.
    ///
    /// Text longer than the synthesis limit is cut at a character boundary.
    pub async fn synthesize(&self, text: &str) -> Result<String, GenerationError> {
        let mut input = text.to_string();
        truncate_on_char_boundary(&mut input, MAX_SPEECH_INPUT_BYTES);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&SpeechRequest {
                model: &self.model,
                voice: &self.voice,
                input: &input,
                response_format: "mp3",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(GenerationError::Speech(format!(
                "speech backend returned {}",
                status.as_u16()
            )));
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(GenerationError::Speech("empty audio payload".to_string()));
        }

        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(|e| GenerationError::Speech(format!("failed to create upload dir: {}", e)))?;

        let file_name = format!("{}.mp3", uuid::Uuid::new_v4());
        let path = self.upload_dir.join(&file_name);
        tokio::fs::write(&path, &audio)
            .await
            .map_err(|e| GenerationError::Speech(format!("failed to write audio: {}", e)))?;

        tracing::debug!(path = %path.display(), bytes = audio.len(), "reply audio written");

        Ok(format!("{}/{}", UPLOADS_URL_PREFIX, file_name))
    }

    /// Deletes audio previously returned by [`synthesize`](Self::synthesize).
    ///
    /// URLs that do not name a plain file under the uploads prefix are
    /// ignored, as is a file that is already gone.
    pub async fn discard(&self, audio_url: &str) {
        let Some(file_name) = uploaded_file_name(audio_url) else {
            tracing::debug!(audio_url, "not a synthesized audio url, nothing to discard");
            return;
        };

        let path = self.upload_dir.join(file_name);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "discarded unsaved reply audio"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to discard reply audio")
            }
        }
    }
}

fn uploaded_file_name(audio_url: &str) -> Option<&str> {
    audio_url
        .strip_prefix(UPLOADS_URL_PREFIX)?
        .strip_prefix('/')
        .filter(|name| !name.is_empty() && !name.starts_with('.') && !name.contains(['/', '\\']))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_plain_upload_names_are_accepted() {
        assert_eq!(uploaded_file_name("/uploads/abc.mp3"), Some("abc.mp3"));
        assert_eq!(uploaded_file_name("/uploads/../secret"), None);
        assert_eq!(uploaded_file_name("/uploads/a/b.mp3"), None);
        assert_eq!(uploaded_file_name("/uploads/"), None);
        assert_eq!(uploaded_file_name("/elsewhere/abc.mp3"), None);
        assert_eq!(uploaded_file_name("/uploadsabc.mp3"), None);
    }
}
