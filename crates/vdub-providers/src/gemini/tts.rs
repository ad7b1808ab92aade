//! Speech synthesis with a Gemini TTS model.
//!
//! The model returns raw 16-bit PCM; chunks are concatenated and wrapped in
//! a WAV container.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use tracing::{debug, warn};

use super::{
    Content, GeminiClient, GenerateContentRequest, GenerationConfig, PrebuiltVoiceConfig,
    SpeechConfig, VoiceConfig,
};
use crate::error::{ProviderError, ProviderResult};
use crate::reporter::{scaled_percent, ProgressReporter};
use crate::traits::SpeechSynthesizer;

const DEFAULT_SAMPLE_RATE: u32 = 24_000;
const MAX_CHUNK_CHARS: usize = 4_000;

/// Gemini text-to-speech backend.
pub struct GeminiSpeechSynthesizer {
    client: GeminiClient,
    model: String,
    voice: String,
}

impl GeminiSpeechSynthesizer {
    pub fn new(client: GeminiClient, model: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            voice: voice.into(),
        }
    }

    fn request_for(&self, text: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![super::Part::text(text)],
            }],
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["AUDIO".to_string()]),
                speech_config: Some(SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: self.voice.clone(),
                        },
                    },
                }),
                ..Default::default()
            }),
        }
    }

    /// Synthesize one chunk, returning its PCM bytes and sample rate.
    async fn synthesize_chunk(&self, text: &str) -> ProviderResult<(Vec<u8>, u32)> {
        let response = self
            .client
            .generate_content(&self.model, &self.request_for(text))
            .await?;
        let audio = response
            .inline_data()
            .ok_or_else(|| ProviderError::execution("Gemini TTS returned no audio"))?;

        let mime = audio.mime_type.to_ascii_lowercase();
        if !(mime.starts_with("audio/l16") || mime.contains("pcm")) {
            return Err(ProviderError::execution(format!(
                "Gemini TTS returned unsupported audio format {}",
                audio.mime_type
            )));
        }

        let pcm = base64::engine::general_purpose::STANDARD
            .decode(audio.data.as_bytes())
            .map_err(|e| ProviderError::execution(format!("Gemini TTS audio was not valid base64: {}", e)))?;
        Ok((pcm, sample_rate_from_mime(&mime)))
    }
}

#[async_trait]
impl SpeechSynthesizer for GeminiSpeechSynthesizer {
    fn name(&self) -> &'static str {
        "gemini-tts"
    }

    fn output_extension(&self) -> &'static str {
        "wav"
    }

    async fn synthesize(
        &self,
        text: &str,
        output: &Path,
        progress: &ProgressReporter,
    ) -> ProviderResult<()> {
        self.client.require_key().await?;

        let chunks = split_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(ProviderError::execution("Nothing to synthesize"));
        }

        let mut pcm = Vec::new();
        let mut sample_rate = DEFAULT_SAMPLE_RATE;
        let total = chunks.len() as u64;

        for (i, chunk) in chunks.iter().enumerate() {
            let percent = scaled_percent(i as u64, total, 5, 90);
            progress.progress(
                percent,
                format!("Synthesizing audio: {}% complete...", percent),
            );

            let (bytes, rate) = self.synthesize_chunk(chunk).await?;
            if i == 0 {
                sample_rate = rate;
            }
            debug!(chunk = i, bytes = bytes.len(), "Synthesized chunk");
            pcm.extend_from_slice(&bytes);
        }

        progress.progress(95, "Writing audio file...");
        write_atomically(output, &wav_bytes(&pcm, sample_rate, 1, 16)).await
    }
}

/// Write to a sibling `.part` file and rename, so failure leaves nothing behind.
async fn write_atomically(output: &Path, data: &[u8]) -> ProviderResult<()> {
    let mut name = output.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    let part: PathBuf = output.with_file_name(name);

    let result = async {
        tokio::fs::write(&part, data).await?;
        tokio::fs::rename(&part, output).await
    }
    .await;

    if let Err(e) = result {
        if let Err(cleanup) = tokio::fs::remove_file(&part).await {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove partial audio {}: {}", part.display(), cleanup);
            }
        }
        return Err(e.into());
    }
    Ok(())
}

/// Parse `rate=NNNN` out of a MIME type like `audio/L16;codec=pcm;rate=24000`.
fn sample_rate_from_mime(mime: &str) -> u32 {
    mime.split(';')
        .filter_map(|p| p.trim().strip_prefix("rate="))
        .find_map(|r| r.parse().ok())
        .unwrap_or(DEFAULT_SAMPLE_RATE)
}

/// Split text into chunks of at most `max` characters, preferring paragraph
/// and then word boundaries.
fn split_text(text: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    let push = |current: &mut String, chunks: &mut Vec<String>| {
        let trimmed = current.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }
        current.clear();
    };

    for paragraph in text.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if current.chars().count() + paragraph.chars().count() + 2 > max {
            push(&mut current, &mut chunks);
        }
        if paragraph.chars().count() <= max {
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
            continue;
        }
        for word in paragraph.split_whitespace() {
            if current.chars().count() + word.chars().count() + 1 > max {
                push(&mut current, &mut chunks);
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
        }
    }
    push(&mut current, &mut chunks);
    chunks
}

/// Wrap little-endian PCM samples in a RIFF/WAVE header.
fn wav_bytes(pcm: &[u8], sample_rate: u32, channels: u16, bits_per_sample: u16) -> Vec<u8> {
    let block_align = channels * bits_per_sample / 8;
    let byte_rate = sample_rate * u32::from(block_align);
    let data_len = pcm.len() as u32;

    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&bits_per_sample.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialUpdate, Credentials};
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_wav_header() {
        let wav = wav_bytes(&[0u8; 8], 24_000, 1, 16);
        assert_eq!(wav.len(), 52);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(u32::from_le_bytes(wav[4..8].try_into().unwrap()), 44);
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 24_000);
        assert_eq!(u32::from_le_bytes(wav[28..32].try_into().unwrap()), 48_000);
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 8);
    }

    #[test]
    fn test_sample_rate_from_mime() {
        assert_eq!(sample_rate_from_mime("audio/l16;codec=pcm;rate=16000"), 16_000);
        assert_eq!(sample_rate_from_mime("audio/l16"), DEFAULT_SAMPLE_RATE);
    }

    #[test]
    fn test_split_text() {
        assert_eq!(split_text("one\n\ntwo", 100), vec!["one\n\ntwo"]);
        assert_eq!(split_text("aaaa\n\nbbbb", 6), vec!["aaaa", "bbbb"]);
        let long = split_text("alpha beta gamma delta", 11);
        assert_eq!(long, vec!["alpha beta", "gamma delta"]);
        assert!(split_text("  \n\n ", 10).is_empty());
    }

    async fn synthesizer_for(server: &MockServer) -> GeminiSpeechSynthesizer {
        let credentials = Credentials::default();
        credentials
            .apply(CredentialUpdate {
                gemini_api_key: Some("test-key".into()),
                ..Default::default()
            })
            .await;
        let client = GeminiClient::new(
            reqwest::Client::new(),
            server.uri(),
            Duration::from_secs(5),
            credentials,
        );
        GeminiSpeechSynthesizer::new(client, "tts-test", "Kore")
    }

    #[tokio::test]
    async fn test_synthesize_writes_wav() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/tts-test:generateContent"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "candidates": [{"content": {"parts": [
                    {"inlineData": {"mimeType": "audio/L16;codec=pcm;rate=24000", "data": "AAABAAIA"}}
                ]}}]
            })))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("a1.wav");
        synthesizer_for(&server)
            .await
            .synthesize("Hello there.", &output, &ProgressReporter::noop())
            .await
            .unwrap();

        let bytes = std::fs::read(&output).unwrap();
        assert_eq!(&bytes[8..12], b"WAVE");
        assert_eq!(bytes.len(), 44 + 6);
    }

    #[tokio::test]
    async fn test_rate_limit_leaves_no_file() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/tts-test:generateContent"))
            .respond_with(ResponseTemplate::new(429).set_body_string("Resource has been exhausted"))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("a1.wav");
        let err = synthesizer_for(&server)
            .await
            .synthesize("Hello there.", &output, &ProgressReporter::noop())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("rate limit"));
        assert!(!output.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
