//! Layer B client: external optical recognition over a rendered region.
//!
//! The service receives one PNG (the capture region only) and answers with
//! the text it read and its own confidence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::types::{RecognitionOutput, RegionRecognizer};
use super::ExtractionError;

/// HTTP client for a recognition service exposing `POST /recognize`.
pub struct HttpRecognizer {
    base_url: String,
    client: reqwest::blocking::Client,
    timeout_secs: u64,
}

impl HttpRecognizer {
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, ExtractionError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ExtractionError::RecognitionUnavailable(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            timeout_secs,
        })
    }
}

#[derive(Serialize)]
struct RecognizeRequest<'a> {
    image_base64: &'a str,
    /// Digit-only hint; services may restrict their alphabet with it.
    expected_digits: u8,
    charset: &'static str,
}

#[derive(Deserialize)]
struct RecognizeResponse {
    text: String,
    confidence: f32,
}

impl RegionRecognizer for HttpRecognizer {
    fn recognize(
        &self,
        image_png: &[u8],
        expected_digits: u8,
    ) -> Result<RecognitionOutput, ExtractionError> {
        let url = format!("{}/recognize", self.base_url);
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_png);
        let body = RecognizeRequest {
            image_base64: &encoded,
            expected_digits,
            charset: "0123456789",
        };

        let response = self.client.post(&url).json(&body).send().map_err(|e| {
            if e.is_timeout() {
                ExtractionError::RecognitionTimeout(self.timeout_secs)
            } else if e.is_connect() {
                ExtractionError::RecognitionUnavailable(self.base_url.clone())
            } else {
                ExtractionError::RecognitionUnavailable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(ExtractionError::RecognitionFailed {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: RecognizeResponse = response
            .json()
            .map_err(|e| ExtractionError::MalformedResponse(format!("recognition: {e}")))?;

        Ok(RecognitionOutput {
            text: parsed.text,
            confidence: parsed.confidence,
        })
    }
}

/// Scripted recognizer for tests. Counts calls so tests can assert the
/// layer ran at most once.
pub struct MockRecognizer {
    answer: Result<RecognitionOutput, MockFailure>,
    calls: AtomicUsize,
}

#[derive(Clone, Copy)]
enum MockFailure {
    Unavailable,
    Timeout,
}

impl MockRecognizer {
    pub fn new(text: &str, confidence: f32) -> Self {
        Self {
            answer: Ok(RecognitionOutput {
                text: text.to_string(),
                confidence,
            }),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            answer: Err(MockFailure::Unavailable),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn timing_out() -> Self {
        Self {
            answer: Err(MockFailure::Timeout),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl RegionRecognizer for MockRecognizer {
    fn recognize(
        &self,
        _image_png: &[u8],
        _expected_digits: u8,
    ) -> Result<RecognitionOutput, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.answer {
            Ok(output) => Ok(output.clone()),
            Err(MockFailure::Unavailable) => Err(ExtractionError::RecognitionUnavailable(
                "mock recognizer offline".into(),
            )),
            Err(MockFailure::Timeout) => Err(ExtractionError::RecognitionTimeout(20)),
        }
    }
}

impl<T: RegionRecognizer + ?Sized> RegionRecognizer for std::sync::Arc<T> {
    fn recognize(
        &self,
        image_png: &[u8],
        expected_digits: u8,
    ) -> Result<RecognitionOutput, ExtractionError> {
        (**self).recognize(image_png, expected_digits)
    }
}
