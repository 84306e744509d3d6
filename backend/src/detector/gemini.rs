use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::io::Cursor;
use url::Url;

use super::config::Settings;
use super::normalizer::ImageSample;

const DEFAULT_CONFIDENCE: u8 = 50;

pub const DETECTION_PROMPT: &str = r#"Analyze this image carefully and determine if it's AI-generated or a real photograph.

Consider these factors:
1. Image metadata and digital artifacts
2. Unnatural patterns, textures, or consistency
3. Telltale signs of AI generation (overly smooth skin, weird hands, impossible reflections, etc.)
4. Photography characteristics vs AI rendering patterns

Respond in this EXACT format:
VERDICT: [REAL or FAKE]
CONFIDENCE: [number from 0 to 100]
REASON: [brief explanation]

Be decisive - choose either REAL or FAKE based on your analysis."#;

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Missing text in model response")]
    MissingContent,
    #[error("Failed to encode image payload: {0}")]
    Encode(#[from] image::ImageError),
    #[error("Invalid endpoint URL: {0}")]
    Url(#[from] url::ParseError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Real,
    Fake,
    Unknown,
}

impl Verdict {
    fn from_token(token: &str) -> Self {
        match token.trim().to_uppercase().as_str() {
            "REAL" => Verdict::Real,
            "FAKE" => Verdict::Fake,
            _ => Verdict::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub verdict: Verdict,
    /// Self-reported certainty, 0-100.
    pub confidence: u8,
    /// Advisory only.
    pub reason: String,
}

impl ClassificationResult {
    pub fn unknown() -> Self {
        Self {
            verdict: Verdict::Unknown,
            confidence: DEFAULT_CONFIDENCE,
            reason: String::new(),
        }
    }

    pub fn fake_probability(&self) -> f64 {
        match self.verdict {
            Verdict::Fake => self.confidence as f64 / 100.0,
            Verdict::Real => (100 - self.confidence) as f64 / 100.0,
            Verdict::Unknown => 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
    Parsed(ClassificationResult),
    /// No `VERDICT:` line was present.
    Unparseable,
}

impl ParsedReply {
    /// The classification this reply stands for, UNKNOWN/50 when unparseable.
    pub fn classification(&self) -> ClassificationResult {
        match self {
            ParsedReply::Parsed(result) => result.clone(),
            ParsedReply::Unparseable => ClassificationResult::unknown(),
        }
    }
}

/// Scans the reply line by line; the first occurrence of each prefix wins
/// and anything else is ignored.
pub fn parse_reply(text: &str) -> ParsedReply {
    let mut verdict = None;
    let mut confidence = None;
    let mut reason = None;

    for line in text.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("VERDICT:") {
            verdict.get_or_insert_with(|| Verdict::from_token(rest));
        } else if let Some(rest) = line.strip_prefix("CONFIDENCE:") {
            confidence.get_or_insert_with(|| parse_confidence(rest));
        } else if let Some(rest) = line.strip_prefix("REASON:") {
            reason.get_or_insert_with(|| rest.trim().to_string());
        }
    }

    match verdict {
        Some(verdict) => ParsedReply::Parsed(ClassificationResult {
            verdict,
            confidence: confidence.unwrap_or(DEFAULT_CONFIDENCE),
            reason: reason.unwrap_or_default(),
        }),
        None => ParsedReply::Unparseable,
    }
}

fn parse_confidence(raw: &str) -> u8 {
    match raw.trim().parse::<i64>() {
        Ok(value) => value.clamp(0, 100) as u8,
        Err(_) => DEFAULT_CONFIDENCE,
    }
}

/// A remote model that can judge an image. Failures are returned, never
/// raised, so the caller can fall back.
pub trait ImageClassifier {
    fn classify(
        &self,
        sample: &ImageSample,
    ) -> impl Future<Output = Result<ParsedReply, ClassifierError>>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

impl GenerateContentResponse {
    fn text(self) -> Option<String> {
        let text: String = self
            .candidates?
            .into_iter()
            .next()?
            .content?
            .parts?
            .into_iter()
            .filter_map(|part| part.text)
            .collect::<Vec<_>>()
            .join("");
        let text = text.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

/// Client for the Gemini `generateContent` endpoint.
#[derive(Clone)]
pub struct GeminiClassifier {
    http_client: HttpClient,
    endpoint: Url,
    api_key: String,
    model: String,
}

impl GeminiClassifier {
    pub fn new(api_key: String, settings: &Settings) -> Result<Self, ClassifierError> {
        let base = settings.gemini_api_url.trim_end_matches('/');
        let endpoint = Url::parse(&format!(
            "{}/models/{}:generateContent",
            base, settings.gemini_model
        ))?;

        let http_client = HttpClient::builder()
            .timeout(settings.request_timeout)
            .build()?;

        Ok(Self {
            http_client,
            endpoint,
            api_key,
            model: settings.gemini_model.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn encode_payload(sample: &ImageSample) -> Result<String, ClassifierError> {
        let mut buf = Vec::new();
        sample
            .pixels()
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Jpeg)?;
        Ok(STANDARD.encode(buf))
    }

    async fn generate(&self, sample: &ImageSample) -> Result<String, ClassifierError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![
                    Part {
                        text: Some(DETECTION_PROMPT.to_string()),
                        inline_data: None,
                    },
                    Part {
                        text: None,
                        inline_data: Some(InlineData {
                            mime_type: "image/jpeg".to_string(),
                            data: Self::encode_payload(sample)?,
                        }),
                    },
                ],
            }],
        };

        let response = self
            .http_client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: GenerateContentResponse = response.json().await?;
        body.text().ok_or(ClassifierError::MissingContent)
    }
}

impl ImageClassifier for GeminiClassifier {
    async fn classify(&self, sample: &ImageSample) -> Result<ParsedReply, ClassifierError> {
        let text = self.generate(sample).await?;
        let reply = parse_reply(&text);
        let result = reply.classification();

        if reply == ParsedReply::Unparseable {
            log::warn!("Gemini reply had no VERDICT line, treating as UNKNOWN: {:?}", text);
        }
        log::info!(
            "Gemini detection ({}): {}x{} verdict={:?} confidence={}% reason={:?} fake_probability={:.3}",
            self.model,
            sample.width(),
            sample.height(),
            result.verdict,
            result.confidence,
            result.reason,
            result.fake_probability()
        );

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, HttpResponse, HttpServer, web};
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn parses_fake_verdict() {
        let reply = parse_reply("VERDICT: FAKE\nCONFIDENCE: 80\nREASON: smooth skin");
        let ParsedReply::Parsed(result) = reply else {
            panic!("expected a parsed reply");
        };
        assert_eq!(result.verdict, Verdict::Fake);
        assert_eq!(result.confidence, 80);
        assert_eq!(result.reason, "smooth skin");
        assert!((result.fake_probability() - 0.80).abs() < 1e-9);
    }

    #[test]
    fn parses_real_verdict_without_reason() {
        let result = parse_reply("VERDICT: REAL\nCONFIDENCE: 90\n").classification();
        assert_eq!(result.verdict, Verdict::Real);
        assert!(result.reason.is_empty());
        assert!((result.fake_probability() - 0.10).abs() < 1e-9);
    }

    #[test]
    fn missing_verdict_is_unparseable() {
        let reply = parse_reply("I think this is probably fine.\nCONFIDENCE: 99");
        assert_eq!(reply, ParsedReply::Unparseable);
        assert_eq!(reply.classification(), ClassificationResult::unknown());
        assert_eq!(reply.classification().fake_probability(), 0.5);
    }

    #[test]
    fn unknown_token_maps_to_even_odds() {
        let result = parse_reply("VERDICT: maybe\nCONFIDENCE: 95").classification();
        assert_eq!(result.verdict, Verdict::Unknown);
        assert_eq!(result.fake_probability(), 0.5);
    }

    #[test]
    fn verdict_is_case_insensitive_and_trimmed() {
        let result = parse_reply("   VERDICT:   fake  \n  CONFIDENCE:  70 ").classification();
        assert_eq!(result.verdict, Verdict::Fake);
        assert_eq!(result.confidence, 70);
    }

    #[test]
    fn bad_confidence_defaults_to_fifty() {
        let result = parse_reply("VERDICT: FAKE\nCONFIDENCE: very high").classification();
        assert_eq!(result.confidence, 50);
        assert_eq!(result.fake_probability(), 0.5);
    }

    #[test]
    fn out_of_range_confidence_is_clamped() {
        let result = parse_reply("VERDICT: REAL\nCONFIDENCE: 140").classification();
        assert_eq!(result.confidence, 100);
        assert_eq!(result.fake_probability(), 0.0);
    }

    #[test]
    fn first_occurrence_of_each_prefix_wins() {
        let text = "Sure!\nVERDICT: REAL\nCONFIDENCE: 60\nVERDICT: FAKE\nCONFIDENCE: 10\nREASON: grain\nREASON: other";
        let result = parse_reply(text).classification();
        assert_eq!(result.verdict, Verdict::Real);
        assert_eq!(result.confidence, 60);
        assert_eq!(result.reason, "grain");
    }

    #[test]
    fn response_text_joins_parts_of_first_candidate() {
        let body: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [
                {"content": {"parts": [{"text": "VERDICT: FAKE\n"}, {"text": "CONFIDENCE: 75"}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }))
        .unwrap();
        assert_eq!(body.text().as_deref(), Some("VERDICT: FAKE\nCONFIDENCE: 75"));

        let empty: GenerateContentResponse = serde_json::from_value(json!({})).unwrap();
        assert!(empty.text().is_none());
    }

    #[test]
    fn request_uses_inline_data_field_names() {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: None,
                    inline_data: Some(InlineData {
                        mime_type: "image/jpeg".into(),
                        data: "AAAA".into(),
                    }),
                }],
            }],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value["contents"][0]["parts"][0]["inlineData"]["mimeType"],
            "image/jpeg"
        );
        assert!(value["contents"][0]["parts"][0].get("text").is_none());
    }

    #[test]
    fn rejects_malformed_endpoint() {
        let settings = Settings {
            gemini_api_url: "not a url".into(),
            ..Settings::default()
        };
        assert!(matches!(
            GeminiClassifier::new("key".into(), &settings),
            Err(ClassifierError::Url(_))
        ));
    }

    fn settings_for(base: String) -> Settings {
        Settings {
            gemini_api_url: base,
            request_timeout: Duration::from_secs(5),
            ..Settings::default()
        }
    }

    async fn serve(reply: serde_json::Value, status: u16) -> String {
        let server = HttpServer::new(move || {
            let reply = reply.clone();
            App::new().route(
                "/models/{model}",
                web::post().to(move |req: actix_web::HttpRequest| {
                    let reply = reply.clone();
                    async move {
                        if req.headers().get("x-goog-api-key").is_none() {
                            return HttpResponse::Unauthorized().finish();
                        }
                        let status = actix_web::http::StatusCode::from_u16(status).unwrap();
                        HttpResponse::build(status).json(reply)
                    }
                }),
            )
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        format!("http://{}", addr)
    }

    #[actix_web::test]
    async fn classifies_through_the_endpoint() {
        let base = serve(
            json!({"candidates": [{"content": {"parts": [
                {"text": "VERDICT: FAKE\nCONFIDENCE: 80\nREASON: smooth skin"}
            ]}}]}),
            200,
        )
        .await;
        let classifier = GeminiClassifier::new("test-key".into(), &settings_for(base)).unwrap();
        let sample = ImageSample::synthetic(32, 32, false);

        let reply = classifier.classify(&sample).await.unwrap();
        assert_eq!(reply.classification().verdict, Verdict::Fake);
        assert_eq!(classifier.model(), "gemini-1.5-flash");
    }

    #[actix_web::test]
    async fn non_success_status_is_an_error() {
        let base = serve(json!({"error": {"message": "quota"}}), 429).await;
        let classifier = GeminiClassifier::new("test-key".into(), &settings_for(base)).unwrap();
        let sample = ImageSample::synthetic(32, 32, false);

        let err = classifier.classify(&sample).await.unwrap_err();
        assert!(matches!(err, ClassifierError::Api { status: 429, .. }));
    }

    #[actix_web::test]
    async fn reply_without_text_is_an_error() {
        let base = serve(json!({"candidates": []}), 200).await;
        let classifier = GeminiClassifier::new("test-key".into(), &settings_for(base)).unwrap();
        let sample = ImageSample::synthetic(32, 32, false);

        let err = classifier.classify(&sample).await.unwrap_err();
        assert!(matches!(err, ClassifierError::MissingContent));
    }
}
