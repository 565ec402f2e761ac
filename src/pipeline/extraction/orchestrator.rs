use std::collections::HashSet;

use tracing::{info, info_span, warn};

use super::confidence::{cap, digits_within_tolerance};
use super::region::{hash_text, text_snippet, PageRegion};
use super::structural;
use super::types::{
    ExtractionCandidate, ExtractionResult, IdentifierRescue, InputScope, PdfTextSource,
    Provenance, RegionRecognizer, RegionRenderer, Termination,
};
use super::ExtractionError;
use crate::config::{ConfidenceCaps, ReconcileConfig, Thresholds};
use crate::models::enums::ExtractionMethod;
use crate::models::CaptureTemplate;

/// The subset of configuration the cascade reads.
#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    pub thresholds: Thresholds,
    pub caps: ConfidenceCaps,
    pub digit_tolerance: u8,
    pub default_expected_digits: u8,
    pub render_dpi: u32,
}

impl From<&ReconcileConfig> for ExtractionSettings {
    fn from(config: &ReconcileConfig) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            caps: config.caps.clone(),
            digit_tolerance: config.digit_tolerance,
            default_expected_digits: config.default_expected_digits,
            render_dpi: config.render_dpi,
        }
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self::from(&ReconcileConfig::default())
    }
}

/// One document to extract from.
#[derive(Debug, Clone, Copy)]
pub struct ExtractionRequest<'a> {
    pub pdf_bytes: &'a [u8],
    /// 1-based page holding the identifier.
    pub page_index: u32,
    pub sender_key: &'a str,
    pub template: Option<&'a CaptureTemplate>,
}

/// Cascade result plus the region bitmap Layer B rendered, if it ran.
#[derive(Debug, Clone)]
pub struct ExtractionRun {
    pub result: ExtractionResult,
    pub region_png: Option<Vec<u8>>,
}

/// A layer's accepted answer.
struct Accepted {
    identifier: String,
    method: ExtractionMethod,
    confidence: f32,
    rationale: String,
    scope: InputScope,
    candidates: Vec<ExtractionCandidate>,
}

/// Layered identifier extraction: structural text, then region-constrained
/// optical recognition, then region-constrained generative rescue.
///
/// Every collaborator is injected. Optional layers that are not configured
/// are skipped and the skip is recorded in provenance.
pub struct ExtractionOrchestrator {
    text_source: Box<dyn PdfTextSource + Send + Sync>,
    renderer: Option<Box<dyn RegionRenderer + Send + Sync>>,
    recognizer: Option<Box<dyn RegionRecognizer + Send + Sync>>,
    rescue: Option<Box<dyn IdentifierRescue + Send + Sync>>,
    settings: ExtractionSettings,
}

impl ExtractionOrchestrator {
    pub fn new(text_source: Box<dyn PdfTextSource + Send + Sync>, settings: ExtractionSettings) -> Self {
        Self {
            text_source,
            renderer: None,
            recognizer: None,
            rescue: None,
            settings,
        }
    }

    /// Enable Layer B.
    pub fn with_recognition(
        mut self,
        renderer: Box<dyn RegionRenderer + Send + Sync>,
        recognizer: Box<dyn RegionRecognizer + Send + Sync>,
    ) -> Self {
        self.renderer = Some(renderer);
        self.recognizer = Some(recognizer);
        self
    }

    /// Enable Layer C.
    pub fn with_rescue(mut self, rescue: Box<dyn IdentifierRescue + Send + Sync>) -> Self {
        self.rescue = Some(rescue);
        self
    }

    pub fn settings(&self) -> &ExtractionSettings {
        &self.settings
    }

    /// Run the cascade. Never fails: every layer error is folded into the
    /// provenance reasons and the cascade moves on.
    pub fn extract(&self, request: &ExtractionRequest<'_>) -> ExtractionResult {
        self.run(request).result
    }

    /// [`extract`](Self::extract), keeping the rendered capture region so
    /// callers can store it as the reviewer snippet without rendering twice.
    pub fn run(&self, request: &ExtractionRequest<'_>) -> ExtractionRun {
        let span = info_span!("extract", sender_key = %request.sender_key, page = request.page_index);
        let _enter = span.enter();

        let s = &self.settings;
        let expected = request
            .template
            .and_then(|t| t.expected_digits)
            .filter(|d| *d > 0)
            .unwrap_or(s.default_expected_digits);
        let page = request.page_index.saturating_sub(1) as usize;

        let mut reasons: Vec<String> = Vec::new();
        let mut path: Vec<ExtractionMethod> = Vec::new();

        let page_text = match self.text_source.page_text(request.pdf_bytes, page) {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Text layer unavailable");
                reasons.push(format!("text layer unavailable: {e}"));
                String::new()
            }
        };

        let region = request.template.and_then(|t| match self.locate_region(request, t, page) {
            Ok(region) => Some(region),
            Err(e) => {
                warn!(error = %e, "Capture region unusable");
                reasons.push(format!("capture region unusable: {e}"));
                None
            }
        });

        let region_text = region.as_ref().and_then(|r| {
            match self.text_source.region_text(request.pdf_bytes, page, r) {
                Ok(text) => Some(text),
                Err(e) => {
                    reasons.push(format!("region text unavailable: {e}"));
                    None
                }
            }
        });

        // Layer A
        path.push(ExtractionMethod::StructuralText);
        let structural = structural::parse(
            region_text.as_deref(),
            &page_text,
            expected,
            s.digit_tolerance,
            &s.caps,
        );
        let mut accepted = match (structural.best(), structural.confidence) {
            (Some(best), Some(confidence)) => {
                let distinct = structural.candidates.len();
                reasons.push(format!(
                    "structural text: {distinct} distinct candidate(s) in {}",
                    scope_label(structural.scope)
                ));
                Some(Accepted {
                    identifier: best.value.clone(),
                    method: ExtractionMethod::StructuralText,
                    confidence,
                    rationale: if distinct == 1 {
                        "exactly one identifier-shaped token in extractable text".into()
                    } else {
                        format!("{distinct} identifier-shaped tokens; best-ranked chosen, others kept as alternates")
                    },
                    scope: structural.scope,
                    candidates: structural.candidates.clone(),
                })
            }
            _ => {
                reasons.push(format!(
                    "structural text: no {expected}±{} digit token",
                    s.digit_tolerance
                ));
                None
            }
        };

        let mut cropped_text = region_text.filter(|t| !t.trim().is_empty());
        let mut low_candidates: Vec<ExtractionCandidate> = Vec::new();
        let mut scan_quality = false;
        let mut region_png: Option<Vec<u8>> = None;

        // Layer B
        let a_is_high = accepted
            .as_ref()
            .is_some_and(|a| a.confidence >= s.thresholds.high_label);
        if let (false, Some(region)) = (a_is_high, region.as_ref()) {
            match (&self.renderer, &self.recognizer) {
                (Some(renderer), Some(recognizer)) => {
                    path.push(ExtractionMethod::OpticalRecognition);
                    let attempt = match renderer.render_region(request.pdf_bytes, page, region, s.render_dpi) {
                        Ok(png) => {
                            let output = recognizer.recognize(&png, expected);
                            region_png = Some(png);
                            output
                        }
                        Err(e) => Err(e),
                    };
                    match attempt {
                        Ok(output) => {
                            let read = output.text.trim().to_string();
                            let conf = cap(output.confidence, 1.0);
                            let tokens = digit_tokens(&read, expected, s.digit_tolerance);
                            let snippet = (!read.is_empty()).then(|| text_snippet(&read));
                            if cropped_text.is_none() && !read.is_empty() {
                                cropped_text = Some(read.clone());
                            }

                            if conf >= s.thresholds.recognition_accept && tokens.len() == 1 {
                                let value = tokens[0].clone();
                                let capped = cap(conf, s.caps.recognition);
                                reasons.push(format!(
                                    "optical recognition: accepted {value} (service confidence {conf:.2}, capped {capped:.2})"
                                ));
                                let candidate = ExtractionCandidate {
                                    value: value.clone(),
                                    score: capped,
                                    source_layer: ExtractionMethod::OpticalRecognition,
                                    snippet,
                                };
                                let better = accepted.as_ref().map_or(true, |a| capped > a.confidence);
                                if better {
                                    let mut candidates = vec![candidate];
                                    if let Some(previous) = accepted.take() {
                                        candidates.extend(
                                            previous.candidates.into_iter().filter(|c| c.value != value),
                                        );
                                    }
                                    accepted = Some(Accepted {
                                        identifier: value,
                                        method: ExtractionMethod::OpticalRecognition,
                                        confidence: capped,
                                        rationale: "optical recognition of the capture region".into(),
                                        scope: InputScope::CroppedRegion,
                                        candidates,
                                    });
                                } else if let Some(a) = accepted.as_mut() {
                                    if !a.candidates.iter().any(|c| c.value == candidate.value) {
                                        a.candidates.push(candidate);
                                    }
                                }
                            } else {
                                if conf < s.thresholds.recognition_accept {
                                    scan_quality = true;
                                    reasons.push(format!(
                                        "optical recognition: confidence {conf:.2} below {:.2}",
                                        s.thresholds.recognition_accept
                                    ));
                                } else if tokens.is_empty() {
                                    reasons.push("optical recognition: no digit token within tolerance".into());
                                } else {
                                    reasons.push(format!(
                                        "optical recognition: {} competing digit tokens",
                                        tokens.len()
                                    ));
                                }
                                low_candidates.extend(tokens.into_iter().map(|value| ExtractionCandidate {
                                    value,
                                    score: conf,
                                    source_layer: ExtractionMethod::OpticalRecognition,
                                    snippet: snippet.clone(),
                                }));
                            }
                        }
                        Err(e) => {
                            if matches!(
                                e,
                                ExtractionError::RecognitionTimeout(_) | ExtractionError::RecognitionUnavailable(_)
                            ) {
                                warn!(error = %e, "Optical recognition service failed");
                            }
                            reasons.push(format!("optical recognition failed: {e}"));
                        }
                    }
                }
                _ => reasons.push("optical recognition not configured".into()),
            }
        }

        // Layer C
        if accepted.is_none() {
            match (&self.rescue, cropped_text.as_deref()) {
                (_, None) => reasons.push("generative rescue skipped: no cropped-region text".into()),
                (None, Some(_)) => reasons.push("generative rescue not configured".into()),
                (Some(rescue), Some(fragment)) => {
                    path.push(ExtractionMethod::GenerativeRescue);
                    match rescue.rescue(fragment, expected) {
                        Ok(answer) => match answer.identifier {
                            Some(value) if digits_within_tolerance(&value, expected, s.digit_tolerance) => {
                                let capped = cap(answer.confidence, s.caps.rescue);
                                reasons.push(format!(
                                    "generative rescue: proposed {value} (model confidence {:.2}, capped {capped:.2})",
                                    answer.confidence
                                ));
                                accepted = Some(Accepted {
                                    identifier: value.clone(),
                                    method: ExtractionMethod::GenerativeRescue,
                                    confidence: capped,
                                    rationale: answer
                                        .reason
                                        .unwrap_or_else(|| "generative rescue over cropped-region text".into()),
                                    scope: InputScope::CroppedRegion,
                                    candidates: vec![ExtractionCandidate {
                                        value,
                                        score: capped,
                                        source_layer: ExtractionMethod::GenerativeRescue,
                                        snippet: Some(text_snippet(fragment)),
                                    }],
                                });
                            }
                            Some(value) => reasons.push(format!(
                                "generative rescue: rejected malformed identifier {value:?}"
                            )),
                            None => reasons.push("generative rescue: no identifier in cropped text".into()),
                        },
                        Err(e) => {
                            warn!(error = %e, "Generative rescue failed");
                            reasons.push(format!("generative rescue failed: {e}"));
                        }
                    }
                }
            }
        }

        let provenance_base = |method: ExtractionMethod, scope: InputScope, path: Vec<ExtractionMethod>, reasons: Vec<String>| Provenance {
            method,
            region_used: region.is_some(),
            region_key: request.template.map(|t| t.region_key()),
            pipeline_path: path,
            reasons,
            input_scope: scope,
            cropped_text_snippet: cropped_text.as_deref().map(text_snippet),
            cropped_text_hash: cropped_text.as_deref().map(hash_text),
        };

        let result = match accepted {
            Some(a) => ExtractionResult {
                identifier: Some(a.identifier),
                method: a.method,
                confidence: a.confidence,
                rationale: a.rationale,
                candidates: a.candidates,
                provenance: provenance_base(a.method, a.scope, path, reasons),
                termination: None,
            },
            None => {
                let pool = dedupe(low_candidates);
                let termination = if pool.len() > 1 {
                    Termination::AmbiguousCandidates
                } else if scan_quality || (page_text.trim().is_empty() && cropped_text.is_none()) {
                    Termination::ScanQuality
                } else {
                    Termination::NoCandidates
                };
                let best = pool.first().cloned();
                let method = best
                    .as_ref()
                    .map_or(ExtractionMethod::Unresolved, |c| c.source_layer);
                let confidence = best
                    .as_ref()
                    .map_or(0.0, |c| cap(c.score, s.caps.fallback));
                let scope = if cropped_text.is_some() {
                    InputScope::CroppedRegion
                } else {
                    structural.scope
                };
                ExtractionResult {
                    identifier: best.map(|c| c.value),
                    method,
                    confidence,
                    rationale: termination.as_str().to_string(),
                    candidates: pool,
                    provenance: provenance_base(method, scope, path, reasons),
                    termination: Some(termination),
                }
            }
        };

        info!(
            method = result.method.as_str(),
            confidence = result.confidence,
            identifier = result.identifier.as_deref().unwrap_or("-"),
            layers = result.provenance.pipeline_path.len(),
            "Extraction complete"
        );
        ExtractionRun { result, region_png }
    }

    /// PNG of the capture region for the reviewer snippet. `None` when the
    /// sender has no template or no renderer is configured.
    pub fn render_snippet(&self, request: &ExtractionRequest<'_>) -> Result<Option<Vec<u8>>, ExtractionError> {
        let (Some(renderer), Some(template)) = (&self.renderer, request.template) else {
            return Ok(None);
        };
        let page = request.page_index.saturating_sub(1) as usize;
        let region = self.locate_region(request, template, page)?;
        renderer
            .render_region(request.pdf_bytes, page, &region, self.settings.render_dpi)
            .map(Some)
    }

    fn locate_region(
        &self,
        request: &ExtractionRequest<'_>,
        template: &CaptureTemplate,
        page: usize,
    ) -> Result<PageRegion, ExtractionError> {
        let size = self.text_source.page_size(request.pdf_bytes, page)?;
        PageRegion::from_template(template, size)
    }
}

fn scope_label(scope: InputScope) -> &'static str {
    match scope {
        InputScope::CroppedRegion => "cropped region",
        InputScope::FullText => "full text",
    }
}

/// Distinct in-tolerance digit runs, in reading order.
fn digit_tokens(text: &str, expected: u8, tolerance: u8) -> Vec<String> {
    let mut seen = HashSet::new();
    structural::DIGIT_RUN
        .find_iter(text)
        .map(|m| m.as_str())
        .filter(|t| digits_within_tolerance(t, expected, tolerance))
        .filter(|t| seen.insert(t.to_string()))
        .map(str::to_string)
        .collect()
}

/// Distinct by value, highest score first.
fn dedupe(candidates: Vec<ExtractionCandidate>) -> Vec<ExtractionCandidate> {
    let mut out: Vec<ExtractionCandidate> = Vec::new();
    for c in candidates {
        match out.iter_mut().find(|o| o.value == c.value) {
            Some(existing) if c.score > existing.score => *existing = c,
            Some(_) => {}
            None => out.push(c),
        }
    }
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    out
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;

    use super::*;
    use crate::pipeline::extraction::pdfium::{MockPdfText, MockRegionRenderer};
    use crate::pipeline::extraction::recognition::MockRecognizer;
    use crate::pipeline::extraction::rescue::LlmRescue;
    use crate::pipeline::llm::MockLlmClient;

    fn template(expected_digits: u8) -> CaptureTemplate {
        CaptureTemplate {
            sender_key: "acme".into(),
            page_index: 1,
            x: 400.0,
            y: 40.0,
            width: 150.0,
            height: 30.0,
            page_width_pt: 612.0,
            page_height_pt: 792.0,
            expected_digits: Some(expected_digits),
            updated_at: Utc::now(),
        }
    }

    fn request<'a>(template: Option<&'a CaptureTemplate>) -> ExtractionRequest<'a> {
        ExtractionRequest {
            pdf_bytes: b"%PDF-1.4",
            page_index: 1,
            sender_key: "acme",
            template,
        }
    }

    fn orchestrator(text: MockPdfText) -> ExtractionOrchestrator {
        ExtractionOrchestrator::new(Box::new(text), ExtractionSettings::default())
    }

    /// Rescue layer whose every prompt is inspectable after the run.
    struct SharedRescue(Arc<MockLlmClient>);

    impl crate::pipeline::llm::LlmClient for SharedRescue {
        fn generate(
            &self,
            model: &str,
            prompt: &str,
            system: &str,
            format: Option<&serde_json::Value>,
        ) -> Result<String, crate::pipeline::llm::LlmError> {
            self.0.generate(model, prompt, system, format)
        }
    }

    #[test]
    fn single_structural_match_is_high_confidence() {
        let t = template(7);
        let text = MockPdfText::new(&["ACME\nWork Order 4521983\nSigned: J. Doe"]);
        let recognizer = Arc::new(MockRecognizer::new("9999999", 0.99));
        let result = orchestrator(text)
            .with_recognition(Box::new(MockRegionRenderer), Box::new(Arc::clone(&recognizer)))
            .extract(&request(Some(&t)));

        assert_eq!(result.identifier.as_deref(), Some("4521983"));
        assert_eq!(result.method, ExtractionMethod::StructuralText);
        assert_eq!(result.confidence, 0.98);
        assert!(result.termination.is_none());
        assert_eq!(recognizer.calls(), 0, "recognition must not run after a high Layer A result");
        assert_eq!(result.provenance.pipeline_path, vec![ExtractionMethod::StructuralText]);
        assert!(result.provenance.region_used);
    }

    #[test]
    fn ambiguous_structural_result_lets_recognition_run_once() {
        let t = template(7);
        let text = MockPdfText::new(&["Phone 5550123\nJob 4521983"]);
        let recognizer = Arc::new(MockRecognizer::new("4521983", 0.97));
        let result = orchestrator(text)
            .with_recognition(Box::new(MockRegionRenderer), Box::new(Arc::clone(&recognizer)))
            .extract(&request(Some(&t)));

        assert_eq!(recognizer.calls(), 1);
        assert_eq!(result.identifier.as_deref(), Some("4521983"));
        assert_eq!(result.method, ExtractionMethod::OpticalRecognition);
        assert_eq!(result.confidence, 0.94);
        assert_eq!(result.candidates[0].value, "4521983");
        assert!(result.candidates.iter().any(|c| c.value == "5550123"));
    }

    #[test]
    fn ambiguous_structural_result_kept_when_recognition_is_weaker() {
        let t = template(7);
        let text = MockPdfText::new(&["Phone 5550123\nJob 4521983"]);
        let recognizer = Arc::new(MockRecognizer::new("4521983", 0.82));
        let result = orchestrator(text)
            .with_recognition(Box::new(MockRegionRenderer), Box::new(Arc::clone(&recognizer)))
            .extract(&request(Some(&t)));

        assert_eq!(result.method, ExtractionMethod::StructuralText);
        assert_eq!(result.confidence, 0.85);
        assert_eq!(result.identifier.as_deref(), Some("4521983"));
    }

    #[test]
    fn recognition_skipped_without_region() {
        let text = MockPdfText::new(&["nothing useful"]);
        let recognizer = Arc::new(MockRecognizer::new("4521983", 0.99));
        let result = orchestrator(text)
            .with_recognition(Box::new(MockRegionRenderer), Box::new(Arc::clone(&recognizer)))
            .extract(&request(None));

        assert_eq!(recognizer.calls(), 0);
        assert!(result.identifier.is_none());
        assert!(!result.provenance.region_used);
        assert_eq!(result.termination, Some(Termination::NoCandidates));
    }

    #[test]
    fn scanned_page_uses_recognition_capped() {
        let t = template(7);
        let text = MockPdfText::new(&[""]);
        let recognizer = Arc::new(MockRecognizer::new("WO 4521983", 0.99));
        let result = orchestrator(text)
            .with_recognition(Box::new(MockRegionRenderer), Box::new(Arc::clone(&recognizer)))
            .extract(&request(Some(&t)));

        assert_eq!(result.identifier.as_deref(), Some("4521983"));
        assert_eq!(result.confidence, 0.94);
        assert_eq!(result.provenance.input_scope, InputScope::CroppedRegion);
        assert!(result.provenance.cropped_text_hash.is_some());
    }

    #[test]
    fn recognition_failure_is_not_fatal() {
        let t = template(7);
        let text = MockPdfText::new(&[""]);
        let result = orchestrator(text)
            .with_recognition(Box::new(MockRegionRenderer), Box::new(MockRecognizer::timing_out()))
            .extract(&request(Some(&t)));

        assert!(result.identifier.is_none());
        assert_eq!(result.confidence, 0.0);
        assert!(result
            .provenance
            .reasons
            .iter()
            .any(|r| r.starts_with("optical recognition failed")));
        assert_eq!(result.termination, Some(Termination::ScanQuality));
    }

    #[test]
    fn low_confidence_recognition_falls_back_capped() {
        let t = template(7);
        let text = MockPdfText::new(&[""]);
        let result = orchestrator(text)
            .with_recognition(Box::new(MockRegionRenderer), Box::new(MockRecognizer::new("4521983", 0.75)))
            .extract(&request(Some(&t)));

        assert_eq!(result.identifier.as_deref(), Some("4521983"));
        assert_eq!(result.confidence, 0.70);
        assert_eq!(result.termination, Some(Termination::ScanQuality));
    }

    #[test]
    fn competing_recognition_tokens_are_ambiguous() {
        let t = template(7);
        let text = MockPdfText::new(&[""]);
        let result = orchestrator(text)
            .with_recognition(
                Box::new(MockRegionRenderer),
                Box::new(MockRecognizer::new("4521983 4521988", 0.9)),
            )
            .extract(&request(Some(&t)));

        assert_eq!(result.termination, Some(Termination::AmbiguousCandidates));
        assert_eq!(result.candidates.len(), 2);
        assert!(result.confidence <= 0.70);
    }

    #[test]
    fn rescue_receives_cropped_text_only() {
        let t = template(7);
        let text = MockPdfText::new(&["CONFIDENTIAL customer page\nSignature ____"])
            .with_region_text("W0 #452l983");
        let llm = Arc::new(MockLlmClient::new(
            r#"{"identifier": "4521983", "confidence": 0.99, "reason": "l read as 1"}"#,
        ));
        let rescue = LlmRescue::new(Box::new(SharedRescue(Arc::clone(&llm))), "m");
        let result = orchestrator(text)
            .with_rescue(Box::new(rescue))
            .extract(&request(Some(&t)));

        assert_eq!(result.identifier.as_deref(), Some("4521983"));
        assert_eq!(result.method, ExtractionMethod::GenerativeRescue);
        assert_eq!(result.confidence, 0.85);
        assert_eq!(result.rationale, "l read as 1");
        let prompts = llm.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("W0 #452l983"));
        assert!(!prompts[0].contains("CONFIDENTIAL"));
        assert!(!prompts[0].contains("Signature"));
    }

    #[test]
    fn rescue_never_runs_without_cropped_text() {
        let t = template(7);
        let text = MockPdfText::new(&["Lots of page text but no numbers"]);
        let llm = Arc::new(MockLlmClient::new(r#"{"identifier": "4521983", "confidence": 0.9}"#));
        let rescue = LlmRescue::new(Box::new(SharedRescue(Arc::clone(&llm))), "m");
        let result = orchestrator(text)
            .with_rescue(Box::new(rescue))
            .extract(&request(Some(&t)));

        assert!(llm.prompts().is_empty());
        assert!(result.identifier.is_none());
        assert!(!result.provenance.pipeline_path.contains(&ExtractionMethod::GenerativeRescue));
    }

    #[test]
    fn rescue_malformed_identifier_is_rejected() {
        let t = template(6);
        let text = MockPdfText::new(&["invoice 881"]).with_region_text("invoice 881");
        let llm = Arc::new(MockLlmClient::new(r#"{"identifier": "881", "confidence": 0.9}"#));
        let rescue = LlmRescue::new(Box::new(SharedRescue(Arc::clone(&llm))), "m");
        let result = orchestrator(text)
            .with_rescue(Box::new(rescue))
            .extract(&request(Some(&t)));

        assert_eq!(llm.prompts().len(), 1);
        assert!(result.identifier.is_none());
        assert_eq!(result.termination, Some(Termination::NoCandidates));
    }

    #[test]
    fn invoice_fragment_without_layers_has_no_candidates() {
        let t = template(6);
        let text = MockPdfText::new(&["invoice 881"]).with_region_text("invoice 881");
        let result = orchestrator(text).extract(&request(Some(&t)));

        assert!(result.identifier.is_none());
        assert_eq!(result.confidence, 0.0);
        assert_eq!(result.method, ExtractionMethod::Unresolved);
        assert_eq!(result.provenance.input_scope, InputScope::CroppedRegion);
        assert_eq!(
            result.provenance.cropped_text_snippet.as_deref(),
            Some("invoice 881")
        );
    }

    #[test]
    fn unusable_page_is_recorded_not_raised() {
        let t = template(7);
        let text = MockPdfText::new(&["Work Order 4521983"]);
        let req = ExtractionRequest {
            page_index: 3,
            ..request(Some(&t))
        };
        let result = orchestrator(text).extract(&req);

        assert!(result.identifier.is_none());
        assert!(!result.provenance.region_used);
        assert!(result
            .provenance
            .reasons
            .iter()
            .any(|r| r.starts_with("text layer unavailable")));
    }

    #[test]
    fn region_key_recorded_in_provenance() {
        let t = template(7);
        let text = MockPdfText::new(&["WO 4521983"]).with_region_text("WO 4521983");
        let result = orchestrator(text).extract(&request(Some(&t)));
        assert_eq!(result.provenance.region_key, Some(t.region_key()));
        assert_eq!(result.provenance.input_scope, InputScope::CroppedRegion);
    }

    #[test]
    fn snippet_needs_template_and_renderer() {
        let t = template(7);
        let plain = orchestrator(MockPdfText::new(&["WO 4521983"]));
        assert!(plain.render_snippet(&request(Some(&t))).unwrap().is_none());

        let rendering = orchestrator(MockPdfText::new(&["WO 4521983"]))
            .with_recognition(Box::new(MockRegionRenderer), Box::new(MockRecognizer::unavailable()));
        assert!(rendering.render_snippet(&request(None)).unwrap().is_none());
        let png = rendering.render_snippet(&request(Some(&t))).unwrap().unwrap();
        assert!(png.starts_with(&[0x89, 0x50, 0x4E, 0x47]));
    }

    #[test]
    fn run_keeps_region_bitmap_only_when_recognition_rendered() {
        let t = template(7);
        let scanned = orchestrator(MockPdfText::new(&[""]))
            .with_recognition(Box::new(MockRegionRenderer), Box::new(MockRecognizer::new("WO 4521983", 0.99)))
            .run(&request(Some(&t)));
        let png = scanned.region_png.expect("layer B rendered the region");
        assert!(png.starts_with(&[0x89, 0x50, 0x4E, 0x47]));
        assert_eq!(scanned.result.identifier.as_deref(), Some("4521983"));

        let digital = orchestrator(MockPdfText::new(&["WO 4521983"]).with_region_text("WO 4521983"))
            .with_recognition(Box::new(MockRegionRenderer), Box::new(MockRecognizer::new("WO 4521983", 0.99)))
            .run(&request(Some(&t)));
        assert!(digital.region_png.is_none());
    }
}
