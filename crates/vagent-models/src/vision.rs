//! The shared vision-response parser.
//!
//! The vision model returns a JSON-shaped string. Every vision call-site
//! parses it through [`parse_vision_response`]; on schema violation the
//! raw string becomes the description and the structured fields default.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::frame::{DetectedObject, TextRegion};
use crate::rect::NormalizedRect;

/// Typed analysis of a single frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FrameAnalysis {
    /// Natural-language description of the frame
    #[serde(default)]
    pub description: String,
    /// Visual feature keywords
    #[serde(default)]
    pub features: Vec<String>,
    /// Detected objects
    #[serde(default)]
    pub objects: Vec<DetectedObject>,
    /// Detected text regions
    #[serde(default)]
    pub text_regions: Vec<TextRegion>,
}

/// Loose wire shape the model actually produces.
#[derive(Debug, Default, Deserialize)]
struct RawVisionResponse {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    features: Vec<String>,
    #[serde(default)]
    objects: Vec<RawObject>,
    #[serde(default, alias = "text")]
    text_regions: Vec<RawText>,
}

#[derive(Debug, Deserialize)]
struct RawObject {
    label: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default, alias = "bounding_box")]
    bbox: Option<NormalizedRect>,
}

#[derive(Debug, Deserialize)]
struct RawText {
    text: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    bbox: Option<NormalizedRect>,
}

/// Strip a markdown code fence, if the model wrapped its JSON in one.
fn strip_code_fence(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// Parse a vision response into [`FrameAnalysis`].
///
/// Never fails: a response that does not match the schema is treated as
/// a plain description with default structured fields.
pub fn parse_vision_response(raw: &str) -> FrameAnalysis {
    let text = strip_code_fence(raw);

    match serde_json::from_str::<RawVisionResponse>(text) {
        Ok(parsed) => {
            // An all-empty parse of a non-empty input means the model
            // answered in prose; keep the prose as the description.
            let description = parsed.description.unwrap_or_default();
            if description.is_empty()
                && parsed.features.is_empty()
                && parsed.objects.is_empty()
                && parsed.text_regions.is_empty()
            {
                return FrameAnalysis {
                    description: raw.trim().to_string(),
                    ..Default::default()
                };
            }

            FrameAnalysis {
                description,
                features: parsed.features,
                objects: parsed
                    .objects
                    .into_iter()
                    .map(|o| DetectedObject {
                        label: o.label,
                        confidence: o.confidence.clamp(0.0, 1.0),
                        bbox: o.bbox.unwrap_or(NormalizedRect {
                            x: 0.0,
                            y: 0.0,
                            width: 1.0,
                            height: 1.0,
                        }),
                    })
                    .collect(),
                text_regions: parsed
                    .text_regions
                    .into_iter()
                    .map(|t| TextRegion {
                        text: t.text,
                        confidence: t.confidence.clamp(0.0, 1.0),
                        bbox: t.bbox,
                    })
                    .collect(),
            }
        }
        Err(_) => FrameAnalysis {
            description: raw.trim().to_string(),
            ..Default::default()
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_response() {
        let raw = r#"{
            "description": "a person riding a bike",
            "features": ["outdoor", "daylight"],
            "objects": [
                {"label": "person", "confidence": 0.95, "bbox": {"x": 0.1, "y": 0.1, "width": 0.3, "height": 0.6}},
                {"label": "bicycle", "confidence": 0.9}
            ],
            "text_regions": [{"text": "STOP", "confidence": 0.8}]
        }"#;

        let analysis = parse_vision_response(raw);
        assert_eq!(analysis.description, "a person riding a bike");
        assert_eq!(analysis.features.len(), 2);
        assert_eq!(analysis.objects.len(), 2);
        assert_eq!(analysis.text_regions[0].text, "STOP");
        // Missing bbox defaults to the full frame
        assert_eq!(analysis.objects[1].bbox.width, 1.0);
    }

    #[test]
    fn strips_markdown_fence() {
        let raw = "```json\n{\"description\": \"fenced\"}\n```";
        let analysis = parse_vision_response(raw);
        assert_eq!(analysis.description, "fenced");
    }

    #[test]
    fn falls_back_to_raw_description() {
        let raw = "The frame shows a sunset over a mountain range.";
        let analysis = parse_vision_response(raw);
        assert_eq!(analysis.description, raw);
        assert!(analysis.objects.is_empty());
        assert!(analysis.features.is_empty());
    }

    #[test]
    fn clamps_out_of_range_confidence() {
        let raw = r#"{"description": "x", "objects": [{"label": "cat", "confidence": 1.7}]}"#;
        let analysis = parse_vision_response(raw);
        assert_eq!(analysis.objects[0].confidence, 1.0);
    }
}
