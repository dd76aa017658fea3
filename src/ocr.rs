//! Text recognition collaborator interface and the sidecar adapter the CLI
//! uses to read OCR output produced by an external engine.

use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TillrollError};
use crate::geometry::BoundingBox;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    #[serde(rename = "boundingBox", alias = "bbox")]
    pub bbox: BoundingBox,
    #[serde(default)]
    pub confidence: f32,
}

impl OcrWord {
    pub fn new(text: &str, bbox: BoundingBox) -> Self {
        Self {
            text: text.to_string(),
            bbox,
            confidence: 1.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrOutput {
    #[serde(rename = "fullText", alias = "full_text", default)]
    pub full_text: String,
    #[serde(default)]
    pub words: Vec<OcrWord>,
}

impl OcrOutput {
    pub fn is_empty(&self) -> bool {
        self.full_text.trim().is_empty() && self.words.is_empty()
    }
}

/// A text recognition service. Calls are blocking and made one at a time
/// per photograph.
pub trait TextRecognizer {
    fn recognize(&self, image: &RgbImage) -> Result<OcrOutput>;
}

/// Serves pre-computed OCR output for a single photograph.
///
/// Looks for `<photo>.ocr.json` (full text plus word boxes) and then
/// `<photo>.txt` (full text only) next to the image.
pub struct SidecarRecognizer {
    output: OcrOutput,
}

impl SidecarRecognizer {
    pub fn new(output: OcrOutput) -> Self {
        Self { output }
    }

    pub fn for_photo(photo: &Path) -> Result<Self> {
        let json_path = sidecar_path(photo, "ocr.json");
        if json_path.exists() {
            let content = std::fs::read_to_string(&json_path)?;
            let output: OcrOutput = serde_json::from_str(&content)?;
            return Ok(Self::new(output));
        }
        let txt_path = sidecar_path(photo, "txt");
        if txt_path.exists() {
            let full_text = std::fs::read_to_string(&txt_path)?;
            return Ok(Self::new(OcrOutput {
                full_text,
                words: Vec::new(),
            }));
        }
        Err(TillrollError::Recognition(format!(
            "no OCR sidecar found for {}",
            photo.display()
        )))
    }
}

impl TextRecognizer for SidecarRecognizer {
    fn recognize(&self, _image: &RgbImage) -> Result<OcrOutput> {
        if self.output.is_empty() {
            return Err(TillrollError::Recognition("empty OCR output".into()));
        }
        Ok(self.output.clone())
    }
}

fn sidecar_path(photo: &Path, suffix: &str) -> PathBuf {
    let mut name = photo.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_prefers_json() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("r1.jpg");
        std::fs::write(dir.path().join("r1.jpg.txt"), "plain text").unwrap();
        std::fs::write(
            dir.path().join("r1.jpg.ocr.json"),
            r#"{"fullText": "WALMART", "words": [
                {"text": "WALMART", "boundingBox": {"x_min": 1, "y_min": 2, "x_max": 50, "y_max": 12}, "confidence": 0.9}
            ]}"#,
        )
        .unwrap();
        let rec = SidecarRecognizer::for_photo(&photo).unwrap();
        let out = rec.recognize(&RgbImage::new(1, 1)).unwrap();
        assert_eq!(out.full_text, "WALMART");
        assert_eq!(out.words.len(), 1);
        assert_eq!(out.words[0].bbox.x_max, 50.0);
    }

    #[test]
    fn test_sidecar_text_only() {
        let dir = tempfile::tempdir().unwrap();
        let photo = dir.path().join("r2.png");
        std::fs::write(dir.path().join("r2.png.txt"), "TARGET\nTotal: $4.00").unwrap();
        let out = SidecarRecognizer::for_photo(&photo)
            .unwrap()
            .recognize(&RgbImage::new(1, 1))
            .unwrap();
        assert!(out.words.is_empty());
        assert!(out.full_text.starts_with("TARGET"));
    }

    #[test]
    fn test_missing_sidecar_is_recognition_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = SidecarRecognizer::for_photo(&dir.path().join("none.jpg")).err().unwrap();
        assert!(matches!(err, TillrollError::Recognition(_)));
    }

    #[test]
    fn test_empty_output_fails_recognition() {
        let rec = SidecarRecognizer::new(OcrOutput::default());
        assert!(rec.recognize(&RgbImage::new(1, 1)).is_err());
    }
}
