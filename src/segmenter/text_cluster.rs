//! Strategy A: split a photograph into receipts by clustering OCR words.
//!
//! Words become lines by vertical proximity, and lines become clusters
//! wherever a large vertical gap separates them.

use crate::geometry::BoundingBox;
use crate::ocr::OcrWord;

use super::SegmentationConfig;

#[derive(Debug, Clone, PartialEq)]
pub struct TextCluster {
    pub bbox: BoundingBox,
    pub text: String,
    pub words: Vec<OcrWord>,
}

#[derive(Debug)]
struct Line {
    words: Vec<OcrWord>,
    center_sum: f32,
    bbox: BoundingBox,
}

impl Line {
    fn new(word: OcrWord) -> Self {
        Self {
            center_sum: word.bbox.center_y(),
            bbox: word.bbox,
            words: vec![word],
        }
    }

    fn center_y(&self) -> f32 {
        self.center_sum / self.words.len() as f32
    }

    fn push(&mut self, word: OcrWord) {
        self.center_sum += word.bbox.center_y();
        self.bbox = self.bbox.union(&word.bbox);
        self.words.push(word);
    }

    fn text(&self) -> String {
        let mut words: Vec<&OcrWord> = self.words.iter().collect();
        words.sort_by(|a, b| a.bbox.x_min.total_cmp(&b.bbox.x_min));
        words
            .iter()
            .map(|w| w.text.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Group words into lines. A word joins the current line when its vertical
/// center lies within `line_tolerance` pixels of the line's mean center.
fn group_lines(words: &[OcrWord], line_tolerance: f32) -> Vec<Line> {
    let mut sorted: Vec<OcrWord> = words
        .iter()
        .filter(|w| !w.text.trim().is_empty())
        .cloned()
        .collect();
    sorted.sort_by(|a, b| {
        a.bbox
            .center_y()
            .total_cmp(&b.bbox.center_y())
            .then(a.bbox.x_min.total_cmp(&b.bbox.x_min))
    });

    let mut lines: Vec<Line> = Vec::new();
    for word in sorted {
        match lines.last_mut() {
            Some(line) if (word.bbox.center_y() - line.center_y()).abs() <= line_tolerance => {
                line.push(word)
            }
            _ => lines.push(Line::new(word)),
        }
    }
    lines.sort_by(|a, b| a.bbox.y_min.total_cmp(&b.bbox.y_min));
    lines
}

fn close_cluster(lines: &mut Vec<Line>, clusters: &mut Vec<TextCluster>) {
    if lines.is_empty() {
        return;
    }
    let bbox = lines
        .iter()
        .skip(1)
        .fold(lines[0].bbox, |acc, l| acc.union(&l.bbox));
    let text = lines.iter().map(Line::text).collect::<Vec<_>>().join("\n");
    let words = lines.drain(..).flat_map(|l| l.words).collect();
    clusters.push(TextCluster { bbox, text, words });
}

/// Cluster OCR words of a photograph `height` pixels tall into receipt
/// candidates, top to bottom. Returns an empty list when there are no words.
pub fn cluster_words(words: &[OcrWord], height: u32, config: &SegmentationConfig) -> Vec<TextCluster> {
    let line_tolerance = config.line_group_fraction * height as f32;
    let gap_threshold = config.cluster_gap_fraction * height as f32;

    let lines = group_lines(words, line_tolerance);
    let mut clusters = Vec::new();
    let mut current: Vec<Line> = Vec::new();
    for line in lines {
        if let Some(prev) = current.last() {
            let gap = line.bbox.y_min - prev.bbox.y_max;
            if gap > gap_threshold {
                close_cluster(&mut current, &mut clusters);
            }
        }
        current.push(line);
    }
    close_cluster(&mut current, &mut clusters);
    clusters
}
