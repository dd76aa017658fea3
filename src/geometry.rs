//! Axis-aligned boxes and binary masks used by segmentation.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle in pixel coordinates. `x_max`/`y_max` are
/// exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min: x_min.min(x_max),
            y_min: y_min.min(y_max),
            x_max: x_max.max(x_min),
            y_max: y_max.max(y_min),
        }
    }

    /// Box covering a whole `width` x `height` image.
    pub fn full(width: u32, height: u32) -> Self {
        Self::new(0.0, 0.0, width as f32, height as f32)
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn center_y(&self) -> f32 {
        (self.y_min + self.y_max) / 2.0
    }

    /// Width over height. Zero-height boxes report infinity.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height() <= 0.0 {
            f32::INFINITY
        } else {
            self.width() / self.height()
        }
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            x_min: self.x_min.min(other.x_min),
            y_min: self.y_min.min(other.y_min),
            x_max: self.x_max.max(other.x_max),
            y_max: self.y_max.max(other.y_max),
        }
    }

    pub fn intersection_area(&self, other: &Self) -> f32 {
        let w = self.x_max.min(other.x_max) - self.x_min.max(other.x_min);
        let h = self.y_max.min(other.y_max) - self.y_min.max(other.y_min);
        if w <= 0.0 || h <= 0.0 {
            0.0
        } else {
            w * h
        }
    }

    pub fn iou(&self, other: &Self) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Multiply every coordinate by `factor`.
    pub fn scale(&self, factor: f32) -> Self {
        Self {
            x_min: self.x_min * factor,
            y_min: self.y_min * factor,
            x_max: self.x_max * factor,
            y_max: self.y_max * factor,
        }
    }

    /// Grow the box by `pad` pixels on every side, clamped to the image.
    pub fn padded(&self, pad: f32, width: u32, height: u32) -> Self {
        Self {
            x_min: (self.x_min - pad).max(0.0),
            y_min: (self.y_min - pad).max(0.0),
            x_max: (self.x_max + pad).min(width as f32),
            y_max: (self.y_max + pad).min(height as f32),
        }
    }

    /// Integer crop rectangle `(x, y, width, height)` inside the image, or
    /// `None` if the box is empty after clamping.
    pub fn to_crop_rect(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        let x1 = (self.x_min.floor().max(0.0) as u32).min(width);
        let y1 = (self.y_min.floor().max(0.0) as u32).min(height);
        let x2 = (self.x_max.ceil().max(0.0) as u32).min(width);
        let y2 = (self.y_max.ceil().max(0.0) as u32).min(height);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2 - x1, y2 - y1))
    }
}

/// A binary pixel mask, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Mask {
    width: u32,
    height: u32,
    bits: Vec<bool>,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            bits: vec![false; (width as usize) * (height as usize)],
        }
    }

    /// Wrap an existing row-major buffer. Returns `None` if the length does
    /// not match the dimensions.
    pub fn from_bits(width: u32, height: u32, bits: Vec<bool>) -> Option<Self> {
        if bits.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self { width, height, bits })
    }

    /// A mask with every pixel inside `rect` set.
    pub fn from_rect(width: u32, height: u32, rect: &BoundingBox) -> Self {
        let mut mask = Self::new(width, height);
        if let Some((x, y, w, h)) = rect.to_crop_rect(width, height) {
            for row in y..y + h {
                for col in x..x + w {
                    mask.set(col, row, true);
                }
            }
        }
        mask
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        if x >= self.width || y >= self.height {
            return false;
        }
        self.bits[(y as usize) * (self.width as usize) + x as usize]
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        if x < self.width && y < self.height {
            let idx = (y as usize) * (self.width as usize) + x as usize;
            self.bits[idx] = value;
        }
    }

    /// Number of set pixels.
    pub fn area(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    /// Set pixels as a fraction of the whole mask.
    pub fn area_fraction(&self) -> f32 {
        let total = self.bits.len();
        if total == 0 {
            return 0.0;
        }
        self.area() as f32 / total as f32
    }

    /// Tight box around the set pixels.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let (mut x_min, mut y_min) = (u32::MAX, u32::MAX);
        let (mut x_max, mut y_max) = (0u32, 0u32);
        let mut any = false;
        for y in 0..self.height {
            for x in 0..self.width {
                if self.get(x, y) {
                    any = true;
                    x_min = x_min.min(x);
                    y_min = y_min.min(y);
                    x_max = x_max.max(x);
                    y_max = y_max.max(y);
                }
            }
        }
        any.then(|| {
            BoundingBox::new(
                x_min as f32,
                y_min as f32,
                (x_max + 1) as f32,
                (y_max + 1) as f32,
            )
        })
    }

    /// Pixel-level intersection over union. Masks of different dimensions
    /// never overlap.
    pub fn iou(&self, other: &Self) -> f32 {
        if self.width != other.width || self.height != other.height {
            return 0.0;
        }
        let mut inter = 0usize;
        let mut union = 0usize;
        for (a, b) in self.bits.iter().zip(other.bits.iter()) {
            if *a && *b {
                inter += 1;
            }
            if *a || *b {
                union += 1;
            }
        }
        if union == 0 {
            0.0
        } else {
            inter as f32 / union as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_box_iou() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        let c = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(a.iou(&c), 0.0);
    }

    #[test]
    fn test_box_union_and_padding() {
        let a = BoundingBox::new(10.0, 10.0, 20.0, 20.0);
        let b = BoundingBox::new(15.0, 5.0, 30.0, 12.0);
        assert_eq!(a.union(&b), BoundingBox::new(10.0, 5.0, 30.0, 20.0));
        let p = a.padded(15.0, 40, 25);
        assert_eq!(p, BoundingBox::new(0.0, 0.0, 35.0, 25.0));
    }

    #[test]
    fn test_crop_rect_clamps() {
        let b = BoundingBox::new(-5.0, 2.5, 120.0, 40.2);
        assert_eq!(b.to_crop_rect(100, 50), Some((0, 2, 100, 39)));
        let empty = BoundingBox::new(200.0, 0.0, 300.0, 10.0);
        assert_eq!(empty.to_crop_rect(100, 50), None);
    }

    #[test]
    fn test_mask_area_and_bbox() {
        let rect = BoundingBox::new(2.0, 3.0, 6.0, 8.0);
        let mask = Mask::from_rect(10, 10, &rect);
        assert_eq!(mask.area(), 20);
        assert!((mask.area_fraction() - 0.2).abs() < 1e-6);
        assert_eq!(mask.bounding_box(), Some(rect));
        assert_eq!(Mask::new(4, 4).bounding_box(), None);
    }

    #[test]
    fn test_mask_iou() {
        let a = Mask::from_rect(10, 10, &BoundingBox::new(0.0, 0.0, 4.0, 10.0));
        let b = Mask::from_rect(10, 10, &BoundingBox::new(2.0, 0.0, 6.0, 10.0));
        assert!((a.iou(&b) - 20.0 / 60.0).abs() < 1e-6);
        assert_eq!(a.iou(&Mask::new(5, 5)), 0.0);
        assert!(Mask::from_bits(2, 2, vec![true; 3]).is_none());
    }
}
