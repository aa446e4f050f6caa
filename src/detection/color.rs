// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 颜色区域检测: HSV 阈值 → 外轮廓 → 最小外接圆, 取半径最大者

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::convex_hull;
use serde::{Deserialize, Serialize};

use super::Detector;
use crate::error::{Result, TrackerError};
use crate::geometry::Point2;
use crate::observation::{ColorBlob, ColorObservation, ImageSize};
use crate::schema::{TrackedPointSchema, COLOR_SCHEMA};

const EPS: f64 = 1e-7;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorConfig {
    /// HSV 下界 (H: 0-179, S/V: 0-255), 含边界
    pub lower: [u8; 3],
    /// HSV 上界, 含边界
    pub upper: [u8; 3],
    /// 外接圆半径必须大于该值
    pub min_radius: f32,
}

impl Default for ColorConfig {
    fn default() -> Self {
        Self {
            lower: [40, 40, 40],
            upper: [255, 255, 255],
            min_radius: 1.0,
        }
    }
}

impl ColorConfig {
    pub fn validate(&self) -> Result<()> {
        for c in 0..3 {
            if self.lower[c] > self.upper[c] {
                return Err(TrackerError::configuration(format!(
                    "color bound channel {}: lower {} exceeds upper {}",
                    c, self.lower[c], self.upper[c]
                )));
            }
        }
        if !self.min_radius.is_finite() || self.min_radius < 0.0 {
            return Err(TrackerError::configuration(format!(
                "min_radius must be a finite value >= 0, got {}",
                self.min_radius
            )));
        }
        Ok(())
    }
}

/// 8 位 HSV, H 范围 0-179
pub fn rgb_to_hsv(rgb: Rgb<u8>) -> [u8; 3] {
    let [r, g, b] = rgb.0.map(|v| v as f32);
    let v = r.max(g).max(b);
    let diff = v - r.min(g).min(b);
    let s = if v > 0.0 { 255.0 * diff / v } else { 0.0 };
    let mut h = if diff == 0.0 {
        0.0
    } else if v == r {
        60.0 * (g - b) / diff
    } else if v == g {
        120.0 + 60.0 * (b - r) / diff
    } else {
        240.0 + 60.0 * (r - g) / diff
    };
    if h < 0.0 {
        h += 360.0;
    }
    [
        (h / 2.0).round().min(179.0) as u8,
        s.round() as u8,
        v as u8,
    ]
}

pub struct ColorDetector {
    config: ColorConfig,
}

impl ColorDetector {
    pub fn new(config: ColorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ColorConfig {
        &self.config
    }

    fn mask(&self, rgb: &RgbImage) -> GrayImage {
        let (lo, hi) = (self.config.lower, self.config.upper);
        GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
            let hsv = rgb_to_hsv(*rgb.get_pixel(x, y));
            let inside = (0..3).all(|c| lo[c] <= hsv[c] && hsv[c] <= hi[c]);
            Luma([if inside { 255 } else { 0 }])
        })
    }

    /// 所有合格区域的外接圆
    fn blobs(&self, mask: &GrayImage) -> Vec<ColorBlob> {
        find_contours::<i32>(mask)
            .into_iter()
            .filter(|c| c.parent.is_none() && c.border_type == BorderType::Outer)
            .filter_map(|c| {
                // 细长区域的轮廓会重复经过同一像素
                let mut points = c.points;
                points.sort_by_key(|p| (p.y, p.x));
                points.dedup();
                let hull: Vec<(f64, f64)> = convex_hull(points)
                    .into_iter()
                    .map(|p| (p.x as f64, p.y as f64))
                    .collect();
                let (cx, cy, r) = min_enclosing_circle(&hull)?;
                (r > self.config.min_radius as f64).then(|| ColorBlob {
                    center: Point2::new(cx as f32, cy as f32),
                    radius: r as f32,
                })
            })
            .collect()
    }
}

impl Detector for ColorDetector {
    type Output = ColorObservation;

    fn detect(&mut self, image: &DynamicImage) -> Result<Self::Output> {
        let mask = self.mask(&image.to_rgb8());
        let blobs = self.blobs(&mask);
        let largest = blobs
            .iter()
            .copied()
            .max_by(|a, b| a.radius.total_cmp(&b.radius));
        Ok(ColorObservation::new(
            largest,
            blobs.len(),
            ImageSize::of(image),
        ))
    }

    fn schema(&self) -> &TrackedPointSchema {
        &COLOR_SCHEMA
    }
}

fn inside(c: (f64, f64, f64), p: (f64, f64)) -> bool {
    (p.0 - c.0).hypot(p.1 - c.1) <= c.2 + EPS
}

fn circle_from_two(a: (f64, f64), b: (f64, f64)) -> (f64, f64, f64) {
    let (cx, cy) = ((a.0 + b.0) / 2.0, (a.1 + b.1) / 2.0);
    (cx, cy, (a.0 - cx).hypot(a.1 - cy))
}

fn circle_from_three(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> (f64, f64, f64) {
    let d = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
    if d.abs() < EPS {
        // 共线: 取最远两点为直径
        return [circle_from_two(a, b), circle_from_two(a, c), circle_from_two(b, c)]
            .into_iter()
            .fold((0.0, 0.0, -1.0), |best, x| if x.2 > best.2 { x } else { best });
    }
    let sa = a.0 * a.0 + a.1 * a.1;
    let sb = b.0 * b.0 + b.1 * b.1;
    let sc = c.0 * c.0 + c.1 * c.1;
    let cx = (sa * (b.1 - c.1) + sb * (c.1 - a.1) + sc * (a.1 - b.1)) / d;
    let cy = (sa * (c.0 - b.0) + sb * (a.0 - c.0) + sc * (b.0 - a.0)) / d;
    (cx, cy, (a.0 - cx).hypot(a.1 - cy))
}

/// 增量式最小外接圆, 返回 (cx, cy, r)
pub fn min_enclosing_circle(points: &[(f64, f64)]) -> Option<(f64, f64, f64)> {
    let first = *points.first()?;
    let mut circle = (first.0, first.1, 0.0);
    for i in 1..points.len() {
        if inside(circle, points[i]) {
            continue;
        }
        circle = (points[i].0, points[i].1, 0.0);
        for j in 0..i {
            if inside(circle, points[j]) {
                continue;
            }
            circle = circle_from_two(points[i], points[j]);
            for k in 0..j {
                if !inside(circle, points[k]) {
                    circle = circle_from_three(points[i], points[j], points[k]);
                }
            }
        }
    }
    Some(circle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Observation;
    use imageproc::drawing::draw_filled_circle_mut;

    fn green_disks(disks: &[(i32, i32, i32)]) -> DynamicImage {
        let mut img = RgbImage::from_pixel(160, 120, Rgb([10, 10, 10]));
        for &(x, y, r) in disks {
            draw_filled_circle_mut(&mut img, (x, y), r, Rgb([30, 200, 40]));
        }
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_hsv_conversion() {
        assert_eq!(rgb_to_hsv(Rgb([255, 0, 0])), [0, 255, 255]);
        assert_eq!(rgb_to_hsv(Rgb([0, 255, 0])), [60, 255, 255]);
        assert_eq!(rgb_to_hsv(Rgb([0, 0, 255])), [120, 255, 255]);
        assert_eq!(rgb_to_hsv(Rgb([128, 128, 128])), [0, 0, 128]);
        assert_eq!(rgb_to_hsv(Rgb([0, 0, 0])), [0, 0, 0]);
    }

    #[test]
    fn test_largest_blob_is_reported() {
        let mut detector = ColorDetector::new(ColorConfig::default()).unwrap();
        let obs = detector.detect(&green_disks(&[(40, 40, 4), (110, 70, 12)])).unwrap();
        assert_eq!(obs.blob_count(), 2);
        let traj = obs.trajectories();
        assert!((traj[[0, 0]] - 110.0).abs() <= 1.0);
        assert!((traj[[0, 1]] - 70.0).abs() <= 1.0);
        assert_eq!(traj[[0, 2]], 0.0);
        let radius = obs.blob().map(|b| b.radius).unwrap();
        assert!((radius - 12.0).abs() <= 1.5, "radius {radius}");
    }

    #[test]
    fn test_dark_image_is_nan() {
        let mut detector = ColorDetector::new(ColorConfig::default()).unwrap();
        let dark = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb([5, 5, 5])));
        let obs = detector.detect(&dark).unwrap();
        assert_eq!(obs.blob_count(), 0);
        assert!(obs.trajectories().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_single_pixel_is_below_min_radius() {
        let mut img = RgbImage::from_pixel(20, 20, Rgb([0, 0, 0]));
        img.put_pixel(10, 10, Rgb([0, 255, 0]));
        let mut detector = ColorDetector::new(ColorConfig::default()).unwrap();
        let obs = detector.detect(&DynamicImage::ImageRgb8(img)).unwrap();
        assert!(obs.blob().is_none());
    }

    #[test]
    fn test_hue_band_excludes_other_colors() {
        // 只接受绿色
        let config = ColorConfig {
            lower: [50, 100, 100],
            upper: [70, 255, 255],
            ..Default::default()
        };
        let mut img = RgbImage::from_pixel(100, 60, Rgb([0, 0, 0]));
        draw_filled_circle_mut(&mut img, (20, 30), 10, Rgb([220, 20, 20]));
        draw_filled_circle_mut(&mut img, (75, 30), 5, Rgb([20, 220, 20]));
        let mut detector = ColorDetector::new(config).unwrap();
        let obs = detector.detect(&DynamicImage::ImageRgb8(img)).unwrap();
        assert_eq!(obs.blob_count(), 1);
        assert!((obs.trajectories()[[0, 0]] - 75.0).abs() <= 1.0);
    }

    #[test]
    fn test_enclosing_circle_of_square() {
        let square = [(0.0, 0.0), (4.0, 0.0), (4.0, 4.0), (0.0, 4.0)];
        let (cx, cy, r) = min_enclosing_circle(&square).unwrap();
        assert!((cx - 2.0).abs() < 1e-9 && (cy - 2.0).abs() < 1e-9);
        assert!((r - 8f64.sqrt()).abs() < 1e-9);
        assert!(min_enclosing_circle(&[]).is_none());
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let config = ColorConfig {
            lower: [100, 0, 0],
            upper: [50, 255, 255],
            ..Default::default()
        };
        assert!(matches!(
            ColorDetector::new(config),
            Err(TrackerError::Configuration(_))
        ));
    }
}
