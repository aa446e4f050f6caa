// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 最亮点检测: 亮度最大值所在连通区域的质心

use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;
use imageproc::region_labelling::{connected_components, Connectivity};
use serde::{Deserialize, Serialize};

use super::Detector;
use crate::error::{Result, TrackerError};
use crate::geometry::Point2;
use crate::observation::{BrightPointObservation, ImageSize};
use crate::schema::{TrackedPointSchema, BRIGHTEST_POINT_SCHEMA};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrightestPointConfig {
    /// 最大亮度低于该值视为未检测到
    pub luminance_threshold: u8,
    /// 与最大亮度相差不超过该值的像素属于同一亮斑
    pub brightness_tolerance: u8,
    /// 高斯模糊 sigma, 0 表示不模糊
    pub blur_sigma: f32,
}

impl Default for BrightestPointConfig {
    fn default() -> Self {
        Self {
            luminance_threshold: 200,
            brightness_tolerance: 10,
            blur_sigma: 0.0,
        }
    }
}

impl BrightestPointConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.blur_sigma.is_finite() || self.blur_sigma < 0.0 {
            return Err(TrackerError::configuration(format!(
                "blur_sigma must be a finite value >= 0, got {}",
                self.blur_sigma
            )));
        }
        Ok(())
    }
}

pub struct BrightestPointDetector {
    config: BrightestPointConfig,
}

impl BrightestPointDetector {
    pub fn new(config: BrightestPointConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BrightestPointConfig {
        &self.config
    }

    fn luminance(&self, image: &DynamicImage) -> GrayImage {
        let gray = image.to_luma8();
        if self.config.blur_sigma > 0.0 {
            gaussian_blur_f32(&gray, self.config.blur_sigma)
        } else {
            gray
        }
    }

    /// 质心, confidence 为峰值亮度
    fn locate(&self, gray: &GrayImage) -> Option<Point2> {
        // 光栅顺序中第一个最大值
        let (mut peak, mut px, mut py) = (0u8, 0u32, 0u32);
        let mut found = false;
        for (x, y, p) in gray.enumerate_pixels() {
            if !found || p[0] > peak {
                peak = p[0];
                px = x;
                py = y;
                found = true;
            }
        }
        if !found || peak < self.config.luminance_threshold {
            return None;
        }

        let floor = peak.saturating_sub(self.config.brightness_tolerance);
        let mask = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            if gray.get_pixel(x, y)[0] >= floor {
                Luma([255u8])
            } else {
                Luma([0u8])
            }
        });
        let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));
        let target = labels.get_pixel(px, py)[0];

        let (mut sx, mut sy, mut n) = (0f64, 0f64, 0usize);
        for (x, y, label) in labels.enumerate_pixels() {
            if label[0] == target {
                sx += x as f64;
                sy += y as f64;
                n += 1;
            }
        }
        if n == 0 {
            return None;
        }
        Some(Point2::new_with_conf(
            (sx / n as f64) as f32,
            (sy / n as f64) as f32,
            peak as f32,
        ))
    }
}

impl Detector for BrightestPointDetector {
    type Output = BrightPointObservation;

    fn detect(&mut self, image: &DynamicImage) -> Result<Self::Output> {
        let gray = self.luminance(image);
        Ok(BrightPointObservation::new(
            self.locate(&gray),
            ImageSize::of(image),
        ))
    }

    fn schema(&self) -> &TrackedPointSchema {
        &BRIGHTEST_POINT_SCHEMA
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Observation;
    use image::RgbImage;
    use imageproc::drawing::draw_filled_circle_mut;

    fn bright_disk(cx: i32, cy: i32) -> DynamicImage {
        let mut img = RgbImage::from_pixel(200, 100, image::Rgb([20, 20, 20]));
        draw_filled_circle_mut(&mut img, (cx, cy), 4, image::Rgb([255, 255, 255]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn test_centroid_near_bright_disk() {
        let mut detector = BrightestPointDetector::new(BrightestPointConfig::default()).unwrap();
        let obs = detector.detect(&bright_disk(100, 50)).unwrap();
        let traj = obs.trajectories();
        assert_eq!(traj.dim(), (1, 3));
        assert!((traj[[0, 0]] - 100.0).abs() <= 2.0);
        assert!((traj[[0, 1]] - 50.0).abs() <= 2.0);
        assert_eq!(traj[[0, 2]], 0.0);
    }

    #[test]
    fn test_blurred_centroid_near_bright_disk() {
        let config = BrightestPointConfig {
            blur_sigma: 1.5,
            luminance_threshold: 100,
            ..Default::default()
        };
        let mut detector = BrightestPointDetector::new(config).unwrap();
        let traj = detector.detect(&bright_disk(100, 50)).unwrap().trajectories();
        assert!((traj[[0, 0]] - 100.0).abs() <= 2.0);
        assert!((traj[[0, 1]] - 50.0).abs() <= 2.0);
    }

    #[test]
    fn test_dark_image_is_nan() {
        let mut detector = BrightestPointDetector::new(BrightestPointConfig::default()).unwrap();
        let dark = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, image::Rgb([10, 10, 10])));
        let traj = detector.detect(&dark).unwrap().trajectories();
        assert_eq!(traj.nrows(), 1);
        assert!(traj.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_negative_sigma_rejected() {
        let config = BrightestPointConfig {
            blur_sigma: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            BrightestPointDetector::new(config),
            Err(TrackerError::Configuration(_))
        ));
    }
}
