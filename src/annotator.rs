// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 标注 (Annotator): 在图像副本上绘制追踪点, 不影响轨迹与记录器状态

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_line_segment_mut};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::observation::Observation;

pub trait Annotator<O>: Send {
    fn annotate(&self, image: &DynamicImage, observation: &O) -> DynamicImage;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotatorConfig {
    pub point_radius: i32,
    pub point_color: [u8; 3],
    pub line_color: [u8; 3],
}

impl Default for AnnotatorConfig {
    fn default() -> Self {
        Self {
            point_radius: 3,
            point_color: [0, 255, 0],
            line_color: [255, 64, 0],
        }
    }
}

impl AnnotatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.point_radius < 1 {
            return Err(TrackerError::configuration(format!(
                "point_radius must be >= 1, got {}",
                self.point_radius
            )));
        }
        Ok(())
    }
}

/// 画点 + 可选骨架连线
#[derive(Debug, Clone)]
pub struct PointAnnotator {
    config: AnnotatorConfig,
    skeleton: Vec<(usize, usize)>,
}

impl PointAnnotator {
    pub fn new(config: AnnotatorConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            skeleton: Vec::new(),
        })
    }

    pub fn with_skeleton(mut self, skeleton: &[(usize, usize)]) -> Self {
        self.skeleton = skeleton.to_vec();
        self
    }

    fn draw(&self, canvas: &mut RgbImage, points: &[Option<(f32, f32)>]) {
        let line = Rgb(self.config.line_color);
        for &(a, b) in &self.skeleton {
            if let (Some(Some(p)), Some(Some(q))) = (points.get(a), points.get(b)) {
                draw_line_segment_mut(canvas, *p, *q, line);
            }
        }
        let color = Rgb(self.config.point_color);
        for (x, y) in points.iter().flatten() {
            draw_filled_circle_mut(
                canvas,
                (x.round() as i32, y.round() as i32),
                self.config.point_radius,
                color,
            );
        }
    }
}

impl<O: Observation> Annotator<O> for PointAnnotator {
    fn annotate(&self, image: &DynamicImage, observation: &O) -> DynamicImage {
        let traj = observation.trajectories();
        let points: Vec<Option<(f32, f32)>> = traj
            .rows()
            .into_iter()
            .map(|row| {
                (row[0].is_finite() && row[1].is_finite()).then(|| (row[0] as f32, row[1] as f32))
            })
            .collect();
        let mut canvas = image.to_rgb8();
        self.draw(&mut canvas, &points);
        DynamicImage::ImageRgb8(canvas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point2;
    use crate::observation::{BrightPointObservation, ImageSize};

    #[test]
    fn test_annotation_draws_on_copy() {
        let image = DynamicImage::new_rgb8(20, 20);
        let obs = BrightPointObservation::new(Some(Point2::new(10., 10.)), ImageSize::new(20, 20));
        let annotator = PointAnnotator::new(AnnotatorConfig::default()).unwrap();
        let annotated = annotator.annotate(&image, &obs);

        assert_eq!(annotated.to_rgb8().get_pixel(10, 10), &Rgb([0, 255, 0]));
        assert_eq!(image.to_rgb8().get_pixel(10, 10), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_missing_points_are_skipped() {
        let image = DynamicImage::new_rgb8(8, 8);
        let obs = BrightPointObservation::new(None, ImageSize::new(8, 8));
        let annotator = PointAnnotator::new(AnnotatorConfig::default()).unwrap();
        let annotated = annotator.annotate(&image, &obs).to_rgb8();
        assert!(annotated.pixels().all(|p| p == &Rgb([0, 0, 0])));
    }
}
