// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use ndarray::Array2;
use serde_json::{Map, Value};

use super::{nan_block, ImageSize, Observation};
use crate::error::Result;
use crate::geometry::Point2;
use crate::schema::{TrackedPointSchema, BRIGHTEST_POINT_SCHEMA};

/// 最亮区域质心, `confidence` 存放峰值亮度 (0-255)
#[derive(Debug, Clone)]
pub struct BrightPointObservation {
    point: Option<Point2>,
    image_size: ImageSize,
}

impl BrightPointObservation {
    pub fn new(point: Option<Point2>, image_size: ImageSize) -> Self {
        Self { point, image_size }
    }

    pub fn point(&self) -> Option<Point2> {
        self.point
    }
}

impl Observation for BrightPointObservation {
    fn schema(&self) -> &TrackedPointSchema {
        &BRIGHTEST_POINT_SCHEMA
    }

    fn image_size(&self) -> ImageSize {
        self.image_size
    }

    fn trajectories(&self) -> Array2<f64> {
        let mut out = nan_block(1);
        if let Some(p) = self.point {
            out[[0, 0]] = p.x() as f64;
            out[[0, 1]] = p.y() as f64;
            out[[0, 2]] = 0.0;
        }
        out
    }

    fn extra_fields(&self, dict: &mut Map<String, Value>) -> Result<()> {
        let luminance = self
            .point
            .map(|p| Value::from(p.confidence() as f64))
            .unwrap_or(Value::Null);
        dict.insert("peak_luminance".to_string(), luminance);
        Ok(())
    }
}
