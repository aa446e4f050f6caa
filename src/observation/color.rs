// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use ndarray::Array2;
use serde_json::{Map, Value};

use super::{nan_block, ImageSize, Observation};
use crate::error::Result;
use crate::geometry::Point2;
use crate::schema::{TrackedPointSchema, COLOR_SCHEMA};

/// 颜色区域的最小外接圆
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorBlob {
    pub center: Point2,
    pub radius: f32,
}

/// 最大颜色区域, 只报告一个点
#[derive(Debug, Clone)]
pub struct ColorObservation {
    blob: Option<ColorBlob>,
    blob_count: usize,
    image_size: ImageSize,
}

impl ColorObservation {
    /// `blob_count` 为通过半径过滤的区域总数
    pub fn new(blob: Option<ColorBlob>, blob_count: usize, image_size: ImageSize) -> Self {
        Self {
            blob,
            blob_count,
            image_size,
        }
    }

    pub fn blob(&self) -> Option<ColorBlob> {
        self.blob
    }

    pub fn blob_count(&self) -> usize {
        self.blob_count
    }
}

impl Observation for ColorObservation {
    fn schema(&self) -> &TrackedPointSchema {
        &COLOR_SCHEMA
    }

    fn image_size(&self) -> ImageSize {
        self.image_size
    }

    fn trajectories(&self) -> Array2<f64> {
        let mut out = nan_block(1);
        if let Some(blob) = self.blob {
            out[[0, 0]] = blob.center.x() as f64;
            out[[0, 1]] = blob.center.y() as f64;
            out[[0, 2]] = 0.0;
        }
        out
    }

    fn extra_fields(&self, dict: &mut Map<String, Value>) -> Result<()> {
        let radius = self
            .blob
            .map(|b| Value::from(b.radius as f64))
            .unwrap_or(Value::Null);
        dict.insert("radius".to_string(), radius);
        dict.insert("blob_count".to_string(), Value::from(self.blob_count));
        Ok(())
    }
}
