// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use ndarray::Array2;
use serde_json::{Map, Value};

use super::{ImageSize, Observation};
use crate::error::Result;
use crate::geometry::Bbox;
use crate::schema::TrackedPointSchema;

/// 两阶段检测结果: 内层观测在裁剪图上计算, 对外坐标平移回整帧
#[derive(Debug, Clone)]
pub struct CropObservation<O> {
    inner: O,
    crop: Option<Bbox>,
    image_size: ImageSize,
}

impl<O: Observation> CropObservation<O> {
    /// `crop` 为 None 表示第二阶段在整帧上运行
    pub fn new(inner: O, crop: Option<Bbox>, image_size: ImageSize) -> Self {
        Self {
            inner,
            crop,
            image_size,
        }
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }

    pub fn crop(&self) -> Option<Bbox> {
        self.crop
    }

    fn shift(&self, mut traj: Array2<f64>) -> Array2<f64> {
        if let Some(crop) = self.crop {
            let (dx, dy) = (crop.xmin() as f64, crop.ymin() as f64);
            for mut row in traj.rows_mut() {
                row[0] += dx;
                row[1] += dy;
            }
        }
        traj
    }
}

impl<O: Observation> Observation for CropObservation<O> {
    fn schema(&self) -> &TrackedPointSchema {
        self.inner.schema()
    }

    fn image_size(&self) -> ImageSize {
        self.image_size
    }

    fn trajectories(&self) -> Array2<f64> {
        self.shift(self.inner.trajectories())
    }

    fn padded_trajectories(&self) -> Array2<f64> {
        self.shift(self.inner.padded_trajectories())
    }

    fn extra_fields(&self, dict: &mut Map<String, Value>) -> Result<()> {
        self.inner.extra_fields(dict)?;
        let crop = match self.crop {
            Some(b) => serde_json::json!([b.xmin(), b.ymin(), b.width(), b.height()]),
            None => Value::Null,
        };
        dict.insert("crop_box".to_string(), crop);
        Ok(())
    }
}
