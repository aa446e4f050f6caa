// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::sync::Arc;

use ndarray::Array2;
use serde_json::{Map, Value};

use super::{nan_block, points_to_json, ImageSize, Observation};
use crate::error::{Result, TrackerError};
use crate::geometry::Point2;
use crate::schema::TrackedPointSchema;

/// 标定板内角点检测结果
///
/// `trajectories` 只包含检测到的角点 (按 id 升序), 因此长度随帧变化;
/// `padded_trajectories` 按 id 散布到固定长度的 NaN 块中。
#[derive(Debug, Clone)]
pub struct CharucoObservation {
    corners: Vec<(usize, Point2)>,
    schema: Arc<TrackedPointSchema>,
    image_size: ImageSize,
}

impl CharucoObservation {
    pub fn new(
        mut corners: Vec<(usize, Point2)>,
        schema: Arc<TrackedPointSchema>,
        image_size: ImageSize,
    ) -> Result<Self> {
        let capacity = schema.num_tracked_points();
        if let Some((id, _)) = corners.iter().find(|(id, _)| *id >= capacity) {
            return Err(TrackerError::model(format!(
                "charuco corner id {} out of range for a board with {} corners",
                id, capacity
            )));
        }
        corners.sort_by_key(|(id, _)| *id);
        Ok(Self {
            corners,
            schema,
            image_size,
        })
    }

    pub fn corners(&self) -> &[(usize, Point2)] {
        &self.corners
    }

    pub fn corner_ids(&self) -> Vec<usize> {
        self.corners.iter().map(|(id, _)| *id).collect()
    }
}

impl Observation for CharucoObservation {
    fn schema(&self) -> &TrackedPointSchema {
        &self.schema
    }

    fn image_size(&self) -> ImageSize {
        self.image_size
    }

    fn trajectories(&self) -> Array2<f64> {
        let mut out = Array2::zeros((self.corners.len(), 3));
        for (mut row, (_, p)) in out.rows_mut().into_iter().zip(&self.corners) {
            row[0] = p.x() as f64;
            row[1] = p.y() as f64;
        }
        out
    }

    fn padded_trajectories(&self) -> Array2<f64> {
        let mut out = nan_block(self.schema.num_tracked_points());
        for (id, p) in &self.corners {
            out[[*id, 0]] = p.x() as f64;
            out[[*id, 1]] = p.y() as f64;
            out[[*id, 2]] = 0.0;
        }
        out
    }

    fn to_serializable_dict(&self) -> Result<Map<String, Value>> {
        let mut dict = Map::new();
        let region = self
            .schema
            .regions()
            .first()
            .map(|r| r.name.clone())
            .unwrap_or_else(|| "charuco_corners".to_string());
        let traj = self.trajectories();
        let points = if self.corners.is_empty() {
            Value::Array(Vec::new())
        } else {
            points_to_json(&region, traj.view())?
        };
        dict.insert(region, points);
        dict.insert("charuco_ids".to_string(), Value::from(self.corner_ids()));
        dict.insert(
            "image_size".to_string(),
            Value::from(vec![self.image_size.width, self.image_size.height]),
        );
        Ok(dict)
    }
}
