// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use ndarray::Array2;
use serde_json::{Map, Value};

use super::{nan_block, ImageSize, Observation};
use crate::error::Result;
use crate::geometry::{Bbox, Point2};
use crate::schema::{TrackedPointSchema, COCO_POSE_SCHEMA};

/// 单人姿态: 检测框 + 17 个 COCO 关键点 (低置信度为 None)
#[derive(Debug, Clone, PartialEq)]
pub struct PersonPose {
    pub bbox: Bbox,
    pub keypoints: Vec<Option<Point2>>,
}

/// YOLO pose 的单帧结果, 只保留置信度最高的人
#[derive(Debug, Clone)]
pub struct PoseObservation {
    person: Option<PersonPose>,
    image_size: ImageSize,
}

impl PoseObservation {
    pub fn new(person: Option<PersonPose>, image_size: ImageSize) -> Self {
        Self { person, image_size }
    }

    pub fn person(&self) -> Option<&PersonPose> {
        self.person.as_ref()
    }
}

impl Observation for PoseObservation {
    fn schema(&self) -> &TrackedPointSchema {
        &COCO_POSE_SCHEMA
    }

    fn image_size(&self) -> ImageSize {
        self.image_size
    }

    fn trajectories(&self) -> Array2<f64> {
        let mut out = nan_block(COCO_POSE_SCHEMA.num_tracked_points());
        let Some(person) = &self.person else {
            return out;
        };
        for (mut row, kpt) in out.rows_mut().into_iter().zip(&person.keypoints) {
            if let Some(p) = kpt {
                row[0] = p.x() as f64;
                row[1] = p.y() as f64;
                row[2] = 0.0;
            }
        }
        out
    }

    fn extra_fields(&self, dict: &mut Map<String, Value>) -> Result<()> {
        let bbox = match &self.person {
            Some(p) => serde_json::json!([
                p.bbox.xmin(),
                p.bbox.ymin(),
                p.bbox.width(),
                p.bbox.height(),
                p.bbox.confidence()
            ]),
            None => Value::Null,
        };
        dict.insert("bbox".to_string(), bbox);
        Ok(())
    }
}
