// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use ndarray::{s, Array2};

use super::{landmarks_to_array, nan_block, ImageSize, Observation};
use crate::error::{Result, TrackerError};
use crate::schema::{TrackedPointSchema, HOLISTIC_SCHEMA};

/// 归一化关键点: x / y 相对图像宽高, z 与 x 同尺度
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct NormalizedLandmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl NormalizedLandmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// holistic 模型的原始输出, 每个区域独立可缺失
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HolisticLandmarks {
    pub pose: Option<Vec<NormalizedLandmark>>,
    pub right_hand: Option<Vec<NormalizedLandmark>>,
    pub left_hand: Option<Vec<NormalizedLandmark>>,
    pub face: Option<Vec<NormalizedLandmark>>,
}

impl HolisticLandmarks {
    /// 按模式顺序: body, right_hand, left_hand, face
    fn regions(&self) -> [(&'static str, Option<&Vec<NormalizedLandmark>>); 4] {
        [
            ("body", self.pose.as_ref()),
            ("right_hand", self.right_hand.as_ref()),
            ("left_hand", self.left_hand.as_ref()),
            ("face", self.face.as_ref()),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.regions().iter().all(|(_, r)| r.is_none())
    }
}

#[derive(Debug, Clone)]
pub struct HolisticObservation {
    landmarks: HolisticLandmarks,
    image_size: ImageSize,
}

impl HolisticObservation {
    /// 校验每个存在区域的关键点数量
    pub fn new(landmarks: HolisticLandmarks, image_size: ImageSize) -> Result<Self> {
        let schema = &*HOLISTIC_SCHEMA;
        for (name, region) in landmarks.regions() {
            let Some(points) = region else { continue };
            let expected = schema.region_range(name).map(|r| r.len()).unwrap_or(0);
            if points.len() != expected {
                return Err(TrackerError::model(format!(
                    "holistic region {} has {} landmarks, expected {}",
                    name,
                    points.len(),
                    expected
                )));
            }
        }
        Ok(Self {
            landmarks,
            image_size,
        })
    }

    pub fn empty(image_size: ImageSize) -> Self {
        Self {
            landmarks: HolisticLandmarks::default(),
            image_size,
        }
    }

    pub fn landmarks(&self) -> &HolisticLandmarks {
        &self.landmarks
    }
}

impl Observation for HolisticObservation {
    fn schema(&self) -> &TrackedPointSchema {
        &HOLISTIC_SCHEMA
    }

    fn image_size(&self) -> ImageSize {
        self.image_size
    }

    fn trajectories(&self) -> Array2<f64> {
        let schema = &*HOLISTIC_SCHEMA;
        let mut out = nan_block(schema.num_tracked_points());
        for (name, region) in self.landmarks.regions() {
            let (Some(points), Some(range)) = (region, schema.region_range(name)) else {
                continue;
            };
            out.slice_mut(s![range, ..])
                .assign(&landmarks_to_array(points, self.image_size));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::{image_size_from_dict, trajectories_close, trajectories_from_dict};

    fn landmarks(n: usize, offset: f32) -> Vec<NormalizedLandmark> {
        (0..n)
            .map(|i| NormalizedLandmark::new(0.01 * i as f32 + offset, 0.5, -0.1))
            .collect()
    }

    #[test]
    fn test_missing_region_is_nan_block() {
        let raw = HolisticLandmarks {
            pose: Some(landmarks(33, 0.1)),
            right_hand: None,
            left_hand: Some(landmarks(21, 0.2)),
            face: None,
        };
        let obs = HolisticObservation::new(raw, ImageSize::new(640, 480)).unwrap();
        let traj = obs.trajectories();
        assert_eq!(traj.dim(), (553, 3));

        // body 已检测: 像素坐标, 深度按宽度缩放
        assert!((traj[[0, 0]] - 0.1 * 640.0).abs() < 1e-3);
        assert!((traj[[0, 1]] - 240.0).abs() < 1e-3);
        assert!((traj[[0, 2]] + 64.0).abs() < 1e-3);

        assert!(traj.slice(s![33..54, ..]).iter().all(|v| v.is_nan()));
        assert!(traj.slice(s![54..75, ..]).iter().all(|v| v.is_finite()));
        assert!(traj.slice(s![75.., ..]).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_empty_detection_keeps_shape() {
        let obs = HolisticObservation::empty(ImageSize::new(10, 10));
        let traj = obs.trajectories();
        assert_eq!(traj.nrows(), obs.schema().num_tracked_points());
        assert!(traj.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_wrong_landmark_count_is_model_error() {
        let raw = HolisticLandmarks {
            face: Some(landmarks(468, 0.0)),
            ..Default::default()
        };
        assert!(matches!(
            HolisticObservation::new(raw, ImageSize::new(10, 10)),
            Err(TrackerError::Model(_))
        ));
    }

    #[test]
    fn test_json_round_trip() {
        let raw = HolisticLandmarks {
            pose: Some(landmarks(33, 0.3)),
            right_hand: Some(landmarks(21, 0.1)),
            left_hand: None,
            face: Some(landmarks(478, 0.0)),
        };
        let obs = HolisticObservation::new(raw, ImageSize::new(1920, 1080)).unwrap();

        let bytes = obs.to_json_bytes().unwrap();
        let decoded: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let dict = decoded.as_object().unwrap();
        assert!(dict["left_hand"].is_null());

        let restored = trajectories_from_dict(dict, obs.schema()).unwrap();
        assert!(trajectories_close(
            &obs.trajectories().into_dyn().view(),
            &restored.into_dyn().view(),
            1e-6
        ));
        assert_eq!(image_size_from_dict(dict).unwrap(), ImageSize::new(1920, 1080));
    }
}
