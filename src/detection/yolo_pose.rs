// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! YOLOv8 姿态检测 (COCO 17 关键点)
//!
//! 预处理与后处理是纯函数, 不依赖推理后端; 推理部分需要 `onnx` feature。

use std::path::PathBuf;

use image::{DynamicImage, GenericImageView};
use ndarray::{s, Array, Array4, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::geometry::{non_max_suppression, Bbox, Point2};
use crate::observation::PersonPose;
use crate::schema::COCO_KEYPOINT_NAMES;

const CXYWH_OFFSET: usize = 4;
const KPT_STEP: usize = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YoloPoseConfig {
    /// n / s / m / l / x
    pub model_size: String,
    /// 显式模型路径, 默认 `models/yolov8{size}-pose.onnx`
    pub model_path: Option<PathBuf>,
    pub conf: f32,
    pub iou: f32,
    pub kconf: f32,
    pub input_size: u32,
}

impl Default for YoloPoseConfig {
    fn default() -> Self {
        Self {
            model_size: "n".to_string(),
            model_path: None,
            conf: 0.25,
            iou: 0.45,
            kconf: 0.55,
            input_size: 640,
        }
    }
}

impl YoloPoseConfig {
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.model_size.as_str(), "n" | "s" | "m" | "l" | "x") {
            return Err(TrackerError::configuration(format!(
                "model_size must be one of n/s/m/l/x, got {:?}",
                self.model_size
            )));
        }
        for (name, value) in [("conf", self.conf), ("iou", self.iou), ("kconf", self.kconf)] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TrackerError::configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return Err(TrackerError::configuration(format!(
                "input_size must be a positive multiple of 32, got {}",
                self.input_size
            )));
        }
        Ok(())
    }

    pub fn model_path(&self) -> PathBuf {
        self.model_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(format!("models/yolov8{}-pose.onnx", self.model_size)))
    }
}

fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// 等比缩放到 `size × size`, 左上对齐, 其余填充 144/255
///
/// 返回 NCHW 张量与缩放比例。
pub fn letterbox(image: &DynamicImage, size: u32) -> (Array4<f32>, f32) {
    let mut ys = Array::ones((1, 3, size as usize, size as usize));
    ys.fill(144.0 / 255.0);

    let (w0, h0) = image.dimensions();
    let (ratio, w_new, h_new) = scale_wh(w0 as f32, h0 as f32, size as f32, size as f32);
    let resized = image.resize_exact(
        (w_new as u32).max(1),
        (h_new as u32).max(1),
        image::imageops::FilterType::Triangle,
    );
    for (x, y, rgb) in resized.pixels() {
        let (x, y) = (x as usize, y as usize);
        if x >= size as usize || y >= size as usize {
            continue;
        }
        let [r, g, b, _] = rgb.0;
        ys[[0, 0, y, x]] = (r as f32) / 255.0;
        ys[[0, 1, y, x]] = (g as f32) / 255.0;
        ys[[0, 2, y, x]] = (b as f32) / 255.0;
    }
    (ys, ratio)
}

/// 解码单张图的 `[5 + 3·17, anchors]` 输出, 返回经 NMS 后按置信度降序的人体
pub fn decode_pose_predictions(
    preds: ArrayView2<f32>,
    ratio: f32,
    width_original: f32,
    height_original: f32,
    config: &YoloPoseConfig,
) -> Result<Vec<PersonPose>> {
    let nk = COCO_KEYPOINT_NAMES.len();
    let expected = CXYWH_OFFSET + 1 + KPT_STEP * nk;
    if preds.nrows() != expected {
        return Err(TrackerError::model(format!(
            "pose output has {} channels, expected {}",
            preds.nrows(),
            expected
        )));
    }

    let mut data: Vec<(Bbox, Vec<Option<Point2>>)> = Vec::new();
    for pred in preds.columns() {
        let confidence = pred[CXYWH_OFFSET];
        if confidence < config.conf {
            continue;
        }

        let cx = pred[0] / ratio;
        let cy = pred[1] / ratio;
        let w = pred[2] / ratio;
        let h = pred[3] / ratio;
        let x = cx - w / 2.;
        let y = cy - h / 2.;
        let bbox = Bbox::new(
            x.max(0.0f32).min(width_original),
            y.max(0.0f32).min(height_original),
            w,
            h,
            confidence,
        );

        let kpts = pred.slice(s![CXYWH_OFFSET + 1..]);
        let keypoints = (0..nk)
            .map(|i| {
                let kconf = kpts[KPT_STEP * i + 2];
                if kconf < config.kconf {
                    return None;
                }
                let kx = kpts[KPT_STEP * i] / ratio;
                let ky = kpts[KPT_STEP * i + 1] / ratio;
                Some(Point2::new_with_conf(
                    kx.max(0.0f32).min(width_original),
                    ky.max(0.0f32).min(height_original),
                    kconf,
                ))
            })
            .collect();
        data.push((bbox, keypoints));
    }

    non_max_suppression(&mut data, config.iou);
    Ok(data
        .into_iter()
        .map(|(bbox, keypoints)| PersonPose { bbox, keypoints })
        .collect())
}

#[cfg(feature = "onnx")]
pub use backend::YoloPoseDetector;

#[cfg(feature = "onnx")]
mod backend {
    use image::DynamicImage;
    use ndarray::ArrayView2;
    use ort::session::Session;
    use ort::value::{Tensor, Value};
    use tracing::info;

    use super::{decode_pose_predictions, letterbox, YoloPoseConfig};
    use crate::detection::combo::RegionProposer;
    use crate::detection::onnx::load_session;
    use crate::detection::Detector;
    use crate::error::{Result, TrackerError};
    use crate::geometry::Bbox;
    use crate::observation::{ImageSize, PersonPose, PoseObservation};
    use crate::schema::{TrackedPointSchema, COCO_POSE_SCHEMA};

    pub struct YoloPoseDetector {
        session: Session,
        output_name: String,
        config: YoloPoseConfig,
    }

    impl YoloPoseDetector {
        pub fn new(config: YoloPoseConfig) -> Result<Self> {
            config.validate()?;
            let path = config.model_path();
            let session = load_session(&path)?;
            let output_name = session
                .outputs
                .first()
                .map(|o| o.name.clone())
                .ok_or_else(|| TrackerError::model("pose model has no outputs"))?;
            info!("✅ YOLO pose 模型已加载: {}", path.display());
            Ok(Self {
                session,
                output_name,
                config,
            })
        }

        /// 按置信度降序的全部人体
        pub fn detect_people(&mut self, image: &DynamicImage) -> Result<Vec<PersonPose>> {
            let (input, ratio) = letterbox(image, self.config.input_size);
            let shape = input.shape().to_vec();
            let (data, _) = input.into_raw_vec_and_offset();
            let tensor = Tensor::from_array((shape, data.into_boxed_slice()))
                .map(Value::from)
                .map_err(|e| TrackerError::model(format!("ORT tensor: {e}")))?;

            let outputs = self
                .session
                .run(ort::inputs![tensor])
                .map_err(|e| TrackerError::model(format!("ORT run failed: {e}")))?;
            let output = outputs
                .get(self.output_name.as_str())
                .ok_or_else(|| TrackerError::model("ORT returned no outputs"))?;
            let (shape, data) = output
                .try_extract_tensor::<f32>()
                .map_err(|e| TrackerError::model(format!("ORT extract: {e}")))?;

            // [1, C, anchors]
            if shape.len() != 3 || shape[0] != 1 {
                return Err(TrackerError::model(format!(
                    "unexpected pose output shape: {:?}",
                    shape
                )));
            }
            let preds = ArrayView2::from_shape((shape[1] as usize, shape[2] as usize), data)?;
            decode_pose_predictions(
                preds,
                ratio,
                image.width() as f32,
                image.height() as f32,
                &self.config,
            )
        }
    }

    impl Detector for YoloPoseDetector {
        type Output = PoseObservation;

        fn detect(&mut self, image: &DynamicImage) -> Result<Self::Output> {
            let person = self.detect_people(image)?.into_iter().next();
            Ok(PoseObservation::new(person, ImageSize::of(image)))
        }

        fn schema(&self) -> &TrackedPointSchema {
            &COCO_POSE_SCHEMA
        }
    }

    impl RegionProposer for YoloPoseDetector {
        fn propose(&mut self, image: &DynamicImage) -> Result<Option<Bbox>> {
            Ok(self.detect_people(image)?.first().map(|p| p.bbox))
        }
    }
}
