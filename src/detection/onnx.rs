// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ONNX Runtime 后端: 会话加载与 holistic 关键点模型

use std::path::Path;

use image::DynamicImage;
use ndarray::Array;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionOutputs};
use ort::value::{Tensor, Value};
use tracing::{debug, info};

use super::holistic::{HolisticConfig, HolisticModel};
use crate::error::{Result, TrackerError};
use crate::observation::{HolisticLandmarks, NormalizedLandmark};

/// 从文件加载 ONNX 模型 (Level3 图优化)
pub fn load_session(model_path: &Path) -> Result<Session> {
    if !model_path.exists() {
        return Err(TrackerError::configuration(format!(
            "model not found at {}",
            model_path.display()
        )));
    }
    let model_bytes = std::fs::read(model_path)?;
    let session = Session::builder()
        .map_err(|e| TrackerError::model(format!("ORT session builder: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| TrackerError::model(format!("ORT opt level: {e}")))?
        .commit_from_memory(model_bytes.as_slice())
        .map_err(|e| TrackerError::model(format!("ORT load model: {e}")))?;
    Ok(session)
}

/// 单图 holistic 模型
///
/// 输出 `pose_landmarks` / `right_hand_landmarks` / `left_hand_landmarks` / `face_landmarks`,
/// 形状 `[1, N, >=3]`, 坐标相对输入归一化; 可选的 `<region>_presence` 低于
/// 检测器给出的阈值时该区域视为未检测到。
pub struct OnnxHolisticModel {
    session: Session,
    input_size: u32,
}

const REGIONS: [&str; 4] = ["pose", "right_hand", "left_hand", "face"];

impl OnnxHolisticModel {
    pub fn new(config: &HolisticConfig) -> Result<Self> {
        config.validate()?;
        let session = load_session(&config.model_path)?;
        info!("✅ holistic 模型已加载: {}", config.model_path.display());
        Ok(Self {
            session,
            input_size: config.input_size,
        })
    }

    fn preprocess(&self, image: &DynamicImage) -> Result<Value> {
        let size = self.input_size as usize;
        let resized = image.resize_exact(
            self.input_size,
            self.input_size,
            image::imageops::FilterType::Triangle,
        );
        let mut ys = Array::zeros((1, 3, size, size));
        for (x, y, rgb) in resized.to_rgb8().enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b] = rgb.0;
            ys[[0, 0, y, x]] = (r as f32) / 255.0;
            ys[[0, 1, y, x]] = (g as f32) / 255.0;
            ys[[0, 2, y, x]] = (b as f32) / 255.0;
        }
        let shape = ys.shape().to_vec();
        let (data, _) = ys.into_raw_vec_and_offset();
        Tensor::from_array((shape, data.into_boxed_slice()))
            .map(Value::from)
            .map_err(|e| TrackerError::model(format!("ORT tensor: {e}")))
    }
}

fn extract_region(
    outputs: &SessionOutputs,
    region: &str,
    min_presence: f32,
) -> Result<Option<Vec<NormalizedLandmark>>> {
    if let Some(presence) = outputs.get(format!("{region}_presence").as_str()) {
        let (_, data) = presence
            .try_extract_tensor::<f32>()
            .map_err(|e| TrackerError::model(format!("ORT extract: {e}")))?;
        if data.first().copied().unwrap_or(0.0) < min_presence {
            return Ok(None);
        }
    }

    let Some(output) = outputs.get(format!("{region}_landmarks").as_str()) else {
        return Ok(None);
    };
    let (shape, data) = output
        .try_extract_tensor::<f32>()
        .map_err(|e| TrackerError::model(format!("ORT extract: {e}")))?;
    let (points, dim) = match shape.len() {
        3 if shape[0] == 1 => (shape[1] as usize, shape[2] as usize),
        2 => (shape[0] as usize, shape[1] as usize),
        _ => {
            return Err(TrackerError::model(format!(
                "unexpected {region} output shape: {:?}",
                shape
            )))
        }
    };
    if points == 0 {
        return Ok(None);
    }
    if dim < 3 || data.len() < points * dim {
        return Err(TrackerError::model(format!(
            "{region} output is missing the depth channel"
        )));
    }
    Ok(Some(
        (0..points)
            .map(|i| NormalizedLandmark::new(data[i * dim], data[i * dim + 1], data[i * dim + 2]))
            .collect(),
    ))
}

impl HolisticModel for OnnxHolisticModel {
    fn infer(&mut self, image: &DynamicImage, min_presence: f32) -> Result<HolisticLandmarks> {
        let tensor = self.preprocess(image)?;
        let outputs = self
            .session
            .run(ort::inputs![tensor])
            .map_err(|e| TrackerError::model(format!("ORT run failed: {e}")))?;

        let [pose, right_hand, left_hand, face] = [0, 1, 2, 3]
            .map(|i| extract_region(&outputs, REGIONS[i], min_presence));
        let landmarks = HolisticLandmarks {
            pose: pose?,
            right_hand: right_hand?,
            left_hand: left_hand?,
            face: face?,
        };
        debug!("holistic 推理完成, 空结果: {}", landmarks.is_empty());
        Ok(landmarks)
    }
}
