// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! holistic 关键点检测 (body + 双手 + 面部)
//!
//! 具体的关键点模型通过 [`HolisticModel`] 注入; `onnx` feature 提供基于 ONNX Runtime 的实现。

use std::path::PathBuf;

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use super::Detector;
use crate::error::{Result, TrackerError};
use crate::observation::{HolisticLandmarks, HolisticObservation, ImageSize};
use crate::schema::{TrackedPointSchema, HOLISTIC_SCHEMA};

/// 关键点模型: 输入整张图像, 输出各区域的归一化关键点 (区域可缺失)
///
/// 存在概率低于 `min_presence` 的区域应报告为缺失。
pub trait HolisticModel: Send {
    fn infer(&mut self, image: &DynamicImage, min_presence: f32) -> Result<HolisticLandmarks>;
}

impl<M: HolisticModel + ?Sized> HolisticModel for Box<M> {
    fn infer(&mut self, image: &DynamicImage, min_presence: f32) -> Result<HolisticLandmarks> {
        (**self).infer(image, min_presence)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HolisticConfig {
    /// ONNX 模型路径
    pub model_path: PathBuf,
    /// 输入分辨率 (正方形)
    pub input_size: u32,
    /// 首次检测 (或目标丢失后) 的区域存在概率阈值
    pub min_detection_confidence: f32,
    /// 上一帧检测到目标后使用的阈值, static_image_mode 下不使用
    pub min_tracking_confidence: f32,
    /// true: 每帧独立检测, 不使用跨帧状态
    pub static_image_mode: bool,
}

impl Default for HolisticConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/holistic.onnx"),
            input_size: 256,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            static_image_mode: false,
        }
    }
}

impl HolisticConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("min_detection_confidence", self.min_detection_confidence),
            ("min_tracking_confidence", self.min_tracking_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(TrackerError::configuration(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }
        if self.input_size == 0 {
            return Err(TrackerError::configuration("input_size must be > 0"));
        }
        Ok(())
    }
}

pub struct HolisticDetector<M> {
    model: M,
    config: HolisticConfig,
    /// 上一帧有检测结果
    tracking: bool,
}

impl<M: HolisticModel> HolisticDetector<M> {
    pub fn new(model: M, config: HolisticConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            model,
            config,
            tracking: false,
        })
    }

    pub fn config(&self) -> &HolisticConfig {
        &self.config
    }

    /// 当前帧使用的存在概率阈值
    pub fn presence_threshold(&self) -> f32 {
        if self.tracking && !self.config.static_image_mode {
            self.config.min_tracking_confidence
        } else {
            self.config.min_detection_confidence
        }
    }
}

impl<M: HolisticModel> Detector for HolisticDetector<M> {
    type Output = HolisticObservation;

    fn detect(&mut self, image: &DynamicImage) -> Result<Self::Output> {
        let landmarks = self.model.infer(image, self.presence_threshold())?;
        self.tracking = !landmarks.is_empty();
        HolisticObservation::new(landmarks, ImageSize::of(image))
    }

    fn schema(&self) -> &TrackedPointSchema {
        &HOLISTIC_SCHEMA
    }

    fn is_static(&self) -> bool {
        self.config.static_image_mode
    }
}
