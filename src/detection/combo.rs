// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 两阶段检测: 先用区域提议器找到目标框, 再在裁剪图上运行第二个检测器

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use super::holistic::HolisticConfig;
use super::yolo_pose::YoloPoseConfig;
use super::Detector;
use crate::error::{Result, TrackerError};
use crate::geometry::Bbox;
use crate::observation::{CropObservation, ImageSize};
use crate::schema::TrackedPointSchema;

/// 第一阶段: 返回目标框 (整帧像素坐标)
pub trait RegionProposer: Send {
    fn propose(&mut self, image: &DynamicImage) -> Result<Option<Bbox>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct YoloHolisticComboConfig {
    pub yolo: YoloPoseConfig,
    /// 第二阶段必须是 static_image_mode
    pub holistic: HolisticConfig,
    /// 框四周扩展的比例
    pub crop_padding: f32,
}

impl Default for YoloHolisticComboConfig {
    fn default() -> Self {
        Self {
            yolo: YoloPoseConfig::default(),
            holistic: HolisticConfig {
                static_image_mode: true,
                ..Default::default()
            },
            crop_padding: 0.1,
        }
    }
}

impl YoloHolisticComboConfig {
    pub fn validate(&self) -> Result<()> {
        self.yolo.validate()?;
        self.holistic.validate()?;
        if !self.holistic.static_image_mode {
            return Err(TrackerError::configuration(
                "yolo_holistic_combo requires holistic.static_image_mode = true",
            ));
        }
        validate_padding(self.crop_padding)
    }
}

fn validate_padding(crop_padding: f32) -> Result<()> {
    if !crop_padding.is_finite() || crop_padding < 0.0 {
        return Err(TrackerError::configuration(format!(
            "crop_padding must be a finite value >= 0, got {}",
            crop_padding
        )));
    }
    Ok(())
}

pub struct CropDetector<P, D> {
    proposer: P,
    detector: D,
    crop_padding: f32,
}

impl<P: RegionProposer, D: Detector> CropDetector<P, D> {
    pub fn new(proposer: P, detector: D, crop_padding: f32) -> Result<Self> {
        if !detector.is_static() {
            return Err(TrackerError::configuration(
                "the second stage of a crop detector must be static",
            ));
        }
        validate_padding(crop_padding)?;
        Ok(Self {
            proposer,
            detector,
            crop_padding,
        })
    }
}

impl<P: RegionProposer, D: Detector> Detector for CropDetector<P, D> {
    type Output = CropObservation<D::Output>;

    fn detect(&mut self, image: &DynamicImage) -> Result<Self::Output> {
        let size = ImageSize::of(image);
        let crop = self
            .proposer
            .propose(image)?
            .and_then(|b| b.padded_within(self.crop_padding, size.width, size.height));

        match crop {
            Some(b) => {
                let cropped = image.crop_imm(
                    b.xmin() as u32,
                    b.ymin() as u32,
                    b.width() as u32,
                    b.height() as u32,
                );
                let inner = self.detector.detect(&cropped)?;
                Ok(CropObservation::new(inner, Some(b), size))
            }
            None => {
                let inner = self.detector.detect(image)?;
                Ok(CropObservation::new(inner, None, size))
            }
        }
    }

    fn schema(&self) -> &TrackedPointSchema {
        self.detector.schema()
    }
}
