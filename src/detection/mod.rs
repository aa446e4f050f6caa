// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 检测器 (Detector)
//!
//! 每个检测器消费一张图像, 产出一个观测结果。单帧检测失败不是错误,
//! 而是返回全 NaN 的观测。

pub mod bright_point;
pub mod charuco;
pub mod color;
pub mod combo;
pub mod holistic;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod yolo_pose;

pub use bright_point::{BrightestPointConfig, BrightestPointDetector};
pub use charuco::{
    ArucoDictionary, BoardCornerFinder, CharucoBoard, CharucoConfig, CharucoDetector,
    ChessCornerFinder,
};
pub use color::{ColorConfig, ColorDetector};
pub use combo::{CropDetector, RegionProposer, YoloHolisticComboConfig};
pub use holistic::{HolisticConfig, HolisticDetector, HolisticModel};
pub use yolo_pose::{decode_pose_predictions, letterbox, YoloPoseConfig};
#[cfg(feature = "onnx")]
pub use onnx::OnnxHolisticModel;
#[cfg(feature = "onnx")]
pub use yolo_pose::YoloPoseDetector;

use image::DynamicImage;

use crate::error::Result;
use crate::observation::Observation;
use crate::schema::TrackedPointSchema;

/// 检测器统一接口
pub trait Detector: Send {
    type Output: Observation;

    /// 对同样的输入与模型状态结果确定
    fn detect(&mut self, image: &DynamicImage) -> Result<Self::Output>;

    fn schema(&self) -> &TrackedPointSchema;

    /// 无跨帧状态 (不做追踪); 两阶段检测的第二阶段必须为 true
    fn is_static(&self) -> bool {
        true
    }
}
