// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 错误类型 (Error types)
//!
//! 除单帧检测失败外 (以 NaN 轨迹表示, 不是错误), 所有错误都向批处理调用方传播。

use std::path::PathBuf;

use thiserror::Error;

/// 轨迹流水线的 Result 类型
pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Error)]
pub enum TrackerError {
    /// 未知追踪器 / 非法构造参数, 在处理任何帧之前报出
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 视频源不可读或提前结束
    #[error("Failed to read frame from {path}: {message}")]
    FrameRead { path: PathBuf, message: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 多相机数组在堆叠时帧数或点数不一致
    #[error("Shape mismatch for camera {camera}: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        camera: usize,
        expected: Vec<usize>,
        found: Vec<usize>,
    },

    /// 外部逐帧结果文件解析失败
    #[error("Failed to parse external result {path}: {message}")]
    ExternalResult { path: PathBuf, message: String },

    #[error("Model error: {0}")]
    Model(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Failed to write .npy: {0}")]
    Npy(#[from] ndarray_npy::WriteNpyError),
}

impl TrackerError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    pub fn model(message: impl Into<String>) -> Self {
        Self::Model(message.into())
    }

    pub fn frame_read(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::FrameRead {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn external_result(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ExternalResult {
            path: path.into(),
            message: message.into(),
        }
    }
}
