#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod annotator; // 标注绘制
pub mod config; // 追踪器配置与命令行参数
pub mod detection; // 检测器
pub mod error;
pub mod geometry;
pub mod input; // 视频/图片输入
pub mod observation; // 单帧观测结果
pub mod pipeline; // 批处理
pub mod recorder; // 轨迹记录
pub mod schema; // 追踪点命名
pub mod tracker;

pub use crate::annotator::{Annotator, AnnotatorConfig, PointAnnotator};
pub use crate::config::{Args, Command, TrackerConfig, TrackerKind};
pub use crate::detection::Detector;
pub use crate::error::{Result, TrackerError};
pub use crate::geometry::{Bbox, Point2};
pub use crate::input::{FrameSource, SourceOpener, StillImageOpener};
pub use crate::observation::{ImageSize, Observation};
pub use crate::pipeline::{
    process_folder, process_openpose_folder, process_single_video, stack_camera_arrays,
    BatchOptions,
};
pub use crate::recorder::{OpenPoseRecorder, Recorder, TrajectoryRecorder};
pub use crate::schema::TrackedPointSchema;
pub use crate::tracker::{create_tracker, create_tracker_by_name, Tracker, VideoTracker};
