// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 追踪器 (Tracker): 一个检测器 + 可选记录器 + 可选标注器
//!
//! 批处理按名称通过 [`create_tracker`] 构造, 每个视频一个新实例。

use image::DynamicImage;
use ndarray::Array3;
use tracing::debug;

use crate::annotator::{Annotator, AnnotatorConfig, PointAnnotator};
use crate::config::{TrackerConfig, TrackerKind};
use crate::detection::{BrightestPointDetector, CharucoDetector, ColorDetector, Detector};
use crate::error::{Result, TrackerError};
use crate::observation::Observation;
use crate::recorder::{Recorder, TrajectoryRecorder};
use crate::schema::COCO_SKELETON;

pub struct Tracker<D: Detector> {
    kind: TrackerKind,
    detector: D,
    recorder: Option<Recorder<D::Output>>,
    annotator: Option<Box<dyn Annotator<D::Output>>>,
    latest: Option<D::Output>,
}

impl<D: Detector> Tracker<D> {
    /// 默认开启记录
    pub fn new(kind: TrackerKind, detector: D) -> Self {
        let recorder = Recorder::new(detector.schema().num_tracked_points());
        Self {
            kind,
            detector,
            recorder: Some(recorder),
            annotator: None,
            latest: None,
        }
    }

    pub fn without_recorder(mut self) -> Self {
        self.recorder = None;
        self
    }

    pub fn with_annotator(mut self, annotator: Box<dyn Annotator<D::Output>>) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn recorder(&self) -> Option<&Recorder<D::Output>> {
        self.recorder.as_ref()
    }

    pub fn latest_observation(&self) -> Option<&D::Output> {
        self.latest.as_ref()
    }

    /// 检测一帧; 记录开启时转交记录器, 标注画在副本上
    pub fn process_image(
        &mut self,
        image: &DynamicImage,
        annotate: bool,
    ) -> Result<(D::Output, Option<DynamicImage>)> {
        let observation = self.detector.detect(image)?;
        let annotated = match (&self.annotator, annotate) {
            (Some(annotator), true) => Some(annotator.annotate(image, &observation)),
            _ => None,
        };
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.record(observation.clone());
        }
        self.latest = Some(observation.clone());
        Ok((observation, annotated))
    }
}

/// 批处理使用的类型擦除接口
pub trait VideoTracker: Send {
    fn kind(&self) -> TrackerKind;

    fn point_names(&self) -> Vec<String>;

    fn num_tracked_points(&self) -> usize;

    fn process_frame(&mut self, image: &DynamicImage, annotate: bool)
        -> Result<Option<DynamicImage>>;

    /// `(num_frames, num_tracked_points, 3)`
    fn compact(&mut self) -> Result<Array3<f64>>;

    /// 清空记录器与最新观测
    fn reset(&mut self);

    fn latest_observation_json(&self) -> Result<Option<String>>;
}

impl<D> VideoTracker for Tracker<D>
where
    D: Detector,
    D::Output: 'static,
{
    fn kind(&self) -> TrackerKind {
        self.kind
    }

    fn point_names(&self) -> Vec<String> {
        self.detector.schema().point_names()
    }

    fn num_tracked_points(&self) -> usize {
        self.detector.schema().num_tracked_points()
    }

    fn process_frame(
        &mut self,
        image: &DynamicImage,
        annotate: bool,
    ) -> Result<Option<DynamicImage>> {
        Ok(self.process_image(image, annotate)?.1)
    }

    fn compact(&mut self) -> Result<Array3<f64>> {
        match self.recorder.as_mut() {
            Some(recorder) => Ok(recorder.process_tracked_objects()?.clone()),
            None => Err(TrackerError::configuration(format!(
                "tracker {} is not recording",
                self.kind
            ))),
        }
    }

    fn reset(&mut self) {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.clear();
        }
        self.latest = None;
        debug!("tracker {} reset", self.kind);
    }

    fn latest_observation_json(&self) -> Result<Option<String>> {
        self.latest.as_ref().map(|o| o.to_json_string()).transpose()
    }
}

fn boxed<D>(
    kind: TrackerKind,
    detector: D,
    annotator: Option<&AnnotatorConfig>,
) -> Result<Box<dyn VideoTracker>>
where
    D: Detector + 'static,
    D::Output: 'static,
{
    let mut tracker = Tracker::new(kind, detector);
    if let Some(config) = annotator {
        let mut point_annotator = PointAnnotator::new(config.clone())?;
        if kind == TrackerKind::YoloPose {
            point_annotator = point_annotator.with_skeleton(&COCO_SKELETON);
        }
        tracker = tracker.with_annotator(Box::new(point_annotator));
    }
    Ok(Box::new(tracker))
}

#[cfg(not(feature = "onnx"))]
fn onnx_unavailable(kind: TrackerKind) -> TrackerError {
    TrackerError::configuration(format!(
        "tracker {} needs the `onnx` feature, rebuild with --features onnx",
        kind
    ))
}

/// 按名称构造追踪器; 配置必须属于同一变体
pub fn create_tracker(
    kind: TrackerKind,
    config: &TrackerConfig,
    annotator: Option<&AnnotatorConfig>,
) -> Result<Box<dyn VideoTracker>> {
    config.ensure_kind(kind)?;
    config.validate()?;
    match config {
        TrackerConfig::BrightestPoint(c) => {
            boxed(kind, BrightestPointDetector::new(c.clone())?, annotator)
        }
        TrackerConfig::Charuco(c) => boxed(kind, CharucoDetector::new(c)?, annotator),
        TrackerConfig::Color(c) => boxed(kind, ColorDetector::new(c.clone())?, annotator),
        #[cfg(feature = "onnx")]
        TrackerConfig::Holistic(c) => {
            use crate::detection::{HolisticDetector, OnnxHolisticModel};
            let model = OnnxHolisticModel::new(c)?;
            boxed(kind, HolisticDetector::new(model, c.clone())?, annotator)
        }
        #[cfg(feature = "onnx")]
        TrackerConfig::YoloPose(c) => {
            use crate::detection::YoloPoseDetector;
            boxed(kind, YoloPoseDetector::new(c.clone())?, annotator)
        }
        #[cfg(feature = "onnx")]
        TrackerConfig::YoloHolisticCombo(c) => {
            use crate::detection::{
                CropDetector, HolisticDetector, OnnxHolisticModel, YoloPoseDetector,
            };
            let proposer = YoloPoseDetector::new(c.yolo.clone())?;
            let model = OnnxHolisticModel::new(&c.holistic)?;
            let holistic = HolisticDetector::new(model, c.holistic.clone())?;
            boxed(kind, CropDetector::new(proposer, holistic, c.crop_padding)?, annotator)
        }
        #[cfg(not(feature = "onnx"))]
        TrackerConfig::Holistic(_)
        | TrackerConfig::YoloPose(_)
        | TrackerConfig::YoloHolisticCombo(_) => Err(onnx_unavailable(kind)),
    }
}

/// 名称字符串版本, 未知名称为配置错误
pub fn create_tracker_by_name(
    name: &str,
    config: &TrackerConfig,
    annotator: Option<&AnnotatorConfig>,
) -> Result<Box<dyn VideoTracker>> {
    create_tracker(name.parse()?, config, annotator)
}
