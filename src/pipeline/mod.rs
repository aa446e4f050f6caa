// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 批处理流水线 (Batch Pipeline)
///
/// 一个文件 = 一个相机, 每个文件一个新的追踪器:
/// - 发现输入文件 (按文件名排序)
/// - 工作线程池逐文件处理, 帧按顺序送入追踪器
/// - 每个文件压缩为 (num_frames, num_tracked_points, 3)
/// - 沿相机轴堆叠为 (num_cameras, num_frames, num_tracked_points, 3) 并保存
pub mod worker;

pub use worker::run_jobs;

use std::path::{Path, PathBuf};
use std::time::Instant;

use ndarray::{Array3, Array4, Axis};
use tracing::{debug, info, warn};

use crate::config::{TrackerConfig, TrackerKind, OPENPOSE_OUTPUT_FILE_NAME};
use crate::error::{Result, TrackerError};
use crate::input::{discover_inputs, SourceOpener};
use crate::recorder::{save_array, OpenPoseRecorder, TrajectoryRecorder};
use crate::tracker::create_tracker;

const PROGRESS_EVERY: usize = 100;

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// None: min(CPU - 1, 文件数), 至少 1
    pub worker_count: Option<usize>,
    /// None: `<input>/../output_data/raw_data/<name>.npy`
    pub output_path: Option<PathBuf>,
}

impl BatchOptions {
    fn resolve_workers(&self, num_files: usize) -> usize {
        self.worker_count
            .unwrap_or_else(|| default_worker_count(num_files))
            .max(1)
    }

    fn resolve_output(&self, input_dir: &Path, file_name: &str) -> PathBuf {
        self.output_path
            .clone()
            .unwrap_or_else(|| default_output_path(input_dir, file_name))
    }
}

pub fn default_worker_count(num_files: usize) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    cores.saturating_sub(1).min(num_files).max(1)
}

pub fn default_output_path(input_dir: &Path, file_name: &str) -> PathBuf {
    let parent = input_dir.parent().unwrap_or_else(|| Path::new("."));
    parent.join("output_data").join("raw_data").join(file_name)
}

/// 处理单个视频, 返回 (num_frames, num_tracked_points, 3)
pub fn process_single_video(
    kind: TrackerKind,
    config: &TrackerConfig,
    path: &Path,
    opener: &dyn SourceOpener,
) -> Result<Array3<f64>> {
    let t0 = Instant::now();
    let mut tracker = create_tracker(kind, config, None)?;
    let mut source = opener.open(path)?;
    let expected = source.frame_count();
    info!("🎥 处理 {} ({})", path.display(), kind);

    let mut frames = 0usize;
    while let Some(frame) = source.next_frame()? {
        tracker.process_frame(&frame, false)?;
        frames += 1;
        if frames % PROGRESS_EVERY == 0 {
            debug!("{}: {} 帧", path.display(), frames);
        }
    }

    if let Some(expected) = expected {
        if frames < expected {
            return Err(TrackerError::frame_read(
                path,
                format!("source ended after {} of {} frames", frames, expected),
            ));
        }
        if frames > expected {
            warn!(
                "⚠️ {}: 读取到 {} 帧, 多于声明的 {} 帧",
                path.display(),
                frames,
                expected
            );
        }
    }

    let array = tracker.compact()?;
    tracker.reset();
    info!(
        "✅ {} 完成: {:?}, 耗时 {:?}",
        path.display(),
        array.shape(),
        t0.elapsed()
    );
    Ok(array)
}

/// 沿新的相机轴堆叠; 帧数或点数不一致时失败, 不做填充或截断
pub fn stack_camera_arrays(arrays: &[Array3<f64>]) -> Result<Array4<f64>> {
    let Some(first) = arrays.first() else {
        return Err(TrackerError::configuration("no camera arrays to stack"));
    };
    let expected = first.shape().to_vec();
    for (camera, array) in arrays.iter().enumerate() {
        if array.shape() != expected.as_slice() {
            return Err(TrackerError::ShapeMismatch {
                camera,
                expected,
                found: array.shape().to_vec(),
            });
        }
    }
    let views: Vec<_> = arrays.iter().map(|a| a.view()).collect();
    Ok(ndarray::stack(Axis(0), &views)?)
}

/// 批量处理视频文件夹, 保存并返回合并数组
pub fn process_folder(
    tracker_name: &str,
    config: &TrackerConfig,
    input_dir: &Path,
    options: &BatchOptions,
    opener: &dyn SourceOpener,
) -> Result<Array4<f64>> {
    let kind: TrackerKind = tracker_name.parse()?;
    config.ensure_kind(kind)?;
    config.validate()?;

    let files = discover_inputs(input_dir, opener)?;
    if files.is_empty() {
        return Err(TrackerError::configuration(format!(
            "no input files with extensions {:?} in {}",
            opener.extensions(),
            input_dir.display()
        )));
    }
    let workers = options.resolve_workers(files.len());
    info!(
        "🚀 {} 个文件, {} 个工作线程, 追踪器 {}",
        files.len(),
        workers,
        kind
    );

    let arrays = run_jobs(files, workers, |_, path| {
        process_single_video(kind, config, &path, opener)
    })?;
    let combined = stack_camera_arrays(&arrays)?;
    info!("📐 合并数组形状: {:?}", combined.shape());

    let output = options.resolve_output(input_dir, kind.output_file_name());
    save_array(&output, &combined)?;
    Ok(combined)
}

/// 批量导入 OpenPose 结果: 每个子目录一个相机
pub fn process_openpose_folder(
    input_dir: &Path,
    track_hands: bool,
    track_faces: bool,
    options: &BatchOptions,
) -> Result<Array4<f64>> {
    if !input_dir.is_dir() {
        return Err(TrackerError::configuration(format!(
            "input directory {} does not exist",
            input_dir.display()
        )));
    }
    let mut cameras = Vec::new();
    for entry in std::fs::read_dir(input_dir)? {
        let path = entry?.path();
        if path.is_dir() {
            cameras.push(path);
        }
    }
    cameras.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    if cameras.is_empty() {
        return Err(TrackerError::configuration(format!(
            "no camera sub-directories in {}",
            input_dir.display()
        )));
    }

    let workers = options.resolve_workers(cameras.len());
    info!("🚀 {} 个 OpenPose 相机目录, {} 个工作线程", cameras.len(), workers);
    let arrays = run_jobs(cameras, workers, |_, dir| {
        let mut recorder = OpenPoseRecorder::new(dir, track_hands, track_faces)?;
        let array = recorder.process_tracked_objects()?.clone();
        recorder.clear();
        Ok(array)
    })?;
    let combined = stack_camera_arrays(&arrays)?;

    let output = options.resolve_output(input_dir, OPENPOSE_OUTPUT_FILE_NAME);
    save_array(&output, &combined)?;
    Ok(combined)
}
