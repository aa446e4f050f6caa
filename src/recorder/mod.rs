// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 记录器 (Recorder)
//!
//! 按帧累积观测结果, 并按需压缩为 `(num_frames, num_tracked_points, 3)` 的轨迹数组。

pub mod openpose;

pub use openpose::OpenPoseRecorder;

use std::path::Path;

use ndarray::{Array, Array3, Axis, Dimension};
use tracing::info;

use crate::error::{Result, TrackerError};
use crate::observation::Observation;

/// 记录器公共接口
pub trait TrajectoryRecorder {
    /// 压缩结果 (带缓存, 重复调用结果相同)
    fn process_tracked_objects(&mut self) -> Result<&Array3<f64>>;

    /// 清空累积数据与缓存
    fn clear(&mut self);

    fn save(&mut self, path: &Path) -> Result<()> {
        let array = self.process_tracked_objects()?;
        save_array(path, array)
    }
}

/// 写出 `.npy`, 自动创建父目录
pub fn save_array<D: Dimension>(path: &Path, array: &Array<f64, D>) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    info!("💾 保存轨迹数组 {:?} 到 {}", array.shape(), path.display());
    ndarray_npy::write_npy(path, array)?;
    Ok(())
}

/// 实时累积记录器: 调用顺序即帧顺序
#[derive(Debug, Clone)]
pub struct Recorder<O> {
    observations: Vec<O>,
    compacted: Option<Array3<f64>>,
    num_tracked_points: usize,
}

impl<O: Observation> Recorder<O> {
    pub fn new(num_tracked_points: usize) -> Self {
        Self {
            observations: Vec::new(),
            compacted: None,
            num_tracked_points,
        }
    }

    pub fn record(&mut self, observation: O) {
        self.observations.push(observation);
        self.compacted = None;
    }

    pub fn num_frames(&self) -> usize {
        self.observations.len()
    }

    pub fn observations(&self) -> &[O] {
        &self.observations
    }

    fn compact(&self) -> Result<Array3<f64>> {
        let n = self.num_tracked_points;
        if self.observations.is_empty() {
            return Ok(Array3::zeros((0, n, 3)));
        }
        let frames = self
            .observations
            .iter()
            .enumerate()
            .map(|(frame, obs)| {
                let traj = obs.padded_trajectories();
                if traj.dim() != (n, 3) {
                    return Err(TrackerError::model(format!(
                        "observation at frame {} has shape {:?}, expected ({}, 3)",
                        frame,
                        traj.shape(),
                        n
                    )));
                }
                Ok(traj)
            })
            .collect::<Result<Vec<_>>>()?;
        let views: Vec<_> = frames.iter().map(|f| f.view()).collect();
        Ok(ndarray::stack(Axis(0), &views)?)
    }
}

impl<O: Observation> TrajectoryRecorder for Recorder<O> {
    fn process_tracked_objects(&mut self) -> Result<&Array3<f64>> {
        let array = match self.compacted.take() {
            Some(array) => array,
            None => self.compact()?,
        };
        Ok(self.compacted.insert(array))
    }

    fn clear(&mut self) {
        self.observations.clear();
        self.compacted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point2;
    use crate::observation::{trajectories_close, BrightPointObservation, ImageSize};

    fn observation(x: Option<f32>) -> BrightPointObservation {
        BrightPointObservation::new(x.map(|x| Point2::new(x, 1.0)), ImageSize::new(8, 8))
    }

    #[test]
    fn test_compaction_is_idempotent() {
        let mut recorder = Recorder::new(1);
        recorder.record(observation(Some(1.0)));
        recorder.record(observation(None));
        recorder.record(observation(Some(3.0)));

        let first = recorder.process_tracked_objects().unwrap().clone();
        let second = recorder.process_tracked_objects().unwrap().clone();
        assert_eq!(first.shape(), &[3, 1, 3]);
        assert!(trajectories_close(
            &first.view().into_dyn(),
            &second.view().into_dyn(),
            0.0
        ));
        assert!(first.slice(ndarray::s![1, .., ..]).iter().all(|v| v.is_nan()));
        assert_eq!(first[[2, 0, 0]], 3.0);
    }

    #[test]
    fn test_clear_resets_state() {
        let mut recorder = Recorder::new(1);
        recorder.record(observation(Some(1.0)));
        recorder.process_tracked_objects().unwrap();
        recorder.clear();
        assert_eq!(recorder.num_frames(), 0);
        assert_eq!(recorder.process_tracked_objects().unwrap().shape(), &[0, 1, 3]);
    }

    #[test]
    fn test_wrong_point_count_fails() {
        let mut recorder = Recorder::new(2);
        recorder.record(observation(Some(1.0)));
        assert!(recorder.process_tracked_objects().is_err());
    }

    #[test]
    fn test_save_writes_npy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("points.npy");
        let mut recorder = Recorder::new(1);
        recorder.record(observation(Some(2.0)));
        recorder.save(&path).unwrap();

        let loaded: Array3<f64> = ndarray_npy::read_npy(&path).unwrap();
        assert_eq!(loaded.shape(), &[1, 1, 3]);
        assert_eq!(loaded[[0, 0, 0]], 2.0);
    }
}
