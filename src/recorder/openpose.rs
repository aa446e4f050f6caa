// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! OpenPose 逐帧 JSON 结果导入
//!
//! 文件名形如 `<video>_000000000042_keypoints.json`, 12 位数字为帧号。
//! 每个三元组按原样保存为 `(x, y, confidence)`。

use std::path::{Path, PathBuf};

use ndarray::{s, Array3};
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, info};

use super::TrajectoryRecorder;
use crate::error::{Result, TrackerError};
use crate::schema::{
    openpose_schema, TrackedPointSchema, OPENPOSE_BODY_COUNT, OPENPOSE_FACE_COUNT,
    OPENPOSE_HAND_COUNT,
};

const FRAME_INDEX_PATTERN: &str = r"_(\d{12})_keypoints";

#[derive(Debug, Deserialize)]
struct OpenPoseFrame {
    people: Vec<OpenPosePerson>,
}

#[derive(Debug, Deserialize)]
struct OpenPosePerson {
    pose_keypoints_2d: Option<Vec<f64>>,
    hand_left_keypoints_2d: Option<Vec<f64>>,
    hand_right_keypoints_2d: Option<Vec<f64>>,
    face_keypoints_2d: Option<Vec<f64>>,
}

#[derive(Debug)]
pub struct OpenPoseRecorder {
    json_directory: PathBuf,
    track_hands: bool,
    track_faces: bool,
    pattern: Regex,
    compacted: Option<Array3<f64>>,
}

impl OpenPoseRecorder {
    pub fn new(
        json_directory: impl Into<PathBuf>,
        track_hands: bool,
        track_faces: bool,
    ) -> Result<Self> {
        let pattern = Regex::new(FRAME_INDEX_PATTERN)
            .map_err(|e| TrackerError::configuration(format!("invalid frame pattern: {e}")))?;
        Ok(Self {
            json_directory: json_directory.into(),
            track_hands,
            track_faces,
            pattern,
            compacted: None,
        })
    }

    pub fn json_directory(&self) -> &Path {
        &self.json_directory
    }

    pub fn schema(&self) -> TrackedPointSchema {
        openpose_schema(self.track_hands, self.track_faces)
    }

    pub fn num_markers(&self) -> usize {
        let mut n = OPENPOSE_BODY_COUNT;
        if self.track_hands {
            n += 2 * OPENPOSE_HAND_COUNT;
        }
        if self.track_faces {
            n += OPENPOSE_FACE_COUNT;
        }
        n
    }

    /// 从文件名解析帧号
    pub fn extract_frame_index(&self, file_name: &str) -> Option<u64> {
        self.pattern
            .captures(file_name)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// 目录下全部 `.json` 文件, 按帧号排序
    fn discover(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.json_directory)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|e| e.eq_ignore_ascii_case("json")) {
                let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
                let index = self.extract_frame_index(name).ok_or_else(|| {
                    TrackerError::external_result(&path, "file name has no 12-digit frame index")
                })?;
                files.push((index, path));
            }
        }
        files.sort();
        Ok(files.into_iter().map(|(_, p)| p).collect())
    }

    fn fill_region(
        &self,
        path: &Path,
        frame: &mut ndarray::ArrayViewMut2<f64>,
        offset: usize,
        count: usize,
        region: &str,
        values: &[f64],
    ) -> Result<()> {
        if values.len() < count * 3 {
            return Err(TrackerError::external_result(
                path,
                format!(
                    "{} has {} values, expected at least {}",
                    region,
                    values.len(),
                    count * 3
                ),
            ));
        }
        for (i, triple) in values.chunks_exact(3).take(count).enumerate() {
            for (j, v) in triple.iter().enumerate() {
                frame[[offset + i, j]] = *v;
            }
        }
        Ok(())
    }

    fn parse_file(&self, path: &Path, mut frame: ndarray::ArrayViewMut2<f64>) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        let parsed: OpenPoseFrame = serde_json::from_str(&text)
            .map_err(|e| TrackerError::external_result(path, e.to_string()))?;
        let Some(person) = parsed.people.first() else {
            debug!("{}: 无人", path.display());
            return Ok(());
        };

        if let Some(values) = &person.pose_keypoints_2d {
            self.fill_region(
                path,
                &mut frame,
                0,
                OPENPOSE_BODY_COUNT,
                "pose_keypoints_2d",
                values,
            )?;
        }
        let mut offset = OPENPOSE_BODY_COUNT;
        if self.track_hands {
            if let (Some(left), Some(right)) =
                (&person.hand_left_keypoints_2d, &person.hand_right_keypoints_2d)
            {
                self.fill_region(
                    path,
                    &mut frame,
                    offset,
                    OPENPOSE_HAND_COUNT,
                    "hand_left_keypoints_2d",
                    left,
                )?;
                self.fill_region(
                    path,
                    &mut frame,
                    offset + OPENPOSE_HAND_COUNT,
                    OPENPOSE_HAND_COUNT,
                    "hand_right_keypoints_2d",
                    right,
                )?;
            }
            offset += 2 * OPENPOSE_HAND_COUNT;
        }
        if self.track_faces {
            if let Some(values) = &person.face_keypoints_2d {
                self.fill_region(
                    path,
                    &mut frame,
                    offset,
                    OPENPOSE_FACE_COUNT,
                    "face_keypoints_2d",
                    values,
                )?;
            }
        }
        Ok(())
    }

    /// 解析整个目录为 `(num_files, num_markers, 3)`
    pub fn parse_openpose_jsons(&self) -> Result<Array3<f64>> {
        let files = self.discover()?;
        let mut data = Array3::from_elem((files.len(), self.num_markers(), 3), f64::NAN);
        for (frame, path) in files.iter().enumerate() {
            self.parse_file(path, data.slice_mut(s![frame, .., ..]))?;
        }
        info!(
            "📂 {} 导入 {} 帧 OpenPose 结果",
            self.json_directory.display(),
            files.len()
        );
        Ok(data)
    }
}

impl TrajectoryRecorder for OpenPoseRecorder {
    fn process_tracked_objects(&mut self) -> Result<&Array3<f64>> {
        let array = match self.compacted.take() {
            Some(array) => array,
            None => self.parse_openpose_jsons()?,
        };
        Ok(self.compacted.insert(array))
    }

    fn clear(&mut self) {
        self.compacted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_frame(dir: &Path, index: u64, body: &str) {
        let name = format!("cam0_{:012}_keypoints.json", index);
        std::fs::write(dir.join(name), body).unwrap();
    }

    fn person_json(x: f64, hands: bool, face: bool) -> String {
        let triples = |n: usize| {
            (0..n)
                .map(|i| format!("{}, {}, 0.9", x + i as f64, 2.0))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut fields = vec![format!("\"pose_keypoints_2d\": [{}]", triples(25))];
        if hands {
            fields.push(format!("\"hand_left_keypoints_2d\": [{}]", triples(21)));
            fields.push(format!("\"hand_right_keypoints_2d\": [{}]", triples(21)));
        }
        if face {
            fields.push(format!("\"face_keypoints_2d\": [{}]", triples(70)));
        }
        format!("{{\"people\": [{{{}}}]}}", fields.join(", "))
    }

    #[test]
    fn test_frame_index_pattern() {
        let recorder = OpenPoseRecorder::new("unused", false, false).unwrap();
        assert_eq!(
            recorder.extract_frame_index("video_000000000123_keypoints.json"),
            Some(123)
        );
        assert_eq!(recorder.extract_frame_index("video_123_keypoints.json"), None);
    }

    #[test]
    fn test_regions_follow_flags() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), 1, &person_json(10.0, true, false));
        write_frame(dir.path(), 0, &person_json(0.0, false, true));

        let mut recorder = OpenPoseRecorder::new(dir.path(), true, true).unwrap();
        let data = recorder.process_tracked_objects().unwrap().clone();
        assert_eq!(data.shape(), &[2, 137, 3]);

        // 帧 0: 无手部, 有面部
        assert_eq!(data[[0, 0, 0]], 0.0);
        assert_eq!(data[[0, 0, 2]], 0.9);
        assert!(data.slice(s![0, 25..67, ..]).iter().all(|v| v.is_nan()));
        assert_eq!(data[[0, 67, 0]], 0.0);

        // 帧 1: 有手部, 无面部
        assert_eq!(data[[1, 0, 0]], 10.0);
        assert_eq!(data[[1, 46, 0]], 10.0);
        assert!(data.slice(s![1, 67.., ..]).iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_truncated_region_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), 0, r#"{"people": [{"pose_keypoints_2d": [1.0, 2.0, 0.5]}]}"#);
        let mut recorder = OpenPoseRecorder::new(dir.path(), false, false).unwrap();
        assert!(matches!(
            recorder.process_tracked_objects(),
            Err(TrackerError::ExternalResult { .. })
        ));
    }

    #[test]
    fn test_non_numeric_field_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        write_frame(dir.path(), 0, r#"{"people": [{"pose_keypoints_2d": ["a"]}]}"#);
        let mut recorder = OpenPoseRecorder::new(dir.path(), false, false).unwrap();
        assert!(matches!(
            recorder.process_tracked_objects(),
            Err(TrackerError::ExternalResult { .. })
        ));
    }
}
