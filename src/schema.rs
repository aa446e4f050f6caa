// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 追踪点模式 (Tracked-point schema)
//!
//! 每个检测器变体报告一个固定的、有序的追踪点名称列表。下游按位置偏移索引轨迹,
//! 所以区域拼接顺序一旦确定就不能再改。

use std::ops::Range;

use once_cell::sync::Lazy;

/// 一个连续的区域 (body / right_hand / ...)
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub name: String,
    pub point_names: Vec<String>,
}

impl Region {
    pub fn new(name: impl Into<String>, point_names: Vec<String>) -> Self {
        Self {
            name: name.into(),
            point_names,
        }
    }

    pub fn len(&self) -> usize {
        self.point_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.point_names.is_empty()
    }
}

/// 有序区域列表, 区域内点名按轨迹顺序排列
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedPointSchema {
    regions: Vec<Region>,
}

impl TrackedPointSchema {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn num_tracked_points(&self) -> usize {
        self.regions.iter().map(Region::len).sum()
    }

    /// 全部点名, 与 `trajectories` 行顺序一致
    pub fn point_names(&self) -> Vec<String> {
        self.regions
            .iter()
            .flat_map(|r| r.point_names.iter().cloned())
            .collect()
    }

    /// 区域在轨迹数组中的行范围
    pub fn region_range(&self, name: &str) -> Option<Range<usize>> {
        let mut start = 0;
        for region in &self.regions {
            if region.name == name {
                return Some(start..start + region.len());
            }
            start += region.len();
        }
        None
    }
}

const BODY_LANDMARK_NAMES: [&str; 33] = [
    "nose",
    "left_eye_inner",
    "left_eye",
    "left_eye_outer",
    "right_eye_inner",
    "right_eye",
    "right_eye_outer",
    "left_ear",
    "right_ear",
    "mouth_left",
    "mouth_right",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_pinky",
    "right_pinky",
    "left_index",
    "right_index",
    "left_thumb",
    "right_thumb",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
    "left_heel",
    "right_heel",
    "left_foot_index",
    "right_foot_index",
];

const HAND_LANDMARK_NAMES: [&str; 21] = [
    "wrist",
    "thumb_cmc",
    "thumb_mcp",
    "thumb_ip",
    "thumb_tip",
    "index_finger_mcp",
    "index_finger_pip",
    "index_finger_dip",
    "index_finger_tip",
    "middle_finger_mcp",
    "middle_finger_pip",
    "middle_finger_dip",
    "middle_finger_tip",
    "ring_finger_mcp",
    "ring_finger_pip",
    "ring_finger_dip",
    "ring_finger_tip",
    "pinky_mcp",
    "pinky_pip",
    "pinky_dip",
    "pinky_tip",
];

/// 面部网格 (含虹膜) 关键点数
pub const FACE_LANDMARK_COUNT: usize = 478;

/// COCO 17 关键点
pub const COCO_KEYPOINT_NAMES: [&str; 17] = [
    "nose",
    "left_eye",
    "right_eye",
    "left_ear",
    "right_ear",
    "left_shoulder",
    "right_shoulder",
    "left_elbow",
    "right_elbow",
    "left_wrist",
    "right_wrist",
    "left_hip",
    "right_hip",
    "left_knee",
    "right_knee",
    "left_ankle",
    "right_ankle",
];

/// COCO 骨架连线 (0-based)
pub const COCO_SKELETON: [(usize, usize); 16] = [
    (0, 1),
    (0, 2),
    (1, 3),
    (2, 4),
    (5, 6),
    (5, 11),
    (6, 12),
    (11, 12),
    (5, 7),
    (6, 8),
    (7, 9),
    (8, 10),
    (11, 13),
    (12, 14),
    (13, 15),
    (14, 16),
];

/// OpenPose BODY_25
const OPENPOSE_BODY_NAMES: [&str; 25] = [
    "nose",
    "neck",
    "right_shoulder",
    "right_elbow",
    "right_wrist",
    "left_shoulder",
    "left_elbow",
    "left_wrist",
    "mid_hip",
    "right_hip",
    "right_knee",
    "right_ankle",
    "left_hip",
    "left_knee",
    "left_ankle",
    "right_eye",
    "left_eye",
    "right_ear",
    "left_ear",
    "left_big_toe",
    "left_small_toe",
    "left_heel",
    "right_big_toe",
    "right_small_toe",
    "right_heel",
];

pub const OPENPOSE_BODY_COUNT: usize = 25;
pub const OPENPOSE_HAND_COUNT: usize = 21;
pub const OPENPOSE_FACE_COUNT: usize = 70;

fn names(prefix: &str, base: &[&str]) -> Vec<String> {
    base.iter().map(|n| format!("{}{}", prefix, n)).collect()
}

fn numbered(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{}_{:03}", prefix, i)).collect()
}

/// holistic: body → right_hand → left_hand → face (顺序不可更改)
pub static HOLISTIC_SCHEMA: Lazy<TrackedPointSchema> = Lazy::new(|| {
    TrackedPointSchema::new(vec![
        Region::new("body", names("", &BODY_LANDMARK_NAMES)),
        Region::new("right_hand", names("right_hand_", &HAND_LANDMARK_NAMES)),
        Region::new("left_hand", names("left_hand_", &HAND_LANDMARK_NAMES)),
        Region::new("face", numbered("face", FACE_LANDMARK_COUNT)),
    ])
});

pub static COCO_POSE_SCHEMA: Lazy<TrackedPointSchema> = Lazy::new(|| {
    TrackedPointSchema::new(vec![Region::new("body", names("", &COCO_KEYPOINT_NAMES))])
});

pub static BRIGHTEST_POINT_SCHEMA: Lazy<TrackedPointSchema> = Lazy::new(|| {
    TrackedPointSchema::new(vec![Region::new(
        "brightest_point",
        vec!["brightest_point".to_string()],
    )])
});

pub static COLOR_SCHEMA: Lazy<TrackedPointSchema> = Lazy::new(|| {
    TrackedPointSchema::new(vec![Region::new("color", vec!["color".to_string()])])
});

/// 标定板内角点: 行优先编号
pub fn charuco_schema(squares_x: usize, squares_y: usize) -> TrackedPointSchema {
    let count = squares_x.saturating_sub(1) * squares_y.saturating_sub(1);
    TrackedPointSchema::new(vec![Region::new(
        "charuco_corners",
        numbered("charuco_corner", count),
    )])
}

/// OpenPose: body → left_hand → right_hand → face (与 OpenPose JSON 字段顺序一致)
pub fn openpose_schema(track_hands: bool, track_faces: bool) -> TrackedPointSchema {
    let mut regions = vec![Region::new("body", names("", &OPENPOSE_BODY_NAMES))];
    if track_hands {
        regions.push(Region::new(
            "left_hand",
            numbered("left_hand", OPENPOSE_HAND_COUNT),
        ));
        regions.push(Region::new(
            "right_hand",
            numbered("right_hand", OPENPOSE_HAND_COUNT),
        ));
    }
    if track_faces {
        regions.push(Region::new("face", numbered("face", OPENPOSE_FACE_COUNT)));
    }
    TrackedPointSchema::new(regions)
}
