// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! ChArUco 标定板角点检测
//!
//! 板子定义 ([`CharucoBoard`]) 与帧无关: 角点 id → 物体坐标的映射是固定的。
//! 角点查找通过 [`BoardCornerFinder`] 注入, 默认实现 [`ChessCornerFinder`] 基于
//! ChESS X 角点响应, 只有找到完整的内角点网格时才报告结果。

use std::sync::Arc;

use image::{DynamicImage, GrayImage};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Detector;
use crate::error::{Result, TrackerError};
use crate::geometry::Point2;
use crate::observation::{CharucoObservation, ImageSize};
use crate::schema::{charuco_schema, TrackedPointSchema};

/// 预定义 ArUco 字典 (标记位数 × 容量)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArucoDictionary {
    #[serde(rename = "DICT_4X4_50")]
    Dict4x4_50,
    #[serde(rename = "DICT_4X4_100")]
    Dict4x4_100,
    #[serde(rename = "DICT_4X4_250")]
    Dict4x4_250,
    #[serde(rename = "DICT_4X4_1000")]
    Dict4x4_1000,
    #[serde(rename = "DICT_5X5_50")]
    Dict5x5_50,
    #[serde(rename = "DICT_5X5_100")]
    Dict5x5_100,
    #[serde(rename = "DICT_5X5_250")]
    Dict5x5_250,
    #[serde(rename = "DICT_5X5_1000")]
    Dict5x5_1000,
    #[serde(rename = "DICT_6X6_50")]
    Dict6x6_50,
    #[serde(rename = "DICT_6X6_100")]
    Dict6x6_100,
    #[serde(rename = "DICT_6X6_250")]
    Dict6x6_250,
    #[serde(rename = "DICT_6X6_1000")]
    Dict6x6_1000,
    #[serde(rename = "DICT_7X7_50")]
    Dict7x7_50,
    #[serde(rename = "DICT_7X7_100")]
    Dict7x7_100,
    #[serde(rename = "DICT_7X7_250")]
    Dict7x7_250,
    #[serde(rename = "DICT_7X7_1000")]
    Dict7x7_1000,
}

impl ArucoDictionary {
    pub fn marker_bits(&self) -> usize {
        use ArucoDictionary::*;
        match self {
            Dict4x4_50 | Dict4x4_100 | Dict4x4_250 | Dict4x4_1000 => 4,
            Dict5x5_50 | Dict5x5_100 | Dict5x5_250 | Dict5x5_1000 => 5,
            Dict6x6_50 | Dict6x6_100 | Dict6x6_250 | Dict6x6_1000 => 6,
            Dict7x7_50 | Dict7x7_100 | Dict7x7_250 | Dict7x7_1000 => 7,
        }
    }

    /// 字典中的标记数量
    pub fn capacity(&self) -> usize {
        use ArucoDictionary::*;
        match self {
            Dict4x4_50 | Dict5x5_50 | Dict6x6_50 | Dict7x7_50 => 50,
            Dict4x4_100 | Dict5x5_100 | Dict6x6_100 | Dict7x7_100 => 100,
            Dict4x4_250 | Dict5x5_250 | Dict6x6_250 | Dict7x7_250 => 250,
            Dict4x4_1000 | Dict5x5_1000 | Dict6x6_1000 | Dict7x7_1000 => 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharucoConfig {
    pub squares_x: usize,
    pub squares_y: usize,
    pub square_length: f64,
    pub marker_length: f64,
    pub aruco_dictionary: ArucoDictionary,
    /// ChESS 响应阈值
    pub response_threshold: f32,
}

impl Default for CharucoConfig {
    fn default() -> Self {
        Self {
            squares_x: 5,
            squares_y: 3,
            square_length: 1.0,
            marker_length: 0.8,
            aruco_dictionary: ArucoDictionary::Dict4x4_250,
            response_threshold: 100.0,
        }
    }
}

impl CharucoConfig {
    pub fn validate(&self) -> Result<()> {
        CharucoBoard::new(self)?;
        if !self.response_threshold.is_finite() || self.response_threshold <= 0.0 {
            return Err(TrackerError::configuration(format!(
                "response_threshold must be > 0, got {}",
                self.response_threshold
            )));
        }
        Ok(())
    }
}

/// 标定板几何定义
#[derive(Debug, Clone, PartialEq)]
pub struct CharucoBoard {
    squares_x: usize,
    squares_y: usize,
    square_length: f64,
    marker_length: f64,
    dictionary: ArucoDictionary,
}

impl CharucoBoard {
    pub fn new(config: &CharucoConfig) -> Result<Self> {
        if config.squares_x < 2 || config.squares_y < 2 {
            return Err(TrackerError::configuration(format!(
                "board needs at least 2x2 squares, got {}x{}",
                config.squares_x, config.squares_y
            )));
        }
        if !(config.square_length > 0.0) || !(config.marker_length > 0.0) {
            return Err(TrackerError::configuration(
                "square_length and marker_length must be > 0",
            ));
        }
        if config.marker_length >= config.square_length {
            return Err(TrackerError::configuration(format!(
                "marker_length ({}) must be smaller than square_length ({})",
                config.marker_length, config.square_length
            )));
        }
        let board = Self {
            squares_x: config.squares_x,
            squares_y: config.squares_y,
            square_length: config.square_length,
            marker_length: config.marker_length,
            dictionary: config.aruco_dictionary,
        };
        if board.num_markers() > board.dictionary.capacity() {
            return Err(TrackerError::configuration(format!(
                "board needs {} markers but {:?} only holds {}",
                board.num_markers(),
                board.dictionary,
                board.dictionary.capacity()
            )));
        }
        Ok(board)
    }

    pub fn squares(&self) -> (usize, usize) {
        (self.squares_x, self.squares_y)
    }

    pub fn square_length(&self) -> f64 {
        self.square_length
    }

    pub fn marker_length(&self) -> f64 {
        self.marker_length
    }

    pub fn dictionary(&self) -> ArucoDictionary {
        self.dictionary
    }

    /// 内角点网格 (列, 行)
    pub fn inner_grid(&self) -> (usize, usize) {
        (self.squares_x - 1, self.squares_y - 1)
    }

    pub fn num_corners(&self) -> usize {
        let (cols, rows) = self.inner_grid();
        cols * rows
    }

    /// 标记只放在白色方格上
    pub fn num_markers(&self) -> usize {
        self.squares_x * self.squares_y / 2
    }

    pub fn corner_ids(&self) -> Vec<usize> {
        (0..self.num_corners()).collect()
    }

    pub fn aruco_marker_ids(&self) -> Vec<usize> {
        (0..self.num_markers()).collect()
    }

    /// id → `[col·L, row·L, 0]`, 行优先
    pub fn corner_object_points(&self) -> Array2<f64> {
        let (cols, _) = self.inner_grid();
        let mut out = Array2::zeros((self.num_corners(), 3));
        for (id, mut row) in out.rows_mut().into_iter().enumerate() {
            row[0] = (id % cols) as f64 * self.square_length;
            row[1] = (id / cols) as f64 * self.square_length;
        }
        out
    }
}

/// 从灰度图中找出标定板内角点, 返回 (id, 像素坐标)
pub trait BoardCornerFinder: Send + Sync {
    fn find_corners(&self, gray: &GrayImage, board: &CharucoBoard) -> Vec<(usize, Point2)>;
}

/// ChESS 采样环 (半径 5, 16 点, 顺时针)
const RING: [(i32, i32); 16] = [
    (0, -5),
    (2, -5),
    (4, -4),
    (5, -2),
    (5, 0),
    (5, 2),
    (4, 4),
    (2, 5),
    (0, 5),
    (-2, 5),
    (-4, 4),
    (-5, 2),
    (-5, 0),
    (-5, -2),
    (-4, -4),
    (-2, -5),
];
const RING_RADIUS: u32 = 5;
const NMS_RADIUS: i32 = 5;

/// ChESS X 角点查找
#[derive(Debug, Clone)]
pub struct ChessCornerFinder {
    threshold: f32,
}

impl ChessCornerFinder {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    /// 逐像素响应, 边缘区域为 0
    pub fn response(&self, gray: &GrayImage) -> Vec<f32> {
        let (w, h) = gray.dimensions();
        let mut out = vec![0f32; (w * h) as usize];
        let margin = RING_RADIUS + 1;
        if w <= 2 * margin || h <= 2 * margin {
            return out;
        }
        let px = |x: i32, y: i32| gray.get_pixel(x as u32, y as u32)[0] as f32;
        for y in margin..h - margin {
            for x in margin..w - margin {
                let (cx, cy) = (x as i32, y as i32);
                let mut ring = [0f32; 16];
                for (i, (dx, dy)) in RING.iter().enumerate() {
                    ring[i] = px(cx + dx, cy + dy);
                }
                let sum_response: f32 = (0..4)
                    .map(|n| ((ring[n] + ring[n + 8]) - (ring[n + 4] + ring[n + 12])).abs())
                    .sum();
                let diff_response: f32 = (0..8).map(|n| (ring[n] - ring[n + 8]).abs()).sum();
                let ring_mean = ring.iter().sum::<f32>() / 16.0;
                let mut local = 0f32;
                for dy in -1..=1 {
                    for dx in -1..=1 {
                        local += px(cx + dx, cy + dy);
                    }
                }
                let mean_response = (ring_mean - local / 9.0).abs();
                out[(y * w + x) as usize] = sum_response - diff_response - 16.0 * mean_response;
            }
        }
        out
    }

    /// 阈值 + 非极大值抑制 (平局按光栅顺序取先者) + 3×3 加权质心
    fn peaks(&self, response: &[f32], w: u32, h: u32) -> Vec<(f32, Point2)> {
        let (wi, hi) = (w as i32, h as i32);
        let at = |x: i32, y: i32| response[(y * wi + x) as usize];
        let mut peaks = Vec::new();
        for y in 0..hi {
            for x in 0..wi {
                let r = at(x, y);
                if r < self.threshold {
                    continue;
                }
                let mut is_max = true;
                'window: for ny in (y - NMS_RADIUS).max(0)..=(y + NMS_RADIUS).min(hi - 1) {
                    for nx in (x - NMS_RADIUS).max(0)..=(x + NMS_RADIUS).min(wi - 1) {
                        if (nx, ny) == (x, y) {
                            continue;
                        }
                        let q = at(nx, ny);
                        let earlier = (ny, nx) < (y, x);
                        if q > r || (q == r && earlier) {
                            is_max = false;
                            break 'window;
                        }
                    }
                }
                if !is_max {
                    continue;
                }

                let (mut sx, mut sy, mut sw) = (0f32, 0f32, 0f32);
                for ny in (y - 1).max(0)..=(y + 1).min(hi - 1) {
                    for nx in (x - 1).max(0)..=(x + 1).min(wi - 1) {
                        let q = at(nx, ny).max(0.0);
                        sx += q * nx as f32;
                        sy += q * ny as f32;
                        sw += q;
                    }
                }
                peaks.push((r, Point2::new(sx / sw, sy / sw)));
            }
        }
        peaks
    }
}

impl Default for ChessCornerFinder {
    fn default() -> Self {
        Self::new(100.0)
    }
}

impl BoardCornerFinder for ChessCornerFinder {
    fn find_corners(&self, gray: &GrayImage, board: &CharucoBoard) -> Vec<(usize, Point2)> {
        let (w, h) = gray.dimensions();
        let response = self.response(gray);
        let mut peaks = self.peaks(&response, w, h);

        let expected = board.num_corners();
        if peaks.len() < expected {
            debug!("charuco: {} 个候选角点, 需要 {}", peaks.len(), expected);
            return Vec::new();
        }
        peaks.sort_by(|a, b| b.0.total_cmp(&a.0));
        peaks.truncate(expected);

        // 按行 (y) 分组, 行内按 x 排序, 行优先编号
        let (cols, _) = board.inner_grid();
        let mut points: Vec<Point2> = peaks.into_iter().map(|(_, p)| p).collect();
        points.sort_by(|a, b| a.y().total_cmp(&b.y()));
        let mut rows: Vec<Vec<Point2>> = points.chunks(cols).map(|c| c.to_vec()).collect();
        for row in rows.iter_mut() {
            row.sort_by(|a, b| a.x().total_cmp(&b.x()));
        }
        for pair in rows.windows(2) {
            let lower = pair[0].iter().map(|p| p.y()).fold(f32::MIN, f32::max);
            let upper = pair[1].iter().map(|p| p.y()).fold(f32::MAX, f32::min);
            if lower >= upper {
                debug!("charuco: 候选角点无法排成网格");
                return Vec::new();
            }
        }
        rows.into_iter().flatten().enumerate().collect()
    }
}

pub struct CharucoDetector {
    board: CharucoBoard,
    finder: Box<dyn BoardCornerFinder>,
    schema: Arc<TrackedPointSchema>,
}

impl CharucoDetector {
    pub fn new(config: &CharucoConfig) -> Result<Self> {
        config.validate()?;
        let finder = ChessCornerFinder::new(config.response_threshold);
        Self::with_finder(config, Box::new(finder))
    }

    pub fn with_finder(config: &CharucoConfig, finder: Box<dyn BoardCornerFinder>) -> Result<Self> {
        let board = CharucoBoard::new(config)?;
        let schema = Arc::new(charuco_schema(config.squares_x, config.squares_y));
        Ok(Self {
            board,
            finder,
            schema,
        })
    }

    pub fn board(&self) -> &CharucoBoard {
        &self.board
    }

    pub fn corner_ids(&self) -> Vec<usize> {
        self.board.corner_ids()
    }

    pub fn corner_object_points(&self) -> Array2<f64> {
        self.board.corner_object_points()
    }

    pub fn aruco_marker_ids(&self) -> Vec<usize> {
        self.board.aruco_marker_ids()
    }
}

impl Detector for CharucoDetector {
    type Output = CharucoObservation;

    fn detect(&mut self, image: &DynamicImage) -> Result<Self::Output> {
        let gray = image.to_luma8();
        let corners = self.finder.find_corners(&gray, &self.board);
        CharucoObservation::new(corners, self.schema.clone(), ImageSize::of(image))
    }

    fn schema(&self) -> &TrackedPointSchema {
        &self.schema
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observation::Observation;
    use image::Luma;

    const SQUARE: u32 = 40;
    const ORIGIN: u32 = 40;

    /// 5×3 棋盘格, 白色边框, (r + c) 为偶数的方格为黑色
    fn synthetic_board() -> DynamicImage {
        let (sx, sy) = (5, 3);
        let w = ORIGIN * 2 + SQUARE * sx;
        let h = ORIGIN * 2 + SQUARE * sy;
        let gray = GrayImage::from_fn(w, h, |x, y| {
            if x < ORIGIN || y < ORIGIN || x >= ORIGIN + SQUARE * sx || y >= ORIGIN + SQUARE * sy {
                return Luma([255u8]);
            }
            let c = (x - ORIGIN) / SQUARE;
            let r = (y - ORIGIN) / SQUARE;
            if (r + c) % 2 == 0 {
                Luma([0u8])
            } else {
                Luma([255u8])
            }
        });
        DynamicImage::ImageLuma8(gray)
    }

    #[test]
    fn test_blank_image_has_no_corners() {
        let mut detector = CharucoDetector::new(&CharucoConfig::default()).unwrap();
        let blank = DynamicImage::ImageLuma8(GrayImage::from_pixel(320, 240, Luma([128u8])));
        let obs = detector.detect(&blank).unwrap();
        assert_eq!(obs.trajectories().nrows(), 0);
        assert_eq!(obs.padded_trajectories().nrows(), 8);
    }

    #[test]
    fn test_synthetic_board_corners() {
        let mut detector = CharucoDetector::new(&CharucoConfig::default()).unwrap();
        let obs = detector.detect(&synthetic_board()).unwrap();
        let traj = obs.trajectories();
        assert_eq!(traj.nrows(), 8);
        assert_eq!(obs.corner_ids(), (0..8).collect::<Vec<_>>());

        for id in 0..8 {
            let (col, row) = ((id % 4) as f64, (id / 4) as f64);
            let ex = (ORIGIN + SQUARE) as f64 + col * SQUARE as f64;
            let ey = (ORIGIN + SQUARE) as f64 + row * SQUARE as f64;
            assert!((traj[[id, 0]] - ex).abs() <= 2.0, "corner {} x {}", id, traj[[id, 0]]);
            assert!((traj[[id, 1]] - ey).abs() <= 2.0, "corner {} y {}", id, traj[[id, 1]]);
            assert_eq!(traj[[id, 2]], 0.0);
        }
    }

    #[test]
    fn test_board_definition() {
        let detector = CharucoDetector::new(&CharucoConfig::default()).unwrap();
        assert_eq!(detector.corner_ids().len(), 8);
        assert_eq!(detector.aruco_marker_ids().len(), 7);
        let obj = detector.corner_object_points();
        assert_eq!(obj.row(5).to_vec(), vec![1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_object_points_are_row_major_and_scaled() {
        let config = CharucoConfig {
            squares_x: 4,
            squares_y: 4,
            square_length: 0.05,
            marker_length: 0.04,
            ..Default::default()
        };
        let obj = CharucoDetector::new(&config).unwrap().corner_object_points();
        assert_eq!(obj.dim(), (9, 3));
        // id 1 在第 0 行第 1 列, id 3 在第 1 行第 0 列
        let expected = [(1, [0.05, 0.0]), (3, [0.0, 0.05]), (8, [0.1, 0.1])];
        for (id, [x, y]) in expected {
            assert!((obj[[id, 0]] - x).abs() < 1e-12);
            assert!((obj[[id, 1]] - y).abs() < 1e-12);
            assert_eq!(obj[[id, 2]], 0.0);
        }
    }

    #[test]
    fn test_invalid_board_rejected() {
        let too_small = CharucoConfig {
            squares_x: 1,
            ..Default::default()
        };
        assert!(matches!(
            CharucoDetector::new(&too_small),
            Err(TrackerError::Configuration(_))
        ));

        let too_many_markers = CharucoConfig {
            squares_x: 20,
            squares_y: 20,
            aruco_dictionary: ArucoDictionary::Dict4x4_50,
            ..Default::default()
        };
        assert!(CharucoDetector::new(&too_many_markers).is_err());

        let json = r#"{"squares_x": 7, "aruco_dictionary": "DICT_5X5_100"}"#;
        let config: CharucoConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.squares_y, 3);
        assert_eq!(config.aruco_dictionary.marker_bits(), 5);
    }
}
