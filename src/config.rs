// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 配置 (Configuration)
//!
//! 追踪器名称 → 配置类型的绑定, 以及命令行参数。所有默认值都是显式的配置值。

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::detection::combo::YoloHolisticComboConfig;
use crate::detection::{
    BrightestPointConfig, CharucoConfig, ColorConfig, HolisticConfig, YoloPoseConfig,
};
use crate::error::{Result, TrackerError};

/// 追踪器变体名称
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[value(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrackerKind {
    Holistic,
    YoloPose,
    YoloHolisticCombo,
    BrightestPoint,
    Charuco,
    Color,
}

impl TrackerKind {
    pub const ALL: [TrackerKind; 6] = [
        TrackerKind::Holistic,
        TrackerKind::YoloPose,
        TrackerKind::YoloHolisticCombo,
        TrackerKind::BrightestPoint,
        TrackerKind::Charuco,
        TrackerKind::Color,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TrackerKind::Holistic => "holistic",
            TrackerKind::YoloPose => "yolo_pose",
            TrackerKind::YoloHolisticCombo => "yolo_holistic_combo",
            TrackerKind::BrightestPoint => "brightest_point",
            TrackerKind::Charuco => "charuco",
            TrackerKind::Color => "color",
        }
    }

    /// 批处理产物的默认文件名
    pub fn output_file_name(&self) -> &'static str {
        match self {
            TrackerKind::Holistic | TrackerKind::YoloHolisticCombo => {
                "holistic2dData_numCams_numFrames_numTrackedPoints_pixelXY.npy"
            }
            TrackerKind::YoloPose => "yolo2dData_numCams_numFrames_numTrackedPoints_pixelXY.npy",
            TrackerKind::BrightestPoint => {
                "brightestPoint2dData_numCams_numFrames_numTrackedPoints_pixelXY.npy"
            }
            TrackerKind::Charuco => "charuco2dData_numCams_numFrames_numTrackedPoints_pixelXY.npy",
            TrackerKind::Color => "color2dData_numCams_numFrames_numTrackedPoints_pixelXY.npy",
        }
    }
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TrackerKind {
    type Err = TrackerError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| {
                let known: Vec<_> = Self::ALL.iter().map(|k| k.name()).collect();
                TrackerError::configuration(format!(
                    "unknown tracker {:?}, expected one of {:?}",
                    s, known
                ))
            })
    }
}

pub const OPENPOSE_OUTPUT_FILE_NAME: &str =
    "openpose2dData_numCams_numFrames_numTrackedPoints_pixelXY.npy";

/// 变体配置, JSON 中以 `"tracker": "<name>"` 标记
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tracker", rename_all = "snake_case")]
pub enum TrackerConfig {
    Holistic(HolisticConfig),
    YoloPose(YoloPoseConfig),
    YoloHolisticCombo(YoloHolisticComboConfig),
    BrightestPoint(BrightestPointConfig),
    Charuco(CharucoConfig),
    Color(ColorConfig),
}

impl TrackerConfig {
    pub fn kind(&self) -> TrackerKind {
        match self {
            TrackerConfig::Holistic(_) => TrackerKind::Holistic,
            TrackerConfig::YoloPose(_) => TrackerKind::YoloPose,
            TrackerConfig::YoloHolisticCombo(_) => TrackerKind::YoloHolisticCombo,
            TrackerConfig::BrightestPoint(_) => TrackerKind::BrightestPoint,
            TrackerConfig::Charuco(_) => TrackerKind::Charuco,
            TrackerConfig::Color(_) => TrackerKind::Color,
        }
    }

    pub fn default_for(kind: TrackerKind) -> Self {
        match kind {
            TrackerKind::Holistic => TrackerConfig::Holistic(HolisticConfig::default()),
            TrackerKind::YoloPose => TrackerConfig::YoloPose(YoloPoseConfig::default()),
            TrackerKind::YoloHolisticCombo => {
                TrackerConfig::YoloHolisticCombo(YoloHolisticComboConfig::default())
            }
            TrackerKind::BrightestPoint => {
                TrackerConfig::BrightestPoint(BrightestPointConfig::default())
            }
            TrackerKind::Charuco => TrackerConfig::Charuco(CharucoConfig::default()),
            TrackerKind::Color => TrackerConfig::Color(ColorConfig::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            TrackerConfig::Holistic(c) => c.validate(),
            TrackerConfig::YoloPose(c) => c.validate(),
            TrackerConfig::YoloHolisticCombo(c) => c.validate(),
            TrackerConfig::BrightestPoint(c) => c.validate(),
            TrackerConfig::Charuco(c) => c.validate(),
            TrackerConfig::Color(c) => c.validate(),
        }
    }

    /// 配置必须属于指定的变体
    pub fn ensure_kind(&self, kind: TrackerKind) -> Result<()> {
        if self.kind() != kind {
            return Err(TrackerError::configuration(format!(
                "tracker {} was given a {} configuration",
                kind,
                self.kind()
            )));
        }
        Ok(())
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| {
            TrackerError::configuration(format!("invalid config {}: {}", path.display(), e))
        })
    }

    /// 读取配置文件, 未指定时使用该变体的默认配置
    pub fn load(kind: TrackerKind, path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(p) => Self::from_json_file(p)?,
            None => Self::default_for(kind),
        };
        config.ensure_kind(kind)?;
        config.validate()?;
        Ok(config)
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "Trajectory extraction for multi-camera motion capture")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// 批量处理视频文件夹 (每个文件一个相机)
    Folder {
        #[arg(long, value_enum)]
        tracker: TrackerKind,

        #[arg(long)]
        input: PathBuf,

        /// JSON 配置文件
        #[arg(long)]
        config: Option<PathBuf>,

        /// 默认 min(CPU - 1, 文件数)
        #[arg(long)]
        workers: Option<usize>,

        /// 默认 <input>/../output_data/raw_data/<name>.npy
        #[arg(long)]
        output: Option<PathBuf>,

        /// 把静态图片当作单帧视频
        #[arg(long)]
        stills: bool,
    },

    /// 导入 OpenPose JSON 结果 (每个子目录一个相机)
    Openpose {
        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        hands: bool,

        #[arg(long)]
        faces: bool,

        #[arg(long)]
        workers: Option<usize>,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// 单张图片: 输出标注图与观测 JSON
    Image {
        #[arg(long, value_enum)]
        tracker: TrackerKind,

        #[arg(long)]
        input: PathBuf,

        #[arg(long)]
        config: Option<PathBuf>,

        /// 标注图路径
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names_round_trip() {
        for kind in TrackerKind::ALL {
            assert_eq!(kind.name().parse::<TrackerKind>().unwrap(), kind);
            assert_eq!(TrackerConfig::default_for(kind).kind(), kind);
        }
        assert!(matches!(
            "mediapipe".parse::<TrackerKind>(),
            Err(TrackerError::Configuration(_))
        ));
    }

    #[test]
    fn test_tagged_config_from_json() {
        let json = r#"{"tracker": "brightest_point", "luminance_threshold": 120}"#;
        let config: TrackerConfig = serde_json::from_str(json).unwrap();
        match &config {
            TrackerConfig::BrightestPoint(c) => {
                assert_eq!(c.luminance_threshold, 120);
                assert_eq!(c.brightness_tolerance, 10);
            }
            other => panic!("unexpected config {:?}", other),
        }
        assert!(config.ensure_kind(TrackerKind::BrightestPoint).is_ok());
        assert!(config.ensure_kind(TrackerKind::Charuco).is_err());
    }

    #[test]
    fn test_color_config_from_json() {
        let json = r#"{"tracker": "color", "lower": [50, 100, 100], "upper": [70, 255, 255]}"#;
        let config: TrackerConfig = serde_json::from_str(json).unwrap();
        match &config {
            TrackerConfig::Color(c) => {
                assert_eq!(c.lower, [50, 100, 100]);
                assert_eq!(c.min_radius, 1.0);
            }
            other => panic!("unexpected config {:?}", other),
        }
        assert!(config.validate().is_ok());
        assert_eq!(
            TrackerKind::Color.output_file_name(),
            "color2dData_numCams_numFrames_numTrackedPoints_pixelXY.npy"
        );
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("charuco.json");
        std::fs::write(&path, r#"{"tracker": "charuco", "squares_x": 1}"#).unwrap();
        assert!(matches!(
            TrackerConfig::load(TrackerKind::Charuco, Some(&path)),
            Err(TrackerError::Configuration(_))
        ));
    }

    #[test]
    fn test_cli_parses_folder_command() {
        let args = Args::parse_from([
            "mocap-track",
            "folder",
            "--tracker",
            "brightest_point",
            "--input",
            "videos",
            "--workers",
            "2",
        ]);
        match args.command {
            Command::Folder {
                tracker, workers, ..
            } => {
                assert_eq!(tracker, TrackerKind::BrightestPoint);
                assert_eq!(workers, Some(2));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
