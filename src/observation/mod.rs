// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 观测结果 (Observation)
//!
//! 每帧检测结果的不可变表示。所有变体都能把自己规整为固定形状的 `(N, 3)` 轨迹数组
//! `(x, y, depth)`, 缺失点为 NaN 而不是被省略; 也能序列化为可经 JSON 往返的字典。

pub mod bright_point;
pub mod charuco;
pub mod color;
pub mod crop;
pub mod holistic;
pub mod pose;

pub use bright_point::BrightPointObservation;
pub use charuco::CharucoObservation;
pub use color::{ColorBlob, ColorObservation};
pub use crop::CropObservation;
pub use holistic::{HolisticLandmarks, HolisticObservation, NormalizedLandmark};
pub use pose::{PersonPose, PoseObservation};

use ndarray::{s, Array2, ArrayView2, ArrayViewD};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, TrackerError};
use crate::schema::TrackedPointSchema;

/// 图像尺寸 (构造后不可变)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn of(image: &image::DynamicImage) -> Self {
        Self::new(image.width(), image.height())
    }
}

/// 单帧检测结果的统一接口
pub trait Observation: Clone + Send + std::fmt::Debug {
    /// 变体的追踪点模式
    fn schema(&self) -> &TrackedPointSchema;

    fn image_size(&self) -> ImageSize;

    /// `(num_tracked_points, 3)`, 未检测到的点整行为 NaN
    fn trajectories(&self) -> Array2<f64>;

    /// 用于压缩/堆叠的固定长度块, 只有点数随帧变化的变体需要覆盖
    fn padded_trajectories(&self) -> Array2<f64> {
        self.trajectories()
    }

    /// 变体特有的附加字段 (检测框 / 亮度 / ...)
    fn extra_fields(&self, _dict: &mut Map<String, Value>) -> Result<()> {
        Ok(())
    }

    /// region 名 → 嵌套数组, 外加 `image_size`
    ///
    /// 整个区域缺失编码为 `null`, 单个缺失点也编码为 `null`;
    /// 有限值与非有限值混合的点无法表示, 返回 `Serialization` 错误。
    fn to_serializable_dict(&self) -> Result<Map<String, Value>> {
        let trajectories = self.trajectories();
        let schema = self.schema();
        let mut dict = Map::new();
        for region in schema.regions() {
            let range = schema.region_range(&region.name).ok_or_else(|| {
                TrackerError::serialization(format!("unknown region {}", region.name))
            })?;
            if range.end > trajectories.nrows() {
                return Err(TrackerError::serialization(format!(
                    "region {} expects rows {:?} but trajectories have {}",
                    region.name,
                    range,
                    trajectories.nrows()
                )));
            }
            let block = trajectories.slice(s![range, ..]);
            dict.insert(region.name.clone(), points_to_json(&region.name, block)?);
        }
        dict.insert("image_size".to_string(), image_size_to_json(self.image_size()));
        self.extra_fields(&mut dict)?;
        Ok(dict)
    }

    fn to_json_string(&self) -> Result<String> {
        let dict = self.to_serializable_dict()?;
        Ok(serde_json::to_string_pretty(&Value::Object(dict))?)
    }

    fn to_json_bytes(&self) -> Result<Vec<u8>> {
        let dict = self.to_serializable_dict()?;
        Ok(serde_json::to_vec(&Value::Object(dict))?)
    }
}

/// 全 NaN 的 `(n, 3)` 块
pub fn nan_block(n: usize) -> Array2<f64> {
    Array2::from_elem((n, 3), f64::NAN)
}

/// 归一化坐标 → 像素坐标: x·w, y·h, z·w
pub fn landmarks_to_array(landmarks: &[NormalizedLandmark], size: ImageSize) -> Array2<f64> {
    let w = size.width as f64;
    let h = size.height as f64;
    let mut out = Array2::zeros((landmarks.len(), 3));
    for (mut row, lm) in out.rows_mut().into_iter().zip(landmarks) {
        row[0] = lm.x as f64 * w;
        row[1] = lm.y as f64 * h;
        row[2] = lm.z as f64 * w;
    }
    out
}

fn image_size_to_json(size: ImageSize) -> Value {
    Value::from(vec![size.width, size.height])
}

/// 把一个区域编码为 JSON
pub fn points_to_json(region: &str, block: ArrayView2<f64>) -> Result<Value> {
    if block.nrows() > 0 && block.iter().all(|v| v.is_nan()) {
        return Ok(Value::Null);
    }
    let mut points = Vec::with_capacity(block.nrows());
    for (i, row) in block.rows().into_iter().enumerate() {
        if row.iter().all(|v| v.is_nan()) {
            points.push(Value::Null);
            continue;
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(TrackerError::serialization(format!(
                "point {} of region {} has non-finite coordinates {:?}",
                i,
                region,
                row.to_vec()
            )));
        }
        let coords = row
            .iter()
            .map(|&v| {
                serde_json::Number::from_f64(v).map(Value::Number).ok_or_else(|| {
                    TrackerError::serialization(format!("cannot encode {} in region {}", v, region))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        points.push(Value::Array(coords));
    }
    Ok(Value::Array(points))
}

/// 解码一个区域; `null` 区域展开为 `expected` 行 NaN
pub fn region_from_json(region: &str, value: &Value, expected: usize) -> Result<Array2<f64>> {
    let points = match value {
        Value::Null => return Ok(nan_block(expected)),
        Value::Array(points) => points,
        other => {
            return Err(TrackerError::serialization(format!(
                "region {} must be an array or null, got {}",
                region, other
            )))
        }
    };
    let mut out = nan_block(points.len());
    for (i, point) in points.iter().enumerate() {
        match point {
            Value::Null => {}
            Value::Array(coords) if coords.len() == 3 => {
                for (j, c) in coords.iter().enumerate() {
                    out[[i, j]] = c.as_f64().ok_or_else(|| {
                        TrackerError::serialization(format!(
                            "coordinate {} of point {} in region {} is not a number",
                            j, i, region
                        ))
                    })?;
                }
            }
            other => {
                return Err(TrackerError::serialization(format!(
                    "point {} in region {} must be [x, y, depth] or null, got {}",
                    i, region, other
                )))
            }
        }
    }
    Ok(out)
}

/// 从序列化字典还原轨迹数组 (按模式中的区域顺序拼接)
pub fn trajectories_from_dict(
    dict: &Map<String, Value>,
    schema: &TrackedPointSchema,
) -> Result<Array2<f64>> {
    let mut blocks = Vec::with_capacity(schema.regions().len());
    for region in schema.regions() {
        let value = dict.get(&region.name).ok_or_else(|| {
            TrackerError::serialization(format!("missing region {}", region.name))
        })?;
        blocks.push(region_from_json(&region.name, value, region.len())?);
    }
    let views: Vec<_> = blocks.iter().map(|b| b.view()).collect();
    Ok(ndarray::concatenate(ndarray::Axis(0), &views)?)
}

pub fn image_size_from_dict(dict: &Map<String, Value>) -> Result<ImageSize> {
    let value = dict
        .get("image_size")
        .ok_or_else(|| TrackerError::serialization("missing image_size"))?;
    let (width, height): (u32, u32) = serde_json::from_value(value.clone())?;
    Ok(ImageSize::new(width, height))
}

/// NaN 位置必须一致, 其余元素差值不超过 `atol`
pub fn trajectories_close(a: &ArrayViewD<f64>, b: &ArrayViewD<f64>, atol: f64) -> bool {
    a.shape() == b.shape()
        && a.iter().zip(b.iter()).all(|(x, y)| {
            (x.is_nan() && y.is_nan()) || (!x.is_nan() && !y.is_nan() && (x - y).abs() <= atol)
        })
}
