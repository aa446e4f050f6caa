// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 像素坐标下的关键点与人体框

/// 像素坐标关键点, `confidence` 的含义由检测器决定
#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct Point2 {
    x: f32,
    y: f32,
    confidence: f32,
}

impl Point2 {
    pub fn new_with_conf(x: f32, y: f32, confidence: f32) -> Self {
        Self { x, y, confidence }
    }

    pub fn new(x: f32, y: f32) -> Self {
        Self::new_with_conf(x, y, 0.0)
    }

    pub fn x(&self) -> f32 {
        self.x
    }

    pub fn y(&self) -> f32 {
        self.y
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }
}

/// 左上角 + 宽高, 只有一个类别 (人), 因此不带类别 id
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bbox {
    xmin: f32,
    ymin: f32,
    width: f32,
    height: f32,
    confidence: f32,
}

impl Bbox {
    pub fn new_from_xywh(xmin: f32, ymin: f32, width: f32, height: f32) -> Self {
        Self::new(xmin, ymin, width, height, 0.0)
    }

    pub fn new(xmin: f32, ymin: f32, width: f32, height: f32, confidence: f32) -> Self {
        Self {
            xmin,
            ymin,
            width,
            height,
            confidence,
        }
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    pub fn xmin(&self) -> f32 {
        self.xmin
    }

    pub fn ymin(&self) -> f32 {
        self.ymin
    }

    pub fn xmax(&self) -> f32 {
        self.xmin + self.width
    }

    pub fn ymax(&self) -> f32 {
        self.ymin + self.height
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    fn overlap(&self, other: &Bbox) -> f32 {
        let w = self.xmax().min(other.xmax()) - self.xmin.max(other.xmin);
        let h = self.ymax().min(other.ymax()) - self.ymin.max(other.ymin);
        w.max(0.0) * h.max(0.0)
    }

    /// 两框均为空时为 0
    pub fn iou(&self, other: &Bbox) -> f32 {
        let inter = self.overlap(other);
        let union = self.area() + other.area() - inter;
        if union > 0.0 {
            inter / union
        } else {
            0.0
        }
    }

    /// 按比例向四周扩展, 并裁剪到图像范围内 (返回整数像素框)
    ///
    /// 框完全落在图像外时返回 `None`。
    pub fn padded_within(&self, padding: f32, image_width: u32, image_height: u32) -> Option<Bbox> {
        let pad_x = self.width * padding;
        let pad_y = self.height * padding;
        let x1 = (self.xmin - pad_x).floor().max(0.0);
        let y1 = (self.ymin - pad_y).floor().max(0.0);
        let x2 = (self.xmax() + pad_x).ceil().min(image_width as f32);
        let y2 = (self.ymax() + pad_y).ceil().min(image_height as f32);
        if x2 - x1 < 1.0 || y2 - y1 < 1.0 {
            return None;
        }
        Some(Bbox::new(x1, y1, x2 - x1, y2 - y1, self.confidence))
    }
}

/// 非极大值抑制: 按置信度降序, 丢弃与已保留框 IoU 超过阈值的框
pub fn non_max_suppression<T>(xs: &mut Vec<(Bbox, T)>, iou_threshold: f32) {
    xs.sort_by(|a, b| b.0.confidence().total_cmp(&a.0.confidence()));
    let mut kept: Vec<Bbox> = Vec::with_capacity(xs.len());
    xs.retain(|(bbox, _)| {
        let keep = kept.iter().all(|k| k.iou(bbox) <= iou_threshold);
        if keep {
            kept.push(*bbox);
        }
        keep
    });
}
