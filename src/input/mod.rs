// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频输入 (Video Input)
///
/// - FrameSource: 有限、有序的帧序列 (帧数 + 帧尺寸)
/// - SourceOpener: 按扩展名识别并打开输入文件
/// - StillImageOpener: 单张图片视为单帧视频
/// - FfmpegOpener: FFmpeg 解码视频文件 (`ffmpeg` feature)
#[cfg(feature = "ffmpeg")]
pub mod decode_filter;
#[cfg(feature = "ffmpeg")]
pub mod decoder;

#[cfg(feature = "ffmpeg")]
pub use decoder::{FfmpegOpener, FfmpegSource};

use std::path::{Path, PathBuf};

use image::DynamicImage;

use crate::error::{Result, TrackerError};
use crate::observation::ImageSize;

/// 一个视频源
pub trait FrameSource: Send {
    /// 声明的总帧数, 未知时为 None
    fn frame_count(&self) -> Option<usize>;

    fn frame_size(&self) -> Option<ImageSize>;

    /// 按帧顺序返回下一帧, 结束时返回 None
    fn next_frame(&mut self) -> Result<Option<DynamicImage>>;
}

/// 按扩展名打开输入文件
pub trait SourceOpener: Send + Sync {
    /// 小写扩展名, 不含点
    fn extensions(&self) -> &[&'static str];

    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>>;

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.extensions().iter().any(|x| *x == e)
            })
            .unwrap_or(false)
    }
}

/// 目录下所有可识别的输入文件, 按文件名排序 (即相机顺序)
pub fn discover_inputs(dir: &Path, opener: &dyn SourceOpener) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(TrackerError::configuration(format!(
            "input directory {} does not exist",
            dir.display()
        )));
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && opener.accepts(&path) {
            files.push(path);
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(files)
}

/// 单张图片 = 单帧视频
#[derive(Debug, Clone, Copy, Default)]
pub struct StillImageOpener;

const STILL_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

impl SourceOpener for StillImageOpener {
    fn extensions(&self) -> &[&'static str] {
        &STILL_EXTENSIONS
    }

    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        let image = image::open(path).map_err(|e| TrackerError::frame_read(path, e.to_string()))?;
        Ok(Box::new(StillImageSource::new(image)))
    }
}

pub struct StillImageSource {
    image: Option<DynamicImage>,
    size: ImageSize,
}

impl StillImageSource {
    pub fn new(image: DynamicImage) -> Self {
        Self {
            size: ImageSize::of(&image),
            image: Some(image),
        }
    }
}

impl FrameSource for StillImageSource {
    fn frame_count(&self) -> Option<usize> {
        Some(1)
    }

    fn frame_size(&self) -> Option<ImageSize> {
        Some(self.size)
    }

    fn next_frame(&mut self) -> Result<Option<DynamicImage>> {
        Ok(self.image.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["cam_b.png", "cam_a.PNG", "notes.txt"] {
            let img = image::RgbImage::new(4, 4);
            if name.ends_with(".txt") {
                std::fs::write(dir.path().join(name), "x").unwrap();
            } else {
                img.save_with_format(dir.path().join(name), image::ImageFormat::Png)
                    .unwrap();
            }
        }
        let files = discover_inputs(dir.path(), &StillImageOpener).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["cam_a.PNG", "cam_b.png"]);
    }

    #[test]
    fn test_still_image_is_single_frame() {
        let mut source = StillImageSource::new(DynamicImage::new_rgb8(3, 2));
        assert_eq!(source.frame_count(), Some(1));
        assert_eq!(source.frame_size(), Some(ImageSize::new(3, 2)));
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn test_missing_directory_is_configuration_error() {
        let err = discover_inputs(Path::new("/definitely/not/here"), &StillImageOpener);
        assert!(matches!(err, Err(TrackerError::Configuration(_))));
    }
}
