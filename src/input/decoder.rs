// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频文件解码器 (CPU 软件解码)
/// Video file decoder: one FFmpeg pipeline per file, frames delivered in order
use std::path::{Path, PathBuf};
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Receiver};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::stream_info::{find_video_stream_info, StreamInfo};
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::DynamicImage;
use tracing::{debug, info};

use super::decode_filter::{DecodeFilter, DecoderMessage};
use super::{FrameSource, SourceOpener};
use crate::error::{Result, TrackerError};
use crate::observation::ImageSize;

/// 解码线程与处理线程之间的缓冲帧数
const FRAME_BUFFER: usize = 8;

const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "avi", "mov", "mkv"];

#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegOpener;

impl SourceOpener for FfmpegOpener {
    fn extensions(&self) -> &[&'static str] {
        &VIDEO_EXTENSIONS
    }

    fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(FfmpegSource::open(path)?))
    }
}

pub struct FfmpegSource {
    path: PathBuf,
    frame_count: Option<usize>,
    frame_size: Option<ImageSize>,
    receiver: Receiver<DecoderMessage>,
    handle: Option<JoinHandle<()>>,
    finished: bool,
}

impl FfmpegSource {
    pub fn open(path: &Path) -> Result<Self> {
        let url = path.to_string_lossy().to_string();
        let info = find_video_stream_info(url.as_str())
            .map_err(|e| TrackerError::frame_read(path, format!("probe failed: {e}")))?;
        let (frame_count, frame_size) = match info {
            Some(StreamInfo::Video {
                nb_frames,
                width,
                height,
                ..
            }) => (
                (nb_frames > 0).then_some(nb_frames as usize),
                Some(ImageSize::new(width as u32, height as u32)),
            ),
            _ => return Err(TrackerError::frame_read(path, "no video stream")),
        };
        info!(
            "🎬 打开视频 {} ({:?} 帧, {:?})",
            path.display(),
            frame_count,
            frame_size
        );

        let (sender, receiver) = bounded(FRAME_BUFFER);
        let filter = DecodeFilter::new(sender.clone());
        let handle = std::thread::spawn(move || {
            if let Err(e) = software_decode(&url, filter) {
                let _ = sender.send(DecoderMessage::Error(e));
            }
        });

        Ok(Self {
            path: path.to_path_buf(),
            frame_count,
            frame_size,
            receiver,
            handle: Some(handle),
            finished: false,
        })
    }
}

/// CPU软件解码, 统一转换为 yuv420p 交给过滤器
fn software_decode(url: &str, filter: DecodeFilter) -> std::result::Result<(), String> {
    let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
    let pipe = pipe.filter("decode", Box::new(filter));
    let out = create_null_output().add_frame_pipeline(pipe);

    let ctx = FfmpegContext::builder()
        .input(Input::new(url))
        .filter_descs(["format=yuv420p"].into())
        .output(out)
        .build()
        .map_err(|e| format!("构建失败: {}", e))?;

    let sch = ctx.start().map_err(|e| format!("启动失败: {}", e))?;
    sch.wait().map_err(|e| format!("解码失败: {}", e))?;
    Ok(())
}

impl FrameSource for FfmpegSource {
    fn frame_count(&self) -> Option<usize> {
        self.frame_count
    }

    fn frame_size(&self) -> Option<ImageSize> {
        self.frame_size
    }

    fn next_frame(&mut self) -> Result<Option<DynamicImage>> {
        if self.finished {
            return Ok(None);
        }
        match self.receiver.recv() {
            Ok(DecoderMessage::Frame(image)) => Ok(Some(DynamicImage::ImageRgb8(image))),
            Ok(DecoderMessage::Error(message)) => {
                self.finished = true;
                Err(TrackerError::frame_read(&self.path, message))
            }
            Ok(DecoderMessage::End) | Err(_) => {
                self.finished = true;
                if let Some(handle) = self.handle.take() {
                    let _ = handle.join();
                }
                // uninit 之后才报告的构建/解码错误
                if let Ok(DecoderMessage::Error(message)) = self.receiver.try_recv() {
                    return Err(TrackerError::frame_read(&self.path, message));
                }
                debug!("视频 {} 解码结束", self.path.display());
                Ok(None)
            }
        }
    }
}
