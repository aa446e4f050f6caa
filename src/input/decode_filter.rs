// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// FFmpeg解码过滤器: 视频文件 → RGB帧
/// FFmpeg decode filter: YUV420P frames → RGB images pushed into a bounded channel
use crossbeam_channel::Sender;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;
use tracing::{debug, warn};

/// 解码线程 → 处理线程
pub enum DecoderMessage {
    Frame(RgbImage),
    End,
    Error(String),
}

#[derive(Clone)]
pub struct DecodeFilter {
    sender: Sender<DecoderMessage>,
    pub total_frames: usize,
    pub dropped_frames: usize,
}

impl DecodeFilter {
    pub fn new(sender: Sender<DecoderMessage>) -> Self {
        Self {
            sender,
            total_frames: 0,
            dropped_frames: 0,
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        debug!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        self.total_frames += 1;

        // 空帧/损坏帧直接丢弃, 由帧数校验发现
        if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
            self.dropped_frames += 1;
            warn!("⚠️ 丢弃帧 #{}: 空帧/损坏帧", self.total_frames);
            return Ok(None);
        }

        let image = unsafe {
            let raw = &*frame.as_ptr();
            let w = raw.width as usize;
            let h = raw.height as usize;
            let y_plane = raw.data[0];
            let u_plane = raw.data[1];
            let v_plane = raw.data[2];
            let y_stride = raw.linesize[0] as usize;
            let uv_stride = raw.linesize[1] as usize;

            if w == 0
                || h == 0
                || y_plane.is_null()
                || u_plane.is_null()
                || v_plane.is_null()
                || y_stride < w
                || uv_stride < w / 2
            {
                self.dropped_frames += 1;
                warn!("⚠️ 丢弃帧 #{}: 非法帧布局 {}x{}", self.total_frames, w, h);
                return Ok(None);
            }

            let mut buffer = vec![0u8; w * h * 3];
            yuv420p_to_rgb_scalar(
                y_plane, u_plane, v_plane, y_stride, uv_stride, &mut buffer, w, h,
            );
            RgbImage::from_raw(w as u32, h as u32, buffer)
        };

        let Some(image) = image else {
            return Err("RGB buffer size mismatch".to_string());
        };
        // 接收端已关闭 (批处理中止), 停止解码
        self.sender
            .send(DecoderMessage::Frame(image))
            .map_err(|_| "frame receiver closed".to_string())?;
        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        debug!(
            "✅ 解码线程退出: 共 {} 帧, 丢弃 {}",
            self.total_frames, self.dropped_frames
        );
        let _ = self.sender.send(DecoderMessage::End);
    }
}

/// BT.601 YUV420P → RGB (定点)
#[inline]
#[allow(clippy::too_many_arguments)]
unsafe fn yuv420p_to_rgb_scalar(
    y_plane: *const u8,
    u_plane: *const u8,
    v_plane: *const u8,
    y_stride: usize,
    uv_stride: usize,
    buffer: &mut [u8],
    width: usize,
    height: usize,
) {
    let mut out_idx = 0;
    for y in 0..height {
        let y_row = y * y_stride;
        let uv_row = (y >> 1) * uv_stride;

        for x in 0..width {
            let y_val = *y_plane.add(y_row + x) as i32;
            let u_val = *u_plane.add(uv_row + (x >> 1)) as i32 - 128;
            let v_val = *v_plane.add(uv_row + (x >> 1)) as i32 - 128;

            buffer[out_idx] = (y_val + ((v_val * 179) >> 7)).clamp(0, 255) as u8;
            buffer[out_idx + 1] =
                (y_val - ((u_val * 44) >> 7) - ((v_val * 91) >> 7)).clamp(0, 255) as u8;
            buffer[out_idx + 2] = (y_val + ((u_val * 227) >> 7)).clamp(0, 255) as u8;
            out_idx += 3;
        }
    }
}
