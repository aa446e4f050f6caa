// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 多相机动作捕捉轨迹提取
///
/// 主程序入口:
///   cargo run --bin mocap-track -- folder --tracker charuco --input session/videos
///   cargo run --bin mocap-track -- openpose --input session/openpose --hands
///   cargo run --bin mocap-track -- image --tracker brightest_point --input frame.png
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use mocap_tracker::config::{Args, Command};
use mocap_tracker::input::{SourceOpener, StillImageOpener};
use mocap_tracker::pipeline::{process_folder, process_openpose_folder, BatchOptions};
use mocap_tracker::{create_tracker, AnnotatorConfig, TrackerConfig};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

fn opener(stills: bool) -> Box<dyn SourceOpener> {
    #[cfg(feature = "ffmpeg")]
    let opener: Box<dyn SourceOpener> = if stills {
        Box::new(StillImageOpener)
    } else {
        Box::new(mocap_tracker::input::FfmpegOpener)
    };
    #[cfg(not(feature = "ffmpeg"))]
    let opener: Box<dyn SourceOpener> = {
        if !stills {
            tracing::warn!("⚠️ 未启用 ffmpeg feature, 只读取静态图片");
        }
        Box::new(StillImageOpener)
    };
    opener
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Command::Folder {
            tracker,
            input,
            config,
            workers,
            output,
            stills,
        } => {
            let config = TrackerConfig::load(tracker, config.as_deref())
                .context("failed to load tracker configuration")?;
            let options = BatchOptions {
                worker_count: workers,
                output_path: output,
            };
            let opener = opener(stills);
            let combined =
                process_folder(tracker.name(), &config, &input, &options, opener.as_ref())
                    .with_context(|| {
                        format!("batch processing of {} failed", input.display())
                    })?;
            info!("🎉 完成: {:?}", combined.shape());
        }
        Command::Openpose {
            input,
            hands,
            faces,
            workers,
            output,
        } => {
            let options = BatchOptions {
                worker_count: workers,
                output_path: output,
            };
            let combined = process_openpose_folder(&input, hands, faces, &options)
                .with_context(|| format!("OpenPose import of {} failed", input.display()))?;
            info!("🎉 完成: {:?}", combined.shape());
        }
        Command::Image {
            tracker,
            input,
            config,
            output,
        } => {
            let config = TrackerConfig::load(tracker, config.as_deref())
                .context("failed to load tracker configuration")?;
            run_image(tracker, &config, &input, output.as_deref())?;
        }
    }
    Ok(())
}

fn run_image(
    kind: mocap_tracker::TrackerKind,
    config: &TrackerConfig,
    input: &Path,
    output: Option<&Path>,
) -> Result<()> {
    let image = image::open(input).with_context(|| format!("cannot read {}", input.display()))?;
    let annotator = AnnotatorConfig::default();
    let mut tracker = create_tracker(kind, config, Some(&annotator))?;
    let annotated = tracker.process_frame(&image, output.is_some())?;

    if let (Some(path), Some(annotated)) = (output, annotated) {
        annotated
            .save(path)
            .with_context(|| format!("cannot write {}", path.display()))?;
        info!("🖼️ 标注图已保存: {}", path.display());
    }
    if let Some(json) = tracker.latest_observation_json()? {
        println!("{}", json);
    }
    Ok(())
}
