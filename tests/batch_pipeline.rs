// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

use std::path::Path;

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use ndarray::{s, Array4};

use mocap_tracker::detection::BrightestPointConfig;
use mocap_tracker::input::{FrameSource, SourceOpener};
use mocap_tracker::observation::{trajectories_close, ImageSize};
use mocap_tracker::pipeline::{process_folder, process_openpose_folder, BatchOptions};
use mocap_tracker::{StillImageOpener, TrackerConfig, TrackerError};

fn write_bright_frame(dir: &Path, name: &str, x: i32, y: i32) {
    let mut img = RgbImage::from_pixel(120, 80, Rgb([10, 10, 10]));
    draw_filled_circle_mut(&mut img, (x, y), 3, Rgb([255, 255, 255]));
    img.save(dir.join(name)).unwrap();
}

fn bright_config() -> TrackerConfig {
    TrackerConfig::BrightestPoint(BrightestPointConfig::default())
}

fn options(workers: usize, output: &Path) -> BatchOptions {
    BatchOptions {
        worker_count: Some(workers),
        output_path: Some(output.to_path_buf()),
    }
}

#[test]
fn test_brightest_point_folder_stacks_cameras() {
    let root = tempfile::tempdir().unwrap();
    let videos = root.path().join("videos");
    std::fs::create_dir(&videos).unwrap();
    write_bright_frame(&videos, "cam_2.png", 90, 60);
    write_bright_frame(&videos, "cam_0.png", 20, 15);
    write_bright_frame(&videos, "cam_1.png", 50, 40);

    let output = root.path().join("out").join("bright.npy");
    let combined = process_folder(
        "brightest_point",
        &bright_config(),
        &videos,
        &options(2, &output),
        &StillImageOpener,
    )
    .unwrap();

    assert_eq!(combined.shape(), &[3, 1, 1, 3]);
    // 相机顺序 = 文件名顺序
    for (camera, (x, y)) in [(20.0, 15.0), (50.0, 40.0), (90.0, 60.0)].iter().enumerate() {
        assert!((combined[[camera, 0, 0, 0]] - x).abs() <= 1.0);
        assert!((combined[[camera, 0, 0, 1]] - y).abs() <= 1.0);
    }

    let saved: Array4<f64> = ndarray_npy::read_npy(&output).unwrap();
    assert!(trajectories_close(
        &saved.view().into_dyn(),
        &combined.view().into_dyn(),
        0.0
    ));
}

#[test]
fn test_default_output_lands_next_to_input() {
    let root = tempfile::tempdir().unwrap();
    let videos = root.path().join("videos");
    std::fs::create_dir(&videos).unwrap();
    write_bright_frame(&videos, "a.png", 30, 30);

    let opts = BatchOptions {
        worker_count: Some(1),
        output_path: None,
    };
    process_folder("brightest_point", &bright_config(), &videos, &opts, &StillImageOpener).unwrap();

    let expected = root
        .path()
        .join("output_data")
        .join("raw_data")
        .join("brightestPoint2dData_numCams_numFrames_numTrackedPoints_pixelXY.npy");
    assert!(expected.is_file());
}

#[test]
fn test_sequential_and_parallel_results_match() {
    let root = tempfile::tempdir().unwrap();
    let videos = root.path().join("videos");
    std::fs::create_dir(&videos).unwrap();
    for i in 0..5 {
        write_bright_frame(&videos, &format!("cam_{i}.png"), 10 + 20 * i, 20 + 5 * i);
    }
    // 一个全暗相机, 结果为 NaN
    RgbImage::from_pixel(120, 80, Rgb([0, 0, 0]))
        .save(videos.join("cam_5.png"))
        .unwrap();

    let seq = process_folder(
        "brightest_point",
        &bright_config(),
        &videos,
        &options(1, &root.path().join("seq.npy")),
        &StillImageOpener,
    )
    .unwrap();
    let par = process_folder(
        "brightest_point",
        &bright_config(),
        &videos,
        &options(4, &root.path().join("par.npy")),
        &StillImageOpener,
    )
    .unwrap();

    assert_eq!(seq.shape(), &[6, 1, 1, 3]);
    assert!(seq.slice(s![5, .., .., ..]).iter().all(|v| v.is_nan()));
    assert!(trajectories_close(
        &seq.view().into_dyn(),
        &par.view().into_dyn(),
        0.0
    ));
}

#[test]
fn test_empty_folder_is_configuration_error() {
    let root = tempfile::tempdir().unwrap();
    let videos = root.path().join("videos");
    std::fs::create_dir(&videos).unwrap();
    std::fs::write(videos.join("readme.txt"), "no videos here").unwrap();

    let result = process_folder(
        "brightest_point",
        &bright_config(),
        &videos,
        &options(2, &root.path().join("out.npy")),
        &StillImageOpener,
    );
    assert!(matches!(result, Err(TrackerError::Configuration(_))));
}

#[test]
fn test_unknown_tracker_name_is_configuration_error() {
    let root = tempfile::tempdir().unwrap();
    let result = process_folder(
        "mediapipe",
        &bright_config(),
        root.path(),
        &options(1, &root.path().join("out.npy")),
        &StillImageOpener,
    );
    assert!(matches!(result, Err(TrackerError::Configuration(_))));
}

/// 声明 3 帧, 实际只产出 2 帧
struct ShortSource {
    remaining: usize,
}

impl FrameSource for ShortSource {
    fn frame_count(&self) -> Option<usize> {
        Some(3)
    }

    fn frame_size(&self) -> Option<ImageSize> {
        Some(ImageSize::new(32, 32))
    }

    fn next_frame(&mut self) -> mocap_tracker::Result<Option<DynamicImage>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        Ok(Some(DynamicImage::new_rgb8(32, 32)))
    }
}

struct ShortOpener;

impl SourceOpener for ShortOpener {
    fn extensions(&self) -> &[&'static str] {
        &["raw"]
    }

    fn open(&self, _path: &Path) -> mocap_tracker::Result<Box<dyn FrameSource>> {
        Ok(Box::new(ShortSource { remaining: 2 }))
    }
}

#[test]
fn test_truncated_source_aborts_batch() {
    let root = tempfile::tempdir().unwrap();
    let videos = root.path().join("videos");
    std::fs::create_dir(&videos).unwrap();
    for name in ["cam_0.raw", "cam_1.raw"] {
        std::fs::write(videos.join(name), b"frames").unwrap();
    }

    let output = root.path().join("short.npy");
    let result = process_folder(
        "brightest_point",
        &bright_config(),
        &videos,
        &options(2, &output),
        &ShortOpener,
    );
    match result {
        Err(TrackerError::FrameRead { message, .. }) => {
            assert!(message.contains("2 of 3"), "unexpected message {message}");
        }
        other => panic!("expected a frame read error, got {:?}", other.map(|a| a.dim())),
    }
    assert!(!output.exists());
}

#[test]
fn test_unreadable_image_aborts_batch() {
    let root = tempfile::tempdir().unwrap();
    let videos = root.path().join("videos");
    std::fs::create_dir(&videos).unwrap();
    write_bright_frame(&videos, "cam_0.png", 20, 20);
    std::fs::write(videos.join("cam_1.png"), b"definitely not a png").unwrap();
    write_bright_frame(&videos, "cam_2.png", 40, 40);

    let output = root.path().join("corrupt.npy");
    let result = process_folder(
        "brightest_point",
        &bright_config(),
        &videos,
        &options(3, &output),
        &StillImageOpener,
    );
    assert!(matches!(result, Err(TrackerError::FrameRead { .. })));
    assert!(!output.exists());
}

fn write_openpose_frame(dir: &Path, index: u64, body: &str) {
    let name = format!("video_{:012}_keypoints.json", index);
    std::fs::write(dir.join(name), body).unwrap();
}

fn openpose_person(x: f64) -> String {
    let triples = (0..25)
        .map(|i| format!("{}, {}, 0.8", x + i as f64, 5.0))
        .collect::<Vec<_>>()
        .join(", ");
    format!("{{\"people\": [{{\"pose_keypoints_2d\": [{}]}}]}}", triples)
}

#[test]
fn test_openpose_folder_with_empty_frame() {
    let root = tempfile::tempdir().unwrap();
    let openpose = root.path().join("openpose");
    for camera in ["cam_0", "cam_1"] {
        let dir = openpose.join(camera);
        std::fs::create_dir_all(&dir).unwrap();
        for index in 0..10 {
            let body = if index == 4 {
                r#"{"version": 1.3, "people": []}"#.to_string()
            } else {
                openpose_person(index as f64 * 100.0)
            };
            write_openpose_frame(&dir, index, &body);
        }
    }

    let output = root.path().join("openpose.npy");
    let combined = process_openpose_folder(&openpose, false, false, &options(2, &output)).unwrap();

    assert_eq!(combined.shape(), &[2, 10, 25, 3]);
    assert!(combined.slice(s![.., 4, .., ..]).iter().all(|v| v.is_nan()));
    assert_eq!(combined[[0, 9, 0, 0]], 900.0);
    assert_eq!(combined[[1, 3, 2, 0]], 302.0);
    assert_eq!(combined[[1, 3, 2, 2]], 0.8);
    assert!(output.is_file());
}

#[test]
fn test_openpose_frame_count_mismatch_is_shape_error() {
    let root = tempfile::tempdir().unwrap();
    let openpose = root.path().join("openpose");
    for (camera, frames) in [("cam_0", 3), ("cam_1", 2)] {
        let dir = openpose.join(camera);
        std::fs::create_dir_all(&dir).unwrap();
        for index in 0..frames {
            write_openpose_frame(&dir, index, &openpose_person(1.0));
        }
    }

    let result = process_openpose_folder(
        &openpose,
        false,
        false,
        &options(1, &root.path().join("out.npy")),
    );
    match result {
        Err(TrackerError::ShapeMismatch { camera, .. }) => assert_eq!(camera, 1),
        other => panic!("expected shape mismatch, got {:?}", other.map(|a| a.dim())),
    }
}
