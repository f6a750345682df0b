use std::fs::{File, OpenOptions};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use image::codecs::gif::GifEncoder;
use image::{Delay, GrayImage, ImageFormat, Rgba, RgbaImage};

use vidstreamer::{
    analytic_fn, output_fn, AnalyticInvoker, AnalyticRegistry, AnalyticSettings, Frame,
    FrameData, InputFrame, Pipeline, RegionOfInterest, Regions, SourceSpec, StreamError,
};

type Seen = Arc<Mutex<Vec<(u64, FrameData)>>>;

fn recording_output(seen: Seen) -> impl vidstreamer::OutputHandler {
    output_fn(move |_: &Frame, input: &InputFrame, data: &FrameData| {
        seen.lock().unwrap().push((input.frame_num, data.clone()));
        Ok(())
    })
}

#[test]
fn image_file_runs_exactly_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("frame.png");
    GrayImage::new(256, 256)
        .save_with_format(&path, ImageFormat::Png)
        .unwrap();

    let seen: Seen = Arc::default();
    let invoker = AnalyticInvoker::builder()
        .analytic(analytic_fn(|frame: &Frame, _: &InputFrame| {
            assert_eq!(frame.shape(), (256, 256, 1));
            Ok(Regions::new().with(RegionOfInterest::new("Person", 0.506)))
        }))
        .output(recording_output(seen.clone()))
        .build()
        .unwrap();

    let summary = Pipeline::new(&invoker)
        .run_spec(&SourceSpec::Image(path))
        .unwrap();

    assert_eq!(summary.frames_processed, 1);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].0, 0);
    assert_eq!(seen[0].1.roi, vec![RegionOfInterest::new("Person", 0.506)]);
    assert!(seen[0].1.start_time_millis <= seen[0].1.end_time_millis);
}

#[test]
fn gif_video_frames_arrive_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.gif");
    {
        let mut encoder = GifEncoder::new(File::create(&path).unwrap());
        let frames = (0..3u8).map(|i| {
            let buffer = RgbaImage::from_pixel(12, 6, Rgba([0, i * 60, 0, 255]));
            image::Frame::from_parts(buffer, 0, 0, Delay::from_numer_denom_ms(100, 1))
        });
        encoder.encode_frames(frames).unwrap();
    }

    let seen: Seen = Arc::default();
    let invoker = AnalyticInvoker::builder()
        .analytic(analytic_fn(|_: &Frame, _: &InputFrame| Ok(Regions::new())))
        .output(recording_output(seen.clone()))
        .build()
        .unwrap();

    let summary = Pipeline::new(&invoker)
        .run_spec(&SourceSpec::Video(path))
        .unwrap();

    assert_eq!(summary.frames_processed, 3);
    let nums: Vec<u64> = seen.lock().unwrap().iter().map(|(n, _)| *n).collect();
    assert_eq!(nums, vec![0, 1, 2]);
}

#[test]
fn truncated_gif_ends_the_run_without_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cut.gif");
    {
        let mut encoder = GifEncoder::new(File::create(&path).unwrap());
        let mut state = 0x2545_f491u32;
        let frames = (0..5).map(|_| {
            let buffer = RgbaImage::from_fn(32, 32, |_, _| {
                state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                let [r, g, b, _] = state.to_be_bytes();
                Rgba([r, g, b, 255])
            });
            image::Frame::from_parts(buffer, 0, 0, Delay::from_numer_denom_ms(40, 1))
        });
        encoder.encode_frames(frames).unwrap();
    }
    let full_len = std::fs::metadata(&path).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(&path)
        .unwrap()
        .set_len(full_len * 7 / 10)
        .unwrap();

    let seen: Seen = Arc::default();
    let invoker = AnalyticInvoker::builder()
        .analytic(analytic_fn(|_: &Frame, _: &InputFrame| Ok(Regions::new())))
        .output(recording_output(seen.clone()))
        .build()
        .unwrap();

    let summary = Pipeline::new(&invoker)
        .run_spec(&SourceSpec::Video(path))
        .unwrap();

    let nums: Vec<u64> = seen.lock().unwrap().iter().map(|(n, _)| *n).collect();
    assert!(!nums.is_empty() && nums.len() < 5, "decoded {} frames", nums.len());
    assert_eq!(nums, (0..nums.len() as u64).collect::<Vec<_>>());
    assert_eq!(summary.frames_processed, nums.len() as u64);
    assert!(!summary.cancelled);
}

#[test]
fn motion_analytic_flags_changing_stub_frames() {
    let registry = AnalyticRegistry::with_builtins();
    let analytic = registry
        .create("motion", &AnalyticSettings::default())
        .unwrap();

    let seen: Seen = Arc::default();
    let invoker = AnalyticInvoker::builder()
        .analytic_boxed(analytic)
        .output(recording_output(seen.clone()))
        .build()
        .unwrap();

    let spec = SourceSpec::Video(PathBuf::from("stub://clip?frames=4&width=16&height=16"));
    Pipeline::new(&invoker).run_spec(&spec).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    assert!(seen[0].1.roi.is_empty());
    assert!(seen[1..]
        .iter()
        .all(|(_, data)| data.roi.len() == 1 && data.roi[0].classification == "motion"));
}

#[test]
fn building_without_an_analytic_is_not_configured() {
    let result = AnalyticInvoker::builder().build();
    assert!(matches!(result, Err(StreamError::NotConfigured)));
}

#[test]
fn unreadable_video_is_source_unavailable() {
    let invoker = AnalyticInvoker::builder()
        .analytic(analytic_fn(|_: &Frame, _: &InputFrame| Ok(Regions::new())))
        .without_output()
        .build()
        .unwrap();

    let err = Pipeline::new(&invoker)
        .run_spec(&SourceSpec::Video(PathBuf::from("/nonexistent/clip.gif")))
        .unwrap_err();
    assert!(matches!(err, StreamError::SourceUnavailable { .. }));
    assert_eq!(invoker.invocations(), 0);
}
