use image::{GrayImage, ImageBuffer, Luma};
use stbt_logging::errors::StbtError;
use stbt_logging::frame::{BgrFrame, Heatmap};
use stbt_logging::image_logger::{ImageLogger, MetadataValue};
use stbt_logging::runtime::{DebugRuntime, FakeErrorStream, ProductionFileSystem};
use stbt_logging::verbosity::with_debug_level;
use std::path::Path;
use std::sync::Arc;

const NO_METADATA: [(&str, MetadataValue); 0] = [];

fn runtime_in(root: &Path) -> (DebugRuntime, FakeErrorStream) {
    let errors = FakeErrorStream::new();
    let runtime = DebugRuntime {
        file_system: Arc::new(ProductionFileSystem),
        error_stream: Arc::new(errors.clone()),
        debug_root: root.join("stbt-debug"),
    };
    (runtime, errors)
}

#[test]
fn match_scenario_lays_out_files_by_frame_and_level() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (runtime, errors) = runtime_in(temp.path());

    with_debug_level(2, || {
        let mut logger = ImageLogger::with_runtime(
            &runtime,
            "match",
            [("template", MetadataValue::from("button.png"))],
        )
        .expect("logger");
        let frame = logger.frame_number().expect("enabled");
        let outdir = temp
            .path()
            .join("stbt-debug/match")
            .join(format!("{frame:05}"));
        assert_eq!(logger.outdir(), Some(outdir.as_path()));

        let source = BgrFrame {
            width: 2,
            height: 1,
            data: vec![0, 0, 255, 255, 0, 0],
        };
        logger.imwrite("source", &source, None).expect("source");
        logger
            .imwrite("diff", &GrayImage::new(2, 2), Some(1))
            .expect("diff");

        let decoded = image::open(outdir.join("source.png"))
            .expect("source png")
            .to_rgb8();
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 0, 0]);
        assert_eq!(decoded.get_pixel(1, 0).0, [0, 0, 255]);
        assert!(outdir.join("level1-diff.png").is_file());
    });
    assert!(errors.lines().is_empty());
}

#[test]
fn heatmap_file_spans_full_eight_bit_range() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (runtime, _errors) = runtime_in(temp.path());

    with_debug_level(2, || {
        let mut logger =
            ImageLogger::with_runtime(&runtime, "match", NO_METADATA).expect("logger");
        let heatmap: Heatmap = ImageBuffer::from_fn(11, 1, |x, _| Luma([x as f32 / 10.0]));
        logger.imwrite("heatmap", &heatmap, Some(0)).expect("write");

        let path = logger
            .outdir()
            .expect("outdir")
            .join("level0-heatmap.png");
        let decoded = image::open(path).expect("png").to_luma8();
        let values = decoded.as_raw();
        assert_eq!(values.first(), Some(&0));
        assert_eq!(values.last(), Some(&255));
        assert!(values.windows(2).all(|pair| pair[0] <= pair[1]));
    });
}

#[test]
fn file_squatting_on_name_disables_logger() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (runtime, errors) = runtime_in(temp.path());
    std::fs::create_dir_all(temp.path().join("stbt-debug")).expect("root");
    std::fs::write(temp.path().join("stbt-debug/motion"), b"file").expect("blocker");

    with_debug_level(2, || {
        let mut logger =
            ImageLogger::with_runtime(&runtime, "motion", NO_METADATA).expect("logger");
        assert!(!logger.enabled());
        logger.set([("matched", false)]);
        logger
            .imwrite("source", &GrayImage::new(1, 1), None)
            .expect("no-op");
        assert_eq!(logger.write_manifest().expect("no-op"), None);
    });

    let warnings = errors
        .lines()
        .into_iter()
        .filter(|line| line.contains(": warning: Failed to create directory '"))
        .collect::<Vec<_>>();
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("stbt-debug/motion/"));
    assert!(std::fs::metadata(temp.path().join("stbt-debug/motion"))
        .expect("blocker")
        .is_file());
}

#[test]
fn quiet_levels_leave_disk_untouched() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (runtime, _errors) = runtime_in(temp.path());

    for level in [0u32, 1] {
        with_debug_level(level, || {
            let mut logger =
                ImageLogger::with_runtime(&runtime, "match", NO_METADATA).expect("logger");
            logger
                .imwrite("source", &GrayImage::new(1, 1), None)
                .expect("no-op");
        });
    }
    assert!(!temp.path().join("stbt-debug").exists());
}

#[test]
fn duplicate_name_is_reported_to_caller() {
    let temp = tempfile::tempdir().expect("tempdir");
    let (runtime, _errors) = runtime_in(temp.path());

    with_debug_level(2, || {
        let mut logger =
            ImageLogger::with_runtime(&runtime, "match", NO_METADATA).expect("logger");
        logger
            .imwrite("source", &GrayImage::new(1, 1), None)
            .expect("first");
        let err = logger
            .imwrite("source", &GrayImage::new(1, 1), None)
            .expect_err("duplicate");
        assert!(matches!(err, StbtError::DuplicateArtifact(_)));
        assert_eq!(err.to_string(), "Image for name 'source' already logged");
    });
}
