use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex as StdMutex};

use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray::Array2;
use ndarray_npy::NpzReader;
use tempfile::TempDir;
use tracing::field::{Field, Visit};
use tracing::{Level, Subscriber};
use tracing_subscriber::{layer::Context, layer::SubscriberExt, Layer, Registry};

use cellseg_rs::{
    mocks::MockSegmentationModel, CellSegError, ChannelOutcome, Config, ManifestProcessor,
    RunSummary,
};

const HEADER: &str =
    "ImageNumber,Image_FileName_DAPI,Image_PathName_DAPI,Image_FileName_Actin,Image_PathName_Actin";

#[derive(Clone, Debug)]
struct CapturedEvent {
    level: Level,
    message: String,
}

#[derive(Clone, Default)]
struct RecordingLayer {
    events: Arc<StdMutex<Vec<CapturedEvent>>>,
}

impl RecordingLayer {
    fn at(&self, level: Level) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.level == level)
            .map(|e| e.message.clone())
            .collect()
    }
}

struct MessageVisitor<'a> {
    message: &'a mut String,
}

impl Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            *self.message = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for RecordingLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        event.record(&mut MessageVisitor {
            message: &mut message,
        });
        self.events.lock().unwrap().push(CapturedEvent {
            level: *event.metadata().level(),
            message,
        });
    }
}

/// Runs the processor with a recording subscriber installed for the current thread.
fn run_recorded(
    processor: &ManifestProcessor<MockSegmentationModel>,
) -> (cellseg_rs::Result<RunSummary>, RecordingLayer) {
    let layer = RecordingLayer::default();
    let subscriber = Registry::default().with(layer.clone());
    let result = tracing::subscriber::with_default(subscriber, || processor.run());
    (result, layer)
}

fn read_masks(path: &Path) -> Array2<u32> {
    let mut npz = NpzReader::new(fs::File::open(path).unwrap()).unwrap();
    npz.by_name("masks.npy")
        .or_else(|_| npz.by_name("masks"))
        .unwrap()
}

fn write_gray(path: &Path, value: u8) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    GrayImage::from_pixel(16, 12, Luma([value])).save(path).unwrap();
}

struct Fixture {
    _temp_dir: TempDir,
    data_dir: std::path::PathBuf,
    output_dir: std::path::PathBuf,
    manifest: std::path::PathBuf,
}

/// Row 1 has both channels; row 2 only DAPI, with its Actin columns empty/NaN.
fn two_row_fixture() -> Fixture {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    let output_dir = temp_dir.path().join("outputs");

    write_gray(&data_dir.join("Week1/plate1/r1_w1.png"), 220);
    write_gray(&data_dir.join("Week1/plate1/r1_w2.png"), 40);
    write_gray(&data_dir.join("Week1/plate2/r2_w1.png"), 180);

    let manifest = temp_dir.path().join("manifest.csv");
    fs::write(
        &manifest,
        format!(
            "{HEADER}\n\
             1,r1_w1.png,Week1/plate1,r1_w2.png,Week1/plate1\n\
             2,r2_w1.png,Week1/plate2,NaN,\n"
        ),
    )
    .unwrap();

    Fixture {
        _temp_dir: temp_dir,
        data_dir,
        output_dir,
        manifest,
    }
}

#[test]
fn test_two_row_manifest_end_to_end() {
    let fixture = two_row_fixture();
    let config = Config::new(&fixture.manifest, &fixture.data_dir, "model.onnx")
        .with_output_dir(&fixture.output_dir);
    let processor = ManifestProcessor::new(MockSegmentationModel::new(), config);

    let (result, log) = run_recorded(&processor);
    let summary = result.unwrap();

    assert_eq!(summary.rows, 2);
    assert_eq!(summary.saved, 3);
    assert_eq!(summary.missing_metadata, 1);
    assert!(summary.is_clean());
    assert_eq!(processor.model().calls(), 3);

    for stem in ["r1_w1", "r1_w2", "r2_w1"] {
        let artifact = fixture.output_dir.join(format!("{stem}_seg.npz"));
        assert!(artifact.exists(), "missing artifact: {:?}", artifact);
    }
    assert_eq!(fs::read_dir(&fixture.output_dir).unwrap().count(), 3);

    let warnings = log.at(Level::WARN);
    assert_eq!(warnings, vec!["Row 2: Missing Actin filename or path.".to_string()]);
    assert!(log.at(Level::ERROR).is_empty());
}

#[test]
fn test_missing_manifest_is_fatal_without_inference() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::new(temp_dir.path().join("absent.csv"), temp_dir.path(), "model.onnx")
        .with_output_dir(temp_dir.path().join("outputs"));
    let processor = ManifestProcessor::new(MockSegmentationModel::new(), config);

    let (result, log) = run_recorded(&processor);

    assert!(matches!(result, Err(CellSegError::Manifest { .. })));
    assert_eq!(processor.model().calls(), 0);
    assert_eq!(log.at(Level::ERROR).len(), 1);
    assert!(!temp_dir.path().join("outputs").exists());
}

#[test]
fn test_missing_image_file_is_skipped_with_warning() {
    let fixture = two_row_fixture();
    fs::remove_file(fixture.data_dir.join("Week1/plate1/r1_w2.png")).unwrap();

    let config = Config::new(&fixture.manifest, &fixture.data_dir, "model.onnx")
        .with_output_dir(&fixture.output_dir);
    let processor = ManifestProcessor::new(MockSegmentationModel::new(), config);

    let (result, log) = run_recorded(&processor);
    let summary = result.unwrap();

    assert_eq!(summary.saved, 2);
    assert_eq!(summary.missing_files, 1);
    assert_eq!(processor.model().calls(), 2);
    assert!(log
        .at(Level::WARN)
        .iter()
        .any(|w| w.starts_with("Image file not found, skipping") && w.ends_with("r1_w2.png")));
}

#[test]
fn test_multichannel_image_uses_first_slice() {
    let temp_dir = TempDir::new().unwrap();
    let data_dir = temp_dir.path().join("data");
    fs::create_dir_all(&data_dir).unwrap();
    RgbImage::from_pixel(10, 7, Rgb([255, 0, 0]))
        .save(data_dir.join("stack.png"))
        .unwrap();

    let manifest = temp_dir.path().join("manifest.csv");
    fs::write(
        &manifest,
        "Image_FileName_DAPI,Image_PathName_DAPI\nstack.png,.\n",
    )
    .unwrap();

    let config = Config::new(&manifest, &data_dir, "model.onnx")
        .with_output_dir(temp_dir.path().join("outputs"))
        .with_channels(vec![cellseg_rs::ChannelSpec::new("DAPI")]);
    let processor = ManifestProcessor::new(MockSegmentationModel::new(), config);

    let (result, log) = run_recorded(&processor);

    assert_eq!(result.unwrap().saved, 1);
    assert_eq!(processor.model().shapes(), vec![(7, 10)]);
    assert!(log
        .at(Level::WARN)
        .iter()
        .any(|w| w.contains("stack.png has 3 dimensions")));
}

#[test]
fn test_rerun_overwrites_artifacts() {
    let fixture = two_row_fixture();
    let config = Config::new(&fixture.manifest, &fixture.data_dir, "model.onnx")
        .with_output_dir(&fixture.output_dir);
    let processor = ManifestProcessor::new(MockSegmentationModel::new(), config);

    let first = processor.run().unwrap();
    let artifact = fixture.output_dir.join("r1_w1_seg.npz");
    let first_masks = read_masks(&artifact);

    let second = processor.run().unwrap();

    assert_eq!(first, second);
    assert_eq!(read_masks(&artifact), first_masks);
    assert_eq!(fs::read_dir(&fixture.output_dir).unwrap().count(), 3);
}

#[test]
fn test_artifacts_land_beside_inputs_without_output_dir() {
    let fixture = two_row_fixture();
    let config = Config::new(&fixture.manifest, &fixture.data_dir, "model.onnx");
    let processor = ManifestProcessor::new(MockSegmentationModel::new(), config);

    let summary = processor.run().unwrap();

    assert_eq!(summary.saved, 3);
    assert!(fixture.data_dir.join("Week1/plate1/r1_w1_seg.npz").exists());
    assert!(fixture.data_dir.join("Week1/plate1/r1_w2_seg.npz").exists());
    assert!(fixture.data_dir.join("Week1/plate2/r2_w1_seg.npz").exists());
    assert!(!fixture.output_dir.exists());
}

#[test]
fn test_failing_model_does_not_abort_run() {
    let fixture = two_row_fixture();
    let config = Config::new(&fixture.manifest, &fixture.data_dir, "model.onnx")
        .with_output_dir(&fixture.output_dir);
    let processor = ManifestProcessor::new(MockSegmentationModel::failing(), config);

    let (result, log) = run_recorded(&processor);
    let summary = result.unwrap();

    assert_eq!(summary.failed, 3);
    assert_eq!(summary.saved, 0);
    assert_eq!(processor.model().calls(), 3);
    assert_eq!(log.at(Level::ERROR).len(), 3);
    assert_eq!(fs::read_dir(&fixture.output_dir).unwrap().count(), 0);
}

#[test]
fn test_process_record_reports_each_channel() {
    let fixture = two_row_fixture();
    let config = Config::new(&fixture.manifest, &fixture.data_dir, "model.onnx")
        .with_output_dir(&fixture.output_dir);
    let processor = ManifestProcessor::new(MockSegmentationModel::new(), config);
    let manifest = cellseg_rs::Manifest::from_path(&fixture.manifest, b',').unwrap();

    let outcomes = processor.process_record(&manifest.records()[1]);

    assert_eq!(
        outcomes,
        vec![
            ChannelOutcome::Saved(fixture.output_dir.join("r2_w1_seg.npz")),
            ChannelOutcome::MissingMetadata,
        ]
    );
}

#[test]
fn test_short_row_is_skipped_per_channel_not_fatal() {
    let fixture = two_row_fixture();
    fs::write(
        &fixture.manifest,
        format!(
            "{HEADER}\n\
             1,r1_w1.png,Week1/plate1,r1_w2.png,Week1/plate1\n\
             2,r2_w1.png,Week1/plate2\n"
        ),
    )
    .unwrap();

    let config = Config::new(&fixture.manifest, &fixture.data_dir, "model.onnx")
        .with_output_dir(&fixture.output_dir);
    let (processor, manifest) =
        ManifestProcessor::load(config, |_| Ok(MockSegmentationModel::new())).unwrap();

    let layer = RecordingLayer::default();
    let subscriber = Registry::default().with(layer.clone());
    let summary = tracing::subscriber::with_default(subscriber, || {
        processor.run_manifest(&manifest)
    })
    .unwrap();

    assert_eq!(summary.saved, 3);
    assert_eq!(summary.missing_metadata, 1);
    assert_eq!(
        layer.at(Level::WARN),
        vec!["Row 2: Missing Actin filename or path.".to_string()]
    );
}
