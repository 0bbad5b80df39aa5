use anyhow::Result;
use epaper_photo_frame::capabilities::Capabilities;
use epaper_photo_frame::catalog::{Catalog, CompositeCatalog, LocalCatalog, SelectionMode, Selector};
use epaper_photo_frame::config::{Configuration, ProcessingOptions};
use epaper_photo_frame::platform::display::{
    DisplayController, EpaperPanel, PanelProbe, RefreshMode, RetryPolicy,
};
use epaper_photo_frame::processing::{PhotoProcessor, ProcessingSettings};
use epaper_photo_frame::tasks::frame::{self, CycleOutcome, Frame, FrameSettings};
use image::{Rgb, RgbImage};
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

const W: u32 = 40;
const H: u32 = 30;

struct RecordingPanel {
    shows: Arc<Mutex<Vec<RefreshMode>>>,
}

impl EpaperPanel for RecordingPanel {
    fn width(&self) -> u32 {
        W
    }
    fn height(&self) -> u32 {
        H
    }
    fn set_image(&mut self, image: &RgbImage, _saturation: f32) -> Result<()> {
        assert_eq!(image.dimensions(), (W, H));
        Ok(())
    }
    fn show(&mut self, mode: RefreshMode) -> Result<()> {
        self.shows.lock().unwrap().push(mode);
        Ok(())
    }
}

fn display(shows: &Arc<Mutex<Vec<RefreshMode>>>) -> Arc<DisplayController> {
    let shows = Arc::clone(shows);
    let probe: PanelProbe = Arc::new(move || -> Result<Box<dyn EpaperPanel>> {
        Ok(Box::new(RecordingPanel {
            shows: Arc::clone(&shows),
        }) as Box<dyn EpaperPanel>)
    });
    let display = DisplayController::new(probe, 10, 0.5).with_retry(RetryPolicy {
        attempts: 1,
        base_delay: Duration::ZERO,
    });
    display.initialize().unwrap();
    Arc::new(display)
}

fn frame(root: &Path, shows: &Arc<Mutex<Vec<RefreshMode>>>, interval: Duration) -> Frame {
    let caps = Capabilities::baseline();
    let local = LocalCatalog::new(root, true, caps, Selector::new(SelectionMode::Sequential));
    let catalog = Catalog::Composite(CompositeCatalog::new(
        vec![Catalog::Local(local)],
        Selector::new(SelectionMode::Sequential),
    ));
    let processor = PhotoProcessor::new(
        ProcessingSettings::new(W, H, &ProcessingOptions::default()),
        caps,
    );
    let settings = FrameSettings {
        refresh_interval: interval,
        tick: Duration::from_millis(10),
        local_path: root.to_path_buf(),
    };
    Frame::new(catalog, processor, display(shows), settings)
}

fn write_photo(path: &Path) {
    RgbImage::from_pixel(120, 60, Rgb([30, 120, 220]))
        .save(path)
        .unwrap();
}

#[test]
fn placeholder_once_then_photo() {
    let tmp = tempfile::tempdir().unwrap();
    let shows = Arc::new(Mutex::new(Vec::new()));
    let mut frame = frame(tmp.path(), &shows, Duration::from_secs(60));

    assert_eq!(frame.run_cycle(), CycleOutcome::Placeholder);
    assert!(frame.placeholder_shown());
    assert_eq!(frame.run_cycle(), CycleOutcome::Idle);
    assert_eq!(shows.lock().unwrap().len(), 1);

    let photo = tmp.path().join("holiday.png");
    write_photo(&photo);
    assert_eq!(frame.run_cycle(), CycleOutcome::Displayed(photo));
    assert!(!frame.placeholder_shown());
    assert_eq!(*shows.lock().unwrap(), vec![RefreshMode::Full, RefreshMode::Partial]);
}

#[test]
fn broken_photo_is_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    fs::write(tmp.path().join("a-broken.jpg"), b"not a jpeg").unwrap();
    write_photo(&tmp.path().join("b-good.png"));
    let shows = Arc::new(Mutex::new(Vec::new()));
    let mut frame = frame(tmp.path(), &shows, Duration::from_secs(60));

    assert_eq!(frame.run_cycle(), CycleOutcome::Skipped);
    assert!(matches!(frame.run_cycle(), CycleOutcome::Displayed(p) if p.ends_with("b-good.png")));
    assert_eq!(shows.lock().unwrap().len(), 1);
}

#[test]
fn sequential_frame_cycles_in_order() {
    let tmp = tempfile::tempdir().unwrap();
    for name in ["1.png", "2.png", "3.png"] {
        write_photo(&tmp.path().join(name));
    }
    let shows = Arc::new(Mutex::new(Vec::new()));
    let mut frame = frame(tmp.path(), &shows, Duration::from_secs(60));
    let names: Vec<String> = (0..4)
        .map(|_| match frame.run_cycle() {
            CycleOutcome::Displayed(p) => p.file_name().unwrap().to_string_lossy().into_owned(),
            other => panic!("unexpected {other:?}"),
        })
        .collect();
    assert_eq!(names, vec!["1.png", "2.png", "3.png", "1.png"]);
}

#[test]
fn loop_wakes_when_photos_arrive_and_stops_on_cancel() {
    let tmp = tempfile::tempdir().unwrap();
    let shows = Arc::new(Mutex::new(Vec::new()));
    let (tx, rx) = crossbeam_channel::bounded(16);

    let caps = Capabilities::baseline();
    let mut local = LocalCatalog::new(tmp.path(), true, caps, Selector::default());
    local.start_watching(tx).unwrap();
    let catalog = Catalog::Composite(CompositeCatalog::new(
        vec![Catalog::Local(local)],
        Selector::default(),
    ));
    let processor = PhotoProcessor::new(
        ProcessingSettings::new(W, H, &ProcessingOptions::default()),
        caps,
    );
    let settings = FrameSettings {
        refresh_interval: Duration::from_secs(3600),
        tick: Duration::from_millis(10),
        local_path: tmp.path().to_path_buf(),
    };
    let frame = Frame::new(catalog, processor, display(&shows), settings).with_changes(rx);

    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        thread::spawn(move || frame.run(cancel))
    };

    let wait_for = |n: usize| {
        let deadline = Instant::now() + Duration::from_secs(10);
        while shows.lock().unwrap().len() < n && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        shows.lock().unwrap().len()
    };
    assert_eq!(wait_for(1), 1, "placeholder should be drawn");

    // write under a non-photo name first so the loop never sees a partial file
    let staging = tmp.path().join("arrived.part");
    RgbImage::from_pixel(120, 60, Rgb([200, 20, 20]))
        .save_with_format(&staging, image::ImageFormat::Png)
        .unwrap();
    fs::rename(&staging, tmp.path().join("arrived.png")).unwrap();
    assert_eq!(wait_for(2), 2, "new photo should be shown without waiting an hour");

    cancel.cancel();
    handle.join().unwrap().unwrap();
    assert_eq!(shows.lock().unwrap().len(), 2);
}

#[test]
fn zero_tick_still_advances_to_next_cycle() {
    let tmp = tempfile::tempdir().unwrap();
    write_photo(&tmp.path().join("only.png"));
    let shows = Arc::new(Mutex::new(Vec::new()));
    let frame = Frame::new(
        Catalog::Local(LocalCatalog::new(
            tmp.path(),
            true,
            Capabilities::baseline(),
            Selector::default(),
        )),
        PhotoProcessor::new(
            ProcessingSettings::new(W, H, &ProcessingOptions::default()),
            Capabilities::baseline(),
        ),
        display(&shows),
        FrameSettings {
            refresh_interval: Duration::from_millis(20),
            tick: Duration::ZERO,
            local_path: tmp.path().to_path_buf(),
        },
    );

    let cancel = CancellationToken::new();
    let handle = {
        let cancel = cancel.clone();
        thread::spawn(move || frame.run(cancel))
    };
    let deadline = Instant::now() + Duration::from_secs(10);
    while shows.lock().unwrap().len() < 2 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }
    cancel.cancel();
    handle.join().unwrap().unwrap();
    assert!(shows.lock().unwrap().len() >= 2, "loop never left its first wait");
}

#[tokio::test(flavor = "multi_thread")]
async fn remote_source_builds_under_async_runtime() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg: Configuration = serde_yaml::from_str("{}").unwrap();
    cfg.photo.local_path = tmp.path().join("photos");
    cfg.remote.enabled = true;
    cfg.remote.account = Some("someone@example.com".into());
    cfg.remote.endpoint = Some("http://127.0.0.1:9".into());
    cfg.remote.session_path = tmp.path().join("session.json");
    cfg.remote.cache_path = tmp.path().join("cache");

    let shows = Arc::new(Mutex::new(Vec::new()));
    let display = display(&shows);
    let cancel = CancellationToken::new();
    cancel.cancel();

    tokio::task::spawn_blocking(move || {
        frame::run_configured(&cfg, Capabilities::baseline(), display, None, cancel)
    })
    .await
    .unwrap()
    .unwrap();
    assert!(shows.lock().unwrap().is_empty());
}
