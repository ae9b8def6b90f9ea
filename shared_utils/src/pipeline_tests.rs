//! End-to-end pipeline scenarios against a fake engine.
//!
//! Fixture "images" are text files holding `<width>x<height>`; the fake engine
//! writes the shrunk geometry to its output path exactly like `-resize NxN>`.

use crate::config::RunConfig;
use crate::engine::{shrink_dimensions, ConversionEngine, EngineStatus, ShrinkOptions};
use crate::errors::{Result, ShrinkError};
use crate::image_formats::{parse_format_table, CapabilityTable};
use crate::pipeline::{FileOutcome, Pipeline, RunSummary, SkipReason};
use crate::safe_replace::backup_path_for;
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::SystemTime;
use tempfile::TempDir;

const FORMATS: &str = "
   Format  Module    Mode  Description
-------------------------------------------------------------------------------
     JPEG* JPEG      rw-   Joint Photographic Experts Group JFIF format
      PNG* PNG       rw-   Portable Network Graphics
      TGA* TGA       rw-   Truevision Targa image
     TIFF* TIFF      rw+   Tagged Image File Format
      DNG  DNG       r--   Digital Negative
";

#[derive(Default)]
struct FakeEngine {
    calls: RefCell<Vec<(PathBuf, PathBuf, ShrinkOptions)>>,
    /// File names whose conversion exits non-zero after writing junk.
    fail_on: Vec<&'static str>,
}

impl FakeEngine {
    fn failing_on(names: &[&'static str]) -> Self {
        Self {
            fail_on: names.to_vec(),
            ..Self::default()
        }
    }

    fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }
}

fn parse_geometry(text: &str) -> Option<(u32, u32)> {
    let (w, h) = text.trim().split_once('x')?;
    Some((w.parse().ok()?, h.parse().ok()?))
}

impl ConversionEngine for FakeEngine {
    fn name(&self) -> &str {
        "fake"
    }

    fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ShrinkOptions,
    ) -> Result<EngineStatus> {
        self.calls
            .borrow_mut()
            .push((input.to_path_buf(), output.to_path_buf(), *options));

        let name = input.file_name().unwrap().to_string_lossy().into_owned();
        if self.fail_on.contains(&name.as_str()) {
            fs::write(output, b"partial")?;
            return Ok(EngineStatus {
                exit_code: Some(1),
                stderr: "fake: corrupt input".to_string(),
            });
        }

        let text = fs::read_to_string(input)?;
        match parse_geometry(&text) {
            Some((w, h)) => {
                let (nw, nh) = shrink_dimensions(w, h, options.max_edge);
                fs::write(output, format!("{}x{}", nw, nh))?;
                Ok(EngineStatus {
                    exit_code: Some(0),
                    stderr: String::new(),
                })
            }
            None => Ok(EngineStatus {
                exit_code: Some(1),
                stderr: "fake: not an image".to_string(),
            }),
        }
    }

    fn list_formats(&self) -> Option<String> {
        Some(FORMATS.to_string())
    }
}

fn capabilities() -> CapabilityTable {
    parse_format_table(FORMATS)
}

struct Fixture {
    _dir: TempDir,
    root: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        Self { _dir: dir, root }
    }

    fn image(&self, rel: &str, w: u32, h: u32) -> PathBuf {
        let path = self.root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, format!("{}x{}", w, h)).unwrap();
        path
    }

    fn read(&self, rel: &str) -> String {
        fs::read_to_string(self.root.join(rel)).unwrap()
    }

    fn config(&self, extensions: &[&str]) -> RunConfig {
        RunConfig {
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
            backup: false,
            ..RunConfig::new(&self.root)
        }
    }

    /// Every file under the root except the run log, with content and mtime.
    fn snapshot(&self, log_name: &str) -> Vec<(PathBuf, Vec<u8>, SystemTime)> {
        let mut files: Vec<_> = walkdir::WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter(|e| e.file_name().to_string_lossy() != log_name)
            .map(|e| {
                let path = e.path().to_path_buf();
                let meta = fs::metadata(&path).unwrap();
                (path.clone(), fs::read(&path).unwrap(), meta.modified().unwrap())
            })
            .collect();
        files.sort();
        files
    }
}

fn run(config: RunConfig, engine: &FakeEngine) -> RunSummary {
    Pipeline::new(config, engine, &capabilities())
        .unwrap()
        .run(|_| {})
        .unwrap()
}

fn leftover_temps(root: &Path) -> usize {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().contains(".shrinktmp."))
        .count()
}

#[test]
fn test_convert_and_shrink_scenario() {
    let fx = Fixture::new();
    fx.image("a.tif", 2000, 1000);
    fx.image("b.png", 400, 300);

    let engine = FakeEngine::default();
    let config = RunConfig {
        max_edge: 1024,
        output_format: Some("png".into()),
        ..fx.config(&["tif", "png"])
    };
    let summary = run(config, &engine);

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert!(!fx.root.join("a.tif").exists());
    assert_eq!(fx.read("a.png"), "1024x512");
    assert_eq!(fx.read("b.png"), "400x300");
    // b.png is still passed through the engine
    assert_eq!(engine.call_count(), 2);
    assert_eq!(leftover_temps(&fx.root), 0);

    let log = fs::read_to_string(summary.log_path.unwrap()).unwrap();
    assert!(log.contains(&format!(
        "OK: {} -> {}",
        fx.root.join("a.tif").display(),
        fx.root.join("a.png").display()
    )));
    assert!(log.contains("=== Summary: OK=2 SKIPPED=0 FAILED=0 ==="));
}

#[test]
fn test_temp_output_extension_matches_target_format() {
    let fx = Fixture::new();
    fx.image("a.tif", 100, 100);

    let engine = FakeEngine::default();
    let config = RunConfig {
        output_format: Some("png".into()),
        ..fx.config(&["tif"])
    };
    run(config, &engine);

    let calls = engine.calls.borrow();
    assert_eq!(calls[0].1.extension().unwrap(), "png");
}

#[test]
fn test_dry_run_leaves_tree_untouched() {
    let fx = Fixture::new();
    fx.image("a.tif", 4000, 2000);
    fx.image("sub/b.png", 3000, 3000);

    let config = RunConfig {
        dry_run: true,
        backup: true,
        output_format: Some("png".into()),
        ..fx.config(&["tif", "png"])
    };
    let log_name = config.log_file_name.clone();
    let before = fx.snapshot(&log_name);

    let engine = FakeEngine::default();
    let summary = run(config, &engine);

    assert_eq!(fx.snapshot(&log_name), before);
    assert_eq!(engine.call_count(), 0);
    assert_eq!(summary.skipped, 2);
    assert!(summary.outcomes.iter().all(|o| matches!(
        o,
        FileOutcome::Skipped {
            reason: SkipReason::DryRun,
            ..
        }
    )));

    let log = fs::read_to_string(summary.log_path.unwrap()).unwrap();
    assert!(log.contains(&format!(
        "DRYRUN: {} -> {}",
        fx.root.join("a.tif").display(),
        fx.root.join("a.png").display()
    )));
}

#[test]
fn test_second_run_is_a_no_op() {
    let fx = Fixture::new();
    fx.image("a.png", 3000, 1500);
    fx.image("b.png", 640, 480);

    let engine = FakeEngine::default();
    let config = RunConfig {
        max_edge: 1024,
        ..fx.config(&["png"])
    };
    run(config.clone(), &engine);
    let after_first = (fx.read("a.png"), fx.read("b.png"));
    run(config, &engine);
    let after_second = (fx.read("a.png"), fx.read("b.png"));

    assert_eq!(after_first, ("1024x512".to_string(), "640x480".to_string()));
    assert_eq!(after_first, after_second);
}

#[test]
fn test_backup_keeps_pre_first_run_bytes() {
    let fx = Fixture::new();
    let src = fx.image("a.png", 2048, 2048);

    let engine = FakeEngine::default();
    let config = RunConfig {
        max_edge: 1024,
        backup: true,
        ..fx.config(&["png"])
    };
    run(config.clone(), &engine);
    assert_eq!(fx.read("a.png"), "1024x1024");

    let config = RunConfig {
        max_edge: 512,
        ..config
    };
    run(config, &engine);
    assert_eq!(fx.read("a.png"), "512x512");

    let backup = fs::read_to_string(backup_path_for(&src)).unwrap();
    assert_eq!(backup, "2048x2048");
}

#[test]
fn test_overlapping_aliases_processed_once() {
    let fx = Fixture::new();
    fx.image("photo.jpg", 800, 600);

    let engine = FakeEngine::default();
    let summary = run(fx.config(&["jpg", "jpeg", "JPG"]), &engine);

    assert_eq!(engine.call_count(), 1);
    assert_eq!(summary.succeeded, 1);
}

#[test]
fn test_excluded_directories_never_processed() {
    let fx = Fixture::new();
    fx.image("tex/wall.png", 4096, 4096);
    fx.image("build/wall.png", 4096, 4096);
    fx.image("tex/.git/objects/wall.png", 4096, 4096);

    let engine = FakeEngine::default();
    let summary = run(fx.config(&["png"]), &engine);

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.excluded, 2);
    assert_eq!(fx.read("build/wall.png"), "4096x4096");
    assert_eq!(fx.read("tex/.git/objects/wall.png"), "4096x4096");
}

#[test]
fn test_unwritable_output_format_rejected_before_any_work() {
    let fx = Fixture::new();
    fx.image("a.tif", 2000, 1000);

    let engine = FakeEngine::default();
    let config = RunConfig {
        output_format: Some("dng".into()),
        ..fx.config(&["tif"])
    };
    let result = Pipeline::new(config, &engine, &capabilities());

    assert!(matches!(result, Err(ShrinkError::FormatNotWritable(f)) if f == "dng"));
    assert_eq!(engine.call_count(), 0);
    assert_eq!(fx.read("a.tif"), "2000x1000");
}

#[test]
fn test_failures_are_recorded_and_run_continues() {
    let fx = Fixture::new();
    fx.image("a.png", 2000, 2000);
    fx.image("b.png", 2000, 2000);
    fx.image("c.png", 2000, 2000);
    fs::write(fx.root.join("d.png"), "garbage").unwrap();

    let engine = FakeEngine::failing_on(&["b.png"]);
    let config = RunConfig {
        max_edge: 100,
        ..fx.config(&["png"])
    };
    let summary = run(config, &engine);

    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 2);
    let failed: Vec<_> = summary.failures.iter().map(|(p, _)| p.clone()).collect();
    assert_eq!(failed, vec![fx.root.join("b.png"), fx.root.join("d.png")]);
    assert!(summary.failures[0].1.contains("corrupt input"));

    assert_eq!(fx.read("b.png"), "2000x2000");
    assert_eq!(fx.read("d.png"), "garbage");
    assert_eq!(fx.read("c.png"), "100x100");
    assert_eq!(leftover_temps(&fx.root), 0);

    let log = fs::read_to_string(summary.log_path.unwrap()).unwrap();
    assert!(log.contains(&format!("FAIL: {}", fx.root.join("b.png").display())));
}

#[test]
fn test_failed_conversion_keeps_original() {
    let fx = Fixture::new();
    fx.image("a.tif", 2000, 1000);

    let engine = FakeEngine::failing_on(&["a.tif"]);
    let config = RunConfig {
        output_format: Some("png".into()),
        ..fx.config(&["tif"])
    };
    let summary = run(config, &engine);

    assert_eq!(summary.failed, 1);
    assert_eq!(fx.read("a.tif"), "2000x1000");
    assert!(!fx.root.join("a.png").exists());
    assert_eq!(leftover_temps(&fx.root), 0);
}

#[test]
fn test_stale_temp_from_crashed_run_is_not_trusted() {
    let fx = Fixture::new();
    fx.image("a.png", 2000, 2000);
    fs::write(fx.root.join("a.shrinktmp.png"), "10x10").unwrap();

    let engine = FakeEngine::failing_on(&["a.png"]);
    let summary = run(fx.config(&["png"]), &engine);

    assert_eq!(engine.call_count(), 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(fx.read("a.png"), "2000x2000");
    assert_eq!(leftover_temps(&fx.root), 0);
}

#[test]
fn test_name_marker_skip() {
    let fx = Fixture::new();
    fx.image("hero_NoShrink.png", 4096, 4096);
    fx.image("rock.png", 4096, 4096);

    let engine = FakeEngine::default();
    let config = RunConfig {
        skip_marked: true,
        skip_marker: "_noshrink".into(),
        max_edge: 1024,
        ..fx.config(&["png"])
    };
    let summary = run(config.clone(), &engine);

    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(fx.read("hero_NoShrink.png"), "4096x4096");

    let log = fs::read_to_string(summary.log_path.unwrap()).unwrap();
    assert!(log.contains("SKIP: "));

    // same marker, rule disabled
    let config = RunConfig {
        skip_marked: false,
        ..config
    };
    run(config, &engine);
    assert_eq!(fx.read("hero_NoShrink.png"), "1024x1024");
}

#[test]
fn test_options_forwarded_to_engine() {
    let fx = Fixture::new();
    fx.image("sprite.png", 64, 64);

    let engine = FakeEngine::default();
    let config = RunConfig {
        max_edge: 32,
        pixel_art: true,
        strip_metadata: true,
        max_png_compression: true,
        ..fx.config(&["png"])
    };
    run(config, &engine);

    let calls = engine.calls.borrow();
    let options = calls[0].2;
    assert_eq!(options.max_edge, 32);
    assert!(options.pixel_art && options.strip_metadata && options.max_png_compression);
    assert_eq!(fx.read("sprite.png"), "32x32");
}

#[test]
fn test_no_files_matched_is_a_setup_error() {
    let fx = Fixture::new();
    fx.image("a.tga", 10, 10);

    let engine = FakeEngine::default();
    let result = Pipeline::new(fx.config(&["png"]), &engine, &capabilities())
        .unwrap()
        .run(|_| {});

    match result {
        Err(e) => {
            assert!(matches!(e, ShrinkError::NoFilesMatched(_)));
            assert!(e.is_setup_error());
        }
        Ok(_) => panic!("expected NoFilesMatched"),
    }
}

#[test]
fn test_cancel_flag_stops_before_next_file() {
    let fx = Fixture::new();
    fx.image("a.png", 2000, 2000);
    fx.image("b.png", 2000, 2000);
    fx.image("c.png", 2000, 2000);

    let engine = FakeEngine::default();
    let flag = Arc::new(AtomicBool::new(false));
    let pipeline = Pipeline::new(fx.config(&["png"]), &engine, &capabilities())
        .unwrap()
        .with_cancel_flag(flag.clone());

    let summary = pipeline
        .run(|progress| {
            if progress.index == 1 {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        })
        .unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.total(), 1);
    assert_eq!(engine.call_count(), 1);
    assert_eq!(fx.read("c.png"), "2000x2000");

    let log = fs::read_to_string(summary.log_path.unwrap()).unwrap();
    assert!(log.contains("Run cancelled"));
}

#[test]
fn test_progress_reported_after_each_file() {
    let fx = Fixture::new();
    for name in ["a.png", "b.png", "c.png"] {
        fx.image(name, 10, 10);
    }

    let engine = FakeEngine::default();
    let mut seen = Vec::new();
    Pipeline::new(fx.config(&["png"]), &engine, &capabilities())
        .unwrap()
        .run(|p| seen.push((p.index, p.total, p.outcome.path().to_path_buf())))
        .unwrap();

    assert_eq!(
        seen,
        vec![
            (1, 3, fx.root.join("a.png")),
            (2, 3, fx.root.join("b.png")),
            (3, 3, fx.root.join("c.png")),
        ]
    );
}

#[test]
fn test_log_disabled_writes_nothing() {
    let fx = Fixture::new();
    fx.image("a.png", 10, 10);

    let engine = FakeEngine::default();
    let config = RunConfig {
        write_log: false,
        ..fx.config(&["png"])
    };
    let log_path = config.log_path();
    let summary = run(config, &engine);

    assert!(summary.log_path.is_none());
    assert!(!log_path.exists());
}

#[test]
fn test_capabilities_loaded_from_engine() {
    let fx = Fixture::new();
    fx.image("a.tga", 3000, 100);

    let engine = FakeEngine::default();
    let config = RunConfig {
        max_edge: 300,
        output_format: Some("tif".into()),
        ..fx.config(&["tga"])
    };
    let summary = crate::pipeline::run_pipeline(config, &engine).unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(fx.read("a.tif"), "300x10");
}

#[cfg(unix)]
#[test]
fn test_unreadable_subtree_is_counted_not_fatal() {
    use std::os::unix::fs::PermissionsExt;

    let fx = Fixture::new();
    fx.image("ok/a.png", 10, 10);
    fx.image("locked/b.png", 10, 10);
    let locked = fx.root.join("locked");
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::read_dir(&locked).is_ok() {
        // running with privileges that ignore permission bits
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let engine = FakeEngine::default();
    let summary = run(fx.config(&["png"]), &engine);
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.unreadable, 1);
    let log = fs::read_to_string(summary.log_path.unwrap()).unwrap();
    assert!(log.contains("Unreadable entries skipped: 1"));
}
