use std::fs;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use vigil_node::catalog::SegmentCatalog;
use vigil_node::testing::mocks::SyntheticCamera;

const CAM: &str = "RGB_Camera";

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
}

fn far_future() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()
}

fn secs(s: i64) -> TimeDelta {
    TimeDelta::seconds(s)
}

/// Three back-to-back 60 s segments starting at t0, 2 fps.
fn three_segments(base: &std::path::Path) -> anyhow::Result<()> {
    let mut cam = SyntheticCamera::new(base, CAM, t0(), 2, 10, Duration::from_secs(60));
    cam.record_secs(180)?;
    cam.close();
    Ok(())
}

#[test]
fn only_overlapping_segments_are_returned() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    three_segments(dir.path())?;
    let catalog = SegmentCatalog::new(dir.path().to_path_buf(), Duration::from_secs(60));

    let inside = catalog.find_segments_at(CAM, t0() + secs(70), t0() + secs(80), far_future());
    assert_eq!(inside.len(), 1);
    assert_eq!(inside[0].start_time, t0() + secs(60));

    let across = catalog.find_segments_at(CAM, t0() + secs(110), t0() + secs(130), far_future());
    let starts: Vec<_> = across.iter().map(|s| s.start_time).collect();
    assert_eq!(starts, vec![t0() + secs(60), t0() + secs(120)]);

    let before = catalog.find_segments_at(CAM, t0() - secs(100), t0() - secs(50), far_future());
    assert!(before.is_empty());

    for s in &across {
        assert!(!s.is_current);
        assert_eq!(s.effective_end, s.start_time + secs(60));
        assert_eq!(s.metadata.fps, Some(2));
    }
    Ok(())
}

#[test]
fn results_are_chronological_whatever_the_write_order() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;

    for offset in [240, 0, 120, 60, 180] {
        let mut cam = SyntheticCamera::new(
            dir.path(),
            CAM,
            t0() + secs(offset),
            2,
            10,
            Duration::from_secs(60),
        );
        cam.record_secs(60)?;
        cam.close();
    }

    let catalog = SegmentCatalog::new(dir.path().to_path_buf(), Duration::from_secs(60));
    let found = catalog.find_segments_at(CAM, t0(), t0() + secs(299), far_future());

    assert_eq!(found.len(), 5);
    for pair in found.windows(2) {
        assert!(pair[0].start_time < pair[1].start_time);
    }
    Ok(())
}

#[test]
fn segments_with_missing_files_are_skipped() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    three_segments(dir.path())?;
    let catalog = SegmentCatalog::new(dir.path().to_path_buf(), Duration::from_secs(60));

    let all = catalog.find_segments_at(CAM, t0(), t0() + secs(179), far_future());
    assert_eq!(all.len(), 3);

    fs::remove_file(&all[1].video_path)?;
    fs::remove_file(&all[2].index_path)?;

    let left = catalog.find_segments_at(CAM, t0(), t0() + secs(179), far_future());
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].start_time, t0());
    Ok(())
}

#[test]
fn unreadable_sidecar_is_skipped() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    three_segments(dir.path())?;
    let catalog = SegmentCatalog::new(dir.path().to_path_buf(), Duration::from_secs(60));

    let all = catalog.find_segments_at(CAM, t0(), t0() + secs(179), far_future());
    let sidecar = all[0].video_path.with_extension("json");
    fs::write(&sidecar, b"{ not json")?;

    let left = catalog.find_segments_at(CAM, t0(), t0() + secs(179), far_future());
    assert_eq!(left.len(), 2);
    Ok(())
}

#[test]
fn missing_camera_directory_gives_empty_list() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    three_segments(dir.path())?;
    let catalog = SegmentCatalog::new(dir.path().to_path_buf(), Duration::from_secs(60));

    assert!(catalog.find_segments(
        "Thermal_Camera",
        t0(),
        t0() + secs(60)
    ).is_empty());

    let empty = SegmentCatalog::new(dir.path().join("nothing"), Duration::from_secs(60));
    assert!(empty.find_segments(CAM, t0(), t0() + secs(60)).is_empty());
    Ok(())
}

#[test]
fn open_segment_is_current_until_its_nominal_end() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    three_segments(dir.path())?;
    let catalog = SegmentCatalog::new(dir.path().to_path_buf(), Duration::from_secs(60));

    let now = t0() + secs(150);
    let found = catalog.find_segments_at(CAM, t0() + secs(100), t0() + secs(170), now);
    assert_eq!(found.len(), 2);

    assert!(!found[0].is_current);
    assert!(found[1].is_current);
    assert_eq!(found[1].effective_end, now);
    Ok(())
}

#[test]
fn segment_from_before_midnight_is_found_from_the_next_day() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let start = Utc.with_ymd_and_hms(2024, 3, 10, 23, 58, 0).unwrap();
    let mut cam = SyntheticCamera::new(dir.path(), CAM, start, 2, 10, Duration::from_secs(300));
    cam.record_secs(240)?;
    cam.close();

    let catalog = SegmentCatalog::new(dir.path().to_path_buf(), Duration::from_secs(300));
    let after_midnight = Utc.with_ymd_and_hms(2024, 3, 11, 0, 1, 0).unwrap();
    let found = catalog.find_segments_at(
        CAM,
        after_midnight,
        after_midnight + secs(10),
        far_future(),
    );

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].start_time, start);
    assert!(found[0].video_path.to_string_lossy().contains("RECORD_20240310"));
    Ok(())
}
