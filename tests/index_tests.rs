use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use chrono::{TimeDelta, TimeZone, Utc};

use vigil_node::index::{FrameIndexEntry, IndexWriter, RECORD_SIZE, read_index_file};

fn entries(n: u32) -> Vec<FrameIndexEntry> {
    let t0 = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
    let mut offset = 0u64;
    (0..n)
        .map(|i| {
            let size = 100 + (i % 13) * 17;
            let e = FrameIndexEntry {
                frame_number: i,
                timestamp: t0 + TimeDelta::milliseconds(i as i64 * 100),
                byte_offset: offset,
                frame_size: size,
                is_keyframe: i % 10 == 0,
            };
            offset += size as u64;
            e
        })
        .collect()
}

#[test]
fn written_entries_read_back_in_order_and_contiguous() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cam.idx");
    let expected = entries(250);

    {
        let mut writer = IndexWriter::create(&path)?;
        for e in &expected {
            writer.write(e)?;
        }
        assert_eq!(writer.records(), 250);
    }

    let read = read_index_file(&path, false)?;
    assert_eq!(read, expected);

    for pair in read.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
        assert_eq!(pair[0].end_offset(), pair[1].byte_offset);
    }
    Ok(())
}

#[test]
fn reopened_writer_appends_after_existing_records() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cam.idx");
    let all = entries(20);

    {
        let mut w = IndexWriter::create(&path)?;
        for e in &all[..10] {
            w.write(e)?;
        }
    }
    let mut w = IndexWriter::create(&path)?;
    assert_eq!(w.records(), 10);
    for e in &all[10..] {
        w.write(e)?;
    }
    drop(w);

    assert_eq!(read_index_file(&path, false)?, all);
    Ok(())
}

#[test]
fn partial_tail_record_is_ignored() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cam.idx");
    let expected = entries(5);

    {
        let mut w = IndexWriter::create(&path)?;
        for e in &expected {
            w.write(e)?;
        }
    }
    let mut f = OpenOptions::new().append(true).open(&path)?;
    f.write_all(&[0x42; RECORD_SIZE - 3])?;
    drop(f);

    assert_eq!(read_index_file(&path, true)?, expected);
    assert_eq!(read_index_file(&path, false)?, expected);
    Ok(())
}

#[test]
fn reopening_after_a_torn_write_realigns_records() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cam.idx");
    let all = entries(8);

    {
        let mut w = IndexWriter::create(&path)?;
        for e in &all[..5] {
            w.write(e)?;
        }
    }
    let mut f = OpenOptions::new().append(true).open(&path)?;
    f.write_all(&[0x42; 11])?;
    drop(f);

    let mut w = IndexWriter::create(&path)?;
    assert_eq!(w.records(), 5);
    for e in &all[5..] {
        w.write(e)?;
    }
    drop(w);

    assert_eq!(read_index_file(&path, false)?, all);
    assert_eq!(std::fs::metadata(&path)?.len(), (8 * RECORD_SIZE) as u64);
    Ok(())
}

#[test]
fn snapshot_reads_during_appends_see_a_clean_prefix() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("live.idx");
    let expected = Arc::new(entries(600));
    let done = Arc::new(AtomicBool::new(false));

    // Datei muss existieren bevor der Leser startet
    let mut writer = IndexWriter::create(&path)?;

    let writer_thread = {
        let expected = expected.clone();
        let done = done.clone();
        thread::spawn(move || -> anyhow::Result<()> {
            for e in expected.iter() {
                writer.write(e)?;
            }
            done.store(true, Ordering::SeqCst);
            Ok(())
        })
    };

    let mut reads = 0;
    let mut last_len = 0;
    loop {
        let finished = done.load(Ordering::SeqCst);
        let seen = read_index_file(&path, true)?;

        assert!(seen.len() <= expected.len());
        assert!(seen.len() >= last_len, "index shrank between reads");
        assert_eq!(&seen[..], &expected[..seen.len()]);
        last_len = seen.len();
        reads += 1;

        if finished {
            break;
        }
    }

    writer_thread.join().expect("writer thread panicked")?;
    assert!(reads >= 1);
    assert_eq!(read_index_file(&path, true)?.len(), expected.len());

    // keine Snapshot-Reste
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())?
        .flatten()
        .filter(|e| e.file_name().to_string_lossy().ends_with(".snap"))
        .collect();
    assert!(leftovers.is_empty());
    Ok(())
}
