// src/extract/mux.rs

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use log::{debug, info};

use crate::core::MuxError;

const MAX_DIAGNOSTIC: usize = 2000;

/// The external step that turns raw H.264 elementary stream bytes into a
/// playable container file.
pub trait Muxer: Send + Sync {
    /// One contiguous byte range, already in memory.
    fn mux_bytes(&self, data: &[u8], fps: u32, output: &Path) -> Result<(), MuxError>;

    /// Ordered fragment files, joined into one clip.
    fn concat(&self, fragments: &[PathBuf], fps: u32, output: &Path) -> Result<(), MuxError>;
}

/// `ffmpeg` in stream-copy mode, no re-encode.
pub struct FfmpegMuxer {
    binary: String,
}

impl FfmpegMuxer {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn command(&self, fps: u32, input: &str, output: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(["-loglevel", "error", "-f", "h264", "-framerate"])
            .arg(fps.to_string())
            .args(["-i", input])
            .args(["-c:v", "copy", "-movflags", "faststart", "-y"])
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        cmd
    }

    fn spawn_error(&self, source: std::io::Error) -> MuxError {
        MuxError::Spawn {
            binary: self.binary.clone(),
            source,
        }
    }
}

impl Default for FfmpegMuxer {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

impl Muxer for FfmpegMuxer {
    fn mux_bytes(&self, data: &[u8], fps: u32, output: &Path) -> Result<(), MuxError> {
        debug!("[mux] {} bytes @ {} fps → {}", data.len(), fps, output.display());

        let mut child = self
            .command(fps, "pipe:0", output)
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdin = child.stdin.take();

        // stdin in eigenem Thread füttern, sonst kann stderr volllaufen
        let (fed, waited) = std::thread::scope(|s| {
            let feeder = s.spawn(move || match stdin {
                Some(mut pipe) => pipe.write_all(data),
                None => Ok(()),
            });
            let waited = child.wait_with_output();
            (feeder.join(), waited)
        });

        let out = waited.map_err(|e| MuxError::io("wait for mux step", e))?;
        check_status(&out)?;

        feed_outcome(fed)?;

        info!("[mux] wrote {}", output.display());
        Ok(())
    }

    fn concat(&self, fragments: &[PathBuf], fps: u32, output: &Path) -> Result<(), MuxError> {
        // Annex-B darf byteweise aneinandergehängt werden → concat-Protokoll
        let joined = fragments
            .iter()
            .map(|p| p.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("|");
        let input = format!("concat:{}", joined);

        debug!(
            "[mux] concat {} fragment(s) @ {} fps → {}",
            fragments.len(),
            fps,
            output.display()
        );

        let out = self
            .command(fps, &input, output)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_error(e))?;
        check_status(&out)?;

        info!("[mux] wrote {}", output.display());
        Ok(())
    }
}

fn feed_outcome(
    fed: std::thread::Result<std::io::Result<()>>,
) -> Result<(), MuxError> {
    match fed {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(MuxError::io("feed mux step", e)),
        Err(_) => Err(MuxError::io(
            "feed mux step",
            std::io::Error::other("stdin feeder thread panicked"),
        )),
    }
}

fn check_status(out: &Output) -> Result<(), MuxError> {
    if out.status.success() {
        return Ok(());
    }

    let stderr = String::from_utf8_lossy(&out.stderr);
    let stderr = stderr.trim();
    let tail_start = stderr
        .char_indices()
        .rev()
        .nth(MAX_DIAGNOSTIC)
        .map(|(i, _)| i)
        .unwrap_or(0);

    Err(MuxError::Failed {
        status: out.status.to_string(),
        stderr: stderr[tail_start..].to_string(),
    })
}
