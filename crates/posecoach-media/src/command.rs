//! FFmpeg invocation: argument building and a runner that feeds raw frames
//! on stdin while following `-progress` output on stderr.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{MediaError, MediaResult, Tool};
use crate::progress::{is_progress_line, FfmpegProgress};

/// Non-progress stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

const STDIN_INPUT: &str = "pipe:0";

/// Arguments for one FFmpeg run.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    output: PathBuf,
    /// Placed before `-i`
    input_args: Vec<String>,
    /// Placed after `-i`
    output_args: Vec<String>,
}

impl FfmpegCommand {
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output: output.as_ref().to_path_buf(),
            input_args: Vec::new(),
            output_args: Vec::new(),
        }
    }

    /// Read raw RGB24 frames of the given size and rate from stdin.
    pub fn raw_rgb_input(output: impl AsRef<Path>, width: u32, height: u32, fps: f64) -> Self {
        let mut cmd = Self::new(STDIN_INPUT, output);
        cmd.input_args = vec![
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgb24".into(),
            "-s".into(),
            format!("{}x{}", width, height),
            "-r".into(),
            fps.to_string(),
        ];
        cmd
    }

    fn option(mut self, flag: &str, value: impl Into<String>) -> Self {
        self.output_args.push(flag.to_string());
        self.output_args.push(value.into());
        self
    }

    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.option("-c:v", codec)
    }

    pub fn crf(self, crf: u8) -> Self {
        self.option("-crf", crf.to_string())
    }

    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.option("-preset", preset)
    }

    pub fn pixel_format(self, format: impl Into<String>) -> Self {
        self.option("-pix_fmt", format)
    }

    /// Move the MP4 index to the front for progressive playback.
    pub fn faststart(self) -> Self {
        self.option("-movflags", "+faststart")
    }

    pub fn reads_stdin(&self) -> bool {
        self.input.as_os_str() == STDIN_INPUT
    }

    pub fn build_args(&self) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ];
        args.extend(self.input_args.iter().cloned());
        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().into_owned());
        args.extend(self.output_args.iter().cloned());
        args.push(self.output.to_string_lossy().into_owned());
        args
    }
}

/// Runs FFmpeg with an optional deadline.
#[derive(Debug, Default, Clone)]
pub struct FfmpegRunner {
    timeout_secs: Option<u64>,
}

impl FfmpegRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run `cmd`, writing `chunks` to its stdin in order.
    ///
    /// `on_progress` receives a snapshot at the end of every `-progress`
    /// block. On failure the last stderr lines are attached to the error.
    pub async fn run_with_stdin<B, F>(&self, cmd: &FfmpegCommand, chunks: &[B], on_progress: F) -> MediaResult<()>
    where
        B: AsRef<[u8]> + Sync,
        F: Fn(FfmpegProgress) + Send + 'static,
    {
        let mut child = spawn(cmd)?;
        let stderr_task = watch_stderr(&mut child, on_progress)?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| MediaError::ffmpeg("stdin was not captured", None, None))?;

        let mut write_error = None;
        for chunk in chunks {
            if let Err(e) = stdin.write_all(chunk.as_ref()).await {
                write_error = Some(e);
                break;
            }
        }
        if write_error.is_none() {
            write_error = stdin.shutdown().await.err();
        }
        // EOF on stdin ends the input stream
        drop(stdin);

        let result = self.wait(&mut child).await;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        match (result, write_error) {
            (Ok(()), Some(e)) => Err(MediaError::ffmpeg(
                format!("writing frames failed: {}", e),
                Some(stderr_tail),
                None,
            )),
            (result, _) => attach_stderr(result, stderr_tail),
        }
    }

    async fn wait(&self, child: &mut Child) -> MediaResult<()> {
        let status = match self.timeout_secs {
            Some(secs) => match tokio::time::timeout(Duration::from_secs(secs), child.wait()).await {
                Ok(status) => status?,
                Err(_) => {
                    warn!(secs, "FFmpeg deadline passed, killing process");
                    let _ = child.kill().await;
                    return Err(MediaError::ToolTimeout { tool: Tool::Ffmpeg, secs });
                }
            },
            None => child.wait().await?,
        };

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ffmpeg(format!("exited with {}", status), None, status.code()))
        }
    }
}

fn spawn(cmd: &FfmpegCommand) -> MediaResult<Child> {
    require(Tool::Ffmpeg)?;

    let args = cmd.build_args();
    debug!("Running ffmpeg {}", args.join(" "));

    let child = Command::new(Tool::Ffmpeg.binary())
        .args(&args)
        .stdin(if cmd.reads_stdin() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    Ok(child)
}

/// Follow stderr in the background; resolves to the last non-progress lines.
fn watch_stderr<F>(child: &mut Child, on_progress: F) -> MediaResult<JoinHandle<String>>
where
    F: Fn(FfmpegProgress) + Send + 'static,
{
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| MediaError::ffmpeg("stderr was not captured", None, None))?;
    let mut reader = BufReader::new(stderr).lines();

    Ok(tokio::spawn(async move {
        let mut current = FfmpegProgress::default();
        let mut tail: Vec<String> = Vec::new();

        while let Ok(Some(line)) = reader.next_line().await {
            if is_progress_line(&line) {
                if let Some(snapshot) = current.apply_line(&line) {
                    on_progress(snapshot);
                }
            } else if !line.trim().is_empty() {
                if tail.len() == STDERR_TAIL_LINES {
                    tail.remove(0);
                }
                tail.push(line);
            }
        }

        tail.join("\n")
    }))
}

fn attach_stderr(result: MediaResult<()>, stderr_tail: String) -> MediaResult<()> {
    match result {
        Err(MediaError::ToolFailed {
            tool,
            message,
            stderr: None,
            exit_code,
        }) if !stderr_tail.is_empty() => Err(MediaError::ToolFailed {
            tool,
            message,
            stderr: Some(stderr_tail),
            exit_code,
        }),
        other => other,
    }
}

/// Resolve `tool` on PATH.
pub fn require(tool: Tool) -> MediaResult<PathBuf> {
    which::which(tool.binary()).map_err(|_| MediaError::ToolMissing(tool))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoding_options_follow_input() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .video_codec("libx264")
            .crf(18)
            .faststart();

        let args = cmd.build_args();
        assert_eq!(args[..5].to_vec(), vec!["-y", "-v", "error", "-progress", "pipe:2"]);
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        let codec_pos = args.iter().position(|a| a == "-c:v").unwrap();
        assert!(codec_pos > input_pos);
        assert_eq!(args[codec_pos + 1], "libx264");
        assert!(args.contains(&"+faststart".to_string()));
        assert_eq!(args.last().unwrap(), "output.mp4");
        assert!(!cmd.reads_stdin());
    }

    #[test]
    fn test_raw_rgb_input_args_precede_input() {
        let cmd = FfmpegCommand::raw_rgb_input("out.mp4", 960, 270, 30.0);
        let args = cmd.build_args();

        let size_pos = args.iter().position(|a| a == "960x270").unwrap();
        let input_pos = args.iter().position(|a| a == "-i").unwrap();
        assert!(size_pos < input_pos);
        assert_eq!(args[input_pos + 1], "pipe:0");
        assert!(args.contains(&"rgb24".to_string()));
        assert!(cmd.reads_stdin());
    }

    #[test]
    fn test_attach_stderr_only_when_missing() {
        let result = attach_stderr(
            Err(MediaError::ffmpeg("exited with 1", None, Some(1))),
            "Unknown encoder".to_string(),
        );
        assert_eq!(result.unwrap_err().stderr(), Some("Unknown encoder"));

        let kept = attach_stderr(
            Err(MediaError::ffmpeg("exited with 1", Some("first".into()), Some(1))),
            "second".to_string(),
        );
        assert_eq!(kept.unwrap_err().stderr(), Some("first"));

        assert!(attach_stderr(Ok(()), "noise".to_string()).is_ok());
    }
}
