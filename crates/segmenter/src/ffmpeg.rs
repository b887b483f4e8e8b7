use std::path::Path;
use log::debug;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use crate::error::{Result, SegmenterError};

/// Result from FFmpeg execution
#[derive(Debug, Clone)]
pub struct FFmpegResult {
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Arguments every invocation starts with
pub fn base_args() -> Vec<String> {
    ["-y", "-hide_banner", "-loglevel", "error"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Execute one FFmpeg invocation and wait for it to exit
///
/// stdout and stderr are drained concurrently so a chatty encoder cannot
/// fill a pipe and stall. No timeout is applied; the call returns only
/// when the child exits.
pub async fn execute_ffmpeg(ffmpeg_bin: &Path, args: &[String]) -> Result<FFmpegResult> {
    let cmd_str = format!("{} {}", ffmpeg_bin.display(), args.join(" "));
    debug!("Executing FFmpeg: {}", cmd_str);

    let mut cmd = Command::new(ffmpeg_bin);
    cmd.args(args);
    cmd.stdin(std::process::Stdio::null());
    cmd.stdout(std::process::Stdio::piped());
    cmd.stderr(std::process::Stdio::piped());
    cmd.kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|e| {
        SegmenterError::transcode(
            cmd_str.clone(),
            -1,
            &format!("failed to spawn FFmpeg at {}: {}", ffmpeg_bin.display(), e),
        )
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let stdout_handle = tokio::spawn(async move {
        let mut lines = Vec::new();
        if let Some(stdout) = stdout {
            let mut line_stream = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = line_stream.next_line().await {
                lines.push(line);
            }
        }
        lines.join("\n")
    });

    let stderr_handle = tokio::spawn(async move {
        let mut lines = Vec::new();
        if let Some(stderr) = stderr {
            let mut line_stream = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = line_stream.next_line().await {
                lines.push(line);
            }
        }
        lines.join("\n")
    });

    let status = child.wait().await?;
    let stdout = stdout_handle.await.unwrap_or_default();
    let stderr = stderr_handle.await.unwrap_or_default();

    let exit_code = status.code();
    debug!(
        "ffmpeg exit code: {:?}, stdout length: {}, stderr length: {}",
        exit_code,
        stdout.len(),
        stderr.len()
    );

    if !status.success() {
        let diagnostic = combine_diagnostics(&stderr, &stdout);
        return Err(SegmenterError::transcode(cmd_str, exit_code.unwrap_or(-1), &diagnostic));
    }

    Ok(FFmpegResult {
        exit_code,
        stdout,
        stderr,
    })
}

fn combine_diagnostics(stderr: &str, stdout: &str) -> String {
    match (stderr.trim().is_empty(), stdout.trim().is_empty()) {
        (false, false) => format!("{}\n{}", stderr.trim_end(), stdout.trim_end()),
        (false, true) => stderr.to_string(),
        (true, false) => stdout.to_string(),
        (true, true) => "(no diagnostic output)".to_string(),
    }
}
