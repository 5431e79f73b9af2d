//! Terminal front end: progress output and keyboard controls.

use std::future::Future;
use std::io::{IsTerminal, Write};

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

use ferry_upload::{SourceFile, UploadError, UploadEvent, UploadOutcome, UploadStatus, Uploader};

const BAR_WIDTH: usize = 30;

/// Command typed by the user while an upload runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    Pause,
    Resume,
    Cancel,
}

pub fn parse_control(line: &str) -> Option<Control> {
    match line.trim().to_ascii_lowercase().as_str() {
        "p" | "pause" => Some(Control::Pause),
        "r" | "resume" => Some(Control::Resume),
        "c" | "cancel" | "q" => Some(Control::Cancel),
        _ => None,
    }
}

/// Feeds keyboard commands and Ctrl-C into one channel.
///
/// Stdin is only read when it is a terminal.
pub fn spawn_controls() -> mpsc::Receiver<Control> {
    let (tx, rx) = mpsc::channel(8);

    if std::io::stdin().is_terminal() {
        let stdin_tx = tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_control(&line) {
                    Some(control) => {
                        if stdin_tx.send(control).await.is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => eprintln!("unknown command {line:?} (p = pause, r = resume, c = cancel)"),
                }
            }
        });
    }

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.send(Control::Cancel).await;
        }
    });

    rx
}

/// Drives an upload to completion, honoring user controls.
///
/// A paused upload waits for `resume` or `cancel`. A failed upload is
/// retried up to `auto_retry` times; size rejections are never retried.
pub async fn run_interactive(
    uploader: &Uploader,
    source: SourceFile,
    mut controls: mpsc::Receiver<Control>,
    auto_retry: u32,
) -> anyhow::Result<()> {
    let mut retries_left = auto_retry;
    let mut outcome = steer(uploader, uploader.start(source), &mut controls).await;

    loop {
        match outcome {
            Ok(UploadOutcome::Completed(done)) => {
                println!("uploaded: {}", done.reference);
                return Ok(());
            }
            Ok(UploadOutcome::Cancelled) => anyhow::bail!("upload cancelled"),
            Ok(UploadOutcome::Paused) => {
                eprintln!("paused (r = resume, c = cancel)");
                if !wait_for_resume(&mut controls).await {
                    uploader.cancel();
                    anyhow::bail!("upload cancelled");
                }
                outcome = steer(uploader, uploader.resume(), &mut controls).await;
            }
            Err(e) if retries_left > 0 && !matches!(e, UploadError::Validation(_)) => {
                retries_left -= 1;
                tracing::warn!(error = %e, remaining = retries_left, "upload failed, retrying");
                outcome = steer(uploader, uploader.retry(), &mut controls).await;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Awaits `run` while forwarding pause and cancel requests to the uploader.
async fn steer<F>(
    uploader: &Uploader,
    run: F,
    controls: &mut mpsc::Receiver<Control>,
) -> Result<UploadOutcome, UploadError>
where
    F: Future<Output = Result<UploadOutcome, UploadError>>,
{
    tokio::pin!(run);
    let mut open = true;

    loop {
        tokio::select! {
            biased;
            result = &mut run => return result,
            control = controls.recv(), if open => match control {
                Some(Control::Pause) => {
                    if let Err(e) = uploader.pause() {
                        eprintln!("{e}");
                    }
                }
                Some(Control::Cancel) => uploader.cancel(),
                Some(Control::Resume) => eprintln!("upload is already running"),
                None => open = false,
            },
        }
    }
}

/// Returns `true` on resume, `false` on cancel or when input is gone.
async fn wait_for_resume(controls: &mut mpsc::Receiver<Control>) -> bool {
    while let Some(control) = controls.recv().await {
        match control {
            Control::Resume => return true,
            Control::Cancel => return false,
            Control::Pause => {}
        }
    }
    false
}

/// Prints upload events until the channel closes.
pub async fn print_events(mut rx: mpsc::Receiver<UploadEvent>) {
    let mut stdout = std::io::stdout();
    let mut mid_line = false;

    while let Some(event) = rx.recv().await {
        match &event {
            UploadEvent::Progress { .. } => {
                let _ = write!(stdout, "\r{}", render(&event));
                mid_line = true;
            }
            _ => {
                if mid_line {
                    let _ = writeln!(stdout);
                    mid_line = false;
                }
                let _ = writeln!(stdout, "{}", render(&event));
            }
        }
        let _ = stdout.flush();
    }

    if mid_line {
        let _ = writeln!(stdout);
    }
}

fn render(event: &UploadEvent) -> String {
    match event {
        UploadEvent::Progress {
            percent,
            completed,
            total,
        } => {
            let filled = BAR_WIDTH * usize::from(*percent) / 100;
            format!(
                "{percent:>3}% [{}{}] {completed}/{total} chunks",
                "#".repeat(filled),
                "-".repeat(BAR_WIDTH - filled)
            )
        }
        UploadEvent::StatusChanged(UploadStatus::Uploading) => "uploading...".into(),
        UploadEvent::StatusChanged(status) => format!("status: {status}"),
        UploadEvent::Completed {
            file_name,
            reference,
        } => format!("{file_name} stored as {reference}"),
        UploadEvent::Failed { message } => format!("failed: {message}"),
    }
}
