use std::fs::{self, OpenOptions};
use std::io::Write;
use std::process::{Command, ExitStatus, Stdio};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use once_cell::sync::OnceCell;
use serde_json::json;

#[cfg(any(unix, target_os = "windows"))]
use rand::{distributions::Alphanumeric, Rng};
#[cfg(unix)]
use std::os::unix::net::UnixStream;

use crate::playback::{MediaElement, PlayOutcome};

fn player_debug_enabled() -> bool {
    static FLAG: OnceCell<bool> = OnceCell::new();
    *FLAG.get_or_init(|| {
        std::env::var("REELVIEW_DEBUG_PLAYER")
            .map(|val| {
                let trimmed = val.trim();
                !(trimmed.is_empty()
                    || trimmed.eq_ignore_ascii_case("0")
                    || trimmed.eq_ignore_ascii_case("false")
                    || trimmed.eq_ignore_ascii_case("no")
                    || trimmed.eq_ignore_ascii_case("off"))
            })
            .unwrap_or(false)
    })
}

fn player_debug_writer() -> Option<&'static Mutex<std::fs::File>> {
    static WRITER: OnceCell<Option<Mutex<std::fs::File>>> = OnceCell::new();
    WRITER
        .get_or_init(|| {
            std::env::var("REELVIEW_DEBUG_PLAYER_LOG")
                .ok()
                .and_then(|path| {
                    OpenOptions::new()
                        .create(true)
                        .append(true)
                        .open(path)
                        .map(Mutex::new)
                        .ok()
                })
        })
        .as_ref()
}

pub fn debug_log(message: impl AsRef<str>) {
    if !player_debug_enabled() {
        return;
    }
    if let Some(writer) = player_debug_writer() {
        if let Ok(mut file) = writer.lock() {
            let _ = writeln!(file, "{}", message.as_ref());
            return;
        }
    }
    eprintln!("{}", message.as_ref());
}

pub fn sanitize_url(raw: &str) -> String {
    raw.trim().replace("&amp;", "&")
}

#[derive(Clone, Copy)]
pub enum PlayerCommand {
    SetPause(bool),
    SetMute(bool),
    SeekRelative(f64),
}

fn command_payload(command: PlayerCommand) -> serde_json::Value {
    match command {
        PlayerCommand::SetPause(paused) => json!(["set_property", "pause", paused]),
        PlayerCommand::SetMute(muted) => json!(["set_property", "mute", muted]),
        PlayerCommand::SeekRelative(offset) => json!(["seek", offset, "relative"]),
    }
}

/// Arguments for one mpv invocation. The process starts paused; the session
/// controller drives it over IPC from there.
fn player_args(url: &str, title: &str, ipc_arg: Option<&str>) -> Vec<String> {
    let mut args = Vec::new();
    args.push(url.to_string());
    args.push("--pause".to_string());
    args.push("--force-window=yes".to_string());
    args.push("--keep-open=no".to_string());
    args.push("--really-quiet".to_string());
    args.push("--no-config".to_string());
    args.push("--ytdl=no".to_string());
    args.push("--osc=no".to_string());
    if let Some(arg) = ipc_arg {
        args.push(arg.to_string());
    }
    if !title.is_empty() {
        args.push(format!("--force-media-title={}", title));
    }
    args
}

struct ProcSession {
    kill_tx: Sender<()>,
    status_rx: Receiver<Result<ExitStatus>>,
    handle: Option<thread::JoinHandle<()>>,
    ipc_path: Option<String>,
}

impl ProcSession {
    fn finalize(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }

    /// Non-blocking: Some(..) once the player process has exited.
    fn try_status(&mut self) -> Option<Result<ExitStatus>> {
        match self.status_rx.try_recv() {
            Ok(res) => {
                self.finalize();
                Some(res)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.finalize();
                Some(Err(anyhow!("player session closed unexpectedly")))
            }
        }
    }

    fn stop_blocking(mut self) {
        let _ = self.kill_tx.send(());
        let _ = self.status_rx.recv();
        self.finalize();
    }

    fn send_command(&self, command: PlayerCommand) -> Result<()> {
        let Some(path) = &self.ipc_path else {
            return Err(anyhow!(
                "Player controls are not supported on this platform."
            ));
        };
        let payload = json!({ "command": command_payload(command) });
        let serialized = serde_json::to_string(&payload).context("serialize player command")?;
        send_ipc_command_inner(path, &serialized)
    }
}

impl Drop for ProcSession {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.kill_tx.send(());
            let _ = self.status_rx.recv().ok();
            self.finalize();
        }
    }
}

fn spawn_player(player_path: &str, url: &str, title: &str) -> Result<ProcSession> {
    if url.trim().is_empty() {
        return Err(anyhow!("playback URL missing"));
    }

    let (kill_tx, kill_rx) = bounded::<()>(1);
    let (status_tx, status_rx) = bounded::<Result<ExitStatus>>(1);

    let player_path = player_path.to_string();
    let remote_url = sanitize_url(url);
    let title = title.to_string();
    let debug_enabled = player_debug_enabled();
    let ipc_path = unique_ipc_path();
    let ipc_path_for_session = ipc_path.clone();
    debug_log(format!(
        "spawning player url={} ipc={}",
        remote_url,
        ipc_path.as_deref().unwrap_or("n/a")
    ));
    #[cfg(unix)]
    if let Some(path) = &ipc_path {
        if let Err(err) = fs::remove_file(path) {
            if err.kind() != std::io::ErrorKind::NotFound && debug_enabled {
                debug_log(format!("failed to remove stale ipc path {path}: {err}"));
            }
        }
    }
    let ipc_arg = ipc_path
        .as_ref()
        .map(|path| format!("--input-ipc-server={path}"));

    let handle = thread::spawn(move || {
        let ipc_cleanup = ipc_path.clone();
        let result = (|| -> Result<ExitStatus> {
            let args = player_args(&remote_url, &title, ipc_arg.as_deref());
            if debug_enabled {
                debug_log(format!("player args: {:?}", args));
            }

            let mut command = Command::new(&player_path);
            for arg in &args {
                command.arg(arg);
            }
            command.stdin(Stdio::null());
            command.stdout(Stdio::null());
            command.stderr(Stdio::null());

            let mut child = command
                .spawn()
                .with_context(|| format!("launch player for {}", remote_url))?;

            loop {
                if kill_rx.try_recv().is_ok() {
                    let _ = child.kill();
                    let status = child.wait().context("wait for player after stop request")?;
                    if debug_enabled {
                        debug_log(format!("player stopped with status {:?}", status.code()));
                    }
                    return Ok(status);
                }

                match child.try_wait() {
                    Ok(Some(status)) => {
                        if debug_enabled {
                            debug_log(format!("player exited with status {:?}", status.code()));
                        }
                        return Ok(status);
                    }
                    Ok(None) => thread::sleep(Duration::from_millis(30)),
                    Err(err) => {
                        return Err(anyhow!(err)).context("poll player status");
                    }
                }
            }
        })();
        #[cfg(unix)]
        if let Some(path) = ipc_cleanup {
            cleanup_ipc_path(&path);
        }
        #[cfg(not(unix))]
        let _ = ipc_cleanup;

        let _ = status_tx.send(result);
    });

    Ok(ProcSession {
        kill_tx,
        status_rx,
        handle: Some(handle),
        ipc_path: ipc_path_for_session,
    })
}

#[cfg(unix)]
fn send_ipc_command_inner(path: &str, serialized: &str) -> Result<()> {
    let mut stream = UnixStream::connect(path)
        .with_context(|| format!("connect to player IPC socket {path}"))?;
    stream
        .write_all(serialized.as_bytes())
        .context("write player IPC command")?;
    stream
        .write_all(b"\n")
        .context("write player IPC command terminator")?;
    Ok(())
}

#[cfg(target_os = "windows")]
fn send_ipc_command_inner(path: &str, serialized: &str) -> Result<()> {
    use std::io::ErrorKind;

    const PIPE_RETRIES: usize = 5;
    const PIPE_RETRY_DELAY: Duration = Duration::from_millis(100);

    for attempt in 0..PIPE_RETRIES {
        match OpenOptions::new().read(true).write(true).open(path) {
            Ok(mut pipe) => {
                pipe.write_all(serialized.as_bytes())
                    .with_context(|| format!("write player IPC command to {path}"))?;
                pipe.write_all(b"\n")
                    .with_context(|| format!("write player IPC command terminator to {path}"))?;
                pipe.flush().ok();
                return Ok(());
            }
            Err(err) if err.kind() == ErrorKind::NotFound && attempt + 1 < PIPE_RETRIES => {
                thread::sleep(PIPE_RETRY_DELAY);
            }
            Err(err) => {
                return Err(anyhow!(err))
                    .context(format!("connect to player IPC named pipe {path}"));
            }
        }
    }

    Err(anyhow!("connect to player IPC named pipe {}", path))
}

#[cfg(all(not(unix), not(target_os = "windows")))]
fn send_ipc_command_inner(_path: &str, _serialized: &str) -> Result<()> {
    Err(anyhow!(
        "Player controls are not supported on this platform."
    ))
}

#[cfg(unix)]
fn unique_ipc_path() -> Option<String> {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    let mut path = std::env::temp_dir();
    path.push(format!("reelview-mpv-{}-{suffix}.sock", std::process::id()));
    Some(path.to_string_lossy().to_string())
}

#[cfg(target_os = "windows")]
fn unique_ipc_path() -> Option<String> {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(10)
        .map(char::from)
        .collect();
    Some(format!(
        r"\\.\pipe\reelview-mpv-{}-{suffix}",
        std::process::id()
    ))
}

#[cfg(all(not(unix), not(target_os = "windows")))]
fn unique_ipc_path() -> Option<String> {
    None
}

#[cfg(unix)]
fn cleanup_ipc_path(path: &str) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != std::io::ErrorKind::NotFound && player_debug_enabled() {
            debug_log(format!("failed to remove player ipc path {path}: {err}"));
        }
    }
}

/// mpv-backed media element. One player process per bound entry; play/pause
/// and mute are driven over the IPC socket, and natural completion is the
/// process exiting on its own (`--keep-open=no`).
pub struct MpvElement {
    player_path: String,
    title: String,
    session: Option<ProcSession>,
}

impl MpvElement {
    pub fn new(command: &[String]) -> Self {
        let player_path = command
            .first()
            .cloned()
            .unwrap_or_else(|| "mpv".to_string());
        Self {
            player_path,
            title: String::new(),
            session: None,
        }
    }

    pub fn set_title(&mut self, title: &str) {
        self.title = title.to_string();
    }
}

impl MediaElement for MpvElement {
    fn load(&mut self, url: &str) -> Result<()> {
        if let Some(session) = self.session.take() {
            session.stop_blocking();
        }
        let session = spawn_player(&self.player_path, url, &self.title)?;
        self.session = Some(session);
        Ok(())
    }

    fn play(&mut self) -> Result<PlayOutcome> {
        match &self.session {
            Some(session) => {
                session.send_command(PlayerCommand::SetPause(false))?;
                Ok(PlayOutcome::Started)
            }
            None => Ok(PlayOutcome::Blocked),
        }
    }

    fn pause(&mut self) -> Result<()> {
        if let Some(session) = &self.session {
            session.send_command(PlayerCommand::SetPause(true))?;
        }
        Ok(())
    }

    fn set_muted(&mut self, muted: bool) -> Result<()> {
        if let Some(session) = &self.session {
            session.send_command(PlayerCommand::SetMute(muted))?;
        }
        Ok(())
    }

    fn poll_ended(&mut self) -> Result<bool> {
        let Some(session) = self.session.as_mut() else {
            return Ok(false);
        };
        match session.try_status() {
            Some(Ok(_)) => {
                self.session = None;
                Ok(true)
            }
            Some(Err(err)) => {
                self.session = None;
                Err(err)
            }
            None => Ok(false),
        }
    }

    fn unload(&mut self) {
        if let Some(session) = self.session.take() {
            session.stop_blocking();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_encoded_urls() {
        assert_eq!(
            sanitize_url("https://cdn.reelview.app/v.mp4?token=a&amp;b=1 "),
            "https://cdn.reelview.app/v.mp4?token=a&b=1"
        );
    }

    #[test]
    fn player_args_start_paused_without_osd() {
        let args = player_args(
            "https://cdn.reelview.app/v.mp4",
            "Best ramen downtown",
            Some("--input-ipc-server=/tmp/sock"),
        );
        assert_eq!(args[0], "https://cdn.reelview.app/v.mp4");
        assert!(args.contains(&"--pause".to_string()));
        assert!(args.contains(&"--keep-open=no".to_string()));
        assert!(args.contains(&"--input-ipc-server=/tmp/sock".to_string()));
        assert!(args
            .iter()
            .any(|arg| arg == "--force-media-title=Best ramen downtown"));
    }

    #[test]
    fn pause_payload_sets_property() {
        let payload = command_payload(PlayerCommand::SetPause(true));
        assert_eq!(payload, json!(["set_property", "pause", true]));
        let payload = command_payload(PlayerCommand::SetMute(false));
        assert_eq!(payload, json!(["set_property", "mute", false]));
    }

    #[test]
    fn seek_payload_is_relative() {
        let payload = command_payload(PlayerCommand::SeekRelative(-5.0));
        assert_eq!(payload, json!(["seek", -5.0, "relative"]));
    }
}
