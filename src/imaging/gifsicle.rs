//! `gifsicle` converter: one rendition per invocation, two piped processes.
//!
//! ```text
//! gifsicle [--resize-method sample] --resize-width 64 --colors 256 <in>
//!     | gifsicle --scale 5 [--resize-method sample] -o <out>
//! ```
//!
//! The first process downscales and caps the palette, the second up-scales
//! the stream it reads from stdin. Omitting `--resize-method` selects
//! gifsicle's default interpolating filter.
//!
//! The binary is resolved on `PATH` when the converter is built, so a missing
//! tool surfaces at startup instead of on the first conversion. Both processes
//! share one deadline; when it passes they are killed and the pass fails with
//! [`ConvertError::TimedOut`].

use super::converter::{ConvertError, Converter};
use super::params::{RenditionParams, ResizeFilter};
use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

pub struct GifsicleConverter {
    program: PathBuf,
    tool: String,
    timeout: Duration,
}

impl GifsicleConverter {
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Resolve `tool` (a name on `PATH` or a path) and build a converter.
    pub fn new(tool: &str, timeout: Duration) -> Result<Self, ConvertError> {
        let program = which::which(tool).map_err(|_| ConvertError::ToolNotFound {
            tool: tool.to_string(),
        })?;
        Ok(Self {
            program,
            tool: tool.to_string(),
            timeout,
        })
    }

    /// Absolute path of the resolved binary.
    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn spawn_error(&self, err: io::Error) -> ConvertError {
        match err.kind() {
            io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                ConvertError::ToolNotFound {
                    tool: self.tool.clone(),
                }
            }
            _ => ConvertError::Io(err),
        }
    }

    fn failed(&self, status: ExitStatus, stderr: String) -> ConvertError {
        ConvertError::Failed {
            tool: self.tool.clone(),
            status: status.to_string(),
            stderr: stderr.trim().to_string(),
        }
    }
}

/// Arguments of the downscale + quantize stage (writes the GIF to stdout).
pub fn downscale_args(params: &RenditionParams) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    if params.downscale == ResizeFilter::Sample {
        args.push("--resize-method".into());
        args.push("sample".into());
    }
    args.push(format!("--resize-{}", params.axis.as_str()).into());
    args.push(params.target().to_string().into());
    args.push("--colors".into());
    args.push(params.colors.to_string().into());
    args.push(params.source.clone().into_os_string());
    args
}

/// Arguments of the up-scale stage (reads the GIF from stdin).
pub fn upscale_args(params: &RenditionParams) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["--scale".into(), params.scale.to_string().into()];
    if params.upscale == ResizeFilter::Sample {
        args.push("--resize-method".into());
        args.push("sample".into());
    }
    args.push("-o".into());
    args.push(params.output.clone().into_os_string());
    args
}

/// Poll `child` until it exits or `deadline` passes.
fn wait_until(child: &mut Child, deadline: Instant) -> io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn terminate(child: &mut Child) {
    if matches!(child.try_wait(), Ok(Some(_))) {
        return;
    }
    let _ = child.kill();
    let _ = child.wait();
}

/// Drain a child's stderr on a helper thread so a chatty process can't fill
/// the pipe and stall.
fn collect_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let mut stderr = child.stderr.take()?;
    Some(thread::spawn(move || {
        let mut buf = String::new();
        let _ = stderr.read_to_string(&mut buf);
        buf
    }))
}

fn joined(handle: Option<JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

impl Converter for GifsicleConverter {
    fn name(&self) -> &str {
        "gifsicle"
    }

    fn render(&self, params: &RenditionParams) -> Result<(), ConvertError> {
        let deadline = Instant::now() + self.timeout;
        let down_args = downscale_args(params);
        let up_args = upscale_args(params);
        log::debug!(
            "{} {:?} | {} {:?}",
            self.program.display(),
            down_args,
            self.program.display(),
            up_args
        );

        let mut down = Command::new(&self.program)
            .args(&down_args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let Some(pipe) = down.stdout.take() else {
            terminate(&mut down);
            return Err(ConvertError::ProcessingFailed(
                "downscale stage has no stdout".into(),
            ));
        };

        let mut up = match Command::new(&self.program)
            .args(&up_args)
            .stdin(Stdio::from(pipe))
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                terminate(&mut down);
                return Err(self.spawn_error(e));
            }
        };

        let down_err = collect_stderr(&mut down);
        let up_err = collect_stderr(&mut up);

        let up_status = wait_until(&mut up, deadline)?;
        let down_status = match up_status {
            Some(_) => wait_until(&mut down, deadline)?,
            None => None,
        };

        let (Some(down_status), Some(up_status)) = (down_status, up_status) else {
            terminate(&mut up);
            terminate(&mut down);
            return Err(ConvertError::TimedOut(self.timeout));
        };

        if !down_status.success() {
            return Err(self.failed(down_status, joined(down_err)));
        }
        if !up_status.success() {
            return Err(self.failed(up_status, joined(up_err)));
        }

        match std::fs::metadata(&params.output) {
            Ok(meta) if meta.len() > 0 => Ok(()),
            _ => Err(ConvertError::NoOutput(params.output.clone())),
        }
    }
}
