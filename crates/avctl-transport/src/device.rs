//! Serial device node access.
//!
//! The line is configured with `stty` (raw, no echo, requested baud), then
//! the node is opened non-blocking with `O_NOCTTY` and driven through
//! tokio's reactor via [`AsyncFd`]. Reads never park a blocking-pool
//! thread, so shutdown does not hang on an idle device.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll, ready};

use tokio::io::unix::AsyncFd;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::TransportError;

#[cfg(target_os = "macos")]
const STTY_DEVICE_FLAG: &str = "-f";
#[cfg(not(target_os = "macos"))]
const STTY_DEVICE_FLAG: &str = "-F";

/// An open serial device.
#[derive(Debug)]
pub struct SerialPort {
    fd: AsyncFd<File>,
}

impl SerialPort {
    /// Configure and open `path` at `baud_rate`.
    pub async fn open(path: &Path, baud_rate: u32) -> Result<Self, TransportError> {
        configure_line(path, baud_rate).await?;

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
            .open(path)
            .map_err(|source| TransportError::Open {
                path: path.display().to_string(),
                source,
            })?;

        Ok(Self {
            fd: AsyncFd::new(file)?,
        })
    }
}

/// Run `stty` for raw 8-bit transfer at the requested speed.
async fn configure_line(path: &Path, baud_rate: u32) -> Result<(), TransportError> {
    let path_str = path.display().to_string();
    let output = tokio::process::Command::new("stty")
        .arg(STTY_DEVICE_FLAG)
        .arg(path)
        .args([baud_rate.to_string().as_str(), "raw", "-echo", "cs8", "-cstopb", "-parenb"])
        .output()
        .await
        .map_err(|e| TransportError::LineSetup {
            path: path_str.clone(),
            detail: e.to_string(),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TransportError::LineSetup {
            path: path_str,
            detail: format!(
                "stty exited {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim(),
            ),
        });
    }

    Ok(())
}

impl AsyncRead for SerialPort {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            let mut guard = ready!(self.fd.poll_read_ready(cx))?;
            let unfilled = buf.initialize_unfilled();
            match guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.read(unfilled)
            }) {
                Ok(Ok(n)) => {
                    buf.advance(n);
                    return Poll::Ready(Ok(()));
                }
                Ok(Err(e)) => return Poll::Ready(Err(e)),
                Err(_would_block) => continue,
            }
        }
    }
}

impl AsyncWrite for SerialPort {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<io::Result<usize>> {
        loop {
            let mut guard = ready!(self.fd.poll_write_ready(cx))?;
            match guard.try_io(|inner| {
                let mut file = inner.get_ref();
                file.write(data)
            }) {
                Ok(result) => return Poll::Ready(result),
                Err(_would_block) => continue,
            }
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
