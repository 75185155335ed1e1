use std::io;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;

pub(crate) type SharedBuffer = Arc<Mutex<Vec<u8>>>;

/// Output buffers of one pipeline run. The stderr buffer is shared by every stage.
#[derive(Default)]
pub(crate) struct CaptureBuffers {
    pub(crate) stdout: SharedBuffer,
    pub(crate) stderr: SharedBuffer,
}

impl CaptureBuffers {
    pub(crate) async fn snapshot(&self) -> (Vec<u8>, Vec<u8>) {
        let stdout = self.stdout.lock().await.clone();
        let stderr = self.stderr.lock().await.clone();
        (stdout, stderr)
    }
}

pub(crate) async fn read_stream_capture<R: AsyncRead + Unpin>(
    mut reader: R,
    buffer: SharedBuffer,
) -> io::Result<()> {
    let mut chunk = [0u8; 4096];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.lock().await.extend_from_slice(&chunk[..n]);
    }
    Ok(())
}
