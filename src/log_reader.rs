use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

#[cfg(target_os = "windows")]
use std::fs::OpenOptions;
#[cfg(target_os = "windows")]
use std::os::windows::fs::OpenOptionsExt;

const BUFFER_SIZE: usize = 512 * 1024; // 512KB

/// Line reader over a CDN access log, plain or rotated-and-compressed.
/// Compression is picked from the extension: `.gz`, `.zst`, anything else is plain text.
pub struct LogFileReader {
    path: PathBuf,
    inner: Box<dyn BufRead + Send>,
    raw: Vec<u8>,
}

impl LogFileReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = open_file_shared_read(path)?;

        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("");

        let inner: Box<dyn BufRead + Send> = match extension {
            "gz" => Box::new(BufReader::with_capacity(BUFFER_SIZE, GzDecoder::new(file))),
            "zst" => {
                let decoder = zstd::Decoder::new(file)
                    .with_context(|| format!("Failed to open zstd stream: {}", path.display()))?;
                Box::new(BufReader::with_capacity(BUFFER_SIZE, decoder))
            }
            _ => Box::new(BufReader::with_capacity(BUFFER_SIZE, file)),
        };

        Ok(LogFileReader {
            path: path.to_path_buf(),
            inner,
            raw: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the next line into `buf` (cleared first), without the line terminator.
    /// Bytes that are not valid UTF-8 become U+FFFD instead of failing the read,
    /// so one mangled user agent does not end the file.
    /// Returns `false` at end of file.
    pub fn next_line(&mut self, buf: &mut String) -> Result<bool> {
        buf.clear();
        self.raw.clear();
        let read = self
            .inner
            .read_until(b'\n', &mut self.raw)
            .with_context(|| format!("Failed to read line from {}", self.path.display()))?;

        if read == 0 {
            return Ok(false);
        }

        let end = self
            .raw
            .iter()
            .rposition(|&b| b != b'\n' && b != b'\r')
            .map_or(0, |i| i + 1);
        buf.push_str(&String::from_utf8_lossy(&self.raw[..end]));
        Ok(true)
    }
}

/// Opens a file for reading with proper sharing on Windows
/// so the CDN edge can keep appending while we read
fn open_file_shared_read(path: &Path) -> Result<File> {
    #[cfg(target_os = "windows")]
    {
        // FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE
        OpenOptions::new()
            .read(true)
            .share_mode(0x07)
            .open(path)
            .with_context(|| format!("Failed to open file with shared access: {}", path.display()))
    }

    #[cfg(not(target_os = "windows"))]
    {
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))
    }
}
