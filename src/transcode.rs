//! Re-encodes downloaded archives with external codec programs.
//!
//! The downloaded bytes, the decompressed intermediate and the re-compressed output
//! all live in temp files next to the target. Only a fully successful chain renames
//! the output to its final name; every other file is removed when it goes out of scope.

use std::{
    fs::File,
    io::Write,
    path::Path,
    process::Stdio,
    str::FromStr,
};

use tempfile::{Builder, NamedTempFile};
use tokio::process::Command;
use tracing::debug;

use crate::{
    error::{Error, Result},
    store,
};

/// A program and its leading arguments. The input path is appended as the last
/// argument and the program must write its result to stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl FromStr for CodecCommand {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::Config("empty codec command".to_string()))?;

        Ok(CodecCommand {
            program,
            args: parts.collect(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct Transcoder {
    pub decompress: CodecCommand,
    pub compress: CodecCommand,
}

fn temp_in(dir: &Path, suffix: &str) -> Result<NamedTempFile> {
    Builder::new()
        .prefix(".partial-")
        .suffix(suffix)
        .tempfile_in(dir)
        .map_err(|e| Error::persistence(dir, e))
}

impl Transcoder {
    pub fn new(decompress: CodecCommand, compress: CodecCommand) -> Self {
        Transcoder {
            decompress,
            compress,
        }
    }

    /// Writes `content` (encoded as `.{from}`) re-encoded to `target`.
    pub async fn transcode(&self, content: &[u8], from: &str, target: &Path) -> Result<()> {
        let dir = target
            .parent()
            .ok_or_else(|| Error::Transcode {
                path: target.to_path_buf(),
                message: "target has no parent directory".to_string(),
            })?
            .to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| Error::persistence(&dir, e))?;

        let mut archive = temp_in(&dir, &format!(".{from}"))?;
        archive
            .write_all(content)
            .and_then(|_| archive.flush())
            .map_err(|e| Error::persistence(archive.path(), e))?;

        let raw = temp_in(&dir, ".raw")?;
        self.run(&self.decompress, archive.path(), raw.as_file(), target)
            .await?;
        drop(archive);

        let output = temp_in(&dir, ".out")?;
        self.run(&self.compress, raw.path(), output.as_file(), target)
            .await?;
        drop(raw);

        store::publish(output, target)?;

        debug!(path = %target.display(), "transcoded");
        Ok(())
    }

    async fn run(
        &self,
        codec: &CodecCommand,
        input: &Path,
        stdout: &File,
        target: &Path,
    ) -> Result<()> {
        let failure = |message: String| Error::Transcode {
            path: target.to_path_buf(),
            message,
        };

        let stdout = stdout
            .try_clone()
            .map_err(|e| Error::persistence(target, e))?;

        let child = Command::new(&codec.program)
            .args(&codec.args)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| failure(format!("cannot start `{}`: {e}", codec.program)))?;

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| failure(format!("`{}` did not finish: {e}", codec.program)))?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(failure(format!(
            "`{}` exited with {}{}",
            codec.program,
            output.status,
            if stderr.is_empty() {
                String::new()
            } else {
                format!(": {stderr}")
            }
        )))
    }
}

// -- Tests -------------------------------------------------------------------
