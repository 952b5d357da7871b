use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tempfile::NamedTempFile;

use super::InstructionDecoder;
use crate::{Architecture, Error};

/// Decodes instructions by running GNU objdump over a raw binary file.
///
/// The bytes are written to a uniquely named temporary file that is removed
/// once the call returns, and the listing is read back from objdump's stdout,
/// so concurrent calls never share any storage.
#[derive(Clone, Debug)]
pub struct ObjdumpDecoder {
    program: PathBuf,
    tmp: Option<PathBuf>,
}

impl Default for ObjdumpDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjdumpDecoder {
    /// Use whatever `objdump` is first on `PATH`.
    pub fn new() -> Self {
        Self::with_program("objdump")
    }

    /// Use the objdump binary at `program` (for instance a cross objdump).
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        ObjdumpDecoder {
            program: program.into(),
            tmp: None,
        }
    }

    /// Create the temporary input files in `tmp` instead of the system default.
    pub fn with_temp_dir(mut self, tmp: impl Into<PathBuf>) -> Self {
        self.tmp = Some(tmp.into());
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    fn write_input(&self, bytes: &[u8]) -> io::Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("fault-address-raw-bytes-");
        let mut input = match &self.tmp {
            Some(tmp) => builder.tempfile_in(tmp)?,
            None => builder.tempfile()?,
        };
        input.write_all(bytes)?;
        input.flush()?;
        Ok(input)
    }
}

impl InstructionDecoder for ObjdumpDecoder {
    fn disassemble(&self, bytes: &[u8], arch: Architecture) -> Result<String, Error> {
        let input = self.write_input(bytes).map_err(|e| {
            Error::DecodeUnavailable(format!("couldn't create objdump input file: {}", e))
        })?;

        let output = Command::new(&self.program)
            .arg("-D")
            .arg("--no-show-raw-insn")
            .args(&["-b", "binary"])
            .args(&["-M", "intel"])
            .args(&["-m", arch.objdump_machine()])
            .arg(input.path())
            .stdin(Stdio::null())
            .output()
            .map_err(|e| {
                Error::DecodeUnavailable(format!(
                    "couldn't run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            tracing::debug!("{} failed: {}", self.program.display(), stderr.trim());
            return Err(Error::DecodeFailure(format!(
                "{} exited with {}",
                self.program.display(),
                output.status
            )));
        }

        String::from_utf8(output.stdout)
            .map_err(|_| Error::DecodeFailure("objdump output is not valid UTF-8".to_string()))
    }
}
