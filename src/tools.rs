//! Wrappers around the external toolchain: building a raw 32-bit blob out of
//! a freestanding source file, and disassembling a binarized file.
//!
//! Every intermediate file lives in a scratch directory that is removed when
//! the call returns, whatever the outcome. Outputs are only written once all
//! tools in the pipeline have succeeded, and replace the destination in one
//! rename; a failed run leaves whatever was there before untouched.

use log::{debug, info};
use std::{
    env,
    ffi::OsString,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process::{Command, ExitStatus, Stdio},
};
use tempfile::{NamedTempFile, TempDir};
use thiserror::Error;

const CC_FLAGS: [&str; 8] = [
    "-march=i386",
    "-mtune=generic",
    "-m32",
    "-O2",
    "-fPIE",
    "-ffreestanding",
    "-nostdlib",
    "-nostartfiles",
];

const OBJDUMP_FLAGS: [&str; 7] = ["-M", "intel", "-b", "binary", "-D", "-m", "i386"];

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{tool} failed: {status}")]
    Failure { tool: String, status: ExitStatus },

    #[error("could not run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

trait ProcSpawnOk {
    fn spawn_ok(&mut self) -> Result<(), ToolError>;
    fn output_ok(&mut self) -> Result<Vec<u8>, ToolError>;
}

impl ProcSpawnOk for Command {
    fn spawn_ok(&mut self) -> Result<(), ToolError> {
        debug!("running {:?}", self);

        let tool = self.get_program().to_string_lossy().into_owned();
        let status = self
            .status()
            .map_err(|source| ToolError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        check(tool, status)
    }

    fn output_ok(&mut self) -> Result<Vec<u8>, ToolError> {
        debug!("running {:?}", self);

        let tool = self.get_program().to_string_lossy().into_owned();
        let output = self
            .stderr(Stdio::inherit())
            .output()
            .map_err(|source| ToolError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        check(tool, output.status)?;
        Ok(output.stdout)
    }
}

fn check(tool: String, status: ExitStatus) -> Result<(), ToolError> {
    if status.success() {
        Ok(())
    } else {
        Err(ToolError::Failure { tool, status })
    }
}

fn home() -> PathBuf {
    env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
}

/// Replaces `output` with `contents` in one rename, so a failed write never
/// leaves a truncated file behind.
fn publish(output: &Path, contents: &[u8]) -> Result<(), ToolError> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut staged = NamedTempFile::new_in(dir)?;
    staged.write_all(contents)?;
    staged.persist(output).map_err(|e| e.error)?;

    Ok(())
}

/// `<stem of source><suffix>`, used to name intermediates after their input.
fn derived_name(source: &Path, suffix: &str) -> OsString {
    let mut name = source
        .file_stem()
        .map(|x| x.to_os_string())
        .unwrap_or_else(|| OsString::from("out"));
    name.push(suffix);
    name
}

/// Programs used by the pipelines, and where scratch space is taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub cc: PathBuf,
    pub strip: PathBuf,
    pub objcopy: PathBuf,
    pub objdump: PathBuf,
    /// Called as `<binarizer> <input> <output>`.
    pub binarizer: PathBuf,
    /// Parent of the per-call scratch directories. System temp dir if unset.
    pub scratch: Option<PathBuf>,
}

impl Default for Toolchain {
    fn default() -> Toolchain {
        Toolchain {
            cc: "gcc".into(),
            strip: "strip".into(),
            objcopy: "objcopy".into(),
            objdump: "objdump".into(),
            binarizer: home().join("binfw/binfw"),
            scratch: None,
        }
    }
}

impl Toolchain {
    /// Defaults, overridden by `MRR_CC`, `MRR_STRIP`, `MRR_OBJCOPY`,
    /// `MRR_OBJDUMP`, `MRR_BINARIZER` and `MRR_SCRATCH`.
    pub fn from_env() -> Toolchain {
        let mut toolchain = Toolchain::default();

        if let Some(x) = env::var_os("MRR_CC") {
            toolchain.cc = x.into();
        }
        if let Some(x) = env::var_os("MRR_STRIP") {
            toolchain.strip = x.into();
        }
        if let Some(x) = env::var_os("MRR_OBJCOPY") {
            toolchain.objcopy = x.into();
        }
        if let Some(x) = env::var_os("MRR_OBJDUMP") {
            toolchain.objdump = x.into();
        }
        if let Some(x) = env::var_os("MRR_BINARIZER") {
            toolchain.binarizer = x.into();
        }
        if let Some(x) = env::var_os("MRR_SCRATCH") {
            toolchain.scratch = Some(x.into());
        }

        toolchain
    }

    fn scratch_dir(&self) -> io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("mrr-");

        match &self.scratch {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
    }

    /// Compiles `source` into a freestanding position independent i386
    /// binary and writes its raw `.text` section to `output`.
    pub fn compile_blob(&self, source: &Path, output: &Path) -> Result<(), ToolError> {
        let scratch = self.scratch_dir()?;
        let object = scratch.path().join(derived_name(source, ".bin"));
        let raw = scratch.path().join(derived_name(source, ".text"));

        Command::new(&self.cc)
            .args(CC_FLAGS)
            .arg(source)
            .arg("-o")
            .arg(&object)
            .spawn_ok()?;

        Command::new(&self.strip)
            .arg("--strip-all")
            .arg(&object)
            .spawn_ok()?;

        Command::new(&self.objcopy)
            .args(["-O", "binary", "-j", ".text"])
            .arg(&object)
            .arg(&raw)
            .spawn_ok()?;

        let blob = fs::read(&raw)?;
        publish(output, &blob)?;
        info!("wrote {} ({} bytes)", output.display(), blob.len());

        Ok(())
    }

    /// Binarizes `source` and writes its intel-syntax i386 disassembly to
    /// `output`.
    pub fn disassemble(&self, source: &Path, output: &Path) -> Result<(), ToolError> {
        let scratch = self.scratch_dir()?;
        let bin = scratch.path().join(derived_name(source, ".bin"));

        Command::new(&self.binarizer)
            .arg(source)
            .arg(&bin)
            .spawn_ok()?;

        let listing = Command::new(&self.objdump)
            .args(OBJDUMP_FLAGS)
            .arg(&bin)
            .output_ok()?;

        publish(output, &listing)?;
        info!("wrote {} ({} bytes)", output.display(), listing.len());

        Ok(())
    }
}
