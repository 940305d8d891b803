use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

use derive_more::{Display, From};
use which::which;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Display, From)]
#[display("{self:?}")]
pub enum Error {
	ToolNotFound(&'static str),
	GenerateFail(String),
	#[from]
	Io(std::io::Error),
	#[from]
	Env(env::VarError),
}

// Kernel types the probe reads, generated from the running kernel's BTF.
const VMLINUX_TYPES: &[&str] = &["task_struct"];

fn main() -> Result<()> {
	// rebuild when the linker changes, aya-build does not track it
	let bpf_linker = which("bpf-linker").map_err(|_| Error::ToolNotFound("bpf-linker"))?;
	println!("cargo:rerun-if-changed={}", bpf_linker.display());

	generate_vmlinux()
}

// Needs /sys/kernel/btf/vmlinux (CONFIG_DEBUG_INFO_BTF=y) and `aya-tool` in PATH.
fn generate_vmlinux() -> Result<()> {
	let out = PathBuf::from(env::var("OUT_DIR")?).join("vmlinux.rs");
	let aya_tool = which("aya-tool").map_err(|_| Error::ToolNotFound("aya-tool"))?;
	println!("cargo:rerun-if-changed=/sys/kernel/btf/vmlinux");

	let output = Command::new(aya_tool).arg("generate").args(VMLINUX_TYPES).output()?;
	if !output.status.success() {
		return Err(Error::GenerateFail(String::from_utf8_lossy(&output.stderr).into_owned()));
	}
	fs::write(out, output.stdout)?;

	Ok(())
}
