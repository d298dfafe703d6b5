use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

/// ifstat 빌드 태스크
#[derive(Parser)]
#[command(name = "xtask")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// XDP 커널 프로그램 빌드 (nightly + bpf-linker 필요)
    BuildEbpf {
        /// 릴리스 모드로 빌드
        #[arg(long)]
        release: bool,
    },
}

const EBPF_CRATE_DIR: &str = "crates/ebpf-engine/ebpf";
const BPF_TARGET: &str = "bpfel-unknown-none";

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::BuildEbpf { release } => build_ebpf(release),
    }
}

fn build_ebpf(release: bool) -> Result<()> {
    let workspace = workspace_root();
    let mut cmd = Command::new("cargo");
    cmd.current_dir(workspace.join(EBPF_CRATE_DIR));

    // 오브젝트를 워크스페이스 target/ 아래에 두어 기본 program_path와 맞춤
    cmd.args([
        "+nightly",
        "build",
        &format!("--target={BPF_TARGET}"),
        "-Z",
        "build-std=core",
    ]);
    cmd.arg("--target-dir").arg(workspace.join("target"));

    if release {
        cmd.arg("--release");
    }

    let status = cmd
        .status()
        .context("failed to run cargo for the XDP program")?;
    if !status.success() {
        bail!("XDP program build failed ({status})");
    }

    let profile = if release { "release" } else { "debug" };
    println!(
        "XDP program built: target/{BPF_TARGET}/{profile}/ifstat-ebpf"
    );
    Ok(())
}

fn workspace_root() -> PathBuf {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .map(PathBuf::from)
        .unwrap_or(manifest_dir)
}
