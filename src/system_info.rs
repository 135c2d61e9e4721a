//! Host description for the report header.
//!
//! Detection is best-effort: anything that cannot be read is left `None`
//! and rendered as "unknown".

use crate::probe::GpuProbe;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;

/// Facts about the machine the benchmark ran on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Host name, if it could be read.
    pub hostname: Option<String>,
    /// Operating system family (`linux`, `macos`, ...).
    pub os: String,
    /// CPU architecture (`x86_64`, `aarch64`, ...).
    pub arch: String,
    /// CPU model string.
    pub cpu: Option<String>,
    /// Physical memory in MB.
    pub total_memory_mb: Option<u64>,
    /// GPU name reported by the probe tool.
    pub gpu: Option<String>,
    /// Inference model under test.
    pub model: String,
}

impl SystemInfo {
    /// Detect host facts. The GPU name comes from the probe tool when present.
    pub async fn detect(gpu: &GpuProbe, model: &str) -> Self {
        let gpu_name = if gpu.is_installed() {
            gpu.gpu_name().await
        } else {
            None
        };
        Self {
            hostname: detect_hostname().await,
            os: std::env::consts::OS.to_owned(),
            arch: std::env::consts::ARCH.to_owned(),
            cpu: detect_cpu().await,
            total_memory_mb: detect_total_memory_bytes().await.map(|b| b / (1024 * 1024)),
            gpu: gpu_name,
            model: model.to_owned(),
        }
    }
}

/// Trimmed stdout of a successful `program args...`, `None` otherwise.
async fn command_stdout(program: &str, args: &[&str]) -> Option<String> {
    let out = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .ok()?;
    if !out.status.success() {
        return None;
    }
    let stdout = String::from_utf8(out.stdout).ok()?;
    Some(stdout.trim().to_owned()).filter(|s| !s.is_empty())
}

async fn detect_hostname() -> Option<String> {
    if cfg!(target_os = "linux")
        && let Ok(name) = tokio::fs::read_to_string("/proc/sys/kernel/hostname").await
    {
        let name = name.trim();
        if !name.is_empty() {
            return Some(name.to_owned());
        }
    }
    command_stdout("hostname", &[]).await
}

async fn detect_total_memory_bytes() -> Option<u64> {
    if cfg!(target_os = "macos") {
        return command_stdout("sysctl", &["-n", "hw.memsize"]).await?.parse().ok();
    }
    if cfg!(target_os = "linux") {
        let content = tokio::fs::read_to_string("/proc/meminfo").await.ok()?;
        return parse_meminfo_total(&content);
    }
    None
}

/// `MemTotal:` from `/proc/meminfo`, in bytes.
fn parse_meminfo_total(content: &str) -> Option<u64> {
    content.lines().find_map(|line| {
        let rest = line.strip_prefix("MemTotal:")?;
        let kb = rest.split_whitespace().next()?.parse::<u64>().ok()?;
        Some(kb.saturating_mul(1024))
    })
}

async fn detect_cpu() -> Option<String> {
    if cfg!(target_os = "macos") {
        return command_stdout("sysctl", &["-n", "machdep.cpu.brand_string"]).await;
    }
    if cfg!(target_os = "linux") {
        let content = tokio::fs::read_to_string("/proc/cpuinfo").await.ok()?;
        return parse_cpu_model(&content);
    }
    None
}

fn parse_cpu_model(content: &str) -> Option<String> {
    content.lines().find_map(|line| {
        let rest = line.strip_prefix("model name")?;
        let (_, v) = rest.split_once(':')?;
        let v = v.trim();
        if v.is_empty() { None } else { Some(v.to_owned()) }
    })
}
