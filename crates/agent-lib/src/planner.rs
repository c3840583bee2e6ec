//! Deployment planning
//!
//! Turns a [`BenchmarkSpec`] into the concrete container configuration shared
//! by all of its replicas. Planning is pure: no runtime calls happen here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::models::{BenchmarkSpec, IntensityControl, MARKER_LABEL, MARKER_VALUE};

/// CFS period used for every CPU quota the agent sets, in microseconds
pub const CPU_PERIOD: i64 = 100_000;

/// Quota value Docker reads as "no limit"; a quota of 0 would leave the old limit in place
pub const UNLIMITED_QUOTA: i64 = -1;

const DEFAULT_TAG: &str = "latest";

/// Image reference split into repository and tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub repo: String,
    pub tag: String,
}

impl ImageRef {
    /// Split `repo[:tag]`; a colon inside a registry host (`host:5000/img`) is not a tag
    pub fn parse(image: &str) -> Self {
        match image.rsplit_once(':') {
            Some((repo, tag)) if !tag.is_empty() && !tag.contains('/') && !repo.is_empty() => Self {
                repo: repo.to_string(),
                tag: tag.to_string(),
            },
            Some((repo, "")) if !repo.is_empty() => Self {
                repo: repo.to_string(),
                tag: DEFAULT_TAG.to_string(),
            },
            _ => Self {
                repo: image.to_string(),
                tag: DEFAULT_TAG.to_string(),
            },
        }
    }
}

impl fmt::Display for ImageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.repo, self.tag)
    }
}

/// CPU quota/period pair applied to a container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuLimits {
    pub period: i64,
    pub quota: i64,
}

impl CpuLimits {
    /// `quota = period * intensity / 100`, truncated. Intensity 0 lifts the limit.
    pub fn for_intensity(intensity: u32) -> Self {
        let quota = match intensity {
            0 => UNLIMITED_QUOTA,
            n => CPU_PERIOD * i64::from(n) / 100,
        };
        Self {
            period: CPU_PERIOD,
            quota,
        }
    }
}

/// Container configuration shared by every replica of a benchmark
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerPlan {
    pub image: ImageRef,
    pub command: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub cpu_limits: Option<CpuLimits>,
    pub host_network: bool,
    pub auto_remove: bool,
    pub publish_all_ports: bool,
}

/// Build the container plan for `spec`
pub fn plan(spec: &BenchmarkSpec) -> ContainerPlan {
    let mut command = Vec::new();
    if !spec.command.path.is_empty() {
        command.push(spec.command.path.clone());
    }
    command.extend(spec.command.args.iter().cloned());

    if let Some(duration) = &spec.duration_config {
        push_flagged(
            &mut command,
            duration.arg.as_deref(),
            duration.max_duration.to_string(),
        );
    }

    let mut cpu_limits = None;
    match spec.intensity_control() {
        IntensityControl::CpuQuota => {
            cpu_limits = Some(CpuLimits::for_intensity(spec.intensity));
        }
        IntensityControl::NetworkBandwidth(net) => {
            push_flagged(
                &mut command,
                net.arg.as_deref(),
                bandwidth_target(net.max_bw, spec.intensity),
            );
        }
        IntensityControl::Argument => command.push(spec.intensity.to_string()),
    }

    if let Some(host) = &spec.target_host_config {
        push_flagged(&mut command, host.arg.as_deref(), host.target_host.clone());
    }

    let labels = BTreeMap::from([(MARKER_LABEL.to_string(), MARKER_VALUE.to_string())]);

    ContainerPlan {
        image: ImageRef::parse(&spec.image),
        command,
        labels,
        cpu_limits,
        host_network: true,
        auto_remove: true,
        publish_all_ports: true,
    }
}

/// `max_bw * intensity / 100` megabits, formatted as `"<bw>M"`
pub fn bandwidth_target(max_bw: u64, intensity: u32) -> String {
    format!("{}M", max_bw * u64::from(intensity) / 100)
}

fn push_flagged(command: &mut Vec<String>, flag: Option<&str>, value: String) {
    if let Some(flag) = flag.filter(|f| !f.is_empty()) {
        command.push(flag.to_string());
    }
    command.push(value);
}
