//! Core data models for the benchmark agent

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::ValidationError;

/// Label applied to every container the agent creates
pub const MARKER_LABEL: &str = "benchmark-agent/managed";

/// Value of [`MARKER_LABEL`] on agent-managed containers
pub const MARKER_VALUE: &str = "true";

/// Highest accepted intensity value
pub const MAX_INTENSITY: u32 = 100;

/// Declarative description of a containerized benchmark workload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BenchmarkSpec {
    /// Unique benchmark name, also the prefix of every replica container name
    pub name: String,
    /// Image reference in `repo[:tag]` form
    pub image: String,
    #[serde(default)]
    pub command: CommandSpec,
    /// Requested replica count; anything below 1 means a single replica
    #[serde(default)]
    pub count: i32,
    /// Workload aggressiveness on a 0-100 scale
    pub intensity: u32,
    #[serde(default, alias = "cgroup", skip_serializing_if = "Option::is_none")]
    pub cgroup_config: Option<CgroupConfig>,
    #[serde(default, alias = "net", skip_serializing_if = "Option::is_none")]
    pub net_config: Option<NetConfig>,
    #[serde(
        default,
        rename = "hostConfig",
        alias = "targetHostConfig",
        skip_serializing_if = "Option::is_none"
    )]
    pub target_host_config: Option<TargetHostConfig>,
    #[serde(default, alias = "duration", skip_serializing_if = "Option::is_none")]
    pub duration_config: Option<DurationConfig>,
}

/// Command line of the benchmark process
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// Control intensity through the container's CPU quota
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CgroupConfig {
    #[serde(default)]
    pub set_cpu_quota: bool,
}

/// Control intensity through a bandwidth target passed to the benchmark
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetConfig {
    /// Bandwidth in Mbit/s reached at intensity 100
    pub max_bw: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
}

/// Host the benchmark should target
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetHostConfig {
    pub target_host: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
}

/// Maximum run duration of the benchmark, in seconds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DurationConfig {
    pub max_duration: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arg: Option<String>,
}

/// How intensity reaches the benchmark process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntensityControl<'a> {
    /// CPU quota/period pair on the container's resource limits
    CpuQuota,
    /// Bandwidth value appended to the command line
    NetworkBandwidth(&'a NetConfig),
    /// Raw intensity appended to the command line
    Argument,
}

impl BenchmarkSpec {
    /// Number of replicas actually deployed
    pub fn replica_count(&self) -> u32 {
        u32::try_from(self.count).unwrap_or(0).max(1)
    }

    /// Select the intensity encoding.
    ///
    /// Precedence: cgroup CPU quota, then network bandwidth, then the plain
    /// argument fallback. Target host and duration layer on top of whichever
    /// is chosen.
    pub fn intensity_control(&self) -> IntensityControl<'_> {
        match (&self.cgroup_config, &self.net_config) {
            (Some(cgroup), _) if cgroup.set_cpu_quota => IntensityControl::CpuQuota,
            (_, Some(net)) => IntensityControl::NetworkBandwidth(net),
            _ => IntensityControl::Argument,
        }
    }

    /// Check the fields that cannot be expressed through deserialization alone
    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_name(&self.name)?;
        if self.image.trim().is_empty() {
            return Err(ValidationError::MissingField("image"));
        }
        validate_intensity(self.intensity)?;
        if let Some(host) = &self.target_host_config {
            if host.target_host.trim().is_empty() {
                return Err(ValidationError::MissingField("hostConfig.targetHost"));
            }
        }
        Ok(())
    }
}

/// Names become container name prefixes, so they follow the runtime's rules
pub fn validate_name(name: &str) -> Result<(), ValidationError> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err(ValidationError::MissingField("name"));
    };
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if !first.is_ascii_alphanumeric() || !valid_rest {
        return Err(ValidationError::InvalidName(name.to_string()));
    }
    Ok(())
}

pub fn validate_intensity(intensity: u32) -> Result<(), ValidationError> {
    if intensity > MAX_INTENSITY {
        return Err(ValidationError::IntensityOutOfRange(intensity));
    }
    Ok(())
}

/// Body of an intensity update request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateRequest {
    pub intensity: u32,
}

/// Lifecycle state of a deployment record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentState {
    Creating,
    Deploying,
    Deployed,
    Failed,
}

impl DeploymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "CREATING",
            Self::Deploying => "DEPLOYING",
            Self::Deployed => "DEPLOYED",
            Self::Failed => "FAILED",
        }
    }

    /// Returns true once no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deployed | Self::Failed)
    }

    /// Forward-only transitions along the deploy path
    pub fn can_transition_to(&self, next: DeploymentState) -> bool {
        matches!(
            (self, next),
            (Self::Creating, Self::Deploying)
                | (Self::Creating, Self::Failed)
                | (Self::Deploying, Self::Deployed)
                | (Self::Deploying, Self::Failed)
        )
    }
}

impl fmt::Display for DeploymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry view of one benchmark deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub name: String,
    pub benchmark: BenchmarkSpec,
    /// Replica container name -> runtime container id
    pub name_to_id: BTreeMap<String, String>,
    pub state: DeploymentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl DeploymentRecord {
    /// Fresh record for a just-reserved benchmark
    pub fn new(benchmark: BenchmarkSpec) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            name: benchmark.name.clone(),
            benchmark,
            name_to_id: BTreeMap::new(),
            state: DeploymentState::Creating,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Deterministic replica container names, 1-indexed
    pub fn replica_names(&self) -> impl Iterator<Item = String> + '_ {
        (1..=self.benchmark.replica_count()).map(|index| replica_name(&self.name, index))
    }
}

/// Container name of replica `index` of benchmark `benchmark`
pub fn replica_name(benchmark: &str, index: u32) -> String {
    format!("{}{}", benchmark, index)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_json(extra: &str) -> String {
        format!(r#"{{"name":"cpu-burn","image":"bench:v1","intensity":60{}}}"#, extra)
    }

    #[test]
    fn test_replica_count_defaults_to_one() {
        for count in [-3, 0, 1] {
            let spec: BenchmarkSpec =
                serde_json::from_str(&spec_json(&format!(r#","count":{}"#, count))).unwrap();
            assert_eq!(spec.replica_count(), 1);
        }

        let spec: BenchmarkSpec = serde_json::from_str(&spec_json(r#","count":3"#)).unwrap();
        assert_eq!(spec.replica_count(), 3);
    }

    #[test]
    fn test_intensity_is_required() {
        let result: Result<BenchmarkSpec, _> =
            serde_json::from_str(r#"{"name":"a","image":"busybox"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_mode_aliases_are_accepted() {
        let spec: BenchmarkSpec =
            serde_json::from_str(&spec_json(r#","cgroup":{"setCpuQuota":true}"#)).unwrap();
        assert_eq!(spec.intensity_control(), IntensityControl::CpuQuota);

        let spec: BenchmarkSpec = serde_json::from_str(&spec_json(
            r#","hostConfig":{"targetHost":"10.0.0.2","arg":"-h"}"#,
        ))
        .unwrap();
        assert_eq!(spec.target_host_config.unwrap().target_host, "10.0.0.2");
    }

    #[test]
    fn test_intensity_control_precedence() {
        let mut spec: BenchmarkSpec = serde_json::from_str(&spec_json("")).unwrap();
        assert_eq!(spec.intensity_control(), IntensityControl::Argument);

        let net = NetConfig {
            max_bw: 100,
            arg: None,
        };
        spec.net_config = Some(net.clone());
        assert_eq!(
            spec.intensity_control(),
            IntensityControl::NetworkBandwidth(&net)
        );

        // A cgroup config without the quota flag does not select cgroup mode
        spec.cgroup_config = Some(CgroupConfig {
            set_cpu_quota: false,
        });
        assert_eq!(
            spec.intensity_control(),
            IntensityControl::NetworkBandwidth(&net)
        );

        spec.cgroup_config = Some(CgroupConfig {
            set_cpu_quota: true,
        });
        assert_eq!(spec.intensity_control(), IntensityControl::CpuQuota);
    }

    #[test]
    fn test_validate() {
        let mut spec: BenchmarkSpec = serde_json::from_str(&spec_json("")).unwrap();
        assert!(spec.validate().is_ok());

        spec.intensity = 101;
        assert!(matches!(
            spec.validate(),
            Err(ValidationError::IntensityOutOfRange(101))
        ));

        spec.intensity = 10;
        spec.name = String::new();
        assert!(matches!(
            spec.validate(),
            Err(ValidationError::MissingField("name"))
        ));

        spec.name = "bad/name".to_string();
        assert!(matches!(spec.validate(), Err(ValidationError::InvalidName(_))));

        spec.name = "ok".to_string();
        spec.image = " ".to_string();
        assert!(matches!(
            spec.validate(),
            Err(ValidationError::MissingField("image"))
        ));
    }

    #[test]
    fn test_state_transitions_are_monotonic() {
        use DeploymentState::*;

        assert!(Creating.can_transition_to(Deploying));
        assert!(Creating.can_transition_to(Failed));
        assert!(Deploying.can_transition_to(Deployed));
        assert!(Deploying.can_transition_to(Failed));

        assert!(!Deploying.can_transition_to(Creating));
        assert!(!Deployed.can_transition_to(Deploying));
        assert!(!Deployed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Deploying));
        assert!(!Creating.can_transition_to(Deployed));
    }

    #[test]
    fn test_record_serialization() {
        let spec: BenchmarkSpec = serde_json::from_str(&spec_json(r#","count":2"#)).unwrap();
        let record = DeploymentRecord::new(spec);
        let names: Vec<String> = record.replica_names().collect();
        assert_eq!(names, vec!["cpu-burn1", "cpu-burn2"]);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["state"], "CREATING");
        assert!(json["nameToId"].is_object());
        assert!(json.get("error").is_none());
    }
}
