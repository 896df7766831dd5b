use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display name used when a record has no name attribute
pub const NO_NAME: &str = "(no name)";

/// Maximum length (in characters) of a tag key
pub const MAX_TAG_KEY_LEN: usize = 128;

/// The closed set of resource kinds the selector can display
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
    clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RecordKind {
    /// A virtual machine
    #[value(alias = "instance")]
    Vm,
    /// An auto-scaling group of virtual machines
    #[value(alias = "asg")]
    ScalingGroup,
    /// A managed kubernetes cluster
    #[value(alias = "eks")]
    Cluster,
    /// A node group belonging to a managed cluster
    NodeGroup,
    /// A single version of a launch template
    #[value(alias = "lt")]
    TemplateVersion,
}

/// Error raised when a record doesn't hold its invariants
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// The record identifier is empty
    EmptyIdentifier(RecordKind),
    /// A tag key is empty
    EmptyTagKey,
    /// A tag key is longer than [`MAX_TAG_KEY_LEN`]
    TagKeyTooLong(String),
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::EmptyIdentifier(kind) => write!(f, "{kind} record has an empty identifier"),
            RecordError::EmptyTagKey => write!(f, "tag keys can't be empty"),
            RecordError::TagKeyTooLong(key) => {
                write!(f, "tag key '{key}' exceeds {MAX_TAG_KEY_LEN} characters")
            }
        }
    }
}

impl std::error::Error for RecordError {}

/// Bag of tags attached to a record, keys are unique and non-empty
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct Tags(BTreeMap<String, String>);

impl Tags {
    /// Builds a new tag bag, validating every key
    pub fn new<K, V>(tags: impl IntoIterator<Item = (K, V)>) -> Result<Self, RecordError>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut map = BTreeMap::new();
        for (key, value) in tags {
            let key = key.into();
            if key.is_empty() {
                return Err(RecordError::EmptyTagKey);
            }
            if key.chars().count() > MAX_TAG_KEY_LEN {
                return Err(RecordError::TagKeyTooLong(key));
            }
            map.insert(key, value.into());
        }
        Ok(Self(map))
    }

    /// Retrieves the value of a tag
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Whether the tag is present
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterates over the tags, sorted by key
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterates over the tag values
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TryFrom<BTreeMap<String, String>> for Tags {
    type Error = RecordError;

    fn try_from(value: BTreeMap<String, String>) -> Result<Self, Self::Error> {
        Tags::new(value)
    }
}

impl From<Tags> for BTreeMap<String, String> {
    fn from(value: Tags) -> Self {
        value.0
    }
}

/// Attributes shared by every record variant
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMeta {
    /// Opaque identifier, unique within a region
    pub id: String,
    /// Display name, might be empty
    #[serde(default)]
    pub name: String,
    /// Creation time (launch time for virtual machines)
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Tags attached to the resource
    #[serde(default)]
    pub tags: Tags,
}

macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident),* $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Clone,
            Copy,
            Debug,
            Default,
            PartialEq,
            Eq,
            Hash,
            Serialize,
            Deserialize,
            strum::Display,
            strum::EnumString,
            strum::IntoStaticStr,
        )]
        #[serde(rename_all = "kebab-case")]
        #[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
        pub enum $name {
            /// The status couldn't be determined
            #[default]
            Unknown,
            $($(#[$vmeta])* $variant),*
        }
    };
}

status_enum! {
    /// Lifecycle state of a virtual machine
    VmState {
        Pending,
        Running,
        Stopping,
        Stopped,
        ShuttingDown,
        Terminated,
    }
}

status_enum! {
    /// Status of an auto-scaling group
    GroupStatus {
        Active,
        Updating,
        Deleting,
    }
}

status_enum! {
    /// Status of a managed cluster
    ClusterStatus {
        Creating,
        Active,
        Updating,
        Deleting,
        Failed,
        Pending,
    }
}

status_enum! {
    /// Status of a cluster node group
    NodeGroupStatus {
        Creating,
        Active,
        Updating,
        Deleting,
        CreateFailed,
        DeleteFailed,
        Degraded,
    }
}

/// Reference to a launch template, from a group or a node group
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version: String,
}

/// A virtual machine
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmRecord {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub state: VmState,
    pub instance_type: String,
    pub availability_zone: String,
    pub private_ip: String,
    pub public_ip: String,
    pub private_dns: String,
    pub public_dns: String,
    pub instance_profile: String,
    pub security_groups: Vec<String>,
}

/// An auto-scaling group, identified by its name
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingGroupRecord {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub status: GroupStatus,
    pub desired: u32,
    pub min: u32,
    pub max: u32,
    pub current: u32,
    pub health_check_type: String,
    pub launch_template: Option<TemplateRef>,
    pub launch_configuration: Option<String>,
    pub availability_zones: Vec<String>,
}

/// A managed kubernetes cluster, identified by its name
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterRecord {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub status: ClusterStatus,
    pub version: String,
    pub arn: String,
    pub endpoint: String,
    pub vpc_id: String,
    pub subnet_ids: Vec<String>,
    pub security_group_ids: Vec<String>,
    pub node_groups: Vec<String>,
    pub compute_profiles: Vec<String>,
}

impl ClusterRecord {
    /// Whether this cluster only carries its name, as a placeholder left by a failed describe
    pub fn needs_details(&self) -> bool {
        self.status == ClusterStatus::Unknown && self.version.is_empty()
    }
}

/// A node group, identified by `<cluster>/<name>`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeGroupRecord {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub cluster: String,
    pub status: NodeGroupStatus,
    pub version: String,
    pub desired: u32,
    pub min: u32,
    pub max: u32,
    pub current: u32,
    pub instance_types: Vec<String>,
    pub launch_template: Option<TemplateRef>,
}

/// A launch template version, identified by `<template-id>:<version>`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateVersionRecord {
    #[serde(flatten)]
    pub meta: RecordMeta,
    pub template_id: String,
    /// Version number, `-1` stands for `$Latest` and `-2` for `$Default`
    pub version: i64,
    pub is_default: bool,
    pub description: String,
    pub created_by: String,
}

/// One entity displayed in the selector
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, strum::EnumIs)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Record {
    Vm(VmRecord),
    ScalingGroup(ScalingGroupRecord),
    Cluster(ClusterRecord),
    NodeGroup(NodeGroupRecord),
    TemplateVersion(TemplateVersionRecord),
}

impl Record {
    /// Builds a record carrying only its identifier, used when its details couldn't be retrieved
    pub fn placeholder(kind: RecordKind, id: impl Into<String>) -> Self {
        let meta = RecordMeta {
            id: id.into(),
            ..Default::default()
        };
        match kind {
            RecordKind::Vm => Record::Vm(VmRecord {
                meta,
                ..Default::default()
            }),
            RecordKind::ScalingGroup => Record::ScalingGroup(ScalingGroupRecord {
                meta,
                ..Default::default()
            }),
            RecordKind::Cluster => Record::Cluster(ClusterRecord {
                meta,
                ..Default::default()
            }),
            RecordKind::NodeGroup => Record::NodeGroup(NodeGroupRecord {
                meta,
                ..Default::default()
            }),
            RecordKind::TemplateVersion => Record::TemplateVersion(TemplateVersionRecord {
                meta,
                ..Default::default()
            }),
        }
    }

    /// Checks the record invariants
    pub fn validate(&self) -> Result<(), RecordError> {
        if self.meta().id.trim().is_empty() {
            return Err(RecordError::EmptyIdentifier(self.kind()));
        }
        Ok(())
    }

    /// The kind of this record
    pub fn kind(&self) -> RecordKind {
        match self {
            Record::Vm(_) => RecordKind::Vm,
            Record::ScalingGroup(_) => RecordKind::ScalingGroup,
            Record::Cluster(_) => RecordKind::Cluster,
            Record::NodeGroup(_) => RecordKind::NodeGroup,
            Record::TemplateVersion(_) => RecordKind::TemplateVersion,
        }
    }

    /// Shared attributes
    pub fn meta(&self) -> &RecordMeta {
        match self {
            Record::Vm(r) => &r.meta,
            Record::ScalingGroup(r) => &r.meta,
            Record::Cluster(r) => &r.meta,
            Record::NodeGroup(r) => &r.meta,
            Record::TemplateVersion(r) => &r.meta,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.meta().id
    }

    /// The raw name attribute, might be empty
    pub fn name(&self) -> &str {
        &self.meta().name
    }

    /// The name to display, falling back to [`NO_NAME`]
    pub fn display_name(&self) -> &str {
        let name = self.name();
        if name.is_empty() { NO_NAME } else { name }
    }

    /// The status token of the record
    pub fn status(&self) -> &'static str {
        match self {
            Record::Vm(r) => r.state.into(),
            Record::ScalingGroup(r) => r.status.into(),
            Record::Cluster(r) => r.status.into(),
            Record::NodeGroup(r) => r.status.into(),
            Record::TemplateVersion(r) if r.is_default => "default",
            Record::TemplateVersion(_) => "available",
        }
    }

    pub fn tags(&self) -> &Tags {
        &self.meta().tags
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.meta().created_at
    }

    /// Private address, only virtual machines have one
    pub fn private_ip(&self) -> &str {
        match self {
            Record::Vm(r) => &r.private_ip,
            _ => "",
        }
    }

    /// Public address, only virtual machines have one
    pub fn public_ip(&self) -> &str {
        match self {
            Record::Vm(r) => &r.public_ip,
            _ => "",
        }
    }

    pub fn private_dns(&self) -> &str {
        match self {
            Record::Vm(r) => &r.private_dns,
            _ => "",
        }
    }

    pub fn public_dns(&self) -> &str {
        match self {
            Record::Vm(r) => &r.public_dns,
            _ => "",
        }
    }

    /// Instance types this record runs
    pub fn instance_types(&self) -> Vec<&str> {
        match self {
            Record::Vm(r) if !r.instance_type.is_empty() => vec![r.instance_type.as_str()],
            Record::NodeGroup(r) => r.instance_types.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Availability zones this record spans
    pub fn zones(&self) -> Vec<&str> {
        match self {
            Record::Vm(r) if !r.availability_zone.is_empty() => vec![r.availability_zone.as_str()],
            Record::ScalingGroup(r) => r.availability_zones.iter().map(String::as_str).collect(),
            _ => Vec::new(),
        }
    }

    /// Ordered list of the most relevant attributes, as `(label, value)`
    pub fn primary_fields(&self) -> Vec<(&'static str, String)> {
        let created = |at: Option<DateTime<Utc>>| at.map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string());
        let mut fields = Vec::new();
        match self {
            Record::Vm(r) => {
                fields.push(("Name", self.display_name().to_owned()));
                fields.push(("Instance ID", r.meta.id.clone()));
                fields.push(("State", self.status().to_owned()));
                fields.push(("Instance Type", r.instance_type.clone()));
                fields.push(("Availability", r.availability_zone.clone()));
                if let Some(at) = created(r.meta.created_at) {
                    fields.push(("Launch Time", at));
                }
            }
            Record::ScalingGroup(r) => {
                fields.push(("Name", self.display_name().to_owned()));
                fields.push(("Status", self.status().to_owned()));
                fields.push(("Health Check", r.health_check_type.clone()));
                if let Some(at) = created(r.meta.created_at) {
                    fields.push(("Created", at));
                }
            }
            Record::Cluster(r) => {
                fields.push(("Name", self.display_name().to_owned()));
                fields.push(("Status", self.status().to_owned()));
                fields.push(("Version", r.version.clone()));
                if let Some(at) = created(r.meta.created_at) {
                    fields.push(("Created", at));
                }
                fields.push(("ARN", r.arn.clone()));
            }
            Record::NodeGroup(r) => {
                fields.push(("Name", self.display_name().to_owned()));
                fields.push(("Cluster", r.cluster.clone()));
                fields.push(("Status", self.status().to_owned()));
                fields.push(("Version", r.version.clone()));
                if let Some(at) = created(r.meta.created_at) {
                    fields.push(("Created", at));
                }
            }
            Record::TemplateVersion(r) => {
                fields.push(("Version", version_label(r.version, r.is_default)));
                fields.push(("Name", self.display_name().to_owned()));
                fields.push(("ID", r.template_id.clone()));
            }
        }
        fields
    }
}

/// Formats a launch template version number
///
/// # Examples
///
/// ```rust
/// # use fleet_select::model::version_label;
/// assert_eq!(version_label(-1, false), "$Latest");
/// assert_eq!(version_label(-2, false), "$Default");
/// assert_eq!(version_label(3, true), "3 (Default)");
/// assert_eq!(version_label(4, false), "4");
/// ```
pub fn version_label(version: i64, is_default: bool) -> String {
    match version {
        -1 => String::from("$Latest"),
        -2 => String::from("$Default"),
        n if is_default => format!("{n} (Default)"),
        n => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    use super::*;

    fn vm() -> Record {
        Record::Vm(VmRecord {
            meta: RecordMeta {
                id: String::from("i-0123456789abcdef0"),
                name: String::from("web-01"),
                created_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()),
                tags: Tags::new([("Env", "prod"), ("Team", "core")]).unwrap(),
            },
            state: VmState::Running,
            instance_type: String::from("t3.micro"),
            availability_zone: String::from("eu-west-1a"),
            private_ip: String::from("10.0.0.1"),
            security_groups: vec![String::from("sg-1")],
            ..Default::default()
        })
    }

    #[test]
    fn test_tags_validation() {
        assert_eq!(Tags::new([("", "x")]), Err(RecordError::EmptyTagKey));
        let long = "k".repeat(MAX_TAG_KEY_LEN + 1);
        assert_eq!(
            Tags::new([(long.clone(), String::from("x"))]),
            Err(RecordError::TagKeyTooLong(long))
        );
        assert!(Tags::new([("k".repeat(MAX_TAG_KEY_LEN), "x")]).is_ok());
    }

    #[test]
    fn test_tags_deserialize_rejects_invalid_keys() {
        let res: Result<Tags, _> = serde_json::from_str(r#"{"": "value"}"#);
        assert!(res.is_err());
    }

    #[test]
    fn test_display_name_fallback() {
        let record = Record::placeholder(RecordKind::Vm, "i-1");
        assert_eq!(record.display_name(), NO_NAME);
        assert_eq!(vm().display_name(), "web-01");
    }

    #[test]
    fn test_validate() {
        assert!(vm().validate().is_ok());
        assert_eq!(
            Record::placeholder(RecordKind::Cluster, " ").validate(),
            Err(RecordError::EmptyIdentifier(RecordKind::Cluster))
        );
    }

    #[test]
    fn test_status_tokens() {
        assert_eq!(vm().status(), "running");
        let ng = Record::NodeGroup(NodeGroupRecord {
            status: NodeGroupStatus::CreateFailed,
            ..Default::default()
        });
        assert_eq!(ng.status(), "create-failed");
        let tv = Record::TemplateVersion(TemplateVersionRecord {
            is_default: true,
            ..Default::default()
        });
        assert_eq!(tv.status(), "default");
        assert_eq!("Shutting-Down".parse::<VmState>(), Ok(VmState::ShuttingDown));
    }

    #[test]
    fn test_serde_round_trip() {
        let record = vm();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains(r#""kind":"vm""#));
        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_deserialize_minimal_cluster() {
        let record: Record = serde_json::from_str(r#"{"kind":"cluster","id":"prod"}"#).unwrap();
        let Record::Cluster(cluster) = &record else {
            panic!("expected a cluster");
        };
        assert!(cluster.needs_details());
        assert_eq!(record.identifier(), "prod");
        assert_eq!(record.status(), "unknown");
    }

    #[test]
    fn test_primary_fields() {
        let fields = vm().primary_fields();
        let labels = fields.iter().map(|(l, _)| *l).collect::<Vec<_>>();
        assert_eq!(
            labels,
            vec!["Name", "Instance ID", "State", "Instance Type", "Availability", "Launch Time"]
        );
        assert_eq!(fields[5].1, "2024-03-01 10:00:00");
    }

    #[test]
    fn test_network_accessors_for_groups() {
        let group = Record::ScalingGroup(ScalingGroupRecord {
            availability_zones: vec![String::from("a"), String::from("b")],
            ..Default::default()
        });
        assert_eq!(group.private_ip(), "");
        assert_eq!(group.zones(), vec!["a", "b"]);
        assert!(group.instance_types().is_empty());
    }
}
