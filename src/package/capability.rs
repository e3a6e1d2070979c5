//! Capability index derived from package tags.
//!
//! Packages advertise what they export through tags such as
//! `PSCommand_Get-Thing` or `PSDscResource_ThingResource`.

use serde::{Deserialize, Serialize};

const COMMAND_PREFIX: &str = "PSCommand_";
const CMDLET_PREFIX: &str = "PSCmdlet_";
const FUNCTION_PREFIX: &str = "PSFunction_";
const DSC_RESOURCE_PREFIX: &str = "PSDscResource_";
const ROLE_CAPABILITY_PREFIX: &str = "PSRoleCapability_";
const WORKFLOW_PREFIX: &str = "PSWorkflow_";

/// Names a package exports, grouped by kind.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CapabilityIndex {
    pub commands: Vec<String>,
    pub cmdlets: Vec<String>,
    pub functions: Vec<String>,
    pub dsc_resources: Vec<String>,
    pub role_capabilities: Vec<String>,
    pub workflows: Vec<String>,
}

impl CapabilityIndex {
    /// Build the index by stripping well-known prefixes from `tags`.
    /// Tags without a known prefix are ignored.
    pub fn from_tags<S: AsRef<str>>(tags: &[S]) -> Self {
        let mut index = Self::default();
        for tag in tags {
            let tag = tag.as_ref().trim();
            let buckets: [(&str, &mut Vec<String>); 6] = [
                (COMMAND_PREFIX, &mut index.commands),
                (CMDLET_PREFIX, &mut index.cmdlets),
                (FUNCTION_PREFIX, &mut index.functions),
                (DSC_RESOURCE_PREFIX, &mut index.dsc_resources),
                (ROLE_CAPABILITY_PREFIX, &mut index.role_capabilities),
                (WORKFLOW_PREFIX, &mut index.workflows),
            ];
            for (prefix, bucket) in buckets {
                if let Some(name) = strip_prefix_ignore_case(tag, prefix)
                    && !name.is_empty()
                    && !bucket.iter().any(|n| n.eq_ignore_ascii_case(name))
                {
                    bucket.push(name.to_string());
                    break;
                }
            }
        }
        index
    }

    pub fn is_empty(&self) -> bool {
        self.names().next().is_none()
    }

    /// Every exported name regardless of kind.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.commands
            .iter()
            .chain(&self.cmdlets)
            .chain(&self.functions)
            .chain(&self.dsc_resources)
            .chain(&self.role_capabilities)
            .chain(&self.workflows)
            .map(String::as_str)
    }

    /// Names present in both indexes, compared case-insensitively.
    pub fn collisions<'a>(&'a self, other: &CapabilityIndex) -> Vec<&'a str> {
        self.names()
            .filter(|name| other.names().any(|o| o.eq_ignore_ascii_case(name)))
            .collect()
    }
}

fn strip_prefix_ignore_case<'a>(tag: &'a str, prefix: &str) -> Option<&'a str> {
    let head = tag.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &tag[prefix.len()..])
}
