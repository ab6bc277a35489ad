// ── Transaction recipes ──
//
// A recipe is everything Commit needs without the context that produced
// it: the before and after images of the edited entity and the ordered,
// daemon-annotated command list. Recipes are persisted as JSON inside
// scheduled changes, so every field round-trips through serde.

use keafly_api::KeaCommand;
use serde::{Deserialize, Serialize};

use crate::keaconfig::KeaConfig;
use crate::model::{DaemonId, Host, HostId, SharedNetwork, SharedNetworkId, Subnet, SubnetId};

/// A command together with the daemon it must be sent to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedCommand {
    pub daemon_id: DaemonId,
    pub command: KeaCommand,
}

impl AnnotatedCommand {
    pub fn new(daemon_id: DaemonId, command: KeaCommand) -> Self {
        Self { daemon_id, command }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostRecipe {
    #[serde(default)]
    pub host_before: Option<Host>,
    #[serde(default)]
    pub host_after: Option<Host>,
    #[serde(default)]
    pub commands: Vec<AnnotatedCommand>,
    /// Id assigned by the store once an added host is committed.
    #[serde(default)]
    pub added_host_id: Option<HostId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SubnetRecipe {
    #[serde(default)]
    pub subnet_before: Option<Subnet>,
    #[serde(default)]
    pub subnet_after: Option<Subnet>,
    #[serde(default)]
    pub commands: Vec<AnnotatedCommand>,
    #[serde(default)]
    pub added_subnet_id: Option<SubnetId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SharedNetworkRecipe {
    #[serde(default)]
    pub shared_network_before: Option<SharedNetwork>,
    #[serde(default)]
    pub shared_network_after: Option<SharedNetwork>,
    #[serde(default)]
    pub commands: Vec<AnnotatedCommand>,
    #[serde(default)]
    pub added_shared_network_id: Option<SharedNetworkId>,
}

/// Full configuration of one daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfigImage {
    pub daemon_id: DaemonId,
    pub config: KeaConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalParametersRecipe {
    /// Configurations as loaded by Begin.
    #[serde(default)]
    pub configs_before: Vec<DaemonConfigImage>,
    /// Configurations with the modified parameters merged in.
    #[serde(default)]
    pub configs_after: Vec<DaemonConfigImage>,
    #[serde(default)]
    pub commands: Vec<AnnotatedCommand>,
}

/// Recipe of one update; the variant follows the edited entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Recipe {
    Host(HostRecipe),
    Subnet(SubnetRecipe),
    SharedNetwork(SharedNetworkRecipe),
    GlobalParameters(GlobalParametersRecipe),
}

impl Recipe {
    pub fn commands(&self) -> &[AnnotatedCommand] {
        match self {
            Self::Host(r) => &r.commands,
            Self::Subnet(r) => &r.commands,
            Self::SharedNetwork(r) => &r.commands,
            Self::GlobalParameters(r) => &r.commands,
        }
    }

    /// Short name of the variant, for log and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Host(_) => "host",
            Self::Subnet(_) => "subnet",
            Self::SharedNetwork(_) => "shared network",
            Self::GlobalParameters(_) => "global parameters",
        }
    }
}
