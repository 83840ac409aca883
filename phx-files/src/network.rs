//! VM interface connect/disconnect
//!
//! Interfaces are moved by the cluster, keyed by namespace (the experiment
//! name), VM, interface index, VLAN and bridge. When no bridge is given it
//! is resolved from the VLAN alias, then the experiment default, then the
//! configured fallback bridge ([`FALLBACK_BRIDGE`] unless overridden).

use crate::cluster::{error_response, ClusterError, ClusterRunner};
use crate::error::{FilesError, FilesResult};
use async_trait::async_trait;
use phx_common::config::{ExperimentConfig, FALLBACK_BRIDGE};
use phx_common::TomlConfig;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Experiment lookup
pub trait ExperimentStore: Send + Sync {
    /// Default bridge of `exp`; an error means the experiment is unknown
    fn default_bridge(&self, exp: &str) -> phx_common::Result<String>;
}

/// VLAN alias to bridge lookup
pub trait VlanBridges: Send + Sync {
    fn bridge_for(&self, vlan: &str) -> Option<String>;
}

/// One interface move
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub namespace: String,
    pub vm: String,
    pub iface: usize,
    pub vlan: String,
    pub bridge: String,
}

/// Executes interface moves in the cluster
#[async_trait]
pub trait InterfaceController: Send + Sync {
    async fn connect(&self, request: &ConnectRequest) -> Result<(), ClusterError>;

    async fn disconnect(&self, namespace: &str, vm: &str, iface: usize) -> Result<(), ClusterError>;
}

/// Experiments declared in the configuration file
#[derive(Debug, Clone)]
pub struct ConfigExperiments {
    experiments: HashMap<String, ExperimentConfig>,
    default_bridge: String,
}

impl ConfigExperiments {
    pub fn from_config(config: &TomlConfig) -> Self {
        Self {
            experiments: config.experiments.clone(),
            default_bridge: config.default_bridge.clone(),
        }
    }
}

impl ExperimentStore for ConfigExperiments {
    fn default_bridge(&self, exp: &str) -> phx_common::Result<String> {
        let experiment = self
            .experiments
            .get(exp)
            .ok_or_else(|| phx_common::Error::NotFound(format!("experiment {}", exp)))?;

        Ok(experiment
            .default_bridge
            .clone()
            .unwrap_or_else(|| self.default_bridge.clone()))
    }
}

/// VLAN aliases declared in the configuration file
#[derive(Debug, Clone, Default)]
pub struct ConfigVlanBridges(HashMap<String, String>);

impl ConfigVlanBridges {
    pub fn new(aliases: HashMap<String, String>) -> Self {
        Self(aliases)
    }
}

impl VlanBridges for ConfigVlanBridges {
    fn bridge_for(&self, vlan: &str) -> Option<String> {
        self.0.get(vlan).filter(|b| !b.is_empty()).cloned()
    }
}

/// Controller issuing minimega `vm net` commands
#[derive(Clone)]
pub struct MinimegaInterfaces {
    runner: Arc<dyn ClusterRunner>,
}

impl MinimegaInterfaces {
    pub fn new(runner: Arc<dyn ClusterRunner>) -> Self {
        Self { runner }
    }

    async fn exec(&self, command: &str) -> Result<(), ClusterError> {
        debug!(command, "Issuing interface command");
        let responses = self.runner.run(command).await?;
        match error_response(&responses) {
            Some(err) => Err(ClusterError::Other(err)),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl InterfaceController for MinimegaInterfaces {
    async fn connect(&self, request: &ConnectRequest) -> Result<(), ClusterError> {
        let command = format!(
            "namespace {} vm net connect {} {} {} {}",
            request.namespace, request.vm, request.iface, request.vlan, request.bridge
        );
        self.exec(&command).await
    }

    async fn disconnect(
        &self,
        namespace: &str,
        vm: &str,
        iface: usize,
    ) -> Result<(), ClusterError> {
        let command = format!("namespace {} vm net disconnect {} {}", namespace, vm, iface);
        self.exec(&command).await
    }
}

/// Interface connect/disconnect with bridge resolution
#[derive(Clone)]
pub struct NetworkBridge {
    experiments: Arc<dyn ExperimentStore>,
    vlans: Arc<dyn VlanBridges>,
    controller: Arc<dyn InterfaceController>,
    fallback_bridge: String,
}

impl NetworkBridge {
    pub fn new(
        experiments: Arc<dyn ExperimentStore>,
        vlans: Arc<dyn VlanBridges>,
        controller: Arc<dyn InterfaceController>,
    ) -> Self {
        Self {
            experiments,
            vlans,
            controller,
            fallback_bridge: FALLBACK_BRIDGE.to_string(),
        }
    }

    /// Bridge used when neither the VLAN alias nor the experiment names one
    pub fn with_fallback_bridge(mut self, bridge: impl Into<String>) -> Self {
        let bridge = bridge.into();
        if !bridge.is_empty() {
            self.fallback_bridge = bridge;
        }
        self
    }

    /// Config-backed lookups with the minimega controller
    pub fn from_config(config: &TomlConfig, runner: Arc<dyn ClusterRunner>) -> Self {
        Self::new(
            Arc::new(ConfigExperiments::from_config(config)),
            Arc::new(ConfigVlanBridges::new(config.vlan_bridges.clone())),
            Arc::new(MinimegaInterfaces::new(runner)),
        )
        .with_fallback_bridge(config.default_bridge.clone())
    }

    /// Bridge for `vlan` in `exp` when the caller did not name one
    pub fn resolve_bridge(&self, exp: &str, vlan: &str) -> String {
        if let Some(bridge) = self.vlans.bridge_for(vlan) {
            return bridge;
        }

        match self.experiments.default_bridge(exp) {
            Ok(bridge) if !bridge.is_empty() => bridge,
            Ok(_) => self.fallback_bridge.clone(),
            Err(e) => {
                debug!(exp, error = %e, "Experiment lookup failed, using fallback bridge");
                self.fallback_bridge.clone()
            }
        }
    }

    /// Move interface `iface` of `vm` onto `vlan`
    pub async fn connect(
        &self,
        exp: &str,
        vm: &str,
        iface: usize,
        vlan: &str,
        bridge: Option<&str>,
    ) -> FilesResult<()> {
        check_names(exp, vm)?;

        let bridge = match bridge.filter(|b| !b.is_empty()) {
            Some(bridge) => bridge.to_string(),
            None => self.resolve_bridge(exp, vlan),
        };

        let request = ConnectRequest {
            namespace: exp.to_string(),
            vm: vm.to_string(),
            iface,
            vlan: vlan.to_string(),
            bridge,
        };

        self.controller
            .connect(&request)
            .await
            .map_err(|e| FilesError::transport("connecting VM interface to VLAN", e))?;

        info!(exp, vm, iface, vlan, bridge = %request.bridge, "Connected VM interface");
        Ok(())
    }

    /// Disconnect interface `iface` of `vm` from its VLAN
    pub async fn disconnect(&self, exp: &str, vm: &str, iface: usize) -> FilesResult<()> {
        check_names(exp, vm)?;

        self.controller
            .disconnect(exp, vm, iface)
            .await
            .map_err(|e| FilesError::transport("disconnecting VM interface", e))?;

        info!(exp, vm, iface, "Disconnected VM interface");
        Ok(())
    }
}

fn check_names(exp: &str, vm: &str) -> FilesResult<()> {
    if exp.is_empty() {
        return Err(FilesError::MissingArgument("experiment name"));
    }
    if vm.is_empty() {
        return Err(FilesError::MissingArgument("VM name"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        connects: Mutex<Vec<ConnectRequest>>,
        disconnects: Mutex<Vec<(String, String, usize)>>,
        fail: bool,
    }

    #[async_trait]
    impl InterfaceController for Recorder {
        async fn connect(&self, request: &ConnectRequest) -> Result<(), ClusterError> {
            if self.fail {
                return Err(ClusterError::Other("no such vm".to_string()));
            }
            self.connects.lock().unwrap().push(request.clone());
            Ok(())
        }

        async fn disconnect(
            &self,
            namespace: &str,
            vm: &str,
            iface: usize,
        ) -> Result<(), ClusterError> {
            self.disconnects
                .lock()
                .unwrap()
                .push((namespace.to_string(), vm.to_string(), iface));
            Ok(())
        }
    }

    fn config() -> TomlConfig {
        let mut config = TomlConfig::default();
        config.experiments.insert(
            "exp1".to_string(),
            ExperimentConfig {
                default_bridge: Some("exp1br".to_string()),
            },
        );
        config.experiments.insert("exp2".to_string(), ExperimentConfig::default());
        config.default_bridge = "cfgbr".to_string();
        config
            .vlan_bridges
            .insert("EXP".to_string(), "vlanbr".to_string());
        config
    }

    fn bridge(recorder: Arc<Recorder>) -> NetworkBridge {
        let config = config();
        NetworkBridge::new(
            Arc::new(ConfigExperiments::from_config(&config)),
            Arc::new(ConfigVlanBridges::new(config.vlan_bridges.clone())),
            recorder,
        )
        .with_fallback_bridge(config.default_bridge)
    }

    #[test]
    fn test_resolve_bridge_order() {
        let net = bridge(Arc::new(Recorder::default()));
        assert_eq!(net.resolve_bridge("exp1", "EXP"), "vlanbr");
        assert_eq!(net.resolve_bridge("exp1", "MGMT"), "exp1br");
        assert_eq!(net.resolve_bridge("exp2", "MGMT"), "cfgbr");
        assert_eq!(net.resolve_bridge("unknown", "MGMT"), "cfgbr");
    }

    #[test]
    fn test_unconfigured_fallback_is_phenix() {
        let net = NetworkBridge::new(
            Arc::new(ConfigExperiments::from_config(&TomlConfig::default())),
            Arc::new(ConfigVlanBridges::default()),
            Arc::new(Recorder::default()),
        )
        .with_fallback_bridge("");
        assert_eq!(net.resolve_bridge("unknown", "MGMT"), FALLBACK_BRIDGE);
    }

    #[tokio::test]
    async fn test_connect_uses_explicit_bridge() {
        let recorder = Arc::new(Recorder::default());
        let net = bridge(recorder.clone());

        net.connect("exp1", "vm1", 2, "EXP", Some("mine")).await.unwrap();
        let connects = recorder.connects.lock().unwrap();
        assert_eq!(
            connects[0],
            ConnectRequest {
                namespace: "exp1".to_string(),
                vm: "vm1".to_string(),
                iface: 2,
                vlan: "EXP".to_string(),
                bridge: "mine".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_connect_resolves_missing_bridge() {
        let recorder = Arc::new(Recorder::default());
        let net = bridge(recorder.clone());

        net.connect("exp1", "vm1", 0, "MGMT", None).await.unwrap();
        assert_eq!(recorder.connects.lock().unwrap()[0].bridge, "exp1br");
    }

    #[tokio::test]
    async fn test_preconditions_skip_controller() {
        let recorder = Arc::new(Recorder::default());
        let net = bridge(recorder.clone());

        let err = net.connect("", "vm1", 0, "EXP", None).await.unwrap_err();
        assert_eq!(err.to_string(), "no experiment name provided");
        let err = net.disconnect("exp1", "", 0).await.unwrap_err();
        assert_eq!(err.to_string(), "no VM name provided");

        assert!(recorder.connects.lock().unwrap().is_empty());
        assert!(recorder.disconnects.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_controller_failure_names_stage() {
        let recorder = Arc::new(Recorder {
            fail: true,
            ..Default::default()
        });
        let net = bridge(recorder);

        let err = net.connect("exp1", "vm1", 0, "EXP", None).await.unwrap_err();
        assert!(err.to_string().starts_with("connecting VM interface to VLAN"));
    }

    #[tokio::test]
    async fn test_disconnect() {
        let recorder = Arc::new(Recorder::default());
        let net = bridge(recorder.clone());

        net.disconnect("exp1", "vm1", 1).await.unwrap();
        assert_eq!(
            recorder.disconnects.lock().unwrap()[0],
            ("exp1".to_string(), "vm1".to_string(), 1)
        );
    }
}
