use corral_core::{from_json, from_yaml, CorralError, Node, NodeExt, Pod, PodExt, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Nodes and pending pods to feed a simulation
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ClusterManifest {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub pods: Vec<Pod>,
}

impl ClusterManifest {
    /// Read a manifest; `.json` files are parsed as JSON, anything else as YAML
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path).map_err(|e| {
            CorralError::invalid_resource(
                format!("Cannot read manifest '{}': {}", path.display(), e),
                "Pass the path of an existing YAML or JSON manifest",
            )
        })?;

        let manifest: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => from_json(&data)?,
            _ => from_yaml(&data)?,
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Every node needs a unique name; every pod must be valid and unique by key
    pub fn validate(&self) -> Result<()> {
        let mut node_names = HashSet::new();
        for node in &self.nodes {
            let name = node.node_name().ok_or_else(|| {
                CorralError::validation_failed("Node", "node without metadata.name", "Name every node")
            })?;
            if !node_names.insert(name) {
                return Err(CorralError::validation_failed(
                    "Node",
                    format!("duplicate node '{}'", name),
                    "Node names must be unique",
                ));
            }
        }

        let mut pod_keys = HashSet::new();
        for pod in &self.pods {
            pod.validate().map_err(|e| {
                CorralError::validation_failed("Pod", e.to_string(), "Fix the pod definition")
            })?;
            let key = pod.pod_key().map_err(|e| {
                CorralError::validation_failed("Pod", e.to_string(), "Fix the pod definition")
            })?;
            if pod.assigned_node().is_some() {
                return Err(CorralError::validation_failed(
                    "Pod",
                    format!("pod {} already has spec.nodeName", key),
                    "Only unscheduled pods can be simulated",
                ));
            }
            if !pod_keys.insert(key.clone()) {
                return Err(CorralError::validation_failed(
                    "Pod",
                    format!("duplicate pod {}", key),
                    "Pod namespace/name pairs must be unique",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const MANIFEST: &str = r#"
nodes:
  - apiVersion: v1
    kind: Node
    metadata:
      name: machine1
    status:
      allocatable:
        cpu: "4"
        memory: 8Gi
pods:
  - apiVersion: v1
    kind: Pod
    metadata:
      name: web
      namespace: default
    spec:
      containers:
        - name: nginx
          image: nginx
          ports:
            - containerPort: 80
              hostPort: 8080
"#;

    fn write_manifest(suffix: &str, contents: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_yaml() {
        let file = write_manifest(".yaml", MANIFEST);
        let manifest = ClusterManifest::load(file.path()).unwrap();

        assert_eq!(manifest.nodes.len(), 1);
        assert_eq!(manifest.nodes[0].node_name(), Some("machine1"));
        assert_eq!(manifest.pods[0].host_ports(), vec![8080]);
    }

    #[test]
    fn test_load_json() {
        let json = r#"{"nodes": [{"apiVersion": "v1", "kind": "Node", "metadata": {"name": "machine1"}}]}"#;
        let file = write_manifest(".json", json);
        let manifest = ClusterManifest::load(file.path()).unwrap();

        assert_eq!(manifest.nodes.len(), 1);
        assert!(manifest.pods.is_empty());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = ClusterManifest::load(&dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(CorralError::InvalidResource { .. })));
    }

    #[test]
    fn test_malformed_yaml() {
        let file = write_manifest(".yaml", "nodes: [unclosed");
        let result = ClusterManifest::load(file.path());
        assert!(matches!(result, Err(CorralError::SerializationError { .. })));
    }

    #[test]
    fn test_duplicate_pods_rejected() {
        let manifest: ClusterManifest = from_yaml(MANIFEST).unwrap();
        let mut doubled = manifest.clone();
        doubled.pods.push(manifest.pods[0].clone());

        assert!(matches!(
            doubled.validate(),
            Err(CorralError::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_prebound_pod_rejected() {
        let mut manifest: ClusterManifest = from_yaml(MANIFEST).unwrap();
        manifest.pods[0].set_assigned_node(Some("machine1".to_string()));
        assert!(manifest.validate().is_err());
    }
}
