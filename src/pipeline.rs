//! Declarative pipeline descriptions.
//!
//! A `PipelineSpec` is the unit handed to the execution engine: a named set
//! of processing nodes, each an opaque call into an external toolkit, wired
//! together by spec-name and node-port connections. Nothing here executes;
//! recipes only declare which tool runs with which parameters in which
//! order.

use crate::error::{Error, Result};
use crate::format::FileFormat;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Toolkit {
    Fsl,
    Ants,
    Mrtrix,
    StiSuite,
    Matlab,
    /// Utility nodes shipped with the execution engine (merge, select,
    /// directory listing, header extraction).
    Internal,
}

/// A version floor on an external toolkit, resolved by the engine's
/// software-module environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequirement {
    pub toolkit: Toolkit,
    pub min_version: String,
}

impl ToolRequirement {
    pub fn new(toolkit: Toolkit, min_version: impl Into<String>) -> Self {
        Self {
            toolkit,
            min_version: min_version.into(),
        }
    }
}

pub fn fsl5() -> ToolRequirement {
    ToolRequirement::new(Toolkit::Fsl, "5.0.8")
}

pub fn ants19() -> ToolRequirement {
    ToolRequirement::new(Toolkit::Ants, "1.9")
}

pub fn mrtrix3() -> ToolRequirement {
    ToolRequirement::new(Toolkit::Mrtrix, "3.0")
}

pub fn matlab2015() -> ToolRequirement {
    ToolRequirement::new(Toolkit::Matlab, "2015a")
}

pub fn sti_suite3() -> ToolRequirement {
    ToolRequirement::new(Toolkit::StiSuite, "3.0")
}

/// Citation keys attached to pipelines so reports can acknowledge the
/// toolkits involved.
pub mod citations {
    pub const FSL: &str = "fsl";
    pub const BET: &str = "bet";
    pub const ANTS: &str = "ants";
    pub const MRTRIX: &str = "mrtrix";
    pub const MATLAB: &str = "matlab";
    pub const STI_SUITE: &str = "sti_suite";
}

/// A connection from an analysis data spec into a node port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecEdge {
    pub spec: String,
    pub port: String,
    pub format: FileFormat,
}

/// A connection from an upstream node's output port into a node port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEdge {
    pub from_node: String,
    pub from_port: String,
    pub port: String,
}

/// One processing step: an opaque tool invocation with its parameters,
/// resource annotations and connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub toolkit: Toolkit,
    pub tool: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub params: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requirements: Vec<ToolRequirement>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wall_time_mins: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u32>,
    /// Ports the engine fans out over when the upstream value is a list.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub iterfield: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<SpecEdge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub internal: Vec<NodeEdge>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<SpecEdge>,
}

impl NodeSpec {
    pub fn new(name: impl Into<String>, toolkit: Toolkit, tool: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            toolkit,
            tool: tool.into(),
            params: BTreeMap::new(),
            requirements: Vec::new(),
            wall_time_mins: None,
            memory_mb: None,
            iterfield: Vec::new(),
            inputs: Vec::new(),
            internal: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn param(mut self, name: impl Into<String>, value: Value) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    pub fn require(mut self, requirement: ToolRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    pub fn wall_time(mut self, minutes: u32) -> Self {
        self.wall_time_mins = Some(minutes);
        self
    }

    pub fn memory(mut self, megabytes: u32) -> Self {
        self.memory_mb = Some(megabytes);
        self
    }

    pub fn iterfield(mut self, port: impl Into<String>) -> Self {
        self.iterfield.push(port.into());
        self
    }

    /// Connect an analysis data spec to an input port.
    pub fn input(
        mut self,
        spec: impl Into<String>,
        port: impl Into<String>,
        format: FileFormat,
    ) -> Self {
        self.inputs.push(SpecEdge {
            spec: spec.into(),
            port: port.into(),
            format,
        });
        self
    }

    /// Connect an upstream node's output port to an input port.
    pub fn internal(
        mut self,
        from_node: impl Into<String>,
        from_port: impl Into<String>,
        port: impl Into<String>,
    ) -> Self {
        self.internal.push(NodeEdge {
            from_node: from_node.into(),
            from_port: from_port.into(),
            port: port.into(),
        });
        self
    }

    /// Connect an output port to an analysis data spec.
    pub fn output(
        mut self,
        port: impl Into<String>,
        spec: impl Into<String>,
        format: FileFormat,
    ) -> Self {
        self.outputs.push(SpecEdge {
            spec: spec.into(),
            port: port.into(),
            format,
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    pub desc: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub citations: Vec<String>,
    pub nodes: Vec<NodeSpec>,
}

impl PipelineSpec {
    /// Spec names read by any node in this pipeline.
    pub fn input_specs(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .flat_map(|n| n.inputs.iter())
            .map(|e| e.spec.as_str())
    }

    /// Spec names produced by this pipeline.
    pub fn output_specs(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .flat_map(|n| n.outputs.iter())
            .map(|e| e.spec.as_str())
    }

    /// Check the declared wiring: every internal edge must reference an
    /// earlier node by name, and the pipeline must produce at least one
    /// output spec.
    pub fn validate(&self) -> Result<()> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            for edge in &node.internal {
                if !seen.contains(&edge.from_node.as_str()) {
                    return Err(Error::Disconnected {
                        pipeline: self.name.clone(),
                        reason: format!(
                            "node '{}' reads port '{}' of '{}', which is not an upstream node",
                            node.name, edge.from_port, edge.from_node
                        ),
                    });
                }
            }
            if seen.contains(&node.name.as_str()) {
                return Err(Error::Disconnected {
                    pipeline: self.name.clone(),
                    reason: format!("duplicate node name '{}'", node.name),
                });
            }
            seen.push(node.name.as_str());
        }
        if self.output_specs().next().is_none() {
            return Err(Error::Disconnected {
                pipeline: self.name.clone(),
                reason: "no node output is connected to a data spec".to_string(),
            });
        }
        Ok(())
    }

    /// Rewrite every spec-edge name, used when lifting a sub-analysis
    /// pipeline into a composite class's namespace.
    pub(crate) fn map_spec_names(mut self, f: impl Fn(&str) -> String) -> Self {
        for node in &mut self.nodes {
            for edge in node.inputs.iter_mut().chain(node.outputs.iter_mut()) {
                edge.spec = f(&edge.spec);
            }
        }
        self
    }
}

/// Builder used by recipe code, mirroring the order nodes are declared in.
pub struct PipelineBuilder {
    name: String,
    desc: String,
    citations: Vec<String>,
    nodes: Vec<NodeSpec>,
}

impl PipelineBuilder {
    pub fn new(name: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            desc: desc.into(),
            citations: Vec::new(),
            nodes: Vec::new(),
        }
    }

    pub fn cite(mut self, key: &str) -> Self {
        self.citations.push(key.to_string());
        self
    }

    /// Add a node and return its name for internal connections downstream.
    pub fn add(&mut self, node: NodeSpec) -> String {
        let name = node.name.clone();
        self.nodes.push(node);
        name
    }

    pub fn build(self) -> PipelineSpec {
        PipelineSpec {
            name: self.name,
            desc: self.desc,
            citations: self.citations,
            nodes: self.nodes,
        }
    }
}
