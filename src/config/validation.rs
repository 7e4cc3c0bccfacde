//! Structural validation of pipeline descriptors.
//!
//! Validation runs in three stages: shape checks (mode vs. pipeline section,
//! concurrency bound, emptiness), id uniqueness and reference resolution,
//! then cycle detection. The ordering matters: cycle detection only makes
//! sense on a graph whose references all resolve.

use std::collections::HashSet;

use crate::config::{DependencyGraph, ExecutionMode, PipelineDescriptor, PipelineSpec};
use crate::errors::ValidationError;

/// Validate a descriptor for structural integrity and executability.
///
/// Returns every error found, not just the first, so a rejected config file
/// can be fixed in one pass.
pub fn validate_descriptor(descriptor: &PipelineDescriptor) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if descriptor.max_concurrency < 1 {
        errors.push(ValidationError::InvalidConcurrency {
            value: descriptor.max_concurrency,
        });
    }

    match (&descriptor.execution_mode, &descriptor.pipeline) {
        (ExecutionMode::Linear, PipelineSpec::Linear(steps)) => {
            if steps.is_empty() {
                errors.push(ValidationError::EmptyPipeline {
                    pipeline: descriptor.name.clone(),
                });
            }
        }
        (ExecutionMode::Dag, PipelineSpec::Dag(dag)) => {
            if dag.nodes.is_empty() {
                errors.push(ValidationError::EmptyPipeline {
                    pipeline: descriptor.name.clone(),
                });
            }

            let mut seen = HashSet::new();
            for node in &dag.nodes {
                if !seen.insert(node.id.as_str()) {
                    errors.push(ValidationError::DuplicateNodeId {
                        node_id: node.id.clone(),
                    });
                }
            }

            let mut unresolved = false;
            for node in &dag.nodes {
                for dep in &node.dependencies {
                    if !seen.contains(dep.as_str()) {
                        unresolved = true;
                        errors.push(ValidationError::UnresolvedDependency {
                            node_id: node.id.clone(),
                            missing_dependency: dep.clone(),
                        });
                    }
                }
            }

            if !unresolved {
                if let Err(cycle) = DependencyGraph::from_nodes(&dag.nodes).kahn_levels() {
                    errors.push(cycle);
                }
            }
        }
        (ExecutionMode::Linear, PipelineSpec::Dag(_)) => {
            errors.push(ValidationError::ModeMismatch {
                mode: "linear",
                found: "dag",
            });
        }
        (ExecutionMode::Dag, PipelineSpec::Linear(_)) => {
            errors.push(ValidationError::ModeMismatch {
                mode: "dag",
                found: "linear",
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DagSpec, NodeConfig, StepConfig};
    use serde_json::Map;

    fn node(id: &str, deps: &[&str]) -> NodeConfig {
        NodeConfig {
            id: id.to_string(),
            processor: "ocr_processor".to_string(),
            params: Map::new(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    fn dag_descriptor(nodes: Vec<NodeConfig>) -> PipelineDescriptor {
        PipelineDescriptor {
            name: "test".to_string(),
            description: "test".to_string(),
            execution_mode: ExecutionMode::Dag,
            max_concurrency: 5,
            pipeline: PipelineSpec::Dag(DagSpec { nodes }),
        }
    }

    #[test]
    fn valid_dag_passes() {
        let descriptor = dag_descriptor(vec![node("a", &[]), node("b", &["a"])]);
        assert!(validate_descriptor(&descriptor).is_ok());
    }

    #[test]
    fn cycle_is_rejected() {
        let descriptor = dag_descriptor(vec![node("a", &["b"]), node("b", &["a"])]);
        let errors = validate_descriptor(&descriptor).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::CyclicDependency { .. })));
    }

    #[test]
    fn unresolved_dependency_is_rejected_before_cycle_check() {
        let descriptor = dag_descriptor(vec![node("a", &["ghost"])]);
        let errors = validate_descriptor(&descriptor).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            ValidationError::UnresolvedDependency { node_id, missing_dependency }
                if node_id == "a" && missing_dependency == "ghost"
        ));
    }

    #[test]
    fn duplicate_node_ids_are_rejected() {
        let descriptor = dag_descriptor(vec![node("a", &[]), node("a", &[])]);
        let errors = validate_descriptor(&descriptor).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::DuplicateNodeId { node_id } if node_id == "a")));
    }

    #[test]
    fn mode_mismatch_is_rejected() {
        let descriptor = PipelineDescriptor {
            name: "test".to_string(),
            description: "test".to_string(),
            execution_mode: ExecutionMode::Linear,
            max_concurrency: 5,
            pipeline: PipelineSpec::Dag(DagSpec { nodes: vec![] }),
        };
        let errors = validate_descriptor(&descriptor).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::ModeMismatch { .. })));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let descriptor = PipelineDescriptor {
            name: "test".to_string(),
            description: "test".to_string(),
            execution_mode: ExecutionMode::Linear,
            max_concurrency: 0,
            pipeline: PipelineSpec::Linear(vec![StepConfig {
                name: "ocr_processor".to_string(),
                params: Map::new(),
            }]),
        };
        let errors = validate_descriptor(&descriptor).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ValidationError::InvalidConcurrency { value: 0 })));
    }
}
