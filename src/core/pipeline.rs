//! Pipeline domain model

use crate::core::ports::IoSpec;
use crate::core::reference::{RefSource, Reference};
use crate::core::step::{validate_name, OperatorRef, PipelineStep};
use crate::core::variable::{Binding, Variable};
use anyhow::{bail, Context, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use uuid::Uuid;

/// A named DAG of operator steps, buildable until saved remotely.
///
/// Steps are added with literal or reference bindings on their inputs;
/// pipeline-level inputs are inferred from the bindings (or declared
/// explicitly), outputs are selected step outputs. Validation enforces
/// unique step names, existing and acyclic dependencies, and binding
/// compatibility before the pipeline serializes to a manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    name: String,
    op: OperatorRef,
    steps: Vec<PipelineStep>,
    outputs: IoSpec,
    declared_inputs: Option<IoSpec>,
    annotations: BTreeMap<String, String>,
    uuid: Option<Uuid>,
    pipeline_id: Option<String>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>, op: OperatorRef) -> Result<Self> {
        let name = name.into();
        validate_name("pipeline", &name)?;
        Ok(Self {
            name,
            op,
            steps: Vec::new(),
            outputs: IoSpec::outputs(),
            declared_inputs: None,
            annotations: BTreeMap::new(),
            uuid: None,
            pipeline_id: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn op(&self) -> &OperatorRef {
        &self.op
    }

    /// The remote id, present once the pipeline has been saved
    pub fn pipeline_id(&self) -> Option<&str> {
        self.pipeline_id.as_deref()
    }

    /// The service-assigned uuid carried in manifest metadata, if any
    pub fn uuid(&self) -> Option<Uuid> {
        self.uuid
    }

    pub(crate) fn set_uuid(&mut self, uuid: Option<Uuid>) {
        self.uuid = uuid;
    }

    pub fn annotations(&self) -> &BTreeMap<String, String> {
        &self.annotations
    }

    /// Attach a metadata annotation carried verbatim in the manifest.
    pub fn annotate(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<()> {
        self.ensure_mutable()?;
        self.annotations.insert(key.into(), value.into());
        Ok(())
    }

    /// Record the id assigned by the service. The pipeline is frozen from
    /// this point on; structural mutation is rejected.
    pub fn mark_saved(&mut self, pipeline_id: impl Into<String>) -> Result<()> {
        if let Some(existing) = &self.pipeline_id {
            bail!("pipeline '{}' is already saved as '{}'", self.name, existing);
        }
        self.pipeline_id = Some(pipeline_id.into());
        Ok(())
    }

    fn ensure_mutable(&self) -> Result<()> {
        if let Some(id) = &self.pipeline_id {
            bail!("pipeline '{}' is frozen: saved as '{}'", self.name, id);
        }
        Ok(())
    }

    /// Add a step, assigning a unique name if the step has none.
    /// Returns the name under which the step was registered.
    pub fn add_step(&mut self, mut step: PipelineStep) -> Result<String> {
        self.ensure_mutable()?;
        let name = match step.name() {
            Some(explicit) => {
                let explicit = explicit.to_string();
                if self.step(&explicit).is_some() {
                    bail!("duplicate step name '{}'", explicit);
                }
                explicit
            }
            None => {
                let base = step.op().identifier.clone();
                let mut candidate = base.clone();
                let mut n = 2;
                while self.step(&candidate).is_some() {
                    candidate = format!("{}-{}", base, n);
                    n += 1;
                }
                step.set_name(candidate.clone());
                candidate
            }
        };
        self.steps.push(step);
        Ok(name)
    }

    pub fn step(&self, name: &str) -> Option<&PipelineStep> {
        self.steps.iter().find(|s| s.name() == Some(name))
    }

    /// Mutable access to a step during the build phase.
    pub fn step_mut(&mut self, name: &str) -> Result<&mut PipelineStep> {
        self.ensure_mutable()?;
        let pipeline = self.name.clone();
        self.steps
            .iter_mut()
            .find(|s| s.name() == Some(name))
            .ok_or_else(|| anyhow::anyhow!("pipeline '{}' has no step '{}'", pipeline, name))
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.steps
    }

    pub fn outputs(&self) -> &IoSpec {
        &self.outputs
    }

    /// Expose a step output as a pipeline output under `exposed`.
    pub fn expose_output(&mut self, exposed: &str, step: &str, port: &str) -> Result<()> {
        self.ensure_mutable()?;
        validate_name("output", exposed)?;
        let Some(source_step) = self.step(step) else {
            bail!("cannot expose output of unknown step '{}'", step);
        };
        let Some(source) = source_step.outputs().get(port) else {
            bail!(
                "step '{}' has no output '{}' (known outputs: {:?})",
                step,
                port,
                source_step.outputs().names()
            );
        };
        let mut var = source.clone();
        var.name = exposed.to_string();
        var.set_binding_unchecked(Binding::From(Reference::step_output(
            step,
            source.kind(),
            port,
        )));
        self.outputs.push(var)
    }

    /// Used by the manifest loader, which carries the output schema itself.
    pub(crate) fn push_output_raw(&mut self, var: Variable) -> Result<()> {
        self.outputs.push(var)
    }

    /// Declare a typed pipeline-level input, optionally with a default
    /// literal. Inputs referenced by steps but never declared are inferred.
    pub fn declare_input(&mut self, var: Variable) -> Result<()> {
        self.ensure_mutable()?;
        validate_name("input", &var.name)?;
        if let Some(Binding::From(_)) = var.binding() {
            bail!(
                "pipeline input '{}' cannot be bound to a reference",
                var.name
            );
        }
        self.declared_inputs
            .get_or_insert_with(IoSpec::inputs)
            .push(var)
    }

    pub(crate) fn set_declared_inputs(&mut self, spec: IoSpec) {
        self.declared_inputs = Some(spec);
    }

    /// The pipeline's input signature: declared inputs when present,
    /// otherwise inferred from step bindings.
    pub fn inputs(&self) -> Result<IoSpec> {
        match &self.declared_inputs {
            Some(declared) => Ok(declared.clone()),
            None => self.infer_inputs(),
        }
    }

    /// Infer pipeline inputs as the union of step-input bindings that
    /// reference a pipeline-level input. Conflicting schemas for the same
    /// name are an error; compatible ones narrow to the most specific.
    fn infer_inputs(&self) -> Result<IoSpec> {
        let mut merged: Vec<Variable> = Vec::new();
        for step in &self.steps {
            for var in step.inputs().iter() {
                let Some(Binding::From(reference)) = var.binding() else {
                    continue;
                };
                if reference.source != RefSource::PipelineInput {
                    continue;
                }
                let candidate = Variable::from_consumer(&reference.name, var);
                match merged.iter_mut().find(|m| m.name == reference.name) {
                    None => merged.push(candidate),
                    Some(existing) => {
                        existing.merge_consumer(&candidate).with_context(|| {
                            format!(
                                "pipeline input '{}' is used with conflicting schemas",
                                reference.name
                            )
                        })?;
                    }
                }
            }
        }
        IoSpec::from_vars(crate::core::variable::Direction::Input, merged)
    }

    /// Run every validation pass: step-name uniqueness, dependency
    /// existence, binding compatibility, required-input coverage, input
    /// consistency and acyclicity.
    pub fn validate(&self) -> Result<()> {
        let mut names: BTreeSet<&str> = BTreeSet::new();
        for step in &self.steps {
            let Some(name) = step.name() else {
                bail!("step for operator '{}' was never named", step.op().identifier);
            };
            if !names.insert(name) {
                bail!("duplicate step name '{}'", name);
            }
        }

        for step in &self.steps {
            let name = step.name().unwrap_or_default();
            for dep in step.dependencies() {
                if !names.contains(dep.as_str()) {
                    bail!("step '{}' depends on unknown step '{}'", name, dep);
                }
            }
            for var in step.inputs().iter() {
                if var.required && !var.is_bound() {
                    bail!("required input '{}' of step '{}' is unbound", var.name, name);
                }
                if let Some(Binding::From(reference)) = var.binding() {
                    if let RefSource::StepOutput(producer) = &reference.source {
                        self.check_step_source(name, var, producer, reference)?;
                    }
                }
            }
        }

        let inputs = self.inputs()?;
        for step in &self.steps {
            let name = step.name().unwrap_or_default();
            for var in step.inputs().iter() {
                if let Some(Binding::From(reference)) = var.binding() {
                    if reference.source == RefSource::PipelineInput {
                        let Some(target) = inputs.get(&reference.name) else {
                            bail!(
                                "step '{}' references undeclared pipeline input '{}'",
                                name,
                                reference.name
                            );
                        };
                        var.accepts_source(target).with_context(|| {
                            format!("input '{}' of step '{}'", var.name, name)
                        })?;
                    }
                }
            }
        }

        for output in self.outputs.iter() {
            let Some(Binding::From(reference)) = output.binding() else {
                bail!("pipeline output '{}' is not bound to a step output", output.name);
            };
            let RefSource::StepOutput(producer) = &reference.source else {
                bail!(
                    "pipeline output '{}' must reference a step output, got '{}'",
                    output.name,
                    reference
                );
            };
            self.check_step_source("outputs", output, producer, reference)?;
        }

        self.detect_cycle()
    }

    fn check_step_source(
        &self,
        consumer_ctx: &str,
        consumer: &Variable,
        producer: &str,
        reference: &Reference,
    ) -> Result<()> {
        let Some(step) = self.step(producer) else {
            bail!(
                "'{}' references unknown step '{}' via '{}'",
                consumer_ctx,
                producer,
                reference
            );
        };
        let Some(port) = step.outputs().get(&reference.name) else {
            bail!(
                "step '{}' has no output '{}' (referenced from '{}')",
                producer,
                reference.name,
                consumer_ctx
            );
        };
        consumer
            .accepts_source(port)
            .with_context(|| format!("'{}' consuming '{}'", consumer_ctx, reference))
    }

    /// Reverse-adjacency leaf pruning: repeatedly resolve steps whose
    /// dependencies are all resolved; anything left over sits on a cycle.
    fn detect_cycle(&self) -> Result<()> {
        let mut pending: HashMap<&str, BTreeSet<String>> = HashMap::new();
        let mut dependents: HashMap<String, Vec<&str>> = HashMap::new();
        for step in &self.steps {
            let name = step.name().unwrap_or_default();
            let deps = step.dependencies();
            for dep in &deps {
                dependents.entry(dep.clone()).or_default().push(name);
            }
            pending.insert(name, deps);
        }

        let mut frontier: VecDeque<&str> = self
            .steps
            .iter()
            .filter_map(|s| s.name())
            .filter(|n| pending[n].is_empty())
            .collect();
        let mut resolved: BTreeSet<&str> = BTreeSet::new();

        while let Some(name) = frontier.pop_front() {
            resolved.insert(name);
            if let Some(waiting) = dependents.get(name) {
                for &dependent in waiting {
                    if let Some(deps) = pending.get_mut(dependent) {
                        deps.remove(name);
                        if deps.is_empty() && !resolved.contains(dependent) {
                            frontier.push_back(dependent);
                        }
                    }
                }
            }
        }

        if resolved.len() < self.steps.len() {
            let stuck: Vec<&str> = self
                .steps
                .iter()
                .filter_map(|s| s.name())
                .filter(|n| !resolved.contains(n))
                .collect();
            bail!("cycle detected involving steps {:?}", stuck);
        }
        Ok(())
    }

    /// Kahn's algorithm over the dependency graph. Deterministic: ready
    /// steps are processed in insertion order. Leftover steps (a cycle)
    /// are reported by name.
    pub fn topo_order(&self) -> Result<Vec<&PipelineStep>> {
        let index_of: HashMap<&str, usize> = self
            .steps
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.name().map(|n| (n, i)))
            .collect();

        let mut remaining: Vec<BTreeSet<usize>> = Vec::with_capacity(self.steps.len());
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); self.steps.len()];
        for (i, step) in self.steps.iter().enumerate() {
            let mut deps = BTreeSet::new();
            for dep in step.dependencies() {
                let Some(&j) = index_of.get(dep.as_str()) else {
                    bail!(
                        "step '{}' depends on unknown step '{}'",
                        step.name().unwrap_or_default(),
                        dep
                    );
                };
                deps.insert(j);
                dependents[j].push(i);
            }
            remaining.push(deps);
        }

        let mut queue: VecDeque<usize> = (0..self.steps.len())
            .filter(|&i| remaining[i].is_empty())
            .collect();
        let mut order = Vec::with_capacity(self.steps.len());
        while let Some(i) = queue.pop_front() {
            order.push(i);
            for &dependent in &dependents[i] {
                remaining[dependent].remove(&i);
                if remaining[dependent].is_empty() {
                    queue.push_back(dependent);
                }
            }
        }

        if order.len() < self.steps.len() {
            let stuck: Vec<&str> = (0..self.steps.len())
                .filter(|i| !order.contains(i))
                .filter_map(|i| self.steps[i].name())
                .collect();
            bail!("cycle detected; unresolved steps {:?}", stuck);
        }
        Ok(order.into_iter().map(|i| &self.steps[i]).collect())
    }
}
