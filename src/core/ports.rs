//! Ordered input/output collections

use crate::core::variable::{Direction, VarKind, Variable};
use anyhow::{bail, Result};

/// An ordered set of variables forming a step's or pipeline's inputs or
/// outputs. Names are unique, and parameters always precede artifacts,
/// matching the placement rule of serialized manifests.
#[derive(Debug, Clone, PartialEq)]
pub struct IoSpec {
    direction: Direction,
    vars: Vec<Variable>,
}

impl IoSpec {
    pub fn inputs() -> Self {
        Self {
            direction: Direction::Input,
            vars: Vec::new(),
        }
    }

    pub fn outputs() -> Self {
        Self {
            direction: Direction::Output,
            vars: Vec::new(),
        }
    }

    /// Build a spec from variables, stamping the direction on each and
    /// normalizing the parameter/artifact order.
    pub fn from_vars(direction: Direction, vars: Vec<Variable>) -> Result<Self> {
        let mut spec = match direction {
            Direction::Input => Self::inputs(),
            Direction::Output => Self::outputs(),
        };
        for var in vars {
            spec.push(var)?;
        }
        Ok(spec)
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Insert a variable, keeping parameters ahead of artifacts.
    pub fn push(&mut self, var: Variable) -> Result<()> {
        if self.get(&var.name).is_some() {
            bail!("duplicate variable name '{}'", var.name);
        }
        let var = var.with_direction(self.direction);
        match var.kind() {
            VarKind::Parameter => {
                let at = self
                    .vars
                    .iter()
                    .position(|v| v.kind() == VarKind::Artifact)
                    .unwrap_or(self.vars.len());
                self.vars.insert(at, var);
            }
            VarKind::Artifact => self.vars.push(var),
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.vars.iter().find(|v| v.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Variable> {
        self.vars.iter_mut().find(|v| v.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter()
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter().filter(|v| v.kind() == VarKind::Parameter)
    }

    pub fn artifacts(&self) -> impl Iterator<Item = &Variable> {
        self.vars.iter().filter(|v| v.kind() == VarKind::Artifact)
    }

    pub fn names(&self) -> Vec<&str> {
        self.vars.iter().map(|v| v.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}
