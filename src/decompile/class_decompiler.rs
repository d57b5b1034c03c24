use rayon::prelude::*;
use tracing::{debug, warn};

use crate::method_info::MethodInfo;
use crate::types::ClassInfo;

use super::cfg;
use super::descriptor::parse_method_descriptor;
use super::desugar::{self, DesugarContext};
use super::error::{DecompileError, RoutineFailure};
use super::locals::{LocalTable, Locals};
use super::registry::{ClassRegistry, Registry};
use super::stack_sim::BlockSimulator;
use super::structured_types::StatementBlock;
use super::structuring::Structurer;

/// Options controlling the decompilation process.
#[derive(Clone, Debug)]
pub struct DecompileOptions {
    /// Run the bounded simplifier on recovered branch conditions.
    pub simplify_conditions: bool,
    pub fold_for_loops: bool,
    pub fold_boolean_ternaries: bool,
    pub fold_synthetic_accessors: bool,
    /// Scan passes over one block range before structuring gives up.
    pub max_structuring_passes: usize,
    /// Term count above which the simplifier keeps the unsimplified condition.
    pub max_condition_terms: usize,
    /// Paths through one conditional chain before condition building gives up.
    pub max_condition_paths: usize,
    /// Decompile the methods of several classes on the rayon thread pool.
    pub parallel: bool,
}

impl Default for DecompileOptions {
    fn default() -> Self {
        Self {
            simplify_conditions: true,
            fold_for_loops: true,
            fold_boolean_ternaries: true,
            fold_synthetic_accessors: true,
            max_structuring_passes: 256,
            max_condition_terms: 64,
            max_condition_paths: 256,
            parallel: true,
        }
    }
}

/// A decompiled method body and the variables it uses.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MethodBody {
    pub locals: LocalTable,
    pub body: StatementBlock,
}

/// What became of one method.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MethodOutcome {
    /// Abstract or native: nothing to decompile.
    NoCode,
    Decompiled(MethodBody),
    /// The method is kept in the output with the reason it could not be
    /// decompiled in place of its body.
    Failed(RoutineFailure),
}

impl MethodOutcome {
    pub fn body(&self) -> Option<&MethodBody> {
        match self {
            MethodOutcome::Decompiled(body) => Some(body),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&RoutineFailure> {
        match self {
            MethodOutcome::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecompiledMethod {
    pub name: String,
    pub descriptor: String,
    pub outcome: MethodOutcome,
}

#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DecompiledClass {
    pub name: String,
    pub methods: Vec<DecompiledMethod>,
}

impl DecompiledClass {
    pub fn method(&self, name: &str) -> Option<&DecompiledMethod> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn failures(&self) -> impl Iterator<Item = &RoutineFailure> {
        self.methods.iter().filter_map(|m| m.outcome.failure())
    }
}

/// The main decompiler entry point.
///
/// The registry is only read. Every class whose members are referenced must
/// be registered before its callers are decompiled.
pub struct Decompiler<'r> {
    registry: &'r dyn Registry,
    options: DecompileOptions,
}

impl<'r> Decompiler<'r> {
    pub fn new(registry: &'r dyn Registry) -> Self {
        Self::with_options(registry, DecompileOptions::default())
    }

    pub fn with_options(registry: &'r dyn Registry, options: DecompileOptions) -> Self {
        Self { registry, options }
    }

    pub fn options(&self) -> &DecompileOptions {
        &self.options
    }

    /// Decompile every method of several classes.
    pub fn decompile_classes(&self, classes: &[ClassInfo]) -> Vec<DecompiledClass> {
        if self.options.parallel {
            classes.par_iter().map(|c| self.decompile_class(c)).collect()
        } else {
            classes.iter().map(|c| self.decompile_class(c)).collect()
        }
    }

    /// Decompile every method of `class`. A failing method is reported in its
    /// own slot and does not affect its siblings.
    pub fn decompile_class(&self, class: &ClassInfo) -> DecompiledClass {
        let decompile = |method: &MethodInfo| DecompiledMethod {
            name: method.name.clone(),
            descriptor: method.descriptor.clone(),
            outcome: self.decompile_method(&class.name, method),
        };
        let methods = if self.options.parallel {
            class.methods.par_iter().map(decompile).collect()
        } else {
            class.methods.iter().map(decompile).collect()
        };
        DecompiledClass {
            name: class.name.clone(),
            methods,
        }
    }

    /// Decompile a single method, turning an error into a failure record.
    pub fn decompile_method(&self, class_name: &str, method: &MethodInfo) -> MethodOutcome {
        match self.structure_method(class_name, method) {
            Ok(Some(body)) => MethodOutcome::Decompiled(body),
            Ok(None) => MethodOutcome::NoCode,
            Err(error) => {
                warn!(
                    class = class_name,
                    method = %method.name,
                    descriptor = %method.descriptor,
                    error = %error,
                    "method left undecompiled"
                );
                MethodOutcome::Failed(RoutineFailure {
                    class_name: class_name.to_string(),
                    method_name: method.name.clone(),
                    descriptor: method.descriptor.clone(),
                    error,
                })
            }
        }
    }

    /// Runs the pipeline on one method: block graph, region structuring with
    /// stack simulation, then the source-level cleanups. `None` for methods
    /// without code.
    pub fn structure_method(&self, class_name: &str, method: &MethodInfo) -> Result<Option<MethodBody>, DecompileError> {
        let Some(code) = method.code.as_ref() else {
            return Ok(None);
        };
        let (params, return_type) = parse_method_descriptor(&method.descriptor)
            .ok_or_else(|| DecompileError::MalformedDescriptor(method.descriptor.clone()))?;

        // Phase 1: block graph
        let graph = cfg::build_graph(code)?;
        debug!(
            class = class_name,
            method = %method.name,
            blocks = graph.len(),
            regions = graph.regions.len(),
            "built block graph"
        );

        // Phase 2: structuring, simulating blocks as regions are matched
        let locals = Locals::new(code, class_name, &params, method.is_static());
        let simulator = BlockSimulator::new(self.registry, locals);
        let (mut body, locals) = Structurer::new(graph, simulator, &self.options).run()?;
        let locals = locals.into_table();

        // Phase 3: desugaring
        let ctx = DesugarContext {
            registry: self.registry,
            locals: &locals,
            return_type: &return_type,
        };
        desugar::desugar(&mut body, &self.options, &ctx);

        Ok(Some(MethodBody { locals, body }))
    }
}

/// Convenience function: decompile a class on its own, with its own members
/// registered and default options.
pub fn decompile(class: &ClassInfo) -> DecompiledClass {
    let mut registry = ClassRegistry::new();
    registry.register_class(class);
    Decompiler::new(&registry).decompile_class(class)
}
