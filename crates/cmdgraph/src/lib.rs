//! # Command graph
//!
//! Records GPU commands (draws and buffer copies) together with the resources they read and write, and derives
//! everything needed to execute them correctly on Vulkan: the dependency graph between commands, a leveling of that
//! graph into execution steps, and the buffer/texture barriers (including layout transitions) between those steps.
//!
//! The pipeline has four stages:
//!
//! 1. **Recording** via [CommandRecorder]. Commands are validated against a [ResourceRegistry] and appended in
//!    program order.
//! 2. **Dependency analysis**. Every pair of commands is checked for read-after-write, write-after-read and
//!    write-after-write hazards on shared resources. See [DependencyGraph].
//! 3. **Scheduling**. Commands are placed into [ExecutionStep]s. Commands of one step are independent and can run
//!    without barriers between them.
//! 4. **Execution**. The plan is replayed against a [SubmissionTarget], for instance an [AshTarget] recording into
//!    a Vulkan command buffer.
//!
//! ```ignore
//! let mut graph = CommandGraph::new(GraphConfig::default());
//! {
//!     let mut rec = graph.record(&resources);
//!     rec.draw(DrawInfo::new("gbuffer", pipeline).render_target(albedo))?;
//!     rec.draw(DrawInfo::new("light", pipeline).read(albedo, AccessDomain::Fragment).render_target(output))?;
//! }
//! graph.build(&resources)?;
//! graph.execute(&mut resources, &mut AshTarget::new(&device, command_buffer))?;
//! ```
//!
//! # Features
//! - `logging`: trace output via the `log` crate.
//! - `log_reasoning`: additionally explains hazards and barrier decisions.
//! - `dot`: [CommandGraph::export_graph_as_dot].

mod access;
pub use access::{AccessDomain, AccessType, ResourceAccess, SyncScope};

mod barrier;
pub use barrier::{BarrierBatch, BufferBarrier, TextureBarrier};

mod config;
pub use config::GraphConfig;

#[cfg(feature = "dot")]
mod dot;

mod error;
pub use error::{GraphError, RecordError, ResourceError};

mod executor;
pub use executor::SubmissionTarget;

mod graph;
pub use graph::{Barrier, DependencyGraph, Edge, Hazard, LayoutRequirement};

mod recorder;
pub use recorder::{
    Command, CommandHandle, CommandPayload, CommandRecorder, CopyBufferInfo, DrawCommand, DrawIndexed, DrawInfo,
    DrawPipeline, IndexBufferView,
};

mod resource;
pub use resource::{Handle, NativeResource, ResourceKind, ResourceRegistry, ResourceTable};

mod schedule;
pub use schedule::ExecutionStep;

mod target;
pub use target::AshTarget;

///Everything derived from the recorded commands by [CommandGraph::build].
#[derive(Clone, Debug)]
pub struct BuiltGraph {
    pub(crate) graph: DependencyGraph,
    pub(crate) steps: Vec<ExecutionStep>,
    pub(crate) step_of: Vec<usize>,
    pub(crate) barriers: barrier::SynthesizedBarriers,
}

impl BuiltGraph {
    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn execution_steps(&self) -> &[ExecutionStep] {
        &self.steps
    }

    ///Step `command` was placed in.
    pub fn step_of(&self, command: usize) -> Option<usize> {
        self.step_of.get(command).copied()
    }

    ///Barrier batch executed before `step`.
    pub fn step_barriers(&self, step: usize) -> Option<&BarrierBatch> {
        self.barriers.steps.get(step)
    }

    ///Layout transitions executed right before `command`.
    pub fn command_transitions(&self, command: usize) -> &[TextureBarrier] {
        self.barriers
            .commands
            .get(command)
            .map(|t| t.as_slice())
            .unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

///Records commands and schedules them into barrier-separated execution steps.
///
/// The graph is either *recording* or *built*. Recording new commands always drops a previously built plan, the next
/// [build](CommandGraph::build) analyses the whole command stream again.
pub struct CommandGraph {
    config: GraphConfig,
    pub(crate) commands: Vec<Command>,
    built: Option<BuiltGraph>,
}

impl CommandGraph {
    pub fn new(config: GraphConfig) -> Self {
        CommandGraph {
            config,
            commands: Vec::new(),
            built: None,
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    ///Starts recording commands. Every resource the commands use must be known to `registry`.
    pub fn record<'g, R: ResourceRegistry + ?Sized>(&'g mut self, registry: &'g R) -> CommandRecorder<'g, R> {
        CommandRecorder::new(self, registry)
    }

    pub(crate) fn invalidate(&mut self) {
        self.built = None;
    }

    ///All recorded commands in recording order.
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn is_built(&self) -> bool {
        self.built.is_some()
    }

    ///Analyses the recorded commands and builds the execution plan. Does nothing if the graph is already built and
    /// nothing was recorded since. An empty graph builds into an empty plan.
    ///
    /// Texture layouts are taken from `registry` as they are right now. Layout changes that happen between building
    /// and executing are handled, since the executor re-reads each layout before submitting a transition.
    pub fn build<R: ResourceRegistry + ?Sized>(&mut self, registry: &R) -> Result<&BuiltGraph, GraphError> {
        let built = match self.built.take() {
            Some(built) => built,
            None => {
                #[cfg(feature = "logging")]
                log::trace!("Building command graph with {} commands", self.commands.len());

                let graph = graph::graphify(&self.commands, registry, &self.config)?;
                let (steps, step_of) = schedule::flatten(&graph, &self.config);
                let barriers = barrier::synthesize(&graph, &steps, registry)?;

                #[cfg(feature = "logging")]
                log::trace!(
                    "Scheduled {} commands into {} steps ({} edges)",
                    self.commands.len(),
                    steps.len(),
                    graph.edge_count()
                );

                BuiltGraph {
                    graph,
                    steps,
                    step_of,
                    barriers,
                }
            }
        };

        Ok(self.built.insert(built))
    }

    ///The built plan, if any.
    pub fn built(&self) -> Option<&BuiltGraph> {
        self.built.as_ref()
    }

    ///Replays the built plan against `target`. Updates the layouts tracked by `registry` as transitions are submitted.
    ///
    /// # Panics
    ///
    /// Panics if the graph was not [built](CommandGraph::build) after the last recorded command.
    pub fn execute<R, T>(&self, registry: &mut R, target: &mut T) -> Result<(), GraphError>
    where
        R: ResourceRegistry,
        T: SubmissionTarget + ?Sized,
    {
        let Some(built) = self.built.as_ref() else {
            panic!("CommandGraph must be built before it is executed");
        };
        executor::execute(built, &self.commands, registry, target)
    }

    ///Dependency adjacency list of the built graph.
    pub fn adjacency(&self) -> Option<&DependencyGraph> {
        self.built().map(|b| &b.graph)
    }

    pub fn execution_steps(&self) -> Option<&[ExecutionStep]> {
        self.built().map(|b| b.steps.as_slice())
    }

    ///Layouts `command` requires of its textures, available once built.
    pub fn required_layouts(&self, command: usize) -> Option<&[LayoutRequirement]> {
        self.built()
            .filter(|b| command < b.graph.len())
            .map(|b| b.graph.required_layouts(command))
    }

    pub fn step_of(&self, command: usize) -> Option<usize> {
        self.built().and_then(|b| b.step_of(command))
    }
}
