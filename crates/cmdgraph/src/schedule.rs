//! Leveling of the dependency graph into execution steps.
//!
//! A command is placed one step after the latest of its predecessors, sources land in step 0. Since edges only
//! point forward in recording order, a single sweep over the commands yields the longest path level of each command.
//! Commands within a step are mutually independent and sorted by recording index.

use crate::{
    GraphConfig,
    graph::{Barrier, DependencyGraph},
};

///Set of mutually independent commands, plus the barriers that have to be executed before any of them starts.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ExecutionStep {
    ///Command indices, ascending.
    pub commands: Vec<usize>,
    ///Barriers of all edges that end in this step.
    pub barriers: Vec<Barrier>,
}

///Levels `graph` into execution steps. Returns the steps and the step of each command.
pub(crate) fn flatten(graph: &DependencyGraph, config: &GraphConfig) -> (Vec<ExecutionStep>, Vec<usize>) {
    let mut step_of: Vec<usize> = Vec::with_capacity(graph.len());
    for command in 0..graph.len() {
        //predecessors always have a lower index and are therefore already placed
        let level = graph
            .predecessors(command)
            .iter()
            .map(|pred| step_of[*pred] + 1)
            .max()
            .unwrap_or(0);
        step_of.push(level);
    }

    let step_count = step_of.iter().max().map(|max| max + 1).unwrap_or(0);
    let mut steps = vec![ExecutionStep::default(); step_count];
    for (command, step) in step_of.iter().enumerate() {
        steps[*step].commands.push(command);
    }

    for step in steps.iter_mut() {
        let mut barriers: Vec<Barrier> = Vec::new();
        for command in step.commands.iter() {
            for pred in graph.predecessors(*command) {
                let Some(edge) = graph.edge(*pred, *command) else {
                    continue;
                };
                for barrier in edge.barriers.iter() {
                    push_barrier(&mut barriers, barrier, config.merge_step_barriers);
                }
            }
        }
        step.barriers = barriers;
    }

    #[cfg(feature = "log_reasoning")]
    for (idx, step) in steps.iter().enumerate() {
        log::trace!(
            "Step {}: commands={:?}, {} barriers",
            idx,
            step.commands,
            step.barriers.len()
        );
    }

    (steps, step_of)
}

fn push_barrier(barriers: &mut Vec<Barrier>, barrier: &Barrier, merge: bool) {
    if merge {
        if let Some(existing) = barriers.iter_mut().find(|b| b.resource == barrier.resource) {
            existing.merge(barrier);
            return;
        }
    }
    barriers.push(*barrier);
}
