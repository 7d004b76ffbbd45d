//! Replays a built plan against a [SubmissionTarget].

use crate::{
    BuiltGraph, GraphError,
    barrier::{BufferBarrier, TextureBarrier},
    recorder::{Command, CommandPayload, CopyBufferInfo, DrawCommand},
    resource::ResourceRegistry,
};

///Whatever consumes the scheduled commands. Usually a command buffer (see [AshTarget](crate::AshTarget)), but any
/// recorder of calls works, which is how the graph is tested.
///
/// The registry is passed to every call so the target can resolve handles to native objects. Texture barriers always
/// carry the layout the registry reports at submission time in `layout_before`.
pub trait SubmissionTarget {
    ///Submits one batch of barriers that gates an execution step.
    fn pipeline_barrier(
        &mut self,
        registry: &dyn ResourceRegistry,
        buffers: &[BufferBarrier],
        textures: &[TextureBarrier],
    ) -> anyhow::Result<()>;

    ///Submits layout transitions needed right before a single command.
    fn point_transitions(
        &mut self,
        registry: &dyn ResourceRegistry,
        textures: &[TextureBarrier],
    ) -> anyhow::Result<()>;

    fn draw(&mut self, registry: &dyn ResourceRegistry, draw: &DrawCommand) -> anyhow::Result<()>;

    fn copy_buffer(
        &mut self,
        registry: &dyn ResourceRegistry,
        copy: &CopyBufferInfo,
    ) -> anyhow::Result<()>;
}

///Replaces the simulated `layout_before` with the registry's current state. Later barriers on a texture that
/// already appeared in `textures` continue from the earlier barrier's `layout_after`, so a batch never transitions
/// a texture twice from the same layout.
fn resolve_textures<R: ResourceRegistry>(
    registry: &R,
    textures: &[TextureBarrier],
) -> Result<Vec<TextureBarrier>, GraphError> {
    let mut resolved: Vec<TextureBarrier> = Vec::with_capacity(textures.len());
    for barrier in textures {
        let layout_before = match resolved
            .iter()
            .rev()
            .find(|b| b.resource == barrier.resource)
        {
            Some(previous) => previous.layout_after,
            None => registry
                .current_layout(barrier.resource)
                .ok_or(GraphError::UnknownResource(barrier.resource))?,
        };
        resolved.push(TextureBarrier {
            layout_before,
            ..*barrier
        });
    }
    Ok(resolved)
}

fn check_buffers<R: ResourceRegistry>(registry: &R, buffers: &[BufferBarrier]) -> Result<(), GraphError> {
    for barrier in buffers {
        if registry.resource_kind(barrier.resource).is_none() {
            return Err(GraphError::UnknownResource(barrier.resource));
        }
    }
    Ok(())
}

fn check_command<R: ResourceRegistry>(registry: &R, command: &Command) -> Result<(), GraphError> {
    for (handle, _) in command.accesses() {
        if registry.resource_kind(*handle).is_none() {
            return Err(GraphError::UnknownResource(*handle));
        }
    }
    Ok(())
}

fn apply<R: ResourceRegistry>(registry: &mut R, textures: &[TextureBarrier]) {
    for barrier in textures {
        registry.apply_transition(barrier.resource, barrier.layout_after);
    }
}

pub(crate) fn execute<R, T>(
    plan: &BuiltGraph,
    commands: &[Command],
    registry: &mut R,
    target: &mut T,
) -> Result<(), GraphError>
where
    R: ResourceRegistry,
    T: SubmissionTarget + ?Sized,
{
    for (step_idx, step) in plan.steps.iter().enumerate() {
        let batch = &plan.barriers.steps[step_idx];
        if !batch.is_empty() {
            check_buffers(registry, &batch.buffers)?;
            let textures = resolve_textures(registry, &batch.textures)?;

            #[cfg(feature = "logging")]
            log::trace!(
                "Step {}: {} buffer barriers, {} texture barriers",
                step_idx,
                batch.buffers.len(),
                textures.len()
            );

            target.pipeline_barrier(&*registry, &batch.buffers, &textures)?;
            apply(registry, &textures);
        }

        for cmd_idx in step.commands.iter() {
            let command = &commands[*cmd_idx];
            check_command(registry, command)?;

            let transitions = &plan.barriers.commands[*cmd_idx];
            if !transitions.is_empty() {
                let textures = resolve_textures(registry, transitions)?;
                target.point_transitions(&*registry, &textures)?;
                apply(registry, &textures);
            }

            match command.payload() {
                CommandPayload::Draw(draw) => target.draw(&*registry, draw)?,
                CommandPayload::CopyBuffer(copy) => target.copy_buffer(&*registry, copy)?,
            }
        }
    }

    Ok(())
}
