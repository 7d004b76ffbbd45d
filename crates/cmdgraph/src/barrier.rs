//! Barrier synthesis.
//!
//! Turns the abstract barriers of each execution step into concrete buffer and texture barriers. Texture layouts
//! are simulated from the registry's state at build time. The registry itself is never touched here, the executor
//! applies transitions while replaying.

use ahash::AHashMap;
use ash::vk;

use crate::{
    GraphError,
    access::SyncScope,
    graph::DependencyGraph,
    resource::{Handle, ResourceRegistry},
    schedule::ExecutionStep,
};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct BufferBarrier {
    pub resource: Handle,
    pub before: SyncScope,
    pub after: SyncScope,
}

///Memory barrier on a texture, possibly changing its layout.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct TextureBarrier {
    pub resource: Handle,
    pub before: SyncScope,
    pub after: SyncScope,
    ///Layout as simulated at build time. The executor uses the layout tracked by the registry instead.
    pub layout_before: vk::ImageLayout,
    pub layout_after: vk::ImageLayout,
}

impl TextureBarrier {
    pub fn is_layout_transition(&self) -> bool {
        self.layout_before != self.layout_after
    }
}

///Barriers that are submitted together in one pipeline barrier.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct BarrierBatch {
    pub buffers: Vec<BufferBarrier>,
    pub textures: Vec<TextureBarrier>,
}

impl BarrierBatch {
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty() && self.textures.is_empty()
    }
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub(crate) struct SynthesizedBarriers {
    ///One batch per execution step, executed before the step.
    pub steps: Vec<BarrierBatch>,
    ///Point transitions per command, executed right before the command.
    pub commands: Vec<Vec<TextureBarrier>>,
}

///Simulated state of a texture.
#[derive(Clone, Copy, Debug)]
struct TrackedTexture {
    layout: vk::ImageLayout,
    ///Scope of the last use.
    last: SyncScope,
}

struct Tracker<'a, R: ResourceRegistry + ?Sized> {
    registry: &'a R,
    textures: AHashMap<Handle, TrackedTexture>,
}

impl<'a, R: ResourceRegistry + ?Sized> Tracker<'a, R> {
    fn get(&mut self, handle: Handle) -> Result<TrackedTexture, GraphError> {
        if let Some(tracked) = self.textures.get(&handle) {
            return Ok(*tracked);
        }
        let layout = self
            .registry
            .current_layout(handle)
            .ok_or(GraphError::UnknownResource(handle))?;
        let tracked = TrackedTexture {
            layout,
            last: SyncScope::NONE,
        };
        self.textures.insert(handle, tracked);
        Ok(tracked)
    }
}

pub(crate) fn synthesize<R: ResourceRegistry + ?Sized>(
    graph: &DependencyGraph,
    steps: &[ExecutionStep],
    registry: &R,
) -> Result<SynthesizedBarriers, GraphError> {
    let mut tracker = Tracker {
        registry,
        textures: AHashMap::default(),
    };
    let mut synthesized = SynthesizedBarriers {
        steps: Vec::with_capacity(steps.len()),
        commands: vec![Vec::new(); graph.len()],
    };

    for step in steps.iter() {
        //First requirement per texture in this step, in order of appearance.
        let mut first_requirements: Vec<(Handle, vk::ImageLayout, SyncScope)> = Vec::new();
        //Layout and accumulated scope of each texture while walking the step's commands.
        let mut in_step: AHashMap<Handle, (vk::ImageLayout, SyncScope)> = AHashMap::default();

        for command in step.commands.iter() {
            for req in graph.required_layouts(*command) {
                match in_step.get_mut(&req.resource) {
                    None => {
                        first_requirements.push((req.resource, req.layout, req.scope));
                        in_step.insert(req.resource, (req.layout, req.scope));
                    }
                    Some((layout, scope)) if *layout != req.layout => {
                        let transition = TextureBarrier {
                            resource: req.resource,
                            before: *scope,
                            after: req.scope,
                            layout_before: *layout,
                            layout_after: req.layout,
                        };
                        #[cfg(feature = "log_reasoning")]
                        log::trace!("Point transition before #{}: {:?}", command, transition);
                        synthesized.commands[*command].push(transition);
                        *layout = req.layout;
                        *scope = req.scope;
                    }
                    Some((_, scope)) => *scope = scope.union(req.scope),
                }
            }
        }

        let first_layout = |handle: Handle| {
            first_requirements
                .iter()
                .find(|(h, _, _)| *h == handle)
                .map(|(_, layout, _)| *layout)
        };

        let mut batch = BarrierBatch::default();
        let mut covered: Vec<Handle> = Vec::new();
        for barrier in step.barriers.iter() {
            if !barrier.is_texture {
                batch.buffers.push(BufferBarrier {
                    resource: barrier.resource,
                    before: barrier.before(),
                    after: barrier.after(),
                });
                continue;
            }

            let tracked = tracker.get(barrier.resource)?;
            let layout_after = first_layout(barrier.resource).unwrap_or(tracked.layout);
            //Unmerged barriers on the same texture only transition once.
            let layout_before = if covered.contains(&barrier.resource) {
                layout_after
            } else {
                covered.push(barrier.resource);
                tracked.layout
            };
            batch.textures.push(TextureBarrier {
                resource: barrier.resource,
                before: barrier.before(),
                after: barrier.after(),
                layout_before,
                layout_after,
            });
        }

        for (handle, layout, scope) in first_requirements.iter() {
            if covered.contains(handle) {
                continue;
            }
            let tracked = tracker.get(*handle)?;
            if tracked.layout != *layout {
                batch.textures.push(TextureBarrier {
                    resource: *handle,
                    before: tracked.last,
                    after: *scope,
                    layout_before: tracked.layout,
                    layout_after: *layout,
                });
            }
        }

        for (handle, (layout, scope)) in in_step.into_iter() {
            tracker
                .textures
                .insert(handle, TrackedTexture { layout, last: scope });
        }

        #[cfg(feature = "log_reasoning")]
        log::trace!(
            "Step batch: {} buffer barriers, {} texture barriers",
            batch.buffers.len(),
            batch.textures.len()
        );

        synthesized.steps.push(batch);
    }

    Ok(synthesized)
}
