//! Command recording.
//!
//! Commands are appended in program order. The order is load bearing: every dependency edge points from an earlier
//! to a later command, which is what makes the graph acyclic. Nothing can be removed or reordered after recording.

use ash::vk;
use smallvec::SmallVec;

use crate::{
    CommandGraph, RecordError,
    access::{AccessType, ResourceAccess, SyncScope},
    resource::{Handle, ResourceKind, ResourceRegistry},
};

pub(crate) type AccessList = SmallVec<[(Handle, ResourceAccess); 6]>;

///Index of a recorded command in the command stream.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct CommandHandle(pub(crate) usize);

impl CommandHandle {
    pub fn index(&self) -> usize {
        self.0
    }
}

///Pipeline state bound for a draw. Opaque to the graph.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct DrawPipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    ///Stages the push constants are visible to.
    pub push_constant_stages: vk::ShaderStageFlags,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct IndexBufferView {
    pub buffer: Handle,
    pub offset: vk::DeviceSize,
    pub index_type: vk::IndexType,
}

///Parameters of a single indexed draw call.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct DrawIndexed {
    pub index_buffer: IndexBufferView,
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
    pub first_instance: u32,
}

///Description of a draw command. Resources are declared together with their access, the recorder sorts them into
/// the read and write set.
#[derive(Clone, Debug)]
pub struct DrawInfo {
    pub debug_name: String,
    pub pipeline: DrawPipeline,
    pub resources: Vec<(Handle, ResourceAccess)>,
    pub draws: Vec<DrawIndexed>,
    ///Push constant bytes, one entry per draw.
    pub push_constants: Vec<Vec<u8>>,
    ///Render area of draws without attachments. Draws with attachments use the extent of their first attachment
    /// unless this is set.
    pub render_area: Option<vk::Extent2D>,
}

impl DrawInfo {
    pub fn new(debug_name: impl Into<String>, pipeline: DrawPipeline) -> Self {
        DrawInfo {
            debug_name: debug_name.into(),
            pipeline,
            resources: Vec::new(),
            draws: Vec::new(),
            push_constants: Vec::new(),
            render_area: None,
        }
    }

    pub fn access(mut self, handle: Handle, access: ResourceAccess) -> Self {
        self.resources.push((handle, access));
        self
    }

    pub fn read(self, handle: Handle, domain: crate::AccessDomain) -> Self {
        self.access(handle, ResourceAccess::read(domain))
    }

    pub fn storage(self, handle: Handle, domain: crate::AccessDomain) -> Self {
        self.access(handle, ResourceAccess::storage(domain))
    }

    pub fn render_target(self, handle: Handle) -> Self {
        self.access(handle, ResourceAccess::render_target())
    }

    pub fn depth_target(self, handle: Handle) -> Self {
        self.access(handle, ResourceAccess::depth_target())
    }

    pub fn render_area(mut self, width: u32, height: u32) -> Self {
        self.render_area = Some(vk::Extent2D { width, height });
        self
    }

    ///Adds a draw call with `push_constant` as its push constant block.
    pub fn draw_indexed<T: bytemuck::Pod>(self, draw: DrawIndexed, push_constant: &T) -> Self {
        self.draw_indexed_raw(draw, bytemuck::bytes_of(push_constant).to_vec())
    }

    pub fn draw_indexed_raw(mut self, draw: DrawIndexed, push_constant: Vec<u8>) -> Self {
        self.draws.push(draw);
        self.push_constants.push(push_constant);
        self
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CopyBufferInfo {
    pub src: Handle,
    pub dst: Handle,
    pub src_offset: vk::DeviceSize,
    pub dst_offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
}

///Recorded draw, as replayed by the executor.
#[derive(Clone, Debug)]
pub struct DrawCommand {
    pub debug_name: String,
    pub pipeline: DrawPipeline,
    ///Color attachments in declaration order.
    pub render_targets: SmallVec<[Handle; 4]>,
    pub depth_target: Option<Handle>,
    pub draws: Vec<DrawIndexed>,
    pub push_constants: Vec<Vec<u8>>,
    pub render_area: Option<vk::Extent2D>,
}

///Per-kind payload of a command.
#[derive(Clone, Debug)]
pub enum CommandPayload {
    Draw(DrawCommand),
    CopyBuffer(CopyBufferInfo),
}

impl CommandPayload {
    ///Unwraps assuming a draw, panics if not.
    pub fn unwrap_draw(&self) -> &DrawCommand {
        if let CommandPayload::Draw(draw) = self {
            draw
        } else {
            panic!("Trying to fetch draw payload of a non-draw command")
        }
    }

    ///Unwraps assuming a buffer copy, panics if not.
    pub fn unwrap_copy(&self) -> &CopyBufferInfo {
        if let CommandPayload::CopyBuffer(copy) = self {
            copy
        } else {
            panic!("Trying to fetch copy payload of a non-copy command")
        }
    }
}

///A single recorded command.
#[derive(Clone, Debug)]
pub struct Command {
    index: usize,
    payload: CommandPayload,
    ///All accesses, reads first, then writes. Each in declaration order.
    accesses: AccessList,
    reads: SmallVec<[Handle; 4]>,
    writes: SmallVec<[Handle; 4]>,
}

impl Command {
    fn new(index: usize, payload: CommandPayload, declared: AccessList) -> Self {
        let (read_accesses, write_accesses): (AccessList, AccessList) =
            declared.into_iter().partition(|(_, access)| !access.is_write());

        let mut reads: SmallVec<[Handle; 4]> = SmallVec::new();
        for (handle, _) in read_accesses.iter() {
            if !reads.contains(handle) {
                reads.push(*handle);
            }
        }
        let mut writes: SmallVec<[Handle; 4]> = SmallVec::new();
        for (handle, _) in write_accesses.iter() {
            if !writes.contains(handle) {
                writes.push(*handle);
            }
        }

        let mut accesses = read_accesses;
        accesses.extend(write_accesses);

        Command {
            index,
            payload,
            accesses,
            reads,
            writes,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn payload(&self) -> &CommandPayload {
        &self.payload
    }

    ///Resources read by this command, in declaration order.
    pub fn reads(&self) -> &[Handle] {
        &self.reads
    }

    ///Resources written by this command, in declaration order.
    pub fn writes(&self) -> &[Handle] {
        &self.writes
    }

    pub fn accesses(&self) -> &[(Handle, ResourceAccess)] {
        &self.accesses
    }

    pub fn reads_from(&self, handle: Handle) -> bool {
        self.reads.contains(&handle)
    }

    pub fn writes_to(&self, handle: Handle) -> bool {
        self.writes.contains(&handle)
    }

    ///Union of the synchronisation scopes of all accesses of this command to `handle`.
    pub fn scope_of(&self, handle: Handle) -> SyncScope {
        self.accesses
            .iter()
            .filter(|(h, _)| *h == handle)
            .fold(SyncScope::NONE, |scope, (_, access)| {
                scope.union(access.scope())
            })
    }

    pub fn debug_name(&self) -> String {
        match &self.payload {
            CommandPayload::Draw(draw) => draw.debug_name.clone(),
            CommandPayload::CopyBuffer(_) => format!("copy#{}", self.index),
        }
    }
}

///Appends commands to a [CommandGraph]. Validates every declared resource against the registry, so a missing
/// resource is reported here instead of failing during execution.
pub struct CommandRecorder<'g, R: ResourceRegistry + ?Sized> {
    graph: &'g mut CommandGraph,
    registry: &'g R,
}

impl<'g, R: ResourceRegistry + ?Sized> CommandRecorder<'g, R> {
    pub(crate) fn new(graph: &'g mut CommandGraph, registry: &'g R) -> Self {
        CommandRecorder { graph, registry }
    }

    ///Number of commands in the stream, including the ones recorded before this recorder was created.
    pub fn len(&self) -> usize {
        self.graph.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.commands.is_empty()
    }

    ///Records a draw command.
    pub fn draw(&mut self, info: DrawInfo) -> Result<CommandHandle, RecordError> {
        let DrawInfo {
            debug_name,
            pipeline,
            resources,
            draws,
            push_constants,
            render_area,
        } = info;

        let mut accesses = AccessList::new();
        for (handle, access) in resources {
            self.declare(&debug_name, &mut accesses, handle, access)?;
        }

        //Index buffers are read by the draw even if the caller did not declare them.
        for draw in draws.iter() {
            let ib = draw.index_buffer.buffer;
            let declared = accesses
                .iter()
                .find(|(h, _)| *h == ib)
                .map(|(_, access)| *access);
            match declared {
                None => self.declare(
                    &debug_name,
                    &mut accesses,
                    ib,
                    ResourceAccess::index_buffer(),
                )?,
                Some(existing) if !existing.is_write() => {}
                Some(existing) => {
                    return Err(RecordError::ConflictingAccess {
                        command: debug_name,
                        resource: ib,
                        first: existing.ty,
                        second: AccessType::IndexBuffer,
                    });
                }
            }
        }

        let mut render_targets: SmallVec<[Handle; 4]> = SmallVec::new();
        let mut depth_target = None;
        for (handle, access) in accesses.iter() {
            match access.ty {
                AccessType::RenderTarget => {
                    if !render_targets.contains(handle) {
                        render_targets.push(*handle);
                    }
                }
                AccessType::DepthTarget => match depth_target {
                    Some(existing) if existing != *handle => {
                        return Err(RecordError::MultipleDepthTargets(debug_name));
                    }
                    _ => depth_target = Some(*handle),
                },
                _ => {}
            }
        }

        if render_targets.is_empty() && depth_target.is_none() && render_area.is_none() {
            return Err(RecordError::MissingRenderArea(debug_name));
        }

        let payload = CommandPayload::Draw(DrawCommand {
            debug_name,
            pipeline,
            render_targets,
            depth_target,
            draws,
            push_constants,
            render_area,
        });

        Ok(self.push(payload, accesses))
    }

    ///Records a buffer to buffer copy of `info.size` bytes.
    pub fn copy_buffer(&mut self, info: CopyBufferInfo) -> Result<CommandHandle, RecordError> {
        if info.size == 0 {
            return Err(RecordError::EmptyCopy {
                src: info.src,
                dst: info.dst,
            });
        }

        let name = format!("copy#{}", self.graph.commands.len());
        let mut accesses = AccessList::new();
        self.declare(&name, &mut accesses, info.src, ResourceAccess::copy_source())?;
        self.declare(
            &name,
            &mut accesses,
            info.dst,
            ResourceAccess::copy_destination(),
        )?;

        Ok(self.push(CommandPayload::CopyBuffer(info), accesses))
    }

    fn declare(
        &self,
        command: &str,
        accesses: &mut AccessList,
        handle: Handle,
        access: ResourceAccess,
    ) -> Result<(), RecordError> {
        let kind =
            self.registry
                .resource_kind(handle)
                .ok_or_else(|| RecordError::UnknownResource {
                    command: command.to_owned(),
                    resource: handle,
                })?;

        if access.ty.requires_buffer() && kind != ResourceKind::Buffer {
            return Err(RecordError::NotABuffer {
                command: command.to_owned(),
                resource: handle,
                access: access.ty,
            });
        }
        if access.ty.requires_texture() && kind != ResourceKind::Texture {
            return Err(RecordError::NotATexture {
                command: command.to_owned(),
                resource: handle,
                access: access.ty,
            });
        }

        if let Some((_, existing)) = accesses.iter().find(|(h, _)| *h == handle).copied() {
            if existing.ty != access.ty {
                return Err(RecordError::ConflictingAccess {
                    command: command.to_owned(),
                    resource: handle,
                    first: existing.ty,
                    second: access.ty,
                });
            }
            if existing == access {
                return Ok(());
            }
        }

        accesses.push((handle, access));
        Ok(())
    }

    fn push(&mut self, payload: CommandPayload, accesses: AccessList) -> CommandHandle {
        let index = self.graph.commands.len();
        let command = Command::new(index, payload, accesses);

        #[cfg(feature = "log_reasoning")]
        log::trace!(
            "Recorded {} as #{}: reads={:?}, writes={:?}",
            command.debug_name(),
            index,
            command.reads(),
            command.writes()
        );

        self.graph.commands.push(command);
        //Anything built before does not know about the new command anymore.
        self.graph.invalidate();
        CommandHandle(index)
    }
}
