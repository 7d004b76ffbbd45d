use anyhow::{anyhow, bail};
use ash::vk;
use smallvec::SmallVec;

use crate::{
    BufferBarrier, CopyBufferInfo, DrawCommand, Handle, NativeResource, ResourceRegistry, SubmissionTarget,
    TextureBarrier,
};

///Records the graph into a Vulkan command buffer.
///
/// Draws use dynamic rendering, so the device needs `dynamicRendering` and `synchronization2` enabled. Viewport and
/// scissor are set dynamically to the draw's render area, or the extent of its first attachment. The command buffer must be in the recording
/// state for as long as the target is used.
pub struct AshTarget<'a> {
    device: &'a ash::Device,
    command_buffer: vk::CommandBuffer,
    ///Optional descriptor set that is bound for every draw, usually a bindless set.
    descriptor_set: Option<vk::DescriptorSet>,
}

impl<'a> AshTarget<'a> {
    pub fn new(device: &'a ash::Device, command_buffer: vk::CommandBuffer) -> Self {
        AshTarget {
            device,
            command_buffer,
            descriptor_set: None,
        }
    }

    pub fn with_descriptor_set(mut self, set: vk::DescriptorSet) -> Self {
        self.descriptor_set = Some(set);
        self
    }

    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }
}

fn subresource_all(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: vk::REMAINING_MIP_LEVELS,
        base_array_layer: 0,
        layer_count: vk::REMAINING_ARRAY_LAYERS,
    }
}

fn native_buffer(registry: &dyn ResourceRegistry, handle: Handle) -> anyhow::Result<vk::Buffer> {
    registry
        .native(handle)
        .and_then(|n| n.barrier_buffer())
        .ok_or_else(|| anyhow!("{} does not resolve to a buffer", handle))
}

fn native_texture(
    registry: &dyn ResourceRegistry,
    handle: Handle,
) -> anyhow::Result<(vk::Image, vk::ImageView, vk::ImageAspectFlags, vk::Extent2D)> {
    match registry.native(handle) {
        Some(NativeResource::Texture {
            image,
            view,
            aspect,
            extent,
        }) => Ok((image, view, aspect, extent)),
        Some(other) => bail!("{} is a {:?}, not a texture", handle, other.kind()),
        None => bail!("{} is not registered", handle),
    }
}

///Extent a draw renders to. An explicit render area wins over the first color or depth attachment.
fn render_extent(registry: &dyn ResourceRegistry, draw: &DrawCommand) -> anyhow::Result<vk::Extent2D> {
    if let Some(area) = draw.render_area {
        return Ok(area);
    }
    match draw.render_targets.first().copied().or(draw.depth_target) {
        Some(attachment) => native_texture(registry, attachment).map(|(_, _, _, extent)| extent),
        None => bail!("Draw {} has no attachments and no render area", draw.debug_name),
    }
}

fn image_barriers(
    registry: &dyn ResourceRegistry,
    textures: &[TextureBarrier],
) -> anyhow::Result<SmallVec<[vk::ImageMemoryBarrier2<'static>; 4]>> {
    let mut barriers = SmallVec::new();
    for barrier in textures {
        let (image, _view, aspect, _extent) = native_texture(registry, barrier.resource)?;
        barriers.push(
            vk::ImageMemoryBarrier2::default()
                .image(image)
                .subresource_range(subresource_all(aspect))
                .src_stage_mask(barrier.before.stage)
                .src_access_mask(barrier.before.access)
                .dst_stage_mask(barrier.after.stage)
                .dst_access_mask(barrier.after.access)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .old_layout(barrier.layout_before)
                .new_layout(barrier.layout_after),
        );
    }
    Ok(barriers)
}

impl<'a> SubmissionTarget for AshTarget<'a> {
    fn pipeline_barrier(
        &mut self,
        registry: &dyn ResourceRegistry,
        buffers: &[BufferBarrier],
        textures: &[TextureBarrier],
    ) -> anyhow::Result<()> {
        let mut buffer_barriers: SmallVec<[vk::BufferMemoryBarrier2<'static>; 4]> = SmallVec::new();
        for barrier in buffers {
            buffer_barriers.push(
                vk::BufferMemoryBarrier2::default()
                    .buffer(native_buffer(registry, barrier.resource)?)
                    .offset(0)
                    .size(vk::WHOLE_SIZE)
                    .src_stage_mask(barrier.before.stage)
                    .src_access_mask(barrier.before.access)
                    .dst_stage_mask(barrier.after.stage)
                    .dst_access_mask(barrier.after.access)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED),
            );
        }
        let image_barriers = image_barriers(registry, textures)?;

        unsafe {
            self.device.cmd_pipeline_barrier2(
                self.command_buffer,
                &vk::DependencyInfo::default()
                    .buffer_memory_barriers(&buffer_barriers)
                    .image_memory_barriers(&image_barriers),
            );
        }
        Ok(())
    }

    fn point_transitions(
        &mut self,
        registry: &dyn ResourceRegistry,
        textures: &[TextureBarrier],
    ) -> anyhow::Result<()> {
        self.pipeline_barrier(registry, &[], textures)
    }

    fn draw(&mut self, registry: &dyn ResourceRegistry, draw: &DrawCommand) -> anyhow::Result<()> {
        let extent = render_extent(registry, draw)?;
        let mut color_attachments: SmallVec<[vk::RenderingAttachmentInfo<'static>; 4]> = SmallVec::new();
        for rt in draw.render_targets.iter() {
            let (_image, view, _aspect, _extent) = native_texture(registry, *rt)?;
            color_attachments.push(
                vk::RenderingAttachmentInfo::default()
                    .image_view(view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(vk::AttachmentLoadOp::LOAD)
                    .store_op(vk::AttachmentStoreOp::STORE),
            );
        }

        let depth_attachment = match draw.depth_target {
            Some(depth) => {
                let (_image, view, _aspect, _extent) = native_texture(registry, depth)?;
                Some(
                    vk::RenderingAttachmentInfo::default()
                        .image_view(view)
                        .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                        .load_op(vk::AttachmentLoadOp::LOAD)
                        .store_op(vk::AttachmentStoreOp::STORE),
                )
            }
            None => None,
        };

        let mut render_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth) = depth_attachment.as_ref() {
            render_info = render_info.depth_attachment(depth);
        }

        let mut index_buffers: SmallVec<[vk::Buffer; 4]> = SmallVec::new();
        for call in draw.draws.iter() {
            index_buffers.push(native_buffer(registry, call.index_buffer.buffer)?);
        }

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            self.device
                .cmd_begin_rendering(self.command_buffer, &render_info);
            self.device.cmd_bind_pipeline(
                self.command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                draw.pipeline.pipeline,
            );
            if let Some(set) = self.descriptor_set {
                self.device.cmd_bind_descriptor_sets(
                    self.command_buffer,
                    vk::PipelineBindPoint::GRAPHICS,
                    draw.pipeline.layout,
                    0,
                    &[set],
                    &[],
                );
            }
            self.device
                .cmd_set_viewport(self.command_buffer, 0, &[viewport]);
            self.device.cmd_set_scissor(
                self.command_buffer,
                0,
                &[vk::Rect2D {
                    offset: vk::Offset2D { x: 0, y: 0 },
                    extent,
                }],
            );

            for (idx, call) in draw.draws.iter().enumerate() {
                if let Some(push) = draw.push_constants.get(idx).filter(|p| !p.is_empty()) {
                    self.device.cmd_push_constants(
                        self.command_buffer,
                        draw.pipeline.layout,
                        draw.pipeline.push_constant_stages,
                        0,
                        push,
                    );
                }
                self.device.cmd_bind_index_buffer(
                    self.command_buffer,
                    index_buffers[idx],
                    call.index_buffer.offset,
                    call.index_buffer.index_type,
                );
                self.device.cmd_draw_indexed(
                    self.command_buffer,
                    call.index_count,
                    call.instance_count,
                    call.first_index,
                    call.vertex_offset,
                    call.first_instance,
                );
            }

            self.device.cmd_end_rendering(self.command_buffer);
        }

        Ok(())
    }

    fn copy_buffer(
        &mut self,
        registry: &dyn ResourceRegistry,
        copy: &CopyBufferInfo,
    ) -> anyhow::Result<()> {
        let src = native_buffer(registry, copy.src)?;
        let dst = native_buffer(registry, copy.dst)?;
        unsafe {
            self.device.cmd_copy_buffer(
                self.command_buffer,
                src,
                dst,
                &[vk::BufferCopy {
                    src_offset: copy.src_offset,
                    dst_offset: copy.dst_offset,
                    size: copy.size,
                }],
            );
        }
        Ok(())
    }
}
