//! Records a small deferred frame against a [ResourceTable] with null handles and prints the resulting schedule.
//! No GPU is needed, the plan is replayed into a target that only prints what it receives.
//!
//! Run with `cargo run --example plan_dump --features log_reasoning` to also see the hazard analysis.

use ash::vk;
use cmdgraph::{
    AccessDomain, BufferBarrier, CommandGraph, CopyBufferInfo, DrawCommand, DrawInfo, DrawPipeline, GraphConfig,
    ResourceRegistry, ResourceTable, SubmissionTarget, TextureBarrier,
};

struct PrintTarget;

impl SubmissionTarget for PrintTarget {
    fn pipeline_barrier(
        &mut self,
        registry: &dyn ResourceRegistry,
        buffers: &[BufferBarrier],
        textures: &[TextureBarrier],
    ) -> anyhow::Result<()> {
        println!("  barrier:");
        for b in buffers {
            println!(
                "    buffer {}: {:?} -> {:?}",
                registry.debug_name(b.resource).unwrap_or("?"),
                b.before.access,
                b.after.access
            );
        }
        for t in textures {
            println!(
                "    texture {}: {:?} -> {:?}",
                registry.debug_name(t.resource).unwrap_or("?"),
                t.layout_before,
                t.layout_after
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

    fn draw(&mut self, _registry: &dyn ResourceRegistry, draw: &DrawCommand) -> anyhow::Result<()> {
        println!("  draw {}", draw.debug_name);
        Ok(())
    }

    fn copy_buffer(
        &mut self,
        registry: &dyn ResourceRegistry,
        copy: &CopyBufferInfo,
    ) -> anyhow::Result<()> {
        println!(
            "  copy {} -> {} ({} bytes)",
            registry.debug_name(copy.src).unwrap_or("?"),
            registry.debug_name(copy.dst).unwrap_or("?"),
            copy.size
        );
        Ok(())
    }
}

fn texture(table: &mut ResourceTable, name: &str, aspect: vk::ImageAspectFlags) -> cmdgraph::Handle {
    table.add_texture(
        vk::Image::null(),
        vk::ImageView::null(),
        aspect,
        vk::Extent2D {
            width: 1920,
            height: 1080,
        },
        vk::ImageLayout::UNDEFINED,
        Some(name),
    )
}

fn main() -> Result<(), anyhow::Error> {
    simple_logger::SimpleLogger::new().init()?;

    let mut table = ResourceTable::new();
    let staging = table.add_buffer(vk::Buffer::null(), 4096, Some("staging"));
    let camera = table.add_buffer(vk::Buffer::null(), 4096, Some("camera"));
    let albedo = texture(&mut table, "albedo", vk::ImageAspectFlags::COLOR);
    let depth = texture(&mut table, "depth", vk::ImageAspectFlags::DEPTH);
    let shadow = texture(&mut table, "shadow", vk::ImageAspectFlags::DEPTH);
    let output = texture(&mut table, "output", vk::ImageAspectFlags::COLOR);

    let mut graph = CommandGraph::new(GraphConfig::default());
    {
        let mut rec = graph.record(&table);
        rec.copy_buffer(CopyBufferInfo {
            src: staging,
            dst: camera,
            src_offset: 0,
            dst_offset: 0,
            size: 256,
        })?;
        rec.draw(DrawInfo::new("shadow", DrawPipeline::default()).depth_target(shadow))?;
        rec.draw(
            DrawInfo::new("gbuffer", DrawPipeline::default())
                .read(camera, AccessDomain::Vertex)
                .render_target(albedo)
                .depth_target(depth),
        )?;
        rec.draw(
            DrawInfo::new("lighting", DrawPipeline::default())
                .read(albedo, AccessDomain::Fragment)
                .read(depth, AccessDomain::Fragment)
                .read(shadow, AccessDomain::Fragment)
                .render_target(output),
        )?;
    }

    let built = graph.build(&table)?;
    for (idx, step) in built.execution_steps().iter().enumerate() {
        println!("step {}: {:?}", idx, step.commands);
    }

    println!("replay:");
    graph.execute(&mut table, &mut PrintTarget)?;

    #[cfg(feature = "dot")]
    println!("{}", graph.export_graph_as_dot());

    Ok(())
}
