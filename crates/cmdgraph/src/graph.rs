//! Dependency analysis ("graphify").
//!
//! Every ordered pair of commands `(i, j)`, `i < j`, is checked for hazards on shared resources. Since commands are
//! recorded in program order, edges only ever point forward and the resulting graph is a DAG.

use ash::vk;
use smallvec::SmallVec;

use crate::{
    GraphConfig, GraphError,
    access::SyncScope,
    recorder::Command,
    resource::{Handle, ResourceRegistry},
};

///Kind of hazard between two accesses of the same resource.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum Hazard {
    ///Producer writes, consumer reads.
    ReadAfterWrite,
    ///Producer reads, consumer writes.
    WriteAfterRead,
    ///Both write.
    WriteAfterWrite,
}

///Synchronisation a consumer must wait for before it may observe the producer's effect on `resource`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct Barrier {
    pub stage_before: vk::PipelineStageFlags2,
    pub stage_after: vk::PipelineStageFlags2,
    pub access_before: vk::AccessFlags2,
    pub access_after: vk::AccessFlags2,
    pub resource: Handle,
    pub is_texture: bool,
    pub hazard: Hazard,
}

impl Barrier {
    fn new(before: SyncScope, after: SyncScope, resource: Handle, is_texture: bool, hazard: Hazard) -> Self {
        Barrier {
            stage_before: before.stage,
            stage_after: after.stage,
            access_before: before.access,
            access_after: after.access,
            resource,
            is_texture,
            hazard,
        }
    }

    pub fn before(&self) -> SyncScope {
        SyncScope::new(self.stage_before, self.access_before)
    }

    pub fn after(&self) -> SyncScope {
        SyncScope::new(self.stage_after, self.access_after)
    }

    ///Widens `self` by the scopes of `other`. Both must reference the same resource.
    pub(crate) fn merge(&mut self, other: &Barrier) {
        debug_assert!(self.resource == other.resource);
        self.stage_before |= other.stage_before;
        self.stage_after |= other.stage_after;
        self.access_before |= other.access_before;
        self.access_after |= other.access_after;
    }
}

///Directed dependency to command `to`.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Edge {
    pub to: usize,
    ///One barrier per shared resource, in the producer's declaration order.
    pub barriers: SmallVec<[Barrier; 2]>,
}

///Layout a texture must be in while a command executes, together with the scope of the access that needs it.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct LayoutRequirement {
    pub resource: Handle,
    pub layout: vk::ImageLayout,
    pub scope: SyncScope,
}

///The dependency DAG of a command stream. Adjacency lists are indexed by producer, edges are sorted by consumer.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct DependencyGraph {
    pub(crate) adjacency: Vec<Vec<Edge>>,
    pub(crate) predecessors: Vec<SmallVec<[usize; 4]>>,
    pub(crate) required_layouts: Vec<SmallVec<[LayoutRequirement; 4]>>,
}

impl DependencyGraph {
    ///Outgoing edges of `command`.
    pub fn edges(&self, command: usize) -> &[Edge] {
        &self.adjacency[command]
    }

    ///Commands `command` depends on, ascending.
    pub fn predecessors(&self, command: usize) -> &[usize] {
        &self.predecessors[command]
    }

    pub fn edge(&self, from: usize, to: usize) -> Option<&Edge> {
        self.adjacency.get(from)?.iter().find(|e| e.to == to)
    }

    pub fn edge_count(&self) -> usize {
        self.adjacency.iter().map(|edges| edges.len()).sum()
    }

    pub fn required_layouts(&self, command: usize) -> &[LayoutRequirement] {
        &self.required_layouts[command]
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }
}

///Builds the dependency graph and the per command layout requirements of `commands`.
pub(crate) fn graphify<R: ResourceRegistry + ?Sized>(
    commands: &[Command],
    registry: &R,
    config: &GraphConfig,
) -> Result<DependencyGraph, GraphError> {
    let mut graph = DependencyGraph {
        adjacency: vec![Vec::new(); commands.len()],
        predecessors: vec![SmallVec::new(); commands.len()],
        required_layouts: Vec::with_capacity(commands.len()),
    };

    for (i, producer) in commands.iter().enumerate() {
        for (j, consumer) in commands.iter().enumerate().skip(i + 1) {
            let barriers = barriers_between(producer, consumer, registry, config)?;
            if !barriers.is_empty() {
                #[cfg(feature = "log_reasoning")]
                log::trace!(
                    "Edge {} -> {}: {:?}",
                    producer.debug_name(),
                    consumer.debug_name(),
                    barriers
                );
                graph.adjacency[i].push(Edge { to: j, barriers });
                graph.predecessors[j].push(i);
            }
        }

        graph
            .required_layouts
            .push(layout_requirements(producer, registry)?);
    }

    Ok(graph)
}

fn is_texture<R: ResourceRegistry + ?Sized>(registry: &R, handle: Handle) -> Result<bool, GraphError> {
    registry
        .resource_kind(handle)
        .map(|kind| kind.is_texture())
        .ok_or(GraphError::UnknownResource(handle))
}

///Calculates all barriers `consumer` needs with regards to `producer`. Returns an empty list if both commands are
/// independent.
fn barriers_between<R: ResourceRegistry + ?Sized>(
    producer: &Command,
    consumer: &Command,
    registry: &R,
    config: &GraphConfig,
) -> Result<SmallVec<[Barrier; 2]>, GraphError> {
    let mut barriers = SmallVec::new();

    //Each handle lives in exactly one of a command's sets, so every shared handle yields exactly one hazard.
    for res in producer.reads().iter().chain(producer.writes().iter()) {
        let hazard = match (producer.writes_to(*res), consumer.reads_from(*res), consumer.writes_to(*res)) {
            (true, true, _) => Hazard::ReadAfterWrite,
            (false, _, true) => Hazard::WriteAfterRead,
            (true, _, true) if config.detect_write_after_write => Hazard::WriteAfterWrite,
            _ => continue,
        };

        barriers.push(Barrier::new(
            producer.scope_of(*res),
            consumer.scope_of(*res),
            *res,
            is_texture(registry, *res)?,
            hazard,
        ));
    }

    Ok(barriers)
}

///Collects the layouts `command` needs its textures in. Reads are processed before writes.
fn layout_requirements<R: ResourceRegistry + ?Sized>(
    command: &Command,
    registry: &R,
) -> Result<SmallVec<[LayoutRequirement; 4]>, GraphError> {
    let mut requirements: SmallVec<[LayoutRequirement; 4]> = SmallVec::new();
    for (res, access) in command.accesses() {
        if !is_texture(registry, *res)? {
            continue;
        }
        let Some(layout) = access.required_layout() else {
            continue;
        };

        //The same texture might be accessed from several stages, which all share one layout.
        if let Some(existing) = requirements.iter_mut().find(|r| r.resource == *res) {
            debug_assert!(existing.layout == layout);
            existing.scope = existing.scope.union(access.scope());
        } else {
            requirements.push(LayoutRequirement {
                resource: *res,
                layout,
                scope: access.scope(),
            });
        }
    }

    Ok(requirements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        AccessDomain, CommandGraph, CopyBufferInfo, DrawInfo, DrawPipeline, ResourceTable,
    };

    fn texture(table: &mut ResourceTable) -> Handle {
        table.add_texture(
            vk::Image::null(),
            vk::ImageView::null(),
            vk::ImageAspectFlags::COLOR,
            vk::Extent2D {
                width: 4,
                height: 4,
            },
            vk::ImageLayout::UNDEFINED,
            None,
        )
    }

    #[test]
    fn render_target_then_sample() {
        let mut table = ResourceTable::new();
        let t = texture(&mut table);
        let mut graph = CommandGraph::new(GraphConfig::default());
        {
            let mut rec = graph.record(&table);
            rec.draw(DrawInfo::new("write", DrawPipeline::default()).render_target(t))
                .unwrap();
            rec.draw(DrawInfo::new("read", DrawPipeline::default()).read(t, AccessDomain::Fragment).render_area(64, 64))
                .unwrap();
        }
        let dag = graphify(graph.commands(), &table, &GraphConfig::default()).unwrap();

        let edge = dag.edge(0, 1).unwrap();
        assert_eq!(edge.barriers.len(), 1);
        let b = edge.barriers[0];
        assert_eq!(b.hazard, Hazard::ReadAfterWrite);
        assert_eq!(b.access_before, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(b.access_after, vk::AccessFlags2::SHADER_READ);
        assert_eq!(b.stage_before, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(b.stage_after, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert!(b.is_texture);
        assert_eq!(dag.predecessors(1), &[0]);

        assert_eq!(
            dag.required_layouts(0)[0].layout,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
        );
        assert_eq!(
            dag.required_layouts(1)[0].layout,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
    }

    #[test]
    fn write_after_read() {
        let mut table = ResourceTable::new();
        let a = table.add_buffer(vk::Buffer::null(), 64, None);
        let b = table.add_buffer(vk::Buffer::null(), 64, None);
        let mut graph = CommandGraph::new(GraphConfig::default());
        {
            let mut rec = graph.record(&table);
            rec.draw(DrawInfo::new("reader", DrawPipeline::default()).read(a, AccessDomain::Vertex).render_area(64, 64))
                .unwrap();
            rec.copy_buffer(CopyBufferInfo {
                src: b,
                dst: a,
                src_offset: 0,
                dst_offset: 0,
                size: 64,
            })
            .unwrap();
        }
        let dag = graphify(graph.commands(), &table, &GraphConfig::default()).unwrap();
        let barrier = dag.edge(0, 1).unwrap().barriers[0];
        assert_eq!(barrier.hazard, Hazard::WriteAfterRead);
        assert_eq!(barrier.stage_before, vk::PipelineStageFlags2::VERTEX_SHADER);
        assert_eq!(barrier.access_after, vk::AccessFlags2::TRANSFER_WRITE);
        assert!(!barrier.is_texture);
    }

    #[test]
    fn write_after_write_is_configurable() {
        let mut table = ResourceTable::new();
        let t = texture(&mut table);
        let mut graph = CommandGraph::new(GraphConfig::default());
        {
            let mut rec = graph.record(&table);
            rec.draw(DrawInfo::new("a", DrawPipeline::default()).render_target(t))
                .unwrap();
            rec.draw(DrawInfo::new("b", DrawPipeline::default()).storage(t, AccessDomain::Fragment).render_area(64, 64))
                .unwrap();
        }

        let with = graphify(graph.commands(), &table, &GraphConfig::default()).unwrap();
        assert_eq!(
            with.edge(0, 1).unwrap().barriers[0].hazard,
            Hazard::WriteAfterWrite
        );

        let without = graphify(
            graph.commands(),
            &table,
            &GraphConfig::default().with_write_after_write(false),
        )
        .unwrap();
        assert!(without.edge(0, 1).is_none());
        assert_eq!(without.edge_count(), 0);
    }

    #[test]
    fn vanished_resource() {
        let mut table = ResourceTable::new();
        let a = table.add_buffer(vk::Buffer::null(), 64, None);
        let mut graph = CommandGraph::new(GraphConfig::default());
        graph
            .record(&table)
            .draw(DrawInfo::new("reader", DrawPipeline::default()).read(a, AccessDomain::Vertex).render_area(64, 64))
            .unwrap();
        table.remove(a).unwrap();

        assert!(matches!(
            graphify(graph.commands(), &table, &GraphConfig::default()),
            Err(GraphError::UnknownResource(h)) if h == a
        ));
    }
}
