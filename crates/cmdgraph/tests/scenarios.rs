mod common;

use ash::vk;
use cmdgraph::{
    AccessDomain, AccessType, CommandGraph, DrawIndexed, DrawInfo, DrawPipeline, GraphConfig, Hazard, IndexBufferView,
    ResourceAccess, ResourceRegistry, ResourceTable,
};
use common::{RecordingTarget, buffer, copy, init_logger, texture};

#[test]
fn render_target_feeds_shader_read() {
    init_logger();
    let mut table = ResourceTable::new();
    let t = texture(&mut table, "albedo");

    let mut graph = CommandGraph::new(GraphConfig::default());
    {
        let mut rec = graph.record(&table);
        rec.draw(DrawInfo::new("gbuffer", DrawPipeline::default()).render_target(t))
            .unwrap();
        rec.draw(DrawInfo::new("lighting", DrawPipeline::default()).read(t, AccessDomain::Fragment).render_area(64, 64))
            .unwrap();
    }

    let built = graph.build(&table).unwrap();
    let dag = built.dependency_graph();
    let edge = dag.edge(0, 1).expect("edge 0 -> 1");
    assert_eq!(edge.barriers.len(), 1);
    let barrier = edge.barriers[0];
    assert_eq!(barrier.resource, t);
    assert!(barrier.is_texture);
    assert_eq!(barrier.hazard, Hazard::ReadAfterWrite);
    assert_eq!(barrier.before(), ResourceAccess::render_target().scope());
    assert_eq!(barrier.after(), ResourceAccess::read(AccessDomain::Fragment).scope());

    let steps: Vec<Vec<usize>> = built
        .execution_steps()
        .iter()
        .map(|s| s.commands.clone())
        .collect();
    assert_eq!(steps, vec![vec![0], vec![1]]);
}

#[test]
fn disjoint_commands_share_a_step() {
    let mut table = ResourceTable::new();
    let a = buffer(&mut table, "a");
    let b = buffer(&mut table, "b");
    let c = buffer(&mut table, "c");
    let d = buffer(&mut table, "d");
    let shared = texture(&mut table, "shared");
    let other = texture(&mut table, "other");

    let mut graph = CommandGraph::new(GraphConfig::default());
    {
        let mut rec = graph.record(&table);
        rec.draw(DrawInfo::new("first", DrawPipeline::default()).render_target(shared))
            .unwrap();
        rec.draw(DrawInfo::new("second", DrawPipeline::default()).read(shared, AccessDomain::Fragment).render_area(64, 64))
            .unwrap();
        //commands 2 and 3 touch nothing the other one touches
        rec.copy_buffer(copy(a, b)).unwrap();
        rec.draw(
            DrawInfo::new("unrelated", DrawPipeline::default())
                .read(c, AccessDomain::Vertex)
                .storage(d, AccessDomain::Fragment)
                .render_target(other),
        )
        .unwrap();
    }

    let built = graph.build(&table).unwrap();
    assert!(built.dependency_graph().edge(2, 3).is_none());
    assert_eq!(built.step_of(2), built.step_of(3));
    assert_eq!(built.step_of(2), Some(0));
    assert_eq!(built.execution_steps()[0].commands, vec![0, 2, 3]);
}

#[test]
fn copy_feeds_vertex_input() {
    let mut table = ResourceTable::new();
    let staging = buffer(&mut table, "staging");
    let vertices = buffer(&mut table, "vertices");
    let indices = buffer(&mut table, "indices");
    let target = texture(&mut table, "target");

    let mut graph = CommandGraph::new(GraphConfig::default());
    {
        let mut rec = graph.record(&table);
        rec.copy_buffer(copy(staging, vertices)).unwrap();
        rec.draw(
            DrawInfo::new("mesh", DrawPipeline::default())
                .read(vertices, AccessDomain::Vertex)
                .render_target(target)
                .draw_indexed(
                    DrawIndexed {
                        index_buffer: IndexBufferView {
                            buffer: indices,
                            offset: 0,
                            index_type: vk::IndexType::UINT16,
                        },
                        index_count: 36,
                        instance_count: 1,
                        first_index: 0,
                        vertex_offset: 0,
                        first_instance: 0,
                    },
                    &[0.5f32; 4],
                ),
        )
        .unwrap();
    }

    let built = graph.build(&table).unwrap();
    let edge = built.dependency_graph().edge(0, 1).unwrap();
    assert_eq!(edge.barriers.len(), 1);
    assert_eq!(edge.barriers[0].resource, vertices);
    assert!(!edge.barriers[0].is_texture);
    assert_eq!(
        edge.barriers[0].access_before,
        vk::AccessFlags2::TRANSFER_WRITE
    );

    //index buffer became part of the read set
    let draw = &graph.commands()[1];
    assert!(draw.reads_from(indices));
    assert!(
        draw.accesses()
            .iter()
            .any(|(h, a)| *h == indices && a.ty == AccessType::IndexBuffer)
    );
}

#[test]
fn empty_stream() {
    let mut table = ResourceTable::new();
    let mut graph = CommandGraph::new(GraphConfig::default());
    assert!(graph.build(&table).unwrap().is_empty());

    let mut target = RecordingTarget::default();
    graph.execute(&mut table, &mut target).unwrap();
    assert!(target.calls.is_empty());
}

#[test]
fn every_hazard_is_an_edge() {
    let mut table = ResourceTable::new();
    let bufs: Vec<_> = (0..4).map(|i| buffer(&mut table, &format!("b{}", i))).collect();
    let tex = texture(&mut table, "t");

    let mut graph = CommandGraph::new(GraphConfig::default());
    {
        let mut rec = graph.record(&table);
        rec.copy_buffer(copy(bufs[0], bufs[1])).unwrap();
        rec.draw(
            DrawInfo::new("a", DrawPipeline::default())
                .read(bufs[1], AccessDomain::Vertex)
                .storage(bufs[2], AccessDomain::Compute)
                .render_target(tex),
        )
        .unwrap();
        rec.copy_buffer(copy(bufs[2], bufs[0])).unwrap();
        rec.draw(
            DrawInfo::new("b", DrawPipeline::default())
                .read(tex, AccessDomain::Fragment)
                .storage(bufs[3], AccessDomain::Fragment)
                .render_area(64, 64),
        )
        .unwrap();
        rec.copy_buffer(copy(bufs[3], bufs[1])).unwrap();
    }

    graph.build(&table).unwrap();
    let built = graph.built().unwrap();
    let dag = built.dependency_graph();
    let commands = graph.commands();
    for i in 0..commands.len() {
        for j in (i + 1)..commands.len() {
            let (p, c) = (&commands[i], &commands[j]);
            let raw = p.writes().iter().any(|h| c.reads_from(*h));
            let war = p.reads().iter().any(|h| c.writes_to(*h));
            let waw = p.writes().iter().any(|h| c.writes_to(*h));
            assert_eq!(
                dag.edge(i, j).is_some(),
                raw || war || waw,
                "edge {} -> {}",
                i,
                j
            );
            if dag.edge(i, j).is_some() {
                assert!(built.step_of(i).unwrap() < built.step_of(j).unwrap());
            }
        }
    }

    for (idx, step) in built.execution_steps().iter().enumerate() {
        for a in step.commands.iter() {
            assert_eq!(built.step_of(*a), Some(idx));
            for b in step.commands.iter() {
                assert!(dag.edge(*a, *b).is_none());
            }
        }
    }

    //texture kind is looked up in the registry
    for from in 0..dag.len() {
        for edge in dag.edges(from) {
            for barrier in edge.barriers.iter() {
                assert_eq!(
                    barrier.is_texture,
                    table.resource_kind(barrier.resource).unwrap().is_texture()
                );
            }
        }
    }
}

#[test]
fn write_after_write_can_be_ignored() {
    let mut table = ResourceTable::new();
    let src = buffer(&mut table, "src");
    let other = buffer(&mut table, "other");
    let dst = buffer(&mut table, "dst");

    for (detect, expected_steps) in [(true, 2), (false, 1)] {
        let mut graph = CommandGraph::new(GraphConfig::default().with_write_after_write(detect));
        {
            let mut rec = graph.record(&table);
            rec.copy_buffer(copy(src, dst)).unwrap();
            rec.copy_buffer(copy(other, dst)).unwrap();
        }
        let built = graph.build(&table).unwrap();
        assert_eq!(built.dependency_graph().edge(0, 1).is_some(), detect);
        assert_eq!(built.execution_steps().len(), expected_steps);
    }
}

#[test]
fn building_is_deterministic() {
    let mut table = ResourceTable::new();
    let bufs: Vec<_> = (0..3).map(|i| buffer(&mut table, &format!("b{}", i))).collect();
    let texs: Vec<_> = (0..3).map(|i| texture(&mut table, &format!("t{}", i))).collect();

    let record = |graph: &mut CommandGraph, table: &ResourceTable| {
        let mut rec = graph.record(table);
        rec.draw(
            DrawInfo::new("shadow", DrawPipeline::default())
                .read(bufs[0], AccessDomain::Vertex)
                .depth_target(texs[0]),
        )
        .unwrap();
        rec.draw(DrawInfo::new("color", DrawPipeline::default()).render_target(texs[1]))
            .unwrap();
        rec.draw(
            DrawInfo::new("compose", DrawPipeline::default())
                .read(texs[0], AccessDomain::Fragment)
                .read(texs[1], AccessDomain::Fragment)
                .render_target(texs[2]),
        )
        .unwrap();
        rec.copy_buffer(copy(bufs[1], bufs[2])).unwrap();
    };

    let mut first = CommandGraph::new(GraphConfig::default());
    record(&mut first, &table);
    let mut second = CommandGraph::new(GraphConfig::default());
    record(&mut second, &table);

    let a = first.build(&table).unwrap();
    let b = second.build(&table).unwrap();
    assert_eq!(a.dependency_graph(), b.dependency_graph());
    assert_eq!(a.execution_steps(), b.execution_steps());
    for step in 0..a.execution_steps().len() {
        assert_eq!(a.step_barriers(step), b.step_barriers(step));
    }
}

#[test]
fn required_layouts_follow_access() {
    let mut table = ResourceTable::new();
    let color = texture(&mut table, "color");
    let depth = table.add_texture(
        vk::Image::null(),
        vk::ImageView::null(),
        vk::ImageAspectFlags::DEPTH,
        vk::Extent2D {
            width: 128,
            height: 128,
        },
        vk::ImageLayout::UNDEFINED,
        Some("depth"),
    );
    let storage = texture(&mut table, "storage");

    let mut graph = CommandGraph::new(GraphConfig::default());
    graph
        .record(&table)
        .draw(
            DrawInfo::new("all", DrawPipeline::default())
                .render_target(color)
                .depth_target(depth)
                .access(storage, ResourceAccess::new(AccessType::ReadWriteAtomic, AccessDomain::Compute)),
        )
        .unwrap();
    assert_eq!(graph.required_layouts(0), None);
    graph.build(&table).unwrap();

    let layouts: Vec<_> = graph
        .required_layouts(0)
        .unwrap()
        .iter()
        .map(|r| (r.resource, r.layout))
        .collect();
    assert_eq!(
        layouts,
        vec![
            (color, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL),
            (depth, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL),
            (storage, vk::ImageLayout::GENERAL),
        ]
    );
}
