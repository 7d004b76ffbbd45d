use graphviz_rust::{
    dot_structures::{Attribute, Edge, EdgeTy, Graph, Id, Node, NodeId, Stmt, Subgraph, Vertex},
    printer::{DotPrinter, PrinterContext},
};

use crate::{CommandGraph, Hazard};

fn node_id(command: usize) -> NodeId {
    NodeId(Id::Plain(format!("c{}", command)), None)
}

fn escaped(s: &str) -> Id {
    Id::Escaped(format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")))
}

fn hazard_tag(hazard: Hazard) -> &'static str {
    match hazard {
        Hazard::ReadAfterWrite => "RAW",
        Hazard::WriteAfterRead => "WAR",
        Hazard::WriteAfterWrite => "WAW",
    }
}

impl CommandGraph {
    ///Renders the command graph in the graphviz dot format.
    ///
    /// Each command is a node labelled with its debug name. If the graph is built, every dependency is an edge
    /// labelled with the shared resources and commands are grouped into one rank per execution step.
    pub fn export_graph_as_dot(&self) -> String {
        let mut stmts = Vec::with_capacity(self.commands.len());
        stmts.push(Stmt::Attribute(Attribute(
            Id::Plain("rankdir".to_owned()),
            Id::Plain("LR".to_owned()),
        )));

        for command in self.commands.iter() {
            stmts.push(Stmt::Node(Node {
                id: node_id(command.index()),
                attributes: vec![Attribute(
                    Id::Plain("label".to_owned()),
                    escaped(&command.debug_name()),
                )],
            }));
        }

        if let Some(built) = self.built() {
            for (idx, step) in built.execution_steps().iter().enumerate() {
                let mut step_stmts = vec![Stmt::Attribute(Attribute(
                    Id::Plain("rank".to_owned()),
                    Id::Plain("same".to_owned()),
                ))];
                step_stmts.extend(step.commands.iter().map(|c| {
                    Stmt::Node(Node {
                        id: node_id(*c),
                        attributes: Vec::new(),
                    })
                }));
                stmts.push(Stmt::Subgraph(Subgraph {
                    id: Id::Plain(format!("step_{}", idx)),
                    stmts: step_stmts,
                }));
            }

            let graph = built.dependency_graph();
            for from in 0..graph.len() {
                for edge in graph.edges(from) {
                    let label = edge
                        .barriers
                        .iter()
                        .map(|b| format!("{} ({})", b.resource, hazard_tag(b.hazard)))
                        .collect::<Vec<_>>()
                        .join(", ");
                    stmts.push(Stmt::Edge(Edge {
                        ty: EdgeTy::Pair(Vertex::N(node_id(from)), Vertex::N(node_id(edge.to))),
                        attributes: vec![Attribute(Id::Plain("label".to_owned()), escaped(&label))],
                    }));
                }
            }
        }

        let graph = Graph::DiGraph {
            id: Id::Plain("commands".to_owned()),
            strict: false,
            stmts,
        };
        graph.print(&mut PrinterContext::default())
    }
}
