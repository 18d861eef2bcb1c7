//! Audio graph - owns processing nodes and their connections
//!
//! Nodes live in a `petgraph` stable graph so their ids survive removals.
//! The graph is kept acyclic: every mutation that adds edges is validated
//! before it touches the live topology, and rendering walks a cached
//! topological order.
//!
//! All buffers are interleaved stereo `f32`.

use crate::domain::audio::{AudioError, Result};
use petgraph::algo::{has_path_connecting, is_cyclic_directed, toposort};
use petgraph::graphmap::DiGraphMap;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use petgraph::Direction;
use std::fmt;
use tracing::{debug, trace};

/// Channel count of every buffer flowing through the graph
pub const CHANNELS: usize = 2;

/// Timing information handed to nodes for each rendered block
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessContext {
    pub sample_rate: u32,
    /// Engine time of the first frame in the block, in seconds
    pub time: f64,
}

/// A single audio-processing unit living inside the graph
pub trait AudioNode: Send {
    /// Render one block. `input` is the sum of all upstream outputs and has
    /// the same length as `output`.
    fn process(&mut self, ctx: &ProcessContext, input: &[f32], output: &mut [f32]);

    /// Apply a live parameter change. Returns `false` when the node has no
    /// such parameter or it cannot change while running.
    fn set_param(&mut self, _id: &str, _value: f32) -> bool {
        false
    }

    /// Release any resources held by the node
    fn dispose(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}

/// Stable handle to a node in an [`AudioGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(NodeIndex);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0.index()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0.index())
    }
}

/// Directed connection between two nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Link {
    pub from: NodeId,
    pub to: NodeId,
}

impl Link {
    pub fn new(from: NodeId, to: NodeId) -> Self {
        Self { from, to }
    }
}

struct NodeSlot {
    node: Box<dyn AudioNode>,
    input: Vec<f32>,
    output: Vec<f32>,
}

/// Directed acyclic processing graph
pub struct AudioGraph {
    graph: StableDiGraph<NodeSlot, ()>,
    order: Vec<NodeIndex>,
}

impl AudioGraph {
    pub fn new() -> Self {
        Self {
            graph: StableDiGraph::with_capacity(32, 32),
            order: Vec::new(),
        }
    }

    /// Insert an unconnected node
    pub fn add_node(&mut self, node: Box<dyn AudioNode>) -> NodeId {
        let name = node.name().to_string();
        let idx = self.graph.add_node(NodeSlot {
            node,
            input: Vec::new(),
            output: Vec::new(),
        });
        // An isolated node is valid at any position of a topological order
        self.order.push(idx);

        let id = NodeId(idx);
        debug!("Added {} as {}", name, id);
        id
    }

    /// Remove a node with all its edges, then dispose it.
    ///
    /// The node is gone from the graph even when its disposal fails.
    pub fn remove_node(&mut self, id: NodeId) -> Result<()> {
        let mut slot = self
            .graph
            .remove_node(id.0)
            .ok_or_else(|| AudioError::InvalidConfiguration(format!("unknown {}", id)))?;
        self.order.retain(|idx| *idx != id.0);

        debug!("Removed {} ({})", id, slot.node.name());
        slot.node.dispose()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.graph.contains_node(id.0)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.graph.node_indices().map(NodeId).collect()
    }

    /// Mutable access to a node, e.g. for parameter changes
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut dyn AudioNode> {
        self.graph
            .node_weight_mut(id.0)
            .map(|slot| slot.node.as_mut() as &mut dyn AudioNode)
    }

    /// Connect `from` to `to`. Duplicate connections are ignored.
    pub fn connect(&mut self, from: NodeId, to: NodeId) -> Result<()> {
        self.ensure_node(from)?;
        self.ensure_node(to)?;

        if self.graph.find_edge(from.0, to.0).is_some() {
            return Ok(());
        }

        if from == to || has_path_connecting(&self.graph, to.0, from.0, None) {
            return Err(AudioError::InvalidConfiguration(format!(
                "connecting {} -> {} would create a cycle",
                from, to
            )));
        }

        self.graph.add_edge(from.0, to.0, ());
        self.refresh_order()?;
        trace!("Connected {} -> {}", from, to);
        Ok(())
    }

    /// Drop every outgoing connection of `from`; returns how many were removed
    pub fn disconnect_all(&mut self, from: NodeId) -> usize {
        let edges: Vec<_> = self
            .graph
            .edge_indices()
            .filter(|e| {
                self.graph
                    .edge_endpoints(*e)
                    .map(|(source, _)| source == from.0)
                    .unwrap_or(false)
            })
            .collect();

        for edge in &edges {
            self.graph.remove_edge(*edge);
        }

        if !edges.is_empty() {
            trace!("Disconnected {} outgoing links of {}", edges.len(), from);
        }
        edges.len()
    }

    /// Swap the `old` links for the `new` ones in a single step.
    ///
    /// The resulting topology is validated (all endpoints present, no
    /// cycles) before anything is mutated, so on error the graph is
    /// untouched.
    pub fn replace_links(&mut self, old: &[Link], new: &[Link]) -> Result<()> {
        for link in new {
            self.ensure_node(link.from)?;
            self.ensure_node(link.to)?;
        }

        let mut proposed: DiGraphMap<NodeIndex, ()> = DiGraphMap::new();
        for idx in self.graph.node_indices() {
            proposed.add_node(idx);
        }
        for edge in self.graph.edge_indices() {
            if let Some((source, target)) = self.graph.edge_endpoints(edge) {
                proposed.add_edge(source, target, ());
            }
        }
        for link in old {
            proposed.remove_edge(link.from.0, link.to.0);
        }
        for link in new {
            proposed.add_edge(link.from.0, link.to.0, ());
        }

        if is_cyclic_directed(&proposed) {
            return Err(AudioError::InvalidConfiguration(
                "replacement links would create a cycle".to_string(),
            ));
        }

        for link in old {
            if let Some(edge) = self.graph.find_edge(link.from.0, link.to.0) {
                self.graph.remove_edge(edge);
            }
        }
        for link in new {
            if self.graph.find_edge(link.from.0, link.to.0).is_none() {
                self.graph.add_edge(link.from.0, link.to.0, ());
            }
        }

        self.refresh_order()?;
        debug!("Replaced {} links with {}", old.len(), new.len());
        Ok(())
    }

    /// Nodes fed by `id`
    pub fn downstream(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Outgoing)
    }

    /// Nodes feeding `id`
    pub fn upstream(&self, id: NodeId) -> Vec<NodeId> {
        self.neighbors(id, Direction::Incoming)
    }

    fn neighbors(&self, id: NodeId, direction: Direction) -> Vec<NodeId> {
        if !self.contains(id) {
            return Vec::new();
        }
        let mut ids: Vec<NodeId> = self
            .graph
            .neighbors_directed(id.0, direction)
            .map(NodeId)
            .collect();
        ids.sort();
        ids
    }

    /// Render one block of `frames` frames through every node.
    ///
    /// Nodes without downstream connections (taps) are processed too.
    pub fn render(&mut self, ctx: &ProcessContext, frames: usize) {
        let len = frames * CHANNELS;

        for i in 0..self.order.len() {
            let idx = self.order[i];

            let mut input = match self.graph.node_weight_mut(idx) {
                Some(slot) => std::mem::take(&mut slot.input),
                None => continue,
            };
            input.clear();
            input.resize(len, 0.0);

            for upstream in self.graph.neighbors_directed(idx, Direction::Incoming) {
                let source = &self.graph[upstream].output;
                for (acc, sample) in input.iter_mut().zip(source.iter()) {
                    *acc += *sample;
                }
            }

            if let Some(slot) = self.graph.node_weight_mut(idx) {
                slot.output.clear();
                slot.output.resize(len, 0.0);
                slot.node.process(ctx, &input, &mut slot.output);
                slot.input = input;
            }
        }
    }

    /// Output of `id` from the most recent render
    pub fn output(&self, id: NodeId) -> Option<&[f32]> {
        self.graph
            .node_weight(id.0)
            .map(|slot| slot.output.as_slice())
    }

    fn ensure_node(&self, id: NodeId) -> Result<()> {
        if self.contains(id) {
            Ok(())
        } else {
            Err(AudioError::InvalidConfiguration(format!("unknown {}", id)))
        }
    }

    fn refresh_order(&mut self) -> Result<()> {
        self.order = toposort(&self.graph, None).map_err(|cycle| {
            AudioError::InvalidConfiguration(format!(
                "graph contains a cycle at node#{}",
                cycle.node_id().index()
            ))
        })?;
        Ok(())
    }
}

impl Default for AudioGraph {
    fn default() -> Self {
        Self::new()
    }
}
