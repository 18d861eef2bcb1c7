//! Signal chain manager
//!
//! Owns the live input, the ordered effect nodes and the fixed master stage,
//! and keeps them wired as a single linear path:
//!
//! ```text
//! input ─┬─> analyser (tap)
//!        └─> effect[0] -> … -> effect[n-1] -> master volume -> master pan -> destination
//! ```
//!
//! Every structural change funnels through one rebuild, which swaps the
//! whole link set with [`AudioGraph::replace_links`] so no partial topology
//! is ever rendered. Reordering only moves links; effect nodes and their
//! state survive it.

use crate::domain::audio::{AudioError, DeviceId, Result};
use crate::domain::context::{AudioContext, ContextHandle, ContextState};
use crate::domain::effects::{EffectDescriptor, EffectId, EffectType, ParamValue};
use crate::domain::graph::{AudioGraph, Link, NodeId};
use crate::domain::nodes::{AnalyserNode, AnalysisTap, EffectNode, GainNode, PanNode, SourceNode};
use crate::domain::preset::{EffectSnapshot, ParamSnapshot};
use crate::domain::source::{InputProvider, InputRequest};
use std::collections::HashSet;
use tracing::{debug, info, trace, warn};

/// A stage of the rendered chain, as seen by walking the live graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStage {
    Input,
    Effect(EffectId),
    MasterVolume,
    MasterPan,
    Destination,
    /// A node not owned by this chain
    Other(NodeId),
}

struct InputSlot {
    node: NodeId,
    device: Option<DeviceId>,
}

struct EffectSlot {
    descriptor: EffectDescriptor,
    node: NodeId,
}

pub struct SignalChainManager {
    context: ContextHandle,
    input: Option<InputSlot>,
    analyser: NodeId,
    master_volume: NodeId,
    master_pan: NodeId,
    destination: NodeId,
    tap: AnalysisTap,
    effects: Vec<EffectSlot>,
    links: Vec<Link>,
    counter: u64,
    volume: f32,
    pan: f32,
    disposed: bool,
}

impl SignalChainManager {
    /// Create the master stage inside a running context.
    ///
    /// The chain starts without input and without effects.
    pub fn new(context: ContextHandle, analysis_size: usize) -> Result<Self> {
        let shared = context.clone();
        let mut ctx = shared.lock();
        if !ctx.is_running() {
            return Err(AudioError::AudioEngineUnavailable(format!(
                "audio context is {:?}",
                ctx.state()
            )));
        }

        let analyser = AnalyserNode::new(analysis_size);
        let tap = analyser.tap();
        let destination = ctx.destination();
        let graph = ctx.graph_mut();
        let analyser = graph.add_node(Box::new(analyser));
        let master_volume = graph.add_node(Box::new(GainNode::new(1.0)));
        let master_pan = graph.add_node(Box::new(PanNode::new(0.0)));

        let mut manager = Self {
            context,
            input: None,
            analyser,
            master_volume,
            master_pan,
            destination,
            tap,
            effects: Vec::new(),
            links: Vec::new(),
            counter: 0,
            volume: 1.0,
            pan: 0.0,
            disposed: false,
        };
        // The guard must be gone before a failed manager is dropped and disposes
        let wired = manager.rebuild(&mut ctx);
        drop(ctx);
        wired?;

        info!("Signal chain ready (analysis size {})", analysis_size);
        Ok(manager)
    }

    // ========================================================================
    // INPUT
    // ========================================================================

    /// Replace the live input with a stream from `device` (system default
    /// when `None`).
    ///
    /// The new stream is opened before the old one is released, so a failed
    /// open leaves the chain exactly as it was.
    pub async fn set_input_source(
        &mut self,
        provider: &dyn InputProvider,
        device: Option<DeviceId>,
    ) -> Result<()> {
        self.ensure_live()?;

        let source = match provider.open(InputRequest::new(device.clone())).await {
            Ok(source) => source,
            Err(e) => {
                warn!("Failed to open input {:?}: {}", device, e);
                return Err(AudioError::DeviceUnavailable(e.to_string()));
            }
        };

        let context = self.context.clone();
        let mut ctx = context.lock();
        let node = ctx.graph_mut().add_node(Box::new(SourceNode::new(source)));
        let previous = self.input.replace(InputSlot {
            node,
            device: device.clone(),
        });

        if let Err(e) = self.rebuild(&mut ctx) {
            self.input = previous;
            release(ctx.graph_mut(), node, "rejected input");
            return Err(e);
        }

        if let Some(old) = previous {
            release(ctx.graph_mut(), old.node, "previous input");
        }

        info!("Input source set to {:?}", device);
        Ok(())
    }

    /// Device of the live input, `None` for the system default or no input
    pub fn input_device(&self) -> Option<&DeviceId> {
        self.input.as_ref().and_then(|slot| slot.device.as_ref())
    }

    pub fn has_input(&self) -> bool {
        self.input.is_some()
    }

    // ========================================================================
    // EFFECTS
    // ========================================================================

    /// Append a new effect of `effect_type`, constructed with `initial`
    /// parameter values over the catalogue defaults.
    pub fn add_effect(&mut self, effect_type: &str, initial: &[ParamSnapshot]) -> Result<EffectId> {
        self.ensure_live()?;
        let kind: EffectType = effect_type.parse().map_err(|e| {
            warn!("Rejected effect type {:?}", effect_type);
            e
        })?;

        self.counter += 1;
        let id = EffectId::new(kind, self.counter);
        let mut descriptor = EffectDescriptor::new(id.clone(), kind);
        for snapshot in initial {
            let accepted = descriptor
                .parameter_mut(&snapshot.id)
                .and_then(|param| param.assign(&snapshot.value));
            if accepted.is_none() {
                trace!("Ignoring {}={} for {}", snapshot.id, snapshot.value, id);
            }
        }

        let context = self.context.clone();
        let mut ctx = context.lock();
        let effect = kind.build(ctx.sample_rate(), &descriptor.parameters);
        let node = ctx.graph_mut().add_node(Box::new(EffectNode::new(effect)));
        self.effects.push(EffectSlot { descriptor, node });

        if let Err(e) = self.rebuild(&mut ctx) {
            self.effects.pop();
            release(ctx.graph_mut(), node, "rejected effect");
            return Err(e);
        }

        info!("Added {} at position {}", id, self.effects.len() - 1);
        Ok(id)
    }

    /// Detach and dispose the effect `id`. Absent ids are ignored.
    pub fn remove_effect(&mut self, id: &EffectId) -> Result<()> {
        let Some(position) = self.position(id) else {
            debug!("remove_effect: {} not in chain", id);
            return Ok(());
        };

        let context = self.context.clone();
        let mut ctx = context.lock();
        let slot = self.effects.remove(position);
        if let Err(e) = self.rebuild(&mut ctx) {
            self.effects.insert(position, slot);
            return Err(e);
        }

        release(ctx.graph_mut(), slot.node, id.as_str());
        info!("Removed {}", id);
        Ok(())
    }

    /// Rewire the effects in `new_order`, which must be a permutation of
    /// the current ids.
    pub fn reorder_effects(&mut self, new_order: &[EffectId]) -> Result<()> {
        self.ensure_live()?;

        let current: HashSet<&EffectId> = self.effects.iter().map(|s| &s.descriptor.id).collect();
        let requested: HashSet<&EffectId> = new_order.iter().collect();
        if new_order.len() != self.effects.len()
            || requested.len() != new_order.len()
            || requested != current
        {
            let reason = format!(
                "expected a permutation of [{}], got [{}]",
                join(self.effects.iter().map(|s| &s.descriptor.id)),
                join(new_order.iter())
            );
            warn!("Rejected reorder: {}", reason);
            return Err(AudioError::InvalidReorder(reason));
        }

        let previous = std::mem::take(&mut self.effects);
        let mut pool: Vec<Option<EffectSlot>> = previous.into_iter().map(Some).collect();
        for id in new_order {
            let taken = pool
                .iter_mut()
                .find(|slot| matches!(slot, Some(s) if &s.descriptor.id == id))
                .and_then(Option::take);
            if let Some(slot) = taken {
                self.effects.push(slot);
            }
        }

        let context = self.context.clone();
        let mut ctx = context.lock();
        self.rebuild(&mut ctx)?;
        debug!("Reordered chain to [{}]", join(new_order.iter()));
        Ok(())
    }

    /// Set one parameter of one effect.
    ///
    /// Sliders are clamped and snapped. Unknown effect or parameter ids and
    /// values of the wrong kind are ignored and yield `None`; otherwise the
    /// stored value is returned. Parameters the processor can only take at
    /// construction are stored and picked up the next time the node is built.
    pub fn set_parameter(
        &mut self,
        effect_id: &EffectId,
        param_id: &str,
        value: ParamValue,
    ) -> Option<ParamValue> {
        let slot = self
            .effects
            .iter_mut()
            .find(|slot| &slot.descriptor.id == effect_id)?;
        let accepted = slot.descriptor.parameter_mut(param_id)?.assign(&value)?;

        if let Some(numeric) = accepted.as_f32() {
            let mut ctx = self.context.lock();
            let live = ctx
                .graph_mut()
                .node_mut(slot.node)
                .map(|node| node.set_param(param_id, numeric))
                .unwrap_or(false);
            if !live {
                trace!("{}.{} stored, applies at construction", effect_id, param_id);
            }
        }

        trace!("{}.{} = {}", effect_id, param_id, accepted);
        Some(accepted)
    }

    /// Open the panel of `id` and close every other one, or close it if it
    /// was already open. Returns whether the panel is now open.
    pub fn toggle_panel(&mut self, id: &EffectId) -> bool {
        let Some(position) = self.position(id) else {
            return false;
        };
        let open = !self.effects[position].descriptor.is_panel_open;
        for (i, slot) in self.effects.iter_mut().enumerate() {
            slot.descriptor.is_panel_open = open && i == position;
        }
        open
    }

    pub fn descriptor(&self, id: &EffectId) -> Option<&EffectDescriptor> {
        self.effects
            .iter()
            .map(|slot| &slot.descriptor)
            .find(|d| &d.id == id)
    }

    /// Descriptors in chain order
    pub fn descriptors(&self) -> impl Iterator<Item = &EffectDescriptor> {
        self.effects.iter().map(|slot| &slot.descriptor)
    }

    /// Effect ids in chain order
    pub fn order(&self) -> Vec<EffectId> {
        self.descriptors().map(|d| d.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    // ========================================================================
    // MASTER STAGE
    // ========================================================================

    /// Set the master linear gain (negative values are treated as 0)
    pub fn set_master_volume(&mut self, gain: f32) {
        let gain = if gain.is_finite() { gain.max(0.0) } else { 0.0 };
        self.volume = gain;
        if let Some(node) = self.context.lock().graph_mut().node_mut(self.master_volume) {
            node.set_param("gain", gain);
        }
        trace!("Master volume {}", gain);
    }

    /// Set the master pan, clamped to [-1, 1]
    pub fn set_master_pan(&mut self, pan: f32) {
        let pan = if pan.is_finite() { pan.clamp(-1.0, 1.0) } else { 0.0 };
        self.pan = pan;
        if let Some(node) = self.context.lock().graph_mut().node_mut(self.master_pan) {
            node.set_param("pan", pan);
        }
        trace!("Master pan {}", pan);
    }

    pub fn master_volume(&self) -> f32 {
        self.volume
    }

    pub fn master_pan(&self) -> f32 {
        self.pan
    }

    /// Read-only view of the signal right after the input, before any effect
    pub fn analysis_tap(&self) -> AnalysisTap {
        self.tap.clone()
    }

    // ========================================================================
    // IMPORT / EXPORT
    // ========================================================================

    /// Ordered effect types with their parameter values
    pub fn export_chain(&self) -> Vec<EffectSnapshot> {
        self.descriptors().map(EffectSnapshot::from).collect()
    }

    /// Tear down the current effects and rebuild them from `snapshots`.
    ///
    /// Every type is validated first; an unknown one leaves the chain
    /// untouched. Parameters are applied at construction, so values that a
    /// processor only reads when built (reverb decay) take effect too.
    pub fn import_chain(&mut self, snapshots: &[EffectSnapshot]) -> Result<Vec<EffectId>> {
        self.ensure_live()?;
        for snapshot in snapshots {
            snapshot.effect_type.parse::<EffectType>()?;
        }

        self.clear_effects()?;
        let mut ids = Vec::with_capacity(snapshots.len());
        for snapshot in snapshots {
            ids.push(self.add_effect(&snapshot.effect_type, &snapshot.params)?);
        }

        info!("Imported chain of {} effects", ids.len());
        Ok(ids)
    }

    /// Remove every effect with a single rebuild
    pub fn clear_effects(&mut self) -> Result<()> {
        if self.effects.is_empty() {
            return Ok(());
        }

        let context = self.context.clone();
        let mut ctx = context.lock();
        let removed = std::mem::take(&mut self.effects);
        if let Err(e) = self.rebuild(&mut ctx) {
            self.effects = removed;
            return Err(e);
        }

        for slot in removed {
            release(ctx.graph_mut(), slot.node, slot.descriptor.id.as_str());
        }
        debug!("Cleared chain");
        Ok(())
    }

    // ========================================================================
    // INTROSPECTION
    // ========================================================================

    /// Walk the rendered path from its head to the destination, skipping the
    /// analysis tap.
    pub fn topology(&self) -> Vec<ChainStage> {
        let ctx = self.context.lock();
        let graph = ctx.graph();

        let head = self
            .input
            .as_ref()
            .map(|slot| slot.node)
            .or_else(|| self.effects.first().map(|slot| slot.node))
            .unwrap_or(self.master_volume);

        let mut stages = Vec::new();
        let mut current = Some(head);
        while let Some(node) = current {
            if !graph.contains(node) || stages.len() > graph.node_count() {
                break;
            }
            stages.push(self.stage_of(node));
            let next: Vec<NodeId> = graph
                .downstream(node)
                .into_iter()
                .filter(|n| *n != self.analyser)
                .collect();
            current = match next.as_slice() {
                [only] => Some(*only),
                _ => None,
            };
        }
        stages
    }

    /// Stages feeding the analysis tap
    pub fn tap_sources(&self) -> Vec<ChainStage> {
        let ctx = self.context.lock();
        ctx.graph()
            .upstream(self.analyser)
            .into_iter()
            .map(|node| self.stage_of(node))
            .collect()
    }

    fn stage_of(&self, node: NodeId) -> ChainStage {
        if self.input.as_ref().map(|slot| slot.node) == Some(node) {
            return ChainStage::Input;
        }
        if let Some(slot) = self.effects.iter().find(|slot| slot.node == node) {
            return ChainStage::Effect(slot.descriptor.id.clone());
        }
        match node {
            n if n == self.master_volume => ChainStage::MasterVolume,
            n if n == self.master_pan => ChainStage::MasterPan,
            n if n == self.destination => ChainStage::Destination,
            other => ChainStage::Other(other),
        }
    }

    // ========================================================================
    // TEARDOWN
    // ========================================================================

    /// Release the input, every effect and the master stage. Idempotent.
    ///
    /// A node failing to dispose is logged and does not stop the others.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        self.disposed = true;

        let context = self.context.clone();
        let mut ctx = context.lock();
        if ctx.state() != ContextState::Closed {
            let graph = ctx.graph_mut();
            if let Err(e) = graph.replace_links(&self.links, &[]) {
                warn!("Failed to unlink chain: {}", e);
            }
            if let Some(input) = self.input.take() {
                release(graph, input.node, "input");
            }
            for slot in self.effects.drain(..) {
                release(graph, slot.node, slot.descriptor.id.as_str());
            }
            for (node, label) in [
                (self.analyser, "analyser"),
                (self.master_volume, "master volume"),
                (self.master_pan, "master pan"),
            ] {
                release(graph, node, label);
            }
        }

        self.input = None;
        self.effects.clear();
        self.links.clear();
        info!("Signal chain disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            return Err(AudioError::AudioEngineUnavailable(
                "signal chain has been disposed".to_string(),
            ));
        }
        Ok(())
    }

    fn position(&self, id: &EffectId) -> Option<usize> {
        self.effects.iter().position(|slot| &slot.descriptor.id == id)
    }

    /// Links for the current input and effect order
    fn desired_links(&self) -> Vec<Link> {
        let mut path: Vec<NodeId> = Vec::with_capacity(self.effects.len() + 4);
        let mut links = Vec::with_capacity(self.effects.len() + 5);

        if let Some(input) = &self.input {
            links.push(Link::new(input.node, self.analyser));
            path.push(input.node);
        }
        path.extend(self.effects.iter().map(|slot| slot.node));
        path.extend([self.master_volume, self.master_pan, self.destination]);

        links.extend(path.windows(2).map(|pair| Link::new(pair[0], pair[1])));
        links
    }

    fn rebuild(&mut self, ctx: &mut AudioContext) -> Result<()> {
        if ctx.state() == ContextState::Closed {
            return Err(AudioError::AudioEngineUnavailable(
                "audio context is closed".to_string(),
            ));
        }

        let desired = self.desired_links();
        ctx.graph_mut().replace_links(&self.links, &desired)?;
        self.links = desired;
        debug!(
            effects = self.effects.len(),
            input = self.input.is_some(),
            "Rebuilt signal chain"
        );
        Ok(())
    }
}

impl Drop for SignalChainManager {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Remove `node` from the graph, logging instead of failing
fn release(graph: &mut AudioGraph, node: NodeId, label: &str) {
    if let Err(e) = graph.remove_node(node) {
        warn!("Failed to dispose {} ({}): {}", label, node, e);
    }
}

fn join<'a>(ids: impl Iterator<Item = &'a EffectId>) -> String {
    ids.map(EffectId::as_str).collect::<Vec<_>>().join(", ")
}
