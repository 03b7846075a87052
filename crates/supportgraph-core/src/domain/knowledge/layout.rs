//! Force-directed layout for graph visualization
//!
//! [`step`] is a pure function from one layout state to the next. The
//! [`LayoutRunner`] drives it on a tokio task for animated consumers, and
//! [`render_svg`] draws a finished state. None of them touch the store.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::entity::EntityType;
use super::graph::GraphState;
use super::relation::RelationType;
use crate::config::LayoutConfig;
use crate::error::{Error, Result};

/// Distances are floored here so coincident nodes never divide by zero
const MIN_DISTANCE: f32 = 1.0;
/// Amplitude of the seeded jitter added to the initial circle
const INITIAL_JITTER: f32 = 1.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    #[serde(skip)]
    pub vx: f32,
    #[serde(skip)]
    pub vy: f32,
    pub radius: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutEdge {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub relation_type: RelationType,
    pub weight: f32,
    #[serde(skip)]
    source: usize,
    #[serde(skip)]
    target: usize,
}

/// Positions and velocities of one simulation frame
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutState {
    pub width: f32,
    pub height: f32,
    pub tick: usize,
    pub nodes: Vec<LayoutNode>,
    pub edges: Vec<LayoutEdge>,
}

impl LayoutState {
    /// Initial frame for the entities of a snapshot
    ///
    /// Restricted to `types` when non-empty; edges are kept only when both
    /// ends are. Nodes start on a circle centred on the canvas.
    pub fn from_graph(state: &GraphState, types: &[EntityType], config: &LayoutConfig) -> Self {
        let entities: Vec<_> = state
            .entities()
            .into_iter()
            .filter(|e| types.is_empty() || types.contains(&e.entity_type))
            .collect();

        let count = entities.len();
        let radius = config.max_initial_radius.min(count as f32 * 10.0);
        let (cx, cy) = (config.width / 2.0, config.height / 2.0);
        let mut rng = ChaCha20Rng::seed_from_u64(config.seed);

        let mut index = HashMap::with_capacity(count);
        let nodes: Vec<LayoutNode> = entities
            .iter()
            .copied()
            .enumerate()
            .map(|(i, e)| {
                index.insert(e.id.as_str(), i);
                let angle = i as f32 / count as f32 * std::f32::consts::TAU;
                let jitter_x = rng.gen_range(-INITIAL_JITTER..=INITIAL_JITTER);
                let jitter_y = rng.gen_range(-INITIAL_JITTER..=INITIAL_JITTER);
                LayoutNode {
                    id: e.id.clone(),
                    label: e.name.clone(),
                    entity_type: e.entity_type,
                    confidence: e.confidence,
                    x: (cx + radius * angle.cos() + jitter_x).clamp(0.0, config.width),
                    y: (cy + radius * angle.sin() + jitter_y).clamp(0.0, config.height),
                    vx: 0.0,
                    vy: 0.0,
                    radius: config.node_base_radius + e.confidence * config.node_radius_scale,
                }
            })
            .collect();

        let edges = state
            .relations()
            .into_iter()
            .filter_map(|r| {
                let source = *index.get(r.source_id.as_str())?;
                let target = *index.get(r.target_id.as_str())?;
                Some(LayoutEdge {
                    source_id: r.source_id.clone(),
                    target_id: r.target_id.clone(),
                    relation_type: r.relation_type,
                    weight: r.weight,
                    source,
                    target,
                })
            })
            .collect();

        Self {
            width: config.width,
            height: config.height,
            tick: 0,
            nodes,
            edges,
        }
    }

    /// Both ends of `edge`, or `None` when either node is gone
    fn endpoints(&self, edge: &LayoutEdge) -> Option<(&LayoutNode, &LayoutNode)> {
        Some((self.nodes.get(edge.source)?, self.nodes.get(edge.target)?))
    }

    /// Whether every coordinate is finite and on the canvas
    pub fn is_within_bounds(&self) -> bool {
        self.nodes.iter().all(|n| {
            n.x.is_finite()
                && n.y.is_finite()
                && (0.0..=self.width).contains(&n.x)
                && (0.0..=self.height).contains(&n.y)
        })
    }
}

/// Advance the simulation by one tick
pub fn step(state: &LayoutState, config: &LayoutConfig) -> LayoutState {
    let n = state.nodes.len();
    let mut forces = vec![(0.0f32, 0.0f32); n];

    for i in 0..n {
        for j in (i + 1)..n {
            let (a, b) = (&state.nodes[i], &state.nodes[j]);
            let (mut dx, mut dy) = (a.x - b.x, a.y - b.y);
            let raw = (dx * dx + dy * dy).sqrt();
            if raw < f32::EPSILON {
                // Coincident nodes: separate along a fixed per-pair direction.
                let angle = (i + j) as f32;
                dx = angle.cos();
                dy = angle.sin();
            }
            let distance = raw.max(MIN_DISTANCE);
            if distance >= config.repulsion_distance {
                continue;
            }
            let norm = (dx * dx + dy * dy).sqrt().max(f32::EPSILON);
            let force =
                config.repulsion_strength * (config.repulsion_distance - distance) / distance;
            let (fx, fy) = (dx / norm * force, dy / norm * force);
            forces[i].0 += fx;
            forces[i].1 += fy;
            forces[j].0 -= fx;
            forces[j].1 -= fy;
        }
    }

    for edge in &state.edges {
        if edge.source == edge.target {
            continue;
        }
        let Some((s, t)) = state.endpoints(edge) else {
            continue;
        };
        let (dx, dy) = (t.x - s.x, t.y - s.y);
        let distance = (dx * dx + dy * dy).sqrt().max(MIN_DISTANCE);
        let force = (distance - config.rest_length) * edge.weight * config.attraction_strength;
        let (fx, fy) = (dx / distance * force, dy / distance * force);
        forces[edge.source].0 += fx;
        forces[edge.source].1 += fy;
        forces[edge.target].0 -= fx;
        forces[edge.target].1 -= fy;
    }

    let nodes = state
        .nodes
        .iter()
        .zip(forces)
        .map(|(node, (fx, fy))| {
            let mut next = node.clone();
            next.vx = (node.vx + fx) * config.damping;
            next.vy = (node.vy + fy) * config.damping;
            if !next.vx.is_finite() || !next.vy.is_finite() {
                next.vx = 0.0;
                next.vy = 0.0;
            }
            next.x = node.x + next.vx;
            next.y = node.y + next.vy;

            if next.x <= 0.0 || next.x >= state.width {
                next.x = next.x.clamp(0.0, state.width);
                next.vx = 0.0;
            }
            if next.y <= 0.0 || next.y >= state.height {
                next.y = next.y.clamp(0.0, state.height);
                next.vy = 0.0;
            }
            next
        })
        .collect();

    LayoutState {
        width: state.width,
        height: state.height,
        tick: state.tick + 1,
        nodes,
        edges: state.edges.clone(),
    }
}

/// Run `ticks` steps synchronously
pub fn simulate(initial: &LayoutState, config: &LayoutConfig, ticks: usize) -> LayoutState {
    let mut state = initial.clone();
    for _ in 0..ticks {
        state = step(&state, config);
    }
    state
}

/// Control messages for a running layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutCommand {
    Pause,
    Resume,
    /// Return to the initial frame and keep running
    Reset,
}

/// Layout simulation running on its own task
///
/// Frames are published through a `watch` channel; the task stops after
/// the configured number of ticks or when cancelled.
pub struct LayoutRunner {
    commands: mpsc::UnboundedSender<LayoutCommand>,
    frames: watch::Receiver<Arc<LayoutState>>,
    cancel: CancellationToken,
    handle: JoinHandle<LayoutState>,
}

impl LayoutRunner {
    pub fn spawn(initial: LayoutState, config: LayoutConfig) -> Self {
        let (commands, mut command_rx) = mpsc::unbounded_channel();
        let (frame_tx, frames) = watch::channel(Arc::new(initial.clone()));
        let cancel = CancellationToken::new();
        let token = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_millis(config.tick_interval_ms.max(1)));
            let mut state = initial.clone();
            let mut paused = false;

            info!(nodes = state.nodes.len(), ticks = config.ticks, "Layout started");
            while state.tick < config.ticks {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => {
                        debug!(tick = state.tick, "Layout cancelled");
                        break;
                    }
                    Some(command) = command_rx.recv() => match command {
                        LayoutCommand::Pause => paused = true,
                        LayoutCommand::Resume => paused = false,
                        LayoutCommand::Reset => {
                            state = initial.clone();
                            frame_tx.send_replace(Arc::new(state.clone()));
                        }
                    },
                    _ = interval.tick(), if !paused => {
                        state = step(&state, &config);
                        frame_tx.send_replace(Arc::new(state.clone()));
                    }
                }
            }
            info!(tick = state.tick, "Layout stopped");
            state
        });

        Self {
            commands,
            frames,
            cancel,
            handle,
        }
    }

    /// Receiver for every published frame
    pub fn subscribe(&self) -> watch::Receiver<Arc<LayoutState>> {
        self.frames.clone()
    }

    /// Most recently published frame
    pub fn current(&self) -> Arc<LayoutState> {
        self.frames.borrow().clone()
    }

    pub fn pause(&self) -> Result<()> {
        self.send(LayoutCommand::Pause)
    }

    pub fn resume(&self) -> Result<()> {
        self.send(LayoutCommand::Resume)
    }

    pub fn reset(&self) -> Result<()> {
        self.send(LayoutCommand::Reset)
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    fn send(&self, command: LayoutCommand) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| Error::Other("layout task is no longer running".into()))
    }

    /// Wait for the task to stop and return its last frame
    pub async fn finish(self) -> Result<LayoutState> {
        self.handle
            .await
            .map_err(|e| Error::Other(format!("layout task failed: {}", e)))
    }
}

fn type_color(entity_type: EntityType) -> &'static str {
    match entity_type {
        EntityType::Equipment => "#4e79a7",
        EntityType::Error => "#e15759",
        EntityType::Symptom => "#ff9d9a",
        EntityType::Solution => "#59a14f",
        EntityType::Procedure => "#8cd17d",
        EntityType::Brand => "#f28e2b",
        EntityType::Model => "#ffbe7d",
        EntityType::Os | EntityType::Software => "#76b7b2",
        EntityType::Component => "#b07aa1",
        EntityType::Diagnosis => "#edc948",
        EntityType::Location | EntityType::User => "#bab0ac",
    }
}

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Draw a frame as a standalone SVG document
pub fn render_svg(state: &LayoutState) -> String {
    let mut svg = String::new();
    let _ = writeln!(
        svg,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = state.width,
        h = state.height
    );

    for edge in &state.edges {
        let Some((s, t)) = state.endpoints(edge) else {
            continue;
        };
        let _ = writeln!(
            svg,
            r##"  <line x1="{:.1}" y1="{:.1}" x2="{:.1}" y2="{:.1}" stroke="#999" stroke-opacity="{:.2}" stroke-width="{:.1}"/>"##,
            s.x,
            s.y,
            t.x,
            t.y,
            0.3 + 0.7 * edge.weight,
            1.0 + 2.0 * edge.weight
        );
    }

    for node in &state.nodes {
        let _ = writeln!(
            svg,
            r#"  <circle cx="{:.1}" cy="{:.1}" r="{:.1}" fill="{}"><title>{} ({}, {:.2})</title></circle>"#,
            node.x,
            node.y,
            node.radius,
            type_color(node.entity_type),
            escape_xml(&node.label),
            node.entity_type,
            node.confidence
        );
    }

    svg.push_str("</svg>\n");
    svg
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::knowledge::entity::Entity;
    use crate::domain::knowledge::relation::Relation;

    fn graph(count: usize) -> GraphState {
        let mut state = GraphState::new();
        for i in 0..count {
            let entity_type = if i % 3 == 0 {
                EntityType::Equipment
            } else {
                EntityType::Error
            };
            state
                .insert_entity(
                    Entity::new(format!("e{:02}", i), format!("Node {}", i), entity_type)
                        .with_confidence(0.1 + (i % 10) as f32 * 0.1),
                )
                .unwrap();
        }
        for i in 1..count {
            state
                .insert_relation(
                    Relation::new(
                        format!("r{:02}", i),
                        format!("e{:02}", i / 2),
                        format!("e{:02}", i),
                        RelationType::RelatedTo,
                    )
                    .with_weight(0.8),
                )
                .unwrap();
        }
        state
    }

    #[test]
    fn test_initial_circle_is_centered() {
        let config = LayoutConfig::default();
        let layout = LayoutState::from_graph(&graph(4), &[], &config);

        // radius = min(300, 4 × 10)
        let first = &layout.nodes[0];
        assert!((first.x - 640.0).abs() <= 1.0);
        assert!((first.y - 400.0).abs() <= 1.0);
        let third = &layout.nodes[2];
        assert!((third.x - 560.0).abs() <= 1.0);
    }

    #[test]
    fn test_radius_encodes_confidence() {
        let config = LayoutConfig::default();
        let layout = LayoutState::from_graph(&graph(3), &[], &config);
        assert!((layout.nodes[0].radius - 7.0).abs() < 1e-5);
        assert!((layout.nodes[2].radius - 9.0).abs() < 1e-5);
    }

    #[test]
    fn test_type_filter_drops_dangling_edges() {
        let config = LayoutConfig::default();
        let layout = LayoutState::from_graph(&graph(9), &[EntityType::Equipment], &config);

        assert_eq!(layout.nodes.len(), 3);
        assert!(layout.nodes.iter().all(|n| n.entity_type == EntityType::Equipment));
        // only e03 -> e06 joins two equipment nodes
        assert_eq!(layout.edges.len(), 1);
        assert_eq!(layout.edges[0].target_id, "e06");
    }

    #[test]
    fn test_step_is_pure_and_deterministic() {
        let config = LayoutConfig::default();
        let initial = LayoutState::from_graph(&graph(12), &[], &config);
        let copy = initial.clone();

        let a = step(&initial, &config);
        let b = step(&initial, &config);
        assert_eq!(a, b);
        assert_eq!(initial, copy);
        assert_eq!(a.tick, 1);
    }

    #[test]
    fn test_close_nodes_repel() {
        let config = LayoutConfig::default();
        let mut layout = LayoutState::from_graph(&graph(2), &[], &config);
        layout.edges.clear();
        layout.nodes[0].x = 600.0;
        layout.nodes[0].y = 400.0;
        layout.nodes[1].x = 610.0;
        layout.nodes[1].y = 400.0;

        let next = step(&layout, &config);
        assert!(next.nodes[1].x - next.nodes[0].x > 10.0);
    }

    #[test]
    fn test_coincident_nodes_stay_finite() {
        let config = LayoutConfig::default();
        let mut layout = LayoutState::from_graph(&graph(3), &[], &config);
        for node in &mut layout.nodes {
            node.x = 100.0;
            node.y = 100.0;
        }
        let next = simulate(&layout, &config, 20);
        assert!(next.is_within_bounds());
    }

    #[test]
    fn test_long_run_stays_on_canvas() {
        let config = LayoutConfig::default();
        let initial = LayoutState::from_graph(&graph(40), &[], &config);
        let done = simulate(&initial, &config, 500);

        assert_eq!(done.tick, 500);
        assert!(done.is_within_bounds());
    }

    #[test]
    fn test_render_svg_escapes_labels() {
        let mut state = GraphState::new();
        state
            .insert_entity(Entity::new("a", "Carte <réseau> & co", EntityType::Component))
            .unwrap();
        let layout = LayoutState::from_graph(&state, &[], &LayoutConfig::default());
        let svg = render_svg(&layout);

        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("Carte &lt;réseau&gt; &amp; co"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn test_edges_without_nodes_are_skipped() {
        let mut state = GraphState::new();
        state
            .insert_entity(Entity::new("a", "Routeur", EntityType::Equipment))
            .unwrap();
        state
            .insert_entity(Entity::new("b", "Perte de connexion", EntityType::Error))
            .unwrap();
        state
            .insert_relation(Relation::new("r", "a", "b", RelationType::HasSymptom))
            .unwrap();
        let mut layout = LayoutState::from_graph(&state, &[], &LayoutConfig::default());
        assert_eq!(layout.edges.len(), 1);
        assert!(render_svg(&layout).contains("<line"));

        layout.nodes.pop();
        let svg = render_svg(&layout);
        assert!(!svg.contains("<line"));
        assert_eq!(svg.matches("<circle").count(), 1);

        let next = step(&layout, &LayoutConfig::default());
        assert_eq!(next.nodes.len(), 1);
        assert!(next.is_within_bounds());
    }

    fn fast_config(ticks: usize) -> LayoutConfig {
        LayoutConfig {
            ticks,
            tick_interval_ms: 10,
            ..LayoutConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_completes_configured_ticks() {
        let config = fast_config(5);
        let initial = LayoutState::from_graph(&graph(6), &[], &config);
        let runner = LayoutRunner::spawn(initial, config);

        let done = runner.finish().await.unwrap();
        assert_eq!(done.tick, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_runner_pause_and_cancel() {
        let config = fast_config(1000);
        let initial = LayoutState::from_graph(&graph(6), &[], &config);
        let runner = LayoutRunner::spawn(initial, config);

        tokio::time::sleep(Duration::from_millis(55)).await;
        runner.pause().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let paused_at = runner.current().tick;
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(runner.current().tick, paused_at);

        runner.reset().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(runner.current().tick, 0);

        runner.cancel();
        let last = runner.finish().await.unwrap();
        assert!(last.tick < 1000);
    }
}
