use crate::compressibility::FlowContext;
use crate::config::WakeConfig;
use crate::convection::{AnalysisType, WakeMotion};
use crate::error::{Result, WakeError};
use crate::physics;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::ops::Range;

// MARK: Data Structures
/// One straight sub-vortex at some resolution level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VortexEdge {
    pub start: Vector3<f64>,
    pub end: Vector3<f64>,
    pub centroid: Vector3<f64>,
    pub gamma: f64,
}

impl VortexEdge {
    fn new(start: Vector3<f64>, end: Vector3<f64>) -> Self {
        VortexEdge {
            start,
            end,
            centroid: 0.5 * (start + end),
            gamma: 0.0,
        }
    }

    fn set_endpoints(&mut self, start: Vector3<f64>, end: Vector3<f64>) {
        self.start = start;
        self.end = end;
        self.centroid = 0.5 * (start + end);
    }

    pub fn length(&self) -> f64 {
        (self.end - self.start).norm()
    }

    pub fn direction(&self) -> Vector3<f64> {
        self.end - self.start
    }
}

/// Persisted velocity at a node plus scratch space for multi-stage updates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct VelocitySample {
    pub velocity: Vector3<f64>,
    pub scratch: Vector3<f64>,
}

/// A trailing vortex from a trailing-edge node to the far field.
///
/// Levels are 1-based: level 1 is the finest discretization and the one used
/// for induced-velocity queries and I/O. Each coarser level merges pairs of
/// edges from the level below until a single edge remains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filament {
    pub wing: usize,
    pub node: usize,
    /// Set by external multipole routines.
    pub evaluate: bool,

    pub(crate) length: f64,
    pub(crate) far_dist: f64,
    pub(crate) s: Vec<f64>,
    pub(crate) nodes: Vec<Vector3<f64>>,

    pub(crate) levels: Vec<Vec<VortexEdge>>,
    /// `children[k][j]`: range of edges in `levels[k - 1]` merged into
    /// `levels[k][j]`. Empty for the finest level.
    pub(crate) children: Vec<Vec<Range<usize>>>,

    pub(crate) velocities: Vec<VelocitySample>,
    pub(crate) free_stream_velocity: Vector3<f64>,
    pub(crate) local_velocity_at_trailing_edge: Vector3<f64>,

    pub(crate) te_vec: Vector3<f64>,
    pub(crate) core_size: f64,
    pub(crate) sigma: f64,
    pub(crate) tolerance: f64,
    pub(crate) agglomeration_ratio: f64,
    pub(crate) ground_effect: bool,

    pub(crate) gamma: Vec<f64>,
    pub(crate) gamma_new: Vec<f64>,
    pub(crate) gamma_save: Vec<f64>,

    pub(crate) time_accurate: bool,
    pub(crate) time_analysis_type: AnalysisType,
    pub(crate) time_step: f64,
    pub(crate) vinf: f64,
    pub(crate) max_convected_distance: f64,
    pub(crate) number_of_exact_shift_points: usize,
    pub(crate) motion: WakeMotion,
    pub(crate) smoothing_weight: f64,
    pub(crate) velocity_limit_ratio: f64,
}

// MARK: Setup
impl Filament {
    /// Builds a filament of `subdivisions` edges starting at `node1`, running
    /// towards `node2` and extended to `far_dist`.
    pub fn setup(
        subdivisions: usize,
        far_dist: f64,
        node1: &Vector3<f64>,
        node2: &Vector3<f64>,
        config: &WakeConfig,
    ) -> Result<Self> {
        if subdivisions < 1 {
            return Err(WakeError::InvalidSubdivision(subdivisions));
        }
        config.validate()?;

        let chord = node2 - node1;
        let span = chord.norm();
        if span <= config.tolerance {
            return Err(WakeError::ZeroLengthFilament);
        }
        let direction = chord / span;
        let length = far_dist.max(span);

        let ratio = capped_ratio(subdivisions, config.stretching_ratio, config.min_first_edge_fraction);
        if ratio < config.stretching_ratio {
            log::info!(
                "Stretching ratio reduced from {} to {:.6} to keep the first of {} edges above {:.1e} of the length",
                config.stretching_ratio,
                ratio,
                subdivisions,
                config.min_first_edge_fraction
            );
        }
        let s = stretched_spacing(subdivisions, ratio);
        let nodes: Vec<Vector3<f64>> = s.iter().map(|si| node1 + direction * (si * length)).collect();

        let children = build_merge_groups(subdivisions);
        let mut levels: Vec<Vec<VortexEdge>> = children
            .iter()
            .enumerate()
            .map(|(k, groups)| {
                let count = if k == 0 { subdivisions } else { groups.len() };
                vec![VortexEdge::new(Vector3::zeros(), Vector3::zeros()); count]
            })
            .collect();
        rebuild_levels(&nodes, &children, &mut levels);

        let first_edge = levels[0][0].length();
        let longest_edge = levels[0].iter().map(VortexEdge::length).fold(0.0, f64::max);
        if !(first_edge > config.tolerance) {
            return Err(WakeError::EdgeBelowTolerance {
                edge_length: first_edge,
                tolerance: config.tolerance,
            });
        }

        let core_size = config
            .core_size
            .unwrap_or(config.core_size_fraction * first_edge);
        if !(core_size > 0.0) {
            return Err(WakeError::InvalidCoreSize(core_size));
        }

        let sigma = config.sigma.unwrap_or(2.0 * length);
        if !(sigma > longest_edge) {
            return Err(WakeError::CutoffTooSmall {
                cutoff: sigma,
                edge_length: longest_edge,
            });
        }

        log::debug!(
            "Filament setup: {} sub-vortices, {} levels, length {:.4}, core {:.4e}",
            subdivisions,
            levels.len(),
            length,
            core_size
        );

        Ok(Filament {
            wing: 0,
            node: 0,
            evaluate: true,
            length,
            far_dist,
            s,
            nodes,
            levels,
            children,
            velocities: vec![VelocitySample::default(); subdivisions + 1],
            free_stream_velocity: config.free_stream_velocity(),
            local_velocity_at_trailing_edge: Vector3::zeros(),
            te_vec: direction,
            core_size,
            sigma,
            tolerance: config.tolerance,
            agglomeration_ratio: config.agglomeration_ratio,
            ground_effect: config.ground_effect,
            gamma: vec![0.0; subdivisions + 1],
            gamma_new: vec![0.0; subdivisions + 1],
            gamma_save: vec![0.0; subdivisions + 1],
            time_accurate: config.time_accurate,
            time_analysis_type: config.analysis_type,
            time_step: config.time_step,
            vinf: config.reference_speed(),
            max_convected_distance: config.max_convected_distance,
            number_of_exact_shift_points: config.number_of_exact_shift_points,
            motion: config.motion.clone(),
            smoothing_weight: config.smoothing_weight,
            velocity_limit_ratio: config.velocity_limit_ratio,
        })
    }

    /// Recomputes edge endpoints and centroids on every level from the node
    /// list. Circulation is left alone.
    pub(crate) fn rebuild_edges(&mut self) {
        rebuild_levels(&self.nodes, &self.children, &mut self.levels);
    }

    // MARK: Circulation
    /// Pushes `gamma[1..=N]` onto the finest edges and agglomerates upward:
    /// a coarse edge carries the length-weighted mean of its children.
    pub fn update_gamma(&mut self) {
        assert_eq!(
            self.gamma.len(),
            self.levels[0].len() + 1,
            "circulation array does not match the finest level"
        );

        for (edge, gamma) in self.levels[0].iter_mut().zip(&self.gamma[1..]) {
            edge.gamma = *gamma;
        }

        for k in 1..self.levels.len() {
            let (finer, coarser) = self.levels.split_at_mut(k);
            let finer = &finer[k - 1];
            for (edge, range) in coarser[0].iter_mut().zip(&self.children[k]) {
                let kids = &finer[range.clone()];
                let total_length: f64 = kids.iter().map(VortexEdge::length).sum();
                edge.gamma = if total_length > 0.0 {
                    kids.iter().map(|c| c.gamma * c.length()).sum::<f64>() / total_length
                } else {
                    kids.iter().map(|c| c.gamma).sum::<f64>() / kids.len() as f64
                };
            }
        }
    }

    /// Slot 0 is the aggregate trailing-vortex strength; slots `1..=N` are the
    /// finest sub-vortices.
    pub fn gamma(&self, i: usize) -> f64 {
        self.gamma[i]
    }

    pub fn set_gamma(&mut self, i: usize, value: f64) {
        self.gamma[i] = value;
    }

    pub fn gammas(&self) -> &[f64] {
        &self.gamma
    }

    pub fn gamma_new(&self) -> &[f64] {
        &self.gamma_new
    }

    pub fn gamma_save(&self) -> &[f64] {
        &self.gamma_save
    }

    /// Assigns `value` to the aggregate and every sub-vortex, then
    /// agglomerates.
    pub fn set_uniform_gamma(&mut self, value: f64) {
        self.gamma.iter_mut().for_each(|g| *g = value);
        self.update_gamma();
    }

    pub fn save_vortex_state(&mut self) {
        self.gamma_save.copy_from_slice(&self.gamma);
    }

    pub fn restore_vortex_state(&mut self) {
        self.gamma.copy_from_slice(&self.gamma_save);
        self.update_gamma();
    }

    // MARK: Induced Velocity
    /// Velocity induced at `point` by the finest level.
    pub fn induced_velocity(&self, point: &Vector3<f64>, ctx: &FlowContext) -> Vector3<f64> {
        self.induced_velocity_with_core(point, self.core_size, ctx)
    }

    /// Same as [`Filament::induced_velocity`] with an explicit core radius.
    pub fn induced_velocity_with_core(
        &self,
        point: &Vector3<f64>,
        core_size: f64,
        ctx: &FlowContext,
    ) -> Vector3<f64> {
        let q = self.sum_edges(&self.levels[0], point, core_size);
        ctx.correct(q, &self.free_stream_velocity)
    }

    /// Velocity induced by the edges of a single (1-based) level.
    pub fn induced_velocity_at_level(
        &self,
        level: usize,
        point: &Vector3<f64>,
        ctx: &FlowContext,
    ) -> Vector3<f64> {
        let edges = self.edges(level);
        let q = self.sum_edges(edges, point, self.core_size);
        ctx.correct(q, &self.free_stream_velocity)
    }

    /// Tree walk from the coarsest level. Edges farther than `sigma` are
    /// dropped; edges far enough relative to their length are evaluated as a
    /// single segment, otherwise their children are visited. A filament with
    /// `evaluate` cleared contributes nothing.
    pub fn induced_velocity_agglomerated(
        &self,
        point: &Vector3<f64>,
        ctx: &FlowContext,
    ) -> Vector3<f64> {
        if !self.evaluate {
            return Vector3::zeros();
        }
        let top = self.levels.len() - 1;
        let mut q = Vector3::zeros();
        for j in 0..self.levels[top].len() {
            self.agglomerate(top, j, point, &mut q);
        }
        ctx.correct(q, &self.free_stream_velocity)
    }

    fn agglomerate(&self, k: usize, j: usize, point: &Vector3<f64>, q: &mut Vector3<f64>) {
        let edge = &self.levels[k][j];
        if physics::distance_to_segment(&edge.start, &edge.end, point) > self.sigma {
            return;
        }

        let distance = (point - edge.centroid).norm();
        if k == 0 || distance >= self.agglomeration_ratio * edge.length() {
            *q += self.edge_velocity(edge, point, self.core_size);
            return;
        }

        for child in self.children[k][j].clone() {
            self.agglomerate(k - 1, child, point, q);
        }
    }

    fn sum_edges(&self, edges: &[VortexEdge], point: &Vector3<f64>, core_size: f64) -> Vector3<f64> {
        edges
            .iter()
            .fold(Vector3::zeros(), |acc, edge| acc + self.edge_velocity(edge, point, core_size))
    }

    fn edge_velocity(&self, edge: &VortexEdge, point: &Vector3<f64>, core_size: f64) -> Vector3<f64> {
        let mut q = physics::biot_savart_segment(
            &edge.start,
            &edge.end,
            point,
            edge.gamma,
            core_size,
            self.tolerance,
        );

        if self.ground_effect {
            q += physics::biot_savart_segment(
                &physics::mirror_z(&edge.start),
                &physics::mirror_z(&edge.end),
                point,
                -edge.gamma,
                core_size,
                self.tolerance,
            );
        }

        q
    }

    // MARK: Accessors
    pub fn number_of_levels(&self) -> usize {
        self.levels.len()
    }

    /// Edge count of a 1-based level.
    pub fn number_of_sub_vortices(&self, level: usize) -> usize {
        self.edges(level).len()
    }

    pub fn number_of_sub_vortices_finest(&self) -> usize {
        self.levels[0].len()
    }

    pub fn edges(&self, level: usize) -> &[VortexEdge] {
        assert!(
            level >= 1 && level <= self.levels.len(),
            "level {} out of range 1..={}",
            level,
            self.levels.len()
        );
        &self.levels[level - 1]
    }

    /// Finest-level edge `i` (0-based).
    pub fn vortex_edge(&self, i: usize) -> &VortexEdge {
        &self.levels[0][i]
    }

    pub fn xyz_c(&self, i: usize) -> Vector3<f64> {
        self.levels[0][i].centroid
    }

    pub fn s(&self, i: usize) -> f64 {
        self.s[i]
    }

    pub fn nodes(&self) -> &[Vector3<f64>] {
        &self.nodes
    }

    pub fn number_of_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn te_node(&self) -> Vector3<f64> {
        self.nodes[0]
    }

    pub fn te_vec(&self) -> Vector3<f64> {
        self.te_vec
    }

    pub fn set_te_vec(&mut self, te_vec: Vector3<f64>) {
        if let Some(unit) = te_vec.try_normalize(self.tolerance) {
            self.te_vec = unit;
        }
    }

    /// Straight-line extent the filament was built with.
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Current polyline length of the finest level.
    pub fn wake_length(&self) -> f64 {
        self.levels[0].iter().map(VortexEdge::length).sum()
    }

    pub fn far_dist(&self) -> f64 {
        self.far_dist
    }

    pub fn core_size(&self) -> f64 {
        self.core_size
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn velocity(&self, i: usize) -> Vector3<f64> {
        self.velocities[i].velocity
    }

    pub fn set_velocity(&mut self, i: usize, velocity: Vector3<f64>) {
        self.velocities[i].velocity = velocity;
    }

    pub fn scratch_velocity(&self, i: usize) -> Vector3<f64> {
        self.velocities[i].scratch
    }

    pub fn free_stream_velocity(&self) -> Vector3<f64> {
        self.free_stream_velocity
    }

    pub fn set_free_stream_velocity(&mut self, velocity: Vector3<f64>) {
        self.free_stream_velocity = velocity;
    }

    pub fn local_velocity_at_trailing_edge(&self) -> Vector3<f64> {
        self.local_velocity_at_trailing_edge
    }

    pub fn set_local_velocity_at_trailing_edge(&mut self, velocity: Vector3<f64>) {
        self.local_velocity_at_trailing_edge = velocity;
    }

    pub fn ground_effect(&self) -> bool {
        self.ground_effect
    }

    pub fn set_ground_effect(&mut self, enabled: bool) {
        self.ground_effect = enabled;
    }
}

// MARK: Discretization helpers
/// Arc-length parameters `s_0 = 0 < ... < s_n = 1` with edge lengths growing
/// by `ratio` downstream.
fn stretched_spacing(n: usize, ratio: f64) -> Vec<f64> {
    if (ratio - 1.0).abs() < 1e-12 {
        return (0..=n).map(|i| i as f64 / n as f64).collect();
    }
    let denominator = ratio.powi(n as i32) - 1.0;
    let mut s: Vec<f64> = (0..=n)
        .map(|i| (ratio.powi(i as i32) - 1.0) / denominator)
        .collect();
    s[n] = 1.0;
    s
}

/// Largest ratio up to `ratio` whose first edge is at least `min_first` of
/// the length. Falls back to uniform spacing when even that is too short.
fn capped_ratio(n: usize, ratio: f64, min_first: f64) -> f64 {
    let first = |r: f64| {
        if (r - 1.0).abs() < 1e-12 {
            1.0 / n as f64
        } else {
            (r - 1.0) / (r.powi(n as i32) - 1.0)
        }
    };

    if ratio <= 1.0 || first(ratio) >= min_first {
        return ratio;
    }
    if first(1.0) <= min_first {
        return 1.0;
    }

    // first() decreases with r
    let (mut lo, mut hi) = (1.0, ratio);
    for _ in 0..100 {
        let mid = 0.5 * (lo + hi);
        if first(mid) >= min_first {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    lo
}

/// Pairwise merge table, one entry per level. Level 1 has no children.
fn build_merge_groups(n: usize) -> Vec<Vec<Range<usize>>> {
    let mut groups = vec![Vec::new()];
    let mut count = n;
    while count > 1 {
        let next: Vec<Range<usize>> = (0..count).step_by(2).map(|i| i..(i + 2).min(count)).collect();
        count = next.len();
        groups.push(next);
    }
    groups
}

fn rebuild_levels(
    nodes: &[Vector3<f64>],
    children: &[Vec<Range<usize>>],
    levels: &mut [Vec<VortexEdge>],
) {
    assert_eq!(nodes.len(), levels[0].len() + 1, "node list does not match the finest level");

    for (i, edge) in levels[0].iter_mut().enumerate() {
        edge.set_endpoints(nodes[i], nodes[i + 1]);
    }

    for k in 1..levels.len() {
        let (finer, coarser) = levels.split_at_mut(k);
        let finer = &finer[k - 1];
        for (edge, range) in coarser[0].iter_mut().zip(&children[k]) {
            let start = finer[range.start].start;
            let end = finer[range.end - 1].end;
            edge.set_endpoints(start, end);
        }
    }
}
