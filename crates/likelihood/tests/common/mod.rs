#![allow(dead_code)]

use std::f64::consts::LN_2;

use bdmmflow::Config;
use bdmmflow_core::{IntervalRates, NodeId, PhyloTree, SkylineParameterization, Tree, TreeBuilder};

/// Process length used by the tree fixtures.
pub const ORIGIN: f64 = 2.5;

/// Tightens the integration tolerances of `config`.
pub fn tight(config: Config) -> Config {
    config.with_tolerances(1e-100, 1e-10).unwrap()
}

/// A four-taxon tree with two cherries.
///
/// Heights: leaves at 0.0, 0.3, 0.1 and 0.7; cherries at 1.1 and 0.9; root
/// at 1.6.
pub fn four_taxon_tree(types: [Option<usize>; 4]) -> Tree {
    let mut builder = TreeBuilder::new();
    let a = builder.leaf(0.0, types[0]).unwrap();
    let b = builder.leaf(0.3, types[1]).unwrap();
    let c = builder.leaf(0.1, types[2]).unwrap();
    let d = builder.leaf(0.7, types[3]).unwrap();
    let ab = builder.internal(1.1, a, b).unwrap();
    let cd = builder.internal(0.9, c, d).unwrap();
    let root = builder.internal(1.6, ab, cd).unwrap();
    builder.build(root).unwrap()
}

/// A tree with one sampled ancestor at height 0.8.
///
/// The ancestor sits above a cherry of leaves at 0.0 and 0.4 joined at 0.6,
/// and the root at 1.4 joins it with a leaf at 0.2.
pub fn sampled_ancestor_tree(types: [Option<usize>; 4]) -> Tree {
    let mut builder = TreeBuilder::new();
    let x = builder.leaf(0.0, types[0]).unwrap();
    let y = builder.leaf(0.4, types[1]).unwrap();
    let ancestor = builder.leaf(0.8, types[2]).unwrap();
    let w = builder.leaf(0.2, types[3]).unwrap();
    let cherry = builder.internal(0.6, x, y).unwrap();
    let sampled = builder.internal(0.8, ancestor, cherry).unwrap();
    let root = builder.internal(1.4, sampled, w).unwrap();
    builder.build(root).unwrap()
}

/// A single-type process with known closed-form likelihood.
#[derive(Debug, Clone, Copy)]
pub struct SingleType {
    pub birth: f64,
    pub death: f64,
    pub sampling: f64,
    pub removal: f64,
    pub rho: f64,
}

impl SingleType {
    pub fn new(birth: f64, death: f64, sampling: f64) -> Self {
        Self {
            birth,
            death,
            sampling,
            removal: 0.0,
            rho: 0.0,
        }
    }

    pub fn parameterization(&self, origin: f64) -> SkylineParameterization {
        let rates = IntervalRates::zeros(1)
            .with_birth(vec![self.birth])
            .with_death(vec![self.death])
            .with_sampling(vec![self.sampling])
            .with_removal(vec![self.removal])
            .with_rho(vec![self.rho]);
        SkylineParameterization::constant(origin, rates).unwrap()
    }

    fn c1(&self) -> f64 {
        let (b, d, s) = (self.birth, self.death, self.sampling);
        ((b - d - s).powi(2) + 4.0 * b * s).sqrt()
    }

    fn c2(&self) -> f64 {
        let (b, d, s) = (self.birth, self.death, self.sampling);
        -(b - d - 2.0 * b * self.rho - s) / self.c1()
    }

    /// Extinction probability `tau` before the present.
    pub fn p(&self, tau: f64) -> f64 {
        let (c1, c2) = (self.c1(), self.c2());
        let decay = (-c1 * tau).exp();
        (self.birth + self.death + self.sampling
            + c1 * (decay * (1.0 - c2) - (1.0 + c2)) / (decay * (1.0 - c2) + (1.0 + c2)))
            / (2.0 * self.birth)
    }

    /// Edge weight function: an edge from `tau_young` to `tau_old` scales the
    /// likelihood by `q(tau_young) / q(tau_old)`.
    pub fn q(&self, tau: f64) -> f64 {
        let (c1, c2) = (self.c1(), self.c2());
        2.0 * (1.0 - c2 * c2)
            + (-c1 * tau).exp() * (1.0 - c2).powi(2)
            + (c1 * tau).exp() * (1.0 + c2).powi(2)
    }

    /// Unconditioned log-likelihood of `tree` for a process of length `origin`.
    pub fn log_likelihood(&self, tree: &Tree, origin: f64, offset: f64) -> f64 {
        let root = tree.root();
        let tau_root = tree.height(root) + offset;
        let likelihood = self.subtree(tree, root, offset) * self.q(tau_root) / self.q(origin);

        let leaves = tree.leaf_count();
        let bifurcations = leaves - tree.direct_ancestor_count() - 1;
        let ln_factorial: f64 = (2..=leaves).map(|k| (k as f64).ln()).sum();
        likelihood.ln() + LN_2 * bifurcations as f64 - ln_factorial
    }

    fn subtree(&self, tree: &Tree, node: NodeId, offset: f64) -> f64 {
        let tau = tree.height(node) + offset;
        let edge = |child: NodeId| {
            self.subtree(tree, child, offset) * self.q(tree.height(child) + offset) / self.q(tau)
        };

        match *tree.children(node) {
            [] if self.is_rho_sampled(tau) => self.rho,
            [] => self.sampling * (self.removal + (1.0 - self.removal) * self.p(tau)),
            [a, b] if tree.is_direct_ancestor(a) || tree.is_direct_ancestor(b) => {
                let child = if tree.is_direct_ancestor(a) { b } else { a };
                let mass = if self.is_rho_sampled(tau) {
                    self.rho
                } else {
                    self.sampling
                };
                mass * (1.0 - self.removal) * edge(child)
            }
            [a, b] => self.birth * edge(a) * edge(b),
            _ => unreachable!("fixture trees are binary"),
        }
    }

    fn is_rho_sampled(&self, tau: f64) -> bool {
        self.rho > 0.0 && tau.abs() < 1e-12
    }
}
