//! Postorder evaluation of partial likelihoods over a tree.

use bdmmflow_core::{NodeId, Parameterization, PhyloTree, TreeError, sample_type};
use nalgebra::DVector;

use crate::extinction::ExtinctionProbabilities;
use crate::flow::Flow;
use crate::{Config, Error};

/// Carries a per-type likelihood vector from the young end of an edge to its
/// old end.
pub trait EdgePropagator {
    /// Propagates `g` from time `te` back to time `ts <= te`.
    ///
    /// # Errors
    ///
    /// Returns an error if propagation fails.
    fn propagate(&mut self, ts: f64, te: f64, g: &DVector<f64>) -> Result<DVector<f64>, Error>;
}

impl EdgePropagator for Flow {
    fn propagate(&mut self, ts: f64, te: f64, g: &DVector<f64>) -> Result<DVector<f64>, Error> {
        Flow::propagate(self, ts, te, g)
    }
}

/// A likelihood vector stored with a log-scale factor.
///
/// The unscaled likelihood is `values * exp(log_scale)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Scaled {
    pub values: DVector<f64>,
    pub log_scale: f64,
}

impl Scaled {
    /// Wraps `values`, dividing them by their largest entry.
    #[must_use]
    pub fn rescaled(mut values: DVector<f64>, log_scale: f64) -> Self {
        let factor = rescale(&mut values);
        Self {
            values,
            log_scale: log_scale + factor,
        }
    }

    /// Returns the unscaled likelihood vector.
    #[must_use]
    pub fn unscaled(&self) -> DVector<f64> {
        &self.values * self.log_scale.exp()
    }
}

/// Divides `values` by their largest entry and returns the log of the divisor.
///
/// A vector whose largest entry is not positive and finite is left alone.
pub(crate) fn rescale(values: &mut DVector<f64>) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max > 0.0 && max.is_finite() {
        *values /= max;
        max.ln()
    } else {
        0.0
    }
}

/// How a node combines the partial likelihoods below it.
enum Branching {
    Sample,
    SampledAncestor { ancestor: NodeId, child: NodeId },
    Birth(NodeId, NodeId),
}

/// Evaluates partial likelihoods node by node.
pub(crate) struct Traversal<'a, T: ?Sized, P: ?Sized> {
    tree: &'a T,
    parameterization: &'a P,
    extinction: &'a ExtinctionProbabilities,
    rho_times: Vec<f64>,
    final_sample_offset: f64,
    boundary_epsilon: f64,
}

impl<'a, T, P> Traversal<'a, T, P>
where
    T: PhyloTree + ?Sized,
    P: Parameterization + ?Sized,
{
    pub(crate) fn new(
        tree: &'a T,
        parameterization: &'a P,
        extinction: &'a ExtinctionProbabilities,
        config: &Config,
    ) -> Self {
        Self {
            tree,
            parameterization,
            extinction,
            rho_times: parameterization.rho_sampling_times(),
            final_sample_offset: config.final_sample_offset(),
            boundary_epsilon: config.boundary_epsilon(),
        }
    }

    /// Process time of a node.
    ///
    /// Times within the boundary epsilon of the origin or of a
    /// parameterization boundary are snapped onto it, so that a sample taken
    /// at a rho-sampling time never sees the jump at that time.
    pub(crate) fn node_time(&self, node: NodeId) -> f64 {
        let t = self.parameterization.total_process_length()
            - (self.tree.height(node) + self.final_sample_offset);
        if t <= self.boundary_epsilon {
            return 0.0;
        }

        self.parameterization
            .interval_end_times()
            .iter()
            .copied()
            .find(|end| (end - t).abs() <= self.boundary_epsilon)
            .unwrap_or(t)
    }

    /// Returns the root's partial likelihood carried back to the origin.
    ///
    /// Nodes are visited in an explicit postorder, so tree depth is bounded
    /// by memory rather than by the call stack.
    pub(crate) fn root_likelihood<E>(&self, propagator: &mut E) -> Result<Scaled, Error>
    where
        E: EdgePropagator + ?Sized,
    {
        // Partial likelihoods at the parent's time of every finished subtree
        // whose parent is still pending.
        let mut finished: Vec<Scaled> = Vec::new();

        for node in self.postorder() {
            let t = self.node_time(node);
            let at_node = match self.branching(node) {
                Branching::Sample => Scaled::rescaled(self.leaf_vector(node, t), 0.0),
                Branching::SampledAncestor { ancestor, .. } => {
                    let below = self.pop(&mut finished, node)?;
                    self.sampled_ancestor(t, ancestor, &below)
                }
                Branching::Birth(..) => {
                    let right = self.pop(&mut finished, node)?;
                    let left = self.pop(&mut finished, node)?;
                    self.birth(t, &left, &right)
                }
            };

            let start = self.tree.parent(node).map_or(0.0, |parent| self.node_time(parent));
            let values = propagator.propagate(start, t, &at_node.values)?;
            finished.push(Scaled {
                values,
                log_scale: at_node.log_scale,
            });
        }

        let root = self.tree.root();
        self.pop(&mut finished, root)
    }

    /// Nodes in postorder, root last.
    ///
    /// Sampled ancestors are folded into their parent and not visited.
    fn postorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.tree.node_count());
        let mut stack = vec![self.tree.root()];
        while let Some(node) = stack.pop() {
            order.push(node);
            match self.branching(node) {
                Branching::Sample => {}
                Branching::SampledAncestor { child, .. } => stack.push(child),
                Branching::Birth(first, second) => stack.extend([first, second]),
            }
        }
        order.reverse();
        order
    }

    fn branching(&self, node: NodeId) -> Branching {
        let &[first, second] = self.tree.children(node) else {
            return Branching::Sample;
        };
        if self.tree.is_direct_ancestor(first) {
            Branching::SampledAncestor {
                ancestor: first,
                child: second,
            }
        } else if self.tree.is_direct_ancestor(second) {
            Branching::SampledAncestor {
                ancestor: second,
                child: first,
            }
        } else {
            Branching::Birth(first, second)
        }
    }

    fn pop(&self, finished: &mut Vec<Scaled>, node: NodeId) -> Result<Scaled, Error> {
        finished.pop().ok_or_else(|| {
            TreeError::NotBinary {
                node: node.index(),
                children: self.tree.children(node).len(),
            }
            .into()
        })
    }

    /// Partial likelihood at a sampled ancestor, given the one below it.
    fn sampled_ancestor(&self, t: f64, ancestor: NodeId, below: &Scaled) -> Scaled {
        let type_index = sample_type(self.tree, ancestor);
        let (mass, k) = self.sampling_mass(t, type_index);
        let removal = self.parameterization.removal_probs(k)[type_index];

        let mut values = DVector::zeros(self.parameterization.type_count());
        values[type_index] = mass * (1.0 - removal) * below.values[type_index];
        Scaled::rescaled(values, below.log_scale)
    }

    /// Partial likelihood at a birth event joining two subtrees.
    fn birth(&self, t: f64, left: &Scaled, right: &Scaled) -> Scaled {
        let n = self.parameterization.type_count();
        let k = self.parameterization.interval_index(t);
        let birth = self.parameterization.birth_rates(k);
        let cross_birth = self.parameterization.cross_birth_rates(k);
        let (l, r) = (&left.values, &right.values);

        let values = DVector::from_fn(n, |i, _| {
            let mut value = birth[i] * l[i] * r[i];
            for j in (0..n).filter(|&j| j != i) {
                value += 0.5 * cross_birth[(i, j)] * (l[i] * r[j] + l[j] * r[i]);
            }
            value
        });

        Scaled::rescaled(values, left.log_scale + right.log_scale)
    }

    fn leaf_vector(&self, leaf: NodeId, t: f64) -> DVector<f64> {
        let type_index = sample_type(self.tree, leaf);
        let mut values = DVector::zeros(self.parameterization.type_count());

        values[type_index] = match self.rho_interval(t) {
            Some(k) => self.parameterization.rho_values(k)[type_index],
            None => {
                let k = self.parameterization.interval_index(t);
                let sampling = self.parameterization.sampling_rates(k)[type_index];
                let removal = self.parameterization.removal_probs(k)[type_index];
                let extinction = self.extinction.at(t)[type_index];
                sampling * (removal + (1.0 - removal) * extinction)
            }
        };
        values
    }

    /// Sampling mass of a sample at time `t` and the interval its rates
    /// come from.
    fn sampling_mass(&self, t: f64, type_index: usize) -> (f64, usize) {
        match self.rho_interval(t) {
            Some(k) => (self.parameterization.rho_values(k)[type_index], k),
            None => {
                let k = self.parameterization.interval_index(t);
                (self.parameterization.sampling_rates(k)[type_index], k)
            }
        }
    }

    /// Returns the interval whose rho sampling happens at `t`, if any.
    fn rho_interval(&self, t: f64) -> Option<usize> {
        self.rho_times
            .iter()
            .find(|&&rho_time| (rho_time - t).abs() <= self.boundary_epsilon)
            .map(|&rho_time| self.parameterization.interval_index(rho_time))
    }
}
