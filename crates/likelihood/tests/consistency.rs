mod common;

use approx::assert_relative_eq;
use bdmmflow::{
    Config, Error, FlowKind, FlowLikelihood, InitialBasis, Reset, SubIntervals, compute_log_likelihood,
    reference,
};
use bdmmflow_core::{IntervalRates, SkylineParameterization, TreeError};
use nalgebra::DMatrix;

use common::{ORIGIN, four_taxon_tree, sampled_ancestor_tree, tight};

/// The four flow variants: direct or inverse, with or without restarts.
fn flow_configs(base: &Config) -> Vec<Config> {
    let mut configs = Vec::new();
    for kind in [FlowKind::Direct, FlowKind::Inverse] {
        for reset in [Reset::Always, Reset::Never] {
            configs.push(base.clone().with_flow(kind).with_reset(reset));
        }
    }
    configs
}

/// Two types, migration and cross-birth, and a rho-sampling event at 1.5.
fn rich_param() -> SkylineParameterization {
    let young = IntervalRates::zeros(2)
        .with_birth(vec![1.6, 1.1])
        .with_death(vec![0.4, 0.7])
        .with_sampling(vec![0.5, 0.3])
        .with_removal(vec![0.2, 0.6])
        .with_cross_birth(DMatrix::from_row_slice(2, 2, &[0.0, 0.25, 0.15, 0.0]))
        .with_migration(DMatrix::from_row_slice(2, 2, &[0.0, 0.3, 0.2, 0.0]))
        .with_rho(vec![0.3, 0.5]);
    let old = young
        .clone()
        .with_birth(vec![2.4, 0.9])
        .with_sampling(vec![0.1, 0.2])
        .with_rho(vec![0.35, 0.2]);
    SkylineParameterization::new(ORIGIN, &[1.5], vec![old, young]).unwrap()
}

#[test]
fn flow_matches_reference_on_two_type_scenario() {
    let rates = IntervalRates::zeros(2)
        .with_birth(vec![2.0, 2.0])
        .with_death(vec![0.5, 0.5])
        .with_sampling(vec![0.5, 0.5]);
    let param = SkylineParameterization::constant(ORIGIN, rates).unwrap();
    let tree = four_taxon_tree([Some(0); 4]);
    let base = tight(Config::uniform(2).unwrap());

    let expected = reference::log_likelihood(&tree, &param, &base).unwrap();
    assert!(expected.is_finite());

    for config in flow_configs(&base) {
        let value = compute_log_likelihood(&tree, &param, &config).unwrap();
        assert_relative_eq!(value, expected, epsilon = 1e-6);
    }
}

#[test]
fn flow_matches_reference_with_migration_and_rho_boundary() {
    let param = rich_param();
    let base = tight(Config::new(vec![0.3, 0.7]).unwrap());

    for tree in [
        four_taxon_tree([Some(0), Some(1), Some(1), Some(0)]),
        sampled_ancestor_tree([Some(1), Some(0), Some(0), Some(1)]),
    ] {
        let expected = reference::log_likelihood(&tree, &param, &base).unwrap();
        assert!(expected.is_finite());

        for config in flow_configs(&base) {
            let value = compute_log_likelihood(&tree, &param, &config).unwrap();
            assert_relative_eq!(value, expected, epsilon = 1e-6);
        }
    }
}

#[test]
fn node_on_rho_boundary_is_rho_sampled() {
    let param = rich_param();
    let base = tight(Config::new(vec![0.5, 0.5]).unwrap());

    // Heights 1.0 put these leaves on the rho-sampling time 1.5.
    let mut builder = bdmmflow_core::TreeBuilder::new();
    let a = builder.leaf(0.0, Some(0)).unwrap();
    let b = builder.leaf(1.0, Some(1)).unwrap();
    let c = builder.leaf(1.0, Some(0)).unwrap();
    let ab = builder.internal(1.3, a, b).unwrap();
    let root = builder.internal(1.9, ab, c).unwrap();
    let tree = builder.build(root).unwrap();

    let expected = reference::log_likelihood(&tree, &param, &base).unwrap();
    for config in flow_configs(&base) {
        let value = compute_log_likelihood(&tree, &param, &config).unwrap();
        assert_relative_eq!(value, expected, epsilon = 1e-6);
    }
}

#[test]
fn initial_basis_does_not_change_the_result() {
    let param = rich_param();
    let tree = four_taxon_tree([Some(0), Some(1), Some(1), Some(0)]);
    let base = tight(Config::uniform(2).unwrap());
    let expected = compute_log_likelihood(&tree, &param, &base).unwrap();

    for basis in [
        InitialBasis::Identity,
        InitialBasis::Gaussian,
        InitialBasis::Exponential,
    ] {
        for seed in [1, 3215, 99] {
            let config = base.clone().with_initial_basis(basis).with_seed(seed);
            let value = compute_log_likelihood(&tree, &param, &config).unwrap();
            assert_relative_eq!(value, expected, epsilon = 1e-6);
        }
    }
}

#[test]
fn sub_interval_count_does_not_change_the_result() {
    let param = rich_param();
    let tree = sampled_ancestor_tree([Some(0), Some(0), Some(1), Some(1)]);
    let base = tight(Config::uniform(2).unwrap());
    let expected = reference::log_likelihood(&tree, &param, &base).unwrap();

    for sub_intervals in [
        SubIntervals::MinCount(1),
        SubIntervals::MinCount(16),
        SubIntervals::MaxSize(0.3),
    ] {
        let config = base.clone().with_sub_intervals(sub_intervals).unwrap();
        let value = FlowLikelihood::new(config).log_likelihood(&tree, &param).unwrap();
        assert_relative_eq!(value, expected, epsilon = 1e-6);
    }
}

#[test]
fn identity_basis_with_default_tolerances() {
    let param = rich_param();
    let tree = four_taxon_tree([Some(0), Some(1), Some(1), Some(0)]);
    let base = Config::uniform(2).unwrap().with_initial_basis(InitialBasis::Identity);
    let expected = reference::log_likelihood(&tree, &param, &tight(base.clone())).unwrap();

    for config in flow_configs(&base) {
        let value = compute_log_likelihood(&tree, &param, &config).unwrap();
        assert_relative_eq!(value, expected, epsilon = 1e-5);
    }
}

#[test]
fn larger_trees_do_not_underflow() {
    let rates = IntervalRates::zeros(3)
        .with_birth(vec![3.0, 2.5, 2.0])
        .with_death(vec![1.0, 1.0, 1.0])
        .with_sampling(vec![0.5, 0.6, 0.7])
        .with_migration(DMatrix::from_element(3, 3, 0.2));
    let param = SkylineParameterization::constant(12.0, rates).unwrap();

    // A caterpillar with 200 leaves.
    let mut builder = bdmmflow_core::TreeBuilder::new();
    let mut subtree = builder.leaf(0.0, Some(0)).unwrap();
    for i in 1..200_u32 {
        let height = 0.05 * f64::from(i);
        let leaf = builder.leaf(height - 0.04, Some((i % 3) as usize)).unwrap();
        subtree = builder.internal(height, subtree, leaf).unwrap();
    }
    let tree = builder.build(subtree).unwrap();

    let value = compute_log_likelihood(&tree, &param, &Config::uniform(3).unwrap()).unwrap();

    assert!(value.is_finite());
}

#[test]
fn deep_caterpillar_fits_on_the_default_stack() {
    let rates = IntervalRates::zeros(2)
        .with_birth(vec![2.0, 1.5])
        .with_death(vec![0.5, 0.5])
        .with_sampling(vec![0.5, 0.5])
        .with_migration(DMatrix::from_element(2, 2, 0.2));
    let param = SkylineParameterization::constant(12.0, rates).unwrap();

    let mut builder = bdmmflow_core::TreeBuilder::new();
    let mut subtree = builder.leaf(0.0, Some(0)).unwrap();
    for i in 1..20_000_u32 {
        let height = 5e-4 * f64::from(i);
        let leaf = builder.leaf(height - 4e-4, Some((i % 2) as usize)).unwrap();
        subtree = builder.internal(height, subtree, leaf).unwrap();
    }
    let tree = builder.build(subtree).unwrap();
    let config = Config::uniform(2).unwrap();

    for kind in [FlowKind::Direct, FlowKind::Inverse] {
        let value = compute_log_likelihood(&tree, &param, &config.clone().with_flow(kind)).unwrap();
        assert!(value.is_finite());
    }
}

#[test]
fn unreachable_types_give_zero_likelihood() {
    let rates = IntervalRates::zeros(2)
        .with_birth(vec![1.0, 1.0])
        .with_death(vec![0.5, 0.5])
        .with_sampling(vec![0.5, 0.5]);
    let param = SkylineParameterization::constant(ORIGIN, rates).unwrap();
    let tree = four_taxon_tree([Some(0), Some(1), Some(0), Some(0)]);
    let base = Config::uniform(2).unwrap();

    assert_eq!(reference::log_likelihood(&tree, &param, &base), Ok(f64::NEG_INFINITY));
    for basis in [InitialBasis::Identity, InitialBasis::Uniform, InitialBasis::Gaussian] {
        for config in flow_configs(&base.clone().with_initial_basis(basis)) {
            assert_eq!(compute_log_likelihood(&tree, &param, &config), Ok(f64::NEG_INFINITY));
        }
    }
}

#[test]
fn invalid_inputs_are_reported() {
    let param = rich_param();
    let config = Config::uniform(2).unwrap();

    let untyped = four_taxon_tree([Some(0), None, Some(1), Some(0)]);
    assert!(matches!(
        compute_log_likelihood(&untyped, &param, &config),
        Err(Error::Tree(TreeError::MissingType(_)))
    ));

    let out_of_range = four_taxon_tree([Some(0), Some(2), Some(1), Some(0)]);
    assert!(matches!(
        reference::log_likelihood(&out_of_range, &param, &config),
        Err(Error::Tree(TreeError::TypeOutOfRange { .. }))
    ));
}
