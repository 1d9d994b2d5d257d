//! End-to-end workflows over synthetic fields: variogram estimation, model
//! fitting, kriging and simulation, checked against properties that must
//! hold for any dataset.

use approx::assert_relative_eq;
use geo::{Point, Rect, coord};
use geostat_algorithms::index::{BruteForceIndex, KdTree, SpatialIndex};
use geostat_algorithms::kriging::{
    GridKrigingParams, KrigingEngine, KrigingOptions, SpaceTimeCovariance, SpatialCovariance,
    Target, Trend, krige, krige_grid,
};
use geostat_algorithms::simulation::{SequentialSimulator, SimulationParams};
use geostat_algorithms::variogram::{
    AnisotropySource, FitParams, RANGE_CAP, SpaceTimeModel, StVariogramParams, StructureKind,
    VariogramModel, VariogramParams, empirical_st_variogram, empirical_variogram,
    fit_best_variogram, fit_space_time, fit_variogram, initial_model,
};
use geostat_core::{
    Error, GeometryProvider, GridSpec, Observation, PlanarGeometry, SpaceTime, SpaceTimeGeometry,
};
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use rand_xoshiro::Xoshiro256PlusPlus;

/// Simple LCG so fixtures do not depend on an RNG crate.
struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn field(x: f64, y: f64) -> f64 {
    (x / 20.0).sin() + (y / 25.0).cos() + 0.01 * x
}

fn scattered(n: usize, seed: u64) -> Vec<Observation<Point<f64>>> {
    let mut rng = Lcg(seed);
    (0..n)
        .map(|_| {
            let x = rng.next_f64() * 100.0;
            let y = rng.next_f64() * 100.0;
            Observation::new(Point::new(x, y), field(x, y))
        })
        .collect()
}

fn targets(n: usize, seed: u64) -> Vec<Target<Point<f64>, geo::Polygon<f64>>> {
    let mut rng = Lcg(seed);
    (0..n)
        .map(|_| Target::point(Point::new(10.0 + rng.next_f64() * 80.0, 10.0 + rng.next_f64() * 80.0)))
        .collect()
}

/// Unconditional Gaussian field at `locations`, sampled through the
/// Cholesky factor of the model covariance.
fn gaussian_field(model: &VariogramModel, locations: &[Point<f64>], seed: u64) -> Vec<f64> {
    let g = PlanarGeometry::default();
    let n = locations.len();
    let mut c = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            let h = g.distance(&locations[i], &locations[j]);
            c[i][j] = model.sill() - model.gamma(h);
        }
        c[i][i] += 1e-10;
    }

    let mut l = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..=i {
            let s: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                l[i][i] = (c[i][i] - s).sqrt();
            } else {
                l[i][j] = (c[i][j] - s) / l[j][j];
            }
        }
    }

    let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);
    let eps: Vec<f64> = (0..n).map(|_| StandardNormal.sample(&mut rng)).collect();
    (0..n)
        .map(|i| (0..=i).map(|k| l[i][k] * eps[k]).sum())
        .collect()
}

// ---------------------------------------------------------------------------
// Input validation
// ---------------------------------------------------------------------------

#[test]
fn non_finite_location_is_rejected() {
    let g = PlanarGeometry::default();
    let obs = vec![
        Observation::new(Point::new(0.0, 0.0), 1.0),
        Observation::new(Point::new(f64::NAN, 0.0), 2.0),
        Observation::new(Point::new(10.0, 0.0), 3.0),
    ];
    let model = VariogramModel::simple(StructureKind::Exponential, 0.0, 1.0, 20.0).unwrap();

    let err = empirical_variogram(&g, &obs, &VariogramParams::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidObservation { index: 1, .. }), "{err:?}");

    let tg = vec![Target::point(Point::new(5.0, 0.0))];
    let err = krige(&g, &model, &obs, &tg, Trend::intercept(), KrigingOptions::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidObservation { index: 1, .. }), "{err:?}");

    let grid = GridSpec::from_extent(0.0, 0.0, 10.0, 10.0, 2, 2).unwrap();
    let err = krige_grid(&obs, &model, &grid, GridKrigingParams::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidObservation { index: 1, .. }), "{err:?}");

    let st_obs: Vec<_> = obs
        .iter()
        .map(|o| Observation::new(SpaceTime::new(o.location, 0.0), o.value))
        .collect();
    let err = empirical_st_variogram(&g, &st_obs, &StVariogramParams::default()).unwrap_err();
    assert!(matches!(err, Error::InvalidObservation { index: 1, .. }), "{err:?}");
}

// ---------------------------------------------------------------------------
// Variogram
// ---------------------------------------------------------------------------

#[test]
fn empirical_variogram_ignores_input_order() {
    let g = PlanarGeometry::default();
    let obs = scattered(80, 3);
    let mut reversed = obs.clone();
    reversed.reverse();

    let a = empirical_variogram(&g, &obs, &VariogramParams::default()).unwrap();
    let b = empirical_variogram(&g, &reversed, &VariogramParams::default()).unwrap();

    assert_eq!(a.bins.len(), b.bins.len());
    assert_relative_eq!(a.cutoff, b.cutoff, max_relative = 1e-12);
    for (x, y) in a.bins.iter().zip(&b.bins) {
        assert_eq!(x.pair_count, y.pair_count);
        assert_relative_eq!(x.semivariance, y.semivariance, max_relative = 1e-9);
        assert_relative_eq!(x.mean_lag, y.mean_lag, max_relative = 1e-9);
    }
}

#[test]
fn larger_cutoff_never_loses_pairs() {
    let g = PlanarGeometry::default();
    let obs = scattered(60, 11);
    let mut previous = 0;
    for cutoff in [10.0, 20.0, 40.0, 80.0] {
        let emp = empirical_variogram(
            &g,
            &obs,
            &VariogramParams {
                cutoff: Some(cutoff),
                width: Some(5.0),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(emp.total_pairs() >= previous, "cutoff {cutoff}");
        assert!(emp.bins.iter().all(|b| b.lag_upper <= cutoff + 1e-9));
        previous = emp.total_pairs();
    }
}

#[test]
fn fitting_is_reproducible() {
    let g = PlanarGeometry::default();
    let obs = scattered(120, 5);
    let emp = empirical_variogram(&g, &obs, &VariogramParams::default()).unwrap();
    let kinds = [StructureKind::Spherical, StructureKind::Exponential, StructureKind::Gaussian];

    let a = fit_best_variogram(&emp, &kinds, &FitParams::default());
    let b = fit_best_variogram(&emp, &kinds, &FitParams::default());
    match (a, b) {
        (Ok(a), Ok(b)) => {
            assert_eq!(a.model, b.model);
            assert_eq!(a.rss.to_bits(), b.rss.to_bits());
            assert_eq!(a.iterations, b.iterations);
        }
        (Err(a), Err(b)) => assert_eq!(a, b),
        (a, b) => panic!("runs disagree: {a:?} vs {b:?}"),
    }
}

// ---------------------------------------------------------------------------
// Kriging
// ---------------------------------------------------------------------------

#[test]
fn estimate_fit_and_krige() {
    let g = PlanarGeometry::default();
    let obs = scattered(150, 21);
    let emp = empirical_variogram(&g, &obs, &VariogramParams::default()).unwrap();
    let fitted = fit_best_variogram(
        &emp,
        &[StructureKind::Spherical, StructureKind::Exponential],
        &FitParams::default(),
    )
    .unwrap();
    assert!(fitted.model.sill() > 0.0);

    let tg = targets(25, 99);
    let results = krige(
        &g,
        &fitted.model,
        &obs,
        &tg,
        Trend::intercept(),
        KrigingOptions {
            nmax: Some(20),
            ..Default::default()
        },
    )
    .unwrap();

    let mut abs_err = 0.0;
    for (t, r) in tg.iter().zip(&results) {
        let p = r.as_ref().unwrap();
        assert!(p.prediction_variance >= 0.0);
        assert_eq!(p.neighbors, 20);
        if let Target::Point { location, .. } = t {
            abs_err += (p.predicted_value - field(location.x(), location.y())).abs();
        }
    }
    let mae = abs_err / tg.len() as f64;
    assert!(mae < 0.2, "mean absolute error {mae:.3}");
}

/// Ten stations from an exponential field, cutoff at half the diagonal and
/// ten bins. A single small sample pins the range down poorly, so the check
/// runs over several fields and asks the median fitted range to land within
/// a factor of four of the truth.
#[test]
fn ten_station_fit_recovers_range() {
    let g = PlanarGeometry::default();
    let true_range = 60.0;
    let truth = VariogramModel::simple(StructureKind::Exponential, 0.0, 1.0, true_range).unwrap();

    let mut ranges = Vec::new();
    for seed in 0..9 {
        let locations: Vec<Point<f64>> = {
            let mut rng = Lcg(1000 + seed);
            (0..10)
                .map(|_| Point::new(rng.next_f64() * 100.0, rng.next_f64() * 100.0))
                .collect()
        };
        let values = gaussian_field(&truth, &locations, seed);
        let obs: Vec<_> = locations
            .iter()
            .zip(&values)
            .map(|(p, v)| Observation::new(*p, *v))
            .collect();

        let cutoff = 0.5 * g.bounding_diagonal(&locations);
        let params = VariogramParams {
            cutoff: Some(cutoff),
            width: Some(cutoff / 10.0),
            ..Default::default()
        };
        let emp = empirical_variogram(&g, &obs, &params).unwrap();
        let Ok(start) = initial_model(StructureKind::Exponential, &emp, false) else {
            continue;
        };
        let fit_params = FitParams {
            fit_nugget: false,
            ..Default::default()
        };
        if let Ok(fitted) = fit_variogram(&start, &emp, &fit_params) {
            assert!(fitted.model.sill() > 0.0);
            ranges.push(fitted.model.max_range());
        }
    }

    assert!(ranges.len() >= 7, "only {} of 9 fields could be fitted", ranges.len());
    ranges.sort_by(f64::total_cmp);
    let median = ranges[ranges.len() / 2];
    assert!(
        median > true_range / 4.0 && median < true_range * 4.0,
        "median range {median:.1}, fitted {ranges:?}"
    );
}

#[test]
fn midpoint_prediction_lies_between_neighbours() {
    let g = PlanarGeometry::default();
    let obs = vec![
        Observation::new(Point::new(50.0, 50.0), 1.0),
        Observation::new(Point::new(52.0, 50.0), 1.2),
        Observation::new(Point::new(5.0, 5.0), 0.0),
        Observation::new(Point::new(95.0, 95.0), 2.2),
        Observation::new(Point::new(5.0, 95.0), 1.1),
        Observation::new(Point::new(95.0, 5.0), 1.1),
    ];
    let model = VariogramModel::simple(StructureKind::Exponential, 0.0, 1.0, 30.0).unwrap();
    let tg = vec![Target::point(Point::new(51.0, 50.0))];

    let r = krige(&g, &model, &obs, &tg, Trend::intercept(), KrigingOptions::default()).unwrap();
    let p = r[0].as_ref().unwrap();
    assert!(p.predicted_value > 1.0 && p.predicted_value < 1.2, "{}", p.predicted_value);
    assert!(p.prediction_variance > 0.0);
}

#[test]
fn kriging_reproduces_data_without_nugget() {
    let g = PlanarGeometry::default();
    let obs = scattered(40, 8);
    let model = VariogramModel::simple(StructureKind::Exponential, 0.0, 1.0, 50.0).unwrap();
    let at_data: Vec<_> = obs.iter().map(|o| Target::point(o.location)).collect();

    let results = krige(&g, &model, &obs, &at_data, Trend::intercept(), KrigingOptions::default())
        .unwrap();
    for (o, r) in obs.iter().zip(results) {
        let p = r.unwrap();
        assert!((p.predicted_value - o.value).abs() < 1e-6);
        assert!(p.prediction_variance < 1e-6);
    }
}

#[test]
fn kdtree_and_brute_force_agree() {
    let g = PlanarGeometry::default();
    let obs = scattered(200, 13);
    let model = VariogramModel::simple(StructureKind::Spherical, 0.05, 1.0, 40.0).unwrap();
    let engine = KrigingEngine::new(
        g,
        SpatialCovariance::new(model, g),
        Trend::intercept(),
        KrigingOptions {
            nmax: Some(12),
            ..Default::default()
        },
    )
    .unwrap();
    let tg = targets(30, 4);

    let tree = KdTree::build(&obs);
    let brute = BruteForceIndex::build(g, &obs);
    let a = engine.predict_all(&tree, &tg).unwrap();
    let b = engine.predict_all(&brute, &tg).unwrap();
    for (x, y) in a.iter().zip(&b) {
        assert_relative_eq!(x.predicted_value, y.predicted_value, epsilon = 1e-9);
        assert_relative_eq!(x.prediction_variance, y.prediction_variance, epsilon = 1e-9);
    }
}

#[test]
fn tiny_block_matches_point() {
    let g = PlanarGeometry::default();
    let obs = scattered(50, 17);
    let model = VariogramModel::simple(StructureKind::Spherical, 0.0, 1.0, 40.0).unwrap();
    let cell = Rect::new(coord! { x: 49.999, y: 49.999 }, coord! { x: 50.001, y: 50.001 }).to_polygon();
    let tg = vec![Target::point(Point::new(50.0, 50.0)), Target::block(cell)];

    let r = krige(&g, &model, &obs, &tg, Trend::intercept(), KrigingOptions::default()).unwrap();
    let point = r[0].as_ref().unwrap();
    let block = r[1].as_ref().unwrap();
    assert_relative_eq!(point.predicted_value, block.predicted_value, epsilon = 1e-4);
    assert_relative_eq!(point.prediction_variance, block.prediction_variance, epsilon = 1e-4);
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

#[test]
fn simulation_is_reproducible_and_conditional() {
    let g = PlanarGeometry::default();
    let obs = scattered(30, 31);
    let model = VariogramModel::simple(StructureKind::Exponential, 0.0, 1.0, 30.0).unwrap();
    let engine = KrigingEngine::new(
        g,
        SpatialCovariance::new(model, g),
        Trend::intercept(),
        KrigingOptions {
            nmax: Some(12),
            ..Default::default()
        },
    )
    .unwrap();
    let index = KdTree::build(&obs);

    let mut tg = targets(40, 6);
    tg.push(Target::point(obs[0].location));

    let params = SimulationParams {
        n_realizations: 4,
        seed: 77,
        cancel: None,
    };
    let a = SequentialSimulator::new(&engine, params.clone()).simulate_all(&index, &tg).unwrap();
    let b = SequentialSimulator::new(&engine, params).simulate_all(&index, &tg).unwrap();
    assert_eq!(a, b);
    assert_eq!(index.len(), 30);

    for r in &a {
        assert_eq!(r.values.len(), tg.len());
        assert!(r.values.iter().all(|v| v.is_finite()));
        assert!((r.values[40] - obs[0].value).abs() < 1e-6);
    }
}

#[test]
fn different_seeds_give_different_realizations() {
    let g = PlanarGeometry::default();
    let obs = scattered(30, 31);
    let model = VariogramModel::simple(StructureKind::Exponential, 0.0, 1.0, 30.0).unwrap();
    let engine = KrigingEngine::new(
        g,
        SpatialCovariance::new(model, g),
        Trend::intercept(),
        KrigingOptions {
            nmax: Some(12),
            ..Default::default()
        },
    )
    .unwrap();
    let index = KdTree::build(&obs);
    let tg = targets(40, 8);

    let run = |seed| {
        let params = SimulationParams {
            n_realizations: 3,
            seed,
            cancel: None,
        };
        SequentialSimulator::new(&engine, params).simulate_all(&index, &tg).unwrap()
    };
    let a = run(42);
    let b = run(43);

    for realizations in [&a, &b] {
        assert_eq!(realizations.len(), 3);
        for r in realizations {
            assert_eq!(r.values.len(), tg.len());
            assert!(r.values.iter().all(|v| v.is_finite()));
        }
    }
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.index, y.index);
        assert_ne!(x.values, y.values);
    }
}

// ---------------------------------------------------------------------------
// Space-time
// ---------------------------------------------------------------------------

fn space_time_data() -> Vec<Observation<SpaceTime<Point<f64>>>> {
    let mut obs = Vec::new();
    for t in 0..6 {
        for i in 0..6 {
            for j in 0..6 {
                let (x, y) = (i as f64 * 10.0, j as f64 * 10.0);
                let time = t as f64;
                let value = field(x, y) + 0.3 * (time / 2.0).sin() + 0.05 * (x * 0.1 + time).cos();
                obs.push(Observation::new(SpaceTime::new(Point::new(x, y), time), value));
            }
        }
    }
    obs
}

#[test]
fn space_time_fit_and_krige() {
    let spatial = PlanarGeometry::default();
    let obs = space_time_data();
    let emp = empirical_st_variogram(
        &spatial,
        &obs,
        &StVariogramParams {
            cutoff: Some(40.0),
            width: Some(10.0),
            ..Default::default()
        },
    )
    .unwrap();
    assert!(!emp.bins.is_empty());
    assert!(emp.bins.iter().all(|b| b.semivariance >= 0.0));

    let joint = VariogramModel::simple(StructureKind::Exponential, 0.0, 1.0, 40.0).unwrap();
    let initial = SpaceTimeModel::metric(joint, 10.0).unwrap();
    let fitted =
        fit_space_time(&initial, &emp, &FitParams::default(), AnisotropySource::Fixed(10.0)).unwrap();
    let (model, kappa) = (fitted.model, fitted.anisotropy);
    assert_eq!(kappa, 10.0);

    // Ranges are held within a multiple of the largest separation
    let max_separation = emp
        .bins
        .iter()
        .map(|b| b.mean_lag.hypot(kappa * b.mean_time_lag))
        .fold(0.0, f64::max);
    let max_gamma = emp.bins.iter().map(|b| b.semivariance).fold(0.0, f64::max);
    let SpaceTimeModel::Metric { joint, .. } = &model else {
        panic!("fit changed the model family: {model:?}");
    };
    assert!(joint.max_range() > 0.0);
    assert!(joint.max_range() <= RANGE_CAP * max_separation * (1.0 + 1e-9), "{joint}");
    assert!(model.sill() > 0.0 && model.sill() < 10.0 * max_gamma, "{joint}");

    let geometry = SpaceTimeGeometry::new(spatial, kappa).unwrap();
    let engine = KrigingEngine::new(
        geometry,
        SpaceTimeCovariance::new(model, spatial),
        Trend::intercept(),
        KrigingOptions {
            nmax: Some(20),
            ..Default::default()
        },
    )
    .unwrap();
    let index = BruteForceIndex::build(geometry, &obs);

    let at_datum = Target::point(obs[50].location);
    let p = engine.predict(&index, &at_datum).unwrap();
    assert_relative_eq!(p.predicted_value, obs[50].value, epsilon = 1e-6);

    let between = Target::point(SpaceTime::new(Point::new(15.0, 15.0), 2.5));
    let p = engine.predict(&index, &between).unwrap();
    assert!(p.predicted_value.is_finite());
    assert!(p.prediction_variance > 0.0);
}

#[test]
fn initial_model_starts_inside_the_data() {
    let g = PlanarGeometry::default();
    let obs = scattered(100, 2);
    let emp = empirical_variogram(&g, &obs, &VariogramParams::default()).unwrap();
    let model = initial_model(StructureKind::Spherical, &emp, true).unwrap();
    let max_gamma = emp.bins.iter().map(|b| b.semivariance).fold(0.0, f64::max);
    assert!(model.sill() <= max_gamma + 1e-12);
    assert!(model.nugget() <= 0.5 * model.sill() + 1e-12);
}
