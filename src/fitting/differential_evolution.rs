//! Differential Evolution engine.
//!
//! A population-based stochastic minimizer for rough cost surfaces where a
//! local search from the starting values would end in the wrong minimum. Every
//! parameter needs finite bounds; the population is drawn uniformly inside
//! them, with the current parameter values as one of the members. The best
//! member is optionally polished with Levenberg-Marquardt.

use ndarray::Array1;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::{FitError, Result};
use crate::variables::bounds::Bounds;

use super::engine::MinimizerResult;
use super::lm::LevenbergMarquardt;
use super::problem::{BoundedProblem, Problem};

/// Strategies for creating candidate solutions in Differential Evolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// DE/rand/1: x_r1 + F * (x_r2 - x_r3)
    #[default]
    Rand1,

    /// DE/best/1: x_best + F * (x_r1 - x_r2)
    Best1,

    /// DE/rand/2: x_r1 + F * (x_r2 - x_r3) + F * (x_r4 - x_r5)
    Rand2,

    /// DE/best/2: x_best + F * (x_r1 - x_r2) + F * (x_r3 - x_r4)
    Best2,

    /// DE/current-to-best/1: x_i + F * (x_best - x_i) + F * (x_r1 - x_r2)
    CurrentToBest1,
}

impl Strategy {
    /// Strategy names accepted by [`Strategy::from_str`]
    pub const NAMES: &'static [&'static str] =
        &["rand1", "best1", "rand2", "best2", "current-to-best1"];

    // Distinct random members a mutation draws besides the target.
    fn members_needed(&self) -> usize {
        match self {
            Strategy::Best1 | Strategy::CurrentToBest1 => 2,
            Strategy::Rand1 => 3,
            Strategy::Best2 => 4,
            Strategy::Rand2 => 5,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = match self {
            Strategy::Rand1 => 0,
            Strategy::Best1 => 1,
            Strategy::Rand2 => 2,
            Strategy::Best2 => 3,
            Strategy::CurrentToBest1 => 4,
        };
        f.write_str(Self::NAMES[index])
    }
}

impl FromStr for Strategy {
    type Err = FitError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "rand1" => Ok(Strategy::Rand1),
            "best1" => Ok(Strategy::Best1),
            "rand2" => Ok(Strategy::Rand2),
            "best2" => Ok(Strategy::Best2),
            "current-to-best1" => Ok(Strategy::CurrentToBest1),
            _ => Err(FitError::UnknownMethod {
                engine: "differential_evolution".to_string(),
                method: s.to_string(),
            }),
        }
    }
}

/// Configuration of the Differential Evolution engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifferentialEvolutionConfig {
    /// Population size = multiplier * parameter count (at least 5). Default: 10
    pub population_multiplier: usize,

    /// Differential weight (F) in range [0, 2]. Default: 0.8
    pub differential_weight: f64,

    /// Crossover probability (CR) in range [0, 1]. Default: 0.9
    pub crossover_probability: f64,

    /// Mutation strategy. Default: rand1
    pub strategy: Strategy,

    /// Maximum number of generations. Default: 1000
    pub max_generations: usize,

    /// Converged when the spread of population costs is below
    /// `tol * |mean cost|`. Default: 1e-8
    pub tol: f64,

    /// Seed for reproducible runs; `None` seeds from the OS. Default: None
    pub seed: Option<u64>,

    /// Refine the best member with Levenberg-Marquardt. Default: true
    pub polish: bool,
}

impl Default for DifferentialEvolutionConfig {
    fn default() -> Self {
        Self {
            population_multiplier: 10,
            differential_weight: 0.8,
            crossover_probability: 0.9,
            strategy: Strategy::default(),
            max_generations: 1000,
            tol: 1e-8,
            seed: None,
            polish: true,
        }
    }
}

/// Differential Evolution algorithm for global optimization.
#[derive(Debug, Clone, Default)]
pub struct DifferentialEvolution {
    config: DifferentialEvolutionConfig,
}

impl DifferentialEvolution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DifferentialEvolutionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DifferentialEvolutionConfig {
        &self.config
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    /// Set the random seed for reproducibility.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    pub fn with_polish(mut self, polish: bool) -> Self {
        self.config.polish = polish;
        self
    }

    pub fn with_max_generations(mut self, generations: usize) -> Self {
        self.config.max_generations = generations;
        self
    }

    /// Run the optimization
    ///
    /// # Arguments
    ///
    /// * `problem` - The problem to solve, in external coordinates
    /// * `initial` - Starting values, used as one member of the population
    /// * `bounds` - Finite bounds for every parameter
    ///
    /// # Returns
    ///
    /// * The best solution found. The problem is left evaluated at it.
    pub fn optimize(
        &self,
        problem: &mut dyn Problem,
        initial: &Array1<f64>,
        bounds: &[Bounds],
    ) -> Result<MinimizerResult> {
        let config = &self.config;
        let n_params = problem.parameter_count();
        if bounds.len() != n_params || initial.len() != n_params {
            return Err(FitError::DimensionMismatch(format!(
                "Expected {} bounds and starting values, got {} and {}",
                n_params,
                bounds.len(),
                initial.len()
            ))
            .into());
        }
        if let Some(i) = bounds.iter().position(|b| !b.is_finite()) {
            return Err(FitError::UnboundedParameter(format!("parameter {i}")).into());
        }

        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let pop_size = (config.population_multiplier * n_params)
            .max(config.strategy.members_needed() + 2);
        let mut population: Vec<Array1<f64>> = Vec::with_capacity(pop_size);
        population.push(initial.iter().zip(bounds).map(|(v, b)| b.clamp(*v)).collect());
        for _ in 1..pop_size {
            population.push(random_point(bounds, &mut rng));
        }
        let mut costs = population
            .iter()
            .map(|member| cost_of(problem, member))
            .collect::<Result<Vec<_>>>()?;
        let mut func_evals = pop_size;

        let mut best = best_index(&costs);
        let mut generations = 0;
        let mut converged = false;

        while generations < config.max_generations {
            for i in 0..pop_size {
                let trial = self.create_trial_vector(i, best, &population, bounds, &mut rng);
                let trial_cost = cost_of(problem, &trial)?;
                func_evals += 1;

                if trial_cost <= costs[i] {
                    population[i] = trial;
                    costs[i] = trial_cost;
                    if trial_cost < costs[best] {
                        best = i;
                    }
                }
            }
            generations += 1;

            if population_converged(&costs, config.tol) {
                converged = true;
                break;
            }
        }
        debug!(generations, cost = costs[best], "differential evolution finished");
        if !costs[best].is_finite() {
            return Err(FitError::ConvergenceFailure(format!(
                "no finite cost within the bounds after {generations} generations"
            ))
            .into());
        }

        let mut params = population[best].clone();
        let mut cost = costs[best];
        let mut message = if converged {
            format!("Population converged after {generations} generations")
        } else {
            format!("Maximum generations ({}) reached", config.max_generations)
        };

        if config.polish {
            let mut bounded = BoundedProblem::new(problem, bounds)?;
            let start = bounded.to_internal(&params)?;
            let polished = LevenbergMarquardt::new().minimize(&mut bounded, start)?;
            func_evals += polished.func_evals;
            if polished.cost <= cost {
                params = bounded.to_external(&polished.params);
                cost = polished.cost;
                message.push_str("; polished with Levenberg-Marquardt");
                converged = converged || polished.success;
            }
        }

        // leave the problem evaluated at the returned point
        problem.eval(&params)?;
        func_evals += 1;

        Ok(MinimizerResult {
            params,
            cost,
            success: converged,
            message,
            iterations: generations,
            func_evals,
        })
    }

    fn create_trial_vector(
        &self,
        target: usize,
        best: usize,
        population: &[Array1<f64>],
        bounds: &[Bounds],
        rng: &mut impl Rng,
    ) -> Array1<f64> {
        let f = self.config.differential_weight;
        let strategy = self.config.strategy;
        let uses_best = matches!(
            strategy,
            Strategy::Best1 | Strategy::Best2 | Strategy::CurrentToBest1
        );

        let mut candidates: Vec<usize> = (0..population.len())
            .filter(|&i| i != target && !(uses_best && i == best))
            .collect();
        candidates.shuffle(rng);
        let r = &candidates[..strategy.members_needed()];
        let diff = |a: usize, b: usize| &population[a] - &population[b];

        let mut trial = match strategy {
            Strategy::Rand1 => &population[r[0]] + &(diff(r[1], r[2]) * f),
            Strategy::Best1 => &population[best] + &(diff(r[0], r[1]) * f),
            Strategy::Rand2 => {
                &population[r[0]] + &((diff(r[1], r[2]) + diff(r[3], r[4])) * f)
            }
            Strategy::Best2 => {
                &population[best] + &((diff(r[0], r[1]) + diff(r[2], r[3])) * f)
            }
            Strategy::CurrentToBest1 => {
                &population[target] + &((diff(best, target) + diff(r[0], r[1])) * f)
            }
        };

        // binomial crossover with the target; one mutated gene is guaranteed
        let n_params = trial.len();
        let forced = rng.gen_range(0..n_params);
        for j in 0..n_params {
            if j != forced && rng.gen::<f64>() > self.config.crossover_probability {
                trial[j] = population[target][j];
            }
        }

        for (value, bound) in trial.iter_mut().zip(bounds) {
            *value = bound.clamp(*value);
        }
        trial
    }
}

fn random_point(bounds: &[Bounds], rng: &mut impl Rng) -> Array1<f64> {
    bounds
        .iter()
        .map(|b| {
            if b.width() > 0.0 {
                rng.gen_range(b.min..=b.max)
            } else {
                b.min
            }
        })
        .collect()
}

// Non-finite costs rank last instead of aborting the search.
fn cost_of(problem: &mut dyn Problem, params: &Array1<f64>) -> Result<f64> {
    let cost = problem.eval_cost(params)?;
    Ok(if cost.is_finite() { cost } else { f64::INFINITY })
}

fn best_index(costs: &[f64]) -> usize {
    costs
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

fn population_converged(costs: &[f64], tol: f64) -> bool {
    if costs.iter().any(|c| !c.is_finite()) {
        return false;
    }
    let n = costs.len() as f64;
    let mean = costs.iter().sum::<f64>() / n;
    let std = (costs.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n).sqrt();
    std <= tol * mean.abs() || mean == 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fitting::problem::tests::ExponentialProblem;
    use approx::assert_relative_eq;
    use ndarray::array;

    /// f(x, y) = sin(x) cos(y) + 0.1 x² + 0.1 y² as a single residual,
    /// shifted so the cost is positive
    struct MultiMinimaProblem;

    impl Problem for MultiMinimaProblem {
        fn eval(&mut self, params: &Array1<f64>) -> Result<Array1<f64>> {
            let (x, y) = (params[0], params[1]);
            Ok(array![x.sin() * y.cos() + 0.1 * x.powi(2) + 0.1 * y.powi(2) + 2.0])
        }

        fn parameter_count(&self) -> usize {
            2
        }

        fn residual_count(&self) -> usize {
            1
        }
    }

    #[test]
    fn test_strategy_names() {
        for name in Strategy::NAMES {
            let strategy: Strategy = name.parse().unwrap();
            assert_eq!(strategy.to_string(), *name);
        }
        assert_eq!("current_to_best1".parse::<Strategy>().unwrap(), Strategy::CurrentToBest1);
        assert!("rand3".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_escapes_local_minimum() {
        let bounds = [Bounds::new(-10.0, 10.0).unwrap(), Bounds::new(-10.0, 10.0).unwrap()];
        // start near the local minimum around x = 4.3
        let start = array![4.3, 0.0];
        for strategy in [Strategy::Rand1, Strategy::Best1, Strategy::CurrentToBest1] {
            let de = DifferentialEvolution::new()
                .with_strategy(strategy)
                .with_seed(7)
                .with_polish(false)
                .with_max_generations(300);
            let result = de.optimize(&mut MultiMinimaProblem, &start, &bounds).unwrap();
            // global minimum f ≈ -0.76 near x = -1.3, y = 0
            assert!(result.params[0] < 0.0, "{strategy}: {result}");
            assert!(result.cost < (2.0_f64 - 0.7).powi(2), "{strategy}: {result}");
        }
    }

    #[test]
    fn test_polished_fit_is_precise() {
        let mut problem = ExponentialProblem::new(3.0, 0.7);
        let bounds = [Bounds::new(0.0, 10.0).unwrap(), Bounds::new(0.0, 5.0).unwrap()];
        let de = DifferentialEvolution::new().with_seed(42).with_max_generations(200);
        let result = de.optimize(&mut problem, &array![1.0, 1.0], &bounds).unwrap();
        assert_relative_eq!(result.params[0], 3.0, epsilon = 1e-5);
        assert_relative_eq!(result.params[1], 0.7, epsilon = 1e-5);
    }

    #[test]
    fn test_seed_is_reproducible() {
        let bounds = [Bounds::new(0.0, 10.0).unwrap(), Bounds::new(0.0, 5.0).unwrap()];
        let run = || {
            let mut problem = ExponentialProblem::new(3.0, 0.7);
            DifferentialEvolution::new()
                .with_seed(3)
                .with_polish(false)
                .with_max_generations(20)
                .optimize(&mut problem, &array![1.0, 1.0], &bounds)
                .unwrap()
        };
        assert_eq!(run().params, run().params);
    }

    #[test]
    fn test_no_finite_cost_fails() {
        struct Overflowing;
        impl Problem for Overflowing {
            fn eval(&mut self, params: &Array1<f64>) -> Result<Array1<f64>> {
                Ok(array![f64::MAX * (2.0 + params[0])])
            }
            fn parameter_count(&self) -> usize {
                1
            }
            fn residual_count(&self) -> usize {
                1
            }
        }

        let bounds = [Bounds::new(0.0, 1.0).unwrap()];
        let err = DifferentialEvolution::new()
            .with_seed(1)
            .with_max_generations(5)
            .optimize(&mut Overflowing, &array![0.5], &bounds)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::CoreError::Fit(FitError::ConvergenceFailure(_))
        ));
    }

    #[test]
    fn test_requires_finite_bounds() {
        let mut problem = ExponentialProblem::new(3.0, 0.7);
        let bounds = [Bounds::new(0.0, 10.0).unwrap(), Bounds::unbounded()];
        let err = DifferentialEvolution::new()
            .optimize(&mut problem, &array![1.0, 1.0], &bounds)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::CoreError::Fit(FitError::UnboundedParameter(_))
        ));
    }
}
