use rand::distr::weighted::WeightedIndex;
use rand::Rng;
use rand_distr::{Distribution, Exp, Gamma, LogNormal, Normal, Weibull};
use serde::{Deserialize, Serialize};

use crate::error::SimError;

const MAX_NORMAL_RESAMPLES: usize = 100;

/// A one-dimensional probability distribution named in a configuration file, for example
/// `{ "type": "gamma", "shape": 2.0, "scale": 0.5 }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConfigDistribution {
    Fixed { value: f64 },
    Uniform { min: f64, max: f64 },
    Normal { mu: f64, sigma: f64 },
    LogNormal { zeta: f64, sigma: f64 },
    Exponential { lambda: f64 },
    Gamma { shape: f64, scale: f64 },
    Weibull { scale: f64, shape: f64 },
    Discrete { values: Vec<f64>, weights: Vec<f64> },
}

fn invalid(dist: &ConfigDistribution, reason: impl std::fmt::Display) -> SimError {
    SimError::ConfigError(format!("Invalid distribution {dist:?}: {reason}"))
}

impl ConfigDistribution {
    /// Checks the parameters without drawing
    ///
    /// # Errors
    ///
    /// Returns `SimError::ConfigError` if the distribution cannot be constructed.
    pub fn validate(&self) -> Result<(), SimError> {
        match self {
            ConfigDistribution::Fixed { value } if !value.is_finite() => {
                Err(invalid(self, "value must be finite"))
            }
            ConfigDistribution::Uniform { min, max } if min.is_nan() || max.is_nan() || min > max => {
                Err(invalid(self, "min must not exceed max"))
            }
            ConfigDistribution::Normal { mu, sigma } => {
                Normal::new(*mu, *sigma).map_err(|e| invalid(self, e))?;
                Ok(())
            }
            ConfigDistribution::LogNormal { zeta, sigma } => {
                LogNormal::new(*zeta, *sigma).map_err(|e| invalid(self, e))?;
                Ok(())
            }
            ConfigDistribution::Exponential { lambda } => {
                Exp::new(*lambda).map_err(|e| invalid(self, e))?;
                Ok(())
            }
            ConfigDistribution::Gamma { shape, scale } => {
                Gamma::new(*shape, *scale).map_err(|e| invalid(self, e))?;
                Ok(())
            }
            ConfigDistribution::Weibull { scale, shape } => {
                Weibull::new(*scale, *shape).map_err(|e| invalid(self, e))?;
                Ok(())
            }
            ConfigDistribution::Discrete { values, weights } => {
                if values.len() != weights.len() {
                    return Err(invalid(self, "values and weights differ in length"));
                }
                WeightedIndex::new(weights).map_err(|e| invalid(self, e))?;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Draws one value
    ///
    /// # Errors
    ///
    /// Returns `SimError::ConfigError` if the parameters are invalid.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, SimError> {
        let value = match self {
            ConfigDistribution::Fixed { value } => *value,
            ConfigDistribution::Uniform { min, max } => {
                self.validate()?;
                min + (max - min) * rng.random::<f64>()
            }
            ConfigDistribution::Normal { mu, sigma } => Normal::new(*mu, *sigma)
                .map_err(|e| invalid(self, e))?
                .sample(rng),
            ConfigDistribution::LogNormal { zeta, sigma } => LogNormal::new(*zeta, *sigma)
                .map_err(|e| invalid(self, e))?
                .sample(rng),
            ConfigDistribution::Exponential { lambda } => {
                Exp::new(*lambda).map_err(|e| invalid(self, e))?.sample(rng)
            }
            ConfigDistribution::Gamma { shape, scale } => Gamma::new(*shape, *scale)
                .map_err(|e| invalid(self, e))?
                .sample(rng),
            ConfigDistribution::Weibull { scale, shape } => Weibull::new(*scale, *shape)
                .map_err(|e| invalid(self, e))?
                .sample(rng),
            ConfigDistribution::Discrete { values, weights } => {
                self.validate()?;
                let index = WeightedIndex::new(weights).map_err(|e| invalid(self, e))?;
                values[index.sample(rng)]
            }
        };
        Ok(value)
    }

    /// Draws a duration or delay. A negative normal draw is redrawn, and clamped to zero if that
    /// keeps failing; other distributions are clamped at zero.
    ///
    /// # Errors
    ///
    /// Returns `SimError::ConfigError` if the parameters are invalid.
    pub fn sample_non_negative<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, SimError> {
        if let ConfigDistribution::Normal { mu, sigma } = self {
            let normal = Normal::new(*mu, *sigma).map_err(|e| invalid(self, e))?;
            return Ok((0..MAX_NORMAL_RESAMPLES)
                .map(|_| normal.sample(rng))
                .find(|x| *x >= 0.0)
                .unwrap_or(0.0));
        }
        Ok(self.sample(rng)?.max(0.0))
    }

    /// The mean, where it has a closed form
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        match self {
            ConfigDistribution::Fixed { value } => Some(*value),
            ConfigDistribution::Uniform { min, max } => Some(0.5 * (min + max)),
            ConfigDistribution::LogNormal { zeta, sigma } => Some((zeta + 0.5 * sigma * sigma).exp()),
            ConfigDistribution::Exponential { lambda } => Some(1.0 / lambda),
            ConfigDistribution::Gamma { shape, scale } => Some(shape * scale),
            ConfigDistribution::Discrete { values, weights } => {
                let total: f64 = weights.iter().sum();
                Some(values.iter().zip(weights).map(|(v, w)| v * w).sum::<f64>() / total)
            }
            ConfigDistribution::Normal { .. } | ConfigDistribution::Weibull { .. } => None,
        }
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn sample_mean(dist: &ConfigDistribution, n: usize) -> f64 {
        let mut rng = SmallRng::seed_from_u64(11);
        let total: f64 = (0..n).map(|_| dist.sample(&mut rng).unwrap()).sum();
        #[allow(clippy::cast_precision_loss)]
        let n = n as f64;
        total / n
    }

    #[test]
    fn parses_tagged_json() {
        let dist: ConfigDistribution =
            serde_json::from_str(r#"{ "type": "weibull", "scale": 70.0, "shape": 4.0 }"#).unwrap();
        assert_eq!(
            dist,
            ConfigDistribution::Weibull {
                scale: 70.0,
                shape: 4.0
            }
        );
        let dist: ConfigDistribution =
            serde_json::from_str(r#"{ "type": "fixed", "value": 0.5 }"#).unwrap();
        assert_eq!(dist, ConfigDistribution::Fixed { value: 0.5 });
    }

    #[test]
    fn unknown_type_fails_to_parse() {
        let result: Result<ConfigDistribution, _> =
            serde_json::from_str(r#"{ "type": "cauchy", "x0": 0.0 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn fixed_always_returns_value() {
        let mut rng = SmallRng::seed_from_u64(1);
        let dist = ConfigDistribution::Fixed { value: 3.25 };
        for _ in 0..10 {
            assert_eq!(dist.sample(&mut rng).unwrap(), 3.25);
        }
    }

    #[test]
    fn sample_means_match() {
        let dist = ConfigDistribution::Gamma {
            shape: 2.0,
            scale: 0.5,
        };
        assert_relative_eq!(sample_mean(&dist, 50_000), 1.0, epsilon = 0.03);

        let dist = ConfigDistribution::Uniform { min: 2.0, max: 4.0 };
        assert_relative_eq!(sample_mean(&dist, 50_000), 3.0, epsilon = 0.03);

        let dist = ConfigDistribution::Exponential { lambda: 4.0 };
        assert_relative_eq!(sample_mean(&dist, 50_000), 0.25, epsilon = 0.01);
    }

    #[test]
    fn durations_are_never_negative() {
        let mut rng = SmallRng::seed_from_u64(5);
        let dist = ConfigDistribution::Normal {
            mu: 0.0,
            sigma: 1.0,
        };
        for _ in 0..1000 {
            assert!(dist.sample_non_negative(&mut rng).unwrap() >= 0.0);
        }
        let far_below = ConfigDistribution::Normal {
            mu: -50.0,
            sigma: 1.0,
        };
        assert_eq!(far_below.sample_non_negative(&mut rng).unwrap(), 0.0);
        let uniform = ConfigDistribution::Uniform { min: -2.0, max: -1.0 };
        assert_eq!(uniform.sample_non_negative(&mut rng).unwrap(), 0.0);
    }

    #[test]
    fn signed_normal_keeps_its_mean() {
        let dist = ConfigDistribution::Normal {
            mu: -8.0,
            sigma: 0.5,
        };
        assert_relative_eq!(sample_mean(&dist, 20_000), -8.0, epsilon = 0.02);
        let mut rng = SmallRng::seed_from_u64(8);
        for _ in 0..100 {
            assert!(dist.sample(&mut rng).unwrap() < 0.0);
        }
    }

    #[test]
    fn discrete_draws_from_values() {
        let mut rng = SmallRng::seed_from_u64(3);
        let dist = ConfigDistribution::Discrete {
            values: vec![1.0, 5.0],
            weights: vec![0.0, 2.0],
        };
        assert_eq!(dist.sample(&mut rng).unwrap(), 5.0);
        assert_eq!(dist.mean(), Some(5.0));
    }

    #[test]
    fn invalid_parameters_are_config_errors() {
        let bad = [
            ConfigDistribution::Uniform { min: 2.0, max: 1.0 },
            ConfigDistribution::Exponential { lambda: -1.0 },
            ConfigDistribution::Gamma {
                shape: 0.0,
                scale: 1.0,
            },
            ConfigDistribution::Discrete {
                values: vec![1.0],
                weights: vec![0.5, 0.5],
            },
        ];
        for dist in bad {
            assert!(matches!(dist.validate(), Err(SimError::ConfigError(_))));
        }
        assert!(ConfigDistribution::Fixed { value: 1.0 }.validate().is_ok());
    }
}
