//! Drawing values for individual parameter definitions.
//!
//! Sampling never looks at history: given a definition and a random source
//! the result depends on nothing else, so tests pass a seeded RNG.

use ht_types::{
    internal_error, Distribution, ParameterDefinition, ParameterKind, ParameterValue,
    ParameterValues, SearchSpace, TuneResult,
};
use rand::seq::SliceRandom;
use rand::Rng;
use std::f64::consts::PI;

/// Draw one value for `definition`.
pub fn sample<R: Rng + ?Sized>(
    definition: &ParameterDefinition,
    rng: &mut R,
) -> TuneResult<ParameterValue> {
    match definition.kind {
        ParameterKind::Continuous => {
            let (min, max) = numeric_bounds(definition)?;
            let value = match definition.distribution {
                Distribution::Uniform => min + rng.gen::<f64>() * (max - min),
                Distribution::LogUniform => {
                    let (log_min, log_max) = (min.ln(), max.ln());
                    (log_min + rng.gen::<f64>() * (log_max - log_min)).exp()
                }
                Distribution::Normal => {
                    let mean = (min + max) / 2.0;
                    let std_dev = (max - min) / 6.0;
                    mean + std_dev * standard_normal(rng)
                }
                Distribution::LogNormal => {
                    let (log_min, log_max) = (min.ln(), max.ln());
                    let mean = (log_min + log_max) / 2.0;
                    let std_dev = (log_max - log_min) / 6.0;
                    (mean + std_dev * standard_normal(rng)).exp()
                }
            };
            // exp/ln round trips can land a hair outside the bounds.
            Ok(ParameterValue::Float(value.clamp(min, max)))
        }
        ParameterKind::Discrete => {
            let (min, max) = numeric_bounds(definition)?;
            let value = (min + rng.gen::<f64>() * (max - min + 1.0)).floor().min(max);
            Ok(ParameterValue::Int(value as i64))
        }
        ParameterKind::Categorical => {
            let choice = definition
                .choices()
                .and_then(|choices| choices.choose(rng))
                .ok_or_else(|| internal_error!("parameter '{}' has no choices", definition.name))?;
            Ok(ParameterValue::Json(choice.clone()))
        }
        ParameterKind::Boolean => Ok(ParameterValue::Bool(rng.gen_bool(0.5))),
    }
}

/// Sample every parameter of `space` independently.
pub fn sample_configuration<R: Rng + ?Sized>(
    space: &SearchSpace,
    rng: &mut R,
) -> TuneResult<ParameterValues> {
    let mut values = ParameterValues::with_capacity(space.parameters.len());
    for param in &space.parameters {
        values.insert(param.name.clone(), sample(param, rng)?);
    }
    Ok(values)
}

fn numeric_bounds(definition: &ParameterDefinition) -> TuneResult<(f64, f64)> {
    definition
        .bounds()
        .ok_or_else(|| internal_error!("parameter '{}' has no numeric range", definition.name))
}

/// Box-Muller transform.
fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use serde_json::json;

    fn rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    #[test]
    fn continuous_samples_stay_in_bounds_for_every_distribution() {
        let mut rng = rng();
        for distribution in [
            Distribution::Uniform,
            Distribution::Normal,
            Distribution::LogUniform,
            Distribution::LogNormal,
        ] {
            let def =
                ParameterDefinition::continuous("lr", 1e-4, 1e-1).with_distribution(distribution);
            for _ in 0..500 {
                match sample(&def, &mut rng).unwrap() {
                    ParameterValue::Float(v) => {
                        assert!((1e-4..=1e-1).contains(&v), "{distribution:?} produced {v}")
                    }
                    other => panic!("unexpected value: {other:?}"),
                }
            }
        }
    }

    #[test]
    fn normal_samples_concentrate_near_the_centre() {
        let mut rng = rng();
        let def =
            ParameterDefinition::continuous("x", 0.0, 6.0).with_distribution(Distribution::Normal);
        let n = 2000;
        let mean = (0..n)
            .map(|_| sample(&def, &mut rng).unwrap().as_f64().unwrap())
            .sum::<f64>()
            / n as f64;
        assert!((mean - 3.0).abs() < 0.15, "mean was {mean}");
    }

    #[test]
    fn discrete_samples_cover_inclusive_range() {
        let mut rng = rng();
        let def = ParameterDefinition::discrete("layers", 1, 3);
        let mut seen = [false; 3];
        for _ in 0..300 {
            match sample(&def, &mut rng).unwrap() {
                ParameterValue::Int(v) => {
                    assert!((1..=3).contains(&v));
                    seen[(v - 1) as usize] = true;
                }
                other => panic!("unexpected value: {other:?}"),
            }
        }
        assert!(seen.iter().all(|s| *s));
    }

    #[test]
    fn categorical_and_boolean_samples_are_members() {
        let mut rng = rng();
        let choices = vec![json!("adam"), json!("sgd"), json!("rmsprop")];
        let def = ParameterDefinition::categorical("optimizer", choices.clone());
        for _ in 0..100 {
            match sample(&def, &mut rng).unwrap() {
                ParameterValue::Json(v) => assert!(choices.contains(&v)),
                other => panic!("unexpected value: {other:?}"),
            }
        }
        let flag = ParameterDefinition::boolean("batch_norm");
        assert!(matches!(sample(&flag, &mut rng).unwrap(), ParameterValue::Bool(_)));
    }

    #[test]
    fn seeded_sampling_is_deterministic() {
        let def = ParameterDefinition::continuous("x", 0.0, 1.0);
        let a = sample(&def, &mut ChaCha8Rng::seed_from_u64(42)).unwrap();
        let b = sample(&def, &mut ChaCha8Rng::seed_from_u64(42)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn malformed_definition_is_an_internal_error() {
        let mut def = ParameterDefinition::categorical("optimizer", vec![]);
        def.range = None;
        assert!(sample(&def, &mut rng()).is_err());
    }
}
