#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/*
Y-Axis Response Curves
======================

A touch pad gives us a normalized vertical position (0.0 at the bottom edge,
1.0 at the top). Players expect that position to feel musical, not linear:
volume should open up quickly near the bottom, an effects send should stay
out of the way until the finger is well into the upper half, and so on.

Each mapped parameter is described by a `YAxisCurveConfig`:

  min_output / max_output   The parameter range (gain 0..1, or decibels).
  y_threshold               Dead zone at the bottom of the pad. Below it the
                            parameter is pinned to its minimum (silence, for
                            a db-typed output).
  curve_type + curve_factor The response shape between the threshold and the
                            top of the pad.
  output_kind               Whether the result is a plain gain or decibels.
                            A db output below the threshold maps to -inf so a
                            fader fed with it is truly silent.

Every shape passes through (0, 0) and (1, 1) after renormalization, so the
mapping hits `min_output` exactly at the threshold and `max_output` exactly
at the top of the pad, whatever the curve type.
*/

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurveType {
    Linear,
    Exponential,
    Logarithmic,
    SCurve,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    /// Plain multiplier, typically 0.0 - 1.0.
    Gain,
    /// Decibels; below the threshold the mapping returns `-inf`.
    Db,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YAxisCurveConfig {
    pub min_output: f32,
    pub max_output: f32,
    /// Dead zone at the bottom of the pad, 0.0 - 1.0.
    pub y_threshold: f32,
    pub curve_type: CurveType,
    /// Shape parameter; exponent for the power curves, steepness for SCurve.
    pub curve_factor: f32,
    pub output_kind: OutputKind,
}

/// Map a normalized vertical touch position onto the configured parameter
/// range. Pure; always returns a value (possibly `-inf` for db outputs).
pub fn map(y_position: f32, cfg: &YAxisCurveConfig) -> f32 {
    let y = y_position.clamp(0.0, 1.0);
    if y < cfg.y_threshold {
        return match cfg.output_kind {
            OutputKind::Db => f32::NEG_INFINITY,
            OutputKind::Gain => cfg.min_output,
        };
    }

    let effective_y = if cfg.y_threshold >= 1.0 {
        0.0
    } else {
        (y - cfg.y_threshold) / (1.0 - cfg.y_threshold)
    };

    let scaled = match cfg.curve_type {
        CurveType::Linear => effective_y,
        CurveType::Exponential => effective_y.powf(cfg.curve_factor.max(0.1)),
        CurveType::Logarithmic => 1.0 - (1.0 - effective_y).powf(cfg.curve_factor.max(0.1)),
        CurveType::SCurve => {
            // curve_factor 0.1..5.0 maps to logistic steepness k in -5..5.
            let k = (cfg.curve_factor - 0.1) / (5.0 - 0.1) * 10.0 - 5.0;
            let val = 1.0 / (1.0 + (-k * (effective_y - 0.5)).exp());
            let s_min = 1.0 / (1.0 + (k * 0.5).exp());
            let s_max = 1.0 / (1.0 + (-k * 0.5).exp());
            if (s_max - s_min).abs() > f32::EPSILON {
                (val - s_min) / (s_max - s_min)
            } else {
                // k near zero degenerates to a flat logistic; fall back to
                // the identity so the endpoints still land exactly.
                effective_y
            }
        }
    };

    let scaled = scaled.clamp(0.0, 1.0);
    let output = cfg.min_output + scaled * (cfg.max_output - cfg.min_output);
    output.min(cfg.max_output).max(cfg.min_output)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CURVES: [CurveType; 4] = [
        CurveType::Linear,
        CurveType::Exponential,
        CurveType::Logarithmic,
        CurveType::SCurve,
    ];

    fn db_cfg(curve_type: CurveType) -> YAxisCurveConfig {
        YAxisCurveConfig {
            min_output: -60.0,
            max_output: 0.0,
            y_threshold: 0.1,
            curve_type,
            curve_factor: 2.0,
            output_kind: OutputKind::Db,
        }
    }

    fn gain_cfg(curve_type: CurveType) -> YAxisCurveConfig {
        YAxisCurveConfig {
            min_output: 0.0,
            max_output: 1.0,
            y_threshold: 0.2,
            curve_type,
            curve_factor: 2.0,
            output_kind: OutputKind::Gain,
        }
    }

    #[test]
    fn endpoints_are_exact_for_every_curve() {
        for curve in CURVES {
            let cfg = gain_cfg(curve);
            assert_eq!(map(cfg.y_threshold, &cfg), cfg.min_output, "{curve:?}");
            assert_eq!(map(1.0, &cfg), cfg.max_output, "{curve:?}");

            let cfg = db_cfg(curve);
            assert_eq!(map(1.0, &cfg), cfg.max_output, "{curve:?}");
        }
    }

    #[test]
    fn below_threshold_db_output_is_negative_infinity() {
        for curve in CURVES {
            let cfg = db_cfg(curve);
            assert_eq!(map(0.05, &cfg), f32::NEG_INFINITY, "{curve:?}");
        }
    }

    #[test]
    fn below_threshold_gain_output_pins_to_minimum() {
        let cfg = gain_cfg(CurveType::Linear);
        assert_eq!(map(0.0, &cfg), 0.0);
        assert_eq!(map(0.19, &cfg), 0.0);
    }

    #[test]
    fn mapping_is_monotonic_above_threshold() {
        for curve in CURVES {
            let cfg = gain_cfg(curve);
            let mut previous = map(cfg.y_threshold, &cfg);
            let mut y = cfg.y_threshold;
            while y < 1.0 {
                y += 0.01;
                let value = map(y, &cfg);
                assert!(value >= previous - 1e-6, "{curve:?} not monotonic at y={y}");
                previous = value;
            }
        }
    }

    #[test]
    fn exponential_curve_sits_below_linear_midway() {
        let linear = gain_cfg(CurveType::Linear);
        let expo = gain_cfg(CurveType::Exponential);
        assert!(map(0.6, &expo) < map(0.6, &linear));
    }

    #[test]
    fn out_of_range_input_is_clamped() {
        let cfg = gain_cfg(CurveType::Linear);
        assert_eq!(map(-0.5, &cfg), cfg.min_output);
        assert_eq!(map(1.5, &cfg), cfg.max_output);
    }

    #[test]
    fn degenerate_threshold_pins_output_to_minimum_below_top() {
        let cfg = YAxisCurveConfig {
            y_threshold: 1.0,
            ..gain_cfg(CurveType::Linear)
        };
        assert_eq!(map(1.0, &cfg), cfg.min_output);
    }
}
