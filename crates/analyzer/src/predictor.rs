//! Short-horizon spot price prediction from a linear trend.

use chrono::Utc;
use common::{
    LaunchWindow, PredictionMethod, PriceAnalysis, PricePrediction, PriceSample, TrendDirection,
    VolatilityRisk,
};
use tracing::debug;

use crate::history;

/// |trend_score| at or below this is reported as stable.
const TREND_DEAD_BAND: f64 = 0.1;
const HEURISTIC_CONFIDENCE: f64 = 0.3;
const LAUNCH_WINDOW_HOURS: u32 = 2;

/// Predict from raw samples.
pub fn predict_from_samples(
    instance_type: &str,
    region: &str,
    samples: &[PriceSample],
    fallback_price: Option<f64>,
) -> PricePrediction {
    let analysis = history::analyze(instance_type, samples);
    predict(instance_type, region, analysis.as_ref(), fallback_price)
}

/// Predict from an analysis. With fewer than two data points the heuristic
/// estimator is used and the result is labelled accordingly.
pub fn predict(
    instance_type: &str,
    region: &str,
    analysis: Option<&PriceAnalysis>,
    fallback_price: Option<f64>,
) -> PricePrediction {
    match analysis {
        Some(a) if a.data_points >= 2 => from_trend(instance_type, region, a),
        other => {
            let price = other
                .map(|a| a.current_price)
                .or(fallback_price)
                .filter(|p| p.is_finite() && *p > 0.0)
                .unwrap_or(0.0);
            debug!(instance_type, region, price, "insufficient history, using heuristic prediction");
            heuristic(instance_type, region, price, other.map_or(0, |a| a.data_points))
        }
    }
}

fn from_trend(instance_type: &str, region: &str, a: &PriceAnalysis) -> PricePrediction {
    let project = |hours: f64| (a.current_price + a.trend_slope * hours).max(0.0);

    PricePrediction {
        instance_type: instance_type.to_string(),
        region: region.to_string(),
        current_price: a.current_price,
        predicted_1h: project(1.0),
        predicted_6h: project(6.0),
        predicted_24h: project(24.0),
        trend_direction: trend_direction(a.trend_score),
        volatility_risk: volatility_risk(a.volatility),
        confidence: confidence(a),
        optimal_launch_time: optimal_launch_window(a),
        method: PredictionMethod::LinearRegression,
        data_points: a.data_points,
        generated_at: Utc::now(),
    }
}

fn heuristic(instance_type: &str, region: &str, price: f64, data_points: usize) -> PricePrediction {
    PricePrediction {
        instance_type: instance_type.to_string(),
        region: region.to_string(),
        current_price: price,
        predicted_1h: price,
        predicted_6h: price,
        predicted_24h: price,
        trend_direction: TrendDirection::Stable,
        volatility_risk: VolatilityRisk::Medium,
        confidence: HEURISTIC_CONFIDENCE,
        optimal_launch_time: None,
        method: PredictionMethod::Heuristic,
        data_points,
        generated_at: Utc::now(),
    }
}

pub fn trend_direction(trend_score: f64) -> TrendDirection {
    if trend_score > TREND_DEAD_BAND {
        TrendDirection::Rising
    } else if trend_score < -TREND_DEAD_BAND {
        TrendDirection::Falling
    } else {
        TrendDirection::Stable
    }
}

pub fn volatility_risk(volatility: f64) -> VolatilityRisk {
    if volatility < 0.10 {
        VolatilityRisk::Low
    } else if volatility < 0.25 {
        VolatilityRisk::Medium
    } else {
        VolatilityRisk::High
    }
}

/// Confidence in [0.10, 0.95] from sample count, volatility and span.
pub fn confidence(a: &PriceAnalysis) -> f64 {
    let mut c = 0.5;
    c += match a.data_points {
        n if n >= 500 => 0.25,
        n if n >= 100 => 0.15,
        n if n >= 50 => 0.05,
        _ => 0.0,
    };
    if a.volatility < 0.10 {
        c += 0.20;
    } else if a.volatility < 0.20 {
        c += 0.10;
    } else if a.volatility > 0.40 {
        c -= 0.15;
    }
    if a.time_span_hours >= 168.0 {
        c += 0.05;
    }
    f64::clamp(c, 0.10, 0.95)
}

/// Cheapest weekday/hour slot as a two-hour window. Needs at least two
/// slots; the earliest slot wins ties.
pub fn optimal_launch_window(a: &PriceAnalysis) -> Option<LaunchWindow> {
    if a.slot_pattern.len() < 2 {
        return None;
    }
    let mut slots: Vec<_> = a.slot_pattern.iter().collect();
    slots.sort_by_key(|s| (s.weekday.num_days_from_monday(), s.hour));
    let best = slots
        .into_iter()
        .reduce(|best, s| if s.avg_price < best.avg_price { s } else { best })?;

    Some(LaunchWindow {
        weekday: best.weekday,
        start_hour: best.hour,
        end_hour: (best.hour + LAUNCH_WINDOW_HOURS) % 24,
        avg_price: best.avg_price,
    })
}
