//! Statistics over a window of spot price samples.

use chrono::{Datelike, Timelike, Weekday};
use common::{PatternSlot, PriceAnalysis, PriceSample, ZoneStats};
use std::collections::BTreeMap;

const SECS_PER_HOUR: f64 = 3600.0;

/// Summarize `samples` for one instance type.
///
/// Non-positive and non-finite prices are ignored. Returns `None` when no
/// usable sample remains.
pub fn analyze(instance_type: &str, samples: &[PriceSample]) -> Option<PriceAnalysis> {
    let mut usable: Vec<&PriceSample> = samples
        .iter()
        .filter(|s| s.price.is_finite() && s.price > 0.0)
        .collect();
    if usable.is_empty() {
        return None;
    }
    usable.sort_by_key(|s| s.timestamp);

    let first = usable[0].timestamp;
    let last = usable[usable.len() - 1].timestamp;
    let prices: Vec<f64> = usable.iter().map(|s| s.price).collect();
    let hours: Vec<f64> = usable
        .iter()
        .map(|s| (s.timestamp - first).num_milliseconds() as f64 / 1000.0 / SECS_PER_HOUR)
        .collect();

    let avg_price = mean(&prices);
    let std_dev = sample_std_dev(&prices);
    let (min_price, max_price) = min_max(&prices);
    let volatility = if avg_price > 0.0 { std_dev / avg_price } else { 0.0 };

    let trend_slope = least_squares_slope(&hours, &prices);
    let trend_score = if avg_price > 0.0 {
        (trend_slope / avg_price * 100.0).clamp(-1.0, 1.0)
    } else {
        0.0
    };

    let mut by_hour: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    let mut by_weekday: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    let mut by_slot: BTreeMap<(u32, u32), (Weekday, Vec<f64>)> = BTreeMap::new();
    for s in &usable {
        let hour = s.timestamp.hour();
        let weekday = s.timestamp.weekday();
        let day = weekday.num_days_from_monday();
        by_hour.entry(hour).or_default().push(s.price);
        by_weekday.entry(day).or_default().push(s.price);
        by_slot
            .entry((day, hour))
            .or_insert_with(|| (weekday, Vec::new()))
            .1
            .push(s.price);
    }

    let slot_pattern = by_slot
        .into_iter()
        .map(|((_, hour), (weekday, vals))| PatternSlot {
            weekday,
            hour,
            avg_price: mean(&vals),
            samples: vals.len(),
        })
        .collect();

    let zones = zone_stats(&usable);
    let best_zone = zones
        .iter()
        .fold(None::<&ZoneStats>, |best, z| match best {
            Some(b) if b.avg_price <= z.avg_price => Some(b),
            _ => Some(z),
        })
        .map(|z| z.zone.clone());

    Some(PriceAnalysis {
        instance_type: instance_type.to_string(),
        best_zone,
        current_price: prices[prices.len() - 1],
        avg_price,
        min_price,
        max_price,
        std_dev,
        volatility,
        trend_slope,
        trend_score,
        data_points: prices.len(),
        time_span_hours: (last - first).num_milliseconds() as f64 / 1000.0 / SECS_PER_HOUR,
        hourly_pattern: averages(by_hour),
        weekday_pattern: averages(by_weekday),
        slot_pattern,
        zones,
    })
}

/// Per-zone statistics, sorted by zone name. Samples without a zone are
/// skipped.
fn zone_stats(samples: &[&PriceSample]) -> Vec<ZoneStats> {
    let mut by_zone: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for s in samples {
        if let Some(zone) = s.zone.as_deref() {
            by_zone.entry(zone).or_default().push(s.price);
        }
    }

    by_zone
        .into_iter()
        .map(|(zone, vals)| {
            let avg = mean(&vals);
            let (min, max) = min_max(&vals);
            ZoneStats {
                zone: zone.to_string(),
                avg_price: avg,
                min_price: min,
                max_price: max,
                volatility: if avg > 0.0 { sample_std_dev(&vals) / avg } else { 0.0 },
                data_points: vals.len(),
            }
        })
        .collect()
}

fn averages(groups: BTreeMap<u32, Vec<f64>>) -> BTreeMap<u32, f64> {
    groups.into_iter().map(|(k, v)| (k, mean(&v))).collect()
}

// ── Basic statistics ──────────────────────────────────────────────────

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1); 0 below two values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let avg = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - avg).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Population coefficient of variation; 0 for empty input or a zero mean.
pub fn coefficient_of_variation(values: &[f64]) -> f64 {
    let avg = mean(values);
    if values.is_empty() || avg <= 0.0 {
        return 0.0;
    }
    let var = values.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt() / avg
}

pub fn min_max(values: &[f64]) -> (f64, f64) {
    let mut it = values.iter().copied();
    let Some(first) = it.next() else {
        return (0.0, 0.0);
    };
    it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

/// Ordinary least-squares slope of `ys` over `xs`. Zero when the x values
/// do not span at least two distinct points.
pub fn least_squares_slope(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return 0.0;
    }
    let nf = n as f64;
    let (mut sx, mut sy, mut sxy, mut sxx) = (0.0, 0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys).take(n) {
        sx += x;
        sy += y;
        sxy += x * y;
        sxx += x * x;
    }
    let denom = nf * sxx - sx * sx;
    if denom.abs() < f64::EPSILON {
        return 0.0;
    }
    (nf * sxy - sx * sy) / denom
}
