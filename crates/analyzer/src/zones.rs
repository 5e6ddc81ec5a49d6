//! Availability zone ranking.

use chrono::Utc;
use common::{PriceAnalysis, SpotData, ZoneInfo, ZoneRecommendation, ZoneRecommendationResult};
use std::cmp::Ordering;

/// Capacity assumed for an available zone that reports none.
const DEFAULT_CAPACITY: f64 = 50.0;

/// Everything known about one zone before ranking.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ZoneSignal {
    pub zone: String,
    pub avg_price: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub volatility: f64,
    /// `None` when nothing was reported about availability.
    pub available: Option<bool>,
    pub restricted: bool,
    pub capacity_score: Option<f64>,
    pub price_predicted: bool,
}

impl ZoneSignal {
    /// Zone with a single known price and no availability data.
    pub fn priced(zone: impl Into<String>, price: f64) -> Self {
        Self {
            zone: zone.into(),
            avg_price: price,
            min_price: price,
            max_price: price,
            ..Self::default()
        }
    }

    fn has_availability_data(&self) -> bool {
        self.available.is_some() || self.restricted || self.capacity_score.is_some()
    }

    fn composite(&self) -> f64 {
        match (self.available.unwrap_or(true), self.restricted) {
            (false, _) => 0.0,
            (true, true) => 0.5,
            (true, false) => 1.0 + self.capacity_score.unwrap_or(DEFAULT_CAPACITY) / 100.0,
        }
    }
}

/// Rank zones from best to worst with dense ranks from 1.
///
/// Without any availability or capacity data the cheapest zone wins;
/// otherwise zones are ordered by availability composite. Ties go to the
/// zone name.
pub fn rank_zones(signals: Vec<ZoneSignal>) -> Vec<ZoneRecommendation> {
    let cost_only = !signals.iter().any(ZoneSignal::has_availability_data);

    let mut scored: Vec<(f64, ZoneSignal)> = signals
        .into_iter()
        .map(|s| (if cost_only { s.avg_price } else { s.composite() }, s))
        .collect();

    scored.sort_by(|(sa, a), (sb, b)| {
        let by_score = if cost_only {
            sa.partial_cmp(sb)
        } else {
            sb.partial_cmp(sa)
        };
        by_score
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.zone.cmp(&b.zone))
    });

    scored
        .into_iter()
        .enumerate()
        .map(|(i, (score, s))| ZoneRecommendation {
            zone: s.zone,
            avg_price: s.avg_price,
            min_price: s.min_price,
            max_price: s.max_price,
            volatility: s.volatility,
            rank: i + 1,
            score,
            available: s.available.unwrap_or(true),
            restricted: s.restricted,
            capacity_score: s.capacity_score,
            price_predicted: s.price_predicted,
        })
        .collect()
}

/// `(max - min) / min * 100` over the ranked average prices. Needs more than
/// one zone and a positive minimum.
pub fn price_differential(ranked: &[ZoneRecommendation]) -> Option<f64> {
    if ranked.len() < 2 {
        return None;
    }
    let (min, max) = crate::history::min_max(
        &ranked.iter().map(|z| z.avg_price).collect::<Vec<_>>(),
    );
    (min > 0.0).then(|| (max - min) / min * 100.0)
}

/// Zones assumed for a region when nothing better is known.
pub fn default_zones(provider: &str, region: &str) -> Vec<String> {
    if provider == "azure" {
        (1..=3).map(|n| format!("{region}-{n}")).collect()
    } else {
        ["a", "b", "c"].iter().map(|s| format!("{region}{s}")).collect()
    }
}

// ── Recommendation assembly ───────────────────────────────────────────

/// Inputs gathered by the caller for one zone recommendation.
#[derive(Debug, Clone, Default)]
pub struct ZoneInputs<'a> {
    pub provider: &'a str,
    pub region: &'a str,
    pub instance_type: &'a str,
    /// Reported by a zone provider; `None` when none answered.
    pub availability: Option<Vec<ZoneInfo>>,
    pub analysis: Option<&'a PriceAnalysis>,
    pub spot: Option<&'a SpotData>,
    /// Zones to return; 0 returns all.
    pub limit: usize,
}

pub fn recommend(inputs: ZoneInputs<'_>) -> ZoneRecommendationResult {
    let mut data_sources = Vec::new();
    let analysis = inputs.analysis.filter(|a| a.data_points > 0);

    let availability = inputs.availability.filter(|z| !z.is_empty());
    let has_zone_data = availability.is_some();
    let infos: Vec<ZoneInfo> = match availability {
        Some(zones) => {
            data_sources.push("zone_availability".to_string());
            zones
        }
        None => {
            let names: Vec<String> = match analysis.filter(|a| !a.zones.is_empty()) {
                Some(a) => a.zones.iter().map(|z| z.zone.clone()).collect(),
                None => {
                    data_sources.push("default_zones".to_string());
                    default_zones(inputs.provider, inputs.region)
                }
            };
            names
                .into_iter()
                .map(|zone| ZoneInfo {
                    zone,
                    available: true,
                    restricted: false,
                    restriction_reason: None,
                    capacity_score: None,
                })
                .collect()
        }
    };

    if analysis.is_some() {
        data_sources.push("price_history".to_string());
    }

    let fallback_price = inputs
        .spot
        .map(|s| s.spot_price)
        .filter(|&p| p > 0.0)
        .or_else(|| analysis.map(|a| a.avg_price));
    let mut used_spot_price = false;

    let signals: Vec<ZoneSignal> = infos
        .into_iter()
        .map(|info| {
            let measured = analysis.and_then(|a| a.zones.iter().find(|z| z.zone == info.zone));
            let mut signal = match measured {
                Some(z) => ZoneSignal {
                    zone: info.zone.clone(),
                    avg_price: z.avg_price,
                    min_price: z.min_price,
                    max_price: z.max_price,
                    volatility: z.volatility,
                    ..ZoneSignal::default()
                },
                None => {
                    used_spot_price |= inputs.spot.is_some_and(|s| s.spot_price > 0.0);
                    ZoneSignal {
                        volatility: analysis.map_or(0.0, |a| a.volatility),
                        price_predicted: true,
                        ..ZoneSignal::priced(info.zone.clone(), fallback_price.unwrap_or(0.0))
                    }
                }
            };
            if has_zone_data {
                signal.available = Some(info.available);
                signal.restricted = info.restricted;
                signal.capacity_score = info.capacity_score;
            }
            signal
        })
        .collect();

    if used_spot_price {
        data_sources.push("spot_data".to_string());
    }

    let predicted = signals.iter().filter(|s| s.price_predicted).count();
    let predicted_share = if signals.is_empty() {
        0.0
    } else {
        predicted as f64 / signals.len() as f64
    };

    let mut ranked = rank_zones(signals);
    let differential = price_differential(&ranked);
    let confidence = zone_confidence(has_zone_data, analysis.is_some(), predicted_share);

    let insights = zone_insights(&ranked, differential, confidence);
    if inputs.limit > 0 {
        ranked.truncate(inputs.limit);
    }

    ZoneRecommendationResult {
        instance_type: inputs.instance_type.to_string(),
        region: inputs.region.to_string(),
        best_zone: ranked.first().map(|z| z.zone.clone()),
        next_best_zone: ranked.get(1).map(|z| z.zone.clone()),
        recommendations: ranked,
        price_differential: differential,
        insights,
        confidence,
        data_sources,
        generated_at: Utc::now(),
    }
}

fn zone_confidence(has_zone_data: bool, has_history: bool, predicted_share: f64) -> f64 {
    let mut c = 0.3;
    if has_zone_data {
        c += 0.25;
    }
    if has_history {
        c += 0.25;
    }
    c -= 0.2 * predicted_share;
    f64::clamp(c, 0.1, 1.0)
}

fn zone_insights(ranked: &[ZoneRecommendation], differential: Option<f64>, confidence: f64) -> Vec<String> {
    let mut out = Vec::new();
    let Some(best) = ranked.first() else {
        out.push("No availability zones found for this instance type".into());
        return out;
    };

    out.push(format!("Best zone: {} (avg ${:.4}/hr)", best.zone, best.avg_price));

    if let Some(diff) = differential.filter(|&d| d > 10.0) {
        let priciest = ranked
            .iter()
            .max_by(|a, b| a.avg_price.partial_cmp(&b.avg_price).unwrap_or(Ordering::Equal));
        if let Some(worst) = priciest.filter(|w| w.zone != best.zone) {
            out.push(format!("Save {diff:.1}% by choosing {} over {}", best.zone, worst.zone));
        }
    }

    if best.volatility < 0.1 {
        out.push(format!("{} has stable pricing", best.zone));
    } else if best.volatility > 0.3 {
        out.push(format!("{} has volatile pricing, keep a backup zone", best.zone));
    }

    if let Some(backup) = ranked.get(1) {
        out.push(format!("Backup zone: {}", backup.zone));
    }

    if confidence < 0.5 {
        out.push("Low confidence: zone prices are partly estimated".into());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ZoneStats;
    use std::collections::BTreeMap;

    fn zones(ranked: &[ZoneRecommendation]) -> Vec<&str> {
        ranked.iter().map(|z| z.zone.as_str()).collect()
    }

    // ── ranking ──

    #[test]
    fn test_cost_only_ranking() {
        let ranked = rank_zones(vec![
            ZoneSignal::priced("a", 0.10),
            ZoneSignal::priced("b", 0.08),
            ZoneSignal::priced("c", 0.12),
        ]);
        assert_eq!(zones(&ranked), vec!["b", "a", "c"]);
        assert_eq!(ranked.iter().map(|z| z.rank).collect::<Vec<_>>(), vec![1, 2, 3]);

        let diff = price_differential(&ranked).expect("three zones");
        assert!((diff - 50.0).abs() < 1e-9, "got {diff}");
    }

    #[test]
    fn test_composite_ranking() {
        let signal = |zone: &str, price: f64, available: bool, restricted: bool, cap: Option<f64>| ZoneSignal {
            available: Some(available),
            restricted,
            capacity_score: cap,
            ..ZoneSignal::priced(zone, price)
        };
        let ranked = rank_zones(vec![
            signal("z-down", 0.01, false, false, Some(90.0)),
            signal("z-restricted", 0.02, true, true, None),
            signal("z-default", 0.30, true, false, None),
            signal("z-roomy", 0.50, true, false, Some(80.0)),
        ]);
        assert_eq!(zones(&ranked), vec!["z-roomy", "z-default", "z-restricted", "z-down"]);
        assert!((ranked[1].score - 1.5).abs() < 1e-9, "missing capacity defaults to 50");
        assert_eq!(ranked[3].score, 0.0);
        assert!(!ranked[3].available);
    }

    #[test]
    fn test_ties_break_by_zone_name() {
        let ranked = rank_zones(vec![ZoneSignal::priced("b", 0.1), ZoneSignal::priced("a", 0.1)]);
        assert_eq!(zones(&ranked), vec!["a", "b"]);
    }

    #[test]
    fn test_differential_edge_cases() {
        assert!(price_differential(&rank_zones(vec![ZoneSignal::priced("a", 0.1)])).is_none());
        let free = rank_zones(vec![ZoneSignal::priced("a", 0.0), ZoneSignal::priced("b", 0.1)]);
        assert!(price_differential(&free).is_none(), "zero minimum has no differential");
    }

    #[test]
    fn test_default_zones() {
        assert_eq!(default_zones("aws", "us-east-1"), vec!["us-east-1a", "us-east-1b", "us-east-1c"]);
        assert_eq!(default_zones("azure", "eastus"), vec!["eastus-1", "eastus-2", "eastus-3"]);
    }

    // ── assembly ──

    fn analysis_with_zones() -> PriceAnalysis {
        let zone = |name: &str, avg: f64| ZoneStats {
            zone: name.into(),
            avg_price: avg,
            min_price: avg,
            max_price: avg,
            volatility: 0.02,
            data_points: 10,
        };
        PriceAnalysis {
            instance_type: "m5.large".into(),
            best_zone: Some("us-east-1b".into()),
            current_price: 0.09,
            avg_price: 0.09,
            min_price: 0.08,
            max_price: 0.10,
            std_dev: 0.01,
            volatility: 0.05,
            trend_slope: 0.0,
            trend_score: 0.0,
            data_points: 20,
            time_span_hours: 48.0,
            hourly_pattern: BTreeMap::new(),
            weekday_pattern: BTreeMap::new(),
            slot_pattern: Vec::new(),
            zones: vec![zone("us-east-1a", 0.10), zone("us-east-1b", 0.08)],
        }
    }

    #[test]
    fn test_recommend_without_any_data_uses_defaults() {
        let result = recommend(ZoneInputs {
            provider: "aws",
            region: "us-east-1",
            instance_type: "m5.large",
            ..ZoneInputs::default()
        });
        assert_eq!(result.recommendations.len(), 3);
        assert!(result.recommendations.iter().all(|z| z.price_predicted));
        assert_eq!(result.data_sources, vec!["default_zones".to_string()]);
        assert!((result.confidence - 0.1).abs() < 1e-9, "0.3 - 0.2 clamps to 0.1");
        assert_eq!(result.best_zone.as_deref(), Some("us-east-1a"));
    }

    #[test]
    fn test_recommend_fills_missing_zone_prices() {
        let a = analysis_with_zones();
        let availability = vec![
            ZoneInfo {
                zone: "us-east-1a".into(),
                available: true,
                restricted: false,
                restriction_reason: None,
                capacity_score: Some(60.0),
            },
            ZoneInfo {
                zone: "us-east-1b".into(),
                available: true,
                restricted: false,
                restriction_reason: None,
                capacity_score: Some(90.0),
            },
            ZoneInfo {
                zone: "us-east-1d".into(),
                available: true,
                restricted: true,
                restriction_reason: Some("NotAvailableForSubscription".into()),
                capacity_score: None,
            },
        ];
        let result = recommend(ZoneInputs {
            provider: "aws",
            region: "us-east-1",
            instance_type: "m5.large",
            availability: Some(availability),
            analysis: Some(&a),
            spot: None,
            limit: 0,
        });

        let names: Vec<_> = result.recommendations.iter().map(|z| z.zone.as_str()).collect();
        assert_eq!(names, vec!["us-east-1b", "us-east-1a", "us-east-1d"]);
        let d = &result.recommendations[2];
        assert!(d.price_predicted && d.restricted);
        assert_eq!(d.avg_price, 0.09, "estimated from the analysis average");
        assert_eq!(result.next_best_zone.as_deref(), Some("us-east-1a"));
        // 0.3 + 0.25 + 0.25 - 0.2 / 3
        assert!((result.confidence - (0.8 - 0.2 / 3.0)).abs() < 1e-9);
        assert!(result.insights.iter().any(|i| i.starts_with("Save 25.0%")));
    }

    #[test]
    fn test_recommend_uses_history_zones_and_limit() {
        let a = analysis_with_zones();
        let result = recommend(ZoneInputs {
            provider: "aws",
            region: "us-east-1",
            instance_type: "m5.large",
            analysis: Some(&a),
            limit: 1,
            ..ZoneInputs::default()
        });
        assert_eq!(result.recommendations.len(), 1);
        assert_eq!(result.best_zone.as_deref(), Some("us-east-1b"));
        assert!(result.next_best_zone.is_none());
        assert_eq!(result.data_sources, vec!["price_history".to_string()]);
        assert!(result.recommendations.iter().all(|z| !z.price_predicted));
    }
}
