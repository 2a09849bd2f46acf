//! C11 — reputation/voting/timing anomaly detectors and alert bookkeeping.

use crate::state::{coefficient_of_variation, mean, std_dev, AddressWindow};
use cvm_core::config::AnomalyConfig;
use cvm_core::Address;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::warn;

const MAX_ALERTS: usize = 1_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnomalyKind {
    ReputationSpike,
    ReputationDrop,
    ReputationOscillation,
    SlowResponse,
    ErraticTiming,
    VoteBias,
    CoordinatedVoting,
    SybilCluster,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyAlert {
    pub id: u64,
    pub kind: AnomalyKind,
    /// The address the anomaly is primarily attributed to.
    pub primary_address: Address,
    /// Any other addresses implicated alongside the primary one (e.g. the
    /// rest of a coordinated-voting or sybil cluster).
    pub related_addresses: Vec<Address>,
    /// How far past its triggering threshold the observation sits, in
    /// `[0, 1]`. `0` at the threshold, `1` at or beyond twice the
    /// threshold.
    pub severity: f64,
    /// How much statistical weight backs the observation, in `[0, 1]`,
    /// scaled by how many samples fed the detector relative to its
    /// configured minimum.
    pub confidence: f64,
    pub evidence: Vec<String>,
    pub block_height: u64,
    pub acknowledged: bool,
    pub resolved: bool,
}

/// `0` at `value == threshold`, rising to `1` at `value >= 2*threshold`.
/// Gives every detector a common severity scale despite comparing
/// unrelated units (z-scores, fractions, coefficients of variation).
fn severity_from_ratio(value: f64, threshold: f64) -> f64 {
    if threshold <= 0.0 {
        return 1.0;
    }
    (value / threshold - 1.0).clamp(0.0, 1.0)
}

/// How many samples backed the decision relative to the detector's
/// configured minimum, capped at full confidence once that minimum is met.
fn confidence_from_samples(sample_count: usize, min_samples: usize) -> f64 {
    if min_samples == 0 {
        return 1.0;
    }
    (sample_count as f64 / min_samples as f64).min(1.0)
}

pub struct AnomalyDetector {
    windows: RwLock<HashMap<Address, AddressWindow>>,
    alerts: RwLock<Vec<AnomalyAlert>>,
    next_alert_id: RwLock<u64>,
    pub config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        Self {
            windows: RwLock::new(HashMap::new()),
            alerts: RwLock::new(Vec::new()),
            next_alert_id: RwLock::new(0),
            config,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn raise(
        &self,
        kind: AnomalyKind,
        primary_address: Address,
        related_addresses: Vec<Address>,
        severity: f64,
        confidence: f64,
        evidence: Vec<String>,
        block_height: u64,
    ) {
        let mut id_guard = self.next_alert_id.write();
        let id = *id_guard;
        *id_guard += 1;
        drop(id_guard);

        warn!(alert_id = id, kind = ?kind, severity, confidence, "anomaly alert raised");
        let mut alerts = self.alerts.write();
        alerts.push(AnomalyAlert {
            id,
            kind,
            primary_address,
            related_addresses,
            severity,
            confidence,
            evidence,
            block_height,
            acknowledged: false,
            resolved: false,
        });
        while alerts.len() > MAX_ALERTS {
            alerts.remove(0);
        }
    }

    pub fn alerts(&self) -> Vec<AnomalyAlert> {
        self.alerts.read().clone()
    }

    /// Marks an alert as seen by an operator without closing it out.
    pub fn acknowledge(&self, alert_id: u64) -> bool {
        let mut alerts = self.alerts.write();
        match alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => {
                alert.acknowledged = true;
                true
            }
            None => false,
        }
    }

    /// Marks an alert as closed out, e.g. once the underlying condition
    /// has been investigated and addressed.
    pub fn resolve(&self, alert_id: u64) -> bool {
        let mut alerts = self.alerts.write();
        match alerts.iter_mut().find(|a| a.id == alert_id) {
            Some(alert) => {
                alert.resolved = true;
                true
            }
            None => false,
        }
    }

    /// Feeds a new reputation observation into `address`'s window and
    /// runs the reputation-spike, -drop, and -oscillation detectors.
    pub fn update_reputation(&self, address: Address, score: f64, block_height: u64) {
        let mut windows = self.windows.write();
        let window = windows.entry(address).or_default();
        AddressWindow::push_bounded(&mut window.reputation, score, self.config.window_size);
        let series: VecDeque<f64> = window.reputation.clone();
        drop(windows);

        if series.len() < 3 {
            return;
        }
        let m = mean(&series);
        let sd = std_dev(&series, m);
        if sd > 0.0 {
            let z = (score - m) / sd;
            if z > self.config.spike_z_threshold {
                self.raise(
                    AnomalyKind::ReputationSpike,
                    address,
                    Vec::new(),
                    severity_from_ratio(z, self.config.spike_z_threshold),
                    confidence_from_samples(series.len(), 3),
                    vec![format!("z-score {:.2}", z), format!("window mean {:.2}, stdev {:.2}", m, sd)],
                    block_height,
                );
            } else if z < -self.config.drop_z_threshold {
                self.raise(
                    AnomalyKind::ReputationDrop,
                    address,
                    Vec::new(),
                    severity_from_ratio(-z, self.config.drop_z_threshold),
                    confidence_from_samples(series.len(), 3),
                    vec![format!("z-score {:.2}", z), format!("window mean {:.2}, stdev {:.2}", m, sd)],
                    block_height,
                );
            }
        }

        let deltas: Vec<f64> = series.iter().zip(series.iter().skip(1)).map(|(a, b)| b - a).collect();
        if deltas.len() >= 2 {
            let sign_changes = deltas.windows(2).filter(|w| (w[0] > 0.0) != (w[1] > 0.0)).count();
            let fraction = sign_changes as f64 / (deltas.len() - 1) as f64;
            if fraction > self.config.oscillation_threshold {
                self.raise(
                    AnomalyKind::ReputationOscillation,
                    address,
                    Vec::new(),
                    severity_from_ratio(fraction, self.config.oscillation_threshold),
                    confidence_from_samples(deltas.len(), 3),
                    vec![format!("sign-change fraction {:.2}", fraction)],
                    block_height,
                );
            }
        }
    }

    pub fn record_response_time(&self, address: Address, ms: f64, slow_threshold_ms: f64, block_height: u64) {
        let mut windows = self.windows.write();
        let window = windows.entry(address).or_default();
        AddressWindow::push_bounded(&mut window.response_times_ms, ms, self.config.window_size);
        let series = window.response_times_ms.clone();
        drop(windows);

        if series.is_empty() {
            return;
        }
        let slow_count = series.iter().filter(|&&t| t > slow_threshold_ms).count();
        let fraction = slow_count as f64 / series.len() as f64;
        if fraction > self.config.slow_response_fraction {
            self.raise(
                AnomalyKind::SlowResponse,
                address,
                Vec::new(),
                severity_from_ratio(fraction, self.config.slow_response_fraction),
                confidence_from_samples(series.len(), 1),
                vec![format!("slow fraction {:.2}", fraction)],
                block_height,
            );
        }

        let cv = coefficient_of_variation(&series);
        if cv > self.config.erratic_cv_threshold {
            self.raise(
                AnomalyKind::ErraticTiming,
                address,
                Vec::new(),
                severity_from_ratio(cv, self.config.erratic_cv_threshold),
                confidence_from_samples(series.len(), 1),
                vec![format!("coefficient of variation {:.2}", cv)],
                block_height,
            );
        }
    }

    pub fn record_vote(&self, address: Address, accept: bool, block_height: u64) {
        let mut windows = self.windows.write();
        let window = windows.entry(address).or_default();
        AddressWindow::push_bounded(&mut window.votes, accept, self.config.window_size);
        let votes = window.votes.clone();
        drop(windows);

        if votes.len() < self.config.vote_bias_min_samples {
            return;
        }
        let accept_rate = votes.iter().filter(|&&v| v).count() as f64 / votes.len() as f64;
        let reject_rate = 1.0 - accept_rate;
        let bias = accept_rate.max(reject_rate);
        if bias > self.config.vote_bias_threshold {
            self.raise(
                AnomalyKind::VoteBias,
                address,
                Vec::new(),
                severity_from_ratio(bias, self.config.vote_bias_threshold),
                confidence_from_samples(votes.len(), self.config.vote_bias_min_samples),
                vec![format!("accept_rate {:.2}", accept_rate), format!("sample size {}", votes.len())],
                block_height,
            );
        }
    }

    /// `responses`: `(address, vote, timestamp_ms)` for every validator
    /// response seen for one transaction.
    pub fn check_coordinated_voting(&self, responses: &[(Address, bool, i64)], block_height: u64) {
        if responses.len() < self.config.coordination_min_responses {
            return;
        }
        let accept_count = responses.iter().filter(|(_, v, _)| *v).count();
        let reject_count = responses.len() - accept_count;
        let majority = accept_count.max(reject_count);
        let fraction = majority as f64 / responses.len() as f64;

        let min_ts = responses.iter().map(|(_, _, t)| *t).min().unwrap();
        let max_ts = responses.iter().map(|(_, _, t)| *t).max().unwrap();
        let span = max_ts - min_ts;

        if fraction >= self.config.coordination_threshold && span < self.config.coordination_window_ms {
            let addresses: Vec<Address> = responses.iter().map(|(a, _, _)| *a).collect();
            let (primary, related) = addresses.split_first().expect("responses is non-empty here");
            self.raise(
                AnomalyKind::CoordinatedVoting,
                *primary,
                related.to_vec(),
                severity_from_ratio(fraction, self.config.coordination_threshold),
                confidence_from_samples(responses.len(), self.config.coordination_min_responses),
                vec![format!("{:.2} identical within {}ms", fraction, span)],
                block_height,
            );
        }
    }

    /// `rates`: per-address `(accept_rate, reject_rate)` over the same
    /// observation window, e.g. derived from each address's vote window.
    pub fn check_sybil_cluster(&self, rates: &HashMap<Address, (f64, f64)>, block_height: u64) {
        let addrs: Vec<Address> = rates.keys().copied().collect();
        if addrs.len() < self.config.sybil_min_cluster_size {
            return;
        }
        let mut total_pairs = 0usize;
        let mut close_pairs = 0usize;
        for i in 0..addrs.len() {
            for j in (i + 1)..addrs.len() {
                total_pairs += 1;
                let (a_accept, a_reject) = rates[&addrs[i]];
                let (b_accept, b_reject) = rates[&addrs[j]];
                if (a_accept - b_accept).abs() < self.config.sybil_rate_tolerance
                    && (a_reject - b_reject).abs() < self.config.sybil_rate_tolerance
                {
                    close_pairs += 1;
                }
            }
        }
        if total_pairs == 0 {
            return;
        }
        let fraction = close_pairs as f64 / total_pairs as f64;
        if fraction > self.config.sybil_pair_fraction {
            let (primary, related) = addrs.split_first().expect("addrs is non-empty here");
            self.raise(
                AnomalyKind::SybilCluster,
                *primary,
                related.to_vec(),
                severity_from_ratio(fraction, self.config.sybil_pair_fraction),
                confidence_from_samples(total_pairs, self.config.sybil_min_cluster_size),
                vec![format!("{:.2} of pairs within tolerance", fraction)],
                block_height,
            );
        }
    }
}
