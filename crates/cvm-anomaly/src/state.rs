//! Per-address rolling windows backing the detectors in `detectors.rs`.

use std::collections::VecDeque;

#[derive(Debug, Default)]
pub struct AddressWindow {
    pub reputation: VecDeque<f64>,
    pub response_times_ms: VecDeque<f64>,
    pub votes: VecDeque<bool>,
    pub confidences: VecDeque<f64>,
}

impl AddressWindow {
    pub fn push_bounded<T>(deque: &mut VecDeque<T>, value: T, bound: usize) {
        deque.push_back(value);
        while deque.len() > bound {
            deque.pop_front();
        }
    }
}

pub fn mean(values: &VecDeque<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub fn std_dev(values: &VecDeque<f64>, mean_value: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean_value).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

pub fn coefficient_of_variation(values: &VecDeque<f64>) -> f64 {
    let m = mean(values);
    if m == 0.0 {
        return 0.0;
    }
    std_dev(values, m) / m
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_and_std_dev_of_constant_series_is_zero_spread() {
        let mut v = VecDeque::new();
        for _ in 0..5 {
            v.push_back(10.0);
        }
        let m = mean(&v);
        assert_eq!(m, 10.0);
        assert_eq!(std_dev(&v, m), 0.0);
    }
}
