use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::profile::ModelData;

/// A Gamma arrival process, parameterized by rate and coefficient of
/// variation. `cv = 1.0` degenerates to a Poisson process. This is the
/// external workload module's contract (§6); the real generator lives
/// outside this crate's scope, so this stands in for it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GammaProcess {
    pub rate: f64,
    pub cv: f64,
}

impl fmt::Display for GammaProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GammaProcess(rate={},cv={})", self.rate, self.cv)
    }
}

impl FromStr for GammaProcess {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let inner = s
            .strip_prefix("GammaProcess(")
            .and_then(|s| s.strip_suffix(')'))
            .ok_or_else(|| format!("not a GammaProcess literal: {s}"))?;

        let mut rate = None;
        let mut cv = None;
        for part in inner.split(',') {
            let (key, value) = part
                .split_once('=')
                .ok_or_else(|| format!("malformed field: {part}"))?;
            let value: f64 = value
                .parse()
                .map_err(|_| format!("not a number: {value}"))?;
            match key {
                "rate" => rate = Some(value),
                "cv" => cv = Some(value),
                other => return Err(format!("unknown field: {other}")),
            }
        }

        Ok(GammaProcess {
            rate: rate.ok_or("missing rate")?,
            cv: cv.ok_or("missing cv")?,
        })
    }
}

/// Per-model arrival processes driving the training/evaluation workload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Workload {
    pub processes: Vec<(String, GammaProcess)>,
}

impl Workload {
    pub fn rate_for(&self, model_name: &str) -> Option<f64> {
        self.processes
            .iter()
            .find(|(name, _)| name == model_name)
            .map(|(_, p)| p.rate)
    }
}

/// Default workload generator (§6): one Gamma process per model, rate taken
/// from the model's own `request_rate` and `cv = 1.0` (Poisson arrivals).
pub fn gen_train_workload(model_datas: &[ModelData]) -> Workload {
    Workload {
        processes: model_datas
            .iter()
            .map(|m| {
                (
                    m.name.clone(),
                    GammaProcess {
                        rate: m.request_rate,
                        cv: 1.0,
                    },
                )
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gamma_process_round_trips_through_tsv_format() {
        let p = GammaProcess { rate: 12.5, cv: 1.3 };
        let text = p.to_string();
        let parsed: GammaProcess = text.parse().unwrap();
        assert_eq!(parsed.rate, p.rate);
        assert_eq!(parsed.cv, p.cv);
    }

    #[test]
    fn gen_train_workload_uses_model_rates() {
        let models = vec![ModelData {
            name: "m0".into(),
            request_rate: 3.0,
            slo_seconds: 1.0,
            profile: Default::default(),
        }];
        let wl = gen_train_workload(&models);
        assert_eq!(wl.rate_for("m0"), Some(3.0));
        assert_eq!(wl.rate_for("missing"), None);
    }
}
