//! Benchmark-harness-compatible TSV persistence (§6 "Persisted outputs").
//! The planner itself never writes state; this is a convenience used by the
//! demo binary and by tests exercising the round-trip property of §8.

use std::io::Write;

use crate::workload::GammaProcess;

#[derive(Debug, Clone, PartialEq)]
pub struct TsvRow {
    pub policy_name: String,
    pub slo: f64,
    pub goodput: f64,
    pub arrival_process: GammaProcess,
}

pub fn write_tsv_row<W: Write>(mut out: W, row: &TsvRow) -> std::io::Result<()> {
    writeln!(
        out,
        "{}\t{}\t{}\t{}",
        row.policy_name, row.slo, row.goodput, row.arrival_process
    )
}

pub fn write_tsv_header<W: Write>(mut out: W) -> std::io::Result<()> {
    writeln!(out, "policy_name\tslo\tgoodput\tarrival_process")
}

#[derive(Debug, thiserror::Error)]
pub enum TsvParseError {
    #[error("expected 4 tab-separated columns, got {0}")]
    WrongColumnCount(usize),
    #[error("bad numeric field: {0}")]
    BadNumber(String),
    #[error("bad arrival process field: {0}")]
    BadArrivalProcess(String),
}

pub fn parse_tsv_row(line: &str) -> std::result::Result<TsvRow, TsvParseError> {
    let cols: Vec<&str> = line.split('\t').collect();
    if cols.len() != 4 {
        return Err(TsvParseError::WrongColumnCount(cols.len()));
    }
    let slo: f64 = cols[1].parse().map_err(|_| TsvParseError::BadNumber(cols[1].to_string()))?;
    let goodput: f64 = cols[2].parse().map_err(|_| TsvParseError::BadNumber(cols[2].to_string()))?;
    let arrival_process: GammaProcess = cols[3]
        .parse()
        .map_err(|_| TsvParseError::BadArrivalProcess(cols[3].to_string()))?;
    Ok(TsvRow {
        policy_name: cols[0].to_string(),
        slo,
        goodput,
        arrival_process,
    })
}
