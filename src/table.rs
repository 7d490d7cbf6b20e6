//! The cohort results table.
//!
//! One row per subject, sorted by identifier.  Columns:
//!
//! ```text
//! SUBJECT CLASS AGE SEX | NWINDOWS_<c>… | <ch>_<c>… | AVERAGE_<c>… | <c>_<band>…
//!   | per prompt epoch <e>: NPROMPTS_<e> | AVG_<e>_<band>… | <e>_<band>_<ch>…
//! ```
//!
//! Slopes and band powers that could not be computed are `NaN`, never `0`.
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::bands::{BandPowers, TRADITIONAL_BANDS};
use crate::config::PipelineConfig;
use crate::subject::Subject;

/// Rendered results, header plus string cells.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultTable {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Missing-value cell.
pub const MISSING: &str = "NaN";

fn cell(v: Option<f64>) -> String {
    match v {
        Some(x) if x.is_finite() => x.to_string(),
        _ => MISSING.to_string(),
    }
}

fn band_cells(bp: Option<&BandPowers>) -> Vec<String> {
    TRADITIONAL_BANDS.iter().map(|b| cell(bp.and_then(|p| p.get(b.name)))).collect()
}

impl ResultTable {
    /// Build the table for the conditions, channels and prompt epochs of
    /// `cfg`.
    ///
    /// When `cfg.channels` is empty the channels of every subject are used
    /// in order of first appearance.
    pub fn from_subjects(subjects: &[Subject], cfg: &PipelineConfig) -> Self {
        let conditions: Vec<&str> = cfg.taxonomy.names().collect();
        let epochs: Vec<&str> = cfg.prompt_epochs.iter().map(|e| e.name.as_str()).collect();
        let band_power = cfg.band_power;
        let channels: Vec<String> = if cfg.channels.is_empty() {
            let mut seen: Vec<String> = Vec::new();
            for ch in subjects.iter().flat_map(|s| &s.channels) {
                if !seen.contains(ch) {
                    seen.push(ch.clone());
                }
            }
            seen
        } else {
            cfg.channels.clone()
        };

        let mut header: Vec<String> = ["SUBJECT", "CLASS", "AGE", "SEX"].iter().map(|s| s.to_string()).collect();
        header.extend(conditions.iter().map(|c| format!("NWINDOWS_{}", c.to_uppercase())));
        for c in &conditions {
            header.extend(channels.iter().map(|ch| format!("{ch}_{}", c.to_uppercase())));
        }
        header.extend(conditions.iter().map(|c| format!("AVERAGE_{}", c.to_uppercase())));
        if band_power {
            for c in &conditions {
                header.extend(TRADITIONAL_BANDS.iter().map(|b| format!("{}_{}", c.to_uppercase(), b.name.to_uppercase())));
            }
        }
        for e in &epochs {
            let e = e.to_uppercase();
            header.push(format!("NPROMPTS_{e}"));
            header.extend(TRADITIONAL_BANDS.iter().map(|b| format!("AVG_{e}_{}", b.name.to_uppercase())));
            for b in &TRADITIONAL_BANDS {
                header.extend(channels.iter().map(|ch| format!("{e}_{}_{ch}", b.name.to_uppercase())));
            }
        }

        let mut sorted: Vec<&Subject> = subjects.iter().collect();
        sorted.sort_by(|a, b| a.name().cmp(b.name()));

        let rows = sorted
            .into_iter()
            .map(|s| {
                let m = &s.meta;
                let mut row = vec![m.name.clone(), m.group.clone(), m.age.clone(), m.sex.clone()];
                row.extend(conditions.iter().map(|c| match s.condition(c) {
                    Some(r) => r.n_windows.to_string(),
                    None => MISSING.to_string(),
                }));
                for c in &conditions {
                    let res = s.condition(c);
                    row.extend(channels.iter().map(|ch| {
                        let slope = res.and_then(|r| {
                            let idx = s.channels.iter().position(|x| x == ch)?;
                            r.channel_slope(idx)
                        });
                        cell(slope)
                    }));
                }
                row.extend(conditions.iter().map(|c| cell(s.condition(c).and_then(|r| r.mean_slope()))));
                if band_power {
                    for c in &conditions {
                        row.extend(band_cells(s.condition(c).and_then(|r| r.band_power.as_ref())));
                    }
                }
                for e in &epochs {
                    let res = s.prompt(e);
                    row.push(res.map_or_else(|| MISSING.to_string(), |r| r.n_prompts.to_string()));
                    row.extend(band_cells(res.and_then(|r| r.mean_bands.as_ref())));
                    for b in &TRADITIONAL_BANDS {
                        row.extend(channels.iter().map(|ch| {
                            let v = res.and_then(|r| {
                                let idx = s.channels.iter().position(|x| x == ch)?;
                                r.channel_bands.get(idx)?.as_ref()?.get(b.name)
                            });
                            cell(v)
                        }));
                    }
                }
                row
            })
            .collect();

        ResultTable { header, rows }
    }

    /// Cell of `subject` in `column`.
    pub fn get(&self, subject: &str, column: &str) -> Option<&str> {
        let ci = self.header.iter().position(|h| h == column)?;
        let row = self.rows.iter().find(|r| r.first().map(String::as_str) == Some(subject))?;
        row.get(ci).map(String::as_str)
    }

    pub fn write_csv<W: Write>(&self, mut w: W) -> Result<()> {
        writeln!(w, "{}", self.header.join(","))?;
        for row in &self.rows {
            writeln!(w, "{}", row.join(","))?;
        }
        Ok(())
    }

    pub fn write_csv_file(&self, path: &Path) -> Result<()> {
        let f = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        self.write_csv(std::io::BufWriter::new(f))
            .with_context(|| format!("writing {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bands::{BandPower, BandPowers};
    use crate::error::PipelineError;
    use crate::events::PromptEpoch;
    use crate::fit::SlopeFit;
    use crate::subject::{ConditionResult, PromptResult, SubjectMeta};
    use std::collections::BTreeMap;

    fn fit(slope: f64) -> SlopeFit {
        SlopeFit { slope, coef: slope / 10.0, intercept: 0.0, fit_line: vec![], n_points: 10, n_inliers: 10 }
    }

    fn subject(name: &str, ch0: Result<SlopeFit, PipelineError>) -> Subject {
        let res = ConditionResult {
            n_windows: 4,
            channel_psds: vec![None, None],
            channel_fits: vec![ch0, Ok(fit(-12.5))],
            mean_psd: None,
            mean_fit: Ok(fit(-11.0)),
            band_power: None,
        };
        Subject {
            meta: SubjectMeta { name: name.into(), group: "HC".into(), age: "30".into(), sex: "F".into() },
            channels: vec!["Fz".into(), "Cz".into()],
            conditions: BTreeMap::from([("eyesc".to_string(), res)]),
            prompts: BTreeMap::new(),
        }
    }

    #[test]
    fn rows_sorted_and_missing_written_as_nan() {
        let subjects = vec![
            subject("s02", Ok(fit(-10.0))),
            subject("s01", Err(PipelineError::DegenerateFit { n_points: 1 })),
        ];
        let t = ResultTable::from_subjects(&subjects, &PipelineConfig::default());
        assert_eq!(t.rows[0][0], "s01");
        assert_eq!(t.get("s01", "Fz_EYESC"), Some("NaN"));
        assert_eq!(t.get("s02", "Fz_EYESC"), Some("-10"));
        assert_eq!(t.get("s02", "Cz_EYESC"), Some("-12.5"));
        assert_eq!(t.get("s02", "AVERAGE_EYESC"), Some("-11"));
        assert_eq!(t.get("s02", "NWINDOWS_EYESC"), Some("4"));
        assert_eq!(t.get("s02", "NWINDOWS_EYESO"), Some("NaN"));
        assert_eq!(t.get("s02", "AVERAGE_EYESO"), Some("NaN"));
    }

    #[test]
    fn csv_layout() {
        let cfg = PipelineConfig {
            taxonomy: crate::events::ConditionTaxonomy {
                conditions: vec![crate::events::Condition { name: "eyesc".into(), segment_char: 'C', trial_char: None }],
            },
            band_power: true,
            ..PipelineConfig::default()
        };
        let t = ResultTable::from_subjects(&[subject("s01", Ok(fit(-9.0)))], &cfg);
        let mut out = Vec::new();
        t.write_csv(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "SUBJECT,CLASS,AGE,SEX,NWINDOWS_EYESC,Fz_EYESC,Cz_EYESC,AVERAGE_EYESC,\
             EYESC_DELTA,EYESC_THETA,EYESC_ALPHA,EYESC_BETA"
        );
        assert_eq!(lines.next().unwrap(), "s01,HC,30,F,4,-9,-12.5,-11,NaN,NaN,NaN,NaN");
    }

    #[test]
    fn prompt_epoch_columns() {
        let bands = |v: f64| BandPowers {
            bands: TRADITIONAL_BANDS.iter().map(|b| BandPower { name: b.name, power: v }).collect(),
        };
        let mut s = subject("s01", Ok(fit(-9.0)));
        s.prompts.insert(
            "go_a".into(),
            PromptResult {
                n_prompts: 12,
                channel_psds: vec![None, None],
                channel_bands: vec![Some(bands(2.0)), None],
                mean_bands: Some(bands(2.0)),
            },
        );
        let cfg = PipelineConfig {
            prompt_epochs: vec![PromptEpoch::new("go_a", "GO_PROMPT", 77, 77)],
            ..PipelineConfig::default()
        };
        let t = ResultTable::from_subjects(&[s], &cfg);
        assert_eq!(t.get("s01", "NPROMPTS_GO_A"), Some("12"));
        assert_eq!(t.get("s01", "AVG_GO_A_THETA"), Some("2"));
        assert_eq!(t.get("s01", "GO_A_DELTA_Fz"), Some("2"));
        assert_eq!(t.get("s01", "GO_A_DELTA_Cz"), Some("NaN"));
        assert_eq!(t.header.len(), 4 + 2 + 4 + 2 + 1 + 4 + 8);
    }
}
