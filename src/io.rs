//! File formats.
//!
//! * Recordings: safetensors with `data` [C, T] (F32 or F64), a scalar
//!   `srate`, and optional `name`, `ch_names` and `events` byte tensors
//!   (newline-separated UTF-8; events as `code\tlatency` lines).
//! * Event files: tab-separated `Type\tLatency` tables.
//! * Subject metadata: comma-separated table with `SUBJECT`, `CLASS`, `AGE`
//!   and `SEX` columns in any order.
//! * Outputs: the results CSV and a safetensors PSD dump.
use anyhow::{bail, ensure, Context, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::events::Marker;
use crate::subject::SubjectMeta;

// ── Safetensors reader ───────────────────────────────────────────────────────

/// One header entry, shared by the reader and [`StWriter`].

#[derive(Debug, Serialize, Deserialize)]
struct TensorInfo {
    dtype: String,
    shape: Vec<usize>,
    data_offsets: [usize; 2],
}

/// A safetensors file held in memory.
pub struct SafeTensors {
    bytes: Vec<u8>,
    data_start: usize,
    header: HashMap<String, TensorInfo>,
}

impl SafeTensors {
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_bytes(bytes).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        ensure!(bytes.len() >= 8, "safetensors file too small");
        let mut len = [0u8; 8];
        len.copy_from_slice(&bytes[..8]);
        let n = u64::from_le_bytes(len) as usize;
        ensure!(bytes.len() >= 8 + n, "safetensors header runs past end of file");

        let raw: HashMap<String, serde_json::Value> =
            serde_json::from_slice(&bytes[8..8 + n]).context("failed to parse safetensors header")?;
        let mut header = HashMap::new();
        for (key, val) in raw {
            if key == "__metadata__" {
                continue;
            }
            let info: TensorInfo =
                serde_json::from_value(val).with_context(|| format!("bad header entry '{key}'"))?;
            ensure!(
                info.data_offsets[0] <= info.data_offsets[1] && 8 + n + info.data_offsets[1] <= bytes.len(),
                "tensor '{key}' runs past end of file"
            );
            header.insert(key, info);
        }
        Ok(Self { bytes, data_start: 8 + n, header })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.header.contains_key(name)
    }

    fn entry(&self, name: &str) -> Result<(&TensorInfo, &[u8])> {
        let info = self.header.get(name).with_context(|| format!("missing '{name}' key"))?;
        let [s, e] = info.data_offsets;
        Ok((info, &self.bytes[self.data_start + s..self.data_start + e]))
    }

    /// Shape of tensor `name`.
    pub fn shape(&self, name: &str) -> Result<&[usize]> {
        Ok(&self.entry(name)?.0.shape)
    }

    /// Any numeric tensor converted to `f64`.
    pub fn f64s(&self, name: &str) -> Result<Vec<f64>> {
        let (info, raw) = self.entry(name)?;
        let vals = match info.dtype.as_str() {
            "F32" => raw.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64).collect(),
            "F64" => raw
                .chunks_exact(8)
                .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
                .collect(),
            "I32" => raw.chunks_exact(4).map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f64).collect(),
            "I64" => raw
                .chunks_exact(8)
                .map(|b| i64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f64)
                .collect(),
            "U8" => raw.iter().map(|&b| b as f64).collect(),
            other => bail!("tensor '{name}': unsupported dtype {other}"),
        };
        Ok(vals)
    }

    /// A numeric tensor as `f32`; F32 data is read without a round trip.
    pub fn f32s(&self, name: &str) -> Result<Vec<f32>> {
        let (info, raw) = self.entry(name)?;
        if info.dtype == "F32" {
            return Ok(raw.chunks_exact(4).map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]])).collect());
        }
        Ok(self.f64s(name)?.into_iter().map(|v| v as f32).collect())
    }

    /// A U8 tensor decoded as UTF-8.
    pub fn text(&self, name: &str) -> Result<&str> {
        let (_, raw) = self.entry(name)?;
        std::str::from_utf8(raw).with_context(|| format!("tensor '{name}' is not UTF-8"))
    }

    /// Non-empty lines of a text tensor.
    pub fn lines(&self, name: &str) -> Result<Vec<String>> {
        Ok(self.text(name)?.split('\n').filter(|s| !s.is_empty()).map(String::from).collect())
    }
}

// ── Recordings ───────────────────────────────────────────────────────────────

/// One subject's continuous EEG.
#[derive(Debug, Clone)]
pub struct Recording {
    /// Subject identifier: the `name` tensor, or the file stem.
    pub name: String,
    /// Sampling rate (Hz).
    pub srate: f64,
    /// [C, T] samples.
    pub data: Array2<f32>,
    /// Channel names (empty if not saved).
    pub ch_names: Vec<String>,
    /// Embedded marker stream, if the file carries one.
    pub events: Option<Vec<Marker>>,
}

impl Recording {
    pub fn load(path: &Path) -> Result<Self> {
        let st = SafeTensors::read(path)?;
        let ctx = || format!("recording {}", path.display());

        let shape = st.shape("data").with_context(ctx)?.to_vec();
        ensure!(shape.len() == 2, "{}: 'data' must be [C, T], got shape {shape:?}", ctx());
        let data = Array2::from_shape_vec((shape[0], shape[1]), st.f32s("data")?).with_context(ctx)?;

        let srate = *st.f64s("srate").with_context(ctx)?.first().with_context(|| format!("{}: empty 'srate'", ctx()))?;
        ensure!(srate.is_finite() && srate > 0.0, "{}: sampling rate must be > 0, got {srate}", ctx());

        let name = if st.contains("name") {
            st.text("name")?.trim().to_string()
        } else {
            file_stem(path)?
        };

        // Channel names are optional.
        let ch_names = if st.contains("ch_names") { st.lines("ch_names")? } else { vec![] };
        if !ch_names.is_empty() {
            ensure!(
                ch_names.len() == data.nrows(),
                "{}: {} channel names for {} channels",
                ctx(),
                ch_names.len(),
                data.nrows()
            );
        }

        let events = if st.contains("events") {
            Some(parse_event_lines(st.text("events")?).with_context(ctx)?)
        } else {
            None
        };

        Ok(Recording { name, srate, data, ch_names, events })
    }

    #[inline]
    pub fn n_channels(&self) -> usize {
        self.data.nrows()
    }

    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Write back in the format [`Recording::load`] reads.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut w = StWriter::new();
        w.add_arr2("data", &self.data);
        w.add("srate", &[self.srate], &[1]);
        w.add_str("name", &self.name);
        if !self.ch_names.is_empty() {
            w.add_str("ch_names", &self.ch_names.join("\n"));
        }
        if let Some(ev) = &self.events {
            let lines: Vec<String> = ev.iter().map(|m| format!("{}\t{}", m.code, m.latency)).collect();
            w.add_str("events", &lines.join("\n"));
        }
        w.write(path)
    }
}

fn file_stem(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(String::from)
        .with_context(|| format!("cannot derive a subject name from {}", path.display()))
}

// ── Events ───────────────────────────────────────────────────────────────────

fn parse_latency(s: &str) -> Result<u64> {
    let s = s.trim();
    if let Ok(v) = s.parse::<u64>() {
        return Ok(v);
    }
    let f: f64 = s.parse().with_context(|| format!("bad latency '{s}'"))?;
    ensure!(f.is_finite() && f >= 0.0, "bad latency '{s}'");
    Ok(f.round() as u64)
}

/// `code\tlatency` lines, no header.
fn parse_event_lines(text: &str) -> Result<Vec<Marker>> {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            let mut cols = line.split('\t');
            let code = cols.next().unwrap_or_default().trim();
            let lat = cols.next().with_context(|| format!("event line {}: no latency", i + 1))?;
            Ok(Marker::new(code, parse_latency(lat).with_context(|| format!("event line {}", i + 1))?))
        })
        .collect()
}

/// Parse a `Type\tLatency` event table.  Extra columns are ignored; codes
/// are trimmed.
pub fn parse_markers(text: &str) -> Result<Vec<Marker>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<&str> = lines.next().context("empty event file")?.split('\t').map(str::trim).collect();
    let col = |name: &str| {
        header
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .with_context(|| format!("event file has no '{name}' column"))
    };
    let (ti, li) = (col("Type")?, col("Latency")?);

    lines
        .enumerate()
        .map(|(i, line)| {
            let cols: Vec<&str> = line.split('\t').collect();
            let row = i + 2;
            let code = cols.get(ti).with_context(|| format!("event row {row}: missing Type"))?.trim();
            let lat = cols.get(li).with_context(|| format!("event row {row}: missing Latency"))?;
            Ok(Marker::new(code, parse_latency(lat).with_context(|| format!("event row {row}"))?))
        })
        .collect()
}

pub fn read_markers(path: &Path) -> Result<Vec<Marker>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_markers(&text).with_context(|| format!("parsing {}", path.display()))
}

// ── Metadata ─────────────────────────────────────────────────────────────────

/// Parse the subject metadata table, keyed by `SUBJECT`.
pub fn parse_metadata(text: &str) -> Result<BTreeMap<String, SubjectMeta>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<String> = lines
        .next()
        .context("empty metadata file")?
        .split(',')
        .map(|h| h.trim().to_ascii_uppercase())
        .collect();
    let col = |name: &str| {
        header
            .iter()
            .position(|h| h == name)
            .with_context(|| format!("metadata has no '{name}' column"))
    };
    let (si, ci, ai, xi) = (col("SUBJECT")?, col("CLASS")?, col("AGE")?, col("SEX")?);

    let mut out = BTreeMap::new();
    for (i, line) in lines.enumerate() {
        let cols: Vec<&str> = line.split(',').map(str::trim).collect();
        let get = |c: usize| cols.get(c).map(|s| s.to_string()).unwrap_or_default();
        let name = get(si);
        ensure!(!name.is_empty(), "metadata row {}: empty SUBJECT", i + 2);
        let meta = SubjectMeta { name: name.clone(), group: get(ci), age: get(ai), sex: get(xi) };
        if out.insert(name.clone(), meta).is_some() {
            tracing::warn!(subject = %name, "duplicate metadata row, last one kept");
        }
    }
    Ok(out)
}

pub fn read_metadata(path: &Path) -> Result<BTreeMap<String, SubjectMeta>> {
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    parse_metadata(&text).with_context(|| format!("parsing {}", path.display()))
}

// ── Safetensors writer ───────────────────────────────────────────────────────

/// Scalar types [`StWriter`] can store, tagged with their safetensors dtype.
pub trait Element: Copy {
    const DTYPE: &'static str;
    fn put_le(self, out: &mut Vec<u8>);
}

macro_rules! element {
    ($($t:ty => $tag:literal),* $(,)?) => {
        $(impl Element for $t {
            const DTYPE: &'static str = $tag;
            #[inline]
            fn put_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }
        })*
    };
}

element!(f32 => "F32", f64 => "F64", i32 => "I32", u8 => "U8");

/// Builds a safetensors file in memory: tensors are appended to one payload
/// buffer and described by the same header entries [`SafeTensors`] parses.
///
/// ```rust,no_run
/// use specslope::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add("signal", &[1.0f32, 2.0, 3.0], &[1, 3]);
/// w.add("freqs", &[0.0f64, 0.5, 1.0], &[3]);
/// w.add_str("ch_names", "Fz\nCz\nPz");
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    header: BTreeMap<String, TensorInfo>,
    payload: Vec<u8>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append tensor `name` with the given row-major `shape`.
    pub fn add<T: Element>(&mut self, name: &str, data: &[T], shape: &[usize]) {
        debug_assert_eq!(shape.iter().product::<usize>(), data.len(), "tensor '{name}'");
        debug_assert!(!self.header.contains_key(name), "tensor '{name}' added twice");
        let start = self.payload.len();
        self.payload.reserve(data.len() * std::mem::size_of::<T>());
        for &v in data {
            v.put_le(&mut self.payload);
        }
        let info = TensorInfo { dtype: T::DTYPE.to_string(), shape: shape.to_vec(), data_offsets: [start, self.payload.len()] };
        self.header.insert(name.to_string(), info);
    }

    /// Append a `[rows, cols]` array.
    pub fn add_arr2<T: Element>(&mut self, name: &str, arr: &Array2<T>) {
        let data: Vec<T> = arr.iter().copied().collect();
        self.add(name, &data, &[arr.nrows(), arr.ncols()]);
    }

    /// UTF-8 text as a 1-D U8 tensor, read back with [`SafeTensors::text`].
    pub fn add_str(&mut self, name: &str, text: &str) {
        self.add(name, text.as_bytes(), &[text.len()]);
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        use std::io::Write;
        let mut header = serde_json::to_vec(&self.header).context("serialising safetensors header")?;
        // Tensor data starts on an 8-byte boundary.
        header.resize(header.len().next_multiple_of(8), b' ');

        let f = std::fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
        let mut out = std::io::BufWriter::new(f);
        out.write_all(&(header.len() as u64).to_le_bytes())?;
        out.write_all(&header)?;
        out.write_all(&self.payload)?;
        out.flush().with_context(|| format!("writing {}", path.display()))
    }
}
