//! Voice style tables.
//!
//! A Kokoro voice is a stack of 256-dim style vectors; row `i` conditions an
//! utterance of `i` phoneme tokens. Voices ship either as a NumPy `.npz`
//! archive holding one `<name>.npy` per voice, or as a bare little-endian
//! f32 dump of a single voice.

use crate::error::{Result, SpeakError};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Width of one style vector.
pub const STYLE_DIM: usize = 256;

/// Upper bound on a single `.npy` entry, to reject corrupt archives early.
const MAX_NPY_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

const ZIP_MAGIC: &[u8; 4] = b"PK\x03\x04";
const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Style vectors for one voice, stored flat.
#[derive(Debug, Clone)]
pub struct VoiceStyle {
    rows: usize,
    data: Vec<f32>,
}

impl VoiceStyle {
    pub(crate) fn new(data: Vec<f32>) -> Result<Self> {
        if data.is_empty() || data.len() % STYLE_DIM != 0 {
            return Err(SpeakError::Model(format!(
                "voice style has {} floats, not a non-zero multiple of {STYLE_DIM}",
                data.len()
            )));
        }
        Ok(Self {
            rows: data.len() / STYLE_DIM,
            data,
        })
    }

    /// Number of style rows.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Style vector for a sequence of `token_count` tokens.
    ///
    /// Counts past the last row use the last row.
    pub fn for_token_count(&self, token_count: usize) -> &[f32] {
        let index = token_count.min(self.rows - 1);
        let start = index * STYLE_DIM;
        &self.data[start..start + STYLE_DIM]
    }
}

/// All voices loaded from the voice artifact.
#[derive(Debug, Clone)]
pub struct VoiceTable {
    voices: BTreeMap<String, VoiceStyle>,
}

impl VoiceTable {
    /// Load a voice artifact, detecting `.npz` archives by their zip magic.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or contains no valid voice.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            SpeakError::Model(format!("failed to read voice file {}: {e}", path.display()))
        })?;

        let table = if bytes.starts_with(ZIP_MAGIC) {
            Self::from_npz(&bytes)?
        } else {
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "default".to_owned());
            let style = VoiceStyle::new(parse_raw_f32(&bytes)?)?;
            Self {
                voices: BTreeMap::from([(name, style)]),
            }
        };

        info!(
            "loaded {} voice(s) from {}",
            table.voices.len(),
            path.display()
        );
        Ok(table)
    }

    /// Parse an in-memory `.npz` archive.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive is unreadable, an entry is malformed,
    /// or no `.npy` entries are present.
    pub fn from_npz(bytes: &[u8]) -> Result<Self> {
        let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
            .map_err(|e| SpeakError::Model(format!("failed to read npz archive: {e}")))?;

        let mut voices = BTreeMap::new();
        for i in 0..archive.len() {
            let mut entry = archive
                .by_index(i)
                .map_err(|e| SpeakError::Model(format!("failed to read npz entry {i}: {e}")))?;
            let name = entry.name().to_owned();
            let Some(key) = name.strip_suffix(".npy") else {
                continue;
            };
            let key = key.to_owned();

            let mut raw = Vec::new();
            (&mut entry)
                .take(MAX_NPY_ENTRY_BYTES + 1)
                .read_to_end(&mut raw)?;
            if raw.len() as u64 > MAX_NPY_ENTRY_BYTES {
                return Err(SpeakError::Model(format!(
                    "npy entry '{name}' exceeds {MAX_NPY_ENTRY_BYTES} bytes"
                )));
            }

            let data = parse_npy_f32(&raw)
                .map_err(|e| SpeakError::Model(format!("voice '{key}': {e}")))?;
            voices.insert(key, VoiceStyle::new(data)?);
        }

        if voices.is_empty() {
            return Err(SpeakError::Model(
                "voice archive did not contain any .npy entries".into(),
            ));
        }

        Ok(Self { voices })
    }

    /// Look up a voice by name.
    ///
    /// # Errors
    ///
    /// Returns an error naming the missing voice.
    pub fn get(&self, voice: &str) -> Result<&VoiceStyle> {
        self.voices
            .get(voice)
            .ok_or_else(|| SpeakError::Tts(format!("voice '{voice}' not found in voice table")))
    }

    /// Sorted voice names.
    pub fn names(&self) -> Vec<String> {
        self.voices.keys().cloned().collect()
    }
}

/// Interpret raw bytes as little-endian f32 values.
fn parse_raw_f32(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return Err(SpeakError::Model(format!(
            "voice file size {} is not a multiple of 4 (expected f32 array)",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Parse a C-order little-endian f32 `.npy` payload into flat data.
fn parse_npy_f32(bytes: &[u8]) -> std::result::Result<Vec<f32>, String> {
    if bytes.len() < 10 || !bytes.starts_with(NPY_MAGIC) {
        return Err("invalid npy magic header".into());
    }

    let (header_len, header_offset) = match bytes[6] {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err("npy payload too small".into());
            }
            (
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
                12,
            )
        }
        other => return Err(format!("unsupported npy version {other}")),
    };

    let header_end = header_offset + header_len;
    if bytes.len() < header_end {
        return Err("npy header length exceeds payload size".into());
    }
    let header = std::str::from_utf8(&bytes[header_offset..header_end])
        .map_err(|_| "npy header is not valid utf-8".to_owned())?;

    let descr = header_field(header, "descr").ok_or("npy header missing 'descr'")?;
    if descr != "<f4" {
        return Err(format!("unsupported npy dtype '{descr}', expected '<f4'"));
    }
    let fortran = header_field(header, "fortran_order").ok_or("npy header missing 'fortran_order'")?;
    if fortran != "False" {
        return Err("fortran-order arrays are not supported".into());
    }
    let shape = header_shape(header).ok_or("npy header missing 'shape'")?;
    let item_count = shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| format!("npy shape overflow for {shape:?}"))?;

    let data = parse_raw_f32(&bytes[header_end..]).map_err(|e| e.to_string())?;
    if data.len() != item_count {
        return Err(format!(
            "npy data size mismatch: shape {shape:?} needs {item_count} floats, got {}",
            data.len()
        ));
    }
    Ok(data)
}

fn header_field<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{key}':");
    let start = header.find(&pattern)? + pattern.len();
    let rest = header[start..].trim_start();

    if let Some(stripped) = rest.strip_prefix('\'') {
        let end = stripped.find('\'')?;
        return Some(&stripped[..end]);
    }
    let end = rest.find([',', '}']).unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn header_shape(header: &str) -> Option<Vec<usize>> {
    let start = header.find("'shape':")? + "'shape':".len();
    let rest = &header[start..];
    let open = rest.find('(')?;
    let close = rest[open..].find(')')? + open;
    rest[open + 1..close]
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::io::Write;

    /// Build a v1 `.npy` payload of shape `(rows, 1, 256)` where every value
    /// in row `i` equals `i`.
    fn npy_rows(rows: usize) -> Vec<u8> {
        let mut header =
            format!("{{'descr': '<f4', 'fortran_order': False, 'shape': ({rows}, 1, {STYLE_DIM}), }}");
        let unpadded = 10 + header.len() + 1;
        header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
        header.push('\n');

        let mut out = Vec::new();
        out.extend_from_slice(NPY_MAGIC);
        out.extend_from_slice(&[1, 0]);
        out.extend_from_slice(&(header.len() as u16).to_le_bytes());
        out.extend_from_slice(header.as_bytes());
        for row in 0..rows {
            for _ in 0..STYLE_DIM {
                out.extend_from_slice(&(row as f32).to_le_bytes());
            }
        }
        out
    }

    fn npz(entries: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(Vec::new()));
        for (name, payload) in entries {
            writer
                .start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            writer.write_all(payload).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn npz_archive_loads_all_voices() {
        let bytes = npz(&[
            ("jf_alpha.npy", npy_rows(4)),
            ("af_sky.npy", npy_rows(2)),
            ("README.txt", b"ignored".to_vec()),
        ]);
        let table = VoiceTable::from_npz(&bytes).unwrap();
        assert_eq!(table.names(), vec!["af_sky", "jf_alpha"]);
        assert_eq!(table.get("jf_alpha").unwrap().rows(), 4);
    }

    #[test]
    fn style_row_follows_token_count_and_clamps() {
        let table = VoiceTable::from_npz(&npz(&[("v.npy", npy_rows(3))])).unwrap();
        let voice = table.get("v").unwrap();
        assert_eq!(voice.for_token_count(1)[0], 1.0);
        assert_eq!(voice.for_token_count(2).len(), STYLE_DIM);
        assert_eq!(voice.for_token_count(50)[0], 2.0);
    }

    #[test]
    fn missing_voice_is_reported_by_name() {
        let table = VoiceTable::from_npz(&npz(&[("v.npy", npy_rows(1))])).unwrap();
        let err = table.get("jf_alpha").unwrap_err();
        assert!(err.to_string().contains("jf_alpha"));
    }

    #[test]
    fn archive_without_npy_is_rejected() {
        let bytes = npz(&[("notes.txt", b"hi".to_vec())]);
        assert!(VoiceTable::from_npz(&bytes).is_err());
    }

    #[test]
    fn wrong_dtype_is_rejected() {
        let mut payload = npy_rows(1);
        let pos = payload.windows(3).position(|w| w == b"<f4").unwrap();
        payload[pos + 2] = b'8';
        let err = VoiceTable::from_npz(&npz(&[("v.npy", payload)])).unwrap_err();
        assert!(err.to_string().contains("dtype"));
    }

    #[test]
    fn raw_bin_file_loads_as_single_voice() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bf_emma.bin");
        let floats: Vec<u8> = (0..STYLE_DIM * 2)
            .flat_map(|i| (i as f32).to_le_bytes())
            .collect();
        std::fs::write(&path, floats).unwrap();

        let table = VoiceTable::load(&path).unwrap();
        assert_eq!(table.names(), vec!["bf_emma"]);
        assert_eq!(table.get("bf_emma").unwrap().rows(), 2);
    }

    #[test]
    fn raw_bin_with_partial_row_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bin");
        std::fs::write(&path, vec![0u8; 4 * 100]).unwrap();
        assert!(VoiceTable::load(&path).is_err());
    }

    #[test]
    fn shape_parser_handles_trailing_comma() {
        assert_eq!(
            header_shape("{'descr': '<f4', 'shape': (511, 1, 256), }"),
            Some(vec![511, 1, 256])
        );
        assert_eq!(header_shape("{'shape': (7,), }"), Some(vec![7]));
    }
}
