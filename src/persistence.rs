use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use tracing::{debug, info};

use crate::config::LSTMLayerConfig;
use crate::gates::GateQuad;
use crate::layers::cell::LSTMCell;
use crate::layers::lstm_layer::LSTMLayer;
use crate::layers::weights::UnitWeights;
use crate::quantization::VectorQuantization;

/// Codebook size for compressed matrices; chosen so an index fits one byte.
pub const VQ_CODEBOOK_SIZE: usize = 256;

/// Errors that can occur during model persistence operations
#[derive(Debug)]
pub enum PersistenceError {
    IoError(io::Error),
    /// File contents disagree with the format (bad dimensions, index out of
    /// codebook range, inconsistent matrix sizes).
    CorruptModel(String),
    /// Persisted layer size disagrees with the runtime configuration.
    DimensionMismatch { expected: usize, actual: usize },
    SerializationError(String),
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::IoError(err) => write!(f, "IO error: {}", err),
            PersistenceError::CorruptModel(msg) => write!(f, "corrupt model file: {}", msg),
            PersistenceError::DimensionMismatch { expected, actual } => write!(
                f,
                "layer size mismatch: configured {}, file has {}",
                expected, actual
            ),
            PersistenceError::SerializationError(err) => write!(f, "Serialization error: {}", err),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PersistenceError::IoError(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for PersistenceError {
    fn from(error: io::Error) -> Self {
        PersistenceError::IoError(error)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(error: serde_json::Error) -> Self {
        PersistenceError::SerializationError(error.to_string())
    }
}

// Little-endian primitives of the weight-file format. A short read is an
// I/O error, never silently zero-filled weights.

fn write_i32<W: Write>(w: &mut W, v: i32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_f32<W: Write>(w: &mut W, v: f32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_f64<W: Write>(w: &mut W, v: f64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn write_u8<W: Write>(w: &mut W, v: u8) -> io::Result<()> {
    w.write_all(&[v])
}

fn read_i32<R: Read>(r: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

fn read_f32<R: Read>(r: &mut R) -> io::Result<f32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_f64<R: Read>(r: &mut R) -> io::Result<f64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_le_bytes(buf))
}

fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_dimension<R: Read>(r: &mut R, what: &str) -> Result<usize, PersistenceError> {
    let v = read_i32(r)?;
    if v < 0 {
        return Err(PersistenceError::CorruptModel(format!("negative {}: {}", what, v)));
    }
    Ok(v as usize)
}

/// Writes one projection matrix: width, height, compression flag, then
/// either raw 4-channel floats or four codebooks followed by 4 index bytes
/// per cell.
fn save_gate_matrix<W: Write>(
    w: &mut W,
    rows: &[&[GateQuad]],
    compress: bool,
) -> Result<(), PersistenceError> {
    let width = rows.len();
    let height = rows.first().map_or(0, |r| r.len());

    debug!(width, height, compress, "saving gate weight matrix");

    write_i32(w, width as i32)?;
    write_i32(w, height as i32)?;

    if !compress {
        write_i32(w, 0)?;
        for row in rows {
            for q in row.iter() {
                write_f32(w, q.input)?;
                write_f32(w, q.forget)?;
                write_f32(w, q.cell)?;
                write_f32(w, q.output)?;
            }
        }
        return Ok(());
    }

    // one codebook per gate channel
    let mut vq_input = VectorQuantization::new();
    let mut vq_forget = VectorQuantization::new();
    let mut vq_cell = VectorQuantization::new();
    let mut vq_output = VectorQuantization::new();
    for row in rows {
        for q in row.iter() {
            vq_input.add(q.input);
            vq_forget.add(q.forget);
            vq_cell.add(q.cell);
            vq_output.add(q.output);
        }
    }

    let distortion = vq_input.build_codebook(VQ_CODEBOOK_SIZE);
    debug!(distortion, "input gate channel codebook");
    let distortion = vq_forget.build_codebook(VQ_CODEBOOK_SIZE);
    debug!(distortion, "forget gate channel codebook");
    let distortion = vq_cell.build_codebook(VQ_CODEBOOK_SIZE);
    debug!(distortion, "cell channel codebook");
    let distortion = vq_output.build_codebook(VQ_CODEBOOK_SIZE);
    debug!(distortion, "output gate channel codebook");

    write_i32(w, VQ_CODEBOOK_SIZE as i32)?;
    for vq in [&vq_input, &vq_forget, &vq_cell, &vq_output] {
        for &codeword in vq.codebook() {
            write_f32(w, codeword)?;
        }
    }

    for row in rows {
        for q in row.iter() {
            write_u8(w, vq_input.compute_vq(q.input) as u8)?;
            write_u8(w, vq_forget.compute_vq(q.forget) as u8)?;
            write_u8(w, vq_cell.compute_vq(q.cell) as u8)?;
            write_u8(w, vq_output.compute_vq(q.output) as u8)?;
        }
    }

    Ok(())
}

/// Reads one projection matrix written by [`save_gate_matrix`].
fn load_gate_matrix<R: Read>(r: &mut R) -> Result<Vec<Vec<GateQuad>>, PersistenceError> {
    let width = read_dimension(r, "matrix width")?;
    let height = read_dimension(r, "matrix height")?;
    let vq_size = read_dimension(r, "codebook size")?;

    debug!(width, height, vq_size, "loading gate weight matrix");

    let mut rows = Vec::with_capacity(width);

    if vq_size == 0 {
        for _ in 0..width {
            let mut row = Vec::with_capacity(height);
            for _ in 0..height {
                let input = read_f32(r)?;
                let forget = read_f32(r)?;
                let cell = read_f32(r)?;
                let output = read_f32(r)?;
                row.push(GateQuad::new(input, forget, cell, output));
            }
            rows.push(row);
        }
        return Ok(rows);
    }

    let mut codebooks = [Vec::new(), Vec::new(), Vec::new(), Vec::new()];
    for codebook in codebooks.iter_mut() {
        codebook.reserve(vq_size);
        for _ in 0..vq_size {
            codebook.push(read_f32(r)?);
        }
    }

    for _ in 0..width {
        let mut row = Vec::with_capacity(height);
        for _ in 0..height {
            let mut channels = [0.0f32; 4];
            for (value, codebook) in channels.iter_mut().zip(codebooks.iter()) {
                let index = read_u8(r)? as usize;
                if index >= vq_size {
                    return Err(PersistenceError::CorruptModel(format!(
                        "codeword index {} out of range for codebook size {}",
                        index, vq_size
                    )));
                }
                *value = codebook[index];
            }
            row.push(GateQuad::new(channels[0], channels[1], channels[2], channels[3]));
        }
        rows.push(row);
    }

    Ok(rows)
}

impl LSTMLayer {
    /// Serializes the layer in the binary weight-file format, optionally
    /// vector-quantizing the projection matrices.
    pub fn save<W: Write>(&self, writer: &mut W, compress: bool) -> Result<(), PersistenceError> {
        info!(
            layer_size = self.config.layer_size,
            sparse_feature_size = self.sparse_feature_size,
            dense_feature_size = self.dense_feature_size,
            "saving LSTM layer"
        );

        write_i32(writer, self.config.layer_size as i32)?;
        write_i32(writer, self.sparse_feature_size as i32)?;
        write_i32(writer, self.dense_feature_size as i32)?;

        for cell in &self.cells {
            write_f64(writer, cell.w_peephole_in)?;
            write_f64(writer, cell.w_peephole_forget)?;
            write_f64(writer, cell.w_peephole_out)?;
            write_f64(writer, cell.w_cell_in)?;
            write_f64(writer, cell.w_cell_forget)?;
            write_f64(writer, cell.w_cell_state)?;
            write_f64(writer, cell.w_cell_out)?;
        }

        if self.sparse_feature_size > 0 {
            let rows: Vec<&[GateQuad]> = self.weights.iter().map(|u| u.sparse.as_slice()).collect();
            save_gate_matrix(writer, &rows, compress)?;
        }

        if self.dense_feature_size > 0 {
            let rows: Vec<&[GateQuad]> = self.weights.iter().map(|u| u.dense.as_slice()).collect();
            save_gate_matrix(writer, &rows, compress)?;
        }

        Ok(())
    }

    /// Reads a layer saved by [`LSTMLayer::save`].
    ///
    /// The persisted layer size must match `config.layer_size`; a mismatch
    /// aborts the load rather than truncating or padding.
    pub fn load<R: Read>(reader: &mut R, config: LSTMLayerConfig) -> Result<Self, PersistenceError> {
        let layer_size = read_dimension(reader, "layer size")?;
        if layer_size != config.layer_size {
            return Err(PersistenceError::DimensionMismatch {
                expected: config.layer_size,
                actual: layer_size,
            });
        }

        let sparse_feature_size = read_dimension(reader, "sparse feature size")?;
        let dense_feature_size = read_dimension(reader, "dense feature size")?;

        info!(layer_size, sparse_feature_size, dense_feature_size, "loading LSTM layer");

        let mut cells = Vec::with_capacity(layer_size);
        for _ in 0..layer_size {
            cells.push(LSTMCell {
                w_peephole_in: read_f64(reader)?,
                w_peephole_forget: read_f64(reader)?,
                w_peephole_out: read_f64(reader)?,
                w_cell_in: read_f64(reader)?,
                w_cell_forget: read_f64(reader)?,
                w_cell_state: read_f64(reader)?,
                w_cell_out: read_f64(reader)?,
                ..Default::default()
            });
        }

        let sparse_rows = if sparse_feature_size > 0 {
            let rows = load_gate_matrix(reader)?;
            check_matrix_shape(&rows, layer_size, sparse_feature_size, "sparse")?;
            Some(rows)
        } else {
            None
        };

        let dense_rows = if dense_feature_size > 0 {
            let rows = load_gate_matrix(reader)?;
            check_matrix_shape(&rows, layer_size, dense_feature_size, "dense")?;
            Some(rows)
        } else {
            None
        };

        let mut sparse_it = sparse_rows.map(Vec::into_iter);
        let mut dense_it = dense_rows.map(Vec::into_iter);
        let mut weights = Vec::with_capacity(layer_size);
        for _ in 0..layer_size {
            let sparse = sparse_it.as_mut().and_then(Iterator::next).unwrap_or_default();
            let dense = dense_it.as_mut().and_then(Iterator::next).unwrap_or_default();
            weights.push(UnitWeights::from_rows(sparse, dense));
        }

        Ok(LSTMLayer::from_parts(
            config,
            sparse_feature_size,
            dense_feature_size,
            cells,
            weights,
        ))
    }

    /// Saves to a path, picking the format from the extension: `.json` for
    /// the readable checkpoint, anything else for the binary format.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P, compress: bool) -> Result<(), PersistenceError> {
        let path = path.as_ref();
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => {
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("lstm-layer")
                    .to_string();
                let metadata = ModelPersistence::create_metadata(self, name, None);
                ModelPersistence::save_to_json(self, metadata, path)
            }
            _ => ModelPersistence::save_to_binary(self, path, compress),
        }
    }

    /// Loads from a path saved by [`LSTMLayer::save_to_file`].
    pub fn load_from_file<P: AsRef<Path>>(
        path: P,
        config: LSTMLayerConfig,
    ) -> Result<Self, PersistenceError> {
        let path = path.as_ref();
        match path.extension().and_then(|s| s.to_str()) {
            Some("json") => ModelPersistence::load_from_json(path, config).map(|(layer, _)| layer),
            _ => ModelPersistence::load_from_binary(path, config),
        }
    }
}

fn check_matrix_shape(
    rows: &[Vec<GateQuad>],
    width: usize,
    height: usize,
    which: &str,
) -> Result<(), PersistenceError> {
    if rows.len() != width || rows.iter().any(|r| r.len() != height) {
        return Err(PersistenceError::CorruptModel(format!(
            "{} matrix dimensions disagree with file header ({}x{} expected)",
            which, width, height
        )));
    }
    Ok(())
}

/// Serializable unit weights, persistent fields only.
#[derive(Serialize, Deserialize)]
struct SerializableCell {
    w_peephole_in: f64,
    w_peephole_forget: f64,
    w_peephole_out: f64,
    w_cell_in: f64,
    w_cell_forget: f64,
    w_cell_state: f64,
    w_cell_out: f64,
}

impl From<&LSTMCell> for SerializableCell {
    fn from(cell: &LSTMCell) -> Self {
        SerializableCell {
            w_peephole_in: cell.w_peephole_in,
            w_peephole_forget: cell.w_peephole_forget,
            w_peephole_out: cell.w_peephole_out,
            w_cell_in: cell.w_cell_in,
            w_cell_forget: cell.w_cell_forget,
            w_cell_state: cell.w_cell_state,
            w_cell_out: cell.w_cell_out,
        }
    }
}

impl From<SerializableCell> for LSTMCell {
    fn from(cell: SerializableCell) -> Self {
        LSTMCell {
            w_peephole_in: cell.w_peephole_in,
            w_peephole_forget: cell.w_peephole_forget,
            w_peephole_out: cell.w_peephole_out,
            w_cell_in: cell.w_cell_in,
            w_cell_forget: cell.w_cell_forget,
            w_cell_state: cell.w_cell_state,
            w_cell_out: cell.w_cell_out,
            ..Default::default()
        }
    }
}

/// Serializable layer for the JSON checkpoint path.
#[derive(Serialize, Deserialize)]
pub struct SerializableLayer {
    layer_size: usize,
    sparse_feature_size: usize,
    dense_feature_size: usize,
    cells: Vec<SerializableCell>,
    sparse_weights: Vec<Vec<GateQuad>>,
    dense_weights: Vec<Vec<GateQuad>>,
}

impl From<&LSTMLayer> for SerializableLayer {
    fn from(layer: &LSTMLayer) -> Self {
        SerializableLayer {
            layer_size: layer.layer_size(),
            sparse_feature_size: layer.sparse_feature_size(),
            dense_feature_size: layer.dense_feature_size(),
            cells: layer.cells().iter().map(SerializableCell::from).collect(),
            sparse_weights: layer.unit_weights().iter().map(|u| u.sparse.clone()).collect(),
            dense_weights: layer.unit_weights().iter().map(|u| u.dense.clone()).collect(),
        }
    }
}

impl SerializableLayer {
    fn into_layer(self, config: LSTMLayerConfig) -> Result<LSTMLayer, PersistenceError> {
        if self.layer_size != config.layer_size {
            return Err(PersistenceError::DimensionMismatch {
                expected: config.layer_size,
                actual: self.layer_size,
            });
        }
        if self.cells.len() != self.layer_size
            || self.sparse_weights.len() != self.layer_size
            || self.dense_weights.len() != self.layer_size
            || self.sparse_weights.iter().any(|r| r.len() != self.sparse_feature_size)
            || self.dense_weights.iter().any(|r| r.len() != self.dense_feature_size)
        {
            return Err(PersistenceError::CorruptModel(
                "checkpoint arrays disagree with recorded dimensions".to_string(),
            ));
        }

        let cells = self.cells.into_iter().map(LSTMCell::from).collect();
        let weights = self
            .sparse_weights
            .into_iter()
            .zip(self.dense_weights)
            .map(|(sparse, dense)| UnitWeights::from_rows(sparse, dense))
            .collect();

        Ok(LSTMLayer::from_parts(
            config,
            self.sparse_feature_size,
            self.dense_feature_size,
            cells,
            weights,
        ))
    }
}

/// Model metadata for tracking training information
#[derive(Serialize, Deserialize, Clone)]
pub struct ModelMetadata {
    pub model_name: String,
    pub version: String,
    pub created_at: String,
    pub layer_size: usize,
    pub sparse_feature_size: usize,
    pub dense_feature_size: usize,
    pub description: Option<String>,
}

/// Complete saved checkpoint including layer weights and metadata
#[derive(Serialize, Deserialize)]
pub struct SavedModel {
    pub metadata: ModelMetadata,
    layer: SerializableLayer,
}

/// Model persistence operations
pub struct ModelPersistence;

impl ModelPersistence {
    /// Metadata stamped with the crate version and the current time.
    pub fn create_metadata(
        layer: &LSTMLayer,
        model_name: String,
        description: Option<String>,
    ) -> ModelMetadata {
        ModelMetadata {
            model_name,
            version: env!("CARGO_PKG_VERSION").to_string(),
            created_at: chrono::Utc::now().to_rfc3339(),
            layer_size: layer.layer_size(),
            sparse_feature_size: layer.sparse_feature_size(),
            dense_feature_size: layer.dense_feature_size(),
            description,
        }
    }

    /// Save layer to JSON format (human-readable)
    pub fn save_to_json<P: AsRef<Path>>(
        layer: &LSTMLayer,
        metadata: ModelMetadata,
        path: P,
    ) -> Result<(), PersistenceError> {
        let model = SavedModel {
            metadata,
            layer: layer.into(),
        };
        let json = serde_json::to_string_pretty(&model)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }

    /// Load layer from JSON format
    pub fn load_from_json<P: AsRef<Path>>(
        path: P,
        config: LSTMLayerConfig,
    ) -> Result<(LSTMLayer, ModelMetadata), PersistenceError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let model: SavedModel = serde_json::from_str(&contents)?;
        let layer = model.layer.into_layer(config)?;
        Ok((layer, model.metadata))
    }

    /// Save layer to the binary weight-file format (compact and fast)
    pub fn save_to_binary<P: AsRef<Path>>(
        layer: &LSTMLayer,
        path: P,
        compress: bool,
    ) -> Result<(), PersistenceError> {
        let mut writer = io::BufWriter::new(File::create(path)?);
        layer.save(&mut writer, compress)?;
        writer.flush()?;
        Ok(())
    }

    /// Load layer from the binary weight-file format
    pub fn load_from_binary<P: AsRef<Path>>(
        path: P,
        config: LSTMLayerConfig,
    ) -> Result<LSTMLayer, PersistenceError> {
        let mut reader = io::BufReader::new(File::open(path)?);
        LSTMLayer::load(&mut reader, config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PersistenceError::DimensionMismatch { expected: 4, actual: 3 };
        assert_eq!(err.to_string(), "layer size mismatch: configured 4, file has 3");

        let err = PersistenceError::CorruptModel("negative layer size: -1".to_string());
        assert!(err.to_string().contains("negative layer size"));
    }

    #[test]
    fn test_primitive_round_trip() {
        let mut buf = Vec::new();
        write_i32(&mut buf, -7).unwrap();
        write_f32(&mut buf, 1.25).unwrap();
        write_f64(&mut buf, -0.5).unwrap();
        write_u8(&mut buf, 200).unwrap();

        let mut cursor = &buf[..];
        assert_eq!(read_i32(&mut cursor).unwrap(), -7);
        assert_eq!(read_f32(&mut cursor).unwrap(), 1.25);
        assert_eq!(read_f64(&mut cursor).unwrap(), -0.5);
        assert_eq!(read_u8(&mut cursor).unwrap(), 200);
    }

    #[test]
    fn test_negative_dimension_is_corrupt() {
        let mut buf = Vec::new();
        write_i32(&mut buf, -3).unwrap();

        let err = read_dimension(&mut &buf[..], "layer size").unwrap_err();
        assert!(matches!(err, PersistenceError::CorruptModel(_)));
    }
}
