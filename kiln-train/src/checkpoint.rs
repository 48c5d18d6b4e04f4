//! Binary checkpoints for module parameters and optimizer state.
//!
//! Layout (little endian):
//!
//! ```text
//! b"KILNCKPT" | u32 version | u32 metadata length | metadata JSON
//! u32 tensor count
//! per tensor: u32 name length | name | u32 rank | u64 dims[rank] | f32 data
//! ```

use crate::error::TrainError;
use crate::nn::{Module, Optimizer, StateDict};
use ndarray::{ArrayD, IxDyn};
use serde_json::json;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use tracing::debug;

const MAGIC: &[u8; 8] = b"KILNCKPT";
const VERSION: u32 = 1;

fn write_u32(w: &mut impl Write, v: u32) -> std::io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

fn read_u32(r: &mut impl Read) -> std::io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut impl Read) -> std::io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Read exactly `len` bytes, growing the buffer only as data arrives so a
/// corrupt length cannot force a huge allocation.
fn read_bytes(r: &mut impl Read, len: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    r.take(len as u64).read_to_end(&mut buf)?;
    if buf.len() != len {
        return Err(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            format!("expected {} bytes, found {}", len, buf.len()),
        ));
    }
    Ok(buf)
}

/// Serialize `state` to `writer`.
pub fn write_state(mut writer: impl Write, state: &StateDict) -> Result<(), TrainError> {
    writer.write_all(MAGIC)?;
    write_u32(&mut writer, VERSION)?;
    let metadata = serde_json::to_vec(&state.metadata)?;
    write_u32(&mut writer, metadata.len() as u32)?;
    writer.write_all(&metadata)?;

    write_u32(&mut writer, state.tensors.len() as u32)?;
    for (name, tensor) in &state.tensors {
        write_u32(&mut writer, name.len() as u32)?;
        writer.write_all(name.as_bytes())?;
        write_u32(&mut writer, tensor.ndim() as u32)?;
        for &dim in tensor.shape() {
            writer.write_all(&(dim as u64).to_le_bytes())?;
        }
        let data: Vec<f32> = tensor
            .as_standard_layout()
            .iter()
            .map(|v| f32::from_ne_bytes(v.to_le_bytes()))
            .collect();
        writer.write_all(bytemuck::cast_slice(&data))?;
    }
    writer.flush()?;
    Ok(())
}

/// Parse a state written by [`write_state`]. `source` names the input in errors.
pub fn read_state(mut reader: impl Read, source: &Path) -> Result<StateDict, TrainError> {
    let invalid = |reason: String| TrainError::Checkpoint {
        path: source.to_path_buf(),
        reason,
    };

    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(invalid("bad magic".to_string()));
    }
    let version = read_u32(&mut reader)?;
    if version != VERSION {
        return Err(invalid(format!("unsupported version {}", version)));
    }
    let len = read_u32(&mut reader)? as usize;
    let metadata = serde_json::from_slice(&read_bytes(&mut reader, len)?)?;

    let count = read_u32(&mut reader)?;
    let mut tensors = Vec::new();
    for _ in 0..count {
        let len = read_u32(&mut reader)? as usize;
        let name = String::from_utf8(read_bytes(&mut reader, len)?)
            .map_err(|e| invalid(e.to_string()))?;

        let rank = read_u32(&mut reader)?;
        let dims = (0..rank)
            .map(|_| {
                let dim = read_u64(&mut reader)?;
                usize::try_from(dim).map_err(|_| invalid(format!("dimension {} too large", dim)))
            })
            .collect::<Result<Vec<_>, TrainError>>()?;
        let size = dims
            .iter()
            .try_fold(size_of::<f32>(), |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| invalid(format!("tensor '{}' of shape {:?} is too large", name, dims)))?;
        let data = read_bytes(&mut reader, size)?
            .chunks_exact(size_of::<f32>())
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        tensors.push((name, ArrayD::from_shape_vec(IxDyn(&dims), data)?));
    }
    Ok(StateDict { metadata, tensors })
}

pub fn save_state(path: &Path, state: &StateDict) -> Result<(), TrainError> {
    write_state(BufWriter::new(File::create(path)?), state)?;
    debug!("Wrote {} tensors to {}", state.tensors.len(), path.display());
    Ok(())
}

pub fn load_state(path: &Path) -> Result<StateDict, TrainError> {
    read_state(BufReader::new(File::open(path)?), path)
}

/// Parameters of `module` as a state dict.
pub fn module_state(module: &dyn Module) -> StateDict {
    StateDict {
        metadata: json!({ "kind": "module" }),
        tensors: module
            .parameters()
            .into_iter()
            .map(|p| (p.name.clone(), p.value.clone()))
            .collect(),
    }
}

/// Copy `state` into the parameters of `module`, matching by name.
///
/// Every parameter must be present exactly once with its exact shape;
/// unknown names are rejected.
pub fn load_module_state(
    module: &mut dyn Module,
    state: StateDict,
    source: &Path,
) -> Result<(), TrainError> {
    let mut params = module.parameters_mut();
    if state.tensors.len() != params.len() {
        return Err(TrainError::Checkpoint {
            path: source.to_path_buf(),
            reason: format!(
                "{} tensors for {} parameters",
                state.tensors.len(),
                params.len()
            ),
        });
    }
    let mut seen = HashSet::new();
    for (name, tensor) in state.tensors {
        if !seen.insert(name.clone()) {
            return Err(TrainError::Checkpoint {
                path: source.to_path_buf(),
                reason: format!("duplicate parameter '{}'", name),
            });
        }
        let param = params
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| TrainError::Checkpoint {
                path: source.to_path_buf(),
                reason: format!("unknown parameter '{}'", name),
            })?;
        if param.value.shape() != tensor.shape() {
            return Err(TrainError::shape(
                format!("parameter {}", name),
                param.value.shape(),
                tensor.shape(),
            ));
        }
        param.value = tensor;
        param.zero_grad();
    }
    Ok(())
}

pub fn save_module(path: &Path, module: &dyn Module) -> Result<(), TrainError> {
    save_state(path, &module_state(module))
}

pub fn load_module(path: &Path, module: &mut dyn Module) -> Result<(), TrainError> {
    load_module_state(module, load_state(path)?, path)
}

pub fn save_optimizer(path: &Path, optimizer: &dyn Optimizer) -> Result<(), TrainError> {
    save_state(path, &optimizer.state_dict())
}

pub fn load_optimizer(path: &Path, optimizer: &mut dyn Optimizer) -> Result<(), TrainError> {
    optimizer.load_state_dict(load_state(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::{Adam, Linear, Parameter};
    use kiln_data::SeededRng;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn source() -> PathBuf {
        PathBuf::from("memory.ckpt")
    }

    #[test]
    fn test_state_survives_write_and_read() {
        let state = StateDict {
            metadata: json!({ "epoch": 3 }),
            tensors: vec![
                ("a".to_string(), ArrayD::from_elem(vec![2, 3], 1.5)),
                ("b".to_string(), ArrayD::from_elem(IxDyn(&[]), 7.0)),
            ],
        };
        let mut bytes = Vec::new();
        write_state(&mut bytes, &state).unwrap();
        assert_eq!(&bytes[..8], b"KILNCKPT");
        let restored = read_state(Cursor::new(bytes), &source()).unwrap();
        assert_eq!(restored, state);
    }

    #[test]
    fn test_bad_magic_rejected() {
        let result = read_state(Cursor::new(b"NOTACKPT\x01\x00\x00\x00".to_vec()), &source());
        assert!(matches!(result, Err(TrainError::Checkpoint { .. })));
    }

    #[test]
    fn test_truncated_rejected() {
        let state = StateDict {
            metadata: json!({}),
            tensors: vec![("a".to_string(), ArrayD::from_elem(vec![4], 1.0))],
        };
        let mut bytes = Vec::new();
        write_state(&mut bytes, &state).unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(read_state(Cursor::new(bytes), &source()).is_err());
    }

    #[test]
    fn test_module_load_restores_values() {
        let trained = Linear::new("fc", 3, 2, &mut SeededRng::new(1));
        let mut fresh = Linear::new("fc", 3, 2, &mut SeededRng::new(2));
        assert_ne!(trained.parameters()[0].value, fresh.parameters()[0].value);
        load_module_state(&mut fresh, module_state(&trained), &source()).unwrap();
        assert_eq!(trained.parameters()[0].value, fresh.parameters()[0].value);
    }

    #[test]
    fn test_module_load_rejects_other_shape() {
        let trained = Linear::new("fc", 3, 2, &mut SeededRng::new(1));
        let mut other = Linear::new("fc", 4, 2, &mut SeededRng::new(1));
        let result = load_module_state(&mut other, module_state(&trained), &source());
        assert!(matches!(result, Err(TrainError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_module_load_rejects_unknown_name() {
        let trained = Linear::new("enc", 3, 2, &mut SeededRng::new(1));
        let mut other = Linear::new("dec", 3, 2, &mut SeededRng::new(1));
        let result = load_module_state(&mut other, module_state(&trained), &source());
        assert!(matches!(result, Err(TrainError::Checkpoint { .. })));
    }

    #[test]
    fn test_optimizer_file_roundtrip() {
        let dir = std::env::temp_dir().join(format!("kiln-train-ckpt-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("optim.ckpt");

        let mut param = Parameter::new("w", ArrayD::from_elem(vec![2], 1.0));
        param.grad.fill(0.5);
        let mut adam = Adam::with_lr(0.01);
        adam.step(vec![&mut param]).unwrap();
        save_optimizer(&path, &adam).unwrap();

        let mut restored = Adam::with_lr(0.5);
        load_optimizer(&path, &mut restored).unwrap();
        assert_eq!(restored.state_dict(), adam.state_dict());
    }

    fn header(tensors: u32) -> Vec<u8> {
        let mut bytes = b"KILNCKPT".to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&2u32.to_le_bytes());
        bytes.extend_from_slice(b"{}");
        bytes.extend_from_slice(&tensors.to_le_bytes());
        bytes
    }

    #[test]
    fn test_huge_shape_rejected() {
        let mut bytes = header(1);
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(b'w');
        bytes.extend_from_slice(&3u32.to_le_bytes());
        for dim in [1u64 << 32, 1 << 32, 2] {
            bytes.extend_from_slice(&dim.to_le_bytes());
        }
        let result = read_state(Cursor::new(bytes), &source());
        assert!(matches!(result, Err(TrainError::Checkpoint { .. })));
    }

    #[test]
    fn test_lengths_beyond_data_rejected() {
        // metadata claims 4 GiB
        let mut bytes = b"KILNCKPT".to_vec();
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        bytes.extend_from_slice(b"{}");
        assert!(matches!(
            read_state(Cursor::new(bytes), &source()),
            Err(TrainError::Io(_))
        ));

        // a large but representable tensor with no data behind it
        let mut bytes = header(1);
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.push(b'w');
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&(1u64 << 40).to_le_bytes());
        assert!(matches!(
            read_state(Cursor::new(bytes), &source()),
            Err(TrainError::Io(_))
        ));
    }

    #[test]
    fn test_module_load_rejects_duplicate_name() {
        let mut module = Linear::new("fc", 3, 2, &mut SeededRng::new(1));
        let mut state = module_state(&module);
        let names: Vec<String> = state.tensors.iter().map(|(n, _)| n.clone()).collect();
        assert_eq!(names.len(), 2);
        // same tensor twice, the second parameter never assigned
        state.tensors[1] = state.tensors[0].clone();
        let result = load_module_state(&mut module, state, &source());
        assert!(
            matches!(result, Err(TrainError::Checkpoint { ref reason, .. }) if reason.contains("duplicate"))
        );
    }
}
