//! Saved-model variable checkpoints
//!
//! Trained weights of a saved model live outside its graph, in a tensor
//! bundle under `variables/`:
//!
//! - `variables.index`: a sorted string table mapping each variable name to a
//!   `BundleEntryProto`; the empty key holds the `BundleHeaderProto`
//! - `variables.data-NNNNN-of-MMMMM`: shards with the raw little-endian bytes
//!
//! Only uncompressed tables are read, which is what TensorFlow writes for
//! bundles. Variable ops whose name (or `shared_name`) has a checkpoint entry
//! are rewritten into constants before the op-graph is built.

use crate::proto::{
    attr_value, AttrValue, BundleEntryProto, BundleHeaderProto, DataType, GraphDef, NodeDef,
    TensorProto,
};
use crate::tensor::Tensor;
use crate::{Result, TranslateError};
use prost::encoding::decode_varint;
use prost::Message;
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const TABLE_MAGIC: u64 = 0xdb47_7524_8b80_fb57;
const FOOTER_LEN: usize = 48;
/// Compression type byte and checksum after every block
const BLOCK_TRAILER_LEN: usize = 5;

/// Checkpointed tensors by variable name
pub type Checkpoint = FxHashMap<String, Tensor>;

/// Read the bundle stored under `prefix` (`prefix.index` plus data shards)
pub fn read_checkpoint(prefix: &Path) -> Result<Checkpoint> {
    let index = std::fs::read(with_suffix(prefix, ".index"))?;

    let mut num_shards = 1;
    let mut shards: FxHashMap<i32, Vec<u8>> = FxHashMap::default();
    let mut checkpoint = Checkpoint::default();
    for (key, value) in read_table(&index)? {
        if key.is_empty() {
            let header = BundleHeaderProto::decode(value)?;
            if header.endianness != 0 {
                return Err(TranslateError::InvalidModel(
                    "big-endian checkpoints are not supported".into(),
                ));
            }
            num_shards = header.num_shards.max(1);
            continue;
        }

        let name = String::from_utf8_lossy(&key).into_owned();
        let entry = BundleEntryProto::decode(value)?;
        if !entry.slices.is_empty() {
            warn!(variable = %name, "partitioned variable is not read");
            continue;
        }
        if !matches!(
            DataType::try_from(entry.dtype),
            Ok(DataType::DtFloat | DataType::DtDouble | DataType::DtInt32 | DataType::DtInt64)
        ) {
            debug!(variable = %name, dtype = entry.dtype, "skipping non-numeric checkpoint entry");
            continue;
        }

        let shard = match shards.entry(entry.shard_id) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let path = with_suffix(
                    prefix,
                    &format!(".data-{:05}-of-{:05}", entry.shard_id, num_shards),
                );
                e.insert(std::fs::read(path)?)
            }
        };
        let tensor = decode_entry(&name, &entry, shard)?;
        checkpoint.insert(name, tensor);
    }

    info!(variables = checkpoint.len(), shards = shards.len(), "read checkpoint");
    Ok(checkpoint)
}

/// Replace checkpointed variable ops by constants
///
/// `ReadVariableOp` becomes an `Identity` of its handle. Variables without a
/// checkpoint entry are left alone and fail translation only if reachable.
pub fn bind_variables(graph: &mut GraphDef, checkpoint: &Checkpoint) -> usize {
    let mut bound = 0;
    for node in &mut graph.node {
        match node.op.as_str() {
            "VariableV2" | "Variable" | "VarHandleOp" => {
                let value = shared_name(node)
                    .and_then(|key| checkpoint.get(&key))
                    .or_else(|| checkpoint.get(&node.name));
                match value {
                    Some(tensor) => {
                        *node = constant_node(&node.name, tensor);
                        bound += 1;
                    }
                    None => warn!(variable = %node.name, "no checkpoint value for variable"),
                }
            }
            "ReadVariableOp" => node.op = "Identity".into(),
            _ => {}
        }
    }
    debug!(bound, "bound checkpoint variables");
    bound
}

fn shared_name(node: &NodeDef) -> Option<String> {
    match node.attr.get("shared_name").and_then(|a| a.value.as_ref()) {
        Some(attr_value::Value::S(bytes)) if !bytes.is_empty() => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
        _ => None,
    }
}

fn constant_node(name: &str, tensor: &Tensor) -> NodeDef {
    let mut node = NodeDef {
        name: name.to_string(),
        op: "Const".into(),
        ..Default::default()
    };
    node.attr.insert(
        "value".into(),
        AttrValue {
            value: Some(attr_value::Value::Tensor(tensor.to_proto())),
        },
    );
    node
}

fn decode_entry(name: &str, entry: &BundleEntryProto, shard: &[u8]) -> Result<Tensor> {
    let bytes = usize::try_from(entry.offset)
        .ok()
        .zip(usize::try_from(entry.size).ok())
        .and_then(|(start, len)| shard.get(start..start.checked_add(len)?))
        .ok_or_else(|| {
            TranslateError::InvalidModel(format!(
                "checkpoint entry {} lies outside data shard {}",
                name, entry.shard_id
            ))
        })?;
    let proto = TensorProto {
        dtype: entry.dtype,
        tensor_shape: entry.shape.clone(),
        tensor_content: bytes.to_vec(),
        ..Default::default()
    };
    Tensor::from_proto(&proto).map_err(|e| {
        TranslateError::InvalidModel(format!("checkpoint entry {}: {}", name, e))
    })
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut path = OsString::from(prefix.as_os_str());
    path.push(suffix);
    PathBuf::from(path)
}

// ============================================================================
// Sorted string table
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct BlockHandle {
    offset: u64,
    size: u64,
}

impl BlockHandle {
    fn decode(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            offset: decode_varint(buf)?,
            size: decode_varint(buf)?,
        })
    }
}

fn corrupt(what: &str) -> TranslateError {
    TranslateError::InvalidModel(format!("corrupt checkpoint index: {}", what))
}

/// All key/value pairs of a table, in key order
fn read_table(data: &[u8]) -> Result<Vec<(Vec<u8>, &[u8])>> {
    if data.len() < FOOTER_LEN {
        return Err(corrupt("file is shorter than its footer"));
    }
    let footer = &data[data.len() - FOOTER_LEN..];
    let mut magic = [0u8; 8];
    magic.copy_from_slice(&footer[FOOTER_LEN - 8..]);
    if u64::from_le_bytes(magic) != TABLE_MAGIC {
        return Err(corrupt("bad table magic"));
    }

    let mut handles = &footer[..FOOTER_LEN - 8];
    let _metaindex = BlockHandle::decode(&mut handles)?;
    let index = BlockHandle::decode(&mut handles)?;

    let mut entries = Vec::new();
    for (_, value) in block_entries(block(data, index)?)? {
        let mut value = value;
        let handle = BlockHandle::decode(&mut value)?;
        entries.extend(block_entries(block(data, handle)?)?);
    }
    Ok(entries)
}

fn block(data: &[u8], handle: BlockHandle) -> Result<&[u8]> {
    let start = usize::try_from(handle.offset).map_err(|_| corrupt("block offset"))?;
    let len = usize::try_from(handle.size).map_err(|_| corrupt("block size"))?;
    let end = start
        .checked_add(len)
        .filter(|&end| end + BLOCK_TRAILER_LEN <= data.len())
        .ok_or_else(|| corrupt("block lies outside the file"))?;
    if data[end] != 0 {
        return Err(TranslateError::InvalidModel(
            "compressed checkpoint index blocks are not supported".into(),
        ));
    }
    Ok(&data[start..end])
}

/// Entries of one block, undoing key prefix compression
fn block_entries(block: &[u8]) -> Result<Vec<(Vec<u8>, &[u8])>> {
    if block.len() < 4 {
        return Err(corrupt("block is too short"));
    }
    let mut count = [0u8; 4];
    count.copy_from_slice(&block[block.len() - 4..]);
    let restarts_len = (u32::from_le_bytes(count) as usize)
        .checked_mul(4)
        .and_then(|n| n.checked_add(4))
        .filter(|&n| n <= block.len())
        .ok_or_else(|| corrupt("restart array"))?;

    let mut body = &block[..block.len() - restarts_len];
    let mut key = Vec::new();
    let mut entries = Vec::new();
    while !body.is_empty() {
        let shared = decode_varint(&mut body)? as usize;
        let unshared = decode_varint(&mut body)? as usize;
        let value_len = decode_varint(&mut body)? as usize;
        let total = unshared
            .checked_add(value_len)
            .filter(|&n| n <= body.len() && shared <= key.len())
            .ok_or_else(|| corrupt("block entry"))?;

        key.truncate(shared);
        key.extend_from_slice(&body[..unshared]);
        entries.push((key.clone(), &body[unshared..total]));
        body = &body[total..];
    }
    Ok(entries)
}
