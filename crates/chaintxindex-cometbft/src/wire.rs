//! CometBFT response shapes and their conversion into core types.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use sha2::{Digest, Sha256};

use chaintxindex_core::error::IndexerError;
use chaintxindex_core::types::{
    Block, BlockHeader, BlockResults, Event, EventAttribute, NewBlockHeader, NodeStatus, Tx,
    TxResult,
};

/// CometBFT encodes int64 as a JSON string; older nodes sometimes send numbers.
fn int_from_str_or_num<'de, D>(d: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StrOrNum {
        Str(String),
        Num(i64),
    }

    match StrOrNum::deserialize(d)? {
        StrOrNum::Num(n) => Ok(n),
        StrOrNum::Str(s) if s.is_empty() => Ok(0),
        StrOrNum::Str(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

fn height_from_str_or_num<'de, D>(d: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let h = int_from_str_or_num(d)?;
    u64::try_from(h).map_err(|_| serde::de::Error::custom(format!("negative height {h}")))
}

/// `null` and a missing field both decode to an empty vec.
fn vec_or_null<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(d)?.unwrap_or_default())
}

// ─── status ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StatusResponse {
    sync_info: SyncInfo,
}

#[derive(Debug, Deserialize)]
struct SyncInfo {
    #[serde(deserialize_with = "height_from_str_or_num")]
    latest_block_height: u64,
}

// ─── block ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BlockResponse {
    block_id: BlockId,
    block: RawBlock,
}

#[derive(Debug, Deserialize)]
struct BlockId {
    hash: String,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    header: RawHeader,
    data: RawData,
}

#[derive(Debug, Deserialize)]
struct RawHeader {
    chain_id: String,
    #[serde(deserialize_with = "height_from_str_or_num")]
    height: u64,
    time: String,
}

#[derive(Debug, Deserialize)]
struct RawData {
    #[serde(default, deserialize_with = "vec_or_null")]
    txs: Vec<String>,
}

// ─── block_results ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct BlockResultsResponse {
    #[serde(deserialize_with = "height_from_str_or_num")]
    height: u64,
    #[serde(default, deserialize_with = "vec_or_null")]
    txs_results: Vec<RawTxResult>,
}

#[derive(Debug, Deserialize)]
struct RawTxResult {
    #[serde(default)]
    code: u32,
    #[serde(default)]
    log: String,
    #[serde(default, deserialize_with = "int_from_str_or_num")]
    gas_wanted: i64,
    #[serde(default, deserialize_with = "int_from_str_or_num")]
    gas_used: i64,
    #[serde(default, deserialize_with = "vec_or_null")]
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, deserialize_with = "vec_or_null")]
    attributes: Vec<RawAttribute>,
}

#[derive(Debug, Deserialize)]
struct RawAttribute {
    key: String,
    #[serde(default)]
    value: Option<String>,
}

// ─── NewBlockHeader event ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct EventResult {
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    value: EventValue,
}

#[derive(Debug, Deserialize)]
struct EventValue {
    header: EventHeader,
}

#[derive(Debug, Deserialize)]
struct EventHeader {
    #[serde(deserialize_with = "height_from_str_or_num")]
    height: u64,
}

// ─── Conversions ──────────────────────────────────────────────────────────────

fn decode_err(what: &str, e: impl std::fmt::Display) -> IndexerError {
    IndexerError::Rpc(format!("malformed {what} response: {e}"))
}

/// Upper-case hex SHA-256 of the raw transaction bytes.
pub fn tx_hash(bytes: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(bytes))
}

pub fn parse_status(result: Value) -> Result<NodeStatus, IndexerError> {
    let status: StatusResponse =
        serde_json::from_value(result).map_err(|e| decode_err("status", e))?;
    Ok(NodeStatus {
        latest_block_height: status.sync_info.latest_block_height,
    })
}

pub fn parse_block(result: Value) -> Result<Block, IndexerError> {
    let resp: BlockResponse =
        serde_json::from_value(result).map_err(|e| decode_err("block", e))?;

    let txs = resp
        .block
        .data
        .txs
        .iter()
        .map(|encoded| {
            let bytes = BASE64
                .decode(encoded)
                .map_err(|e| decode_err("block tx", e))?;
            Ok(Tx {
                hash: tx_hash(&bytes),
                bytes,
            })
        })
        .collect::<Result<Vec<_>, IndexerError>>()?;

    Ok(Block {
        header: BlockHeader {
            height: resp.block.header.height,
            hash: resp.block_id.hash,
            chain_id: resp.block.header.chain_id,
            time: resp.block.header.time,
        },
        txs,
    })
}

pub fn parse_block_results(result: Value) -> Result<BlockResults, IndexerError> {
    let resp: BlockResultsResponse =
        serde_json::from_value(result).map_err(|e| decode_err("block_results", e))?;

    Ok(BlockResults {
        height: resp.height,
        tx_results: resp
            .txs_results
            .into_iter()
            .map(|r| TxResult {
                code: r.code,
                log: r.log,
                gas_wanted: r.gas_wanted,
                gas_used: r.gas_used,
                events: r
                    .events
                    .into_iter()
                    .map(|e| Event {
                        kind: e.kind,
                        attributes: e
                            .attributes
                            .into_iter()
                            .map(|a| EventAttribute {
                                key: a.key,
                                value: a.value.unwrap_or_default(),
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect(),
    })
}

/// Parse a subscription message `result`.
///
/// Returns `Ok(None)` for the empty acknowledgement CometBFT sends right
/// after `subscribe`.
pub fn parse_header_event(result: Value) -> Result<Option<NewBlockHeader>, IndexerError> {
    if result.as_object().map_or(true, |o| o.is_empty()) {
        return Ok(None);
    }
    let event: EventResult = serde_json::from_value(result)
        .map_err(|e| IndexerError::Subscription(format!("malformed NewBlockHeader event: {e}")))?;
    Ok(Some(NewBlockHeader {
        height: event.data.value.header.height,
    }))
}
